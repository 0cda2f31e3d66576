mod cli;

use hlsforged::config::{self, Config};
use hlsforged::{Handler, Request};
use hlsforged_media::{Container, OutputChain, PlaylistConfig, Prepared, RequestKind, SplitOptions};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "hlsforged=trace,hlsforged_media=trace".to_string()
        } else {
            "hlsforged=debug,hlsforged_media=debug".to_string()
        }
    });

    // Logs go to stderr; stdout carries playlists and segments
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Playlist {
            file,
            query,
            output,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            generate(&config, &file, RequestKind::Playlist, &query, output.as_deref())
        }
        Commands::Segment {
            file,
            query,
            output,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            generate(&config, &file, RequestKind::Segment, &query, output.as_deref())
        }
        Commands::Request { uri, root, output } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            run_request(&config, &uri, &root, output.as_deref())
        }
        Commands::Probe { file, json } => probe_file(&file, json),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("hlsforged {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn generate(
    config: &Config,
    file: &Path,
    kind: RequestKind,
    query: &str,
    output: Option<&Path>,
) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let container = Container::open(file).with_context(|| format!("Failed to parse {:?}", file))?;
    let options = SplitOptions::parse(query)?;

    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let playlist = PlaylistConfig::new(
        config.hls.segment_length,
        config.hls.segment_uri(&format!("/{}.m3u8", stem)),
    );

    let prepared = Prepared::prepare(&container, kind, &options, &playlist)?;
    let mut source = BufReader::new(File::open(file)?);
    let body = prepared.render(&container, &mut source, config.hls.output_chain())?;

    tracing::info!(
        file = %file.display(),
        bytes = body.len(),
        action = %prepared.action(),
        "Generated"
    );

    write_body(&body, output)
}

fn run_request(config: &Config, uri: &str, root: &Path, output: Option<&Path>) -> Result<()> {
    let handler = Handler::new(config);
    let response = match Request::parse(uri, root) {
        Ok(request) => handler.handle(&request),
        Err(e) => {
            eprintln!("{}", e);
            anyhow::bail!("{} {}", e.outcome().status_code(), uri);
        }
    };

    eprintln!(
        "{} {} {}",
        response.status_code(),
        response.content_type.unwrap_or("-"),
        response.content_length()
    );
    for (name, value) in &response.headers {
        eprintln!("{}: {}", name, value);
    }

    if response.status_code() != 200 {
        anyhow::bail!("Request failed with status {}", response.status_code());
    }
    write_body(&response.body, output)
}

fn write_body(body: &OutputChain, output: Option<&Path>) -> Result<()> {
    let mut writer: Box<dyn Write> = match output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Failed to create {:?}", path))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    };
    for chunk in body.chunks() {
        writer.write_all(chunk)?;
    }
    writer.flush()?;
    Ok(())
}

fn probe_file(file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let container = Container::open(file).with_context(|| format!("Failed to parse {:?}", file))?;
    let tracks = container.summary();

    if json {
        let json_str = serde_json::to_string_pretty(&tracks)?;
        println!("{}", json_str);
        return Ok(());
    }

    println!("File: {}", file.display());
    println!("Size: {} bytes", container.file_size);
    let secs = container.duration_secs();
    let whole = secs as u64;
    println!(
        "Duration: {:02}:{:02}:{:02}.{:03}",
        whole / 3600,
        (whole / 60) % 60,
        whole % 60,
        ((secs - whole as f64) * 1000.0) as u64
    );
    println!("Faststart: {}", container.has_faststart);
    if let Some(interval) = container.max_keyframe_interval_secs() {
        println!("Max keyframe interval: {:.3}s", interval);
    }

    println!("\nTracks: {}", tracks.len());
    for track in &tracks {
        print!(
            "  [{}] {} {} ({} samples, {} sync, {} kb/s)",
            track.track_id,
            track.kind,
            track.codec,
            track.sample_count,
            track.sync_sample_count,
            track.bitrate / 1000
        );
        if track.width > 0 {
            print!(" {}x{}", track.width, track.height);
        }
        if track.sample_rate > 0 {
            print!(" {} Hz {}ch", track.sample_rate, track.channels);
        }
        println!(" {:.3}s", track.duration_secs);
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_config(&config);
        }
        None => {
            println!("No config file specified, using defaults");
            print_config(&Config::default());
        }
    }

    Ok(())
}

fn print_config(config: &Config) {
    println!("  Segment length: {}s", config.hls.segment_length);
    if config.hls.relative {
        println!("  Segment URIs: relative");
    } else {
        println!("  Segment URIs: {}", config.hls.base_url);
    }
    println!(
        "  Buffers: {} bytes each, {} bytes max",
        config.hls.buffer_size, config.hls.max_buffer_size
    );
    println!(
        "  Cache: {} ({} entries, {}s ttl)",
        if config.cache.enabled { "enabled" } else { "disabled" },
        config.cache.max_entries,
        config.cache.ttl_secs
    );
}
