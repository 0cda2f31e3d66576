use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hlsforged")]
#[command(author, version, about = "Serve MP4 files as HLS playlists and MPEG-TS segments")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate the M3U8 playlist for an MP4 file
    Playlist {
        /// MP4 file
        #[arg(required = true)]
        file: PathBuf,

        /// Split options, e.g. "tracks=1,2"
        #[arg(short, long, default_value = "")]
        query: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate one MPEG-TS segment from an MP4 file
    Segment {
        /// MP4 file
        #[arg(required = true)]
        file: PathBuf,

        /// Split options, e.g. "start=10&end=20"
        #[arg(short, long, default_value = "")]
        query: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a request URI through the handler as the HTTP server would
    Request {
        /// Request URI, e.g. "/movie.m3u8" or "/movie.ts?start=8&end=16"
        #[arg(required = true)]
        uri: String,

        /// Directory the URI path is resolved against
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Write the body to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the tracks of an MP4 file
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
