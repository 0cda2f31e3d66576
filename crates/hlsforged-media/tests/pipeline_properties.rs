//! End-to-end properties of the MP4 to HLS pipeline.

use assert_matches::assert_matches;
use hlsforged_media::mp4::{BoxPayload, BoxType, Container, Mp4Builder, TrackSpec};
use hlsforged_media::select::select;
use hlsforged_media::ts::packet::{packet_payload, PacketHeader, PAT_PID, PMT_PID};
use hlsforged_media::ts::pes::PesHeader;
use hlsforged_media::ts::psi::{pmt_streams, read_section};
use hlsforged_media::ts::{crc32_mpeg, mux, TS_PACKET_SIZE};
use hlsforged_media::{Error, OutputChain, Playlist, PlaylistConfig, SplitOptions};
use std::collections::BTreeMap;
use std::io::Cursor;

/// 12 s of 30000/1001 fps video with a keyframe every 30 frames, plus AAC.
fn av_file() -> Vec<u8> {
    Mp4Builder::new()
        .track(TrackSpec::h264(1, 30_000, 1001, 360, 30).with_composition_offsets(&[0, 2002, 1001]))
        .track(TrackSpec::aac(2, 44_100, 517))
        .build()
}

fn mux_range(data: &[u8], options: &SplitOptions) -> Vec<u8> {
    let container = Container::parse(Cursor::new(data)).unwrap();
    let plan = select(&container, options).unwrap();
    mux(&container, &plan, &mut Cursor::new(data), OutputChain::default())
        .unwrap()
        .to_bytes()
        .to_vec()
}

fn packets(ts: &[u8]) -> Vec<&[u8]> {
    assert_eq!(ts.len() % TS_PACKET_SIZE, 0);
    ts.chunks(TS_PACKET_SIZE).collect()
}

/// PES units per PID as (pts, dts, elementary stream bytes).
fn pes_units(ts: &[u8]) -> BTreeMap<u16, Vec<(Option<u64>, Option<u64>, Vec<u8>)>> {
    let mut raw: BTreeMap<u16, Vec<Vec<u8>>> = BTreeMap::new();
    for packet in packets(ts) {
        let header = PacketHeader::parse(packet).unwrap();
        if header.pid == PAT_PID || header.pid == PMT_PID {
            continue;
        }
        let payload = packet_payload(packet).unwrap();
        let units = raw.entry(header.pid).or_default();
        if header.payload_unit_start {
            units.push(payload.to_vec());
        } else {
            units.last_mut().unwrap().extend_from_slice(payload);
        }
    }

    raw.into_iter()
        .map(|(pid, units)| {
            let parsed = units
                .into_iter()
                .map(|unit| {
                    let header = PesHeader::parse(&unit).unwrap();
                    (header.pts, header.dts, unit[header.header_len..].to_vec())
                })
                .collect();
            (pid, parsed)
        })
        .collect()
}

#[test]
fn sample_count_matches_time_to_sample_runs() {
    let data = av_file();
    let container = Container::parse(Cursor::new(&data)).unwrap();

    let stts_totals: Vec<u64> = container
        .tree()
        .iter()
        .filter_map(|node| match &node.payload {
            BoxPayload::TimeToSample(entries) => {
                Some(entries.iter().map(|e| e.sample_count as u64).sum())
            }
            _ => None,
        })
        .collect();

    assert_eq!(stts_totals.len(), container.tracks.len());
    for (track, total) in container.tracks.iter().zip(stts_totals) {
        assert_eq!(track.samples.len() as u64, total);
        assert_eq!(
            track.samples.durations().iter().map(|&d| d as u64).sum::<u64>(),
            track.samples.total_duration()
        );
    }
}

#[test]
fn continuity_counters_have_no_gaps() {
    let data = av_file();
    let ts = mux_range(&data, &SplitOptions::default());

    let mut last: BTreeMap<u16, u8> = BTreeMap::new();
    for packet in packets(&ts) {
        let header = PacketHeader::parse(packet).unwrap();
        match last.insert(header.pid, header.continuity_counter) {
            Some(prev) => assert_eq!(header.continuity_counter, (prev + 1) % 16, "pid {:#x}", header.pid),
            None => assert_eq!(header.continuity_counter, 0),
        }
    }
    assert_eq!(last.keys().copied().collect::<Vec<_>>(), vec![PAT_PID, 0x100, 0x101, PMT_PID]);
}

#[test]
fn psi_checksums_validate() {
    let data = av_file();
    let ts = mux_range(&data, &SplitOptions::parse("start=4&end=6").unwrap());
    let packets = packets(&ts);

    let pat = read_section(packet_payload(packets[0]).unwrap()).unwrap();
    let pmt = read_section(packet_payload(packets[1]).unwrap()).unwrap();
    for section in [pat, pmt] {
        let (body, crc) = section.split_at(section.len() - 4);
        assert_eq!(crc32_mpeg(body).to_be_bytes(), crc);
        assert_eq!(crc32_mpeg(section), 0);
    }

    let streams = pmt_streams(pmt).unwrap();
    assert_eq!(streams.len(), 2);
    assert_eq!((streams[0].stream_type, streams[0].pid), (0x1B, 0x100));
    assert_eq!((streams[1].stream_type, streams[1].pid), (0x0F, 0x101));
}

#[test]
fn independent_segments_match_continuous_segmentation() {
    let data = av_file();
    let container = Container::parse(Cursor::new(&data)).unwrap();
    let playlist = Playlist::generate(
        &container,
        &SplitOptions::default(),
        &PlaylistConfig::new(2, "movie.ts"),
    )
    .unwrap();
    assert_eq!(playlist.segment_count(), 6);

    let whole = pes_units(&mux_range(&data, &SplitOptions::default()));
    let mut stitched: BTreeMap<u16, Vec<_>> = BTreeMap::new();

    for (k, entry) in playlist.entries.iter().enumerate() {
        // Re-parse the segment URI's query the way a fresh request would
        let query = entry.uri.split_once('?').map(|(_, q)| q).unwrap_or("");
        let options = SplitOptions::parse(query).unwrap();
        assert_eq!(options, entry.options);

        let independent = mux_range(&data, &options);
        let plan = playlist.segment_plan(&container, k).unwrap();
        let continuous = mux(&container, &plan, &mut Cursor::new(&data), OutputChain::default())
            .unwrap()
            .to_bytes();
        assert_eq!(independent, continuous.to_vec(), "segment {}", k);

        // Every segment starts on a video sync sample
        let units = pes_units(&independent);
        assert!(units[&0x100][0].2.windows(5).any(|w| w == [0, 0, 0, 1, 0x67]));

        for (pid, units) in units {
            stitched.entry(pid).or_default().extend(units);
        }
    }

    assert_eq!(stitched, whole);
}

#[test]
fn segment_durations_sum_to_track_duration() {
    let data = av_file();
    let container = Container::parse(Cursor::new(&data)).unwrap();
    for length in [1, 2, 3, 5, 8, 20] {
        let playlist = Playlist::generate(
            &container,
            &SplitOptions::default(),
            &PlaylistConfig::new(length, "movie.ts"),
        )
        .unwrap();
        let video = container.video_track().unwrap();
        assert!((playlist.total_duration_secs() - video.duration_secs()).abs() < 1e-6);
        assert!(playlist.entries.iter().all(|e| e.duration_secs > 0.0));
        assert!(playlist.target_duration >= length);
    }
}

#[test]
fn thirty_second_video_yields_fifteen_segments() {
    let data = Mp4Builder::new()
        .track(TrackSpec::h264(1, 24_000, 1000, 720, 48))
        .build();
    let container = Container::parse(Cursor::new(&data)).unwrap();
    let playlist = Playlist::generate(
        &container,
        &SplitOptions::default(),
        &PlaylistConfig::new(2, "movie.ts"),
    )
    .unwrap();

    assert_eq!(playlist.segment_count(), 15);
    let text = playlist.render();
    assert_eq!(text.matches("#EXTINF:2.000000,").count(), 15);
    assert!(text.ends_with("#EXT-X-ENDLIST\n"));
}

#[test]
fn end_before_start_is_empty_selection() {
    assert_matches!(
        SplitOptions::parse("start=10&end=5"),
        Err(Error::EmptySelection)
    );
}

#[test]
fn unknown_track_is_not_found() {
    let data = av_file();
    let container = Container::parse(Cursor::new(&data)).unwrap();
    let options = SplitOptions::parse("tracks=3").unwrap();
    assert_matches!(select(&container, &options), Err(Error::TrackNotFound(3)));
    assert_matches!(
        Playlist::generate(&container, &options, &PlaylistConfig::new(2, "movie.ts")),
        Err(Error::TrackNotFound(3))
    );
}

#[test]
fn empty_mdat_fails_to_read_samples() {
    let data = Mp4Builder::new()
        .track(TrackSpec::h264(1, 30_000, 1001, 60, 30))
        .track(TrackSpec::aac(2, 44_100, 87))
        .empty_mdat(true)
        .build();
    let container = Container::parse(Cursor::new(&data)).unwrap();
    let plan = select(&container, &SplitOptions::default()).unwrap();
    assert!(plan.sample_count() > 0);

    assert_matches!(
        mux(&container, &plan, &mut Cursor::new(&data), OutputChain::default()),
        Err(Error::SourceReadFailure(_))
    );
}

#[test]
fn moov_at_end_muxes_the_same_samples() {
    let front = av_file();
    let back = Mp4Builder::new()
        .track(TrackSpec::h264(1, 30_000, 1001, 360, 30).with_composition_offsets(&[0, 2002, 1001]))
        .track(TrackSpec::aac(2, 44_100, 517))
        .moov_at_end(true)
        .build();

    let container = Container::parse(Cursor::new(&back)).unwrap();
    assert!(!container.has_faststart);

    let options = SplitOptions::parse("start=3&end=7").unwrap();
    assert_eq!(mux_range(&front, &options), mux_range(&back, &options));
}

#[test]
fn mp3_audio_is_passed_through() {
    let data = Mp4Builder::new()
        .track(TrackSpec::h264(1, 25_000, 1000, 50, 25))
        .track(TrackSpec::mp3(2, 44_100, 77))
        .build();
    let units = pes_units(&mux_range(&data, &SplitOptions::default()));
    let audio = &units[&0x101];
    assert_eq!(audio.len(), 77);
    assert_eq!(&audio[0].2[..4], &[0xFF, 0xFB, 0x90, 0x64]);
    assert_eq!(audio[0].2.len(), 417);
}

#[test]
fn uniform_sample_size_count_disagreeing_with_tables_is_malformed() {
    let mut data = Mp4Builder::new()
        .track(TrackSpec::h264(1, 25_000, 1000, 50, 25))
        .build();
    let stsz = data.windows(4).position(|w| w == b"stsz").unwrap();
    // version/flags, then sample_size and sample_count
    data[stsz + 8..stsz + 12].copy_from_slice(&1u32.to_be_bytes());
    data[stsz + 12..stsz + 16].copy_from_slice(&u32::MAX.to_be_bytes());

    assert_matches!(
        Container::parse(Cursor::new(&data)),
        Err(Error::MalformedContainer(_))
    );
}

#[test]
fn user_data_terminator_is_tolerated() {
    let plain = Mp4Builder::new()
        .track(TrackSpec::h264(1, 25_000, 1000, 50, 25))
        .track(TrackSpec::aac(2, 48_000, 94))
        .moov_at_end(true)
        .build();

    // udta holding a free box and a 32-bit zero terminator, at the end of moov
    let mut data = plain.clone();
    let moov = data.windows(4).position(|w| w == b"moov").unwrap() - 4;
    let moov_size = u32::from_be_bytes(data[moov..moov + 4].try_into().unwrap());
    assert_eq!(moov + moov_size as usize, data.len());
    let udta: [u8; 20] = [
        0, 0, 0, 20, b'u', b'd', b't', b'a', 0, 0, 0, 8, b'f', b'r', b'e', b'e', 0, 0, 0, 0,
    ];
    data.extend_from_slice(&udta);
    data[moov..moov + 4].copy_from_slice(&(moov_size + 20).to_be_bytes());

    let container = Container::parse(Cursor::new(&data)).unwrap();
    assert_eq!(container.tracks.len(), 2);
    assert_eq!(
        mux_range(&data, &SplitOptions::default()),
        mux_range(&plain, &SplitOptions::default())
    );
}

#[test]
fn chunk_layout_does_not_change_output() {
    let build = |co64: bool, video_chunk: u32, audio_chunk: u32| {
        Mp4Builder::new()
            .track(TrackSpec::h264(1, 30_000, 1001, 90, 30).with_samples_per_chunk(video_chunk))
            .track(TrackSpec::aac(2, 44_100, 130).with_samples_per_chunk(audio_chunk))
            .co64(co64)
            .build()
    };
    let reference = build(false, 5, 10);
    let wide = build(true, 1, 7);

    let container = Container::parse(Cursor::new(&wide)).unwrap();
    assert!(container
        .tree()
        .iter()
        .any(|node| node.header.box_type == BoxType::CO64));
    let video = &container.tracks[0].samples;
    assert_eq!(video.range_bytes(0..video.len()), video.total_bytes());

    let options = SplitOptions::parse("start=1&end=2").unwrap();
    assert_eq!(mux_range(&wide, &options), mux_range(&reference, &options));
    assert_eq!(
        mux_range(&wide, &SplitOptions::default()),
        mux_range(&reference, &SplitOptions::default())
    );
}

#[test]
fn program_map_spans_packets_when_many_tracks_are_selected() {
    let mut builder = Mp4Builder::new();
    for id in 1..=16 {
        builder = builder.track(TrackSpec::h264(id, 25_000, 1000, 2, 1));
    }
    for id in 17..=48 {
        builder = builder.track(TrackSpec::aac(id, 48_000, 3));
    }
    let data = builder.build();
    let ids: Vec<String> = (1..=48).map(|id: u32| id.to_string()).collect();
    let options = SplitOptions::parse(&format!("tracks={}", ids.join(","))).unwrap();
    let ts = mux_range(&data, &options);

    let mut pmt_payload = Vec::new();
    let mut pmt_packets = 0;
    for packet in packets(&ts) {
        let header = PacketHeader::parse(packet).unwrap();
        if header.pid == PMT_PID {
            assert_eq!(header.payload_unit_start, pmt_packets == 0);
            pmt_payload.extend_from_slice(packet_payload(packet).unwrap());
            pmt_packets += 1;
        }
    }
    assert_eq!(pmt_packets, 2);

    let section = read_section(&pmt_payload).unwrap();
    assert_eq!(crc32_mpeg(section), 0);
    let streams = pmt_streams(section).unwrap();
    assert_eq!(streams.len(), 48);
    assert_eq!(streams.iter().filter(|s| s.stream_type == 0x1B).count(), 16);
    assert_eq!(streams.iter().filter(|s| s.stream_type == 0x0F).count(), 32);
}
