//! Progressive MP4 writer.
//!
//! Produces small but structurally complete files (ftyp, moov, mdat) with
//! interleaved chunks. Used for fixtures in tests and benchmarks.

use super::boxes::TimeToSampleEntry;
use super::codec::AAC_SAMPLE_RATES;
use bytes::{BufMut, BytesMut};

/// One sample to write.
#[derive(Debug, Clone)]
pub struct SampleSpec {
    pub data: Vec<u8>,
    pub duration: u32,
    pub sync: bool,
    pub cts_offset: i32,
}

impl SampleSpec {
    pub fn new(data: Vec<u8>, duration: u32, sync: bool) -> Self {
        Self {
            data,
            duration,
            sync,
            cts_offset: 0,
        }
    }
}

/// Sample entry written into `stsd`.
#[derive(Debug, Clone)]
pub enum SampleEntrySpec {
    Avc {
        width: u16,
        height: u16,
        sps: Vec<u8>,
        pps: Vec<u8>,
    },
    Aac {
        object_type: u8,
        sample_rate: u32,
        channels: u16,
    },
    Mp3 {
        sample_rate: u32,
        channels: u16,
    },
    /// Bare sample entry of an arbitrary format.
    Opaque { format: [u8; 4] },
}

/// One track to write.
#[derive(Debug, Clone)]
pub struct TrackSpec {
    pub track_id: u32,
    pub handler: [u8; 4],
    pub timescale: u32,
    pub entry: SampleEntrySpec,
    pub samples: Vec<SampleSpec>,
    pub samples_per_chunk: u32,
    /// Written instead of the stts derived from the samples.
    pub stts_override: Option<Vec<TimeToSampleEntry>>,
}

const FAKE_SPS: [u8; 8] = [0x67, 0x42, 0xC0, 0x1E, 0xDA, 0x02, 0x80, 0xBF];
const FAKE_PPS: [u8; 4] = [0x68, 0xCE, 0x3C, 0x80];

impl TrackSpec {
    /// H.264 track of `frame_count` frames with a sync sample every `gop` frames.
    pub fn h264(
        track_id: u32,
        timescale: u32,
        frame_duration: u32,
        frame_count: usize,
        gop: usize,
    ) -> Self {
        let gop = gop.max(1);
        let samples = (0..frame_count)
            .map(|i| {
                let sync = i % gop == 0;
                SampleSpec::new(avc_sample(sync, if sync { 480 } else { 120 }), frame_duration, sync)
            })
            .collect();
        Self {
            track_id,
            handler: *b"vide",
            timescale,
            entry: SampleEntrySpec::Avc {
                width: 640,
                height: 360,
                sps: FAKE_SPS.to_vec(),
                pps: FAKE_PPS.to_vec(),
            },
            samples,
            samples_per_chunk: 5,
            stts_override: None,
        }
    }

    /// AAC LC stereo track of 1024-sample frames at `sample_rate`.
    pub fn aac(track_id: u32, sample_rate: u32, frame_count: usize) -> Self {
        let samples = (0..frame_count)
            .map(|i| SampleSpec::new(vec![0x21; 64 + i % 8], 1024, true))
            .collect();
        Self {
            track_id,
            handler: *b"soun",
            timescale: sample_rate,
            entry: SampleEntrySpec::Aac {
                object_type: 2,
                sample_rate,
                channels: 2,
            },
            samples,
            samples_per_chunk: 10,
            stts_override: None,
        }
    }

    /// MP3 track of 1152-sample frames.
    pub fn mp3(track_id: u32, sample_rate: u32, frame_count: usize) -> Self {
        let samples = (0..frame_count)
            .map(|_| {
                let mut frame = vec![0xFF, 0xFB, 0x90, 0x64];
                frame.resize(417, 0x55);
                SampleSpec::new(frame, 1152, true)
            })
            .collect();
        Self {
            track_id,
            handler: *b"soun",
            timescale: sample_rate,
            entry: SampleEntrySpec::Mp3 {
                sample_rate,
                channels: 2,
            },
            samples,
            samples_per_chunk: 10,
            stts_override: None,
        }
    }

    /// Track with a sample entry format the muxer does not know.
    pub fn opaque(
        track_id: u32,
        handler: [u8; 4],
        format: [u8; 4],
        timescale: u32,
        sample_count: usize,
    ) -> Self {
        let samples = (0..sample_count)
            .map(|_| SampleSpec::new(vec![0; 32], timescale, true))
            .collect();
        Self {
            track_id,
            handler,
            timescale,
            entry: SampleEntrySpec::Opaque { format },
            samples,
            samples_per_chunk: 4,
            stts_override: None,
        }
    }

    /// Grow every sample by `extra` bytes.
    pub fn pad_samples(mut self, extra: usize) -> Self {
        let is_avc = matches!(self.entry, SampleEntrySpec::Avc { .. });
        for sample in &mut self.samples {
            sample.data.resize(sample.data.len() + extra, 0xAB);
            if is_avc {
                let nal_len = (sample.data.len() - 4) as u32;
                sample.data[..4].copy_from_slice(&nal_len.to_be_bytes());
            }
        }
        self
    }

    /// Assign composition offsets to the samples, cycling through `offsets`.
    pub fn with_composition_offsets(mut self, offsets: &[i32]) -> Self {
        if offsets.is_empty() {
            return self;
        }
        for (sample, &offset) in self.samples.iter_mut().zip(offsets.iter().cycle()) {
            sample.cts_offset = offset;
        }
        self
    }

    pub fn with_samples_per_chunk(mut self, samples_per_chunk: u32) -> Self {
        self.samples_per_chunk = samples_per_chunk.max(1);
        self
    }

    fn duration(&self) -> u64 {
        self.samples.iter().map(|s| s.duration as u64).sum()
    }

    fn chunks(&self) -> impl Iterator<Item = &[SampleSpec]> {
        self.samples.chunks(self.samples_per_chunk.max(1) as usize)
    }
}

/// A single length-prefixed NAL unit; IDR when `sync`.
fn avc_sample(sync: bool, body_len: usize) -> Vec<u8> {
    let nal_header = if sync { 0x65 } else { 0x41 };
    let mut data = Vec::with_capacity(4 + 1 + body_len);
    data.extend_from_slice(&((1 + body_len) as u32).to_be_bytes());
    data.push(nal_header);
    data.resize(4 + 1 + body_len, 0xAB);
    data
}

/// Builder for progressive MP4 files.
#[derive(Debug, Clone, Default)]
pub struct Mp4Builder {
    tracks: Vec<TrackSpec>,
    moov_at_end: bool,
    empty_mdat: bool,
    co64: bool,
}

impl Mp4Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a track.
    pub fn track(mut self, track: TrackSpec) -> Self {
        self.tracks.push(track);
        self
    }

    /// Write mdat after moov's referenced data would be (non-faststart).
    pub fn moov_at_end(mut self, yes: bool) -> Self {
        self.moov_at_end = yes;
        self
    }

    /// Write an mdat with no payload, so every sample lies past the end.
    pub fn empty_mdat(mut self, yes: bool) -> Self {
        self.empty_mdat = yes;
        self
    }

    /// Use 64-bit chunk offsets.
    pub fn co64(mut self, yes: bool) -> Self {
        self.co64 = yes;
        self
    }

    /// Serialize the file.
    pub fn build(&self) -> Vec<u8> {
        let (payload, relative_offsets) = self.layout_mdat();

        let mut ftyp = BytesMut::new();
        write_ftyp(&mut ftyp);

        let mdat_payload: &[u8] = if self.empty_mdat { &[] } else { &payload };

        let mut buf = BytesMut::with_capacity(ftyp.len() + payload.len() + 4096);
        buf.put_slice(&ftyp);

        if self.moov_at_end {
            let base = (ftyp.len() + 8) as u64;
            write_mdat(&mut buf, mdat_payload);
            self.write_moov(&mut buf, &relative_offsets, base);
        } else {
            // moov size does not depend on the offset values
            let mut probe = BytesMut::new();
            self.write_moov(&mut probe, &relative_offsets, 0);
            let base = (ftyp.len() + probe.len() + 8) as u64;
            self.write_moov(&mut buf, &relative_offsets, base);
            write_mdat(&mut buf, mdat_payload);
        }

        buf.to_vec()
    }

    /// Interleave chunks round-robin; returns the mdat payload and each
    /// track's chunk offsets relative to it.
    fn layout_mdat(&self) -> (Vec<u8>, Vec<Vec<u64>>) {
        let mut payload = Vec::new();
        let mut offsets = vec![Vec::new(); self.tracks.len()];
        let mut iters: Vec<_> = self.tracks.iter().map(|t| t.chunks()).collect();

        loop {
            let mut wrote = false;
            for (i, iter) in iters.iter_mut().enumerate() {
                if let Some(chunk) = iter.next() {
                    offsets[i].push(payload.len() as u64);
                    for sample in chunk {
                        payload.extend_from_slice(&sample.data);
                    }
                    wrote = true;
                }
            }
            if !wrote {
                break;
            }
        }

        (payload, offsets)
    }

    fn write_moov(&self, buf: &mut BytesMut, relative_offsets: &[Vec<u64>], base: u64) {
        let moov_start = begin_box(buf, b"moov");

        let duration_ms = self
            .tracks
            .iter()
            .map(|t| crate::time::rescale(t.duration(), t.timescale, 1000))
            .max()
            .unwrap_or(0);
        write_mvhd(buf, 1000, duration_ms as u32, self.tracks.len() as u32 + 1);

        for (track, offsets) in self.tracks.iter().zip(relative_offsets) {
            let absolute: Vec<u64> = offsets.iter().map(|o| o + base).collect();
            self.write_trak(buf, track, &absolute);
        }

        end_box(buf, moov_start);
    }

    fn write_trak(&self, buf: &mut BytesMut, track: &TrackSpec, chunk_offsets: &[u64]) {
        let trak_start = begin_box(buf, b"trak");
        let (width, height) = match track.entry {
            SampleEntrySpec::Avc { width, height, .. } => (width as u32, height as u32),
            _ => (0, 0),
        };
        let duration_ms = crate::time::rescale(track.duration(), track.timescale, 1000);
        write_tkhd(buf, track.track_id, duration_ms as u32, width, height);

        let mdia_start = begin_box(buf, b"mdia");
        write_mdhd(buf, track.timescale, track.duration() as u32);
        write_hdlr(buf, &track.handler);

        let minf_start = begin_box(buf, b"minf");
        if &track.handler == b"vide" {
            buf.put_u32(20);
            buf.put_slice(b"vmhd");
            buf.put_u32(1); // version/flags
            buf.put_u64(0); // graphics mode + opcolor
        } else {
            buf.put_u32(16);
            buf.put_slice(b"smhd");
            buf.put_u32(0);
            buf.put_u32(0); // balance + reserved
        }
        write_dinf(buf);

        let stbl_start = begin_box(buf, b"stbl");
        write_stsd(buf, track);
        write_stts(buf, track);
        write_ctts(buf, track);
        write_stss(buf, track);
        write_stsc(buf, track);
        write_stsz(buf, track);
        write_chunk_offsets(buf, chunk_offsets, self.co64);
        end_box(buf, stbl_start);

        end_box(buf, minf_start);
        end_box(buf, mdia_start);
        end_box(buf, trak_start);
    }
}

/// Write a size placeholder and type; returns the box start.
fn begin_box(buf: &mut BytesMut, box_type: &[u8; 4]) -> usize {
    let start = buf.len();
    buf.put_u32(0);
    buf.put_slice(box_type);
    start
}

/// Patch the size of the box starting at `start`.
fn end_box(buf: &mut BytesMut, start: usize) {
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

fn write_full_box_header(buf: &mut BytesMut, version: u8, flags: u32) {
    buf.put_u8(version);
    buf.put_slice(&flags.to_be_bytes()[1..]);
}

fn write_matrix(buf: &mut BytesMut) {
    for value in [0x00010000u32, 0, 0, 0, 0x00010000, 0, 0, 0, 0x40000000] {
        buf.put_u32(value);
    }
}

fn write_ftyp(buf: &mut BytesMut) {
    let start = begin_box(buf, b"ftyp");
    buf.put_slice(b"isom"); // major brand
    buf.put_u32(0x200); // minor version
    for brand in [b"isom", b"iso2", b"avc1", b"mp41"] {
        buf.put_slice(brand);
    }
    end_box(buf, start);
}

fn write_mdat(buf: &mut BytesMut, payload: &[u8]) {
    buf.put_u32(8 + payload.len() as u32);
    buf.put_slice(b"mdat");
    buf.put_slice(payload);
}

fn write_mvhd(buf: &mut BytesMut, timescale: u32, duration: u32, next_track_id: u32) {
    let start = begin_box(buf, b"mvhd");
    write_full_box_header(buf, 0, 0);
    buf.put_u32(0); // creation time
    buf.put_u32(0); // modification time
    buf.put_u32(timescale);
    buf.put_u32(duration);
    buf.put_u32(0x00010000); // rate = 1.0
    buf.put_u16(0x0100); // volume = 1.0
    buf.put_u16(0); // reserved
    buf.put_u64(0); // reserved
    write_matrix(buf);
    for _ in 0..6 {
        buf.put_u32(0); // pre_defined
    }
    buf.put_u32(next_track_id);
    end_box(buf, start);
}

fn write_tkhd(buf: &mut BytesMut, track_id: u32, duration: u32, width: u32, height: u32) {
    let start = begin_box(buf, b"tkhd");
    write_full_box_header(buf, 0, 7); // enabled, in_movie, in_preview
    buf.put_u32(0); // creation time
    buf.put_u32(0); // modification time
    buf.put_u32(track_id);
    buf.put_u32(0); // reserved
    buf.put_u32(duration);
    buf.put_u64(0); // reserved
    buf.put_u16(0); // layer
    buf.put_u16(0); // alternate group
    buf.put_u16(if width == 0 { 0x0100 } else { 0 }); // volume
    buf.put_u16(0); // reserved
    write_matrix(buf);
    buf.put_u32(width << 16);
    buf.put_u32(height << 16);
    end_box(buf, start);
}

fn write_mdhd(buf: &mut BytesMut, timescale: u32, duration: u32) {
    let start = begin_box(buf, b"mdhd");
    write_full_box_header(buf, 0, 0);
    buf.put_u32(0); // creation time
    buf.put_u32(0); // modification time
    buf.put_u32(timescale);
    buf.put_u32(duration);
    buf.put_u16(0x55C4); // language: und
    buf.put_u16(0); // pre_defined
    end_box(buf, start);
}

fn write_hdlr(buf: &mut BytesMut, handler: &[u8; 4]) {
    let start = begin_box(buf, b"hdlr");
    write_full_box_header(buf, 0, 0);
    buf.put_u32(0); // pre_defined
    buf.put_slice(handler);
    buf.put_u32(0); // reserved
    buf.put_u32(0);
    buf.put_u32(0);
    buf.put_slice(b"hlsforged\0");
    end_box(buf, start);
}

fn write_dinf(buf: &mut BytesMut) {
    let dinf_start = begin_box(buf, b"dinf");
    let dref_start = begin_box(buf, b"dref");
    write_full_box_header(buf, 0, 0);
    buf.put_u32(1); // entry count
    buf.put_u32(12);
    buf.put_slice(b"url ");
    write_full_box_header(buf, 0, 1); // self-contained
    end_box(buf, dref_start);
    end_box(buf, dinf_start);
}

fn write_stsd(buf: &mut BytesMut, track: &TrackSpec) {
    let start = begin_box(buf, b"stsd");
    write_full_box_header(buf, 0, 0);
    buf.put_u32(1); // entry count

    match &track.entry {
        SampleEntrySpec::Avc {
            width,
            height,
            sps,
            pps,
        } => {
            let entry = begin_box(buf, b"avc1");
            buf.put_slice(&[0; 6]); // reserved
            buf.put_u16(1); // data reference index
            buf.put_u16(0); // pre_defined
            buf.put_u16(0); // reserved
            buf.put_slice(&[0; 12]); // pre_defined
            buf.put_u16(*width);
            buf.put_u16(*height);
            buf.put_u32(0x00480000); // 72 dpi
            buf.put_u32(0x00480000);
            buf.put_u32(0); // reserved
            buf.put_u16(1); // frame count
            buf.put_slice(&[0; 32]); // compressor name
            buf.put_u16(0x0018); // depth
            buf.put_i16(-1); // pre_defined

            let avcc = begin_box(buf, b"avcC");
            buf.put_u8(1); // configuration version
            buf.put_u8(sps.get(1).copied().unwrap_or(0x42));
            buf.put_u8(sps.get(2).copied().unwrap_or(0));
            buf.put_u8(sps.get(3).copied().unwrap_or(0x1E));
            buf.put_u8(0xFF); // 4-byte NAL lengths
            buf.put_u8(0xE1); // one SPS
            buf.put_u16(sps.len() as u16);
            buf.put_slice(sps);
            buf.put_u8(1); // one PPS
            buf.put_u16(pps.len() as u16);
            buf.put_slice(pps);
            end_box(buf, avcc);

            end_box(buf, entry);
        }
        SampleEntrySpec::Aac {
            object_type,
            sample_rate,
            channels,
        } => {
            let entry = begin_box(buf, b"mp4a");
            write_audio_entry_fields(buf, *sample_rate, *channels);

            let asc = audio_specific_config(*object_type, *sample_rate, *channels);
            let avg_bitrate = average_bitrate(track);
            let esds = begin_box(buf, b"esds");
            write_full_box_header(buf, 0, 0);
            let dsi_len = 2 + asc.len();
            let dcd_len = 13 + dsi_len;
            buf.put_u8(0x03); // ES_Descriptor
            buf.put_u8((3 + 2 + dcd_len + 3) as u8);
            buf.put_u16(track.track_id as u16);
            buf.put_u8(0); // flags
            buf.put_u8(0x04); // DecoderConfigDescriptor
            buf.put_u8(dcd_len as u8);
            buf.put_u8(0x40); // MPEG-4 audio
            buf.put_u8(0x15); // audio stream
            buf.put_slice(&[0, 0, 0]); // buffer size
            buf.put_u32(avg_bitrate);
            buf.put_u32(avg_bitrate);
            buf.put_u8(0x05); // DecoderSpecificInfo
            buf.put_u8(asc.len() as u8);
            buf.put_slice(&asc);
            buf.put_u8(0x06); // SLConfigDescriptor
            buf.put_u8(1);
            buf.put_u8(0x02);
            end_box(buf, esds);

            end_box(buf, entry);
        }
        SampleEntrySpec::Mp3 {
            sample_rate,
            channels,
        } => {
            let entry = begin_box(buf, b".mp3");
            write_audio_entry_fields(buf, *sample_rate, *channels);
            end_box(buf, entry);
        }
        SampleEntrySpec::Opaque { format } => {
            let entry = begin_box(buf, format);
            buf.put_slice(&[0; 6]);
            buf.put_u16(1);
            end_box(buf, entry);
        }
    }

    end_box(buf, start);
}

fn write_audio_entry_fields(buf: &mut BytesMut, sample_rate: u32, channels: u16) {
    buf.put_slice(&[0; 6]); // reserved
    buf.put_u16(1); // data reference index
    buf.put_u64(0); // version, revision, vendor
    buf.put_u16(channels);
    buf.put_u16(16); // sample size
    buf.put_u16(0); // pre_defined
    buf.put_u16(0); // reserved
    buf.put_u32(sample_rate << 16);
}

fn audio_specific_config(object_type: u8, sample_rate: u32, channels: u16) -> Vec<u8> {
    let mut bits: u64 = 0;
    let mut len = 0u32;
    let mut push = |value: u64, width: u32| {
        bits = (bits << width) | value;
        len += width;
    };

    push(object_type as u64, 5);
    match AAC_SAMPLE_RATES.iter().position(|&r| r == sample_rate) {
        Some(index) => push(index as u64, 4),
        None => {
            push(15, 4);
            push(sample_rate as u64, 24);
        }
    }
    push(channels as u64, 4);
    push(0, 3); // GASpecificConfig flags

    let padding = (8 - len % 8) % 8;
    bits <<= padding;
    let total = ((len + padding) / 8) as usize;
    bits.to_be_bytes()[8 - total..].to_vec()
}

fn average_bitrate(track: &TrackSpec) -> u32 {
    let duration = track.duration();
    if duration == 0 {
        return 0;
    }
    let bytes: u64 = track.samples.iter().map(|s| s.data.len() as u64).sum();
    (bytes * 8 * track.timescale as u64 / duration) as u32
}

fn write_stts(buf: &mut BytesMut, track: &TrackSpec) {
    let entries = match &track.stts_override {
        Some(entries) => entries.clone(),
        None => {
            let mut entries: Vec<TimeToSampleEntry> = Vec::new();
            for sample in &track.samples {
                match entries.last_mut() {
                    Some(last) if last.sample_delta == sample.duration => last.sample_count += 1,
                    _ => entries.push(TimeToSampleEntry {
                        sample_count: 1,
                        sample_delta: sample.duration,
                    }),
                }
            }
            entries
        }
    };

    let start = begin_box(buf, b"stts");
    write_full_box_header(buf, 0, 0);
    buf.put_u32(entries.len() as u32);
    for entry in entries {
        buf.put_u32(entry.sample_count);
        buf.put_u32(entry.sample_delta);
    }
    end_box(buf, start);
}

fn write_ctts(buf: &mut BytesMut, track: &TrackSpec) {
    if track.samples.iter().all(|s| s.cts_offset == 0) {
        return;
    }
    let mut runs: Vec<(u32, i32)> = Vec::new();
    for sample in &track.samples {
        match runs.last_mut() {
            Some((count, offset)) if *offset == sample.cts_offset => *count += 1,
            _ => runs.push((1, sample.cts_offset)),
        }
    }

    let start = begin_box(buf, b"ctts");
    write_full_box_header(buf, 1, 0);
    buf.put_u32(runs.len() as u32);
    for (count, offset) in runs {
        buf.put_u32(count);
        buf.put_i32(offset);
    }
    end_box(buf, start);
}

fn write_stss(buf: &mut BytesMut, track: &TrackSpec) {
    if track.samples.iter().all(|s| s.sync) {
        return;
    }
    let numbers: Vec<u32> = track
        .samples
        .iter()
        .enumerate()
        .filter(|(_, s)| s.sync)
        .map(|(i, _)| i as u32 + 1)
        .collect();

    let start = begin_box(buf, b"stss");
    write_full_box_header(buf, 0, 0);
    buf.put_u32(numbers.len() as u32);
    for number in numbers {
        buf.put_u32(number);
    }
    end_box(buf, start);
}

fn write_stsc(buf: &mut BytesMut, track: &TrackSpec) {
    let mut entries: Vec<(u32, u32)> = Vec::new();
    for (i, chunk) in track.chunks().enumerate() {
        let count = chunk.len() as u32;
        if entries.last().map(|&(_, n)| n) != Some(count) {
            entries.push((i as u32 + 1, count));
        }
    }

    let start = begin_box(buf, b"stsc");
    write_full_box_header(buf, 0, 0);
    buf.put_u32(entries.len() as u32);
    for (first_chunk, samples_per_chunk) in entries {
        buf.put_u32(first_chunk);
        buf.put_u32(samples_per_chunk);
        buf.put_u32(1); // sample description index
    }
    end_box(buf, start);
}

fn write_stsz(buf: &mut BytesMut, track: &TrackSpec) {
    let start = begin_box(buf, b"stsz");
    write_full_box_header(buf, 0, 0);
    buf.put_u32(0); // per-sample sizes follow
    buf.put_u32(track.samples.len() as u32);
    for sample in &track.samples {
        buf.put_u32(sample.data.len() as u32);
    }
    end_box(buf, start);
}

fn write_chunk_offsets(buf: &mut BytesMut, offsets: &[u64], co64: bool) {
    if co64 {
        let start = begin_box(buf, b"co64");
        write_full_box_header(buf, 0, 0);
        buf.put_u32(offsets.len() as u32);
        for &offset in offsets {
            buf.put_u64(offset);
        }
        end_box(buf, start);
    } else {
        let start = begin_box(buf, b"stco");
        write_full_box_header(buf, 0, 0);
        buf.put_u32(offsets.len() as u32);
        for &offset in offsets {
            buf.put_u32(offset as u32);
        }
        end_box(buf, start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::{Codec, Container};
    use std::io::Cursor;

    #[test]
    fn test_audio_specific_config_bytes() {
        assert_eq!(audio_specific_config(2, 44_100, 2), vec![0x12, 0x10]);
        assert_eq!(audio_specific_config(2, 48_000, 1), vec![0x11, 0x88]);
    }

    #[test]
    fn test_moov_at_end_and_co64() {
        let data = Mp4Builder::new()
            .track(TrackSpec::h264(1, 25, 1, 50, 25))
            .moov_at_end(true)
            .co64(true)
            .build();
        let container = Container::parse(Cursor::new(data.clone())).unwrap();
        assert!(!container.has_faststart);

        let video = container.video_track().unwrap();
        let first = video.samples.get(0).unwrap();
        let start = first.offset as usize;
        // Length prefix then an IDR NAL header
        assert_eq!(&data[start..start + 5], &[0, 0, 1, 0xE1, 0x65]);
    }

    #[test]
    fn test_mp3_and_opaque_tracks() {
        let data = Mp4Builder::new()
            .track(TrackSpec::mp3(1, 44_100, 10))
            .track(TrackSpec::opaque(2, *b"vide", *b"vp09", 1000, 3))
            .build();
        let container = Container::parse(Cursor::new(data)).unwrap();
        assert_eq!(container.track(1).unwrap().codec, Codec::Mp3);
        assert_eq!(
            container.track(2).unwrap().codec,
            Codec::Other("vp09".to_string())
        );
    }

    #[test]
    fn test_padding_keeps_nal_length() {
        let track = TrackSpec::h264(1, 1000, 40, 2, 1).pad_samples(100);
        let sample = &track.samples[0].data;
        let nal_len = u32::from_be_bytes([sample[0], sample[1], sample[2], sample[3]]) as usize;
        assert_eq!(nal_len + 4, sample.len());
    }
}
