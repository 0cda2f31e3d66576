//! MP4 sample table resolution.
//!
//! Sample tables describe how samples (frames) are organized in the file:
//! - stts: sample durations (decoding time)
//! - stss: sync sample table (keyframes)
//! - stsc: sample-to-chunk mapping
//! - stsz: sample sizes
//! - stco/co64: chunk offsets
//! - ctts: composition time offsets (for B-frames)
//!
//! The run-length tables are expanded into flat arrays indexed by sample
//! number, so every lookup after parsing is O(1) or a binary search.

use super::boxes::{CompositionOffsetEntry, SampleSizes, SampleToChunkEntry, TimeToSampleEntry};
use crate::{Error, Result};
use std::ops::Range;

/// A resolved sample with all information needed for muxing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleEntry {
    /// Sample index (0-based).
    pub index: usize,
    /// File offset where sample data starts.
    pub offset: u64,
    /// Sample size in bytes.
    pub size: u32,
    /// Sample duration in media timescale.
    pub duration: u32,
    /// Decode timestamp in media timescale.
    pub dts: u64,
    /// Composition time offset (for PTS calculation).
    pub cts_offset: i32,
    /// Whether this sample is a keyframe (sync sample).
    pub is_keyframe: bool,
}

impl SampleEntry {
    /// Get the presentation timestamp.
    pub fn pts(&self) -> u64 {
        (self.dts as i64 + self.cts_offset as i64).max(0) as u64
    }
}

/// Per-sample arrays of one track, all of the same length.
#[derive(Debug, Clone, Default)]
pub struct SampleTable {
    offsets: Vec<u64>,
    sizes: Vec<u32>,
    durations: Vec<u32>,
    sync: Vec<bool>,
    cts_offsets: Vec<i32>,
    /// Prefix sums of `durations`; one longer than the other arrays.
    decode_times: Vec<u64>,
    /// Indices of sync samples, ascending.
    sync_indices: Vec<usize>,
}

impl SampleTable {
    /// Create a new sample table builder.
    pub fn builder() -> SampleTableBuilder {
        SampleTableBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn sizes(&self) -> &[u32] {
        &self.sizes
    }

    pub fn durations(&self) -> &[u32] {
        &self.durations
    }

    pub fn sync_flags(&self) -> &[bool] {
        &self.sync
    }

    /// Indices of sync samples, ascending.
    pub fn sync_indices(&self) -> &[usize] {
        &self.sync_indices
    }

    /// Get sample by index.
    pub fn get(&self, index: usize) -> Option<SampleEntry> {
        if index >= self.len() {
            return None;
        }
        Some(SampleEntry {
            index,
            offset: self.offsets[index],
            size: self.sizes[index],
            duration: self.durations[index],
            dts: self.decode_times[index],
            cts_offset: self.cts_offsets[index],
            is_keyframe: self.sync[index],
        })
    }

    /// Iterate over the samples in `range`.
    pub fn iter_range(&self, range: Range<usize>) -> impl Iterator<Item = SampleEntry> + '_ {
        range.filter_map(move |i| self.get(i))
    }

    /// Iterate over all samples.
    pub fn iter(&self) -> impl Iterator<Item = SampleEntry> + '_ {
        self.iter_range(0..self.len())
    }

    /// Decode time of sample `index`; `index == len()` gives the total duration.
    pub fn decode_time(&self, index: usize) -> u64 {
        self.decode_times
            .get(index)
            .copied()
            .unwrap_or_else(|| self.total_duration())
    }

    /// Sum of all sample durations.
    pub fn total_duration(&self) -> u64 {
        self.decode_times.last().copied().unwrap_or(0)
    }

    /// Sum of all sample sizes.
    pub fn total_bytes(&self) -> u64 {
        self.sizes.iter().map(|&s| s as u64).sum()
    }

    /// Sum of the sample sizes in `range`.
    pub fn range_bytes(&self, range: Range<usize>) -> u64 {
        self.sizes
            .get(range)
            .map(|sizes| sizes.iter().map(|&s| s as u64).sum())
            .unwrap_or(0)
    }

    /// Index of the first sample whose decode time is at or after `time`.
    /// Returns `len()` when there is none.
    pub fn first_at_or_after(&self, time: u64) -> usize {
        self.decode_times[..self.len()].partition_point(|&dts| dts < time)
    }

    /// Last sync sample whose decode time is at or before `time`.
    pub fn sync_at_or_before(&self, time: u64) -> Option<usize> {
        let n = self
            .sync_indices
            .partition_point(|&i| self.decode_times[i] <= time);
        n.checked_sub(1).map(|k| self.sync_indices[k])
    }

    /// First sync sample whose decode time is at or after `time`.
    pub fn sync_at_or_after(&self, time: u64) -> Option<usize> {
        let n = self
            .sync_indices
            .partition_point(|&i| self.decode_times[i] < time);
        self.sync_indices.get(n).copied()
    }

    /// Find the keyframe at or before the given sample index.
    pub fn find_keyframe_at_or_before(&self, index: usize) -> Option<usize> {
        let n = self.sync_indices.partition_point(|&i| i <= index);
        n.checked_sub(1).map(|k| self.sync_indices[k])
    }
}

/// Builder for constructing a sample table from decoded box payloads.
#[derive(Debug, Default)]
pub struct SampleTableBuilder {
    stts_entries: Option<Vec<TimeToSampleEntry>>,
    sync_samples: Option<Vec<u32>>,
    stsc_entries: Option<Vec<SampleToChunkEntry>>,
    sample_sizes: Option<SampleSizes>,
    chunk_offsets: Option<Vec<u64>>,
    ctts_entries: Vec<CompositionOffsetEntry>,
    source_size: Option<u64>,
}

impl SampleTableBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set stts (decoding time to sample) entries.
    pub fn set_stts(&mut self, entries: Vec<TimeToSampleEntry>) {
        self.stts_entries = Some(entries);
    }

    /// Set stss (sync sample) entries.
    pub fn set_sync_samples(&mut self, samples: Vec<u32>) {
        self.sync_samples = Some(samples);
    }

    /// Set stsc (sample to chunk) entries.
    pub fn set_stsc(&mut self, entries: Vec<SampleToChunkEntry>) {
        self.stsc_entries = Some(entries);
    }

    /// Set stsz (sample size) data.
    pub fn set_stsz(&mut self, sizes: SampleSizes) {
        self.sample_sizes = Some(sizes);
    }

    /// Set chunk offsets (from stco or co64).
    pub fn set_chunk_offsets(&mut self, offsets: Vec<u64>) {
        self.chunk_offsets = Some(offsets);
    }

    /// Set ctts (composition time to sample) entries.
    pub fn set_ctts(&mut self, entries: Vec<CompositionOffsetEntry>) {
        self.ctts_entries = entries;
    }

    /// Length of the source; no table may declare more samples than it has bytes.
    pub fn set_source_size(&mut self, size: u64) {
        self.source_size = Some(size);
    }

    /// Cross-check the tables, then expand them.
    ///
    /// Counts are compared before anything is expanded, so a run-length
    /// table claiming billions of samples fails instead of allocating.
    pub fn build(self) -> Result<SampleTable> {
        let stts = self.stts_entries.ok_or_else(|| Error::malformed("missing stts"))?;
        let stsc = self.stsc_entries.ok_or_else(|| Error::malformed("missing stsc"))?;
        let stsz = self.sample_sizes.ok_or_else(|| Error::malformed("missing stsz"))?;
        let chunk_offsets = self
            .chunk_offsets
            .ok_or_else(|| Error::malformed("missing stco/co64"))?;

        let declared = if stsz.uniform_size != 0 {
            stsz.sample_count as u64
        } else {
            stsz.sizes.len() as u64
        };

        let stts_total: u64 = stts.iter().map(|e| e.sample_count as u64).sum();
        let chunk_samples = resolve_chunk_samples(&stsc, chunk_offsets.len())?;
        let stsc_total: u64 = chunk_samples.iter().map(|&n| n as u64).sum();

        if stts_total != stsc_total {
            return Err(Error::malformed(format!(
                "stts covers {} samples but stsc maps {}",
                stts_total, stsc_total
            )));
        }
        if stsc_total != declared {
            return Err(Error::malformed(format!(
                "stsc maps {} samples but stsz lists {}",
                stsc_total, declared
            )));
        }
        if let Some(limit) = self.source_size {
            if declared > limit {
                return Err(Error::malformed(format!(
                    "stsz declares {} samples, more than the {} byte source can hold",
                    declared, limit
                )));
            }
        }

        let sizes = stsz.expand();
        let sample_count = sizes.len();

        let offsets = resolve_offsets(&chunk_offsets, &chunk_samples, &sizes)?;

        let mut durations = Vec::with_capacity(sample_count);
        for entry in &stts {
            durations.extend(std::iter::repeat(entry.sample_delta).take(entry.sample_count as usize));
        }

        let mut decode_times = Vec::with_capacity(sample_count + 1);
        let mut dts = 0u64;
        decode_times.push(0);
        for &duration in &durations {
            dts += duration as u64;
            decode_times.push(dts);
        }

        let sync = match self.sync_samples {
            None => vec![true; sample_count],
            Some(numbers) => {
                let mut sync = vec![false; sample_count];
                for number in numbers {
                    if number == 0 || number as usize > sample_count {
                        return Err(Error::malformed(format!(
                            "stss references sample {} of {}",
                            number, sample_count
                        )));
                    }
                    sync[number as usize - 1] = true;
                }
                sync
            }
        };
        let sync_indices = sync
            .iter()
            .enumerate()
            .filter_map(|(i, &s)| s.then_some(i))
            .collect();

        let cts_offsets = resolve_cts_offsets(&self.ctts_entries, sample_count);

        Ok(SampleTable {
            offsets,
            sizes,
            durations,
            sync,
            cts_offsets,
            decode_times,
            sync_indices,
        })
    }
}

/// Samples in each chunk, expanded from the stsc runs.
fn resolve_chunk_samples(stsc: &[SampleToChunkEntry], chunk_count: usize) -> Result<Vec<u32>> {
    if chunk_count == 0 {
        return Ok(Vec::new());
    }
    if stsc.is_empty() {
        return Err(Error::malformed("stsc is empty but chunks exist"));
    }
    if stsc[0].first_chunk != 1 {
        return Err(Error::malformed(format!(
            "stsc starts at chunk {} instead of 1",
            stsc[0].first_chunk
        )));
    }

    let mut per_chunk = Vec::with_capacity(chunk_count);
    for (i, entry) in stsc.iter().enumerate() {
        let first = entry.first_chunk as usize;
        let next = match stsc.get(i + 1) {
            Some(next) if next.first_chunk <= entry.first_chunk => {
                return Err(Error::malformed(format!(
                    "stsc first_chunk {} does not increase after {}",
                    next.first_chunk, entry.first_chunk
                )));
            }
            Some(next) => next.first_chunk as usize,
            None => chunk_count + 1,
        };
        if first > chunk_count {
            return Err(Error::malformed(format!(
                "stsc references chunk {} of {}",
                first, chunk_count
            )));
        }
        let last = next.min(chunk_count + 1);
        per_chunk.extend(std::iter::repeat(entry.samples_per_chunk).take(last - first));
    }
    Ok(per_chunk)
}

/// Absolute file offset of every sample.
fn resolve_offsets(chunk_offsets: &[u64], chunk_samples: &[u32], sizes: &[u32]) -> Result<Vec<u64>> {
    let mut offsets = Vec::with_capacity(sizes.len());
    let mut sample = 0usize;
    let mut previous_end = 0u64;

    for (&chunk_offset, &count) in chunk_offsets.iter().zip(chunk_samples) {
        let mut offset = chunk_offset;
        if offset < previous_end {
            return Err(Error::malformed(format!(
                "chunk at offset {} overlaps preceding data ending at {}",
                offset, previous_end
            )));
        }
        for _ in 0..count {
            offsets.push(offset);
            offset = offset
                .checked_add(sizes[sample] as u64)
                .ok_or_else(|| Error::malformed("sample offset overflows"))?;
            sample += 1;
        }
        previous_end = offset;
    }

    Ok(offsets)
}

fn resolve_cts_offsets(entries: &[CompositionOffsetEntry], sample_count: usize) -> Vec<i32> {
    let mut offsets: Vec<i32> = entries
        .iter()
        .flat_map(|e| std::iter::repeat(e.offset).take(e.sample_count as usize))
        .take(sample_count)
        .collect();
    // Short ctts tables are padded with zero offsets
    offsets.resize(sample_count, 0);
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn stts(count: u32, delta: u32) -> TimeToSampleEntry {
        TimeToSampleEntry {
            sample_count: count,
            sample_delta: delta,
        }
    }

    fn stsc(first_chunk: u32, samples_per_chunk: u32) -> SampleToChunkEntry {
        SampleToChunkEntry {
            first_chunk,
            samples_per_chunk,
            sample_description_index: 1,
        }
    }

    fn sizes(sizes: Vec<u32>) -> SampleSizes {
        SampleSizes {
            uniform_size: 0,
            sample_count: sizes.len() as u32,
            sizes,
        }
    }

    fn uniform(size: u32, count: u32) -> SampleSizes {
        SampleSizes {
            uniform_size: size,
            sample_count: count,
            sizes: Vec::new(),
        }
    }

    #[test]
    fn test_sample_entry_pts() {
        let sample = SampleEntry {
            index: 0,
            offset: 100,
            size: 1000,
            duration: 1000,
            dts: 1000,
            cts_offset: 500,
            is_keyframe: true,
        };
        assert_eq!(sample.pts(), 1500);

        let sample_negative = SampleEntry {
            dts: 100,
            cts_offset: -200,
            ..sample
        };
        assert_eq!(sample_negative.pts(), 0); // Clamped to 0
    }

    #[test]
    fn test_sample_table_builder() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![stts(3, 1000)]);
        builder.set_sync_samples(vec![1]);
        builder.set_stsc(vec![stsc(1, 3)]);
        builder.set_stsz(sizes(vec![100, 200, 150]));
        builder.set_chunk_offsets(vec![1000]);

        let table = builder.build().unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.offsets(), &[1000, 1100, 1300]);
        assert_eq!(table.durations(), &[1000, 1000, 1000]);
        assert_eq!(table.sync_flags(), &[true, false, false]);
        assert_eq!(table.total_duration(), 3000);
        assert_eq!(table.total_bytes(), 450);

        let second = table.get(1).unwrap();
        assert_eq!(second.dts, 1000);
        assert_eq!(second.size, 200);
        assert!(!second.is_keyframe);
        assert!(table.get(3).is_none());
    }

    #[test]
    fn test_chunk_runs_expand() {
        // chunks 1-2 hold 2 samples, chunk 3 holds 1
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![stts(5, 512)]);
        builder.set_stsc(vec![stsc(1, 2), stsc(3, 1)]);
        builder.set_stsz(uniform(10, 5));
        builder.set_chunk_offsets(vec![100, 500, 900]);

        let table = builder.build().unwrap();
        assert_eq!(table.offsets(), &[100, 110, 500, 510, 900]);
        // No stss means every sample is a sync sample
        assert_eq!(table.sync_indices(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_inconsistent_counts_are_rejected() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![stts(4, 1000)]);
        builder.set_stsc(vec![stsc(1, 3)]);
        builder.set_stsz(uniform(10, 3));
        builder.set_chunk_offsets(vec![0]);

        assert_matches!(builder.build(), Err(Error::MalformedContainer(msg)) if msg.contains("stts"));
    }

    #[test]
    fn test_oversized_uniform_stsz_is_rejected_before_expanding() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![stts(3, 1000)]);
        builder.set_stsc(vec![stsc(1, 3)]);
        builder.set_stsz(uniform(1, u32::MAX));
        builder.set_chunk_offsets(vec![0]);

        assert_matches!(builder.build(), Err(Error::MalformedContainer(msg)) if msg.contains("stsz"));
    }

    #[test]
    fn test_sample_count_beyond_source_is_rejected() {
        // Consistent tables, but more samples than the source has bytes
        let table = |source_size: u64| {
            let mut builder = SampleTableBuilder::new();
            builder.set_stts(vec![stts(u32::MAX, 1)]);
            builder.set_stsc(vec![stsc(1, u32::MAX)]);
            builder.set_stsz(uniform(1, u32::MAX));
            builder.set_chunk_offsets(vec![0]);
            builder.set_source_size(source_size);
            builder.build()
        };

        assert_matches!(table(4096), Err(Error::MalformedContainer(msg)) if msg.contains("4096 byte source"));
    }

    #[test]
    fn test_source_size_allows_samples_past_end() {
        // Sample bytes past the end are a read failure at mux time, not here
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![stts(4, 1000)]);
        builder.set_stsc(vec![stsc(1, 4)]);
        builder.set_stsz(uniform(100, 4));
        builder.set_chunk_offsets(vec![0]);
        builder.set_source_size(50);

        let table = builder.build().unwrap();
        assert_eq!(table.total_bytes(), 400);
    }

    #[test]
    fn test_range_bytes() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![stts(3, 1000)]);
        builder.set_stsc(vec![stsc(1, 3)]);
        builder.set_stsz(sizes(vec![100, 200, 150]));
        builder.set_chunk_offsets(vec![0]);

        let table = builder.build().unwrap();
        assert_eq!(table.range_bytes(1..3), 350);
        assert_eq!(table.range_bytes(0..0), 0);
        assert_eq!(table.range_bytes(2..9), 0);
    }

    #[test]
    fn test_missing_table_is_rejected() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![stts(1, 1000)]);
        builder.set_stsc(vec![stsc(1, 1)]);
        builder.set_chunk_offsets(vec![0]);

        assert_matches!(builder.build(), Err(Error::MalformedContainer(msg)) if msg.contains("stsz"));
    }

    #[test]
    fn test_bad_sync_sample_number_is_rejected() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![stts(2, 1000)]);
        builder.set_stsc(vec![stsc(1, 2)]);
        builder.set_stsz(uniform(10, 2));
        builder.set_chunk_offsets(vec![0]);
        builder.set_sync_samples(vec![3]);

        assert_matches!(builder.build(), Err(Error::MalformedContainer(_)));
    }

    #[test]
    fn test_overlapping_chunks_are_rejected() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![stts(2, 1000)]);
        builder.set_stsc(vec![stsc(1, 1)]);
        builder.set_stsz(uniform(100, 2));
        builder.set_chunk_offsets(vec![1000, 1050]);

        assert_matches!(builder.build(), Err(Error::MalformedContainer(_)));
    }

    #[test]
    fn test_keyframe_search() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![stts(10, 1000)]);
        builder.set_sync_samples(vec![1, 5, 9]); // Keyframes at 0, 4, 8 (0-indexed)
        builder.set_stsc(vec![stsc(1, 10)]);
        builder.set_stsz(uniform(100, 10));
        builder.set_chunk_offsets(vec![0]);

        let table = builder.build().unwrap();

        assert_eq!(table.find_keyframe_at_or_before(0), Some(0));
        assert_eq!(table.find_keyframe_at_or_before(3), Some(0));
        assert_eq!(table.find_keyframe_at_or_before(4), Some(4));
        assert_eq!(table.find_keyframe_at_or_before(9), Some(8));

        assert_eq!(table.sync_at_or_before(3999), Some(0));
        assert_eq!(table.sync_at_or_before(4000), Some(4));
        assert_eq!(table.sync_at_or_after(4001), Some(8));
        assert_eq!(table.sync_at_or_after(8001), None);
        assert_eq!(table.first_at_or_after(2500), 3);
        assert_eq!(table.first_at_or_after(10_000), 10);
        assert_eq!(table.decode_time(10), 10_000);
    }

    #[test]
    fn test_short_ctts_is_padded() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![stts(3, 1000)]);
        builder.set_stsc(vec![stsc(1, 3)]);
        builder.set_stsz(uniform(1, 3));
        builder.set_chunk_offsets(vec![0]);
        builder.set_ctts(vec![CompositionOffsetEntry {
            sample_count: 1,
            offset: 2000,
        }]);

        let table = builder.build().unwrap();
        assert_eq!(table.get(0).unwrap().pts(), 2000);
        assert_eq!(table.get(2).unwrap().pts(), 2000);
    }

    #[test]
    fn test_empty_track() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(Vec::new());
        builder.set_stsc(Vec::new());
        builder.set_stsz(uniform(0, 0));
        builder.set_chunk_offsets(Vec::new());

        let table = builder.build().unwrap();
        assert!(table.is_empty());
        assert_eq!(table.total_duration(), 0);
        assert_eq!(table.sync_at_or_before(0), None);
    }
}
