//! Interrupt-fed acquisition and compression pipeline.
//!
//! The producer side ([`SamplePipeline::handle_transfer`]) runs once per
//! transfer-complete interrupt: it decimates the just-completed raw buffer
//! into the segment ring, suppressing output until the transfers-to-wait
//! alignment point is passed. The consumer side ([`SegmentWriter`]) runs in
//! the recording executor's loop and drains filled segments to storage,
//! collapsing runs of silent segments into in-band tokens.

pub mod decimator;
pub mod ring;
pub mod silence;

use log::warn;

pub use decimator::{Decimator, MAXIMUM_SAMPLES_IN_TRANSFER};
pub use ring::{NUMBER_OF_SEGMENTS, SAMPLES_PER_SEGMENT, SegmentRing};
pub use silence::{BLOCK_SAMPLES, BLOCK_SIZE_BYTES};

use crate::hal::{Storage, StorageError};

/// Producer-side state: the segment ring plus per-recording transfer
/// accounting. One instance lives in the device context; `begin` rearms it
/// for each recording.
pub struct SamplePipeline {
    ring: SegmentRing,
    decimator: Decimator,
    scratch: [i16; MAXIMUM_SAMPLES_IN_TRANSFER],
    transfers_seen: u32,
    transfers_to_wait: u32,
    samples_acquired: u64,
    segments_consumed: u32,
}

impl SamplePipeline {
    pub const fn new() -> Self {
        Self {
            ring: SegmentRing::new(),
            decimator: Decimator::new(1, 0),
            scratch: [0; MAXIMUM_SAMPLES_IN_TRANSFER],
            transfers_seen: 0,
            transfers_to_wait: 0,
            samples_acquired: 0,
            segments_consumed: 0,
        }
    }

    /// Rearm for a new recording. `transfers_to_wait` aligns the first kept
    /// sample to the effective start time at sub-transfer granularity.
    pub fn begin(&mut self, decimator: Decimator, transfers_to_wait: u32) {
        self.ring.reset();
        self.decimator = decimator;
        self.transfers_seen = 0;
        self.transfers_to_wait = transfers_to_wait;
        self.samples_acquired = 0;
        self.segments_consumed = 0;
    }

    /// Producer step, one call per completed transfer.
    ///
    /// Transfers within the alignment window are counted but their samples
    /// discarded. Past it, decimated samples land at the ring's write
    /// cursor and threshold events mark the segment being filled.
    pub fn handle_transfer(&mut self, raw: &[i16]) {
        self.transfers_seen += 1;
        if self.transfers_seen <= self.transfers_to_wait {
            return;
        }

        if self.ring.segments_produced() - self.segments_consumed >= NUMBER_OF_SEGMENTS as u32 {
            // The consumer lost its lead; the oldest unconsumed segment is
            // about to be overwritten, exactly as on the real hardware when
            // the card cannot keep up.
            warn!("segment ring overrun");
        }

        let (produced, triggered) = self.decimator.process(raw, &mut self.scratch);
        if triggered {
            self.ring.mark_signal();
        }
        self.ring.append(&self.scratch[..produced]);
        self.samples_acquired += produced as u64;
    }

    /// Decimated samples kept since `begin`.
    pub fn samples_acquired(&self) -> u64 {
        self.samples_acquired
    }

    /// Sequence number of the next filled-but-undrained segment, if one is
    /// ready. The segment currently being filled is never offered.
    pub fn next_filled(&self) -> Option<u32> {
        (self.segments_consumed < self.ring.segments_produced()).then_some(self.segments_consumed)
    }

    /// Consumer side: the filled segment for a sequence from `next_filled`.
    pub fn filled_segment(&self, sequence: u32) -> (&[i16], bool) {
        self.ring.filled_segment(sequence)
    }

    /// Consumer side: the partial tail left after acquisition stops.
    pub fn partial_segment(&self) -> (&[i16], bool) {
        self.ring.partial_segment()
    }

    /// Consumer side: release a drained segment back to the producer.
    pub fn release(&mut self, sequence: u32) {
        self.ring.release(sequence);
        self.segments_consumed = self.segments_consumed.max(sequence + 1);
    }
}

impl Default for SamplePipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer-side write policy: raw segments, blank blocks and silence-run
/// tokens, with byte and represented-sample accounting for the WAV header.
pub struct SegmentWriter {
    /// Pending silence run, in token blocks.
    pending_blocks: u32,
    segments_processed: u32,
    bytes_written: u32,
    samples_represented: u64,
}

impl SegmentWriter {
    pub const fn new() -> Self {
        Self {
            pending_blocks: 0,
            segments_processed: 0,
            bytes_written: 0,
            samples_represented: 0,
        }
    }

    /// Drain one segment.
    ///
    /// A full-sized segment with a clear marker joins the pending silence
    /// run — unless it is the very first segment, which is always written
    /// so the file never opens with a token. Anything else first flushes
    /// the pending run, then goes out as raw samples (marker set) or as a
    /// blank block (marker clear).
    pub fn drain<S: Storage>(
        &mut self,
        storage: &mut S,
        samples: &[i16],
        has_signal: bool,
        full_segment: bool,
    ) -> Result<(), StorageError> {
        if !has_signal && full_segment && self.segments_processed > 0 {
            self.pending_blocks += (samples.len() / BLOCK_SAMPLES) as u32;
            self.samples_represented += samples.len() as u64;
        } else {
            self.flush_run(storage)?;
            if has_signal {
                self.write_samples(storage, samples)?;
            } else {
                self.write_blank(storage, samples.len())?;
            }
            self.samples_represented += samples.len() as u64;
        }

        self.segments_processed += 1;
        Ok(())
    }

    /// Flush the pending silence run as one encoded token block.
    pub fn flush_run<S: Storage>(&mut self, storage: &mut S) -> Result<(), StorageError> {
        if self.pending_blocks == 0 {
            return Ok(());
        }

        let token = silence::encode_token(self.pending_blocks);
        self.pending_blocks = 0;
        self.write_samples(storage, &token)
    }

    /// Bytes actually written to the file (tokens included, suppressed
    /// silence excluded); this is what the WAV data chunk will carry.
    pub fn bytes_written(&self) -> u32 {
        self.bytes_written
    }

    /// Samples the file stands for once tokens are expanded.
    pub fn samples_represented(&self) -> u64 {
        self.samples_represented
    }

    fn write_samples<S: Storage>(
        &mut self,
        storage: &mut S,
        samples: &[i16],
    ) -> Result<(), StorageError> {
        let mut buffer = [0u8; BLOCK_SIZE_BYTES];
        for chunk in samples.chunks(BLOCK_SAMPLES) {
            for (i, &sample) in chunk.iter().enumerate() {
                buffer[2 * i..2 * i + 2].copy_from_slice(&sample.to_le_bytes());
            }
            storage.write(&buffer[..chunk.len() * 2])?;
            self.bytes_written += chunk.len() as u32 * 2;
        }
        Ok(())
    }

    fn write_blank<S: Storage>(
        &mut self,
        storage: &mut S,
        sample_count: usize,
    ) -> Result<(), StorageError> {
        let buffer = [0u8; BLOCK_SIZE_BYTES];
        let mut remaining = sample_count * 2;
        while remaining > 0 {
            let chunk = remaining.min(BLOCK_SIZE_BYTES);
            storage.write(&buffer[..chunk])?;
            self.bytes_written += chunk as u32;
            remaining -= chunk;
        }
        Ok(())
    }
}

impl Default for SegmentWriter {
    fn default() -> Self {
        Self::new()
    }
}
