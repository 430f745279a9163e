//! Segment buffer ring.
//!
//! Eight fixed-capacity sample buffers carved from one contiguous region,
//! filled by the interrupt-context producer and drained by the main-loop
//! consumer. Ownership alternates strictly producer → consumer → producer
//! per full pass: the producer advances only on full-buffer boundaries and
//! the consumer never touches the buffer currently being filled, so the
//! consumer always keeps at least one buffer of lead and no locking is
//! needed.

/// Number of segment buffers; power of two so the rotation is a mask.
pub const NUMBER_OF_SEGMENTS: usize = 8;

/// Samples per segment buffer; power of two so whole transfers divide it
/// evenly.
pub const SAMPLES_PER_SEGMENT: usize = 16_384;

/// The staging region between interrupt production and file-write
/// consumption. One instance lives in the device context for the whole
/// session; nothing here is allocated per recording.
pub struct SegmentRing {
    buffers: [[i16; SAMPLES_PER_SEGMENT]; NUMBER_OF_SEGMENTS],
    has_signal: [bool; NUMBER_OF_SEGMENTS],
    write_segment: usize,
    write_index: usize,
    /// Monotonic count of segments filled since the last reset.
    segments_produced: u32,
}

impl SegmentRing {
    pub const fn new() -> Self {
        Self {
            buffers: [[0; SAMPLES_PER_SEGMENT]; NUMBER_OF_SEGMENTS],
            has_signal: [false; NUMBER_OF_SEGMENTS],
            write_segment: 0,
            write_index: 0,
            segments_produced: 0,
        }
    }

    /// Reset cursors and markers for a new recording.
    pub fn reset(&mut self) {
        self.has_signal = [false; NUMBER_OF_SEGMENTS];
        self.write_segment = 0;
        self.write_index = 0;
        self.segments_produced = 0;
    }

    /// Producer side: append decimated samples at the write cursor,
    /// rotating to the next segment on each full-buffer boundary. Transfer
    /// sizes are powers of two, so a rotation only ever lands on an exact
    /// boundary.
    pub fn append(&mut self, samples: &[i16]) {
        for &sample in samples {
            self.buffers[self.write_segment][self.write_index] = sample;
            self.write_index += 1;
            if self.write_index == SAMPLES_PER_SEGMENT {
                self.write_index = 0;
                self.write_segment = (self.write_segment + 1) & (NUMBER_OF_SEGMENTS - 1);
                self.has_signal[self.write_segment] = false;
                self.segments_produced += 1;
            }
        }
    }

    /// Producer side: a threshold event ORs into the segment currently
    /// being filled.
    pub fn mark_signal(&mut self) {
        self.has_signal[self.write_segment] = true;
    }

    /// Number of completely filled segments since the last reset.
    pub fn segments_produced(&self) -> u32 {
        self.segments_produced
    }

    /// Consumer side: a completely filled segment by its monotonic index.
    /// Callers must stay behind [`Self::segments_produced`].
    pub fn filled_segment(&self, sequence: u32) -> (&[i16], bool) {
        let index = sequence as usize & (NUMBER_OF_SEGMENTS - 1);
        (&self.buffers[index][..], self.has_signal[index])
    }

    /// Consumer side: the partially filled tail of the segment currently
    /// being written, for the final drain after acquisition stops.
    pub fn partial_segment(&self) -> (&[i16], bool) {
        (
            &self.buffers[self.write_segment][..self.write_index],
            self.has_signal[self.write_segment],
        )
    }

    /// Consumer side: release a drained segment, resetting its marker.
    pub fn release(&mut self, sequence: u32) {
        self.has_signal[sequence as usize & (NUMBER_OF_SEGMENTS - 1)] = false;
    }
}

impl Default for SegmentRing {
    fn default() -> Self {
        Self::new()
    }
}
