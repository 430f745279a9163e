//! Decimation and threshold detection for raw sample transfers.

/// Largest raw transfer the hardware delivers in one interrupt.
pub const MAXIMUM_SAMPLES_IN_TRANSFER: usize = 1024;

/// Reduces each raw transfer to the effective sample rate by block
/// averaging, and reports whether any output sample crossed the configured
/// amplitude threshold.
#[derive(Debug, Clone, Copy)]
pub struct Decimator {
    divider: usize,
    threshold: i16,
}

impl Decimator {
    /// A threshold of 0 disables triggering: every transfer then reports a
    /// threshold event, so every segment is written in full.
    pub const fn new(sample_rate_divider: u8, amplitude_threshold: u16) -> Self {
        Self {
            divider: if sample_rate_divider == 0 {
                1
            } else {
                sample_rate_divider as usize
            },
            threshold: if amplitude_threshold > i16::MAX as u16 {
                i16::MAX
            } else {
                amplitude_threshold as i16
            },
        }
    }

    /// Samples one raw transfer decimates down to.
    pub fn output_len(&self, raw_len: usize) -> usize {
        raw_len / self.divider
    }

    /// Decimate one raw transfer into `out`, returning the number of output
    /// samples and whether the threshold was crossed.
    pub fn process(&self, raw: &[i16], out: &mut [i16]) -> (usize, bool) {
        debug_assert!(raw.len() / self.divider <= out.len());
        let mut produced = 0;
        let mut triggered = self.threshold == 0;

        for group in raw.chunks_exact(self.divider) {
            let sum: i32 = group.iter().map(|&s| s as i32).sum();
            let sample = rounded_div(sum, self.divider as i32) as i16;
            out[produced] = sample;
            produced += 1;
            if self.threshold > 0 && (sample as i32).abs() >= self.threshold as i32 {
                triggered = true;
            }
        }

        (produced, triggered)
    }
}

fn rounded_div(value: i32, divisor: i32) -> i32 {
    if value >= 0 {
        (value + divisor / 2) / divisor
    } else {
        (value - divisor / 2) / divisor
    }
}
