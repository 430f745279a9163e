//! In-band silence-run tokens.
//!
//! A run of silent segments is collapsed into one fixed-size block whose
//! first 32 sample slots carry the run length in blocks, LSB first, as +1
//! (bit set) or -1 (bit clear); every remaining slot is 0. Downstream
//! tooling recognizes a token solely by this exact layout, so it must be
//! reproduced bit for bit. The token block is its own footprint: a decoded
//! count of `n` stands for `(n - 1) * BLOCK_SAMPLES` silent samples beyond
//! the block itself.

/// Token block size in bytes.
pub const BLOCK_SIZE_BYTES: usize = 512;

/// Token block capacity in samples.
pub const BLOCK_SAMPLES: usize = BLOCK_SIZE_BYTES / 2;

const COUNT_BITS: usize = 32;

/// Encode a run length (in blocks, including this one) into a token block.
pub fn encode_token(count: u32) -> [i16; BLOCK_SAMPLES] {
    let mut block = [0i16; BLOCK_SAMPLES];
    for bit in 0..COUNT_BITS {
        block[bit] = if count >> bit & 1 == 1 { 1 } else { -1 };
    }
    block
}

/// Decode a token block back to its run length.
///
/// Returns `None` unless the block carries the exact token layout; real
/// audio is vanishingly unlikely to hold 32 consecutive ±1 samples followed
/// by 224 zeroes, which is what makes the token safe in-band.
pub fn decode_token(block: &[i16]) -> Option<u32> {
    if block.len() != BLOCK_SAMPLES {
        return None;
    }

    let mut count = 0u32;
    for (bit, &sample) in block[..COUNT_BITS].iter().enumerate() {
        match sample {
            1 => count |= 1 << bit,
            -1 => {}
            _ => return None,
        }
    }

    if block[COUNT_BITS..].iter().any(|&sample| sample != 0) {
        return None;
    }

    Some(count)
}

/// Silent samples a decoded token stands for beyond its own block.
pub const fn silent_samples(count: u32) -> u64 {
    count.saturating_sub(1) as u64 * BLOCK_SAMPLES as u64
}
