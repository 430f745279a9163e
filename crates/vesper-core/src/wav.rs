//! WAV container header.
//!
//! The header is a fixed 488-byte prefix: RIFF/fmt chunks, a LIST/INFO
//! chunk holding the comment and artist fields at fixed offsets, then the
//! data chunk header. A placeholder is written when the file opens and the
//! finalized header is seeked back over it once the sample count is known,
//! so every field lives at a constant offset.

use heapless::String;

/// Capacity of the ICMT comment field, padding included.
pub const COMMENT_LENGTH: usize = 384;

/// Capacity of the IART artist field, padding included.
pub const ARTIST_LENGTH: usize = 32;

/// Total header size preceding the sample data.
pub const HEADER_LENGTH: usize = 488;

/// Hard ceiling on file size; recordings are truncated to fit under it.
pub const MAXIMUM_WAV_FILE_SIZE: u32 = u32::MAX;

const LIST_CHUNK_SIZE: u32 = 4 + 8 + COMMENT_LENGTH as u32 + 8 + ARTIST_LENGTH as u32;

/// Header fields that vary per recording. Everything else is fixed by the
/// format: mono, 16-bit PCM.
#[derive(Debug, Clone, Default)]
pub struct WavHeader {
    sample_rate: u32,
    data_bytes: u32,
    comment: String<COMMENT_LENGTH>,
    artist: String<ARTIST_LENGTH>,
}

impl WavHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the final sample rate and data size before the header rewrite.
    pub fn set_details(&mut self, sample_rate: u32, number_of_samples: u32) {
        self.sample_rate = sample_rate;
        self.data_bytes = number_of_samples.saturating_mul(2);
    }

    /// Set the ICMT comment; truncated to the field capacity.
    pub fn set_comment(&mut self, comment: &str) {
        self.comment.clear();
        for c in comment.chars() {
            if self.comment.push(c).is_err() {
                break;
            }
        }
    }

    /// Set the IART artist; truncated to the field capacity.
    pub fn set_artist(&mut self, artist: &str) {
        self.artist.clear();
        for c in artist.chars() {
            if self.artist.push(c).is_err() {
                break;
            }
        }
    }

    /// Serialize the full fixed-layout header.
    pub fn to_bytes(&self) -> [u8; HEADER_LENGTH] {
        let mut bytes = [0u8; HEADER_LENGTH];
        let riff_size = self.data_bytes.saturating_add(HEADER_LENGTH as u32 - 8);

        bytes[0..4].copy_from_slice(b"RIFF");
        bytes[4..8].copy_from_slice(&riff_size.to_le_bytes());
        bytes[8..12].copy_from_slice(b"WAVE");

        bytes[12..16].copy_from_slice(b"fmt ");
        bytes[16..20].copy_from_slice(&16u32.to_le_bytes());
        bytes[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
        bytes[22..24].copy_from_slice(&1u16.to_le_bytes()); // mono
        bytes[24..28].copy_from_slice(&self.sample_rate.to_le_bytes());
        bytes[28..32].copy_from_slice(&(self.sample_rate * 2).to_le_bytes());
        bytes[32..34].copy_from_slice(&2u16.to_le_bytes());
        bytes[34..36].copy_from_slice(&16u16.to_le_bytes());

        bytes[36..40].copy_from_slice(b"LIST");
        bytes[40..44].copy_from_slice(&LIST_CHUNK_SIZE.to_le_bytes());
        bytes[44..48].copy_from_slice(b"INFO");

        bytes[48..52].copy_from_slice(b"ICMT");
        bytes[52..56].copy_from_slice(&(COMMENT_LENGTH as u32).to_le_bytes());
        bytes[56..56 + self.comment.len()].copy_from_slice(self.comment.as_bytes());

        bytes[440..444].copy_from_slice(b"IART");
        bytes[444..448].copy_from_slice(&(ARTIST_LENGTH as u32).to_le_bytes());
        bytes[448..448 + self.artist.len()].copy_from_slice(self.artist.as_bytes());

        bytes[480..484].copy_from_slice(b"data");
        bytes[484..488].copy_from_slice(&self.data_bytes.to_le_bytes());

        bytes
    }
}
