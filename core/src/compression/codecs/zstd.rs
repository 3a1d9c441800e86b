//! codecs/zstd.rs
//! Zstd block compressor/decompressor.
//!
//! Uses the zstd block API so every chunk is a standalone compressed
//! block decodable without shared state.

use crate::compression::types::{CompressionError, Compressor, Decompressor};
use crate::compression::{compute_checksum, verify_checksum};

pub struct ZstdCompressor {
    level: i32,
}

impl ZstdCompressor {
    pub fn new(level: i32) -> Result<Box<dyn Compressor + Send>, CompressionError> {
        // zstd accepts 1..=22; 0 selects the library default.
        if !(0..=22).contains(&level) {
            return Err(CompressionError::CodecInitFailed {
                codec: "zstd".into(),
                msg: format!("level {} out of range 0..=22", level),
            });
        }
        Ok(Box::new(Self { level }))
    }
}

impl Compressor for ZstdCompressor {
    fn compress_chunk(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CompressionError> {
        let compressed = zstd::bulk::compress(input, self.level)
            .map_err(|e| CompressionError::CodecProcessFailed {
                codec: "zstd".into(),
                msg: e.to_string(),
            })?;

        out.extend_from_slice(&(input.len() as u32).to_le_bytes());
        out.extend_from_slice(&compressed);
        out.extend_from_slice(&compute_checksum(input).to_le_bytes());

        Ok(())
    }
}

pub struct ZstdDecompressor;

impl ZstdDecompressor {
    pub fn new() -> Result<Box<dyn Decompressor + Send>, CompressionError> {
        Ok(Box::new(Self))
    }
}

impl Decompressor for ZstdDecompressor {
    fn decompress_chunk(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CompressionError> {
        if input.len() < 8 {
            return Err(CompressionError::CodecProcessFailed {
                codec: "zstd".into(),
                msg: "input too short for length+checksum".into(),
            });
        }

        let raw_len = u32::from_le_bytes(input[0..4].try_into().unwrap()) as usize;
        let compressed = &input[4..input.len() - 4];
        let expected_crc = u32::from_le_bytes(input[input.len() - 4..].try_into().unwrap());

        let decompressed = zstd::bulk::decompress(compressed, raw_len)
            .map_err(|e| CompressionError::CodecProcessFailed {
                codec: "zstd".into(),
                msg: e.to_string(),
            })?;

        if decompressed.len() != raw_len {
            return Err(CompressionError::CodecProcessFailed {
                codec: "zstd".into(),
                msg: format!("decoded size {} != prefix {}", decompressed.len(), raw_len),
            });
        }

        verify_checksum(expected_crc, compute_checksum(&decompressed), "zstd")?;

        out.extend_from_slice(&decompressed);
        Ok(())
    }
}
