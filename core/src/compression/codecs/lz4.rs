//! codecs/lz4.rs
//! LZ4 block compressor/decompressor (lz4_flex, size-prepended blocks).

use lz4_flex::block::{compress_prepend_size, decompress_size_prepended};

use crate::compression::types::{CompressionError, Compressor, Decompressor};
use crate::compression::{compute_checksum, verify_checksum};

/// LZ4 block mode has no compression level; the argument is accepted for
/// registry uniformity and ignored.
pub struct Lz4Compressor;

impl Lz4Compressor {
    pub fn new(_level: i32) -> Result<Box<dyn Compressor + Send>, CompressionError> {
        Ok(Box::new(Self))
    }
}

impl Compressor for Lz4Compressor {
    fn compress_chunk(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CompressionError> {
        // lz4_flex prepends the raw length itself; keep the shared layout
        // by prefixing our own u32 as well so all codecs parse alike.
        let compressed = compress_prepend_size(input);

        out.extend_from_slice(&(input.len() as u32).to_le_bytes());
        out.extend_from_slice(&compressed);
        out.extend_from_slice(&compute_checksum(input).to_le_bytes());

        Ok(())
    }
}

pub struct Lz4Decompressor;

impl Lz4Decompressor {
    pub fn new() -> Result<Box<dyn Decompressor + Send>, CompressionError> {
        Ok(Box::new(Self))
    }
}

impl Decompressor for Lz4Decompressor {
    fn decompress_chunk(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CompressionError> {
        if input.len() < 8 {
            return Err(CompressionError::CodecProcessFailed {
                codec: "lz4".into(),
                msg: "input too short for length+checksum".into(),
            });
        }

        let raw_len = u32::from_le_bytes(input[0..4].try_into().unwrap()) as usize;
        let compressed = &input[4..input.len() - 4];
        let expected_crc = u32::from_le_bytes(input[input.len() - 4..].try_into().unwrap());

        let decompressed = decompress_size_prepended(compressed)
            .map_err(|e| CompressionError::CodecProcessFailed {
                codec: "lz4".into(),
                msg: e.to_string(),
            })?;

        if decompressed.len() != raw_len {
            return Err(CompressionError::CodecProcessFailed {
                codec: "lz4".into(),
                msg: format!("decoded size {} != prefix {}", decompressed.len(), raw_len),
            });
        }

        verify_checksum(expected_crc, compute_checksum(&decompressed), "lz4")?;

        out.extend_from_slice(&decompressed);
        Ok(())
    }
}
