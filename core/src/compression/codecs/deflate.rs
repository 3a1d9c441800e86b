//! codecs/deflate.rs
//! Deflate (zlib wrapper) via flate2; each chunk is its own zlib stream.

use std::io::{Read, Write};

use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};

use crate::compression::types::{CompressionError, Compressor, Decompressor};
use crate::compression::{compute_checksum, verify_checksum};

pub struct DeflateCompressor {
    level: Compression,
}

impl DeflateCompressor {
    pub fn new(level: i32) -> Result<Box<dyn Compressor + Send>, CompressionError> {
        let level = match level {
            0..=9 => Compression::new(level as u32),
            _ => Compression::default(),
        };
        Ok(Box::new(Self { level }))
    }
}

impl Compressor for DeflateCompressor {
    fn compress_chunk(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CompressionError> {
        let mut enc = ZlibEncoder::new(Vec::new(), self.level);
        enc.write_all(input)
            .map_err(|e| CompressionError::CodecProcessFailed {
                codec: "deflate".into(),
                msg: e.to_string(),
            })?;
        let compressed = enc.finish()
            .map_err(|e| CompressionError::CodecProcessFailed {
                codec: "deflate".into(),
                msg: e.to_string(),
            })?;

        out.extend_from_slice(&(input.len() as u32).to_le_bytes());
        out.extend_from_slice(&compressed);
        out.extend_from_slice(&compute_checksum(input).to_le_bytes());

        Ok(())
    }
}

pub struct DeflateDecompressor;

impl DeflateDecompressor {
    pub fn new() -> Result<Box<dyn Decompressor + Send>, CompressionError> {
        Ok(Box::new(Self))
    }
}

impl Decompressor for DeflateDecompressor {
    fn decompress_chunk(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CompressionError> {
        if input.len() < 8 {
            return Err(CompressionError::CodecProcessFailed {
                codec: "deflate".into(),
                msg: "input too short for length+checksum".into(),
            });
        }

        let raw_len = u32::from_le_bytes(input[0..4].try_into().unwrap()) as usize;
        let compressed = &input[4..input.len() - 4];
        let expected_crc = u32::from_le_bytes(input[input.len() - 4..].try_into().unwrap());

        let mut dec = ZlibDecoder::new(compressed);
        let mut decompressed = Vec::with_capacity(raw_len);
        dec.read_to_end(&mut decompressed)
            .map_err(|e| CompressionError::CodecProcessFailed {
                codec: "deflate".into(),
                msg: e.to_string(),
            })?;

        if decompressed.len() != raw_len {
            return Err(CompressionError::CodecProcessFailed {
                codec: "deflate".into(),
                msg: format!("decoded size {} != prefix {}", decompressed.len(), raw_len),
            });
        }

        verify_checksum(expected_crc, compute_checksum(&decompressed), "deflate")?;

        out.extend_from_slice(&decompressed);
        Ok(())
    }
}
