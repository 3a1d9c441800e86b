//! compression/types.rs
//! Codec registry enum, traits, and error types.

use std::fmt;

use num_enum::TryFromPrimitive;

use crate::constants::codec_ids;
use crate::utils::enum_name_or_hex;

/// Compression codec identifiers (chunk header registry).
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
pub enum CompressionCodec {
    Zstd    = codec_ids::ZSTD,
    Lz4     = codec_ids::LZ4,
    Deflate = codec_ids::DEFLATE,
}

impl CompressionCodec {
    pub fn verify(raw: u16) -> Result<(), CompressionError> {
        match raw {
            x if x == CompressionCodec::Zstd as u16    => Ok(()),
            x if x == CompressionCodec::Lz4 as u16     => Ok(()),
            x if x == CompressionCodec::Deflate as u16 => Ok(()),
            _ => Err(CompressionError::UnsupportedCodec { codec_id: raw }),
        }
    }
}

#[derive(Debug)]
pub enum CompressionError {
    UnsupportedCodec { codec_id: u16 },
    CodecInitFailed { codec: String, msg: String },
    CodecProcessFailed { codec: String, msg: String },
    ChecksumMismatch { codec: String, expected: u32, actual: u32 },
}

impl fmt::Display for CompressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use CompressionError::*;
        match self {
            UnsupportedCodec { codec_id } =>
                write!(f, "unsupported compression codec: {}",
                       enum_name_or_hex::<CompressionCodec>(*codec_id)),
            CodecInitFailed { codec, msg } =>
                write!(f, "codec {} init failed: {}", codec, msg),
            CodecProcessFailed { codec, msg } =>
                write!(f, "codec {} process failed: {}", codec, msg),
            ChecksumMismatch { codec, expected, actual } =>
                write!(f, "codec {} checksum mismatch: expected={:08x}, actual={:08x}",
                       codec, expected, actual),
        }
    }
}

impl std::error::Error for CompressionError {}

// Require Send so implementations can cross thread boundaries.
pub trait Compressor: Send {
    /// Compress a single chunk into the out buffer.
    fn compress_chunk(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CompressionError>;
}

pub trait Decompressor: Send {
    /// Decompress a single chunk into the out buffer.
    fn decompress_chunk(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CompressionError>;
}
