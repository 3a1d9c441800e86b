//! compression/registry.rs
//! Codec registry and factory functions.

use crate::compression::codecs::{deflate, lz4, zstd};
use crate::compression::types::{CompressionCodec, CompressionError, Compressor, Decompressor};

pub struct CodecInfo {
    pub name: &'static str,
    pub default_level: i32,
}

pub fn resolve(codec: CompressionCodec) -> CodecInfo {
    match codec {
        CompressionCodec::Zstd =>
            CodecInfo { name: "zstd", default_level: 6 },
        CompressionCodec::Lz4 =>
            CodecInfo { name: "lz4", default_level: 0 },
        CompressionCodec::Deflate =>
            CodecInfo { name: "deflate", default_level: 6 },
    }
}

pub fn create_compressor(
    codec: CompressionCodec,
    level: Option<i32>,
) -> Result<Box<dyn Compressor + Send>, CompressionError> {
    let level = level.unwrap_or_else(|| resolve(codec).default_level);
    match codec {
        CompressionCodec::Zstd => zstd::ZstdCompressor::new(level),
        CompressionCodec::Lz4 => lz4::Lz4Compressor::new(level),
        CompressionCodec::Deflate => deflate::DeflateCompressor::new(level),
    }
}

pub fn create_decompressor(
    codec: CompressionCodec,
) -> Result<Box<dyn Decompressor + Send>, CompressionError> {
    match codec {
        CompressionCodec::Zstd => zstd::ZstdDecompressor::new(),
        CompressionCodec::Lz4 => lz4::Lz4Decompressor::new(),
        CompressionCodec::Deflate => deflate::DeflateDecompressor::new(),
    }
}
