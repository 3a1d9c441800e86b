pub mod deflate;
pub mod lz4;
pub mod zstd;
