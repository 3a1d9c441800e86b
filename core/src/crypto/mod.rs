pub mod aad;
pub mod aead;
pub mod digest;
pub mod kdf;
pub mod nonce;
pub mod types;

pub use aad::*;
pub use aead::*;
pub use digest::{content_hash_32, hash_pair_32, ContentHash, DigestError, HashAlg};
pub use kdf::*;
pub use nonce::*;
pub use types::*;
