//! Test data: markdown documents and their digests.

use sha2::{Digest, Sha256};
use uuid::Uuid;

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// A markdown document of exactly `len` bytes. `seed` varies the content so
/// different seeds never collide on the digest.
pub fn markdown_document(len: usize, seed: u8) -> Vec<u8> {
    let header = format!("# Document {}\n\n", seed);
    let mut data = header.into_bytes();
    let mut i: usize = 0;
    while data.len() < len {
        let line = format!("- item {} of seed {}\n", i, seed);
        data.extend_from_slice(line.as_bytes());
        i += 1;
    }
    data.truncate(len);
    data
}

/// Fresh owner identity.
pub fn owner() -> Uuid {
    Uuid::new_v4()
}

/// Split `data` into `chunk_size` pieces; the last may be short.
pub fn split_chunks(data: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
    data.chunks(chunk_size).map(|c| c.to_vec()).collect()
}
