//! Content Hasher: SHA-256 of a file, computed off the async runtime.
//!
//! The digest is computed on a blocking worker that reads the file sequentially in
//! fixed-size chunks. The caller only sees messages on a channel:
//! a `Progress` after every chunk, then exactly one `Complete` or `Error`.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;

/// Default read size, matching the server's advertised chunk size.
pub const DEFAULT_HASH_CHUNK_SIZE: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashEvent {
    /// Percentage of bytes hashed so far, 0..=100, never decreasing.
    Progress(u8),
    /// Lowercase hex SHA-256 digest.
    Complete(String),
    Error(String),
}

#[derive(Debug, Error)]
pub enum HashError {
    #[error("Failed to hash file: {0}")]
    Read(String),

    #[error("Hash worker stopped before reporting a digest")]
    WorkerStopped,
}

/// Start hashing `path` on a blocking worker and return the event stream.
///
/// Dropping the receiver stops the worker after its current chunk.
pub fn hash_file(path: impl Into<PathBuf>, chunk_size: usize) -> mpsc::Receiver<HashEvent> {
    let path = path.into();
    let chunk_size = chunk_size.max(1);
    let (tx, rx) = mpsc::channel(16);

    tokio::task::spawn_blocking(move || {
        let event = match hash_blocking(&path, chunk_size, &tx) {
            Ok(Some(digest)) => HashEvent::Complete(digest),
            // receiver gone
            Ok(None) => return,
            Err(e) => HashEvent::Error(format!("{}: {}", path.display(), e)),
        };
        let _ = tx.blocking_send(event);
    });

    rx
}

fn hash_blocking(
    path: &Path,
    chunk_size: usize,
    tx: &mpsc::Sender<HashEvent>,
) -> std::io::Result<Option<String>> {
    let mut file = File::open(path)?;
    let total = file.metadata()?.len();
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; chunk_size];
    let mut processed: u64 = 0;
    let mut last_percent: u8 = 0;

    loop {
        let filled = read_full(&mut file, &mut buffer)?;
        if filled == 0 {
            break;
        }
        hasher.update(&buffer[..filled]);
        processed += filled as u64;

        let percent = percent_of(processed, total).max(last_percent);
        last_percent = percent;
        if tx.blocking_send(HashEvent::Progress(percent)).is_err() {
            return Ok(None);
        }
        if filled < buffer.len() {
            break;
        }
    }

    if last_percent < 100 && tx.blocking_send(HashEvent::Progress(100)).is_err() {
        return Ok(None);
    }

    Ok(Some(hex::encode(hasher.finalize())))
}

/// Fill `buffer` unless EOF comes first.
fn read_full(file: &mut File, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match file.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn percent_of(processed: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((processed.min(total) * 100) / total) as u8
}

/// Drive [`hash_file`] to completion, forwarding progress to `on_progress`.
pub async fn compute_content_hash<F>(
    path: impl Into<PathBuf>,
    chunk_size: usize,
    mut on_progress: F,
) -> Result<String, HashError>
where
    F: FnMut(u8),
{
    let mut events = hash_file(path, chunk_size);
    while let Some(event) = events.recv().await {
        match event {
            HashEvent::Progress(percent) => on_progress(percent),
            HashEvent::Complete(digest) => return Ok(digest),
            HashEvent::Error(message) => return Err(HashError::Read(message)),
        }
    }
    Err(HashError::WorkerStopped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(data).unwrap();
        path
    }

    #[tokio::test]
    async fn digest_matches_one_shot_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let path = write_file(&dir, "doc.md", &data);

        let digest = compute_content_hash(&path, 1024, |_| {}).await.unwrap();

        assert_eq!(digest, hex::encode(Sha256::digest(&data)));
    }

    #[tokio::test]
    async fn digest_does_not_depend_on_read_size() {
        let dir = tempfile::tempdir().unwrap();
        let data = b"# Title\n\nSome markdown body that spans several reads.\n".repeat(50);
        let path = write_file(&dir, "doc.md", &data);

        let small = compute_content_hash(&path, 7, |_| {}).await.unwrap();
        let large = compute_content_hash(&path, DEFAULT_HASH_CHUNK_SIZE, |_| {})
            .await
            .unwrap();

        assert_eq!(small, large);
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_ends_at_100_before_complete() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "doc.md", &[7u8; 4096]);

        let mut events = hash_file(&path, 1000);
        let mut seen = Vec::new();
        let mut digest = None;
        while let Some(event) = events.recv().await {
            match event {
                HashEvent::Progress(p) => seen.push(p),
                HashEvent::Complete(d) => digest = Some(d),
                HashEvent::Error(e) => panic!("unexpected error: {}", e),
            }
        }

        assert!(digest.is_some());
        assert_eq!(seen.len(), 5);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last(), Some(&100));
    }

    #[tokio::test]
    async fn empty_file_completes_with_empty_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "empty.md", b"");

        let mut progress = Vec::new();
        let digest = compute_content_hash(&path, 1024, |p| progress.push(p))
            .await
            .unwrap();

        assert_eq!(digest, hex::encode(Sha256::digest(b"")));
        assert_eq!(progress, vec![100]);
    }

    #[tokio::test]
    async fn missing_file_reports_error_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.md");

        let mut events = hash_file(&path, 1024);
        match events.recv().await {
            Some(HashEvent::Error(message)) => assert!(message.contains("missing.md")),
            other => panic!("expected error event, got {:?}", other),
        }
        assert!(events.recv().await.is_none());

        let err = compute_content_hash(&path, 1024, |_| {}).await.unwrap_err();
        assert!(matches!(err, HashError::Read(_)));
    }
}
