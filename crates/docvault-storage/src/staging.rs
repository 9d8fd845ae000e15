//! Per-session chunk staging on the local filesystem.
//!
//! Layout under the staging root:
//!
//! - `{session_id}/{chunk_index}`: one file per received chunk
//! - `{session_id}_merged`: scratch file produced by a merge
//!
//! Chunks are written to a dot-prefixed temp file and renamed into place, so a
//! listing never includes a half-written chunk.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use crate::traits::{StorageError, StorageResult};

const MERGED_SUFFIX: &str = "_merged";
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Result of concatenating a session's chunks
#[derive(Debug, Clone)]
pub struct MergedFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Lowercase hex SHA-256 of the merged bytes, when requested
    pub sha256: Option<String>,
}

/// Summary of one reaper pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions_removed: usize,
    pub scratch_files_removed: usize,
}

#[derive(Clone, Debug)]
pub struct ChunkStaging {
    root: PathBuf,
}

impl ChunkStaging {
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create staging directory {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session_id: Uuid) -> PathBuf {
        self.root.join(session_id.to_string())
    }

    pub fn scratch_path(&self, session_id: Uuid) -> PathBuf {
        self.root.join(format!("{}{}", session_id, MERGED_SUFFIX))
    }

    /// Store one chunk, replacing any earlier copy of the same index.
    pub async fn write_chunk(
        &self,
        session_id: Uuid,
        chunk_index: u32,
        data: &[u8],
    ) -> StorageResult<u64> {
        let dir = self.session_dir(session_id);
        fs::create_dir_all(&dir).await?;

        let final_path = dir.join(chunk_index.to_string());
        let temp_path = dir.join(format!(".{}.{}.part", chunk_index, Uuid::new_v4()));

        let write = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            fs::rename(&temp_path, &final_path).await?;
            Ok::<(), std::io::Error>(())
        };

        if let Err(e) = write.await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::UploadFailed(format!(
                "Failed to stage chunk {} for session {}: {}",
                chunk_index, session_id, e
            )));
        }

        tracing::debug!(
            session_id = %session_id,
            chunk_index,
            size_bytes = data.len(),
            "Chunk staged"
        );

        Ok(data.len() as u64)
    }

    /// Indices present for the session, ascending. A session with no staging is empty.
    pub async fn list_chunks(&self, session_id: Uuid) -> StorageResult<Vec<u32>> {
        let dir = self.session_dir(session_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut indices = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(index) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u32>().ok())
            {
                indices.push(index);
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }

    /// Concatenate chunks `0..total_chunks` in index order into the scratch file.
    ///
    /// The caller checks the staged set first; a missing chunk here is `NotFound`.
    /// On error the scratch file is removed and the chunks are left untouched.
    pub async fn merge_into_scratch(
        &self,
        session_id: Uuid,
        total_chunks: u32,
        compute_hash: bool,
    ) -> StorageResult<MergedFile> {
        let dir = self.session_dir(session_id);
        let scratch = self.scratch_path(session_id);

        let merge = async {
            let mut out = fs::File::create(&scratch).await?;
            let mut hasher = compute_hash.then(Sha256::new);
            let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
            let mut size_bytes = 0u64;

            for index in 0..total_chunks {
                let chunk_path = dir.join(index.to_string());
                let mut chunk = match fs::File::open(&chunk_path).await {
                    Ok(file) => file,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        return Err(StorageError::NotFound(format!(
                            "chunk {} of session {}",
                            index, session_id
                        )));
                    }
                    Err(e) => return Err(e.into()),
                };

                loop {
                    let n = chunk.read(&mut buffer).await?;
                    if n == 0 {
                        break;
                    }
                    if let Some(h) = hasher.as_mut() {
                        h.update(&buffer[..n]);
                    }
                    out.write_all(&buffer[..n]).await?;
                    size_bytes += n as u64;
                }
            }

            out.sync_all().await?;

            Ok::<MergedFile, StorageError>(MergedFile {
                path: scratch.clone(),
                size_bytes,
                sha256: hasher.map(|h| hex::encode(h.finalize())),
            })
        };

        match merge.await {
            Ok(merged) => {
                tracing::debug!(
                    session_id = %session_id,
                    total_chunks,
                    size_bytes = merged.size_bytes,
                    "Chunks merged into scratch file"
                );
                Ok(merged)
            }
            Err(e) => {
                let _ = fs::remove_file(&scratch).await;
                Err(e)
            }
        }
    }

    pub async fn remove_scratch(&self, session_id: Uuid) -> StorageResult<()> {
        remove_file_if_exists(&self.scratch_path(session_id)).await
    }

    /// Remove the session's chunks and its scratch file
    pub async fn remove_session(&self, session_id: Uuid) -> StorageResult<()> {
        match fs::remove_dir_all(self.session_dir(session_id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.remove_scratch(session_id).await
    }

    /// Delete session directories and scratch files not modified within `ttl`.
    pub async fn sweep_older_than(&self, ttl: Duration) -> StorageResult<SweepReport> {
        let mut report = SweepReport::default();
        let now = SystemTime::now();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                // Removed concurrently
                Err(_) => continue,
            };
            let modified = metadata.modified()?;
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age < ttl {
                continue;
            }

            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();

            if metadata.is_dir() && Uuid::parse_str(&name).is_ok() {
                fs::remove_dir_all(&path).await?;
                report.sessions_removed += 1;
                tracing::info!(session_id = %name, age_secs = age.as_secs(), "Reaped staged chunks");
            } else if metadata.is_file() && name.ends_with(MERGED_SUFFIX) {
                remove_file_if_exists(&path).await?;
                report.scratch_files_removed += 1;
                tracing::info!(file = %name, age_secs = age.as_secs(), "Reaped merge scratch file");
            }
        }

        Ok(report)
    }
}

async fn remove_file_if_exists(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
