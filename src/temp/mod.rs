//! Job-scoped working files.
//!
//! Every job gets its own directory under the working root, named after its
//! job id, and every file in it carries the job id as a prefix. The workspace
//! remembers each path it hands out and deletes exactly those on release.
//! Dropping an unreleased workspace (panic, cancelled request) releases it
//! synchronously.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use log::{debug, info, warn};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::{AudioError, AudioResult};
use crate::pipeline::ClassificationResult;

/// Attempts at picking a free job directory before giving up.
const MAX_ID_ATTEMPTS: usize = 8;
/// Engines killed on timeout may hold files briefly on some platforms.
const RELEASE_ATTEMPTS: u32 = 3;
const RELEASE_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub struct JobWorkspace {
    job_id: String,
    dir: PathBuf,
    owned: Vec<PathBuf>,
    released: bool,
}

impl JobWorkspace {
    /// Creates `<root>/<job_id>`. If another live job already holds that id,
    /// a random suffix is appended until a free directory is found.
    pub async fn create(root: &Path, requested_id: &str) -> AudioResult<Self> {
        fs::create_dir_all(root).await?;

        let mut job_id = requested_id.to_string();
        for _ in 0..MAX_ID_ATTEMPTS {
            let dir = root.join(&job_id);
            match fs::create_dir(&dir).await {
                Ok(()) => {
                    debug!("Created workspace {:?} for job {}", dir, job_id);
                    return Ok(Self {
                        job_id,
                        dir,
                        owned: Vec::new(),
                        released: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    job_id = format!("{}_{:08x}", requested_id, rand::random::<u32>());
                }
                Err(e) => return Err(AudioError::IoError(e)),
            }
        }

        Err(AudioError::IoError(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free workspace for job {} under {:?}", requested_id, root),
        )))
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn job_path(&mut self, suffix: &str) -> PathBuf {
        let path = self.dir.join(format!("{}_{}", self.job_id, suffix));
        // Tracked before any write, so a partial file is still released.
        self.owned.push(path.clone());
        path
    }

    /// Writes the uploaded audio to `<job_id>_input.wav`.
    pub async fn acquire_input_file(&mut self, bytes: &[u8]) -> AudioResult<PathBuf> {
        let path = self.job_path("input.wav");
        fs::write(&path, bytes).await?;
        info!("Materialized {} bytes of input audio at {:?}", bytes.len(), path);
        Ok(path)
    }

    /// Writes the classification artifact for the separation stage.
    ///
    /// The file is written under a temporary name, flushed, then renamed, so
    /// the returned path never points at a partially written artifact.
    pub async fn acquire_handoff_file(
        &mut self,
        classification: &ClassificationResult,
    ) -> AudioResult<PathBuf> {
        let body = serde_json::to_vec(classification).map_err(io::Error::from)?;
        let partial = self.job_path("classification.json.partial");
        let path = self.job_path("classification.json");

        let mut file = fs::File::create(&partial).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&partial, &path).await?;

        debug!("Wrote handoff artifact {:?} ({} bytes)", path, body.len());
        Ok(path)
    }

    /// Deletes every file this workspace created, then its directory.
    /// Safe to call more than once.
    pub async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let owned = std::mem::take(&mut self.owned);
        release(&owned).await;
        match fs::remove_dir(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove workspace directory {:?}: {}", self.dir, e),
        }
        info!("Released workspace for job {}", self.job_id);
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!("Workspace for job {} dropped without release, cleaning up", self.job_id);
        for path in &self.owned {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove {:?}: {}", path, e);
                }
            }
        }
        let _ = std::fs::remove_dir(&self.dir);
    }
}

/// Best-effort delete. Missing files are not an error; other failures are
/// retried briefly and then logged.
pub async fn release(paths: &[PathBuf]) {
    for path in paths {
        remove_with_retry(path).await;
    }
}

async fn remove_with_retry(path: &Path) {
    for attempt in 1..=RELEASE_ATTEMPTS {
        match fs::remove_file(path).await {
            Ok(()) => return,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return,
            Err(e) if attempt < RELEASE_ATTEMPTS => {
                debug!("Retrying removal of {:?} after: {}", path, e);
                tokio::time::sleep(RELEASE_BACKOFF * attempt).await;
            }
            Err(e) => warn!("Failed to remove temp file {:?}: {}", path, e),
        }
    }
}
