// The shared learnings queue
//
// Several assistant sessions can write here at the same moment, so every
// change is a locked read-modify-write that lands through a temp file + rename.
// Readers never take the lock: they always see a complete file.

use crate::error::{ReflectError, Result};
use crate::queue::models::{CandidateCorrection, QueueKey};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

// How many times a writer tries to get the lock before giving up
const MAX_APPEND_ATTEMPTS: u32 = 50;

// Backoff grows per attempt but never past this
const MAX_BACKOFF_MS: u64 = 50;

// A lock older than this belongs to a crashed writer
const STALE_LOCK_AGE: Duration = Duration::from_secs(10);

pub struct QueueStore {
    path: PathBuf,
    lock_path: PathBuf,
    max_attempts: u32,
}

// Per-process counter so two locks taken in the same nanosecond still differ
static LOCK_SEQ: AtomicU64 = AtomicU64::new(0);

// Removes the lock file when the write is done, even on early return,
// but only while it is still ours
struct LockGuard {
    path: PathBuf,
    nonce: String,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if std::fs::read_to_string(&self.path).is_ok_and(|owner| owner == self.nonce) {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn lock_nonce() -> String {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!(
        "{}-{}-{}",
        std::process::id(),
        nanos,
        LOCK_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

impl QueueStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut lock_name = path.as_os_str().to_os_string();
        lock_name.push(".lock");

        Self {
            path,
            lock_path: PathBuf::from(lock_name),
            max_attempts: MAX_APPEND_ATTEMPTS,
        }
    }

    /// Override how many lock attempts a write makes
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every decodable record, in queue order
    ///
    /// Entries that don't decode are skipped here but stay in the file.
    pub async fn read(&self) -> Result<Vec<CandidateCorrection>> {
        let raw = match self.read_raw().await {
            Ok(raw) => raw,
            Err(ReflectError::MalformedRecord { source_name, reason }) => {
                warn!(queue = %source_name, %reason, "Queue file is unreadable, treating as empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut records = Vec::with_capacity(raw.len());
        for (index, value) in raw.into_iter().enumerate() {
            match serde_json::from_value::<CandidateCorrection>(value) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(index, error = %e, "Skipping malformed queue entry");
                }
            }
        }

        Ok(records)
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.read().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Append one record, returns the queue length afterwards
    pub async fn append(&self, candidate: &CandidateCorrection) -> Result<usize> {
        self.append_many(std::slice::from_ref(candidate)).await
    }

    /// Append several records in one swap
    pub async fn append_many(&self, candidates: &[CandidateCorrection]) -> Result<usize> {
        let encoded = candidates
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        self.update(move |entries| {
            entries.extend(encoded);
            entries.len()
        })
        .await
    }

    /// Remove exactly the given records, leaving anything added since untouched
    ///
    /// Returns how many entries were removed.
    pub async fn remove(&self, keys: &HashSet<QueueKey>) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }

        self.update(|entries| {
            let before = entries.len();
            entries.retain(|value| {
                let Ok(record) = serde_json::from_value::<CandidateCorrection>(value.clone())
                else {
                    return true;
                };
                // Hand-written entries get a fresh timestamp on every read,
                // so only project and message identify them
                if value.get("timestamp").is_none() {
                    return !keys.iter().any(|k| {
                        k.project == record.source_project_path && k.message == record.raw_text
                    });
                }
                !keys.contains(&record.key())
            });
            before - entries.len()
        })
        .await
    }

    /// Drop everything
    pub async fn clear(&self) -> Result<()> {
        self.update(|entries| entries.clear()).await
    }

    // Locked read-modify-write. The closure sees the latest file contents.
    async fn update<T, F>(&self, apply: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<Value>) -> T,
    {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let _guard = self.acquire_lock().await?;

        let mut entries = match self.read_raw().await {
            Ok(entries) => entries,
            Err(ReflectError::MalformedRecord { reason, .. }) => {
                self.quarantine(&reason).await?;
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let result = apply(&mut entries);
        self.write_atomic(&entries).await?;

        Ok(result)
    }

    async fn acquire_lock(&self) -> Result<LockGuard> {
        for attempt in 1..=self.max_attempts {
            let opened = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock_path)
                .await;

            match opened {
                Ok(mut file) => {
                    let guard = LockGuard {
                        path: self.lock_path.clone(),
                        nonce: lock_nonce(),
                    };
                    let written = match file.write_all(guard.nonce.as_bytes()).await {
                        Ok(()) => file.flush().await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = written {
                        let _ = fs::remove_file(&self.lock_path).await;
                        return Err(e.into());
                    }
                    return Ok(guard);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if let Some(owner) = self.stale_lock_owner().await {
                        debug!(lock = %self.lock_path.display(), %owner, "Breaking stale queue lock");
                        self.break_stale_lock(&owner).await;
                        continue;
                    }
                    let backoff = (attempt as u64 * 5).min(MAX_BACKOFF_MS);
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ReflectError::WriteConflict {
            attempts: self.max_attempts,
        })
    }

    // Contents of the lock file when it is old enough to be abandoned
    async fn stale_lock_owner(&self) -> Option<String> {
        let meta = fs::metadata(&self.lock_path).await.ok()?;
        let age = SystemTime::now().duration_since(meta.modified().ok()?).ok()?;
        if age <= STALE_LOCK_AGE {
            return None;
        }
        Some(fs::read_to_string(&self.lock_path).await.unwrap_or_default())
    }

    // Moves the lock aside instead of deleting it, so of two writers breaking
    // the same lock only one wins the rename. A fresh lock taken by mistake
    // is linked back.
    async fn break_stale_lock(&self, owner: &str) {
        let mut aside = self.lock_path.as_os_str().to_os_string();
        aside.push(format!(".stale-{}", lock_nonce()));
        let aside = PathBuf::from(aside);

        if fs::rename(&self.lock_path, &aside).await.is_err() {
            return;
        }
        let taken = fs::read_to_string(&aside).await.unwrap_or_default();
        if taken != owner {
            let _ = fs::hard_link(&aside, &self.lock_path).await;
        }
        let _ = fs::remove_file(&aside).await;
    }

    async fn read_raw(&self) -> Result<Vec<Value>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Array(entries)) => Ok(entries),
            Ok(_) => Err(ReflectError::malformed(
                self.path.display().to_string(),
                "queue file is not a JSON array",
            )),
            Err(e) => Err(ReflectError::malformed(
                self.path.display().to_string(),
                e.to_string(),
            )),
        }
    }

    // A corrupt queue is moved aside rather than overwritten
    async fn quarantine(&self, reason: &str) -> Result<()> {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.f");
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".corrupt-{}", stamp));
        let target = PathBuf::from(name);

        warn!(
            queue = %self.path.display(),
            moved_to = %target.display(),
            %reason,
            "Queue file was corrupt, starting a fresh one"
        );
        fs::rename(&self.path, &target).await?;
        Ok(())
    }

    async fn write_atomic(&self, entries: &[Value]) -> Result<()> {
        let data = serde_json::to_vec_pretty(entries)?;
        replace_file(&self.path, &data).await?;
        Ok(())
    }
}

/// Write `data` next to `path` under a unique name, then rename it into place
///
/// Readers see either the old file or the new one, never a partial write.
pub(crate) async fn replace_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(format!(".{}.{}.tmp", std::process::id(), nanos));
    let tmp_path = PathBuf::from(tmp_name);

    if let Err(e) = fs::write(&tmp_path, data).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    Ok(())
}
