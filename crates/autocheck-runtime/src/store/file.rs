//! File-backed store.
//!
//! Layout under the store directory:
//! - `quota.json`: map of user id to [`QuotaRecord`], rewritten on each change
//! - `evaluations.jsonl`: one [`EvaluationRecord`] per line, append-only

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use autocheck_core::QuotaRecord;
use chrono::NaiveDate;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{
    release_in_place, reserve_in_place, EvaluationRecord, EvaluationStore, QuotaStore,
    Reservation, StoreError,
};

const QUOTA_FILE: &str = "quota.json";
const EVALUATIONS_FILE: &str = "evaluations.jsonl";

/// Store persisting to a directory on local disk.
///
/// Quota records are cached in memory and written through under one async
/// lock, so `reserve` is atomic within this process.
pub struct FileStore {
    dir: PathBuf,
    quotas: Mutex<HashMap<String, QuotaRecord>>,
    evaluations_lock: Mutex<()>,
}

impl FileStore {
    /// Open (or create) a store directory and load existing quota records.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let quota_path = dir.join(QUOTA_FILE);
        let quotas = match tokio::fs::read(&quota_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Corrupt(format!("{}: {}", quota_path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        trim_partial_tail(&dir.join(EVALUATIONS_FILE)).await?;

        tracing::debug!(dir = %dir.display(), users = quotas.len(), "Opened file store");

        Ok(Self {
            dir,
            quotas: Mutex::new(quotas),
            evaluations_lock: Mutex::new(()),
        })
    }

    async fn flush_quotas(&self, quotas: &HashMap<String, QuotaRecord>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(quotas)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        // Write-then-rename so a crash never leaves a truncated map
        let tmp = self.dir.join(format!("{}.tmp", QUOTA_FILE));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, self.dir.join(QUOTA_FILE)).await?;
        Ok(())
    }

    /// Persist `record`, then apply it to the cache.
    ///
    /// The cache only changes once the file holds the new map.
    async fn write_record(
        &self,
        quotas: &mut HashMap<String, QuotaRecord>,
        record: QuotaRecord,
    ) -> Result<(), StoreError> {
        let mut next = quotas.clone();
        next.insert(record.user_id.clone(), record);
        self.flush_quotas(&next).await?;
        *quotas = next;
        Ok(())
    }
}

/// Drop an unterminated last line left by a crash mid-append, so the next
/// record starts on a line of its own.
async fn trim_partial_tail(path: &Path) -> Result<(), StoreError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if bytes.is_empty() || bytes.ends_with(b"\n") {
        return Ok(());
    }

    let keep = bytes
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1);
    tracing::warn!(
        path = %path.display(),
        dropped_bytes = bytes.len() - keep,
        "Truncating partial trailing evaluation record"
    );
    let file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
    file.set_len(keep as u64).await?;
    Ok(())
}

#[async_trait]
impl QuotaStore for FileStore {
    async fn get(&self, user_id: &str) -> Result<Option<QuotaRecord>, StoreError> {
        Ok(self.quotas.lock().await.get(user_id).cloned())
    }

    async fn put(&self, record: QuotaRecord) -> Result<(), StoreError> {
        let mut quotas = self.quotas.lock().await;
        self.write_record(&mut quotas, record).await
    }

    async fn reserve(
        &self,
        user_id: &str,
        day: NaiveDate,
        limit: u32,
    ) -> Result<Reservation, StoreError> {
        let mut quotas = self.quotas.lock().await;
        let (outcome, next) = reserve_in_place(quotas.get(user_id), user_id, day, limit);
        if let Some(record) = next {
            self.write_record(&mut quotas, record).await?;
        }
        Ok(outcome)
    }

    async fn release(&self, user_id: &str, day: NaiveDate) -> Result<(), StoreError> {
        let mut quotas = self.quotas.lock().await;
        if let Some(record) = release_in_place(quotas.get(user_id), day) {
            self.write_record(&mut quotas, record).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl EvaluationStore for FileStore {
    async fn insert(&self, record: EvaluationRecord) -> Result<(), StoreError> {
        let mut line =
            serde_json::to_vec(&record).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        line.push(b'\n');

        let _guard = self.evaluations_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(EVALUATIONS_FILE))
            .await?;
        let len_before = file.metadata().await?.len();

        let written = match file.write_all(&line).await {
            Ok(()) => file.sync_data().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            // Cut off a partial line so later reads stay parseable
            if let Err(truncate_err) = file.set_len(len_before).await {
                tracing::error!(
                    error = %truncate_err,
                    "Failed to truncate partial evaluation record"
                );
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<EvaluationRecord>, StoreError> {
        let _guard = self.evaluations_lock.lock().await;
        let content = match tokio::fs::read_to_string(self.dir.join(EVALUATIONS_FILE)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        // Only an unterminated last line can be an interrupted append
        let unterminated = !content.is_empty() && !content.ends_with('\n');
        let total = content.lines().count();

        let mut records = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: EvaluationRecord = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(e) if unterminated && index + 1 == total => {
                    tracing::warn!(
                        line = index + 1,
                        error = %e,
                        "Skipping partial trailing evaluation record"
                    );
                    continue;
                }
                Err(e) => {
                    return Err(StoreError::Corrupt(format!(
                        "{} line {}: {}",
                        EVALUATIONS_FILE,
                        index + 1,
                        e
                    )))
                }
            };
            if record.user_id == user_id {
                records.push(record);
            }
        }
        records.reverse();
        Ok(records)
    }
}
