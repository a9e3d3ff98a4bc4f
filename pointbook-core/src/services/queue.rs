//! Submission queue - feeds submissions through verification and the ledger
//!
//! One run processes its items strictly in order, one at a time. A failing
//! item is recorded and the run moves on. Pausing is cooperative: the flag is
//! checked before each item, so the item in flight always finishes.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use fs2::FileExt;

use crate::adapters::duckdb::DuckDbRepository;
use crate::adapters::sniff_content_type;
use crate::domain::result::{Error, Result};
use crate::domain::{
    ItemOutcome, ItemStatus, QueueRunState, QueueSummary, SubmissionItem, SubmissionPayload,
    REASON_PRICE_SUBMISSION,
};
use crate::ports::ImageStorage;
use crate::services::{PointsLedger, VerificationPipeline};

/// Shared pause flag; clone it into whatever wants to stop the run
#[derive(Debug, Clone, Default)]
pub struct PauseHandle(Arc<AtomicBool>);

impl PauseHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress callbacks for a run
pub trait QueueObserver {
    /// An item reached a terminal status
    fn on_item(&mut self, _index: usize, _item: &SubmissionItem) {}

    /// The run reached its last item without pausing
    fn on_complete(&mut self, _summary: &QueueSummary) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

impl QueueObserver for NoopObserver {}

pub struct SubmissionQueue {
    repository: Arc<DuckDbRepository>,
    pipeline: Arc<VerificationPipeline>,
    ledger: Arc<PointsLedger>,
    storage: Arc<dyn ImageStorage>,
    item_delay: Duration,
}

impl SubmissionQueue {
    pub fn new(
        repository: Arc<DuckDbRepository>,
        pipeline: Arc<VerificationPipeline>,
        ledger: Arc<PointsLedger>,
        storage: Arc<dyn ImageStorage>,
        item_delay: Duration,
    ) -> Self {
        Self {
            repository,
            pipeline,
            ledger,
            storage,
            item_delay,
        }
    }

    /// Process a run from `current_index` until it ends or the pause flag is seen
    ///
    /// Returns the updated state; a paused state can be passed back in to
    /// resume without reprocessing finished items.
    pub fn run(
        &self,
        mut state: QueueRunState,
        pause: &PauseHandle,
        observer: &mut dyn QueueObserver,
    ) -> QueueRunState {
        let span = tracing::info_span!("queue_run", run_id = %state.run_id, items = state.len());
        let _enter = span.enter();

        state.paused = false;
        let mut processed_any = false;

        while state.current_index < state.items.len() {
            let index = state.current_index;
            let status = state.items[index].status;

            if status.is_terminal() {
                // Skipped at build time, or finished before a resume
                state.current_index += 1;
                observer.on_item(index, &state.items[index]);
                continue;
            }

            if processed_any && !self.item_delay.is_zero() {
                thread::sleep(self.item_delay);
            }
            if pause.is_paused() {
                state.paused = true;
                tracing::info!(index, "queue paused");
                return state;
            }

            let item = &mut state.items[index];
            if status == ItemStatus::Processing {
                // Persisted mid-item; its ledger calls may have happened
                item.fail("Interrupted while processing; check pending review before resubmitting");
            } else {
                self.process_item(index, item);
                processed_any = true;
            }

            state.current_index += 1;
            observer.on_item(index, &state.items[index]);
        }

        let summary = state.summary();
        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            points = summary.points_awarded,
            "queue finished"
        );
        observer.on_complete(&summary);
        state
    }

    /// Process a single submission outside any batch
    pub fn submit(&self, payload: SubmissionPayload) -> SubmissionItem {
        let mut item = SubmissionItem::new(payload);
        self.process_item(0, &mut item);
        item
    }

    fn process_item(&self, index: usize, item: &mut SubmissionItem) {
        item.status = ItemStatus::Processing;
        match self.process(&item.payload) {
            Ok(outcome) => {
                tracing::info!(
                    index,
                    points = outcome.points_awarded,
                    auto_confirmed = outcome.auto_confirmed,
                    "item succeeded"
                );
                item.succeed(outcome);
            }
            Err(e) => {
                tracing::warn!(index, error = %e, "item failed");
                item.fail(e.to_string());
            }
        }
    }

    /// Photo, verify, upload, persist, then ledger
    fn process(&self, payload: &SubmissionPayload) -> Result<ItemOutcome> {
        payload.validate().map_err(Error::Validation)?;

        let mut submission = payload.to_submission();

        if let Some(path) = &payload.photo_path {
            let photo = std::fs::read(path).map_err(|e| {
                Error::Validation(format!("cannot read photo {}: {}", path.display(), e))
            })?;
            submission.photo = Some(photo);
        }

        let result = self.pipeline.verify(&submission)?;
        if !result.is_valid_image {
            return Err(Error::InvalidImage(
                result
                    .rejection_reason
                    .unwrap_or_else(|| "image failed verification".to_string()),
            ));
        }

        // Only photos that passed verification are kept
        if let Some(photo) = &submission.photo {
            let url = self.storage.upload(photo, sniff_content_type(photo))?;
            submission.image_url = Some(url);
        }

        self.repository
            .insert_submission(&submission)
            .map_err(|e| Error::database(format!("{:#}", e)))?;

        let mut outcome = ItemOutcome {
            submission_id: Some(submission.id),
            notices: result.notices(),
            ..ItemOutcome::default()
        };

        if result.award_points && result.points_to_award > 0 {
            let transaction_id = self.ledger.add(
                &submission.account_id,
                result.points_to_award,
                REASON_PRICE_SUBMISSION,
                Some(submission.id),
            )?;
            outcome.transaction_id = Some(transaction_id);
            outcome.points_awarded = result.points_to_award;

            if !result.review_required {
                outcome.auto_confirmed = self.ledger.confirm(transaction_id)?;
            }
        }

        Ok(outcome)
    }
}

/// Run state persisted as JSON, guarded by an advisory file lock
///
/// The lock keeps two `pb` processes from resuming the same run at once.
pub struct QueueStateFile {
    path: PathBuf,
}

impl QueueStateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn save(&self, state: &QueueRunState) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.try_lock_exclusive()
            .with_context(|| format!("{} is in use by another run", self.path.display()))?;

        let json = state.to_json()?;
        let written = write_locked(&mut file, json.as_bytes());
        release(&file, &self.path);
        written.with_context(|| format!("Failed to write {}", self.path.display()))
    }

    pub fn load(&self) -> anyhow::Result<Option<QueueRunState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.lock_shared()?;
        let mut content = String::new();
        let read = file.read_to_string(&mut content);
        release(&file, &self.path);
        read?;

        let state = QueueRunState::from_json(&content)
            .with_context(|| format!("Corrupt queue state in {}", self.path.display()))?;
        Ok(Some(state))
    }

    pub fn remove(&self) -> anyhow::Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// Closing the file releases the lock too, so a failed unlock is only noted
fn release(file: &File, path: &Path) {
    if let Err(e) = file.unlock() {
        tracing::debug!(path = %path.display(), error = %e, "queue state unlock failed");
    }
}

fn write_locked(file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_pause_handle_is_shared() {
        let handle = PauseHandle::new();
        let clone = handle.clone();
        clone.pause();
        assert!(handle.is_paused());
        handle.resume();
        assert!(!clone.is_paused());
    }

    #[test]
    fn test_state_file_roundtrip_and_remove() {
        let dir = tempdir().unwrap();
        let file = QueueStateFile::new(dir.path().join("runs").join("current.json"));
        assert!(file.load().unwrap().is_none());

        let mut state = QueueRunState::new(vec![
            SubmissionPayload::new("user-1", "1", "S1", 100),
            SubmissionPayload::new("user-1", "2", "S1", 200),
        ]);
        state.current_index = 1;
        state.paused = true;
        file.save(&state).unwrap();

        // A shorter second write must not leave trailing bytes
        let short = QueueRunState::new(vec![]);
        file.save(&short).unwrap();
        assert_eq!(file.load().unwrap().unwrap(), short);

        file.save(&state).unwrap();
        assert_eq!(file.load().unwrap().unwrap(), state);

        file.remove().unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn test_corrupt_state_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(QueueStateFile::new(path).load().is_err());
    }
}
