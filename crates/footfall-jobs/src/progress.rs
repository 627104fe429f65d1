//! Process-wide progress table, one entry per job.
//!
//! Each entry has exactly one writer, the [`ProgressHandle`] handed to the
//! job's worker. Readers take snapshots or subscribe to changes.
//!
//! The table lock is exclusive only for insert, remove and sweep. Updates go
//! through the entry's own `watch` sender under a shared lock, so a worker
//! never waits on pollers or on other jobs.

use footfall_proto::progress::{ProgressState, Stage};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProgressError {
    #[error("unknown job {0}")]
    UnknownJob(JobId),
    #[error("{job}: stage may not go back from {from:?} to {to:?}")]
    StageRegression { job: JobId, from: Stage, to: Stage },
    #[error("{job}: already finished with {stage:?}")]
    AfterTerminal { job: JobId, stage: Stage },
}

struct Entry {
    tx: watch::Sender<ProgressState>,
    meta: Mutex<Meta>,
}

#[derive(Default)]
struct Meta {
    finished_at: Option<OffsetDateTime>,
    preview: Option<Arc<Vec<u8>>>,
}

impl Entry {
    fn finish(&self) {
        let mut meta = self.meta.lock();
        meta.finished_at = Some(OffsetDateTime::now_utc());
        meta.preview = None;
    }
}

#[derive(Clone, Default)]
pub struct ProgressStore {
    inner: Arc<RwLock<HashMap<JobId, Entry>>>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the `starting` entry and returns its only writer.
    pub fn register(&self, id: JobId) -> ProgressHandle {
        let (tx, _) = watch::channel(ProgressState::starting());
        self.inner.write().insert(id, Entry { tx, meta: Mutex::new(Meta::default()) });
        ProgressHandle { id, store: self.clone() }
    }

    pub fn get(&self, id: JobId) -> Option<ProgressState> {
        self.inner.read().get(&id).map(|e| e.tx.borrow().clone())
    }

    pub fn subscribe(&self, id: JobId) -> Option<watch::Receiver<ProgressState>> {
        self.inner.read().get(&id).map(|e| e.tx.subscribe())
    }

    /// Latest annotated frame as JPEG, while the job is running.
    pub fn preview(&self, id: JobId) -> Option<Arc<Vec<u8>>> {
        self.inner.read().get(&id).and_then(|e| e.meta.lock().preview.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remove(&self, id: JobId) -> bool {
        self.inner.write().remove(&id).is_some()
    }

    /// Drops terminal entries finished more than `retention` ago.
    pub fn sweep(&self, retention: Duration) -> Vec<JobId> {
        self.sweep_at(OffsetDateTime::now_utc(), retention)
    }

    pub fn sweep_at(&self, now: OffsetDateTime, retention: Duration) -> Vec<JobId> {
        let keep_for = time::Duration::try_from(retention).unwrap_or(time::Duration::MAX);
        let mut removed = vec![];
        self.inner.write().retain(|id, e| match e.meta.get_mut().finished_at {
            Some(at) if now - at >= keep_for => {
                removed.push(*id);
                false
            }
            _ => true,
        });
        if !removed.is_empty() {
            debug!("progress sweep removed {} job(s)", removed.len());
        }
        removed
    }

    /// Forces a non-terminal entry into `error`; used when a worker dies
    /// without reporting.
    pub(crate) fn abort(&self, id: JobId, message: String) {
        let map = self.inner.read();
        if let Some(e) = map.get(&id) {
            let aborted = e.tx.send_if_modified(|cur| {
                if cur.stage.is_terminal() {
                    return false;
                }
                *cur = ProgressState { stage: Stage::Error, percent: cur.percent, message, result: None };
                true
            });
            if aborted {
                e.finish();
            }
        }
    }

    fn apply(&self, id: JobId, stage: Stage, percent: u8, message: String, result: Option<String>) -> Result<(), ProgressError> {
        let map = self.inner.read();
        let e = map.get(&id).ok_or(ProgressError::UnknownJob(id))?;

        // check and write under the sender's own lock
        let mut outcome = Ok(None);
        e.tx.send_if_modified(|cur| {
            if cur.stage.is_terminal() {
                outcome = Err(ProgressError::AfterTerminal { job: id, stage: cur.stage });
                return false;
            }
            if stage.rank() < cur.stage.rank() {
                outcome = Err(ProgressError::StageRegression { job: id, from: cur.stage, to: stage });
                return false;
            }
            if stage != cur.stage {
                outcome = Ok(Some(cur.stage));
            }
            let percent = percent.min(100).max(cur.percent);
            *cur = ProgressState { stage, percent, message, result };
            true
        });

        if let Some(from) = outcome? {
            info!("{}: {:?} -> {:?} ({})", id, from, stage, e.tx.borrow().message);
        }
        if stage.is_terminal() {
            e.finish();
        }
        Ok(())
    }
}

/// Write side of one job's entry. Not `Clone`: there is one writer per job.
pub struct ProgressHandle {
    id: JobId,
    store: ProgressStore,
}

impl ProgressHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Percent is clamped so it never decreases.
    pub fn update(&self, stage: Stage, percent: u8, message: impl Into<String>) -> Result<(), ProgressError> {
        self.store.apply(self.id, stage, percent, message.into(), None)
    }

    pub fn complete(&self, result: Option<String>) -> Result<(), ProgressError> {
        self.store.apply(self.id, Stage::Complete, 100, "Processing complete".into(), result)
    }

    pub fn fail(&self, message: impl Into<String>) -> Result<(), ProgressError> {
        self.store.apply(self.id, Stage::Error, 0, message.into(), None)
    }

    pub fn cancelled(&self) -> Result<(), ProgressError> {
        self.store.apply(self.id, Stage::Cancelled, 0, "Cancelled".into(), None)
    }

    pub fn set_preview(&self, jpeg: Vec<u8>) {
        let map = self.store.inner.read();
        if let Some(e) = map.get(&self.id) {
            let mut meta = e.meta.lock();
            if meta.finished_at.is_none() {
                meta.preview = Some(Arc::new(jpeg));
            }
        }
    }
}
