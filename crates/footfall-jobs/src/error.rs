use footfall_analytics::{InputError, StateError};
use footfall_proto::progress::Stage;
use thiserror::Error;

use crate::progress::{JobId, ProgressError};

/// Why a job's worker stopped before completing.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error("cancelled")]
    Cancelled,
}

impl JobError {
    /// Message for the progress entry, with the full I/O context chain.
    pub fn describe(&self) -> String {
        match self {
            JobError::Io(e) => format!("{:#}", e),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("unknown job {0}")]
    UnknownJob(JobId),
    #[error("{job} has no report yet (stage {stage:?})")]
    NotReady { job: JobId, stage: Stage },
    #[error("{job} stopped before any frame was processed")]
    NoFrames { job: JobId },
}
