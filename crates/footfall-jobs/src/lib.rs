//! Batch job orchestration: one blocking worker per video, observed through
//! the shared progress table.

mod error;
mod job;
pub mod progress;

pub use error::{JobError, ReportError};
pub use job::{DetectorLoader, JobInputs, JobManager, JobSpec, SinkOpener, SourceOpener};
pub use progress::{JobId, ProgressError, ProgressHandle, ProgressStore};
