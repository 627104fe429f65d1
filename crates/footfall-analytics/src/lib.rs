//! Frame analytics: zone occupancy, identity-free line crossing, the frame
//! log and its JSON/CSV renderings.

pub mod aggregate;
pub mod config;
pub mod crossing;
pub mod doctor;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod zones;

pub use aggregate::{format_timestamp, FrameAggregator, FrameRecord};
pub use config::{CountingLine, Zone};
pub use crossing::{CrossingConfig, CrossingEvent, CrossingTracker};
pub use error::{InputError, StateError};
pub use pipeline::{FrameAnalyzer, FrameOutcome};
pub use report::{ExportBundle, ReportBuilder};
pub use zones::ZoneEvaluator;
