use thiserror::Error;

/// Rejected zone or line geometry. Raised before a job starts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InputError {
    #[error("{kind} name must not be empty")]
    EmptyName { kind: &'static str },

    #[error("duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    #[error("zone '{zone}' needs at least 3 points, got {got}")]
    TooFewVertices { zone: String, got: usize },

    #[error("zone '{zone}' polygon has zero area")]
    DegeneratePolygon { zone: String },

    #[error("{kind} '{name}' has a coordinate outside [0, 1]: ({x}, {y})")]
    OutOfBounds { kind: &'static str, name: String, x: f32, y: f32 },

    #[error("zone '{zone}' overlap_threshold {value} not in (0, 1]")]
    ThresholdOutOfRange { zone: String, value: f32 },

    #[error("line '{line}' has zero length")]
    ZeroLengthLine { line: String },

    #[error("invalid crossing parameter {param}={value}")]
    CrossingParam { param: &'static str, value: f32 },
}

/// Internal invariant violation. Always fatal for the job.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateError {
    #[error("frame {got} recorded after frame {last}")]
    FrameOrder { last: u64, got: u64 },

    #[error("expected {expected} {what} for frame {frame}, got {got}")]
    ShapeMismatch { what: &'static str, frame: u64, expected: usize, got: usize },

    #[error("zone '{zone}' counted {count} of {total} detections in frame {frame}")]
    CountExceedsDetections { zone: String, frame: u64, count: u32, total: u32 },

    #[error("line '{line}' cumulative {direction} is {cumulative}, frame deltas sum to {summed}")]
    LineTotalsDiverged { line: String, direction: &'static str, cumulative: u64, summed: u64 },
}
