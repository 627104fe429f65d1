use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    /// Active while any detection centroid is inside ("staff" zone).
    #[serde(alias = "staff")]
    Presence,
    /// Counts detections whose box overlaps the polygon enough ("customer" zone).
    #[serde(alias = "customer")]
    Occupancy,
}

impl ZoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneKind::Presence => "presence",
            ZoneKind::Occupancy => "occupancy",
        }
    }
}

/// One zone's value for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ZoneState {
    Active(bool),
    Count(u32),
}

impl ZoneState {
    pub fn empty(kind: ZoneKind) -> Self {
        match kind {
            ZoneKind::Presence => ZoneState::Active(false),
            ZoneKind::Occupancy => ZoneState::Count(0),
        }
    }

    /// Presence flags count as 0/1.
    pub fn as_count(&self) -> u32 {
        match *self {
            ZoneState::Active(a) => a as u32,
            ZoneState::Count(n) => n,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.as_count() > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCounts {
    #[serde(rename = "in")]
    pub inbound: u64,
    #[serde(rename = "out")]
    pub outbound: u64,
}

impl LineCounts {
    pub fn record(&mut self, dir: Direction) {
        match dir {
            Direction::In => self.inbound += 1,
            Direction::Out => self.outbound += 1,
        }
    }

    pub fn add(&mut self, other: &LineCounts) {
        self.inbound += other.inbound;
        self.outbound += other.outbound;
    }

    pub fn total(&self) -> u64 {
        self.inbound + self.outbound
    }

    /// Net people inside: entries minus exits, never below zero.
    pub fn inside(&self) -> u64 {
        self.inbound.saturating_sub(self.outbound)
    }
}
