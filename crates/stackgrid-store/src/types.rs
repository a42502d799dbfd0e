//! Records read from and written to the graph store.

use stackgrid_core::Status;

/// A service record to create under a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewService {
    pub uuid: String,
    pub subject: String,
    pub title: String,
}

/// A service as recorded under its pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub uuid: String,
    pub subject: String,
    pub title: String,
    pub status: Option<Status>,
    pub scaling: u32,
}

/// A service whose recorded status says its containers should be running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningService {
    pub pipeline: String,
    pub service: String,
    pub title: String,
    pub scaling: u32,
}

/// Where a repository's sources live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositorySource {
    pub location: Option<String>,
    pub branch: Option<String>,
}

/// Bound applied to a recorded scaling value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingBound {
    /// `scaling = max(scaling, n)`
    AtLeast(u32),
    /// `scaling = min(scaling, n)`
    AtMost(u32),
}

impl ScalingBound {
    pub fn apply(&self, current: Option<u32>) -> u32 {
        match (*self, current) {
            (ScalingBound::AtLeast(n), Some(c)) => c.max(n),
            (ScalingBound::AtMost(n), Some(c)) => c.min(n),
            (ScalingBound::AtLeast(n), None) | (ScalingBound::AtMost(n), None) => n,
        }
    }
}

/// Parse a recorded scaling literal, tolerating `"3"` and `"3.0"` forms.
pub(crate) fn parse_scaling(value: &str) -> Option<u32> {
    let value = value.trim();
    value
        .parse::<u32>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u32))
}
