use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BuildResult {
    Success,
    Failure,
    Unstable,
    Aborted,
    Unknown,
}

impl BuildResult {
    /// Maps the agent's upper-case result; a running build reports none.
    pub fn from_remote(result: Option<&str>) -> Self {
        match result {
            Some("SUCCESS") => BuildResult::Success,
            Some("FAILURE") => BuildResult::Failure,
            Some("UNSTABLE") => BuildResult::Unstable,
            Some("ABORTED") => BuildResult::Aborted,
            _ => BuildResult::Unknown,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct BuildRecord {
    pub number: u64,
    pub name: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub result: BuildResult,
    pub console_output: Option<String>,
}

pub fn epoch_millis_to_utc(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// Newest first. Stable, so equal timestamps keep discovery order; records
/// without a timestamp go last.
pub fn sort_newest_first(records: &mut [BuildRecord]) {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}
