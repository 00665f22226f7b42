use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Scope of one recording: a patient, a day and the hour the file starts.
///
/// Recordings are named `<prefix>_<patient>_<date>_<HH-MM-SS>.txt`. Keys sort
/// by patient, then date, then hour.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordingKey {
    pub patient: String,
    pub date: String,
    pub hour: String,
}

impl RecordingKey {
    pub fn new(patient: impl Into<String>, date: impl Into<String>, hour: impl Into<String>) -> Self {
        Self {
            patient: patient.into(),
            date: date.into(),
            hour: hour.into(),
        }
    }

    /// Parse a recording file name. Returns `None` when the name does not
    /// follow the naming scheme or the hour is not a valid `HH-MM-SS` time.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".txt").unwrap_or(name);
        let parts: Vec<&str> = stem.split('_').collect();
        let [_, patient, date, hour] = parts.as_slice() else {
            return None;
        };
        if patient.is_empty() || date.is_empty() {
            return None;
        }
        NaiveTime::parse_from_str(hour, "%H-%M-%S").ok()?;

        Some(Self::new(*patient, *date, *hour))
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(Self::from_file_name)
    }

    /// Day this recording belongs to
    pub fn day(&self) -> (&str, &str) {
        (&self.patient, &self.date)
    }

    /// File stem used by the result store
    pub fn store_stem(&self) -> String {
        format!("{}_{}_{}", self.patient, self.date, self.hour)
    }
}

impl fmt::Display for RecordingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "patient {} {} {}", self.patient, self.date, self.hour)
    }
}
