use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A known individual. `roll` is the unique key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub roll: String,
    pub display_name: String,
}

impl Identity {
    pub fn new(roll: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            roll: roll.into(),
            display_name: display_name.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.roll)
    }
}

/// Fixed-length face feature vector produced by an external extractor
/// (typically 128-dimensional).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// True when every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// Euclidean (L2) distance to `other`.
    ///
    /// Returns `None` when the dimensionalities differ; vectors from
    /// different extractors are not comparable.
    pub fn euclidean_distance(&self, other: &FeatureVector) -> Option<f32> {
        if self.0.len() != other.0.len() {
            return None;
        }
        Some(
            self.0
                .iter()
                .zip(other.0.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f32>()
                .sqrt(),
        )
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// The single reference vector held for an identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceEncoding {
    pub identity: Identity,
    pub vector: FeatureVector,
}

/// An enrolled identity as the persistence layer sees it.
///
/// `vector` is `None` when registration produced no extractable face;
/// such an identity can never be matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub identity: Identity,
    pub vector: Option<FeatureVector>,
}

/// One face found in a submitted photograph. Lives for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnknownObservation {
    pub source_index: usize,
    pub vector: FeatureVector,
}

impl UnknownObservation {
    /// Number a photograph's face vectors in extractor order.
    pub fn from_vectors(vectors: impl IntoIterator<Item = FeatureVector>) -> Vec<Self> {
        vectors
            .into_iter()
            .enumerate()
            .map(|(source_index, vector)| Self {
                source_index,
                vector,
            })
            .collect()
    }
}

/// Result of matching one observation against a registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub source_index: usize,
    /// Resolved identity; `None` means unrecognized.
    pub identity: Option<Identity>,
    /// Distance to the nearest reference, reported even when above threshold.
    /// `None` if the observation was not comparable with any reference.
    pub distance: Option<f32>,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        self.identity.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(AttendanceStatus::Present),
            other => Err(format!("unknown attendance status: {other}")),
        }
    }
}

/// One presence entry in the ledger. At most one exists per (roll, date).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub identity: Identity,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}
