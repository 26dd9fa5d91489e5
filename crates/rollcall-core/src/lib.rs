//! rollcall-core — Face encoding registry, matcher, and attendance ledger.
//!
//! Consumes pre-computed face feature vectors, resolves them against a
//! registry of known identities, and marks each recognized identity
//! present at most once per day.

pub mod ledger;
pub mod matcher;
pub mod pipeline;
pub mod registry;
pub mod types;

pub use ledger::{Ledger, LedgerError, LedgerOutcome, MemoryLedger, RecordFilter};
pub use matcher::{EuclideanMatcher, Matcher};
pub use pipeline::{
    Coordinator, LedgerDisposition, ObservationOutcome, PipelineError, RollCall, RollCallSummary,
};
pub use registry::{Registry, RegistryError};
pub use types::{
    AttendanceRecord, AttendanceStatus, FeatureVector, Identity, MatchResult, ReferenceEncoding,
    RosterEntry, UnknownObservation,
};

/// Default match threshold for 128-d face encodings.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;
