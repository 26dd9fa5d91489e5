//! One pipeline run: build the registry, match every face in a photograph,
//! and mark recognized identities present.

use crate::ledger::{Ledger, LedgerError, LedgerOutcome};
use crate::matcher::Matcher;
use crate::registry::{Registry, RegistryError};
use crate::types::{FeatureVector, Identity, MatchResult, RosterEntry, UnknownObservation};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("registry: {0}")]
    Registry(#[from] RegistryError),
    #[error("face {source_index} has dimension {actual}, registry expects {expected}")]
    ObservationDimension {
        source_index: usize,
        expected: usize,
        actual: usize,
    },
    /// The ledger backend failed partway through a batch. `completed` holds
    /// the outcomes of the faces handled before the failure; their inserts
    /// stay committed.
    #[error("ledger failed after {} faces: {source}", .completed.len())]
    Ledger {
        #[source]
        source: LedgerError,
        completed: Vec<ObservationOutcome>,
    },
}

/// What the ledger did for one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerDisposition {
    Inserted,
    AlreadyPresent,
    /// The face was not recognized, so nothing was recorded.
    NotApplicable,
}

impl From<LedgerOutcome> for LedgerDisposition {
    fn from(outcome: LedgerOutcome) -> Self {
        match outcome {
            LedgerOutcome::Inserted => LedgerDisposition::Inserted,
            LedgerOutcome::AlreadyPresent => LedgerDisposition::AlreadyPresent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationOutcome {
    pub observation: UnknownObservation,
    pub outcome: MatchResult,
    pub ledger_outcome: LedgerDisposition,
}

/// Per-photograph report including identities that could not take part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollCall {
    pub outcomes: Vec<ObservationOutcome>,
    /// Enrolled identities without a reference encoding.
    pub unreferenced: Vec<Identity>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollCallSummary {
    pub faces: usize,
    pub inserted: usize,
    pub already_present: usize,
    pub unrecognized: usize,
}

impl RollCall {
    pub fn summary(&self) -> RollCallSummary {
        summarize(&self.outcomes)
    }
}

fn summarize(outcomes: &[ObservationOutcome]) -> RollCallSummary {
    let mut summary = RollCallSummary {
        faces: outcomes.len(),
        ..Default::default()
    };
    for o in outcomes {
        match o.ledger_outcome {
            LedgerDisposition::Inserted => summary.inserted += 1,
            LedgerDisposition::AlreadyPresent => summary.already_present += 1,
            LedgerDisposition::NotApplicable => summary.unrecognized += 1,
        }
    }
    summary
}

/// Runs photographs through registry, matcher and ledger.
pub struct Coordinator<L, M> {
    ledger: L,
    matcher: M,
}

impl<L: Ledger, M: Matcher> Coordinator<L, M> {
    pub fn new(ledger: L, matcher: M) -> Self {
        Self { ledger, matcher }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Process one photograph's faces against `pairs`.
    ///
    /// Registry and dimension errors abort before any ledger write. An
    /// identity already marked for `today` is reported, not treated as a
    /// failure, and does not stop the rest of the batch.
    pub fn process(
        &self,
        pairs: impl IntoIterator<Item = (Identity, FeatureVector)>,
        observations: Vec<UnknownObservation>,
        threshold: f32,
        today: NaiveDate,
    ) -> Result<Vec<ObservationOutcome>, PipelineError> {
        let registry = Registry::build(pairs)?;
        self.run(&registry, observations, threshold, today)
    }

    /// Like [`process`](Self::process), starting from roster entries and
    /// reporting identities that have no reference encoding.
    pub fn process_roster(
        &self,
        entries: impl IntoIterator<Item = RosterEntry>,
        observations: Vec<UnknownObservation>,
        threshold: f32,
        today: NaiveDate,
    ) -> Result<RollCall, PipelineError> {
        let (registry, unreferenced) = Registry::from_roster(entries)?;
        let outcomes = self.run(&registry, observations, threshold, today)?;
        Ok(RollCall {
            outcomes,
            unreferenced,
        })
    }

    fn run(
        &self,
        registry: &Registry,
        observations: Vec<UnknownObservation>,
        threshold: f32,
        today: NaiveDate,
    ) -> Result<Vec<ObservationOutcome>, PipelineError> {
        if let Some(bad) = observations.iter().find(|o| o.vector.dim() != registry.dim()) {
            return Err(PipelineError::ObservationDimension {
                source_index: bad.source_index,
                expected: registry.dim(),
                actual: bad.vector.dim(),
            });
        }

        let results = self.matcher.match_all(registry, &observations, threshold);

        let mut outcomes = Vec::with_capacity(observations.len());
        for (observation, result) in observations.into_iter().zip(results) {
            let ledger_outcome = match &result.identity {
                Some(identity) => match self.ledger.record_presence(identity, today) {
                    Ok(outcome) => outcome.into(),
                    Err(source) => {
                        let summary = summarize(&outcomes);
                        tracing::warn!(
                            %today,
                            face = observation.source_index,
                            roll = %identity.roll,
                            inserted = summary.inserted,
                            already_present = summary.already_present,
                            error = %source,
                            "ledger failed mid-batch; earlier inserts remain committed"
                        );
                        return Err(PipelineError::Ledger {
                            source,
                            completed: outcomes,
                        });
                    }
                },
                None => {
                    tracing::debug!(
                        face = observation.source_index,
                        distance = ?result.distance,
                        "face not recognized"
                    );
                    LedgerDisposition::NotApplicable
                }
            };
            outcomes.push(ObservationOutcome {
                observation,
                outcome: result,
                ledger_outcome,
            });
        }

        let summary = summarize(&outcomes);
        tracing::info!(
            %today,
            faces = summary.faces,
            inserted = summary.inserted,
            already_present = summary.already_present,
            unrecognized = summary.unrecognized,
            "pipeline run complete"
        );

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{MemoryLedger, RecordFilter};
    use crate::matcher::EuclideanMatcher;
    use crate::types::AttendanceRecord;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 2).unwrap()
    }

    fn v(values: &[f32]) -> FeatureVector {
        FeatureVector::new(values.to_vec())
    }

    // v1 = Alice, v2 = Bob; v3 is 0.9 from both.
    fn class_pairs() -> Vec<(Identity, FeatureVector)> {
        vec![
            (Identity::new("001", "Alice"), v(&[0.45, 0.0])),
            (Identity::new("002", "Bob"), v(&[-0.45, 0.0])),
        ]
    }

    fn v3() -> FeatureVector {
        // sqrt(0.45^2 + y^2) = 0.9  =>  y = 0.45 * sqrt(3)
        v(&[0.0, 0.45 * 3f32.sqrt()])
    }

    #[test]
    fn test_first_photo_marks_alice_and_reports_stranger() {
        let coordinator = Coordinator::new(MemoryLedger::new(), EuclideanMatcher);
        let observations = UnknownObservation::from_vectors(vec![v(&[0.45, 0.0]), v3()]);

        let outcomes = coordinator
            .process(class_pairs(), observations, 0.6, today())
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].outcome.identity.as_ref().unwrap().display_name, "Alice");
        assert_eq!(outcomes[0].outcome.distance, Some(0.0));
        assert_eq!(outcomes[0].ledger_outcome, LedgerDisposition::Inserted);

        assert!(outcomes[1].outcome.identity.is_none());
        assert!((outcomes[1].outcome.distance.unwrap() - 0.9).abs() < 1e-5);
        assert_eq!(outcomes[1].ledger_outcome, LedgerDisposition::NotApplicable);
    }

    #[test]
    fn test_second_photo_same_day_already_present() {
        let coordinator = Coordinator::new(MemoryLedger::new(), EuclideanMatcher);
        coordinator
            .process(
                class_pairs(),
                UnknownObservation::from_vectors(vec![v(&[0.45, 0.0]), v3()]),
                0.6,
                today(),
            )
            .unwrap();

        let outcomes = coordinator
            .process(
                class_pairs(),
                UnknownObservation::from_vectors(vec![v(&[0.45, 0.0])]),
                0.6,
                today(),
            )
            .unwrap();

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].outcome.identity.as_ref().unwrap().roll, "001");
        assert_eq!(outcomes[0].ledger_outcome, LedgerDisposition::AlreadyPresent);
        assert_eq!(coordinator.ledger().len().unwrap(), 1);
    }

    #[test]
    fn test_empty_registry_aborts_without_writes() {
        let coordinator = Coordinator::new(MemoryLedger::new(), EuclideanMatcher);
        let err = coordinator
            .process(
                Vec::new(),
                UnknownObservation::from_vectors(vec![v(&[0.45, 0.0])]),
                0.6,
                today(),
            )
            .unwrap_err();

        assert!(matches!(err, PipelineError::Registry(RegistryError::Empty)));
        assert!(coordinator.ledger().is_empty().unwrap());
    }

    #[test]
    fn test_dimension_mismatch_in_registry_aborts() {
        let coordinator = Coordinator::new(MemoryLedger::new(), EuclideanMatcher);
        let pairs = vec![
            (Identity::new("001", "Alice"), v(&[0.45, 0.0])),
            (Identity::new("002", "Bob"), v(&[0.1, 0.2, 0.3])),
        ];
        let err = coordinator
            .process(
                pairs,
                UnknownObservation::from_vectors(vec![v(&[0.45, 0.0])]),
                0.6,
                today(),
            )
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Registry(RegistryError::DimensionMismatch { .. })
        ));
        assert!(coordinator.ledger().is_empty().unwrap());
    }

    #[test]
    fn test_observation_dimension_mismatch_aborts_before_writes() {
        let coordinator = Coordinator::new(MemoryLedger::new(), EuclideanMatcher);
        let observations =
            UnknownObservation::from_vectors(vec![v(&[0.45, 0.0]), v(&[0.1, 0.2, 0.3])]);
        let err = coordinator
            .process(class_pairs(), observations, 0.6, today())
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::ObservationDimension {
                source_index: 1,
                expected: 2,
                actual: 3
            }
        ));
        assert!(coordinator.ledger().is_empty().unwrap());
    }

    #[test]
    fn test_already_marked_does_not_block_others() {
        let coordinator = Coordinator::new(MemoryLedger::new(), EuclideanMatcher);
        coordinator
            .ledger()
            .record_presence(&Identity::new("001", "Alice"), today())
            .unwrap();

        let outcomes = coordinator
            .process(
                class_pairs(),
                UnknownObservation::from_vectors(vec![v(&[0.45, 0.0]), v(&[-0.45, 0.0])]),
                0.6,
                today(),
            )
            .unwrap();

        assert_eq!(outcomes[0].ledger_outcome, LedgerDisposition::AlreadyPresent);
        assert_eq!(outcomes[1].ledger_outcome, LedgerDisposition::Inserted);
        assert_eq!(coordinator.ledger().len().unwrap(), 2);
    }

    #[test]
    fn test_same_face_twice_in_one_photo() {
        let coordinator = Coordinator::new(MemoryLedger::new(), EuclideanMatcher);
        let outcomes = coordinator
            .process(
                class_pairs(),
                UnknownObservation::from_vectors(vec![v(&[0.45, 0.0]), v(&[0.44, 0.01])]),
                0.6,
                today(),
            )
            .unwrap();

        assert_eq!(outcomes[0].ledger_outcome, LedgerDisposition::Inserted);
        assert_eq!(outcomes[1].ledger_outcome, LedgerDisposition::AlreadyPresent);
        let records = coordinator.ledger().list_records(&RecordFilter::default()).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_process_roster_reports_unreferenced_and_summary() {
        let coordinator = Coordinator::new(MemoryLedger::new(), EuclideanMatcher);
        let entries = vec![
            RosterEntry {
                identity: Identity::new("001", "Alice"),
                vector: Some(v(&[0.45, 0.0])),
            },
            RosterEntry {
                identity: Identity::new("003", "Carol"),
                vector: None,
            },
        ];

        let roll_call = coordinator
            .process_roster(
                entries,
                UnknownObservation::from_vectors(vec![v(&[0.45, 0.0]), v3()]),
                0.6,
                today(),
            )
            .unwrap();

        assert_eq!(roll_call.unreferenced, vec![Identity::new("003", "Carol")]);
        assert_eq!(
            roll_call.summary(),
            RollCallSummary {
                faces: 2,
                inserted: 1,
                already_present: 0,
                unrecognized: 1,
            }
        );
    }

    /// Memory ledger whose backend is unavailable for one roll.
    struct FlakyLedger {
        inner: MemoryLedger,
        broken_roll: &'static str,
    }

    impl Ledger for FlakyLedger {
        fn record_presence(
            &self,
            identity: &Identity,
            date: NaiveDate,
        ) -> Result<LedgerOutcome, LedgerError> {
            if identity.roll == self.broken_roll {
                return Err(LedgerError::Backend("disk I/O error".into()));
            }
            self.inner.record_presence(identity, date)
        }

        fn list_records(
            &self,
            filter: &RecordFilter,
        ) -> Result<Vec<AttendanceRecord>, LedgerError> {
            self.inner.list_records(filter)
        }
    }

    #[test]
    fn test_backend_failure_reports_completed_faces() {
        let ledger = FlakyLedger {
            inner: MemoryLedger::new(),
            broken_roll: "002",
        };
        let coordinator = Coordinator::new(ledger, EuclideanMatcher);
        let observations =
            UnknownObservation::from_vectors(vec![v(&[0.45, 0.0]), v3(), v(&[-0.45, 0.0])]);

        let err = coordinator
            .process(class_pairs(), observations, 0.6, today())
            .unwrap_err();

        let PipelineError::Ledger { source, completed } = err else {
            panic!("expected a ledger error");
        };
        assert!(matches!(source, LedgerError::Backend(_)));
        assert_eq!(completed.len(), 2);
        assert_eq!(completed[0].ledger_outcome, LedgerDisposition::Inserted);
        assert_eq!(completed[1].ledger_outcome, LedgerDisposition::NotApplicable);
        assert_eq!(coordinator.ledger().inner.len().unwrap(), 1);
    }

    #[test]
    fn test_no_faces_is_not_an_error() {
        let coordinator = Coordinator::new(MemoryLedger::new(), EuclideanMatcher);
        let outcomes = coordinator
            .process(class_pairs(), Vec::new(), 0.6, today())
            .unwrap();
        assert!(outcomes.is_empty());
    }
}
