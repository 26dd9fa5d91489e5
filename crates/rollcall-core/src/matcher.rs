//! Nearest-reference matching of unknown faces against a [`Registry`].
//!
//! Every observation is compared with every reference, so a run costs
//! O(observations × references × dim). That is fine up to the low
//! thousands of references; beyond that an indexing structure would be
//! needed.

use crate::registry::Registry;
use crate::types::{FeatureVector, MatchResult, ReferenceEncoding, UnknownObservation};
use rayon::prelude::*;

/// Strategy for resolving observations to identities.
///
/// Implementors supply the distance metric. Selection is shared: the
/// nearest reference wins, equidistant references resolve to the
/// lexicographically smallest roll, and a match requires the distance to be
/// strictly below the threshold. Lower thresholds are stricter.
pub trait Matcher: Sync {
    /// Distance between two vectors, `None` if they are not comparable.
    /// A NaN distance is treated as not comparable.
    fn distance(&self, a: &FeatureVector, b: &FeatureVector) -> Option<f32>;

    /// Match a single observation.
    fn compare(
        &self,
        registry: &Registry,
        observation: &UnknownObservation,
        threshold: f32,
    ) -> MatchResult {
        let mut best: Option<(f32, &ReferenceEncoding)> = None;

        if observation.vector.is_finite() {
            for enc in registry.encodings() {
                let Some(dist) = self
                    .distance(&observation.vector, &enc.vector)
                    .filter(|d| !d.is_nan())
                else {
                    continue;
                };
                let is_better = match best {
                    None => true,
                    Some((best_dist, best_enc)) => {
                        dist < best_dist
                            || (dist == best_dist && enc.identity.roll < best_enc.identity.roll)
                    }
                };
                if is_better {
                    best = Some((dist, enc));
                }
            }
        }

        match best {
            Some((dist, enc)) if dist < threshold => MatchResult {
                source_index: observation.source_index,
                identity: Some(enc.identity.clone()),
                distance: Some(dist),
            },
            Some((dist, _)) => MatchResult {
                source_index: observation.source_index,
                identity: None,
                distance: Some(dist),
            },
            None => MatchResult {
                source_index: observation.source_index,
                identity: None,
                distance: None,
            },
        }
    }

    /// Match a batch of observations in parallel. Results keep input order.
    fn match_all(
        &self,
        registry: &Registry,
        observations: &[UnknownObservation],
        threshold: f32,
    ) -> Vec<MatchResult> {
        observations
            .par_iter()
            .map(|obs| self.compare(registry, obs, threshold))
            .collect()
    }
}

/// Euclidean (L2) distance matcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn distance(&self, a: &FeatureVector, b: &FeatureVector) -> Option<f32> {
        a.euclidean_distance(b)
    }
}
