//! Immutable snapshot of reference encodings, one per identity.
//!
//! Rebuilt wholesale for every pipeline run from the current roster. At
//! classroom scale (tens to low hundreds of identities) a fresh build is
//! cheaper than keeping an incremental index consistent.

use crate::types::{FeatureVector, Identity, ReferenceEncoding, RosterEntry};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("registry is empty: no identity has a reference encoding")]
    Empty,
    #[error("reference for {roll} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        roll: String,
        expected: usize,
        actual: usize,
    },
    #[error("reference encodings have zero dimensions")]
    ZeroDimension,
    #[error("duplicate reference for roll {roll}")]
    DuplicateRoll { roll: String },
    #[error("reference for {roll} contains non-finite components")]
    NonFinite { roll: String },
}

/// Reference encodings sorted by roll, all of one dimensionality.
#[derive(Debug, Clone)]
pub struct Registry {
    encodings: Vec<ReferenceEncoding>,
    dim: usize,
}

impl Registry {
    /// Build a registry from `(identity, vector)` pairs.
    ///
    /// Fails on empty input, on mixed dimensionality, on a repeated roll,
    /// and on vectors with NaN or infinite components.
    pub fn build(
        pairs: impl IntoIterator<Item = (Identity, FeatureVector)>,
    ) -> Result<Self, RegistryError> {
        let mut encodings: Vec<ReferenceEncoding> = pairs
            .into_iter()
            .map(|(identity, vector)| ReferenceEncoding { identity, vector })
            .collect();

        let dim = match encodings.first() {
            Some(first) => first.vector.dim(),
            None => return Err(RegistryError::Empty),
        };
        if dim == 0 {
            return Err(RegistryError::ZeroDimension);
        }

        let mut seen = HashSet::with_capacity(encodings.len());
        for enc in &encodings {
            if enc.vector.dim() != dim {
                return Err(RegistryError::DimensionMismatch {
                    roll: enc.identity.roll.clone(),
                    expected: dim,
                    actual: enc.vector.dim(),
                });
            }
            if !enc.vector.is_finite() {
                return Err(RegistryError::NonFinite {
                    roll: enc.identity.roll.clone(),
                });
            }
            if !seen.insert(enc.identity.roll.as_str()) {
                return Err(RegistryError::DuplicateRoll {
                    roll: enc.identity.roll.clone(),
                });
            }
        }

        encodings.sort_by(|a, b| a.identity.roll.cmp(&b.identity.roll));

        tracing::debug!(references = encodings.len(), dim, "registry built");

        Ok(Self { encodings, dim })
    }

    /// Build from roster entries, returning the identities that have no
    /// reference vector alongside the registry.
    ///
    /// Unreferenced identities can never be matched; each one is logged so
    /// a failed registration does not go unnoticed.
    pub fn from_roster(
        entries: impl IntoIterator<Item = RosterEntry>,
    ) -> Result<(Self, Vec<Identity>), RegistryError> {
        let mut pairs = Vec::new();
        let mut unreferenced = Vec::new();

        for entry in entries {
            match entry.vector {
                Some(vector) => pairs.push((entry.identity, vector)),
                None => {
                    tracing::warn!(
                        roll = %entry.identity.roll,
                        name = %entry.identity.display_name,
                        "identity has no reference encoding and cannot be matched"
                    );
                    unreferenced.push(entry.identity);
                }
            }
        }

        let registry = Self::build(pairs)?;
        Ok((registry, unreferenced))
    }

    pub fn len(&self) -> usize {
        self.encodings.len()
    }

    /// Always false for a successfully built registry.
    pub fn is_empty(&self) -> bool {
        self.encodings.is_empty()
    }

    /// Dimensionality shared by every reference.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn encodings(&self) -> &[ReferenceEncoding] {
        &self.encodings
    }

    pub fn get(&self, roll: &str) -> Option<&ReferenceEncoding> {
        self.encodings
            .binary_search_by(|e| e.identity.roll.as_str().cmp(roll))
            .ok()
            .map(|i| &self.encodings[i])
    }
}
