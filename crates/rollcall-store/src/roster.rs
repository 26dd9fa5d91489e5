//! Enrolled identities and their reference vectors.

use crate::{lock, SharedConnection, StoreError};
use rollcall_core::{FeatureVector, Identity, RosterEntry};
use rusqlite::{params, OptionalExtension};

pub struct SqliteRoster {
    conn: SharedConnection,
}

impl SqliteRoster {
    pub(crate) fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// Enroll or re-enroll an identity.
    ///
    /// `vector` is `None` when the registration photograph yielded no face;
    /// the identity is still stored so it shows up as unreferenced. A vector
    /// must match the dimensionality of the other enrolled references.
    pub fn enroll(
        &self,
        identity: &Identity,
        vector: Option<&FeatureVector>,
    ) -> Result<(), StoreError> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;

        let encoded = match vector {
            Some(v) => {
                if !v.is_finite() {
                    return Err(StoreError::NonFinite {
                        roll: identity.roll.clone(),
                    });
                }
                let existing: Option<String> = tx
                    .query_row(
                        "SELECT vector FROM identities
                         WHERE vector IS NOT NULL AND roll != ?1 LIMIT 1",
                        params![identity.roll],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(json) = existing {
                    let other: FeatureVector = serde_json::from_str(&json)?;
                    if other.dim() != v.dim() {
                        return Err(StoreError::DimensionMismatch {
                            roll: identity.roll.clone(),
                            expected: other.dim(),
                            actual: v.dim(),
                        });
                    }
                }
                Some(serde_json::to_string(v)?)
            }
            None => None,
        };

        tx.execute(
            "INSERT INTO identities (roll, display_name, vector, enrolled_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(roll) DO UPDATE SET
                display_name = excluded.display_name,
                vector = excluded.vector,
                enrolled_at = excluded.enrolled_at",
            params![
                identity.roll,
                identity.display_name,
                encoded,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        tx.commit()?;

        if vector.is_some() {
            tracing::info!(roll = %identity.roll, name = %identity.display_name, "identity enrolled");
        } else {
            tracing::warn!(
                roll = %identity.roll,
                name = %identity.display_name,
                "identity enrolled without a reference encoding"
            );
        }
        Ok(())
    }

    /// Remove an identity. Past attendance records are kept.
    pub fn remove(&self, roll: &str) -> Result<bool, StoreError> {
        let conn = lock(&self.conn)?;
        let removed = conn.execute("DELETE FROM identities WHERE roll = ?1", params![roll])?;
        if removed > 0 {
            tracing::info!(roll, "identity removed");
        }
        Ok(removed > 0)
    }

    /// All enrolled identities, ordered by roll.
    pub fn entries(&self) -> Result<Vec<RosterEntry>, StoreError> {
        let conn = lock(&self.conn)?;
        let mut stmt =
            conn.prepare("SELECT roll, display_name, vector FROM identities ORDER BY roll")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(roll, display_name, vector)| {
                let vector = vector
                    .map(|json| serde_json::from_str::<FeatureVector>(&json))
                    .transpose()?;
                Ok(RosterEntry {
                    identity: Identity { roll, display_name },
                    vector,
                })
            })
            .collect()
    }
}
