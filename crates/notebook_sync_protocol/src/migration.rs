//! Schema migration descriptors.
//!
//! When the local schema lags the version the server expects, the client
//! sends a [`MigrationDescriptor`] naming the range it needs. The server
//! answers with [`MigrationStep`]s that the client applies, in order, after
//! folding in the pulled changeset.
//!
//! Migrations are additive: tables and columns are only ever added.

use crate::cursor::SchemaVersion;
use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};

/// The schema range a client needs to catch up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationDescriptor {
    /// Current local schema version.
    pub from: SchemaVersion,
    /// Version the server expects.
    pub to: SchemaVersion,
}

impl MigrationDescriptor {
    /// Returns a descriptor if `local` lags `target`.
    pub fn between(local: SchemaVersion, target: SchemaVersion) -> Option<Self> {
        (local < target).then_some(Self {
            from: local,
            to: target,
        })
    }

    /// Returns true if a step with this version belongs to the range.
    pub fn covers(&self, version: SchemaVersion) -> bool {
        version > self.from && version <= self.to
    }

    /// Selects the steps in range from a full migration history.
    pub fn select<'a>(
        &self,
        history: impl IntoIterator<Item = &'a MigrationStep>,
    ) -> Vec<MigrationStep> {
        let mut steps: Vec<MigrationStep> = history
            .into_iter()
            .filter(|step| self.covers(step.version))
            .cloned()
            .collect();
        steps.sort_by_key(|step| step.version);
        steps
    }

    /// Checks that `steps` form the contiguous chain `from + 1 ..= to`.
    ///
    /// An empty list is accepted: the server had nothing to offer and the
    /// client stays at its current version.
    pub fn validate_chain(&self, steps: &[MigrationStep]) -> ProtocolResult<()> {
        if steps.is_empty() {
            return Ok(());
        }

        let mut expected = self.from + 1;
        for step in steps {
            if step.version != expected {
                return Err(ProtocolError::InvalidMigration(format!(
                    "expected step {}, got {}",
                    expected, step.version
                )));
            }
            expected += 1;
        }

        if expected - 1 != self.to {
            return Err(ProtocolError::InvalidMigration(format!(
                "chain ends at {}, target is {}",
                expected - 1,
                self.to
            )));
        }
        Ok(())
    }

    /// Encodes to the JSON form carried in the pull query string.
    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes from the JSON form carried in the pull query string.
    pub fn from_json(json: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// One additive schema change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MigrationOperation {
    /// A new table.
    CreateTable {
        /// Table name.
        table: String,
        /// Column names.
        columns: Vec<String>,
    },
    /// New columns on an existing table.
    AddColumns {
        /// Table name.
        table: String,
        /// Column names.
        columns: Vec<String>,
    },
}

/// The operations that bring a schema to `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStep {
    /// Schema version reached after this step.
    pub version: SchemaVersion,
    /// Operations, applied in order.
    pub operations: Vec<MigrationOperation>,
}

impl MigrationStep {
    /// Creates a step.
    pub fn new(version: SchemaVersion, operations: Vec<MigrationOperation>) -> Self {
        Self {
            version,
            operations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(version: SchemaVersion) -> MigrationStep {
        MigrationStep::new(
            version,
            vec![MigrationOperation::AddColumns {
                table: "notes".into(),
                columns: vec![format!("col_v{version}")],
            }],
        )
    }

    #[test]
    fn between_only_when_lagging() {
        assert_eq!(
            MigrationDescriptor::between(1, 3),
            Some(MigrationDescriptor { from: 1, to: 3 })
        );
        assert_eq!(MigrationDescriptor::between(3, 3), None);
        assert_eq!(MigrationDescriptor::between(4, 3), None);
    }

    #[test]
    fn select_filters_and_orders() {
        let history = vec![step(4), step(2), step(1), step(3)];
        let descriptor = MigrationDescriptor { from: 1, to: 3 };
        let versions: Vec<_> = descriptor
            .select(&history)
            .iter()
            .map(|s| s.version)
            .collect();
        assert_eq!(versions, vec![2, 3]);
    }

    #[test]
    fn chain_validation() {
        let descriptor = MigrationDescriptor { from: 1, to: 3 };
        assert!(descriptor.validate_chain(&[]).is_ok());
        assert!(descriptor.validate_chain(&[step(2), step(3)]).is_ok());
        assert!(descriptor.validate_chain(&[step(3)]).is_err());
        assert!(descriptor.validate_chain(&[step(2)]).is_err());
        assert!(descriptor.validate_chain(&[step(3), step(2)]).is_err());
        assert!(descriptor.validate_chain(&[step(2), step(3), step(4)]).is_err());
    }

    #[test]
    fn operation_wire_shape() {
        let op = MigrationOperation::CreateTable {
            table: "setlists".into(),
            columns: vec!["name".into()],
        };
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({"type": "create_table", "table": "setlists", "columns": ["name"]})
        );
    }

    #[test]
    fn descriptor_query_json() {
        let descriptor = MigrationDescriptor { from: 2, to: 5 };
        let json = descriptor.to_json().unwrap();
        assert_eq!(json, r#"{"from":2,"to":5}"#);
        assert_eq!(MigrationDescriptor::from_json(&json).unwrap(), descriptor);
        assert!(MigrationDescriptor::from_json("nope").is_err());
    }
}
