use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::row::{record_id, record_tenant, Row, RowSchema};
use crate::error::{LiveListError, Result};

/// Kind of change carried by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Loosely-typed notification payload as delivered by the transport.
///
/// Decoded exactly once into a [`ChangeEvent`] at the channel boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    #[serde(rename = "eventType")]
    pub event_type: ChangeKind,

    #[serde(default, rename = "new", alias = "newRecord", skip_serializing_if = "Option::is_none")]
    pub new_record: Option<JsonValue>,

    #[serde(default, rename = "old", alias = "oldRecord", skip_serializing_if = "Option::is_none")]
    pub old_record: Option<JsonValue>,

    /// Commit timestamp reported by the store, used to suppress duplicates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<String>,
}

impl RawChange {
    pub fn from_json_str(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Tenant the payload claims to belong to (new record first).
    pub fn tenant_id(&self, schema: &RowSchema) -> Option<String> {
        self.new_record
            .as_ref()
            .and_then(|r| record_tenant(r, schema))
            .or_else(|| self.old_record.as_ref().and_then(|r| record_tenant(r, schema)))
    }

    /// Key identifying this notification for duplicate suppression.
    pub fn dedup_key(&self, schema: &RowSchema) -> Option<String> {
        let commit = self.commit_timestamp.as_deref()?;
        let id = self
            .new_record
            .as_ref()
            .and_then(|r| record_id(r, schema))
            .or_else(|| self.old_record.as_ref().and_then(|r| record_id(r, schema)))?;
        Some(format!("{:?}:{}:{}", self.event_type, id, commit))
    }
}

/// Typed row change.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Insert(Row),
    Update {
        row: Row,
        /// Previous values, when the transport sends a full old record.
        old: Option<Row>,
    },
    Delete {
        id: String,
        old: Option<Row>,
    },
}

/// A decoded change notification for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: String,
    pub tenant_id: String,
    pub change: Change,
}

impl ChangeEvent {
    pub fn insert(table: impl Into<String>, row: Row) -> Self {
        Self {
            table: table.into(),
            tenant_id: row.tenant_id.clone(),
            change: Change::Insert(row),
        }
    }

    pub fn update(table: impl Into<String>, row: Row) -> Self {
        Self {
            table: table.into(),
            tenant_id: row.tenant_id.clone(),
            change: Change::Update { row, old: None },
        }
    }

    pub fn delete(table: impl Into<String>, tenant_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            tenant_id: tenant_id.into(),
            change: Change::Delete {
                id: id.into(),
                old: None,
            },
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self.change {
            Change::Insert(_) => ChangeKind::Insert,
            Change::Update { .. } => ChangeKind::Update,
            Change::Delete { .. } => ChangeKind::Delete,
        }
    }

    /// Id of the affected row.
    pub fn row_id(&self) -> &str {
        match &self.change {
            Change::Insert(row) | Change::Update { row, .. } => &row.id,
            Change::Delete { id, .. } => id,
        }
    }

    /// The new version of the row, for inserts and updates.
    pub fn new_row(&self) -> Option<&Row> {
        match &self.change {
            Change::Insert(row) | Change::Update { row, .. } => Some(row),
            Change::Delete { .. } => None,
        }
    }

    /// Decode a raw payload for `table`.
    pub fn decode(table: &str, raw: &RawChange, schema: &RowSchema) -> Result<Self> {
        let tenant_id = raw
            .tenant_id(schema)
            .ok_or_else(|| LiveListError::Decode("notification carries no tenant".to_string()))?;

        let change = match raw.event_type {
            ChangeKind::Insert => {
                let record = raw.new_record.as_ref().ok_or_else(|| {
                    LiveListError::Decode("INSERT without new record".to_string())
                })?;
                Change::Insert(Row::from_record(record, schema)?)
            },
            ChangeKind::Update => {
                let record = raw.new_record.as_ref().ok_or_else(|| {
                    LiveListError::Decode("UPDATE without new record".to_string())
                })?;
                Change::Update {
                    row: Row::from_record(record, schema)?,
                    old: raw
                        .old_record
                        .as_ref()
                        .and_then(|r| Row::from_record(r, schema).ok()),
                }
            },
            ChangeKind::Delete => {
                let record = raw.old_record.as_ref().ok_or_else(|| {
                    LiveListError::Decode("DELETE without old record".to_string())
                })?;
                let id = record_id(record, schema).ok_or_else(|| {
                    LiveListError::Decode("DELETE old record has no id".to_string())
                })?;
                Change::Delete {
                    id,
                    old: Row::from_record(record, schema).ok(),
                }
            },
        };

        Ok(Self {
            table: table.to_string(),
            tenant_id,
            change,
        })
    }
}
