use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{LiveListError, Result};

/// Column names used to decode raw records into [`Row`]s and to evaluate
/// [`Filters`](super::Filters) against them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSchema {
    #[serde(default = "default_id_column")]
    pub id_column: String,

    #[serde(default = "default_tenant_column")]
    pub tenant_column: String,

    /// Column the list is ordered by (e.g. `issue_date`, `created_at`).
    #[serde(default = "default_sort_column")]
    pub sort_column: String,

    #[serde(default = "default_status_column")]
    pub status_column: String,

    /// Columns matched case-insensitively by the search text.
    #[serde(default)]
    pub search_columns: Vec<String>,
}

fn default_id_column() -> String {
    "id".to_string()
}

fn default_tenant_column() -> String {
    "tenant_id".to_string()
}

fn default_sort_column() -> String {
    "created_at".to_string()
}

fn default_status_column() -> String {
    "status".to_string()
}

impl Default for RowSchema {
    fn default() -> Self {
        Self {
            id_column: default_id_column(),
            tenant_column: default_tenant_column(),
            sort_column: default_sort_column(),
            status_column: default_status_column(),
            search_columns: Vec::new(),
        }
    }
}

impl RowSchema {
    pub fn with_sort_column(mut self, column: impl Into<String>) -> Self {
        self.sort_column = column.into();
        self
    }

    pub fn with_search_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_columns = columns.into_iter().map(Into::into).collect();
        self
    }
}

/// A record of the listed table.
///
/// `fields` holds every column of the decoded record (including id, tenant
/// and sort columns); the typed fields are what ordering and isolation rely on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: String,
    pub tenant_id: String,
    pub sort_key: DateTime<Utc>,
    #[serde(default)]
    pub fields: Map<String, JsonValue>,
}

impl Row {
    pub fn new(id: impl Into<String>, tenant_id: impl Into<String>, sort_key: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            sort_key,
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&JsonValue> {
        self.fields.get(name)
    }

    /// Decode a raw JSON record using `schema`.
    pub fn from_record(record: &JsonValue, schema: &RowSchema) -> Result<Self> {
        let object = record
            .as_object()
            .ok_or_else(|| LiveListError::Decode("record is not a JSON object".to_string()))?;

        let id = scalar_to_string(object.get(&schema.id_column)).ok_or_else(|| {
            LiveListError::Decode(format!("missing id column '{}'", schema.id_column))
        })?;
        let tenant_id = scalar_to_string(object.get(&schema.tenant_column)).ok_or_else(|| {
            LiveListError::Decode(format!("missing tenant column '{}'", schema.tenant_column))
        })?;
        let sort_key = object
            .get(&schema.sort_column)
            .ok_or_else(|| {
                LiveListError::Decode(format!("missing sort column '{}'", schema.sort_column))
            })
            .and_then(parse_timestamp)?;

        Ok(Self {
            id,
            tenant_id,
            sort_key,
            fields: object.clone(),
        })
    }
}

/// Extract the tenant of a raw record without decoding the rest of it.
pub fn record_tenant(record: &JsonValue, schema: &RowSchema) -> Option<String> {
    scalar_to_string(record.get(&schema.tenant_column))
}

/// Extract the id of a raw record without decoding the rest of it.
pub fn record_id(record: &JsonValue, schema: &RowSchema) -> Option<String> {
    scalar_to_string(record.get(&schema.id_column))
}

fn scalar_to_string(value: Option<&JsonValue>) -> Option<String> {
    match value? {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accepts RFC 3339, naive `YYYY-MM-DDTHH:MM:SS[.f]` (read as UTC),
/// plain dates (midnight UTC) and integer epoch milliseconds.
pub fn parse_timestamp(value: &JsonValue) -> Result<DateTime<Utc>> {
    match value {
        JsonValue::String(s) => {
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Ok(ts.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                return Ok(naive.and_utc());
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Ok(naive.and_utc());
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                    return Ok(midnight.and_utc());
                }
            }
            Err(LiveListError::Decode(format!("unparseable timestamp '{}'", s)))
        },
        JsonValue::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| LiveListError::Decode(format!("timestamp out of range: {}", n))),
        other => Err(LiveListError::Decode(format!("unsupported timestamp value: {}", other))),
    }
}
