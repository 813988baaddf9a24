//! Records and the drafts clients submit to create or replace them.

use crate::error::CollectionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Longest accepted record name, in characters.
pub const MAX_NAME_LEN: usize = 256;

/// A stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Store-assigned id.
    pub id: u64,

    pub name: String,

    pub value: f64,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Username of the client that added the record, if it authenticated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Record {
    /// Builds a record from a validated draft.
    pub(crate) fn from_draft(
        id: u64,
        draft: RecordDraft,
        owner: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: draft.name,
            value: draft.value,
            tags: draft.tags,
            owner,
            created_at,
        }
    }

    /// Replaces the client-editable fields, keeping id, owner and creation time.
    pub(crate) fn apply(&mut self, draft: RecordDraft) {
        self.name = draft.name;
        self.value = draft.value;
        self.tags = draft.tags;
    }

    /// Serializes the record for a response payload.
    pub fn to_value(&self) -> Result<Value, CollectionError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// The client-editable part of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordDraft {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RecordDraft {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Parses and validates a draft from a request payload.
    pub fn from_value(value: &Value) -> Result<Self, CollectionError> {
        let draft: RecordDraft = serde_json::from_value(value.clone())?;
        draft.validate()?;
        Ok(draft)
    }

    /// Checks the draft's fields.
    pub fn validate(&self) -> Result<(), CollectionError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.name.chars().count() > MAX_NAME_LEN {
            return Err(invalid(format!(
                "name longer than {} characters",
                MAX_NAME_LEN
            )));
        }
        if !self.value.is_finite() {
            return Err(invalid("value must be a finite number"));
        }
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err(invalid("tags must not be empty"));
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> CollectionError {
    CollectionError::InvalidRecord {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_draft_from_value() {
        let draft = RecordDraft::from_value(&json!({
            "name": "gauge",
            "value": 4.5,
            "tags": ["a", "b"]
        }))
        .unwrap();
        assert_eq!(draft.name, "gauge");
        assert_eq!(draft.value, 4.5);
        assert_eq!(draft.tags, vec!["a", "b"]);

        let draft = RecordDraft::from_value(&json!({"name": "bare", "value": 1})).unwrap();
        assert!(draft.tags.is_empty());
    }

    #[test]
    fn test_draft_rejects_bad_input() {
        assert!(matches!(
            RecordDraft::from_value(&json!({"name": "  ", "value": 1.0})),
            Err(CollectionError::InvalidRecord { .. })
        ));
        assert!(matches!(
            RecordDraft::from_value(&json!({"name": "x"})),
            Err(CollectionError::Json(_))
        ));
        assert!(matches!(
            RecordDraft::from_value(&json!({"name": "x", "value": 1, "id": 9})),
            Err(CollectionError::Json(_))
        ));
        assert!(matches!(
            RecordDraft::from_value(&json!({"name": "x", "value": 1, "tags": [""]})),
            Err(CollectionError::InvalidRecord { .. })
        ));
        assert!(RecordDraft::new("x", f64::NAN).validate().is_err());
        assert!(RecordDraft::new("n".repeat(MAX_NAME_LEN + 1), 1.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_apply_keeps_identity() {
        let created = Utc::now();
        let mut record = Record::from_draft(
            3,
            RecordDraft::new("old", 1.0),
            Some("alice".to_string()),
            created,
        );
        record.apply(RecordDraft::new("new", 2.0).with_tag("t"));

        assert_eq!(record.id, 3);
        assert_eq!(record.owner.as_deref(), Some("alice"));
        assert_eq!(record.created_at, created);
        assert_eq!(record.name, "new");
        assert_eq!(record.tags, vec!["t"]);
    }

    #[test]
    fn test_record_value_omits_missing_owner() {
        let record = Record::from_draft(1, RecordDraft::new("x", 0.0), None, Utc::now());
        let value = record.to_value().unwrap();
        assert!(value.get("owner").is_none());
        assert_eq!(value["id"], 1);
    }
}
