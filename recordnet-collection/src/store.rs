//! In-memory record storage.

use crate::error::CollectionError;
use crate::record::{Record, RecordDraft};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hands out record ids.
///
/// Ids start at 1 and are never reused, even after `clear`.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self { next: first.max(1) }
    }

    /// Returns the next id.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next = self.next.saturating_add(1);
        id
    }

    /// Returns the id the next call to `next_id` will hand out.
    pub fn peek(&self) -> u64 {
        self.next
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary returned by the `info` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreInfo {
    pub kind: String,
    pub created_at: DateTime<Utc>,
    pub len: usize,
}

/// Records ordered by id.
#[derive(Debug)]
pub struct RecordStore {
    records: BTreeMap<u64, Record>,
    ids: IdGenerator,
    created_at: DateTime<Utc>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::with_ids(IdGenerator::new())
    }

    pub fn with_ids(ids: IdGenerator) -> Self {
        Self {
            records: BTreeMap::new(),
            ids,
            created_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Record> {
        self.records.get(&id)
    }

    /// Iterates records in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn info(&self) -> StoreInfo {
        StoreInfo {
            kind: "BTreeMap<u64, Record>".to_string(),
            created_at: self.created_at,
            len: self.records.len(),
        }
    }

    /// Validates and inserts a draft, returning the stored record.
    pub fn insert(
        &mut self,
        draft: RecordDraft,
        owner: Option<String>,
    ) -> Result<&Record, CollectionError> {
        draft.validate()?;
        let id = self.ids.next_id();
        let record = Record::from_draft(id, draft, owner, Utc::now());
        Ok(self.records.entry(id).or_insert(record))
    }

    /// Replaces the editable fields of an existing record.
    pub fn update(&mut self, id: u64, draft: RecordDraft) -> Result<&Record, CollectionError> {
        draft.validate()?;
        let record = self
            .records
            .get_mut(&id)
            .ok_or(CollectionError::RecordNotFound { id })?;
        record.apply(draft);
        Ok(record)
    }

    pub fn remove(&mut self, id: u64) -> Result<Record, CollectionError> {
        self.records
            .remove(&id)
            .ok_or(CollectionError::RecordNotFound { id })
    }

    /// Removes every record, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        removed
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let mut store = RecordStore::new();
        let a = store.insert(RecordDraft::new("a", 1.0), None).unwrap().id;
        let b = store
            .insert(RecordDraft::new("b", 2.0), Some("bob".to_string()))
            .unwrap()
            .id;
        assert_eq!((a, b), (1, 2));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(2).unwrap().owner.as_deref(), Some("bob"));
    }

    #[test]
    fn test_insert_rejects_invalid_draft() {
        let mut store = RecordStore::new();
        assert!(store.insert(RecordDraft::new("", 1.0), None).is_err());
        assert!(store.is_empty());
        // A rejected draft does not consume an id.
        assert_eq!(store.insert(RecordDraft::new("ok", 1.0), None).unwrap().id, 1);
    }

    #[test]
    fn test_update_and_remove() {
        let mut store = RecordStore::new();
        let id = store.insert(RecordDraft::new("a", 1.0), None).unwrap().id;

        let updated = store.update(id, RecordDraft::new("b", 5.0)).unwrap();
        assert_eq!(updated.name, "b");
        assert_eq!(updated.id, id);

        assert!(matches!(
            store.update(99, RecordDraft::new("c", 0.0)),
            Err(CollectionError::RecordNotFound { id: 99 })
        ));

        assert_eq!(store.remove(id).unwrap().name, "b");
        assert!(matches!(
            store.remove(id),
            Err(CollectionError::RecordNotFound { .. })
        ));
    }

    #[test]
    fn test_ids_not_reused_after_clear() {
        let mut store = RecordStore::new();
        store.insert(RecordDraft::new("a", 1.0), None).unwrap();
        store.insert(RecordDraft::new("b", 1.0), None).unwrap();
        assert_eq!(store.clear(), 2);
        assert_eq!(store.info().len, 0);
        assert_eq!(store.insert(RecordDraft::new("c", 1.0), None).unwrap().id, 3);
    }

    #[test]
    fn test_id_generator() {
        let mut ids = IdGenerator::starting_at(0);
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.peek(), 2);

        let mut ids = IdGenerator::starting_at(u64::MAX);
        assert_eq!(ids.next_id(), u64::MAX);
        assert_eq!(ids.peek(), u64::MAX);
    }

    proptest! {
        #[test]
        fn prop_iteration_is_id_ordered(ops in prop::collection::vec(any::<bool>(), 1..64)) {
            let mut store = RecordStore::new();
            for (i, insert) in ops.iter().enumerate() {
                if *insert || store.is_empty() {
                    store.insert(RecordDraft::new(format!("r{}", i), i as f64), None).unwrap();
                } else {
                    let first = store.iter().next().map(|r| r.id).unwrap();
                    store.remove(first).unwrap();
                }
            }
            let ids: Vec<u64> = store.iter().map(|r| r.id).collect();
            prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
