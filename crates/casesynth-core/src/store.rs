//! Record store collaborator interface and an in-memory implementation.

use crate::schema::{NoteKind, RecordFilter};
use crate::value::{Fields, RecordId, Value};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("record {id} not found in `{collection}`")]
    NotFound { collection: String, id: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("attachment failure: {0}")]
    Attachment(String),
}

/// External CRUD store the engine writes synthesized records into.
///
/// All calls are blocking. Implementations own their consistency model;
/// the engine only assumes read-your-writes within one call sequence.
pub trait RecordStore: Send + Sync {
    /// Insert a record and return its identifier.
    fn insert(&self, collection: &str, fields: &Fields) -> Result<RecordId, StoreError>;

    /// Fetch a record's fields; `Ok(None)` when the id is unknown.
    fn get(&self, collection: &str, id: &RecordId) -> Result<Option<Fields>, StoreError>;

    /// Merge `fields` into an existing record.
    fn update(&self, collection: &str, id: &RecordId, fields: &Fields) -> Result<(), StoreError>;

    /// Identifiers in `collection`, in insertion order, optionally filtered.
    fn query(&self, collection: &str, filter: Option<&RecordFilter>) -> Result<Vec<RecordId>, StoreError>;

    /// Attach a file to a record.
    fn attach(
        &self,
        collection: &str,
        id: &RecordId,
        file_name: &str,
        mime_type: &str,
        content: &[u8],
    ) -> Result<(), StoreError>;

    /// Append a journal note attributed to `author`.
    ///
    /// The default writes the text into the kind's journal field through
    /// `update`, the way the platform's journal fields behave.
    fn append_note(
        &self,
        collection: &str,
        id: &RecordId,
        kind: NoteKind,
        text: &str,
        author: &str,
    ) -> Result<(), StoreError> {
        let mut fields = Fields::new();
        fields.insert(kind.journal_field().to_string(), Value::text(text));
        fields.insert("sys_updated_by".to_string(), Value::text(author));
        self.update(collection, id, &fields)
    }
}

impl<S: RecordStore + ?Sized> RecordStore for &S {
    fn insert(&self, collection: &str, fields: &Fields) -> Result<RecordId, StoreError> {
        (**self).insert(collection, fields)
    }

    fn get(&self, collection: &str, id: &RecordId) -> Result<Option<Fields>, StoreError> {
        (**self).get(collection, id)
    }

    fn update(&self, collection: &str, id: &RecordId, fields: &Fields) -> Result<(), StoreError> {
        (**self).update(collection, id, fields)
    }

    fn query(&self, collection: &str, filter: Option<&RecordFilter>) -> Result<Vec<RecordId>, StoreError> {
        (**self).query(collection, filter)
    }

    fn attach(
        &self,
        collection: &str,
        id: &RecordId,
        file_name: &str,
        mime_type: &str,
        content: &[u8],
    ) -> Result<(), StoreError> {
        (**self).attach(collection, id, file_name, mime_type, content)
    }

    fn append_note(
        &self,
        collection: &str,
        id: &RecordId,
        kind: NoteKind,
        text: &str,
        author: &str,
    ) -> Result<(), StoreError> {
        (**self).append_note(collection, id, kind, text, author)
    }
}

// ============================================================================
// Stored shapes shared by store implementations
// ============================================================================

/// A journal entry as kept by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub kind: NoteKind,
    pub text: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

/// Attachment metadata plus content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAttachment {
    pub file_name: String,
    pub mime_type: String,
    /// Not part of serialized documents; file-backed stores keep blobs apart.
    #[serde(skip)]
    pub content: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// A record with its journal and attachments.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    pub fields: Fields,
    #[serde(default)]
    pub journal: Vec<JournalEntry>,
    #[serde(default)]
    pub attachments: Vec<StoredAttachment>,
}

/// Records of one collection in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Collection {
    pub records: Vec<StoredRecord>,
}

impl Collection {
    pub fn find(&self, id: &RecordId) -> Option<&StoredRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    pub fn find_mut(&mut self, id: &RecordId) -> Option<&mut StoredRecord> {
        self.records.iter_mut().find(|r| &r.id == id)
    }

    pub fn ids(&self, filter: Option<&RecordFilter>) -> Vec<RecordId> {
        self.records
            .iter()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.fields)))
            .map(|r| r.id.clone())
            .collect()
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Thread-safe in-memory store. Useful for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a collection with a record under a known id.
    pub fn seed(&self, collection: &str, id: &str, fields: Fields) -> RecordId {
        let id = RecordId::new(id);
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .records
            .push(StoredRecord {
                id: id.clone(),
                fields,
                ..Default::default()
            });
        id
    }

    pub fn record(&self, collection: &str, id: &RecordId) -> Option<StoredRecord> {
        self.collections
            .read()
            .get(collection)
            .and_then(|c| c.find(id))
            .cloned()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, |c| c.records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.collections.read().values().all(|c| c.records.is_empty())
    }
}

impl RecordStore for MemoryStore {
    fn insert(&self, collection: &str, fields: &Fields) -> Result<RecordId, StoreError> {
        let id = RecordId::generate();
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .records
            .push(StoredRecord {
                id: id.clone(),
                fields: fields.clone(),
                ..Default::default()
            });
        Ok(id)
    }

    fn get(&self, collection: &str, id: &RecordId) -> Result<Option<Fields>, StoreError> {
        Ok(self.record(collection, id).map(|r| r.fields))
    }

    fn update(&self, collection: &str, id: &RecordId, fields: &Fields) -> Result<(), StoreError> {
        let mut collections = self.collections.write();
        let record = collections
            .get_mut(collection)
            .and_then(|c| c.find_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        for (k, v) in fields {
            record.fields.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    fn query(&self, collection: &str, filter: Option<&RecordFilter>) -> Result<Vec<RecordId>, StoreError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|c| c.ids(filter))
            .unwrap_or_default())
    }

    fn attach(
        &self,
        collection: &str,
        id: &RecordId,
        file_name: &str,
        mime_type: &str,
        content: &[u8],
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write();
        let record = collections
            .get_mut(collection)
            .and_then(|c| c.find_mut(id))
            .ok_or_else(|| StoreError::Attachment(format!("no record {id} in `{collection}`")))?;
        record.attachments.push(StoredAttachment {
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            content: content.to_vec(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    fn append_note(
        &self,
        collection: &str,
        id: &RecordId,
        kind: NoteKind,
        text: &str,
        author: &str,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write();
        let record = collections
            .get_mut(collection)
            .and_then(|c| c.find_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        record.journal.push(JournalEntry {
            kind,
            text: text.to_string(),
            author: author.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }
}
