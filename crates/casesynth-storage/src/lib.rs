//! File-backed record store
//!
//! ```text
//! <root>/
//! ├── collections/
//! │   ├── incident.json            records + journal + attachment metadata
//! │   └── sn_hcls_patient.json
//! └── attachments/
//!     └── incident/<record id>/0-error_log.txt
//! ```
//!
//! Every mutation is written through before the call returns, so records
//! created earlier in a batch survive a crash later in the batch. Collection
//! documents are replaced atomically (write to a temp file, then rename).


use anyhow::Context;
use casesynth_core::{
    Collection, Fields, JournalEntry, NoteKind, RecordFilter, RecordId, RecordStore, StoreError,
    StoredAttachment, StoredRecord, Value,
};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const COLLECTIONS_DIR: &str = "collections";
const ATTACHMENTS_DIR: &str = "attachments";

pub struct FileStore {
    root: PathBuf,
    collections: RwLock<BTreeMap<String, Collection>>,
}

impl FileStore {
    /// Open (or create) a store rooted at `root`, loading every collection.
    pub fn open(root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let dir = root.join(COLLECTIONS_DIR);
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        std::fs::create_dir_all(root.join(ATTACHMENTS_DIR))?;

        let mut collections = BTreeMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                tracing::warn!(path = %path.display(), "skipping collection with non UTF-8 name");
                continue;
            };
            let contents = std::fs::read_to_string(&path)?;
            let collection: Collection =
                serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
            tracing::debug!(collection = name, records = collection.records.len(), "loaded collection");
            collections.insert(name.to_string(), collection);
        }

        Ok(Self {
            root,
            collections: RwLock::new(collections),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, |c| c.records.len())
    }

    /// A record with its journal and attachments, blobs included.
    pub fn record(&self, collection: &str, id: &RecordId) -> Result<Option<StoredRecord>, StoreError> {
        let Some(mut record) = self
            .collections
            .read()
            .get(collection)
            .and_then(|c| c.find(id))
            .cloned()
        else {
            return Ok(None);
        };
        for (index, attachment) in record.attachments.iter_mut().enumerate() {
            let path = self.blob_path(collection, id, index, &attachment.file_name)?;
            attachment.content = std::fs::read(&path)
                .map_err(|e| StoreError::Attachment(format!("{}: {e}", path.display())))?;
        }
        Ok(Some(record))
    }

    fn collection_path(&self, collection: &str) -> Result<PathBuf, StoreError> {
        check_name("collection", collection)?;
        Ok(self.root.join(COLLECTIONS_DIR).join(format!("{collection}.json")))
    }

    fn blob_path(&self, collection: &str, id: &RecordId, index: usize, file_name: &str) -> Result<PathBuf, StoreError> {
        check_name("collection", collection)?;
        check_name("record id", id.as_str())?;
        check_name("file name", file_name)?;
        Ok(self
            .root
            .join(ATTACHMENTS_DIR)
            .join(collection)
            .join(id.as_str())
            .join(format!("{index}-{file_name}")))
    }

    fn write_collection(&self, name: &str, collection: &Collection) -> Result<(), StoreError> {
        let path = self.collection_path(name)?;
        let json = serde_json::to_string_pretty(collection).map_err(|e| StoreError::Persistence(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .and_then(|()| std::fs::rename(&tmp, &path))
            .map_err(|e| StoreError::Persistence(format!("{}: {e}", path.display())))
    }

    /// Apply `change` to a copy of the collection, write it, then publish.
    fn mutate<T>(
        &self,
        collection: &str,
        change: impl FnOnce(&mut Collection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut collections = self.collections.write();
        let mut updated = collections.get(collection).cloned().unwrap_or_default();
        let out = change(&mut updated)?;
        self.write_collection(collection, &updated)?;
        collections.insert(collection.to_string(), updated);
        Ok(out)
    }
}

/// Names become path components; keep them to one plain segment.
fn check_name(what: &str, name: &str) -> Result<(), StoreError> {
    let ok = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if ok {
        Ok(())
    } else {
        Err(StoreError::Persistence(format!("invalid {what} `{name}`")))
    }
}

fn not_found(collection: &str, id: &RecordId) -> StoreError {
    StoreError::NotFound {
        collection: collection.to_string(),
        id: id.to_string(),
    }
}

impl RecordStore for FileStore {
    fn insert(&self, collection: &str, fields: &Fields) -> Result<RecordId, StoreError> {
        let id = RecordId::generate();
        self.mutate(collection, |c| {
            c.records.push(StoredRecord {
                id: id.clone(),
                fields: fields.clone(),
                ..Default::default()
            });
            Ok(())
        })?;
        tracing::debug!(collection, record_id = %id, "inserted");
        Ok(id)
    }

    fn get(&self, collection: &str, id: &RecordId) -> Result<Option<Fields>, StoreError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|c| c.find(id))
            .map(|r| r.fields.clone()))
    }

    fn update(&self, collection: &str, id: &RecordId, fields: &Fields) -> Result<(), StoreError> {
        self.mutate(collection, |c| {
            let record = c.find_mut(id).ok_or_else(|| not_found(collection, id))?;
            for (k, v) in fields {
                record.fields.insert(k.clone(), v.clone());
            }
            Ok(())
        })
    }

    fn query(&self, collection: &str, filter: Option<&RecordFilter>) -> Result<Vec<RecordId>, StoreError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|c| c.ids(filter))
            .unwrap_or_default())
    }

    /// The blob is written first; if the collection document then fails to
    /// write, the blob is removed again.
    fn attach(
        &self,
        collection: &str,
        id: &RecordId,
        file_name: &str,
        mime_type: &str,
        content: &[u8],
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write();
        let mut updated = collections.get(collection).cloned().unwrap_or_default();
        let record = updated
            .find_mut(id)
            .ok_or_else(|| StoreError::Attachment(format!("no record {id} in `{collection}`")))?;
        let path = self
            .blob_path(collection, id, record.attachments.len(), file_name)
            .map_err(|e| StoreError::Attachment(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Attachment(format!("{}: {e}", parent.display())))?;
        }
        std::fs::write(&path, content).map_err(|e| StoreError::Attachment(format!("{}: {e}", path.display())))?;
        record.attachments.push(StoredAttachment {
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            content: Vec::new(),
            created_at: Utc::now(),
        });

        if let Err(e) = self.write_collection(collection, &updated) {
            if let Err(cleanup) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %cleanup, "orphaned attachment blob");
            }
            return Err(StoreError::Attachment(e.to_string()));
        }
        collections.insert(collection.to_string(), updated);
        Ok(())
    }

    /// Journal entry plus the platform-style journal field and author.
    fn append_note(
        &self,
        collection: &str,
        id: &RecordId,
        kind: NoteKind,
        text: &str,
        author: &str,
    ) -> Result<(), StoreError> {
        self.mutate(collection, |c| {
            let record = c.find_mut(id).ok_or_else(|| not_found(collection, id))?;
            record
                .fields
                .insert(kind.journal_field().to_string(), Value::text(text));
            record
                .fields
                .insert("sys_updated_by".to_string(), Value::text(author));
            record.journal.push(JournalEntry {
                kind,
                text: text.to_string(),
                author: author.to_string(),
                created_at: Utc::now(),
            });
            Ok(())
        })
    }
}
