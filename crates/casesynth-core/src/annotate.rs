//! Follow-up notes and the file attachment of a persisted record.
//!
//! Best effort: a failing note is reported and skipped, the remaining notes
//! and the attachment still run. Each note is written while the author
//! context is switched to the note's author; the switch is undone by
//! [`AuthorScope`] on every exit path.

use crate::config::EngineConfig;
use crate::content::ContentGenerator;
use crate::error::SynthesisError;
use crate::schema::{AnnotationSpec, AttachmentSpec, AuthorRef};
use crate::store::RecordStore;
use crate::synth::SynthesizedRecord;
use crate::value::RecordId;
use tracing::{debug, warn};

/// Identity the engine acts as when writing to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorContext {
    caller: String,
    current: String,
}

impl AuthorContext {
    pub fn new(caller: impl Into<String>) -> Self {
        let caller = caller.into();
        Self {
            current: caller.clone(),
            caller,
        }
    }

    pub fn caller(&self) -> &str {
        &self.caller
    }

    /// Identity writes are currently attributed to.
    pub fn current(&self) -> &str {
        &self.current
    }

    /// Act as `author` until the returned scope is dropped.
    pub fn impersonate(&mut self, author: &str) -> AuthorScope<'_> {
        let previous = std::mem::replace(&mut self.current, author.to_string());
        debug!(author, previous = %previous, "author switched");
        AuthorScope { ctx: self, previous }
    }
}

/// Restores the previous author when dropped.
#[must_use = "the author is restored as soon as the scope is dropped"]
pub struct AuthorScope<'a> {
    ctx: &'a mut AuthorContext,
    previous: String,
}

impl AuthorScope<'_> {
    pub fn author(&self) -> &str {
        &self.ctx.current
    }
}

impl Drop for AuthorScope<'_> {
    fn drop(&mut self) {
        self.ctx.current = std::mem::take(&mut self.previous);
        debug!(author = %self.ctx.current, "author restored");
    }
}

/// Outcome of annotating one record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationReport {
    pub notes_appended: usize,
    pub attached: bool,
    pub warnings: Vec<SynthesisError>,
}

pub struct AnnotationAttacher<'a> {
    store: &'a dyn RecordStore,
    content: &'a ContentGenerator,
    config: &'a EngineConfig,
}

impl<'a> AnnotationAttacher<'a> {
    pub fn new(store: &'a dyn RecordStore, content: &'a ContentGenerator, config: &'a EngineConfig) -> Self {
        Self { store, content, config }
    }

    /// Append `plan` in order, then attach exactly one file. Never fails.
    pub fn attach(
        &self,
        id: &RecordId,
        record: &SynthesizedRecord,
        plan: &[AnnotationSpec],
        attachment: &AttachmentSpec,
        authors: &mut AuthorContext,
    ) -> AnnotationReport {
        let mut report = AnnotationReport::default();
        let collection = record.collection.as_str();

        for (index, note) in plan.iter().enumerate() {
            let author = match self.author(record, &note.author) {
                Ok(author) => author,
                Err(message) => {
                    warn!(record_id = %id, index, error = %message, "note skipped");
                    report.warnings.push(SynthesisError::AnnotationFailure { index, message });
                    continue;
                }
            };

            let scope = authors.impersonate(&author);
            let generated = self.content.generate(&record.render(&note.prompt));
            if let Some(err) = &generated.degraded {
                report
                    .warnings
                    .push(SynthesisError::ContentGenerationDegraded(format!("note {index}: {err}")));
            }
            match self
                .store
                .append_note(collection, id, note.kind, &generated.text, scope.author())
            {
                Ok(()) => report.notes_appended += 1,
                Err(e) => {
                    warn!(record_id = %id, index, error = %e, "note could not be appended");
                    report.warnings.push(SynthesisError::AnnotationFailure {
                        index,
                        message: e.to_string(),
                    });
                }
            }
        }

        let generated = self.content.generate(&record.render(&attachment.prompt));
        if let Some(err) = &generated.degraded {
            report
                .warnings
                .push(SynthesisError::ContentGenerationDegraded(format!("attachment: {err}")));
        }
        match self.store.attach(
            collection,
            id,
            &attachment.file_name,
            &attachment.mime_type,
            generated.text.as_bytes(),
        ) {
            Ok(()) => report.attached = true,
            Err(e) => {
                warn!(record_id = %id, file_name = %attachment.file_name, error = %e, "attachment failed");
                report.warnings.push(SynthesisError::AttachmentFailure {
                    file_name: attachment.file_name.clone(),
                    message: e.to_string(),
                });
            }
        }

        report
    }

    fn author(&self, record: &SynthesizedRecord, author: &AuthorRef) -> Result<String, String> {
        match author {
            AuthorRef::Field { field } => record
                .fields
                .get(field)
                .and_then(|v| v.as_record_id())
                .map(|id| id.to_string())
                .ok_or_else(|| format!("author field `{field}` has no value")),
            AuthorRef::Identity { name } => self
                .config
                .identity(name)
                .map(str::to_string)
                .ok_or_else(|| format!("author identity `{name}` is not configured")),
        }
    }
}
