//! Case synthesis engine
//!
//! Builds synthetic case records (incidents, HR cases, healthcare claims,
//! ...) from declarative schemas, persists them through a [`RecordStore`],
//! then appends follow-up notes and a file attachment.
//!
//! ```text
//!            create_case(type, short_description?, n?)
//!                              │
//!                  ┌───────────▼────────────┐
//!                  │ SynthesisOrchestrator  │──► CaseTypeRegistry
//!                  └───────────┬────────────┘
//!                 per unit     │
//!       ┌──────────────────────┼───────────────────────┐
//!       ▼                      ▼                       ▼
//!  RecordSynthesizer ──► FieldValueGenerator    AnnotationAttacher
//!       │                      │                       │
//!       │ insert ×1            │ query/get             │ append_note ×N, attach ×1
//!       ▼                      ▼                       ▼
//!  ┌────────────────────── RecordStore ─────────────────────────┐
//!  └────────────────────────────────────────────────────────────┘
//!                 ContentGenerator ──► TextGenerator (LLM, echo, ...)
//! ```
//!
//! All calls are synchronous. Content generation never fails past
//! [`ContentGenerator`]; degraded output is reported as a warning.

pub mod annotate;
pub mod catalog;
pub mod config;
pub mod content;
pub mod error;
pub mod field;
pub mod orchestrator;
pub mod registry;
pub mod schema;
pub mod store;
pub mod synth;
pub mod template;
pub mod value;

pub use annotate::{AnnotationAttacher, AnnotationReport, AuthorContext, AuthorScope};
pub use config::{CaseTypeOverride, ConfigError, EngineConfig, CASESYNTH_CONFIG_ENV, DEFAULT_MAX_BATCH_SIZE};
pub use content::{
    ContentError, ContentGenerator, DisabledGenerator, EchoGenerator, Generated, TextGenerator,
    DEFAULT_FALLBACK_TEXT,
};
pub use error::{Result, SynthesisError};
pub use field::{CaseInputs, FieldValueGenerator, ResolutionContext};
pub use orchestrator::{BatchReceipt, CaseReceipt, Created, Phase, SynthesisOrchestrator, UnitFailure};
pub use registry::{CaseTypeRegistry, RegistryError};
pub use schema::{
    AnnotationSpec, AttachmentSpec, AuthorRef, CaseTypeSchema, FieldSpec, FilterOperand, LookupFallback,
    LookupFilter, NoteKind, NumericBound, PlannedField, RecordFilter,
};
pub use store::{Collection, JournalEntry, MemoryStore, RecordStore, StoreError, StoredAttachment, StoredRecord};
pub use synth::{RecordSynthesizer, SynthesizedRecord};
pub use value::{Fields, RecordId, Value, TIMESTAMP_FORMAT};
