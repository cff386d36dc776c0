//! Integration tests for the complete case synthesis pipeline
//!
//! These tests drive the orchestrator end to end against the file store:
//! - Registry → Synthesizer → FileStore
//! - Annotations and attachments on persisted records
//! - Batch behavior with a failing unit
//! - Engine configuration files
//!
//! Run with: cargo test --test integration_tests

use casesynth_core::{
    catalog, CaseTypeOverride, CaseTypeRegistry, ContentError, ContentGenerator, Created, EchoGenerator,
    EngineConfig, Fields, NoteKind, Phase, RecordFilter, RecordId, RecordStore, StoreError, SynthesisError,
    SynthesisOrchestrator, TextGenerator, Value,
};
use casesynth_storage::FileStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::tempdir;

// ============================================================================
// Helpers
// ============================================================================

fn seeded_config() -> EngineConfig {
    EngineConfig::default().with_seed(42)
}

fn orchestrator<S: RecordStore>(store: S, config: EngineConfig) -> SynthesisOrchestrator<S> {
    orchestrator_with(store, config, Box::new(EchoGenerator))
}

fn orchestrator_with<S: RecordStore>(
    store: S,
    config: EngineConfig,
    generator: Box<dyn TextGenerator>,
) -> SynthesisOrchestrator<S> {
    let registry = CaseTypeRegistry::from_config(&config).unwrap();
    let content = ContentGenerator::new(generator).with_fallback(config.fallback_text.clone());
    SynthesisOrchestrator::new(registry, store, content, config).unwrap()
}

/// Counts every store call and fails the nth insert into one collection.
struct FlakyStore<'a> {
    inner: &'a FileStore,
    fail_collection: &'static str,
    fail_on_insert: usize,
    inserts: AtomicUsize,
    calls: AtomicUsize,
}

impl<'a> FlakyStore<'a> {
    fn new(inner: &'a FileStore, fail_collection: &'static str, fail_on_insert: usize) -> Self {
        Self {
            inner,
            fail_collection,
            fail_on_insert,
            inserts: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RecordStore for FlakyStore<'_> {
    fn insert(&self, collection: &str, fields: &Fields) -> Result<RecordId, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if collection == self.fail_collection {
            let n = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.fail_on_insert {
                return Err(StoreError::Persistence("disk quota exceeded".to_string()));
            }
        }
        self.inner.insert(collection, fields)
    }

    fn get(&self, collection: &str, id: &RecordId) -> Result<Option<Fields>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(collection, id)
    }

    fn update(&self, collection: &str, id: &RecordId, fields: &Fields) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.update(collection, id, fields)
    }

    fn query(&self, collection: &str, filter: Option<&RecordFilter>) -> Result<Vec<RecordId>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.query(collection, filter)
    }

    fn attach(&self, collection: &str, id: &RecordId, file_name: &str, mime: &str, content: &[u8]) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.attach(collection, id, file_name, mime, content)
    }

    fn append_note(&self, collection: &str, id: &RecordId, kind: NoteKind, text: &str, author: &str) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.append_note(collection, id, kind, text, author)
    }
}

struct Unreachable;

impl TextGenerator for Unreachable {
    fn generate(&self, _prompt: &str) -> Result<String, ContentError> {
        Err(ContentError::Request("connection refused".to_string()))
    }
}

// ============================================================================
// Every case type
// ============================================================================

#[test]
fn test_every_builtin_type_creates_a_record_with_attachment() {
    let dir = tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let mut orch = orchestrator(&store, seeded_config());

    for schema in catalog::builtin() {
        let description = schema.requires_short_description.then_some("Printer on fire");
        let created = orch.create_case(&schema.id, description, None).unwrap();
        let ids = created.ids();
        assert_eq!(ids.len(), 1, "{}", schema.id);

        let record = store.record(&schema.target_collection, &ids[0]).unwrap().unwrap();
        assert_eq!(record.attachments.len(), 1, "{}", schema.id);
        assert_eq!(record.attachments[0].file_name, schema.attachment.file_name);
        assert!(!record.attachments[0].content.is_empty());
        assert_eq!(record.journal.len(), schema.annotation_plan.len(), "{}", schema.id);
        for planned in &schema.field_plan {
            assert!(record.fields.contains_key(&planned.name), "{}.{}", schema.id, planned.name);
        }
    }
}

#[test]
fn test_interactive_types_return_single_receipts() {
    let dir = tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let mut orch = orchestrator(&store, seeded_config());

    let created = orch.create_case("hr_case", Some("Benefits question"), None).unwrap();
    let Created::Single(receipt) = created else {
        panic!("hr_case is not batchable");
    };
    let fields = store.get("sn_hr_core_case", &receipt.record_id).unwrap().unwrap();
    assert_eq!(fields["short_description"], Value::text("Benefits question"));
    assert_eq!(fields["hr_service_type"], Value::text("employee_relations"));
    assert_eq!(receipt.notes_appended, 2);
    assert!(receipt.attached);
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_unknown_type_makes_no_store_calls() {
    let dir = tempdir().unwrap();
    let file_store = FileStore::open(dir.path()).unwrap();
    let store = FlakyStore::new(&file_store, "incident", 0);
    let mut orch = orchestrator(&store, seeded_config());

    let err = orch.create_case("spaceship", Some("x"), Some(3)).unwrap_err();
    assert_eq!(err, SynthesisError::UnknownCaseType("spaceship".to_string()));
    assert_eq!(store.calls(), 0);
}

#[test]
fn test_empty_description_is_rejected_before_any_call() {
    let dir = tempdir().unwrap();
    let file_store = FileStore::open(dir.path()).unwrap();
    let store = FlakyStore::new(&file_store, "incident", 0);
    let mut orch = orchestrator(&store, seeded_config());

    for description in [None, Some(""), Some("   ")] {
        let err = orch.create_case("incident", description, None).unwrap_err();
        assert!(matches!(err, SynthesisError::MissingRequiredInput { .. }), "{err}");
    }
    assert_eq!(store.calls(), 0);
    assert_eq!(file_store.len("incident"), 0);
}

#[test]
fn test_batch_of_non_batchable_type_is_rejected() {
    let dir = tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let mut orch = orchestrator(&store, seeded_config());

    let err = orch.create_case("incident", Some("X"), Some(2)).unwrap_err();
    assert_eq!(
        err,
        SynthesisError::BatchNotSupported {
            case_type: "incident".to_string(),
            requested: 2,
        }
    );
    assert_eq!(store.len("incident"), 0);
}

// ============================================================================
// Batches
// ============================================================================

#[test]
fn test_batch_skips_failed_unit_and_keeps_order() {
    let dir = tempdir().unwrap();
    let file_store = FileStore::open(dir.path()).unwrap();
    let store = FlakyStore::new(&file_store, "sn_hcls_claim_header", 2);
    let mut orch = orchestrator(&store, seeded_config());

    let created = orch.create_case("healthcare_claim", None, Some(3)).unwrap();
    let Created::Batch(batch) = created else {
        panic!("healthcare_claim is batchable");
    };
    assert_eq!(batch.requested, 3);
    assert_eq!(batch.created.len(), 2);
    assert!(!batch.is_complete());
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].unit, 2);
    assert_eq!(batch.failures[0].phase, Phase::Persisting);
    assert!(matches!(batch.failures[0].error, SynthesisError::PersistenceFailure { .. }));

    let stored = file_store.query("sn_hcls_claim_header", None).unwrap();
    assert_eq!(stored, batch.ids());
}

#[test]
fn test_batch_shares_one_placeholder_patient() {
    let dir = tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let mut orch = orchestrator(&store, seeded_config());

    let created = orch.create_case("claim_dispute", None, Some(3)).unwrap();
    assert_eq!(created.ids().len(), 3);
    assert_eq!(store.len(catalog::PATIENT_COLLECTION), 1);

    let numbers: Vec<Value> = created
        .ids()
        .iter()
        .map(|id| store.get("u_claimdispute", id).unwrap().unwrap()["number"].clone())
        .collect();
    assert_eq!(
        numbers,
        vec![Value::text("CD0000001"), Value::text("CD0000002"), Value::text("CD0000003")]
    );
}

#[test]
fn test_zero_cases_means_one() {
    let dir = tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let mut orch = orchestrator(&store, seeded_config());

    let created = orch.create_case("change_request", None, Some(0)).unwrap();
    assert_eq!(created.ids().len(), 1);
    assert_eq!(store.len("change_request"), 1);
}

// ============================================================================
// Annotations and content
// ============================================================================

#[test]
fn test_notes_follow_plan_order_and_authors() {
    let dir = tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let config = seeded_config();
    let caller = config.identity("incident_caller").unwrap().to_string();
    let agent = config.identity("agent_user").unwrap().to_string();
    let mut orch = orchestrator(&store, config);

    let id = orch.create_case("incident", Some("Email bounced"), None).unwrap().ids()[0].clone();
    let record = store.record("incident", &id).unwrap().unwrap();

    assert_eq!(record.journal.len(), 2);
    assert_eq!(record.journal[0].kind, NoteKind::NoteFromRequester);
    assert_eq!(record.journal[0].author, caller);
    assert!(record.journal[0].text.contains("Email bounced"));
    assert_eq!(record.journal[1].kind, NoteKind::NoteFromAgent);
    assert_eq!(record.journal[1].author, agent);
    assert_eq!(record.fields["work_notes"], Value::text(record.journal[1].text.as_str()));
    assert_eq!(record.fields["sys_updated_by"], Value::text(agent.as_str()));
}

#[test]
fn test_unreachable_generator_falls_back() {
    let dir = tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let config = EngineConfig {
        fallback_text: "N/A".to_string(),
        ..seeded_config()
    };
    let mut orch = orchestrator_with(&store, config, Box::new(Unreachable));

    let created = orch.create_case("incident", Some("Laptop won't boot"), None).unwrap();
    let receipt = &created.receipts()[0];
    let degraded = receipt
        .warnings
        .iter()
        .filter(|w| matches!(w, SynthesisError::ContentGenerationDegraded(_)))
        .count();
    // description, two notes, attachment
    assert_eq!(degraded, 4);

    let record = store.record("incident", &receipt.record_id).unwrap().unwrap();
    assert_eq!(record.fields["description"], Value::text("N/A"));
    assert_eq!(record.attachments[0].content, b"N/A".to_vec());
}

// ============================================================================
// Persistence and configuration
// ============================================================================

#[test]
fn test_records_survive_reopen() {
    let dir = tempdir().unwrap();
    let ids = {
        let store = FileStore::open(dir.path()).unwrap();
        let mut orch = orchestrator(&store, seeded_config());
        orch.create_case("pre_authorization", None, Some(2)).unwrap().ids()
    };

    let reopened = FileStore::open(dir.path()).unwrap();
    assert_eq!(reopened.query(catalog::PRE_AUTH_COLLECTION, None).unwrap(), ids);
    let record = reopened.record(catalog::PRE_AUTH_COLLECTION, &ids[1]).unwrap().unwrap();
    assert_eq!(record.journal.len(), 2);
    assert_eq!(record.attachments[0].file_name, "error_log.txt");
}

#[test]
fn test_config_file_overrides_flags() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("casesynth.json");
    let mut config = seeded_config();
    config.case_types.insert(
        "incident".to_string(),
        CaseTypeOverride {
            requires_short_description: Some(false),
            allows_batch: Some(true),
        },
    );
    config.save(&path).unwrap();

    let loaded = EngineConfig::load(&path).unwrap();
    assert_eq!(loaded, config);

    let store = FileStore::open(dir.path().join("store")).unwrap();
    let mut orch = orchestrator(&store, loaded);
    let created = orch.create_case("incident", None, Some(2)).unwrap();
    assert!(matches!(created, Created::Batch(_)));
    assert_eq!(store.len("incident"), 2);
}

#[test]
fn test_same_seed_same_fields() {
    let run = || {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let mut orch = orchestrator(&store, seeded_config());
        let id = orch.create_case("change_request", None, None).unwrap().ids()[0].clone();
        let mut fields = store.get("change_request", &id).unwrap().unwrap();
        // Clock-dependent.
        fields.remove("start_date");
        fields.remove("end_date");
        fields
    };
    assert_eq!(run(), run());
}
