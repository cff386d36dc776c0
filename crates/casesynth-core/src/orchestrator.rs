//! Public entry point: validate, synthesize, annotate, aggregate.
//!
//! ```text
//! Validating ──► Resolving ──► Persisting ──► Annotating ──► Done
//!     │              │              │
//!     └──────────────┴──────────────┴──────────► Failed
//! ```
//!
//! Validation failures end the call before any store or generator call.
//! For batchable types a failing unit is recorded and the batch moves on;
//! for other types the first failure is the result.

use crate::annotate::{AnnotationAttacher, AuthorContext};
use crate::config::{ConfigError, EngineConfig};
use crate::content::ContentGenerator;
use crate::error::{Result, SynthesisError};
use crate::field::CaseInputs;
use crate::registry::CaseTypeRegistry;
use crate::schema::CaseTypeSchema;
use crate::store::RecordStore;
use crate::synth::RecordSynthesizer;
use crate::value::RecordId;
use chrono::{DateTime, FixedOffset, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use tracing::{debug, info, info_span, warn};

/// Identity the engine acts as outside of note authorship.
pub const DEFAULT_CALLER: &str = "system";

/// Per-unit state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Validating,
    Resolving,
    Persisting,
    Annotating,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Validating => "validating",
            Phase::Resolving => "resolving",
            Phase::Persisting => "persisting",
            Phase::Annotating => "annotating",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One created record.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseReceipt {
    pub case_type: String,
    pub collection: String,
    pub record_id: RecordId,
    pub notes_appended: usize,
    pub attached: bool,
    /// Recovered problems: degraded content, failed notes or attachment.
    pub warnings: Vec<SynthesisError>,
}

/// A unit of a batch that produced no record.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitFailure {
    /// 1-based position in the batch.
    pub unit: usize,
    /// Phase the unit was in when it failed.
    pub phase: Phase,
    pub error: SynthesisError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReceipt {
    pub case_type: String,
    pub requested: usize,
    /// Successful units in unit order.
    pub created: Vec<CaseReceipt>,
    pub failures: Vec<UnitFailure>,
}

impl BatchReceipt {
    pub fn ids(&self) -> Vec<RecordId> {
        self.created.iter().map(|r| r.record_id.clone()).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.created.len() == self.requested
    }
}

/// Result of [`SynthesisOrchestrator::create_case`].
#[derive(Debug, Clone, PartialEq)]
pub enum Created {
    Single(CaseReceipt),
    Batch(BatchReceipt),
}

impl Created {
    pub fn ids(&self) -> Vec<RecordId> {
        match self {
            Created::Single(receipt) => vec![receipt.record_id.clone()],
            Created::Batch(batch) => batch.ids(),
        }
    }

    pub fn receipts(&self) -> &[CaseReceipt] {
        match self {
            Created::Single(receipt) => std::slice::from_ref(receipt),
            Created::Batch(batch) => &batch.created,
        }
    }
}

pub struct SynthesisOrchestrator<S> {
    registry: CaseTypeRegistry,
    store: S,
    content: ContentGenerator,
    config: EngineConfig,
    offset: FixedOffset,
    rng: StdRng,
    authors: AuthorContext,
    clock: Option<DateTime<FixedOffset>>,
}

impl<S: RecordStore> SynthesisOrchestrator<S> {
    pub fn new(
        registry: CaseTypeRegistry,
        store: S,
        content: ContentGenerator,
        config: EngineConfig,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let offset = config.offset()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            registry,
            store,
            content,
            config,
            offset,
            rng,
            authors: AuthorContext::new(DEFAULT_CALLER),
            clock: None,
        })
    }

    /// Pin "now" for computed dates.
    pub fn with_clock(mut self, now: DateTime<FixedOffset>) -> Self {
        self.clock = Some(now);
        self
    }

    pub fn with_caller(mut self, caller: &str) -> Self {
        self.authors = AuthorContext::new(caller);
        self
    }

    pub fn registry(&self) -> &CaseTypeRegistry {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create one record, or `num_cases` records for batchable types.
    ///
    /// `num_cases` of `None` or `0` means one; more than
    /// [`EngineConfig::max_batch_size`] is rejected up front.
    pub fn create_case(
        &mut self,
        case_type: &str,
        short_description: Option<&str>,
        num_cases: Option<usize>,
    ) -> Result<Created> {
        let span = info_span!("create_case", case_type);
        let _enter = span.enter();

        debug!(phase = %Phase::Validating, "start");
        let schema = self.registry.lookup(case_type)?;
        let inputs = CaseInputs::new(short_description);
        RecordSynthesizer::validate(&schema, &inputs)?;

        let requested = num_cases.filter(|&n| n > 0).unwrap_or(1);
        if requested > 1 && !schema.allows_batch {
            return Err(SynthesisError::BatchNotSupported {
                case_type: schema.id.clone(),
                requested,
            });
        }
        if requested > self.config.max_batch_size {
            return Err(SynthesisError::BatchTooLarge {
                case_type: schema.id.clone(),
                requested,
                limit: self.config.max_batch_size,
            });
        }

        if !schema.allows_batch {
            return self
                .run_unit(&schema, &inputs, 1)
                .map(Created::Single)
                .map_err(|failure| failure.error);
        }

        let mut batch = BatchReceipt {
            case_type: schema.id.clone(),
            requested,
            created: Vec::new(),
            failures: Vec::new(),
        };
        for unit in 1..=requested {
            match self.run_unit(&schema, &inputs, unit) {
                Ok(receipt) => batch.created.push(receipt),
                Err(failure) => {
                    warn!(unit, phase = %failure.phase, error = %failure.error, "batch unit skipped");
                    batch.failures.push(failure);
                }
            }
        }
        info!(requested, created = batch.created.len(), "batch finished");
        Ok(Created::Batch(batch))
    }

    fn now(&self) -> DateTime<FixedOffset> {
        self.clock
            .unwrap_or_else(|| Utc::now().with_timezone(&self.offset))
    }

    fn run_unit(
        &mut self,
        schema: &CaseTypeSchema,
        inputs: &CaseInputs,
        unit: usize,
    ) -> std::result::Result<CaseReceipt, UnitFailure> {
        let now = self.now();
        let Self {
            store,
            content,
            config,
            rng,
            authors,
            ..
        } = self;
        let store: &dyn RecordStore = &*store;
        let synthesizer = RecordSynthesizer::new(store, content, config);
        let fail = |phase: Phase, error: SynthesisError| {
            debug!(unit, phase = %Phase::Failed, failed_in = %phase, "unit failed");
            UnitFailure { unit, phase, error }
        };

        debug!(unit, phase = %Phase::Resolving, "transition");
        let mut record = synthesizer
            .resolve(schema, inputs, now, rng)
            .map_err(|e| fail(Phase::Resolving, e))?;

        debug!(unit, phase = %Phase::Persisting, "transition");
        let id = synthesizer
            .persist(&mut record)
            .map_err(|e| fail(Phase::Persisting, e))?;

        debug!(unit, phase = %Phase::Annotating, record_id = %id, "transition");
        let report = AnnotationAttacher::new(store, content, config).attach(
            &id,
            &record,
            &schema.annotation_plan,
            &schema.attachment,
            authors,
        );

        let mut warnings = record.warnings;
        warnings.extend(report.warnings);
        debug!(unit, phase = %Phase::Done, record_id = %id, warnings = warnings.len(), "transition");
        Ok(CaseReceipt {
            case_type: schema.id.clone(),
            collection: schema.target_collection.clone(),
            record_id: id,
            notes_appended: report.notes_appended,
            attached: report.attached,
            warnings,
        })
    }
}
