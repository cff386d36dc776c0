//! Record synthesis: resolve a schema's field plan, then insert once.

use crate::config::EngineConfig;
use crate::content::ContentGenerator;
use crate::error::{Result, SynthesisError};
use crate::field::{CaseInputs, FieldValueGenerator, ResolutionContext};
use crate::schema::CaseTypeSchema;
use crate::store::RecordStore;
use crate::template;
use crate::value::{Fields, RecordId, Value};
use chrono::{DateTime, FixedOffset};
use rand::Rng;
use tracing::{debug, info, trace};

/// A record built from a schema, before and after persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedRecord {
    pub case_type: String,
    pub collection: String,
    pub fields: Fields,
    /// Assigned by the store; `None` until persisted.
    pub record_id: Option<RecordId>,
    pub warnings: Vec<SynthesisError>,
    inputs: Fields,
}

impl SynthesizedRecord {
    /// Render `{placeholder}` text against the record and its caller inputs.
    pub fn render(&self, text: &str) -> String {
        template::render(text, |name| self.lookup(name))
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).or_else(|| self.inputs.get(name))
    }
}

pub struct RecordSynthesizer<'a> {
    store: &'a dyn RecordStore,
    fields: FieldValueGenerator<'a>,
}

impl<'a> RecordSynthesizer<'a> {
    pub fn new(store: &'a dyn RecordStore, content: &'a ContentGenerator, config: &'a EngineConfig) -> Self {
        Self {
            store,
            fields: FieldValueGenerator::new(store, content, config),
        }
    }

    /// Check caller inputs against the schema. Touches nothing external.
    pub fn validate(schema: &CaseTypeSchema, inputs: &CaseInputs) -> Result<()> {
        if schema.requires_short_description && inputs.short_description().is_none() {
            return Err(SynthesisError::MissingRequiredInput {
                case_type: schema.id.clone(),
                input: "short_description".to_string(),
            });
        }
        Ok(())
    }

    /// Resolve every planned field in declared order.
    pub fn resolve<R: Rng>(
        &self,
        schema: &CaseTypeSchema,
        inputs: &CaseInputs,
        now: DateTime<FixedOffset>,
        rng: &mut R,
    ) -> Result<SynthesizedRecord> {
        Self::validate(schema, inputs)?;

        let mut ctx = ResolutionContext::new(&schema.id, &schema.target_collection, inputs, now);
        for planned in &schema.field_plan {
            let value = self.fields.resolve(&planned.name, &planned.spec, &mut ctx, rng)?;
            trace!(field = %planned.name, kind = planned.spec.kind_name(), value = %value, "resolved field");
            ctx.record(&planned.name, value);
        }

        let (inputs, fields, warnings) = ctx.into_parts();
        debug!(case_type = %schema.id, fields = fields.len(), warnings = warnings.len(), "field plan resolved");
        Ok(SynthesizedRecord {
            case_type: schema.id.clone(),
            collection: schema.target_collection.clone(),
            fields,
            record_id: None,
            warnings,
            inputs,
        })
    }

    /// Insert the record. Exactly one store insert per call.
    pub fn persist(&self, record: &mut SynthesizedRecord) -> Result<RecordId> {
        let id = self
            .store
            .insert(&record.collection, &record.fields)
            .map_err(|e| SynthesisError::persistence(&record.collection, &e))?;
        if id.is_empty() {
            return Err(SynthesisError::PersistenceFailure {
                collection: record.collection.clone(),
                message: "insert returned no identifier".to_string(),
            });
        }
        info!(case_type = %record.case_type, collection = %record.collection, record_id = %id, "record created");
        record.record_id = Some(id.clone());
        Ok(id)
    }

    /// Resolve then persist.
    pub fn synthesize<R: Rng>(
        &self,
        schema: &CaseTypeSchema,
        inputs: &CaseInputs,
        now: DateTime<FixedOffset>,
        rng: &mut R,
    ) -> Result<SynthesizedRecord> {
        let mut record = self.resolve(schema, inputs, now, rng)?;
        self.persist(&mut record)?;
        Ok(record)
    }
}
