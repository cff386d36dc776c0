//! Case type registry.

use crate::catalog;
use crate::config::EngineConfig;
use crate::error::SynthesisError;
use crate::schema::CaseTypeSchema;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("case type `{0}` is already registered")]
    Duplicate(String),
    #[error("case type `{case_type}` declares field `{field}` more than once")]
    DuplicateField { case_type: String, field: String },
    #[error("case type `{0}` has an empty id or target collection")]
    Incomplete(String),
}

/// Maps case type ids to immutable schemas.
#[derive(Debug, Clone, Default)]
pub struct CaseTypeRegistry {
    schemas: BTreeMap<String, Arc<CaseTypeSchema>>,
}

impl CaseTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in catalog plus configured extras, with flag overrides applied.
    pub fn from_config(config: &EngineConfig) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for mut schema in catalog::builtin().into_iter().chain(config.extra_case_types.iter().cloned()) {
            config.apply_overrides(&mut schema);
            registry.register(schema)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, schema: CaseTypeSchema) -> Result<(), RegistryError> {
        if schema.id.trim().is_empty() || schema.target_collection.trim().is_empty() {
            return Err(RegistryError::Incomplete(schema.id));
        }
        if self.schemas.contains_key(&schema.id) {
            return Err(RegistryError::Duplicate(schema.id));
        }
        let mut seen = BTreeSet::new();
        for name in schema.field_names() {
            if !seen.insert(name) {
                return Err(RegistryError::DuplicateField {
                    case_type: schema.id.clone(),
                    field: name.to_string(),
                });
            }
        }
        self.schemas.insert(schema.id.clone(), Arc::new(schema));
        Ok(())
    }

    pub fn lookup(&self, case_type: &str) -> Result<Arc<CaseTypeSchema>, SynthesisError> {
        self.schemas
            .get(case_type)
            .cloned()
            .ok_or_else(|| SynthesisError::UnknownCaseType(case_type.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &CaseTypeSchema> {
        self.schemas.values().map(AsRef::as_ref)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
