//! Engine configuration.
//!
//! Everything the source scripts hardcoded (default caller, CI, groups,
//! agent accounts, ...) lives in [`EngineConfig::identities`] and is
//! injected once at startup. Case types read identities by name through
//! `FieldSpec::Identity`.

use crate::schema::CaseTypeSchema;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const CASESYNTH_CONFIG_ENV: &str = "CASESYNTH_CONFIG";

pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Per-type flag overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseTypeOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_short_description: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allows_batch: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Named identifiers (users, groups, CIs, services).
    pub identities: BTreeMap<String, String>,
    /// Reference time zone for computed dates, minutes east of UTC.
    pub utc_offset_minutes: i32,
    /// Text used whenever content generation degrades.
    pub fallback_text: String,
    /// RNG seed; `None` draws from OS entropy.
    pub seed: Option<u64>,
    /// Largest `num_cases` a single call accepts.
    pub max_batch_size: usize,
    /// Flag overrides keyed by case type id.
    pub case_types: BTreeMap<String, CaseTypeOverride>,
    /// Additional case types registered after the built-in catalog.
    pub extra_case_types: Vec<CaseTypeSchema>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            identities: default_identities(),
            utc_offset_minutes: 0,
            fallback_text: crate::content::DEFAULT_FALLBACK_TEXT.to_string(),
            seed: None,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            case_types: BTreeMap::new(),
            extra_case_types: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `CASESYNTH_CONFIG` when set, otherwise defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(CASESYNTH_CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load(Path::new(path.trim())),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.offset()?;
        if self.max_batch_size == 0 {
            return Err(ConfigError::Invalid("max_batch_size must be at least 1".to_string()));
        }
        for (name, id) in &self.identities {
            if id.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("identity `{name}` is empty")));
            }
        }
        Ok(())
    }

    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "utc_offset_minutes {} is out of range",
                self.utc_offset_minutes
            ))
        })
    }

    /// Current time in the reference time zone.
    pub fn now(&self) -> Result<DateTime<FixedOffset>, ConfigError> {
        Ok(Utc::now().with_timezone(&self.offset()?))
    }

    pub fn identity(&self, name: &str) -> Option<&str> {
        self.identities.get(name).map(String::as_str)
    }

    pub fn with_identity(mut self, name: &str, id: &str) -> Self {
        self.identities.insert(name.to_string(), id.to_string());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Apply flag overrides to a schema.
    pub fn apply_overrides(&self, schema: &mut CaseTypeSchema) {
        if let Some(ov) = self.case_types.get(&schema.id) {
            if let Some(required) = ov.requires_short_description {
                schema.requires_short_description = required;
            }
            if let Some(batch) = ov.allows_batch {
                schema.allows_batch = batch;
            }
        }
    }
}

fn default_identities() -> BTreeMap<String, String> {
    [
        ("incident_caller", "62826bf03710200044e0bfc8bcbe5df1"),
        ("configuration_item", "3a6cdbdbc0a8ce01008ef85f28b07a41"),
        ("business_service", "26da329f0a0a0bb400f69d8159bc753d"),
        ("incident_assignment_group", "287ebd7da9fe198100f92cc8d1d2154e"),
        ("incident_location", "29a6c6bc0a0a0b5000d1f9d758c21531"),
        ("csm_contact", "60beb5e7d7600200e5982cf65e6103ad"),
        ("csm_account", "1b7346d4c6112276007f9d0efdb69cd2"),
        ("csm_product", "9f8d1294c6112276007f9d0efdb69cdb"),
        ("csm_agent", "46d44a5dc6112276007f9d0efdb69cd4"),
        ("hr_opened_for", "3fc87b58931eca10800fb45e1dba105c"),
        ("hr_subject_person", "3fc87b58931eca10800fb45e1dba105c"),
        ("hr_assignment_group", "d625dccec0a8016700a222a0f7900d6c"),
        ("hr_service", "e228cde49f331200d9011977677fcf05"),
        ("agent_user", "a8f98bb0eb32010045e1a5115206fe3a"),
        ("change_assignment_group", "287ebd7da9fe198100f92cc8d1d2154e"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
