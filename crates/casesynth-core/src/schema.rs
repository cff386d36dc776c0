//! Case type schemas and the field specification language.
//!
//! A [`CaseTypeSchema`] is pure data: where records go, which caller inputs
//! are required, whether batches are allowed, and the ordered field plan
//! that the synthesizer walks. Schemas are serde types so that additional
//! case types can be declared in the engine configuration file.

use crate::value::{Fields, Value};
use serde::{Deserialize, Serialize};

/// One synthesizable case type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseTypeSchema {
    pub id: String,
    pub target_collection: String,
    #[serde(default)]
    pub requires_short_description: bool,
    #[serde(default)]
    pub allows_batch: bool,
    /// Resolved in declared order; later entries may reference earlier ones.
    pub field_plan: Vec<PlannedField>,
    #[serde(default)]
    pub annotation_plan: Vec<AnnotationSpec>,
    #[serde(default)]
    pub attachment: AttachmentSpec,
}

impl CaseTypeSchema {
    pub fn new(id: &str, target_collection: &str) -> Self {
        Self {
            id: id.to_string(),
            target_collection: target_collection.to_string(),
            requires_short_description: false,
            allows_batch: false,
            field_plan: Vec::new(),
            annotation_plan: Vec::new(),
            attachment: AttachmentSpec::default(),
        }
    }

    pub fn requiring_short_description(mut self) -> Self {
        self.requires_short_description = true;
        self
    }

    pub fn batchable(mut self) -> Self {
        self.allows_batch = true;
        self
    }

    pub fn field(mut self, name: &str, spec: FieldSpec) -> Self {
        self.field_plan.push(PlannedField {
            name: name.to_string(),
            spec,
        });
        self
    }

    pub fn note(mut self, kind: NoteKind, author: AuthorRef, prompt: &str) -> Self {
        self.annotation_plan.push(AnnotationSpec {
            kind,
            author,
            prompt: prompt.to_string(),
        });
        self
    }

    pub fn with_attachment(mut self, attachment: AttachmentSpec) -> Self {
        self.attachment = attachment;
        self
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.field_plan.iter().map(|f| f.name.as_str())
    }
}

/// A field name paired with the rule producing its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedField {
    pub name: String,
    pub spec: FieldSpec,
}

/// Rule for producing one field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldSpec {
    Constant {
        value: Value,
    },
    RandomChoice {
        choices: Vec<Value>,
    },
    RandomNumericRange {
        min: NumericBound,
        max: NumericBound,
        precision: u32,
    },
    RandomPatternString {
        prefix: String,
        digits: usize,
    },
    GeneratedText {
        prompt: String,
    },
    RelatedRecordLookup {
        collection: String,
        #[serde(default)]
        filter: Option<LookupFilter>,
        #[serde(default)]
        fallback: LookupFallback,
    },
    ComputedDate {
        offset_days: i64,
    },
    /// Identifier taken from the configured identity table.
    Identity {
        name: String,
    },
    /// `{placeholder}` text rendered from earlier fields and caller inputs.
    Template {
        text: String,
    },
    /// A field read from the record referenced by an earlier field.
    RelatedField {
        reference: String,
        collection: String,
        field: String,
        #[serde(default)]
        default: Value,
    },
    /// Next `prefix` + zero-padded number after the highest one stored.
    NextSequence {
        prefix: String,
        width: usize,
    },
}

impl FieldSpec {
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Constant {
            value: value.into(),
        }
    }

    pub fn choice<V: Into<Value>>(choices: impl IntoIterator<Item = V>) -> Self {
        Self::RandomChoice {
            choices: choices.into_iter().map(Into::into).collect(),
        }
    }

    pub fn range(min: impl Into<NumericBound>, max: impl Into<NumericBound>, precision: u32) -> Self {
        Self::RandomNumericRange {
            min: min.into(),
            max: max.into(),
            precision,
        }
    }

    pub fn pattern(prefix: &str, digits: usize) -> Self {
        Self::RandomPatternString {
            prefix: prefix.to_string(),
            digits,
        }
    }

    pub fn generated(prompt: &str) -> Self {
        Self::GeneratedText {
            prompt: prompt.to_string(),
        }
    }

    pub fn lookup(collection: &str, filter: Option<LookupFilter>, fallback: LookupFallback) -> Self {
        Self::RelatedRecordLookup {
            collection: collection.to_string(),
            filter,
            fallback,
        }
    }

    pub fn date(offset_days: i64) -> Self {
        Self::ComputedDate { offset_days }
    }

    pub fn identity(name: &str) -> Self {
        Self::Identity {
            name: name.to_string(),
        }
    }

    pub fn template(text: &str) -> Self {
        Self::Template {
            text: text.to_string(),
        }
    }

    pub fn related_field(reference: &str, collection: &str, field: &str, default: impl Into<Value>) -> Self {
        Self::RelatedField {
            reference: reference.to_string(),
            collection: collection.to_string(),
            field: field.to_string(),
            default: default.into(),
        }
    }

    pub fn sequence(prefix: &str, width: usize) -> Self {
        Self::NextSequence {
            prefix: prefix.to_string(),
            width,
        }
    }

    /// Whether resolving this spec reads from the record store.
    pub fn queries_store(&self) -> bool {
        matches!(
            self,
            Self::RelatedRecordLookup { .. } | Self::RelatedField { .. } | Self::NextSequence { .. }
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Constant { .. } => "constant",
            Self::RandomChoice { .. } => "random_choice",
            Self::RandomNumericRange { .. } => "random_numeric_range",
            Self::RandomPatternString { .. } => "random_pattern_string",
            Self::GeneratedText { .. } => "generated_text",
            Self::RelatedRecordLookup { .. } => "related_record_lookup",
            Self::ComputedDate { .. } => "computed_date",
            Self::Identity { .. } => "identity",
            Self::Template { .. } => "template",
            Self::RelatedField { .. } => "related_field",
            Self::NextSequence { .. } => "next_sequence",
        }
    }
}

/// Bound of a numeric range: a literal, or a previously resolved field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericBound {
    Literal(f64),
    Field { field: String },
}

impl NumericBound {
    pub fn field(name: &str) -> Self {
        Self::Field {
            field: name.to_string(),
        }
    }
}

impl From<f64> for NumericBound {
    fn from(value: f64) -> Self {
        Self::Literal(value)
    }
}

/// Equality filter applied to a related-record lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupFilter {
    pub field: String,
    pub equals: FilterOperand,
}

impl LookupFilter {
    pub fn field_equals_field(field: &str, source: &str) -> Self {
        Self {
            field: field.to_string(),
            equals: FilterOperand::Field {
                field: source.to_string(),
            },
        }
    }

    pub fn field_equals(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            equals: FilterOperand::Value {
                value: value.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum FilterOperand {
    Value { value: Value },
    Field { field: String },
}

/// Concrete equality filter handed to the store once operands are resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFilter {
    pub field: String,
    pub equals: Value,
}

impl RecordFilter {
    pub fn new(field: &str, equals: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            equals: equals.into(),
        }
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        fields.get(&self.field).map_or(false, |v| v == &self.equals)
    }
}

/// What a lookup yields when nothing in the store matches.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "use", rename_all = "snake_case")]
pub enum LookupFallback {
    /// `Value::Null`; callers must cope with the missing reference.
    #[default]
    Absent,
    Constant { value: Value },
    Identity { name: String },
    /// Insert this record into the looked-up collection and use its id.
    Placeholder { fields: Fields },
}

// ============================================================================
// Annotations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    NoteFromRequester,
    NoteFromAgent,
}

impl NoteKind {
    /// Journal field the platform stores this kind of note in.
    pub fn journal_field(self) -> &'static str {
        match self {
            Self::NoteFromRequester => "comments",
            Self::NoteFromAgent => "work_notes",
        }
    }
}

/// Who a note is attributed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum AuthorRef {
    /// The identifier held by a resolved field of the record.
    Field { field: String },
    /// An identity from the configuration table.
    Identity { name: String },
}

impl AuthorRef {
    pub fn field(name: &str) -> Self {
        Self::Field {
            field: name.to_string(),
        }
    }

    pub fn identity(name: &str) -> Self {
        Self::Identity {
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSpec {
    pub kind: NoteKind,
    pub author: AuthorRef,
    /// Prompt template; placeholders see the record's resolved fields.
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentSpec {
    pub file_name: String,
    pub mime_type: String,
    pub prompt: String,
}

impl Default for AttachmentSpec {
    fn default() -> Self {
        Self {
            file_name: "error_log.txt".to_string(),
            mime_type: "text/plain".to_string(),
            prompt: "Generate a log snippet for the issue: \"{short_description}\".".to_string(),
        }
    }
}
