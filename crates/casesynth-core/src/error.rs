//! Error taxonomy of the synthesis engine.

use crate::store::StoreError;

/// Errors surfaced by synthesis operations.
///
/// Validation errors (`UnknownCaseType`, `MissingRequiredInput`,
/// `BatchNotSupported`, `BatchTooLarge`) are raised before any external
/// call is made.
/// Degraded content and failed notes or attachments never abort a unit;
/// they are reported as warnings on the receipt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SynthesisError {
    #[error("unknown case type `{0}`")]
    UnknownCaseType(String),

    #[error("case type `{case_type}` requires `{input}`")]
    MissingRequiredInput { case_type: String, input: String },

    #[error("case type `{case_type}` does not support batch creation (requested {requested})")]
    BatchNotSupported { case_type: String, requested: usize },

    #[error("case type `{case_type}`: batch of {requested} exceeds the limit of {limit}")]
    BatchTooLarge {
        case_type: String,
        requested: usize,
        limit: usize,
    },

    #[error("field `{field}`: choice set is empty")]
    EmptyChoiceSet { field: String },

    /// Also raised when `precision` exceeds 9 or a bound scaled by
    /// `10^precision` leaves the exactly representable integers (2^53).
    #[error("field `{field}`: invalid numeric range [{min}, {max}) (needs min <= max, precision <= 9 and |bound| * 10^precision <= 2^53)")]
    InvalidRange { field: String, min: f64, max: f64 },

    #[error("field `{field}`: cannot use `{reference}` ({reason})")]
    UnresolvedReference {
        field: String,
        reference: String,
        reason: String,
    },

    #[error("field `{field}`: sequence `{prefix}` has no number after {highest}")]
    SequenceExhausted {
        field: String,
        prefix: String,
        highest: u64,
    },

    #[error("field `{field}`: identity `{name}` is not configured")]
    UnknownIdentity { field: String, name: String },

    #[error("persisting into `{collection}` failed: {message}")]
    PersistenceFailure { collection: String, message: String },

    #[error("note {index} could not be appended: {message}")]
    AnnotationFailure { index: usize, message: String },

    #[error("attaching `{file_name}` failed: {message}")]
    AttachmentFailure { file_name: String, message: String },

    #[error("content generation degraded, fallback text used: {0}")]
    ContentGenerationDegraded(String),
}

impl SynthesisError {
    pub(crate) fn persistence(collection: &str, err: &StoreError) -> Self {
        Self::PersistenceFailure {
            collection: collection.to_string(),
            message: err.to_string(),
        }
    }

    /// Whether this error is raised before any external side effect.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnknownCaseType(_)
                | Self::MissingRequiredInput { .. }
                | Self::BatchNotSupported { .. }
                | Self::BatchTooLarge { .. }
        )
    }

    /// Whether the engine recovers from this error locally.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ContentGenerationDegraded(_)
                | Self::AnnotationFailure { .. }
                | Self::AttachmentFailure { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SynthesisError>;
