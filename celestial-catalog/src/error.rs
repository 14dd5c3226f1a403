//! Error types for catalog consolidation and target selection.
//!
//! Every failure here is a misconfigured pipeline, not a data-quality problem:
//! absent values and positions with no counterpart inside a tolerance are
//! carried as data, never raised. Each variant records where it happened
//! (stage or operation) and which field or parameter triggered it, so a long
//! configuration chain can be debugged from the message alone.
//!
//! | Variant | Raised when |
//! |---------|-------------|
//! | [`EmptyCatalog`](CatalogError::EmptyCatalog) | A spatial index or match has no usable rows |
//! | [`SchemaMismatch`](CatalogError::SchemaMismatch) | A transform names a field the schema lacks, or rows have the wrong arity |
//! | [`DuplicateField`](CatalogError::DuplicateField) | A schema is declared with a repeated name |
//! | [`KeyCollisionAmbiguous`](CatalogError::KeyCollisionAmbiguous) | Join suffixing cannot disambiguate field names |
//! | [`InvalidJoinType`](CatalogError::InvalidJoinType) | Join type is not inner, left or outer |
//! | [`InvalidCutSpecification`](CatalogError::InvalidCutSpecification) | Inverted or malformed selection bounds |
//! | [`UnresolvedOverlapReference`](CatalogError::UnresolvedOverlapReference) | Cross-reference rule without a usable reference catalog |
//! | [`UnmatchedPosition`](CatalogError::UnmatchedPosition) | A required positional counterpart was not found |
//! | [`Config`](CatalogError::Config) | A configuration or catalog document could not be read |

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Empty catalog in {context}: {message}")]
    EmptyCatalog { context: String, message: String },

    #[error("Schema mismatch in {context}: field '{field}' {message}")]
    SchemaMismatch {
        context: String,
        field: String,
        message: String,
    },

    #[error("Duplicate field '{field}' in schema of {context}")]
    DuplicateField { context: String, field: String },

    #[error("Ambiguous key collision in {context}: field '{field}' {message}")]
    KeyCollisionAmbiguous {
        context: String,
        field: String,
        message: String,
    },

    #[error("Invalid join type '{given}' (expected one of: inner, left, outer)")]
    InvalidJoinType { given: String },

    #[error("Invalid cut specification in stage '{stage}', parameter '{parameter}': {message}")]
    InvalidCutSpecification {
        stage: String,
        parameter: String,
        message: String,
    },

    #[error("Unresolved overlap reference in stage '{stage}': {message}")]
    UnresolvedOverlapReference { stage: String, message: String },

    #[error("Unmatched position in {context}: {message}")]
    UnmatchedPosition { context: String, message: String },

    #[error("Configuration error ({origin}): {message}")]
    Config { origin: String, message: String },
}

pub type CatalogResult<T> = Result<T, CatalogError>;

impl CatalogError {
    pub fn empty_catalog(context: &str, reason: &str) -> Self {
        Self::EmptyCatalog {
            context: context.to_string(),
            message: reason.to_string(),
        }
    }

    pub fn schema_mismatch(context: &str, field: &str, reason: &str) -> Self {
        Self::SchemaMismatch {
            context: context.to_string(),
            field: field.to_string(),
            message: reason.to_string(),
        }
    }

    /// Shorthand for the common "field is not in the schema" mismatch.
    pub fn missing_field(context: &str, field: &str) -> Self {
        Self::schema_mismatch(context, field, "is not present in the schema")
    }

    pub fn duplicate_field(context: &str, field: &str) -> Self {
        Self::DuplicateField {
            context: context.to_string(),
            field: field.to_string(),
        }
    }

    pub fn key_collision(context: &str, field: &str, reason: &str) -> Self {
        Self::KeyCollisionAmbiguous {
            context: context.to_string(),
            field: field.to_string(),
            message: reason.to_string(),
        }
    }

    pub fn invalid_join_type(given: &str) -> Self {
        Self::InvalidJoinType {
            given: given.to_string(),
        }
    }

    pub fn invalid_cut(stage: &str, parameter: &str, reason: &str) -> Self {
        Self::InvalidCutSpecification {
            stage: stage.to_string(),
            parameter: parameter.to_string(),
            message: reason.to_string(),
        }
    }

    pub fn unresolved_overlap(stage: &str, reason: &str) -> Self {
        Self::UnresolvedOverlapReference {
            stage: stage.to_string(),
            message: reason.to_string(),
        }
    }

    pub fn unmatched_position(context: &str, reason: &str) -> Self {
        Self::UnmatchedPosition {
            context: context.to_string(),
            message: reason.to_string(),
        }
    }

    pub fn config(origin: &str, reason: &str) -> Self {
        Self::Config {
            origin: origin.to_string(),
            message: reason.to_string(),
        }
    }

    /// Returns `true` when the error points at pipeline configuration rather
    /// than at an unreadable input document.
    pub fn is_configuration_error(&self) -> bool {
        !matches!(self, Self::Config { .. })
    }
}
