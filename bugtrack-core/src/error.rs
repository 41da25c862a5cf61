//! Error taxonomy returned by every core operation.
//!
//! Errors are plain values: the shell maps each variant to a fixed response
//! shape and nothing here is retried automatically.

use thiserror::Error;
use validator::ValidationErrors;

use crate::lifecycle::InvalidTransition;
use crate::model::BugStatus;
use crate::repository::RepositoryError;

/// Errors surfaced by the `BugTracker` service.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The referenced bug, comment or user does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    /// No authenticated actor was supplied.
    #[error("authentication required")]
    Unauthenticated,

    /// The policy denied the action. Carries no further detail on purpose.
    #[error("not authorized")]
    Forbidden,

    /// The requested status change is not in the transition table.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: BugStatus, to: BugStatus },

    /// A field was missing or malformed.
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// The entity store failed.
    #[error(transparent)]
    Storage(RepositoryError),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Into<u64>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Validation { .. } => "validation",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<InvalidTransition> for CoreError {
    fn from(err: InvalidTransition) -> Self {
        Self::InvalidTransition {
            from: err.from,
            to: err.to,
        }
    }
}

impl From<RepositoryError> for CoreError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict { field } => {
                Self::validation(field, "has already been taken")
            }
            other => Self::Storage(other),
        }
    }
}

impl From<ParseEnumError> for CoreError {
    fn from(err: ParseEnumError) -> Self {
        Self::Validation {
            field: err.field.to_string(),
            message: format!("'{}' is not a valid value", err.value),
        }
    }
}

impl From<ValidationErrors> for CoreError {
    fn from(errors: ValidationErrors) -> Self {
        // Report the alphabetically first field so the message is stable.
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));

        match fields.first() {
            Some((field, field_errors)) => {
                let message = field_errors
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "is invalid".to_string());
                Self::validation(field.to_string(), message)
            }
            None => Self::validation("input", errors.to_string()),
        }
    }
}

/// A string did not name a variant of one of the model enums.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field} '{value}'")]
pub struct ParseEnumError {
    pub field: &'static str,
    pub value: String,
}
