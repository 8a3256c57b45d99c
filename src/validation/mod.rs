//! Validation of generator-produced SQL.

pub mod sql_validator;
pub mod table_refs;

pub use sql_validator::{validate, SqlValidator};

use thiserror::Error;

/// Why a statement was refused. The display strings are what gets fed back to
/// the generator in a repair prompt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("Only SELECT queries allowed.")]
    NotSelect,

    #[error("Referenced disallowed table: {0}")]
    DisallowedTable(String),

    #[error("Disallowed SQL constructs detected.")]
    DisallowedConstruct,

    /// A modifier the parser cannot carry through re-serialization.
    #[error("Unsupported table modifier: {0}")]
    UnsupportedModifier(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// `sql` is the canonical re-serialization of the checked statement.
    Valid { sql: String },
    Invalid(Rejection),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid { .. })
    }

    pub fn reason(&self) -> Option<String> {
        match self {
            ValidationOutcome::Valid { .. } => None,
            ValidationOutcome::Invalid(rejection) => Some(rejection.to_string()),
        }
    }
}
