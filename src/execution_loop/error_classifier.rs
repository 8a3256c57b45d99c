//! Error Classifier
//!
//! Sorts pipeline errors into what the orchestrator does next: feed the
//! failure back to the generator, report it as-is, or hide it behind a
//! generic message.

use crate::error::NlqError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Consumes an attempt; the reason goes into the next repair prompt.
    Repairable,
    /// Ends the request with the error's own message.
    Terminal,
    /// Ends the request; callers only ever see "Internal error".
    Internal,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::Repairable => write!(f, "Repairable"),
            FailureClass::Terminal => write!(f, "Terminal"),
            FailureClass::Internal => write!(f, "Internal"),
        }
    }
}

#[derive(Debug, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, error: &NlqError) -> FailureClass {
        match error {
            NlqError::Rejected(_)
            | NlqError::GenerationEmpty
            | NlqError::GenerationTransport(_)
            | NlqError::EngineSyntaxRejected => FailureClass::Repairable,
            NlqError::Execution(_)
            | NlqError::CatalogFetch(_)
            | NlqError::RetriesExhausted { .. } => FailureClass::Terminal,
            NlqError::Config(_) | NlqError::Internal(_) | NlqError::Io(_) | NlqError::Json(_) => {
                FailureClass::Internal
            }
        }
    }

    /// Message placed in the response envelope for `error`.
    pub fn client_message(&self, error: &NlqError) -> String {
        match self.classify(error) {
            FailureClass::Internal => "Internal error".to_string(),
            _ => error.to_string(),
        }
    }
}
