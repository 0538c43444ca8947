//! Domain error type

use thiserror::Error;

/// Raised when a value received from the backend breaks an invariant of the
/// inventory or loot vocabulary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A single value is out of range (zero stack size, ...)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Values are fine on their own but contradict each other
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// A wire number or name maps to no known variant
    #[error("Parse error: {0}")]
    Parse(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// e.g. a loot vote naming a player outside the round
    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::Constraint(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
