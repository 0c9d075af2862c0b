//! Validation outcomes and the per-key error store.

mod container;

pub use container::ErrorsContainer;

/// Result of validating a candidate value.
///
/// Validation failures are data, not errors: they are recorded in an
/// [`ErrorsContainer`] and never returned as `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    Invalid(String),
}

impl ValidationOutcome {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Valid => None,
            Self::Invalid(message) => Some(message),
        }
    }
}

impl From<Result<(), String>> for ValidationOutcome {
    fn from(result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::Valid,
            Err(message) => Self::Invalid(message),
        }
    }
}
