//! Outcome of running one stage through the executor.

use serde::{Deserialize, Serialize};

use crate::errors::StageError;

/// Tagged, immutable outcome of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult<T> {
    /// The stage produced its output.
    Success {
        /// Stage output.
        output: T,
        /// Attempts it took.
        attempts: u32,
    },
    /// The stage was not run, or ran and was deliberately set aside.
    Skipped {
        /// Why it was skipped.
        reason: String,
    },
    /// The stage failed.
    Failed {
        /// Final classified error.
        error: StageError,
        /// Attempts made.
        attempts: u32,
    },
}

impl<T> StageResult<T> {
    /// Returns true on success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns true on failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Number of attempts made; zero when skipped.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
            Self::Skipped { .. } => 0,
        }
    }

    /// Returns the output, if any.
    #[must_use]
    pub fn output(&self) -> Option<&T> {
        match self {
            Self::Success { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Maps the success output.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> StageResult<U> {
        match self {
            Self::Success { output, attempts } => StageResult::Success {
                output: f(output),
                attempts,
            },
            Self::Skipped { reason } => StageResult::Skipped { reason },
            Self::Failed { error, attempts } => StageResult::Failed { error, attempts },
        }
    }

    /// The output-free outcome recorded in the manifest.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Success { .. } => Outcome::Success,
            Self::Skipped { reason } => Outcome::Skipped {
                reason: reason.clone(),
            },
            Self::Failed { error, .. } => Outcome::Failed {
                error: error.clone(),
            },
        }
    }
}

/// Serializable outcome stored in manifest entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Artifact produced.
    Success,
    /// Artifact deliberately absent or replaced by a fallback.
    Skipped {
        /// Why.
        reason: String,
    },
    /// Stage failed.
    Failed {
        /// The classified error.
        error: StageError,
    },
}

impl Outcome {
    /// Success and Skipped entries let later stages proceed.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_accessors() {
        let result = StageResult::Success {
            output: 7,
            attempts: 2,
        };
        assert!(result.is_success());
        assert_eq!(result.attempts(), 2);
        assert_eq!(result.output(), Some(&7));
        assert_eq!(result.outcome(), Outcome::Success);
    }

    #[test]
    fn test_map_preserves_failure() {
        let result: StageResult<u32> = StageResult::Failed {
            error: StageError::permanent("auth"),
            attempts: 1,
        };
        let mapped = result.map(|v| v.to_string());
        assert!(mapped.is_failure());
        assert_eq!(mapped.attempts(), 1);
    }

    #[test]
    fn test_skipped_has_no_attempts() {
        let result: StageResult<()> = StageResult::Skipped {
            reason: "no image".to_string(),
        };
        assert_eq!(result.attempts(), 0);
        assert!(result.outcome().is_settled());
    }

    #[test]
    fn test_outcome_serialization_is_tagged() {
        let outcome = Outcome::Failed {
            error: StageError::validation("empty"),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"]["class"], "validation");
        assert!(!outcome.is_settled());
    }
}
