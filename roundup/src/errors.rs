//! Error types for the roundup orchestrator.
//!
//! Stage failures are classified ([`ErrorClass`]) so the executor can decide
//! between retrying and giving up; topic failures are collected into a
//! [`RunError`] so that a failed run reports every topic it lost.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::{StageName, TopicState};

/// Convenience alias used across the crate.
pub type RoundupResult<T> = Result<T, RoundupError>;

/// The main error type for roundup operations.
#[derive(Debug, Error)]
pub enum RoundupError {
    /// Invalid run configuration.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Artifact store or manifest failure.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// The run aborted (failure budget or assembly).
    #[error("{0}")]
    Run(#[from] RunError),

    /// Logging could not be initialised.
    #[error("Tracing initialisation failed: {0}")]
    Tracing(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure classification for a single stage attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Network, rate-limit or timeout; retried with backoff.
    Transient,
    /// Authentication, misconfiguration, missing tool; never retried.
    Permanent,
    /// Empty or invalid provider output.
    Validation,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
            Self::Validation => write!(f, "validation"),
        }
    }
}

/// A classified failure raised by a stage function.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{class} error: {message}")]
pub struct StageError {
    /// Class used for the retry decision.
    pub class: ErrorClass,
    /// Human-readable message from the provider or stage.
    pub message: String,
    /// Class reported once retries are exhausted.
    pub exhausted_class: ErrorClass,
    /// Set when the attempt was refused because the run was cancelled.
    #[serde(default)]
    pub cancelled: bool,
}

impl StageError {
    /// Creates an error with an explicit class.
    #[must_use]
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
            exhausted_class: class,
            cancelled: false,
        }
    }

    /// Creates a transient (retryable) error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Transient, message)
    }

    /// Creates a permanent error.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Permanent, message)
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Validation, message)
    }

    /// An empty provider result: retried while attempts remain, then
    /// reported as a validation failure.
    #[must_use]
    pub fn empty_result(message: impl Into<String>) -> Self {
        Self {
            exhausted_class: ErrorClass::Validation,
            ..Self::transient(message)
        }
    }

    /// A per-call timeout, counted as a transient failure.
    #[must_use]
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::transient(format!("attempt timed out after {timeout_ms}ms"))
    }

    /// The run was cancelled before the stage could (re)start.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self {
            cancelled: true,
            ..Self::permanent(format!("cancelled: {}", reason.into()))
        }
    }

    /// Returns true if another attempt may be made.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.class == ErrorClass::Transient && !self.cancelled
    }

    /// Reclassifies the error after the retry budget ran out.
    #[must_use]
    pub fn exhausted(mut self) -> Self {
        self.class = self.exhausted_class;
        self
    }

    /// Converts to a dictionary representation for the run log.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("class".to_string(), serde_json::json!(self.class));
        map.insert("message".to_string(), serde_json::json!(self.message));
        if self.cancelled {
            map.insert("cancelled".to_string(), serde_json::json!(true));
        }
        map
    }
}

/// Terminal failure of one topic, with enough detail to retry just it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicFailure {
    /// 1-based topic number as assigned at run start.
    pub topic: usize,
    /// Topic label.
    pub label: String,
    /// Stage that failed.
    pub stage: StageName,
    /// State the pipeline was in when it failed.
    pub state: TopicState,
    /// Attempts made for the failing stage.
    pub attempts: u32,
    /// The final classified error.
    pub error: StageError,
}

impl TopicFailure {
    /// Returns true if the topic stopped because the run was cancelled.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        self.error.cancelled
    }
}

impl fmt::Display for TopicFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "topic {:02} '{}' failed at {} after {} attempt(s): {}",
            self.topic, self.label, self.stage, self.attempts, self.error
        )
    }
}

fn list_failures(failures: &[TopicFailure]) -> String {
    if failures.is_empty() {
        return "no topic failures".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Run-level failure; always carries every per-topic terminal error.
#[derive(Debug, Clone, Error)]
pub enum RunError {
    /// More topics failed than the policy tolerates.
    #[error("failure budget exceeded ({failed} failed, budget {budget}): {}", list_failures(.failures))]
    BudgetExceeded {
        /// Configured failure budget.
        budget: usize,
        /// Number of topics that failed on their own (not by cancellation).
        failed: usize,
        /// Every failed topic, in configured order.
        failures: Vec<TopicFailure>,
    },

    /// The terminal assembly stage failed.
    #[error("assembly failed: {error} ({})", list_failures(.failures))]
    Assembly {
        /// The assembly error.
        error: StageError,
        /// Topic failures tolerated before assembly ran.
        failures: Vec<TopicFailure>,
    },
}

impl RunError {
    /// Returns the per-topic failures carried by this error.
    #[must_use]
    pub fn failures(&self) -> &[TopicFailure] {
        match self {
            Self::BudgetExceeded { failures, .. } | Self::Assembly { failures, .. } => failures,
        }
    }
}

/// Errors raised while validating a run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No topics were configured.
    #[error("configuration has no topics")]
    NoTopics,

    /// A topic has no candidate queries.
    #[error("topic '{label}' has no queries")]
    NoQueries {
        /// Topic label.
        label: String,
    },

    /// Two topics share a label.
    #[error("duplicate topic label '{label}'")]
    DuplicateLabel {
        /// Topic label.
        label: String,
    },

    /// Topic numbers are rendered with two digits.
    #[error("too many topics: {count} (maximum {max})")]
    TooManyTopics {
        /// Configured topic count.
        count: usize,
        /// Maximum supported.
        max: usize,
    },

    /// Concurrency must allow at least one pipeline.
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    /// The configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Parse(String),
}

/// Errors raised by the artifact store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A manifest file could not be parsed.
    #[error("corrupt manifest at {path}: {reason}")]
    CorruptManifest {
        /// Manifest path.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// Writing an artifact failed.
    #[error("failed to write artifact {key}: {source}")]
    Write {
        /// Artifact key in display form.
        key: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Reading an artifact failed.
    #[error("failed to read artifact {key}: {source}")]
    Read {
        /// Artifact key in display form.
        key: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl From<StoreError> for StageError {
    fn from(err: StoreError) -> Self {
        Self::permanent(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(topic: usize, message: &str) -> TopicFailure {
        TopicFailure {
            topic,
            label: format!("Topic {topic}"),
            stage: StageName::Speech,
            state: TopicState::Synthesizing,
            attempts: 1,
            error: StageError::permanent(message),
        }
    }

    #[test]
    fn test_stage_error_constructors() {
        assert_eq!(StageError::transient("x").class, ErrorClass::Transient);
        assert_eq!(StageError::permanent("x").class, ErrorClass::Permanent);
        assert_eq!(StageError::validation("x").class, ErrorClass::Validation);
        assert!(StageError::transient("x").is_retryable());
        assert!(!StageError::validation("x").is_retryable());
    }

    #[test]
    fn test_empty_result_escalates_on_exhaustion() {
        let err = StageError::empty_result("no snippets");
        assert!(err.is_retryable());
        let exhausted = err.exhausted();
        assert_eq!(exhausted.class, ErrorClass::Validation);
        assert_eq!(exhausted.message, "no snippets");
    }

    #[test]
    fn test_plain_transient_stays_transient_when_exhausted() {
        let err = StageError::transient("503").exhausted();
        assert_eq!(err.class, ErrorClass::Transient);
    }

    #[test]
    fn test_cancelled_error_is_not_retryable() {
        let err = StageError::cancelled("budget exceeded");
        assert!(err.cancelled);
        assert!(!err.is_retryable());
        assert!(err.message.contains("budget exceeded"));
    }

    #[test]
    fn test_stage_error_to_dict() {
        let dict = StageError::timeout(250).to_dict();
        assert_eq!(dict.get("class").unwrap(), "transient");
        assert!(dict.get("message").unwrap().as_str().unwrap().contains("250ms"));
        assert!(!dict.contains_key("cancelled"));
    }

    #[test]
    fn test_budget_error_lists_every_topic() {
        let err = RunError::BudgetExceeded {
            budget: 1,
            failed: 2,
            failures: vec![failure(2, "tts down"), failure(3, "tts auth")],
        };
        let text = err.to_string();
        assert!(text.contains("topic 02 'Topic 2'"));
        assert!(text.contains("topic 03 'Topic 3'"));
        assert!(text.contains("tts auth"));
        assert_eq!(err.failures().len(), 2);
    }

    #[test]
    fn test_store_error_maps_to_permanent_stage_error() {
        let err: StageError = StoreError::Write {
            key: "speech:topic_01:0".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        }
        .into();
        assert_eq!(err.class, ErrorClass::Permanent);
        assert!(err.message.contains("disk full"));
    }
}
