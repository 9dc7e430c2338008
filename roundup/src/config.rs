//! Run configuration and policy.
//!
//! Both are plain immutable values handed to the orchestrator at
//! construction; nothing in the crate reads process-wide configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::Topic;
use crate::errors::{ConfigError, RoundupResult};
use crate::executor::JitterStrategy;

/// Topic numbers are rendered as two digits.
pub const MAX_TOPICS: usize = 99;

/// Retry, timeout and failure-tolerance policy, fixed for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPolicy {
    /// Retries after the first attempt for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff delay in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff cap in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter applied to the backoff delay.
    #[serde(default)]
    pub jitter: JitterStrategy,
    /// Per stage-call timeout in milliseconds.
    #[serde(default = "default_stage_timeout_ms")]
    pub stage_timeout_ms: u64,
    /// Maximum number of failed topics tolerated before the run aborts.
    #[serde(default)]
    pub failure_budget: usize,
    /// Whether a topic with no valid image may still produce a slide.
    #[serde(default = "default_allow_text_only_fallback")]
    pub allow_text_only_fallback: bool,
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8_000
}

fn default_stage_timeout_ms() -> u64 {
    60_000
}

fn default_allow_text_only_fallback() -> bool {
    true
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: JitterStrategy::default(),
            stage_timeout_ms: default_stage_timeout_ms(),
            failure_budget: 0,
            allow_text_only_fallback: default_allow_text_only_fallback(),
        }
    }
}

impl RunPolicy {
    /// Creates a policy with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry count.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the base backoff delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the backoff cap.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_stage_timeout_ms(mut self, timeout: u64) -> Self {
        self.stage_timeout_ms = timeout;
        self
    }

    /// Sets the failure budget.
    #[must_use]
    pub fn with_failure_budget(mut self, budget: usize) -> Self {
        self.failure_budget = budget;
        self
    }

    /// Enables or disables the text-only fallback.
    #[must_use]
    pub fn with_text_only_fallback(mut self, allow: bool) -> Self {
        self.allow_text_only_fallback = allow;
        self
    }

    /// Per-call timeout as a duration.
    #[must_use]
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.stage_timeout_ms)
    }

    /// Upper bound on calls for one stage.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// One configured topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Display label.
    pub label: String,
    /// Candidate base queries; one is chosen per run.
    pub queries: Vec<String>,
}

impl TopicConfig {
    /// Creates a topic configuration.
    #[must_use]
    pub fn new(label: impl Into<String>, queries: &[&str]) -> Self {
        Self {
            label: label.into(),
            queries: queries.iter().map(|q| (*q).to_string()).collect(),
        }
    }
}

/// Full configuration for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Root directory for all artifacts and the manifest.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Topics in assembly order.
    #[serde(default)]
    pub topics: Vec<TopicConfig>,
    /// Sites used to scope queries (`site:` operator).
    #[serde(default)]
    pub sites: Vec<String>,
    /// Modifiers appended to queries ("latest", "breaking", ...).
    #[serde(default)]
    pub search_modifiers: Vec<String>,
    /// Distinct sites searched per topic.
    #[serde(default = "default_sites_per_topic")]
    pub sites_per_topic: usize,
    /// Snippets kept per query.
    #[serde(default = "default_snippets_per_query")]
    pub snippets_per_query: usize,
    /// Characters kept per query summary.
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
    /// Image candidates requested per topic.
    #[serde(default = "default_image_candidates")]
    pub image_candidates: usize,
    /// Seed for query planning.
    #[serde(default)]
    pub seed: u64,
    /// Topic pipelines allowed to run at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Keep the previous manifest as `manifest.previous.json`.
    #[serde(default)]
    pub keep_previous_manifest: bool,
    /// Retry and failure policy.
    #[serde(default)]
    pub policy: RunPolicy,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_sites_per_topic() -> usize {
    2
}

fn default_snippets_per_query() -> usize {
    5
}

fn default_snippet_chars() -> usize {
    400
}

fn default_image_candidates() -> usize {
    5
}

fn default_concurrency() -> usize {
    4
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            topics: Vec::new(),
            sites: Vec::new(),
            search_modifiers: Vec::new(),
            sites_per_topic: default_sites_per_topic(),
            snippets_per_query: default_snippets_per_query(),
            snippet_chars: default_snippet_chars(),
            image_candidates: default_image_candidates(),
            seed: 0,
            concurrency: default_concurrency(),
            keep_previous_manifest: false,
            policy: RunPolicy::default(),
        }
    }
}

impl RunConfig {
    /// Creates a configuration writing to `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Appends a topic.
    #[must_use]
    pub fn with_topic(mut self, topic: TopicConfig) -> Self {
        self.topics.push(topic);
        self
    }

    /// Sets the search sites.
    #[must_use]
    pub fn with_sites(mut self, sites: &[&str]) -> Self {
        self.sites = sites.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Sets the search modifiers.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: &[&str]) -> Self {
        self.search_modifiers = modifiers.iter().map(|m| (*m).to_string()).collect();
        self
    }

    /// Sets the planning seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the concurrency limit.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the run policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RunPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Parses a JSON configuration.
    pub fn from_json_str(json: &str) -> RoundupResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> RoundupResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Checks invariants the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topics.is_empty() {
            return Err(ConfigError::NoTopics);
        }
        if self.topics.len() > MAX_TOPICS {
            return Err(ConfigError::TooManyTopics {
                count: self.topics.len(),
                max: MAX_TOPICS,
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }

        let mut seen = HashSet::new();
        for topic in &self.topics {
            if topic.queries.iter().all(|q| q.trim().is_empty()) {
                return Err(ConfigError::NoQueries {
                    label: topic.label.clone(),
                });
            }
            if !seen.insert(topic.label.as_str()) {
                return Err(ConfigError::DuplicateLabel {
                    label: topic.label.clone(),
                });
            }
        }
        Ok(())
    }

    /// Builds the run's topics, numbered from 1 in configured order.
    #[must_use]
    pub fn build_topics(&self) -> Vec<Topic> {
        self.topics
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let queries = t
                    .queries
                    .iter()
                    .filter(|q| !q.trim().is_empty())
                    .cloned()
                    .collect();
                Topic::new(i + 1, t.label.clone(), queries)
            })
            .collect()
    }
}
