//! Run orchestration.
//!
//! Fans out one pipeline per topic (bounded by `concurrency`), runs the intro
//! and outro alongside them, waits for everything at a join barrier, then
//! either aborts on the failure budget or hands the manifest to assembly.

use chrono::NaiveDate;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use super::assembly::AssemblyStage;
use super::bookend::{Bookend, BookendOutcome};
use super::report::RunReport;
use super::topic::{TopicOutcome, TopicPipeline};
use super::RunContext;
use crate::cancellation::CancellationToken;
use crate::config::RunConfig;
use crate::core::{Slot, Topic, TopicState};
use crate::errors::{RoundupResult, RunError, StageError, TopicFailure};
use crate::events::{EventSink, FanoutEventSink, JsonlRunLog, NoOpEventSink};
use crate::executor::StageExecutor;
use crate::providers::Providers;
use crate::search::QueryPlanner;
use crate::store::{ArtifactStore, OpenMode};
use crate::utils::{elapsed_ms, generate_run_id};

/// Counts topic failures and cancels the run once the budget is exceeded.
///
/// Failures caused by the cancellation itself are not counted.
pub struct FailureBudget {
    budget: usize,
    failed: AtomicUsize,
    cancel: Arc<CancellationToken>,
    sink: Arc<dyn EventSink>,
}

impl FailureBudget {
    /// Creates a counter for `budget` tolerated failures.
    #[must_use]
    pub fn new(budget: usize, cancel: Arc<CancellationToken>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            budget,
            failed: AtomicUsize::new(0),
            cancel,
            sink,
        }
    }

    /// Counts `failure`; returns true if this pushed the run over budget.
    pub fn record(&self, failure: &TopicFailure) -> bool {
        if failure.is_cancellation() {
            return false;
        }
        let failed = self.failed.fetch_add(1, Ordering::SeqCst) + 1;
        if failed <= self.budget {
            return false;
        }
        let reason = format!(
            "failure budget exceeded: {failed} topics failed, budget {}",
            self.budget
        );
        if self.cancel.cancel(reason.clone()) {
            tracing::warn!(failed, budget = self.budget, "Cancelling run");
            self.sink.try_emit(
                "run.cancelled",
                Some(json!({
                    "reason": reason,
                    "failed": failed,
                    "budget": self.budget,
                    "trigger": failure.topic,
                })),
            );
        }
        true
    }

    /// Failures counted so far.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns true if more topics failed than tolerated.
    #[must_use]
    pub fn is_exceeded(&self) -> bool {
        self.failed() > self.budget
    }
}

impl std::fmt::Debug for FailureBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureBudget")
            .field("budget", &self.budget)
            .field("failed", &self.failed())
            .finish_non_exhaustive()
    }
}

/// Entry point for a roundup run.
///
/// # Example
///
/// ```rust,ignore
/// use roundup::prelude::*;
///
/// let report = RunOrchestrator::new(config, providers)
///     .with_run_log(true)
///     .run()
///     .await?;
/// println!("video at {}", report.video.display());
/// ```
pub struct RunOrchestrator {
    config: RunConfig,
    providers: Providers,
    sinks: Vec<Arc<dyn EventSink>>,
    resume: bool,
    run_log: bool,
    run_date: Option<NaiveDate>,
}

impl RunOrchestrator {
    /// Creates an orchestrator for one configuration.
    #[must_use]
    pub fn new(config: RunConfig, providers: Providers) -> Self {
        Self {
            config,
            providers,
            sinks: Vec::new(),
            resume: false,
            run_log: false,
            run_date: None,
        }
    }

    /// Adds an event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Continues from the manifest already in the output root.
    #[must_use]
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    /// Appends events to `run.log.jsonl` in the output root.
    #[must_use]
    pub fn with_run_log(mut self, enabled: bool) -> Self {
        self.run_log = enabled;
        self
    }

    /// Sets the date the roundup is for; defaults to today.
    #[must_use]
    pub fn with_run_date(mut self, date: NaiveDate) -> Self {
        self.run_date = Some(date);
        self
    }

    /// The configuration this orchestrator runs.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    fn open_mode(&self) -> OpenMode {
        if self.resume {
            OpenMode::Resume
        } else if self.config.keep_previous_manifest {
            OpenMode::KeepPrevious
        } else {
            OpenMode::Fresh
        }
    }

    fn build_sink(&self) -> RoundupResult<Arc<dyn EventSink>> {
        let mut sinks = self.sinks.clone();
        if self.run_log {
            sinks.push(Arc::new(JsonlRunLog::in_dir(&self.config.output_dir)?));
        }
        Ok(match sinks.len() {
            0 => Arc::new(NoOpEventSink),
            1 => sinks.remove(0),
            _ => Arc::new(FanoutEventSink::new(sinks)),
        })
    }

    /// Runs every topic, the bookends and assembly.
    ///
    /// # Errors
    ///
    /// Returns a configuration or store error before any stage runs,
    /// [`RunError::BudgetExceeded`] when more topics failed than the policy
    /// tolerates, and [`RunError::Assembly`] when assembly failed. Both run
    /// errors list every failed topic.
    pub async fn run(&self) -> RoundupResult<RunReport> {
        self.config.validate()?;
        let started = Instant::now();
        let run_id = generate_run_id();
        let store = ArtifactStore::open(&self.config.output_dir, run_id, self.open_mode()).await?;
        let sink = self.build_sink()?;
        let cancel = Arc::new(CancellationToken::new());
        let executor = StageExecutor::new(
            self.config.policy.clone(),
            Arc::clone(&sink),
            Arc::clone(&cancel),
        );
        let ctx = Arc::new(RunContext {
            config: self.config.clone(),
            store,
            executor,
            providers: self.providers.clone(),
            planner: QueryPlanner::from_config(&self.config),
            sink: Arc::clone(&sink),
            run_date: self
                .run_date
                .unwrap_or_else(|| chrono::Local::now().date_naive()),
        });
        let budget = Arc::new(FailureBudget::new(
            self.config.policy.failure_budget,
            Arc::clone(&cancel),
            Arc::clone(&sink),
        ));

        tracing::info!(
            run_id = %run_id,
            topics = self.config.topics.len(),
            concurrency = self.config.concurrency,
            resume = self.resume,
            "Run started"
        );
        sink.try_emit(
            "run.started",
            Some(json!({
                "run_id": run_id.to_string(),
                "output_dir": self.config.output_dir,
                "topics": self.config.topics.iter().map(|t| &t.label).collect::<Vec<_>>(),
                "resume": self.resume,
            })),
        );

        let intro = tokio::spawn(Bookend::intro(Arc::clone(&ctx)).run());
        let outro = tokio::spawn(Bookend::outro(Arc::clone(&ctx)).run());
        let outcomes = Self::run_topics(&ctx, &budget).await;
        let intro = Self::join_bookend(Slot::Intro, intro).await;
        let outro = Self::join_bookend(Slot::Outro, outro).await;

        let mut topics = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for outcome in outcomes {
            topics.push(outcome.topic);
            failures.extend(outcome.failure);
        }

        if budget.is_exceeded() {
            let error = RunError::BudgetExceeded {
                budget: self.config.policy.failure_budget,
                failed: budget.failed(),
                failures,
            };
            tracing::error!(run_id = %run_id, error = %error, "Run aborted before assembly");
            sink.try_emit(
                "run.aborted",
                Some(json!({
                    "run_id": run_id.to_string(),
                    "failed": budget.failed(),
                    "budget": self.config.policy.failure_budget,
                    "failures": error.failures(),
                })),
            );
            return Err(error.into());
        }

        let output = match AssemblyStage::new(&ctx).run(&topics).await {
            Ok(output) => output,
            Err(error) => return Err(RunError::Assembly { error, failures }.into()),
        };
        let report = RunReport::new(
            run_id,
            self.config.output_dir.clone(),
            &topics,
            failures,
            output,
        );

        tracing::info!(
            run_id = %run_id,
            assembled = report.assembled_topics().count(),
            failed = report.failures.len(),
            intro = intro.is_ready(),
            outro = outro.is_ready(),
            elapsed_ms = elapsed_ms(started),
            "Run completed"
        );
        sink.try_emit(
            "run.completed",
            Some(json!({
                "run_id": run_id.to_string(),
                "topics": report.topics,
                "total_duration_ms": report.total_duration_ms,
                "elapsed_ms": elapsed_ms(started),
            })),
        );
        Ok(report)
    }

    /// Runs every topic pipeline and returns their outcomes in configured
    /// order, regardless of completion order.
    async fn run_topics(ctx: &Arc<RunContext>, budget: &Arc<FailureBudget>) -> Vec<TopicOutcome> {
        let semaphore = Arc::new(Semaphore::new(ctx.config.concurrency));
        let mut active: FuturesUnordered<_> = ctx
            .config
            .build_topics()
            .into_iter()
            .map(|topic| {
                let handle = Self::spawn_topic(topic.clone(), ctx, &semaphore, budget);
                async move { (topic, handle.await) }
            })
            .collect();

        let mut outcomes = Vec::with_capacity(active.len());
        while let Some((topic, joined)) = active.next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => Self::crashed(ctx, budget, topic, &e).await,
            };
            outcomes.push(outcome);
        }
        outcomes.sort_by_key(|outcome| outcome.topic.number);
        outcomes
    }

    fn spawn_topic(
        topic: Topic,
        ctx: &Arc<RunContext>,
        semaphore: &Arc<Semaphore>,
        budget: &Arc<FailureBudget>,
    ) -> JoinHandle<TopicOutcome> {
        let ctx = Arc::clone(ctx);
        let semaphore = Arc::clone(semaphore);
        let budget = Arc::clone(budget);
        tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let outcome = TopicPipeline::new(topic, ctx).run().await;
            if let Some(failure) = &outcome.failure {
                budget.record(failure);
            }
            outcome
        })
    }

    async fn crashed(
        ctx: &RunContext,
        budget: &FailureBudget,
        mut topic: Topic,
        error: &tokio::task::JoinError,
    ) -> TopicOutcome {
        let message = if error.is_panic() {
            "topic pipeline panicked".to_string()
        } else {
            format!("topic pipeline aborted: {error}")
        };
        tracing::error!(topic = topic.number, label = %topic.label, error = %error, "Topic task died");
        let failure = TopicPipeline::crashed(ctx, &topic, message).await;
        budget.record(&failure);
        topic.state = TopicState::Failed;
        TopicOutcome {
            topic,
            failure: Some(failure),
        }
    }

    async fn join_bookend(slot: Slot, handle: JoinHandle<BookendOutcome>) -> BookendOutcome {
        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(slot = %slot, error = %e, "Bookend task died");
                BookendOutcome {
                    slot,
                    error: Some(StageError::permanent(format!("{slot} task died: {e}"))),
                }
            }
        }
    }
}

impl std::fmt::Debug for RunOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOrchestrator")
            .field("output_dir", &self.config.output_dir)
            .field("topics", &self.config.topics.len())
            .field("sinks", &self.sinks.len())
            .field("resume", &self.resume)
            .field("run_log", &self.run_log)
            .finish_non_exhaustive()
    }
}
