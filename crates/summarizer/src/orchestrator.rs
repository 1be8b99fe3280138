//! Batch orchestrator (C9, spec.md §4.9). Schedules an ordered list of
//! submissions behind a global concurrency gate and a per-user fairness
//! gate, with an adaptive circuit breaker over the whole batch and
//! per-submission retry on retryable failures only.
//!
//! No teacher file gates concurrency with `tokio::sync::Semaphore` (the
//! teacher's pipeline spawns one long-running task per schedule, not a
//! bounded worker pool over a submission list), so the semaphore/permit
//! plumbing here follows tokio's own documented bounded-concurrency idiom.
//! The `Arc<dyn ...>`-composition shape of the orchestrator itself mirrors
//! `crates/ingestion/src/pipeline.rs`'s `IngestionPipeline`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock, Semaphore};
use uuid::Uuid;

use summarizer_core::{retry_with_backoff, RetryPolicy};

use crate::error::SummarizerError;

#[derive(Debug, Clone)]
pub struct Submission {
    pub id: Uuid,
    pub url: String,
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub global_concurrency: usize,
    pub per_user_concurrency: usize,
    pub submission_timeout: Duration,
    pub max_retries: u32,
    pub circuit_cooldown: Duration,
    pub circuit_close_after_successes: u32,
    pub circuit_max_trip_threshold: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            global_concurrency: 5,
            per_user_concurrency: 3,
            submission_timeout: Duration::from_secs(600),
            max_retries: 3,
            circuit_cooldown: Duration::from_secs(60),
            circuit_close_after_successes: 3,
            circuit_max_trip_threshold: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmissionResult {
    pub url: String,
    pub success: bool,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub retry_possible: bool,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub success_count: usize,
    pub failure_count: usize,
    pub error_histogram: HashMap<String, usize>,
    pub sample_failures: Vec<(String, String)>,
}

const MAX_SAMPLE_FAILURES: usize = 5;

impl BatchReport {
    fn record(&mut self, result: &SubmissionResult) {
        if result.success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
            let error_type = result.error_type.clone().unwrap_or_else(|| "unknown".to_string());
            *self.error_histogram.entry(error_type).or_insert(0) += 1;
            if self.sample_failures.len() < MAX_SAMPLE_FAILURES {
                self.sample_failures.push((
                    result.url.clone(),
                    result.error_message.clone().unwrap_or_default(),
                ));
            }
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn on_submission_complete(&self, result: &SubmissionResult);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitPhase {
    Closed,
    Open,
    HalfOpen,
}

/// Trips on `max(3, total/3)` consecutive failures, capped at 10 (spec.md
/// §4.9). A tripped circuit suspends dispatch for a cool-down window, then
/// admits a single half-open probe; a configurable run of consecutive
/// successes closes it again.
struct AdaptiveCircuit {
    phase: RwLock<CircuitPhase>,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    opened_at: RwLock<Option<Instant>>,
    trip_threshold: u32,
    cooldown: Duration,
    close_after: u32,
    half_open_in_flight: AtomicBool,
}

impl AdaptiveCircuit {
    fn new(total_submissions: usize, config: &OrchestratorConfig) -> Self {
        let trip_threshold = ((total_submissions as u32) / 3)
            .max(3)
            .min(config.circuit_max_trip_threshold);
        Self {
            phase: RwLock::new(CircuitPhase::Closed),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            opened_at: RwLock::new(None),
            trip_threshold,
            cooldown: config.circuit_cooldown,
            close_after: config.circuit_close_after_successes,
            half_open_in_flight: AtomicBool::new(false),
        }
    }

    /// Returns `true` if the caller may dispatch; `false` means "skip this
    /// submission with reason circuit_open".
    async fn admit(&self) -> bool {
        let phase = *self.phase.read().await;
        match phase {
            CircuitPhase::Closed => true,
            CircuitPhase::Open => {
                let elapsed_past_cooldown = {
                    let opened_at = self.opened_at.read().await;
                    opened_at.is_some_and(|t| t.elapsed() >= self.cooldown)
                };
                if !elapsed_past_cooldown {
                    return false;
                }
                *self.phase.write().await = CircuitPhase::HalfOpen;
                self.half_open_in_flight.store(false, Ordering::SeqCst);
                self.try_admit_half_open_probe()
            }
            CircuitPhase::HalfOpen => self.try_admit_half_open_probe(),
        }
    }

    fn try_admit_half_open_probe(&self) -> bool {
        self.half_open_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    async fn record_success(&self) {
        let phase = *self.phase.read().await;
        if phase == CircuitPhase::HalfOpen {
            self.half_open_in_flight.store(false, Ordering::SeqCst);
            let successes = self.consecutive_successes.fetch_add(1, Ordering::SeqCst) + 1;
            if successes >= self.close_after {
                *self.phase.write().await = CircuitPhase::Closed;
                self.consecutive_successes.store(0, Ordering::SeqCst);
                self.consecutive_failures.store(0, Ordering::SeqCst);
            }
        } else {
            self.consecutive_failures.store(0, Ordering::SeqCst);
        }
    }

    async fn record_failure(&self) {
        let phase = *self.phase.read().await;
        if phase == CircuitPhase::HalfOpen {
            self.half_open_in_flight.store(false, Ordering::SeqCst);
            self.consecutive_successes.store(0, Ordering::SeqCst);
            *self.phase.write().await = CircuitPhase::Open;
            *self.opened_at.write().await = Some(Instant::now());
            return;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.trip_threshold {
            *self.phase.write().await = CircuitPhase::Open;
            *self.opened_at.write().await = Some(Instant::now());
        }
    }
}

pub struct BatchOrchestrator {
    config: OrchestratorConfig,
}

impl BatchOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    /// Run every submission, each as its own cooperative task. `task` is
    /// the per-submission unit of work (extraction + summarization for one
    /// URL); it is retried up to `max_retries` times if and only if its
    /// error is retryable. Progress is reported exactly once per
    /// submission regardless of outcome.
    pub async fn run_batch<F, Fut>(
        &self,
        submissions: Vec<Submission>,
        cancelled: Arc<AtomicBool>,
        progress: Arc<dyn ProgressSink>,
        task: F,
    ) -> BatchReport
    where
        F: Fn(Submission) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SummarizerError>> + Send + 'static,
    {
        let total = submissions.len();
        let global_permits = Arc::new(Semaphore::new(self.config.global_concurrency));
        let per_user_permits: Arc<Mutex<HashMap<String, Arc<Semaphore>>>> = Arc::new(Mutex::new(HashMap::new()));
        let circuit = Arc::new(AdaptiveCircuit::new(total, &self.config));
        let task = Arc::new(task);

        let mut handles = Vec::with_capacity(total);
        for submission in submissions {
            let global_permits = global_permits.clone();
            let per_user_permits = per_user_permits.clone();
            let circuit = circuit.clone();
            let cancelled = cancelled.clone();
            let task = task.clone();
            let config = self.config.clone();

            handles.push(tokio::spawn(async move {
                run_one(
                    submission,
                    global_permits,
                    per_user_permits,
                    circuit,
                    cancelled,
                    config,
                    task,
                )
                .await
            }));
        }

        let mut report = BatchReport::default();
        for handle in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_err) => SubmissionResult {
                    url: String::new(),
                    success: false,
                    error_type: Some("internal".to_string()),
                    error_message: Some(format!("submission task panicked: {join_err}")),
                    retry_possible: false,
                    processing_time_ms: 0,
                },
            };
            progress.on_submission_complete(&result);
            report.record(&result);
        }

        report
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_one<F, Fut>(
    submission: Submission,
    global_permits: Arc<Semaphore>,
    per_user_permits: Arc<Mutex<HashMap<String, Arc<Semaphore>>>>,
    circuit: Arc<AdaptiveCircuit>,
    cancelled: Arc<AtomicBool>,
    config: OrchestratorConfig,
    task: Arc<F>,
) -> SubmissionResult
where
    F: Fn(Submission) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), SummarizerError>> + Send,
{
    let started = Instant::now();

    // finally-equivalent: every exit path below funnels through one of
    // these two constructors so progress is always reported exactly once.
    fn ok(url: String, started: Instant) -> SubmissionResult {
        SubmissionResult {
            url,
            success: true,
            error_type: None,
            error_message: None,
            retry_possible: false,
            processing_time_ms: started.elapsed().as_millis() as u64,
        }
    }
    fn err(url: String, error_type: &str, message: String, retry_possible: bool, started: Instant) -> SubmissionResult {
        SubmissionResult {
            url,
            success: false,
            error_type: Some(error_type.to_string()),
            error_message: Some(message),
            retry_possible,
            processing_time_ms: started.elapsed().as_millis() as u64,
        }
    }

    if cancelled.load(Ordering::SeqCst) {
        return err(submission.url, "cancelled", "batch was cancelled before this submission started".to_string(), false, started);
    }

    if !circuit.admit().await {
        return err(submission.url, "circuit_open", "circuit breaker open, submission skipped".to_string(), true, started);
    }

    let user_permit = {
        let mut per_user = per_user_permits.lock().await;
        per_user
            .entry(submission.user_id.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(config.per_user_concurrency)))
            .clone()
    };

    let global_guard = match global_permits.acquire_owned().await {
        Ok(guard) => guard,
        Err(_) => return err(submission.url, "internal", "global concurrency gate closed".to_string(), false, started),
    };
    let user_guard = match user_permit.acquire_owned().await {
        Ok(guard) => guard,
        Err(_) => return err(submission.url, "internal", "per-user concurrency gate closed".to_string(), false, started),
    };

    if cancelled.load(Ordering::SeqCst) {
        drop(user_guard);
        drop(global_guard);
        return err(submission.url, "cancelled", "batch was cancelled while this submission waited for a permit".to_string(), false, started);
    }

    let retry_policy = RetryPolicy::new(config.max_retries, 500, 5000, true);
    let url = submission.url.clone();
    let task_result = tokio::time::timeout(
        config.submission_timeout,
        retry_with_backoff(
            || {
                let submission = submission.clone();
                let task = task.clone();
                async move { (*task)(submission).await }
            },
            retry_policy,
            |e: &SummarizerError| e.is_retryable(),
        ),
    )
    .await;

    // Permits are released here, before any persistence the caller's
    // `task` closure did internally has to outlive this point — staged
    // persistence (spec.md §4.4.2) is the task closure's responsibility,
    // not the orchestrator's.
    drop(user_guard);
    drop(global_guard);

    let outcome = match task_result {
        Ok(Ok(())) => {
            circuit.record_success().await;
            ok(url, started)
        }
        Ok(Err(submitted_err)) => {
            circuit.record_failure().await;
            err(url, submitted_err.category(), submitted_err.to_string(), submitted_err.retry_possible(), started)
        }
        Err(_timeout) => {
            circuit.record_failure().await;
            err(url, "timeout", format!("submission exceeded {:?} timeout", config.submission_timeout), true, started)
        }
    };

    outcome
}
