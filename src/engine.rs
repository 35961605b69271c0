//! Engine: runs one attack against one target digest across a pool of
//! verification workers.
//!
//! The candidate stream is cut into batches and dealt round-robin to the
//! workers; the calling thread only coordinates. It polls the result channel
//! with a short timeout, drains progress deltas on every iteration, watches
//! the deadline and the interrupt handle, and throttles the progress
//! callback.
//!
//! Typical usage:
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use hashaudit::attack::AttackStrategy;
//! use hashaudit::engine::CrackingEngine;
//! use hashaudit::hash::md5;
//! # fn main() -> anyhow::Result<()> {
//! let algorithm = Arc::new(md5());
//! let mut strategy = AttackStrategy::dictionary(algorithm.clone(), "words.txt", true);
//! let mut engine = CrackingEngine::new().with_workers(4);
//! let result = engine.crack(
//!     "5f4dcc3b5aa765d61d8327deb882cf99",
//!     algorithm,
//!     &mut strategy,
//!     Some(Duration::from_secs(60)),
//! )?;
//! println!("{}", hashaudit::report::render_result(&result));
//! # Ok(())
//! # }
//! ```
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded, unbounded};
use log::{debug, info, warn};

use crate::attack::{AttackError, AttackStrategy, Candidates};
use crate::chunker::{Batches, DEFAULT_BATCH_SIZE, DispatchSummary, Dispatcher};
use crate::hash::HashAlgorithm;
use crate::worker::{
    CancelFlag, DEFAULT_REPORT_INTERVAL, ProgressDelta, Worker, WorkerMessage,
};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Attack(#[from] AttackError),
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("failed to spawn candidate feeder: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Tunables for a [`CrackingEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on concurrent workers.
    pub workers: usize,
    /// Candidates per batch handed to a worker.
    pub batch_size: usize,
    /// Attempts between a worker's progress reports.
    pub report_interval: u64,
    /// Longest single wait on the result channel.
    pub poll_interval: Duration,
    /// Minimum spacing between progress callbacks.
    pub progress_interval: Duration,
    /// How long to wait for workers after cancelling them.
    pub join_timeout: Duration,
    /// Batches buffered per worker ahead of consumption.
    pub queue_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            batch_size: DEFAULT_BATCH_SIZE,
            report_interval: DEFAULT_REPORT_INTERVAL,
            poll_interval: Duration::from_millis(50),
            progress_interval: Duration::from_millis(500),
            join_timeout: Duration::from_secs(1),
            queue_depth: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Chunking,
    Running,
    Found,
    Exhausted,
    TimedOut,
    Interrupted,
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Found,
    Exhausted,
    TimedOut,
    Interrupted,
    /// The algorithm refuses offline search; nothing was attempted.
    NotAttackable,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Found => "found",
            Outcome::Exhausted => "search space exhausted",
            Outcome::TimedOut => "timed out",
            Outcome::Interrupted => "interrupted",
            Outcome::NotAttackable => "algorithm not attackable",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    pub attempts: u64,
    pub elapsed: Duration,
    pub active_workers: usize,
}

pub type ProgressSink = Box<dyn FnMut(&ProgressSample) + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrackResult {
    pub success: bool,
    pub password: Option<String>,
    pub attempts: u64,
    pub elapsed: Duration,
    pub strategy: String,
    pub algorithm: String,
    pub outcome: Outcome,
    /// Error annotations from workers and the candidate feeder.
    pub errors: Vec<String>,
}

impl CrackResult {
    pub fn hashes_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.attempts as f64 / secs
        } else {
            0.0
        }
    }
}

/// Requests that a running crack stop. Cloneable and usable from a signal
/// handler thread.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInfo {
    pub max_workers: usize,
    pub cpu_count: usize,
    pub progress_tracking: bool,
}

pub struct CrackingEngine {
    config: EngineConfig,
    progress: Option<ProgressSink>,
    interrupt: InterruptHandle,
    state: EngineState,
}

impl Default for CrackingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CrackingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrackingEngine")
            .field("config", &self.config)
            .field("progress", &self.progress.is_some())
            .field("state", &self.state)
            .finish()
    }
}

/// Decrements the live-worker count when a pool job ends, even by unwinding.
struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Per-run bookkeeping on the coordinating thread.
struct Tracker {
    reported: Vec<u64>,
    total: u64,
    finished: usize,
    found: Option<(usize, String, u64)>,
    errors: Vec<String>,
}

impl Tracker {
    fn new(workers: usize) -> Self {
        Self {
            reported: vec![0; workers],
            total: 0,
            finished: 0,
            found: None,
            errors: Vec::new(),
        }
    }

    fn drain_stats(&mut self, stats: &Receiver<ProgressDelta>) {
        for delta in stats.try_iter() {
            if let Some(slot) = self.reported.get_mut(delta.worker_id) {
                *slot += delta.attempts;
            }
            self.total += delta.attempts;
        }
    }

    /// `accept_found` is false once the run has already been decided.
    fn record(&mut self, message: WorkerMessage, accept_found: bool) {
        self.finished += 1;
        match message {
            WorkerMessage::Found {
                worker_id,
                password,
                attempts,
            } => {
                if self.found.is_none() && accept_found {
                    debug!("worker {worker_id} found the password after {attempts} attempts");
                    self.found = Some((worker_id, password, attempts));
                } else {
                    debug!("ignoring late match from worker {worker_id}");
                }
            }
            WorkerMessage::NotFound {
                worker_id,
                error: Some(error),
                ..
            } => self.errors.push(format!("worker {worker_id}: {error}")),
            WorkerMessage::NotFound { .. } => {}
        }
    }

    /// Reported total with the winner's contribution replaced by its own
    /// final count.
    fn attempts(&self) -> u64 {
        match &self.found {
            Some((id, _, local)) => {
                let winner_reported = self.reported.get(*id).copied().unwrap_or(0);
                self.total - winner_reported.min(self.total) + local
            }
            None => self.total,
        }
    }
}

impl CrackingEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            progress: None,
            interrupt: InterruptHandle::default(),
            state: EngineState::Idle,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.workers = workers.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size.max(1);
        self
    }

    pub fn with_report_interval(mut self, attempts: u64) -> Self {
        self.config.report_interval = attempts.max(1);
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.config.join_timeout = timeout;
        self
    }

    /// Register a callback invoked at most once per progress interval.
    pub fn with_progress<F>(mut self, sink: F) -> Self
    where
        F: FnMut(&ProgressSample) + Send + 'static,
    {
        self.progress = Some(Box::new(sink));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn info(&self) -> EngineInfo {
        EngineInfo {
            max_workers: self.config.workers,
            cpu_count: num_cpus::get(),
            progress_tracking: self.progress.is_some(),
        }
    }

    /// Search `strategy`'s candidates for a plaintext of `target`.
    ///
    /// Errors are returned only for problems detected before any worker
    /// starts (bad configuration, missing wordlist, pool creation). Once work
    /// has begun, every ending is a [`CrackResult`].
    pub fn crack(
        &mut self,
        target: &str,
        algorithm: Arc<dyn HashAlgorithm>,
        strategy: &mut AttackStrategy,
        timeout: Option<Duration>,
    ) -> Result<CrackResult, EngineError> {
        if !algorithm.is_attackable() {
            return Ok(self.refuse(Instant::now(), strategy.name(), &*algorithm));
        }
        strategy.set_target(target);
        strategy.reset_stats();
        let candidates = strategy.generate()?;
        let result = self.crack_stream(target, algorithm, strategy.name(), candidates, timeout)?;
        strategy.record_attempts(result.attempts);
        Ok(result)
    }

    /// Search an arbitrary candidate stream. `label` names the source in
    /// the result.
    ///
    /// A stream error that arrives after the first batch has been read ends
    /// the supply of work but not the run: the batches already read are
    /// still tested, and the error is listed in [`CrackResult::errors`].
    pub fn crack_stream(
        &mut self,
        target: &str,
        algorithm: Arc<dyn HashAlgorithm>,
        label: &str,
        candidates: Candidates,
        timeout: Option<Duration>,
    ) -> Result<CrackResult, EngineError> {
        let start = Instant::now();
        self.interrupt.clear();
        self.state = EngineState::Idle;

        if !algorithm.is_attackable() {
            return Ok(self.refuse(start, label, &*algorithm));
        }

        self.state = EngineState::Chunking;
        let digest: Arc<str> = Arc::from(algorithm.normalize_hash(target));

        let mut batches = Batches::new(candidates, self.config.batch_size);
        let mut primed = Vec::with_capacity(self.config.workers);
        let mut stream_error = None;
        while primed.len() < self.config.workers.max(1) {
            match batches.next() {
                Some(Ok(batch)) => primed.push(batch),
                Some(Err(e)) if primed.is_empty() => return Err(e.into()),
                Some(Err(e)) => {
                    warn!("candidate stream failed: {e}");
                    stream_error = Some(e);
                    break;
                }
                None => break,
            }
        }
        let worker_count = primed.len().max(1);
        info!(
            "cracking {} digest with {} on {} worker(s)",
            algorithm.name(),
            label,
            worker_count
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .thread_name(|i| format!("hashaudit-worker-{i}"))
            .build()?;

        let cancel = CancelFlag::new();
        let (results_tx, results_rx) = unbounded();
        let (stats_tx, stats_rx) = unbounded();
        let running = Arc::new(AtomicUsize::new(worker_count));
        let mut senders = Vec::with_capacity(worker_count);
        let mut primed = primed.into_iter();

        for id in 0..worker_count {
            let (tx, rx) = bounded(self.config.queue_depth.max(1));
            if let Some(batch) = primed.next() {
                // Fresh channel with room for at least one batch.
                let _ = tx.send(batch);
            }
            senders.push(tx);
            let worker = Worker::new(
                id,
                Arc::clone(&digest),
                Arc::clone(&algorithm),
                cancel.clone(),
                results_tx.clone(),
                stats_tx.clone(),
            )
            .with_report_interval(self.config.report_interval)
            .with_poll_interval(self.config.poll_interval);
            let guard = RunningGuard(Arc::clone(&running));
            pool.spawn(move || {
                let _guard = guard;
                worker.run(rx);
            });
        }
        drop(results_tx);
        drop(stats_tx);

        let dispatcher = Dispatcher::new(senders, cancel.clone())
            .starting_at(worker_count)
            .with_poll_interval(self.config.poll_interval);
        let feeder = thread::Builder::new()
            .name("hashaudit-feeder".to_string())
            .spawn(move || dispatcher.run(batches));
        let feeder = match feeder {
            Ok(handle) => handle,
            Err(e) => {
                cancel.cancel();
                return Err(EngineError::Spawn(e));
            }
        };

        self.state = EngineState::Running;
        let mut tracker = Tracker::new(worker_count);
        if let Some(e) = stream_error {
            tracker.errors.push(format!("candidate stream: {e}"));
        }
        let mut last_progress = start;

        let terminal = loop {
            match results_rx.recv_timeout(self.config.poll_interval) {
                Ok(message) => tracker.record(message, true),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break EngineState::Exhausted,
            }
            tracker.drain_stats(&stats_rx);

            if tracker.found.is_some() {
                break EngineState::Found;
            }
            if tracker.finished >= worker_count {
                break EngineState::Exhausted;
            }
            if self.interrupt.is_interrupted() {
                info!("interrupt received; stopping workers");
                break EngineState::Interrupted;
            }
            if timeout.is_some_and(|limit| start.elapsed() >= limit) {
                info!("timeout reached after {:.2?}", start.elapsed());
                break EngineState::TimedOut;
            }
            if let Some(sink) = self.progress.as_mut() {
                if last_progress.elapsed() >= self.config.progress_interval {
                    last_progress = Instant::now();
                    sink(&ProgressSample {
                        attempts: tracker.total,
                        elapsed: start.elapsed(),
                        active_workers: running.load(Ordering::SeqCst),
                    });
                }
            }
        };

        cancel.cancel();
        self.join(&running, &results_rx, &stats_rx, &mut tracker);
        match finish_feeder(feeder, self.config.join_timeout) {
            Some(Ok(summary)) => debug!(
                "feeder delivered {} batches ({} candidates, {} dropped)",
                summary.batches, summary.candidates, summary.dropped_batches
            ),
            Some(Err(e)) => {
                warn!("candidate stream failed: {e}");
                tracker.errors.push(format!("candidate stream: {e}"));
            }
            None => debug!("feeder still running after join timeout"),
        }

        self.state = terminal;
        let attempts = tracker.attempts();
        let elapsed = start.elapsed();
        let (success, password) = match (terminal, tracker.found) {
            (EngineState::Found, Some((_, password, _))) => (true, Some(password)),
            _ => (false, None),
        };
        let outcome = match terminal {
            EngineState::Found => Outcome::Found,
            EngineState::TimedOut => Outcome::TimedOut,
            EngineState::Interrupted => Outcome::Interrupted,
            _ => Outcome::Exhausted,
        };
        info!(
            "{} after {} attempts in {:.2?}",
            outcome, attempts, elapsed
        );
        Ok(CrackResult {
            success,
            password,
            attempts,
            elapsed,
            strategy: label.to_string(),
            algorithm: algorithm.name().to_string(),
            outcome,
            errors: tracker.errors,
        })
    }

    fn refuse(&mut self, start: Instant, label: &str, algorithm: &dyn HashAlgorithm) -> CrackResult {
        warn!("{} is not attackable offline; skipping", algorithm.name());
        self.state = EngineState::Idle;
        CrackResult {
            success: false,
            password: None,
            attempts: 0,
            elapsed: start.elapsed(),
            strategy: label.to_string(),
            algorithm: algorithm.name().to_string(),
            outcome: Outcome::NotAttackable,
            errors: Vec::new(),
        }
    }

    /// Wait up to the join timeout for every worker to exit, collecting
    /// whatever they send meanwhile. Workers still busy afterwards are left
    /// to finish on their own.
    fn join(
        &self,
        running: &AtomicUsize,
        results: &Receiver<WorkerMessage>,
        stats: &Receiver<ProgressDelta>,
        tracker: &mut Tracker,
    ) {
        let deadline = Instant::now() + self.config.join_timeout;
        let tick = self.config.poll_interval.min(Duration::from_millis(10));
        while running.load(Ordering::SeqCst) > 0 && Instant::now() < deadline {
            if let Ok(message) = results.recv_timeout(tick) {
                tracker.record(message, false);
            }
            tracker.drain_stats(stats);
        }
        for message in results.try_iter() {
            tracker.record(message, false);
        }
        tracker.drain_stats(stats);
        let stuck = running.load(Ordering::SeqCst);
        if stuck > 0 {
            warn!("{stuck} worker(s) did not stop within {:?}", self.config.join_timeout);
        }
    }
}

fn finish_feeder(
    feeder: JoinHandle<Result<DispatchSummary, AttackError>>,
    wait: Duration,
) -> Option<Result<DispatchSummary, AttackError>> {
    let deadline = Instant::now() + wait;
    while !feeder.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    if !feeder.is_finished() {
        return None;
    }
    match feeder.join() {
        Ok(result) => Some(result),
        Err(_) => Some(Err(AttackError::Configuration(
            "candidate feeder panicked".to_string(),
        ))),
    }
}
