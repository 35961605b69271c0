//! Verification workers.
//!
//! A worker tests the candidates of its chunk in order against one target
//! digest. It checks the shared [`CancelFlag`] before every verification,
//! reports attempt deltas on a stats channel every `report_interval`
//! attempts, and finishes with exactly one [`WorkerMessage`] on the results
//! channel. Verification errors and panics end the worker with a
//! `NotFound` message carrying the error text; siblings are unaffected.
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use log::{debug, warn};

use crate::chunker::WorkChunk;
use crate::hash::HashAlgorithm;

pub const DEFAULT_REPORT_INTERVAL: u64 = 100_000;

/// Shared stop signal. One writer (the engine), many readers.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Final message of a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
    Found {
        worker_id: usize,
        password: String,
        attempts: u64,
    },
    NotFound {
        worker_id: usize,
        attempts: u64,
        error: Option<String>,
    },
}

impl WorkerMessage {
    pub fn worker_id(&self) -> usize {
        match self {
            WorkerMessage::Found { worker_id, .. } | WorkerMessage::NotFound { worker_id, .. } => {
                *worker_id
            }
        }
    }

    pub fn attempts(&self) -> u64 {
        match self {
            WorkerMessage::Found { attempts, .. } | WorkerMessage::NotFound { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Attempts made since the worker's previous report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressDelta {
    pub worker_id: usize,
    pub attempts: u64,
}

pub struct Worker {
    id: usize,
    target: Arc<str>,
    algorithm: Arc<dyn HashAlgorithm>,
    cancel: CancelFlag,
    results: Sender<WorkerMessage>,
    stats: Sender<ProgressDelta>,
    report_interval: u64,
    poll_interval: Duration,
}

#[derive(Default)]
struct Tally {
    attempts: u64,
    unreported: u64,
}

enum Finish {
    Found(String),
    Exhausted,
    Cancelled,
    Failed(String),
}

impl Worker {
    pub fn new(
        id: usize,
        target: Arc<str>,
        algorithm: Arc<dyn HashAlgorithm>,
        cancel: CancelFlag,
        results: Sender<WorkerMessage>,
        stats: Sender<ProgressDelta>,
    ) -> Self {
        Self {
            id,
            target,
            algorithm,
            cancel,
            results,
            stats,
            report_interval: DEFAULT_REPORT_INTERVAL,
            poll_interval: Duration::from_millis(50),
        }
    }

    pub fn with_report_interval(mut self, attempts: u64) -> Self {
        self.report_interval = attempts.max(1);
        self
    }

    /// How long to wait for the next batch before re-checking cancellation.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Test every batch received on `batches` until a match, cancellation,
    /// an error, or the channel closes. Returns the message that was sent.
    pub fn run(&self, batches: Receiver<WorkChunk>) -> WorkerMessage {
        let mut tally = Tally::default();
        let finish = match catch_unwind(AssertUnwindSafe(|| self.drive(&batches, &mut tally))) {
            Ok(finish) => finish,
            Err(payload) => Finish::Failed(format!("worker panicked: {}", panic_text(&*payload))),
        };
        self.flush(&mut tally);

        let message = match finish {
            Finish::Found(password) => WorkerMessage::Found {
                worker_id: self.id,
                password,
                attempts: tally.attempts,
            },
            Finish::Exhausted | Finish::Cancelled => WorkerMessage::NotFound {
                worker_id: self.id,
                attempts: tally.attempts,
                error: None,
            },
            Finish::Failed(error) => {
                warn!("worker {} stopped: {error}", self.id);
                WorkerMessage::NotFound {
                    worker_id: self.id,
                    attempts: tally.attempts,
                    error: Some(error),
                }
            }
        };
        if self.results.send(message.clone()).is_err() {
            debug!("worker {}: result receiver dropped", self.id);
        }
        message
    }

    /// Convenience for a single, fully materialized chunk.
    pub fn run_chunk(&self, chunk: WorkChunk) -> WorkerMessage {
        let (tx, rx) = bounded(1);
        // Capacity 1 and a fresh receiver: cannot fail.
        let _ = tx.send(chunk);
        drop(tx);
        self.run(rx)
    }

    fn drive(&self, batches: &Receiver<WorkChunk>, tally: &mut Tally) -> Finish {
        loop {
            if self.cancel.is_cancelled() {
                return Finish::Cancelled;
            }
            let batch = match batches.recv_timeout(self.poll_interval) {
                Ok(batch) => batch,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Finish::Exhausted,
            };
            for candidate in batch {
                if self.cancel.is_cancelled() {
                    return Finish::Cancelled;
                }
                let verdict = self.algorithm.verify(&candidate, &self.target);
                tally.attempts += 1;
                tally.unreported += 1;
                match verdict {
                    Ok(true) => return Finish::Found(candidate),
                    Ok(false) => {}
                    Err(e) => return Finish::Failed(e.to_string()),
                }
                if tally.unreported >= self.report_interval {
                    self.flush(tally);
                }
            }
        }
    }

    fn flush(&self, tally: &mut Tally) {
        if tally.unreported == 0 {
            return;
        }
        let delta = ProgressDelta {
            worker_id: self.id,
            attempts: tally.unreported,
        };
        tally.unreported = 0;
        let _ = self.stats.send(delta);
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{HashError, md5};
    use crossbeam_channel::unbounded;

    #[derive(Debug)]
    struct Faulty;

    impl HashAlgorithm for Faulty {
        fn name(&self) -> &str {
            "faulty"
        }
        fn hash(&self, plaintext: &str) -> String {
            plaintext.to_string()
        }
        fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, HashError> {
            match plaintext {
                "boom" => Err(HashError::Other("cannot hash boom".into())),
                "panic" => panic!("exploded on {plaintext}"),
                _ => Ok(plaintext == digest),
            }
        }
    }

    struct Harness {
        worker: Worker,
        results: Receiver<WorkerMessage>,
        stats: Receiver<ProgressDelta>,
        cancel: CancelFlag,
    }

    fn harness(algorithm: Arc<dyn HashAlgorithm>, target: &str) -> Harness {
        let (rtx, results) = unbounded();
        let (stx, stats) = unbounded();
        let cancel = CancelFlag::new();
        let worker = Worker::new(7, Arc::from(target), algorithm, cancel.clone(), rtx, stx)
            .with_poll_interval(Duration::from_millis(5));
        Harness {
            worker,
            results,
            stats,
            cancel,
        }
    }

    fn chunk(words: &[&str]) -> WorkChunk {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn stops_at_first_match() {
        let target = md5().hash("b");
        let h = harness(Arc::new(md5()), &target);
        let msg = h.worker.run_chunk(chunk(&["a", "b", "c"]));
        assert_eq!(
            msg,
            WorkerMessage::Found {
                worker_id: 7,
                password: "b".into(),
                attempts: 2
            }
        );
        assert_eq!(h.results.try_recv().unwrap(), msg);
        let reported: u64 = h.stats.try_iter().map(|d| d.attempts).sum();
        assert_eq!(reported, 2);
    }

    #[test]
    fn exhausted_chunk_reports_every_attempt() {
        let h = harness(Arc::new(md5()), &md5().hash("zzz"));
        let msg = h.worker.run_chunk(chunk(&["a", "b", "c"]));
        assert_eq!(
            msg,
            WorkerMessage::NotFound {
                worker_id: 7,
                attempts: 3,
                error: None
            }
        );
    }

    #[test]
    fn progress_arrives_at_interval_and_remainder_is_flushed() {
        let h = harness(Arc::new(md5()), &md5().hash("zzz"));
        let worker = h.worker.with_report_interval(2);
        worker.run_chunk(chunk(&["a", "b", "c", "d", "e"]));
        let deltas: Vec<u64> = h.stats.try_iter().map(|d| d.attempts).collect();
        assert_eq!(deltas, vec![2, 2, 1]);
    }

    #[test]
    fn cancelled_before_start_tests_nothing() {
        let h = harness(Arc::new(md5()), &md5().hash("a"));
        h.cancel.cancel();
        let msg = h.worker.run_chunk(chunk(&["a"]));
        assert_eq!(msg.attempts(), 0);
        assert!(matches!(msg, WorkerMessage::NotFound { error: None, .. }));
        assert!(h.stats.try_recv().is_err());
    }

    #[test]
    fn verification_error_is_contained() {
        let h = harness(Arc::new(Faulty), "x");
        let msg = h.worker.run_chunk(chunk(&["a", "boom", "x"]));
        match msg {
            WorkerMessage::NotFound {
                attempts, error, ..
            } => {
                assert_eq!(attempts, 2);
                assert!(error.unwrap().contains("cannot hash boom"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn panic_is_contained() {
        let h = harness(Arc::new(Faulty), "x");
        let msg = h.worker.run_chunk(chunk(&["a", "panic", "x"]));
        match msg {
            WorkerMessage::NotFound { error, .. } => {
                assert!(error.unwrap().contains("exploded on panic"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(h.results.len(), 1);
    }

    #[test]
    fn consumes_batches_until_channel_closes() {
        let h = harness(Arc::new(md5()), &md5().hash("f"));
        let (tx, rx) = bounded(4);
        tx.send(chunk(&["a", "b"])).unwrap();
        tx.send(chunk(&["c", "d"])).unwrap();
        tx.send(chunk(&["e", "f", "g"])).unwrap();
        drop(tx);
        let msg = h.worker.run(rx);
        assert_eq!(msg.attempts(), 6);
        assert!(matches!(msg, WorkerMessage::Found { ref password, .. } if password == "f"));
    }
}
