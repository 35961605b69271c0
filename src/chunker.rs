//! Work chunking: pulls candidates from a strategy stream in fixed-size
//! batches and assigns batch `i` to bucket `i mod W`.
//!
//! [`chunk_candidates`] materializes every bucket up front. [`Dispatcher`]
//! performs the same assignment incrementally, handing each batch to its
//! worker over a bounded channel so at most `queue_depth` batches per worker
//! are ever in flight.
use std::time::Duration;

use crossbeam_channel::{SendTimeoutError, Sender};
use log::debug;

use crate::attack::{AttackError, Candidates};
use crate::worker::CancelFlag;

/// Candidates pulled from the stream per batch.
pub const DEFAULT_BATCH_SIZE: usize = 50_000;

/// An ordered, finite run of candidates owned by one worker.
pub type WorkChunk = Vec<String>;

/// Adapts a candidate stream into batches of at most `size` candidates.
/// When the stream fails part way through a batch, the candidates pulled so
/// far are yielded first and the error follows on the next call. Nothing is
/// yielded after the error.
pub struct Batches {
    inner: Candidates,
    size: usize,
    done: bool,
    pending_error: Option<AttackError>,
}

impl Batches {
    pub fn new(inner: Candidates, size: usize) -> Self {
        Self {
            inner,
            size: size.max(1),
            done: false,
            pending_error: None,
        }
    }
}

impl Iterator for Batches {
    type Item = Result<WorkChunk, AttackError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending_error.take() {
            return Some(Err(e));
        }
        if self.done {
            return None;
        }
        let mut batch = Vec::with_capacity(self.size);
        while batch.len() < self.size {
            match self.inner.next() {
                Some(Ok(candidate)) => batch.push(candidate),
                Some(Err(e)) => {
                    self.done = true;
                    if batch.is_empty() {
                        return Some(Err(e));
                    }
                    self.pending_error = Some(e);
                    break;
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if batch.is_empty() { None } else { Some(Ok(batch)) }
    }
}

/// Split the whole stream into at most `workers` chunks, round-robin by
/// batch. Empty buckets are dropped; an empty stream yields one empty chunk.
pub fn chunk_candidates(
    candidates: Candidates,
    workers: usize,
    batch_size: usize,
) -> Result<Vec<WorkChunk>, AttackError> {
    let workers = workers.max(1);
    let mut buckets: Vec<WorkChunk> = vec![Vec::new(); workers];
    for (i, batch) in Batches::new(candidates, batch_size).enumerate() {
        buckets[i % workers].extend(batch?);
    }
    buckets.retain(|b| !b.is_empty());
    if buckets.is_empty() {
        buckets.push(Vec::new());
    }
    Ok(buckets)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub batches: u64,
    pub candidates: u64,
    /// Batches whose worker had already exited.
    pub dropped_batches: u64,
}

/// Streams batches to per-worker channels in round-robin order.
pub struct Dispatcher {
    senders: Vec<Sender<WorkChunk>>,
    closed: Vec<bool>,
    cancel: CancelFlag,
    next_batch: usize,
    poll_interval: Duration,
    summary: DispatchSummary,
}

impl Dispatcher {
    pub fn new(senders: Vec<Sender<WorkChunk>>, cancel: CancelFlag) -> Self {
        Self {
            closed: vec![false; senders.len()],
            senders,
            cancel,
            next_batch: 0,
            poll_interval: Duration::from_millis(50),
            summary: DispatchSummary::default(),
        }
    }

    /// Continue numbering from `index`, for when earlier batches were
    /// delivered by the caller.
    pub fn starting_at(mut self, index: usize) -> Self {
        self.next_batch = index;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Deliver one batch to its bucket. Returns `false` once cancelled or
    /// once every worker has exited.
    pub fn dispatch(&mut self, batch: WorkChunk) -> bool {
        if self.senders.is_empty() {
            return false;
        }
        let bucket = self.next_batch % self.senders.len();
        self.next_batch += 1;
        if self.closed[bucket] {
            self.summary.dropped_batches += 1;
            return true;
        }
        let len = batch.len() as u64;
        let mut pending = batch;
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            match self.senders[bucket].send_timeout(pending, self.poll_interval) {
                Ok(()) => {
                    self.summary.batches += 1;
                    self.summary.candidates += len;
                    return true;
                }
                Err(SendTimeoutError::Timeout(back)) => pending = back,
                Err(SendTimeoutError::Disconnected(_)) => {
                    debug!("worker {bucket} has exited; dropping its batches");
                    self.closed[bucket] = true;
                    self.summary.dropped_batches += 1;
                    return !self.closed.iter().all(|&c| c);
                }
            }
        }
    }

    /// Drain `batches` into the workers until the stream ends, a stream
    /// error occurs, or the run is cancelled. Channels close on return, so
    /// batches delivered before an error are still consumed.
    pub fn run(
        mut self,
        batches: impl Iterator<Item = Result<WorkChunk, AttackError>>,
    ) -> Result<DispatchSummary, AttackError> {
        for batch in batches {
            if !self.dispatch(batch?) {
                debug!("dispatch stopped after {} batches", self.summary.batches);
                break;
            }
        }
        Ok(self.summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn numbers(n: usize) -> Candidates {
        Box::new((0..n).map(|i| Ok(i.to_string())))
    }

    #[test]
    fn round_robin_at_batch_granularity() {
        let chunks = chunk_candidates(numbers(10), 2, 3).unwrap();
        assert_eq!(chunks.len(), 2);
        // batches: [0,1,2] [3,4,5] [6,7,8] [9]
        assert_eq!(chunks[0], vec!["0", "1", "2", "6", "7", "8"]);
        assert_eq!(chunks[1], vec!["3", "4", "5", "9"]);
    }

    #[test]
    fn empty_buckets_are_dropped() {
        let chunks = chunk_candidates(numbers(4), 8, 3).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks.iter().map(Vec::len).sum::<usize>(), 4);
    }

    #[test]
    fn empty_stream_yields_single_empty_chunk() {
        let chunks = chunk_candidates(numbers(0), 4, 3).unwrap();
        assert_eq!(chunks, vec![Vec::<String>::new()]);
    }

    #[test]
    fn stream_errors_propagate() {
        let failing: Candidates = Box::new(
            vec![
                Ok("a".to_string()),
                Err(AttackError::Configuration("boom".into())),
            ]
            .into_iter(),
        );
        assert!(chunk_candidates(failing, 2, 1).is_err());
    }

    fn failing_after(n: usize) -> Candidates {
        Box::new(
            (0..n)
                .map(|i| Ok(i.to_string()))
                .chain(std::iter::once(Err(AttackError::Configuration(
                    "read failed".into(),
                ))))
                .chain((n..n + 3).map(|i| Ok(i.to_string()))),
        )
    }

    #[test]
    fn partial_batch_is_yielded_before_the_error() {
        let mut batches = Batches::new(failing_after(5), 2);
        assert_eq!(batches.next().unwrap().unwrap(), vec!["0", "1"]);
        assert_eq!(batches.next().unwrap().unwrap(), vec!["2", "3"]);
        assert_eq!(batches.next().unwrap().unwrap(), vec!["4"]);
        assert!(matches!(
            batches.next(),
            Some(Err(AttackError::Configuration(ref m))) if m == "read failed"
        ));
        assert!(batches.next().is_none());
    }

    #[test]
    fn error_on_batch_boundary_yields_no_empty_batch() {
        let mut batches = Batches::new(failing_after(4), 2);
        assert_eq!(batches.next().unwrap().unwrap().len(), 2);
        assert_eq!(batches.next().unwrap().unwrap().len(), 2);
        assert!(batches.next().unwrap().is_err());
        assert!(batches.next().is_none());
    }

    #[test]
    fn dispatcher_delivers_batches_read_before_a_stream_error() {
        let (tx0, rx0) = bounded(8);
        let (tx1, rx1) = bounded(8);
        let err = Dispatcher::new(vec![tx0, tx1], CancelFlag::new())
            .run(Batches::new(failing_after(5), 2))
            .unwrap_err();
        assert!(err.to_string().contains("read failed"));
        // Senders are dropped with the dispatcher; receivers see the end.
        let got0: Vec<WorkChunk> = rx0.iter().collect();
        let got1: Vec<WorkChunk> = rx1.iter().collect();
        assert_eq!(got0, vec![vec!["0", "1"], vec!["4"]]);
        assert_eq!(got1, vec![vec!["2", "3"]]);
    }

    #[test]
    fn dispatcher_matches_materialized_assignment() {
        let (tx0, rx0) = bounded(16);
        let (tx1, rx1) = bounded(16);
        let summary = Dispatcher::new(vec![tx0, tx1], CancelFlag::new())
            .run(Batches::new(numbers(10), 3))
            .unwrap();
        assert_eq!(summary.batches, 4);
        assert_eq!(summary.candidates, 10);
        let got0: Vec<String> = rx0.iter().flatten().collect();
        let got1: Vec<String> = rx1.iter().flatten().collect();
        let expected = chunk_candidates(numbers(10), 2, 3).unwrap();
        assert_eq!(got0, expected[0]);
        assert_eq!(got1, expected[1]);
    }

    #[test]
    fn dispatcher_stops_when_cancelled() {
        let (tx, rx) = bounded(1);
        let cancel = CancelFlag::new();
        let mut d = Dispatcher::new(vec![tx], cancel.clone())
            .with_poll_interval(Duration::from_millis(5));
        assert!(d.dispatch(vec!["a".into()]));
        cancel.cancel();
        // Channel is full and the flag is set: gives up instead of blocking.
        assert!(!d.dispatch(vec!["b".into()]));
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn dispatcher_skips_exited_workers() {
        let (tx0, rx0) = bounded(4);
        let (tx1, rx1) = bounded(4);
        drop(rx1);
        let summary = Dispatcher::new(vec![tx0, tx1], CancelFlag::new())
            .run(Batches::new(numbers(4), 1))
            .unwrap();
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.dropped_batches, 2);
        assert_eq!(rx0.iter().flatten().collect::<Vec<_>>(), vec!["0", "2"]);
    }

    #[test]
    fn dispatcher_stops_once_every_worker_has_exited() {
        let (tx0, rx0) = bounded(4);
        let (tx1, rx1) = bounded(4);
        drop(rx0);
        drop(rx1);
        let endless: Candidates = Box::new(std::iter::repeat_with(|| Ok("x".to_string())));
        let summary = Dispatcher::new(vec![tx0, tx1], CancelFlag::new())
            .run(Batches::new(endless, 10))
            .unwrap();
        assert_eq!(summary.batches, 0);
        assert_eq!(summary.dropped_batches, 2);
    }
}
