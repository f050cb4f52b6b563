//! WorkQueue
//!
//! Three named queues — order processing, trade processing, and market
//! data updates — each a priority FIFO with at-least-once delivery,
//! bounded retry with exponential backoff, and a queryable failed-jobs
//! partition for anything that exhausts its attempts.

pub mod work_queue;

pub use work_queue::WorkQueue;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Job<T> {
    pub payload: T,
    pub priority: u8,
    pub attempts: u32,
    enqueued_seq: u64,
    ready_at: Instant,
}

impl<T> Job<T> {
    fn new(payload: T, priority: u8, seq: u64) -> Self {
        Job {
            payload,
            priority,
            attempts: 0,
            enqueued_seq: seq,
            ready_at: Instant::now(),
        }
    }
}

impl<T> PartialEq for Job<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.enqueued_seq == other.enqueued_seq
    }
}
impl<T> Eq for Job<T> {}

impl<T> PartialOrd for Job<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Higher priority first; FIFO (lower sequence number first) within the
/// same priority. `BinaryHeap` is a max-heap so `enqueued_seq` is
/// compared in reverse.
impl<T> Ord for Job<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.enqueued_seq.cmp(&self.enqueued_seq))
    }
}

struct Inner<T> {
    heap: BinaryHeap<Job<T>>,
    failed: Vec<Job<T>>,
    next_seq: u64,
}

/// A single priority-FIFO queue with bounded retry and a failed-jobs
/// partition. `WorkQueue` wraps three of these, one per named queue.
pub struct SingleQueue<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_factor: u32,
}

impl<T: Clone> SingleQueue<T> {
    pub fn new(max_attempts: u32, backoff_base: Duration, backoff_factor: u32) -> Self {
        SingleQueue {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                failed: Vec::new(),
                next_seq: 0,
            }),
            notify: Notify::new(),
            max_attempts,
            backoff_base,
            backoff_factor,
        }
    }

    pub fn push(&self, payload: T, priority: u8) {
        let mut inner = self.inner.lock().unwrap();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(Job::new(payload, priority, seq));
        self.notify.notify_one();
    }

    /// Pop the highest-priority ready job, waiting if the queue is empty
    /// or every job is still in backoff.
    pub async fn pop(&self) -> Job<T> {
        loop {
            let wait = {
                let mut inner = self.inner.lock().unwrap();
                let now = Instant::now();
                if let Some(top) = inner.heap.peek() {
                    if top.ready_at <= now {
                        return inner.heap.pop().unwrap();
                    }
                    Some(top.ready_at - now)
                } else {
                    None
                }
            };
            match wait {
                Some(d) => {
                    tokio::select! {
                        _ = tokio::time::sleep(d) => {}
                        _ = self.notify.notified() => {}
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }

    /// Re-enqueue a failed job with exponential backoff, or move it to
    /// the failed-jobs partition once `max_attempts` is exhausted.
    pub fn retry_or_fail(&self, mut job: Job<T>) {
        job.attempts += 1;
        if job.attempts >= self.max_attempts {
            let mut inner = self.inner.lock().unwrap();
            inner.failed.push(job);
            return;
        }
        let delay = self.backoff_base * self.backoff_factor.pow(job.attempts - 1);
        job.ready_at = Instant::now() + delay;
        let mut inner = self.inner.lock().unwrap();
        inner.heap.push(job);
        drop(inner);
        self.notify.notify_one();
    }

    pub fn failed_jobs(&self) -> Vec<Job<T>> {
        self.inner.lock().unwrap().failed.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn higher_priority_pops_first() {
        let q: SingleQueue<&str> = SingleQueue::new(3, Duration::from_millis(1), 2);
        q.push("low", 0);
        q.push("high", 5);
        assert_eq!(q.pop().await.payload, "high");
        assert_eq!(q.pop().await.payload, "low");
    }

    #[tokio::test]
    async fn same_priority_is_fifo() {
        let q: SingleQueue<u32> = SingleQueue::new(3, Duration::from_millis(1), 2);
        q.push(1, 0);
        q.push(2, 0);
        q.push(3, 0);
        assert_eq!(q.pop().await.payload, 1);
        assert_eq!(q.pop().await.payload, 2);
        assert_eq!(q.pop().await.payload, 3);
    }

    #[tokio::test]
    async fn exhausted_retries_land_in_failed_partition() {
        let q: SingleQueue<&str> = SingleQueue::new(2, Duration::from_millis(1), 2);
        q.push("job", 0);
        let job = q.pop().await;
        q.retry_or_fail(job);
        let job = q.pop().await;
        q.retry_or_fail(job);
        assert!(q.is_empty());
        assert_eq!(q.failed_jobs().len(), 1);
    }
}
