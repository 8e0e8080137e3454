//! Promise Queues
//!
//! Rendezvous queues between asynchronous request handlers and the test
//! harness driving them. A `PromiseQueue` is a FIFO where producers `push`
//! and consumers `shift` with a timeout; every value is delivered to exactly
//! one waiter and waiters are served in arrival order. `push_and_wait`
//! additionally carries a reply inbox the consumer must fulfil before the
//! producer resumes.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::timeout;

use crate::error::{ServerError, ServerResult};

/// Default timeout for every harness-blocking wait.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

struct QueueInner<T> {
    values: VecDeque<T>,
    waiters: VecDeque<oneshot::Sender<T>>,
}

/// A FIFO rendezvous queue with timeouts on the consuming side.
pub struct PromiseQueue<T> {
    inner: Mutex<QueueInner<T>>,
    default_timeout: Duration,
}

impl<T> PromiseQueue<T> {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(default_timeout: Duration) -> Self {
        PromiseQueue {
            inner: Mutex::new(QueueInner {
                values: VecDeque::new(),
                waiters: VecDeque::new(),
            }),
            default_timeout,
        }
    }

    /// Pushes a value; hands it directly to the oldest live waiter if any.
    pub fn push(&self, value: T) {
        let mut inner = self.inner.lock().unwrap();
        let mut value = value;
        // A waiter whose receiver was dropped (timed out) is invalid; skip it
        // and offer the value to the next one.
        while let Some(waiter) = inner.waiters.pop_front() {
            match waiter.send(value) {
                Ok(()) => return,
                Err(v) => value = v,
            }
        }
        inner.values.push_back(value);
    }

    /// Removes and returns the oldest value without waiting.
    pub fn try_shift(&self) -> Option<T> {
        self.inner.lock().unwrap().values.pop_front()
    }

    /// Waits for the oldest value, up to the queue's default timeout.
    pub async fn shift(&self) -> ServerResult<T> {
        self.shift_timeout(self.default_timeout).await
    }

    /// Waits for the oldest value, up to `wait`.
    pub async fn shift_timeout(&self, wait: Duration) -> ServerResult<T> {
        let rx = {
            let mut inner = self.inner.lock().unwrap();
            if let Some(value) = inner.values.pop_front() {
                return Ok(value);
            }
            let (tx, rx) = oneshot::channel();
            inner.waiters.push_back(tx);
            rx
        };

        match timeout(wait, rx).await {
            Ok(Ok(value)) => Ok(value),
            // Sender dropped: the queue went away underneath us.
            Ok(Err(_)) => Err(ServerError::QueueTimeout),
            Err(_) => Err(ServerError::QueueTimeout),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for PromiseQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Pushes `value` paired with a reply inbox and waits for the consumer to
/// fulfil it. The consumer `shift`s the pair and sends the acknowledgement
/// through the carried sender.
pub async fn push_and_wait<T, A>(
    queue: &PromiseQueue<(T, oneshot::Sender<A>)>,
    value: T,
    wait: Duration,
) -> ServerResult<A> {
    let (tx, rx) = oneshot::channel();
    queue.push((value, tx));
    match timeout(wait, rx).await {
        Ok(Ok(ack)) => Ok(ack),
        Ok(Err(_)) => Err(ServerError::QueueTimeout),
        Err(_) => Err(ServerError::QueueTimeout),
    }
}
