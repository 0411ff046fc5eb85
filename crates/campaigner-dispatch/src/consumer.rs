//! Worker pool that pulls trigger messages off a bounded in-flight queue.
//!
//! Each worker runs one trigger to completion before taking the next, so a
//! campaign is never dispatched by more than one thread at a time from here.
//! Closing the intake lets queued and in-flight triggers drain.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use tracing::{debug, info, warn};

use crate::handler::{Outcome, TriggerHandler};
use crate::policy::RetryPolicy;

/// Anything that can process one raw trigger body.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle_message(&self, body: &[u8]) -> Outcome;
}

impl MessageHandler for TriggerHandler {
    fn handle_message(&self, body: &[u8]) -> Outcome {
        self.handle(body)
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub workers: usize,
    /// Capacity of the intake queue; submits beyond it are refused.
    pub max_in_flight: usize,
    pub retry: RetryPolicy,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            workers: 20,
            max_in_flight: 200,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("too many messages in flight")]
    Full,
    #[error("consumer is shutting down")]
    Closed,
}

type Intake = Arc<Mutex<Option<Sender<Vec<u8>>>>>;

/// Cloneable submit side of a running [`Consumer`].
#[derive(Clone)]
pub struct ConsumerHandle {
    intake: Intake,
}

impl ConsumerHandle {
    pub fn submit(&self, body: Vec<u8>) -> Result<(), SubmitError> {
        let guard = self.intake.lock().map_err(|_| SubmitError::Closed)?;
        let tx = guard.as_ref().ok_or(SubmitError::Closed)?;
        tx.try_send(body).map_err(|e| match e {
            TrySendError::Full(_) => SubmitError::Full,
            TrySendError::Disconnected(_) => SubmitError::Closed,
        })
    }
}

pub struct Consumer {
    intake: Intake,
    workers: Vec<JoinHandle<()>>,
}

impl Consumer {
    pub fn start<H: MessageHandler>(handler: Arc<H>, config: ConsumerConfig) -> std::io::Result<Self> {
        let (tx, rx) = bounded::<Vec<u8>>(config.max_in_flight.max(1));

        let mut workers = Vec::with_capacity(config.workers);
        for idx in 0..config.workers.max(1) {
            let rx = rx.clone();
            let handler = handler.clone();
            let retry = config.retry.clone();
            let handle = thread::Builder::new()
                .name(format!("campaigner-worker-{}", idx))
                .spawn(move || worker_loop(idx, rx, handler.as_ref(), &retry))?;
            workers.push(handle);
        }

        info!(workers = workers.len(), max_in_flight = config.max_in_flight, "Consumer started");
        Ok(Self {
            intake: Arc::new(Mutex::new(Some(tx))),
            workers,
        })
    }

    pub fn handle(&self) -> ConsumerHandle {
        ConsumerHandle {
            intake: self.intake.clone(),
        }
    }

    /// Stop accepting messages and block until every worker has drained.
    pub fn shutdown(self) {
        info!("Stopping consumer...");
        match self.intake.lock() {
            Ok(mut guard) => drop(guard.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }

        for worker in self.workers {
            if worker.join().is_err() {
                warn!("Consumer worker panicked");
            }
        }
        info!("Consumer stopped");
    }
}

fn worker_loop<H: MessageHandler + ?Sized>(idx: usize, rx: Receiver<Vec<u8>>, handler: &H, retry: &RetryPolicy) {
    debug!(worker = idx, "Worker started");
    for body in rx.iter() {
        let outcome = process(handler, &body, retry);
        debug!(worker = idx, ?outcome, "Message acknowledged");
    }
    debug!(worker = idx, "Worker exiting");
}

/// Run the handler, redelivering retryable outcomes per `retry`.
pub(crate) fn process<H: MessageHandler + ?Sized>(handler: &H, body: &[u8], retry: &RetryPolicy) -> Outcome {
    let mut attempts = 1;
    loop {
        let outcome = handler.handle_message(body);
        if !outcome.is_retryable() {
            return outcome;
        }
        match retry.backoff_after(attempts) {
            Some(delay) => {
                warn!(attempt = attempts, delay_ms = delay.as_millis() as u64, ?outcome, "Retrying trigger");
                thread::sleep(delay);
                attempts += 1;
            }
            None => {
                warn!(attempts, ?outcome, "Giving up on trigger; acknowledging without retry");
                return outcome;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Scripted {
        calls: AtomicUsize,
        /// First `fail_first` calls return a retryable failure.
        fail_first: usize,
    }

    impl MessageHandler for Scripted {
        fn handle_message(&self, _body: &[u8]) -> Outcome {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Outcome::LoadFailed
            } else {
                Outcome::CampaignNotFound
            }
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(2),
        }
    }

    #[test]
    fn no_retry_acknowledges_first_failure() {
        let handler = Scripted { calls: AtomicUsize::new(0), fail_first: 5 };
        assert_eq!(process(&handler, b"{}", &RetryPolicy::no_retry()), Outcome::LoadFailed);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retries_until_success_within_budget() {
        let handler = Scripted { calls: AtomicUsize::new(0), fail_first: 2 };
        assert_eq!(process(&handler, b"{}", &fast_retry(3)), Outcome::CampaignNotFound);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retries_stop_at_max_attempts() {
        let handler = Scripted { calls: AtomicUsize::new(0), fail_first: 10 };
        assert_eq!(process(&handler, b"{}", &fast_retry(3)), Outcome::LoadFailed);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn shutdown_drains_queued_messages() {
        let handler = Arc::new(Scripted { calls: AtomicUsize::new(0), fail_first: 0 });
        let consumer = Consumer::start(
            handler.clone(),
            ConsumerConfig { workers: 2, max_in_flight: 64, retry: RetryPolicy::no_retry() },
        )
        .unwrap();

        let intake = consumer.handle();
        for _ in 0..50 {
            intake.submit(b"{}".to_vec()).unwrap();
        }
        consumer.shutdown();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 50);
        assert_eq!(intake.submit(b"{}".to_vec()), Err(SubmitError::Closed));
    }

    #[test]
    fn full_intake_is_refused() {
        struct Blocking(Mutex<()>);
        impl MessageHandler for Blocking {
            fn handle_message(&self, _body: &[u8]) -> Outcome {
                let _held = self.0.lock().unwrap();
                Outcome::Malformed
            }
        }

        let handler = Arc::new(Blocking(Mutex::new(())));
        let gate = handler.0.lock().unwrap();
        let consumer = Consumer::start(
            handler.clone(),
            ConsumerConfig { workers: 1, max_in_flight: 1, retry: RetryPolicy::no_retry() },
        )
        .unwrap();
        let intake = consumer.handle();

        // the worker takes at most one message and blocks on the gate,
        // so at most two submits fit before the intake is full
        let results: Vec<_> = (0..3).map(|_| intake.submit(b"{}".to_vec())).collect();
        assert!(results.contains(&Err(SubmitError::Full)));

        drop(gate);
        consumer.shutdown();
    }
}
