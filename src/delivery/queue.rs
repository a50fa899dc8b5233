//! Background delivery worker and its handle.

use crate::chords::Transport;
use crate::delivery::submission::{saturating_deadline, RetryPolicy, Submission};
use crate::error::{AirqError, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Snapshot of the worker's counters and backlog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Submissions accepted by `enqueue`
    pub enqueued: u64,
    /// Submissions the endpoint accepted
    pub delivered: u64,
    /// Delivery attempts made, including retries
    pub attempts: u64,
    /// Attempts that failed
    pub failed_attempts: u64,
    /// Submissions dropped because their deadline passed
    pub expired: u64,
    /// Submissions dropped because the backlog was full
    pub overflowed: u64,
    /// Submissions not yet attempted
    pub pending_fresh: usize,
    /// Submissions waiting for a retry
    pub pending_retry: usize,
    /// Age of the oldest pending submission in seconds
    pub oldest_pending_secs: Option<u64>,
    /// A delivery attempt is running right now
    #[serde(default)]
    pub in_flight: bool,
}

impl QueueStatus {
    pub fn pending(&self) -> usize {
        self.pending_fresh + self.pending_retry
    }
}

#[derive(Debug)]
enum QueueCommand {
    Enqueue(Submission),
    Status {
        respond_to: oneshot::Sender<QueueStatus>,
    },
    Shutdown {
        respond_to: oneshot::Sender<QueueStatus>,
    },
}

/// Handle to the delivery worker.
///
/// Cloning the handle is cheap; all clones feed the same worker. The worker
/// owns the backlog and is the only party that touches it.
#[derive(Clone)]
pub struct DeliveryQueue {
    tx: mpsc::UnboundedSender<QueueCommand>,
}

impl DeliveryQueue {
    /// Start a worker delivering through `transport`.
    ///
    /// The join handle resolves to the final status once the worker stops,
    /// either on [`DeliveryQueue::shutdown`] or when every handle is dropped.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        policy: RetryPolicy,
    ) -> (Self, JoinHandle<QueueStatus>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker::new(transport, policy);
        let handle = tokio::spawn(worker.run(rx));
        (Self { tx }, handle)
    }

    /// Hand a submission address to the worker. Never waits on delivery.
    pub fn enqueue(&self, uri: Url, expiry: Duration) -> Result<Uuid> {
        let submission = Submission::new(uri, expiry);
        let id = submission.id();
        self.tx
            .send(QueueCommand::Enqueue(submission))
            .map_err(|_| AirqError::QueueClosed)?;
        Ok(id)
    }

    /// Current counters. Answered even while an attempt is running.
    pub async fn status(&self) -> Result<QueueStatus> {
        let (respond_to, rx) = oneshot::channel();
        self.tx
            .send(QueueCommand::Status { respond_to })
            .map_err(|_| AirqError::QueueClosed)?;
        rx.await.map_err(|_| AirqError::QueueClosed)
    }

    /// Stop the worker after its in-flight attempt. Pending submissions are
    /// abandoned and reported in the returned status.
    pub async fn shutdown(&self) -> Result<QueueStatus> {
        let (respond_to, rx) = oneshot::channel();
        self.tx
            .send(QueueCommand::Shutdown { respond_to })
            .map_err(|_| AirqError::QueueClosed)?;
        rx.await.map_err(|_| AirqError::QueueClosed)
    }
}

/// Why the worker has to stop.
enum Halt {
    Requested(oneshot::Sender<QueueStatus>),
    Disconnected,
}

impl Halt {
    fn into_reply(self) -> Option<oneshot::Sender<QueueStatus>> {
        match self {
            Halt::Requested(respond_to) => Some(respond_to),
            Halt::Disconnected => None,
        }
    }
}

/// A submission plus its retry bookkeeping.
struct Pending {
    submission: Submission,
    failures: u32,
    next_attempt: Instant,
}

struct Worker {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    fresh: VecDeque<Submission>,
    retry: VecDeque<Pending>,
    counters: QueueStatus,
    retry_turn: bool,
    in_flight: bool,
}

impl Worker {
    fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            fresh: VecDeque::new(),
            retry: VecDeque::new(),
            counters: QueueStatus::default(),
            retry_turn: false,
            in_flight: false,
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<QueueCommand>) -> QueueStatus {
        debug!("delivery worker started");
        loop {
            // Absorb everything already queued before choosing work.
            loop {
                match rx.try_recv() {
                    Ok(command) => {
                        if let Some(respond_to) = self.handle(command) {
                            return self.stop(Some(respond_to));
                        }
                    }
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => return self.stop(None),
                }
            }

            let now = Instant::now();
            self.expire(now);

            if let Some(job) = self.next_job(now) {
                if let Some(halt) = self.attempt(job, &mut rx).await {
                    return self.stop(halt.into_reply());
                }
                continue;
            }

            let wake = self.next_retry_at();
            tokio::select! {
                command = rx.recv() => match command {
                    Some(command) => {
                        if let Some(respond_to) = self.handle(command) {
                            return self.stop(Some(respond_to));
                        }
                    }
                    None => return self.stop(None),
                },
                _ = sleep_until_opt(wake) => {}
            }
        }
    }

    /// Apply one command. Returns the reply channel when asked to stop.
    fn handle(&mut self, command: QueueCommand) -> Option<oneshot::Sender<QueueStatus>> {
        match command {
            QueueCommand::Enqueue(submission) => {
                debug!(id = %submission.id(), "submission enqueued");
                self.counters.enqueued += 1;
                self.fresh.push_back(submission);
                self.enforce_capacity();
                None
            }
            QueueCommand::Status { respond_to } => {
                let _ = respond_to.send(self.status(Instant::now()));
                None
            }
            QueueCommand::Shutdown { respond_to } => Some(respond_to),
        }
    }

    fn stop(self, respond_to: Option<oneshot::Sender<QueueStatus>>) -> QueueStatus {
        let status = self.status(Instant::now());
        if status.pending() > 0 {
            warn!(
                pending = status.pending(),
                "delivery worker stopping; abandoning undelivered submissions"
            );
        } else {
            info!("delivery worker stopped");
        }
        if let Some(respond_to) = respond_to {
            let _ = respond_to.send(status.clone());
        }
        status
    }

    /// Drop the oldest pending submissions while the backlog is over capacity.
    fn enforce_capacity(&mut self) {
        while self.fresh.len() + self.retry.len() > self.policy.max_backlog {
            let oldest_retry = self.retry.front().map(|p| p.submission.enqueued_at());
            let oldest_fresh = self.fresh.front().map(Submission::enqueued_at);
            let dropped = match (oldest_retry, oldest_fresh) {
                (Some(r), Some(f)) if r <= f => self.retry.pop_front().map(|p| p.submission),
                (Some(_), None) => self.retry.pop_front().map(|p| p.submission),
                _ => self.fresh.pop_front(),
            };
            match dropped {
                Some(submission) => {
                    self.counters.overflowed += 1;
                    warn!(id = %submission.id(), max_backlog = self.policy.max_backlog, "backlog full; dropping oldest submission");
                }
                None => break,
            }
        }
    }

    /// Drop everything whose deadline has passed.
    fn expire(&mut self, now: Instant) {
        let mut expired = 0u64;
        self.fresh.retain(|s| {
            let keep = !s.is_expired(now);
            if !keep {
                warn!(id = %s.id(), "submission expired before first attempt; dropping");
                expired += 1;
            }
            keep
        });
        self.retry.retain(|p| {
            let keep = !p.submission.is_expired(now);
            if !keep {
                warn!(id = %p.submission.id(), failures = p.failures, "submission expired; dropping");
                expired += 1;
            }
            keep
        });
        self.counters.expired += expired;
    }

    /// Pick the next attempt.
    ///
    /// Fresh submissions go oldest first. When a retry is also due, the two
    /// kinds alternate so a stuck submission cannot crowd out new ones.
    fn next_job(&mut self, now: Instant) -> Option<Pending> {
        let due = self
            .retry
            .iter()
            .enumerate()
            .filter(|(_, p)| p.next_attempt <= now)
            .min_by_key(|(_, p)| p.next_attempt)
            .map(|(idx, _)| idx);

        let take_retry = match (self.fresh.is_empty(), due) {
            (true, None) => return None,
            (true, Some(_)) => true,
            (false, None) => false,
            (false, Some(_)) => self.retry_turn,
        };

        if take_retry {
            self.retry_turn = false;
            due.and_then(|idx| self.retry.remove(idx))
        } else {
            self.retry_turn = true;
            self.fresh.pop_front().map(|submission| Pending {
                submission,
                failures: 0,
                next_attempt: now,
            })
        }
    }

    fn next_retry_at(&self) -> Option<Instant> {
        self.retry.iter().map(|p| p.next_attempt).min()
    }

    /// Make one delivery attempt, serving commands until it settles.
    ///
    /// A stop request or a closed channel is held until the attempt finishes
    /// and then returned to the caller.
    async fn attempt(
        &mut self,
        job: Pending,
        rx: &mut mpsc::UnboundedReceiver<QueueCommand>,
    ) -> Option<Halt> {
        self.counters.attempts += 1;
        self.in_flight = true;
        let transport = Arc::clone(&self.transport);
        let uri = job.submission.uri().clone();
        let request = time::timeout(self.policy.request_timeout, transport.submit(&uri));
        tokio::pin!(request);

        let mut halt = None;
        let outcome = loop {
            tokio::select! {
                result = &mut request => break result,
                command = rx.recv(), if halt.is_none() => match command {
                    Some(command) => {
                        if let Some(respond_to) = self.handle(command) {
                            halt = Some(Halt::Requested(respond_to));
                        }
                    }
                    None => halt = Some(Halt::Disconnected),
                },
            }
        };
        self.in_flight = false;

        let outcome = outcome.unwrap_or_else(|_| {
            Err(AirqError::transport_error(format!(
                "no response within {:?}",
                self.policy.request_timeout
            )))
        });
        self.settle(job, outcome);
        halt
    }

    /// Record the result of an attempt and schedule a retry if one is due.
    fn settle(&mut self, mut job: Pending, outcome: Result<()>) {
        match outcome {
            Ok(()) => {
                self.counters.delivered += 1;
                if job.failures > 0 {
                    info!(id = %job.submission.id(), failures = job.failures, "submission delivered after retry");
                } else {
                    debug!(id = %job.submission.id(), "submission delivered");
                }
            }
            Err(err) => {
                self.counters.failed_attempts += 1;
                job.failures += 1;

                let now = Instant::now();
                if job.submission.is_expired(now) {
                    self.counters.expired += 1;
                    warn!(id = %job.submission.id(), failures = job.failures, error = %err, "submission expired; dropping");
                    return;
                }

                let delay = self.policy.backoff(job.failures);
                job.next_attempt = saturating_deadline(now, delay);
                warn!(id = %job.submission.id(), failures = job.failures, retry_in = ?delay, error = %err, "delivery failed; will retry");
                self.retry.push_back(job);
            }
        }
    }

    fn status(&self, now: Instant) -> QueueStatus {
        let oldest = self
            .fresh
            .iter()
            .map(Submission::enqueued_at)
            .chain(self.retry.iter().map(|p| p.submission.enqueued_at()))
            .min();

        QueueStatus {
            pending_fresh: self.fresh.len(),
            pending_retry: self.retry.len(),
            oldest_pending_secs: oldest.map(|t| now.saturating_duration_since(t).as_secs()),
            in_flight: self.in_flight,
            ..self.counters.clone()
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
