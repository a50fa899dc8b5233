//! Reliable delivery of submissions to the remote portal.
//!
//! Production (one submission per collection cycle) is decoupled from
//! delivery (slow, unreliable) by a worker task that owns the backlog. The
//! collection loop only ever calls [`DeliveryQueue::enqueue`], which never
//! waits. The worker retries failed submissions with a doubling backoff until
//! they are delivered or their fixed deadline passes.

pub mod queue;
pub mod submission;

// Re-export commonly used items
pub use queue::{DeliveryQueue, QueueStatus};
pub use submission::{RetryPolicy, Submission};
