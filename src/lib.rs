//! # airq_chords - Air-Quality Readings to CHORDS
//!
//! Periodically samples an air-quality sensor cluster (CCS811 gas, BME280
//! pressure/humidity, TMP117 temperature) plus the local wireless signal,
//! reshapes each reading into the CHORDS wire schema and forwards it through
//! a background delivery queue that retries until the portal accepts the
//! record or the record's deadline passes.
//!
//! ## Features
//!
//! - **Fixed-interval collection**: read, stamp, transform, enqueue
//! - **Lossy field mapping**: only fields named in the rename table are sent
//! - **Reliable delivery**: at-least-once with doubling backoff and fixed expiry
//! - **Fair retries**: a stuck submission never starves fresh ones
//! - **Status endpoint**: optional HTTP view of the delivery counters
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use airq_chords::{
//!     AirqDevice, CollectionLoop, Config, DeliveryQueue, HttpTransport, WirelessProbe,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::builtin()?;
//!     let transport = Arc::new(HttpTransport::new()?);
//!     let (queue, _worker) = DeliveryQueue::spawn(transport, config.retry_policy());
//!
//!     let device = AirqDevice::new(&config.airq);
//!     let probe = WirelessProbe::new(config.airq.wireless_interface.clone());
//!     CollectionLoop::new(&config, device, probe, queue)?.run().await;
//!     Ok(())
//! }
//! ```

pub mod chords;
pub mod collection;
pub mod config;
pub mod delivery;
pub mod error;
pub mod sensors;
pub mod web;

// Re-export public API
pub use chords::{
    build_uri, transform, DeliveryMetadata, FieldRenameTable, HttpTransport, Transport,
    WireRecord,
};
pub use collection::{timestamp, CollectionLoop, CycleOutcome};
pub use config::Config;
pub use delivery::{DeliveryQueue, QueueStatus, RetryPolicy, Submission};
pub use error::{AirqError, Result};
pub use sensors::{
    AirqDevice, AuxFields, FieldValue, ReadingSource, SensorRecord, SignalProbe, WirelessProbe,
};

pub use web::{start_status_server, StatusConfig};

/// The default collection interval in seconds
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 60;

/// How long an undelivered submission is kept, in minutes (ten days)
pub const DEFAULT_EXPIRY_MINUTES: u64 = 10 * 24 * 60;

/// The default status server port
pub const DEFAULT_STATUS_PORT: u16 = 9102;
