//! The fixed-interval collection loop.
//!
//! Every cycle waits for the next report tick, takes one reading, stamps it,
//! merges the wireless probe, reshapes it into a wire record, builds the
//! submission address and hands it to the delivery queue. The loop never
//! waits for delivery and never retries a failed read; a failed cycle is
//! logged and skipped. Ticks are spaced by the report interval from the
//! start of the previous cycle, so a slow sensor read shortens the wait that
//! follows it instead of stretching the cadence.

use crate::chords::{build_uri, transform, DeliveryMetadata, FieldRenameTable, WireRecord};
use crate::config::Config;
use crate::delivery::DeliveryQueue;
use crate::error::{AirqError, Result};
use crate::sensors::{AuxFields, ReadingSource, SensorRecord, SignalProbe};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{self, Instant};
use tokio_stream::StreamExt;
use tracing::{error, warn};
use url::Url;
use uuid::Uuid;

/// Field the loop stamps on every reading.
pub const TIME_FIELD: &str = "time";

/// Format a UTC instant as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// What one cycle produced.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// Record built and handed to the delivery queue
    Enqueued {
        id: Uuid,
        uri: Url,
        record: WireRecord,
    },
    /// Record built but delivery is disabled in the configuration
    Collected { uri: Url, record: WireRecord },
    /// Cycle abandoned; nothing was enqueued
    Skipped { reason: String },
}

impl CycleOutcome {
    /// The submission address, when one was built.
    pub fn uri(&self) -> Option<&Url> {
        match self {
            CycleOutcome::Enqueued { uri, .. } | CycleOutcome::Collected { uri, .. } => Some(uri),
            CycleOutcome::Skipped { .. } => None,
        }
    }
}

/// Periodic read → transform → enqueue driver.
pub struct CollectionLoop<S, P> {
    source: Arc<Mutex<S>>,
    probe: P,
    renames: FieldRenameTable,
    metadata: DeliveryMetadata,
    host: String,
    interval: Duration,
    expiry: Duration,
    enabled: bool,
    queue: DeliveryQueue,
}

impl<S, P> CollectionLoop<S, P>
where
    S: ReadingSource + 'static,
    P: SignalProbe + 'static,
{
    /// Create a loop from validated configuration.
    pub fn new(config: &Config, source: S, probe: P, queue: DeliveryQueue) -> Result<Self> {
        Ok(Self {
            source: Arc::new(Mutex::new(source)),
            probe,
            renames: config.rename_table()?,
            metadata: config.metadata(),
            host: config.chords.host.clone(),
            interval: config.report_interval(),
            expiry: config.expiry(),
            enabled: config.chords.enabled,
            queue,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one cycle (everything except the interval sleep).
    pub fn cycle(&mut self) -> CycleOutcome {
        let reading = read_source(&self.source);
        self.complete(reading)
    }

    /// Turn a reading (or the failure to take one) into a cycle outcome.
    fn complete(&mut self, reading: Result<SensorRecord>) -> CycleOutcome {
        let built = reading.and_then(|reading| self.collect(reading, Utc::now()));
        let (uri, record) = match built {
            Ok(built) => built,
            Err(err) => {
                warn!(error = %err, "collection cycle skipped");
                return CycleOutcome::Skipped {
                    reason: err.to_string(),
                };
            }
        };

        if !self.enabled {
            return CycleOutcome::Collected { uri, record };
        }

        match self.queue.enqueue(uri.clone(), self.expiry) {
            Ok(id) => CycleOutcome::Enqueued { id, uri, record },
            Err(err) => {
                error!(error = %err, "cannot hand submission to delivery queue");
                CycleOutcome::Skipped {
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Stamp, probe, transform and address one reading.
    fn collect(&mut self, mut reading: SensorRecord, now: DateTime<Utc>) -> Result<(Url, WireRecord)> {
        reading.insert(TIME_FIELD, timestamp(now));

        let aux = self.probe.probe().unwrap_or_else(AuxFields::new);

        let record = transform(&reading, &self.renames, &aux, &self.metadata);
        let uri = build_uri(&self.host, &record)?;
        Ok((uri, record))
    }

    /// Cycles as a stream: one item per report tick, the first one interval
    /// after the stream starts.
    pub fn start_stream(self) -> BoxStream<'static, CycleOutcome> {
        let first_tick = next_tick(Instant::now(), self.interval);
        let stream = stream::unfold((self, first_tick), |(mut this, tick)| async move {
            time::sleep_until(tick).await;
            let reading = read_blocking(Arc::clone(&this.source)).await;
            let outcome = this.complete(reading);
            let following = next_tick(tick, this.interval).max(Instant::now());
            Some((outcome, (this, following)))
        });
        Box::pin(stream)
    }

    /// Run forever, printing each submission address.
    pub async fn run(self) {
        let mut cycles = self.start_stream();
        while let Some(outcome) = cycles.next().await {
            if let Some(uri) = outcome.uri() {
                println!("{}", uri);
            }
        }
    }
}

/// Take a reading on the blocking pool; gas sampling sleeps between samples.
async fn read_blocking<S: ReadingSource + 'static>(source: Arc<Mutex<S>>) -> Result<SensorRecord> {
    tokio::task::spawn_blocking(move || read_source(&source))
        .await
        .map_err(|e| AirqError::sensor_error(format!("sensor read task failed: {}", e)))?
}

fn read_source<S: ReadingSource>(source: &Mutex<S>) -> Result<SensorRecord> {
    let mut source = source
        .lock()
        .map_err(|_| AirqError::sensor_error("sensor source lock poisoned"))?;
    source.reading()
}

fn next_tick(from: Instant, interval: Duration) -> Instant {
    from.checked_add(interval).unwrap_or(from)
}
