//! Sensor sources and link probes.
//!
//! This module wraps the air-quality sensor cluster and the wireless
//! inspector behind the [`ReadingSource`] and [`SignalProbe`] traits used by
//! the collection loop.

pub mod airq;
pub mod record;
pub mod traits;
pub mod wireless;

// Re-export commonly used items
pub use airq::AirqDevice;
pub use record::{AuxFields, FieldValue, SensorRecord};
pub use traits::{NoSignal, ReadingSource, SignalProbe};
pub use wireless::WirelessProbe;
