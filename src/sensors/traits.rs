//! Traits at the sensor seam.

use crate::error::Result;
use crate::sensors::record::{AuxFields, SensorRecord};

/// Something that produces one reading on demand.
///
/// Reads are synchronous and expected to be fast; the collection loop calls
/// `reading` once per cycle and never retries a failed read within the cycle.
pub trait ReadingSource: Send {
    /// Take one reading. The returned record must not carry a `time` field;
    /// timestamps are attached by the caller.
    fn reading(&mut self) -> Result<SensorRecord>;
}

/// Something that may produce auxiliary link metrics.
pub trait SignalProbe: Send {
    /// Probe the link. `None` means nothing to report (e.g. not associated),
    /// which is not an error.
    fn probe(&mut self) -> Option<AuxFields>;
}

impl<T: ReadingSource + ?Sized> ReadingSource for Box<T> {
    fn reading(&mut self) -> Result<SensorRecord> {
        (**self).reading()
    }
}

impl<T: SignalProbe + ?Sized> SignalProbe for Box<T> {
    fn probe(&mut self) -> Option<AuxFields> {
        (**self).probe()
    }
}

/// Probe that never reports anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSignal;

impl SignalProbe for NoSignal {
    fn probe(&mut self) -> Option<AuxFields> {
        None
    }
}
