//! Wireless signal strength from `/proc/net/wireless`.

use crate::sensors::record::{AuxFields, FieldValue};
use crate::sensors::traits::SignalProbe;
use std::fs;
use std::path::PathBuf;

const PROC_NET_WIRELESS: &str = "/proc/net/wireless";

/// Reports `sig_dbm` for one wireless interface.
#[derive(Debug, Clone)]
pub struct WirelessProbe {
    interface: String,
    source: PathBuf,
}

impl WirelessProbe {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            source: PathBuf::from(PROC_NET_WIRELESS),
        }
    }

    /// Read from an alternate file instead of `/proc/net/wireless`.
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = source.into();
        self
    }
}

impl SignalProbe for WirelessProbe {
    fn probe(&mut self) -> Option<AuxFields> {
        let table = fs::read_to_string(&self.source).ok()?;
        let level = parse_signal_level(&table, &self.interface)?;

        let mut aux = AuxFields::new();
        aux.insert("sig_dbm".to_string(), FieldValue::Int(level));
        Some(aux)
    }
}

/// Extract the signal level (dBm) for `interface` from the
/// `/proc/net/wireless` table.
///
/// ```text
/// Inter-| sta-|   Quality        |   Discarded packets               | Missed | WE
///  face | tus | link level noise |  nwid  crypt   frag  retry   misc | beacon | 22
///  wlan0: 0000   70.  -40.  -256        0      0      0      0      0        0
/// ```
pub fn parse_signal_level(table: &str, interface: &str) -> Option<i64> {
    table.lines().skip(2).find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        if name.trim() != interface {
            return None;
        }
        // status, link, level
        let level = rest.split_whitespace().nth(2)?;
        let level = level.trim_end_matches('.').parse::<f64>().ok()?;
        // Drivers reporting in unsigned 8-bit form use 256 - |dBm|
        let dbm = if level > 0.0 { level - 256.0 } else { level };
        Some(dbm.round() as i64)
    })
}
