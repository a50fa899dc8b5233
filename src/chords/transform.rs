//! Reading-to-wire record transformation.

use crate::error::{AirqError, Result};
use crate::sensors::record::{AuxFields, FieldValue, SensorRecord};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Reading field names and the wire names they are sent under.
pub const DEFAULT_FIELD_RENAMES: &[(&str, &str)] = &[
    ("time", "at"),
    ("tvoc_ppb", "tvoc"),
    ("tvoc_std", "tvoc_std"),
    ("eco2_ppm", "eco2"),
    ("eco2_std", "eco2_std"),
    ("pres_mb", "pres"),
    ("tdry_degc", "tdry"),
    ("rh", "rh"),
    ("n", "n"),
];

lazy_static! {
    /// The built-in rename table.
    pub static ref DEFAULT_RENAME_TABLE: FieldRenameTable =
        FieldRenameTable::new(DEFAULT_FIELD_RENAMES.iter().copied())
            .expect("DEFAULT_FIELD_RENAMES must be a valid rename table");
}

/// Mapping from reading field name to wire field name.
///
/// Target names are unique; that is checked when the table is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldRenameTable {
    renames: BTreeMap<String, String>,
}

impl FieldRenameTable {
    /// Build a table, rejecting two sources that map to the same wire name.
    pub fn new<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut renames = BTreeMap::new();
        let mut targets = HashSet::new();
        for (from, to) in pairs {
            if from.is_empty() || to.is_empty() {
                return Err(AirqError::config_error("field names in the rename table must not be empty"));
            }
            if !targets.insert(to.to_string()) {
                return Err(AirqError::config_error(format!(
                    "wire field {:?} is the target of more than one reading field",
                    to
                )));
            }
            if renames.insert(from.to_string(), to.to_string()).is_some() {
                return Err(AirqError::config_error(format!(
                    "reading field {:?} appears twice in the rename table",
                    from
                )));
            }
        }
        Ok(Self { renames })
    }

    /// Wire name for a reading field, if it is forwarded at all.
    pub fn target(&self, field: &str) -> Option<&str> {
        self.renames.get(field).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.renames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renames.is_empty()
    }
}

/// API credential pair; both halves are required for either to be sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCredentials {
    pub email: String,
    pub key: String,
}

/// Static per-instrument metadata attached to every record.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryMetadata {
    pub inst_id: String,
    pub test: bool,
    pub skey: Option<String>,
    pub api: Option<ApiCredentials>,
}

/// A record in the portal's wire schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRecord {
    pub vars: BTreeMap<String, FieldValue>,
    pub inst_id: String,
    pub test: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Reshape a reading into a wire record.
///
/// Fields without an entry in `renames` are dropped. `aux` is merged after
/// the renamed fields and wins on collision.
pub fn transform(
    raw: &SensorRecord,
    renames: &FieldRenameTable,
    aux: &AuxFields,
    metadata: &DeliveryMetadata,
) -> WireRecord {
    let mut vars: BTreeMap<String, FieldValue> = raw
        .iter()
        .filter_map(|(name, value)| {
            renames
                .target(name)
                .map(|target| (target.to_string(), value.clone()))
        })
        .collect();

    for (name, value) in aux {
        vars.insert(name.clone(), value.clone());
    }

    let (api_email, api_key) = match &metadata.api {
        Some(api) => (Some(api.email.clone()), Some(api.key.clone())),
        None => (None, None),
    };

    WireRecord {
        vars,
        inst_id: metadata.inst_id.clone(),
        test: metadata.test,
        skey: metadata.skey.clone(),
        api_email,
        api_key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> DeliveryMetadata {
        DeliveryMetadata {
            inst_id: "1".into(),
            test: false,
            skey: None,
            api: None,
        }
    }

    #[test]
    fn test_default_table_is_complete() {
        assert_eq!(DEFAULT_RENAME_TABLE.len(), DEFAULT_FIELD_RENAMES.len());
        assert_eq!(DEFAULT_RENAME_TABLE.target("time"), Some("at"));
        assert_eq!(DEFAULT_RENAME_TABLE.target("tbme_degc"), None);
    }

    #[test]
    fn test_duplicate_source_rejected() {
        let err = FieldRenameTable::new([("rh", "rh"), ("rh", "humidity")]).unwrap_err();
        assert!(err.to_string().contains("appears twice"));
    }

    #[test]
    fn test_unknown_fields_dropped() {
        let raw = SensorRecord::new().with("rh", 40.2).with("tbme_degc", 22.5);
        let wire = transform(&raw, &DEFAULT_RENAME_TABLE, &AuxFields::new(), &metadata());
        assert_eq!(wire.vars.len(), 1);
        assert_eq!(wire.vars.get("rh"), Some(&FieldValue::Float(40.2)));
    }

    #[test]
    fn test_inputs_untouched() {
        let raw = SensorRecord::new().with("tvoc_ppb", 120i64);
        let before = raw.clone();
        let _ = transform(&raw, &DEFAULT_RENAME_TABLE, &AuxFields::new(), &metadata());
        assert_eq!(raw, before);
    }
}
