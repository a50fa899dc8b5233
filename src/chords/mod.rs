//! CHORDS wire schema, address encoding and transport.

pub mod transform;
pub mod transport;
pub mod uri;

// Re-export commonly used items
pub use transform::{
    transform, ApiCredentials, DeliveryMetadata, FieldRenameTable, WireRecord,
    DEFAULT_FIELD_RENAMES, DEFAULT_RENAME_TABLE,
};
pub use transport::{HttpTransport, Transport};
pub use uri::build_uri;
