// SeisComP Inventory - Core Library
// Exposes the inventory model and XML codec for the CLI, editors and tests

pub mod error;      // Typed failures (graph + codec)
pub mod temporal;   // Timestamps and validity epochs
pub mod entities;   // Network, Station, Location, Stream, Sensor, Datalogger
pub mod inventory;  // Entity graph, invariants, extension side-table
pub mod codec;      // XML decode/encode, file load/save

// Re-export commonly used types
pub use error::{CodecError, InventoryError};
pub use temporal::{format_time, normalize_datetime, parse_time, Epoch};
pub use entities::{
    Coordinates, Datalogger, Entity, EntityId, EntityKind, Location, Network, Record, Sensor,
    Station, Stream, Violation,
};
pub use inventory::{
    Anchor, ExtensionData, ExtensionTable, Inventory, OpaqueNode, Owner, RawAttribute,
    Violations, Walk,
};
pub use codec::{
    backup_path, decode, encode, load_file, restore_backup, save_file, Document,
    DocumentHeader, Loaded, SchemaVersion,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
