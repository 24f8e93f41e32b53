// BIN Catalog - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod audit;
pub mod coercion;         // Rule value coercion (BOOL / NUMBER / TEXT)
pub mod commands;         // Engine inputs / JSON request bodies
pub mod config;
pub mod db;               // SQLite store adapter
pub mod engine;           // One operation per verb
pub mod entities;
pub mod error;
pub mod identity;
pub mod invariants;       // Cross-entity consistency checks
pub mod key_derivation;   // Effective BIN keys
pub mod plan_items;       // Plan item admission
pub mod status;           // A/I status guard
pub mod store;            // Repository ports + MemoryStore

// Re-export commonly used types
pub use audit::{Audit, Event};
pub use config::{init_logging, CatalogConfig};
pub use db::{in_transaction, open_database, register_id_type, setup_database, SqliteStore};
pub use engine::{CatalogEngine, EngineSettings};
pub use entities::{
    Agency, Bin, CommercePlan, DataType, PlanItem, RuleValue, Subtype, SubtypePlanLink,
    Validation, ValidationMap, ValidationMode,
};
pub use error::{CatalogError, CatalogResult, ErrorKind};
pub use plan_items::{BulkAddSummary, ItemFormat};
pub use status::Status;
pub use store::{CatalogStore, MemoryStore, Page};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Owner identification types seeded by `bin-catalog init`
pub const DEFAULT_ID_TYPES: [(&str, &str); 4] = [
    ("CC", "Cedula de ciudadania"),
    ("CE", "Cedula de extranjeria"),
    ("NIT", "Numero de identificacion tributaria"),
    ("PA", "Pasaporte"),
];
