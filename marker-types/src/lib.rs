//! Tabular types shared by the marker report crates.
#![deny(missing_docs)]

/// Schema errors raised when a table lacks an expected column
pub mod error;

/// Categorical cell identities (cluster assignments)
pub mod idents;

/// Label relabeling
pub mod rename;

/// Column-named string table
pub mod table;

pub use error::SchemaError;
pub use idents::Idents;
pub use rename::RenameMap;
pub use table::Table;
