//! # marker-report: marker gene reports for single-cell clusters
//!
//! Takes the marker tables of an upstream differential-expression run and turns them into
//! reports: genes joined to their descriptions, columns in a fixed order, rows sorted by cluster
//! and significance, and optionally cut to the top markers of each cluster.

#![deny(missing_docs)]

/// join markers to gene descriptions
pub mod annotate;
/// conserved-marker merge across conditions
pub mod conserved;
/// combined p-values
pub mod dist;
/// reading and writing delimited tables
pub mod io;
/// column order and row sorting
pub mod order;
/// report presets and configuration
pub mod report;
/// top-N rows per group
pub mod top_n;

pub use crate::annotate::{annotate, GeneDescriptions, JoinMode};
pub use crate::order::{reorder, sort_rows, ColumnOrder, SortKey};
pub use crate::report::{build_report, concat_by_label, top_markers, ColumnNames, ReportConfig, ReportKind};
pub use crate::top_n::{top_n_per_group, RankDirection, TiePolicy, TopN};
pub use marker_types::{Idents, RenameMap, SchemaError, Table};
