use std::fmt::Display;

/// A table does not have the shape an operation requires.
///
/// These are always fatal: callers propagate them through `anyhow::Error` and no partial
/// report is written. Use `err.downcast_ref::<SchemaError>()` to tell them apart from I/O errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A named column is absent from a table
    MissingColumn {
        /// table name, as given when the table was read or built
        table: String,
        /// the column that was asked for
        column: String,
    },
    /// A column name appears twice in a header or a column order
    DuplicateColumn {
        /// table name
        table: String,
        /// the repeated column
        column: String,
    },
    /// Two tables that are concatenated row-wise have different headers
    HeaderMismatch {
        /// header of the accumulated table
        expected: Vec<String>,
        /// header of the table being appended
        found: Vec<String>,
    },
    /// A row does not have as many cells as the header has columns
    RaggedRow {
        /// table name
        table: String,
        /// zero-based row index
        row: usize,
        /// number of header columns
        expected: usize,
        /// number of cells in the row
        found: usize,
    },
}

impl SchemaError {
    pub(crate) fn missing(table: &str, column: &str) -> Self {
        SchemaError::MissingColumn {
            table: table.to_owned(),
            column: column.to_owned(),
        }
    }

    pub(crate) fn duplicate(table: &str, column: &str) -> Self {
        SchemaError::DuplicateColumn {
            table: table.to_owned(),
            column: column.to_owned(),
        }
    }
}

impl std::error::Error for SchemaError {}

impl Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaError::MissingColumn { table, column } => {
                write!(f, "column '{column}' not found in table '{table}'")
            }
            SchemaError::DuplicateColumn { table, column } => {
                write!(f, "column '{column}' appears more than once in '{table}'")
            }
            SchemaError::HeaderMismatch { expected, found } => write!(
                f,
                "cannot concatenate tables with different headers: [{}] vs [{}]",
                expected.join(", "),
                found.join(", ")
            ),
            SchemaError::RaggedRow {
                table,
                row,
                expected,
                found,
            } => write!(
                f,
                "row {row} of '{table}' has {found} fields, header has {expected}"
            ),
        }
    }
}
