use anyhow::Error;
use marker_types::table::parse_number;
use marker_types::{SchemaError, Table};
use noisy_float::types::{n64, N64};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Output column layout: `leading` columns first, in the given order, then every column
/// not named in either list in its original order, then `trailing` columns.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnOrder {
    /// columns placed first
    pub leading: Vec<String>,
    /// columns placed last
    pub trailing: Vec<String>,
}

impl ColumnOrder {
    /// Order from column names
    pub fn new(leading: &[&str], trailing: &[&str]) -> Self {
        ColumnOrder {
            leading: leading.iter().map(|s| s.to_string()).collect(),
            trailing: trailing.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Rearrange columns per `order`. Rows keep their content and their order.
pub fn reorder(table: &Table, order: &ColumnOrder) -> Result<Table, Error> {
    let mut seen = HashSet::new();
    let mut named = |names: &[String]| -> Result<Vec<usize>, Error> {
        let mut cols = Vec::with_capacity(names.len());
        for name in names {
            let col = table.column(name)?;
            if !seen.insert(col) {
                return Err(SchemaError::DuplicateColumn {
                    table: table.name().to_owned(),
                    column: name.clone(),
                }
                .into());
            }
            cols.push(col);
        }
        Ok(cols)
    };
    let leading = named(&order.leading)?;
    let trailing = named(&order.trailing)?;

    let mut permutation = leading;
    permutation.extend((0..table.header().len()).filter(|c| !seen.contains(c)));
    permutation.extend(trailing);
    table.permute_columns(&permutation)
}

/// One sort criterion
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    /// column to compare
    pub column: String,
    /// largest first; missing values stay last either way
    #[serde(default)]
    pub descending: bool,
}

impl SortKey {
    /// Ascending sort on `column`
    pub fn asc(column: &str) -> Self {
        SortKey {
            column: column.to_owned(),
            descending: false,
        }
    }

    /// Descending sort on `column`
    pub fn desc(column: &str) -> Self {
        SortKey {
            column: column.to_owned(),
            descending: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SortValue<'a> {
    Number(N64),
    Text(&'a str),
    Missing,
}

/// Parse a whole column as numbers; missing values are `None`, anything else unparsable is an error.
pub fn numeric_column(table: &Table, col: usize) -> Result<Vec<Option<N64>>, Error> {
    (0..table.len())
        .map(|row| table.number(row, col).map(|v| v.map(n64)))
        .collect()
}

/// Each cell sorts as a number when it parses as one, as text otherwise, and missing values
/// go last. Numbers come before text, so cluster labels `3` and `10` compare as numbers even
/// when some clusters are already renamed to `B cells`.
fn sort_values(table: &Table, col: usize) -> Vec<SortValue<'_>> {
    table
        .values(col)
        .map(|v| match parse_number(v) {
            Ok(Some(x)) => SortValue::Number(n64(x)),
            Ok(None) => SortValue::Missing,
            Err(_) => SortValue::Text(v),
        })
        .collect()
}

fn compare(a: &SortValue, b: &SortValue, descending: bool) -> Ordering {
    match (a, b) {
        (SortValue::Missing, SortValue::Missing) => Ordering::Equal,
        (SortValue::Missing, _) => Ordering::Greater,
        (_, SortValue::Missing) => Ordering::Less,
        _ if descending => b.cmp(a),
        _ => a.cmp(b),
    }
}

/// Stable sort of rows by `keys`, compared left to right. Rows with equal keys keep
/// their input order.
pub fn sort_rows(table: &Table, keys: &[SortKey]) -> Result<Table, Error> {
    let columns = keys
        .iter()
        .map(|k| Ok::<_, Error>((sort_values(table, table.column(&k.column)?), k.descending)))
        .collect::<Result<Vec<_>, Error>>()?;

    let mut order = (0..table.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| {
        columns
            .iter()
            .map(|(values, descending)| compare(&values[a], &values[b], *descending))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });

    let rows = order.into_iter().map(|i| table.rows()[i].clone()).collect();
    table.with_rows(rows)
}
