use crate::error::SchemaError;
use crate::rename::RenameMap;
use anyhow::{format_err, Error};
use std::collections::HashSet;

/// Cell values that stand for a missing number.
pub const MISSING_VALUES: [&str; 4] = ["", "NA", "NaN", "nan"];

/// A named table of string cells with a header row.
///
/// Cells are kept exactly as read so that columns specific to the upstream
/// differential-expression tool pass through a report untouched. Numeric
/// columns are parsed on demand with [`Table::number`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Table {
    name: String,
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table, checking that column names are unique and every row matches the header width.
    pub fn new(name: impl Into<String>, header: Vec<String>, rows: Vec<Vec<String>>) -> Result<Table, Error> {
        let name = name.into();
        let mut seen = HashSet::with_capacity(header.len());
        for column in &header {
            if !seen.insert(column.as_str()) {
                return Err(SchemaError::duplicate(&name, column).into());
            }
        }
        for (row, cells) in rows.iter().enumerate() {
            if cells.len() != header.len() {
                return Err(SchemaError::RaggedRow {
                    table: name,
                    row,
                    expected: header.len(),
                    found: cells.len(),
                }
                .into());
            }
        }
        Ok(Table { name, header, rows })
    }

    /// A table with the given header and no rows.
    pub fn empty(name: impl Into<String>, header: Vec<String>) -> Result<Table, Error> {
        Table::new(name, header, Vec::new())
    }

    /// Table name used in error messages
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the table
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Column names, in order
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// All rows, in order
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Consume the table and return its rows
    pub fn into_rows(self) -> Vec<Vec<String>> {
        self.rows
    }

    /// number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// true if there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Does the header contain `column`?
    pub fn has_column(&self, column: &str) -> bool {
        self.header.iter().any(|c| c == column)
    }

    /// Position of `column` in the header, or a [`SchemaError::MissingColumn`].
    pub fn column(&self, column: &str) -> Result<usize, Error> {
        self.header
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| SchemaError::missing(&self.name, column).into())
    }

    /// The cell at (`row`, `col`).
    pub fn cell(&self, row: usize, col: usize) -> &str {
        &self.rows[row][col]
    }

    /// All cells of the column at position `col`.
    pub fn values(&self, col: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows.iter().map(move |r| r[col].as_str())
    }

    /// Parse the cell at (`row`, `col`) as a number. Missing values (`NA`, empty, `NaN`) are `None`.
    pub fn number(&self, row: usize, col: usize) -> Result<Option<f64>, Error> {
        parse_number(&self.rows[row][col]).map_err(|_| {
            format_err!(
                "column '{}' of '{}', row {}: '{}' is not a number",
                self.header[col],
                self.name,
                row,
                self.rows[row][col]
            )
        })
    }

    /// A table with the same name and header holding `rows`.
    pub fn with_rows(&self, rows: Vec<Vec<String>>) -> Result<Table, Error> {
        Table::new(self.name.clone(), self.header.clone(), rows)
    }

    /// Append one row
    pub fn push_row(&mut self, row: Vec<String>) -> Result<(), Error> {
        if row.len() != self.header.len() {
            return Err(SchemaError::RaggedRow {
                table: self.name.clone(),
                row: self.rows.len(),
                expected: self.header.len(),
                found: row.len(),
            }
            .into());
        }
        self.rows.push(row);
        Ok(())
    }

    /// Append all rows of `other`. Both tables must have identical headers.
    pub fn append(&mut self, other: Table) -> Result<(), Error> {
        if self.header != other.header {
            return Err(SchemaError::HeaderMismatch {
                expected: self.header.clone(),
                found: other.header,
            }
            .into());
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    /// Keep the rows for which `keep` returns true, preserving order.
    pub fn filter_rows(&self, mut keep: impl FnMut(&[String]) -> bool) -> Table {
        Table {
            name: self.name.clone(),
            header: self.header.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Drop rows that exactly repeat an earlier row.
    pub fn distinct(self) -> Table {
        let mut seen = HashSet::with_capacity(self.rows.len());
        let mut rows = Vec::with_capacity(self.rows.len());
        for row in self.rows {
            if seen.insert(row.clone()) {
                rows.push(row);
            }
        }
        Table {
            name: self.name,
            header: self.header,
            rows,
        }
    }

    /// Rename a column in the header.
    pub fn rename_column(&mut self, old: &str, new: &str) -> Result<(), Error> {
        let col = self.column(old)?;
        if old != new && self.has_column(new) {
            return Err(SchemaError::duplicate(&self.name, new).into());
        }
        self.header[col] = new.to_owned();
        Ok(())
    }

    /// Give a name to an unnamed leading column.
    ///
    /// Tables written with row names (genes, for pairwise markers) have an empty first
    /// header cell. Returns true if the column was renamed.
    pub fn name_index_column(&mut self, name: &str) -> Result<bool, Error> {
        if !self.header.first().is_some_and(|c| c.is_empty()) {
            return Ok(false);
        }
        if self.has_column(name) {
            return Err(SchemaError::duplicate(&self.name, name).into());
        }
        self.header[0] = name.to_owned();
        Ok(true)
    }

    /// Replace every value of `column` through `map`. Values absent from the map are kept.
    pub fn rename_values(&mut self, column: &str, map: &RenameMap) -> Result<(), Error> {
        let col = self.column(column)?;
        for row in &mut self.rows {
            if let Some(new) = map.get(&row[col]) {
                row[col] = new.to_owned();
            }
        }
        Ok(())
    }

    /// Insert a column at position `at` with one value per row.
    pub fn insert_column(&mut self, at: usize, column: &str, values: Vec<String>) -> Result<(), Error> {
        if self.has_column(column) {
            return Err(SchemaError::duplicate(&self.name, column).into());
        }
        if values.len() != self.rows.len() {
            return Err(format_err!(
                "column '{}' has {} values but '{}' has {} rows",
                column,
                values.len(),
                self.name,
                self.rows.len()
            ));
        }
        let at = at.min(self.header.len());
        self.header.insert(at, column.to_owned());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.insert(at, value);
        }
        Ok(())
    }

    /// Insert a column holding the same value on every row.
    pub fn insert_constant_column(&mut self, at: usize, column: &str, value: &str) -> Result<(), Error> {
        let values = vec![value.to_owned(); self.rows.len()];
        self.insert_column(at, column, values)
    }

    /// Remove a column, returning its values.
    pub fn remove_column(&mut self, column: &str) -> Result<Vec<String>, Error> {
        let col = self.column(column)?;
        self.header.remove(col);
        Ok(self.rows.iter_mut().map(|r| r.remove(col)).collect())
    }

    /// Rearrange columns: position `i` of the result is column `order[i]` of `self`.
    ///
    /// `order` must be a permutation of `0..self.header().len()`.
    pub fn permute_columns(&self, order: &[usize]) -> Result<Table, Error> {
        let mut sorted = order.to_vec();
        sorted.sort_unstable();
        if sorted != (0..self.header.len()).collect::<Vec<_>>() {
            return Err(format_err!(
                "column order {:?} is not a permutation of the {} columns of '{}'",
                order,
                self.header.len(),
                self.name
            ));
        }
        let header = order.iter().map(|&i| self.header[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|r| order.iter().map(|&i| r[i].clone()).collect())
            .collect();
        Ok(Table {
            name: self.name.clone(),
            header,
            rows,
        })
    }
}

/// Parse a numeric cell. Missing markers give `Ok(None)`.
pub fn parse_number(value: &str) -> Result<Option<f64>, std::num::ParseFloatError> {
    let value = value.trim();
    if MISSING_VALUES.contains(&value) {
        return Ok(None);
    }
    let v = value.parse::<f64>()?;
    Ok(if v.is_nan() { None } else { Some(v) })
}

#[cfg(test)]
mod test {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn sample() -> Table {
        Table::new(
            "markers",
            strings(&["gene", "cluster", "avg_log2FC"]),
            vec![
                strings(&["g1", "0", "2.0"]),
                strings(&["g2", "0", "NA"]),
                strings(&["g1", "0", "2.0"]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_bad_shapes() {
        let err = Table::new("t", strings(&["a", "a"]), vec![]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SchemaError>(),
            Some(SchemaError::DuplicateColumn { .. })
        ));

        let err = Table::new("t", strings(&["a", "b"]), vec![strings(&["1"])]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SchemaError>(),
            Some(SchemaError::RaggedRow { row: 0, expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn test_column_lookup() {
        let t = sample();
        assert_eq!(t.column("cluster").unwrap(), 1);
        let err = t.column("p_val_adj").unwrap_err();
        assert_eq!(
            err.downcast_ref::<SchemaError>(),
            Some(&SchemaError::MissingColumn {
                table: "markers".to_owned(),
                column: "p_val_adj".to_owned()
            })
        );
    }

    #[test]
    fn test_number_parsing() {
        let t = sample();
        assert_eq!(t.number(0, 2).unwrap(), Some(2.0));
        assert_eq!(t.number(1, 2).unwrap(), None);
        assert!(t.number(0, 0).is_err());
        assert_eq!(parse_number("1.5e-10").unwrap(), Some(1.5e-10));
        assert_eq!(parse_number(" NaN ").unwrap(), None);
    }

    #[test]
    fn test_distinct_keeps_first() {
        let t = sample().distinct();
        assert_eq!(t.len(), 2);
        assert_eq!(t.cell(0, 0), "g1");
        assert_eq!(t.cell(1, 0), "g2");
    }

    #[test]
    fn test_name_index_column() {
        let mut t = Table::new("pairwise", strings(&["", "p_val"]), vec![strings(&["CD14", "0.01"])]).unwrap();
        assert!(t.name_index_column("gene").unwrap());
        assert_eq!(t.header(), &strings(&["gene", "p_val"])[..]);
        assert!(!t.name_index_column("gene").unwrap());
    }

    #[test]
    fn test_rename_values() {
        let mut t = sample();
        let map = RenameMap::from_pairs([("0", "CD14+ monocytes")]);
        t.rename_values("cluster", &map).unwrap();
        assert!(t.values(1).all(|v| v == "CD14+ monocytes"));
    }

    #[test]
    fn test_insert_and_remove_column() {
        let mut t = sample();
        t.insert_constant_column(0, "cluster_id", "3").unwrap();
        assert_eq!(t.header()[0], "cluster_id");
        assert_eq!(t.rows()[2], strings(&["3", "g1", "0", "2.0"]));
        assert!(t.insert_constant_column(0, "gene", "x").is_err());

        let removed = t.remove_column("cluster").unwrap();
        assert_eq!(removed, strings(&["0", "0", "0"]));
        assert_eq!(t.header(), &strings(&["cluster_id", "gene", "avg_log2FC"])[..]);
    }

    #[test]
    fn test_permute_columns() {
        let t = sample();
        let p = t.permute_columns(&[1, 0, 2]).unwrap();
        assert_eq!(p.header(), &strings(&["cluster", "gene", "avg_log2FC"])[..]);
        assert_eq!(p.rows()[1], strings(&["0", "g2", "NA"]));
        assert!(t.permute_columns(&[0, 0, 2]).is_err());
        assert!(t.permute_columns(&[0, 1]).is_err());
    }

    #[test]
    fn test_append_requires_same_header() {
        let mut a = sample();
        let b = sample();
        a.append(b).unwrap();
        assert_eq!(a.len(), 6);

        let c = Table::empty("other", strings(&["gene"])).unwrap();
        let err = a.append(c).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SchemaError>(),
            Some(SchemaError::HeaderMismatch { .. })
        ));
    }
}
