use crate::table::Table;
use anyhow::{bail, Error};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lookup table from an old label to a new one, e.g. cluster number to cell type.
///
/// Labels without an entry map to themselves.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenameMap(BTreeMap<String, String>);

impl RenameMap {
    /// empty map
    pub fn new() -> RenameMap {
        RenameMap::default()
    }

    /// Build a map from (old, new) pairs. A later pair for the same old label wins.
    pub fn from_pairs<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> RenameMap {
        RenameMap(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Read the map from two columns of a table. Conflicting entries for one old label are an error.
    pub fn from_table(table: &Table, from: &str, to: &str) -> Result<RenameMap, Error> {
        let from_col = table.column(from)?;
        let to_col = table.column(to)?;
        let mut map = BTreeMap::new();
        for row in table.rows() {
            let (old, new) = (&row[from_col], &row[to_col]);
            if let Some(prev) = map.insert(old.clone(), new.clone()) {
                if &prev != new {
                    bail!("label '{}' is renamed to both '{}' and '{}'", old, prev, new);
                }
            }
        }
        Ok(RenameMap(map))
    }

    /// Add or replace one entry
    pub fn insert(&mut self, old: impl Into<String>, new: impl Into<String>) {
        self.0.insert(old.into(), new.into());
    }

    /// The new label for `old`, if it is renamed.
    pub fn get(&self, old: &str) -> Option<&str> {
        self.0.get(old).map(String::as_str)
    }

    /// The label `old` maps to, itself if not renamed.
    pub fn apply<'a>(&'a self, old: &'a str) -> &'a str {
        self.get(old).unwrap_or(old)
    }

    /// number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// true if nothing is renamed
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
