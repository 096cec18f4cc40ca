//! Gene annotation join
//!
use anyhow::Error;
use log::{info, warn};
use marker_types::Table;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What happens to markers whose gene has no description
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinMode {
    /// drop the marker
    #[default]
    Inner,
    /// keep the marker with an empty description
    Left,
}

impl std::str::FromStr for JoinMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inner" => Ok(JoinMode::Inner),
            "left" => Ok(JoinMode::Left),
            _ => Err(anyhow::format_err!("unknown join mode '{}', expected inner or left", s)),
        }
    }
}

/// Gene identifier to description, unique by identifier.
///
/// Annotation tables often list a gene several times (one row per transcript or per
/// alternative description); joining on those directly would duplicate marker rows.
/// This map keeps the first description seen for each gene.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeneDescriptions {
    map: HashMap<String, String>,
}

impl GeneDescriptions {
    /// Deduplicate (gene, description) pairs; the first pair for a gene wins.
    pub fn from_pairs<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        let mut map = HashMap::new();
        for (gene, description) in pairs {
            map.entry(gene.into()).or_insert_with(|| description.into());
        }
        GeneDescriptions { map }
    }

    /// Take the `gene` and `description` columns of an annotation table.
    pub fn from_table(table: &Table, gene: &str, description: &str) -> Result<Self, Error> {
        let gene_col = table.column(gene)?;
        let desc_col = table.column(description)?;
        let mut map: HashMap<String, String> = HashMap::with_capacity(table.len());
        let mut conflicting = 0;
        for row in table.rows() {
            match map.get(&row[gene_col]) {
                Some(prev) => {
                    if prev != &row[desc_col] {
                        conflicting += 1;
                    }
                }
                None => {
                    map.insert(row[gene_col].clone(), row[desc_col].clone());
                }
            }
        }
        if conflicting > 0 {
            warn!(
                "{} annotation rows repeat a gene with a different description; kept the first",
                conflicting
            );
        }
        info!("{} genes with descriptions out of {} annotation rows", map.len(), table.len());
        Ok(GeneDescriptions { map })
    }

    /// Description of `gene`, if any
    pub fn get(&self, gene: &str) -> Option<&str> {
        self.map.get(gene).map(String::as_str)
    }

    /// number of genes
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// true if there are no genes
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Attach a description to every marker row through its `gene` column.
///
/// The description goes in `description_column`, appended last; if the markers already have
/// that column its values are replaced, so annotating twice gives the same table as once.
/// Row order is preserved. A left join keeps every row, an inner join drops rows whose gene
/// has no description.
pub fn annotate(
    markers: &Table,
    descriptions: &GeneDescriptions,
    gene: &str,
    description_column: &str,
    mode: JoinMode,
) -> Result<Table, Error> {
    let gene_col = markers.column(gene)?;
    let existing = markers.header().iter().position(|c| c == description_column);

    let mut header = markers.header().to_vec();
    if existing.is_none() {
        header.push(description_column.to_owned());
    }

    let mut rows = Vec::with_capacity(markers.len());
    let mut unmatched = 0usize;
    for row in markers.rows() {
        let desc = match (descriptions.get(&row[gene_col]), mode) {
            (Some(d), _) => d,
            (None, JoinMode::Left) => {
                unmatched += 1;
                ""
            }
            (None, JoinMode::Inner) => {
                unmatched += 1;
                continue;
            }
        };
        let mut out = row.clone();
        match existing {
            Some(col) => out[col] = desc.to_owned(),
            None => out.push(desc.to_owned()),
        }
        rows.push(out);
    }

    if unmatched > 0 {
        match mode {
            JoinMode::Inner => info!("dropped {} markers without a description", unmatched),
            JoinMode::Left => info!("{} markers have no description", unmatched),
        }
    }

    Table::new(markers.name(), header, rows)
}

#[cfg(test)]
mod test {
    use super::*;

    fn markers() -> Table {
        let s = |v: &[&str]| v.iter().map(|x| x.to_string()).collect::<Vec<_>>();
        Table::new(
            "markers",
            s(&["gene", "cluster", "avg_log2FC"]),
            vec![
                s(&["g1", "0", "2.0"]),
                s(&["g2", "0", "1.0"]),
                s(&["g4", "1", "0.5"]),
                s(&["g1", "1", "3.0"]),
            ],
        )
        .unwrap()
    }

    fn descriptions() -> GeneDescriptions {
        GeneDescriptions::from_pairs([("g1", "desc1"), ("g2", "desc2"), ("g1", "other desc1")])
    }

    #[test]
    fn test_duplicate_genes_do_not_fan_out() {
        let d = descriptions();
        assert_eq!(d.len(), 2);
        assert_eq!(d.get("g1"), Some("desc1"));

        let out = annotate(&markers(), &d, "gene", "description", JoinMode::Inner).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.header().last().unwrap(), "description");
        assert_eq!(out.rows()[2], vec!["g1", "1", "3.0", "desc1"]);
    }

    #[test]
    fn test_left_join_keeps_every_row() {
        let m = markers();
        let out = annotate(&m, &descriptions(), "gene", "description", JoinMode::Left).unwrap();
        assert_eq!(out.len(), m.len());
        assert_eq!(out.rows()[2], vec!["g4", "1", "0.5", ""]);
    }

    #[test]
    fn test_inner_join_never_grows() {
        let m = markers();
        let empty = GeneDescriptions::default();
        let out = annotate(&m, &empty, "gene", "description", JoinMode::Inner).unwrap();
        assert!(out.is_empty());
        assert_eq!(out.header().len(), 4);
    }

    #[test]
    fn test_annotating_twice_is_idempotent() {
        let d = descriptions();
        for mode in [JoinMode::Inner, JoinMode::Left] {
            let once = annotate(&markers(), &d, "gene", "description", mode).unwrap();
            let twice = annotate(&once, &d, "gene", "description", mode).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_missing_key_is_schema_error() {
        let err = annotate(&markers(), &descriptions(), "gene_name", "description", JoinMode::Inner).unwrap_err();
        assert!(err.downcast_ref::<marker_types::SchemaError>().is_some());

        let annotations = Table::new("annotations", vec!["gene_id".into()], vec![]).unwrap();
        assert!(GeneDescriptions::from_table(&annotations, "gene_name", "description").is_err());
    }

    #[test]
    fn test_from_table_keeps_first_description() {
        let s = |v: &[&str]| v.iter().map(|x| x.to_string()).collect::<Vec<_>>();
        let annotations = Table::new(
            "annotations",
            s(&["gene_id", "gene_name", "description"]),
            vec![
                s(&["ENSG00000170458", "CD14", "CD14 molecule"]),
                s(&["ENSG00000170458", "CD14", "CD14 molecule"]),
                s(&["ENSG00000284733", "OR4F29", "olfactory receptor family 4"]),
                s(&["ENSG00000284662", "OR4F29", "olfactory receptor 4F29"]),
            ],
        )
        .unwrap();
        let d = GeneDescriptions::from_table(&annotations, "gene_name", "description").unwrap();
        assert_eq!(d.len(), 2);
        assert_eq!(d.get("OR4F29"), Some("olfactory receptor family 4"));
    }
}
