//! Marker report presets
//!
//! A report is the upstream marker table joined to gene descriptions, with columns reordered,
//! rows sorted, and optionally cut to the top markers of each cluster. The three presets differ
//! in where the markers come from:
//!
//! * `Cluster`: markers of each cluster against all other cells
//! * `Conserved`: markers of each cluster found in every condition
//! * `Pairwise`: markers between two clusters
use crate::annotate::{annotate, GeneDescriptions, JoinMode};
use crate::conserved::{conserve, mean_column};
use crate::order::{reorder, sort_rows, ColumnOrder, SortKey};
use crate::top_n::{top_n_per_group, TiePolicy, TopN, DEFAULT_TOP_N};
use anyhow::{bail, format_err, Context, Error};
use itertools::Itertools;
use log::{debug, info};
use marker_types::{RenameMap, SchemaError, Table};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Column names of the upstream marker and annotation tables
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    /// gene column of the marker tables
    pub gene: String,
    /// cluster column of all-cluster marker tables
    pub cluster: String,
    /// cluster column added to conserved markers
    pub cluster_id: String,
    /// label column added to pairwise markers
    pub comparison: String,
    /// log fold change
    pub log_fc: String,
    /// raw p-value
    pub p_val: String,
    /// adjusted p-value
    pub p_val_adj: String,
    /// fold change averaged over conditions
    pub mean_log_fc: String,
    /// gene column of the annotation table
    pub annotation_gene: String,
    /// description column, in the annotation table and in reports
    pub description: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        ColumnNames {
            gene: "gene".to_owned(),
            cluster: "cluster".to_owned(),
            cluster_id: "cluster_id".to_owned(),
            comparison: "comparison".to_owned(),
            log_fc: "avg_log2FC".to_owned(),
            p_val: "p_val".to_owned(),
            p_val_adj: "p_val_adj".to_owned(),
            mean_log_fc: "avg_fc".to_owned(),
            annotation_gene: "gene_name".to_owned(),
            description: "description".to_owned(),
        }
    }
}

/// Settings shared by all reports. Every field has a default, so a JSON config file only
/// needs the fields it changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// column names of the input tables
    pub columns: ColumnNames,
    /// overrides the preset's join mode
    pub join: Option<JoinMode>,
    /// markers kept per group by [`top_markers`]
    pub top_n: usize,
    /// rows tied with the last top marker
    pub ties: TiePolicy,
    /// output delimiter; by default implied by the output file name
    pub delimiter: Option<char>,
    /// cluster relabeling, e.g. cluster number to cell type; for pairwise reports it applies
    /// to the comparison label
    pub rename: RenameMap,
    /// condition names of conserved markers, in input order
    pub conditions: Vec<String>,
    /// label of a pairwise comparison, written as the first column
    pub comparison: Option<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            columns: ColumnNames::default(),
            join: None,
            top_n: DEFAULT_TOP_N,
            ties: TiePolicy::default(),
            delimiter: None,
            rename: RenameMap::default(),
            conditions: Vec::new(),
            comparison: None,
        }
    }
}

impl ReportConfig {
    /// Load a JSON config file.
    pub fn from_json(path: impl AsRef<Path>) -> Result<ReportConfig, Error> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path).with_context(|| path.display().to_string())?);
        let config = serde_json::from_reader(reader).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// The output delimiter as a byte
    pub fn delimiter_byte(&self) -> Result<Option<u8>, Error> {
        self.delimiter
            .map(|c| {
                if c.is_ascii() {
                    Ok(c as u8)
                } else {
                    Err(format_err!("delimiter '{}' is not an ASCII character", c))
                }
            })
            .transpose()
    }
}

/// Which upstream marker table a report is built from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    /// each cluster against all other cells
    Cluster,
    /// each cluster, tested in every condition
    Conserved,
    /// one cluster against another
    Pairwise,
}

impl ReportKind {
    /// Join mode used unless the config overrides it
    pub fn default_join(self) -> JoinMode {
        match self {
            ReportKind::Cluster | ReportKind::Conserved => JoinMode::Inner,
            ReportKind::Pairwise => JoinMode::Left,
        }
    }

    /// Column the report is grouped by, if the table has one
    fn group_column<'a>(self, cols: &'a ColumnNames, table: &Table) -> Option<&'a str> {
        let col = match self {
            ReportKind::Cluster => &cols.cluster,
            ReportKind::Conserved => &cols.cluster_id,
            ReportKind::Pairwise => &cols.comparison,
        };
        match self {
            ReportKind::Pairwise if !table.has_column(col) => None,
            _ => Some(col.as_str()),
        }
    }

    /// Group and gene columns first, description last
    pub fn column_order(self, cols: &ColumnNames, table: &Table) -> ColumnOrder {
        let mut leading = Vec::new();
        if let Some(group) = self.group_column(cols, table) {
            leading.push(group);
        }
        leading.push(cols.gene.as_str());
        ColumnOrder::new(&leading, &[cols.description.as_str()])
    }

    /// Group ascending, then significance (or fold change for pairwise markers)
    pub fn sort_keys(self, cols: &ColumnNames, table: &Table) -> Vec<SortKey> {
        let mut keys = self
            .group_column(cols, table)
            .map(SortKey::asc)
            .into_iter()
            .collect::<Vec<_>>();
        keys.push(match self {
            ReportKind::Cluster => SortKey::asc(&cols.p_val_adj),
            ReportKind::Conserved => SortKey::asc(crate::conserved::MAX_PVAL),
            ReportKind::Pairwise => SortKey::asc(&cols.log_fc),
        });
        keys
    }

    /// Column the top-N filter ranks by
    pub fn rank_column(self, cols: &ColumnNames) -> &str {
        match self {
            ReportKind::Cluster | ReportKind::Pairwise => &cols.log_fc,
            ReportKind::Conserved => &cols.mean_log_fc,
        }
    }
}

/// Distinct values of `column`, in order of first appearance.
pub fn cluster_labels(table: &Table, column: &str) -> Result<Vec<String>, Error> {
    let col = table.column(column)?;
    Ok(table.values(col).unique().map(str::to_owned).collect())
}

/// Rows whose `column` equals `label`.
pub fn rows_for_label(table: &Table, column: &str, label: &str) -> Result<Table, Error> {
    let col = table.column(column)?;
    Ok(table.filter_rows(|row| row[col] == label))
}

/// Apply `rows` to every label in order and append the results to `out`.
///
/// `out` fixes the header, usually as a table with no rows; every result must share it. A label
/// may produce no rows, and with no labels `out` comes back unchanged.
pub fn concat_by_label<S, F>(mut out: Table, labels: &[S], mut rows: F) -> Result<Table, Error>
where
    S: AsRef<str>,
    F: FnMut(&str) -> Result<Table, Error>,
{
    for label in labels {
        let label = label.as_ref();
        let t = rows(label).with_context(|| format!("label '{label}'"))?;
        debug!("label '{}': {} rows", label, t.len());
        out.append(t)?;
    }
    Ok(out)
}

/// Conserved markers of every cluster.
///
/// `conditions` are (condition name, all-cluster marker table) pairs, each table holding the
/// markers of every cluster found within that condition. Clusters are taken in `labels` order,
/// or in order of first appearance in the first condition. The result carries a
/// `cluster_id` column first.
pub fn conserved_markers(
    conditions: &[(String, Table)],
    labels: Option<&[String]>,
    cols: &ColumnNames,
) -> Result<Table, Error> {
    let Some((_, first)) = conditions.first() else {
        return Err(format_err!("no conditions given"));
    };
    let labels = match labels {
        Some(l) => l.to_vec(),
        None => cluster_labels(first, &cols.cluster)?,
    };
    info!(
        "conserved markers of {} clusters across {} conditions",
        labels.len(),
        conditions.len()
    );
    let no_rows = conditions
        .iter()
        .map(|(name, t)| (name.as_str(), t.filter_rows(|_| false)))
        .collect::<Vec<_>>();
    let empty = conserve_cluster(&no_rows, "", cols)?;

    concat_by_label(empty, &labels, |label| {
        let per_condition = conditions
            .iter()
            .map(|(name, t)| Ok::<_, Error>((name.as_str(), rows_for_label(t, &cols.cluster, label)?)))
            .collect::<Result<Vec<_>, Error>>()?;
        conserve_cluster(&per_condition, label, cols)
    })
}

fn conserve_cluster(per_condition: &[(&str, Table)], label: &str, cols: &ColumnNames) -> Result<Table, Error> {
    let refs = per_condition.iter().map(|(n, t)| (*n, t)).collect::<Vec<_>>();
    let mut t = conserve(&refs, &cols.gene, Some(cols.cluster.as_str()), &cols.p_val)?;
    t.insert_constant_column(0, &cols.cluster_id, label)?;
    Ok(t)
}

/// Conserved markers read back from one table per cluster, as `FindConservedMarkers` writes
/// them: genes as row names, per-condition statistics, `max_pval` and `minimump_p_val`.
///
/// Each table gets its gene column named and a `cluster_id` column in front; clusters are
/// concatenated in the given order.
pub fn conserved_from_clusters(clusters: &[(String, Table)], cols: &ColumnNames) -> Result<Table, Error> {
    let mut by_label = HashMap::with_capacity(clusters.len());
    for (label, table) in clusters {
        let mut t = table.clone();
        t.name_index_column(&cols.gene)?;
        t.insert_constant_column(0, &cols.cluster_id, label)?;
        if by_label.insert(label.as_str(), t).is_some() {
            bail!("cluster '{}' is given more than once", label);
        }
    }
    let labels = clusters.iter().map(|(label, _)| label.as_str()).collect::<Vec<_>>();
    let empty = match labels.first().and_then(|l| by_label.get(l)) {
        Some(first) => first.with_rows(Vec::new())?,
        None => bail!("no per-cluster conserved marker tables given"),
    };
    info!("conserved markers of {} clusters", labels.len());

    concat_by_label(empty, &labels, |label| {
        by_label
            .remove(label)
            .ok_or_else(|| format_err!("no table for cluster '{}'", label))
    })
}

/// Build the full report: relabel clusters, annotate, reorder columns, sort rows.
pub fn build_report(
    kind: ReportKind,
    markers: &Table,
    descriptions: &GeneDescriptions,
    config: &ReportConfig,
) -> Result<Table, Error> {
    let cols = &config.columns;
    let mut table = markers.clone();

    match kind {
        ReportKind::Cluster | ReportKind::Conserved => {
            if !config.rename.is_empty() {
                let group = kind.group_column(cols, &table).unwrap_or(&cols.cluster);
                table.rename_values(group, &config.rename)?;
            }
        }
        ReportKind::Pairwise => {
            if table.name_index_column(&cols.gene)? {
                debug!("named the row-name column '{}'", cols.gene);
            }
            if let Some(comparison) = &config.comparison {
                table.insert_constant_column(0, &cols.comparison, comparison)?;
            }
            if !config.rename.is_empty() {
                if !table.has_column(&cols.comparison) {
                    bail!(
                        "renaming a pairwise report needs a '{}' label to rename",
                        cols.comparison
                    );
                }
                table.rename_values(&cols.comparison, &config.rename)?;
            }
        }
    }

    if kind == ReportKind::Conserved && !table.has_column(&cols.mean_log_fc) {
        let suffix = format!("_{}", cols.log_fc);
        let fold_changes = table
            .header()
            .iter()
            .filter(|c| c.ends_with(&suffix))
            .map(String::as_str)
            .collect::<Vec<_>>();
        if fold_changes.is_empty() {
            return Err(SchemaError::MissingColumn {
                table: table.name().to_owned(),
                column: format!("*{suffix}"),
            }
            .into());
        }
        table = mean_column(&table, &fold_changes, &cols.mean_log_fc)?;
    }

    let join = config.join.unwrap_or(kind.default_join());
    let annotated = annotate(&table, descriptions, &cols.gene, &cols.description, join)?.distinct();
    let ordered = reorder(&annotated, &kind.column_order(cols, &annotated))?;
    let sorted = sort_rows(&ordered, &kind.sort_keys(cols, &ordered))?;
    info!("{:?} report: {} of {} markers", kind, sorted.len(), markers.len());
    Ok(sorted)
}

/// The top `config.top_n` markers of each group of a built report, ranked by fold change.
pub fn top_markers(kind: ReportKind, report: &Table, config: &ReportConfig) -> Result<Table, Error> {
    let cols = &config.columns;
    let mut top = TopN::new(config.top_n, kind.rank_column(cols)).ties(config.ties);
    if let Some(group) = kind.group_column(cols, report) {
        top = top.group_by(group);
    }
    top_n_per_group(report, &top)
}
