//! Conserved markers: one cluster tested separately in each condition
//!
use crate::dist::{max_pvalue, minimump_pvalue};
use crate::order::numeric_column;
use anyhow::{bail, Error};
use log::info;
use marker_types::Table;
use std::collections::HashMap;

/// Largest per-condition p-value, appended by [`conserve`]
pub static MAX_PVAL: &str = "max_pval";
/// Wilkinson minimum-p combination, appended by [`conserve`]
pub static MINIMUMP_PVAL: &str = "minimump_p_val";
/// written for a missing number
pub static MISSING: &str = "NA";

fn format_value(v: Option<f64>) -> String {
    v.map_or_else(|| MISSING.to_owned(), |v| v.to_string())
}

/// Merge per-condition marker tables of one cluster into one conserved-marker table.
///
/// Keeps genes present in every condition, in the order of the first condition. Every column
/// except `gene` (and `cluster`, when given, which is dropped) is prefixed with its condition
/// name: `ctrl_p_val`, `stim_avg_log2FC`, ... Then `max_pval` and `minimump_p_val` combine the
/// per-condition `p_val` columns.
pub fn conserve(
    conditions: &[(&str, &Table)],
    gene: &str,
    cluster: Option<&str>,
    p_val: &str,
) -> Result<Table, Error> {
    if conditions.is_empty() {
        bail!("at least one condition is needed to find conserved markers");
    }

    struct Condition<'a> {
        table: &'a Table,
        rows_by_gene: HashMap<&'a str, usize>,
        stat_cols: Vec<usize>,
        pvalues: Vec<Option<f64>>,
    }

    let mut header = vec![gene.to_owned()];
    let mut parsed = Vec::with_capacity(conditions.len());
    for &(name, table) in conditions {
        let gene_col = table.column(gene)?;
        let cluster_col = cluster.map(|c| table.column(c)).transpose()?;
        let p_col = table.column(p_val)?;
        let pvalues = numeric_column(table, p_col)?
            .into_iter()
            .map(|p| p.map(|p| p.raw()))
            .collect();

        let mut rows_by_gene = HashMap::with_capacity(table.len());
        for (row, g) in table.values(gene_col).enumerate() {
            rows_by_gene.entry(g).or_insert(row);
        }
        let stat_cols = (0..table.header().len())
            .filter(|&c| c != gene_col && Some(c) != cluster_col)
            .collect::<Vec<_>>();
        header.extend(stat_cols.iter().map(|&c| format!("{}_{}", name, table.header()[c])));
        parsed.push(Condition {
            table,
            rows_by_gene,
            stat_cols,
            pvalues,
        });
    }
    header.push(MAX_PVAL.to_owned());
    header.push(MINIMUMP_PVAL.to_owned());

    let first = &parsed[0];
    let first_gene_col = first.table.column(gene)?;
    let mut rows = Vec::new();
    let mut dropped = 0;
    for (row, g) in first.table.values(first_gene_col).enumerate() {
        if first.rows_by_gene[g] != row {
            // repeated gene in the first condition
            continue;
        }
        let Some(matched) = parsed
            .iter()
            .map(|c| c.rows_by_gene.get(g).copied())
            .collect::<Option<Vec<usize>>>()
        else {
            dropped += 1;
            continue;
        };

        let mut out = vec![g.to_owned()];
        let mut pvalues = Vec::with_capacity(parsed.len());
        for (c, &r) in parsed.iter().zip(&matched) {
            out.extend(c.stat_cols.iter().map(|&col| c.table.cell(r, col).to_owned()));
            pvalues.push(c.pvalues[r]);
        }
        out.push(format_value(max_pvalue(&pvalues)));
        out.push(format_value(minimump_pvalue(&pvalues)));
        rows.push(out);
    }

    if dropped > 0 {
        info!("{} genes are not tested in every condition", dropped);
    }
    Table::new(first.table.name(), header, rows)
}

/// Append column `name` holding the row-wise mean of the numeric `columns`.
/// A missing value in any of them makes the mean missing.
pub fn mean_column(table: &Table, columns: &[&str], name: &str) -> Result<Table, Error> {
    if columns.is_empty() {
        bail!("no columns to average for '{}'", name);
    }
    let values = columns
        .iter()
        .map(|c| numeric_column(table, table.column(c)?))
        .collect::<Result<Vec<_>, Error>>()?;
    let means = (0..table.len())
        .map(|row| {
            let sum = values.iter().map(|v| v[row].map(|x| x.raw())).sum::<Option<f64>>();
            format_value(sum.map(|s| s / columns.len() as f64))
        })
        .collect();
    let mut out = table.clone();
    out.insert_column(table.header().len(), name, means)?;
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    fn condition(rows: &[[&str; 5]]) -> Table {
        Table::new(
            "markers",
            s(&["p_val", "avg_log2FC", "p_val_adj", "cluster", "gene"]),
            rows.iter().map(|r| s(r)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_conserve_two_conditions() {
        let ctrl = condition(&[
            ["0.01", "1.5", "0.1", "3", "CD14"],
            ["0.2", "0.5", "1", "3", "LYZ"],
            ["1e-4", "2.0", "0.001", "3", "S100A8"],
        ]);
        let stim = condition(&[["0.05", "2.5", "0.5", "3", "S100A8"], ["0.001", "0.5", "0.01", "3", "CD14"]]);
        let out = conserve(&[("ctrl", &ctrl), ("stim", &stim)], "gene", Some("cluster"), "p_val").unwrap();
        assert_eq!(
            out.header(),
            &s(&[
                "gene",
                "ctrl_p_val",
                "ctrl_avg_log2FC",
                "ctrl_p_val_adj",
                "stim_p_val",
                "stim_avg_log2FC",
                "stim_p_val_adj",
                "max_pval",
                "minimump_p_val"
            ])[..]
        );
        // LYZ is only tested in ctrl
        assert_eq!(out.len(), 2);
        assert_eq!(out.cell(0, 0), "CD14");
        assert_eq!(out.cell(0, 4), "0.001");
        assert_eq!(out.number(0, 7).unwrap(), Some(0.01));
        assert_relative_eq!(out.number(0, 8).unwrap().unwrap(), 1.0 - 0.999f64.powi(2), epsilon = 1e-12);
        assert_eq!(out.cell(1, 0), "S100A8");
        assert_eq!(out.number(1, 7).unwrap(), Some(0.05));
    }

    #[test]
    fn test_conserve_requires_pvalues() {
        let t = Table::new("markers", s(&["gene", "avg_log2FC"]), vec![]).unwrap();
        assert!(conserve(&[("ctrl", &t)], "gene", None, "p_val").is_err());
        assert!(conserve(&[], "gene", None, "p_val").is_err());
    }

    #[test]
    fn test_mean_column() {
        let t = Table::new(
            "conserved",
            s(&["gene", "ctrl_avg_log2FC", "stim_avg_log2FC"]),
            vec![s(&["CD14", "1.0", "2.0"]), s(&["LYZ", "NA", "2.0"])],
        )
        .unwrap();
        let out = mean_column(&t, &["ctrl_avg_log2FC", "stim_avg_log2FC"], "avg_fc").unwrap();
        assert_eq!(out.header().last().unwrap(), "avg_fc");
        assert_eq!(out.cell(0, 3), "1.5");
        assert_eq!(out.cell(1, 3), "NA");
        assert!(mean_column(&t, &["ctrl_avg_logFC"], "avg_fc").is_err());
        assert!(mean_column(&t, &[], "avg_fc").is_err());
    }
}
