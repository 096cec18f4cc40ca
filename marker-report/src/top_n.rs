use crate::order::numeric_column;
use anyhow::{format_err, Error};
use itertools::Itertools;
use log::debug;
use marker_types::Table;
use noisy_float::types::N64;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Default number of markers kept per cluster
pub const DEFAULT_TOP_N: usize = 5;

/// Rows tied with the N-th ranked row
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TiePolicy {
    /// keep all of them, so a group may return more than N rows
    #[default]
    Keep,
    /// keep exactly N rows; among ties the earlier input row wins
    Strict,
}

impl std::str::FromStr for TiePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep" => Ok(TiePolicy::Keep),
            "strict" => Ok(TiePolicy::Strict),
            _ => Err(format_err!("unknown tie policy '{}', expected keep or strict", s)),
        }
    }
}

/// Which end of the ranking column is "top"
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankDirection {
    /// largest values first, e.g. fold change
    #[default]
    Largest,
    /// smallest values first, e.g. p-values
    Smallest,
}

/// Keep the `n` best rows by column `by` within each `group_by` group (the whole table when
/// `group_by` is None).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopN {
    /// rows kept per group
    pub n: usize,
    /// ranking column
    pub by: String,
    /// grouping column
    pub group_by: Option<String>,
    /// rows tied with the last kept row
    #[serde(default)]
    pub ties: TiePolicy,
    /// which end of the ranking is kept
    #[serde(default)]
    pub direction: RankDirection,
}

impl TopN {
    /// Keep the `n` largest values of `by` over the whole table, keeping ties.
    pub fn new(n: usize, by: &str) -> Self {
        TopN {
            n,
            by: by.to_owned(),
            group_by: None,
            ties: TiePolicy::default(),
            direction: RankDirection::default(),
        }
    }

    /// Rank within each value of `column` instead of over the whole table
    pub fn group_by(mut self, column: &str) -> Self {
        self.group_by = Some(column.to_owned());
        self
    }

    /// Set the tie policy
    pub fn ties(mut self, ties: TiePolicy) -> Self {
        self.ties = ties;
        self
    }

    /// Set which end of the ranking is kept
    pub fn direction(mut self, direction: RankDirection) -> Self {
        self.direction = direction;
        self
    }

    fn rank(&self, a: Option<N64>, b: Option<N64>) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => match self.direction {
                RankDirection::Largest => b.cmp(&a),
                RankDirection::Smallest => a.cmp(&b),
            },
        }
    }

    /// How many of the ranked rows to keep
    fn cutoff(&self, ranked: &[Option<N64>]) -> usize {
        if self.n == 0 {
            return 0;
        }
        if self.n >= ranked.len() {
            return ranked.len();
        }
        match self.ties {
            TiePolicy::Strict => self.n,
            TiePolicy::Keep => {
                let boundary = ranked[self.n - 1];
                let mut take = self.n;
                // a missing value never ties
                while boundary.is_some() && take < ranked.len() && ranked[take] == boundary {
                    take += 1;
                }
                take
            }
        }
    }
}

/// Row indices of each group, groups ordered by first appearance.
fn groups(table: &Table, col: Option<usize>) -> Vec<Vec<usize>> {
    let Some(col) = col else {
        return vec![(0..table.len()).collect()];
    };
    let labels = table.values(col).unique().collect::<Vec<_>>();
    let position = labels
        .iter()
        .enumerate()
        .map(|(i, &l)| (l, i))
        .collect::<HashMap<_, _>>();
    let mut groups = vec![Vec::new(); labels.len()];
    for (row, label) in table.values(col).enumerate() {
        groups[position[label]].push(row);
    }
    groups
}

/// Top-N filter applied to each group independently.
///
/// Groups come out in order of first appearance, each sorted by rank (stable, missing values
/// last). A group smaller than N is returned whole; N = 0 returns no rows.
pub fn top_n_per_group(table: &Table, top: &TopN) -> Result<Table, Error> {
    let rank_col = table.column(&top.by)?;
    let group_col = top.group_by.as_deref().map(|g| table.column(g)).transpose()?;
    let keys = numeric_column(table, rank_col)?;

    let groups = groups(table, group_col);
    debug!("top {} of {} groups by '{}'", top.n, groups.len(), top.by);

    let mut rows = Vec::new();
    for mut members in groups {
        members.sort_by(|&a, &b| top.rank(keys[a], keys[b]));
        let ranked = members.iter().map(|&i| keys[i]).collect::<Vec<_>>();
        let take = top.cutoff(&ranked);
        rows.extend(members[..take].iter().map(|&i| table.rows()[i].clone()));
    }
    table.with_rows(rows)
}

#[cfg(test)]
mod test {
    use super::*;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    fn markers() -> Table {
        Table::new(
            "markers",
            s(&["cluster", "gene", "avg_log2FC"]),
            vec![
                s(&["0", "a", "1.0"]),
                s(&["1", "b", "4.0"]),
                s(&["0", "c", "3.0"]),
                s(&["0", "d", "1.0"]),
                s(&["1", "e", "NA"]),
                s(&["0", "f", "2.0"]),
                s(&["1", "g", "5.0"]),
            ],
        )
        .unwrap()
    }

    fn genes(t: &Table) -> Vec<&str> {
        t.values(1).collect()
    }

    #[test]
    fn test_top_two_per_cluster() {
        let top = TopN::new(2, "avg_log2FC").group_by("cluster");
        let out = top_n_per_group(&markers(), &top).unwrap();
        assert_eq!(genes(&out), vec!["c", "f", "g", "b"]);
    }

    #[test]
    fn test_ties_at_boundary() {
        let top = TopN::new(3, "avg_log2FC").group_by("cluster");
        let out = top_n_per_group(&markers(), &top).unwrap();
        assert_eq!(genes(&out), vec!["c", "f", "a", "d", "g", "b", "e"]);

        let out = top_n_per_group(&markers(), &top.ties(TiePolicy::Strict)).unwrap();
        assert_eq!(genes(&out), vec!["c", "f", "a", "g", "b", "e"]);
    }

    #[test]
    fn test_n_zero_and_n_large() {
        let t = markers();
        let none = top_n_per_group(&t, &TopN::new(0, "avg_log2FC").group_by("cluster")).unwrap();
        assert!(none.is_empty());
        assert_eq!(none.header(), t.header());

        let all = top_n_per_group(&t, &TopN::new(10, "avg_log2FC").group_by("cluster")).unwrap();
        assert_eq!(all.len(), t.len());
        let mut before = genes(&t);
        let mut after = genes(&all);
        before.sort_unstable();
        after.sort_unstable();
        assert_eq!(before, after);
    }

    #[test]
    fn test_rank_key_monotone_within_groups() {
        let t = markers();
        for direction in [RankDirection::Largest, RankDirection::Smallest] {
            let top = TopN::new(3, "avg_log2FC").group_by("cluster").direction(direction);
            let out = top_n_per_group(&t, &top).unwrap();
            let keys = numeric_column(&out, 2).unwrap();
            for w in (0..out.len()).collect::<Vec<_>>().windows(2) {
                let (a, b) = (w[0], w[1]);
                if out.cell(a, 0) != out.cell(b, 0) {
                    continue;
                }
                if let (Some(x), Some(y)) = (keys[a], keys[b]) {
                    match direction {
                        RankDirection::Largest => assert!(x >= y),
                        RankDirection::Smallest => assert!(x <= y),
                    }
                }
            }
        }
    }

    #[test]
    fn test_smallest_without_groups() {
        let top = TopN::new(2, "avg_log2FC").direction(RankDirection::Smallest);
        let out = top_n_per_group(&markers(), &top).unwrap();
        assert_eq!(genes(&out), vec!["a", "d"]);
    }

    #[test]
    fn test_missing_columns() {
        assert!(top_n_per_group(&markers(), &TopN::new(1, "avg_logFC")).is_err());
        assert!(top_n_per_group(&markers(), &TopN::new(1, "avg_log2FC").group_by("cluster_id")).is_err());
        assert!(top_n_per_group(&markers(), &TopN::new(1, "gene")).is_err());
    }

    #[test]
    fn test_parse_tie_policy() {
        assert_eq!("strict".parse::<TiePolicy>().unwrap(), TiePolicy::Strict);
        assert!("all".parse::<TiePolicy>().is_err());
    }
}
