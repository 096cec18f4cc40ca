use crate::rename::RenameMap;
use anyhow::{format_err, Error};
use itertools::Itertools;
use std::collections::{BTreeSet, HashMap};

/// Cluster identity of every cell.
///
/// Cells with label `labels[i]` are `indices[offsets[i]..offsets[i + 1]]` (the last label runs
/// to the end of `indices`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Idents {
    /// distinct identities
    pub labels: Vec<String>,
    /// start of each label's cells in `indices`
    pub offsets: Vec<usize>,
    /// cell indices grouped by label
    pub indices: Vec<usize>,
}

impl Idents {
    /// Group a per-cell label vector. Labels are ordered by first appearance.
    pub fn from_assignments<S: AsRef<str>>(assignments: &[S]) -> Idents {
        let labels = assignments
            .iter()
            .map(|s| s.as_ref().to_owned())
            .unique()
            .collect::<Vec<_>>();
        let mut groups = vec![Vec::new(); labels.len()];
        let position = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect::<HashMap<_, _>>();
        for (cell, label) in assignments.iter().enumerate() {
            groups[position[label.as_ref()]].push(cell);
        }
        let mut offsets = Vec::with_capacity(labels.len());
        let mut indices = Vec::with_capacity(assignments.len());
        for group in groups {
            offsets.push(indices.len());
            indices.extend(group);
        }
        Idents {
            labels,
            offsets,
            indices,
        }
    }

    /// Number of cells
    pub fn num_cells(&self) -> usize {
        self.indices.len()
    }

    /// Get the index of a label string. Returns None if the label string is not found.
    fn get_label_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|x| x == label)
    }

    fn range(&self, idx: usize) -> &[usize] {
        let offset = self.offsets[idx];
        if idx == self.offsets.len() - 1 {
            &self.indices[offset..]
        } else {
            &self.indices[offset..self.offsets[idx + 1]]
        }
    }

    /// Returns either the cells carrying the given label or None if the label doesn't exist.
    pub fn get_indices(&self, label: &str) -> Option<&[usize]> {
        self.get_label_index(label).map(|idx| self.range(idx))
    }

    /// Relabel through `map`. Labels that map to the same new name are merged, keeping
    /// the order in which the new names first appear.
    pub fn rename(&self, map: &RenameMap) -> Idents {
        let mut labels: Vec<String> = Vec::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (idx, old) in self.labels.iter().enumerate() {
            let new = map.apply(old);
            let pos = match labels.iter().position(|l| l == new) {
                Some(pos) => pos,
                None => {
                    labels.push(new.to_owned());
                    groups.push(Vec::new());
                    labels.len() - 1
                }
            };
            groups[pos].extend_from_slice(self.range(idx));
        }
        let mut offsets = Vec::with_capacity(labels.len());
        let mut indices = Vec::with_capacity(self.indices.len());
        for group in groups {
            offsets.push(indices.len());
            indices.extend(group);
        }
        Idents {
            labels,
            offsets,
            indices,
        }
    }

    /// Cells carrying any of `labels`, grouped in the order the labels are given.
    pub fn subset(&self, labels: &[&str]) -> Result<Vec<usize>, Error> {
        let mut cells = Vec::new();
        for &label in labels {
            let idx = self
                .get_label_index(label)
                .ok_or_else(|| format_err!("no cells with identity '{}'", label))?;
            cells.extend_from_slice(self.range(idx));
        }
        Ok(cells)
    }

    /// The label of each cell, by cell index. Cells `0..n` must all be present.
    pub fn assignments(&self) -> Result<Vec<&str>, Error> {
        let mut out: Vec<Option<&str>> = vec![None; self.indices.len()];
        for (idx, label) in self.labels.iter().enumerate() {
            for &cell in self.range(idx) {
                let slot = out
                    .get_mut(cell)
                    .ok_or_else(|| format_err!("cell index {} out of range", cell))?;
                *slot = Some(label.as_str());
            }
        }
        out.into_iter()
            .enumerate()
            .map(|(cell, l)| l.ok_or_else(|| format_err!("cell {} has no identity", cell)))
            .collect()
    }

    /// Remove labels containing `pattern`. Returns the cells they held.
    pub fn remove_like(&mut self, pattern: &str) -> BTreeSet<usize> {
        let mut r = BTreeSet::default();
        let mut idx = 0;
        while idx < self.labels.len() {
            if self.labels[idx].contains(pattern) {
                self.remove_index(idx, &mut r);
            } else {
                idx += 1;
            }
        }
        r
    }

    /// Remove labels not containing the pattern. Also, return their cells.
    pub fn remove_unlike(&mut self, pattern: &str) -> BTreeSet<usize> {
        let mut r = BTreeSet::default();
        let mut idx = 0;
        while idx < self.labels.len() {
            if self.labels[idx].contains(pattern) {
                idx += 1
            } else {
                self.remove_index(idx, &mut r);
            }
        }
        r
    }

    fn remove_index(&mut self, idx: usize, set: &mut BTreeSet<usize>) {
        self.labels.remove(idx);
        let start = self.offsets.remove(idx);
        let end = if self.offsets.len() > idx {
            let end = self.offsets[idx];
            let len = end - start;
            for v in self.offsets.iter_mut().skip(idx) {
                *v -= len;
            }
            end
        } else {
            self.indices.len()
        };
        set.extend(self.indices.drain(start..end));
    }
}
