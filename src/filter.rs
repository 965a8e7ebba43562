use std::collections::BTreeMap;

use tracing::trace;

use crate::dataset::{Dataset, Record};

/// Per-column equality constraints. A column that is absent is unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSelection {
    constraints: BTreeMap<String, String>,
}

impl FilterSelection {
    /// Choose `value` for `column`. Choosing the value that is already active,
    /// or the empty string, removes the constraint instead. Returns whether the
    /// column is constrained afterwards.
    pub fn toggle(&mut self, column: &str, value: &str) -> bool {
        if value.is_empty() || self.get(column) == Some(value) {
            self.constraints.remove(column);
            false
        } else {
            self.constraints.insert(column.to_string(), value.to_string());
            true
        }
    }

    /// Remove the constraint on `column`. Returns whether there was one.
    pub fn clear(&mut self, column: &str) -> bool {
        self.constraints.remove(column).is_some()
    }

    pub fn clear_all(&mut self) {
        self.constraints.clear();
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.constraints.get(column).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.constraints.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Exact, case sensitive match on every constrained column.
    pub fn matches(&self, record: &Record) -> bool {
        self.constraints
            .iter()
            .all(|(column, value)| record.get(column) == value)
    }
}

/// True if any cell contains `needle`. `needle` must already be lower case.
fn matches_search(record: &Record, needle: &str) -> bool {
    record.values().any(|v| v.to_lowercase().contains(needle))
}

/// Indices of the records passing `selection` and, if given, containing
/// `search` in any cell (case insensitive). Source order is preserved.
pub fn evaluate(dataset: &Dataset, selection: &FilterSelection, search: Option<&str>) -> Vec<usize> {
    let needle = search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let rows: Vec<usize> = dataset
        .records()
        .iter()
        .enumerate()
        .filter(|(_, record)| selection.matches(record))
        .filter(|(_, record)| needle.as_deref().is_none_or(|n| matches_search(record, n)))
        .map(|(ridx, _)| ridx)
        .collect();

    trace!(
        "Filter with {} constraints, search {:?}: {} of {} rows",
        selection.len(),
        needle,
        rows.len(),
        dataset.len()
    );
    rows
}
