use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use tracing::trace;

use crate::dataset::Dataset;

/// Distinct non-empty values per column, sorted ascending. Used to fill the
/// filter menus.
#[derive(Debug, Clone, Default)]
pub struct ColumnIndex {
    values: BTreeMap<String, Vec<String>>,
}

impl ColumnIndex {
    /// Index `columns` of `dataset`. Each column is scanned in its own rayon task.
    pub fn build(dataset: &Dataset, columns: &[String]) -> Self {
        let values = columns
            .par_iter()
            .map(|column| (column.clone(), Self::distinct_values(dataset, column)))
            .collect::<BTreeMap<String, Vec<String>>>();
        trace!("Indexed {} columns", values.len());
        ColumnIndex { values }
    }

    fn distinct_values(dataset: &Dataset, column: &str) -> Vec<String> {
        dataset
            .records()
            .iter()
            .map(|r| r.get(column))
            .filter(|v| !v.is_empty())
            .collect::<BTreeSet<&str>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Sorted distinct values of `column`, empty if the column is not indexed.
    pub fn values(&self, column: &str) -> &[String] {
        self.values.get(column).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Dataset {
        Dataset::parse(
            "id,type,site\n\
             A1,Pump,North\n\
             A2,Valve,\n\
             A3,Pump,South\n\
             A4,Compressor,North\n\
             A5,,south\n",
        )
        .unwrap()
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn values_are_distinct_and_sorted() {
        let index = ColumnIndex::build(&dataset(), &cols(&["type", "site"]));
        assert_eq!(index.values("type"), ["Compressor", "Pump", "Valve"]);
        // Ordering is by string comparison, upper case sorts first.
        assert_eq!(index.values("site"), ["North", "South", "south"]);
    }

    #[test]
    fn empty_values_are_never_indexed() {
        let ds = dataset();
        let index = ColumnIndex::build(&ds, ds.header());
        for column in index.columns() {
            assert!(index.values(column).iter().all(|v| !v.is_empty()));
        }
    }

    #[test]
    fn indexed_values_occur_in_the_dataset() {
        let ds = dataset();
        let index = ColumnIndex::build(&ds, ds.header());
        for column in ds.header() {
            for value in index.values(column) {
                assert!(ds.records().iter().any(|r| r.get(column) == value));
            }
        }
    }

    #[test]
    fn only_requested_columns_are_indexed() {
        let index = ColumnIndex::build(&dataset(), &cols(&["site"]));
        assert_eq!(index.columns().collect::<Vec<_>>(), ["site"]);
        assert!(index.values("type").is_empty());
    }

    #[test]
    fn empty_dataset_gives_empty_value_lists() {
        let ds = Dataset::parse("id,type\n").unwrap();
        let index = ColumnIndex::build(&ds, ds.header());
        assert!(index.values("id").is_empty());
        assert_eq!(index.columns().count(), 2);
    }
}
