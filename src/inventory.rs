use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::dataset::Dataset;
use crate::filter::{FilterSelection, evaluate};
use crate::index::ColumnIndex;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    Empty,
    Loaded,
    Filtered,
}

/// State of the inventory view: the current dataset and everything derived
/// from it. The dataset is only ever replaced as a whole.
#[derive(Debug, Default)]
pub struct Inventory {
    dataset: Option<Dataset>,
    selection: FilterSelection,
    search: Option<String>,
    hidden_columns: HashSet<String>,
    index: ColumnIndex,
    rows: Arc<Vec<usize>>, // Indices into dataset.records() that pass filter and search
}

impl Inventory {
    pub fn phase(&self) -> Phase {
        match &self.dataset {
            None => Phase::Empty,
            Some(_) if self.selection.is_empty() => Phase::Loaded,
            Some(_) => Phase::Filtered,
        }
    }

    /// Replace whatever was loaded before. Filters, search and hidden columns
    /// are reset.
    pub fn load(&mut self, dataset: Dataset) {
        self.unload();
        info!(
            "Loaded \"{}\" with {} records and {} columns",
            dataset.name(),
            dataset.len(),
            dataset.header().len()
        );
        if dataset.is_empty() {
            warn!("\"{}\" has a header but no records", dataset.name());
        }
        self.dataset = Some(dataset);
        self.reindex();
        self.refilter();
    }

    pub fn unload(&mut self) {
        self.dataset = None;
        self.selection.clear_all();
        self.search = None;
        self.hidden_columns.clear();
        self.index = ColumnIndex::default();
        self.rows = Arc::new(Vec::new());
    }

    pub fn toggle_filter(&mut self, column: &str, value: &str) {
        if self.dataset.is_some() {
            self.selection.toggle(column, value);
            self.refilter();
        }
    }

    pub fn clear_filter(&mut self, column: &str) {
        if self.selection.clear(column) {
            self.refilter();
        }
    }

    pub fn clear_all_filters(&mut self) {
        if !self.selection.is_empty() {
            self.selection.clear_all();
            self.refilter();
        }
    }

    pub fn set_search(&mut self, term: Option<String>) {
        let term = term
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if term != self.search {
            self.search = term;
            self.refilter();
        }
    }

    /// Hide `column` from display. The last visible column cannot be hidden.
    pub fn hide_column(&mut self, column: &str) -> bool {
        if self.visible_columns().len() <= 1 || !self.header().iter().any(|h| h == column) {
            return false;
        }
        self.hidden_columns.insert(column.to_string());
        self.reindex();
        true
    }

    pub fn show_all_columns(&mut self) {
        if !self.hidden_columns.is_empty() {
            self.hidden_columns.clear();
            self.reindex();
        }
    }

    /// Header columns that are not hidden, in header order without repeats.
    pub fn visible_columns(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.header()
            .iter()
            .filter(|h| !self.hidden_columns.contains(*h) && seen.insert(h.as_str()))
            .cloned()
            .collect()
    }

    fn header(&self) -> &[String] {
        self.dataset.as_ref().map(Dataset::header).unwrap_or(&[])
    }

    fn reindex(&mut self) {
        self.index = match &self.dataset {
            Some(dataset) => ColumnIndex::build(dataset, &self.visible_columns()),
            None => ColumnIndex::default(),
        };
        debug!("Indexed {} columns", self.index.columns().count());
    }

    fn refilter(&mut self) {
        if let Some(dataset) = &self.dataset {
            let start_time = Instant::now();
            let rows = evaluate(dataset, &self.selection, self.search.as_deref());
            debug!(
                "{} of {} rows visible, took {}ms",
                rows.len(),
                dataset.len(),
                start_time.elapsed().as_millis()
            );
            self.rows = Arc::new(rows);
        }
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn index(&self) -> &ColumnIndex {
        &self.index
    }

    pub fn rows(&self) -> Arc<Vec<usize>> {
        Arc::clone(&self.rows)
    }
}
