use std::collections::HashMap;
use std::io::Write;

use tracing::{debug, trace};

use crate::domain::AVError;
use crate::tokenizer::{format_line, tokenize_line};

/// One row of the inventory, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    cells: HashMap<String, String>,
}

impl Record {
    /// Cell value of `column`, the empty string if the column is unknown.
    pub fn get(&self, column: &str) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.cells.values().map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Record {
            cells: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// All records of one upload together with their header, in source order.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    name: String,
    header: Vec<String>,
    records: Vec<Record>,
}

impl Dataset {
    /// Build a dataset from raw CSV text. The first non-empty line is the
    /// header, all following non-empty lines are records.
    pub fn parse(text: &str) -> Result<Self, AVError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());

        let header = match lines.next() {
            Some(line) => tokenize_line(line),
            None => return Err(AVError::EmptyInput),
        };
        trace!("Header: {:?}", header);

        let records = lines
            .map(|line| Self::build_record(&header, tokenize_line(line)))
            .collect::<Vec<Record>>();
        debug!("Parsed {} records with {} columns", records.len(), header.len());

        Ok(Dataset {
            name: String::new(),
            header,
            records,
        })
    }

    /// Build a dataset from column-major string data, as produced when a
    /// columnar file format is read. Every column must have the same length.
    pub fn from_columns(header: Vec<String>, columns: Vec<Vec<String>>) -> Result<Self, AVError> {
        if header.is_empty() {
            return Err(AVError::EmptyInput);
        }
        if header.len() != columns.len() {
            return Err(AVError::LoadingFailed(format!(
                "{} column names for {} columns",
                header.len(),
                columns.len()
            )));
        }
        let nrows = columns.first().map(Vec::len).unwrap_or(0);
        if columns.iter().any(|c| c.len() != nrows) {
            return Err(AVError::LoadingFailed("columns differ in length".into()));
        }

        let records = (0..nrows)
            .map(|ridx| Self::build_record(&header, columns.iter().map(|c| c[ridx].clone())))
            .collect();

        Ok(Dataset {
            name: String::new(),
            header,
            records,
        })
    }

    // Pairs the n-th field with the n-th header name. Missing trailing fields
    // become empty strings and surplus fields are dropped. A repeated header
    // name keeps the value of its last occurrence.
    fn build_record(header: &[String], fields: impl IntoIterator<Item = String>) -> Record {
        let mut fields = fields.into_iter();
        let mut cells = HashMap::with_capacity(header.len());
        for name in header {
            cells.insert(name.clone(), fields.next().unwrap_or_default());
        }
        Record { cells }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record(&self, idx: usize) -> Option<&Record> {
        self.records.get(idx)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write the given rows restricted to `columns` as CSV, header first.
    pub fn write_csv<W: Write>(
        &self,
        writer: &mut W,
        rows: &[usize],
        columns: &[String],
    ) -> Result<usize, AVError> {
        writeln!(writer, "{}", format_line(columns.iter().map(String::as_str)))?;
        let mut written = 0;
        for record in rows.iter().filter_map(|&ridx| self.records.get(ridx)) {
            writeln!(writer, "{}", format_line(columns.iter().map(|c| record.get(c))))?;
            written += 1;
        }
        writer.flush()?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASSETS: &str = "Asset ID,Status\nA1,Active\nA2,Down\n";

    #[test]
    fn parses_header_and_records_in_order() {
        let ds = Dataset::parse(ASSETS).unwrap();
        assert_eq!(ds.header(), ["Asset ID", "Status"]);
        assert_eq!(ds.len(), 2);
        assert_eq!(
            ds.records()[0],
            Record::from_iter([("Asset ID", "A1"), ("Status", "Active")])
        );
        assert_eq!(
            ds.records()[1],
            Record::from_iter([("Asset ID", "A2"), ("Status", "Down")])
        );
    }

    #[test]
    fn every_record_has_one_value_per_header() {
        let ds = Dataset::parse("a,b,c\n1,2,3\n4,5,6\n7,8,9\n").unwrap();
        assert_eq!(ds.len(), 3);
        for record in ds.records() {
            assert_eq!(record.len(), ds.header().len());
        }
    }

    #[test]
    fn accepts_crlf_and_skips_blank_lines() {
        let ds = Dataset::parse("\r\n  \r\nid,name\r\n\r\n1,pump\r\n2,valve\r\n   \n").unwrap();
        assert_eq!(ds.header(), ["id", "name"]);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.records()[1].get("name"), "valve");
    }

    #[test]
    fn short_rows_are_padded_and_long_rows_truncated() {
        let ds = Dataset::parse("a,b,c\n1\n1,2,3,4,5\n").unwrap();
        let short = &ds.records()[0];
        assert_eq!(short.get("a"), "1");
        assert_eq!(short.get("b"), "");
        assert_eq!(short.get("c"), "");
        let long = &ds.records()[1];
        assert_eq!(long.len(), 3);
        assert_eq!(long.get("c"), "3");
    }

    #[test]
    fn duplicate_header_keeps_last_value() {
        let ds = Dataset::parse("id,id,state\nfirst,second,ok\n").unwrap();
        let record = &ds.records()[0];
        assert_eq!(record.get("id"), "second");
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn quoted_fields_are_unescaped() {
        let ds = Dataset::parse("id,note\nA7,\"leaks, \"\"minor\"\"\"\n").unwrap();
        assert_eq!(ds.records()[0].get("note"), "leaks, \"minor\"");
    }

    #[test]
    fn strips_byte_order_mark() {
        let ds = Dataset::parse("\u{feff}Asset ID,Status\nA1,Active\n").unwrap();
        assert_eq!(ds.header()[0], "Asset ID");
    }

    #[test]
    fn empty_and_whitespace_input_is_rejected() {
        assert!(matches!(Dataset::parse(""), Err(AVError::EmptyInput)));
        assert!(matches!(Dataset::parse(" \n\t\r\n  "), Err(AVError::EmptyInput)));
    }

    #[test]
    fn header_only_input_gives_empty_dataset() {
        let ds = Dataset::parse("a,b\n").unwrap();
        assert!(ds.is_empty());
        assert_eq!(ds.header().len(), 2);
    }

    #[test]
    fn builds_from_columns() {
        let ds = Dataset::from_columns(
            vec!["id".into(), "state".into()],
            vec![
                vec!["1".into(), "2".into()],
                vec!["up".into(), "".into()],
            ],
        )
        .unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.records()[0].get("state"), "up");
        assert_eq!(ds.records()[1].get("state"), "");
    }

    #[test]
    fn rejects_ragged_columns() {
        let result = Dataset::from_columns(
            vec!["id".into(), "state".into()],
            vec![vec!["1".into(), "2".into()], vec!["up".into()]],
        );
        assert!(matches!(result, Err(AVError::LoadingFailed(_))));
    }

    #[test]
    fn writes_selected_rows_and_columns() {
        let ds = Dataset::parse("id,site,state\n1,North Yard,up\n2,South,down\n3,East,up\n").unwrap();
        let mut out = Vec::new();
        let written = ds
            .write_csv(&mut out, &[0, 2], &["site".to_string(), "id".to_string()])
            .unwrap();
        assert_eq!(written, 2);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "site,id\n\"North Yard\",1\nEast,3\n");

        let reparsed = Dataset::parse(&text).unwrap();
        assert_eq!(reparsed.records()[0].get("site"), "North Yard");
    }
}
