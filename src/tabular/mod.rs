// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Uniform access to uploaded statements, whether delimited text or a
//! spreadsheet workbook.
//!
//! The file type is sniffed once with [`SourceKind::sniff`]; everything after
//! that goes through the [`TabularSource`] trait and never looks at the file
//! type again. Sources keep no cursor state: every call re-reads the blob.

pub mod delimited;
pub mod workbook;

use crate::errors::SourceError;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::path::Path;

pub use delimited::DelimitedSource;
pub use workbook::WorkbookSource;

/// How many leading rows are inspected when looking for the header row.
pub const HEADER_SCAN_ROWS: usize = 20;

pub type RowIter<'a> = Box<dyn Iterator<Item = Result<RawRow, SourceError>> + 'a>;

pub trait TabularSource {
    fn kind(&self) -> SourceKind;

    /// Sheet names for workbooks; empty for delimited text.
    fn sections(&self, blob: &[u8]) -> Result<Vec<String>, SourceError>;

    fn headers(&self, blob: &[u8], section: Option<&str>) -> Result<Vec<String>, SourceError>;

    /// Forward-only data rows (header and preamble excluded, blank rows dropped).
    fn rows<'a>(&self, blob: &'a [u8], section: Option<&str>) -> Result<RowIter<'a>, SourceError>;

    fn preview(
        &self,
        blob: &[u8],
        limit: usize,
        section: Option<&str>,
    ) -> Result<Vec<RawRow>, SourceError> {
        self.rows(blob, section)?.take(limit).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Delimited,
    Workbook,
}

impl SourceKind {
    /// Picks the adapter from the file extension, falling back to the mimetype.
    pub fn sniff(file_name: &str, mime: Option<&str>) -> Result<SourceKind, SourceError> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => return Ok(SourceKind::Delimited),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => return Ok(SourceKind::Workbook),
            _ => {}
        }
        match mime.map(|m| m.trim().to_ascii_lowercase()).as_deref() {
            Some("text/csv" | "text/plain" | "text/tab-separated-values") => {
                Ok(SourceKind::Delimited)
            }
            Some(
                "application/vnd.ms-excel"
                | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
                | "application/vnd.oasis.opendocument.spreadsheet",
            ) => Ok(SourceKind::Workbook),
            _ => Err(SourceError::Unsupported(file_name.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Delimited => "csv",
            SourceKind::Workbook => "excel",
        }
    }
}

pub fn open(kind: SourceKind) -> Box<dyn TabularSource> {
    match kind {
        SourceKind::Delimited => Box::new(DelimitedSource::new()),
        SourceKind::Workbook => Box::new(WorkbookSource),
    }
}

/// One source row as label -> cell text, in header order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    cells: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(cells: Vec<(String, String)>) -> Self {
        RawRow { cells }
    }

    /// Pairs values with headers; short rows are padded, surplus cells dropped.
    pub fn zip(headers: &[String], values: Vec<String>) -> Self {
        let mut values = values.into_iter();
        let cells = headers
            .iter()
            .map(|h| (h.clone(), values.next().unwrap_or_default()))
            .collect();
        RawRow { cells }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(k, _)| k == label)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, v)| v.trim().is_empty())
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .cells
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        serde_json::Value::Object(map)
    }
}

impl Serialize for RawRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (k, v) in &self.cells {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

fn is_label(cell: &str) -> bool {
    cell.chars().any(|c| c.is_alphabetic())
}

/// Index of the header row among `rows`: the first with at least two non-empty
/// cells that all read as labels. Falls back to the first non-empty row, which
/// covers single-column files.
pub(crate) fn find_header_row(rows: &[Vec<String>]) -> Option<usize> {
    let candidate = rows.iter().position(|row| {
        let filled: Vec<&String> = row.iter().filter(|c| !c.trim().is_empty()).collect();
        filled.len() >= 2 && filled.iter().all(|c| is_label(c))
    });
    candidate.or_else(|| {
        rows.iter()
            .position(|row| row.iter().any(|c| !c.trim().is_empty()))
    })
}

/// Turns raw header cells into usable, unique labels.
pub(crate) fn label_headers(cells: &[String]) -> Vec<String> {
    let last = cells
        .iter()
        .rposition(|c| !c.trim().is_empty())
        .map(|i| i + 1)
        .unwrap_or(0);
    let mut out: Vec<String> = Vec::with_capacity(last);
    for (i, cell) in cells.iter().take(last).enumerate() {
        let base = match cell.trim() {
            "" => format!("Column {}", i + 1),
            s => s.to_string(),
        };
        let mut label = base.clone();
        let mut n = 2;
        while out.contains(&label) {
            label = format!("{}_{}", base, n);
            n += 1;
        }
        out.push(label);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn header_row_skips_bank_preamble() {
        let rows = grid(&[
            &["Statement for", ""],
            &["Account", "12345678"],
            &["", ""],
            &["Date", "Description", "Amount"],
            &["2025-01-01", "Coffee", "-4.50"],
        ]);
        assert_eq!(find_header_row(&rows), Some(3));
    }

    #[test]
    fn single_column_falls_back_to_first_filled_row() {
        let rows = grid(&[&[""], &["Amount"], &["10"]]);
        assert_eq!(find_header_row(&rows), Some(1));
    }

    #[test]
    fn labels_fill_blanks_and_dedupe() {
        let cells: Vec<String> = ["Date", "", "Amount", "Amount", ""]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            label_headers(&cells),
            vec!["Date", "Column 2", "Amount", "Amount_2"]
        );
    }

    #[test]
    fn sniff_uses_extension_then_mime() {
        assert_eq!(
            SourceKind::sniff("export.CSV", None).unwrap(),
            SourceKind::Delimited
        );
        assert_eq!(
            SourceKind::sniff("book.xlsx", None).unwrap(),
            SourceKind::Workbook
        );
        assert_eq!(
            SourceKind::sniff("upload", Some("application/vnd.ms-excel")).unwrap(),
            SourceKind::Workbook
        );
        assert!(matches!(
            SourceKind::sniff("notes.pdf", Some("application/pdf")),
            Err(SourceError::Unsupported(_))
        ));
    }

    #[test]
    fn zip_pads_short_rows() {
        let headers = vec!["A".to_string(), "B".to_string()];
        let row = RawRow::zip(&headers, vec!["1".to_string()]);
        assert_eq!(row.get("A"), Some("1"));
        assert_eq!(row.get("B"), Some(""));
        assert_eq!(row.get("C"), None);
    }
}
