// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::{
    HEADER_SCAN_ROWS, RawRow, RowIter, SourceKind, TabularSource, find_header_row, label_headers,
};
use crate::errors::SourceError;
use calamine::{Data, Range, Reader, Sheets, open_workbook_auto_from_rs};
use chrono::{Duration, NaiveDate, NaiveTime};
use std::io::Cursor;

/// Excel/ODS workbooks. Sections are sheet names; with no sheet given the
/// first sheet is read.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkbookSource;

fn open(blob: &[u8]) -> Result<Sheets<Cursor<&[u8]>>, SourceError> {
    open_workbook_auto_from_rs(Cursor::new(blob))
        .map_err(|e| SourceError::Malformed(format!("cannot read workbook: {}", e)))
}

fn sheet_range(blob: &[u8], section: Option<&str>) -> Result<(String, Range<Data>), SourceError> {
    let mut workbook = open(blob)?;
    let names = workbook.sheet_names();
    let name = match section.map(str::trim).filter(|s| !s.is_empty()) {
        Some(wanted) => names
            .iter()
            .find(|n| n.as_str() == wanted)
            .cloned()
            .ok_or_else(|| SourceError::MissingSection(wanted.to_string()))?,
        None => names
            .first()
            .cloned()
            .ok_or_else(|| SourceError::Malformed("workbook has no sheets".into()))?,
    };
    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| SourceError::Malformed(format!("sheet '{}': {}", name, e)))?;
    if range.is_empty() || range.width() == 0 {
        return Err(SourceError::Malformed(format!("sheet '{}' is empty", name)));
    }
    Ok((name, range))
}

/// Last serial Excel can display: 9999-12-31.
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

/// Excel serial day number (1900 system) to a date-or-datetime string.
fn excel_serial_to_text(v: f64) -> Option<String> {
    if !v.is_finite() || !(0.0..MAX_EXCEL_SERIAL + 1.0).contains(&v) {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = base.checked_add_signed(Duration::days(v.floor() as i64))?;
    let secs = ((v - v.floor()) * 86_400.0).round() as u32;
    if secs == 0 || secs >= 86_400 {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    let time = NaiveTime::from_num_seconds_from_midnight_opt(secs, 0)?;
    Some(date.and_time(time).format("%Y-%m-%d %H:%M:%S").to_string())
}

pub(crate) fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_text(dt.as_f64()).unwrap_or_default(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
    }
}

fn grid(range: &Range<Data>) -> Vec<Vec<String>> {
    range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect()
}

fn locate_header(grid: &[Vec<String>], sheet: &str) -> Result<(usize, Vec<String>), SourceError> {
    let scan = &grid[..grid.len().min(HEADER_SCAN_ROWS)];
    let idx = find_header_row(scan)
        .ok_or_else(|| SourceError::Malformed(format!("sheet '{}' has no header row", sheet)))?;
    let labels = label_headers(&grid[idx]);
    if labels.is_empty() {
        return Err(SourceError::Malformed(format!(
            "sheet '{}' header row has no columns",
            sheet
        )));
    }
    Ok((idx, labels))
}

impl TabularSource for WorkbookSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Workbook
    }

    fn sections(&self, blob: &[u8]) -> Result<Vec<String>, SourceError> {
        let names = open(blob)?.sheet_names();
        if names.is_empty() {
            return Err(SourceError::Malformed("workbook has no sheets".into()));
        }
        Ok(names)
    }

    fn headers(&self, blob: &[u8], section: Option<&str>) -> Result<Vec<String>, SourceError> {
        let (name, range) = sheet_range(blob, section)?;
        Ok(locate_header(&grid(&range), &name)?.1)
    }

    fn rows<'a>(&self, blob: &'a [u8], section: Option<&str>) -> Result<RowIter<'a>, SourceError> {
        let (name, range) = sheet_range(blob, section)?;
        let cells = grid(&range);
        let (idx, headers) = locate_header(&cells, &name)?;
        let iter = cells
            .into_iter()
            .skip(idx + 1)
            .map(move |values| RawRow::zip(&headers, values))
            .filter(|row| !row.is_blank())
            .map(Ok);
        Ok(Box::new(iter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_dates_render_as_iso() {
        assert_eq!(excel_serial_to_text(45658.0).unwrap(), "2025-01-01");
        assert_eq!(
            excel_serial_to_text(45658.5).unwrap(),
            "2025-01-01 12:00:00"
        );
    }

    #[test]
    fn out_of_range_serials_are_not_dates() {
        assert_eq!(excel_serial_to_text(1e300), None);
        assert_eq!(excel_serial_to_text(-1.0), None);
        assert_eq!(excel_serial_to_text(f64::NAN), None);
        assert_eq!(excel_serial_to_text(MAX_EXCEL_SERIAL).unwrap(), "9999-12-31");
    }

    #[test]
    fn cells_render_without_float_noise() {
        assert_eq!(cell_text(&Data::Float(2000.0)), "2000");
        assert_eq!(cell_text(&Data::Float(-4.5)), "-4.5");
        assert_eq!(cell_text(&Data::String("  Coffee ".into())), "Coffee");
        assert_eq!(cell_text(&Data::Empty), "");
    }

    #[test]
    fn garbage_bytes_are_malformed() {
        let err = WorkbookSource.sections(b"not a workbook").unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
    }
}
