// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::{
    HEADER_SCAN_ROWS, RawRow, RowIter, SourceKind, TabularSource, find_header_row, label_headers,
};
use crate::errors::SourceError;
use csv::ReaderBuilder;

const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// CSV/TSV exports. The delimiter is sniffed from the first non-empty line.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelimitedSource;

impl DelimitedSource {
    pub fn new() -> Self {
        DelimitedSource
    }

    fn reader<'a>(&self, text: &'a str) -> csv::Reader<&'a [u8]> {
        ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(sniff_delimiter(text))
            .from_reader(text.as_bytes())
    }

    /// Returns the record index of the header row and its labels.
    fn locate_header(&self, text: &str) -> Result<(usize, Vec<String>), SourceError> {
        let mut rdr = self.reader(text);
        let mut head: Vec<Vec<String>> = Vec::new();
        for rec in rdr.records().take(HEADER_SCAN_ROWS) {
            let rec = rec.map_err(|e| SourceError::Malformed(e.to_string()))?;
            head.push(rec.iter().map(|s| s.trim().to_string()).collect());
        }
        let idx = find_header_row(&head)
            .ok_or_else(|| SourceError::Malformed("no header row found".into()))?;
        let labels = label_headers(&head[idx]);
        if labels.is_empty() {
            return Err(SourceError::Malformed("header row has no columns".into()));
        }
        Ok((idx, labels))
    }
}

fn decode(blob: &[u8]) -> Result<&str, SourceError> {
    let blob = blob.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(blob);
    let text = std::str::from_utf8(blob).map_err(|e| {
        SourceError::Malformed(format!(
            "file is not valid UTF-8 text (byte {})",
            e.valid_up_to()
        ))
    })?;
    if text.trim().is_empty() {
        return Err(SourceError::Malformed("file is empty".into()));
    }
    Ok(text)
}

fn no_sections(section: Option<&str>) -> Result<(), SourceError> {
    match section.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Err(SourceError::MissingSection(s.to_string())),
        None => Ok(()),
    }
}

pub(crate) fn sniff_delimiter(text: &str) -> u8 {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    CANDIDATE_DELIMITERS
        .iter()
        .copied()
        .map(|d| (d, line.bytes().filter(|b| *b == d).count()))
        .filter(|(_, n)| *n > 0)
        .max_by_key(|(_, n)| *n)
        .map(|(d, _)| d)
        .unwrap_or(b',')
}

impl TabularSource for DelimitedSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Delimited
    }

    fn sections(&self, blob: &[u8]) -> Result<Vec<String>, SourceError> {
        decode(blob)?;
        Ok(Vec::new())
    }

    fn headers(&self, blob: &[u8], section: Option<&str>) -> Result<Vec<String>, SourceError> {
        no_sections(section)?;
        let text = decode(blob)?;
        Ok(self.locate_header(text)?.1)
    }

    fn rows<'a>(&self, blob: &'a [u8], section: Option<&str>) -> Result<RowIter<'a>, SourceError> {
        no_sections(section)?;
        let text = decode(blob)?;
        let (idx, headers) = self.locate_header(text)?;
        let iter = self
            .reader(text)
            .into_records()
            .skip(idx + 1)
            .filter_map(move |rec| match rec {
                Ok(rec) => {
                    let row = RawRow::zip(
                        &headers,
                        rec.iter().map(|s| s.trim().to_string()).collect(),
                    );
                    (!row.is_blank()).then_some(Ok(row))
                }
                Err(e) => Some(Err(SourceError::Malformed(e.to_string()))),
            });
        Ok(Box::new(iter))
    }
}
