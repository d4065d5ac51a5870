// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Normalisation of one raw statement row into a candidate transaction.
//!
//! Everything here is pure: the same row, mapping and date format always give
//! the same answer. Amounts assume `,` thousands separators and a `.` decimal
//! point; `1.234,50`-style locales are not recognised.

use super::ColumnMapping;
use crate::errors::RowRejection;
use crate::models::TransactionType;
use crate::tabular::RawRow;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::str::FromStr;

const KNOWN_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%m/%d/%Y", "%m-%d-%Y",
];

const GENERIC_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d/%m/%Y %H:%M",
    "%m/%d/%Y %H:%M",
];

const GENERIC_DATE_FORMATS: &[&str] = &[
    "%d %b %Y", "%d %B %Y", "%b %d, %Y", "%B %d, %Y", "%b %d %Y", "%d-%b-%Y", "%Y%m%d",
    "%d/%m/%y", "%m/%d/%y",
];

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub date: NaiveDate,
    pub description: String,
    /// Magnitude; the sign is carried by `r#type`.
    pub amount: Decimal,
    pub r#type: TransactionType,
    pub currency: Option<String>,
    pub category: Option<String>,
    pub raw: RawRow,
}

fn cell<'r>(raw: &'r RawRow, label: Option<&String>) -> Option<&'r str> {
    label
        .and_then(|l| raw.get(l))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub fn map_row(
    raw: &RawRow,
    mapping: &ColumnMapping,
    date_format: Option<&str>,
) -> Result<NormalizedRow, RowRejection> {
    let date_raw =
        cell(raw, Some(&mapping.date)).ok_or(RowRejection::MissingField("date"))?;
    let description = cell(raw, Some(&mapping.description))
        .ok_or(RowRejection::MissingField("description"))?;
    let amount_raw =
        cell(raw, Some(&mapping.amount)).ok_or(RowRejection::MissingField("amount"))?;

    let signed =
        parse_amount(amount_raw).ok_or_else(|| RowRejection::InvalidAmount(amount_raw.into()))?;
    let r#type = cell(raw, mapping.r#type.as_ref())
        .and_then(classify_type)
        .unwrap_or(if signed.is_sign_negative() && !signed.is_zero() {
            TransactionType::Expense
        } else {
            TransactionType::Income
        });
    let date = parse_date(date_raw, date_format)
        .ok_or_else(|| RowRejection::InvalidDate(date_raw.into()))?;

    Ok(NormalizedRow {
        date,
        description: description.to_string(),
        amount: signed.abs(),
        r#type,
        currency: cell(raw, mapping.currency.as_ref()).map(|c| c.to_uppercase()),
        category: cell(raw, mapping.category.as_ref()).map(str::to_string),
        raw: raw.clone(),
    })
}

/// Parses statement amounts such as `$(1,234.50)`, `-4.50` or `+2,000`.
/// Parentheses mean negative. The Unicode minus sign counts as `-`.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let kept: String = s
        .chars()
        .map(|c| if c == '\u{2212}' { '-' } else { c })
        .filter(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | ',' | '(' | ')'))
        .collect();
    let parenthesised = kept.starts_with('(') && kept.ends_with(')') && kept.len() > 2;
    let body = if parenthesised {
        &kept[1..kept.len() - 1]
    } else {
        kept.as_str()
    };
    let body = body.replace(',', "");
    let body = body.strip_prefix('+').unwrap_or(&body);
    if !body.chars().any(|c| c.is_ascii_digit()) || body.contains(['(', ')']) {
        return None;
    }
    let value = Decimal::from_str(body).ok()?;
    Some(if parenthesised { -value.abs() } else { value })
}

pub fn classify_type(s: &str) -> Option<TransactionType> {
    let v = s.trim().to_lowercase();
    match v.as_str() {
        "cr" | "c" => return Some(TransactionType::Income),
        "dr" | "d" => return Some(TransactionType::Expense),
        _ => {}
    }
    if ["credit", "income", "deposit"].iter().any(|k| v.contains(k)) {
        Some(TransactionType::Income)
    } else if ["debit", "expense", "withdrawal"].iter().any(|k| v.contains(k)) {
        Some(TransactionType::Expense)
    } else if v.contains("transfer") {
        Some(TransactionType::Transfer)
    } else {
        None
    }
}

/// Accepts strftime formats as well as the `YYYY-MM-DD` token style.
fn strftime(fmt: &str) -> String {
    if fmt.contains('%') {
        return fmt.to_string();
    }
    fmt.replace("YYYY", "%Y")
        .replace("YY", "%y")
        .replace("MMMM", "%B")
        .replace("MMM", "%b")
        .replace("MM", "%m")
        .replace("DD", "%d")
}

fn plausible(d: NaiveDate) -> Option<NaiveDate> {
    (1900..=2200).contains(&d.year()).then_some(d)
}

fn with_format(s: &str, fmt: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, fmt)
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, fmt).ok().map(|dt| dt.date()))
        .and_then(plausible)
}

/// Explicit format first, then the known patterns, then generic parsing.
pub fn parse_date(s: &str, explicit: Option<&str>) -> Option<NaiveDate> {
    let s = s.trim();
    if let Some(fmt) = explicit.map(str::trim).filter(|f| !f.is_empty()) {
        if let Some(d) = with_format(s, &strftime(fmt)) {
            return Some(d);
        }
    }
    if let Some(d) = KNOWN_DATE_FORMATS.iter().find_map(|f| with_format(s, f)) {
        return Some(d);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return plausible(dt.date_naive());
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc2822(s) {
        return plausible(dt.date_naive());
    }
    GENERIC_DATETIME_FORMATS
        .iter()
        .find_map(|f| {
            NaiveDateTime::parse_from_str(s, f)
                .ok()
                .map(|dt| dt.date())
                .and_then(plausible)
        })
        .or_else(|| GENERIC_DATE_FORMATS.iter().find_map(|f| with_format(s, f)))
}
