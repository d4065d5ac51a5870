// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::SuggestedMapping;
use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Date,
    Description,
    Amount,
    Currency,
    Category,
    Type,
}

// Evaluated in this order; each header is claimed by at most one field.
const PATTERNS: &[(Field, &str)] = &[
    (Field::Date, r"(?i)date|time|when"),
    (Field::Description, r"(?i)desc|detail|memo"),
    (Field::Amount, r"(?i)amount|\bamt\b|value|total|balance"),
    (Field::Currency, r"(?i)currency|\bcurr\b|ccy"),
    (Field::Category, r"(?i)categor|\bcat\b|class"),
    (Field::Type, r"(?i)type|credit|debit"),
];

static RULES: Lazy<Vec<(Field, Regex)>> = Lazy::new(|| {
    PATTERNS
        .iter()
        .filter_map(|(field, pat)| Regex::new(pat).ok().map(|re| (*field, re)))
        .collect()
});

/// Best-guess mapping from header labels. Never fails; the result is a hint
/// for the user, not something to import with unconfirmed.
pub fn suggest(headers: &[String]) -> SuggestedMapping {
    let mut taken = vec![false; headers.len()];
    let mut out = SuggestedMapping::default();
    for (field, re) in RULES.iter() {
        let hit = headers
            .iter()
            .enumerate()
            .find(|(i, h)| !taken[*i] && re.is_match(h.trim()));
        let Some((i, label)) = hit else {
            continue;
        };
        taken[i] = true;
        let slot = match field {
            Field::Date => &mut out.date,
            Field::Description => &mut out.description,
            Field::Amount => &mut out.amount,
            Field::Currency => &mut out.currency,
            Field::Category => &mut out.category,
            Field::Type => &mut out.r#type,
        };
        *slot = Some(label.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn typical_bank_headers() {
        let m = suggest(&labels(&[
            "Transaction Date",
            "Details",
            "Amount",
            "Balance",
            "CCY",
            "Category",
            "Credit/Debit",
        ]));
        assert_eq!(m.date.as_deref(), Some("Transaction Date"));
        assert_eq!(m.description.as_deref(), Some("Details"));
        assert_eq!(m.amount.as_deref(), Some("Amount"));
        assert_eq!(m.currency.as_deref(), Some("CCY"));
        assert_eq!(m.category.as_deref(), Some("Category"));
        assert_eq!(m.r#type.as_deref(), Some("Credit/Debit"));
    }

    #[test]
    fn short_labels_match_case_insensitively() {
        let m = suggest(&labels(&["DATE", "desc", "Amt"]));
        assert_eq!(m.date.as_deref(), Some("DATE"));
        assert_eq!(m.description.as_deref(), Some("desc"));
        assert_eq!(m.amount.as_deref(), Some("Amt"));
        assert!(m.currency.is_none());
    }

    #[test]
    fn header_is_claimed_once() {
        // "Date Type" would satisfy both date and type; date is evaluated first.
        let m = suggest(&labels(&["Date Type", "Memo"]));
        assert_eq!(m.date.as_deref(), Some("Date Type"));
        assert!(m.r#type.is_none());
    }

    #[test]
    fn unknown_headers_give_empty_mapping() {
        assert!(suggest(&labels(&["foo", "bar"])).is_empty());
        assert!(suggest(&[]).is_empty());
    }
}
