// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod heuristic;
pub mod row;

use serde::{Deserialize, Serialize};

pub use heuristic::suggest;
pub use row::{NormalizedRow, map_row};

/// Confirmed correspondence from logical fields to header labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    pub date: String,
    pub description: String,
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
}

impl ColumnMapping {
    /// Labels the mapping refers to that are not present in `headers`.
    pub fn missing_from(&self, headers: &[String]) -> Vec<String> {
        [
            Some(&self.date),
            Some(&self.description),
            Some(&self.amount),
            self.currency.as_ref(),
            self.category.as_ref(),
            self.r#type.as_ref(),
        ]
        .into_iter()
        .flatten()
        .filter(|label| !headers.contains(label))
        .cloned()
        .collect()
    }
}

/// Advisory guess produced from header labels; any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedMapping {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
}

impl SuggestedMapping {
    pub fn is_empty(&self) -> bool {
        *self == SuggestedMapping::default()
    }
}
