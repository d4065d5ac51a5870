// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The already-authenticated caller acting on assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub organization_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub currency: String,
    pub initial_amount: Decimal,
    pub amount: Decimal,
    pub version: i64,
    pub user_id: Option<String>,
    pub family_id: Option<String>,
    pub organization_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Income,
    Expense,
    Transfer,
}

impl TransactionType {
    /// Direction of the type's effect on its asset's balance.
    /// Transfers have no second leg here, so they are neutral.
    pub fn sign(self) -> Decimal {
        match self {
            TransactionType::Income => Decimal::ONE,
            TransactionType::Expense => Decimal::NEGATIVE_ONE,
            TransactionType::Transfer => Decimal::ZERO,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Income => "INCOME",
            TransactionType::Expense => "EXPENSE",
            TransactionType::Transfer => "TRANSFER",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INCOME" => Ok(TransactionType::Income),
            "EXPENSE" => Ok(TransactionType::Expense),
            "TRANSFER" => Ok(TransactionType::Transfer),
            other => Err(format!("Unknown transaction type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub asset_id: i64,
    pub r#type: TransactionType,
    pub amount: Decimal, // magnitude, sign lives in `type`
    pub currency: String,
    pub date: NaiveDate,
    pub category: String,
    pub description: Option<String>,
    pub import_history_id: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

/// Transaction fields as supplied by a caller, before an id is assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub asset_id: i64,
    pub r#type: TransactionType,
    pub amount: Decimal,
    pub currency: String,
    pub date: NaiveDate,
    pub category: String,
    pub description: Option<String>,
    pub import_history_id: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Processing,
    Completed,
    Failed,
}

impl ImportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportStatus::Processing => "processing",
            ImportStatus::Completed => "completed",
            ImportStatus::Failed => "failed",
        }
    }
}

impl FromStr for ImportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(ImportStatus::Processing),
            "completed" => Ok(ImportStatus::Completed),
            "failed" => Ok(ImportStatus::Failed),
            other => Err(format!("Unknown import status '{}'", other)),
        }
    }
}

/// One itemised failure on an import. `row` is 1-based among data rows; 0 marks
/// a job-level failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    pub row: usize,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportHistory {
    pub id: i64,
    pub asset_id: i64,
    pub user_id: String,
    pub file_name: String,
    pub status: ImportStatus,
    pub total_rows: usize,
    pub successful_rows: usize,
    pub failed_rows: usize,
    pub skipped_rows: usize,
    pub errors: Vec<RowError>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: i64,
    pub name: String,
    pub currency: String, // reporting currency
    pub income: Decimal,
    pub income_currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetItem {
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
}
