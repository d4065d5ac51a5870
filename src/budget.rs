// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::errors::{FxError, LedgerError, Result};
use crate::ledger::stored_decimal;
use crate::models::{Budget, BudgetItem};
use crate::rates::{Money, RateCache, RateProvider, RateStore};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemWithConversion {
    pub category: String,
    pub native_amount: Decimal,
    pub native_currency: String,
    pub converted_amount: Decimal,
    pub exchange_rate: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetConversion {
    pub items: Vec<ItemWithConversion>,
    pub total_native: BTreeMap<String, Decimal>,
    pub total_converted: Decimal,
    pub total_currency: String,
    pub converted_income: Decimal,
    pub remaining: Decimal,
}

/// Expresses budget lines and income in `currency`. Each distinct source
/// currency is looked up once. No rounding is applied.
pub fn summarize<S: RateStore, P: RateProvider>(
    cache: &RateCache<S, P>,
    currency: &str,
    items: &[BudgetItem],
    income: &Money,
) -> std::result::Result<BudgetConversion, FxError> {
    let target = currency.trim().to_uppercase();
    let mut rates: HashMap<String, Decimal> = HashMap::new();
    let mut rate_for = |ccy: &str| -> std::result::Result<Decimal, FxError> {
        let ccy = ccy.trim().to_uppercase();
        if let Some(r) = rates.get(&ccy) {
            return Ok(*r);
        }
        let r = cache.rate(&ccy, &target)?;
        rates.insert(ccy, r);
        Ok(r)
    };

    let mut out = Vec::with_capacity(items.len());
    let mut total_native: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut total_converted = Decimal::ZERO;
    for item in items {
        let native_currency = item.currency.trim().to_uppercase();
        let exchange_rate = rate_for(&native_currency)?;
        let converted_amount = item.amount * exchange_rate;
        *total_native.entry(native_currency.clone()).or_default() += item.amount;
        total_converted += converted_amount;
        out.push(ItemWithConversion {
            category: item.category.clone(),
            native_amount: item.amount,
            native_currency,
            converted_amount,
            exchange_rate,
        });
    }

    let converted_income = income.amount * rate_for(&income.currency)?;
    Ok(BudgetConversion {
        items: out,
        total_native,
        total_converted,
        total_currency: target.clone(),
        converted_income,
        remaining: converted_income - total_converted,
    })
}

fn currency_code(raw: &str) -> Result<String> {
    let code = raw.trim().to_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(LedgerError::Validation(format!(
            "Currency '{}' is not a 3-letter ISO code",
            raw.trim()
        )));
    }
    Ok(code)
}

pub fn create_budget(
    conn: &Connection,
    name: &str,
    currency: &str,
    income: &Money,
) -> Result<Budget> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::Validation("Budget name must not be empty".into()));
    }
    let currency = currency_code(currency)?;
    let income_currency = currency_code(&income.currency)?;
    conn.execute(
        "INSERT INTO budgets(name, currency, income, income_currency) VALUES (?1,?2,?3,?4)",
        params![name, currency, income.amount.to_string(), income_currency],
    )?;
    Ok(Budget {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        currency,
        income: income.amount,
        income_currency,
    })
}

pub fn find_budget(conn: &Connection, name: &str) -> Result<Option<Budget>> {
    let row: Option<(i64, String, String, String, String)> = conn
        .query_row(
            "SELECT id, name, currency, income, income_currency FROM budgets WHERE name=?1",
            params![name.trim()],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )
        .optional()?;
    row.map(|(id, name, currency, income, income_currency)| {
        Ok(Budget {
            id,
            name,
            currency,
            income: stored_decimal("budgets.income", &income)?,
            income_currency,
        })
    })
    .transpose()
}

pub fn list_budgets(conn: &Connection) -> Result<Vec<Budget>> {
    let mut stmt = conn.prepare("SELECT name FROM budgets ORDER BY name")?;
    let names = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        if let Some(b) = find_budget(conn, &name)? {
            out.push(b);
        }
    }
    Ok(out)
}

pub fn add_item(conn: &Connection, budget_id: i64, item: &BudgetItem) -> Result<()> {
    if item.amount.is_sign_negative() {
        return Err(LedgerError::Validation(format!(
            "Budget amount must not be negative, got {}",
            item.amount
        )));
    }
    let currency = currency_code(&item.currency)?;
    conn.execute(
        "INSERT INTO budget_items(budget_id, category, amount, currency) VALUES (?1,?2,?3,?4)",
        params![budget_id, item.category.trim(), item.amount.to_string(), currency],
    )?;
    Ok(())
}

pub fn items(conn: &Connection, budget_id: i64) -> Result<Vec<BudgetItem>> {
    let mut stmt = conn.prepare(
        "SELECT category, amount, currency FROM budget_items WHERE budget_id=?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![budget_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter()
        .map(|(category, amount, currency)| {
            Ok(BudgetItem {
                amount: stored_decimal("budget_items.amount", &amount)?,
                currency,
                category,
            })
        })
        .collect()
}
