// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::assets::resolve;
use crate::config::Settings;
use crate::ledger::{self, TransactionPatch};
use crate::models::{NewTransaction, Transaction, TransactionType};
use crate::utils::{maybe_print_json, parse_date, parse_decimal, pretty_table};
use anyhow::{Result, anyhow};
use rusqlite::Connection;
use serde::Serialize;

pub fn handle(conn: &mut Connection, settings: &Settings, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, settings, sub)?,
        Some(("edit", sub)) => edit(conn, settings, sub)?,
        Some(("rm", sub)) => {
            let id = *sub.get_one::<i64>("id").unwrap();
            let removed = ledger::delete_transaction(conn, &settings.actor(), id)?;
            let asset = ledger::load_asset(conn, removed.asset_id)?;
            println!(
                "Removed transaction {}; '{}' balance now {:.2} {}",
                id,
                asset.name,
                asset.amount.round_dp(2),
                asset.currency
            );
        }
        Some(("list", sub)) => list(conn, sub)?,
        _ => {}
    }
    Ok(())
}

fn parse_type(s: &str) -> Result<TransactionType> {
    s.parse::<TransactionType>().map_err(|e| anyhow!(e))
}

fn add(conn: &mut Connection, settings: &Settings, sub: &clap::ArgMatches) -> Result<()> {
    let asset_id = resolve(conn, sub.get_one::<String>("asset").unwrap())?;
    let asset = ledger::load_asset(conn, asset_id)?;
    let new = NewTransaction {
        asset_id,
        r#type: parse_type(sub.get_one::<String>("type").unwrap())?,
        amount: parse_decimal(sub.get_one::<String>("amount").unwrap())?,
        currency: sub
            .get_one::<String>("currency")
            .cloned()
            .unwrap_or_else(|| asset.currency.clone()),
        date: parse_date(sub.get_one::<String>("date").unwrap())?,
        category: sub.get_one::<String>("category").unwrap().trim().to_string(),
        description: sub.get_one::<String>("description").map(|s| s.trim().to_string()),
        import_history_id: None,
        metadata: None,
    };
    let created = ledger::create_transaction(conn, &settings.actor(), &new)?;
    let asset = ledger::load_asset(conn, asset_id)?;
    println!(
        "Recorded {} {} {} on {} (#{}); '{}' balance now {:.2}",
        created.r#type,
        created.amount,
        created.currency,
        created.date,
        created.id,
        asset.name,
        asset.amount.round_dp(2)
    );
    Ok(())
}

fn edit(conn: &mut Connection, settings: &Settings, sub: &clap::ArgMatches) -> Result<()> {
    let id = *sub.get_one::<i64>("id").unwrap();
    let asset_id = match sub.get_one::<String>("asset") {
        Some(name) => Some(resolve(conn, name)?),
        None => None,
    };
    let patch = TransactionPatch {
        asset_id,
        r#type: sub.get_one::<String>("type").map(|s| parse_type(s)).transpose()?,
        amount: sub
            .get_one::<String>("amount")
            .map(|s| parse_decimal(s))
            .transpose()?,
        currency: sub.get_one::<String>("currency").cloned(),
        date: sub.get_one::<String>("date").map(|s| parse_date(s)).transpose()?,
        category: sub.get_one::<String>("category").map(|s| s.trim().to_string()),
        description: sub
            .get_one::<String>("description")
            .map(|s| Some(s.trim().to_string()).filter(|s| !s.is_empty())),
    };
    let updated = ledger::update_transaction(conn, &settings.actor(), id, &patch)?;
    let asset = ledger::load_asset(conn, updated.asset_id)?;
    println!(
        "Updated transaction {}; '{}' balance now {:.2} {}",
        id,
        asset.name,
        asset.amount.round_dp(2),
        asset.currency
    );
    Ok(())
}

#[derive(Serialize)]
pub struct TransactionRow {
    pub id: i64,
    pub date: String,
    pub r#type: String,
    pub amount: String,
    pub currency: String,
    pub category: String,
    pub description: String,
    pub import_id: Option<i64>,
}

impl From<&Transaction> for TransactionRow {
    fn from(t: &Transaction) -> Self {
        TransactionRow {
            id: t.id,
            date: t.date.to_string(),
            r#type: t.r#type.to_string(),
            amount: t.amount.to_string(),
            currency: t.currency.clone(),
            category: t.category.clone(),
            description: t.description.clone().unwrap_or_default(),
            import_id: t.import_history_id,
        }
    }
}

pub fn query_rows(conn: &Connection, sub: &clap::ArgMatches) -> Result<Vec<TransactionRow>> {
    let asset_id = sub
        .get_one::<String>("asset")
        .map(|n| resolve(conn, n))
        .transpose()?;
    let limit = sub.get_one::<usize>("limit").copied();
    let txs = ledger::list_transactions(conn, asset_id, limit)?;
    Ok(txs.iter().map(TransactionRow::from).collect())
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let data = query_rows(conn, sub)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|r| {
                vec![
                    r.id.to_string(),
                    r.date.clone(),
                    r.r#type.clone(),
                    r.amount.clone(),
                    r.currency.clone(),
                    r.category.clone(),
                    r.description.clone(),
                    r.import_id.map(|i| i.to_string()).unwrap_or_default(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &["ID", "Date", "Type", "Amount", "CCY", "Category", "Description", "Import"],
                rows,
            )
        );
    }
    Ok(())
}
