// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::budget;
use crate::commands::fx::rate_cache;
use crate::config::Settings;
use crate::models::BudgetItem;
use crate::rates::Money;
use crate::utils::{fmt_money, maybe_print_json, parse_decimal, pretty_table};
use anyhow::{Result, anyhow};
use rusqlite::Connection;
use serde_json::json;

pub fn handle(conn: &Connection, settings: &Settings, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, settings, sub)?,
        Some(("item", sub)) => item(conn, sub)?,
        Some(("list", _)) => list(conn)?,
        Some(("summary", sub)) => summary(conn, settings, sub)?,
        _ => {}
    }
    Ok(())
}

fn add(conn: &Connection, settings: &Settings, sub: &clap::ArgMatches) -> Result<()> {
    let name = sub.get_one::<String>("name").unwrap();
    let currency = sub
        .get_one::<String>("currency")
        .unwrap_or(&settings.reporting_currency);
    let income = Money {
        amount: parse_decimal(sub.get_one::<String>("income").unwrap())?,
        currency: sub
            .get_one::<String>("income-currency")
            .unwrap_or(currency)
            .clone(),
    };
    let b = budget::create_budget(conn, name, currency, &income)?;
    println!(
        "Budget '{}' in {} with income {}",
        b.name,
        b.currency,
        fmt_money(&b.income, &b.income_currency)
    );
    Ok(())
}

fn item(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let name = sub.get_one::<String>("budget").unwrap();
    let b = budget::find_budget(conn, name)?
        .ok_or_else(|| anyhow!("Budget '{}' not found", name.trim()))?;
    let item = BudgetItem {
        amount: parse_decimal(sub.get_one::<String>("amount").unwrap())?,
        currency: sub.get_one::<String>("currency").unwrap().clone(),
        category: sub.get_one::<String>("category").unwrap().trim().to_string(),
    };
    budget::add_item(conn, b.id, &item)?;
    println!(
        "Added {} / {} to '{}'",
        item.category,
        fmt_money(&item.amount, &item.currency.to_uppercase()),
        b.name
    );
    Ok(())
}

fn list(conn: &Connection) -> Result<()> {
    let rows = budget::list_budgets(conn)?
        .into_iter()
        .map(|b| {
            vec![
                b.id.to_string(),
                b.name,
                b.currency,
                fmt_money(&b.income, &b.income_currency),
            ]
        })
        .collect();
    println!("{}", pretty_table(&["ID", "Name", "Currency", "Income"], rows));
    Ok(())
}

fn summary(conn: &Connection, settings: &Settings, sub: &clap::ArgMatches) -> Result<()> {
    let name = sub.get_one::<String>("name").unwrap();
    let b = budget::find_budget(conn, name)?
        .ok_or_else(|| anyhow!("Budget '{}' not found", name.trim()))?;
    let items = budget::items(conn, b.id)?;
    let income = Money {
        amount: b.income,
        currency: b.income_currency.clone(),
    };
    let cache = rate_cache(conn, settings)?;
    let s = budget::summarize(&cache, &b.currency, &items, &income)?;

    let doc = json!({
        "budget": b.name,
        "items": s.items,
        "totalNative": s.total_native,
        "totalConverted": s.total_converted,
        "totalCurrency": s.total_currency,
        "convertedIncome": s.converted_income,
        "remaining": s.remaining,
    });
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &doc)? {
        return Ok(());
    }
    let rows = s
        .items
        .iter()
        .map(|i| {
            vec![
                i.category.clone(),
                fmt_money(&i.native_amount, &i.native_currency),
                i.exchange_rate.to_string(),
                fmt_money(&i.converted_amount, &s.total_currency),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["Category", "Native", "Rate", "Converted"], rows)
    );
    println!("Total:     {}", fmt_money(&s.total_converted, &s.total_currency));
    println!("Income:    {}", fmt_money(&s.converted_income, &s.total_currency));
    println!("Remaining: {}", fmt_money(&s.remaining, &s.total_currency));
    Ok(())
}
