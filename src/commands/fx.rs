// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::config::Settings;
use crate::rates::{HttpRateProvider, RateCache, SqliteRateStore};
use crate::utils::{maybe_print_json, parse_decimal, pretty_table};
use anyhow::Result;
use chrono::{Duration, Utc};
use rusqlite::Connection;

pub type CliRates<'c> = RateCache<SqliteRateStore<'c>, HttpRateProvider>;

/// Rate cache backed by the database and the configured provider.
pub fn rate_cache<'c>(conn: &'c Connection, settings: &Settings) -> Result<CliRates<'c>> {
    let provider = HttpRateProvider::new(&settings.rates_url, settings.rates_timeout())?;
    Ok(RateCache::new(SqliteRateStore::new(conn), provider))
}

pub fn handle(conn: &Connection, settings: &Settings, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("rates", sub)) => {
            let base = sub.get_one::<String>("base").unwrap().trim().to_uppercase();
            let table = rate_cache(conn, settings)?.rates(&base)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &table)? {
                let rows = table
                    .iter()
                    .map(|(ccy, rate)| vec![ccy.clone(), rate.to_string()])
                    .collect();
                let per = format!("Per 1 {}", base);
                println!("{}", pretty_table(&["Currency", per.as_str()], rows));
            }
        }
        Some(("convert", sub)) => {
            let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
            let from = sub.get_one::<String>("from").unwrap().trim().to_uppercase();
            let to = sub
                .get_one::<String>("to")
                .unwrap_or(&settings.reporting_currency)
                .trim()
                .to_uppercase();
            let out = rate_cache(conn, settings)?.convert(amount, &from, &to)?;
            println!("{} {} -> {:.4} {}", amount, from, out, to);
        }
        Some(("cached", sub)) => {
            let base = sub.get_one::<String>("base").map(|b| b.trim().to_uppercase());
            let entries = SqliteRateStore::new(conn).list(base.as_deref())?;
            let now = Utc::now();
            let rows = entries
                .iter()
                .map(|e| {
                    vec![
                        e.key(),
                        e.rates.len().to_string(),
                        e.fetched_at.format("%Y-%m-%d %H:%M").to_string(),
                        if e.expires_at > now { "fresh" } else { "stale" }.to_string(),
                    ]
                })
                .collect();
            println!(
                "{}",
                pretty_table(&["Key", "Currencies", "Fetched (UTC)", "State"], rows)
            );
        }
        Some(("purge", sub)) => {
            let keep = *sub.get_one::<u32>("keep-days").unwrap_or(&7);
            let cutoff = Utc::now().date_naive() - Duration::days(i64::from(keep));
            let removed = SqliteRateStore::new(conn).purge_before(cutoff)?;
            println!("Removed {} cached rate tables older than {}", removed, cutoff);
        }
        _ => {}
    }
    Ok(())
}
