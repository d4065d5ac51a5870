// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::config::Settings;
use crate::ledger::{self, NewAsset};
use crate::models::Asset;
use crate::utils::{fmt_money, maybe_print_json, parse_decimal, pretty_table};
use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;

pub fn handle(conn: &mut Connection, settings: &Settings, m: &clap::ArgMatches) -> Result<()> {
    let actor = settings.actor();
    match m.subcommand() {
        Some(("add", sub)) => {
            let new = NewAsset {
                name: sub.get_one::<String>("name").unwrap().trim().to_string(),
                kind: sub.get_one::<String>("kind").unwrap().trim().to_string(),
                currency: sub.get_one::<String>("currency").unwrap().to_string(),
                initial_amount: parse_decimal(sub.get_one::<String>("initial").unwrap())?,
                family_id: sub.get_one::<String>("family").map(|s| s.trim().to_string()),
            };
            let asset = ledger::create_asset(conn, &actor, &new)
                .with_context(|| format!("Add asset '{}'", new.name))?;
            println!(
                "Added asset '{}' ({}, {})",
                asset.name,
                asset.kind,
                fmt_money(&asset.amount, &asset.currency)
            );
        }
        Some(("list", sub)) => {
            let assets = ledger::list_assets(conn, &actor)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &assets)? {
                let rows = assets.iter().map(asset_row).collect();
                println!(
                    "{}",
                    pretty_table(&["ID", "Name", "Kind", "Currency", "Balance", "Owner"], rows)
                );
            }
        }
        Some(("show", sub)) => {
            let id = resolve(conn, sub.get_one::<String>("name").unwrap())?;
            let asset = ledger::asset_for_actor(conn, id, &actor)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &asset)? {
                println!(
                    "{}",
                    pretty_table(
                        &["ID", "Name", "Kind", "Currency", "Balance", "Owner"],
                        vec![asset_row(&asset)]
                    )
                );
                println!("Opening balance: {}", fmt_money(&asset.initial_amount, &asset.currency));
            }
        }
        Some(("rm", sub)) => {
            let name = sub.get_one::<String>("name").unwrap();
            let id = resolve(conn, name)?;
            ledger::delete_asset(conn, &actor, id)?;
            println!("Removed asset '{}' and its transactions", name.trim());
        }
        Some(("revalue", sub)) => {
            let id = resolve(conn, sub.get_one::<String>("name").unwrap())?;
            let value = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
            let asset = ledger::revalue_asset(conn, &actor, id, value)?;
            println!(
                "Balance of '{}' set to {}",
                asset.name,
                fmt_money(&asset.amount, &asset.currency)
            );
        }
        _ => {}
    }
    Ok(())
}

/// Asset id for a CLI-supplied name.
pub fn resolve(conn: &Connection, name: &str) -> Result<i64> {
    ledger::asset_id_by_name(conn, name.trim())?
        .ok_or_else(|| anyhow!("Asset '{}' not found", name.trim()))
}

fn asset_row(a: &Asset) -> Vec<String> {
    let owner = match (&a.user_id, &a.family_id) {
        (Some(u), _) => format!("user:{}", u),
        (None, Some(f)) => format!("family:{}", f),
        (None, None) => String::new(),
    };
    vec![
        a.id.to_string(),
        a.name.clone(),
        a.kind.clone(),
        a.currency.clone(),
        format!("{:.2}", a.amount.round_dp(2)),
        owner,
    ]
}
