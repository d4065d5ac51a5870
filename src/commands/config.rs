// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::config::{Settings, set_setting};
use crate::utils::pretty_table;
use anyhow::Result;
use rusqlite::Connection;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("set", sub)) => {
            let key = sub.get_one::<String>("key").unwrap().trim();
            let value = sub.get_one::<String>("value").unwrap().trim();
            set_setting(conn, key, value)?;
            println!("{} = {}", key, value);
        }
        _ => {
            let s = Settings::load(conn)?;
            let rows = vec![
                vec!["reporting_currency".into(), s.reporting_currency.clone()],
                vec!["rates_url".into(), s.rates_url.clone()],
                vec!["rates_timeout_secs".into(), s.rates_timeout_secs.to_string()],
                vec!["user_id".into(), s.user_id.clone()],
                vec!["organization_id".into(), s.organization_id.clone()],
            ];
            println!("{}", pretty_table(&["Key", "Value"], rows));
        }
    }
    Ok(())
}
