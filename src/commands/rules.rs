// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::utils::pretty_table;
use anyhow::{Result, anyhow};
use regex::Regex;
use rusqlite::{Connection, params};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let pattern = sub.get_one::<String>("pattern").unwrap().trim();
            Regex::new(pattern)
                .map_err(|err| anyhow!("Invalid regex pattern '{}': {}", pattern, err))?;
            let category = sub.get_one::<String>("category").unwrap().trim();
            if category.is_empty() {
                return Err(anyhow!("Rule category must not be empty"));
            }
            conn.execute(
                "INSERT INTO rules(pattern, category) VALUES (?1,?2)",
                params![pattern, category],
            )?;
            println!("Added rule: /{}/ -> {}", pattern, category);
        }
        Some(("list", _)) => {
            let mut stmt =
                conn.prepare("SELECT id, pattern, category, created_at FROM rules ORDER BY id DESC")?;
            let rows = stmt.query_map([], |r| {
                Ok(vec![
                    r.get::<_, i64>(0)?.to_string(),
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ])
            })?;
            let data = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            println!(
                "{}",
                pretty_table(&["ID", "Pattern", "Category", "Created"], data)
            );
        }
        Some(("rm", sub)) => {
            let raw = sub.get_one::<String>("id").unwrap();
            let id = raw.trim().parse::<i64>()?;
            let n = conn.execute("DELETE FROM rules WHERE id=?1", params![id])?;
            if n == 0 {
                return Err(anyhow!("Rule {} not found", id));
            }
            println!("Removed rule {}", id);
        }
        _ => {}
    }
    Ok(())
}
