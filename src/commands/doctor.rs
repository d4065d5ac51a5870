// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::ledger::{load_asset, recomputed_balance};
use crate::utils::pretty_table;
use anyhow::Result;
use rusqlite::Connection;

/// (issue, detail) pairs; empty when the database is consistent.
pub fn findings(conn: &Connection) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();

    // 1) Stored balance must equal opening balance plus signed transactions
    let mut stmt = conn.prepare("SELECT id FROM assets ORDER BY id")?;
    let ids = stmt
        .query_map([], |r| r.get::<_, i64>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for id in ids {
        let asset = load_asset(conn, id)?;
        let expected = recomputed_balance(conn, id)?;
        if expected != asset.amount {
            rows.push(vec![
                "balance_drift".into(),
                format!("{}: stored {} expected {}", asset.name, asset.amount, expected),
            ]);
        }
    }

    // 2) Imports that never reached a terminal state
    let mut stmt2 = conn.prepare(
        "SELECT id, file_name, started_at FROM import_history WHERE status='processing' ORDER BY id",
    )?;
    let mut cur = stmt2.query([])?;
    while let Some(r) = cur.next()? {
        let id: i64 = r.get(0)?;
        let file: String = r.get(1)?;
        let started: String = r.get(2)?;
        rows.push(vec![
            "import_stuck".into(),
            format!("#{} {} (started {})", id, file, started),
        ]);
    }

    // 3) Transactions whose currency differs from their asset
    let mut stmt3 = conn.prepare(
        "SELECT t.id, t.currency, a.name, a.currency FROM transactions t
         JOIN assets a ON a.id=t.asset_id
         WHERE upper(t.currency) != upper(a.currency) ORDER BY t.id",
    )?;
    let mut cur3 = stmt3.query([])?;
    while let Some(r) = cur3.next()? {
        let id: i64 = r.get(0)?;
        let ccy: String = r.get(1)?;
        let asset: String = r.get(2)?;
        let asset_ccy: String = r.get(3)?;
        rows.push(vec![
            "currency_mismatch".into(),
            format!("tx {} in {} on '{}' ({})", id, ccy, asset, asset_ccy),
        ]);
    }
    Ok(rows)
}

pub fn handle(conn: &Connection) -> Result<()> {
    let rows = findings(conn)?;
    if rows.is_empty() {
        println!("doctor: no issues found");
    } else {
        println!("{}", pretty_table(&["Issue", "Detail"], rows));
    }
    Ok(())
}
