// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Assets, transactions and the running balance that ties them together.
//!
//! `assets.amount` is a materialised total. It is only ever changed here, by
//! adding a delta derived from a [`BalanceEvent`] (or a revaluation), inside
//! the same SQLite transaction as the row change that caused it. Writes are
//! versioned so that two writers composing deltas on one asset never overwrite
//! each other; a lost race is re-read and re-applied.
//!
//! Every unit of work that reads an asset and then writes it runs under
//! [`write_locked`], which takes SQLite's write lock up front. A writer that
//! finds the database busy re-runs the whole unit instead of dropping it.

use crate::errors::{LedgerError, Result};
use crate::models::{Actor, Asset, NewTransaction, Transaction, TransactionType};
use chrono::NaiveDate;
use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior, params};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_APPLY_ATTEMPTS: usize = 5;

const TX_COLUMNS: &str = "id, asset_id, type, amount, currency, date, category, description, import_history_id, metadata";

const ASSET_COLUMNS: &str = "id, name, kind, currency, initial_amount, amount, version, user_id, family_id, organization_id";

#[derive(Debug, Clone, Copy)]
pub enum BalanceEvent<'a> {
    Create(&'a Transaction),
    Update {
        old: &'a Transaction,
        new: &'a Transaction,
    },
    Delete(&'a Transaction),
}

impl BalanceEvent<'_> {
    fn asset_id(&self) -> Result<i64> {
        match self {
            BalanceEvent::Create(tx) | BalanceEvent::Delete(tx) => Ok(tx.asset_id),
            BalanceEvent::Update { old, new } if old.asset_id == new.asset_id => Ok(new.asset_id),
            BalanceEvent::Update { .. } => Err(LedgerError::Validation(
                "an update event cannot move a transaction between assets".into(),
            )),
        }
    }
}

pub fn signed(r#type: TransactionType, amount: Decimal) -> Decimal {
    r#type.sign() * amount
}

/// Change to the owning asset's balance caused by `event`.
pub fn delta(event: &BalanceEvent) -> Decimal {
    match event {
        BalanceEvent::Create(tx) => signed(tx.r#type, tx.amount),
        BalanceEvent::Update { old, new } => {
            signed(new.r#type, new.amount) - signed(old.r#type, old.amount)
        }
        BalanceEvent::Delete(tx) => -signed(tx.r#type, tx.amount),
    }
}

/// Applies the event's delta to its asset and returns the new balance.
/// Call inside the SQLite transaction that mutates the transaction row.
pub fn apply(conn: &Connection, event: &BalanceEvent) -> Result<Decimal> {
    let asset_id = event.asset_id()?;
    add_to_balance(conn, asset_id, delta(event), false)
}

fn add_to_balance(conn: &Connection, asset_id: i64, delta: Decimal, shift_initial: bool) -> Result<Decimal> {
    for attempt in 1..=MAX_APPLY_ATTEMPTS {
        let (initial_s, amount_s, version): (String, String, i64) = conn
            .query_row(
                "SELECT initial_amount, amount, version FROM assets WHERE id=?1",
                params![asset_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?
            .ok_or(LedgerError::AssetNotFound(asset_id))?;
        let current = stored_decimal("assets.amount", &amount_s)?;
        if delta.is_zero() {
            return Ok(current);
        }
        let next = current + delta;
        let initial = if shift_initial {
            stored_decimal("assets.initial_amount", &initial_s)? + delta
        } else {
            stored_decimal("assets.initial_amount", &initial_s)?
        };
        let changed = conn.execute(
            "UPDATE assets SET amount=?1, initial_amount=?2, version=version+1 WHERE id=?3 AND version=?4",
            params![next.to_string(), initial.to_string(), asset_id, version],
        )?;
        if changed == 1 {
            debug!(asset_id, %delta, balance = %next, "balance updated");
            return Ok(next);
        }
        warn!(asset_id, attempt, "asset balance changed concurrently, re-reading");
    }
    Err(LedgerError::PersistenceConflict(asset_id))
}

fn is_busy(err: &LedgerError) -> bool {
    matches!(
        err,
        LedgerError::Database(rusqlite::Error::SqliteFailure(e, _))
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// Runs `work` inside an IMMEDIATE transaction and commits it. When another
/// connection holds the write lock past the busy timeout, the transaction is
/// rolled back and `work` runs again from its first read.
pub(crate) fn write_locked<T>(
    conn: &mut Connection,
    asset_id: i64,
    mut work: impl FnMut(&Connection) -> Result<T>,
) -> Result<T> {
    for attempt in 1..=MAX_APPLY_ATTEMPTS {
        let outcome = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(LedgerError::from)
            .and_then(|db| {
                let value = work(&*db)?;
                db.commit()?;
                Ok(value)
            });
        match outcome {
            Err(err) if is_busy(&err) => {
                warn!(asset_id, attempt, "database busy, retrying balance update");
                std::thread::sleep(Duration::from_millis(25 * attempt as u64));
            }
            other => return other,
        }
    }
    Err(LedgerError::PersistenceConflict(asset_id))
}

pub(crate) fn stored_decimal(column: &'static str, value: &str) -> Result<Decimal> {
    Decimal::from_str(value.trim()).map_err(|_| LedgerError::Corrupt {
        column,
        value: value.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewAsset {
    pub name: String,
    pub kind: String,
    pub currency: String,
    pub initial_amount: Decimal,
    /// Family-owned when set, otherwise owned by the acting user.
    pub family_id: Option<String>,
}

fn asset_from_row(r: &rusqlite::Row) -> rusqlite::Result<(Asset, String, String)> {
    let initial: String = r.get(4)?;
    let amount: String = r.get(5)?;
    Ok((
        Asset {
            id: r.get(0)?,
            name: r.get(1)?,
            kind: r.get(2)?,
            currency: r.get(3)?,
            initial_amount: Decimal::ZERO,
            amount: Decimal::ZERO,
            version: r.get(6)?,
            user_id: r.get(7)?,
            family_id: r.get(8)?,
            organization_id: r.get(9)?,
        },
        initial,
        amount,
    ))
}

fn finish_asset((mut asset, initial, amount): (Asset, String, String)) -> Result<Asset> {
    asset.initial_amount = stored_decimal("assets.initial_amount", &initial)?;
    asset.amount = stored_decimal("assets.amount", &amount)?;
    Ok(asset)
}

pub fn load_asset(conn: &Connection, id: i64) -> Result<Asset> {
    let raw = conn
        .query_row(
            &format!("SELECT {ASSET_COLUMNS} FROM assets WHERE id=?1"),
            params![id],
            asset_from_row,
        )
        .optional()?
        .ok_or(LedgerError::AssetNotFound(id))?;
    finish_asset(raw)
}

pub fn asset_id_by_name(conn: &Connection, name: &str) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM assets WHERE name=?1",
            params![name],
            |r| r.get(0),
        )
        .optional()?)
}

/// Family membership is resolved outside this crate, so a family-owned asset
/// is open to any actor of its organization.
pub fn authorize(asset: &Asset, actor: &Actor) -> Result<()> {
    let same_org = asset.organization_id == actor.organization_id;
    let owner_ok = match &asset.user_id {
        Some(user) => *user == actor.user_id,
        None => asset.family_id.is_some(),
    };
    if same_org && owner_ok {
        Ok(())
    } else {
        Err(LedgerError::Forbidden(asset.id))
    }
}

pub fn asset_for_actor(conn: &Connection, id: i64, actor: &Actor) -> Result<Asset> {
    let asset = load_asset(conn, id)?;
    authorize(&asset, actor)?;
    Ok(asset)
}

pub fn create_asset(conn: &Connection, actor: &Actor, new: &NewAsset) -> Result<Asset> {
    let currency = new.currency.trim().to_uppercase();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(LedgerError::Validation(format!(
            "Currency '{}' is not an ISO 4217 code",
            new.currency
        )));
    }
    let user_id = match new.family_id {
        Some(_) => None,
        None => Some(actor.user_id.as_str()),
    };
    conn.execute(
        "INSERT INTO assets(name, kind, currency, initial_amount, amount, user_id, family_id, organization_id)
         VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6, ?7)",
        params![
            new.name.trim(),
            new.kind.trim(),
            currency,
            new.initial_amount.to_string(),
            user_id,
            new.family_id.as_deref(),
            actor.organization_id,
        ],
    )?;
    load_asset(conn, conn.last_insert_rowid())
}

pub fn list_assets(conn: &Connection, actor: &Actor) -> Result<Vec<Asset>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ASSET_COLUMNS} FROM assets WHERE organization_id=?1 ORDER BY name"
    ))?;
    let rows = stmt.query_map(params![actor.organization_id], asset_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        let asset = finish_asset(row?)?;
        if authorize(&asset, actor).is_ok() {
            out.push(asset);
        }
    }
    Ok(out)
}

/// Explicit valuation entry: sets the balance to `value`. The opening balance
/// moves by the same amount so the transaction history still adds up.
pub fn revalue_asset(conn: &mut Connection, actor: &Actor, id: i64, value: Decimal) -> Result<Asset> {
    write_locked(conn, id, |db| {
        let asset = asset_for_actor(db, id, actor)?;
        add_to_balance(db, id, value - asset.amount, true)?;
        load_asset(db, id)
    })
}

pub fn delete_asset(conn: &Connection, actor: &Actor, id: i64) -> Result<()> {
    asset_for_actor(conn, id, actor)?;
    conn.execute("DELETE FROM assets WHERE id=?1", params![id])?;
    Ok(())
}

/// Balance recomputed from history; used for verification only.
pub fn recomputed_balance(conn: &Connection, asset_id: i64) -> Result<Decimal> {
    let asset = load_asset(conn, asset_id)?;
    let mut total = asset.initial_amount;
    for tx in list_transactions(conn, Some(asset_id), None)? {
        total += signed(tx.r#type, tx.amount);
    }
    Ok(total)
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

struct StoredTx {
    id: i64,
    asset_id: i64,
    r#type: String,
    amount: String,
    currency: String,
    date: String,
    category: String,
    description: Option<String>,
    import_history_id: Option<i64>,
    metadata: Option<String>,
}

fn stored_tx(r: &rusqlite::Row) -> rusqlite::Result<StoredTx> {
    Ok(StoredTx {
        id: r.get(0)?,
        asset_id: r.get(1)?,
        r#type: r.get(2)?,
        amount: r.get(3)?,
        currency: r.get(4)?,
        date: r.get(5)?,
        category: r.get(6)?,
        description: r.get(7)?,
        import_history_id: r.get(8)?,
        metadata: r.get(9)?,
    })
}

impl StoredTx {
    fn into_transaction(self) -> Result<Transaction> {
        let r#type = TransactionType::from_str(&self.r#type).map_err(|_| LedgerError::Corrupt {
            column: "transactions.type",
            value: self.r#type.clone(),
        })?;
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").map_err(|_| LedgerError::Corrupt {
            column: "transactions.date",
            value: self.date.clone(),
        })?;
        let metadata = match self.metadata {
            Some(s) => Some(serde_json::from_str(&s).map_err(|_| LedgerError::Corrupt {
                column: "transactions.metadata",
                value: s.clone(),
            })?),
            None => None,
        };
        Ok(Transaction {
            id: self.id,
            asset_id: self.asset_id,
            r#type,
            amount: stored_decimal("transactions.amount", &self.amount)?,
            currency: self.currency,
            date,
            category: self.category,
            description: self.description,
            import_history_id: self.import_history_id,
            metadata,
        })
    }
}

fn validate(new: &NewTransaction) -> Result<()> {
    if new.amount.is_sign_negative() && !new.amount.is_zero() {
        return Err(LedgerError::Validation(format!(
            "Amount {} must be non-negative; the type carries the direction",
            new.amount
        )));
    }
    if new.currency.trim().is_empty() {
        return Err(LedgerError::Validation("Currency is required".into()));
    }
    Ok(())
}

/// Inserts the row only. Callers pair this with [`apply`].
pub(crate) fn insert_transaction(conn: &Connection, new: &NewTransaction) -> Result<Transaction> {
    validate(new)?;
    let metadata = new
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| LedgerError::Validation(e.to_string()))?;
    conn.execute(
        "INSERT INTO transactions(asset_id, type, amount, currency, date, category, description, import_history_id, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            new.asset_id,
            new.r#type.as_str(),
            new.amount.normalize().to_string(),
            new.currency.trim().to_uppercase(),
            new.date.to_string(),
            new.category,
            new.description,
            new.import_history_id,
            metadata,
        ],
    )?;
    get_transaction(conn, conn.last_insert_rowid())
}

pub fn get_transaction(conn: &Connection, id: i64) -> Result<Transaction> {
    conn.query_row(
        &format!("SELECT {TX_COLUMNS} FROM transactions WHERE id=?1"),
        params![id],
        stored_tx,
    )
    .optional()?
    .ok_or(LedgerError::TransactionNotFound(id))?
    .into_transaction()
}

pub fn list_transactions(conn: &Connection, asset_id: Option<i64>, limit: Option<usize>) -> Result<Vec<Transaction>> {
    let mut sql = format!("SELECT {TX_COLUMNS} FROM transactions WHERE (?1 IS NULL OR asset_id=?1) ORDER BY date DESC, id DESC");
    if let Some(n) = limit {
        sql.push_str(&format!(" LIMIT {}", n));
    }
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![asset_id], stored_tx)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?.into_transaction()?);
    }
    Ok(out)
}

/// True when the asset already holds a transaction with this date, amount
/// and description.
pub fn is_duplicate(
    conn: &Connection,
    asset_id: i64,
    date: NaiveDate,
    amount: Decimal,
    description: Option<&str>,
) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM transactions WHERE asset_id=?1 AND date=?2 AND amount=?3 AND description IS ?4 LIMIT 1",
            params![asset_id, date.to_string(), amount.normalize().to_string(), description],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn create_transaction(conn: &mut Connection, actor: &Actor, new: &NewTransaction) -> Result<Transaction> {
    write_locked(conn, new.asset_id, |db| {
        asset_for_actor(db, new.asset_id, actor)?;
        let created = insert_transaction(db, new)?;
        apply(db, &BalanceEvent::Create(&created))?;
        Ok(created)
    })
}

/// Fields to change on an existing transaction; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    pub asset_id: Option<i64>,
    pub r#type: Option<TransactionType>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub date: Option<NaiveDate>,
    pub category: Option<String>,
    pub description: Option<Option<String>>,
}

impl TransactionPatch {
    fn applied_to(&self, old: &Transaction) -> Transaction {
        Transaction {
            id: old.id,
            asset_id: self.asset_id.unwrap_or(old.asset_id),
            r#type: self.r#type.unwrap_or(old.r#type),
            amount: self.amount.unwrap_or(old.amount),
            currency: self
                .currency
                .as_ref()
                .map(|c| c.trim().to_uppercase())
                .unwrap_or_else(|| old.currency.clone()),
            date: self.date.unwrap_or(old.date),
            category: self.category.clone().unwrap_or_else(|| old.category.clone()),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| old.description.clone()),
            import_history_id: old.import_history_id,
            metadata: old.metadata.clone(),
        }
    }
}

pub fn update_transaction(
    conn: &mut Connection,
    actor: &Actor,
    id: i64,
    patch: &TransactionPatch,
) -> Result<Transaction> {
    let asset_id = get_transaction(conn, id)?.asset_id;
    write_locked(conn, asset_id, |db| {
        let old = get_transaction(db, id)?;
        asset_for_actor(db, old.asset_id, actor)?;
        let new = patch.applied_to(&old);
        if new.asset_id != old.asset_id {
            asset_for_actor(db, new.asset_id, actor)?;
        }
        validate(&NewTransaction {
            asset_id: new.asset_id,
            r#type: new.r#type,
            amount: new.amount,
            currency: new.currency.clone(),
            date: new.date,
            category: new.category.clone(),
            description: new.description.clone(),
            import_history_id: new.import_history_id,
            metadata: None,
        })?;
        db.execute(
            "UPDATE transactions SET asset_id=?1, type=?2, amount=?3, currency=?4, date=?5, category=?6, description=?7 WHERE id=?8",
            params![
                new.asset_id,
                new.r#type.as_str(),
                new.amount.normalize().to_string(),
                new.currency,
                new.date.to_string(),
                new.category,
                new.description,
                id,
            ],
        )?;
        if new.asset_id == old.asset_id {
            apply(db, &BalanceEvent::Update { old: &old, new: &new })?;
        } else {
            apply(db, &BalanceEvent::Delete(&old))?;
            apply(db, &BalanceEvent::Create(&new))?;
        }
        get_transaction(db, id)
    })
}

pub fn delete_transaction(conn: &mut Connection, actor: &Actor, id: i64) -> Result<Transaction> {
    let asset_id = get_transaction(conn, id)?.asset_id;
    write_locked(conn, asset_id, |db| {
        let old = get_transaction(db, id)?;
        asset_for_actor(db, old.asset_id, actor)?;
        db.execute("DELETE FROM transactions WHERE id=?1", params![id])?;
        apply(db, &BalanceEvent::Delete(&old))?;
        Ok(old)
    })
}
