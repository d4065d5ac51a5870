// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Statement import: preview an upload, then commit it into an asset.
//!
//! A commit is recorded in `import_history`. The record is created as
//! `processing` before any row is read and is finalised exactly once, as
//! `completed` when every row was consumed or `failed` when the job itself
//! could not proceed. Rejected rows are data: they are itemised on the record
//! and the batch moves on. Each accepted row is written together with its
//! balance delta in its own SQLite transaction.

use crate::errors::{LedgerError, Result, RowRejection, SourceError};
use crate::ledger::{self, BalanceEvent};
use crate::mapping::{ColumnMapping, SuggestedMapping, map_row, suggest};
use crate::models::{Actor, Asset, ImportHistory, ImportStatus, NewTransaction, RowError};
use crate::tabular::{self, RawRow, SourceKind};
use crate::utils::apply_import_rules;
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use tracing::{debug, info, warn};

pub const PREVIEW_ROWS: usize = 10;
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

/// An uploaded statement file.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Upload {
            file_name: file_name.into(),
            mime: None,
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("Read {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        Ok(Upload::new(file_name, bytes))
    }

    pub fn kind(&self) -> std::result::Result<SourceKind, SourceError> {
        SourceKind::sniff(&self.file_name, self.mime.as_deref())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPreview {
    pub file_name: String,
    pub file_type: String,
    pub headers: Vec<String>,
    pub preview: Vec<RawRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheets: Option<Vec<String>>,
    pub suggested_mapping: SuggestedMapping,
}

pub fn preview(
    file: &Upload,
    sheet: Option<&str>,
    limit: usize,
) -> std::result::Result<ImportPreview, SourceError> {
    let source = tabular::open(file.kind()?);
    let kind = source.kind();
    let sections = source.sections(&file.bytes)?;
    let headers = source.headers(&file.bytes, sheet)?;
    let rows = source.preview(&file.bytes, limit, sheet)?;
    Ok(ImportPreview {
        file_name: file.file_name.clone(),
        file_type: kind.as_str().to_string(),
        suggested_mapping: suggest(&headers),
        headers,
        preview: rows,
        sheets: (kind == SourceKind::Workbook).then_some(sections),
    })
}

/// Body of a commit request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub asset_id: i64,
    pub column_mapping: ColumnMapping,
    #[serde(default)]
    pub date_format: Option<String>,
    #[serde(default)]
    pub skip_duplicates: bool,
    #[serde(default)]
    pub sheet_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub import_id: i64,
    pub total_rows: usize,
    pub successful_rows: usize,
    pub failed_rows: usize,
    pub skipped_rows: usize,
    pub errors: Vec<RowError>,
}

impl ImportResult {
    fn reject(&mut self, row: usize, reason: RowRejection, raw: Option<&RawRow>) {
        debug!(row, %reason, "row rejected");
        self.failed_rows += 1;
        self.errors.push(RowError {
            row,
            error: reason.to_string(),
            data: raw.map(RawRow::to_json),
        });
    }
}

pub fn commit(
    conn: &mut Connection,
    actor: &Actor,
    file: &Upload,
    request: &CommitRequest,
) -> Result<ImportResult> {
    let history_id = start_history(conn, request.asset_id, &actor.user_id, &file.file_name)?;
    info!(history_id, asset_id = request.asset_id, file = %file.file_name, "import started");
    let mut tally = ImportResult {
        import_id: history_id,
        ..ImportResult::default()
    };

    match run(conn, actor, history_id, file, request, &mut tally) {
        Ok(()) => {
            finish_history(conn, history_id, ImportStatus::Completed, &tally)?;
            info!(
                history_id,
                total = tally.total_rows,
                ok = tally.successful_rows,
                failed = tally.failed_rows,
                skipped = tally.skipped_rows,
                "import completed"
            );
            Ok(tally)
        }
        Err(cause) => {
            warn!(history_id, error = %cause, "import failed");
            tally.errors.push(RowError {
                row: 0,
                error: cause.to_string(),
                data: None,
            });
            finish_history(conn, history_id, ImportStatus::Failed, &tally)?;
            Err(LedgerError::ImportFailed {
                history_id,
                cause: Box::new(cause),
            })
        }
    }
}

fn run(
    conn: &mut Connection,
    actor: &Actor,
    history_id: i64,
    file: &Upload,
    request: &CommitRequest,
    tally: &mut ImportResult,
) -> Result<()> {
    let asset = ledger::asset_for_actor(conn, request.asset_id, actor)?;
    let source = tabular::open(file.kind()?);
    let sheet = request.sheet_name.as_deref();
    let headers = source.headers(&file.bytes, sheet)?;
    let missing = request.column_mapping.missing_from(&headers);
    if !missing.is_empty() {
        return Err(LedgerError::Validation(format!(
            "Mapped column(s) not found in file: {}",
            missing.join(", ")
        )));
    }
    let date_format = request.date_format.as_deref();

    for (i, item) in source.rows(&file.bytes, sheet)?.enumerate() {
        let row = i + 1;
        tally.total_rows += 1;
        let raw = match item {
            Ok(raw) => raw,
            Err(e) => {
                tally.reject(row, RowRejection::Unreadable(e.to_string()), None);
                continue;
            }
        };
        match import_row(conn, &asset, history_id, row, &raw, request, date_format)? {
            RowOutcome::Imported => tally.successful_rows += 1,
            RowOutcome::Duplicate => {
                debug!(row, "duplicate skipped");
                tally.skipped_rows += 1;
            }
            RowOutcome::Rejected(reason) => tally.reject(row, reason, Some(&raw)),
        }
    }
    Ok(())
}

/// What happened to one data row. Only `Err` from [`import_row`] stops the job.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Imported,
    Duplicate,
    Rejected(RowRejection),
}

fn import_row(
    conn: &mut Connection,
    asset: &Asset,
    history_id: i64,
    row: usize,
    raw: &RawRow,
    request: &CommitRequest,
    date_format: Option<&str>,
) -> Result<RowOutcome> {
    let norm = match map_row(raw, &request.column_mapping, date_format) {
        Ok(norm) => norm,
        Err(reason) => return Ok(RowOutcome::Rejected(reason)),
    };
    if let Some(currency) = &norm.currency {
        if !currency.eq_ignore_ascii_case(&asset.currency) {
            return Ok(RowOutcome::Rejected(RowRejection::CurrencyMismatch {
                row: currency.clone(),
                asset: asset.currency.clone(),
            }));
        }
    }
    if request.skip_duplicates
        && ledger::is_duplicate(conn, asset.id, norm.date, norm.amount, Some(&norm.description))?
    {
        return Ok(RowOutcome::Duplicate);
    }
    let category = match norm.category {
        Some(c) => c,
        None => apply_import_rules(conn, &norm.description)?
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
    };
    let new = NewTransaction {
        asset_id: asset.id,
        r#type: norm.r#type,
        amount: norm.amount,
        currency: asset.currency.clone(),
        date: norm.date,
        category,
        description: Some(norm.description),
        import_history_id: Some(history_id),
        metadata: Some(json!({ "source": "import", "row": row, "raw": raw })),
    };
    ledger::write_locked(conn, asset.id, |db| {
        let created = ledger::insert_transaction(db, &new)?;
        ledger::apply(db, &BalanceEvent::Create(&created))
    })?;
    Ok(RowOutcome::Imported)
}

fn start_history(conn: &Connection, asset_id: i64, user_id: &str, file_name: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO import_history(asset_id, user_id, file_name, status) VALUES (?1, ?2, ?3, 'processing')",
        params![asset_id, user_id, file_name],
    )?;
    Ok(conn.last_insert_rowid())
}

fn finish_history(conn: &Connection, id: i64, status: ImportStatus, tally: &ImportResult) -> Result<()> {
    let errors = serde_json::to_string(&tally.errors).map_err(|e| LedgerError::Validation(e.to_string()))?;
    let changed = conn.execute(
        "UPDATE import_history
            SET status=?1, total_rows=?2, successful_rows=?3, failed_rows=?4, skipped_rows=?5,
                errors=?6, completed_at=datetime('now')
          WHERE id=?7 AND status='processing'",
        params![
            status.as_str(),
            tally.total_rows as i64,
            tally.successful_rows as i64,
            tally.failed_rows as i64,
            tally.skipped_rows as i64,
            errors,
            id,
        ],
    )?;
    if changed != 1 {
        return Err(LedgerError::Validation(format!(
            "Import {} was already finalised",
            id
        )));
    }
    Ok(())
}

const HISTORY_COLUMNS: &str = "id, asset_id, user_id, file_name, status, total_rows, successful_rows, failed_rows, skipped_rows, errors, started_at, completed_at";

type HistoryRow = (
    i64,
    i64,
    String,
    String,
    String,
    i64,
    i64,
    i64,
    i64,
    String,
    String,
    Option<String>,
);

fn history_row(r: &rusqlite::Row) -> rusqlite::Result<HistoryRow> {
    Ok((
        r.get(0)?,
        r.get(1)?,
        r.get(2)?,
        r.get(3)?,
        r.get(4)?,
        r.get(5)?,
        r.get(6)?,
        r.get(7)?,
        r.get(8)?,
        r.get(9)?,
        r.get(10)?,
        r.get(11)?,
    ))
}

fn into_history(row: HistoryRow) -> Result<ImportHistory> {
    let (id, asset_id, user_id, file_name, status, total, ok, failed, skipped, errors, started_at, completed_at) = row;
    let status = status.parse::<ImportStatus>().map_err(|_| LedgerError::Corrupt {
        column: "import_history.status",
        value: status.clone(),
    })?;
    let errors: Vec<RowError> = serde_json::from_str(&errors).map_err(|_| LedgerError::Corrupt {
        column: "import_history.errors",
        value: errors.clone(),
    })?;
    Ok(ImportHistory {
        id,
        asset_id,
        user_id,
        file_name,
        status,
        total_rows: total as usize,
        successful_rows: ok as usize,
        failed_rows: failed as usize,
        skipped_rows: skipped as usize,
        errors,
        started_at,
        completed_at,
    })
}

pub fn get_history(conn: &Connection, id: i64) -> Result<Option<ImportHistory>> {
    conn.query_row(
        &format!("SELECT {HISTORY_COLUMNS} FROM import_history WHERE id=?1"),
        params![id],
        history_row,
    )
    .optional()?
    .map(into_history)
    .transpose()
}

pub fn list_history(conn: &Connection, asset_id: Option<i64>, limit: usize) -> Result<Vec<ImportHistory>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {HISTORY_COLUMNS} FROM import_history WHERE (?1 IS NULL OR asset_id=?1) ORDER BY id DESC LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![asset_id, limit as i64], history_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(into_history(row?)?);
    }
    Ok(out)
}
