// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::assets::resolve;
use crate::config::Settings;
use crate::mapping::ColumnMapping;
use crate::models::ImportHistory;
use crate::pipeline::{self, CommitRequest, ImportResult, Upload};
use crate::utils::{maybe_print_json, pretty_table};
use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;
use std::path::Path;

pub fn handle(conn: &mut Connection, settings: &Settings, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("preview", sub)) => preview(sub),
        Some(("commit", sub)) => commit(conn, settings, sub),
        Some(("history", sub)) => history(conn, sub),
        Some(("show", sub)) => show(conn, sub),
        _ => Ok(()),
    }
}

fn upload(sub: &clap::ArgMatches) -> Result<Upload> {
    let path = sub.get_one::<String>("path").unwrap().trim();
    Upload::from_path(Path::new(path))
}

fn preview(sub: &clap::ArgMatches) -> Result<()> {
    let file = upload(sub)?;
    let limit = *sub.get_one::<usize>("limit").unwrap_or(&pipeline::PREVIEW_ROWS);
    let sheet = sub.get_one::<String>("sheet").map(|s| s.as_str());
    let p = pipeline::preview(&file, sheet, limit)
        .with_context(|| format!("Preview {}", file.file_name))?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &p)? {
        return Ok(());
    }
    println!("{} ({})", p.file_name, p.file_type);
    if let Some(sheets) = &p.sheets {
        println!("Sheets: {}", sheets.join(", "));
    }
    let headers: Vec<&str> = p.headers.iter().map(|h| h.as_str()).collect();
    let rows = p
        .preview
        .iter()
        .map(|r| r.iter().map(|(_, v)| v.to_string()).collect())
        .collect();
    println!("{}", pretty_table(&headers, rows));
    let s = &p.suggested_mapping;
    let fields = [
        ("date", &s.date),
        ("description", &s.description),
        ("amount", &s.amount),
        ("currency", &s.currency),
        ("category", &s.category),
        ("type", &s.r#type),
    ];
    let rows = fields
        .iter()
        .map(|(f, v)| vec![f.to_string(), v.as_deref().unwrap_or_default().to_string()])
        .collect();
    println!("Suggested mapping (confirm before committing):");
    println!("{}", pretty_table(&["Field", "Column"], rows));
    Ok(())
}

fn request_from_args(conn: &Connection, sub: &clap::ArgMatches) -> Result<CommitRequest> {
    if let Some(path) = sub.get_one::<String>("request") {
        let body = std::fs::read_to_string(path.trim())
            .with_context(|| format!("Read request {}", path.trim()))?;
        return serde_json::from_str(&body).with_context(|| format!("Parse request {}", path.trim()));
    }
    let need = |name: &str| -> Result<String> {
        sub.get_one::<String>(name)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("--{} is required unless --request is given", name))
    };
    let optional = |name: &str| sub.get_one::<String>(name).map(|s| s.trim().to_string());
    Ok(CommitRequest {
        asset_id: resolve(conn, &need("asset")?)?,
        column_mapping: ColumnMapping {
            date: need("date-col")?,
            description: need("description-col")?,
            amount: need("amount-col")?,
            currency: optional("currency-col"),
            category: optional("category-col"),
            r#type: optional("type-col"),
        },
        date_format: optional("date-format"),
        skip_duplicates: sub.get_flag("skip-duplicates"),
        sheet_name: optional("sheet"),
    })
}

fn commit(conn: &mut Connection, settings: &Settings, sub: &clap::ArgMatches) -> Result<()> {
    let file = upload(sub)?;
    let request = request_from_args(conn, sub)?;
    let result = pipeline::commit(conn, &settings.actor(), &file, &request)
        .with_context(|| format!("Import {}", file.file_name))?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &result)? {
        print_result(&result);
    }
    Ok(())
}

fn print_result(r: &ImportResult) {
    println!(
        "Import #{}: {} rows, {} imported, {} failed, {} duplicates skipped",
        r.import_id, r.total_rows, r.successful_rows, r.failed_rows, r.skipped_rows
    );
    if !r.errors.is_empty() {
        let rows = r
            .errors
            .iter()
            .map(|e| vec![e.row.to_string(), e.error.clone()])
            .collect();
        println!("{}", pretty_table(&["Row", "Error"], rows));
    }
}

fn history_row(h: &ImportHistory) -> Vec<String> {
    vec![
        h.id.to_string(),
        h.asset_id.to_string(),
        h.file_name.clone(),
        h.status.as_str().to_string(),
        h.total_rows.to_string(),
        h.successful_rows.to_string(),
        h.failed_rows.to_string(),
        h.skipped_rows.to_string(),
        h.started_at.clone(),
    ]
}

const HISTORY_HEADERS: [&str; 9] = [
    "ID", "Asset", "File", "Status", "Rows", "OK", "Failed", "Skipped", "Started",
];

fn history(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let asset_id = sub
        .get_one::<String>("asset")
        .map(|n| resolve(conn, n))
        .transpose()?;
    let limit = *sub.get_one::<usize>("limit").unwrap_or(&20);
    let items = pipeline::list_history(conn, asset_id, limit)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &items)? {
        let rows = items.iter().map(history_row).collect();
        println!("{}", pretty_table(&HISTORY_HEADERS, rows));
    }
    Ok(())
}

fn show(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let id = *sub.get_one::<i64>("id").unwrap();
    let h = pipeline::get_history(conn, id)?.ok_or_else(|| anyhow!("Import {} not found", id))?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &h)? {
        return Ok(());
    }
    println!("{}", pretty_table(&HISTORY_HEADERS, vec![history_row(&h)]));
    if !h.errors.is_empty() {
        let rows = h
            .errors
            .iter()
            .map(|e| {
                vec![
                    e.row.to_string(),
                    e.error.clone(),
                    e.data.as_ref().map(|d| d.to_string()).unwrap_or_default(),
                ]
            })
            .collect();
        println!("{}", pretty_table(&["Row", "Error", "Data"], rows));
    }
    Ok(())
}
