// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use fintally::errors::{LedgerError, SourceError};
use fintally::ledger::{self, NewAsset};
use fintally::mapping::ColumnMapping;
use fintally::models::{Actor, ImportStatus, TransactionType};
use fintally::pipeline::{self, CommitRequest, Upload};
use fintally::{cli, commands::importer, config::Settings, db};
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::io::Write;

fn actor() -> Actor {
    Actor {
        user_id: "u1".into(),
        organization_id: "org".into(),
    }
}

fn setup() -> (Connection, i64) {
    let conn = Connection::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    let asset = ledger::create_asset(
        &conn,
        &actor(),
        &NewAsset {
            name: "Everyday".into(),
            kind: "bank".into(),
            currency: "AUD".into(),
            initial_amount: Decimal::new(1000, 0),
            family_id: None,
        },
    )
    .unwrap();
    (conn, asset.id)
}

fn request(asset_id: i64) -> CommitRequest {
    CommitRequest {
        asset_id,
        column_mapping: ColumnMapping {
            date: "Date".into(),
            description: "Description".into(),
            amount: "Amount".into(),
            currency: None,
            category: None,
            r#type: None,
        },
        date_format: None,
        skip_duplicates: false,
        sheet_name: None,
    }
}

fn balance(conn: &Connection, id: i64) -> Decimal {
    ledger::load_asset(conn, id).unwrap().amount
}

const THREE_ROWS: &str = "Date,Description,Amount\n\
2025-01-05,Salary,1500.00\n\
2025-01-06,Coffee,-4.50\n\
2025-01-07,Rent,-800\n";

#[test]
fn preview_suggests_mapping_and_bounds_rows() {
    let upload = Upload::new("statement.csv", THREE_ROWS.as_bytes().to_vec());
    let p = pipeline::preview(&upload, None, 2).unwrap();
    assert_eq!(p.file_type, "csv");
    assert_eq!(p.headers, vec!["Date", "Description", "Amount"]);
    assert_eq!(p.preview.len(), 2);
    assert_eq!(p.preview[1].get("Description"), Some("Coffee"));
    assert_eq!(p.sheets, None);
    assert_eq!(p.suggested_mapping.date.as_deref(), Some("Date"));
    assert_eq!(p.suggested_mapping.description.as_deref(), Some("Description"));
    assert_eq!(p.suggested_mapping.amount.as_deref(), Some("Amount"));
    assert_eq!(p.suggested_mapping.currency, None);
}

#[test]
fn preview_rejects_unknown_file_types() {
    let upload = Upload::new("statement.pdf", b"%PDF-1.4".to_vec());
    let err = pipeline::preview(&upload, None, 10).unwrap_err();
    assert!(matches!(err, SourceError::Unsupported(_)));
}

#[test]
fn commit_imports_rows_and_moves_balance() {
    let (mut conn, id) = setup();
    let upload = Upload::new("jan.csv", THREE_ROWS.as_bytes().to_vec());
    let res = pipeline::commit(&mut conn, &actor(), &upload, &request(id)).unwrap();
    assert_eq!(res.total_rows, 3);
    assert_eq!(res.successful_rows, 3);
    assert_eq!(res.failed_rows, 0);
    assert!(res.errors.is_empty());
    assert_eq!(balance(&conn, id), Decimal::new(16955, 1));

    let txs = ledger::list_transactions(&conn, Some(id), None).unwrap();
    assert_eq!(txs.len(), 3);
    let coffee = txs.iter().find(|t| t.description.as_deref() == Some("Coffee")).unwrap();
    assert_eq!(coffee.r#type, TransactionType::Expense);
    assert_eq!(coffee.amount, Decimal::new(45, 1));
    assert_eq!(coffee.currency, "AUD");
    assert_eq!(coffee.category, pipeline::DEFAULT_CATEGORY);
    assert_eq!(coffee.import_history_id, Some(res.import_id));
    let meta = coffee.metadata.as_ref().unwrap();
    assert_eq!(meta["source"], "import");
    assert_eq!(meta["row"], 2);
    assert_eq!(meta["raw"]["Amount"], "-4.50");

    let h = pipeline::get_history(&conn, res.import_id).unwrap().unwrap();
    assert_eq!(h.status, ImportStatus::Completed);
    assert_eq!(h.total_rows, 3);
    assert_eq!(h.successful_rows, 3);
    assert_eq!(h.file_name, "jan.csv");
    assert!(h.completed_at.is_some());
}

#[test]
fn bad_rows_are_itemised_and_the_rest_commit() {
    let (mut conn, id) = setup();
    let csv = "Date,Description,Amount\n\
2025-02-01,Lunch,-12.00\n\
not a date,Broken,-3.00\n\
2025-02-03,Refund,abc\n\
2025-02-04,,-9.00\n\
2025-02-05,Bonus,250\n";
    let upload = Upload::new("feb.csv", csv.as_bytes().to_vec());
    let res = pipeline::commit(&mut conn, &actor(), &upload, &request(id)).unwrap();
    assert_eq!(res.total_rows, 5);
    assert_eq!(res.successful_rows, 2);
    assert_eq!(res.failed_rows, 3);
    assert_eq!(
        res.successful_rows + res.failed_rows + res.skipped_rows,
        res.total_rows
    );
    let rows: Vec<usize> = res.errors.iter().map(|e| e.row).collect();
    assert_eq!(rows, vec![2, 3, 4]);
    assert_eq!(res.errors[0].error, "Invalid date 'not a date'");
    assert_eq!(res.errors[1].error, "Invalid amount 'abc'");
    assert_eq!(res.errors[2].error, "Missing required field 'description'");
    assert_eq!(res.errors[0].data.as_ref().unwrap()["Description"], "Broken");
    assert_eq!(balance(&conn, id), Decimal::new(1238, 0));

    let h = pipeline::get_history(&conn, res.import_id).unwrap().unwrap();
    assert_eq!(h.status, ImportStatus::Completed);
    assert_eq!(h.failed_rows, 3);
    assert_eq!(h.errors, res.errors);
}

#[test]
fn skip_duplicates_on_reimport() {
    let (mut conn, id) = setup();
    let upload = Upload::new("jan.csv", THREE_ROWS.as_bytes().to_vec());
    let mut req = request(id);
    req.skip_duplicates = true;
    pipeline::commit(&mut conn, &actor(), &upload, &req).unwrap();
    let after_first = balance(&conn, id);

    let again = pipeline::commit(&mut conn, &actor(), &upload, &req).unwrap();
    assert_eq!(again.total_rows, 3);
    assert_eq!(again.successful_rows, 0);
    assert_eq!(again.skipped_rows, 3);
    assert_eq!(balance(&conn, id), after_first);

    // without the flag the same rows land twice
    pipeline::commit(&mut conn, &actor(), &upload, &request(id)).unwrap();
    assert_eq!(ledger::list_transactions(&conn, Some(id), None).unwrap().len(), 6);
}

#[test]
fn missing_asset_fails_the_job_and_records_it() {
    let (mut conn, _) = setup();
    let upload = Upload::new("jan.csv", THREE_ROWS.as_bytes().to_vec());
    let err = pipeline::commit(&mut conn, &actor(), &upload, &request(999)).unwrap_err();
    let LedgerError::ImportFailed { history_id, cause } = err else {
        panic!("expected ImportFailed");
    };
    assert!(matches!(*cause, LedgerError::AssetNotFound(999)));
    let h = pipeline::get_history(&conn, history_id).unwrap().unwrap();
    assert_eq!(h.status, ImportStatus::Failed);
    assert_eq!(h.errors.len(), 1);
    assert_eq!(h.errors[0].row, 0);
    assert!(ledger::list_transactions(&conn, None, None).unwrap().is_empty());
}

#[test]
fn foreign_actor_cannot_import() {
    let (mut conn, id) = setup();
    let stranger = Actor {
        user_id: "u2".into(),
        organization_id: "org".into(),
    };
    let upload = Upload::new("jan.csv", THREE_ROWS.as_bytes().to_vec());
    let err = pipeline::commit(&mut conn, &stranger, &upload, &request(id)).unwrap_err();
    assert!(matches!(err, LedgerError::ImportFailed { ref cause, .. } if matches!(**cause, LedgerError::Forbidden(_))));
    assert_eq!(balance(&conn, id), Decimal::new(1000, 0));
}

#[test]
fn unmapped_header_fails_before_any_row() {
    let (mut conn, id) = setup();
    let mut req = request(id);
    req.column_mapping.amount = "Value".into();
    let upload = Upload::new("jan.csv", THREE_ROWS.as_bytes().to_vec());
    let err = pipeline::commit(&mut conn, &actor(), &upload, &req).unwrap_err();
    let LedgerError::ImportFailed { history_id, cause } = err else {
        panic!("expected ImportFailed");
    };
    assert!(matches!(*cause, LedgerError::Validation(_)));
    let h = pipeline::get_history(&conn, history_id).unwrap().unwrap();
    assert_eq!(h.status, ImportStatus::Failed);
    assert_eq!(h.total_rows, 0);
}

#[test]
fn rows_in_another_currency_are_rejected() {
    let (mut conn, id) = setup();
    let csv = "Date,Description,Amount,Currency\n\
2025-03-01,Groceries,-50,aud\n\
2025-03-02,Hotel,-120,USD\n";
    let mut req = request(id);
    req.column_mapping.currency = Some("Currency".into());
    let upload = Upload::new("mar.csv", csv.as_bytes().to_vec());
    let res = pipeline::commit(&mut conn, &actor(), &upload, &req).unwrap();
    assert_eq!(res.successful_rows, 1);
    assert_eq!(res.failed_rows, 1);
    assert_eq!(res.errors[0].row, 2);
    assert_eq!(
        res.errors[0].error,
        "Currency 'USD' does not match asset currency 'AUD'"
    );
    assert_eq!(balance(&conn, id), Decimal::new(950, 0));
}

#[test]
fn type_column_and_date_format_are_honoured() {
    let (mut conn, id) = setup();
    let csv = "Posted;Details;Value;Dr/Cr;Category\n\
03/04/2025;Payroll;2,000.00;CR;\n\
04/04/2025;Bakery;15.00;DR;Food\n";
    let req = CommitRequest {
        asset_id: id,
        column_mapping: ColumnMapping {
            date: "Posted".into(),
            description: "Details".into(),
            amount: "Value".into(),
            currency: None,
            category: Some("Category".into()),
            r#type: Some("Dr/Cr".into()),
        },
        date_format: Some("DD/MM/YYYY".into()),
        skip_duplicates: false,
        sheet_name: None,
    };
    let upload = Upload::new("apr.csv", csv.as_bytes().to_vec());
    let res = pipeline::commit(&mut conn, &actor(), &upload, &req).unwrap();
    assert_eq!(res.total_rows, 2);
    assert_eq!(res.successful_rows, 2);
    let txs = ledger::list_transactions(&conn, Some(id), None).unwrap();
    let bakery = txs.iter().find(|t| t.description.as_deref() == Some("Bakery")).unwrap();
    assert_eq!(bakery.date.to_string(), "2025-04-04");
    assert_eq!(bakery.r#type, TransactionType::Expense);
    assert_eq!(bakery.category, "Food");
    let payroll = txs.iter().find(|t| t.description.as_deref() == Some("Payroll")).unwrap();
    assert_eq!(payroll.date.to_string(), "2025-04-03");
    assert_eq!(payroll.r#type, TransactionType::Income);
    assert_eq!(payroll.category, "Uncategorized");
    assert_eq!(balance(&conn, id), Decimal::new(2985, 0));
}

#[test]
fn rules_categorise_rows_without_a_category() {
    let (mut conn, id) = setup();
    conn.execute(
        "INSERT INTO rules(pattern, category) VALUES ('(?i)coffee|cafe', 'Eating out')",
        [],
    )
    .unwrap();
    let upload = Upload::new("jan.csv", THREE_ROWS.as_bytes().to_vec());
    pipeline::commit(&mut conn, &actor(), &upload, &request(id)).unwrap();
    let txs = ledger::list_transactions(&conn, Some(id), None).unwrap();
    let cats: Vec<(&str, &str)> = txs
        .iter()
        .map(|t| (t.description.as_deref().unwrap(), t.category.as_str()))
        .collect();
    assert!(cats.contains(&("Coffee", "Eating out")));
    assert!(cats.contains(&("Rent", "Uncategorized")));
}

#[test]
fn history_lists_newest_first() {
    let (mut conn, id) = setup();
    let upload = Upload::new("jan.csv", THREE_ROWS.as_bytes().to_vec());
    let first = pipeline::commit(&mut conn, &actor(), &upload, &request(id)).unwrap();
    let second = pipeline::commit(&mut conn, &actor(), &upload, &request(id)).unwrap();
    let items = pipeline::list_history(&conn, Some(id), 10).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id, second.import_id);
    assert_eq!(items[1].id, first.import_id);
    assert_eq!(pipeline::list_history(&conn, Some(id), 1).unwrap().len(), 1);
}

#[test]
fn cli_commit_trims_path_and_resolves_asset() {
    let (mut conn, id) = setup();
    let settings = Settings {
        reporting_currency: "AUD".into(),
        rates_url: "http://127.0.0.1:9".into(),
        rates_timeout_secs: 1,
        user_id: "u1".into(),
        organization_id: "org".into(),
    };
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    write!(file, "{}", THREE_ROWS).unwrap();
    file.flush().unwrap();
    let padded = format!("  {}  ", file.path().to_str().unwrap());

    let matches = cli::build_cli().get_matches_from([
        "fintally",
        "import",
        "commit",
        "--path",
        &padded,
        "--asset",
        "Everyday",
        "--date-col",
        "Date",
        "--description-col",
        "Description",
        "--amount-col",
        "Amount",
        "--skip-duplicates",
    ]);
    let Some(("import", import_m)) = matches.subcommand() else {
        panic!("no import subcommand");
    };
    importer::handle(&mut conn, &settings, import_m).unwrap();
    assert_eq!(ledger::list_transactions(&conn, Some(id), None).unwrap().len(), 3);

    // a JSON request file works the same way
    let mut body = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(
        body,
        r#"{{"assetId":{},"columnMapping":{{"date":"Date","description":"Description","amount":"Amount"}},"skipDuplicates":true}}"#,
        id
    )
    .unwrap();
    body.flush().unwrap();
    let matches = cli::build_cli().get_matches_from([
        "fintally",
        "import",
        "commit",
        "--path",
        file.path().to_str().unwrap(),
        "--request",
        body.path().to_str().unwrap(),
    ]);
    let Some(("import", import_m)) = matches.subcommand() else {
        panic!("no import subcommand");
    };
    importer::handle(&mut conn, &settings, import_m).unwrap();
    let h = pipeline::list_history(&conn, Some(id), 1).unwrap();
    assert_eq!(h[0].skipped_rows, 3);
}

#[test]
fn short_statement_with_one_bad_date() {
    let (mut conn, id) = setup();
    let csv = "Date,Desc,Amt\n2025-01-01,Coffee,-4.50\n2025-01-02,Pay,2000\nbad-date,X,10\n";
    let req = CommitRequest {
        column_mapping: ColumnMapping {
            date: "Date".into(),
            description: "Desc".into(),
            amount: "Amt".into(),
            currency: None,
            category: None,
            r#type: None,
        },
        ..request(id)
    };
    let upload = Upload::new("short.csv", csv.as_bytes().to_vec());
    let res = pipeline::commit(&mut conn, &actor(), &upload, &req).unwrap();
    assert_eq!(res.successful_rows, 2);
    assert_eq!(res.failed_rows, 1);
    assert_eq!(res.errors[0].row, 3);
    assert!(res.errors[0].error.contains("bad-date"));
    let mut kinds: Vec<(TransactionType, Decimal)> = ledger::list_transactions(&conn, Some(id), None)
        .unwrap()
        .into_iter()
        .map(|t| (t.r#type, t.amount))
        .collect();
    kinds.sort_by_key(|(_, a)| *a);
    assert_eq!(
        kinds,
        vec![
            (TransactionType::Expense, Decimal::new(45, 1)),
            (TransactionType::Income, Decimal::new(2000, 0)),
        ]
    );
}

#[test]
fn cli_preview_prints_suggested_mapping() {
    let (mut conn, _) = setup();
    let settings = Settings {
        reporting_currency: "AUD".into(),
        rates_url: "http://127.0.0.1:9".into(),
        rates_timeout_secs: 1,
        user_id: "u1".into(),
        organization_id: "org".into(),
    };
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    write!(file, "{}", THREE_ROWS).unwrap();
    file.flush().unwrap();

    // table output renders unmapped optional fields as blanks
    let matches = cli::build_cli().get_matches_from([
        "fintally",
        "import",
        "preview",
        "--path",
        file.path().to_str().unwrap(),
        "--limit",
        "2",
    ]);
    let Some(("import", import_m)) = matches.subcommand() else {
        panic!("no import subcommand");
    };
    importer::handle(&mut conn, &settings, import_m).unwrap();
}
