// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use fintally::db;
use fintally::errors::SourceError;
use fintally::ledger::{self, NewAsset};
use fintally::mapping::ColumnMapping;
use fintally::models::{Actor, TransactionType};
use fintally::pipeline::{self, CommitRequest, Upload};
use fintally::tabular::{SourceKind, TabularSource, WorkbookSource};
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;

enum Cell {
    Text(&'static str),
    Num(f64),
    /// Serial day number rendered with a built-in date format.
    Date(f64),
}

const NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

fn sheet_xml(rows: &[Vec<Cell>]) -> String {
    let mut body = String::new();
    for (r, cells) in rows.iter().enumerate() {
        if cells.is_empty() {
            continue;
        }
        body.push_str(&format!("<row r=\"{}\">", r + 1));
        for (c, cell) in cells.iter().enumerate() {
            let at = format!("{}{}", (b'A' + c as u8) as char, r + 1);
            body.push_str(&match cell {
                Cell::Text(t) => format!("<c r=\"{at}\" t=\"inlineStr\"><is><t>{t}</t></is></c>"),
                Cell::Num(v) => format!("<c r=\"{at}\"><v>{v}</v></c>"),
                Cell::Date(v) => format!("<c r=\"{at}\" s=\"1\"><v>{v}</v></c>"),
            });
        }
        body.push_str("</row>");
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="{NS}"><sheetData>{body}</sheetData></worksheet>"#
    )
}

/// Minimal xlsx: one sheet per entry, in order.
fn workbook(sheets: &[(&str, Vec<Vec<Cell>>)]) -> Vec<u8> {
    let mut overrides = String::new();
    let mut entries = String::new();
    let mut rels = String::new();
    for (i, (name, _)) in sheets.iter().enumerate() {
        let n = i + 1;
        overrides.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
        entries.push_str(&format!(r#"<sheet name="{name}" sheetId="{n}" r:id="rId{n}"/>"#));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{n}" Type="{REL_NS}/worksheet" Target="worksheets/sheet{n}.xml"/>"#
        ));
    }
    let styles_id = sheets.len() + 1;
    rels.push_str(&format!(
        r#"<Relationship Id="rId{styles_id}" Type="{REL_NS}/styles" Target="styles.xml"/>"#
    ));

    let mut parts: Vec<(String, String)> = vec![
        (
            "[Content_Types].xml".into(),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>{overrides}</Types>"#
            ),
        ),
        (
            "_rels/.rels".into(),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{REL_NS}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
            ),
        ),
        (
            "xl/workbook.xml".into(),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="{NS}" xmlns:r="{REL_NS}"><sheets>{entries}</sheets></workbook>"#
            ),
        ),
        (
            "xl/_rels/workbook.xml.rels".into(),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
            ),
        ),
        (
            "xl/styles.xml".into(),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><styleSheet xmlns="{NS}"><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="14" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/></cellXfs></styleSheet>"#
            ),
        ),
    ];
    for (i, (_, rows)) in sheets.iter().enumerate() {
        parts.push((format!("xl/worksheets/sheet{}.xml", i + 1), sheet_xml(rows)));
    }

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (path, body) in parts {
        zip.start_file(path, options)
            .unwrap_or_else(|err| panic!("failed to start part: {err}"));
        zip.write_all(body.as_bytes())
            .unwrap_or_else(|err| panic!("failed to write part: {err}"));
    }
    zip.finish()
        .unwrap_or_else(|err| panic!("failed to finalize workbook: {err}"))
        .into_inner()
}

/// "Jan" has a bank preamble above the header; "Feb" is empty.
fn statement() -> Vec<u8> {
    workbook(&[
        (
            "Jan",
            vec![
                vec![Cell::Text("Statement for Everyday")],
                vec![Cell::Text("Account"), Cell::Num(12345678.0)],
                vec![],
                vec![Cell::Text("Date"), Cell::Text("Description"), Cell::Text("Amount")],
                vec![Cell::Date(45658.0), Cell::Text("Coffee"), Cell::Num(-4.5)],
                vec![Cell::Date(45659.0), Cell::Text("Pay"), Cell::Num(2000.0)],
            ],
        ),
        ("Feb", vec![]),
    ])
}

#[test]
fn sheets_are_listed_in_workbook_order() {
    let blob = statement();
    let src = WorkbookSource;
    assert_eq!(src.kind(), SourceKind::Workbook);
    assert_eq!(src.sections(&blob).unwrap(), vec!["Jan", "Feb"]);
}

#[test]
fn header_row_is_found_below_the_preamble() {
    let blob = statement();
    let expected = vec!["Date", "Description", "Amount"];
    assert_eq!(WorkbookSource.headers(&blob, None).unwrap(), expected);
    assert_eq!(WorkbookSource.headers(&blob, Some(" Jan ")).unwrap(), expected);
}

#[test]
fn rows_render_dates_and_numbers_as_text() {
    let blob = statement();
    let rows: Vec<_> = WorkbookSource
        .rows(&blob, Some("Jan"))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("Date"), Some("2025-01-01"));
    assert_eq!(rows[0].get("Description"), Some("Coffee"));
    assert_eq!(rows[0].get("Amount"), Some("-4.5"));
    assert_eq!(rows[1].get("Amount"), Some("2000"));

    let preview = WorkbookSource.preview(&blob, 1, None).unwrap();
    assert_eq!(preview.len(), 1);
    assert_eq!(preview[0], rows[0]);
}

#[test]
fn empty_and_unknown_sheets_are_errors() {
    let blob = statement();
    let err = WorkbookSource.headers(&blob, Some("Feb")).unwrap_err();
    assert!(matches!(&err, SourceError::Malformed(m) if m == "sheet 'Feb' is empty"));

    let err = WorkbookSource.rows(&blob, Some("Mar")).err().unwrap();
    assert!(matches!(&err, SourceError::MissingSection(s) if s == "Mar"));
}

#[test]
fn preview_of_a_workbook_lists_its_sheets() {
    let p = pipeline::preview(&Upload::new("jan.xlsx", statement()), None, 10).unwrap();
    assert_eq!(p.file_type, "excel");
    assert_eq!(p.sheets, Some(vec!["Jan".to_string(), "Feb".to_string()]));
    assert_eq!(p.headers, vec!["Date", "Description", "Amount"]);
    assert_eq!(p.preview.len(), 2);
    assert_eq!(p.suggested_mapping.date.as_deref(), Some("Date"));
    assert_eq!(p.suggested_mapping.amount.as_deref(), Some("Amount"));
}

#[test]
fn workbook_commit_lands_in_the_ledger() {
    let actor = Actor {
        user_id: "u1".into(),
        organization_id: "org".into(),
    };
    let mut conn = Connection::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    let asset = ledger::create_asset(
        &conn,
        &actor,
        &NewAsset {
            name: "Everyday".into(),
            kind: "bank".into(),
            currency: "AUD".into(),
            initial_amount: Decimal::new(1000, 0),
            family_id: None,
        },
    )
    .unwrap();
    let req = CommitRequest {
        asset_id: asset.id,
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
        sheet_name: Some("Jan".into()),
    };
    let res = pipeline::commit(&mut conn, &actor, &Upload::new("jan.xlsx", statement()), &req)
        .unwrap();
    assert_eq!(res.total_rows, 2);
    assert_eq!(res.successful_rows, 2);
    // 1000 - 4.5 + 2000
    assert_eq!(ledger::load_asset(&conn, asset.id).unwrap().amount, Decimal::new(19955, 1));
    let txs = ledger::list_transactions(&conn, Some(asset.id), None).unwrap();
    let coffee = txs.iter().find(|t| t.description.as_deref() == Some("Coffee")).unwrap();
    assert_eq!(coffee.r#type, TransactionType::Expense);
    assert_eq!(coffee.date.to_string(), "2025-01-01");
}
