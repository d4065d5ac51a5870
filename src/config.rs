// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Runtime settings: values from the `settings` table, overridden by
//! `FINTALLY_*` environment variables.

use crate::models::Actor;
use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_RATES_URL: &str = "https://open.er-api.com/v6";

/// Keys accepted by `config set`.
pub const KEYS: &[&str] = &[
    "reporting_currency",
    "rates_url",
    "rates_timeout_secs",
    "user_id",
    "organization_id",
];

#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub reporting_currency: String,
    pub rates_url: String,
    pub rates_timeout_secs: u64,
    pub user_id: String,
    pub organization_id: String,
}

impl Settings {
    pub fn load(conn: &Connection) -> Result<Self> {
        let timeout_raw = lookup(conn, "rates_timeout_secs", None)?;
        let rates_timeout_secs = match timeout_raw {
            Some(v) => v
                .parse::<u64>()
                .with_context(|| format!("Invalid rates_timeout_secs '{}'", v))?,
            None => 10,
        };
        Ok(Settings {
            reporting_currency: lookup(conn, "reporting_currency", None)?
                .unwrap_or_else(|| "USD".to_string())
                .to_uppercase(),
            rates_url: lookup(conn, "rates_url", Some("FINTALLY_RATES_URL"))?
                .unwrap_or_else(|| DEFAULT_RATES_URL.to_string()),
            rates_timeout_secs,
            user_id: lookup(conn, "user_id", Some("FINTALLY_USER"))?
                .unwrap_or_else(|| "local".to_string()),
            organization_id: lookup(conn, "organization_id", Some("FINTALLY_ORG"))?
                .unwrap_or_else(|| "default".to_string()),
        })
    }

    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.user_id.clone(),
            organization_id: self.organization_id.clone(),
        }
    }

    pub fn rates_timeout(&self) -> Duration {
        Duration::from_secs(self.rates_timeout_secs)
    }
}

fn lookup(conn: &Connection, key: &str, env: Option<&str>) -> Result<Option<String>> {
    if let Some(var) = env {
        if let Ok(v) = std::env::var(var) {
            if !v.trim().is_empty() {
                return Ok(Some(v.trim().to_string()));
            }
        }
    }
    get_setting(conn, key)
}

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    let v: Option<String> = conn
        .query_row(
            "SELECT value FROM settings WHERE key=?1",
            params![key],
            |r| r.get(0),
        )
        .optional()?;
    Ok(v)
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    if !KEYS.contains(&key) {
        return Err(anyhow!(
            "Unknown setting '{}'; expected one of {}",
            key,
            KEYS.join(", ")
        ));
    }
    if key == "rates_timeout_secs" {
        value
            .parse::<u64>()
            .with_context(|| format!("Invalid rates_timeout_secs '{}'", value))?;
    }
    let value = if key == "reporting_currency" {
        value.to_uppercase()
    } else {
        value.to_string()
    };
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![key, value],
    )?;
    Ok(())
}
