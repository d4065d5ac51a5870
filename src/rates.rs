// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Exchange-rate tables cached per (base currency, calendar day).
//!
//! A miss fetches the whole table for the base from the provider and stores
//! it under `exchange_rates:{BASE}:{yyyy-mm-dd}` for 24 hours. Stored entries
//! are never rewritten. If the fetch fails, yesterday's entry for the same base
//! is served instead; with neither, callers get `RatesUnavailable`.
//! Concurrent misses on one key are coalesced so only one fetch goes out.

use crate::errors::FxError;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub type RateTable = BTreeMap<String, Decimal>;

pub const CACHE_TTL_HOURS: i64 = 24;

pub fn cache_key(base: &str, day: NaiveDate) -> String {
    format!("exchange_rates:{}:{}", base, day.format("%Y-%m-%d"))
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of live rate tables. `latest("USD")` returns how many units of each
/// currency one USD buys.
pub trait RateProvider: Send + Sync {
    fn latest(&self, base: &str) -> Result<RateTable, FxError>;
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    rates: HashMap<String, f64>,
}

pub struct HttpRateProvider {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpRateProvider {
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Result<Self, FxError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(crate::utils::USER_AGENT)
            .build()
            .map_err(|e| FxError::Provider(e.to_string()))?;
        Ok(HttpRateProvider {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl RateProvider for HttpRateProvider {
    fn latest(&self, base: &str) -> Result<RateTable, FxError> {
        let url = format!("{}/latest/{}", self.base_url, base);
        debug!(%url, "fetching exchange rates");
        let resp = self
            .client
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| FxError::Provider(e.to_string()))?;
        let body: LatestResponse = resp
            .json()
            .map_err(|e| FxError::Protocol(format!("{}: {}", url, e)))?;
        parse_table(body.rates)
    }
}

fn parse_table(raw: HashMap<String, f64>) -> Result<RateTable, FxError> {
    raw.into_iter()
        .map(|(ccy, rate)| {
            Decimal::try_from(rate)
                .map(|d| (ccy.to_uppercase(), d))
                .map_err(|_| FxError::Protocol(format!("rate for {} is not a finite number", ccy)))
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRates {
    pub base: String,
    pub day: NaiveDate,
    pub rates: RateTable,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CachedRates {
    pub fn key(&self) -> String {
        cache_key(&self.base, self.day)
    }
}

pub trait RateStore {
    fn load(&self, key: &str) -> Result<Option<CachedRates>, FxError>;

    /// Stores `entry` unless its key is already present.
    fn save(&self, entry: &CachedRates) -> Result<(), FxError>;
}

/// Cache entries kept in the `rate_cache` table.
pub struct SqliteRateStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteRateStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        SqliteRateStore { conn }
    }

    /// Removes entries for days before `day`; returns how many went.
    pub fn purge_before(&self, day: NaiveDate) -> Result<usize, FxError> {
        Ok(self.conn.execute(
            "DELETE FROM rate_cache WHERE day < ?1",
            params![day.to_string()],
        )?)
    }

    pub fn list(&self, base: Option<&str>) -> Result<Vec<CachedRates>, FxError> {
        let mut stmt = self.conn.prepare(
            "SELECT key FROM rate_cache WHERE (?1 IS NULL OR base=?1) ORDER BY day DESC, base",
        )?;
        let keys = stmt
            .query_map(params![base], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = self.load(&key)? {
                out.push(entry);
            }
        }
        Ok(out)
    }
}

impl RateStore for SqliteRateStore<'_> {
    fn load(&self, key: &str) -> Result<Option<CachedRates>, FxError> {
        let row: Option<(String, String, String, String, String)> = self
            .conn
            .query_row(
                "SELECT base, day, rates, fetched_at, expires_at FROM rate_cache WHERE key=?1",
                params![key],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
            )
            .optional()?;
        let Some((base, day, rates, fetched_at, expires_at)) = row else {
            return Ok(None);
        };
        let parse_ts = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| FxError::Store(format!("bad timestamp '{}': {}", s, e)))
        };
        Ok(Some(CachedRates {
            base,
            day: NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                .map_err(|e| FxError::Store(format!("bad day '{}': {}", day, e)))?,
            rates: serde_json::from_str(&rates)?,
            fetched_at: parse_ts(&fetched_at)?,
            expires_at: parse_ts(&expires_at)?,
        }))
    }

    fn save(&self, entry: &CachedRates) -> Result<(), FxError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO rate_cache(key, base, day, rates, fetched_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.key(),
                entry.base,
                entry.day.to_string(),
                serde_json::to_string(&entry.rates)?,
                entry.fetched_at.to_rfc3339(),
                entry.expires_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

/// Process-local store, safe to share between threads.
#[derive(Debug, Default)]
pub struct MemoryRateStore {
    entries: Mutex<HashMap<String, CachedRates>>,
}

impl RateStore for MemoryRateStore {
    fn load(&self, key: &str) -> Result<Option<CachedRates>, FxError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| FxError::Store(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, entry: &CachedRates) -> Result<(), FxError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| FxError::Store(e.to_string()))?;
        entries.entry(entry.key()).or_insert_with(|| entry.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: String,
}

pub struct RateCache<S, P> {
    store: S,
    provider: P,
    clock: Box<dyn Clock>,
    ttl: Duration,
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: RateStore, P: RateProvider> RateCache<S, P> {
    pub fn new(store: S, provider: P) -> Self {
        RateCache {
            store,
            provider,
            clock: Box::new(SystemClock),
            ttl: Duration::hours(CACHE_TTL_HOURS),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    fn fresh(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CachedRates>, FxError> {
        Ok(self.store.load(key)?.filter(|e| e.expires_at > now))
    }

    fn gate(&self, key: &str) -> Result<Arc<Mutex<()>>, FxError> {
        let mut inflight = self
            .inflight
            .lock()
            .map_err(|e| FxError::Store(e.to_string()))?;
        Ok(inflight.entry(key.to_string()).or_default().clone())
    }

    fn release(&self, key: &str) {
        if let Ok(mut inflight) = self.inflight.lock() {
            inflight.remove(key);
        }
    }

    /// Full rate table for `base`, from cache when fresh.
    pub fn rates(&self, base: &str) -> Result<RateTable, FxError> {
        let base = base.trim().to_uppercase();
        let now = self.clock.now();
        let today = now.date_naive();
        let key = cache_key(&base, today);

        if let Some(hit) = self.fresh(&key, now)? {
            return Ok(hit.rates);
        }

        let gate = self.gate(&key)?;
        let _turn = gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let out = self.refresh(&key, &base, now);
        self.release(&key);
        out
    }

    fn refresh(&self, key: &str, base: &str, now: DateTime<Utc>) -> Result<RateTable, FxError> {
        // another caller may have filled the slot while we waited
        if let Some(hit) = self.fresh(key, now)? {
            return Ok(hit.rates);
        }
        let today = now.date_naive();
        match self.provider.latest(base) {
            Ok(rates) => {
                let entry = CachedRates {
                    base: base.to_string(),
                    day: today,
                    rates,
                    fetched_at: now,
                    expires_at: now + self.ttl,
                };
                self.store.save(&entry)?;
                info!(%base, day = %today, currencies = entry.rates.len(), "cached exchange rates");
                Ok(entry.rates)
            }
            Err(err) => self.fallback(base, today, err),
        }
    }

    fn fallback(&self, base: &str, today: NaiveDate, err: FxError) -> Result<RateTable, FxError> {
        warn!(%base, error = %err, "exchange rate fetch failed");
        let Some(yesterday) = today.pred_opt() else {
            return Err(FxError::RatesUnavailable(base.to_string()));
        };
        match self.store.load(&cache_key(base, yesterday))? {
            Some(entry) => {
                warn!(%base, day = %yesterday, "serving yesterday's exchange rates");
                Ok(entry.rates)
            }
            None => Err(FxError::RatesUnavailable(base.to_string())),
        }
    }

    /// Units of `to` per unit of `from`.
    pub fn rate(&self, from: &str, to: &str) -> Result<Decimal, FxError> {
        let from = from.trim().to_uppercase();
        let to = to.trim().to_uppercase();
        if from == to {
            return Ok(Decimal::ONE);
        }
        self.rates(&from)?
            .get(&to)
            .copied()
            .ok_or(FxError::RateNotFound { from, to })
    }

    pub fn convert(&self, amount: Decimal, from: &str, to: &str) -> Result<Decimal, FxError> {
        Ok(amount * self.rate(from, to)?)
    }

    /// Sum of `items` expressed in `to`.
    pub fn convert_many(&self, items: &[Money], to: &str) -> Result<Decimal, FxError> {
        items.iter().try_fold(Decimal::ZERO, |acc, m| {
            Ok(acc + self.convert(m.amount, &m.currency, to)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_format() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(cache_key("AUD", day), "exchange_rates:AUD:2025-03-09");
    }

    #[test]
    fn provider_payload_parses_to_decimals() {
        let body: LatestResponse =
            serde_json::from_str(r#"{"result":"success","rates":{"usd":0.65,"EUR":0.6}}"#).unwrap();
        let table = parse_table(body.rates).unwrap();
        assert_eq!(table.get("USD"), Some(&Decimal::new(65, 2)));
        assert_eq!(table.get("EUR"), Some(&Decimal::new(6, 1)));
    }

    #[test]
    fn payload_without_rates_is_rejected() {
        assert!(serde_json::from_str::<LatestResponse>(r#"{"conversion_rates":{}}"#).is_err());
    }

    #[test]
    fn memory_store_keeps_first_write() {
        let store = MemoryRateStore::default();
        let now = Utc::now();
        let mut entry = CachedRates {
            base: "USD".into(),
            day: now.date_naive(),
            rates: RateTable::from([("EUR".to_string(), Decimal::ONE)]),
            fetched_at: now,
            expires_at: now,
        };
        store.save(&entry).unwrap();
        entry.rates.insert("EUR".into(), Decimal::TWO);
        store.save(&entry).unwrap();
        let kept = store.load(&entry.key()).unwrap().unwrap();
        assert_eq!(kept.rates.get("EUR"), Some(&Decimal::ONE));
    }
}
