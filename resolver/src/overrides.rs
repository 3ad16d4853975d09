//! Curated email overrides.
//!
//! The dataset is a JSON array of `{constituency?, mp_name?, email?}` rows
//! maintained outside of this service. It is cached for a fixed TTL and
//! replaced wholesale on refresh, so readers always see a complete snapshot.
use crate::config::Overrides as OverridesConfig;
use crate::metrics_defs::{OVERRIDE_REFRESH, OVERRIDE_REFRESH_FAILED, OVERRIDE_ROWS};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use shared::{counter, histogram};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum OverrideLoadError {
    #[error("override source returned status {0}")]
    Status(u16),
    #[error("could not fetch overrides: {0}")]
    Request(#[from] reqwest::Error),
    #[error("could not parse overrides: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("override dataset is not a JSON array")]
    NotAnArray,
}

/// One row of the curated dataset.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct OverrideRow {
    #[serde(default)]
    pub constituency: Option<String>,
    #[serde(default)]
    pub mp_name: Option<String>,
    /// `None`: the row has no opinion. `Some(None)`: explicitly no email.
    #[serde(default, deserialize_with = "present_or_null")]
    pub email: Option<Option<String>>,
}

// Distinguishes an explicit `null` from a missing field; `default` covers the latter.
fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Parses the dataset. Rows that are not objects or have malformed fields
/// are skipped; a payload that is not an array is an error.
pub fn parse_rows(payload: Value) -> Result<Vec<OverrideRow>, OverrideLoadError> {
    let Value::Array(items) = payload else {
        return Err(OverrideLoadError::NotAnArray);
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<OverrideRow>(item) {
            Ok(row) => Some(row),
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed override row");
                None
            }
        })
        .collect())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OverrideEntry {
    Email(String),
    /// The curated list says this representative has no usable email.
    NoEmail,
}

impl OverrideEntry {
    pub fn email(&self) -> Option<&str> {
        match self {
            OverrideEntry::Email(email) => Some(email),
            OverrideEntry::NoEmail => None,
        }
    }
}

/// An immutable view of the dataset at the time it was fetched.
#[derive(Clone, Debug, Default)]
pub struct OverrideSnapshot {
    by_constituency: HashMap<String, OverrideEntry>,
    by_name: HashMap<String, OverrideEntry>,
    rows: usize,
    fetched_at: Option<Instant>,
}

impl OverrideSnapshot {
    pub fn from_rows(rows: Vec<OverrideRow>, fetched_at: Instant) -> Self {
        let mut snapshot = OverrideSnapshot {
            fetched_at: Some(fetched_at),
            ..Default::default()
        };

        for row in rows {
            let constituency = row.constituency.as_deref().and_then(normalize_key);
            let name = row.mp_name.as_deref().and_then(normalize_key);
            if constituency.is_none() && name.is_none() {
                continue;
            }

            let Some(email) = row.email else {
                continue;
            };
            let entry = match email.as_deref().map(str::trim) {
                Some(email) if !email.is_empty() => OverrideEntry::Email(email.to_string()),
                _ => OverrideEntry::NoEmail,
            };

            // Later rows win for duplicate keys
            if let Some(key) = constituency {
                snapshot.by_constituency.insert(key, entry.clone());
            }
            if let Some(key) = name {
                snapshot.by_name.insert(key, entry);
            }
            snapshot.rows += 1;
        }

        snapshot
    }

    pub fn for_constituency(&self, constituency: &str) -> Option<&OverrideEntry> {
        self.by_constituency.get(&normalize_key(constituency)?)
    }

    pub fn for_name(&self, name: &str) -> Option<&OverrideEntry> {
        self.by_name.get(&normalize_key(name)?)
    }

    pub fn fetched_at(&self) -> Option<Instant> {
        self.fetched_at
    }

    /// Dataset rows that produced at least one entry.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of lookup entries across both keys.
    pub fn len(&self) -> usize {
        self.by_constituency.len() + self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize_key(key: &str) -> Option<String> {
    let trimmed = key.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

/// Where the curated dataset comes from.
#[async_trait]
pub trait OverrideSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<OverrideRow>, OverrideLoadError>;
}

/// Fetches the dataset over HTTP, e.g. from a raw file in a git repository.
pub struct HttpOverrideSource {
    client: reqwest::Client,
    url: Url,
}

impl HttpOverrideSource {
    pub fn new(config: &OverridesConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(HttpOverrideSource {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl OverrideSource for HttpOverrideSource {
    async fn fetch(&self) -> Result<Vec<OverrideRow>, OverrideLoadError> {
        let response = self
            .client
            .get(self.url.clone())
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OverrideLoadError::Status(response.status().as_u16()));
        }

        let payload = response.json::<Value>().await?;
        parse_rows(payload)
    }
}

/// TTL-bounded cache of the override dataset.
///
/// `get` refreshes synchronously when the snapshot is missing or stale. A
/// failed refresh is logged and the previous snapshot (or an empty one) is
/// returned; errors never reach the caller.
pub struct OverrideCache {
    source: Arc<dyn OverrideSource>,
    ttl: Duration,
    current: RwLock<Option<Arc<OverrideSnapshot>>>,
    // Only one refresh runs at a time. Waiters re-check freshness once they get the permit.
    refresh_lock: Semaphore,
    // Set once the first refresh attempt has finished, successful or not.
    warmed: AtomicBool,
    // When the most recent refresh attempt finished, successful or not.
    last_attempt: Mutex<Option<Instant>>,
}

impl OverrideCache {
    pub fn new(source: Arc<dyn OverrideSource>, ttl: Duration) -> Self {
        OverrideCache {
            source,
            ttl,
            current: RwLock::new(None),
            refresh_lock: Semaphore::new(1),
            warmed: AtomicBool::new(false),
            last_attempt: Mutex::new(None),
        }
    }

    pub async fn get(&self) -> Arc<OverrideSnapshot> {
        if let Some(snapshot) = self.fresh_snapshot() {
            return snapshot;
        }

        let arrived = Instant::now();
        let Ok(_permit) = self.refresh_lock.acquire().await else {
            return self.current_or_empty();
        };

        // Another task may have refreshed while this one was waiting
        if let Some(snapshot) = self.fresh_snapshot() {
            return snapshot;
        }
        // An attempt finished while waiting and failed; don't queue up behind it
        if self.attempted_since(arrived) {
            return self.current_or_empty();
        }

        let result = self.source.fetch().await;
        *self.last_attempt.lock() = Some(Instant::now());
        self.warmed.store(true, Ordering::Relaxed);

        match result {
            Ok(rows) => {
                let snapshot = Arc::new(OverrideSnapshot::from_rows(rows, Instant::now()));
                counter!(OVERRIDE_REFRESH).increment(1);
                histogram!(OVERRIDE_ROWS).record(snapshot.rows() as f64);
                tracing::info!(
                    rows = snapshot.rows(),
                    entries = snapshot.len(),
                    "refreshed email overrides"
                );
                self.install(snapshot)
            }
            Err(e) => {
                counter!(OVERRIDE_REFRESH_FAILED).increment(1);
                let current = self.current_or_empty();
                tracing::error!(
                    error = %e,
                    stale = current.fetched_at().is_some(),
                    "failed to refresh email overrides, serving previous snapshot"
                );
                current
            }
        }
    }

    /// True once the first refresh attempt has completed.
    pub fn is_warm(&self) -> bool {
        self.warmed.load(Ordering::Relaxed)
    }

    fn fresh_snapshot(&self) -> Option<Arc<OverrideSnapshot>> {
        let guard = self.current.read();
        let snapshot = guard.as_ref()?;
        let fetched_at = snapshot.fetched_at()?;
        (fetched_at.elapsed() < self.ttl).then(|| snapshot.clone())
    }

    fn attempted_since(&self, instant: Instant) -> bool {
        self.last_attempt.lock().is_some_and(|at| at >= instant)
    }

    fn current_or_empty(&self) -> Arc<OverrideSnapshot> {
        self.current.read().clone().unwrap_or_default()
    }

    // Swaps in the new snapshot unless a newer one is already installed.
    fn install(&self, snapshot: Arc<OverrideSnapshot>) -> Arc<OverrideSnapshot> {
        let mut guard = self.current.write();
        if let Some(existing) = guard.as_ref()
            && existing.fetched_at() > snapshot.fetched_at()
        {
            return existing.clone();
        }
        *guard = Some(snapshot.clone());
        snapshot
    }
}
