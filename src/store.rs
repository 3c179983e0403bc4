//! String-keyed persistence. Reads never fail: anything missing or malformed
//! loads as the type's default. Writes are best-effort and only logged.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

pub const BEST_SCORE_KEY: &str = "pulse-tap-best";
pub const CHECK_IN_KEY: &str = "pulse-tap-checkin";
pub const STREAK_KEY: &str = "pulse-tap-checkin-streak";
pub const HISTORY_KEY: &str = "pulse-tap-checkin-history";
pub const METRICS_KEY: &str = "pulse-tap-metrics";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable")]
    Unavailable,
    #[error("write to {key} rejected: {reason}")]
    Rejected { key: String, reason: String },
    #[error("failed to encode {key}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub trait KvStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-process store used natively and in tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, key: &str, value: &str) -> Self {
        self.entries.insert(key.to_string(), value.to_string());
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub fn load_u64(store: &impl KvStore, key: &str) -> u64 {
    let Some(raw) = store.get(key) else {
        return 0;
    };
    // Mirrors parseInt: leading digits count, trailing junk is ignored.
    let digits: String = raw
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or_else(|_| {
        debug!(key, %raw, "ignoring non-numeric stored value");
        0
    })
}

pub fn load_date(store: &impl KvStore, key: &str) -> Option<NaiveDate> {
    let raw = store.get(key)?;
    match raw.trim().parse::<NaiveDate>() {
        Ok(date) => Some(date),
        Err(_) => {
            debug!(key, %raw, "ignoring malformed stored date");
            None
        }
    }
}

pub fn load_json<T: DeserializeOwned + Default>(store: &impl KvStore, key: &str) -> T {
    let Some(raw) = store.get(key) else {
        return T::default();
    };
    serde_json::from_str(&raw).unwrap_or_else(|err| {
        debug!(key, %err, "ignoring malformed stored json");
        T::default()
    })
}

/// Writes `value`, logging instead of propagating failures.
pub fn persist_str(store: &mut impl KvStore, key: &str, value: &str) {
    if let Err(err) = store.set(key, value) {
        warn!(key, %err, "failed to persist value");
    }
}

pub fn persist_json<T: Serialize>(store: &mut impl KvStore, key: &str, value: &T) {
    let encoded = serde_json::to_string(value).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    });
    match encoded {
        Ok(text) => persist_str(store, key, &text),
        Err(err) => warn!(key, %err, "failed to persist value"),
    }
}
