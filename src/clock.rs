//! Wall clock access. All timestamps are milliseconds since the Unix epoch as
//! `f64`, the same unit `Date.now()` hands us in the browser.

use std::cell::Cell;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// chrono-backed clock; resolves to `Date.now()` on wasm32 through `wasmbind`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        Utc::now().timestamp_millis() as f64
    }
}

/// Hand-driven clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    pub fn new(now: f64) -> Self {
        Self {
            now: Cell::new(now),
        }
    }

    pub fn set(&self, now: f64) {
        self.now.set(now);
    }

    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> f64 {
        (**self).now_ms()
    }
}

fn to_datetime(ms: f64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms as i64).unwrap_or_default()
}

/// UTC calendar day containing `ms`. Out-of-range inputs collapse to the epoch.
pub fn utc_date(ms: f64) -> NaiveDate {
    to_datetime(ms).date_naive()
}

/// RFC 3339 UTC timestamp with millisecond precision (`2024-01-02T03:04:05.678Z`).
pub fn iso_timestamp(ms: f64) -> String {
    to_datetime(ms).to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Epoch milliseconds for midnight UTC of `date`.
pub fn midnight_ms(date: NaiveDate) -> f64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis() as f64)
        .unwrap_or(0.0)
}
