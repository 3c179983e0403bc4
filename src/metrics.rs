//! Engagement counters persisted under `pulse-tap-metrics`.

use serde::{Deserialize, Serialize};

use crate::store::{KvStore, METRICS_KEY, load_json, persist_json};

/// Per-device engagement counters. Only ever incremented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Metrics {
    pub share_clicks: u64,
    pub check_in_clicks: u64,
    pub check_in_bonus_earned: u64,
}

impl Metrics {
    pub fn load(store: &impl KvStore) -> Self {
        load_json(store, METRICS_KEY)
    }

    pub fn save(&self, store: &mut impl KvStore) {
        persist_json(store, METRICS_KEY, self);
    }

    pub fn record_share(&mut self) {
        self.share_clicks = self.share_clicks.saturating_add(1);
    }

    pub fn record_check_in_click(&mut self) {
        self.check_in_clicks = self.check_in_clicks.saturating_add(1);
    }

    pub fn record_bonus(&mut self, points: u64) {
        self.check_in_bonus_earned = self.check_in_bonus_earned.saturating_add(points);
    }
}
