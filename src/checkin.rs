//! Daily on-chain check-in: streak and history bookkeeping.
//!
//! The tracker owns the persisted check-in keys. Effects that reach outside
//! of it (score bonus, metrics, telemetry) are applied by the session that
//! routes [`TxNotice`]s here.

use std::rc::Rc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ContractAddress;
use crate::store::{
    CHECK_IN_KEY, HISTORY_KEY, KvStore, STREAK_KEY, load_date, load_json, persist_json,
    persist_str,
};

pub const MAX_HISTORY: usize = 5;
/// One-time score bonus granted by a successful check-in.
pub const CHECK_IN_BONUS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakRecord {
    pub last_date: NaiveDate,
    pub streak: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

/// Terminal notifications from the chain executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxNotice {
    Pending,
    Success { tx_hash: Option<String> },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum CheckInStatus {
    #[default]
    Idle,
    Pending,
    Success {
        #[serde(rename = "txHash")]
        tx_hash: Option<String>,
    },
    Error {
        message: String,
    },
    Disabled,
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("check-in call rejected: {0}")]
    Rejected(String),
}

/// Submits the zero-argument check-in call. Results arrive later as
/// [`TxNotice`]s; an `Err` here means the call never left. Executors may
/// report back synchronously, before `submit_check_in` returns.
pub trait ChainExecutor {
    fn submit_check_in(&self, contract: &ContractAddress) -> Result<(), ExecutorError>;
}

/// A submission the tracker has cleared. Sending it touches no tracker
/// state, so the caller can release its borrow of the session first.
pub struct SubmitTicket {
    contract: ContractAddress,
    executor: Rc<dyn ChainExecutor>,
}

impl SubmitTicket {
    pub fn contract(&self) -> &ContractAddress {
        &self.contract
    }

    pub fn send(&self) -> Result<(), ExecutorError> {
        self.executor.submit_check_in(&self.contract)
    }
}

#[derive(Debug)]
pub enum SubmitOutcome {
    Submitted,
    Disabled,
    AlreadyCheckedIn,
    InFlight,
    Failed(ExecutorError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckInReceipt {
    pub date: NaiveDate,
    pub streak: u32,
    pub tx_hash: Option<String>,
}

pub struct CheckInTracker {
    last_check_in: Option<NaiveDate>,
    streak: Option<StreakRecord>,
    history: Vec<HistoryEntry>,
    status: CheckInStatus,
    contract: Option<ContractAddress>,
    executor: Option<Rc<dyn ChainExecutor>>,
}

impl CheckInTracker {
    pub fn load(
        store: &impl KvStore,
        contract: Option<ContractAddress>,
        executor: Option<Rc<dyn ChainExecutor>>,
    ) -> Self {
        let mut history: Vec<HistoryEntry> = load_json(store, HISTORY_KEY);
        normalize_history(&mut history);
        let status = if contract.is_some() && executor.is_some() {
            CheckInStatus::Idle
        } else {
            CheckInStatus::Disabled
        };
        Self {
            last_check_in: load_date(store, CHECK_IN_KEY),
            streak: load_json::<Option<StreakRecord>>(store, STREAK_KEY),
            history,
            status,
            contract,
            executor,
        }
    }

    /// Fixed at load: notices never turn a disabled tracker back on.
    pub fn is_enabled(&self) -> bool {
        self.contract.is_some() && self.executor.is_some()
    }

    pub fn has_checked_in_today(&self, today: NaiveDate) -> bool {
        self.last_check_in == Some(today)
    }

    pub fn last_check_in(&self) -> Option<NaiveDate> {
        self.last_check_in
    }

    pub fn streak(&self) -> u32 {
        self.streak.as_ref().map_or(0, |record| record.streak)
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn status(&self) -> &CheckInStatus {
        &self.status
    }

    /// Decides whether a check-in may be sent now. The executor is not
    /// called here; see [`SubmitTicket::send`].
    pub fn prepare_submit(&self, today: NaiveDate) -> Result<SubmitTicket, SubmitOutcome> {
        let (Some(contract), Some(executor)) = (self.contract.as_ref(), self.executor.as_ref())
        else {
            return Err(SubmitOutcome::Disabled);
        };
        if self.last_check_in == Some(today) {
            return Err(SubmitOutcome::AlreadyCheckedIn);
        }
        if self.status == CheckInStatus::Pending {
            return Err(SubmitOutcome::InFlight);
        }
        Ok(SubmitTicket {
            contract: contract.clone(),
            executor: Rc::clone(executor),
        })
    }

    pub fn on_pending(&mut self) {
        if self.is_enabled() {
            self.status = CheckInStatus::Pending;
        }
    }

    /// Records today's check-in and persists date, streak and history.
    pub fn on_success(
        &mut self,
        store: &mut impl KvStore,
        today: NaiveDate,
        tx_hash: Option<String>,
    ) -> CheckInReceipt {
        let streak = next_streak(self.streak.as_ref(), today);
        let record = StreakRecord {
            last_date: today,
            streak,
        };
        record_history(&mut self.history, today, tx_hash.clone());

        persist_str(store, CHECK_IN_KEY, &today.to_string());
        persist_json(store, STREAK_KEY, &record);
        persist_json(store, HISTORY_KEY, &self.history);

        self.last_check_in = Some(today);
        self.streak = Some(record);
        if self.is_enabled() {
            self.status = CheckInStatus::Success {
                tx_hash: tx_hash.clone(),
            };
        }
        info!(%today, streak, "check-in recorded");
        CheckInReceipt {
            date: today,
            streak,
            tx_hash,
        }
    }

    pub fn on_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        if !self.is_enabled() {
            debug!(%message, "check-in disabled, error ignored");
            return;
        }
        self.status = CheckInStatus::Error { message };
    }
}

/// Streak after checking in on `today` given the previous record.
pub fn next_streak(previous: Option<&StreakRecord>, today: NaiveDate) -> u32 {
    let Some(previous) = previous else {
        return 1;
    };
    match (today - previous.last_date).num_days() {
        0 => previous.streak.max(1),
        1 => previous.streak.saturating_add(1),
        _ => 1,
    }
}

/// Puts `today` at the front, replacing any entry for the same date.
pub fn record_history(history: &mut Vec<HistoryEntry>, today: NaiveDate, tx_hash: Option<String>) {
    history.retain(|entry| entry.date != today);
    history.insert(
        0,
        HistoryEntry {
            date: today,
            tx_hash,
        },
    );
    history.truncate(MAX_HISTORY);
}

/// Repairs hand-edited or stale history: first entry per date wins.
fn normalize_history(history: &mut Vec<HistoryEntry>) {
    let mut seen = Vec::with_capacity(history.len());
    history.retain(|entry| {
        if seen.contains(&entry.date) {
            false
        } else {
            seen.push(entry.date);
            true
        }
    });
    history.truncate(MAX_HISTORY);
}
