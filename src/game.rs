//! One Pulse Tap session: the round engine and check-in tracker wired to the
//! store, telemetry and clock.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::checkin::{
    CHECK_IN_BONUS, ChainExecutor, CheckInStatus, CheckInTracker, ExecutorError, HistoryEntry,
    SubmitOutcome, SubmitTicket, TxNotice,
};
use crate::clock::{Clock, utc_date};
use crate::config::ValidatedConfig;
use crate::events::{self, EventSink, Telemetry};
use crate::metrics::Metrics;
use crate::round::{RoundEngine, RoundStatus, RoundSummary, TapOutcome, button_label};
use crate::store::{BEST_SCORE_KEY, KvStore, load_u64, persist_str};

/// Everything a host needs to render one frame of UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub status: RoundStatus,
    pub score: u64,
    pub taps: u64,
    pub combo: u8,
    pub combo_label: &'static str,
    pub best: u64,
    pub time_left: u32,
    pub progress: f64,
    pub button_label: &'static str,
    pub checked_in_today: bool,
    pub last_check_in: Option<NaiveDate>,
    pub check_in_enabled: bool,
    pub check_in_status: CheckInStatus,
    pub streak: u32,
    pub history: Vec<HistoryEntry>,
    pub metrics: Metrics,
}

pub struct PulseTap<S, E, C> {
    round: RoundEngine,
    check_in: CheckInTracker,
    metrics: Metrics,
    store: S,
    telemetry: Telemetry<E>,
    clock: C,
}

impl<S: KvStore, E: EventSink, C: Clock> PulseTap<S, E, C> {
    pub fn new(
        store: S,
        sink: E,
        clock: C,
        config: &ValidatedConfig,
        executor: Option<Rc<dyn ChainExecutor>>,
    ) -> Self {
        let round = RoundEngine::new(load_u64(&store, BEST_SCORE_KEY));
        let check_in = CheckInTracker::load(&store, config.contract.clone(), executor);
        let metrics = Metrics::load(&store);
        debug!(
            best = round.best(),
            streak = check_in.streak(),
            check_in_enabled = check_in.is_enabled(),
            "session loaded"
        );
        Self {
            round,
            check_in,
            metrics,
            store,
            telemetry: Telemetry::new(sink, config.page_url.clone()),
            clock,
        }
    }

    pub fn round(&self) -> &RoundEngine {
        &self.round
    }

    pub fn check_in(&self) -> &CheckInTracker {
        &self.check_in
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sink(&self) -> &E {
        self.telemetry.sink()
    }

    pub fn today(&self) -> NaiveDate {
        utc_date(self.clock.now_ms())
    }

    pub fn has_checked_in_today(&self) -> bool {
        self.check_in.has_checked_in_today(self.today())
    }

    pub fn start(&mut self) {
        let now = self.clock.now_ms();
        self.round.start(now);
        self.telemetry.emit(events::ROUND_START, now, json!({}));
    }

    pub fn tap(&mut self) -> Option<TapOutcome> {
        let now = self.clock.now_ms();
        let daily_bonus = self.check_in.has_checked_in_today(utc_date(now));
        let outcome = self.round.tap(now, daily_bonus)?;
        if outcome.auto_started {
            self.telemetry.emit(events::ROUND_START, now, json!({ "autoStarted": true }));
        }
        Some(outcome)
    }

    /// Drives the countdown; returns the summary when this tick ended the round.
    pub fn tick(&mut self) -> Option<RoundSummary> {
        let now = self.clock.now_ms();
        let summary = self.round.tick(now)?;
        if summary.new_best {
            persist_str(&mut self.store, BEST_SCORE_KEY, &summary.best.to_string());
        }
        info!(score = summary.score, taps = summary.taps, new_best = summary.new_best, "round finished");
        self.telemetry.emit(
            events::ROUND_END,
            now,
            json!({
                "score": summary.score,
                "taps": summary.taps,
                "best": summary.best,
                "newBest": summary.new_best,
            }),
        );
        Some(summary)
    }

    pub fn share(&mut self) {
        self.metrics.record_share();
        self.metrics.save(&mut self.store);
        self.telemetry.emit(
            events::SHARE_CLICK,
            self.clock.now_ms(),
            json!({ "score": self.round.state().score, "best": self.round.best() }),
        );
    }

    /// Hands the check-in call to the executor. A submission that never left
    /// is reported back as an error notice.
    pub fn submit_check_in(&mut self) -> SubmitOutcome {
        match self.begin_check_in() {
            Ok(ticket) => {
                let sent = ticket.send();
                self.finish_check_in(sent)
            }
            Err(outcome) => outcome,
        }
    }

    /// Like [`Self::submit_check_in`], but no borrow of `session` is held
    /// while the executor runs, so it may deliver notices synchronously.
    pub fn submit_check_in_shared(session: &RefCell<Self>) -> SubmitOutcome {
        let prepared = session.borrow().begin_check_in();
        let ticket = match prepared {
            Ok(ticket) => ticket,
            Err(outcome) => return outcome,
        };
        let sent = ticket.send();
        session.borrow_mut().finish_check_in(sent)
    }

    pub fn begin_check_in(&self) -> Result<SubmitTicket, SubmitOutcome> {
        self.check_in.prepare_submit(self.today())
    }

    pub fn finish_check_in(&mut self, sent: Result<(), ExecutorError>) -> SubmitOutcome {
        match sent {
            Ok(()) => {
                debug!("check-in submitted");
                self.telemetry
                    .emit(events::CHECK_IN_SUBMIT, self.clock.now_ms(), json!({}));
                SubmitOutcome::Submitted
            }
            Err(err) => {
                warn!(%err, "check-in submission failed");
                self.on_tx_notice(TxNotice::Error {
                    message: err.to_string(),
                });
                SubmitOutcome::Failed(err)
            }
        }
    }

    pub fn on_tx_notice(&mut self, notice: TxNotice) {
        if !self.check_in.is_enabled() {
            debug!(?notice, "check-in disabled, notice ignored");
            return;
        }
        let now = self.clock.now_ms();
        match notice {
            TxNotice::Pending => {
                self.check_in.on_pending();
                self.metrics.record_check_in_click();
                self.metrics.save(&mut self.store);
            }
            TxNotice::Success { tx_hash } => {
                let today = utc_date(now);
                let first_today = !self.check_in.has_checked_in_today(today);
                let receipt = self.check_in.on_success(&mut self.store, today, tx_hash);
                let mut bonus_applied = false;
                if first_today {
                    bonus_applied = self.round.apply_bonus(CHECK_IN_BONUS);
                    self.metrics.record_bonus(CHECK_IN_BONUS);
                    self.metrics.save(&mut self.store);
                }
                self.telemetry.emit(
                    events::CHECK_IN_SUCCESS,
                    now,
                    json!({
                        "txHash": receipt.tx_hash,
                        "streak": receipt.streak,
                        "bonusApplied": bonus_applied,
                    }),
                );
            }
            TxNotice::Error { message } => {
                self.telemetry.emit(events::CHECK_IN_ERROR, now, json!({ "message": message }));
                self.check_in.on_error(message);
            }
        }
    }

    pub fn snapshot(&self) -> GameSnapshot {
        let state = self.round.state();
        GameSnapshot {
            status: state.status,
            score: state.score,
            taps: state.taps,
            combo: state.combo,
            combo_label: self.round.combo_label(),
            best: self.round.best(),
            time_left: state.time_left,
            progress: self.round.progress(),
            button_label: button_label(state.status),
            checked_in_today: self.has_checked_in_today(),
            last_check_in: self.check_in.last_check_in(),
            check_in_enabled: self.check_in.is_enabled(),
            check_in_status: self.check_in.status().clone(),
            streak: self.check_in.streak(),
            history: self.check_in.history().to_vec(),
            metrics: self.metrics,
        }
    }
}
