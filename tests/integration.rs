// Integration tests (native) for the `pulse-tap` crate.
// These drive a full session against an in-memory store, a recording sink and
// a hand-driven clock, so they run under `cargo test` on the host.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use chrono::NaiveDate;
use pulse_tap::checkin::CHECK_IN_BONUS;
use pulse_tap::clock::midnight_ms;
use pulse_tap::store::{BEST_SCORE_KEY, CHECK_IN_KEY, HISTORY_KEY, METRICS_KEY, STREAK_KEY};
use pulse_tap::{
    ChainExecutor, CheckInStatus, ContractAddress, ExecutorError, KvStore, ManualClock,
    MemoryStore, PulseTap, PulseTapConfig, RecordingSink, RoundStatus, SubmitOutcome, SystemClock,
    TxNotice, ValidatedConfig,
};

const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// 10:00 UTC on the given day.
fn morning(date: NaiveDate) -> f64 {
    midnight_ms(date) + 10.0 * 3_600_000.0
}

#[derive(Clone, Default)]
struct ScriptedExecutor {
    calls: Rc<RefCell<Vec<String>>>,
    fail_with: Option<String>,
}

impl ChainExecutor for ScriptedExecutor {
    fn submit_check_in(&self, contract: &ContractAddress) -> Result<(), ExecutorError> {
        self.calls.borrow_mut().push(contract.to_string());
        match &self.fail_with {
            Some(reason) => Err(ExecutorError::Rejected(reason.clone())),
            None => Ok(()),
        }
    }
}

fn enabled_config() -> ValidatedConfig {
    PulseTapConfig {
        contract_address: Some(CONTRACT.to_string()),
        page_url: "https://pulse.example/".to_string(),
        ..PulseTapConfig::default()
    }
    .validate()
    .unwrap()
}

type TestSession<'a> = PulseTap<MemoryStore, Rc<RecordingSink>, &'a ManualClock>;

fn session<'a>(
    store: MemoryStore,
    clock: &'a ManualClock,
    executor: Option<ScriptedExecutor>,
) -> (TestSession<'a>, Rc<RecordingSink>) {
    let sink = Rc::new(RecordingSink::new());
    let config = if executor.is_some() {
        enabled_config()
    } else {
        ValidatedConfig::default()
    };
    let executor = executor.map(|e| Rc::new(e) as Rc<dyn ChainExecutor>);
    (PulseTap::new(store, sink.clone(), clock, &config, executor), sink)
}

#[test]
fn round_runs_to_finish_and_saves_best() {
    let clock = ManualClock::new(morning(day(2024, 1, 2)));
    let (mut game, sink) = session(MemoryStore::new(), &clock, None);

    game.start();
    for _ in 0..4 {
        clock.advance(300.0);
        game.tap().expect("tap counts while playing");
    }
    assert_eq!(game.round().state().score, 5);
    assert_eq!(game.round().state().combo, 4);

    clock.advance(15_000.0);
    assert!(game.tick().is_none());
    assert_eq!(game.snapshot().time_left, 14);

    clock.advance(15_000.0);
    let summary = game.tick().expect("round ends");
    assert!(summary.new_best);
    assert_eq!(game.round().status(), RoundStatus::Finished);
    assert_eq!(game.store().get(BEST_SCORE_KEY).as_deref(), Some("5"));

    // No second finish while Finished.
    clock.advance(200.0);
    assert!(game.tick().is_none());
    assert_eq!(sink.names(), vec!["round_start", "round_end"]);
    let end = sink.last().unwrap();
    assert_eq!(end.get("score"), Some(&serde_json::json!(5)));
    assert_eq!(end.url, "");
}

#[test]
fn lower_score_keeps_stored_best() {
    let clock = ManualClock::new(morning(day(2024, 1, 2)));
    let store = MemoryStore::new().with_entry(BEST_SCORE_KEY, "40");
    let (mut game, _sink) = session(store, &clock, None);

    game.tap();
    clock.advance(30_000.0);
    let summary = game.tick().unwrap();
    assert!(!summary.new_best);
    assert_eq!(summary.best, 40);
    assert_eq!(game.store().get(BEST_SCORE_KEY).as_deref(), Some("40"));
}

#[test]
fn equal_score_leaves_best_untouched() {
    let clock = ManualClock::new(morning(day(2024, 1, 2)));
    let store = MemoryStore::new().with_entry(BEST_SCORE_KEY, "5");
    let (mut game, sink) = session(store, &clock, None);

    game.start();
    for _ in 0..4 {
        clock.advance(300.0);
        game.tap();
    }
    assert_eq!(game.round().state().score, 5);
    clock.advance(30_000.0);
    let summary = game.tick().unwrap();

    assert!(!summary.new_best);
    assert_eq!((summary.previous_best, summary.best), (5, 5));
    assert_eq!(game.round().best(), 5);
    assert_eq!(game.store().get(BEST_SCORE_KEY).as_deref(), Some("5"));
    assert_eq!(sink.last().unwrap().get("newBest"), Some(&serde_json::json!(false)));
}

#[test]
fn tap_from_finished_starts_next_round() {
    let clock = ManualClock::new(morning(day(2024, 1, 2)));
    let (mut game, sink) = session(MemoryStore::new(), &clock, None);

    game.start();
    game.tap();
    clock.advance(30_000.0);
    game.tick();
    assert_eq!(game.round().status(), RoundStatus::Finished);

    clock.advance(100.0);
    let outcome = game.tap().unwrap();
    assert!(outcome.auto_started);
    assert_eq!(outcome.combo, 1);
    let state = game.round().state();
    assert_eq!((state.status, state.score, state.taps), (RoundStatus::Playing, 1, 1));
    assert_eq!(game.snapshot().button_label, "Tap!");
    assert_eq!(sink.names().last().map(String::as_str), Some("round_start"));
}

#[test]
fn malformed_store_values_load_as_defaults() {
    let clock = ManualClock::new(morning(day(2024, 1, 2)));
    let store = MemoryStore::new()
        .with_entry(BEST_SCORE_KEY, "not-a-number")
        .with_entry(CHECK_IN_KEY, "someday")
        .with_entry(STREAK_KEY, "{broken")
        .with_entry(HISTORY_KEY, r#"{"date":"2024-01-01"}"#)
        .with_entry(METRICS_KEY, "[]");
    let (game, _sink) = session(store, &clock, None);

    let snapshot = game.snapshot();
    assert_eq!(snapshot.best, 0);
    assert_eq!(snapshot.streak, 0);
    assert!(snapshot.history.is_empty());
    assert!(!snapshot.checked_in_today);
    assert_eq!(snapshot.metrics, Default::default());
    assert_eq!(snapshot.status, RoundStatus::Idle);
    assert_eq!(snapshot.combo_label, "Ready");
}

#[test]
fn successful_check_in_extends_streak_and_boosts_round() {
    let today = day(2024, 1, 2);
    let clock = ManualClock::new(morning(today));
    let executor = ScriptedExecutor::default();
    let calls = executor.calls.clone();
    let store = MemoryStore::new()
        .with_entry(STREAK_KEY, r#"{"lastDate":"2024-01-01","streak":3}"#)
        .with_entry(CHECK_IN_KEY, "2024-01-01");
    let (mut game, sink) = session(store, &clock, Some(executor));

    game.start();
    game.tap();
    assert_eq!(game.round().state().score, 1);

    assert!(matches!(game.submit_check_in(), SubmitOutcome::Submitted));
    assert_eq!(calls.borrow().as_slice(), [CONTRACT.to_string()]);

    game.on_tx_notice(TxNotice::Pending);
    assert_eq!(game.check_in().status(), &CheckInStatus::Pending);
    assert!(matches!(game.submit_check_in(), SubmitOutcome::InFlight));
    assert_eq!(game.metrics().check_in_clicks, 1);

    game.on_tx_notice(TxNotice::Success {
        tx_hash: Some("0xabc".to_string()),
    });
    assert!(game.has_checked_in_today());
    assert_eq!(game.check_in().streak(), 4);
    assert_eq!(game.round().state().score, 1 + CHECK_IN_BONUS);
    assert_eq!(game.metrics().check_in_bonus_earned, CHECK_IN_BONUS);

    // Per-tap bonus for the rest of the day: combo 1 tap worth 2.
    clock.advance(5_000.0);
    assert_eq!(game.tap().unwrap().delta, 2);

    assert_eq!(game.store().get(CHECK_IN_KEY).as_deref(), Some("2024-01-02"));
    assert_eq!(
        game.store().get(STREAK_KEY).as_deref(),
        Some(r#"{"lastDate":"2024-01-02","streak":4}"#)
    );
    assert_eq!(
        game.store().get(METRICS_KEY).as_deref(),
        Some(r#"{"shareClicks":0,"checkInClicks":1,"checkInBonusEarned":5}"#)
    );

    let success = sink.last().unwrap();
    assert_eq!(success.name, "checkin_success");
    assert_eq!(success.get("txHash"), Some(&serde_json::json!("0xabc")));
    assert_eq!(success.url, "https://pulse.example/");

    assert!(matches!(game.submit_check_in(), SubmitOutcome::AlreadyCheckedIn));
    assert_eq!(calls.borrow().len(), 1);
}

#[test]
fn repeated_success_same_day_does_not_double_bonus() {
    let clock = ManualClock::new(morning(day(2024, 1, 2)));
    let (mut game, _sink) = session(MemoryStore::new(), &clock, Some(ScriptedExecutor::default()));
    game.start();
    game.on_tx_notice(TxNotice::Success { tx_hash: None });
    game.on_tx_notice(TxNotice::Success {
        tx_hash: Some("0x2".to_string()),
    });

    assert_eq!(game.round().state().score, CHECK_IN_BONUS);
    assert_eq!(game.metrics().check_in_bonus_earned, CHECK_IN_BONUS);
    assert_eq!(game.check_in().streak(), 1);
    let history = game.check_in().history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].tx_hash.as_deref(), Some("0x2"));
}

#[test]
fn bonus_outside_round_is_still_earned() {
    let clock = ManualClock::new(morning(day(2024, 1, 2)));
    let (mut game, sink) = session(MemoryStore::new(), &clock, Some(ScriptedExecutor::default()));
    game.on_tx_notice(TxNotice::Success { tx_hash: None });

    assert_eq!(game.round().state().score, 0);
    assert_eq!(game.metrics().check_in_bonus_earned, CHECK_IN_BONUS);
    assert_eq!(
        sink.last().unwrap().get("bonusApplied"),
        Some(&serde_json::json!(false))
    );
}

#[test]
fn executor_failure_surfaces_error_without_touching_data() {
    let clock = ManualClock::new(morning(day(2024, 1, 2)));
    let executor = ScriptedExecutor {
        fail_with: Some("wallet locked".to_string()),
        ..ScriptedExecutor::default()
    };
    let store = MemoryStore::new().with_entry(STREAK_KEY, r#"{"lastDate":"2024-01-01","streak":3}"#);
    let (mut game, sink) = session(store, &clock, Some(executor));

    assert!(matches!(game.submit_check_in(), SubmitOutcome::Failed(_)));
    match game.check_in().status() {
        CheckInStatus::Error { message } => assert!(message.contains("wallet locked"), "{message}"),
        other => panic!("unexpected status {other:?}"),
    }
    assert_eq!(sink.names(), vec!["checkin_error"]);
    assert_eq!(game.check_in().streak(), 3);
    assert!(!game.has_checked_in_today());
    assert!(game.store().get(CHECK_IN_KEY).is_none());
}

#[test]
fn transaction_error_can_be_retried_by_user() {
    let clock = ManualClock::new(morning(day(2024, 1, 2)));
    let executor = ScriptedExecutor::default();
    let calls = executor.calls.clone();
    let (mut game, _sink) = session(MemoryStore::new(), &clock, Some(executor));

    game.submit_check_in();
    game.on_tx_notice(TxNotice::Pending);
    game.on_tx_notice(TxNotice::Error {
        message: "reverted".to_string(),
    });
    assert_eq!(calls.borrow().len(), 1, "no automatic retry");

    assert!(matches!(game.submit_check_in(), SubmitOutcome::Submitted));
    assert_eq!(calls.borrow().len(), 2);
}

#[test]
fn missing_contract_disables_check_in() {
    let clock = ManualClock::new(morning(day(2024, 1, 2)));
    let (mut game, sink) = session(MemoryStore::new(), &clock, None);

    assert!(matches!(game.submit_check_in(), SubmitOutcome::Disabled));
    game.on_tx_notice(TxNotice::Pending);
    assert_eq!(game.metrics().check_in_clicks, 0);
    let snapshot = game.snapshot();
    assert!(!snapshot.check_in_enabled);
    assert_eq!(snapshot.check_in_status, CheckInStatus::Disabled);
    assert!(sink.names().is_empty());
}

#[test]
fn stray_notices_keep_check_in_disabled() {
    let clock = ManualClock::new(morning(day(2024, 1, 2)));
    let (mut game, sink) = session(MemoryStore::new(), &clock, None);
    game.start();

    game.on_tx_notice(TxNotice::Error {
        message: "boom".to_string(),
    });
    game.on_tx_notice(TxNotice::Success { tx_hash: None });
    game.on_tx_notice(TxNotice::Pending);

    let snapshot = game.snapshot();
    assert!(!snapshot.check_in_enabled);
    assert_eq!(snapshot.check_in_status, CheckInStatus::Disabled);
    assert!(!snapshot.checked_in_today);
    assert_eq!(snapshot.score, 0);
    assert_eq!(snapshot.metrics, Default::default());
    assert!(game.store().get(CHECK_IN_KEY).is_none());
    assert!(matches!(game.submit_check_in(), SubmitOutcome::Disabled));
    assert_eq!(sink.names(), vec!["round_start"]);
}

type SharedSession = PulseTap<MemoryStore, Rc<RecordingSink>, SystemClock>;

/// Reports `Pending` back into the session before returning, the way a host
/// wallet bridge may.
#[derive(Default)]
struct SyncReportingExecutor {
    session: RefCell<Weak<RefCell<SharedSession>>>,
}

impl ChainExecutor for SyncReportingExecutor {
    fn submit_check_in(&self, _contract: &ContractAddress) -> Result<(), ExecutorError> {
        let session = self
            .session
            .borrow()
            .upgrade()
            .ok_or_else(|| ExecutorError::Rejected("session gone".to_string()))?;
        let mut session = session
            .try_borrow_mut()
            .map_err(|err| ExecutorError::Rejected(err.to_string()))?;
        session.on_tx_notice(TxNotice::Pending);
        Ok(())
    }
}

#[test]
fn executor_may_report_pending_while_submitting() {
    let executor = Rc::new(SyncReportingExecutor::default());
    let sink = Rc::new(RecordingSink::new());
    let shared = Rc::new(RefCell::new(PulseTap::new(
        MemoryStore::new(),
        sink.clone(),
        SystemClock,
        &enabled_config(),
        Some(executor.clone() as Rc<dyn ChainExecutor>),
    )));
    *executor.session.borrow_mut() = Rc::downgrade(&shared);

    let outcome = PulseTap::submit_check_in_shared(&shared);
    assert!(matches!(outcome, SubmitOutcome::Submitted), "{outcome:?}");

    let game = shared.borrow();
    assert_eq!(game.check_in().status(), &CheckInStatus::Pending);
    assert_eq!(game.metrics().check_in_clicks, 1);
    assert_eq!(sink.names(), vec!["checkin_submit"]);
}

#[test]
fn streak_follows_calendar_days() {
    let clock = ManualClock::new(morning(day(2024, 1, 1)));
    let (mut game, _sink) = session(MemoryStore::new(), &clock, Some(ScriptedExecutor::default()));

    game.on_tx_notice(TxNotice::Success { tx_hash: None });
    assert_eq!(game.check_in().streak(), 1);

    // Late evening of the next day is still exactly one day later.
    clock.set(midnight_ms(day(2024, 1, 2)) + 23.5 * 3_600_000.0);
    game.on_tx_notice(TxNotice::Success { tx_hash: None });
    assert_eq!(game.check_in().streak(), 2);

    clock.set(morning(day(2024, 1, 4)));
    assert!(!game.has_checked_in_today());
    game.on_tx_notice(TxNotice::Success { tx_hash: None });
    assert_eq!(game.check_in().streak(), 1);

    let dates: Vec<String> = game
        .check_in()
        .history()
        .iter()
        .map(|e| e.date.to_string())
        .collect();
    assert_eq!(dates, vec!["2024-01-04", "2024-01-02", "2024-01-01"]);
}

#[test]
fn daily_tap_bonus_ends_at_utc_midnight() {
    let today = day(2024, 1, 2);
    let clock = ManualClock::new(midnight_ms(today) + 86_400_000.0 - 10_000.0);
    let (mut game, _sink) = session(MemoryStore::new(), &clock, Some(ScriptedExecutor::default()));
    game.on_tx_notice(TxNotice::Success { tx_hash: None });

    game.start();
    assert_eq!(game.tap().unwrap().delta, 2);
    clock.advance(20_000.0);
    assert_eq!(game.tap().unwrap().delta, 1);
}

#[test]
fn share_counts_and_persists() {
    let clock = ManualClock::new(morning(day(2024, 1, 2)));
    let store = MemoryStore::new().with_entry(METRICS_KEY, r#"{"shareClicks":2}"#);
    let (mut game, sink) = session(store, &clock, None);

    game.share();
    assert_eq!(game.metrics().share_clicks, 3);
    assert_eq!(
        game.store().get(METRICS_KEY).as_deref(),
        Some(r#"{"shareClicks":3,"checkInClicks":0,"checkInBonusEarned":0}"#)
    );
    assert_eq!(sink.names(), vec!["share_click"]);
    assert_eq!(game.sink().names(), sink.names());
}

#[test]
fn snapshot_serializes_for_the_host() {
    let clock = ManualClock::new(morning(day(2024, 1, 2)));
    let (mut game, _sink) = session(MemoryStore::new(), &clock, None);
    game.start();
    game.tap();

    let value = serde_json::to_value(game.snapshot()).unwrap();
    assert_eq!(value["status"], "playing");
    assert_eq!(value["score"], 1);
    assert_eq!(value["comboLabel"], "Warm-up");
    assert_eq!(value["timeLeft"], 30);
    assert_eq!(value["progress"], 1.0);
    assert_eq!(value["checkInStatus"]["state"], "disabled");
    assert_eq!(value["metrics"]["shareClicks"], 0);
}
