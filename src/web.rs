//! Browser bindings: localStorage, beacon telemetry, the host's wallet bridge
//! and the countdown interval. `PulseTapApp` is the handle JS holds on to.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::Serialize;
use serde_wasm_bindgen::Serializer;
use tracing::{debug, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Storage, window};

use crate::checkin::{ChainExecutor, ExecutorError, SubmitOutcome, TxNotice};
use crate::clock::SystemClock;
use crate::config::{ContractAddress, PulseTapConfig};
use crate::events::{EventSink, TelemetryEvent};
use crate::game::PulseTap;
use crate::store::{KvStore, MemoryStore, StoreError};

// --- Storage -----------------------------------------------------------------

pub struct LocalStore {
    storage: Storage,
}

impl LocalStore {
    pub fn open() -> Result<Self, StoreError> {
        let storage = window()
            .and_then(|w| w.local_storage().ok().flatten())
            .ok_or(StoreError::Unavailable)?;
        Ok(Self { storage })
    }
}

impl KvStore for LocalStore {
    fn get(&self, key: &str) -> Option<String> {
        self.storage.get_item(key).ok().flatten()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.storage
            .set_item(key, value)
            .map_err(|err| StoreError::Rejected {
                key: key.to_string(),
                reason: js_message(&err),
            })
    }
}

/// localStorage when the page may use it (private modes and sandboxed
/// iframes may refuse), otherwise an in-memory map for this page view.
pub enum BrowserStore {
    Local(LocalStore),
    Memory(MemoryStore),
}

impl BrowserStore {
    pub fn open() -> Self {
        match LocalStore::open() {
            Ok(local) => BrowserStore::Local(local),
            Err(err) => {
                warn!(%err, "falling back to in-memory storage");
                BrowserStore::Memory(MemoryStore::new())
            }
        }
    }
}

impl KvStore for BrowserStore {
    fn get(&self, key: &str) -> Option<String> {
        match self {
            BrowserStore::Local(store) => store.get(key),
            BrowserStore::Memory(store) => store.get(key),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        match self {
            BrowserStore::Local(store) => store.set(key, value),
            BrowserStore::Memory(store) => store.set(key, value),
        }
    }
}

// --- Telemetry ---------------------------------------------------------------

/// Posts events with `navigator.sendBeacon`; the browser owns delivery.
pub struct BeaconSink {
    endpoint: String,
}

impl BeaconSink {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl EventSink for BeaconSink {
    fn emit(&self, event: &TelemetryEvent) {
        let Ok(body) = serde_json::to_string(event) else {
            return;
        };
        let Some(navigator) = window().map(|w| w.navigator()) else {
            return;
        };
        match navigator.send_beacon_with_opt_str(&self.endpoint, Some(&body)) {
            Ok(true) => {}
            Ok(false) => debug!(name = %event.name, "beacon not queued"),
            Err(err) => debug!(name = %event.name, reason = %js_message(&err), "beacon rejected"),
        }
    }
}

// --- Wallet bridge -----------------------------------------------------------

#[wasm_bindgen]
extern "C" {
    /// Provided by the host page; sends the check-in transaction and later
    /// reports through `PulseTapApp.checkInPending/Success/Error`.
    #[wasm_bindgen(catch, js_namespace = pulseTapHost, js_name = submitCheckIn)]
    fn host_submit_check_in(contract: &str) -> Result<(), JsValue>;
}

pub struct HostExecutor;

impl ChainExecutor for HostExecutor {
    fn submit_check_in(&self, contract: &ContractAddress) -> Result<(), ExecutorError> {
        host_submit_check_in(contract.as_str())
            .map_err(|err| ExecutorError::Rejected(js_message(&err)))
    }
}

fn js_message(value: &JsValue) -> String {
    value
        .as_string()
        .unwrap_or_else(|| format!("{value:?}"))
}

// --- Countdown ---------------------------------------------------------------

type Session = PulseTap<BrowserStore, BeaconSink, SystemClock>;

/// Owns a `setInterval`. `tick` returns whether to keep going; the interval
/// is cleared the first time it returns false, on [`Ticker::cancel`] and when
/// the ticker is dropped.
pub struct Ticker {
    live: Rc<Cell<Option<i32>>>,
    _callback: Closure<dyn FnMut()>,
}

impl Ticker {
    pub fn start(interval_ms: u32, mut tick: impl FnMut() -> bool + 'static) -> Result<Self, JsValue> {
        let win = window().ok_or_else(|| JsValue::from_str("no window"))?;
        let live: Rc<Cell<Option<i32>>> = Rc::new(Cell::new(None));
        let cb_live = live.clone();
        let callback = Closure::wrap(Box::new(move || {
            if cb_live.get().is_some() && !tick() {
                clear_interval(&cb_live);
            }
        }) as Box<dyn FnMut()>);
        let handle = win.set_interval_with_callback_and_timeout_and_arguments_0(
            callback.as_ref().unchecked_ref(),
            interval_ms as i32,
        )?;
        live.set(Some(handle));
        Ok(Self {
            live,
            _callback: callback,
        })
    }

    pub fn is_running(&self) -> bool {
        self.live.get().is_some()
    }

    pub fn cancel(&self) {
        clear_interval(&self.live);
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        clear_interval(&self.live);
    }
}

fn clear_interval(live: &Cell<Option<i32>>) {
    if let Some(handle) = live.take() {
        if let Some(w) = window() {
            w.clear_interval_with_handle(handle);
        }
    }
}

/// Countdown for one round: stops once the round has left Playing.
fn round_ticker(session: Rc<RefCell<Session>>, interval_ms: u32) -> Result<Ticker, JsValue> {
    Ticker::start(interval_ms, move || {
        // Busy means a host callback is running inside the session; try again
        // on the next tick.
        let Ok(mut session) = session.try_borrow_mut() else {
            return true;
        };
        session.tick();
        session.round().is_playing()
    })
}

// --- Exported handle ---------------------------------------------------------

#[wasm_bindgen]
pub struct PulseTapApp {
    session: Rc<RefCell<Session>>,
    ticker: RefCell<Option<Ticker>>,
    tick_interval_ms: u32,
}

#[wasm_bindgen]
impl PulseTapApp {
    /// `config_json` follows `PulseTapConfig` (camelCase keys); omit it for
    /// defaults with check-in disabled.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<PulseTapApp, JsValue> {
        let config = match config_json {
            Some(text) => PulseTapConfig::from_json(&text).map_err(to_js_error)?,
            None => PulseTapConfig::default(),
        };
        let mut config = config.validate().map_err(to_js_error)?;
        if config.page_url.is_empty() {
            config.page_url = window()
                .and_then(|w| w.location().href().ok())
                .unwrap_or_default();
        }
        let executor = config
            .contract
            .as_ref()
            .map(|_| Rc::new(HostExecutor) as Rc<dyn ChainExecutor>);
        let session = PulseTap::new(
            BrowserStore::open(),
            BeaconSink::new(config.analytics_endpoint.clone()),
            SystemClock,
            &config,
            executor,
        );
        Ok(PulseTapApp {
            session: Rc::new(RefCell::new(session)),
            ticker: RefCell::new(None),
            tick_interval_ms: config.tick_interval_ms,
        })
    }

    pub fn start(&self) -> Result<(), JsValue> {
        self.session.borrow_mut().start();
        self.restart_ticker()
    }

    /// Returns whether the tap counted.
    pub fn tap(&self) -> Result<bool, JsValue> {
        let outcome = self.session.borrow_mut().tap();
        if outcome.is_some_and(|o| o.auto_started) {
            self.restart_ticker()?;
        }
        Ok(outcome.is_some())
    }

    pub fn share(&self) {
        self.session.borrow_mut().share();
    }

    /// Returns one of `submitted`, `disabled`, `already-checked-in`,
    /// `in-flight`, `failed`. The host may call the `checkIn*` notice
    /// methods from inside `pulseTapHost.submitCheckIn`.
    #[wasm_bindgen(js_name = checkIn)]
    pub fn check_in(&self) -> String {
        match PulseTap::submit_check_in_shared(&self.session) {
            SubmitOutcome::Submitted => "submitted",
            SubmitOutcome::Disabled => "disabled",
            SubmitOutcome::AlreadyCheckedIn => "already-checked-in",
            SubmitOutcome::InFlight => "in-flight",
            SubmitOutcome::Failed(_) => "failed",
        }
        .to_string()
    }

    #[wasm_bindgen(js_name = checkInPending)]
    pub fn check_in_pending(&self) {
        self.session.borrow_mut().on_tx_notice(TxNotice::Pending);
    }

    #[wasm_bindgen(js_name = checkInSuccess)]
    pub fn check_in_success(&self, tx_hash: Option<String>) {
        self.session
            .borrow_mut()
            .on_tx_notice(TxNotice::Success { tx_hash });
    }

    #[wasm_bindgen(js_name = checkInError)]
    pub fn check_in_error(&self, message: String) {
        self.session
            .borrow_mut()
            .on_tx_notice(TxNotice::Error { message });
    }

    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        self.session
            .borrow()
            .snapshot()
            .serialize(&Serializer::json_compatible())
            .map_err(|e| JsValue::from_str(&format!("Failed to serialize: {e}")))
    }

    /// Cancels the countdown, e.g. when the host unmounts the game.
    pub fn stop(&self) {
        self.ticker.borrow_mut().take();
    }

    #[wasm_bindgen(js_name = isTicking)]
    pub fn is_ticking(&self) -> bool {
        self.ticker.borrow().as_ref().is_some_and(Ticker::is_running)
    }
}

impl PulseTapApp {
    fn restart_ticker(&self) -> Result<(), JsValue> {
        self.stop();
        let ticker = round_ticker(self.session.clone(), self.tick_interval_ms)?;
        *self.ticker.borrow_mut() = Some(ticker);
        Ok(())
    }
}

fn to_js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}
