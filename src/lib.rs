//! Pulse Tap core crate.
//!
//! 30-second combo sprint: tap fast, keep the rhythm under 0.9s to build
//! combo, and every 3 combo levels add a bonus point. A daily on-chain
//! check-in grants +5 once and +1 per tap for the rest of the UTC day and
//! extends a streak. Best score, check-in state and counters persist through
//! a string key-value store (`localStorage` in the browser).
//!
//! The engine modules are plain Rust and run natively; `web` holds the
//! browser glue exported to JS as `PulseTapApp`.

use wasm_bindgen::prelude::*;

pub mod checkin;
pub mod clock;
pub mod config;
pub mod events;
pub mod game;
pub mod metrics;
pub mod round;
pub mod store;
pub mod web;

pub use checkin::{
    ChainExecutor, CheckInStatus, CheckInTracker, ExecutorError, HistoryEntry, StreakRecord,
    SubmitOutcome, SubmitTicket, TxNotice,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, ContractAddress, PulseTapConfig, ValidatedConfig};
pub use events::{EventSink, RecordingSink, TelemetryEvent};
pub use game::{GameSnapshot, PulseTap};
pub use metrics::Metrics;
pub use round::{RoundEngine, RoundState, RoundStatus, RoundSummary, TapOutcome};
pub use store::{KvStore, MemoryStore, StoreError};
pub use web::PulseTapApp;

// Optional small allocator for size (feature gated)
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn wasm_start() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}
