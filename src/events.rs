//! Telemetry events. Sinks are fire-and-forget: they swallow their own
//! delivery failures so nothing here can disturb game or check-in state.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::trace;

use crate::clock::iso_timestamp;

pub const ROUND_START: &str = "round_start";
pub const ROUND_END: &str = "round_end";
pub const SHARE_CLICK: &str = "share_click";
pub const CHECK_IN_SUBMIT: &str = "checkin_submit";
pub const CHECK_IN_SUCCESS: &str = "checkin_success";
pub const CHECK_IN_ERROR: &str = "checkin_error";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub name: String,
    pub ts: String,
    pub url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TelemetryEvent {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

pub trait EventSink {
    fn emit(&self, event: &TelemetryEvent);
}

impl<E: EventSink + ?Sized> EventSink for Rc<E> {
    fn emit(&self, event: &TelemetryEvent) {
        (**self).emit(event)
    }
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: RefCell<Vec<TelemetryEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.borrow().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events.borrow().iter().map(|e| e.name.clone()).collect()
    }

    pub fn last(&self) -> Option<TelemetryEvent> {
        self.events.borrow().last().cloned()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &TelemetryEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

/// Stamps events with time and page url before handing them to the sink.
pub struct Telemetry<E> {
    sink: E,
    url: String,
}

impl<E: EventSink> Telemetry<E> {
    pub fn new(sink: E, url: impl Into<String>) -> Self {
        Self {
            sink,
            url: url.into(),
        }
    }

    pub fn sink(&self) -> &E {
        &self.sink
    }

    /// `extra` is flattened into the payload when it is a JSON object and
    /// ignored otherwise.
    pub fn emit(&self, name: &str, now: f64, extra: Value) {
        let extra = match extra {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let event = TelemetryEvent {
            name: name.to_string(),
            ts: iso_timestamp(now),
            url: self.url.clone(),
            extra,
        };
        trace!(name, "telemetry event");
        self.sink.emit(&event);
    }
}
