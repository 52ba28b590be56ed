//! Mock adapters for integration tests.
//!
//! Records every relay write, serves scripted input levels and clock
//! readings, and keeps config / snapshot in memory so tests can assert
//! on the full history without touching real GPIO or I²C.

use std::cell::RefCell;

use relaybox::app::events::AppEvent;
use relaybox::app::ports::{
    ConfigError, ConfigPort, EventSink, InputLevels, InputPort, PersistentClock, RelayPort,
    SnapshotStore, StorageError, TimeSyncPort,
};
use relaybox::config::{RELAY_CHANNELS, SystemConfig, bounded};
use relaybox::datetime::DateTime;
use relaybox::error::ClockError;

// ── MockBoard ─────────────────────────────────────────────────

/// Relay outputs plus the polled input bank.
#[derive(Default)]
pub struct MockBoard {
    pub relays: [bool; RELAY_CHANNELS],
    pub writes: Vec<(usize, bool)>,
    pub inputs: InputLevels,
}

#[allow(dead_code)]
impl MockBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `channel` was energised.
    pub fn energised(&self, channel: usize) -> usize {
        self.writes.iter().filter(|&&w| w == (channel, true)).count()
    }
}

impl RelayPort for MockBoard {
    fn set_relay(&mut self, channel: usize, on: bool) {
        self.relays[channel] = on;
        self.writes.push((channel, on));
    }
}

impl InputPort for MockBoard {
    fn read_inputs(&mut self) -> InputLevels {
        self.inputs
    }
}

// ── MockClock ─────────────────────────────────────────────────

/// Network time and RTC, each independently present or absent.
#[derive(Default)]
pub struct MockClock {
    pub network: Option<DateTime>,
    pub rtc: Option<DateTime>,
    pub rtc_present: bool,
    pub lost_power: bool,
    pub rtc_writes: Vec<DateTime>,
}

#[allow(dead_code)]
impl MockClock {
    /// No network time and no RTC chip.
    pub fn offline() -> Self {
        Self::default()
    }

    /// Synchronised network time, no RTC chip.
    pub fn synced(time: DateTime) -> Self {
        Self {
            network: Some(time),
            ..Self::default()
        }
    }

    /// A healthy RTC holding `time`, no network.
    pub fn rtc_only(time: DateTime) -> Self {
        Self {
            rtc: Some(time),
            rtc_present: true,
            ..Self::default()
        }
    }
}

impl TimeSyncPort for MockClock {
    fn local_time(&mut self, _timeout_ms: u32) -> Option<DateTime> {
        self.network
    }
}

impl PersistentClock for MockClock {
    fn begin(&mut self) -> bool {
        self.rtc_present
    }

    fn is_unreliable(&mut self) -> bool {
        self.lost_power
    }

    fn set(&mut self, time: &DateTime) -> Result<(), ClockError> {
        if !self.rtc_present {
            return Err(ClockError::Bus);
        }
        self.rtc = Some(*time);
        self.lost_power = false;
        self.rtc_writes.push(*time);
        Ok(())
    }

    fn read(&mut self) -> Result<DateTime, ClockError> {
        if !self.rtc_present {
            return Err(ClockError::Bus);
        }
        self.rtc.ok_or(ClockError::InvalidData)
    }
}

// ── MockNvs ───────────────────────────────────────────────────

/// In-memory config blob and time snapshot.
#[derive(Default)]
pub struct MockNvs {
    pub config: RefCell<Option<SystemConfig>>,
    pub snapshot: RefCell<Option<String>>,
    pub fail_writes: bool,
}

#[allow(dead_code)]
impl MockNvs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(text: &str) -> Self {
        Self {
            snapshot: RefCell::new(Some(text.to_owned())),
            ..Self::default()
        }
    }

    pub fn saved_snapshot(&self) -> Option<String> {
        self.snapshot.borrow().clone()
    }
}

impl ConfigPort for MockNvs {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        Ok(self.config.borrow().clone().unwrap_or_default())
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        if self.fail_writes {
            return Err(ConfigError::IoError);
        }
        *self.config.borrow_mut() = Some(config.clone());
        Ok(())
    }
}

impl SnapshotStore for MockNvs {
    fn load_time_snapshot(&self) -> Option<heapless::String<32>> {
        self.snapshot.borrow().as_deref().map(bounded)
    }

    fn save_time_snapshot(&self, text: &str) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::IoError);
        }
        *self.snapshot.borrow_mut() = Some(text.to_owned());
        Ok(())
    }
}

// ── RecordingSink ─────────────────────────────────────────────

/// Captures every emitted event.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rendered chat text of every user-facing event, in order.
    pub fn texts(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(AppEvent::notification_text)
            .map(|m| m.as_str().to_owned())
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
