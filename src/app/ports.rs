//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (relay board, inputs, clocks, storage, event sinks,
//! notification transport) implement these traits.  The
//! [`AppService`](super::service::AppService) consumes them via generics,
//! so the domain core never touches hardware directly.

use crate::config::{ALARM_CHANNELS, COUNTER_CHANNELS, SystemConfig};
use crate::datetime::DateTime;
use crate::error::{ClockError, DeliveryError};

// ───────────────────────────────────────────────────────────────
// Relay port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port for the relay outputs.
pub trait RelayPort {
    /// Energise (`true`) or release (`false`) one relay channel.
    fn set_relay(&mut self, channel: usize, on: bool);
}

// ───────────────────────────────────────────────────────────────
// Input port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Raw electrical levels of every polled input (`true` = HIGH).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputLevels {
    pub counters: [bool; COUNTER_CHANNELS],
    pub alarms: [bool; ALARM_CHANNELS],
}

impl Default for InputLevels {
    /// All inputs idle (pulled up).
    fn default() -> Self {
        Self {
            counters: [true; COUNTER_CHANNELS],
            alarms: [true; ALARM_CHANNELS],
        }
    }
}

/// Read-side port: the polling loop samples every digital input once per tick.
pub trait InputPort {
    fn read_inputs(&mut self) -> InputLevels;
}

// ───────────────────────────────────────────────────────────────
// Clock ports
// ───────────────────────────────────────────────────────────────

/// Battery-backed hardware RTC.
///
/// Chips are interchangeable behind these four operations.
pub trait PersistentClock {
    /// Probe the chip.  Returns `false` if it does not answer.
    fn begin(&mut self) -> bool;

    /// `true` if the chip lost power since it was last set, so its
    /// time cannot be trusted.
    fn is_unreliable(&mut self) -> bool;

    /// Set the chip's time and clear its power-loss indicator.
    fn set(&mut self, time: &DateTime) -> Result<(), ClockError>;

    fn read(&mut self) -> Result<DateTime, ClockError>;
}

/// Best-effort network-synchronised local time.
pub trait TimeSyncPort {
    /// Local time if the clock is synchronised, waiting at most
    /// `timeout_ms` for a pending sync to complete.
    fn local_time(&mut self, timeout_ms: u32) -> Option<DateTime>;
}

/// Persisted `YYYY-MM-DD HH:MM` snapshot of the last known good time.
pub trait SnapshotStore {
    fn load_time_snapshot(&self) -> Option<heapless::String<32>>;

    fn save_time_snapshot(&self, text: &str) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / notifications)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go (serial log,
/// notification queue, etc.).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Notification transport (driven adapter: worker → network)
// ───────────────────────────────────────────────────────────────

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendReceipt {
    /// The request completed with HTTP 200.
    pub http_ok: bool,
    /// The response body carried a positive application acknowledgement.
    pub ack_ok: bool,
}

impl SendReceipt {
    pub const DELIVERED: Self = Self { http_ok: true, ack_ok: true };
    pub const FAILED: Self = Self { http_ok: false, ack_ok: false };

    /// Both the roundtrip and the acknowledgement succeeded.
    pub fn delivered(self) -> bool {
        self.http_ok && self.ack_ok
    }

    /// Classify a failed receipt.  `None` when delivered.
    pub fn error(self) -> Option<DeliveryError> {
        match (self.http_ok, self.ack_ok) {
            (true, true) => None,
            (true, false) => Some(DeliveryError::Rejected),
            (false, _) => Some(DeliveryError::Connection),
        }
    }
}

/// Sends one text message to one recipient.  Used by the delivery
/// worker only; implementations may block for seconds.
pub trait NotifyTransport {
    fn send_text(&mut self, recipient: &str, body: &str) -> SendReceipt;

    /// Replace the sender credential.  Transports without one ignore it.
    fn set_token(&mut self, _token: &str) {}
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Values read back are clamped by the core regardless of what the
/// store returns.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Scheduler delegate (decouples scheduler from relays and notifier)
// ───────────────────────────────────────────────────────────────

/// Callback trait that the scheduler invokes when a relay schedule fires.
pub trait SchedulerDelegate {
    /// * `channel`   — relay channel index (0-based).
    /// * `hold_secs` — clamped hold duration configured for that channel.
    fn on_schedule_fired(&mut self, channel: usize, hold_secs: u32);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored config failed deserialization.
    Corrupted,
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`SnapshotStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
