//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to serial, or render the
//! user-facing ones into chat notifications.

use crate::config::{Label, bounded};
use crate::notify::NotificationMessage;
use crate::relay::{EndPath, StopReason};

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// The service finished its boot sequence.
    Started { rtc_ready: bool },

    /// A relay schedule (or a manual test trigger) fired.
    ScheduleFired { channel: usize, hold_secs: u32, message: Label },

    /// A trigger landed on a channel that was already holding.
    RelayExtended { channel: usize, added_secs: u32 },

    /// A hold ran out and the relay was released.
    RelayEnded { channel: usize, message: Label, path: EndPath },

    /// A relay was released early.
    RelayStopped { channel: usize, reason: StopReason },

    /// A self-test step began on `channel`.
    SelfTestStep { channel: usize, hold_secs: u32 },

    /// A self-test step finished; `busy` when the channel was skipped.
    SelfTestDone { channel: usize, busy: bool },

    /// A fault input latched.
    AlarmRaised { channel: usize, message: Label },

    /// A latched fault input returned to idle.
    AlarmCleared { channel: usize, notify: bool },

    /// CNT1 reached its threshold.
    CounterTargetReached { channel: usize, message: Label, quantity: u32 },

    /// Daily counter report.
    CounterDaily { channel: usize, message: Label, quantity: u32 },

    /// A counter was zeroed on request.
    CounterReset { channel: usize, discarded: u32 },

    /// The network came up for the first time this boot.
    Online { ip: heapless::String<16> },

    /// Free-form text from an operator.
    Text(NotificationMessage),

    /// Periodic status line.
    Status(StatusSnapshot),
}

impl AppEvent {
    /// Chat text for the events that are pushed to the operator.
    ///
    /// `None` for events that are only logged.
    pub fn notification_text(&self) -> Option<NotificationMessage> {
        let text = match self {
            Self::ScheduleFired { message, .. } => return Some(bounded(message)),
            Self::Text(text) => return Some(text.clone()),
            Self::RelayExtended { channel, added_secs } => {
                format!("CH{} already holding, extended by {}s", channel + 1, added_secs)
            }
            Self::RelayEnded { message, .. } => format!("{} off", message),
            Self::RelayStopped { channel, reason } => {
                format!("CH{} test ended ({})", channel + 1, reason)
            }
            Self::SelfTestStep { channel, hold_secs } => {
                format!("CH{} self-test start (hold {}s)", channel + 1, hold_secs)
            }
            Self::SelfTestDone { channel, busy: false } => format!("CH{} self-test done", channel + 1),
            Self::SelfTestDone { channel, busy: true } => format!("CH{} self-test skipped (busy)", channel + 1),
            Self::AlarmRaised { channel, message } => format!("⚠️ DI{}: {}", channel + 1, message),
            Self::AlarmCleared { channel, notify: true } => format!("✅ DI{} recovered", channel + 1),
            Self::CounterTargetReached { message, quantity, .. } => {
                format!("{} qty={} (target reached)", message, quantity)
            }
            Self::CounterDaily { message, quantity, .. } => format!("{} qty={}", message, quantity),
            Self::Online { ip } => format!("📶 Device online, IP: {}", ip),
            Self::Started { .. }
            | Self::AlarmCleared { notify: false, .. }
            | Self::CounterReset { .. }
            | Self::Status(_) => return None,
        };
        Some(bounded(&text))
    }
}

/// A point-in-time view of every channel, for logging or a status page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusSnapshot {
    pub relays: [RelayStatus; crate::config::RELAY_CHANNELS],
    /// Latched alarm bitmask, bit *n* = DI(n+1).
    pub alarms: u8,
    pub counters: [u32; crate::config::COUNTER_CHANNELS],
    /// Last resolved `(hour, minute)`.
    pub time: Option<(u8, u8)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelayStatus {
    pub active: bool,
    pub remaining_ms: u32,
}
