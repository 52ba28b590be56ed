//! Inbound commands to the application service.
//!
//! These represent actions requested by the outside world (a
//! configuration page, a chat command, the serial console) that the
//! [`AppService`](super::service::AppService) interprets and acts upon.

use crate::config::SystemConfig;
use crate::datetime::DateTime;
use crate::notify::NotificationMessage;

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone)]
pub enum AppCommand {
    /// Fire a relay channel now with its configured message and hold.
    /// A channel that is already holding is restarted.
    TestRelay { channel: usize },

    /// Release a relay channel immediately.
    StopRelay { channel: usize },

    /// Pulse every relay in turn with a short hold.
    SelfTest,

    /// Zero a pulse counter without reporting it.
    ResetCounter { channel: usize },

    /// Set the wall clock manually (RTC, snapshot and cache).
    SetTime(DateTime),

    /// Push free-form text to the operator.
    SendText(NotificationMessage),

    /// Hot-reload configuration.  Values are clamped before use.
    UpdateConfig(SystemConfig),

    /// Explicitly persist the current config to NVS on the next check.
    SaveConfig,
}
