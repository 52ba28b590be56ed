//! Outbound notification queue.
//!
//! ```text
//! ┌──────────────┐  NotificationMessage  ┌──────────────────┐
//! │ Polling loop │──── try_send ────────▶│ Delivery worker  │
//! │  (Notifier)  │   NOTIFY_QUEUE (20)   │ (core 0, retry)  │
//! └──────────────┘                       └──────────────────┘
//! ```
//!
//! The loop side never blocks: a full queue drops the message and bumps
//! a counter.  The worker side blocks on `receive().await` and owns all
//! network I/O.  Credential changes travel separately on
//! [`NOTIFY_SETTINGS`]; the worker picks them up before its next message.

pub mod worker;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use log::{debug, warn};

use crate::config::{SystemConfig, bounded};

/// Queue depth between the loop and the worker.
pub const QUEUE_DEPTH: usize = 20;
/// Longest message body in bytes; longer text is truncated.
pub const MESSAGE_CAP: usize = 256;

/// One queued notification body.
pub type NotificationMessage = heapless::String<MESSAGE_CAP>;

pub type NotifyQueue = Channel<CriticalSectionRawMutex, NotificationMessage, QUEUE_DEPTH>;

/// The firmware's single loop → worker hand-off.
pub static NOTIFY_QUEUE: NotifyQueue = Channel::new();

/// Who the worker sends as and to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifySettings {
    pub token: heapless::String<64>,
    pub recipient: heapless::String<32>,
}

impl NotifySettings {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            token: config.bot_token.clone(),
            recipient: config.chat_id.clone(),
        }
    }
}

pub type SettingsSignal = Signal<CriticalSectionRawMutex, NotifySettings>;

/// Latest credentials for the worker; a newer value replaces an unread one.
pub static NOTIFY_SETTINGS: SettingsSignal = Signal::new();

/// Producer half used by the polling loop.
pub struct Notifier<'a> {
    queue: &'a NotifyQueue,
    dropped: u32,
}

impl<'a> Notifier<'a> {
    pub fn new(queue: &'a NotifyQueue) -> Self {
        Self { queue, dropped: 0 }
    }

    /// Queue `text` for delivery.
    ///
    /// Empty text is ignored.  Returns `false` if the message was not
    /// queued.
    pub fn enqueue(&mut self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        let msg: NotificationMessage = bounded(text);
        match self.queue.try_send(msg) {
            Ok(()) => {
                debug!("Notify: queued ({} bytes)", text.len().min(MESSAGE_CAP));
                true
            }
            Err(_) => {
                self.dropped = self.dropped.wrapping_add(1);
                warn!("Notify: queue full, dropped message (total {})", self.dropped);
                false
            }
        }
    }

    /// Messages lost to a full queue since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Messages waiting for the worker.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
