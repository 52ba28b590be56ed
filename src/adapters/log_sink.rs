//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { rtc_ready } => {
                info!("START | rtc={}", if *rtc_ready { "ready" } else { "absent" });
            }
            AppEvent::ScheduleFired { channel, hold_secs, message } => {
                info!("RELAY | CH{} fired hold={}s msg='{}'", channel + 1, hold_secs, message);
            }
            AppEvent::RelayExtended { channel, added_secs } => {
                info!("RELAY | CH{} extended +{}s", channel + 1, added_secs);
            }
            AppEvent::RelayEnded { channel, path, .. } => {
                info!("RELAY | CH{} ended ({:?})", channel + 1, path);
            }
            AppEvent::RelayStopped { channel, reason } => {
                info!("RELAY | CH{} stopped ({})", channel + 1, reason);
            }
            AppEvent::SelfTestStep { channel, hold_secs } => {
                info!("TEST  | CH{} start hold={}s", channel + 1, hold_secs);
            }
            AppEvent::SelfTestDone { channel, busy } => {
                info!("TEST  | CH{} {}", channel + 1, if *busy { "skipped (busy)" } else { "done" });
            }
            AppEvent::AlarmRaised { channel, message } => {
                warn!("ALARM | DI{} raised '{}'", channel + 1, message);
            }
            AppEvent::AlarmCleared { channel, .. } => {
                info!("ALARM | DI{} cleared", channel + 1);
            }
            AppEvent::CounterTargetReached { channel, quantity, .. } => {
                info!("COUNT | CNT{} target reached qty={}", channel + 1, quantity);
            }
            AppEvent::CounterDaily { channel, quantity, .. } => {
                info!("COUNT | CNT{} daily qty={}", channel + 1, quantity);
            }
            AppEvent::CounterReset { channel, discarded } => {
                info!("COUNT | CNT{} reset (discarded {})", channel + 1, discarded);
            }
            AppEvent::Online { ip } => {
                info!("NET   | online ip={}", ip);
            }
            AppEvent::Text(text) => {
                info!("TEXT  | {}", text);
            }
            AppEvent::Status(s) => {
                let active = s.relays.iter().filter(|r| r.active).count();
                match s.time {
                    Some((h, m)) => info!(
                        "STATUS | {:02}:{:02} | relays_on={} | alarms=0b{:06b} | cnt={:?}",
                        h, m, active, s.alarms, s.counters
                    ),
                    None => info!(
                        "STATUS | --:-- | relays_on={} | alarms=0b{:06b} | cnt={:?}",
                        active, s.alarms, s.counters
                    ),
                }
            }
        }
    }
}
