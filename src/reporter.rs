//! Counter reporting: threshold and daily modes.
//!
//! CNT1 may run in threshold mode (`target > 0`): every tick, once the
//! raw count reaches the target it is captured, zeroed and reported.
//! Every other channel (and CNT1 when its target is 0) reports once a
//! day at its configured minute.  An empty daily capture stays silent.

use log::info;

use crate::config::{COUNTER_CHANNELS, CounterChannelConfig, WeekdayMask};
use crate::scheduler::release_stale_key;
use crate::sensors::pulse_counter::PulseCounter;
use crate::time_source::WallTime;

/// The only counter that supports threshold mode.
pub const THRESHOLD_CHANNEL: usize = 0;

/// A captured quantity ready to be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterReport {
    TargetReached { channel: usize, quantity: u32 },
    Daily { channel: usize, quantity: u32 },
}

pub struct CounterReporter {
    last_key: [Option<u16>; COUNTER_CHANNELS],
}

impl Default for CounterReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterReporter {
    pub fn new() -> Self {
        Self {
            last_key: [None; COUNTER_CHANNELS],
        }
    }

    /// Threshold check for CNT1.  Reads the raw count so a target is
    /// caught on the tick it is reached, not one sync later.
    pub fn check_threshold(
        &mut self,
        counters: &mut PulseCounter<'_>,
        cfg: &[CounterChannelConfig; COUNTER_CHANNELS],
    ) -> Option<CounterReport> {
        let target = cfg[THRESHOLD_CHANNEL].target;
        if target == 0 || counters.peek(THRESHOLD_CHANNEL) < target {
            return None;
        }
        let quantity = counters.take_and_reset(THRESHOLD_CHANNEL);
        info!("CNT{}: target {} reached (qty {})", THRESHOLD_CHANNEL + 1, target, quantity);
        Some(CounterReport::TargetReached {
            channel: THRESHOLD_CHANNEL,
            quantity,
        })
    }

    /// Daily capture at each channel's configured minute.
    ///
    /// Uses the same one-shot-per-minute key discipline as the relay
    /// scheduler and the same fail-open weekday gate.
    pub fn evaluate_daily(
        &mut self,
        time: Option<WallTime>,
        counters: &mut PulseCounter<'_>,
        cfg: &[CounterChannelConfig; COUNTER_CHANNELS],
        mask: WeekdayMask,
    ) -> heapless::Vec<CounterReport, COUNTER_CHANNELS> {
        let mut reports = heapless::Vec::new();
        let Some(now) = time else {
            return reports;
        };
        let key = now.key();
        for last in &mut self.last_key {
            release_stale_key(last, key);
        }
        if !mask.allows(now.weekday) {
            return reports;
        }

        for (ch, (c, last)) in cfg.iter().zip(self.last_key.iter_mut()).enumerate() {
            if ch == THRESHOLD_CHANNEL && c.target > 0 {
                continue;
            }
            if c.daily_hour != now.hour || c.daily_minute != now.minute || last.is_some() {
                continue;
            }
            *last = Some(key);

            let quantity = counters.take_and_reset(ch);
            if quantity == 0 {
                info!("CNT{}: daily report skipped (qty 0)", ch + 1);
                continue;
            }
            info!("CNT{}: daily report qty {}", ch + 1, quantity);
            // Capacity equals the channel count.
            let _ = reports.push(CounterReport::Daily { channel: ch, quantity });
        }
        reports
    }
}
