//! Daily relay scheduler.
//!
//! Every relay channel has one daily firing time.  The scheduler compares
//! the resolved wall-clock time against each channel and notifies a
//! [`SchedulerDelegate`] when one fires; the delegate (inside
//! `AppService`) queues the channel's message and starts the relay hold.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  TimeSource::resolve() ──▶ WallTime { hour, minute, weekday }│
//! │                                   │                          │
//! │                                   ▼                          │
//! │   weekday mask ──▶  Scheduler::evaluate()  ◀── schedules     │
//! │                                   │                          │
//! │                     per-channel trigger key (hour*60+minute) │
//! │                                   │                          │
//! │                                   ▼                          │
//! │                        SchedulerDelegate                     │
//! │              (enqueue message, RelayActuator::start)         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A channel that fired keeps its trigger key for as long as the clock
//! reads the same minute, so sampling that minute many times fires at
//! most once.  The key is released once a different minute is observed.

use crate::app::ports::SchedulerDelegate;
use crate::config::{ChannelSchedule, RELAY_CHANNELS, WeekdayMask, clamp_hold};
use crate::time_source::WallTime;
use log::{debug, info};

/// Evaluation cadence of the schedule check.
pub const SCHEDULE_INTERVAL_MS: u32 = 500;

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

pub struct Scheduler {
    /// Minute-of-day each channel last fired at.
    last_key: [Option<u16>; RELAY_CHANNELS],
    last_eval_ms: Option<u32>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            last_key: [None; RELAY_CHANNELS],
            last_eval_ms: None,
        }
    }

    /// Cadence gate: `true` at most once per [`SCHEDULE_INTERVAL_MS`].
    pub fn due(&mut self, now_ms: u32) -> bool {
        match self.last_eval_ms {
            Some(last) if now_ms.wrapping_sub(last) < SCHEDULE_INTERVAL_MS => false,
            _ => {
                self.last_eval_ms = Some(now_ms);
                true
            }
        }
    }

    /// Check every channel against `time`.
    ///
    /// * `time` — resolved wall clock, or `None` when unavailable (the
    ///   whole evaluation is skipped).
    /// * `delegate` — receives one call per channel that fires.
    ///
    /// Returns how many channels fired.
    pub fn evaluate(
        &mut self,
        time: Option<WallTime>,
        schedules: &[ChannelSchedule; RELAY_CHANNELS],
        mask: WeekdayMask,
        delegate: &mut dyn SchedulerDelegate,
    ) -> usize {
        let Some(now) = time else {
            debug!("Scheduler: time unavailable, skipping");
            return 0;
        };
        let key = now.key();
        for last in &mut self.last_key {
            release_stale_key(last, key);
        }
        if !mask.allows(now.weekday) {
            return 0;
        }

        let mut fired = 0;
        for (ch, (sched, last)) in schedules.iter().zip(self.last_key.iter_mut()).enumerate() {
            if sched.hour != now.hour || sched.minute != now.minute || last.is_some() {
                continue;
            }
            *last = Some(key);
            let hold = clamp_hold(sched.hold_secs);
            info!(
                "Scheduler: CH{} fired at {:02}:{:02} (hold {}s)",
                ch + 1,
                now.hour,
                now.minute,
                hold
            );
            delegate.on_schedule_fired(ch, hold);
            fired += 1;
        }
        fired
    }
}

/// Forget a trigger key once the clock has moved to another minute, so
/// the same daily time fires again tomorrow.
pub(crate) fn release_stale_key(last: &mut Option<u16>, current: u16) {
    if last.is_some_and(|k| k != current) {
        *last = None;
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
