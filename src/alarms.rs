//! Fault-input monitor.
//!
//! Six dry-contact inputs, pulled up, LOW = fault.  Each channel is
//! level-debounced and latched:
//!
//! 1. Any level change restarts that channel's debounce timer.
//! 2. Once the level has been stable for longer than
//!    [`ALARM_DEBOUNCE_MS`], a fault level sets the latch bit and reports
//!    [`AlarmTransition::Raised`] — once per latch cycle.
//! 3. A stable idle level clears the bit and reports
//!    [`AlarmTransition::Cleared`].
//!
//! A contact that stays closed therefore produces exactly one fault
//! notification, however long it stays closed.

use log::{error, info};

use crate::config::ALARM_CHANNELS;

/// Stable time required before a level change is believed.
pub const ALARM_DEBOUNCE_MS: u32 = 40;

/// Contacts close to GND on fault.
const FAULT_LEVEL: bool = false;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmTransition {
    Raised(usize),
    Cleared(usize),
}

#[derive(Debug, Clone, Copy)]
struct AlarmChannelState {
    last_level: bool,
    last_change_ms: u32,
}

pub struct AlarmMonitor {
    channels: [AlarmChannelState; ALARM_CHANNELS],
    /// Latched fault bitmask, bit *n* = DI(n+1).
    latched: u8,
}

impl AlarmMonitor {
    /// Seed every channel with its level at boot so a contact that is
    /// already closed still goes through the debounce before latching.
    pub fn new(initial: &[bool; ALARM_CHANNELS], now_ms: u32) -> Self {
        Self {
            channels: initial.map(|level| AlarmChannelState {
                last_level: level,
                last_change_ms: now_ms,
            }),
            latched: 0,
        }
    }

    /// Evaluate one sample of every input.
    pub fn poll(
        &mut self,
        now_ms: u32,
        levels: &[bool; ALARM_CHANNELS],
    ) -> heapless::Vec<AlarmTransition, ALARM_CHANNELS> {
        let mut transitions = heapless::Vec::new();
        for (ch, (state, &level)) in self.channels.iter_mut().zip(levels).enumerate() {
            if level != state.last_level {
                state.last_level = level;
                state.last_change_ms = now_ms;
                continue;
            }
            if now_ms.wrapping_sub(state.last_change_ms) <= ALARM_DEBOUNCE_MS {
                continue;
            }

            let bit = 1u8 << ch;
            let latched = self.latched & bit != 0;
            let transition = if level == FAULT_LEVEL && !latched {
                self.latched |= bit;
                error!("ALARM SET: DI{}", ch + 1);
                AlarmTransition::Raised(ch)
            } else if level != FAULT_LEVEL && latched {
                self.latched &= !bit;
                info!("ALARM CLEARED: DI{}", ch + 1);
                AlarmTransition::Cleared(ch)
            } else {
                continue;
            };
            // Capacity equals the channel count.
            let _ = transitions.push(transition);
        }
        transitions
    }

    pub fn is_latched(&self, channel: usize) -> bool {
        channel < ALARM_CHANNELS && self.latched & (1 << channel) != 0
    }

    /// Latched fault bitmask (0 = no faults).
    pub fn latched_mask(&self) -> u8 {
        self.latched
    }
}
