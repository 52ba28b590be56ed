//! Non-blocking relay hold state machine.
//!
//! Each channel is either idle or holding.  `start` on an idle channel
//! energises the coil and opens a hold window; `start` on a holding
//! channel only pushes the end of the window further out.  The polling
//! loop calls [`RelayActuator::converge`] every tick to release expired
//! holds, so nothing here ever sleeps.
//!
//! ```text
//!            start()                       now ≥ hold_until
//!   Idle ──────────────▶ Holding ─────────────────────────────▶ Idle
//!                        │   ▲          (or fail-safe budget)
//!                start() │   │ extend hold_until
//!                        └───┘
//! ```

use core::fmt;

use log::{info, warn};

use crate::app::ports::RelayPort;
use crate::config::{RELAY_CHANNELS, clamp_hold};

/// Extra time past the granted hold after which the fail-safe path
/// forces the channel off.
pub const FAILSAFE_GRACE_MS: u32 = 5_000;

/// Result of [`RelayActuator::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The coil was energised and a new hold window opened.
    Started,
    /// The channel was already holding; its window was extended.
    Extended { added_secs: u32 },
}

/// Why a channel was stopped before its hold expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Operator request.
    Manual,
    /// Stopped so a test trigger can start a fresh window.
    Restart,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Restart => write!(f, "restart"),
        }
    }
}

/// Which convergence path released a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndPath {
    /// `now >= hold_until`.
    Expired,
    /// Still active past its start + total hold + grace.
    FailSafe,
}

#[derive(Debug, Clone, Copy, Default)]
struct RelayChannelState {
    active: bool,
    started_at_ms: u32,
    hold_until_ms: u32,
    /// Sum of every hold granted since `started_at_ms`.
    total_hold_ms: u32,
}

pub struct RelayActuator {
    channels: [RelayChannelState; RELAY_CHANNELS],
}

impl Default for RelayActuator {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayActuator {
    pub fn new() -> Self {
        Self {
            channels: [RelayChannelState::default(); RELAY_CHANNELS],
        }
    }

    /// Drive every output off.  Call once at boot before the loop starts.
    pub fn release_all(&mut self, port: &mut impl RelayPort) {
        for (ch, state) in self.channels.iter_mut().enumerate() {
            port.set_relay(ch, false);
            *state = RelayChannelState::default();
        }
        info!("Relay: all channels released");
    }

    /// Energise `channel` for `hold_secs`, or extend its running hold.
    ///
    /// Returns `None` for an out-of-range channel.
    pub fn start(
        &mut self,
        channel: usize,
        hold_secs: u32,
        now_ms: u32,
        port: &mut impl RelayPort,
    ) -> Option<StartOutcome> {
        let state = self.channels.get_mut(channel)?;
        let hold_secs = clamp_hold(hold_secs);
        let hold_ms = hold_secs * 1_000;

        if state.active {
            state.hold_until_ms = state.hold_until_ms.wrapping_add(hold_ms);
            state.total_hold_ms = state.total_hold_ms.saturating_add(hold_ms);
            info!("Relay: CH{} extended by {}s", channel + 1, hold_secs);
            return Some(StartOutcome::Extended { added_secs: hold_secs });
        }

        port.set_relay(channel, true);
        *state = RelayChannelState {
            active: true,
            started_at_ms: now_ms,
            hold_until_ms: now_ms.wrapping_add(hold_ms),
            total_hold_ms: hold_ms,
        };
        info!("Relay: CH{} on for {}s", channel + 1, hold_secs);
        Some(StartOutcome::Started)
    }

    /// Release `channel` immediately, whatever its timer says.
    ///
    /// Returns whether the channel was holding.
    pub fn stop(&mut self, channel: usize, reason: StopReason, port: &mut impl RelayPort) -> bool {
        let Some(state) = self.channels.get_mut(channel) else {
            return false;
        };
        port.set_relay(channel, false);
        let was_active = core::mem::replace(&mut state.active, false);
        info!("Relay: CH{} stopped ({})", channel + 1, reason);
        was_active
    }

    /// Release every channel whose hold has ended.
    ///
    /// Each channel appears in the result at most once per hold window.
    pub fn converge(
        &mut self,
        now_ms: u32,
        port: &mut impl RelayPort,
    ) -> heapless::Vec<(usize, EndPath), RELAY_CHANNELS> {
        let mut ended = heapless::Vec::new();
        for (ch, state) in self.channels.iter_mut().enumerate() {
            if !state.active {
                continue;
            }
            let path = if now_ms.wrapping_sub(state.hold_until_ms) as i32 >= 0 {
                EndPath::Expired
            } else if now_ms.wrapping_sub(state.started_at_ms)
                > state.total_hold_ms.saturating_add(FAILSAFE_GRACE_MS)
            {
                warn!("Relay: CH{} fail-safe release", ch + 1);
                EndPath::FailSafe
            } else {
                continue;
            };

            port.set_relay(ch, false);
            state.active = false;
            info!("Relay: CH{} off", ch + 1);
            // Capacity equals the channel count.
            let _ = ended.push((ch, path));
        }
        ended
    }

    pub fn is_active(&self, channel: usize) -> bool {
        self.channels.get(channel).is_some_and(|s| s.active)
    }

    /// Milliseconds until the hold on `channel` ends; 0 when idle.
    pub fn remaining_ms(&self, channel: usize, now_ms: u32) -> u32 {
        match self.channels.get(channel) {
            Some(s) if s.active => (s.hold_until_ms.wrapping_sub(now_ms) as i32).max(0) as u32,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Outputs {
        level: [bool; RELAY_CHANNELS],
        writes: Vec<(usize, bool)>,
    }

    impl RelayPort for Outputs {
        fn set_relay(&mut self, channel: usize, on: bool) {
            self.level[channel] = on;
            self.writes.push((channel, on));
        }
    }

    #[test]
    fn start_holds_then_expires_exactly_once() {
        let mut relays = RelayActuator::new();
        let mut out = Outputs::default();
        assert_eq!(relays.start(2, 3, 1_000, &mut out), Some(StartOutcome::Started));
        assert!(out.level[2]);
        assert_eq!(relays.remaining_ms(2, 2_000), 2_000);

        assert!(relays.converge(3_999, &mut out).is_empty());
        let ended = relays.converge(4_000, &mut out);
        assert_eq!(ended.as_slice(), &[(2, EndPath::Expired)]);
        assert!(!out.level[2]);
        assert!(relays.converge(10_000, &mut out).is_empty());
        assert_eq!(relays.remaining_ms(2, 4_000), 0);
    }

    #[test]
    fn retrigger_extends_without_reasserting() {
        let mut relays = RelayActuator::new();
        let mut out = Outputs::default();
        relays.start(0, 10, 0, &mut out);
        let writes_before = out.writes.len();

        assert_eq!(
            relays.start(0, 5, 4_000, &mut out),
            Some(StartOutcome::Extended { added_secs: 5 })
        );
        assert_eq!(out.writes.len(), writes_before, "no second write to the coil");
        assert_eq!(relays.remaining_ms(0, 4_000), 11_000);

        assert!(relays.converge(14_999, &mut out).is_empty());
        assert_eq!(relays.converge(15_000, &mut out).as_slice(), &[(0, EndPath::Expired)]);
    }

    #[test]
    fn zero_hold_is_clamped_to_one_second() {
        let mut relays = RelayActuator::new();
        let mut out = Outputs::default();
        relays.start(1, 0, 0, &mut out);
        assert_eq!(relays.remaining_ms(1, 0), 1_000);
        relays.start(4, 10_000, 0, &mut out);
        assert_eq!(relays.remaining_ms(4, 0), 3_600_000);
    }

    #[test]
    fn stop_always_releases() {
        let mut relays = RelayActuator::new();
        let mut out = Outputs::default();
        relays.start(5, 60, 0, &mut out);
        assert!(relays.stop(5, StopReason::Manual, &mut out));
        assert!(!out.level[5]);
        assert!(!relays.is_active(5));
        assert!(relays.converge(120_000, &mut out).is_empty());

        // Idle channel: still driven off, reports it was idle.
        assert!(!relays.stop(3, StopReason::Manual, &mut out));
        assert_eq!(out.writes.last(), Some(&(3, false)));
    }

    #[test]
    fn fail_safe_catches_a_corrupted_deadline() {
        let mut relays = RelayActuator::new();
        let mut out = Outputs::default();
        relays.start(0, 2, 1_000, &mut out);
        // Simulate a deadline that jumped far into the future.
        relays.channels[0].hold_until_ms = 1_000 + 1_000_000;

        assert!(relays.converge(1_000 + 2_000 + FAILSAFE_GRACE_MS, &mut out).is_empty());
        let ended = relays.converge(1_000 + 2_000 + FAILSAFE_GRACE_MS + 1, &mut out);
        assert_eq!(ended.as_slice(), &[(0, EndPath::FailSafe)]);
        assert!(!out.level[0]);
    }

    #[test]
    fn expiry_survives_millis_wraparound() {
        let mut relays = RelayActuator::new();
        let mut out = Outputs::default();
        let start = u32::MAX - 500;
        relays.start(0, 1, start, &mut out);
        assert!(relays.converge(start.wrapping_add(999), &mut out).is_empty());
        assert_eq!(relays.converge(start.wrapping_add(1_000), &mut out).len(), 1);
    }

    #[test]
    fn out_of_range_channel_is_ignored() {
        let mut relays = RelayActuator::new();
        let mut out = Outputs::default();
        assert_eq!(relays.start(RELAY_CHANNELS, 3, 0, &mut out), None);
        assert!(out.writes.is_empty());
    }
}
