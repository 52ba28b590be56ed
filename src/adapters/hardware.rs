//! Hardware adapter — bridges real peripherals to domain port traits.
//!
//! Owns the [`RelayBoard`] and the [`InputBank`], exposing them through
//! [`RelayPort`] and [`InputPort`].  This is the only module in the
//! system that touches GPIO.  On non-espidf targets, the underlying
//! drivers use cfg-gated simulation stubs.

use crate::app::ports::{InputLevels, InputPort, RelayPort};
use crate::drivers::relay_board::RelayBoard;
use crate::sensors::InputBank;

/// Concrete adapter that combines all hardware behind port traits.
pub struct HardwareAdapter {
    relays: RelayBoard,
    inputs: InputBank,
}

impl HardwareAdapter {
    pub fn new(relays: RelayBoard, inputs: InputBank) -> Self {
        Self { relays, inputs }
    }

    pub fn set_relay_active_low(&mut self, active_low: bool) {
        self.relays.set_active_low(active_low);
    }

    pub fn relay_on(&self, channel: usize) -> bool {
        self.relays.is_on(channel)
    }
}

// ── RelayPort implementation ──────────────────────────────────

impl RelayPort for HardwareAdapter {
    fn set_relay(&mut self, channel: usize, on: bool) {
        self.relays.set(channel, on);
    }
}

// ── InputPort implementation ──────────────────────────────────

impl InputPort for HardwareAdapter {
    fn read_inputs(&mut self) -> InputLevels {
        self.inputs.read()
    }
}
