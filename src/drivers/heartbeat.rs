//! Wi-Fi heartbeat LED.
//!
//! While the station is connected the on-board LED double-blinks once a
//! cycle (on 200, off 200, on 200, off 650 ms).  Disconnected, it stays
//! dark.  Driven from the polling loop; `tick` never sleeps.

use crate::drivers::hw_init;

/// Duty used for the "on" phases (8-bit).
pub const BLINK_DUTY: u8 = 120;

/// Phase lengths in ms: on, off, on, off.
const PHASES_MS: [u32; 4] = [200, 200, 200, 650];

pub struct Heartbeat {
    phase: usize,
    phase_started_ms: u32,
    duty: u8,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

impl Heartbeat {
    pub fn new() -> Self {
        Self {
            phase: 0,
            phase_started_ms: 0,
            duty: 0,
        }
    }

    /// Advance the pattern.  Returns the duty now applied.
    pub fn tick(&mut self, now_ms: u32, connected: bool) -> u8 {
        let duty = if connected {
            while now_ms.wrapping_sub(self.phase_started_ms) >= PHASES_MS[self.phase] {
                self.phase_started_ms = self.phase_started_ms.wrapping_add(PHASES_MS[self.phase]);
                self.phase = (self.phase + 1) % PHASES_MS.len();
            }
            if self.phase % 2 == 0 { BLINK_DUTY } else { 0 }
        } else {
            self.phase = 0;
            self.phase_started_ms = now_ms;
            0
        };

        if duty != self.duty {
            hw_init::ledc_set(hw_init::LEDC_CH_HEARTBEAT, duty);
            self.duty = duty;
        }
        duty
    }
}
