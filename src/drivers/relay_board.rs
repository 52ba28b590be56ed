//! Six-channel relay board driver.
//!
//! Boards come in two polarities: most opto-isolated modules energise
//! the coil on a LOW input.  The driver hides the polarity so the rest
//! of the firmware only speaks "on" and "off".

use crate::config::RELAY_CHANNELS;
use crate::drivers::hw_init;

pub struct RelayBoard {
    gpios: [i32; RELAY_CHANNELS],
    active_low: bool,
    state: [bool; RELAY_CHANNELS],
}

impl RelayBoard {
    pub fn new(gpios: [i32; RELAY_CHANNELS], active_low: bool) -> Self {
        Self {
            gpios,
            active_low,
            state: [false; RELAY_CHANNELS],
        }
    }

    /// Electrical level that produces the logical state `on`.
    fn level(&self, on: bool) -> bool {
        on != self.active_low
    }

    pub fn set(&mut self, channel: usize, on: bool) {
        let Some(&pin) = self.gpios.get(channel) else {
            return;
        };
        hw_init::gpio_write(pin, self.level(on));
        self.state[channel] = on;
    }

    /// Switch polarity and re-drive every output so each relay keeps its
    /// logical state.
    pub fn set_active_low(&mut self, active_low: bool) {
        if self.active_low == active_low {
            return;
        }
        self.active_low = active_low;
        for (&pin, &on) in self.gpios.iter().zip(&self.state) {
            hw_init::gpio_write(pin, on != active_low);
        }
        log::info!("RelayBoard: polarity now active-{}", if active_low { "low" } else { "high" });
    }

    pub fn is_active_low(&self) -> bool {
        self.active_low
    }

    pub fn is_on(&self, channel: usize) -> bool {
        self.state.get(channel).copied().unwrap_or(false)
    }
}
