//! Input subsystem — pulse counters and the polled digital-input bank.
//!
//! [`InputBank`] samples every alarm and counter GPIO once per loop
//! iteration; the counter edges themselves arrive through the GPIO ISRs
//! registered in [`hw_init`](crate::drivers::hw_init), which land in
//! [`PULSE_SHARED`].

pub mod pulse_counter;

use crate::app::ports::InputLevels;
use crate::config::{ALARM_CHANNELS, COUNTER_CHANNELS};
use crate::drivers::hw_init::gpio_read;
use pulse_counter::PulseShared;

/// Raw counter state shared with the edge ISRs.
/// `static` because ISR callbacks in ESP-IDF cannot capture closures.
pub static PULSE_SHARED: PulseShared = PulseShared::new();

/// Called from the GPIO ISR of counter `channel` on each falling edge.
pub fn counter_isr_handler(channel: usize, now_us: u32) {
    PULSE_SHARED.on_edge(channel, now_us);
}

/// Samples the alarm and counter inputs.
pub struct InputBank {
    alarm_gpios: [i32; ALARM_CHANNELS],
    counter_gpios: [i32; COUNTER_CHANNELS],
}

impl InputBank {
    pub fn new(alarm_gpios: [i32; ALARM_CHANNELS], counter_gpios: [i32; COUNTER_CHANNELS]) -> Self {
        Self { alarm_gpios, counter_gpios }
    }

    pub fn read(&self) -> InputLevels {
        InputLevels {
            counters: self.counter_gpios.map(gpio_read),
            alarms: self.alarm_gpios.map(gpio_read),
        }
    }
}
