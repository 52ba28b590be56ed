//! GPIO / peripheral pin assignments for the RelayBox controller board.
//!
//! Single source of truth — every driver references this module rather than
//! hard-coding pin numbers.  Channel order in each array is the user-facing
//! channel order (index 0 = CH1).

use crate::config::{ALARM_CHANNELS, COUNTER_CHANNELS, RELAY_CHANNELS};

// ---------------------------------------------------------------------------
// Relay outputs (6-channel opto-isolated relay board)
// ---------------------------------------------------------------------------

/// Relay coil drivers, CH1..CH6.
pub const RELAY_GPIOS: [i32; RELAY_CHANNELS] = [12, 13, 14, 26, 27, 32];

// ---------------------------------------------------------------------------
// Fault inputs (dry contacts to GND, internal pull-up)
// ---------------------------------------------------------------------------

/// Alarm inputs DI1..DI6.  LOW = fault contact closed.
pub const ALARM_GPIOS: [i32; ALARM_CHANNELS] = [16, 17, 18, 19, 23, 25];

// ---------------------------------------------------------------------------
// Pulse counters (NPN sensor outputs, internal pull-up)
// ---------------------------------------------------------------------------

/// Production-line counters CNT1..CNT2.  Falling edge = one piece.
pub const COUNTER_GPIOS: [i32; COUNTER_CHANNELS] = [4, 15];

// ---------------------------------------------------------------------------
// I²C bus (RTC: PCF8563 or DS3231)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 21;
pub const I2C_SCL_GPIO: i32 = 22;
/// 100 kHz keeps both RTC chips happy on long ribbon cables.
pub const I2C_FREQ_HZ: u32 = 100_000;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// On-board blue LED, driven by LEDC for the Wi-Fi heartbeat.
pub const HEARTBEAT_LED_GPIO: i32 = 2;
/// LEDC base frequency for the heartbeat LED.
pub const HEARTBEAT_PWM_FREQ_HZ: u32 = 5_000;
