//! Relay and status drivers, hardware initialisation, and peripheral helpers.

pub mod heartbeat;
pub mod hw_init;
pub mod relay_board;
pub mod task_pin;
pub mod watchdog;
