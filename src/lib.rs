//! RelayBox firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod alarms;
pub mod app;
pub mod config;
pub mod datetime;
pub mod error;
pub mod notify;
pub mod pins;
pub mod relay;
pub mod reporter;
pub mod scheduler;
pub mod time_source;

// Hardware-facing modules; the ESP-IDF implementations are guarded by
// cfg attributes inside and fall back to simulation stubs on the host.
pub mod adapters;
pub mod drivers;
pub mod sensors;
