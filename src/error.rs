//! Unified error types for the RelayBox firmware.
//!
//! A single `Error` enum that every subsystem can convert into, keeping
//! bootstrap error handling in `main` uniform.  All variants are `Copy`
//! so they pass through the polling loop without allocation.

use core::fmt;

use crate::drivers::hw_init::HwInitError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The hardware RTC could not be read or written.
    Clock(ClockError),
    /// A notification could not be delivered.
    Delivery(DeliveryError),
    /// Peripheral initialisation failed.
    Init(HwInitError),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clock(e) => write!(f, "clock: {e}"),
            Self::Delivery(e) => write!(f, "delivery: {e}"),
            Self::Init(e) => write!(f, "init: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

impl From<HwInitError> for Error {
    fn from(e: HwInitError) -> Self {
        Self::Init(e)
    }
}

// ---------------------------------------------------------------------------
// Clock errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    /// The I²C transaction was NACKed or timed out.
    Bus,
    /// The chip returned a register image that is not a valid date.
    InvalidData,
    /// `begin()` has not succeeded yet.
    NotReady,
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus => write!(f, "I2C bus error"),
            Self::InvalidData => write!(f, "invalid register contents"),
            Self::NotReady => write!(f, "RTC not initialised"),
        }
    }
}

impl From<ClockError> for Error {
    fn from(e: ClockError) -> Self {
        Self::Clock(e)
    }
}

// ---------------------------------------------------------------------------
// Delivery errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// Bot token or recipient is empty.
    NotConfigured,
    /// The HTTP request could not be sent or timed out.
    Connection,
    /// The server answered with a non-200 status.
    Status(u16),
    /// The server answered 200 but the body did not carry `"ok": true`.
    Rejected,
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "token or recipient not configured"),
            Self::Connection => write!(f, "connection failed"),
            Self::Status(code) => write!(f, "HTTP status {code}"),
            Self::Rejected => write!(f, "negative acknowledgement"),
        }
    }
}

impl From<DeliveryError> for Error {
    fn from(e: DeliveryError) -> Self {
        Self::Delivery(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_nests_subsystem_prefix() {
        let e: Error = ClockError::Bus.into();
        assert_eq!(e.to_string(), "clock: I2C bus error");
        let e: Error = DeliveryError::Status(502).into();
        assert_eq!(e.to_string(), "delivery: HTTP status 502");
    }
}
