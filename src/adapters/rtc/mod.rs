//! Battery-backed RTC chips on the I²C bus.
//!
//! Two chips are supported and are interchangeable behind
//! [`PersistentClock`]:
//!
//! | Chip      | Address | Time registers | Power-loss flag        |
//! |-----------|---------|----------------|------------------------|
//! | PCF8563   | 0x51    | BCD from 0x02  | VL, bit 7 of seconds   |
//! | DS3231    | 0x68    | BCD from 0x00  | OSF, bit 7 of reg 0x0F |
//!
//! Both drivers are generic over [`embedded_hal::i2c::I2c`] so the host
//! tests run them against an in-memory register file.

pub mod ds3231;
pub mod pcf8563;

use embedded_hal::i2c::I2c;
use log::info;

use crate::app::ports::PersistentClock;
use crate::datetime::DateTime;
use crate::error::ClockError;

pub use ds3231::Ds3231;
pub use pcf8563::Pcf8563;

pub(crate) fn bcd2dec(v: u8) -> u8 {
    (v >> 4) * 10 + (v & 0x0F)
}

pub(crate) fn dec2bcd(v: u8) -> u8 {
    ((v / 10) << 4) | (v % 10)
}

/// Whichever chip answered on the bus at startup.
pub enum RtcChip<I2C> {
    Pcf8563(Pcf8563<I2C>),
    Ds3231(Ds3231<I2C>),
}

impl<I2C: I2c> RtcChip<I2C> {
    /// Probe the PCF8563 first, then the DS3231.
    ///
    /// When neither answers the PCF8563 driver is kept; its `begin()`
    /// keeps failing and the RTC tier stays disabled.
    pub fn probe(i2c: I2C) -> Self {
        let mut pcf = Pcf8563::new(i2c);
        if pcf.begin() {
            info!("RTC: PCF8563 found at 0x{:02X}", pcf8563::ADDRESS);
            return Self::Pcf8563(pcf);
        }
        let mut ds = Ds3231::new(pcf.release());
        if ds.begin() {
            info!("RTC: DS3231 found at 0x{:02X}", ds3231::ADDRESS);
            return Self::Ds3231(ds);
        }
        info!("RTC: no chip answered");
        Self::Pcf8563(Pcf8563::new(ds.release()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pcf8563(_) => "PCF8563",
            Self::Ds3231(_) => "DS3231",
        }
    }
}

impl<I2C: I2c> PersistentClock for RtcChip<I2C> {
    fn begin(&mut self) -> bool {
        match self {
            Self::Pcf8563(c) => c.begin(),
            Self::Ds3231(c) => c.begin(),
        }
    }

    fn is_unreliable(&mut self) -> bool {
        match self {
            Self::Pcf8563(c) => c.is_unreliable(),
            Self::Ds3231(c) => c.is_unreliable(),
        }
    }

    fn set(&mut self, time: &DateTime) -> Result<(), ClockError> {
        match self {
            Self::Pcf8563(c) => c.set(time),
            Self::Ds3231(c) => c.set(time),
        }
    }

    fn read(&mut self) -> Result<DateTime, ClockError> {
        match self {
            Self::Pcf8563(c) => c.read(),
            Self::Ds3231(c) => c.read(),
        }
    }
}
