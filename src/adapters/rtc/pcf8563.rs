//! NXP PCF8563 real-time clock.
//!
//! The chip has no dedicated power-loss flag; the VL bit in the seconds
//! register is set when the supply dropped below the oscillator's
//! minimum and is cleared by writing the seconds register.

use embedded_hal::i2c::I2c;

use super::{bcd2dec, dec2bcd};
use crate::app::ports::PersistentClock;
use crate::datetime::DateTime;
use crate::error::ClockError;

pub const ADDRESS: u8 = 0x51;

const REG_SECONDS: u8 = 0x02;
const VL_BIT: u8 = 0x80;

pub struct Pcf8563<I2C> {
    i2c: I2C,
}

impl<I2C: I2c> Pcf8563<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    /// Give the bus back.
    pub fn release(self) -> I2C {
        self.i2c
    }

    fn read_regs(&mut self, buf: &mut [u8]) -> Result<(), ClockError> {
        self.i2c
            .write_read(ADDRESS, &[REG_SECONDS], buf)
            .map_err(|_| ClockError::Bus)
    }
}

impl<I2C: I2c> PersistentClock for Pcf8563<I2C> {
    fn begin(&mut self) -> bool {
        self.read_regs(&mut [0u8; 1]).is_ok()
    }

    fn is_unreliable(&mut self) -> bool {
        let mut sec = [0u8; 1];
        // A chip that cannot be read cannot be trusted either.
        self.read_regs(&mut sec).map_or(true, |()| sec[0] & VL_BIT != 0)
    }

    fn set(&mut self, t: &DateTime) -> Result<(), ClockError> {
        // Chip weekday counts from Sunday = 0.
        let weekday = (t.weekday() + 1) % 7;
        let frame = [
            REG_SECONDS,
            dec2bcd(t.second) & 0x7F,
            dec2bcd(t.minute) & 0x7F,
            dec2bcd(t.hour) & 0x3F,
            dec2bcd(t.day) & 0x3F,
            weekday,
            dec2bcd(t.month) & 0x1F,
            dec2bcd((t.year % 100) as u8),
        ];
        self.i2c.write(ADDRESS, &frame).map_err(|_| ClockError::Bus)
    }

    fn read(&mut self) -> Result<DateTime, ClockError> {
        let mut r = [0u8; 7];
        self.read_regs(&mut r)?;
        DateTime::new(
            2000 + u16::from(bcd2dec(r[6])),
            bcd2dec(r[5] & 0x1F),
            bcd2dec(r[3] & 0x3F),
            bcd2dec(r[2] & 0x3F),
            bcd2dec(r[1] & 0x7F),
            bcd2dec(r[0] & 0x7F),
        )
        .ok_or(ClockError::InvalidData)
    }
}
