//! Maxim DS3231 temperature-compensated RTC.

use embedded_hal::i2c::I2c;

use super::{bcd2dec, dec2bcd};
use crate::app::ports::PersistentClock;
use crate::datetime::DateTime;
use crate::error::ClockError;

pub const ADDRESS: u8 = 0x68;

const REG_SECONDS: u8 = 0x00;
const REG_STATUS: u8 = 0x0F;
/// Oscillator Stop Flag: the oscillator stopped at some point.
const OSF_BIT: u8 = 0x80;
/// Hours register bit 6: 12-hour mode.
const HOUR_12H: u8 = 0x40;
const HOUR_PM: u8 = 0x20;

pub struct Ds3231<I2C> {
    i2c: I2C,
}

impl<I2C: I2c> Ds3231<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, ClockError> {
        let mut v = [0u8; 1];
        self.i2c
            .write_read(ADDRESS, &[reg], &mut v)
            .map_err(|_| ClockError::Bus)?;
        Ok(v[0])
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), ClockError> {
        self.i2c.write(ADDRESS, &[reg, value]).map_err(|_| ClockError::Bus)
    }
}

fn decode_hour(raw: u8) -> u8 {
    if raw & HOUR_12H == 0 {
        return bcd2dec(raw & 0x3F);
    }
    let h12 = bcd2dec(raw & 0x1F) % 12;
    if raw & HOUR_PM != 0 { h12 + 12 } else { h12 }
}

impl<I2C: I2c> PersistentClock for Ds3231<I2C> {
    fn begin(&mut self) -> bool {
        self.read_reg(REG_STATUS).is_ok()
    }

    fn is_unreliable(&mut self) -> bool {
        self.read_reg(REG_STATUS).map_or(true, |s| s & OSF_BIT != 0)
    }

    fn set(&mut self, t: &DateTime) -> Result<(), ClockError> {
        let frame = [
            REG_SECONDS,
            dec2bcd(t.second),
            dec2bcd(t.minute),
            // 24-hour mode.
            dec2bcd(t.hour) & 0x3F,
            // Day-of-week register runs 1..=7; Monday = 1 here.
            t.weekday() + 1,
            dec2bcd(t.day),
            dec2bcd(t.month),
            dec2bcd((t.year % 100) as u8),
        ];
        self.i2c.write(ADDRESS, &frame).map_err(|_| ClockError::Bus)?;
        let status = self.read_reg(REG_STATUS)?;
        self.write_reg(REG_STATUS, status & !OSF_BIT)
    }

    fn read(&mut self) -> Result<DateTime, ClockError> {
        let mut r = [0u8; 7];
        self.i2c
            .write_read(ADDRESS, &[REG_SECONDS], &mut r)
            .map_err(|_| ClockError::Bus)?;
        DateTime::new(
            2000 + u16::from(bcd2dec(r[6])),
            bcd2dec(r[5] & 0x1F),
            bcd2dec(r[4] & 0x3F),
            decode_hour(r[2]),
            bcd2dec(r[1] & 0x7F),
            bcd2dec(r[0] & 0x7F),
        )
        .ok_or(ClockError::InvalidData)
    }
}
