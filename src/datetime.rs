//! Calendar date/time value shared by the RTC drivers, the SNTP adapter
//! and the persisted time snapshot.

use core::fmt::Write;

/// Minimum length of a usable snapshot (`YYYY-MM-DD HH:MM`).
pub const SNAPSHOT_LEN: usize = 16;

/// Local calendar time with one-second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DateTime {
    /// Build a value, rejecting anything that is not a real calendar time.
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Option<Self> {
        let dt = Self { year, month, day, hour, minute, second };
        dt.is_valid().then_some(dt)
    }

    pub fn is_valid(&self) -> bool {
        (2000..=2099).contains(&self.year)
            && (1..=12).contains(&self.month)
            && self.day >= 1
            && self.day <= days_in_month(self.year, self.month)
            && self.hour < 24
            && self.minute < 60
            && self.second < 60
    }

    /// Day of week with Monday = 0 … Sunday = 6.
    pub fn weekday(&self) -> u8 {
        // Sakamoto's method yields Sunday = 0.
        const T: [u16; 12] = [0, 3, 2, 5, 0, 3, 5, 1, 4, 6, 2, 4];
        let mut y = self.year;
        if self.month < 3 {
            y -= 1;
        }
        let sunday_based =
            (y + y / 4 - y / 100 + y / 400 + T[self.month as usize - 1] + self.day as u16) % 7;
        ((sunday_based + 6) % 7) as u8
    }

    /// Render as `YYYY-MM-DD HH:MM`, the persisted snapshot format.
    pub fn to_snapshot(&self) -> heapless::String<SNAPSHOT_LEN> {
        let mut s = heapless::String::new();
        let _ = write!(
            s,
            "{:04}-{:02}-{:02} {:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute
        );
        s
    }

    /// Convert Unix seconds to a calendar time.  `None` outside the
    /// years [`DateTime`] can represent.
    pub fn from_unix(secs: i64) -> Option<Self> {
        let days = secs.div_euclid(86_400);
        let sod = secs.rem_euclid(86_400);

        // Days-to-civil on a March-based year.
        let z = days + 719_468;
        let era = z.div_euclid(146_097);
        let doe = z - era * 146_097;
        let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let day = doy - (153 * mp + 2) / 5 + 1;
        let month = if mp < 10 { mp + 3 } else { mp - 9 };
        let year = yoe + era * 400 + i64::from(month <= 2);

        Self::new(
            u16::try_from(year).ok()?,
            month as u8,
            day as u8,
            (sod / 3_600) as u8,
            (sod % 3_600 / 60) as u8,
            (sod % 60) as u8,
        )
    }

    /// Parse a full `YYYY-MM-DD HH:MM` snapshot (seconds are zeroed).
    pub fn from_snapshot(text: &str) -> Option<Self> {
        let b = text.as_bytes();
        if b.len() < SNAPSHOT_LEN || b[4] != b'-' || b[7] != b'-' || b[13] != b':' {
            return None;
        }
        let year = digits(text, 0, 4)?;
        let month = digits(text, 5, 7)?;
        let day = digits(text, 8, 10)?;
        let (hour, minute) = snapshot_hour_minute(text)?;
        Self::new(year, month as u8, day as u8, hour, minute, 0)
    }
}

/// Extract `(hour, minute)` from a snapshot string.
///
/// Only the time-of-day fields are inspected so a snapshot with a stale or
/// odd date still yields a usable time.
pub fn snapshot_hour_minute(text: &str) -> Option<(u8, u8)> {
    if text.len() < SNAPSHOT_LEN {
        return None;
    }
    let hour = digits(text, 11, 13)?;
    let minute = digits(text, 14, 16)?;
    (hour < 24 && minute < 60).then_some((hour as u8, minute as u8))
}

fn digits(text: &str, start: usize, end: usize) -> Option<u16> {
    let field = text.get(start..end)?;
    if !field.bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        _ => 31,
    }
}
