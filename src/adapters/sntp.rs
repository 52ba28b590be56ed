//! Network-disciplined wall clock.
//!
//! [`NetClock`] owns the SNTP client and the hardware RTC, so the
//! [`TimeSource`](crate::time_source::TimeSource) resolver sees one
//! object implementing both [`TimeSyncPort`] and [`PersistentClock`].
//!
//! - **`target_os = "espidf"`** — `EspSntp` against `pool.ntp.org`,
//!   started once the station has an address.  The system clock is read
//!   through `std::time::SystemTime`, which ESP-IDF backs with
//!   `gettimeofday`.
//! - **`not(target_os = "espidf")`** — no network time until
//!   [`NetClock::start_sync`] is called, then the host clock.

use embedded_hal::i2c::I2c;
use log::{info, warn};

use crate::adapters::rtc::RtcChip;
use crate::app::ports::{PersistentClock, TimeSyncPort};
use crate::datetime::DateTime;
use crate::error::ClockError;

/// Anything earlier than 2020-01-01 means the clock was never set.
pub const EPOCH_2020: i64 = 1_577_836_800;

/// Poll step while waiting for a pending sync.
const SYNC_POLL_MS: u32 = 10;

/// Shift Unix seconds into local time, rejecting an unsynchronised clock.
pub fn local_from_unix(unix_secs: i64, utc_offset_minutes: i16) -> Option<DateTime> {
    if unix_secs < EPOCH_2020 {
        return None;
    }
    DateTime::from_unix(unix_secs + i64::from(utc_offset_minutes) * 60)
}

pub struct NetClock<I2C> {
    rtc: RtcChip<I2C>,
    utc_offset_minutes: i16,
    #[cfg(target_os = "espidf")]
    sntp: Option<esp_idf_svc::sntp::EspSntp<'static>>,
    #[cfg(not(target_os = "espidf"))]
    sim_synced: bool,
}

impl<I2C: I2c> NetClock<I2C> {
    pub fn new(rtc: RtcChip<I2C>, utc_offset_minutes: i16) -> Self {
        Self {
            rtc,
            utc_offset_minutes,
            #[cfg(target_os = "espidf")]
            sntp: None,
            #[cfg(not(target_os = "espidf"))]
            sim_synced: false,
        }
    }

    /// Applies from the next read; the RTC keeps local time and is not
    /// rewritten until the next discipline.
    pub fn set_utc_offset(&mut self, utc_offset_minutes: i16) {
        if self.utc_offset_minutes != utc_offset_minutes {
            info!("SNTP: UTC offset {:+} -> {:+} min", self.utc_offset_minutes, utc_offset_minutes);
            self.utc_offset_minutes = utc_offset_minutes;
        }
    }

    pub fn utc_offset(&self) -> i16 {
        self.utc_offset_minutes
    }

    /// Start SNTP.  Idempotent; returns whether a client is running.
    #[cfg(target_os = "espidf")]
    pub fn start_sync(&mut self) -> bool {
        if self.sntp.is_some() {
            return true;
        }
        match esp_idf_svc::sntp::EspSntp::new_default() {
            Ok(sntp) => {
                info!("SNTP: started (pool.ntp.org, UTC{:+}min)", self.utc_offset_minutes);
                self.sntp = Some(sntp);
                true
            }
            Err(e) => {
                warn!("SNTP: start failed: {}", e);
                false
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn start_sync(&mut self) -> bool {
        if !self.sim_synced {
            info!("SNTP(sim): using host clock");
        }
        self.sim_synced = true;
        true
    }

    #[cfg(target_os = "espidf")]
    fn sync_running(&self) -> bool {
        self.sntp.is_some()
    }

    #[cfg(not(target_os = "espidf"))]
    fn sync_running(&self) -> bool {
        self.sim_synced
    }

    fn now_local(&self) -> Option<DateTime> {
        let unix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()?
            .as_secs();
        local_from_unix(i64::try_from(unix).ok()?, self.utc_offset_minutes)
    }

    pub fn rtc_name(&self) -> &'static str {
        self.rtc.name()
    }
}

impl<I2C: I2c> TimeSyncPort for NetClock<I2C> {
    fn local_time(&mut self, timeout_ms: u32) -> Option<DateTime> {
        if !self.sync_running() {
            return None;
        }
        let mut waited = 0;
        loop {
            if let Some(dt) = self.now_local() {
                return Some(dt);
            }
            if waited >= timeout_ms {
                return None;
            }
            std::thread::sleep(std::time::Duration::from_millis(u64::from(SYNC_POLL_MS)));
            waited += SYNC_POLL_MS;
        }
    }
}

impl<I2C: I2c> PersistentClock for NetClock<I2C> {
    fn begin(&mut self) -> bool {
        self.rtc.begin()
    }

    fn is_unreliable(&mut self) -> bool {
        self.rtc.is_unreliable()
    }

    fn set(&mut self, time: &DateTime) -> Result<(), ClockError> {
        self.rtc.set(time)
    }

    fn read(&mut self) -> Result<DateTime, ClockError> {
        self.rtc.read()
    }
}
