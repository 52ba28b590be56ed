//! Wall-clock resolver with tiered fallback.
//!
//! ```text
//!   1. network time (SNTP, 200 ms budget)
//!   2. hardware RTC            ── only if begin() succeeded
//!   3. persisted snapshot      ── "YYYY-MM-DD HH:MM", hour/minute only
//!   4. last good value         ── valid for 60 s
//! ```
//!
//! First success wins and refreshes the cache.  Scheduler and counter
//! reports skip their evaluation when every tier fails.

use log::{info, warn};

use crate::app::ports::{PersistentClock, SnapshotStore, TimeSyncPort};
use crate::datetime::{self, DateTime};
use crate::error::ClockError;

/// Budget for the live-clock tier on every resolve.
pub const SYNC_TIMEOUT_MS: u32 = 200;
/// How long a resolved time may stand in for a failing source.
pub const CACHE_TTL_MS: u32 = 60_000;
/// Budget for waiting on the first SNTP sync after the network comes up.
pub const DISCIPLINE_TIMEOUT_MS: u32 = 5_000;

/// Resolved local time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallTime {
    pub hour: u8,
    pub minute: u8,
    /// Monday = 0.  `None` when the source carries no trustworthy date.
    pub weekday: Option<u8>,
}

impl WallTime {
    /// Minute-of-day, used as the per-minute trigger key.
    pub fn key(&self) -> u16 {
        self.hour as u16 * 60 + self.minute as u16
    }

    fn from_datetime(dt: &DateTime) -> Self {
        Self {
            hour: dt.hour,
            minute: dt.minute,
            weekday: Some(dt.weekday()),
        }
    }
}

/// Which tier produced the last resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeTier {
    Network,
    Rtc,
    Snapshot,
    Cache,
}

pub struct TimeSource {
    rtc_ready: bool,
    cache: Option<(WallTime, u32)>,
    last: Option<WallTime>,
    last_tier: Option<TimeTier>,
}

impl Default for TimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource {
    pub fn new() -> Self {
        Self {
            rtc_ready: false,
            cache: None,
            last: None,
            last_tier: None,
        }
    }

    /// Probe the RTC and, if it lost power, restore it from the snapshot.
    ///
    /// Returns whether the RTC tier is usable.  Never fatal: a missing or
    /// unreliable chip just leaves the other tiers in charge.
    pub fn init_clock(&mut self, clock: &mut impl PersistentClock, store: &impl SnapshotStore) -> bool {
        self.rtc_ready = clock.begin();
        if !self.rtc_ready {
            warn!("TimeSource: RTC not found, running without hardware clock");
            return false;
        }

        if clock.is_unreliable() {
            warn!("TimeSource: RTC lost power");
            match store.load_time_snapshot().and_then(|s| DateTime::from_snapshot(&s)) {
                Some(dt) => match clock.set(&dt) {
                    Ok(()) => info!("TimeSource: RTC restored from snapshot {}", dt.to_snapshot()),
                    Err(e) => warn!("TimeSource: RTC restore failed: {}", e),
                },
                None => warn!("TimeSource: no usable snapshot to restore RTC"),
            }
        }
        info!("TimeSource: RTC ready");
        true
    }

    /// Resolve the current local time, or `None` if every tier failed.
    pub fn resolve(
        &mut self,
        now_ms: u32,
        clock: &mut (impl TimeSyncPort + PersistentClock),
        store: &impl SnapshotStore,
    ) -> Option<WallTime> {
        let resolved = self.try_tiers(now_ms, clock, store);

        let tier = resolved.map(|(_, tier)| tier);
        if tier != self.last_tier {
            match tier {
                Some(t) => info!("TimeSource: now using {:?}", t),
                None => warn!("TimeSource: time unavailable"),
            }
            self.last_tier = tier;
        }

        let time = resolved.map(|(t, _)| t);
        if let Some((t, tier)) = resolved {
            if tier != TimeTier::Cache {
                self.cache = Some((t, now_ms));
            }
        }
        self.last = time;
        time
    }

    fn try_tiers(
        &self,
        now_ms: u32,
        clock: &mut (impl TimeSyncPort + PersistentClock),
        store: &impl SnapshotStore,
    ) -> Option<(WallTime, TimeTier)> {
        if let Some(dt) = clock.local_time(SYNC_TIMEOUT_MS) {
            return Some((WallTime::from_datetime(&dt), TimeTier::Network));
        }

        if self.rtc_ready {
            if let Ok(dt) = clock.read() {
                return Some((WallTime::from_datetime(&dt), TimeTier::Rtc));
            }
        }

        if let Some((hour, minute)) = store
            .load_time_snapshot()
            .and_then(|s| datetime::snapshot_hour_minute(&s))
        {
            return Some((WallTime { hour, minute, weekday: None }, TimeTier::Snapshot));
        }

        match self.cache {
            Some((t, at)) if now_ms.wrapping_sub(at) < CACHE_TTL_MS => Some((t, TimeTier::Cache)),
            _ => None,
        }
    }

    /// Copy network time into the RTC and refresh the snapshot.
    ///
    /// Call once the network is up.  Returns whether network time was
    /// available.
    pub fn discipline(
        &mut self,
        clock: &mut (impl TimeSyncPort + PersistentClock),
        store: &impl SnapshotStore,
    ) -> bool {
        let Some(dt) = clock.local_time(DISCIPLINE_TIMEOUT_MS) else {
            warn!("TimeSource: network time not available yet");
            return false;
        };
        if self.rtc_ready {
            if let Err(e) = clock.set(&dt) {
                warn!("TimeSource: RTC write failed: {}", e);
            }
        }
        if let Err(e) = store.save_time_snapshot(&dt.to_snapshot()) {
            warn!("TimeSource: snapshot save failed: {}", e);
        }
        info!("TimeSource: disciplined to {}", dt.to_snapshot());
        true
    }

    /// Manually set the time: RTC, snapshot and cache.
    pub fn set_time(
        &mut self,
        now_ms: u32,
        dt: &DateTime,
        clock: &mut impl PersistentClock,
        store: &impl SnapshotStore,
    ) -> Result<(), ClockError> {
        if !dt.is_valid() {
            return Err(ClockError::InvalidData);
        }
        let rtc = if self.rtc_ready { clock.set(dt) } else { Err(ClockError::NotReady) };
        if let Err(e) = store.save_time_snapshot(&dt.to_snapshot()) {
            warn!("TimeSource: snapshot save failed: {}", e);
        }
        self.cache = Some((WallTime::from_datetime(dt), now_ms));
        info!("TimeSource: time set to {}", dt.to_snapshot());
        rtc
    }

    /// Last resolved time, `None` if the most recent resolve failed.
    pub fn last_resolved(&self) -> Option<WallTime> {
        self.last
    }

    pub fn rtc_ready(&self) -> bool {
        self.rtc_ready
    }
}
