//! System configuration parameters
//!
//! All tunable parameters for the RelayBox controller.  Values are loaded
//! from NVS at boot and may be replaced at runtime; every consumer sees
//! them only after [`SystemConfig::sanitized`] has clamped them into range.

use serde::{Deserialize, Serialize};

/// Relay output channels on the board.
pub const RELAY_CHANNELS: usize = 6;
/// Dry-contact fault inputs.
pub const ALARM_CHANNELS: usize = 6;
/// Interrupt-driven pulse counters.
pub const COUNTER_CHANNELS: usize = 2;

/// Shortest relay hold accepted, in seconds.
pub const MIN_HOLD_SECS: u32 = 1;
/// Longest relay hold accepted, in seconds (one hour).
pub const MAX_HOLD_SECS: u32 = 3600;

/// Capacity of user-facing message labels.
pub const LABEL_CAP: usize = 64;
/// Short bounded text used for user-editable labels.
pub type Label = heapless::String<LABEL_CAP>;

/// Copy `text` into a bounded string, truncating at a char boundary.
pub fn bounded<const N: usize>(text: &str) -> heapless::String<N> {
    let mut end = text.len().min(N);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = heapless::String::new();
    // Cannot fail: `end <= N` and lies on a char boundary.
    let _ = out.push_str(&text[..end]);
    out
}

// ---------------------------------------------------------------------------
// Weekday mask
// ---------------------------------------------------------------------------

/// Seven-bit enable set, bit *i* = weekday *i* (Monday = 0 … Sunday = 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekdayMask(u8);

impl WeekdayMask {
    pub const ALL: Self = Self(0x7F);

    /// Build a mask, discarding any bit above Sunday.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x7F)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether `weekday` (Monday = 0) is enabled.
    ///
    /// An unknown weekday is treated as enabled so a clock outage never
    /// silently suspends every schedule.
    pub fn allows(self, weekday: Option<u8>) -> bool {
        match weekday {
            Some(d) if d < 7 => self.0 & (1 << d) != 0,
            _ => true,
        }
    }
}

impl Default for WeekdayMask {
    fn default() -> Self {
        Self::ALL
    }
}

// ---------------------------------------------------------------------------
// Per-channel configuration
// ---------------------------------------------------------------------------

/// Daily firing time and hold for one relay channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSchedule {
    pub hour: u8,
    pub minute: u8,
    /// Relay hold once fired, clamped to [`MIN_HOLD_SECS`]..=[`MAX_HOLD_SECS`].
    pub hold_secs: u32,
    /// Sent when the schedule fires; the end-of-hold notice appends " off".
    pub message: Label,
}

impl Default for ChannelSchedule {
    fn default() -> Self {
        Self {
            hour: 8,
            minute: 0,
            hold_secs: 3,
            message: bounded("Relay!"),
        }
    }
}

/// Reporting policy for one pulse counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterChannelConfig {
    pub daily_hour: u8,
    pub daily_minute: u8,
    pub message: Label,
    /// Threshold report target; 0 disables threshold mode.  Only CNT1
    /// supports threshold mode.
    pub target: u32,
}

impl Default for CounterChannelConfig {
    fn default() -> Self {
        Self {
            daily_hour: 8,
            daily_minute: 0,
            message: bounded("Piece count"),
            target: 0,
        }
    }
}

/// Clamp a hold duration into the accepted range.
pub fn clamp_hold(secs: u32) -> u32 {
    secs.clamp(MIN_HOLD_SECS, MAX_HOLD_SECS)
}

// ---------------------------------------------------------------------------
// System configuration
// ---------------------------------------------------------------------------

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Network ---
    pub wifi_ssid: heapless::String<32>,
    pub wifi_password: heapless::String<64>,

    // --- Notifications ---
    /// Telegram bot token; empty disables delivery.
    pub bot_token: heapless::String<64>,
    /// Telegram chat id of the recipient.
    pub chat_id: heapless::String<32>,
    /// Send a message when a latched alarm clears.
    pub notify_alarm_recovery: bool,

    // --- Relays ---
    pub schedules: [ChannelSchedule; RELAY_CHANNELS],
    /// Days on which relay schedules and daily counter reports run.
    pub weekday_mask: WeekdayMask,
    /// Board polarity: true when a LOW output energises the coil.
    pub relay_active_low: bool,

    // --- Inputs ---
    pub alarm_messages: [Label; ALARM_CHANNELS],
    pub counters: [CounterChannelConfig; COUNTER_CHANNELS],

    // --- Time ---
    /// Local offset from UTC applied to network time.
    pub utc_offset_minutes: i16,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: heapless::String::new(),
            wifi_password: heapless::String::new(),
            bot_token: heapless::String::new(),
            chat_id: heapless::String::new(),
            notify_alarm_recovery: false,
            schedules: core::array::from_fn(|_| ChannelSchedule::default()),
            weekday_mask: WeekdayMask::ALL,
            relay_active_low: false,
            alarm_messages: core::array::from_fn(|i| {
                let mut label = Label::new();
                let _ = core::fmt::write(&mut label, format_args!("Fault CH{}", i + 1));
                label
            }),
            counters: core::array::from_fn(|_| CounterChannelConfig::default()),
            utc_offset_minutes: 8 * 60,
        }
    }
}

impl SystemConfig {
    /// Clamp every field into its valid range.
    ///
    /// Out-of-range values are never rejected: a bad stored config must
    /// degrade to something runnable rather than stop the schedule engine.
    pub fn sanitized(mut self) -> Self {
        for s in &mut self.schedules {
            s.hour = s.hour.min(23);
            s.minute = s.minute.min(59);
            s.hold_secs = clamp_hold(s.hold_secs);
        }
        for c in &mut self.counters {
            c.daily_hour = c.daily_hour.min(23);
            c.daily_minute = c.daily_minute.min(59);
        }
        self.weekday_mask = WeekdayMask::from_bits(self.weekday_mask.bits());
        self.utc_offset_minutes = self.utc_offset_minutes.clamp(-12 * 60, 14 * 60);
        self
    }

    /// Whether the notification channel has enough settings to send.
    pub fn notifications_enabled(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }
}
