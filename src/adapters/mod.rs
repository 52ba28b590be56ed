//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements         | Connects to                  |
//! |---------------|--------------------|------------------------------|
//! | `hardware`    | RelayPort          | Relay board GPIO             |
//! |               | InputPort          | Alarm / counter GPIO         |
//! | `log_sink`    | EventSink          | Serial log output            |
//! | `notify_sink` | EventSink          | Notification queue + log     |
//! | `nvs`         | ConfigPort         | NVS / in-memory store        |
//! |               | SnapshotStore      |                              |
//! | `rtc`         | PersistentClock    | PCF8563 / DS3231 over I²C    |
//! | `sntp`        | TimeSyncPort       | ESP-IDF SNTP + RTC           |
//! |               | PersistentClock    |                              |
//! | `telegram`    | NotifyTransport    | Telegram Bot API (HTTPS)     |
//! | `time`        | —                  | ESP32 high-resolution timer  |
//! | `wifi`        | ConnectivityPort   | ESP-IDF WiFi STA             |

pub mod hardware;
pub mod log_sink;
pub mod notify_sink;
pub mod nvs;
pub mod rtc;
pub mod sntp;
pub mod telegram;
pub mod time;
pub mod wifi;
