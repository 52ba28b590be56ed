//! RelayBox Firmware — Main Entry Point
//!
//! Hexagonal architecture around a cooperative 10 ms polling loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter    NotifyEventSink   NvsAdapter   NetClock    │
//! │  (Relay+Input)      (EventSink)       (Config+     (SNTP+RTC)  │
//! │                                        Snapshot)               │
//! │  WifiAdapter        TelegramTransport (worker thread, core 0)  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  Pulse · Relay · Alarm · Scheduler · Reporter · Time   │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::wifi::EspWifi;
use log::{info, warn};

use relaybox::adapters::hardware::HardwareAdapter;
use relaybox::adapters::notify_sink::NotifyEventSink;
use relaybox::adapters::nvs::NvsAdapter;
use relaybox::adapters::rtc::RtcChip;
use relaybox::adapters::sntp::NetClock;
use relaybox::adapters::telegram::TelegramTransport;
use relaybox::adapters::time::Esp32TimeAdapter;
use relaybox::adapters::wifi::{ConnectivityPort, LinkEvent, WifiAdapter};
use relaybox::app::events::AppEvent;
use relaybox::app::ports::{ConfigPort, EventSink};
use relaybox::app::service::AppService;
use relaybox::config::SystemConfig;
use relaybox::drivers::heartbeat::Heartbeat;
use relaybox::drivers::hw_init;
use relaybox::drivers::relay_board::RelayBoard;
use relaybox::drivers::watchdog::Watchdog;
use relaybox::error::Error;
use relaybox::notify::{self, NOTIFY_QUEUE, NOTIFY_SETTINGS, Notifier, NotifySettings};
use relaybox::pins;
use relaybox::sensors::{InputBank, PULSE_SHARED};

/// Polling-loop period.
const LOOP_PERIOD_MS: u32 = 10;
/// Wi-Fi reconnect / link check cadence.
const WIFI_POLL_MS: u32 = 3_000;
/// Status line cadence.
const STATUS_LOG_MS: u32 = 60_000;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  RelayBox v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let nvs = NvsAdapter::new().unwrap_or_else(|e| {
        warn!("NVS init failed ({}), running with defaults and no persistence", e);
        NvsAdapter::detached()
    });
    let config = nvs.load().unwrap_or_else(|e| {
        warn!("NVS config load failed ({}), using defaults", e);
        SystemConfig::default()
    });

    // ── 3. Initialise hardware peripherals ────────────────────
    // Relay outputs are driven to their released level here, before
    // anything else can run.
    hw_init::init_peripherals(config.relay_active_low).map_err(Error::from)?;
    if let Err(e) = hw_init::init_isr_service() {
        warn!("ISR service init failed: {}, counters disabled", e);
    }
    let mut watchdog = Watchdog::default();

    let peripherals = Peripherals::take()?;
    // SDA / SCL as in pins::I2C_SDA_GPIO / pins::I2C_SCL_GPIO.
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio21,
        peripherals.pins.gpio22,
        &I2cConfig::new().baudrate(Hertz(pins::I2C_FREQ_HZ)),
    )?;
    let mut clock = NetClock::new(RtcChip::probe(i2c), config.utc_offset_minutes);

    // ── 4. Notification worker (core 0) ───────────────────────
    if !config.notifications_enabled() {
        warn!("Notify: bot token or chat id missing, messages will be dropped");
    }
    if let Err(e) = notify::worker::spawn(
        TelegramTransport::new(&config.bot_token),
        &config.chat_id,
        &NOTIFY_QUEUE,
        &NOTIFY_SETTINGS,
    ) {
        warn!("Notify: worker spawn failed: {}", e);
    }
    let mut sink = NotifyEventSink::new(Notifier::new(&NOTIFY_QUEUE));

    // ── 5. Wi-Fi station ──────────────────────────────────────
    let uptime = Esp32TimeAdapter::new();
    let mut wifi = WifiAdapter::new();
    match EspWifi::new(peripherals.modem, EspSystemEventLoop::take()?, None) {
        Ok(driver) => wifi.attach(driver),
        Err(e) => warn!("WiFi: driver init failed: {}", e),
    }
    if let Err(e) = wifi
        .set_credentials(&config.wifi_ssid, &config.wifi_password)
        .and_then(|()| wifi.connect(uptime.now_ms()))
    {
        warn!("WiFi: {}", e);
    }

    // ── 6. Application service ────────────────────────────────
    let mut hw = HardwareAdapter::new(
        RelayBoard::new(pins::RELAY_GPIOS, config.relay_active_low),
        InputBank::new(pins::ALARM_GPIOS, pins::COUNTER_GPIOS),
    );
    let mut app = AppService::new(config, &PULSE_SHARED);
    app.start(uptime.now_ms(), &mut hw, &mut clock, &nvs, &mut sink);

    let mut heartbeat = Heartbeat::new();
    let mut time_disciplined = false;
    let mut last_wifi_poll_ms = uptime.now_ms();
    let mut last_status_ms = last_wifi_poll_ms;

    info!("System ready. Entering polling loop.");

    // ── 7. Polling loop ───────────────────────────────────────
    loop {
        let now_ms = uptime.now_ms();

        app.tick(now_ms, &mut hw, &mut clock, &nvs, &mut sink);

        // Push runtime config edits into the adapters that hold a copy.
        if let Some(changes) = app.take_adapter_changes() {
            let cfg = app.current_config();
            if changes.notify {
                NOTIFY_SETTINGS.signal(NotifySettings::from_config(cfg));
            }
            if changes.utc_offset {
                clock.set_utc_offset(cfg.utc_offset_minutes);
            }
            if changes.relay_polarity {
                hw.set_relay_active_low(cfg.relay_active_low);
            }
            if changes.wifi {
                wifi.disconnect();
                if let Err(e) = wifi
                    .set_credentials(&cfg.wifi_ssid, &cfg.wifi_password)
                    .and_then(|()| wifi.connect(now_ms))
                {
                    warn!("WiFi: {}", e);
                }
            }
        }

        if now_ms.wrapping_sub(last_wifi_poll_ms) >= WIFI_POLL_MS {
            last_wifi_poll_ms = now_ms;
            match wifi.poll(now_ms) {
                Some(LinkEvent::Up) => {
                    clock.start_sync();
                    if !time_disciplined {
                        time_disciplined = app.discipline_time(&mut clock, &nvs);
                    }
                    if let Some(ip) = wifi.ip() {
                        app.announce_online(ip, &mut sink);
                    }
                }
                Some(LinkEvent::Down) => warn!("WiFi: link down"),
                None => {}
            }
        }

        if now_ms.wrapping_sub(last_status_ms) >= STATUS_LOG_MS {
            last_status_ms = now_ms;
            // SNTP may finish well after the link came up; retry rarely, it blocks.
            if wifi.is_connected() && !time_disciplined {
                time_disciplined = app.discipline_time(&mut clock, &nvs);
            }
            sink.emit(&AppEvent::Status(app.status(now_ms)));
            info!(
                "Notify: pending={} dropped={} | WiFi rssi={:?} | late loops={} | uptime={}s",
                sink.notifier().pending(),
                sink.notifier().dropped(),
                wifi.rssi(),
                watchdog.late_feeds(),
                uptime.uptime_secs(),
            );
        }

        heartbeat.tick(now_ms, wifi.is_connected());

        // Config auto-save (5s debounce after last change).
        app.auto_save_if_needed(now_ms, &nvs);

        watchdog.feed(now_ms);
        FreeRtos::delay_ms(LOOP_PERIOD_MS);
    }
}
