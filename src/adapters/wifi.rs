//! WiFi station-mode adapter.
//!
//! Implements [`ConnectivityPort`], the boundary for network
//! connectivity.  The polling loop calls [`ConnectivityPort::poll`] every
//! few seconds and reacts to the [`LinkEvent`] it returns: the first
//! `Up` of a boot disciplines the clock and announces the device.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `EspWifi` from `esp_idf_svc::wifi`.
//!   `connect()` there is non-blocking; association is confirmed by
//!   `poll()` once the station netif is up.
//! - **all other targets**: simulation stubs for host-side tests.
//!
//! ## Reconnection policy
//!
//! A lost or failed association waits an exponential backoff (2 s → 4 s
//! → 8 s … capped at 60 s) between retries.

use core::fmt;
use log::{error, info, warn};

use crate::config::bounded;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
    AlreadyConnected,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)"),
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
            Self::AlreadyConnected => write!(f, "already connected to AP"),
        }
    }
}

/// Link transitions reported by [`ConnectivityPort::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Up,
    Down,
}

pub trait ConnectivityPort {
    fn connect(&mut self, now_ms: u32) -> Result<(), ConnectivityError>;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
    fn poll(&mut self, now_ms: u32) -> Option<LinkEvent>;
    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError>;
    /// Station address, dotted quad.
    fn ip(&self) -> Option<&str>;
    fn rssi(&self) -> Option<i8>;
}

// ───────────────────────────────────────────────────────────────
// Connection state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Disconnected,
    Connecting { since_ms: u32 },
    Connected,
    Reconnecting { attempt: u32, retry_at_ms: u32 },
}

const INITIAL_BACKOFF_SECS: u32 = 2;
const MAX_BACKOFF_SECS: u32 = 60;
/// An association that has not produced an address by now is retried.
pub const CONNECT_TIMEOUT_MS: u32 = 15_000;

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    state: WifiState,
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    backoff_secs: u32,
    last_rssi: Option<i8>,
    ip: Option<heapless::String<16>>,
    #[cfg(target_os = "espidf")]
    wifi: Option<esp_idf_svc::wifi::EspWifi<'static>>,
    /// Simulation: counts platform_connect() calls for deterministic failures.
    #[cfg(not(target_os = "espidf"))]
    sim_connect_counter: u32,
    #[cfg(not(target_os = "espidf"))]
    sim_link_up: bool,
}

impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl WifiAdapter {
    pub fn new() -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            backoff_secs: INITIAL_BACKOFF_SECS,
            last_rssi: None,
            ip: None,
            #[cfg(target_os = "espidf")]
            wifi: None,
            #[cfg(not(target_os = "espidf"))]
            sim_connect_counter: 0,
            #[cfg(not(target_os = "espidf"))]
            sim_link_up: false,
        }
    }

    /// Hand over the driver built from the modem peripheral.
    #[cfg(target_os = "espidf")]
    pub fn attach(&mut self, wifi: esp_idf_svc::wifi::EspWifi<'static>) {
        self.wifi = Some(wifi);
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    fn schedule_retry(&mut self, attempt: u32, now_ms: u32) {
        self.state = WifiState::Reconnecting {
            attempt,
            retry_at_ms: now_ms.wrapping_add(self.backoff_secs * 1_000),
        };
        self.backoff_secs = (self.backoff_secs * 2).min(MAX_BACKOFF_SECS);
    }

    fn link_lost(&mut self, now_ms: u32) {
        self.ip = None;
        self.last_rssi = None;
        self.backoff_secs = INITIAL_BACKOFF_SECS;
        self.schedule_retry(0, now_ms);
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};

        let Some(wifi) = self.wifi.as_mut() else {
            return Err(ConnectivityError::ConnectionFailed);
        };
        let auth_method = if self.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };
        let conf = Configuration::Client(ClientConfiguration {
            ssid: self.ssid.as_str().try_into().map_err(|_| ConnectivityError::InvalidSsid)?,
            password: self
                .password
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        });
        wifi.set_configuration(&conf).map_err(|_| ConnectivityError::ConnectionFailed)?;
        if !wifi.is_started().unwrap_or(false) {
            wifi.start().map_err(|_| ConnectivityError::ConnectionFailed)?;
        }
        wifi.connect().map_err(|_| ConnectivityError::ConnectionFailed)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        self.sim_connect_counter = self.sim_connect_counter.wrapping_add(1);
        // Every 10th attempt fails to exercise the backoff path.
        if self.sim_connect_counter % 10 == 3 {
            warn!("WiFi(sim): simulated association failure (attempt {})", self.sim_connect_counter);
            return Err(ConnectivityError::ConnectionFailed);
        }
        self.sim_link_up = true;
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self) {
        if let Some(wifi) = self.wifi.as_mut() {
            let _ = wifi.disconnect();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self) {
        self.sim_link_up = false;
    }

    /// Station address once associated and the netif is up.
    #[cfg(target_os = "espidf")]
    fn platform_ip(&self) -> Option<heapless::String<16>> {
        let wifi = self.wifi.as_ref()?;
        if !wifi.is_connected().unwrap_or(false) || !wifi.sta_netif().is_up().unwrap_or(false) {
            return None;
        }
        let info = wifi.sta_netif().get_ip_info().ok()?;
        if info.ip.is_unspecified() {
            return None;
        }
        Some(bounded(&info.ip.to_string()))
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_ip(&self) -> Option<heapless::String<16>> {
        self.sim_link_up.then(|| bounded("192.168.4.2"))
    }

    #[cfg(target_os = "espidf")]
    fn platform_rssi(&self) -> Option<i8> {
        let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
        // SAFETY: ap_info is a valid, writable record for the duration of the call.
        let ret = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
        (ret == esp_idf_svc::sys::ESP_OK as i32).then_some(ap_info.rssi)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_rssi(&self) -> Option<i8> {
        if !self.sim_link_up {
            return None;
        }
        let oscillation = ((self.sim_connect_counter % 12) as i8) - 6;
        Some(-60_i8.saturating_add(oscillation))
    }

    /// Drop the simulated link, as if the AP went away.
    #[cfg(all(test, not(target_os = "espidf")))]
    fn sim_drop_link(&mut self) {
        self.sim_link_up = false;
    }
}

// ───────────────────────────────────────────────────────────────
// ConnectivityPort
// ───────────────────────────────────────────────────────────────

impl ConnectivityPort for WifiAdapter {
    fn connect(&mut self, now_ms: u32) -> Result<(), ConnectivityError> {
        if self.ssid.is_empty() {
            return Err(ConnectivityError::NoCredentials);
        }
        if self.state == WifiState::Connected {
            return Err(ConnectivityError::AlreadyConnected);
        }

        info!("WiFi: connecting to '{}'", self.ssid);
        match self.platform_connect() {
            Ok(()) => {
                self.state = WifiState::Connecting { since_ms: now_ms };
                Ok(())
            }
            Err(e) => {
                error!("WiFi: connection failed: {}", e);
                self.schedule_retry(0, now_ms);
                Err(e)
            }
        }
    }

    fn disconnect(&mut self) {
        self.platform_disconnect();
        self.state = WifiState::Disconnected;
        self.last_rssi = None;
        self.ip = None;
        info!("WiFi: disconnected");
    }

    fn is_connected(&self) -> bool {
        self.state == WifiState::Connected
    }

    fn poll(&mut self, now_ms: u32) -> Option<LinkEvent> {
        match self.state {
            WifiState::Disconnected => None,
            WifiState::Connecting { since_ms } => {
                if let Some(ip) = self.platform_ip() {
                    self.state = WifiState::Connected;
                    self.backoff_secs = INITIAL_BACKOFF_SECS;
                    self.last_rssi = self.platform_rssi();
                    info!("WiFi: connected, IP {} (RSSI={:?})", ip, self.last_rssi);
                    self.ip = Some(ip);
                    return Some(LinkEvent::Up);
                }
                if now_ms.wrapping_sub(since_ms) > CONNECT_TIMEOUT_MS {
                    warn!("WiFi: no address after {}ms, retrying", CONNECT_TIMEOUT_MS);
                    self.platform_disconnect();
                    self.schedule_retry(0, now_ms);
                }
                None
            }
            WifiState::Connected => {
                if self.platform_ip().is_none() {
                    warn!("WiFi: connection lost, entering reconnect");
                    self.link_lost(now_ms);
                    return Some(LinkEvent::Down);
                }
                self.last_rssi = self.platform_rssi();
                None
            }
            WifiState::Reconnecting { attempt, retry_at_ms } => {
                if (now_ms.wrapping_sub(retry_at_ms) as i32) < 0 {
                    return None;
                }
                info!("WiFi: reconnect attempt {} (next backoff {}s)", attempt + 1, self.backoff_secs);
                match self.platform_connect() {
                    Ok(()) => self.state = WifiState::Connecting { since_ms: now_ms },
                    Err(_) => self.schedule_retry(attempt + 1, now_ms),
                }
                None
            }
        }
    }

    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid = bounded(ssid);
        self.password = bounded(password);
        info!("WiFi: credentials updated (SSID='{}')", self.ssid);
        Ok(())
    }

    fn ip(&self) -> Option<&str> {
        self.ip.as_deref()
    }

    fn rssi(&self) -> Option<i8> {
        self.last_rssi
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    fn connected() -> WifiAdapter {
        let mut a = WifiAdapter::new();
        a.set_credentials("TestNet", "password1").unwrap();
        a.connect(0).unwrap();
        assert_eq!(a.poll(3_000), Some(LinkEvent::Up));
        a
    }

    #[test]
    fn rejects_empty_ssid() {
        let mut a = WifiAdapter::new();
        assert_eq!(a.set_credentials("", "password123"), Err(ConnectivityError::InvalidSsid));
    }

    #[test]
    fn rejects_short_password() {
        let mut a = WifiAdapter::new();
        assert_eq!(a.set_credentials("MyNet", "short"), Err(ConnectivityError::InvalidPassword));
    }

    #[test]
    fn accepts_open_network() {
        let mut a = WifiAdapter::new();
        assert!(a.set_credentials("OpenCafe", "").is_ok());
    }

    #[test]
    fn connect_without_credentials_fails() {
        let mut a = WifiAdapter::new();
        assert_eq!(a.connect(0), Err(ConnectivityError::NoCredentials));
    }

    #[test]
    fn link_comes_up_on_poll_with_address() {
        let mut a = connected();
        assert!(a.is_connected());
        assert_eq!(a.ip(), Some("192.168.4.2"));
        assert!(a.rssi().is_some());
        assert_eq!(a.connect(3_100), Err(ConnectivityError::AlreadyConnected));
        assert_eq!(a.poll(6_000), None);
    }

    #[test]
    fn lost_link_reports_down_then_recovers_after_backoff() {
        let mut a = connected();
        a.sim_drop_link();
        assert_eq!(a.poll(6_000), Some(LinkEvent::Down));
        assert!(a.ip().is_none());

        // First retry waits the initial backoff.
        assert_eq!(a.poll(7_000), None);
        assert!(matches!(a.state(), WifiState::Reconnecting { .. }));
        assert_eq!(a.poll(8_000), None);
        assert!(matches!(a.state(), WifiState::Connecting { .. }));
        assert_eq!(a.poll(9_000), Some(LinkEvent::Up));
    }

    #[test]
    fn disconnect_clears_link_state() {
        let mut a = connected();
        a.disconnect();
        assert!(!a.is_connected());
        assert!(a.rssi().is_none());
        assert_eq!(a.poll(10_000), None);
    }
}
