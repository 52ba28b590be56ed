//! Task Watchdog Timer (TWDT) driver.
//!
//! Resets the device if the polling loop stalls.  The loop calls
//! [`Watchdog::feed`] once per iteration with its uptime stamp; a gap
//! longer than half the timeout is logged so a slow step (an SNTP wait,
//! a stuck I²C transfer) shows up before it ever trips the reset.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::{
    ESP_OK, esp_task_wdt_add, esp_task_wdt_config_t, esp_task_wdt_reconfigure, esp_task_wdt_reset,
};
use log::{info, warn};

/// Default loop-stall budget.
pub const DEFAULT_TIMEOUT_MS: u32 = 10_000;

pub struct Watchdog {
    #[cfg(target_os = "espidf")]
    subscribed: bool,
    timeout_ms: u32,
    last_feed_ms: Option<u32>,
    late_feeds: u32,
}

impl Watchdog {
    /// Initialise the TWDT with `timeout_ms` and subscribe the calling task.
    pub fn new(timeout_ms: u32) -> Self {
        #[cfg(target_os = "espidf")]
        let subscribed = {
            let cfg = esp_task_wdt_config_t {
                timeout_ms,
                idle_core_mask: 0,
                trigger_panic: true,
            };
            // SAFETY: called once from the main task; `cfg` outlives the call.
            let ret = unsafe { esp_task_wdt_reconfigure(&cfg) };
            if ret != ESP_OK as i32 {
                warn!("Watchdog: reconfigure returned {} (already configured?)", ret);
            }
            // SAFETY: a null handle subscribes the calling task.
            let ret = unsafe { esp_task_wdt_add(core::ptr::null_mut()) };
            if ret == ESP_OK as i32 {
                info!("Watchdog: loop task subscribed ({}ms, panic on trigger)", timeout_ms);
                true
            } else {
                warn!("Watchdog: subscribe failed ({}), loop is unguarded", ret);
                false
            }
        };

        #[cfg(not(target_os = "espidf"))]
        info!("Watchdog(sim): {}ms budget, no reset", timeout_ms);

        Self {
            #[cfg(target_os = "espidf")]
            subscribed,
            timeout_ms,
            last_feed_ms: None,
            late_feeds: 0,
        }
    }

    /// Reset the TWDT for this iteration.
    ///
    /// Returns the gap since the previous feed when it exceeded half the
    /// timeout.
    pub fn feed(&mut self, now_ms: u32) -> Option<u32> {
        #[cfg(target_os = "espidf")]
        {
            if self.subscribed {
                // SAFETY: resets the TWDT entry of the subscribed task.
                unsafe {
                    esp_task_wdt_reset();
                }
            }
        }

        let gap = self.last_feed_ms.replace(now_ms).map(|last| now_ms.wrapping_sub(last))?;
        if gap <= self.timeout_ms / 2 {
            return None;
        }
        self.late_feeds = self.late_feeds.wrapping_add(1);
        warn!(
            "Watchdog: loop iteration took {}ms (budget {}ms, {} late)",
            gap, self.timeout_ms, self.late_feeds
        );
        Some(gap)
    }

    /// Iterations that came close to the reset budget since boot.
    pub fn late_feeds(&self) -> u32 {
        self.late_feeds
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_MS)
    }
}
