//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`SnapshotStore`] for the RelayBox.
//!
//! - `relaybox::syscfg` holds the postcard-encoded [`SystemConfig`].
//! - `relaybox::rtcsnap` holds the last good time as `YYYY-MM-DD HH:MM`.
//!
//! ESP-IDF NVS commits are atomic per `nvs_commit()`, so a power cut
//! mid-save leaves the previous blob intact.  The simulation backend is
//! an in-memory map.

use crate::app::ports::{ConfigError, ConfigPort, SnapshotStore, StorageError};
use crate::config::{SystemConfig, bounded};
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const NAMESPACE: &str = "relaybox";
const CONFIG_KEY: &str = "syscfg";
const SNAPSHOT_KEY: &str = "rtcsnap";

const MAX_BLOB_SIZE: usize = 4000;

/// Raw NVS error, or `NOT_FOUND` mapped separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlobError {
    NotFound,
    Full,
    /// Flash error, or no partition behind a detached adapter.
    Io,
}

pub struct NvsAdapter {
    attached: bool,
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the NVS partition is
    /// erased and re-initialised automatically.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES as i32 || ret == ESP_ERR_NVS_NEW_VERSION_FOUND as i32 {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK as i32 {
                    return Err(ConfigError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK as i32 {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK as i32 {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            attached: true,
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    /// Adapter used when [`new`](Self::new) failed.  Reads find nothing
    /// and writes fail, so the firmware runs on defaults without
    /// persistence until the next boot.
    pub fn detached() -> Self {
        warn!("NvsAdapter: running without persistence");
        Self {
            attached: false,
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        }
    }

    // ── Blob primitives ───────────────────────────────────────

    fn read_blob(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        if !self.attached {
            return Err(BlobError::NotFound);
        }
        self.platform_read_blob(key)
    }

    fn write_blob(&self, key: &str, data: &[u8]) -> Result<(), BlobError> {
        if !self.attached {
            return Err(BlobError::Io);
        }
        if data.len() > MAX_BLOB_SIZE {
            return Err(BlobError::Full);
        }
        self.platform_write_blob(key, data)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_read_blob(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        self.store
            .borrow()
            .get(&format!("{}::{}", NAMESPACE, key))
            .cloned()
            .ok_or(BlobError::NotFound)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_write_blob(&self, key: &str, data: &[u8]) -> Result<(), BlobError> {
        self.store
            .borrow_mut()
            .insert(format!("{}::{}", NAMESPACE, key), data.to_vec());
        Ok(())
    }

    /// Open the namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(write: bool, f: F) -> Result<T, BlobError>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let len = NAMESPACE.len().min(15);
        ns_buf[..len].copy_from_slice(&NAMESPACE.as_bytes()[..len]);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        // SAFETY: ns_buf is NUL-terminated and outlives the call.
        let ret = unsafe { nvs_open(ns_buf.as_ptr().cast(), mode, &mut handle) };
        if ret == ESP_ERR_NVS_NOT_FOUND as i32 {
            return Err(BlobError::NotFound);
        }
        if ret != ESP_OK as i32 {
            return Err(BlobError::Io);
        }

        let result = f(handle);
        // SAFETY: handle was opened above and is closed exactly once.
        unsafe { nvs_close(handle) };
        result.map_err(|e| {
            if e == ESP_ERR_NVS_NOT_FOUND as i32 {
                BlobError::NotFound
            } else if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE as i32 {
                BlobError::Full
            } else {
                BlobError::Io
            }
        })
    }

    #[cfg(target_os = "espidf")]
    fn key_buf(key: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let len = key.len().min(15);
        buf[..len].copy_from_slice(&key.as_bytes()[..len]);
        buf
    }

    #[cfg(target_os = "espidf")]
    fn platform_read_blob(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let key = Self::key_buf(key);
        Self::with_nvs_handle(false, |handle| {
            let mut size: usize = 0;
            // SAFETY: a null buffer asks NVS for the stored size only.
            let ret = unsafe {
                nvs_get_blob(handle, key.as_ptr().cast(), core::ptr::null_mut(), &mut size)
            };
            if ret != ESP_OK as i32 {
                return Err(ret);
            }
            if size == 0 || size > MAX_BLOB_SIZE {
                return Err(ESP_FAIL as i32);
            }
            let mut buf = vec![0u8; size];
            // SAFETY: buf holds exactly `size` bytes.
            let ret = unsafe {
                nvs_get_blob(handle, key.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut size)
            };
            if ret != ESP_OK as i32 {
                return Err(ret);
            }
            Ok(buf)
        })
    }

    #[cfg(target_os = "espidf")]
    fn platform_write_blob(&self, key: &str, data: &[u8]) -> Result<(), BlobError> {
        let key = Self::key_buf(key);
        Self::with_nvs_handle(true, |handle| {
            // SAFETY: data is valid for data.len() bytes.
            let ret = unsafe {
                nvs_set_blob(handle, key.as_ptr().cast(), data.as_ptr().cast(), data.len())
            };
            if ret != ESP_OK as i32 {
                return Err(ret);
            }
            // SAFETY: handle is open read-write.
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK as i32 {
                return Err(ret);
            }
            Ok(())
        })
    }
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        match self.read_blob(CONFIG_KEY) {
            Ok(bytes) => {
                let cfg: SystemConfig =
                    postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                info!("NvsAdapter: loaded config ({} bytes)", bytes.len());
                Ok(cfg)
            }
            Err(BlobError::NotFound) => {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(SystemConfig::default())
            }
            Err(e) => {
                warn!("NvsAdapter: config read error {:?}", e);
                Err(ConfigError::IoError)
            }
        }
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        match self.write_blob(CONFIG_KEY, &bytes) {
            Ok(()) => {
                info!("NvsAdapter: config saved ({} bytes)", bytes.len());
                Ok(())
            }
            Err(BlobError::Full) => Err(ConfigError::StorageFull),
            Err(e) => {
                warn!("NvsAdapter: config write error {:?}", e);
                Err(ConfigError::IoError)
            }
        }
    }
}

impl SnapshotStore for NvsAdapter {
    fn load_time_snapshot(&self) -> Option<heapless::String<32>> {
        let bytes = self.read_blob(SNAPSHOT_KEY).ok()?;
        core::str::from_utf8(&bytes).ok().map(bounded)
    }

    fn save_time_snapshot(&self, text: &str) -> Result<(), StorageError> {
        self.write_blob(SNAPSHOT_KEY, text.as_bytes()).map_err(|e| match e {
            BlobError::Full => StorageError::Full,
            BlobError::NotFound | BlobError::Io => StorageError::IoError,
        })
    }
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn missing_config_loads_defaults() {
        let nvs = NvsAdapter::new().unwrap();
        assert_eq!(nvs.load(), Ok(SystemConfig::default()));
    }

    #[test]
    fn config_round_trip() {
        let nvs = NvsAdapter::new().unwrap();
        let mut cfg = SystemConfig::default();
        cfg.schedules[2].hour = 17;
        cfg.counters[0].target = 50;
        nvs.save(&cfg).unwrap();
        assert_eq!(nvs.load(), Ok(cfg));
    }

    #[test]
    fn corrupted_blob_is_reported() {
        let nvs = NvsAdapter::new().unwrap();
        nvs.write_blob(CONFIG_KEY, &[0xFF; 3]).unwrap();
        assert_eq!(nvs.load(), Err(ConfigError::Corrupted));
    }

    #[test]
    fn snapshot_round_trip() {
        let nvs = NvsAdapter::new().unwrap();
        assert_eq!(nvs.load_time_snapshot(), None);
        nvs.save_time_snapshot("2025-03-01 06:45").unwrap();
        assert_eq!(nvs.load_time_snapshot().as_deref(), Some("2025-03-01 06:45"));
    }

    #[test]
    fn oversize_blob_is_storage_full() {
        let nvs = NvsAdapter::new().unwrap();
        let big = "x".repeat(MAX_BLOB_SIZE + 1);
        assert_eq!(nvs.save_time_snapshot(&big), Err(StorageError::Full));
    }

    #[test]
    fn detached_store_reads_nothing_and_refuses_writes() {
        let nvs = NvsAdapter::detached();
        assert_eq!(nvs.save(&SystemConfig::default()), Err(ConfigError::IoError));
        assert_eq!(nvs.save_time_snapshot("2025-03-01 06:45"), Err(StorageError::IoError));
        assert_eq!(nvs.load(), Ok(SystemConfig::default()));
        assert_eq!(nvs.load_time_snapshot(), None);
    }
}
