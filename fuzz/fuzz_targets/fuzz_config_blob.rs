//! Fuzz target: stored configuration blob
//!
//! Decodes arbitrary bytes as the postcard-encoded `SystemConfig` held
//! in NVS.  Whatever decodes must sanitise into the accepted ranges, and
//! sanitising must be idempotent.
//!
//! cargo fuzz run fuzz_config_blob

#![no_main]

use libfuzzer_sys::fuzz_target;
use relaybox::config::{MAX_HOLD_SECS, MIN_HOLD_SECS, SystemConfig};

fuzz_target!(|data: &[u8]| {
    let Ok(cfg) = postcard::from_bytes::<SystemConfig>(data) else {
        return;
    };

    let clean = cfg.sanitized();
    for s in &clean.schedules {
        assert!(s.hour < 24 && s.minute < 60);
        assert!((MIN_HOLD_SECS..=MAX_HOLD_SECS).contains(&s.hold_secs));
    }
    for c in &clean.counters {
        assert!(c.daily_hour < 24 && c.daily_minute < 60);
    }
    assert!(clean.weekday_mask.bits() <= 0x7F);
    assert_eq!(clean.clone().sanitized(), clean);
});
