//! Fuzz target: time snapshot parsing
//!
//! The snapshot is read back from flash after arbitrary power cuts, so
//! the parsers must survive any byte string.  Asserts that a parsed
//! value is always a real calendar time and that re-rendering it
//! yields the same minute.
//!
//! cargo fuzz run fuzz_time_snapshot

#![no_main]

use libfuzzer_sys::fuzz_target;
use relaybox::datetime::{DateTime, snapshot_hour_minute};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };

    if let Some((hour, minute)) = snapshot_hour_minute(text) {
        assert!(hour < 24 && minute < 60);
    }

    if let Some(dt) = DateTime::from_snapshot(text) {
        assert!(dt.is_valid(), "parser produced an impossible date");
        assert_eq!(dt.second, 0);
        assert!(dt.weekday() < 7);

        let rendered = dt.to_snapshot();
        assert_eq!(DateTime::from_snapshot(&rendered), Some(dt));
        assert_eq!(snapshot_hour_minute(text), Some((dt.hour, dt.minute)));
    }
});
