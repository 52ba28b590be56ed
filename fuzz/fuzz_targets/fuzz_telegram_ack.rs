//! Fuzz target: chat API response classification
//!
//! Feeds an arbitrary status code and response body to
//! `interpret_response`.  It must never panic, and only a 200 with a
//! positive acknowledgement may count as delivered.
//!
//! cargo fuzz run fuzz_telegram_ack

#![no_main]

use libfuzzer_sys::fuzz_target;
use relaybox::adapters::telegram::interpret_response;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let status = u16::from_le_bytes([data[0], data[1]]);
    let receipt = interpret_response(status, &data[2..]);

    if receipt.delivered() {
        assert_eq!(status, 200);
        assert!(receipt.error().is_none());
    } else {
        assert!(receipt.error().is_some());
    }
});
