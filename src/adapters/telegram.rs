//! Telegram Bot API transport.
//!
//! Implements [`NotifyTransport`] for the delivery worker:
//!
//! ```text
//!   POST https://api.telegram.org/bot{token}/sendMessage
//!   Content-Type: application/x-www-form-urlencoded
//!
//!   chat_id=<recipient>&text=<body>
//! ```
//!
//! A send counts as delivered only when the status is 200 **and** the
//! JSON body carries `"ok": true`.  Runs on the worker thread, so the
//! blocking HTTP client is fine here; the request is capped at 5 s.

use core::fmt::Write as _;

use log::{debug, warn};
use serde::Deserialize;

use crate::app::ports::{NotifyTransport, SendReceipt};
use crate::config::bounded;
use crate::error::DeliveryError;

const API_HOST: &str = "https://api.telegram.org";
pub const REQUEST_TIMEOUT_MS: u64 = 5_000;
/// Bytes of the reply kept for classification.  Telegram echoes the sent
/// text back (`\uXXXX`-escaped), so a full reply can run past this; the
/// rest is drained and discarded.
pub const RESPONSE_CAP: usize = 1_024;

#[derive(Deserialize)]
struct Ack {
    ok: bool,
}

/// Percent-encode `s` for a form body.  Unreserved characters pass
/// through; every other byte becomes `%XX`.
pub fn form_encode(s: &str, out: &mut String) {
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{:02X}", b);
        }
    }
}

/// Reads the `ok` member when it opens the object, as the Bot API always
/// sends it.  Works on a body cut short at [`RESPONSE_CAP`].
fn leading_ok(body: &[u8]) -> Option<bool> {
    let text = core::str::from_utf8(body).or_else(|e| core::str::from_utf8(&body[..e.valid_up_to()])).ok()?;
    let rest = text.trim_start().strip_prefix('{')?.trim_start();
    let rest = rest.strip_prefix("\"ok\"")?.trim_start();
    let rest = rest.strip_prefix(':')?.trim_start();
    if rest.starts_with("true") {
        Some(true)
    } else if rest.starts_with("false") {
        Some(false)
    } else {
        None
    }
}

/// Classify a response.  A body that is not the expected JSON counts as
/// a negative acknowledgement.
pub fn interpret_response(status: u16, body: &[u8]) -> SendReceipt {
    let ack_ok = match serde_json::from_slice::<Ack>(body) {
        Ok(ack) => ack.ok,
        Err(_) => leading_ok(body).unwrap_or(false),
    };
    SendReceipt { http_ok: status == 200, ack_ok }
}

pub struct TelegramTransport {
    token: heapless::String<64>,
}

impl TelegramTransport {
    pub fn new(token: &str) -> Self {
        Self { token: bounded(token) }
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", API_HOST, self.token)
    }

    fn form(recipient: &str, text: &str) -> String {
        let mut body = String::with_capacity(16 + recipient.len() + text.len() * 3);
        body.push_str("chat_id=");
        form_encode(recipient, &mut body);
        body.push_str("&text=");
        form_encode(text, &mut body);
        body
    }

    #[cfg(target_os = "espidf")]
    fn post_form(&self, url: &str, body: &str) -> Result<(u16, Vec<u8>), DeliveryError> {
        use core::time::Duration;
        use embedded_svc::http::client::Client;
        use embedded_svc::http::{Method, Status};
        use embedded_svc::io::{Read, Write};
        use esp_idf_svc::http::client::{Configuration, EspHttpConnection};

        let conf = Configuration {
            timeout: Some(Duration::from_millis(REQUEST_TIMEOUT_MS)),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        let conn = EspHttpConnection::new(&conf).map_err(|_| DeliveryError::Connection)?;
        let mut client = Client::wrap(conn);

        let content_length = body.len().to_string();
        let headers = [
            ("content-type", "application/x-www-form-urlencoded"),
            ("content-length", content_length.as_str()),
        ];
        let mut request = client
            .request(Method::Post, url, &headers)
            .map_err(|_| DeliveryError::Connection)?;
        request.write_all(body.as_bytes()).map_err(|_| DeliveryError::Connection)?;
        request.flush().map_err(|_| DeliveryError::Connection)?;
        let mut response = request.submit().map_err(|_| DeliveryError::Connection)?;

        let status = response.status();
        let mut buf = vec![0u8; RESPONSE_CAP];
        let mut scratch = [0u8; 256];
        let mut len = 0;
        loop {
            let dst = if len < RESPONSE_CAP { &mut buf[len..] } else { &mut scratch[..] };
            let n = response.read(dst).map_err(|_| DeliveryError::Connection)?;
            if n == 0 {
                break;
            }
            if len < RESPONSE_CAP {
                len += n;
            }
        }
        buf.truncate(len);
        Ok((status, buf))
    }

    #[cfg(not(target_os = "espidf"))]
    fn post_form(&self, _url: &str, body: &str) -> Result<(u16, Vec<u8>), DeliveryError> {
        log::info!("Telegram(sim): {}", body);
        Ok((200, br#"{"ok":true,"result":{}}"#.to_vec()))
    }
}

impl NotifyTransport for TelegramTransport {
    fn set_token(&mut self, token: &str) {
        self.token = bounded(token);
    }

    fn send_text(&mut self, recipient: &str, body: &str) -> SendReceipt {
        if self.token.is_empty() || recipient.is_empty() {
            warn!("Telegram: {}", DeliveryError::NotConfigured);
            return SendReceipt::FAILED;
        }

        match self.post_form(&self.endpoint(), &Self::form(recipient, body)) {
            Ok((status, reply)) => {
                let receipt = interpret_response(status, &reply);
                if !receipt.http_ok {
                    warn!("Telegram: {}", DeliveryError::Status(status));
                } else if !receipt.ack_ok {
                    warn!("Telegram: {}", DeliveryError::Rejected);
                    debug!("Telegram: reply {}", String::from_utf8_lossy(&reply));
                }
                receipt
            }
            Err(e) => {
                warn!("Telegram: {}", e);
                SendReceipt::FAILED
            }
        }
    }
}
