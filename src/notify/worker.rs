//! Background delivery worker.
//!
//! Runs in a dedicated thread pinned to Core 0 next to the network
//! stack.  `futures_lite::future::block_on` drives a single future that
//! waits on the queue and then delivers each message with bounded
//! retries.  Backoff waits are `async-io-mini` reactor timers, so the
//! thread sleeps rather than spins between attempts.
//!
//! ```text
//!   receive().await ──▶ attempt 1 ──fail──▶ wait 400 ms ──▶ attempt 2
//!                                 ──fail──▶ wait 800 ms ──▶ attempt 3 ──fail──▶ drop
//! ```

use core::future::Future;
use core::time::Duration;

use log::{info, warn};

use super::{NotificationMessage, NotifyQueue, NotifySettings, SettingsSignal};
use crate::app::ports::NotifyTransport;
use crate::config::bounded;
use crate::error::DeliveryError;

/// Attempts per message before it is dropped.
pub const MAX_ATTEMPTS: u32 = 3;
/// Wait before retry *n* is `BACKOFF_BASE_MS * n`.
pub const BACKOFF_BASE_MS: u64 = 400;

/// Waits between delivery attempts.
pub trait Backoff {
    fn wait(&mut self, delay: Duration) -> impl Future<Output = ()>;
}

/// Production backoff on the `async-io-mini` reactor.
pub struct ReactorBackoff;

impl Backoff for ReactorBackoff {
    async fn wait(&mut self, delay: Duration) {
        async_io_mini::Timer::after(delay).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Dropped(DeliveryError),
}

pub struct DeliveryWorker<T, B> {
    transport: T,
    backoff: B,
    recipient: heapless::String<32>,
    delivered: u32,
    failed: u32,
}

impl<T: NotifyTransport, B: Backoff> DeliveryWorker<T, B> {
    pub fn new(transport: T, backoff: B, recipient: &str) -> Self {
        Self {
            transport,
            backoff,
            recipient: bounded(recipient),
            delivered: 0,
            failed: 0,
        }
    }

    /// Deliver one message, retrying up to [`MAX_ATTEMPTS`] times.
    pub async fn deliver(&mut self, text: &str) -> DeliveryOutcome {
        if self.recipient.is_empty() {
            self.failed += 1;
            warn!("Notify: no recipient configured, dropping message");
            return DeliveryOutcome::Dropped(DeliveryError::NotConfigured);
        }

        let mut last_err = DeliveryError::Connection;
        for attempt in 1..=MAX_ATTEMPTS {
            let receipt = self.transport.send_text(&self.recipient, text);
            match receipt.error() {
                None => {
                    self.delivered += 1;
                    info!("Notify: delivered (attempt {})", attempt);
                    return DeliveryOutcome::Delivered { attempts: attempt };
                }
                Some(e) => {
                    warn!("Notify: attempt {}/{} failed: {}", attempt, MAX_ATTEMPTS, e);
                    last_err = e;
                }
            }
            if attempt < MAX_ATTEMPTS {
                let delay = Duration::from_millis(BACKOFF_BASE_MS * u64::from(attempt));
                self.backoff.wait(delay).await;
            }
        }

        self.failed += 1;
        warn!("Notify: giving up after {} attempts, message dropped", MAX_ATTEMPTS);
        DeliveryOutcome::Dropped(last_err)
    }

    /// Send as and to `settings` from the next message on.
    pub fn apply(&mut self, settings: &NotifySettings) {
        self.recipient = settings.recipient.clone();
        self.transport.set_token(&settings.token);
        info!("Notify: credentials updated (chat '{}')", self.recipient);
    }

    /// Wait for one message, pick up pending credential changes, then
    /// deliver it.
    pub async fn serve_next(&mut self, queue: &NotifyQueue, settings: &SettingsSignal) -> DeliveryOutcome {
        let msg: NotificationMessage = queue.receive().await;
        if let Some(update) = settings.try_take() {
            self.apply(&update);
        }
        self.deliver(&msg).await
    }

    /// Serve `queue` forever.
    pub async fn run(mut self, queue: &NotifyQueue, settings: &SettingsSignal) {
        info!("Notify: worker running");
        loop {
            self.serve_next(queue, settings).await;
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// `(delivered, dropped)` since the worker started.
    pub fn totals(&self) -> (u32, u32) {
        (self.delivered, self.failed)
    }
}

/// Start the delivery worker thread on Core 0.
pub fn spawn<T>(
    transport: T,
    recipient: &str,
    queue: &'static NotifyQueue,
    settings: &'static SettingsSignal,
) -> std::io::Result<std::thread::JoinHandle<()>>
where
    T: NotifyTransport + Send + 'static,
{
    let worker = DeliveryWorker::new(transport, ReactorBackoff, recipient);
    crate::drivers::task_pin::spawn_on_core(
        crate::drivers::task_pin::Core::Pro,
        5,
        12,
        "notify\0",
        move || futures_lite::future::block_on(worker.run(queue, settings)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::SendReceipt;
    use std::collections::VecDeque;

    struct Scripted {
        replies: VecDeque<SendReceipt>,
        sent: Vec<(String, String)>,
        token: String,
    }

    impl Scripted {
        fn new(replies: &[SendReceipt]) -> Self {
            Self {
                replies: replies.iter().copied().collect(),
                sent: Vec::new(),
                token: String::new(),
            }
        }
    }

    impl NotifyTransport for Scripted {
        fn send_text(&mut self, recipient: &str, body: &str) -> SendReceipt {
            self.sent.push((recipient.to_owned(), body.to_owned()));
            self.replies.pop_front().unwrap_or(SendReceipt::FAILED)
        }

        fn set_token(&mut self, token: &str) {
            self.token = token.to_owned();
        }
    }

    #[derive(Default)]
    struct RecordingBackoff(Vec<Duration>);

    impl Backoff for RecordingBackoff {
        async fn wait(&mut self, delay: Duration) {
            self.0.push(delay);
        }
    }

    fn worker(replies: &[SendReceipt]) -> DeliveryWorker<Scripted, RecordingBackoff> {
        DeliveryWorker::new(Scripted::new(replies), RecordingBackoff::default(), "12345")
    }

    #[test]
    fn first_success_stops_retrying() {
        let mut w = worker(&[SendReceipt::DELIVERED]);
        let out = futures_lite::future::block_on(w.deliver("hello"));
        assert_eq!(out, DeliveryOutcome::Delivered { attempts: 1 });
        assert_eq!(w.transport.sent, vec![("12345".to_owned(), "hello".to_owned())]);
        assert!(w.backoff.0.is_empty());
    }

    #[test]
    fn persistent_failure_tries_three_times_with_growing_waits() {
        let mut w = worker(&[]);
        let out = futures_lite::future::block_on(w.deliver("hello"));
        assert_eq!(out, DeliveryOutcome::Dropped(DeliveryError::Connection));
        assert_eq!(w.transport.sent.len(), 3);
        assert_eq!(w.backoff.0, vec![Duration::from_millis(400), Duration::from_millis(800)]);
        assert_eq!(w.totals(), (0, 1));
    }

    #[test]
    fn http_ok_without_ack_is_a_failure() {
        let rejected = SendReceipt { http_ok: true, ack_ok: false };
        let mut w = worker(&[rejected, rejected, SendReceipt::DELIVERED]);
        let out = futures_lite::future::block_on(w.deliver("hello"));
        assert_eq!(out, DeliveryOutcome::Delivered { attempts: 3 });
        assert_eq!(w.backoff.0.len(), 2);
    }

    #[test]
    fn missing_recipient_fails_without_sending() {
        let mut w = DeliveryWorker::new(Scripted::new(&[]), RecordingBackoff::default(), "");
        let out = futures_lite::future::block_on(w.deliver("hello"));
        assert_eq!(out, DeliveryOutcome::Dropped(DeliveryError::NotConfigured));
        assert!(w.transport.sent.is_empty());
    }

    #[test]
    fn worker_drains_the_queue() {
        let q: &'static NotifyQueue = Box::leak(Box::new(NotifyQueue::new()));
        let mut n = super::super::Notifier::new(q);
        n.enqueue("a");
        n.enqueue("b");
        let mut w = worker(&[SendReceipt::DELIVERED, SendReceipt::DELIVERED]);
        futures_lite::future::block_on(async {
            for _ in 0..2 {
                let msg = q.receive().await;
                w.deliver(&msg).await;
            }
        });
        assert_eq!(w.totals(), (2, 0));
        assert_eq!(n.pending(), 0);
    }

    #[test]
    fn pending_settings_apply_before_the_next_send() {
        let q = NotifyQueue::new();
        let settings = SettingsSignal::new();
        let mut n = super::super::Notifier::new(&q);
        n.enqueue("a");
        let mut w = DeliveryWorker::new(Scripted::new(&[SendReceipt::DELIVERED]), RecordingBackoff::default(), "");
        settings.signal(NotifySettings { token: bounded("1:x"), recipient: bounded("-100") });

        let out = futures_lite::future::block_on(w.serve_next(&q, &settings));

        assert_eq!(out, DeliveryOutcome::Delivered { attempts: 1 });
        assert_eq!(w.transport.token, "1:x");
        assert_eq!(w.transport.sent, vec![("-100".to_owned(), "a".to_owned())]);
    }
}
