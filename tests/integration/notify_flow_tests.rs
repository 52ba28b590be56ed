//! Integration tests for the loop → queue → worker notification path.
//!
//! The loop side runs the real `NotifyEventSink` over a local queue; the
//! worker side runs `DeliveryWorker` against a scripted transport with a
//! backoff that records its delays instead of sleeping.

use std::collections::VecDeque;
use std::time::Duration;

use futures_lite::future::block_on;

use crate::mock_hw::{MockBoard, MockClock, MockNvs};

use relaybox::adapters::notify_sink::NotifyEventSink;
use relaybox::app::commands::AppCommand;
use relaybox::app::ports::{NotifyTransport, SendReceipt};
use relaybox::app::service::AppService;
use relaybox::config::{SystemConfig, bounded};
use relaybox::error::DeliveryError;
use relaybox::notify::worker::{Backoff, DeliveryOutcome, DeliveryWorker};
use relaybox::notify::{Notifier, NotifyQueue, NotifySettings, QUEUE_DEPTH, SettingsSignal};
use relaybox::sensors::pulse_counter::PulseShared;

// ── Worker doubles ────────────────────────────────────────────

struct ScriptedTransport {
    replies: VecDeque<SendReceipt>,
    sent: Vec<(String, String, String)>,
    token: String,
}

impl ScriptedTransport {
    fn new(replies: &[SendReceipt]) -> Self {
        Self {
            replies: replies.iter().copied().collect(),
            sent: Vec::new(),
            token: "123:boot".to_owned(),
        }
    }
}

impl NotifyTransport for ScriptedTransport {
    fn send_text(&mut self, recipient: &str, body: &str) -> SendReceipt {
        self.sent.push((self.token.clone(), recipient.to_owned(), body.to_owned()));
        self.replies.pop_front().unwrap_or(SendReceipt::FAILED)
    }

    fn set_token(&mut self, token: &str) {
        self.token = token.to_owned();
    }
}

#[derive(Default)]
struct RecordedBackoff(Vec<Duration>);

impl Backoff for &mut RecordedBackoff {
    async fn wait(&mut self, delay: Duration) {
        self.0.push(delay);
    }
}

fn drain(queue: &NotifyQueue) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(msg) = queue.try_receive() {
        out.push(msg.as_str().to_owned());
    }
    out
}

// ── Loop side ─────────────────────────────────────────────────

#[test]
fn relay_trigger_queues_start_then_end_message() {
    let queue = NotifyQueue::new();
    let shared = PulseShared::new();
    let mut cfg = SystemConfig::default();
    cfg.schedules[0].message = bounded("Gate open");
    cfg.schedules[0].hold_secs = 2;

    let mut app = AppService::new(cfg, &shared);
    let mut board = MockBoard::new();
    let mut clock = MockClock::offline();
    let nvs = MockNvs::new();
    let mut sink = NotifyEventSink::new(Notifier::new(&queue));

    app.start(0, &mut board, &mut clock, &nvs, &mut sink);
    app.handle_command(AppCommand::TestRelay { channel: 0 }, 0, &mut board, &mut clock, &nvs, &mut sink);
    assert_eq!(sink.notifier().pending(), 1, "start message is queued before the hold runs");

    let mut t = 10;
    while t <= 3_000 {
        app.tick(t, &mut board, &mut clock, &nvs, &mut sink);
        t += 10;
    }

    assert_eq!(drain(&queue), vec!["Gate open", "Gate open off"]);
}

#[test]
fn full_queue_drops_newest_and_counts() {
    let queue = NotifyQueue::new();
    let mut notifier = Notifier::new(&queue);

    for i in 0..QUEUE_DEPTH + 5 {
        notifier.enqueue(&format!("msg {i}"));
    }

    assert_eq!(notifier.pending(), QUEUE_DEPTH);
    assert_eq!(notifier.dropped(), 5);
    let queued = drain(&queue);
    assert_eq!(queued.first().map(String::as_str), Some("msg 0"));
    assert_eq!(queued.last().map(String::as_str), Some("msg 19"));
}

// ── Worker side ───────────────────────────────────────────────

#[test]
fn worker_retries_then_delivers() {
    let mut backoff = RecordedBackoff::default();
    let transport = ScriptedTransport::new(&[SendReceipt::FAILED, SendReceipt::DELIVERED]);
    let mut worker = DeliveryWorker::new(transport, &mut backoff, "12345");

    let outcome = block_on(worker.deliver("Gate open"));

    assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 2 });
    assert_eq!(worker.totals(), (1, 0));
    drop(worker);
    assert_eq!(backoff.0, vec![Duration::from_millis(400)]);
}

#[test]
fn worker_gives_up_after_three_attempts() {
    let mut backoff = RecordedBackoff::default();
    let transport = ScriptedTransport::new(&[]);
    let mut worker = DeliveryWorker::new(transport, &mut backoff, "12345");

    let outcome = block_on(worker.deliver("Gate open"));

    assert_eq!(outcome, DeliveryOutcome::Dropped(DeliveryError::Connection));
    assert_eq!(worker.totals(), (0, 1));
    drop(worker);
    // No wait after the final attempt.
    assert_eq!(backoff.0, vec![Duration::from_millis(400), Duration::from_millis(800)]);
}

#[test]
fn rejected_acknowledgement_is_retried_and_classified() {
    let rejected = SendReceipt { http_ok: true, ack_ok: false };
    let mut backoff = RecordedBackoff::default();
    let transport = ScriptedTransport::new(&[rejected, rejected, rejected]);
    let mut worker = DeliveryWorker::new(transport, &mut backoff, "12345");

    let outcome = block_on(worker.deliver("Gate open"));

    assert_eq!(outcome, DeliveryOutcome::Dropped(DeliveryError::Rejected));
}

#[test]
fn missing_recipient_fails_without_attempting() {
    let mut backoff = RecordedBackoff::default();
    let transport = ScriptedTransport::new(&[SendReceipt::DELIVERED]);
    let mut worker = DeliveryWorker::new(transport, &mut backoff, "");

    let outcome = block_on(worker.deliver("Gate open"));

    assert_eq!(outcome, DeliveryOutcome::Dropped(DeliveryError::NotConfigured));
    drop(worker);
    assert!(backoff.0.is_empty());
}

// ── Runtime credential changes ────────────────────────────────

#[test]
fn updated_chat_settings_reach_the_worker_without_restart() {
    let queue = NotifyQueue::new();
    let settings = SettingsSignal::new();
    let shared = PulseShared::new();
    let mut cfg = SystemConfig::default();
    cfg.bot_token = bounded("123:boot");
    cfg.chat_id = bounded("-100111");

    let mut app = AppService::new(cfg.clone(), &shared);
    let mut board = MockBoard::new();
    let mut clock = MockClock::offline();
    let nvs = MockNvs::new();
    let mut sink = NotifyEventSink::new(Notifier::new(&queue));
    app.start(0, &mut board, &mut clock, &nvs, &mut sink);

    let mut backoff = RecordedBackoff::default();
    let transport = ScriptedTransport::new(&[SendReceipt::DELIVERED, SendReceipt::DELIVERED]);
    let mut worker = DeliveryWorker::new(transport, &mut backoff, &cfg.chat_id);

    Notifier::new(&queue).enqueue("before");
    assert_eq!(
        block_on(worker.serve_next(&queue, &settings)),
        DeliveryOutcome::Delivered { attempts: 1 }
    );

    cfg.bot_token = bounded("456:rotated");
    cfg.chat_id = bounded("-100222");
    app.handle_command(AppCommand::UpdateConfig(cfg), 100, &mut board, &mut clock, &nvs, &mut sink);
    let changes = app.take_adapter_changes().expect("chat change is reported");
    assert!(changes.notify && !changes.wifi);
    settings.signal(NotifySettings::from_config(app.current_config()));

    Notifier::new(&queue).enqueue("after");
    assert_eq!(
        block_on(worker.serve_next(&queue, &settings)),
        DeliveryOutcome::Delivered { attempts: 1 }
    );

    let sent: Vec<_> = worker
        .transport()
        .sent
        .iter()
        .map(|(token, chat, body)| (token.as_str(), chat.as_str(), body.as_str()))
        .collect();
    assert_eq!(
        sent,
        vec![("123:boot", "-100111", "before"), ("456:rotated", "-100222", "after")]
    );
}
