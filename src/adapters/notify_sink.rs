//! Event sink that pushes user-facing events to the chat queue.
//!
//! Every event is logged through [`LogEventSink`]; the ones that render
//! to text via [`AppEvent::notification_text`] are also queued on the
//! [`Notifier`].  Queueing never blocks the polling loop.

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::notify::Notifier;

use super::log_sink::LogEventSink;

pub struct NotifyEventSink<'a> {
    notifier: Notifier<'a>,
    log: LogEventSink,
}

impl<'a> NotifyEventSink<'a> {
    pub fn new(notifier: Notifier<'a>) -> Self {
        Self {
            notifier,
            log: LogEventSink::new(),
        }
    }

    pub fn notifier(&self) -> &Notifier<'a> {
        &self.notifier
    }
}

impl EventSink for NotifyEventSink<'_> {
    fn emit(&mut self, event: &AppEvent) {
        self.log.emit(event);
        if let Some(text) = event.notification_text() {
            self.notifier.enqueue(&text);
        }
    }
}
