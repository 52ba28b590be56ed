//! Application service — the hexagonal core.
//!
//! [`AppService`] owns every timing component and the live
//! configuration.  It exposes a clean, hardware-agnostic API.  All I/O
//! flows through port traits injected at call sites, making the entire
//! service testable with mock adapters.
//!
//! ```text
//!   InputPort ──▶ ┌──────────────────────────────────┐ ──▶ EventSink
//!                 │            AppService             │
//!   RelayPort ◀── │ Pulse · Relay · Alarm · Scheduler │
//!                 │ Reporter · TimeSource             │
//!  Clock ports ◀─▶└──────────────────────────────────┘
//! ```
//!
//! One [`tick`](AppService::tick) per polling-loop iteration:
//!
//! 1. sample inputs, re-arm and sync the pulse counters
//! 2. threshold report check
//! 3. release expired relay holds, advance a running self-test
//! 4. alarm debounce / latch
//! 5. every 500 ms: resolve time, run schedules and daily reports

use log::{info, warn};

use crate::config::{COUNTER_CHANNELS, RELAY_CHANNELS, SystemConfig, bounded, clamp_hold};
use crate::datetime::DateTime;
use crate::alarms::{AlarmMonitor, AlarmTransition};
use crate::relay::{RelayActuator, StartOutcome, StopReason};
use crate::reporter::{CounterReport, CounterReporter};
use crate::scheduler::Scheduler;
use crate::sensors::pulse_counter::{PulseCounter, PulseShared};
use crate::time_source::TimeSource;

use super::commands::AppCommand;
use super::events::{AppEvent, RelayStatus, StatusSnapshot};
use super::ports::{
    ConfigPort, EventSink, InputLevels, InputPort, PersistentClock, RelayPort, SchedulerDelegate,
    SnapshotStore, TimeSyncPort,
};

/// Settings that live in adapters outside the core.  Set when an
/// `UpdateConfig` changed them; the owner of those adapters pushes the
/// new values from [`AppService::current_config`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterChanges {
    /// Bot token or chat id.
    pub notify: bool,
    pub utc_offset: bool,
    pub relay_polarity: bool,
    /// SSID or password.
    pub wifi: bool,
}

impl AdapterChanges {
    fn between(old: &SystemConfig, new: &SystemConfig) -> Self {
        Self {
            notify: old.bot_token != new.bot_token || old.chat_id != new.chat_id,
            utc_offset: old.utc_offset_minutes != new.utc_offset_minutes,
            relay_polarity: old.relay_active_low != new.relay_active_low,
            wifi: old.wifi_ssid != new.wifi_ssid || old.wifi_password != new.wifi_password,
        }
    }

    fn merge(self, other: Self) -> Self {
        Self {
            notify: self.notify || other.notify,
            utc_offset: self.utc_offset || other.utc_offset,
            relay_polarity: self.relay_polarity || other.relay_polarity,
            wifi: self.wifi || other.wifi,
        }
    }

    pub fn any(&self) -> bool {
        self.notify || self.utc_offset || self.relay_polarity || self.wifi
    }
}

/// Quiet period after the last config change before it is written.
pub const AUTO_SAVE_DELAY_MS: u32 = 5_000;
/// Longest hold used by the relay self-test.
pub const SELF_TEST_MAX_HOLD_SECS: u32 = 3;

// ───────────────────────────────────────────────────────────────
// Scheduler delegate
// ───────────────────────────────────────────────────────────────

/// Collects the channels fired during one evaluation so they can be
/// actuated after the scheduler borrow ends.
#[derive(Default)]
struct FiredChannels(heapless::Vec<(usize, u32), RELAY_CHANNELS>);

impl SchedulerDelegate for FiredChannels {
    fn on_schedule_fired(&mut self, channel: usize, hold_secs: u32) {
        // Capacity equals the channel count.
        let _ = self.0.push((channel, hold_secs));
    }
}

/// Progress of a running relay self-test.
#[derive(Debug, Clone, Copy)]
struct SelfTest {
    next: usize,
    current: Option<usize>,
}

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct AppService<'a> {
    config: SystemConfig,
    time: TimeSource,
    counters: PulseCounter<'a>,
    relays: RelayActuator,
    alarms: AlarmMonitor,
    scheduler: Scheduler,
    reporter: CounterReporter,
    self_test: Option<SelfTest>,
    dirty_since_ms: Option<u32>,
    adapter_changes: AdapterChanges,
    online_announced: bool,
    tick_count: u64,
}

impl<'a> AppService<'a> {
    /// Construct the service.  `config` is clamped before use.
    ///
    /// Does **not** touch hardware — call [`start`](Self::start) next.
    pub fn new(config: SystemConfig, pulses: &'a PulseShared) -> Self {
        Self {
            config: config.sanitized(),
            time: TimeSource::new(),
            counters: PulseCounter::new(pulses),
            relays: RelayActuator::new(),
            alarms: AlarmMonitor::new(&InputLevels::default().alarms, 0),
            scheduler: Scheduler::new(),
            reporter: CounterReporter::new(),
            self_test: None,
            dirty_since_ms: None,
            adapter_changes: AdapterChanges::default(),
            online_announced: false,
            tick_count: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Boot sequence: release every relay, bring up the RTC tier and seed
    /// the alarm debounce with the current input levels.
    pub fn start(
        &mut self,
        now_ms: u32,
        hw: &mut (impl RelayPort + InputPort),
        clock: &mut impl PersistentClock,
        store: &impl SnapshotStore,
        sink: &mut impl EventSink,
    ) {
        self.relays.release_all(hw);
        let rtc_ready = self.time.init_clock(clock, store);
        let levels = hw.read_inputs();
        self.alarms = AlarmMonitor::new(&levels.alarms, now_ms);
        sink.emit(&AppEvent::Started { rtc_ready });
        info!("AppService started (rtc_ready={})", rtc_ready);
    }

    /// Emit the one-per-boot "device online" notice.  Returns whether it
    /// was emitted by this call.
    pub fn announce_online(&mut self, ip: &str, sink: &mut impl EventSink) -> bool {
        if self.online_announced {
            return false;
        }
        self.online_announced = true;
        sink.emit(&AppEvent::Online { ip: bounded(ip) });
        true
    }

    /// Copy network time into the RTC and snapshot.  Call once the
    /// network is up.
    pub fn discipline_time(
        &mut self,
        clock: &mut (impl TimeSyncPort + PersistentClock),
        store: &impl SnapshotStore,
    ) -> bool {
        self.time.discipline(clock, store)
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one polling-loop iteration.
    ///
    /// `hw` satisfies **both** [`RelayPort`] and [`InputPort`], which
    /// avoids a double mutable borrow while keeping the port boundary
    /// explicit.
    pub fn tick(
        &mut self,
        now_ms: u32,
        hw: &mut (impl RelayPort + InputPort),
        clock: &mut (impl TimeSyncPort + PersistentClock),
        store: &impl SnapshotStore,
        sink: &mut impl EventSink,
    ) {
        self.tick_count += 1;

        // 1. Inputs and pulse counters
        let levels = hw.read_inputs();
        self.counters.poll_levels(now_ms, &levels.counters);
        self.counters.sync(now_ms);

        // 2. Threshold report
        if let Some(report) = self.reporter.check_threshold(&mut self.counters, &self.config.counters) {
            self.emit_report(report, sink);
        }

        // 3. Relay convergence
        for (channel, path) in self.relays.converge(now_ms, hw) {
            sink.emit(&AppEvent::RelayEnded {
                channel,
                message: self.config.schedules[channel].message.clone(),
                path,
            });
        }
        self.step_self_test(now_ms, hw, sink);

        // 4. Alarms
        for transition in self.alarms.poll(now_ms, &levels.alarms) {
            let event = match transition {
                AlarmTransition::Raised(channel) => AppEvent::AlarmRaised {
                    channel,
                    message: self.config.alarm_messages[channel].clone(),
                },
                AlarmTransition::Cleared(channel) => AppEvent::AlarmCleared {
                    channel,
                    notify: self.config.notify_alarm_recovery,
                },
            };
            sink.emit(&event);
        }

        // 5. Minute-level schedules and daily reports
        if self.scheduler.due(now_ms) {
            let time = self.time.resolve(now_ms, clock, store);
            let mut fired = FiredChannels::default();
            self.scheduler.evaluate(
                time,
                &self.config.schedules,
                self.config.weekday_mask,
                &mut fired,
            );
            for (channel, hold_secs) in fired.0 {
                self.fire_channel(channel, hold_secs, now_ms, hw, sink);
            }

            for report in self.reporter.evaluate_daily(
                time,
                &mut self.counters,
                &self.config.counters,
                self.config.weekday_mask,
            ) {
                self.emit_report(report, sink);
            }
        }
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an external command.
    pub fn handle_command(
        &mut self,
        cmd: AppCommand,
        now_ms: u32,
        hw: &mut impl RelayPort,
        clock: &mut impl PersistentClock,
        store: &impl SnapshotStore,
        sink: &mut impl EventSink,
    ) {
        match cmd {
            AppCommand::TestRelay { channel } => {
                if channel >= RELAY_CHANNELS {
                    warn!("TestRelay: channel {} out of range", channel);
                    return;
                }
                if self.relays.is_active(channel) {
                    self.relays.stop(channel, StopReason::Restart, hw);
                    sink.emit(&AppEvent::RelayStopped {
                        channel,
                        reason: StopReason::Restart,
                    });
                }
                let hold = self.config.schedules[channel].hold_secs;
                self.fire_channel(channel, hold, now_ms, hw, sink);
            }
            AppCommand::StopRelay { channel } => {
                if channel >= RELAY_CHANNELS {
                    warn!("StopRelay: channel {} out of range", channel);
                    return;
                }
                self.relays.stop(channel, StopReason::Manual, hw);
                sink.emit(&AppEvent::RelayStopped {
                    channel,
                    reason: StopReason::Manual,
                });
            }
            AppCommand::SelfTest => {
                if self.self_test.is_some() {
                    warn!("SelfTest: already running");
                    return;
                }
                info!("SelfTest: starting");
                self.self_test = Some(SelfTest { next: 0, current: None });
                self.step_self_test(now_ms, hw, sink);
            }
            AppCommand::ResetCounter { channel } => {
                if channel >= COUNTER_CHANNELS {
                    warn!("ResetCounter: channel {} out of range", channel);
                    return;
                }
                let discarded = self.counters.take_and_reset(channel);
                sink.emit(&AppEvent::CounterReset { channel, discarded });
            }
            AppCommand::SetTime(dt) => self.set_time(now_ms, &dt, clock, store),
            AppCommand::SendText(text) => {
                if !text.is_empty() {
                    sink.emit(&AppEvent::Text(text));
                }
            }
            AppCommand::UpdateConfig(new_config) => {
                let new_config = new_config.sanitized();
                let changes = AdapterChanges::between(&self.config, &new_config);
                if changes.any() {
                    info!("Configuration: adapter settings changed {:?}", changes);
                }
                self.adapter_changes = self.adapter_changes.merge(changes);
                self.config = new_config;
                self.mark_config_dirty(now_ms);
                info!("Configuration updated at runtime");
            }
            AppCommand::SaveConfig => {
                self.dirty_since_ms = Some(now_ms.wrapping_sub(AUTO_SAVE_DELAY_MS));
                info!("Explicit config save requested (will flush on next auto-save check)");
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    /// Point-in-time view of every channel.
    pub fn status(&self, now_ms: u32) -> StatusSnapshot {
        StatusSnapshot {
            relays: core::array::from_fn(|ch| RelayStatus {
                active: self.relays.is_active(ch),
                remaining_ms: self.relays.remaining_ms(ch, now_ms),
            }),
            alarms: self.alarms.latched_mask(),
            counters: core::array::from_fn(|ch| self.counters.visible(ch)),
            time: self.time.last_resolved().map(|t| (t.hour, t.minute)),
        }
    }

    /// Total ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn self_test_running(&self) -> bool {
        self.self_test.is_some()
    }

    pub fn current_config(&self) -> &SystemConfig {
        &self.config
    }

    /// Adapter settings changed since the last call, if any.
    pub fn take_adapter_changes(&mut self) -> Option<AdapterChanges> {
        let changes = core::mem::take(&mut self.adapter_changes);
        changes.any().then_some(changes)
    }

    // ── Internal ──────────────────────────────────────────────

    /// Queue the channel message, then start (or extend) the hold.
    fn fire_channel(
        &mut self,
        channel: usize,
        hold_secs: u32,
        now_ms: u32,
        hw: &mut impl RelayPort,
        sink: &mut impl EventSink,
    ) {
        let hold_secs = clamp_hold(hold_secs);
        sink.emit(&AppEvent::ScheduleFired {
            channel,
            hold_secs,
            message: self.config.schedules[channel].message.clone(),
        });
        if let Some(StartOutcome::Extended { added_secs }) =
            self.relays.start(channel, hold_secs, now_ms, hw)
        {
            sink.emit(&AppEvent::RelayExtended { channel, added_secs });
        }
    }

    fn emit_report(&self, report: CounterReport, sink: &mut impl EventSink) {
        let event = match report {
            CounterReport::TargetReached { channel, quantity } => AppEvent::CounterTargetReached {
                channel,
                message: self.config.counters[channel].message.clone(),
                quantity,
            },
            CounterReport::Daily { channel, quantity } => AppEvent::CounterDaily {
                channel,
                message: self.config.counters[channel].message.clone(),
                quantity,
            },
        };
        sink.emit(&event);
    }

    /// Advance a running self-test without blocking: one channel at a
    /// time, each released by the normal convergence path.
    fn step_self_test(&mut self, now_ms: u32, hw: &mut impl RelayPort, sink: &mut impl EventSink) {
        let Some(mut st) = self.self_test else {
            return;
        };
        loop {
            match st.current {
                Some(ch) if self.relays.is_active(ch) => break,
                Some(ch) => {
                    sink.emit(&AppEvent::SelfTestDone { channel: ch, busy: false });
                    st.current = None;
                }
                None if st.next >= RELAY_CHANNELS => {
                    info!("SelfTest: complete");
                    self.self_test = None;
                    return;
                }
                None => {
                    let ch = st.next;
                    st.next += 1;
                    if self.relays.is_active(ch) {
                        sink.emit(&AppEvent::SelfTestDone { channel: ch, busy: true });
                        continue;
                    }
                    let hold = clamp_hold(self.config.schedules[ch].hold_secs).min(SELF_TEST_MAX_HOLD_SECS);
                    sink.emit(&AppEvent::SelfTestStep { channel: ch, hold_secs: hold });
                    self.relays.start(ch, hold, now_ms, hw);
                    st.current = Some(ch);
                    break;
                }
            }
        }
        self.self_test = Some(st);
    }

    fn set_time(
        &mut self,
        now_ms: u32,
        dt: &DateTime,
        clock: &mut impl PersistentClock,
        store: &impl SnapshotStore,
    ) {
        match self.time.set_time(now_ms, dt, clock, store) {
            Ok(()) => info!("SetTime: RTC updated"),
            Err(e) => warn!("SetTime: {}", e),
        }
    }

    // ── Config dirty-flag management ──────────────────────────

    /// Mark the config as modified.  Called by `handle_command(UpdateConfig)`.
    pub fn mark_config_dirty(&mut self, now_ms: u32) {
        if self.dirty_since_ms.is_none() {
            self.dirty_since_ms = Some(now_ms);
        }
    }

    /// Check if auto-save should trigger (5 seconds after last change).
    /// Returns `true` if the config was saved.
    pub fn auto_save_if_needed(&mut self, now_ms: u32, storage: &impl ConfigPort) -> bool {
        let Some(since) = self.dirty_since_ms else {
            return false;
        };
        if now_ms.wrapping_sub(since) < AUTO_SAVE_DELAY_MS {
            return false;
        }
        match storage.save(&self.config) {
            Ok(()) => {
                self.dirty_since_ms = None;
                info!("Config auto-saved to NVS");
                true
            }
            Err(e) => {
                warn!("Config auto-save failed: {}", e);
                false
            }
        }
    }

    /// Whether the config has unsaved changes.
    pub fn is_config_dirty(&self) -> bool {
        self.dirty_since_ms.is_some()
    }
}
