//! Integration tests for the AppService → timing components → ports
//! pipeline.
//!
//! Each test builds the service on mock adapters, drives the polling
//! loop in 10 ms steps and asserts on relay writes, emitted events and
//! what reached the clock / storage mocks.

use crate::mock_hw::{MockBoard, MockClock, MockNvs, RecordingSink};

use relaybox::app::commands::AppCommand;
use relaybox::app::events::AppEvent;
use relaybox::app::service::AppService;
use relaybox::config::{ChannelSchedule, SystemConfig, WeekdayMask, bounded};
use relaybox::datetime::DateTime;
use relaybox::relay::{EndPath, StopReason};
use relaybox::sensors::pulse_counter::PulseShared;

const STEP_MS: u32 = 10;

/// 2025-03-03 is a Monday.
fn monday(hour: u8, minute: u8) -> DateTime {
    DateTime::new(2025, 3, 3, hour, minute, 0).unwrap()
}

fn tuesday(hour: u8, minute: u8) -> DateTime {
    DateTime::new(2025, 3, 4, hour, minute, 0).unwrap()
}

fn schedule(hour: u8, minute: u8, hold_secs: u32, message: &str) -> ChannelSchedule {
    ChannelSchedule {
        hour,
        minute,
        hold_secs,
        message: bounded(message),
    }
}

struct Rig<'a> {
    app: AppService<'a>,
    board: MockBoard,
    clock: MockClock,
    nvs: MockNvs,
    sink: RecordingSink,
}

impl<'a> Rig<'a> {
    fn new(shared: &'a PulseShared, config: SystemConfig, clock: MockClock, nvs: MockNvs) -> Self {
        let mut rig = Self {
            app: AppService::new(config, shared),
            board: MockBoard::new(),
            clock,
            nvs,
            sink: RecordingSink::new(),
        };
        rig.app.start(0, &mut rig.board, &mut rig.clock, &rig.nvs, &mut rig.sink);
        rig
    }

    fn tick(&mut self, now_ms: u32) {
        self.app
            .tick(now_ms, &mut self.board, &mut self.clock, &self.nvs, &mut self.sink);
    }

    /// Tick every [`STEP_MS`] from `from_ms` to `to_ms` inclusive.
    fn run(&mut self, from_ms: u32, to_ms: u32) {
        let mut t = from_ms;
        while t <= to_ms {
            self.tick(t);
            t += STEP_MS;
        }
    }

    fn command(&mut self, cmd: AppCommand, now_ms: u32) {
        self.app
            .handle_command(cmd, now_ms, &mut self.board, &mut self.clock, &self.nvs, &mut self.sink);
    }

    fn fired(&self, channel: usize) -> usize {
        self.sink
            .count(|e| matches!(e, AppEvent::ScheduleFired { channel: c, .. } if *c == channel))
    }
}

/// One piece passing the sensor at `t_ms`: a falling edge plus a contact
/// bounce 1 ms later, LOW for one tick, then idle long enough to re-arm.
/// Returns the time of the next free slot.
fn pulse(rig: &mut Rig<'_>, shared: &PulseShared, channel: usize, t_ms: u32) -> u32 {
    shared.on_edge(channel, t_ms * 1_000);
    shared.on_edge(channel, t_ms * 1_000 + 1_000);
    rig.board.inputs.counters[channel] = false;
    rig.tick(t_ms);
    rig.board.inputs.counters[channel] = true;
    rig.run(t_ms + STEP_MS, t_ms + 40);
    t_ms + 50
}

// ── Relay schedules ───────────────────────────────────────────

#[test]
fn scheduled_channel_fires_once_and_releases_after_hold() {
    let shared = PulseShared::new();
    let mut cfg = SystemConfig::default();
    cfg.schedules[2] = schedule(7, 30, 5, "Feeder");
    let mut rig = Rig::new(&shared, cfg, MockClock::synced(monday(7, 30)), MockNvs::new());

    rig.run(0, 4_990);
    assert!(rig.board.relays[2], "relay must hold for the full window");

    rig.run(5_000, 20_000);
    assert!(!rig.board.relays[2]);
    assert_eq!(rig.fired(2), 1, "one trigger per minute");
    assert_eq!(rig.board.energised(2), 1);
    assert!(rig.sink.events.iter().any(|e| matches!(
        e,
        AppEvent::RelayEnded { channel: 2, path: EndPath::Expired, .. }
    )));
    assert_eq!(rig.sink.texts(), vec!["Feeder", "Feeder off"]);
}

#[test]
fn trigger_rearms_after_minute_change_and_extends_running_hold() {
    let shared = PulseShared::new();
    let mut cfg = SystemConfig::default();
    cfg.schedules[0] = schedule(7, 30, 5, "Pump");
    let mut rig = Rig::new(&shared, cfg, MockClock::synced(monday(7, 30)), MockNvs::new());

    rig.run(0, 1_000);
    rig.clock.network = Some(monday(7, 31));
    rig.run(1_010, 2_000);
    rig.clock.network = Some(tuesday(7, 30));
    rig.run(2_010, 3_000);

    assert_eq!(rig.fired(0), 2);
    // Second trigger landed while the first hold was running.
    assert_eq!(rig.board.energised(0), 1);
    assert!(rig.sink.events.iter().any(|e| matches!(
        e,
        AppEvent::RelayExtended { channel: 0, added_secs: 5 }
    )));

    // 5 s + 5 s from t = 0.
    rig.run(3_010, 9_990);
    assert!(rig.board.relays[0]);
    rig.run(10_000, 12_000);
    assert!(!rig.board.relays[0]);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::RelayEnded { .. })), 1);
}

#[test]
fn disabled_weekday_suppresses_schedules() {
    let shared = PulseShared::new();
    let mut cfg = SystemConfig::default();
    cfg.schedules[0] = schedule(7, 30, 3, "Pump");
    cfg.weekday_mask = WeekdayMask::from_bits(0b111_1110);
    let mut rig = Rig::new(&shared, cfg, MockClock::synced(monday(7, 30)), MockNvs::new());

    rig.run(0, 3_000);

    assert_eq!(rig.fired(0), 0);
    assert_eq!(rig.board.energised(0), 0);
}

#[test]
fn snapshot_time_runs_schedules_on_every_weekday() {
    let shared = PulseShared::new();
    let mut cfg = SystemConfig::default();
    // Monday only; the snapshot tier carries no weekday.
    cfg.weekday_mask = WeekdayMask::from_bits(0b000_0001);
    let mut rig = Rig::new(
        &shared,
        cfg,
        MockClock::offline(),
        MockNvs::with_snapshot("2025-03-01 08:00"),
    );

    rig.run(0, 100);

    // Every default schedule sits at 08:00.
    assert!(rig.board.relays.iter().all(|&on| on));
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::ScheduleFired { .. })), 6);
    assert_eq!(rig.app.status(100).time, Some((8, 0)));
}

#[test]
fn no_time_source_skips_evaluation() {
    let shared = PulseShared::new();
    let mut rig = Rig::new(&shared, SystemConfig::default(), MockClock::offline(), MockNvs::new());

    rig.run(0, 2_000);

    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::ScheduleFired { .. })), 0);
    assert_eq!(rig.app.status(2_000).time, None);
}

#[test]
fn stop_command_releases_and_reports_reason() {
    let shared = PulseShared::new();
    let mut rig = Rig::new(&shared, SystemConfig::default(), MockClock::offline(), MockNvs::new());

    rig.command(AppCommand::TestRelay { channel: 0 }, 100);
    assert!(rig.board.relays[0]);
    rig.command(AppCommand::StopRelay { channel: 0 }, 200);

    assert!(!rig.board.relays[0]);
    assert!(rig.sink.events.iter().any(|e| matches!(
        e,
        AppEvent::RelayStopped { channel: 0, reason: StopReason::Manual }
    )));
    assert_eq!(rig.sink.texts(), vec!["Relay!", "CH1 test ended (manual)"]);

    // Stopped channels are not reported again by convergence.
    rig.run(210, 10_000);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::RelayEnded { .. })), 0);
}

// ── Time sources ──────────────────────────────────────────────

#[test]
fn rtc_is_restored_from_snapshot_after_power_loss() {
    let shared = PulseShared::new();
    let clock = MockClock {
        rtc_present: true,
        lost_power: true,
        ..MockClock::default()
    };
    let mut rig = Rig::new(
        &shared,
        SystemConfig::default(),
        clock,
        MockNvs::with_snapshot("2025-03-01 06:45"),
    );

    assert_eq!(rig.clock.rtc_writes, vec![DateTime::new(2025, 3, 1, 6, 45, 0).unwrap()]);
    assert!(matches!(rig.sink.events[0], AppEvent::Started { rtc_ready: true }));

    rig.tick(0);
    assert_eq!(rig.app.status(0).time, Some((6, 45)));
}

#[test]
fn discipline_copies_network_time_to_rtc_and_snapshot() {
    let shared = PulseShared::new();
    let mut clock = MockClock::rtc_only(monday(6, 0));
    clock.network = Some(monday(9, 15));
    let mut rig = Rig::new(&shared, SystemConfig::default(), clock, MockNvs::new());

    assert!(rig.app.discipline_time(&mut rig.clock, &rig.nvs));
    assert_eq!(rig.clock.rtc, Some(monday(9, 15)));
    assert_eq!(rig.nvs.saved_snapshot().as_deref(), Some("2025-03-03 09:15"));
}

#[test]
fn manual_time_without_rtc_still_feeds_the_scheduler() {
    let shared = PulseShared::new();
    let mut cfg = SystemConfig::default();
    cfg.schedules[4] = schedule(12, 0, 2, "Lights");
    let mut rig = Rig::new(&shared, cfg, MockClock::offline(), MockNvs::new());

    rig.command(AppCommand::SetTime(monday(12, 0)), 0);
    rig.run(0, 100);

    assert_eq!(rig.nvs.saved_snapshot().as_deref(), Some("2025-03-03 12:00"));
    assert_eq!(rig.fired(4), 1);
}

// ── Alarms ────────────────────────────────────────────────────

#[test]
fn alarm_is_reported_once_while_contact_stays_closed() {
    let shared = PulseShared::new();
    let mut rig = Rig::new(&shared, SystemConfig::default(), MockClock::offline(), MockNvs::new());

    rig.run(0, 90);
    rig.board.inputs.alarms[1] = false;
    rig.run(100, 5_000);

    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::AlarmRaised { channel: 1, .. })), 1);
    assert_eq!(rig.app.status(5_000).alarms, 0b10);

    rig.board.inputs.alarms[1] = true;
    rig.run(5_010, 6_000);

    assert_eq!(rig.app.status(6_000).alarms, 0);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::AlarmCleared { channel: 1, .. })), 1);
    // Recovery notices are off by default.
    assert_eq!(rig.sink.texts(), vec!["⚠️ DI2: Fault CH2"]);
}

#[test]
fn short_glitch_does_not_latch() {
    let shared = PulseShared::new();
    let mut rig = Rig::new(&shared, SystemConfig::default(), MockClock::offline(), MockNvs::new());

    rig.run(0, 100);
    rig.board.inputs.alarms[3] = false;
    rig.run(110, 130);
    rig.board.inputs.alarms[3] = true;
    rig.run(140, 1_000);

    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::AlarmRaised { .. })), 0);
}

// ── Counters ──────────────────────────────────────────────────

#[test]
fn threshold_report_fires_at_target_and_resets() {
    let shared = PulseShared::new();
    let mut cfg = SystemConfig::default();
    cfg.counters[0].target = 50;
    cfg.counters[0].message = bounded("Box");
    let mut rig = Rig::new(&shared, cfg, MockClock::offline(), MockNvs::new());

    let mut t = 1_000;
    for _ in 0..49 {
        t = pulse(&mut rig, &shared, 0, t);
    }
    assert_eq!(rig.app.status(t).counters[0], 49);
    assert_eq!(rig.sink.count(|e| matches!(e, AppEvent::CounterTargetReached { .. })), 0);

    t = pulse(&mut rig, &shared, 0, t);

    assert!(rig.sink.events.iter().any(|e| matches!(
        e,
        AppEvent::CounterTargetReached { channel: 0, quantity: 50, .. }
    )));
    assert_eq!(rig.app.status(t).counters[0], 0);
    assert_eq!(rig.sink.texts(), vec!["Box qty=50 (target reached)"]);

    // The next 50 pieces make a fresh batch.
    for _ in 0..49 {
        t = pulse(&mut rig, &shared, 0, t);
    }
    assert_eq!(rig.app.status(t).counters[0], 49);
    t = pulse(&mut rig, &shared, 0, t);

    assert_eq!(
        rig.sink.count(|e| matches!(e, AppEvent::CounterTargetReached { channel: 0, quantity: 50, .. })),
        2
    );
    assert_eq!(rig.app.status(t).counters[0], 0);
    assert_eq!(
        rig.sink.texts(),
        vec!["Box qty=50 (target reached)", "Box qty=50 (target reached)"]
    );
}

#[test]
fn daily_report_captures_and_zeroes_second_counter() {
    let shared = PulseShared::new();
    let mut cfg = SystemConfig::default();
    cfg.counters[1].daily_hour = 18;
    cfg.counters[1].daily_minute = 0;
    cfg.counters[1].message = bounded("Line B");
    let mut rig = Rig::new(&shared, cfg, MockClock::synced(monday(17, 59)), MockNvs::new());

    let mut t = 1_000;
    for _ in 0..7 {
        t = pulse(&mut rig, &shared, 1, t);
    }
    assert_eq!(rig.app.status(t).counters[1], 7);

    rig.clock.network = Some(monday(18, 0));
    rig.run(t, t + 1_000);

    assert!(rig.sink.events.iter().any(|e| matches!(
        e,
        AppEvent::CounterDaily { channel: 1, quantity: 7, .. }
    )));
    assert_eq!(rig.app.status(t + 1_000).counters[1], 0);
    assert_eq!(rig.sink.texts(), vec!["Line B qty=7"]);
}

#[test]
fn reset_command_discards_without_report() {
    let shared = PulseShared::new();
    let mut rig = Rig::new(&shared, SystemConfig::default(), MockClock::offline(), MockNvs::new());

    let mut t = 1_000;
    for _ in 0..3 {
        t = pulse(&mut rig, &shared, 0, t);
    }
    rig.command(AppCommand::ResetCounter { channel: 0 }, t);

    assert!(rig.sink.events.iter().any(|e| matches!(
        e,
        AppEvent::CounterReset { channel: 0, discarded: 3 }
    )));
    assert_eq!(rig.app.status(t).counters[0], 0);
    assert!(rig.sink.texts().is_empty());
}

// ── Config persistence ────────────────────────────────────────

#[test]
fn runtime_config_is_clamped_and_persisted() {
    let shared = PulseShared::new();
    let mut rig = Rig::new(&shared, SystemConfig::default(), MockClock::offline(), MockNvs::new());

    let mut cfg = SystemConfig::default();
    cfg.schedules[1].hold_secs = 90_000;
    cfg.schedules[1].hour = 31;
    rig.command(AppCommand::UpdateConfig(cfg), 1_000);

    assert!(rig.app.is_config_dirty());
    assert!(!rig.app.auto_save_if_needed(3_000, &rig.nvs));
    assert!(rig.app.auto_save_if_needed(6_000, &rig.nvs));

    let saved = rig.nvs.config.borrow().clone().unwrap();
    assert_eq!(saved.schedules[1].hold_secs, 3_600);
    assert_eq!(saved.schedules[1].hour, 23);
}

#[test]
fn failed_save_stays_dirty() {
    let shared = PulseShared::new();
    let nvs = MockNvs {
        fail_writes: true,
        ..MockNvs::default()
    };
    let mut rig = Rig::new(&shared, SystemConfig::default(), MockClock::offline(), nvs);

    rig.command(AppCommand::SaveConfig, 1_000);

    assert!(!rig.app.auto_save_if_needed(1_000, &rig.nvs));
    assert!(rig.app.is_config_dirty());
}
