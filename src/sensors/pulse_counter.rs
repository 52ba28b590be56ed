//! Interrupt-fed production-line pulse counters.
//!
//! Two halves share one small piece of state per channel:
//!
//! ```text
//!   GPIO ISR ──on_edge()──▶ PulseShared ◀──rearm/snapshot/take── PulseCounter (loop)
//!                           count · armed · last_edge_us
//! ```
//!
//! The ISR accepts an edge only while the channel is armed and more than
//! [`MIN_EDGE_INTERVAL_US`] after the previous accepted edge, then
//! disarms.  The loop re-arms once the input has sat at its idle (HIGH)
//! level for [`REARM_DEBOUNCE_MS`].  Together the two gates absorb contact
//! bounce and rapid false retriggers.
//!
//! The raw state is lock-free.  Each field has a single writer side:
//! the ISR owns `last_edge_us` and increments `count`; the loop re-arms
//! and zeroes `count` with one atomic swap.  `armed` is the hand-off
//! between the two and only ever changes through `swap`/`compare_exchange`,
//! so an edge on another core can never be counted twice or lost by a
//! concurrent reset.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use log::{debug, info};

use crate::config::COUNTER_CHANNELS;

/// Minimum spacing between two accepted edges on one channel.
pub const MIN_EDGE_INTERVAL_US: u32 = 3_000;
/// Idle-level dwell required before a disarmed channel is re-armed.
pub const REARM_DEBOUNCE_MS: u32 = 20;
/// Cadence of the raw → visible count sync.
pub const SYNC_INTERVAL_MS: u32 = 10;

/// Inputs are pulled up; a piece passing pulls the line LOW.
const IDLE_LEVEL: bool = true;

// ── Interrupt-shared half ─────────────────────────────────────

struct RawChannel {
    count: AtomicU32,
    armed: AtomicBool,
    last_edge_us: AtomicU32,
    /// `last_edge_us` is meaningless until the first accepted edge; the
    /// spacing gate is skipped until then.
    seen_edge: AtomicBool,
}

impl RawChannel {
    const fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
            armed: AtomicBool::new(true),
            last_edge_us: AtomicU32::new(0),
            seen_edge: AtomicBool::new(false),
        }
    }
}

/// Raw per-channel counters written by the edge ISRs.
///
/// The firmware keeps one instance in a `static` (ISR callbacks cannot
/// capture); every other user borrows it.
pub struct PulseShared {
    channels: [RawChannel; COUNTER_CHANNELS],
}

impl Default for PulseShared {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseShared {
    /// All channels zeroed and armed.
    pub const fn new() -> Self {
        Self {
            channels: [const { RawChannel::new() }; COUNTER_CHANNELS],
        }
    }

    /// ISR entry point: one falling edge seen at `now_us`.
    ///
    /// Returns whether the edge was counted.  Lock-free and non-blocking;
    /// touches only `channel`'s own state.
    pub fn on_edge(&self, channel: usize, now_us: u32) -> bool {
        let Some(raw) = self.channels.get(channel) else {
            return false;
        };
        if raw.seen_edge.load(Ordering::Relaxed)
            && now_us.wrapping_sub(raw.last_edge_us.load(Ordering::Relaxed)) <= MIN_EDGE_INTERVAL_US
        {
            return false;
        }
        if raw
            .armed
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }
        raw.last_edge_us.store(now_us, Ordering::Relaxed);
        raw.seen_edge.store(true, Ordering::Relaxed);
        raw.count.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Re-arm a disarmed channel.  Returns `true` if it was disarmed.
    fn rearm(&self, channel: usize) -> bool {
        self.channels
            .get(channel)
            .is_some_and(|raw| !raw.armed.swap(true, Ordering::AcqRel))
    }

    fn snapshot(&self, channel: usize) -> u32 {
        self.channels
            .get(channel)
            .map_or(0, |raw| raw.count.load(Ordering::Acquire))
    }

    /// Read and zero the raw count in one atomic step.
    fn take(&self, channel: usize) -> u32 {
        self.channels
            .get(channel)
            .map_or(0, |raw| raw.count.swap(0, Ordering::AcqRel))
    }

    pub fn is_armed(&self, channel: usize) -> bool {
        self.channels
            .get(channel)
            .is_some_and(|raw| raw.armed.load(Ordering::Acquire))
    }
}

// ── Loop-owned half ───────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct LoopChannel {
    level: bool,
    level_since_ms: u32,
    /// Externally visible count; only ever steps up toward the raw count.
    shown: u32,
}

/// Polling-loop view of the counters: re-arm, sync and reset.
pub struct PulseCounter<'a> {
    shared: &'a PulseShared,
    channels: [LoopChannel; COUNTER_CHANNELS],
    last_sync_ms: Option<u32>,
}

impl<'a> PulseCounter<'a> {
    pub fn new(shared: &'a PulseShared) -> Self {
        Self {
            shared,
            channels: [LoopChannel {
                level: IDLE_LEVEL,
                level_since_ms: 0,
                shown: 0,
            }; COUNTER_CHANNELS],
            last_sync_ms: None,
        }
    }

    /// Feed the current input levels; re-arms channels whose input has
    /// been idle for the full debounce interval.
    pub fn poll_levels(&mut self, now_ms: u32, levels: &[bool; COUNTER_CHANNELS]) {
        for (ch, (state, &level)) in self.channels.iter_mut().zip(levels).enumerate() {
            if level != state.level {
                state.level = level;
                state.level_since_ms = now_ms;
            } else if level == IDLE_LEVEL
                && now_ms.wrapping_sub(state.level_since_ms) >= REARM_DEBOUNCE_MS
                && self.shared.rearm(ch)
            {
                debug!("CNT{}: re-armed", ch + 1);
            }
        }
    }

    /// Step the visible counts up to the raw counts, one unit at a time.
    ///
    /// Runs at most every [`SYNC_INTERVAL_MS`]; returns whether any
    /// visible count changed.
    pub fn sync(&mut self, now_ms: u32) -> bool {
        if let Some(last) = self.last_sync_ms {
            if now_ms.wrapping_sub(last) < SYNC_INTERVAL_MS {
                return false;
            }
        }
        self.last_sync_ms = Some(now_ms);

        let mut changed = false;
        for (ch, state) in self.channels.iter_mut().enumerate() {
            let target = self.shared.snapshot(ch);
            while state.shown < target {
                state.shown += 1;
                debug!("CNT{}: +1 -> {}", ch + 1, state.shown);
                changed = true;
            }
        }
        changed
    }

    /// Raw count right now, including edges not yet synced.
    pub fn peek(&self, channel: usize) -> u32 {
        self.shared.snapshot(channel)
    }

    /// Externally visible count.
    pub fn visible(&self, channel: usize) -> u32 {
        self.channels.get(channel).map_or(0, |c| c.shown)
    }

    /// Capture and zero the raw count, then zero the visible count.
    /// Returns the captured quantity.  Edges landing after the swap belong
    /// to the next batch.
    pub fn take_and_reset(&mut self, channel: usize) -> u32 {
        let Some(state) = self.channels.get_mut(channel) else {
            return 0;
        };
        state.shown = 0;
        self.shared.take(channel)
    }

    /// Zero one channel, discarding the count.
    pub fn reset(&mut self, channel: usize) {
        let dropped = self.take_and_reset(channel);
        info!("CNT{}: reset (discarded {})", channel + 1, dropped);
    }
}
