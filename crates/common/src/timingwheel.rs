// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

//! Hierarchical timing wheel.
//!
//! Backs every per-connection deadline in the state service: thousands of
//! concurrent heartbeat, reconnect-grace, and retransmit timers with O(1)
//! insertion and cancellation. Expirations fire on one dedicated driver
//! thread, so callbacks must stay short and hand heavy work to an executor.
//!
//! Cancellation is idempotent and races fairly with expiry: a callback that
//! was already dequeued for firing may still run once after `stop()`, so
//! callers guard their callbacks with state checks.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const STATUS_PENDING: u8 = 0;
const STATUS_FIRED: u8 = 1;
const STATUS_CANCELLED: u8 = 2;

/// Handle to a scheduled callback.
pub struct Timer {
    state: Arc<TimerState>,
}

struct TimerState {
    status: AtomicU8,
}

impl Timer {
    /// Cancel the timer. Returns `true` if the callback was prevented from
    /// running, `false` if it already fired (or was already cancelled).
    /// Safe to call any number of times.
    pub fn stop(&self) -> bool {
        self.state
            .status
            .compare_exchange(STATUS_PENDING, STATUS_CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

struct Entry {
    deadline: u64,
    timer: Arc<TimerState>,
    callback: Option<Box<dyn FnOnce() + Send>>,
}

struct Level {
    slots: Vec<Vec<Entry>>,
}

struct WheelState {
    now_tick: u64,
    levels: Vec<Level>,
}

struct Shared {
    tick: Duration,
    slots_per_level: usize,
    state: Mutex<WheelState>,
    stopped: AtomicBool,
}

/// The wheel itself. Created started; dropped or [`shutdown`] stops the
/// driver thread.
///
/// [`shutdown`]: TimingWheel::shutdown
pub struct TimingWheel {
    shared: Arc<Shared>,
    driver: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl TimingWheel {
    /// Start a wheel with the given tick resolution and slots per level.
    pub fn start(tick: Duration, slots_per_level: usize) -> Self {
        let shared = Arc::new(Shared {
            tick,
            slots_per_level,
            state: Mutex::new(WheelState { now_tick: 0, levels: Vec::new() }),
            stopped: AtomicBool::new(false),
        });
        let driver_shared = Arc::clone(&shared);
        let driver = std::thread::Builder::new()
            .name("timing-wheel".to_owned())
            .spawn(move || drive(driver_shared))
            .ok();
        Self { shared, driver: Mutex::new(driver) }
    }

    /// Start a wheel with the canonical 1 ms tick and 20 slots per level.
    pub fn with_defaults() -> Self {
        Self::start(Duration::from_millis(1), 20)
    }

    /// Schedule `f` to run once after `d`. Returns a cancellation handle.
    pub fn after_func<F>(&self, d: Duration, f: F) -> Timer
    where
        F: FnOnce() + Send + 'static,
    {
        let timer = Arc::new(TimerState { status: AtomicU8::new(STATUS_PENDING) });
        let ticks = ticks_for(d, self.shared.tick).max(1);

        let mut state = self.shared.state.lock();
        let deadline = state.now_tick + ticks;
        let entry =
            Entry { deadline, timer: Arc::clone(&timer), callback: Some(Box::new(f)) };
        place(&mut state, self.shared.slots_per_level, entry);
        drop(state);

        Timer { state: timer }
    }

    /// Stop the driver thread. Pending timers never fire after this returns.
    pub fn shutdown(&self) {
        self.shared.stopped.store(true, Ordering::Release);
        if let Some(handle) = self.driver.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TimingWheel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn ticks_for(d: Duration, tick: Duration) -> u64 {
    let tick_nanos = tick.as_nanos().max(1);
    (d.as_nanos().div_ceil(tick_nanos)) as u64
}

/// Span of one slot at `level`: `slots^level` ticks.
fn slot_span(slots_per_level: usize, level: usize) -> u64 {
    (slots_per_level as u64).pow(level as u32)
}

fn place(state: &mut WheelState, slots_per_level: usize, entry: Entry) {
    let delta = entry.deadline.saturating_sub(state.now_tick);
    let mut level = 0usize;
    while delta >= slot_span(slots_per_level, level + 1) {
        level += 1;
    }
    while state.levels.len() <= level {
        state.levels.push(Level { slots: (0..slots_per_level).map(|_| Vec::new()).collect() });
    }
    let span = slot_span(slots_per_level, level);
    let slot = ((entry.deadline / span) % slots_per_level as u64) as usize;
    state.levels[level].slots[slot].push(entry);
}

/// Advance the wheel by one tick; returns the callbacks that matured.
fn advance(state: &mut WheelState, slots_per_level: usize) -> Vec<Box<dyn FnOnce() + Send>> {
    state.now_tick += 1;
    let now = state.now_tick;
    let mut fired = Vec::new();
    let mut cascade = Vec::new();

    for level in 0..state.levels.len() {
        let span = slot_span(slots_per_level, level);
        if now % span != 0 {
            break;
        }
        let slot = ((now / span) % slots_per_level as u64) as usize;
        cascade.append(&mut state.levels[level].slots[slot]);
    }

    for mut entry in cascade {
        if entry.deadline <= now {
            let preempted = entry
                .timer
                .status
                .compare_exchange(
                    STATUS_PENDING,
                    STATUS_FIRED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok();
            if preempted {
                if let Some(cb) = entry.callback.take() {
                    fired.push(cb);
                }
            }
        } else {
            // Not due yet: matured out of a coarse slot, re-place lower.
            place(state, slots_per_level, entry);
        }
    }
    fired
}

fn drive(shared: Arc<Shared>) {
    let start = Instant::now();
    let mut processed: u64 = 0;
    while !shared.stopped.load(Ordering::Acquire) {
        std::thread::sleep(shared.tick);
        let target = ticks_for(start.elapsed(), shared.tick);
        while processed < target {
            let fired = {
                let mut state = shared.state.lock();
                processed += 1;
                advance(&mut state, shared.slots_per_level)
            };
            for cb in fired {
                cb();
            }
            if shared.stopped.load(Ordering::Acquire) {
                return;
            }
        }
    }
}

#[cfg(test)]
#[path = "timingwheel_tests.rs"]
mod tests;
