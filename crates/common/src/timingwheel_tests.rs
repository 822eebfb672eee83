// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

use super::*;
use std::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn fires_once_after_delay() {
    let wheel = TimingWheel::with_defaults();
    let (tx, rx) = mpsc::channel();
    let started = Instant::now();
    wheel.after_func(Duration::from_millis(20), move || {
        let _ = tx.send(started.elapsed());
    });

    let elapsed = rx.recv_timeout(WAIT).expect("timer fired");
    assert!(elapsed >= Duration::from_millis(19), "fired early: {elapsed:?}");
    // one-shot: nothing else arrives
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn stop_prevents_firing() {
    let wheel = TimingWheel::with_defaults();
    let (tx, rx) = mpsc::channel();
    let timer = wheel.after_func(Duration::from_millis(100), move || {
        let _ = tx.send(());
    });

    assert!(timer.stop());
    // second stop is a no-op
    assert!(!timer.stop());
    assert!(rx.recv_timeout(Duration::from_millis(400)).is_err());
}

#[test]
fn stop_after_fire_reports_false() {
    let wheel = TimingWheel::with_defaults();
    let (tx, rx) = mpsc::channel();
    let timer = wheel.after_func(Duration::from_millis(5), move || {
        let _ = tx.send(());
    });

    rx.recv_timeout(WAIT).expect("timer fired");
    assert!(!timer.stop());
}

#[test]
fn cascades_across_levels() {
    // 80 ms at 1 ms tick / 20 slots lands on level 1 and must cascade down.
    let wheel = TimingWheel::with_defaults();
    let (tx, rx) = mpsc::channel();
    let started = Instant::now();
    wheel.after_func(Duration::from_millis(80), move || {
        let _ = tx.send(started.elapsed());
    });

    let elapsed = rx.recv_timeout(WAIT).expect("timer fired");
    assert!(elapsed >= Duration::from_millis(79), "fired early: {elapsed:?}");
}

#[test]
fn many_timers_all_fire() {
    let wheel = TimingWheel::with_defaults();
    let (tx, rx) = mpsc::channel();
    for i in 0..500u64 {
        let tx = tx.clone();
        wheel.after_func(Duration::from_millis(1 + i % 50), move || {
            let _ = tx.send(i);
        });
    }
    drop(tx);

    let mut seen = std::collections::HashSet::new();
    while let Ok(i) = rx.recv_timeout(WAIT) {
        seen.insert(i);
        if seen.len() == 500 {
            break;
        }
    }
    assert_eq!(seen.len(), 500);
}

#[test]
fn shutdown_stops_pending_timers() {
    let wheel = TimingWheel::with_defaults();
    let (tx, rx) = mpsc::channel();
    wheel.after_func(Duration::from_millis(200), move || {
        let _ = tx.send(());
    });
    wheel.shutdown();
    assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
}

#[test]
fn zero_duration_fires_next_tick() {
    let wheel = TimingWheel::with_defaults();
    let (tx, rx) = mpsc::channel();
    wheel.after_func(Duration::ZERO, move || {
        let _ = tx.send(());
    });
    rx.recv_timeout(WAIT).expect("timer fired");
}
