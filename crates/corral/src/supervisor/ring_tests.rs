// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::model::LogLevel;

fn entry(message: &str) -> LogEntry {
    LogEntry::new("dev-1", LogLevel::Info, "appium", message)
}

#[test]
fn push_and_snapshot() {
    let mut ring = LogRing::new(4);
    assert!(ring.push(entry("a")));
    assert!(ring.push(entry("b")));
    let messages: Vec<String> = ring.snapshot().into_iter().map(|e| e.message).collect();
    assert_eq!(messages, vec!["a", "b"]);
    assert_eq!(ring.total_pushed(), 2);
}

#[test]
fn consecutive_duplicates_dropped() {
    let mut ring = LogRing::new(4);
    assert!(ring.push(entry("session created")));
    assert!(!ring.push(entry("session created")));
    assert_eq!(ring.len(), 1);

    // Non-consecutive repeats are retained.
    assert!(ring.push(entry("other")));
    assert!(ring.push(entry("session created")));
    assert_eq!(ring.len(), 3);
}

#[test]
fn capacity_evicts_oldest() {
    let mut ring = LogRing::new(3);
    for i in 0..5 {
        ring.push(entry(&format!("line {i}")));
    }
    let messages: Vec<String> = ring.snapshot().into_iter().map(|e| e.message).collect();
    assert_eq!(messages, vec!["line 2", "line 3", "line 4"]);
    assert_eq!(ring.len(), 3);
}

#[test]
fn clear_empties() {
    let mut ring = LogRing::new(2);
    ring.push(entry("x"));
    ring.clear();
    assert!(ring.is_empty());
    // total_pushed is historical, not reset.
    assert_eq!(ring.total_pushed(), 1);
}

#[test]
fn bounded_at_500_default_capacity() {
    let mut ring = LogRing::new(super::super::LOG_RING_CAPACITY);
    for i in 0..1000 {
        ring.push(entry(&format!("m{i}")));
    }
    assert_eq!(ring.len(), 500);
}
