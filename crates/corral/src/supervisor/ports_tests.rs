// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

// High, unlikely-to-collide range for tests that bind real sockets.
const TEST_BASE: u16 = 42350;

#[tokio::test]
#[serial]
async fn allocates_sequentially() {
    let mut alloc = PortAllocator::new(TEST_BASE, 4);
    let a = alloc.allocate().await.expect("first port");
    let b = alloc.allocate().await.expect("second port");
    assert_ne!(a, b);
    assert!((TEST_BASE..TEST_BASE + 4).contains(&a));
    assert!((TEST_BASE..TEST_BASE + 4).contains(&b));
    assert_eq!(alloc.in_use(), 2);
}

#[tokio::test]
#[serial]
async fn skips_externally_bound_port() {
    let held = TcpListener::bind(("127.0.0.1", TEST_BASE)).await.expect("hold base port");
    let mut alloc = PortAllocator::new(TEST_BASE, 4);
    let port = alloc.allocate().await.expect("allocate");
    assert_ne!(port, TEST_BASE);
    drop(held);
}

#[tokio::test]
#[serial]
async fn exhaustion_is_resource_error() {
    let mut alloc = PortAllocator::new(TEST_BASE, 2);
    let _a = alloc.allocate().await.expect("a");
    let _b = alloc.allocate().await.expect("b");
    let err = alloc.allocate().await.err().expect("exhausted");
    assert_eq!(err.kind, crate::error::ErrorKind::ResourceExhausted);
    assert!(err.message.contains("no available ports"));
}

#[tokio::test]
#[serial]
async fn release_returns_port_to_pool() {
    let mut alloc = PortAllocator::new(TEST_BASE, 1);
    let port = alloc.allocate().await.expect("allocate");
    assert!(alloc.allocate().await.is_err());

    alloc.release(port);
    assert!(!alloc.holds(port));
    let again = alloc.allocate().await.expect("reallocate");
    assert_eq!(again, port);
}
