// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn status_mapping() {
    assert_eq!(ErrorKind::NotFound.http_status(), 404);
    assert_eq!(ErrorKind::InvalidState.http_status(), 400);
    assert_eq!(ErrorKind::Validation.http_status(), 400);
    assert_eq!(ErrorKind::Unsupported.http_status(), 400);
    assert_eq!(ErrorKind::ResourceExhausted.http_status(), 500);
    assert_eq!(ErrorKind::ToolFailure.http_status(), 500);
    assert_eq!(ErrorKind::Timeout.http_status(), 504);
}

#[test]
fn display_includes_kind_and_message() {
    let e = LabError::invalid_state("device emulator-5554 is offline");
    assert_eq!(e.to_string(), "INVALID_STATE: device emulator-5554 is offline");
}

#[test]
fn exhaustion_detection() {
    assert!(LabError::exhausted("no available ports").is_exhaustion());
    assert!(LabError::timeout("screenshot timed out").is_exhaustion());
    assert!(LabError::tool("spawn: resource temporarily unavailable").is_exhaustion());
    assert!(!LabError::not_found("no such device").is_exhaustion());
}

#[test]
fn io_not_found_maps_to_tool_failure() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "adb");
    let e: LabError = io.into();
    assert_eq!(e.kind, ErrorKind::ToolFailure);
}
