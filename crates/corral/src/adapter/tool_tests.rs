// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::ErrorKind;

#[tokio::test]
async fn missing_binary_degrades_to_tool_failure() {
    let err = run("definitely-not-a-real-binary-xyz", &[]).await.err().expect("should fail");
    assert_eq!(err.kind, ErrorKind::ToolFailure);
    assert!(err.message.contains("not installed"), "{}", err.message);
}

#[tokio::test]
async fn captures_stdout() {
    let text = run_text("echo", &["hello"]).await.expect("echo");
    assert_eq!(text.trim(), "hello");
}

#[tokio::test]
async fn nonzero_exit_is_tool_failure() {
    let output = run("sh", &["-c", "echo boom >&2; exit 3"]).await.expect("spawn");
    let err = expect_success("sh", output).err().expect("should fail");
    assert_eq!(err.kind, ErrorKind::ToolFailure);
    assert!(err.message.contains("boom"));
}

#[tokio::test]
async fn deadline_kills_and_reports_timeout() {
    let start = std::time::Instant::now();
    let err = run_timeout("sleep", &["5"], Duration::from_millis(200))
        .await
        .err()
        .expect("should time out");
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn png_header_parsing() {
    // Minimal synthetic header: magic + IHDR length/type + 1170x2532.
    let mut data = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    data.extend_from_slice(&[0, 0, 0, 13]);
    data.extend_from_slice(b"IHDR");
    data.extend_from_slice(&1170u32.to_be_bytes());
    data.extend_from_slice(&2532u32.to_be_bytes());
    assert_eq!(png_dimensions(&data), Some((1170, 2532)));

    assert_eq!(png_dimensions(b"JFIF"), None);
    assert_eq!(png_dimensions(&[]), None);
}
