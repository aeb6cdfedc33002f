// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External tool invocation.
//!
//! Every device backend is a command-line binary invoked by name (`adb`,
//! `xcrun`, `idevice*`, ...). Absence of a tool degrades the operation that
//! needs it; it never crashes the server.

use std::process::Output;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{LabError, Result};

/// Run a tool to completion and capture its output.
///
/// A missing binary surfaces as a `ToolFailure` naming the program.
pub async fn run(program: &str, args: &[&str]) -> Result<Output> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    cmd.output().await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => LabError::tool(format!("{program}: not installed")),
        _ => LabError::tool(format!("{program}: {e}")),
    })
}

/// Run a tool with a wall-clock deadline.
///
/// On timeout the in-flight future is dropped, which kills the child
/// (`kill_on_drop`), so no process outlives the deadline.
pub async fn run_timeout(program: &str, args: &[&str], deadline: Duration) -> Result<Output> {
    match tokio::time::timeout(deadline, run(program, args)).await {
        Ok(result) => result,
        Err(_) => Err(LabError::timeout(format!(
            "{program} exceeded {}s deadline",
            deadline.as_secs()
        ))),
    }
}

/// Demand a zero exit status, returning stdout bytes.
pub fn expect_success(program: &str, output: Output) -> Result<Vec<u8>> {
    if output.status.success() {
        Ok(output.stdout)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(LabError::tool(format!(
            "{program} exited with {}: {}",
            output.status,
            stderr.trim()
        )))
    }
}

/// Run + demand success + decode stdout as UTF-8 (lossy).
pub async fn run_text(program: &str, args: &[&str]) -> Result<String> {
    let output = run(program, args).await?;
    let bytes = expect_success(program, output)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Fire-and-forget spawn, used for best-effort cleanup (orphan kills).
pub fn spawn_detached(program: &str, args: &[&str]) {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());
    match cmd.spawn() {
        Ok(mut child) => {
            tokio::spawn(async move {
                let _ = child.wait().await;
            });
        }
        Err(e) => tracing::debug!(program, err = %e, "detached spawn failed"),
    }
}

/// Extract the pixel width and height from a PNG header.
///
/// The IHDR chunk is mandated to be first, so the dimensions sit at fixed
/// offsets 16..24. Used for screenshot dimension extraction without shelling
/// out to an image tool.
pub fn png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    if data.len() < 24 || &data[..8] != PNG_MAGIC {
        return None;
    }
    let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
    let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
    Some((width, height))
}

#[cfg(test)]
#[path = "tool_tests.rs"]
mod tests;
