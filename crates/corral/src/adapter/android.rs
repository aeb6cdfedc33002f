// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Android backend over the `adb` debug bridge.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::tool;
use super::{LineSink, LogTail, PlatformAdapter, SCREENSHOT_TIMEOUT, SWIPE_DURATION};
use crate::error::{LabError, Result};
use crate::model::{Capabilities, DeviceKind, Orientation, Platform, Resolution};

const ADB: &str = "adb";

pub struct AndroidAdapter;

impl AndroidAdapter {
    pub fn new() -> Self {
        Self
    }

    async fn adb(&self, serial: &str, args: &[&str]) -> Result<String> {
        let mut argv = vec!["-s", serial];
        argv.extend_from_slice(args);
        tool::run_text(ADB, &argv)
            .await
            .map_err(|e| LabError::new(e.kind, format!("device {serial}: {}", e.message)))
    }

    async fn input(&self, serial: &str, args: &[&str]) -> Result<()> {
        let mut argv = vec!["shell", "input"];
        argv.extend_from_slice(args);
        self.adb(serial, &argv).await.map(|_| ())
    }
}

impl Default for AndroidAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformAdapter for AndroidAdapter {
    fn platform(&self) -> Platform {
        Platform::Android
    }

    async fn enumerate(&self) -> Result<Vec<String>> {
        let text = tool::run_text(ADB, &["devices"]).await?;
        Ok(parse_device_list(&text))
    }

    async fn properties(&self, serial: &str) -> Result<HashMap<String, String>> {
        let text = self.adb(serial, &["shell", "getprop"]).await?;
        Ok(parse_getprop(&text))
    }

    async fn battery(&self, serial: &str) -> Result<u8> {
        let text = self.adb(serial, &["shell", "dumpsys", "battery"]).await?;
        parse_battery_level(&text)
            .ok_or_else(|| LabError::tool(format!("device {serial}: no battery level in dump")))
    }

    async fn resolution(&self, serial: &str) -> Result<Resolution> {
        let text = self.adb(serial, &["shell", "wm", "size"]).await?;
        parse_wm_size(&text)
            .ok_or_else(|| LabError::tool(format!("device {serial}: unparseable wm size")))
    }

    async fn orientation(&self, serial: &str) -> Result<Orientation> {
        let text = self.adb(serial, &["shell", "dumpsys", "input"]).await?;
        Ok(parse_surface_orientation(&text))
    }

    async fn capabilities(&self, serial: &str) -> Result<Capabilities> {
        let text = self.adb(serial, &["shell", "pm", "list", "features"]).await?;
        Ok(parse_features(&text))
    }

    async fn device_kind(&self, _serial: &str) -> DeviceKind {
        // The debug bridge presents emulators and handsets identically; the
        // distinction only matters on iOS.
        DeviceKind::Physical
    }

    async fn screenshot(&self, serial: &str) -> Result<Bytes> {
        let output = tool::run_timeout(
            ADB,
            &["-s", serial, "exec-out", "screencap", "-p"],
            SCREENSHOT_TIMEOUT,
        )
        .await
        .map_err(|e| LabError::new(e.kind, format!("device {serial}: {}", e.message)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Transient EAGAIN chatter from screencap is expected under load;
            // surface it as exhaustion so the mirror pump can shed.
            if stderr.to_ascii_lowercase().contains("resource temporarily unavailable") {
                return Err(LabError::exhausted(format!(
                    "device {serial}: resource temporarily unavailable"
                )));
            }
            return Err(LabError::tool(format!(
                "device {serial}: screencap failed: {}",
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(LabError::tool(format!("device {serial}: empty screenshot")));
        }
        Ok(Bytes::from(output.stdout))
    }

    async fn tap(&self, serial: &str, x: f64, y: f64) -> Result<()> {
        self.input(serial, &["tap", &fmt_coord(x), &fmt_coord(y)]).await
    }

    async fn swipe(
        &self,
        serial: &str,
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        duration: Duration,
    ) -> Result<()> {
        let duration = if duration.is_zero() { SWIPE_DURATION } else { duration };
        self.input(
            serial,
            &[
                "swipe",
                &fmt_coord(x1),
                &fmt_coord(y1),
                &fmt_coord(x2),
                &fmt_coord(y2),
                &duration.as_millis().to_string(),
            ],
        )
        .await
    }

    async fn key_event(&self, serial: &str, keycode: u32) -> Result<()> {
        self.input(serial, &["keyevent", &keycode.to_string()]).await
    }

    async fn input_text(&self, serial: &str, text: &str) -> Result<()> {
        let escaped = escape_input_text(text);
        self.input(serial, &["text", &escaped]).await
    }

    async fn install(&self, serial: &str, artifact: &Path) -> Result<()> {
        let path = artifact.to_string_lossy();
        self.adb(serial, &["install", "-r", &path]).await.map(|_| ())
    }

    async fn uninstall(&self, serial: &str, bundle_id: &str) -> Result<()> {
        self.adb(serial, &["uninstall", bundle_id]).await.map(|_| ())
    }

    async fn shell(&self, serial: &str, command: &str) -> Result<String> {
        self.adb(serial, &["shell", command]).await
    }

    fn supports_shell(&self) -> bool {
        true
    }

    async fn tail_logs(&self, serial: &str, sink: LineSink) -> Result<LogTail> {
        let mut child = tokio::process::Command::new(ADB)
            .args(["-s", serial, "logcat", "-v", "time"])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LabError::tool(format!("device {serial}: logcat spawn: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LabError::internal(format!("device {serial}: logcat stdout missing")))?;

        let cancel = CancellationToken::new();
        let tail_cancel = cancel.clone();
        let serial = serial.to_owned();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    _ = tail_cancel.cancelled() => break,
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => sink(line),
                        Ok(None) => {
                            debug!(serial = %serial, "logcat stream ended");
                            break;
                        }
                        Err(e) => {
                            warn!(serial = %serial, err = %e, "logcat read error");
                            break;
                        }
                    },
                }
            }
            // Terminate the child and close its pipes.
            if let Err(e) = child.kill().await {
                debug!(serial = %serial, err = %e, "logcat kill");
            }
        });

        Ok(LogTail::new(cancel))
    }

    fn supports_log_tail(&self) -> bool {
        true
    }
}

// -- Output parsing -----------------------------------------------------------

/// Parse `adb devices` output, keeping only authorized online entries.
pub fn parse_device_list(text: &str) -> Vec<String> {
    text.lines()
        .skip_while(|l| !l.starts_with("List of devices"))
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next()?;
            match state {
                "device" => Some(serial.to_owned()),
                // Offline and unauthorized entries are excluded from the
                // observed set; the registry marks them by absence.
                "offline" | "unauthorized" => None,
                _ => None,
            }
        })
        .collect()
}

/// Parse `getprop` output: `[key]: [value]` lines.
pub fn parse_getprop(text: &str) -> HashMap<String, String> {
    let mut props = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('[') else { continue };
        let Some((key, rest)) = rest.split_once("]: [") else { continue };
        let Some(value) = rest.strip_suffix(']') else { continue };
        props.insert(key.to_owned(), value.to_owned());
    }
    props
}

/// Parse `level: N` from a `dumpsys battery` dump.
pub fn parse_battery_level(text: &str) -> Option<u8> {
    text.lines().find_map(|line| {
        let line = line.trim();
        let value = line.strip_prefix("level:")?.trim();
        value.parse::<u8>().ok().filter(|v| *v <= 100)
    })
}

/// Parse `wm size` output. Override size wins over physical size.
pub fn parse_wm_size(text: &str) -> Option<Resolution> {
    let mut physical = None;
    let mut over = None;
    for line in text.lines() {
        let line = line.trim();
        if let Some(v) = line.strip_prefix("Physical size:") {
            physical = parse_dimensions(v.trim());
        } else if let Some(v) = line.strip_prefix("Override size:") {
            over = parse_dimensions(v.trim());
        }
    }
    over.or(physical)
}

fn parse_dimensions(value: &str) -> Option<Resolution> {
    let (w, h) = value.split_once('x')?;
    Some(Resolution { width: w.trim().parse().ok()?, height: h.trim().parse().ok()? })
}

/// Parse `SurfaceOrientation: N` from a `dumpsys input` dump.
/// 0/2 are portrait, 1/3 landscape; missing defaults to portrait.
pub fn parse_surface_orientation(text: &str) -> Orientation {
    for line in text.lines() {
        if let Some(v) = line.trim().strip_prefix("SurfaceOrientation:") {
            return match v.trim() {
                "1" | "3" => Orientation::Landscape,
                _ => Orientation::Portrait,
            };
        }
    }
    Orientation::Portrait
}

/// Derive capability flags from `pm list features` output.
pub fn parse_features(text: &str) -> Capabilities {
    let has = |needle: &str| text.lines().any(|l| l.trim() == format!("feature:{needle}"));
    Capabilities {
        touchscreen: has("android.hardware.touchscreen"),
        camera: has("android.hardware.camera") || has("android.hardware.camera.any"),
        wifi: has("android.hardware.wifi"),
        bluetooth: has("android.hardware.bluetooth"),
        gps: has("android.hardware.location.gps"),
        nfc: has("android.hardware.nfc"),
        fingerprint: has("android.hardware.fingerprint"),
        accelerometer: has("android.hardware.sensor.accelerometer"),
        gyroscope: has("android.hardware.sensor.gyroscope"),
    }
}

/// `input text` treats space as an argument separator; the bridge accepts
/// `%s` as the escape.
pub fn escape_input_text(text: &str) -> String {
    text.replace(' ', "%s")
}

fn fmt_coord(v: f64) -> String {
    format!("{}", v.round() as i64)
}

#[cfg(test)]
#[path = "android_tests.rs"]
mod tests;
