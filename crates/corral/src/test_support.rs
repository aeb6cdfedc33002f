// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a scriptable platform adapter and builders.
//!
//! Used by unit tests in this crate and by the end-to-end specs crate, so the
//! registry/reservation/supervisor/hub logic runs for real without `adb` or
//! `simctl` on the machine.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::adapter::{Adapters, LineSink, LogTail, PlatformAdapter};
use crate::error::{LabError, Result};
use crate::model::{Capabilities, DeviceKind, Orientation, Platform, Resolution};

/// A 1x1 PNG used as the mock screen capture payload.
pub const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0a, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// Scriptable adapter standing in for a platform backend.
///
/// Tests mutate the connected serial list and failure toggles between
/// discovery cycles to simulate churn.
pub struct MockAdapter {
    platform: Platform,
    pub serials: Mutex<Vec<String>>,
    pub fail_enumerate: AtomicBool,
    pub fail_screenshot: AtomicBool,
    pub exhaust_screenshot: AtomicBool,
    pub screenshot_delay: Mutex<Duration>,
    pub screenshots_taken: AtomicU64,
    pub taps: Mutex<Vec<(String, f64, f64)>>,
    pub shells: Mutex<Vec<(String, String)>>,
    pub battery_level: AtomicU64,
}

impl MockAdapter {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            serials: Mutex::new(Vec::new()),
            fail_enumerate: AtomicBool::new(false),
            fail_screenshot: AtomicBool::new(false),
            exhaust_screenshot: AtomicBool::new(false),
            screenshot_delay: Mutex::new(Duration::ZERO),
            screenshots_taken: AtomicU64::new(0),
            taps: Mutex::new(Vec::new()),
            shells: Mutex::new(Vec::new()),
            battery_level: AtomicU64::new(85),
        }
    }

    pub fn connect(&self, serial: &str) {
        let mut serials = self.serials.lock();
        if !serials.iter().any(|s| s == serial) {
            serials.push(serial.to_owned());
        }
    }

    pub fn disconnect(&self, serial: &str) {
        self.serials.lock().retain(|s| s != serial);
    }
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn enumerate(&self) -> Result<Vec<String>> {
        if self.fail_enumerate.load(Ordering::Relaxed) {
            return Err(LabError::tool("mock enumerate failure"));
        }
        Ok(self.serials.lock().clone())
    }

    async fn properties(&self, serial: &str) -> Result<HashMap<String, String>> {
        let mut props = HashMap::new();
        match self.platform {
            Platform::Android => {
                props.insert("ro.product.model".to_owned(), format!("Mock {serial}"));
                props.insert("ro.product.manufacturer".to_owned(), "MockWorks".to_owned());
                props.insert("ro.build.version.release".to_owned(), "14".to_owned());
                props.insert("ro.build.version.sdk".to_owned(), "34".to_owned());
            }
            Platform::Ios => {
                props.insert("DeviceName".to_owned(), format!("Mock {serial}"));
                props.insert("ProductType".to_owned(), "iPhone15,2".to_owned());
                props.insert("ProductVersion".to_owned(), "17.0".to_owned());
            }
        }
        Ok(props)
    }

    async fn battery(&self, _serial: &str) -> Result<u8> {
        Ok(self.battery_level.load(Ordering::Relaxed) as u8)
    }

    async fn resolution(&self, _serial: &str) -> Result<Resolution> {
        Ok(Resolution { width: 1080, height: 2400 })
    }

    async fn orientation(&self, _serial: &str) -> Result<Orientation> {
        Ok(Orientation::Portrait)
    }

    async fn capabilities(&self, _serial: &str) -> Result<Capabilities> {
        Ok(Capabilities { touchscreen: true, wifi: true, ..Capabilities::default() })
    }

    async fn device_kind(&self, _serial: &str) -> DeviceKind {
        DeviceKind::Physical
    }

    async fn screenshot(&self, serial: &str) -> Result<Bytes> {
        let delay = *self.screenshot_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.exhaust_screenshot.load(Ordering::Relaxed) {
            return Err(LabError::exhausted(format!(
                "device {serial}: resource temporarily unavailable"
            )));
        }
        if self.fail_screenshot.load(Ordering::Relaxed) {
            return Err(LabError::tool(format!("device {serial}: mock capture failure")));
        }
        self.screenshots_taken.fetch_add(1, Ordering::Relaxed);
        Ok(Bytes::from_static(TINY_PNG))
    }

    async fn tap(&self, serial: &str, x: f64, y: f64) -> Result<()> {
        self.taps.lock().push((serial.to_owned(), x, y));
        Ok(())
    }

    async fn swipe(
        &self,
        _serial: &str,
        _x1: f64,
        _y1: f64,
        _x2: f64,
        _y2: f64,
        _duration: Duration,
    ) -> Result<()> {
        Ok(())
    }

    async fn key_event(&self, _serial: &str, _keycode: u32) -> Result<()> {
        Ok(())
    }

    async fn input_text(&self, _serial: &str, _text: &str) -> Result<()> {
        Ok(())
    }

    async fn install(&self, _serial: &str, _artifact: &Path) -> Result<()> {
        Ok(())
    }

    async fn uninstall(&self, _serial: &str, _bundle_id: &str) -> Result<()> {
        Ok(())
    }

    async fn shell(&self, serial: &str, command: &str) -> Result<String> {
        if self.platform == Platform::Ios {
            return Err(LabError::unsupported(format!(
                "shell is not supported for ios device {serial}"
            )));
        }
        self.shells.lock().push((serial.to_owned(), command.to_owned()));
        Ok(format!("ran: {command}"))
    }

    fn supports_shell(&self) -> bool {
        self.platform == Platform::Android
    }

    async fn tail_logs(&self, _serial: &str, _sink: LineSink) -> Result<LogTail> {
        // A tail that produces nothing but can be stopped.
        Ok(LogTail::new(tokio_util::sync::CancellationToken::new()))
    }

    fn supports_log_tail(&self) -> bool {
        self.platform == Platform::Android
    }
}

/// A mock adapter pair plus handles for scripting each side.
pub struct MockBackends {
    pub android: Arc<MockAdapter>,
    pub ios: Arc<MockAdapter>,
}

impl MockBackends {
    pub fn new() -> Self {
        Self {
            android: Arc::new(MockAdapter::new(Platform::Android)),
            ios: Arc::new(MockAdapter::new(Platform::Ios)),
        }
    }

    pub fn adapters(&self) -> Adapters {
        Adapters::with_backends(
            Arc::clone(&self.android) as Arc<dyn PlatformAdapter>,
            Arc::clone(&self.ios) as Arc<dyn PlatformAdapter>,
        )
    }
}

impl Default for MockBackends {
    fn default() -> Self {
        Self::new()
    }
}
