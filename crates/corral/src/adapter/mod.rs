// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Platform adapters: a uniform capability surface over the Android debug
//! bridge and the iOS simulator/physical-device tooling.
//!
//! Callers never branch on platform except at this boundary — the registry,
//! supervisor, and mirror pump all speak [`PlatformAdapter`].

pub mod android;
pub mod ios;
pub mod tool;

pub use android::AndroidAdapter;
pub use ios::IosAdapter;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{LabError, Result};
use crate::model::{Capabilities, DeviceKind, Orientation, Platform, Resolution};

/// Wall-clock deadline for a single screen capture.
pub const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default swipe duration; drag is a swipe at twice this.
pub const SWIPE_DURATION: Duration = Duration::from_millis(500);
pub const DRAG_DURATION: Duration = Duration::from_millis(1000);

/// Per-line sink fed by a log tail.
pub type LineSink = Arc<dyn Fn(String) + Send + Sync>;

/// Handle to a running log tail. Dropping it does not stop the tail; call
/// [`LogTail::stop`], which terminates the child and closes its pipes.
pub struct LogTail {
    cancel: tokio_util::sync::CancellationToken,
}

impl LogTail {
    pub fn new(cancel: tokio_util::sync::CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

/// The uniform capability surface both platform backends implement.
///
/// Adapters are stateless aside from small caches (device-type
/// classification, pixel-to-point scale). Every error message carries the
/// vendor identifier; adapters never panic.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Current vendor identifiers, excluding offline/unauthorized entries.
    async fn enumerate(&self) -> Result<Vec<String>>;

    /// Raw property map for a device.
    async fn properties(&self, serial: &str) -> Result<HashMap<String, String>>;

    /// Battery level 0-100.
    async fn battery(&self, serial: &str) -> Result<u8>;

    async fn resolution(&self, serial: &str) -> Result<Resolution>;

    async fn orientation(&self, serial: &str) -> Result<Orientation>;

    async fn capabilities(&self, serial: &str) -> Result<Capabilities>;

    /// Physical vs simulator classification (cached per serial).
    async fn device_kind(&self, serial: &str) -> DeviceKind;

    /// PNG screen capture, bounded by [`SCREENSHOT_TIMEOUT`].
    async fn screenshot(&self, serial: &str) -> Result<Bytes>;

    async fn tap(&self, serial: &str, x: f64, y: f64) -> Result<()>;

    async fn swipe(
        &self,
        serial: &str,
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        duration: Duration,
    ) -> Result<()>;

    /// Drag is a swipe at twice the requested duration (slow enough for the
    /// platform to treat it as a drag rather than a fling).
    async fn drag(
        &self,
        serial: &str,
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        duration: Duration,
    ) -> Result<()> {
        let duration = if duration.is_zero() { SWIPE_DURATION } else { duration };
        self.swipe(serial, x1, y1, x2, y2, (duration * 2).max(DRAG_DURATION)).await
    }

    async fn key_event(&self, serial: &str, keycode: u32) -> Result<()>;

    async fn input_text(&self, serial: &str, text: &str) -> Result<()>;

    async fn install(&self, serial: &str, artifact: &Path) -> Result<()>;

    async fn uninstall(&self, serial: &str, bundle_id: &str) -> Result<()>;

    /// Execute a shell command on the device (Android only).
    async fn shell(&self, serial: &str, command: &str) -> Result<String> {
        let _ = command;
        Err(LabError::unsupported(format!(
            "shell is not supported for {} device {serial}",
            self.platform().as_str()
        )))
    }

    fn supports_shell(&self) -> bool {
        false
    }

    /// Start a per-device log tail feeding `sink` (Android only).
    async fn tail_logs(&self, serial: &str, sink: LineSink) -> Result<LogTail> {
        let _ = sink;
        Err(LabError::unsupported(format!(
            "log tail is not supported for {} device {serial}",
            self.platform().as_str()
        )))
    }

    fn supports_log_tail(&self) -> bool {
        false
    }

    /// Drop any cached per-device state (scale factor, classification).
    /// Called when the device disappears from discovery.
    fn invalidate(&self, serial: &str) {
        let _ = serial;
    }
}

/// The pair of adapters, resolved by platform once at this boundary.
#[derive(Clone)]
pub struct Adapters {
    pub android: Arc<dyn PlatformAdapter>,
    pub ios: Arc<dyn PlatformAdapter>,
}

impl Adapters {
    pub fn new() -> Self {
        Self { android: Arc::new(AndroidAdapter::new()), ios: Arc::new(IosAdapter::new()) }
    }

    /// Custom backends, used by tests to stub the tool surface.
    pub fn with_backends(
        android: Arc<dyn PlatformAdapter>,
        ios: Arc<dyn PlatformAdapter>,
    ) -> Self {
        Self { android, ios }
    }

    pub fn for_platform(&self, platform: Platform) -> &Arc<dyn PlatformAdapter> {
        match platform {
            Platform::Android => &self.android,
            Platform::Ios => &self.ios,
        }
    }
}

impl Default for Adapters {
    fn default() -> Self {
        Self::new()
    }
}
