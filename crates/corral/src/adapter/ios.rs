// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! iOS backend over the simulator controller (`xcrun simctl`) and the
//! physical-device bridge (`idevice*` tools), with `idb` for UI automation.
//!
//! Screenshots come back in pixels but the automation driver takes points,
//! so a per-device scale factor is cached and applied to every coordinate.
//! Getting this wrong lands taps in the wrong place on Retina panels.

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::tool;
use super::{PlatformAdapter, SCREENSHOT_TIMEOUT, SWIPE_DURATION};
use crate::error::{LabError, Result};
use crate::model::{Capabilities, DeviceKind, Orientation, Platform, Resolution};

const XCRUN: &str = "xcrun";
const IDEVICE_ID: &str = "idevice_id";
const IDEVICE_INFO: &str = "ideviceinfo";
const IDEVICE_SCREENSHOT: &str = "idevicescreenshot";
const IDEVICE_INSTALLER: &str = "ideviceinstaller";
const IDEVICE_IMAGE_MOUNTER: &str = "ideviceimagemounter";
const PYMOBILEDEVICE: &str = "pymobiledevice3";
const CFGUTIL: &str = "cfgutil";
const IDB: &str = "idb";
const MAGICK: &str = "magick";

/// How long a cached scale factor stays valid.
const SCALE_TTL: Duration = Duration::from_secs(300);

/// Width above which a simulator screenshot implies a 3x panel.
const SCALE_3X_WIDTH: u32 = 800;

pub struct IosAdapter {
    /// serial -> (scale, cached-at)
    scale_cache: Mutex<HashMap<String, (f64, Instant)>>,
    /// serial -> classification, filled during enumerate.
    kind_cache: Mutex<HashMap<String, DeviceKind>>,
    /// serial -> simctl record (name, runtime), filled during enumerate.
    sim_info: Mutex<HashMap<String, SimDevice>>,
}

#[derive(Debug, Clone)]
pub struct SimDevice {
    pub name: String,
    pub runtime: String,
}

impl IosAdapter {
    pub fn new() -> Self {
        Self {
            scale_cache: Mutex::new(HashMap::new()),
            kind_cache: Mutex::new(HashMap::new()),
            sim_info: Mutex::new(HashMap::new()),
        }
    }

    fn kind_of(&self, serial: &str) -> DeviceKind {
        self.kind_cache.lock().get(serial).copied().unwrap_or(DeviceKind::Simulator)
    }

    /// Pixel-to-point divisor for a device, cached for [`SCALE_TTL`].
    ///
    /// Inferred from screenshot width; defaults to 3x when detection fails.
    pub async fn scale(&self, serial: &str) -> f64 {
        if let Some((scale, at)) = self.scale_cache.lock().get(serial).copied() {
            if at.elapsed() < SCALE_TTL {
                return scale;
            }
        }
        let scale = match self.screenshot(serial).await.ok().and_then(|png| {
            tool::png_dimensions(&png).map(|(w, _)| if w > SCALE_3X_WIDTH { 3.0 } else { 2.0 })
        }) {
            Some(s) => s,
            None => {
                debug!(serial, "scale detection failed, assuming 3x");
                3.0
            }
        };
        self.scale_cache.lock().insert(serial.to_owned(), (scale, Instant::now()));
        scale
    }

    async fn simulator_screenshot(&self, serial: &str) -> Result<Bytes> {
        let file = temp_png(serial)?;
        let path = file.path().to_string_lossy().into_owned();
        let out = tool::run_timeout(
            XCRUN,
            &["simctl", "io", serial, "screenshot", &path],
            SCREENSHOT_TIMEOUT,
        )
        .await?;
        tool::expect_success(XCRUN, out)
            .map_err(|e| LabError::new(e.kind, format!("device {serial}: {}", e.message)))?;
        read_nonempty(serial, file.path())
    }

    /// Physical-device capture with the documented fallback chain:
    /// primary bridge tool, Python tooling, developer-image mount + retry,
    /// the configurator utility, then a generated placeholder.
    async fn physical_screenshot(&self, serial: &str) -> Result<Bytes> {
        let mut first_failure: Option<LabError> = None;
        let mut note_failure = |step: &str, e: LabError| {
            if first_failure.is_none() {
                warn!(serial, step, err = %e, "screenshot fallback engaged");
                first_failure = Some(e);
            }
        };

        match self.try_idevicescreenshot(serial).await {
            Ok(png) => return Ok(png),
            Err(e) => note_failure("idevicescreenshot", e),
        }

        match self.try_pymobiledevice(serial).await {
            Ok(png) => return Ok(png),
            Err(e) => note_failure("pymobiledevice3", e),
        }

        // Mount the developer disk image, then retry the primary tool.
        let mount =
            tool::run_timeout(IDEVICE_IMAGE_MOUNTER, &["-u", serial, "auto"], SCREENSHOT_TIMEOUT)
                .await;
        match mount {
            Ok(_) => match self.try_idevicescreenshot(serial).await {
                Ok(png) => return Ok(png),
                Err(e) => note_failure("mount+retry", e),
            },
            Err(e) => note_failure("ideviceimagemounter", e),
        }

        match self.try_cfgutil(serial).await {
            Ok(png) => return Ok(png),
            Err(e) => note_failure("cfgutil", e),
        }

        // Final fallback: a placeholder annotated with name and model. The
        // placeholder is a success, not an error.
        let info = self.properties(serial).await.unwrap_or_default();
        let name = info.get("DeviceName").cloned().unwrap_or_else(|| serial.to_owned());
        let model = info.get("ProductType").cloned().unwrap_or_else(|| "iOS device".to_owned());
        self.placeholder(serial, &name, &model).await
    }

    async fn try_idevicescreenshot(&self, serial: &str) -> Result<Bytes> {
        let file = temp_png(serial)?;
        let path = file.path().to_string_lossy().into_owned();
        let out = tool::run_timeout(IDEVICE_SCREENSHOT, &["-u", serial, &path], SCREENSHOT_TIMEOUT)
            .await?;
        tool::expect_success(IDEVICE_SCREENSHOT, out)?;
        read_nonempty(serial, file.path())
    }

    async fn try_pymobiledevice(&self, serial: &str) -> Result<Bytes> {
        let file = temp_png(serial)?;
        let path = file.path().to_string_lossy().into_owned();
        let out = tool::run_timeout(
            PYMOBILEDEVICE,
            &["developer", "dvt", "screenshot", "--udid", serial, &path],
            SCREENSHOT_TIMEOUT,
        )
        .await?;
        tool::expect_success(PYMOBILEDEVICE, out)?;
        read_nonempty(serial, file.path())
    }

    async fn try_cfgutil(&self, serial: &str) -> Result<Bytes> {
        let file = temp_png(serial)?;
        let path = file.path().to_string_lossy().into_owned();
        let out = tool::run_timeout(
            CFGUTIL,
            &["--ecid", serial, "screenshot", &path],
            SCREENSHOT_TIMEOUT,
        )
        .await?;
        tool::expect_success(CFGUTIL, out)?;
        read_nonempty(serial, file.path())
    }

    async fn placeholder(&self, serial: &str, name: &str, model: &str) -> Result<Bytes> {
        let file = temp_png(serial)?;
        let path = file.path().to_string_lossy().into_owned();
        let label = format!("{name}\n{model}\n(no screen capture)");
        let out = tool::run_timeout(
            MAGICK,
            &[
                "-size",
                "750x1334",
                "xc:#30343a",
                "-fill",
                "white",
                "-gravity",
                "center",
                "-pointsize",
                "40",
                "-annotate",
                "0",
                &label,
                &path,
            ],
            SCREENSHOT_TIMEOUT,
        )
        .await?;
        tool::expect_success(MAGICK, out)?;
        read_nonempty(serial, file.path())
    }

    /// Drive the simulator UI with the point-coordinate tool; fall back to
    /// window-relative mouse synthesis when `idb` is unavailable.
    async fn sim_ui(&self, serial: &str, args: &[&str]) -> Result<()> {
        let mut argv = vec!["ui"];
        argv.extend_from_slice(args);
        argv.extend_from_slice(&["--udid", serial]);
        let out = tool::run(IDB, &argv).await?;
        tool::expect_success(IDB, out)
            .map(|_| ())
            .map_err(|e| LabError::new(e.kind, format!("device {serial}: {}", e.message)))
    }

    async fn legacy_tap(&self, serial: &str, x_pt: f64, y_pt: f64) -> Result<()> {
        // Window-relative synthesis: locate the Simulator window, then click
        // at origin + title-bar offset + point coordinates.
        const TITLE_BAR_PT: f64 = 28.0;
        let pos = tool::run_text(
            "osascript",
            &[
                "-e",
                "tell application \"System Events\" to tell process \"Simulator\" to get position of window 1",
            ],
        )
        .await?;
        let (wx, wy) = parse_window_position(&pos)
            .ok_or_else(|| LabError::tool(format!("device {serial}: no Simulator window")))?;
        let cx = (wx + x_pt).round() as i64;
        let cy = (wy + TITLE_BAR_PT + y_pt).round() as i64;
        let out = tool::run("cliclick", &[&format!("c:{cx},{cy}")]).await?;
        tool::expect_success("cliclick", out).map(|_| ())
    }

    fn require_simulator(&self, serial: &str, op: &str) -> Result<()> {
        if self.kind_of(serial) == DeviceKind::Physical {
            return Err(LabError::unsupported(format!(
                "{op} is not supported for physical iOS device {serial}"
            )));
        }
        Ok(())
    }
}

impl Default for IosAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformAdapter for IosAdapter {
    fn platform(&self) -> Platform {
        Platform::Ios
    }

    async fn enumerate(&self) -> Result<Vec<String>> {
        let mut serials = Vec::new();

        // Booted simulators. A failing sub-source does not fail the call.
        match tool::run_text(XCRUN, &["simctl", "list", "devices", "--json"]).await {
            Ok(json) => {
                let sims = parse_simctl_booted(&json);
                let mut kinds = self.kind_cache.lock();
                let mut info = self.sim_info.lock();
                for (udid, sim) in sims {
                    kinds.insert(udid.clone(), DeviceKind::Simulator);
                    info.insert(udid.clone(), sim);
                    serials.push(udid);
                }
            }
            Err(e) => debug!(err = %e, "simctl listing unavailable"),
        }

        // Physical devices over the bridge.
        match tool::run_text(IDEVICE_ID, &["-l"]).await {
            Ok(listing) => {
                let mut kinds = self.kind_cache.lock();
                for udid in listing.lines().map(str::trim).filter(|l| !l.is_empty()) {
                    kinds.insert(udid.to_owned(), DeviceKind::Physical);
                    serials.push(udid.to_owned());
                }
            }
            Err(e) => debug!(err = %e, "device bridge listing unavailable"),
        }

        Ok(serials)
    }

    async fn properties(&self, serial: &str) -> Result<HashMap<String, String>> {
        match self.kind_of(serial) {
            DeviceKind::Simulator => {
                let sim = self.sim_info.lock().get(serial).cloned().ok_or_else(|| {
                    LabError::not_found(format!("device {serial}: not in simulator listing"))
                })?;
                let mut props = HashMap::new();
                props.insert("DeviceName".to_owned(), sim.name.clone());
                props.insert("ProductType".to_owned(), sim.name);
                props.insert("ProductVersion".to_owned(), runtime_version(&sim.runtime));
                props.insert("Manufacturer".to_owned(), "Apple".to_owned());
                Ok(props)
            }
            DeviceKind::Physical => {
                let text = tool::run_text(IDEVICE_INFO, &["-u", serial]).await.map_err(|e| {
                    LabError::new(e.kind, format!("device {serial}: {}", e.message))
                })?;
                Ok(parse_ideviceinfo(&text))
            }
        }
    }

    async fn battery(&self, serial: &str) -> Result<u8> {
        match self.kind_of(serial) {
            DeviceKind::Simulator => Ok(100),
            DeviceKind::Physical => {
                let text = tool::run_text(
                    IDEVICE_INFO,
                    &["-u", serial, "-q", "com.apple.mobile.battery", "-k", "BatteryCurrentCapacity"],
                )
                .await
                .map_err(|e| LabError::new(e.kind, format!("device {serial}: {}", e.message)))?;
                text.trim().parse::<u8>().map_err(|_| {
                    LabError::tool(format!("device {serial}: unparseable battery capacity"))
                })
            }
        }
    }

    async fn resolution(&self, serial: &str) -> Result<Resolution> {
        let png = self.screenshot(serial).await?;
        let (width, height) = tool::png_dimensions(&png)
            .ok_or_else(|| LabError::tool(format!("device {serial}: screenshot is not a PNG")))?;
        Ok(Resolution { width, height })
    }

    async fn orientation(&self, serial: &str) -> Result<Orientation> {
        let res = self.resolution(serial).await?;
        Ok(if res.width > res.height { Orientation::Landscape } else { Orientation::Portrait })
    }

    async fn capabilities(&self, serial: &str) -> Result<Capabilities> {
        // The bridge exposes no feature catalogue; report the baseline every
        // supported iOS handset/simulator carries.
        let physical = self.kind_of(serial) == DeviceKind::Physical;
        Ok(Capabilities {
            touchscreen: true,
            camera: physical,
            wifi: true,
            bluetooth: true,
            gps: physical,
            nfc: false,
            fingerprint: false,
            accelerometer: true,
            gyroscope: true,
        })
    }

    async fn device_kind(&self, serial: &str) -> DeviceKind {
        self.kind_of(serial)
    }

    async fn screenshot(&self, serial: &str) -> Result<Bytes> {
        match self.kind_of(serial) {
            DeviceKind::Simulator => self.simulator_screenshot(serial).await,
            DeviceKind::Physical => self.physical_screenshot(serial).await,
        }
    }

    async fn tap(&self, serial: &str, x: f64, y: f64) -> Result<()> {
        self.require_simulator(serial, "tap")?;
        let scale = self.scale(serial).await;
        let (px, py) = (x / scale, y / scale);
        match self.sim_ui(serial, &["tap", &fmt_pt(px), &fmt_pt(py)]).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind == crate::error::ErrorKind::ToolFailure => {
                debug!(serial, err = %e, "idb tap failed, trying legacy mouse synthesis");
                self.legacy_tap(serial, px, py).await
            }
            Err(e) => Err(e),
        }
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
        self.require_simulator(serial, "swipe")?;
        let duration = if duration.is_zero() { SWIPE_DURATION } else { duration };
        let scale = self.scale(serial).await;
        let secs = format!("{:.2}", duration.as_secs_f64());
        self.sim_ui(
            serial,
            &[
                "swipe",
                &fmt_pt(x1 / scale),
                &fmt_pt(y1 / scale),
                &fmt_pt(x2 / scale),
                &fmt_pt(y2 / scale),
                "--duration",
                &secs,
            ],
        )
        .await
    }

    async fn key_event(&self, serial: &str, keycode: u32) -> Result<()> {
        self.require_simulator(serial, "key event")?;
        self.sim_ui(serial, &["key", &keycode.to_string()]).await
    }

    async fn input_text(&self, serial: &str, text: &str) -> Result<()> {
        self.require_simulator(serial, "text input")?;
        self.sim_ui(serial, &["text", text]).await
    }

    async fn install(&self, serial: &str, artifact: &Path) -> Result<()> {
        let path = artifact.to_string_lossy();
        let out = match self.kind_of(serial) {
            DeviceKind::Simulator => {
                tool::run(XCRUN, &["simctl", "install", serial, &path]).await?
            }
            DeviceKind::Physical => {
                tool::run(IDEVICE_INSTALLER, &["-u", serial, "-i", &path]).await?
            }
        };
        tool::expect_success("install", out)
            .map(|_| ())
            .map_err(|e| LabError::new(e.kind, format!("device {serial}: {}", e.message)))
    }

    async fn uninstall(&self, serial: &str, bundle_id: &str) -> Result<()> {
        let out = match self.kind_of(serial) {
            DeviceKind::Simulator => {
                tool::run(XCRUN, &["simctl", "uninstall", serial, bundle_id]).await?
            }
            DeviceKind::Physical => {
                tool::run(IDEVICE_INSTALLER, &["-u", serial, "-U", bundle_id]).await?
            }
        };
        tool::expect_success("uninstall", out)
            .map(|_| ())
            .map_err(|e| LabError::new(e.kind, format!("device {serial}: {}", e.message)))
    }

    fn invalidate(&self, serial: &str) {
        self.scale_cache.lock().remove(serial);
        self.kind_cache.lock().remove(serial);
        self.sim_info.lock().remove(serial);
    }
}

// -- Output parsing -----------------------------------------------------------

/// Parse the simulator controller's JSON listing, keeping Booted entries.
pub fn parse_simctl_booted(json: &str) -> Vec<(String, SimDevice)> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(json) else {
        return Vec::new();
    };
    let Some(runtimes) = value.get("devices").and_then(|d| d.as_object()) else {
        return Vec::new();
    };

    let mut booted = Vec::new();
    for (runtime, devices) in runtimes {
        let Some(devices) = devices.as_array() else { continue };
        for dev in devices {
            let state = dev.get("state").and_then(|s| s.as_str()).unwrap_or("");
            if state != "Booted" {
                continue;
            }
            let Some(udid) = dev.get("udid").and_then(|u| u.as_str()) else { continue };
            let name = dev.get("name").and_then(|n| n.as_str()).unwrap_or("iOS Simulator");
            booted.push((
                udid.to_owned(),
                SimDevice { name: name.to_owned(), runtime: runtime.clone() },
            ));
        }
    }
    booted
}

/// Parse `ideviceinfo` output: `key: value` lines.
pub fn parse_ideviceinfo(text: &str) -> HashMap<String, String> {
    let mut props = HashMap::new();
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else { continue };
        let key = key.trim();
        // Indented continuation lines belong to nested plist values; skip.
        if key.is_empty() || line.starts_with(char::is_whitespace) {
            continue;
        }
        props.insert(key.to_owned(), value.trim().to_owned());
    }
    props
}

/// `com.apple.CoreSimulator.SimRuntime.iOS-17-0` -> `17.0`
pub fn runtime_version(runtime: &str) -> String {
    runtime
        .rsplit('.')
        .next()
        .and_then(|tail| tail.strip_prefix("iOS-"))
        .map(|v| v.replace('-', "."))
        .unwrap_or_else(|| runtime.to_owned())
}

/// `"123, 456"` from osascript into window origin coordinates.
pub fn parse_window_position(text: &str) -> Option<(f64, f64)> {
    let (x, y) = text.trim().split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

fn fmt_pt(v: f64) -> String {
    format!("{}", v.round() as i64)
}

fn temp_png(serial: &str) -> Result<tempfile::NamedTempFile> {
    tempfile::Builder::new()
        .prefix("corral-shot-")
        .suffix(".png")
        .tempfile()
        .map_err(|e| LabError::internal(format!("device {serial}: temp file: {e}")))
}

/// Read a capture file, demanding non-empty contents. The backing temp file
/// is unlinked by its guard on every path.
fn read_nonempty(serial: &str, path: &Path) -> Result<Bytes> {
    let data = std::fs::read(path)
        .map_err(|e| LabError::tool(format!("device {serial}: read capture: {e}")))?;
    if data.is_empty() {
        return Err(LabError::tool(format!("device {serial}: empty capture file")));
    }
    Ok(Bytes::from(data))
}

#[cfg(test)]
#[path = "ios_tests.rs"]
mod tests;
