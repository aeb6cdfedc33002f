// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device registry: the keyed store of device records and the discovery
//! reconciliation loop.
//!
//! The registry is the sole authority for `Device.status`. Reservation and
//! session transitions go through the mutators here so every status change
//! happens under the registry lock and is broadcast after it is visible.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::adapter::{Adapters, LogTail};
use crate::error::{LabError, Result};
use crate::event::EventBus;
use crate::mirror::MirrorPool;
use crate::model::{
    Capabilities, Device, DeviceKind, DeviceStatus, LogEntry, LogLevel, Orientation, Platform,
    Resolution,
};
use crate::supervisor::DriverSupervisor;

pub struct DeviceRegistry {
    /// The registry lock: device map keyed by synthetic id, insertion-ordered
    /// so list responses are stable across cycles.
    devices: RwLock<IndexMap<String, Device>>,
    /// Per-device log-tail handles, keyed by device id.
    tails: Mutex<HashMap<String, LogTail>>,
    adapters: Adapters,
    bus: EventBus,
    supervisor: Arc<DriverSupervisor>,
    mirrors: Arc<MirrorPool>,
}

impl DeviceRegistry {
    pub fn new(
        adapters: Adapters,
        bus: EventBus,
        supervisor: Arc<DriverSupervisor>,
        mirrors: Arc<MirrorPool>,
    ) -> Self {
        Self {
            devices: RwLock::new(IndexMap::new()),
            tails: Mutex::new(HashMap::new()),
            adapters,
            bus,
            supervisor,
            mirrors,
        }
    }

    pub fn adapters(&self) -> &Adapters {
        &self.adapters
    }

    // -- Read access ----------------------------------------------------------

    pub async fn snapshot(&self) -> Vec<Device> {
        self.devices.read().await.values().cloned().collect()
    }

    pub async fn get(&self, device_id: &str) -> Result<Device> {
        self.devices
            .read()
            .await
            .get(device_id)
            .cloned()
            .ok_or_else(|| LabError::not_found(format!("unknown device: {device_id}")))
    }

    pub async fn find_by_serial(&self, serial: &str) -> Option<Device> {
        self.devices.read().await.values().find(|d| d.serial == serial).cloned()
    }

    pub async fn counts(&self) -> (usize, usize, usize) {
        let devices = self.devices.read().await;
        let online = devices.values().filter(|d| d.status == DeviceStatus::Online).count();
        let in_use = devices.values().filter(|d| d.status == DeviceStatus::InUse).count();
        (devices.len(), online, in_use)
    }

    // -- Discovery ------------------------------------------------------------

    /// One discovery cycle: enumerate both adapters in parallel, reconcile
    /// each platform's observed set, then broadcast the full device list.
    ///
    /// A failing adapter logs and leaves its platform's records untouched;
    /// the next cycle retries.
    pub async fn discover(&self) {
        let (android, ios) =
            tokio::join!(self.adapters.android.enumerate(), self.adapters.ios.enumerate());

        self.reconcile(Platform::Android, android).await;
        self.reconcile(Platform::Ios, ios).await;

        self.bus.device_list(self.snapshot().await);
    }

    async fn reconcile(&self, platform: Platform, observed: Result<Vec<String>>) {
        let observed = match observed {
            Ok(serials) => serials,
            Err(e) => {
                warn!(platform = platform.as_str(), err = %e, "discovery failed, keeping previous view");
                return;
            }
        };
        let observed_set: HashSet<&str> = observed.iter().map(String::as_str).collect();
        let now = Utc::now();

        // Known serials: stamp last_seen, promote reappearances. New serials
        // are enriched outside the lock below.
        let mut unknown: Vec<String> = Vec::new();
        let mut promoted: Vec<Device> = Vec::new();
        let mut vanished: Vec<Device> = Vec::new();
        {
            let mut devices = self.devices.write().await;
            for serial in &observed {
                match devices.values_mut().find(|d| d.platform == platform && &d.serial == serial)
                {
                    Some(dev) => {
                        dev.last_seen = now;
                        if matches!(
                            dev.status,
                            DeviceStatus::Offline | DeviceStatus::Unauthorized
                        ) {
                            dev.status = DeviceStatus::Online;
                            promoted.push(dev.clone());
                        }
                        // Reserved and in-use are never overwritten here.
                    }
                    None => unknown.push(serial.clone()),
                }
            }

            for dev in devices.values_mut() {
                if dev.platform == platform
                    && dev.status != DeviceStatus::Offline
                    && !observed_set.contains(dev.serial.as_str())
                {
                    dev.status = DeviceStatus::Offline;
                    // Keep the reservation-consistency invariant; the
                    // reservation record itself stays active until it is
                    // ended or reaped.
                    dev.reserved_by.clear();
                    dev.reserved_at = None;
                    dev.last_seen = now;
                    vanished.push(dev.clone());
                }
            }
        }

        for dev in promoted {
            info!(device = %dev.id, serial = %dev.serial, "device back online");
            self.bus.device_updated(dev);
        }

        for dev in vanished {
            info!(device = %dev.id, serial = %dev.serial, "device disappeared");
            self.stop_tail(&dev.id).await;
            self.supervisor.stop(&dev.id).await;
            self.mirrors.stop_device(&dev.id).await;
            self.adapters.for_platform(platform).invalidate(&dev.serial);
            self.bus.device_updated(dev);
        }

        for serial in unknown {
            match self.enrich(platform, &serial).await {
                Ok(device) => self.admit(device).await,
                Err(e) => {
                    // Skipped this cycle; retried on the next one.
                    debug!(platform = platform.as_str(), serial = %serial, err = %e, "enrichment failed");
                }
            }
        }
    }

    /// Build a record for a newly-observed serial by querying the adapter.
    /// Runs before insertion, so no lock is held across the tool calls.
    async fn enrich(&self, platform: Platform, serial: &str) -> Result<Device> {
        let adapter = self.adapters.for_platform(platform);

        let properties = adapter.properties(serial).await?;
        let battery = adapter.battery(serial).await?;
        let resolution = adapter.resolution(serial).await.unwrap_or_default();
        let orientation =
            adapter.orientation(serial).await.unwrap_or(Orientation::Portrait);
        let capabilities =
            adapter.capabilities(serial).await.unwrap_or_else(|_| Capabilities::default());
        let device_type = adapter.device_kind(serial).await;

        let now = Utc::now();
        let device = match platform {
            Platform::Android => {
                let model = prop(&properties, "ro.product.model");
                let manufacturer = prop(&properties, "ro.product.manufacturer");
                Device {
                    id: uuid::Uuid::new_v4().to_string(),
                    serial: serial.to_owned(),
                    platform,
                    device_type,
                    name: derive_android_name(&properties),
                    model,
                    manufacturer,
                    os_version: prop(&properties, "ro.build.version.release"),
                    api_level: properties
                        .get("ro.build.version.sdk")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0),
                    resolution,
                    orientation,
                    capabilities,
                    properties,
                    status: DeviceStatus::Online,
                    battery,
                    reserved_by: String::new(),
                    reserved_at: None,
                    connected_at: now,
                    last_seen: now,
                }
            }
            Platform::Ios => Device {
                id: uuid::Uuid::new_v4().to_string(),
                serial: serial.to_owned(),
                platform,
                device_type,
                name: prop_or(&properties, "DeviceName", serial),
                model: prop_or(&properties, "ProductType", "iOS Device"),
                manufacturer: "Apple".to_owned(),
                os_version: prop(&properties, "ProductVersion"),
                api_level: 0,
                resolution,
                orientation,
                capabilities,
                properties,
                status: DeviceStatus::Online,
                battery,
                reserved_by: String::new(),
                reserved_at: None,
                connected_at: now,
                last_seen: now,
            },
        };
        Ok(device)
    }

    /// Insert a freshly-enriched record and start its log tail.
    async fn admit(&self, device: Device) {
        let id = device.id.clone();
        let serial = device.serial.clone();
        let platform = device.platform;
        {
            let mut devices = self.devices.write().await;
            // A concurrent refresh may have admitted the same serial already.
            if devices.values().any(|d| d.platform == platform && d.serial == serial) {
                return;
            }
            devices.insert(id.clone(), device.clone());
        }
        info!(device = %id, serial = %serial, platform = platform.as_str(), "device discovered");

        if self.adapters.for_platform(platform).supports_log_tail() {
            self.start_tail(platform, &id, &serial).await;
        }

        self.bus.device_updated(device);
    }

    async fn start_tail(&self, platform: Platform, device_id: &str, serial: &str) {
        let bus = self.bus.clone();
        let id = device_id.to_owned();
        let sink: crate::adapter::LineSink = Arc::new(move |line: String| {
            bus.device_log(parse_logcat_entry(&id, &line));
        });
        match self.adapters.for_platform(platform).tail_logs(serial, sink).await {
            Ok(tail) => {
                self.tails.lock().await.insert(device_id.to_owned(), tail);
            }
            Err(e) => debug!(serial, err = %e, "log tail unavailable"),
        }
    }

    async fn stop_tail(&self, device_id: &str) {
        if let Some(tail) = self.tails.lock().await.remove(device_id) {
            tail.stop();
        }
    }

    /// Stop every log tail (shutdown path).
    pub async fn stop_all_tails(&self) {
        let mut tails = self.tails.lock().await;
        for (_, tail) in tails.drain() {
            tail.stop();
        }
    }

    // -- Status mutation (sole authority) -------------------------------------

    /// Grant a reservation hold: requires `online`.
    pub async fn reserve(&self, device_id: &str, user_id: &str) -> Result<Device> {
        let device = {
            let mut devices = self.devices.write().await;
            let dev = devices
                .get_mut(device_id)
                .ok_or_else(|| LabError::not_found(format!("unknown device: {device_id}")))?;
            if dev.status != DeviceStatus::Online {
                return Err(LabError::invalid_state(format!(
                    "device not available (status: {})",
                    dev.status.as_str()
                )));
            }
            dev.status = DeviceStatus::Reserved;
            dev.reserved_by = user_id.to_owned();
            dev.reserved_at = Some(Utc::now());
            dev.clone()
        };
        self.bus.device_updated(device.clone());
        Ok(device)
    }

    /// Release the hold: clears the reservation fields and re-admits the
    /// device to the pool. An offline device stays offline.
    pub async fn clear_reservation(&self, device_id: &str) -> Result<Device> {
        let device = {
            let mut devices = self.devices.write().await;
            let dev = devices
                .get_mut(device_id)
                .ok_or_else(|| LabError::not_found(format!("unknown device: {device_id}")))?;
            dev.reserved_by.clear();
            dev.reserved_at = None;
            if dev.status != DeviceStatus::Offline {
                dev.status = DeviceStatus::Online;
            }
            dev.clone()
        };
        self.bus.device_updated(device.clone());
        Ok(device)
    }

    /// Session start: `reserved → in-use`.
    pub async fn begin_session(&self, device_id: &str) -> Result<Device> {
        let device = {
            let mut devices = self.devices.write().await;
            let dev = devices
                .get_mut(device_id)
                .ok_or_else(|| LabError::not_found(format!("unknown device: {device_id}")))?;
            if !dev.status.can_transition(DeviceStatus::InUse) {
                return Err(LabError::invalid_state(format!(
                    "cannot start session (status: {})",
                    dev.status.as_str()
                )));
            }
            dev.status = DeviceStatus::InUse;
            dev.clone()
        };
        self.bus.device_updated(device.clone());
        Ok(device)
    }

    /// Session end: back to `reserved` while a hold remains, else `online`.
    /// An offline device stays offline.
    pub async fn finish_session(&self, device_id: &str) -> Result<Device> {
        let device = {
            let mut devices = self.devices.write().await;
            let dev = devices
                .get_mut(device_id)
                .ok_or_else(|| LabError::not_found(format!("unknown device: {device_id}")))?;
            if dev.status == DeviceStatus::InUse {
                dev.status = if dev.reserved_by.is_empty() {
                    DeviceStatus::Online
                } else {
                    DeviceStatus::Reserved
                };
            }
            dev.clone()
        };
        self.bus.device_updated(device.clone());
        Ok(device)
    }

    /// Refresh the battery reading for one device (health sweeps).
    pub async fn refresh_battery(&self, device_id: &str) -> Result<Device> {
        let (platform, serial) = {
            let devices = self.devices.read().await;
            let dev = devices
                .get(device_id)
                .ok_or_else(|| LabError::not_found(format!("unknown device: {device_id}")))?;
            (dev.platform, dev.serial.clone())
        };
        let battery = self.adapters.for_platform(platform).battery(&serial).await?;
        let device = {
            let mut devices = self.devices.write().await;
            let dev = devices
                .get_mut(device_id)
                .ok_or_else(|| LabError::not_found(format!("unknown device: {device_id}")))?;
            if dev.battery == battery {
                return Ok(dev.clone());
            }
            dev.battery = battery;
            dev.clone()
        };
        self.bus.device_updated(device.clone());
        Ok(device)
    }

    // -- Demo seeding ---------------------------------------------------------

    /// Seed synthetic offline records for demo installs. Opt-in via config;
    /// never entangled with discovery (offline records are left alone by
    /// reconciliation until their serial actually appears).
    pub async fn seed_demo_devices(&self) {
        let specs = [
            ("demo-pixel-7", "Pixel 7", "Google", Platform::Android, "14"),
            ("demo-galaxy-s23", "Galaxy S23", "Samsung", Platform::Android, "13"),
            ("demo-iphone-15", "iPhone 15", "Apple", Platform::Ios, "17.0"),
        ];
        let now = Utc::now();
        let mut devices = self.devices.write().await;
        for (serial, name, manufacturer, platform, os_version) in specs {
            if devices.values().any(|d| d.serial == serial) {
                continue;
            }
            let device = Device {
                id: uuid::Uuid::new_v4().to_string(),
                serial: serial.to_owned(),
                platform,
                device_type: DeviceKind::Physical,
                name: name.to_owned(),
                model: name.to_owned(),
                manufacturer: manufacturer.to_owned(),
                os_version: os_version.to_owned(),
                api_level: 0,
                resolution: Resolution { width: 1080, height: 2340 },
                orientation: Orientation::Portrait,
                capabilities: Capabilities::default(),
                properties: HashMap::new(),
                status: DeviceStatus::Offline,
                battery: 100,
                reserved_by: String::new(),
                reserved_at: None,
                connected_at: now,
                last_seen: now,
            };
            devices.insert(device.id.clone(), device);
        }
        info!("seeded demo device records");
    }
}

fn prop(props: &HashMap<String, String>, key: &str) -> String {
    props.get(key).cloned().unwrap_or_default()
}

fn prop_or(props: &HashMap<String, String>, key: &str, fallback: &str) -> String {
    props.get(key).cloned().unwrap_or_else(|| fallback.to_owned())
}

/// Android display-name derivation.
///
/// Prefer the emulator AVD name, then the product model unless it is an SDK
/// placeholder; placeholders get a friendly rename, anything else falls back
/// to `manufacturer model`.
pub fn derive_android_name(props: &HashMap<String, String>) -> String {
    if let Some(avd) = props.get("ro.boot.qemu.avd_name") {
        if !avd.is_empty() {
            return avd.replace('_', " ");
        }
    }

    let model = prop(props, "ro.product.model");
    let manufacturer = prop(props, "ro.product.manufacturer");

    if !model.is_empty() && !is_sdk_placeholder(&model) {
        return model;
    }
    if is_sdk_placeholder(&model) {
        return "Android Emulator".to_owned();
    }
    let combined = format!("{manufacturer} {model}");
    let combined = combined.trim().to_owned();
    if combined.is_empty() { "Android Device".to_owned() } else { combined }
}

fn is_sdk_placeholder(model: &str) -> bool {
    model.starts_with("sdk_") || model.starts_with("Android SDK built for")
}

/// Split a `logcat -v time` line into level/tag/message, tolerating lines
/// that do not match the format.
pub fn parse_logcat_entry(device_id: &str, line: &str) -> LogEntry {
    // `MM-DD HH:MM:SS.mmm L/Tag( pid): message`
    if let Some((head, message)) = line.split_once("): ") {
        if let Some(idx) = head.find(|c: char| "VDIWEF".contains(c)) {
            if head[idx..].starts_with(|c: char| "VDIWEF".contains(c))
                && head[idx + 1..].starts_with('/')
            {
                let level = match &head[idx..=idx] {
                    "V" => LogLevel::Verbose,
                    "D" => LogLevel::Debug,
                    "W" => LogLevel::Warn,
                    "E" => LogLevel::Error,
                    "F" => LogLevel::Fatal,
                    _ => LogLevel::Info,
                };
                let tag = head[idx + 2..]
                    .split('(')
                    .next()
                    .unwrap_or("")
                    .trim()
                    .to_owned();
                return LogEntry::new(device_id, level, tag, message.trim());
            }
        }
    }
    LogEntry::new(device_id, LogLevel::Info, "logcat", line.trim())
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
