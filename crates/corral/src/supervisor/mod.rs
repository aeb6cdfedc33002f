// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Driver-server supervisor.
//!
//! Owns the pool of per-device automation driver processes (Appium), one per
//! device: allocates a port from the bounded range, spawns the child with
//! device-derived default capabilities, filters its output into a bounded
//! ring, watches for the ready sentinel, and supervises exit.

pub mod logfilter;
pub mod ports;
pub mod ring;

pub use logfilter::LogFilter;
pub use ports::PortAllocator;
pub use ring::LogRing;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::adapter::tool::spawn_detached;
use crate::error::{LabError, Result};
use crate::event::EventBus;
use crate::model::{Device, LogEntry, LogLevel, Platform, SYSTEM_SOURCE};

/// Post-filter entries retained per driver server.
pub const LOG_RING_CAPACITY: usize = 500;

/// Substring on driver stdout marking successful startup. The Appium server
/// prints this banner for both the UiAutomator2 and XCUITest drivers.
pub const READY_SENTINEL: &str = "REST http interface listener started";

const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(30);
const START_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverStatus {
    Starting,
    Running,
    Stopped,
    Error,
}

/// API-facing snapshot of one supervised server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverServer {
    pub device_id: String,
    pub serial: String,
    pub port: u16,
    pub status: DriverStatus,
    pub started_at: DateTime<Utc>,
}

struct ServerEntry {
    device_id: String,
    serial: String,
    port: u16,
    pid: u32,
    status: Arc<parking_lot::RwLock<DriverStatus>>,
    ring: Arc<parking_lot::Mutex<LogRing>>,
    started_at: DateTime<Utc>,
}

impl ServerEntry {
    fn snapshot(&self) -> DriverServer {
        DriverServer {
            device_id: self.device_id.clone(),
            serial: self.serial.clone(),
            port: self.port,
            status: *self.status.read(),
            started_at: self.started_at,
        }
    }
}

struct Pool {
    ports: PortAllocator,
    servers: HashMap<String, Arc<ServerEntry>>,
}

/// Supervisor over the driver-server pool. One lock covers the pool and the
/// port allocations; per-server log rings have their own lock so reader
/// tasks never contend with pool operations.
pub struct DriverSupervisor {
    pool: Arc<Mutex<Pool>>,
    filter: Arc<LogFilter>,
    bus: EventBus,
    binary: String,
    start_timeout: Duration,
}

impl DriverSupervisor {
    pub fn new(base_port: u16, port_range: u16, bus: EventBus) -> anyhow::Result<Self> {
        Ok(Self {
            pool: Arc::new(Mutex::new(Pool {
                ports: PortAllocator::new(base_port, port_range),
                servers: HashMap::new(),
            })),
            filter: Arc::new(LogFilter::new()?),
            bus,
            binary: "appium".to_owned(),
            start_timeout: DEFAULT_START_TIMEOUT,
        })
    }

    /// Override the driver binary (tests use a stub script).
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Best-effort kill of lingering driver instances from a previous run.
    /// Fire-and-forget; never blocks startup.
    pub fn cleanup_orphans(&self) {
        spawn_detached("pkill", &["-f", &self.binary]);
    }

    /// Start a driver server for a device, returning its port.
    ///
    /// Idempotent: an existing `running` server returns its port
    /// immediately; a `starting` one is awaited like a fresh launch.
    pub async fn start(&self, device: &Device) -> Result<u16> {
        let entry = {
            let mut pool = self.pool.lock().await;
            if let Some(existing) = pool.servers.get(&device.id) {
                let status = *existing.status.read();
                match status {
                    DriverStatus::Running => return Ok(existing.port),
                    DriverStatus::Starting => Arc::clone(existing),
                    // Terminal statuses linger only momentarily before the
                    // completion handler removes them; treat as absent.
                    _ => {
                        let stale = Arc::clone(existing);
                        pool.servers.remove(&device.id);
                        pool.ports.release(stale.port);
                        self.launch(&mut pool, device).await?
                    }
                }
            } else {
                self.launch(&mut pool, device).await?
            }
        };

        self.wait_ready(&entry).await
    }

    /// Allocate a port and spawn the driver child. Caller holds the pool lock.
    async fn launch(&self, pool: &mut Pool, device: &Device) -> Result<Arc<ServerEntry>> {
        let port = pool.ports.allocate().await?;
        let caps = default_capabilities(device);
        let caps_json = caps.to_string();
        let port_arg = port.to_string();

        let spawn_result = tokio::process::Command::new(&self.binary)
            .args([
                "-p",
                &port_arg,
                "--session-override",
                "--log-level",
                "info",
                "--default-capabilities",
                &caps_json,
            ])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(false)
            .spawn();

        let mut child = match spawn_result {
            Ok(child) => child,
            Err(e) => {
                pool.ports.release(port);
                return Err(if e.kind() == std::io::ErrorKind::NotFound {
                    LabError::tool(format!("{}: not installed", self.binary))
                } else {
                    LabError::exhausted(format!("driver spawn failed: {e}"))
                });
            }
        };

        let pid = child.id().unwrap_or_default();
        let entry = Arc::new(ServerEntry {
            device_id: device.id.clone(),
            serial: device.serial.clone(),
            port,
            pid,
            status: Arc::new(parking_lot::RwLock::new(DriverStatus::Starting)),
            ring: Arc::new(parking_lot::Mutex::new(LogRing::new(LOG_RING_CAPACITY))),
            started_at: Utc::now(),
        });
        pool.servers.insert(device.id.clone(), Arc::clone(&entry));

        info!(device = %device.id, serial = %device.serial, port, pid, "driver server starting");
        self.system_log(
            LogLevel::Info,
            format!("driver server for {} starting on port {port}", device.name),
        );

        // Reader tasks: stdout carries the ready sentinel, both feed the ring.
        if let Some(stdout) = child.stdout.take() {
            self.spawn_reader(stdout, Arc::clone(&entry), true);
        }
        if let Some(stderr) = child.stderr.take() {
            self.spawn_reader(stderr, Arc::clone(&entry), false);
        }

        self.spawn_completion(child, Arc::clone(&entry));
        Ok(entry)
    }

    fn spawn_reader(
        &self,
        stream: impl tokio::io::AsyncRead + Unpin + Send + 'static,
        entry: Arc<ServerEntry>,
        watch_sentinel: bool,
    ) {
        let filter = Arc::clone(&self.filter);
        let bus = self.bus.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if watch_sentinel && line.contains(READY_SENTINEL) {
                    let mut status = entry.status.write();
                    if *status == DriverStatus::Starting {
                        *status = DriverStatus::Running;
                        drop(status);
                        info!(device = %entry.device_id, port = entry.port, "driver server ready");
                        bus.device_log(LogEntry::new(
                            SYSTEM_SOURCE,
                            LogLevel::Info,
                            "driver",
                            format!("driver server on port {} is ready", entry.port),
                        ));
                    }
                }
                if let Some(kept) = filter.filter(&line) {
                    entry
                        .ring
                        .lock()
                        .push(LogEntry::new(&entry.device_id, LogLevel::Info, "appium", kept));
                }
            }
        });
    }

    /// Completion handler: classify the exit and drop the record.
    fn spawn_completion(&self, mut child: tokio::process::Child, entry: Arc<ServerEntry>) {
        let bus = self.bus.clone();
        let supervisor_pool = self.pool_handle();
        tokio::spawn(async move {
            let exit = child.wait().await;
            let clean = exit.as_ref().map(|s| s.success()).unwrap_or(false);
            {
                let mut status = entry.status.write();
                *status = if clean { DriverStatus::Stopped } else { DriverStatus::Error };
            }
            let outcome = if clean { "stopped" } else { "exited with error" };
            debug!(device = %entry.device_id, port = entry.port, outcome, "driver server exit");
            bus.device_log(LogEntry::new(
                SYSTEM_SOURCE,
                if clean { LogLevel::Info } else { LogLevel::Warn },
                "driver",
                format!("driver server on port {} {outcome}", entry.port),
            ));

            // Remove the record in either case.
            let mut pool = supervisor_pool.lock().await;
            if let Some(current) = pool.servers.get(&entry.device_id) {
                if Arc::ptr_eq(current, &entry) {
                    pool.servers.remove(&entry.device_id);
                    pool.ports.release(entry.port);
                }
            }
        });
    }

    fn pool_handle(&self) -> Arc<Mutex<Pool>> {
        Arc::clone(&self.pool)
    }

    /// Wait for the entry to reach `running`, with the configured deadline.
    async fn wait_ready(&self, entry: &Arc<ServerEntry>) -> Result<u16> {
        let deadline = tokio::time::Instant::now() + self.start_timeout;
        loop {
            match *entry.status.read() {
                DriverStatus::Running => return Ok(entry.port),
                DriverStatus::Error | DriverStatus::Stopped => {
                    return Err(LabError::tool(format!(
                        "driver server for device {} failed to start",
                        entry.device_id
                    )));
                }
                DriverStatus::Starting => {}
            }
            if tokio::time::Instant::now() >= deadline {
                // Remove the partially-started record; the child may linger
                // until orphan cleanup at next startup.
                self.stop(&entry.device_id).await;
                return Err(LabError::timeout(format!(
                    "driver server for device {} start timeout",
                    entry.device_id
                )));
            }
            tokio::time::sleep(START_POLL).await;
        }
    }

    /// Stop the server for a device, in any status. Removes the record and
    /// returns whether one existed.
    pub async fn stop(&self, device_id: &str) -> bool {
        let entry = {
            let mut pool = self.pool.lock().await;
            match pool.servers.remove(device_id) {
                Some(entry) => {
                    pool.ports.release(entry.port);
                    entry
                }
                None => return false,
            }
        };
        terminate(entry.pid);
        self.system_log(
            LogLevel::Info,
            format!("driver server on port {} stop requested", entry.port),
        );
        true
    }

    /// Stop every server, sending termination in parallel.
    pub async fn stop_all(&self) {
        let entries: Vec<Arc<ServerEntry>> = {
            let mut pool = self.pool.lock().await;
            let drained: Vec<_> = pool.servers.drain().map(|(_, e)| e).collect();
            for entry in &drained {
                pool.ports.release(entry.port);
            }
            drained
        };
        let mut handles = Vec::with_capacity(entries.len());
        for entry in entries {
            handles.push(tokio::task::spawn_blocking(move || terminate(entry.pid)));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Snapshot of the running server for a device, if any.
    pub async fn server(&self, device_id: &str) -> Option<DriverServer> {
        let pool = self.pool.lock().await;
        pool.servers.get(device_id).map(|e| e.snapshot())
    }

    /// Snapshot of every supervised server.
    pub async fn servers(&self) -> Vec<DriverServer> {
        let pool = self.pool.lock().await;
        pool.servers.values().map(|e| e.snapshot()).collect()
    }

    pub async fn server_count(&self) -> usize {
        self.pool.lock().await.servers.len()
    }

    /// Snapshot copy of the log ring for a device's server.
    pub async fn logs(&self, device_id: &str) -> Result<Vec<LogEntry>> {
        let pool = self.pool.lock().await;
        let entry = pool
            .servers
            .get(device_id)
            .ok_or_else(|| LabError::not_found(format!("no driver server for {device_id}")))?;
        let snapshot = entry.ring.lock().snapshot();
        Ok(snapshot)
    }

    pub async fn clear_logs(&self, device_id: &str) -> Result<()> {
        let pool = self.pool.lock().await;
        let entry = pool
            .servers
            .get(device_id)
            .ok_or_else(|| LabError::not_found(format!("no driver server for {device_id}")))?;
        entry.ring.lock().clear();
        Ok(())
    }

    fn system_log(&self, level: LogLevel, message: String) {
        self.bus.device_log(LogEntry::new(SYSTEM_SOURCE, level, "driver", message));
    }
}

/// Graceful termination signal to a driver child.
fn terminate(pid: u32) {
    if pid == 0 {
        return;
    }
    if let Ok(pid) = i32::try_from(pid) {
        let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
    }
}

/// Default capability blob for the driver, derived from the device record.
pub fn default_capabilities(device: &Device) -> serde_json::Value {
    let (platform_name, automation) = match device.platform {
        Platform::Android => ("Android", "UiAutomator2"),
        Platform::Ios => ("iOS", "XCUITest"),
    };
    serde_json::json!({
        "platformName": platform_name,
        "appium:platformVersion": device.os_version,
        "appium:udid": device.serial,
        "appium:deviceName": device.name,
        "appium:automationName": automation,
        "appium:newCommandTimeout": 300,
        "appium:noReset": true,
    })
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
