// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Screen-mirror pump: one paced capture loop per mirrored device, fanned
//! out to every subscriber sink registered for that device.
//!
//! Backpressure rules: a single capture may be in flight per device — ticks
//! that land while one is pending are dropped, never queued. Adapter
//! resource-exhaustion terminates the pump to shed load.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::Adapters;
use crate::model::Platform;

/// Uniform frame-rate ceiling, frames per second. Conservative: screencap on
/// real hardware cannot sustain more anyway.
pub const MIRROR_FPS_CEILING: f64 = 1.0;

/// Floor guarding against absurd client requests.
const MIRROR_FPS_FLOOR: f64 = 0.1;

/// One captured frame, ready for the push channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenFrame {
    pub id: String,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    /// Base64-encoded PNG.
    pub payload: String,
    pub mime_type: String,
}

/// Pump-to-subscriber delivery.
#[derive(Debug, Clone)]
pub enum MirrorEvent {
    Frame(ScreenFrame),
    /// The pump for this device ended; `error` is set when it shed load.
    Stopped { device_id: String, error: Option<String> },
}

/// Per-subscriber delivery callback.
pub type FrameSink = Arc<dyn Fn(MirrorEvent) + Send + Sync>;

struct Pump {
    cancel: CancellationToken,
    sinks: Arc<parking_lot::Mutex<HashMap<String, FrameSink>>>,
}

type PumpMap = Arc<Mutex<HashMap<String, Pump>>>;

/// Registry of active per-device pumps.
pub struct MirrorPool {
    adapters: Adapters,
    pumps: PumpMap,
}

impl MirrorPool {
    pub fn new(adapters: Adapters) -> Self {
        Self { adapters, pumps: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Clamp a requested frame rate to the allowed band.
    pub fn effective_fps(requested: Option<f64>) -> f64 {
        requested.unwrap_or(MIRROR_FPS_CEILING).clamp(MIRROR_FPS_FLOOR, MIRROR_FPS_CEILING)
    }

    /// Register `subscriber_id` for frames from a device, starting the
    /// device pump if it is not already running. Repeat registration for the
    /// same (subscriber, device) pair replaces the sink and is not an error.
    pub async fn start(
        &self,
        device_id: &str,
        serial: &str,
        platform: Platform,
        subscriber_id: &str,
        fps: Option<f64>,
        sink: FrameSink,
    ) {
        let mut pumps = self.pumps.lock().await;
        if let Some(pump) = pumps.get(device_id) {
            pump.sinks.lock().insert(subscriber_id.to_owned(), sink);
            return;
        }

        let fps = Self::effective_fps(fps);
        let period = Duration::from_secs_f64(1.0 / fps);
        let cancel = CancellationToken::new();
        let sinks: Arc<parking_lot::Mutex<HashMap<String, FrameSink>>> =
            Arc::new(parking_lot::Mutex::new(HashMap::new()));
        sinks.lock().insert(subscriber_id.to_owned(), sink);
        let in_flight = Arc::new(AtomicBool::new(false));

        let pump = Pump { cancel: cancel.clone(), sinks: Arc::clone(&sinks) };
        pumps.insert(device_id.to_owned(), pump);
        drop(pumps);

        info!(device = %device_id, fps, "mirror pump started");
        self.spawn_loop(device_id.to_owned(), serial.to_owned(), platform, period, cancel, sinks, in_flight);
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_loop(
        &self,
        device_id: String,
        serial: String,
        platform: Platform,
        period: Duration,
        cancel: CancellationToken,
        sinks: Arc<parking_lot::Mutex<HashMap<String, FrameSink>>>,
        in_flight: Arc<AtomicBool>,
    ) {
        let adapter = Arc::clone(self.adapters.for_platform(platform));
        let pumps = Arc::clone(&self.pumps);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                // Single-slot gate: a tick during a pending capture is dropped.
                if in_flight
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    continue;
                }

                let adapter = Arc::clone(&adapter);
                let device_id = device_id.clone();
                let serial = serial.clone();
                let sinks = Arc::clone(&sinks);
                let in_flight = Arc::clone(&in_flight);
                let cancel = cancel.clone();
                let pumps = Arc::clone(&pumps);

                tokio::spawn(async move {
                    let result = adapter.screenshot(&serial).await;
                    in_flight.store(false, Ordering::Release);

                    match result {
                        Ok(png) => {
                            let frame = ScreenFrame {
                                id: uuid::Uuid::new_v4().to_string(),
                                device_id: device_id.clone(),
                                timestamp: Utc::now(),
                                payload: base64::engine::general_purpose::STANDARD.encode(&png),
                                mime_type: "image/png".to_owned(),
                            };
                            for sink in sinks.lock().values() {
                                sink(MirrorEvent::Frame(frame.clone()));
                            }
                        }
                        Err(e) if e.is_exhaustion() => {
                            // Shed load: terminate this device's pump.
                            warn!(device = %device_id, err = %e, "mirror pump shedding");
                            cancel.cancel();
                            pumps.lock().await.remove(&device_id);
                            let stopped = MirrorEvent::Stopped {
                                device_id: device_id.clone(),
                                error: Some(e.to_string()),
                            };
                            for sink in sinks.lock().values() {
                                sink(stopped.clone());
                            }
                        }
                        Err(e) => {
                            // Transient failure: skip this frame, keep pacing.
                            debug!(device = %device_id, err = %e, "capture failed");
                        }
                    }
                });
            }
        });
    }

    /// Drop one subscriber's sink; the last sink out stops the pump and
    /// releases its ticker.
    pub async fn stop(&self, device_id: &str, subscriber_id: &str) {
        let mut pumps = self.pumps.lock().await;
        let Some(pump) = pumps.get(device_id) else { return };
        let now_empty = {
            let mut sinks = pump.sinks.lock();
            sinks.remove(subscriber_id);
            sinks.is_empty()
        };
        if now_empty {
            pump.cancel.cancel();
            pumps.remove(device_id);
            info!(device = %device_id, "mirror pump stopped");
        }
    }

    /// Stop the pump for a device outright (device disconnect path).
    pub async fn stop_device(&self, device_id: &str) {
        let mut pumps = self.pumps.lock().await;
        if let Some(pump) = pumps.remove(device_id) {
            pump.cancel.cancel();
            let stopped = MirrorEvent::Stopped { device_id: device_id.to_owned(), error: None };
            for sink in pump.sinks.lock().values() {
                sink(stopped.clone());
            }
        }
    }

    pub async fn active_count(&self) -> usize {
        self.pumps.lock().await.len()
    }

    pub async fn is_mirroring(&self, device_id: &str) -> bool {
        self.pumps.lock().await.contains_key(device_id)
    }
}

#[cfg(test)]
#[path = "mirror_tests.rs"]
mod tests;
