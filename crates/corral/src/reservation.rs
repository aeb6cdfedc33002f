// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reservation and session arbitration.
//!
//! Owns the reservation and session tables; every device status change goes
//! through the registry mutators so it happens under the registry lock and
//! is broadcast. The deadline reaper sweeps expired holds through the same
//! release path a user would take.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{LabError, Result};
use crate::model::{
    Device, DeviceStatus, Reservation, ReservationStatus, Session, SessionStatus,
};
use crate::registry::DeviceRegistry;

/// Reservation duration applied when the request does not specify one.
pub const DEFAULT_DURATION_MINUTES: i64 = 60;

pub struct SessionManager {
    registry: Arc<DeviceRegistry>,
    reservations: RwLock<Vec<Reservation>>,
    sessions: RwLock<Vec<Session>>,
}

impl SessionManager {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry, reservations: RwLock::new(Vec::new()), sessions: RwLock::new(Vec::new()) }
    }

    // -- Reservations ---------------------------------------------------------

    /// Grant an exclusive hold. Requires the device to be `online`.
    pub async fn reserve(
        &self,
        device_id: &str,
        user_id: &str,
        duration_minutes: Option<i64>,
        purpose: &str,
    ) -> Result<Reservation> {
        if user_id.is_empty() {
            return Err(LabError::validation("userId is required"));
        }
        let duration = duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
        if duration <= 0 {
            return Err(LabError::validation("duration must be positive"));
        }

        // Registry validates status and flips it under its lock.
        self.registry.reserve(device_id, user_id).await?;

        let now = Utc::now();
        let reservation = Reservation {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.to_owned(),
            user_id: user_id.to_owned(),
            start_time: now,
            end_time: now + ChronoDuration::minutes(duration),
            status: ReservationStatus::Active,
            purpose: purpose.to_owned(),
        };

        {
            let mut reservations = self.reservations.write().await;
            // A hold left over from a disconnect is superseded, keeping the
            // one-active-per-device invariant.
            for stale in reservations
                .iter_mut()
                .filter(|r| r.device_id == device_id && r.status == ReservationStatus::Active)
            {
                stale.status = ReservationStatus::Cancelled;
                stale.end_time = now;
                warn!(reservation = %stale.id, device = %device_id, "superseding stale reservation");
            }
            reservations.push(reservation.clone());
        }

        info!(device = %device_id, user = %user_id, reservation = %reservation.id, "device reserved");
        Ok(reservation)
    }

    /// Release a device: completes the sole active reservation (if any) and
    /// re-admits the device to the pool unconditionally.
    pub async fn release(&self, device_id: &str) -> Result<Device> {
        let now = Utc::now();
        {
            let mut reservations = self.reservations.write().await;
            if let Some(active) = reservations
                .iter_mut()
                .find(|r| r.device_id == device_id && r.status == ReservationStatus::Active)
            {
                active.status = ReservationStatus::Completed;
                active.end_time = now;
            }
        }
        let device = self.registry.clear_reservation(device_id).await?;
        info!(device = %device_id, "device released");
        Ok(device)
    }

    pub async fn reservations(&self) -> Vec<Reservation> {
        self.reservations.read().await.clone()
    }

    pub async fn active_reservation(&self, device_id: &str) -> Option<Reservation> {
        self.reservations
            .read()
            .await
            .iter()
            .find(|r| r.device_id == device_id && r.status == ReservationStatus::Active)
            .cloned()
    }

    pub async fn reservations_for_device(&self, device_id: &str) -> Vec<Reservation> {
        self.reservations
            .read()
            .await
            .iter()
            .filter(|r| r.device_id == device_id)
            .cloned()
            .collect()
    }

    pub async fn active_reservation_count(&self) -> usize {
        self.reservations
            .read()
            .await
            .iter()
            .filter(|r| r.status == ReservationStatus::Active)
            .count()
    }

    /// Complete every active reservation whose deadline has passed,
    /// releasing its device through the normal path. Returns the number of
    /// holds reaped.
    pub async fn reap_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = self
            .reservations
            .read()
            .await
            .iter()
            .filter(|r| r.status == ReservationStatus::Active && r.end_time <= now)
            .map(|r| r.device_id.clone())
            .collect();

        let mut reaped = 0;
        for device_id in expired {
            match self.release(&device_id).await {
                Ok(_) => {
                    reaped += 1;
                    info!(device = %device_id, "reservation deadline reached, released");
                }
                Err(e) => warn!(device = %device_id, err = %e, "deadline release failed"),
            }
        }
        reaped
    }

    // -- Sessions -------------------------------------------------------------

    /// Open a session: device goes `reserved → in-use`.
    pub async fn create_session(&self, device_id: &str, user_id: &str) -> Result<Session> {
        if user_id.is_empty() {
            return Err(LabError::validation("userId is required"));
        }
        {
            let sessions = self.sessions.read().await;
            if sessions
                .iter()
                .any(|s| s.device_id == device_id && s.status == SessionStatus::Active)
            {
                return Err(LabError::invalid_state(format!(
                    "device {device_id} already has an active session"
                )));
            }
        }

        self.registry.begin_session(device_id).await?;

        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.to_owned(),
            user_id: user_id.to_owned(),
            start_time: Utc::now(),
            end_time: None,
            status: SessionStatus::Active,
        };
        self.sessions.write().await.push(session.clone());
        info!(device = %device_id, user = %user_id, session = %session.id, "session started");
        Ok(session)
    }

    /// Record a session that rides on an existing hold without taking the
    /// device to `in-use` (the one-call auto-start path: the reservation
    /// stays the visible status).
    pub async fn attach_session(&self, device_id: &str, user_id: &str) -> Result<Session> {
        {
            let sessions = self.sessions.read().await;
            if sessions
                .iter()
                .any(|s| s.device_id == device_id && s.status == SessionStatus::Active)
            {
                return Err(LabError::invalid_state(format!(
                    "device {device_id} already has an active session"
                )));
            }
        }
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.to_owned(),
            user_id: user_id.to_owned(),
            start_time: Utc::now(),
            end_time: None,
            status: SessionStatus::Active,
        };
        self.sessions.write().await.push(session.clone());
        info!(device = %device_id, user = %user_id, session = %session.id, "session attached");
        Ok(session)
    }

    /// End a session. The device returns to `reserved` while its hold
    /// remains, to `online` otherwise; a device that disappeared mid-session
    /// stays `offline` and its reservation completes.
    pub async fn end_session(&self, session_id: &str) -> Result<Session> {
        let session = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .iter_mut()
                .find(|s| s.id == session_id)
                .ok_or_else(|| LabError::not_found(format!("unknown session: {session_id}")))?;
            if session.status != SessionStatus::Active {
                return Err(LabError::invalid_state(format!(
                    "session {session_id} is not active"
                )));
            }
            session.status = SessionStatus::Completed;
            session.end_time = Some(Utc::now());
            session.clone()
        };

        let device = self.registry.finish_session(&session.device_id).await?;
        if device.status == DeviceStatus::Offline {
            let mut reservations = self.reservations.write().await;
            if let Some(active) = reservations
                .iter_mut()
                .find(|r| r.device_id == session.device_id && r.status == ReservationStatus::Active)
            {
                active.status = ReservationStatus::Completed;
                active.end_time = Utc::now();
            }
        }

        info!(session = %session.id, device = %session.device_id, "session ended");
        Ok(session)
    }

    /// End the active session for a device, if one exists (release cascade).
    pub async fn end_active_session_for_device(&self, device_id: &str) -> Option<Session> {
        let session_id = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .find(|s| s.device_id == device_id && s.status == SessionStatus::Active)
                .map(|s| s.id.clone())
        }?;
        self.end_session(&session_id).await.ok()
    }

    pub async fn sessions(&self) -> Vec<Session> {
        self.sessions.read().await.clone()
    }

    pub async fn session(&self, session_id: &str) -> Result<Session> {
        self.sessions
            .read()
            .await
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
            .ok_or_else(|| LabError::not_found(format!("unknown session: {session_id}")))
    }

    pub async fn sessions_for_device(&self, device_id: &str) -> Vec<Session> {
        self.sessions.read().await.iter().filter(|s| s.device_id == device_id).cloned().collect()
    }

    pub async fn sessions_for_user(&self, user_id: &str) -> Vec<Session> {
        self.sessions.read().await.iter().filter(|s| s.user_id == user_id).cloned().collect()
    }

    pub async fn active_session_count(&self) -> usize {
        self.sessions.read().await.iter().filter(|s| s.status == SessionStatus::Active).count()
    }

    // -- Analytics ------------------------------------------------------------

    /// Per-device session totals.
    pub async fn sessions_per_device(&self) -> Vec<(String, usize)> {
        let sessions = self.sessions.read().await;
        let mut counts: indexmap::IndexMap<String, usize> = indexmap::IndexMap::new();
        for session in sessions.iter() {
            *counts.entry(session.device_id.clone()).or_default() += 1;
        }
        counts.into_iter().collect()
    }

    /// Sessions started per hour of day (UTC), 24 buckets.
    pub async fn sessions_per_hour(&self) -> [usize; 24] {
        use chrono::Timelike;
        let sessions = self.sessions.read().await;
        let mut buckets = [0usize; 24];
        for session in sessions.iter() {
            buckets[session.start_time.hour() as usize] += 1;
        }
        buckets
    }

    /// Mean completed-session length in seconds, if any completed.
    pub async fn mean_session_secs(&self) -> Option<i64> {
        let sessions = self.sessions.read().await;
        let done: Vec<i64> = sessions
            .iter()
            .filter_map(|s| s.end_time.map(|end| (end - s.start_time).num_seconds()))
            .collect();
        if done.is_empty() {
            None
        } else {
            Some(done.iter().sum::<i64>() / done.len() as i64)
        }
    }
}

/// Shared filter applied by `/system/reservations`.
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationFilter {
    pub device_id: Option<String>,
    pub user_id: Option<String>,
    pub status: Option<ReservationStatus>,
}

impl ReservationFilter {
    pub fn matches(&self, r: &Reservation) -> bool {
        self.device_id.as_ref().is_none_or(|d| &r.device_id == d)
            && self.user_id.as_ref().is_none_or(|u| &r.user_id == u)
            && self.status.is_none_or(|s| r.status == s)
    }
}

#[cfg(test)]
#[path = "reservation_tests.rs"]
mod tests;
