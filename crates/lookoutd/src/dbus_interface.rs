use crate::config::Config;
use crate::notify::Notification;
use crate::pipeline::{DetectionEvent, DetectionPipeline, IngestError};
use crate::store::DetectionUpdate;
use chrono::{DateTime, TimeDelta, Utc};
use lookout_core::SweepPolicy;
use std::sync::Arc;
use tokio::sync::broadcast;
use zbus::interface;
use zbus::object_server::SignalEmitter;

pub const BUS_NAME: &str = "org.freedesktop.Lookout1";
pub const OBJECT_PATH: &str = "/org/freedesktop/Lookout1";

/// D-Bus interface for the Lookout detection daemon.
///
/// Bus name: org.freedesktop.Lookout1
/// Object path: /org/freedesktop/Lookout1
pub struct LookoutService {
    pipeline: Arc<DetectionPipeline>,
    db_path: String,
    started_at: DateTime<Utc>,
}

impl LookoutService {
    pub fn new(pipeline: Arc<DetectionPipeline>, config: &Config) -> Self {
        Self {
            pipeline,
            db_path: config.db_path.display().to_string(),
            started_at: Utc::now(),
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Empty string means "now"; anything else must be RFC 3339.
fn parse_timestamp(raw: &str) -> zbus::fdo::Result<DateTime<Utc>> {
    if raw.trim().is_empty() {
        return Ok(Utc::now());
    }
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("timestamp {raw:?}: {e}")))
}

fn sweep_policy(max_age_secs: u64, max_entries: u32) -> SweepPolicy {
    // TimeDelta holds milliseconds in an i64.
    let max_age_secs = max_age_secs.min((i64::MAX / 1000) as u64) as i64;
    SweepPolicy {
        max_age: (max_age_secs > 0).then(|| TimeDelta::seconds(max_age_secs)),
        max_entries_per_user: (max_entries > 0).then_some(max_entries as usize),
    }
}

#[interface(name = "org.freedesktop.Lookout1")]
impl LookoutService {
    /// Ingest an unknown-person detection. Returns the outcome as JSON.
    ///
    /// An empty `encoding` means the recognizer produced none; an empty
    /// `category` means uncategorized; an empty `timestamp` means now.
    async fn report_detection(
        &self,
        user: &str,
        encoding: Vec<f64>,
        image_ref: &str,
        category: &str,
        timestamp: &str,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(user, dims = encoding.len(), image_ref, "detection reported");

        let event = DetectionEvent {
            user_id: user.to_string(),
            encoding: (!encoding.is_empty())
                .then(|| encoding.into_iter().map(|v| v as f32).collect()),
            image_ref: image_ref.to_string(),
            category: non_empty(category),
            timestamp: parse_timestamp(timestamp)?,
        };

        let outcome = self.pipeline.ingest(event).await.map_err(|e| match e {
            IngestError::MissingField(_) => zbus::fdo::Error::InvalidArgs(e.to_string()),
            IngestError::Store(_) => zbus::fdo::Error::Failed(e.to_string()),
        })?;
        to_json(&outcome)
    }

    /// List the user's most recent detections as a JSON array.
    async fn list_detections(&self, user: &str) -> zbus::fdo::Result<String> {
        tracing::info!(user, "list_detections requested");
        let records = self
            .pipeline
            .list(user)
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        to_json(&records)
    }

    /// Assign a detection to a family member and/or category.
    async fn assign_detection(
        &self,
        user: &str,
        id: &str,
        assign_to: &str,
        category: &str,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(user, id, "assign_detection requested");
        let update = DetectionUpdate {
            assigned_to: non_empty(assign_to),
            category: non_empty(category),
            is_processed: true,
        };
        let record = self
            .pipeline
            .assign(user, id, update)
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?
            .ok_or_else(|| zbus::fdo::Error::InvalidArgs(format!("no detection with id {id}")))?;
        to_json(&record)
    }

    /// Mark a detection processed, keeping its assignment and category.
    async fn mark_processed(&self, user: &str, id: &str) -> zbus::fdo::Result<String> {
        tracing::info!(user, id, "mark_processed requested");
        let record = self
            .pipeline
            .mark_processed(user, id)
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?
            .ok_or_else(|| zbus::fdo::Error::InvalidArgs(format!("no detection with id {id}")))?;
        to_json(&record)
    }

    /// Delete a detection record. Returns false if it did not exist.
    async fn delete_detection(&self, user: &str, id: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(user, id, "delete_detection requested");
        self.pipeline
            .delete(user, id)
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Forget every cached face for the user. Returns entries removed.
    async fn clear_cache(&self, user: &str) -> u32 {
        let removed = self.pipeline.clear_cache(user);
        u32::try_from(removed).unwrap_or(u32::MAX)
    }

    /// Per-user cache diagnostics as JSON.
    async fn cache_status(&self, user: &str) -> zbus::fdo::Result<String> {
        to_json(&self.pipeline.cache_status(user))
    }

    /// Evict stale cache entries. Zero disables the corresponding bound.
    async fn sweep_cache(&self, max_age_secs: u64, max_entries: u32) -> zbus::fdo::Result<String> {
        tracing::info!(max_age_secs, max_entries, "sweep_cache requested");
        to_json(&self.pipeline.sweep_cache(sweep_policy(max_age_secs, max_entries)))
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let gate = self.pipeline.gate();
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "started_at": self.started_at,
            "db_path": self.db_path,
            "cooldown_secs": gate.cooldown().num_seconds(),
            "similarity_threshold": gate.threshold(),
            "cached_users": gate.cache().users().len(),
            "cached_faces": gate.cache().len(),
        })
        .to_string())
    }

    /// Emitted for every published notification.
    #[zbus(signal)]
    async fn notification(
        emitter: &SignalEmitter<'_>,
        scope: &str,
        event: &str,
        payload: &str,
    ) -> zbus::Result<()>;
}

/// Relay in-process notifications onto the bus as `Notification` signals.
pub async fn forward_notifications(
    conn: zbus::Connection,
    mut rx: broadcast::Receiver<Notification>,
) {
    let emitter = match SignalEmitter::new(&conn, OBJECT_PATH) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "cannot emit notifications; forwarder exiting");
            return;
        }
    };

    loop {
        match rx.recv().await {
            Ok(n) => {
                let payload = n.payload.to_string();
                if let Err(e) =
                    LookoutService::notification(&emitter, &n.scope, &n.event, &payload).await
                {
                    tracing::warn!(scope = %n.scope, event = %n.event, error = %e, "signal emit failed");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "notification forwarder lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::info!("notification forwarder exiting");
}
