//! Detection ingest: admission, persistence, record-id backfill and alerting.
//!
//! The admission gate runs synchronously and releases its per-user lock
//! before any store or notifier call is made.

use crate::notify::{Notification, Notifier, EVENT_ADMITTED, EVENT_CLASSIFIED, EVENT_DELETED};
use crate::store::{DetectionRecord, DetectionStore, DetectionUpdate, NewDetection, StoreError};
use chrono::{DateTime, Utc};
use lookout_core::{
    AdmissionDecision, AdmissionGate, CacheStatus, Encoding, RecordRef, SweepPolicy, SweepReport,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("failed to persist detection: {0}")]
    Store(#[from] StoreError),
}

/// An "unknown person detected" event from the recognition service.
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub user_id: String,
    /// `None` when the recognizer could not produce an encoding.
    pub encoding: Option<Encoding>,
    pub image_ref: String,
    pub category: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// What happened to an ingested event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// Same face seen within the cooldown; nothing stored or sent.
    Suppressed { duplicate_of: Option<RecordRef> },
    /// Stored and alerted. `new_person` is false for a returning face.
    Admitted {
        record: DetectionRecord,
        new_person: bool,
    },
}

pub struct DetectionPipeline {
    gate: Arc<AdmissionGate>,
    store: Arc<dyn DetectionStore>,
    notifier: Arc<dyn Notifier>,
    list_limit: usize,
}

impl DetectionPipeline {
    pub fn new(
        gate: Arc<AdmissionGate>,
        store: Arc<dyn DetectionStore>,
        notifier: Arc<dyn Notifier>,
        list_limit: usize,
    ) -> Self {
        Self {
            gate,
            store,
            notifier,
            list_limit,
        }
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Run one detection through the gate and, if admitted, persist and
    /// announce it.
    ///
    /// A store failure is returned to the caller but the cache entry the
    /// gate reserved is kept, so an immediate retry is not re-alerted as a
    /// brand-new face.
    pub async fn ingest(&self, event: DetectionEvent) -> Result<IngestOutcome, IngestError> {
        if event.user_id.trim().is_empty() {
            return Err(IngestError::MissingField("user_id"));
        }
        if event.image_ref.trim().is_empty() {
            return Err(IngestError::MissingField("image_ref"));
        }

        let decision = match &event.encoding {
            Some(encoding) => self.gate.admit(&event.user_id, encoding, event.timestamp),
            None => {
                tracing::debug!(user = %event.user_id, "detection without encoding; bypassing cache");
                AdmissionDecision::uncached()
            }
        };

        if !decision.should_process {
            tracing::info!(
                user = %event.user_id,
                duplicate_of = ?decision.duplicate_of,
                "duplicate detection suppressed"
            );
            return Ok(IngestOutcome::Suppressed {
                duplicate_of: decision.duplicate_of,
            });
        }

        let record = self
            .store
            .create_record(NewDetection {
                user_id: event.user_id.clone(),
                image_ref: event.image_ref,
                category: event.category,
                timestamp: event.timestamp,
            })
            .await
            .map_err(|e| {
                tracing::error!(
                    user = %event.user_id,
                    error = %e,
                    "detection admitted but not persisted; cache entry retained"
                );
                e
            })?;

        if let Some(ticket) = decision.ticket {
            self.gate.resolve_record(&event.user_id, ticket, &record.id);
        }

        tracing::info!(
            user = %record.user_id,
            record_id = %record.id,
            new_person = decision.new_person,
            "detection admitted"
        );

        self.announce(Notification::for_user(
            &record.user_id,
            EVENT_ADMITTED,
            serde_json::json!({
                "record_id": record.id,
                "image_ref": record.image_ref,
                "timestamp": record.timestamp,
                "category": record.category,
                "new_person": decision.new_person,
            }),
        ));

        Ok(IngestOutcome::Admitted {
            record,
            new_person: decision.new_person,
        })
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<DetectionRecord>, StoreError> {
        self.store.list_by_user(user_id, self.list_limit).await
    }

    /// Classify a detection. Returns `None` if the record does not exist.
    pub async fn assign(
        &self,
        user_id: &str,
        record_id: &str,
        update: DetectionUpdate,
    ) -> Result<Option<DetectionRecord>, StoreError> {
        let Some(record) = self.store.update_by_id(record_id, update).await? else {
            return Ok(None);
        };
        tracing::info!(
            user = user_id,
            owner = %record.user_id,
            record_id,
            assigned_to = ?record.assigned_to,
            "detection classified"
        );

        let payload = serde_json::to_value(&record).unwrap_or(serde_json::Value::Null);
        self.announce(Notification::for_user(&record.user_id, EVENT_CLASSIFIED, payload));
        Ok(Some(record))
    }

    /// Acknowledge a detection without changing its classification.
    /// Returns `None` if the record does not exist.
    pub async fn mark_processed(
        &self,
        user_id: &str,
        record_id: &str,
    ) -> Result<Option<DetectionRecord>, StoreError> {
        let record = self.store.mark_processed(record_id).await?;
        if record.is_some() {
            tracing::info!(user = user_id, record_id, "detection marked processed");
        }
        Ok(record)
    }

    /// Delete a detection. Returns `false` if the record does not exist.
    pub async fn delete(&self, user_id: &str, record_id: &str) -> Result<bool, StoreError> {
        if !self.store.delete_by_id(record_id).await? {
            return Ok(false);
        }
        tracing::info!(user = user_id, record_id, "detection deleted");
        self.announce(Notification::for_user(
            user_id,
            EVENT_DELETED,
            serde_json::json!({ "record_id": record_id }),
        ));
        Ok(true)
    }

    pub fn clear_cache(&self, user_id: &str) -> usize {
        self.gate.clear(user_id)
    }

    pub fn cache_status(&self, user_id: &str) -> CacheStatus {
        self.gate.status(user_id, Utc::now())
    }

    pub fn sweep_cache(&self, policy: SweepPolicy) -> SweepReport {
        self.gate.sweep(Utc::now(), policy)
    }

    // Delivery failures never undo a stored record.
    fn announce(&self, notification: Notification) {
        let event = notification.event.clone();
        if let Err(e) = self.notifier.publish(notification) {
            tracing::warn!(event = %event, error = %e, "notification not delivered");
        }
    }
}
