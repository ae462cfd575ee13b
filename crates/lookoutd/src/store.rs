//! Detection record persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A persisted unknown-person detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub id: String,
    pub user_id: String,
    pub image_ref: String,
    pub category: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Family member (or other label) the operator assigned this face to.
    pub assigned_to: Option<String>,
    pub is_processed: bool,
}

/// Fields supplied when a detection is first recorded.
#[derive(Debug, Clone)]
pub struct NewDetection {
    pub user_id: String,
    pub image_ref: String,
    pub category: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Classification applied by an operator. Overwrites all three fields.
#[derive(Debug, Clone, Default)]
pub struct DetectionUpdate {
    pub assigned_to: Option<String>,
    pub category: Option<String>,
    pub is_processed: bool,
}

/// Backing store for detection records.
#[async_trait]
pub trait DetectionStore: Send + Sync {
    async fn create_record(&self, new: NewDetection) -> Result<DetectionRecord, StoreError>;

    /// Newest first, at most `limit` records.
    async fn list_by_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<DetectionRecord>, StoreError>;

    /// Returns `None` if no record has this id.
    async fn update_by_id(
        &self,
        id: &str,
        update: DetectionUpdate,
    ) -> Result<Option<DetectionRecord>, StoreError>;

    /// Set `is_processed` and leave the classification untouched. Returns
    /// `None` if no record has this id.
    async fn mark_processed(&self, id: &str) -> Result<Option<DetectionRecord>, StoreError>;

    /// Returns `false` if no record has this id.
    async fn delete_by_id(&self, id: &str) -> Result<bool, StoreError>;
}

pub(crate) fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
