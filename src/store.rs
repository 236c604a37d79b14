use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ImageSet, Inquiry, NewInquiry, SavedDesign};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request to backing store failed: {0}")]
    Transport(String),
    #[error("backing store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response from backing store: {0}")]
    Decode(String),
}

/// Durable object storage for rendered images.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` under `key` and returns the public URL.
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String, StoreError>;
}

/// Relational store for saved designs and the inquiries created from them.
#[async_trait]
pub trait DesignStore: Send + Sync {
    async fn get_design(&self, id: Uuid) -> Result<Option<SavedDesign>, StoreError>;

    async fn create_inquiry(&self, inquiry: &NewInquiry) -> Result<Inquiry, StoreError>;

    async fn delete_inquiry(&self, id: Uuid) -> Result<(), StoreError>;

    /// Moves a `draft`/`saved` design to `submitted_for_cad` and links the
    /// inquiry. Returns `false` when the design was not in a submittable state
    /// at write time.
    async fn mark_submitted(
        &self,
        design_id: Uuid,
        inquiry_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Returns `false` when no design row has this id.
    async fn set_design_images(&self, design_id: Uuid, images: &ImageSet) -> Result<bool, StoreError>;
}

/// Resolves a bearer access token to the user it was issued for.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn user_id(&self, access_token: &str) -> Result<Option<Uuid>, StoreError>;
}
