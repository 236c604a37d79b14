use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    models::{DesignStatus, ImageSet, Inquiry, NewInquiry, SavedDesign},
    store::{Authenticator, DesignStore, ObjectStore, StoreError},
};

/// Process-local backend used for local development and tests. Nothing
/// survives a restart.
#[derive(Default)]
pub struct MemoryBackend {
    designs: RwLock<HashMap<Uuid, SavedDesign>>,
    inquiries: RwLock<HashMap<Uuid, Inquiry>>,
    objects: RwLock<HashMap<String, (Bytes, String)>>,
    sessions: RwLock<HashMap<String, Uuid>>,
}

/// Designs and access tokens loaded into local mode at startup
/// (`LOCAL_SEED_FILE`).
#[derive(Debug, Default, Deserialize)]
pub struct LocalSeed {
    /// Access token → user id.
    #[serde(default)]
    pub sessions: HashMap<String, Uuid>,
    #[serde(default)]
    pub designs: Vec<SavedDesign>,
}

impl MemoryBackend {
    pub fn insert_design(&self, design: SavedDesign) {
        self.designs.write().insert(design.id, design);
    }

    pub fn add_session(&self, access_token: &str, user_id: Uuid) {
        self.sessions.write().insert(access_token.to_string(), user_id);
    }

    pub fn seed(&self, seed: LocalSeed) {
        for (token, user_id) in &seed.sessions {
            self.add_session(token, *user_id);
        }
        for design in seed.designs {
            self.insert_design(design);
        }
    }
}

#[cfg(test)]
impl MemoryBackend {
    pub fn design(&self, id: Uuid) -> Option<SavedDesign> {
        self.designs.read().get(&id).cloned()
    }

    pub fn inquiries_for(&self, design_id: Uuid) -> Vec<Inquiry> {
        self.inquiries
            .read()
            .values()
            .filter(|inquiry| inquiry.fields.design_id == design_id)
            .cloned()
            .collect()
    }

    pub fn object(&self, key: &str) -> Option<(Bytes, String)> {
        self.objects.read().get(key).cloned()
    }

    pub fn object_keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String, StoreError> {
        self.objects
            .write()
            .insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(format!("memory://renders/{key}"))
    }
}

#[async_trait]
impl DesignStore for MemoryBackend {
    async fn get_design(&self, id: Uuid) -> Result<Option<SavedDesign>, StoreError> {
        Ok(self.designs.read().get(&id).cloned())
    }

    async fn create_inquiry(&self, inquiry: &NewInquiry) -> Result<Inquiry, StoreError> {
        let inquiry = Inquiry {
            id: Uuid::new_v4(),
            fields: inquiry.clone(),
            created_at: Utc::now(),
        };
        self.inquiries.write().insert(inquiry.id, inquiry.clone());
        Ok(inquiry)
    }

    async fn delete_inquiry(&self, id: Uuid) -> Result<(), StoreError> {
        self.inquiries.write().remove(&id);
        Ok(())
    }

    async fn mark_submitted(
        &self,
        design_id: Uuid,
        inquiry_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut guard = self.designs.write();
        let Some(design) = guard.get_mut(&design_id) else {
            return Ok(false);
        };
        if !matches!(design.status, DesignStatus::Draft | DesignStatus::Saved) {
            return Ok(false);
        }
        design.status = DesignStatus::SubmittedForCad;
        design.inquiry_id = Some(inquiry_id);
        design.submitted_at = Some(at);
        design.updated_at = at;
        Ok(true)
    }

    async fn set_design_images(&self, design_id: Uuid, images: &ImageSet) -> Result<bool, StoreError> {
        let mut guard = self.designs.write();
        let Some(design) = guard.get_mut(&design_id) else {
            return Ok(false);
        };
        design.hero_image_url = images.hero.clone();
        design.side_image_url = images.side.clone();
        design.top_image_url = images.top.clone();
        design.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl Authenticator for MemoryBackend {
    async fn user_id(&self, access_token: &str) -> Result<Option<Uuid>, StoreError> {
        Ok(self.sessions.read().get(access_token).copied())
    }
}
