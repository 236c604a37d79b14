//! Supabase backend: Storage for renders, PostgREST for design and inquiry
//! rows, GoTrue for bearer-token verification. Every call uses the
//! service-role key; ownership is enforced by the callers.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    config::SupabaseConfig,
    models::{ImageSet, Inquiry, NewInquiry, SavedDesign},
    store::{Authenticator, DesignStore, ObjectStore, StoreError},
};

pub struct SupabaseClient {
    client: Client,
    config: SupabaseConfig,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: Uuid,
}

impl SupabaseClient {
    pub fn new(config: SupabaseConfig) -> Self {
        Self { client: Client::new(), config }
    }

    fn service(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.config.service_role_key)
            .bearer_auth(&self.config.service_role_key)
    }

    fn table_url(&self, table: &str, filter: &str) -> String {
        format!("{}/rest/v1/{}?{}", self.config.url, table, filter)
    }

    pub fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.config.url, self.config.storage_bucket, key
        )
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, StoreError> {
        let response = builder
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        error!(%status, "❌ Supabase error response: {}", body);
        Err(StoreError::Status { status: status.as_u16(), body })
    }

    async fn rows<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<Vec<T>, StoreError> {
        let text = self
            .send(builder)
            .await?
            .text()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| {
            StoreError::Decode(format!("{}: {}", e, text.chars().take(300).collect::<String>()))
        })
    }
}

#[async_trait]
impl ObjectStore for SupabaseClient {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String, StoreError> {
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.config.url, self.config.storage_bucket, key
        );
        let size = bytes.len();
        let request = self
            .service(self.client.post(&url))
            .header(header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes);
        self.send(request).await?;
        info!(key, size, "☁️ Uploaded render");
        Ok(self.public_url(key))
    }
}

#[async_trait]
impl DesignStore for SupabaseClient {
    async fn get_design(&self, id: Uuid) -> Result<Option<SavedDesign>, StoreError> {
        let url = self.table_url(&self.config.designs_table, &format!("id=eq.{id}&select=*"));
        let rows: Vec<SavedDesign> = self.rows(self.service(self.client.get(&url))).await?;
        debug!(%id, found = !rows.is_empty(), "Design lookup");
        Ok(rows.into_iter().next())
    }

    async fn create_inquiry(&self, inquiry: &NewInquiry) -> Result<Inquiry, StoreError> {
        let url = format!("{}/rest/v1/{}", self.config.url, self.config.inquiries_table);
        let request = self
            .service(self.client.post(&url))
            .header("Prefer", "return=representation")
            .json(inquiry);
        self.rows::<Inquiry>(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("insert returned no inquiry row".into()))
    }

    async fn delete_inquiry(&self, id: Uuid) -> Result<(), StoreError> {
        let url = self.table_url(&self.config.inquiries_table, &format!("id=eq.{id}"));
        self.send(self.service(self.client.delete(&url))).await?;
        Ok(())
    }

    async fn mark_submitted(
        &self,
        design_id: Uuid,
        inquiry_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // The status filter makes the transition conditional on the row state
        // at write time.
        let url = self.table_url(
            &self.config.designs_table,
            &format!("id=eq.{design_id}&status=in.(draft,saved)"),
        );
        let request = self
            .service(self.client.patch(&url))
            .header("Prefer", "return=representation")
            .json(&json!({
                "status": "submitted_for_cad",
                "inquiry_id": inquiry_id,
                "submitted_at": at,
                "updated_at": at,
            }));
        let rows: Vec<serde_json::Value> = self.rows(request).await?;
        Ok(!rows.is_empty())
    }

    async fn set_design_images(&self, design_id: Uuid, images: &ImageSet) -> Result<bool, StoreError> {
        let url = self.table_url(&self.config.designs_table, &format!("id=eq.{design_id}"));
        let request = self
            .service(self.client.patch(&url))
            .header("Prefer", "return=representation")
            .json(&json!({
                "hero_image_url": images.hero,
                "side_image_url": images.side,
                "top_image_url": images.top,
                "updated_at": Utc::now(),
            }));
        let rows: Vec<serde_json::Value> = self.rows(request).await?;
        Ok(!rows.is_empty())
    }
}

#[async_trait]
impl Authenticator for SupabaseClient {
    async fn user_id(&self, access_token: &str) -> Result<Option<Uuid>, StoreError> {
        let url = format!("{}/auth/v1/user", self.config.url);
        let response = self
            .client
            .get(&url)
            .header("apikey", &self.config.service_role_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Ok(None),
            s if !s.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(StoreError::Status { status: s.as_u16(), body });
            }
            _ => {}
        }
        let user: AuthUser = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(Some(user.id))
    }
}
