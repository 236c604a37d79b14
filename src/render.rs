use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Duration,
};

use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    error::PipelineError,
    gemini::{GeminiError, ImageModel, InlineImage},
    models::{DesignConcept, ImageSet, View},
    prompts,
    store::ObjectStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    Storage,
    /// Upload failed or no store configured; `url` is a `data:` URL.
    Inline,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedImage {
    pub url: String,
    pub source: ImageSource,
}

/// Settled outcome of every requested view.
#[derive(Debug, Default)]
pub struct RenderReport {
    results: BTreeMap<View, Result<RenderedImage, PipelineError>>,
}

impl RenderReport {
    pub fn get(&self, view: View) -> Option<&Result<RenderedImage, PipelineError>> {
        self.results.get(&view)
    }

    pub fn url(&self, view: View) -> Option<&str> {
        match self.results.get(&view) {
            Some(Ok(image)) => Some(image.url.as_str()),
            _ => None,
        }
    }

    pub fn succeeded(&self) -> Vec<View> {
        self.results
            .iter()
            .filter(|(_, result)| result.is_ok())
            .map(|(view, _)| *view)
            .collect()
    }

    pub fn failures(&self) -> BTreeMap<View, String> {
        self.results
            .iter()
            .filter_map(|(view, result)| result.as_ref().err().map(|e| (*view, e.to_string())))
            .collect()
    }

    /// Requested slots filled with URLs, failed slots left empty.
    pub fn image_set(&self) -> ImageSet {
        let mut images = ImageSet::default();
        for view in self.results.keys() {
            images.set(*view, self.url(*view).map(str::to_string));
        }
        images
    }

    /// Keeps a partial result as long as one view rendered; otherwise the
    /// first failure becomes the request error.
    pub fn into_partial(self) -> Result<RenderReport, PipelineError> {
        if self.results.is_empty() || !self.succeeded().is_empty() {
            return Ok(self);
        }
        Err(self.into_first_error())
    }

    /// Failed views stay scoped to their slot. Only when nothing rendered
    /// and a view hit a gateway signal does that signal fail the request.
    pub fn into_view_scoped(mut self) -> Result<RenderReport, PipelineError> {
        if !self.succeeded().is_empty() {
            return Ok(self);
        }
        let signalled = self.results.iter().find_map(|(view, result)| match result {
            Err(e) if e.is_gateway_signal() => Some(*view),
            _ => None,
        });
        match signalled.and_then(|view| self.results.remove(&view)) {
            Some(Err(e)) => Err(e),
            _ => Ok(self),
        }
    }

    /// Every requested view must have rendered.
    pub fn into_complete(self) -> Result<ImageSet, PipelineError> {
        if self.results.values().all(Result::is_ok) {
            return Ok(self.image_set());
        }
        Err(self.into_first_error())
    }

    fn into_first_error(self) -> PipelineError {
        self.results
            .into_values()
            .find_map(Result::err)
            .unwrap_or_else(|| PipelineError::Internal("no render failure recorded".into()))
    }
}

pub struct ImageRenderer {
    model: Arc<dyn ImageModel>,
    store: Option<Arc<dyn ObjectStore>>,
    timeout: Duration,
}

impl ImageRenderer {
    pub fn new(model: Arc<dyn ImageModel>, store: Option<Arc<dyn ObjectStore>>, timeout: Duration) -> Self {
        Self { model, store, timeout }
    }

    /// Renders each distinct view concurrently and waits for all of them.
    pub async fn render(&self, concept: &DesignConcept, views: &[View]) -> RenderReport {
        let views: BTreeSet<View> = views.iter().copied().collect();
        info!(concept = %concept.name, views = ?views, "🎨 Rendering views");

        let outcomes = join_all(views.into_iter().map(|view| async move {
            let outcome = self.render_view(concept, view).await;
            match &outcome {
                Ok(image) => info!(concept = %concept.name, %view, source = ?image.source, "✅ View rendered"),
                Err(e) => error!(concept = %concept.name, %view, error = %e, "❌ View failed"),
            }
            (view, outcome)
        }))
        .await;

        RenderReport { results: outcomes.into_iter().collect() }
    }

    async fn render_view(&self, concept: &DesignConcept, view: View) -> Result<RenderedImage, PipelineError> {
        let prompt = prompts::view_prompt(concept, view);
        let image = match tokio::time::timeout(self.timeout, self.model.generate_image(&prompt)).await {
            Err(_) => return Err(PipelineError::Timeout(self.timeout)),
            Ok(Err(GeminiError::NoImage)) => return Err(PipelineError::EmptyResult { view }),
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(image)) if image.data.trim().is_empty() => {
                return Err(PipelineError::EmptyResult { view })
            }
            Ok(Ok(image)) => image,
        };
        Ok(self.persist(concept, view, image).await)
    }

    async fn persist(&self, concept: &DesignConcept, view: View, image: InlineImage) -> RenderedImage {
        let Some(store) = &self.store else {
            return inline(&image);
        };

        let bytes = match base64::engine::general_purpose::STANDARD.decode(image.data.trim()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%view, error = %e, "Image payload is not valid base64; returning it inline");
                return inline(&image);
            }
        };

        let (content_type, extension) = match image::guess_format(&bytes) {
            Ok(format) => (
                format.to_mime_type().to_string(),
                format.extensions_str().first().copied().unwrap_or("png"),
            ),
            Err(_) => (image.mime_type.clone(), extension_for(&image.mime_type)),
        };
        let key = object_key(&concept.name, view, Utc::now(), extension);

        match store.put(&key, Bytes::from(bytes), &content_type).await {
            Ok(url) => RenderedImage { url, source: ImageSource::Storage },
            Err(e) => {
                warn!(%view, %key, error = %e, "⚠️ Upload failed; falling back to inline image data");
                inline(&image)
            }
        }
    }
}

fn inline(image: &InlineImage) -> RenderedImage {
    RenderedImage { url: image.data_url(), source: ImageSource::Inline }
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}

/// Lowercase ASCII slug, at most 48 characters, never empty.
pub fn sanitize_name(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug: String = slug.trim_end_matches('-').chars().take(48).collect();
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() { "design".to_string() } else { slug.to_string() }
}

/// `ai-designs/<slug>-<view>-<unix-ms>-<random>.<ext>`; unique per call.
pub fn object_key(name: &str, view: View, at: DateTime<Utc>, extension: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "ai-designs/{}-{}-{}-{}.{}",
        sanitize_name(name),
        view,
        at.timestamp_millis(),
        &suffix[..8],
        extension
    )
}
