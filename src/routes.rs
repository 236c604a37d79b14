use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    concepts::{ConceptRequest, DEFAULT_CONCEPTS, REGENERATE_CONCEPTS},
    error::{ApiJson, PipelineError},
    gemini::InlineImage,
    models::{
        ConceptsResponse, DesignConceptInput, DesignMode, FlowType, ImageSet, RenderImagesRequest,
        RenderImagesResponse, RequestType, RingConceptsRequest, RingConceptsResponse, SavedDesign, SubmitRequest,
        SubmitResponse, SurpriseRequest, SurpriseResponse, View,
    },
    pdf::spec_sheet_pdf,
    pipeline::DesignPipeline,
    store::{Authenticator, DesignStore},
    submission::SubmissionBridge,
    surprise,
};

/// Reference images arrive inline as base64.
const MAX_BODY_BYTES: usize = 12 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<DesignPipeline>,
    pub designs: Arc<dyn DesignStore>,
    pub auth: Arc<dyn Authenticator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/generate-ring-concepts", post(generate_ring_concepts))
        .route("/api/ai-generate-design-concepts", post(generate_design_concepts))
        .route("/api/ai-render-design-images", post(render_design_images))
        .route("/api/ai-surprise-design", post(surprise_design))
        .route("/api/submit-design-for-cad", post(submit_design_for_cad))
        .route("/api/designs/:id/spec-sheet", get(export_spec_sheet))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

pub async fn generate_ring_concepts(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RingConceptsRequest>,
) -> Result<Json<RingConceptsResponse>, PipelineError> {
    if body.request_type == Some(RequestType::Refine) {
        let current = body
            .concept
            .ok_or_else(|| PipelineError::InvalidInput("concept is required for refine requests".into()))?;
        let instruction = body.refinement_instruction.unwrap_or_default();
        let views = body.views_to_regenerate.unwrap_or_else(View::default_refresh);

        info!(concept = %current.concept.name, ?views, "✏️ Refining concept");
        let refinement = state.pipeline.refine(&current, &instruction, &views).await?;
        return Ok(Json(RingConceptsResponse {
            success: true,
            concepts: vec![refinement.concept],
            refreshed_views: Some(refinement.refreshed_views),
            stale_views: Some(refinement.stale_views),
            failed_views: refinement.failed_views,
        }));
    }

    let request = ring_concept_request(body)?;
    info!(expected = request.expected_count(), "💍 Generating ring concepts");
    let concepts = state.pipeline.generate_rendered(&request).await?;
    info!(count = concepts.len(), "✅ Ring concepts ready");
    Ok(Json(RingConceptsResponse {
        success: true,
        concepts,
        refreshed_views: None,
        stale_views: None,
        // Reasons travel on each concept.
        failed_views: Default::default(),
    }))
}

/// Create, regenerate, surprise and image-to-design requests. Sampling
/// happens here, outside any await point.
fn ring_concept_request(body: RingConceptsRequest) -> Result<ConceptRequest, PipelineError> {
    let mut inputs = body.form_inputs.unwrap_or_default();

    if body.request_type == Some(RequestType::ImageToDesign) {
        let raw = body
            .reference_image
            .ok_or_else(|| PipelineError::InvalidInput("reference_image is required for image_to_design".into()))?;
        let preferences = body.style_preferences.unwrap_or(inputs);
        return Ok(ConceptRequest::FromImage {
            image: parse_reference_image(&raw)?,
            flow: body.mode.unwrap_or_else(|| preferences.inferred_flow()),
            preferences,
            count: body.num_concepts.unwrap_or(DEFAULT_CONCEPTS),
        });
    }

    if body.surprise_me {
        let flow = body.mode.unwrap_or_else(|| inputs.inferred_flow());
        let sample = surprise::sample(flow, &mut rand::thread_rng());
        inputs.fill_missing_from(&sample);
        return Ok(ConceptRequest::Create {
            inputs,
            flow,
            count: body.num_concepts.unwrap_or(sample.num_concepts),
            variation_of: None,
        });
    }

    let flow = body.mode.unwrap_or_else(|| inputs.inferred_flow());
    let (count, variation_of) = match body.regenerate_from {
        Some(previous) => (body.num_concepts.unwrap_or(REGENERATE_CONCEPTS), Some(previous)),
        None => (body.num_concepts.unwrap_or(DEFAULT_CONCEPTS), None),
    };
    Ok(ConceptRequest::Create { inputs, flow, count, variation_of })
}

/// Accepts a `data:` URL or bare base64; the bytes must be a real image.
fn parse_reference_image(raw: &str) -> Result<InlineImage, PipelineError> {
    let raw = raw.trim();
    let data = match raw.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, data)| data)
            .ok_or_else(|| PipelineError::InvalidInput("reference_image data URL must be base64".into()))?,
        None => raw,
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|_| PipelineError::InvalidInput("reference_image is not valid base64".into()))?;

    let format = image::guess_format(&bytes)
        .map_err(|_| PipelineError::InvalidInput("reference_image is not a recognised image".into()))?;
    match format {
        image::ImageFormat::Png | image::ImageFormat::Jpeg | image::ImageFormat::WebP | image::ImageFormat::Gif => {
            Ok(InlineImage { mime_type: format.to_mime_type().to_string(), data: data.to_string() })
        }
        other => Err(PipelineError::InvalidInput(format!(
            "reference_image format {other:?} is not supported"
        ))),
    }
}

pub async fn generate_design_concepts(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<DesignConceptInput>,
) -> Result<Json<ConceptsResponse>, PipelineError> {
    let request = design_concept_request(body);
    let concepts = state.pipeline.generator.generate(&request).await?;
    Ok(Json(ConceptsResponse { success: true, count: concepts.len(), concepts }))
}

fn design_concept_request(body: DesignConceptInput) -> ConceptRequest {
    let mut inputs = body.inputs;
    let (flow, default_count) = match body.mode {
        Some(DesignMode::Engagement) => (FlowType::Engagement, DEFAULT_CONCEPTS),
        Some(DesignMode::General) => (FlowType::General, DEFAULT_CONCEPTS),
        Some(DesignMode::Surprise) => {
            let flow = inputs.inferred_flow();
            let sample = surprise::sample(flow, &mut rand::thread_rng());
            inputs.fill_missing_from(&sample);
            (flow, sample.num_concepts)
        }
        None => (inputs.inferred_flow(), DEFAULT_CONCEPTS),
    };
    ConceptRequest::Create {
        inputs,
        flow,
        count: body.num_concepts.unwrap_or(default_count),
        variation_of: None,
    }
}

/// Rendering alone is open. Persisting onto `design_id` requires the
/// owner's bearer token, checked before any image call.
pub async fn render_design_images(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<RenderImagesRequest>,
) -> Result<Json<RenderImagesResponse>, PipelineError> {
    let target = match body.design_id {
        Some(design_id) => {
            let user_id = authenticated_user(state.auth.as_ref(), &headers).await?;
            Some(owned_design(state.designs.as_ref(), design_id, user_id).await?)
        }
        None => None,
    };

    let views = body.views.unwrap_or_else(|| View::ALL.to_vec());
    let report = state.pipeline.render(&body.concept_json, &views).await?;
    let images = report.image_set();

    if let Some(design) = target {
        persist_images(state.designs.as_ref(), &design, &images).await;
    }

    Ok(Json(RenderImagesResponse {
        success: true,
        hero_image_url: images.hero,
        side_image_url: images.side,
        top_image_url: images.top,
        failed_views: report.failures(),
    }))
}

/// Best effort: the render already succeeded, so a failed write is only logged.
async fn persist_images(designs: &dyn DesignStore, design: &SavedDesign, rendered: &ImageSet) {
    let design_id = design.id;
    let mut images = design.images();
    for view in View::ALL {
        if let Some(url) = rendered.get(view).filter(|u| !u.starts_with("data:")) {
            images.set(view, Some(url.to_string()));
        }
    }
    match designs.set_design_images(design_id, &images).await {
        Ok(true) => info!(%design_id, "💾 Render URLs saved on design"),
        Ok(false) => warn!(%design_id, "Design disappeared before render URLs were saved"),
        Err(e) => warn!(%design_id, error = %e, "⚠️ Failed to save render URLs on design"),
    }
}

pub async fn surprise_design(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SurpriseRequest>,
) -> Result<Json<SurpriseResponse>, PipelineError> {
    let sample = surprise::sample(body.mode, &mut rand::thread_rng());
    let design = state.pipeline.surprise(sample).await?;
    Ok(Json(SurpriseResponse {
        success: true,
        concept: design.concept,
        hero_image_url: design.images.hero.unwrap_or_default(),
        side_image_url: design.images.side.unwrap_or_default(),
        top_image_url: design.images.top.unwrap_or_default(),
        form_inputs: design.sample,
    }))
}

async fn authenticated_user(auth: &dyn Authenticator, headers: &HeaderMap) -> Result<Uuid, PipelineError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| PipelineError::Unauthorized("missing bearer token".into()))?;
    auth.user_id(token)
        .await?
        .ok_or_else(|| PipelineError::Unauthorized("invalid or expired token".into()))
}

async fn owned_design(designs: &dyn DesignStore, id: Uuid, user_id: Uuid) -> Result<SavedDesign, PipelineError> {
    let design = designs
        .get_design(id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("design {id} not found")))?;
    if design.user_id != user_id {
        return Err(PipelineError::Forbidden("design belongs to another user".into()));
    }
    Ok(design)
}

pub async fn submit_design_for_cad(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<SubmitRequest>,
) -> Result<Json<SubmitResponse>, PipelineError> {
    let user_id = authenticated_user(state.auth.as_ref(), &headers).await?;
    let inquiry = SubmissionBridge::new(state.designs.clone())
        .submit(body.design_id, user_id)
        .await?;
    Ok(Json(SubmitResponse { success: true, inquiry_id: inquiry.id }))
}

pub async fn export_spec_sheet(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, PipelineError> {
    let user_id = authenticated_user(state.auth.as_ref(), &headers).await?;
    let design = owned_design(state.designs.as_ref(), id, user_id).await?;

    let pdf = spec_sheet_pdf(&design)?;
    info!(%id, bytes = pdf.len(), "📄 Spec sheet exported");
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"design_{id}.pdf\""),
            ),
        ],
        pdf,
    ))
}
