//! Fixtures and scripted model doubles shared by unit tests.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    gemini::{GeminiError, ImageModel, InlineImage, TextModel, TextRequest},
    models::{DesignConcept, DesignInputs, DesignStatus, FlowType, SavedDesign, View},
    prompts,
};

pub fn concept_json(name: &str) -> Value {
    json!({
        "name": name,
        "overview": "A platinum oval solitaire with a whisper-thin pavé band.",
        "metal": "Platinum 950",
        "center_stone": { "shape": "oval", "size_mm": "9.0 x 7.0", "type": "lab-grown diamond", "approx_ct": "1.5" },
        "band": { "width_mm": "1.8", "style": "knife-edge", "pave": "half pavé", "shoulders": "gently tapered" },
        "setting_style": "four-claw cathedral",
        "prongs": "four claw prongs",
        "accent_stones": "0.15 ctw melee diamonds",
        "gallery_details": "hidden halo with open scrollwork",
        "manufacturing_notes": "Cast in platinum, hand-set pavé, 1.3 mm minimum shank thickness."
    })
}

pub fn concept(name: &str) -> DesignConcept {
    serde_json::from_value(concept_json(name)).expect("fixture concept")
}

pub fn concepts_array(names: &[&str]) -> String {
    Value::Array(names.iter().map(|n| concept_json(n)).collect()).to_string()
}

pub fn saved_design(user_id: Uuid, status: DesignStatus) -> SavedDesign {
    let now = Utc::now();
    SavedDesign {
        id: Uuid::new_v4(),
        user_id,
        name: "Aurelia".into(),
        flow_type: FlowType::Engagement,
        status,
        concept: concept("Aurelia"),
        form_inputs: DesignInputs {
            metal_preference: Some("platinum".into()),
            budget: Some("$5,000-$10,000".into()),
            ..Default::default()
        },
        hero_image_url: Some("https://cdn.test/hero.png".into()),
        side_image_url: Some("https://cdn.test/side.png".into()),
        top_image_url: Some("https://cdn.test/top.png".into()),
        inquiry_id: None,
        submitted_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// Returns queued responses in order and records every request.
#[derive(Default)]
pub struct ScriptedTextModel {
    responses: Mutex<Vec<Result<String, GeminiError>>>,
    hang: bool,
    pub requests: Mutex<Vec<TextRequest>>,
}

impl ScriptedTextModel {
    pub fn new(responses: Vec<Result<String, GeminiError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            ..Default::default()
        }
    }

    /// Never answers.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Default::default()
        }
    }

    pub fn replying(text: impl Into<String>) -> Self {
        Self::new(vec![Ok(text.into())])
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl TextModel for ScriptedTextModel {
    async fn generate_text(&self, request: &TextRequest) -> Result<String, GeminiError> {
        self.requests.lock().push(request.clone());
        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let mut responses = self.responses.lock();
        if responses.is_empty() {
            return Err(GeminiError::Http("no scripted response left".into()));
        }
        responses.remove(0)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ViewFailure {
    RateLimited,
    QuotaExhausted,
    NoImage,
    Hang,
}

/// Produces a small PNG per call; failures are scripted per view or per
/// concept name.
#[derive(Default)]
pub struct ScriptedImageModel {
    failures: HashMap<View, ViewFailure>,
    concept_failures: HashMap<String, ViewFailure>,
    calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedImageModel {
    pub fn failing(failures: &[(View, ViewFailure)]) -> Self {
        Self {
            failures: failures.iter().copied().collect(),
            ..Default::default()
        }
    }

    /// Every view of the named concept fails with `failure`.
    pub fn failing_concept(name: &str, failure: ViewFailure) -> Self {
        Self {
            concept_failures: HashMap::from([(name.to_string(), failure)]),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn png_bytes(seed: usize) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&seed.to_be_bytes());
    bytes
}

#[async_trait]
impl ImageModel for ScriptedImageModel {
    async fn generate_image(&self, prompt: &str) -> Result<InlineImage, GeminiError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        let view = View::ALL
            .into_iter()
            .find(|view| prompt.contains(prompts::camera_label(*view)));

        let by_concept = self
            .concept_failures
            .iter()
            .find(|(name, _)| prompt.contains(&format!(" of a custom {name} jewelry design")))
            .map(|(_, failure)| failure);

        match by_concept.or_else(|| view.and_then(|v| self.failures.get(&v))) {
            Some(ViewFailure::RateLimited) => Err(GeminiError::RateLimited),
            Some(ViewFailure::QuotaExhausted) => Err(GeminiError::QuotaExhausted("no credits".into())),
            Some(ViewFailure::NoImage) => Err(GeminiError::NoImage),
            Some(ViewFailure::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(GeminiError::NoImage)
            }
            None => Ok(InlineImage {
                mime_type: "image/png".into(),
                data: base64::engine::general_purpose::STANDARD.encode(png_bytes(call)),
            }),
        }
    }
}
