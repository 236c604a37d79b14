//! Spec generation: one text-model call that must come back as validated
//! [`DesignConcept`]s or not at all.

use std::{sync::Arc, time::Duration};

use serde_json::Value;
use tracing::{error, info};

use crate::{
    error::PipelineError,
    gemini::{InlineImage, TextModel, TextRequest},
    models::{DesignConcept, DesignInputs, FlowType, View},
    prompts,
};

pub const DEFAULT_CONCEPTS: usize = 3;
pub const REGENERATE_CONCEPTS: usize = 2;
pub const MAX_CONCEPTS: usize = 6;

#[derive(Debug, Clone)]
pub enum ConceptRequest {
    Create {
        inputs: DesignInputs,
        flow: FlowType,
        count: usize,
        /// Earlier concept the new ones should riff on.
        variation_of: Option<DesignConcept>,
    },
    Refine {
        concept: DesignConcept,
        instruction: String,
        views: Vec<View>,
    },
    FromImage {
        image: InlineImage,
        preferences: DesignInputs,
        flow: FlowType,
        count: usize,
    },
}

impl ConceptRequest {
    pub fn expected_count(&self) -> usize {
        match self {
            ConceptRequest::Create { count, .. } | ConceptRequest::FromImage { count, .. } => *count,
            ConceptRequest::Refine { .. } => 1,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ConceptRequest::Create { variation_of: None, .. } => "create",
            ConceptRequest::Create { .. } => "regenerate",
            ConceptRequest::Refine { .. } => "refine",
            ConceptRequest::FromImage { .. } => "image_to_design",
        }
    }

    fn validate(&self) -> Result<(), PipelineError> {
        let count = self.expected_count();
        if !(1..=MAX_CONCEPTS).contains(&count) {
            return Err(PipelineError::InvalidInput(format!(
                "num_concepts must be between 1 and {MAX_CONCEPTS}, got {count}"
            )));
        }
        if let ConceptRequest::Refine { concept, instruction, views } = self {
            if instruction.trim().is_empty() {
                return Err(PipelineError::InvalidInput("refinement_instruction is required".into()));
            }
            if views.is_empty() {
                return Err(PipelineError::InvalidInput("views_to_regenerate must not be empty".into()));
            }
            let missing = concept.missing_fields();
            if !missing.is_empty() {
                return Err(PipelineError::InvalidInput(format!(
                    "concept to refine is missing fields: {}",
                    missing.join(", ")
                )));
            }
        }
        Ok(())
    }

    fn to_text_request(&self) -> TextRequest {
        match self {
            ConceptRequest::Create { inputs, flow, count, variation_of } => TextRequest {
                system: prompts::create_system(*count, *flow),
                prompt: prompts::create_user(inputs, *flow, *count, variation_of.as_ref()),
                reference_image: None,
                temperature: 0.9,
            },
            ConceptRequest::Refine { concept, instruction, views } => TextRequest {
                system: prompts::refine_system(),
                prompt: prompts::refine_user(concept, instruction, views),
                reference_image: None,
                temperature: 0.5,
            },
            ConceptRequest::FromImage { image, preferences, flow, count } => TextRequest {
                system: prompts::image_to_design_system(*count, *flow),
                prompt: prompts::image_to_design_user(preferences, *count),
                reference_image: Some(image.clone()),
                temperature: 0.8,
            },
        }
    }
}

pub struct SpecGenerator {
    model: Arc<dyn TextModel>,
    timeout: Duration,
}

impl SpecGenerator {
    pub fn new(model: Arc<dyn TextModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    pub async fn generate(&self, request: &ConceptRequest) -> Result<Vec<DesignConcept>, PipelineError> {
        request.validate()?;
        let expected = request.expected_count();
        info!(mode = request.label(), expected, "🎯 Generating design concepts");

        let raw = tokio::time::timeout(self.timeout, self.model.generate_text(&request.to_text_request()))
            .await
            .map_err(|_| PipelineError::Timeout(self.timeout))??;

        let concepts = parse_concepts(&raw, expected).map_err(|e| {
            error!(mode = request.label(), error = %e, raw_chars = raw.len(), "❌ Concept response rejected");
            e
        })?;
        info!(
            mode = request.label(),
            names = ?concepts.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            "✅ Concepts generated"
        );
        Ok(concepts)
    }

    /// Exactly one concept; used by refinement and surprise flows.
    pub async fn generate_one(&self, request: &ConceptRequest) -> Result<DesignConcept, PipelineError> {
        self.generate(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Internal("concept list unexpectedly empty".into()))
    }
}

/// Strips a surrounding markdown code fence, with or without a language tag.
fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parses and validates a model answer. Anything but exactly `expected`
/// complete concepts is a schema violation carrying the raw text.
pub fn parse_concepts(raw: &str, expected: usize) -> Result<Vec<DesignConcept>, PipelineError> {
    let body = strip_code_fences(raw);
    if body.is_empty() {
        return Err(PipelineError::schema("empty response", raw));
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|e| PipelineError::schema(format!("invalid JSON: {e}"), raw))?;

    let items = match value {
        Value::Array(items) => items,
        single @ Value::Object(_) if expected == 1 => vec![single],
        _ => return Err(PipelineError::schema("expected a JSON array of concepts", raw)),
    };
    if items.len() != expected {
        return Err(PipelineError::schema(
            format!("expected {expected} concepts, got {}", items.len()),
            raw,
        ));
    }

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            if !item.is_object() {
                return Err(PipelineError::schema(format!("concept {} is not an object", i + 1), raw));
            }
            let concept: DesignConcept = serde_json::from_value(item)
                .map_err(|e| PipelineError::schema(format!("concept {}: {e}", i + 1), raw))?;
            let missing = concept.missing_fields();
            if !missing.is_empty() {
                return Err(PipelineError::schema(
                    format!("concept {} is missing required fields: {}", i + 1, missing.join(", ")),
                    raw,
                ));
            }
            Ok(concept)
        })
        .collect()
}
