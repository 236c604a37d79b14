use std::collections::BTreeMap;

use futures::future::join_all;
use tracing::{info, warn};

use crate::{
    concepts::{ConceptRequest, SpecGenerator},
    error::PipelineError,
    models::{DesignConcept, DesignInputs, ImageSet, RenderedConcept, View},
    render::{ImageRenderer, RenderReport},
    surprise::SurpriseInputSample,
};

pub struct SurpriseDesign {
    pub concept: DesignConcept,
    pub images: ImageSet,
    pub sample: SurpriseInputSample,
}

pub struct Refinement {
    pub concept: RenderedConcept,
    /// Views re-rendered from the revised concept.
    pub refreshed_views: Vec<View>,
    /// Views carried over from the previous concept; they may no longer
    /// match the revised concept.
    pub stale_views: Vec<View>,
    pub failed_views: BTreeMap<View, String>,
}

/// Spec generation followed by rendering, in sequence.
pub struct DesignPipeline {
    pub generator: SpecGenerator,
    pub renderer: ImageRenderer,
}

impl DesignPipeline {
    pub fn new(generator: SpecGenerator, renderer: ImageRenderer) -> Self {
        Self { generator, renderer }
    }

    /// Generates concepts, then renders every view of every concept. A view
    /// that fails leaves its slot empty and its reason in `failed_views`;
    /// rate limit, quota or timeout on a concept with nothing rendered
    /// fails the request.
    pub async fn generate_rendered(&self, request: &ConceptRequest) -> Result<Vec<RenderedConcept>, PipelineError> {
        let concepts = self.generator.generate(request).await?;

        let reports = join_all(
            concepts
                .iter()
                .map(|concept| self.renderer.render(concept, &View::ALL)),
        )
        .await;

        concepts
            .into_iter()
            .zip(reports)
            .map(|(concept, report)| -> Result<RenderedConcept, PipelineError> {
                let report = report.into_view_scoped()?;
                let failed_views = report.failures();
                if !failed_views.is_empty() {
                    warn!(concept = %concept.name, failures = ?failed_views, "Concept returned with empty image slots");
                }
                Ok(RenderedConcept {
                    images: report.image_set(),
                    concept,
                    failed_views,
                })
            })
            .collect()
    }

    pub async fn render(&self, concept: &DesignConcept, views: &[View]) -> Result<RenderReport, PipelineError> {
        let missing = concept.missing_fields();
        if !missing.is_empty() {
            return Err(PipelineError::InvalidInput(format!(
                "concept_json is missing fields: {}",
                missing.join(", ")
            )));
        }
        if views.is_empty() {
            return Err(PipelineError::InvalidInput("at least one view is required".into()));
        }
        self.renderer.render(concept, views).await.into_partial()
    }

    /// sample → one concept → all three views. Any failure aborts the request.
    pub async fn surprise(&self, sample: SurpriseInputSample) -> Result<SurpriseDesign, PipelineError> {
        info!(mode = ?sample.mode, metal = %sample.metal_preference, shape = %sample.stone_shape, "🎲 Surprise design");
        let request = ConceptRequest::Create {
            inputs: DesignInputs::from(&sample),
            flow: sample.mode,
            count: sample.num_concepts,
            variation_of: None,
        };
        let concept = self.generator.generate_one(&request).await?;
        let images = self.renderer.render(&concept, &View::ALL).await.into_complete()?;
        Ok(SurpriseDesign { concept, images, sample })
    }

    /// Revises `current` and re-renders only `views`; other views keep their
    /// previous URLs and are reported as stale.
    pub async fn refine(
        &self,
        current: &RenderedConcept,
        instruction: &str,
        views: &[View],
    ) -> Result<Refinement, PipelineError> {
        let request = ConceptRequest::Refine {
            concept: current.concept.clone(),
            instruction: instruction.to_string(),
            views: views.to_vec(),
        };
        let concept = self.generator.generate_one(&request).await?;
        let report = self.renderer.render(&concept, views).await.into_partial()?;

        let mut images = current.images.clone();
        let mut refreshed_views = Vec::new();
        for view in View::ALL.into_iter().filter(|v| views.contains(v)) {
            let url = report.url(view).map(str::to_string);
            if url.is_some() {
                refreshed_views.push(view);
            }
            images.set(view, url);
        }
        let stale_views: Vec<View> = View::ALL
            .into_iter()
            .filter(|v| !views.contains(v) && images.get(*v).is_some())
            .collect();

        info!(
            concept = %concept.name,
            refreshed = ?refreshed_views,
            stale = ?stale_views,
            "✏️ Concept refined"
        );
        let failed_views = report.failures();
        Ok(Refinement {
            concept: RenderedConcept {
                concept,
                images,
                failed_views: failed_views.clone(),
            },
            refreshed_views,
            stale_views,
            failed_views,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::GeminiError;
    use crate::models::{FlowType, View};
    use crate::surprise;
    use crate::testing::{concept, concept_json, concepts_array, ScriptedImageModel, ScriptedTextModel, ViewFailure};
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};
    use std::{sync::Arc, time::Duration};

    fn pipeline(text: ScriptedTextModel, images: ScriptedImageModel) -> (DesignPipeline, Arc<ScriptedTextModel>, Arc<ScriptedImageModel>) {
        let text = Arc::new(text);
        let images = Arc::new(images);
        let timeout = Duration::from_secs(5);
        let pipeline = DesignPipeline::new(
            SpecGenerator::new(text.clone(), timeout),
            ImageRenderer::new(images.clone(), None, timeout),
        );
        (pipeline, text, images)
    }

    fn rendered(name: &str) -> RenderedConcept {
        RenderedConcept {
            concept: concept(name),
            images: ImageSet {
                hero: Some("https://cdn.test/hero-old.png".into()),
                side: Some("https://cdn.test/side-old.png".into()),
                top: Some("https://cdn.test/top-old.png".into()),
            },
            failed_views: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn end_to_end_single_concept() {
        let (pipeline, _, images) = pipeline(
            ScriptedTextModel::replying(concepts_array(&["Aurelia"])),
            ScriptedImageModel::default(),
        );
        let request = ConceptRequest::Create {
            inputs: DesignInputs {
                project_type: Some("engagement_ring".into()),
                metal_preference: Some("platinum".into()),
                stone_shape: Some("oval".into()),
                ..Default::default()
            },
            flow: FlowType::Engagement,
            count: 1,
            variation_of: None,
        };

        let concepts = pipeline.generate_rendered(&request).await.unwrap();
        assert_eq!(concepts.len(), 1);
        assert!(concepts[0].concept.metal.to_lowercase().contains("platinum"));
        assert!(concepts[0].concept.center_stone.shape.to_lowercase().contains("oval"));
        assert_eq!(concepts[0].images.urls().len(), 3);
        assert!(concepts[0].images.urls().iter().all(|u| !u.is_empty()));
        assert_eq!(images.calls(), 3);
    }

    #[tokio::test]
    async fn concept_without_images_keeps_its_siblings() {
        let (pipeline, _, images) = pipeline(
            ScriptedTextModel::replying(concepts_array(&["Alpha", "Bravo", "Charlie"])),
            ScriptedImageModel::failing_concept("Bravo", ViewFailure::NoImage),
        );
        let request = ConceptRequest::Create {
            inputs: DesignInputs::default(),
            flow: FlowType::Engagement,
            count: 3,
            variation_of: None,
        };

        let concepts = pipeline.generate_rendered(&request).await.unwrap();
        let names: Vec<_> = concepts.iter().map(|c| c.concept.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Bravo", "Charlie"]);
        assert_eq!(images.calls(), 9);

        let bravo = &concepts[1];
        assert_eq!(bravo.images, ImageSet::default());
        assert_eq!(bravo.failed_views.keys().copied().collect::<Vec<_>>(), View::ALL.to_vec());
        assert_eq!(bravo.failed_views[&View::Side], "no image was returned for the side view");
        for other in [&concepts[0], &concepts[2]] {
            assert_eq!(other.images.urls().len(), 3);
            assert!(other.failed_views.is_empty());
        }
    }

    #[tokio::test]
    async fn concept_rate_limited_on_every_view_fails_the_request() {
        let (pipeline, _, _) = pipeline(
            ScriptedTextModel::replying(concepts_array(&["Alpha", "Bravo"])),
            ScriptedImageModel::failing_concept("Bravo", ViewFailure::RateLimited),
        );
        let request = ConceptRequest::Create {
            inputs: DesignInputs::default(),
            flow: FlowType::General,
            count: 2,
            variation_of: None,
        };
        let err = pipeline.generate_rendered(&request).await.unwrap_err();
        assert!(matches!(err, PipelineError::RateLimited));
    }

    #[tokio::test]
    async fn spec_failure_skips_rendering() {
        let (pipeline, _, images) = pipeline(
            ScriptedTextModel::replying("I'd love to help with your ring!"),
            ScriptedImageModel::default(),
        );
        let request = ConceptRequest::Create {
            inputs: DesignInputs::default(),
            flow: FlowType::General,
            count: 3,
            variation_of: None,
        };
        let err = pipeline.generate_rendered(&request).await.unwrap_err();
        assert!(matches!(err, PipelineError::SchemaViolation { .. }));
        assert_eq!(images.calls(), 0);
    }

    #[tokio::test]
    async fn surprise_returns_sample_and_three_images() {
        let (pipeline, text, _) = pipeline(
            ScriptedTextModel::replying(concepts_array(&["Starlit"])),
            ScriptedImageModel::default(),
        );
        let sample = surprise::sample(FlowType::Engagement, &mut StdRng::seed_from_u64(3));
        let design = pipeline.surprise(sample.clone()).await.unwrap();

        assert_eq!(design.concept.name, "Starlit");
        assert_eq!(design.sample, sample);
        assert_eq!(design.images.urls().len(), 3);
        let prompt = text.requests.lock()[0].prompt.clone();
        assert!(prompt.contains(&format!("- Metal: {}", sample.metal_preference)));
    }

    #[tokio::test]
    async fn surprise_aborts_when_any_view_fails() {
        let (pipeline, _, _) = pipeline(
            ScriptedTextModel::replying(concepts_array(&["Starlit"])),
            ScriptedImageModel::failing(&[(View::Top, ViewFailure::NoImage)]),
        );
        let sample = surprise::sample(FlowType::General, &mut StdRng::seed_from_u64(3));
        let err = pipeline.surprise(sample).await.err().unwrap();
        assert!(matches!(err, PipelineError::EmptyResult { view: View::Top }));
    }

    #[tokio::test]
    async fn surprise_aborts_on_rate_limit() {
        let (pipeline, _, images) = pipeline(
            ScriptedTextModel::new(vec![Err(GeminiError::RateLimited)]),
            ScriptedImageModel::default(),
        );
        let sample = surprise::sample(FlowType::Engagement, &mut StdRng::seed_from_u64(1));
        assert!(matches!(pipeline.surprise(sample).await, Err(PipelineError::RateLimited)));
        assert_eq!(images.calls(), 0);
    }

    #[tokio::test]
    async fn refine_preserves_unrequested_views() {
        let mut revised = concept_json("Aurelia Rose");
        revised["metal"] = "18k rose gold".into();
        let (pipeline, _, images) = pipeline(
            ScriptedTextModel::replying(format!("[{revised}]")),
            ScriptedImageModel::default(),
        );
        let current = rendered("Aurelia");

        let refinement = pipeline
            .refine(&current, "switch to rose gold", &[View::Hero])
            .await
            .unwrap();

        let images_out = &refinement.concept.images;
        assert_eq!(images_out.side, current.images.side);
        assert_eq!(images_out.top, current.images.top);
        assert_ne!(images_out.hero, current.images.hero);
        assert!(images_out.hero.as_deref().unwrap().starts_with("data:image/png"));
        assert_eq!(refinement.concept.concept.metal, "18k rose gold");
        assert_eq!(refinement.refreshed_views, vec![View::Hero]);
        assert_eq!(refinement.stale_views, vec![View::Side, View::Top]);
        assert_eq!(images.calls(), 1);
    }

    #[tokio::test]
    async fn refine_marks_failed_requested_view_empty() {
        let (pipeline, _, _) = pipeline(
            ScriptedTextModel::replying(concepts_array(&["Aurelia"])),
            ScriptedImageModel::failing(&[(View::Side, ViewFailure::NoImage)]),
        );
        let refinement = pipeline
            .refine(&rendered("Aurelia"), "thinner band", &[View::Hero, View::Side])
            .await
            .unwrap();

        assert!(refinement.concept.images.side.is_none());
        assert!(refinement.concept.failed_views.contains_key(&View::Side));
        assert_eq!(refinement.refreshed_views, vec![View::Hero]);
        assert_eq!(refinement.stale_views, vec![View::Top]);
        assert!(refinement.failed_views.contains_key(&View::Side));
    }

    #[tokio::test]
    async fn render_rejects_incomplete_concepts() {
        let (pipeline, _, images) = pipeline(ScriptedTextModel::default(), ScriptedImageModel::default());
        let mut partial = concept("Aurelia");
        partial.band.width_mm.clear();
        let err = pipeline.render(&partial, &View::ALL).await.err().unwrap();
        assert!(matches!(err, PipelineError::InvalidInput(msg) if msg.contains("band.width_mm")));
        assert_eq!(images.calls(), 0);
    }
}
