use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{
    de::{self, Unexpected},
    Deserialize, Deserializer, Serialize,
};
use serde_json::Value;
use uuid::Uuid;

use crate::surprise::SurpriseInputSample;

/// Camera angle rendered for a concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Hero,
    #[serde(alias = "side_profile")]
    Side,
    #[serde(alias = "top_down")]
    Top,
}

impl View {
    pub const ALL: [View; 3] = [View::Hero, View::Side, View::Top];

    pub fn as_str(&self) -> &'static str {
        match self {
            View::Hero => "hero",
            View::Side => "side",
            View::Top => "top",
        }
    }

    /// Views refreshed by a refinement when the caller does not say otherwise.
    pub fn default_refresh() -> Vec<View> {
        vec![View::Hero, View::Side]
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowType {
    #[default]
    Engagement,
    General,
}

impl FlowType {
    pub fn label(&self) -> &'static str {
        match self {
            FlowType::Engagement => "engagement ring",
            FlowType::General => "fine jewelry piece",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesignMode {
    Engagement,
    General,
    Surprise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignStatus {
    #[default]
    Draft,
    Saved,
    SubmittedForCad,
    InCad,
    Completed,
    Archived,
}

impl DesignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DesignStatus::Draft => "draft",
            DesignStatus::Saved => "saved",
            DesignStatus::SubmittedForCad => "submitted_for_cad",
            DesignStatus::InCad => "in_cad",
            DesignStatus::Completed => "completed",
            DesignStatus::Archived => "archived",
        }
    }
}

/// Accepts strings, numbers and lists of those for free-text fields. Models
/// regularly emit `"size_mm": 7.5` or `"accent_stones": ["..", ".."]`.
/// Booleans and objects are rejected.
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    fn scalar<E: de::Error>(value: Value) -> Result<String, E> {
        match value {
            Value::Null => Ok(String::new()),
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Err(E::invalid_type(Unexpected::Bool(b), &"text or a number")),
            Value::Array(_) => Err(E::invalid_type(Unexpected::Seq, &"text or a number")),
            Value::Object(_) => Err(E::invalid_type(Unexpected::Map, &"text or a number")),
        }
    }

    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(items
            .into_iter()
            .map(scalar::<D::Error>)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join(", ")),
        other => scalar(other),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CenterStone {
    #[serde(default, deserialize_with = "lenient_text")]
    pub shape: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub size_mm: String,
    #[serde(rename = "type", default, deserialize_with = "lenient_text")]
    pub stone_type: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub approx_ct: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Band {
    #[serde(default, deserialize_with = "lenient_text")]
    pub width_mm: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub style: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub pave: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub shoulders: String,
}

/// One manufacturable jewelry specification as produced by the text model.
///
/// Fields default to empty on deserialization so that a partial model answer
/// can be reported field by field; [`DesignConcept::missing_fields`] is the
/// gate every concept passes before it is used.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DesignConcept {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub overview: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub metal: String,
    #[serde(default)]
    pub center_stone: CenterStone,
    #[serde(default)]
    pub band: Band,
    #[serde(default, deserialize_with = "lenient_text")]
    pub setting_style: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub prongs: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub accent_stones: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub gallery_details: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub manufacturing_notes: String,
}

impl DesignConcept {
    /// Every key of the concept schema, nested keys in dotted form.
    pub const REQUIRED_FIELDS: [&'static str; 16] = [
        "name",
        "overview",
        "metal",
        "center_stone.shape",
        "center_stone.size_mm",
        "center_stone.type",
        "center_stone.approx_ct",
        "band.width_mm",
        "band.style",
        "band.pave",
        "band.shoulders",
        "setting_style",
        "prongs",
        "accent_stones",
        "gallery_details",
        "manufacturing_notes",
    ];

    fn field(&self, path: &str) -> &str {
        match path {
            "name" => &self.name,
            "overview" => &self.overview,
            "metal" => &self.metal,
            "center_stone.shape" => &self.center_stone.shape,
            "center_stone.size_mm" => &self.center_stone.size_mm,
            "center_stone.type" => &self.center_stone.stone_type,
            "center_stone.approx_ct" => &self.center_stone.approx_ct,
            "band.width_mm" => &self.band.width_mm,
            "band.style" => &self.band.style,
            "band.pave" => &self.band.pave,
            "band.shoulders" => &self.band.shoulders,
            "setting_style" => &self.setting_style,
            "prongs" => &self.prongs,
            "accent_stones" => &self.accent_stones,
            "gallery_details" => &self.gallery_details,
            "manufacturing_notes" => &self.manufacturing_notes,
            _ => "",
        }
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        Self::REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|path| self.field(path).trim().is_empty())
            .collect()
    }

    pub fn validate(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Labelled rows used for inquiry descriptions and the PDF spec sheet.
    pub fn spec_rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Metal", self.metal.clone()),
            (
                "Center stone",
                format!(
                    "{} {} ({} mm, approx. {} ct)",
                    self.center_stone.shape,
                    self.center_stone.stone_type,
                    without_unit(&self.center_stone.size_mm, "mm"),
                    without_unit(&self.center_stone.approx_ct, "ct")
                ),
            ),
            ("Setting", self.setting_style.clone()),
            ("Prongs", self.prongs.clone()),
            (
                "Band",
                format!("{} ({} mm)", self.band.style, without_unit(&self.band.width_mm, "mm")),
            ),
            ("Pavé", self.band.pave.clone()),
            ("Shoulders", self.band.shoulders.clone()),
            ("Accent stones", self.accent_stones.clone()),
            ("Gallery", self.gallery_details.clone()),
            ("Manufacturing notes", self.manufacturing_notes.clone()),
        ]
    }

    pub fn spec_sheet(&self) -> String {
        let mut sheet = format!("{}\n{}\n", self.name, self.overview);
        for (label, value) in self.spec_rows() {
            sheet.push_str(&format!("\n{label}: {value}"));
        }
        sheet
    }
}

fn without_unit<'a>(value: &'a str, unit: &str) -> &'a str {
    value.trim().trim_end_matches(unit).trim_end()
}

/// Image slots of a rendered concept. `None` marks a slot left empty after a
/// non-fatal failure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageSet {
    #[serde(default)]
    pub hero: Option<String>,
    #[serde(default, alias = "side_profile")]
    pub side: Option<String>,
    #[serde(default, alias = "top_down")]
    pub top: Option<String>,
}

impl ImageSet {
    pub fn get(&self, view: View) -> Option<&str> {
        match view {
            View::Hero => self.hero.as_deref(),
            View::Side => self.side.as_deref(),
            View::Top => self.top.as_deref(),
        }
    }

    pub fn set(&mut self, view: View, url: Option<String>) {
        match view {
            View::Hero => self.hero = url,
            View::Side => self.side = url,
            View::Top => self.top = url,
        }
    }

    pub fn urls(&self) -> Vec<String> {
        View::ALL
            .iter()
            .filter_map(|view| self.get(*view).map(str::to_string))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderedConcept {
    #[serde(flatten)]
    pub concept: DesignConcept,
    #[serde(default)]
    pub images: ImageSet,
    /// Reason per view whose slot is empty.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failed_views: BTreeMap<View, String>,
}

/// Structured customer preferences ("formInputs" on the wire).
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DesignInputs {
    #[serde(default)]
    pub project_type: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub metal_preference: Option<String>,
    #[serde(default)]
    pub stone_shape: Option<String>,
    #[serde(default)]
    pub stone_type: Option<String>,
    #[serde(default)]
    pub stone_size: Option<String>,
    #[serde(default)]
    pub band_width: Option<String>,
    #[serde(default)]
    pub pave: Option<String>,
    #[serde(default)]
    pub budget: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inspiration_descriptions: Vec<String>,
}

impl DesignInputs {
    /// Labelled, non-empty preferences in prompt order.
    pub fn preferences(&self) -> Vec<(&'static str, &str)> {
        [
            ("Project type", &self.project_type),
            ("Style", &self.style),
            ("Metal", &self.metal_preference),
            ("Stone shape", &self.stone_shape),
            ("Stone type", &self.stone_type),
            ("Stone size", &self.stone_size),
            ("Band width", &self.band_width),
            ("Pavé", &self.pave),
            ("Budget", &self.budget),
            ("Description", &self.description),
        ]
        .into_iter()
        .filter_map(|(label, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (label, v))
        })
        .collect()
    }

    /// Engagement unless the project type names some other piece.
    pub fn inferred_flow(&self) -> FlowType {
        match self.project_type.as_deref().map(str::to_lowercase) {
            Some(kind) if !kind.trim().is_empty() && !kind.contains("engagement") => {
                FlowType::General
            }
            _ => FlowType::Engagement,
        }
    }

    /// Fills every unset preference from a surprise sample.
    pub fn fill_missing_from(&mut self, sample: &SurpriseInputSample) {
        let fill = |slot: &mut Option<String>, value: &str| {
            if slot.as_deref().map(str::trim).unwrap_or_default().is_empty() {
                *slot = Some(value.to_string());
            }
        };
        fill(&mut self.project_type, &sample.project_type);
        fill(&mut self.style, &sample.style);
        fill(&mut self.metal_preference, &sample.metal_preference);
        fill(&mut self.stone_shape, &sample.stone_shape);
        fill(&mut self.stone_type, &sample.stone_type);
        fill(&mut self.stone_size, &sample.stone_size);
        fill(&mut self.band_width, &sample.band_width);
        fill(&mut self.pave, &sample.pave);
        fill(&mut self.budget, &sample.budget);
        fill(&mut self.description, &sample.description);
    }
}

impl From<&SurpriseInputSample> for DesignInputs {
    fn from(sample: &SurpriseInputSample) -> Self {
        let mut inputs = DesignInputs::default();
        inputs.fill_missing_from(sample);
        inputs
    }
}

/// Persisted design row, owned by exactly one user.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedDesign {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub flow_type: FlowType,
    #[serde(default)]
    pub status: DesignStatus,
    #[serde(rename = "concept_json")]
    pub concept: DesignConcept,
    #[serde(default, deserialize_with = "null_as_default")]
    pub form_inputs: DesignInputs,
    #[serde(default)]
    pub hero_image_url: Option<String>,
    #[serde(default)]
    pub side_image_url: Option<String>,
    #[serde(default)]
    pub top_image_url: Option<String>,
    #[serde(default)]
    pub inquiry_id: Option<Uuid>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SavedDesign {
    pub fn images(&self) -> ImageSet {
        ImageSet {
            hero: self.hero_image_url.clone(),
            side: self.side_image_url.clone(),
            top: self.top_image_url.clone(),
        }
    }
}

/// Inquiry fields written by the submission bridge.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInquiry {
    pub user_id: Uuid,
    pub design_id: Uuid,
    pub piece_type: String,
    pub description: String,
    #[serde(default)]
    pub budget: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    pub source: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inquiry {
    pub id: Uuid,
    #[serde(flatten)]
    pub fields: NewInquiry,
    pub created_at: DateTime<Utc>,
}

// --- Request bodies ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    #[default]
    Create,
    Refine,
    ImageToDesign,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RingConceptsRequest {
    #[serde(default, rename = "formInputs")]
    pub form_inputs: Option<DesignInputs>,
    #[serde(default, rename = "surpriseMe")]
    pub surprise_me: bool,
    #[serde(default, rename = "regenerateFrom")]
    pub regenerate_from: Option<DesignConcept>,
    #[serde(default)]
    pub request_type: Option<RequestType>,
    #[serde(default)]
    pub mode: Option<FlowType>,
    #[serde(default)]
    pub num_concepts: Option<usize>,
    #[serde(default)]
    pub concept: Option<RenderedConcept>,
    #[serde(default)]
    pub refinement_instruction: Option<String>,
    #[serde(default)]
    pub views_to_regenerate: Option<Vec<View>>,
    #[serde(default)]
    pub reference_image: Option<String>,
    #[serde(default)]
    pub style_preferences: Option<DesignInputs>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DesignConceptInput {
    #[serde(flatten)]
    pub inputs: DesignInputs,
    #[serde(default)]
    pub mode: Option<DesignMode>,
    #[serde(default)]
    pub num_concepts: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderImagesRequest {
    pub concept_json: DesignConcept,
    #[serde(default)]
    pub design_id: Option<Uuid>,
    #[serde(default)]
    pub views: Option<Vec<View>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SurpriseRequest {
    pub mode: FlowType,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub design_id: Uuid,
}

// --- Response bodies ---

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct RingConceptsResponse {
    pub success: bool,
    pub concepts: Vec<RenderedConcept>,
    pub refreshed_views: Option<Vec<View>>,
    pub stale_views: Option<Vec<View>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub failed_views: BTreeMap<View, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConceptsResponse {
    pub success: bool,
    pub concepts: Vec<DesignConcept>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderImagesResponse {
    pub success: bool,
    pub hero_image_url: Option<String>,
    pub side_image_url: Option<String>,
    pub top_image_url: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub failed_views: BTreeMap<View, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SurpriseResponse {
    pub success: bool,
    pub concept: DesignConcept,
    pub hero_image_url: String,
    pub side_image_url: String,
    pub top_image_url: String,
    pub form_inputs: SurpriseInputSample,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub inquiry_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::concept_json;
    use pretty_assertions::assert_eq;

    #[test]
    fn concept_accepts_numeric_and_list_values() {
        let concept: DesignConcept = serde_json::from_value(serde_json::json!({
            "name": "Aurelia",
            "center_stone": { "shape": "oval", "size_mm": 9.5, "type": "diamond", "approx_ct": 2 },
            "accent_stones": ["melee diamonds", "", "sapphire side stones"]
        }))
        .unwrap();

        assert_eq!(concept.center_stone.size_mm, "9.5");
        assert_eq!(concept.center_stone.approx_ct, "2");
        assert_eq!(concept.accent_stones, "melee diamonds, sapphire side stones");
    }

    #[test]
    fn booleans_and_objects_are_not_text() {
        for bad in [
            serde_json::json!({ "prongs": false }),
            serde_json::json!({ "metal": { "oops": 1 } }),
            serde_json::json!({ "accent_stones": ["melee", true] }),
            serde_json::json!({ "band": { "style": { "kind": "knife-edge" } } }),
        ] {
            assert!(serde_json::from_value::<DesignConcept>(bad.clone()).is_err(), "{bad}");
        }
    }

    #[test]
    fn missing_fields_reports_nested_paths() {
        let mut concept: DesignConcept = serde_json::from_value(concept_json("Aurelia")).unwrap();
        assert!(concept.validate());

        concept.band.pave = "  ".into();
        concept.center_stone.stone_type.clear();
        assert_eq!(concept.missing_fields(), vec!["center_stone.type", "band.pave"]);
        assert!(!concept.validate());
    }

    #[test]
    fn null_fields_are_missing() {
        let mut value = concept_json("Aurelia");
        value["metal"] = serde_json::Value::Null;
        let concept: DesignConcept = serde_json::from_value(value).unwrap();
        assert_eq!(concept.missing_fields(), vec!["metal"]);
    }

    #[test]
    fn view_aliases_and_image_slots() {
        let views: Vec<View> = serde_json::from_str(r#"["hero","side_profile","top_down"]"#).unwrap();
        assert_eq!(views, View::ALL.to_vec());

        let mut images = ImageSet::default();
        images.set(View::Top, Some("https://cdn/top.png".into()));
        assert_eq!(images.get(View::Top), Some("https://cdn/top.png"));
        assert_eq!(images.urls(), vec!["https://cdn/top.png".to_string()]);
    }

    #[test]
    fn rendered_concept_flattens_on_the_wire() {
        let rendered = RenderedConcept {
            concept: serde_json::from_value(concept_json("Aurelia")).unwrap(),
            images: ImageSet { hero: Some("h".into()), side: None, top: None },
            failed_views: BTreeMap::from([(View::Side, "no image was returned for the side view".into())]),
        };
        let value = serde_json::to_value(&rendered).unwrap();
        assert_eq!(value["name"], "Aurelia");
        assert_eq!(value["images"]["hero"], "h");
        assert!(value["images"]["side"].is_null());
        assert_eq!(value["failed_views"]["side"], "no image was returned for the side view");

        let back: RenderedConcept = serde_json::from_value(value).unwrap();
        assert_eq!(back, rendered);
        let clean = RenderedConcept { failed_views: BTreeMap::new(), ..rendered };
        assert!(serde_json::to_value(&clean).unwrap().get("failed_views").is_none());
    }

    #[test]
    fn inferred_flow_from_project_type() {
        let mut inputs = DesignInputs::default();
        assert_eq!(inputs.inferred_flow(), FlowType::Engagement);
        inputs.project_type = Some("Engagement_Ring".into());
        assert_eq!(inputs.inferred_flow(), FlowType::Engagement);
        inputs.project_type = Some("pendant".into());
        assert_eq!(inputs.inferred_flow(), FlowType::General);
    }

    #[test]
    fn preferences_skip_blank_values() {
        let inputs = DesignInputs {
            metal_preference: Some("platinum".into()),
            stone_shape: Some("  ".into()),
            budget: Some("$5,000".into()),
            ..Default::default()
        };
        assert_eq!(inputs.preferences(), vec![("Metal", "platinum"), ("Budget", "$5,000")]);
    }

    #[test]
    fn saved_design_reads_supabase_row() {
        let row = serde_json::json!({
            "id": "6f1c1f8e-3c55-4b57-9a43-2f4b8f3e0d11",
            "user_id": "0b7c7e55-5d1c-4f0c-8d0e-7a8a6c1d2e3f",
            "name": "Aurelia",
            "flow_type": "engagement",
            "status": "submitted_for_cad",
            "concept_json": concept_json("Aurelia"),
            "form_inputs": { "metal_preference": "platinum" },
            "hero_image_url": "https://cdn/hero.png",
            "side_image_url": null,
            "created_at": "2026-01-02T03:04:05Z",
            "updated_at": "2026-01-02T03:04:05Z"
        });
        let design: SavedDesign = serde_json::from_value(row).unwrap();
        assert_eq!(design.status, DesignStatus::SubmittedForCad);
        assert_eq!(design.form_inputs.metal_preference.as_deref(), Some("platinum"));
        assert_eq!(design.images().hero.as_deref(), Some("https://cdn/hero.png"));
        assert!(design.inquiry_id.is_none());
    }

    #[test]
    fn null_form_inputs_default_to_empty() {
        let row = serde_json::json!({
            "id": "6f1c1f8e-3c55-4b57-9a43-2f4b8f3e0d11",
            "user_id": "0b7c7e55-5d1c-4f0c-8d0e-7a8a6c1d2e3f",
            "concept_json": concept_json("Aurelia"),
            "form_inputs": null,
            "created_at": "2026-01-02T03:04:05Z",
            "updated_at": "2026-01-02T03:04:05Z"
        });
        let design: SavedDesign = serde_json::from_value(row).unwrap();
        assert_eq!(design.form_inputs, DesignInputs::default());
        assert_eq!(design.status, DesignStatus::Draft);
    }
}
