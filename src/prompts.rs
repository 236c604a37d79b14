use include_dir::{include_dir, Dir};
use tracing::error;

use crate::models::{DesignConcept, DesignInputs, FlowType, View};

static PROMPTS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/prompts");

const PHOTOGRAPHY: &str = "Photorealistic studio product photograph, soft diffused studio lighting, \
clean neutral light-grey seamless background, sharp focus on the stone and metalwork, \
accurate metal color and realistic gemstone brilliance, no hands, no models, no props, \
no packaging, no text or watermarks, single piece centered in frame.";

fn template(name: &str) -> &'static str {
    match PROMPTS.get_file(name).and_then(|f| f.contents_utf8()) {
        Some(text) => text,
        None => {
            error!(name, "prompt template missing from bundle");
            ""
        }
    }
}

fn fill(template: &str, count: usize, flow: FlowType) -> String {
    template
        .replace("{{schema}}", template_schema())
        .replace("{{count}}", &count.to_string())
        .replace("{{piece}}", flow.label())
}

/// JSON template every concept must follow; the single source for all prompts.
pub fn template_schema() -> &'static str {
    template("concept_schema.json").trim()
}

pub fn create_system(count: usize, flow: FlowType) -> String {
    fill(template("create_system.txt"), count, flow)
}

pub fn refine_system() -> String {
    fill(template("refine_system.txt"), 1, FlowType::Engagement)
}

pub fn image_to_design_system(count: usize, flow: FlowType) -> String {
    fill(template("image_to_design_system.txt"), count, flow)
}

fn preference_lines(inputs: &DesignInputs) -> String {
    let mut lines: Vec<String> = inputs
        .preferences()
        .into_iter()
        .map(|(label, value)| format!("- {label}: {value}"))
        .collect();
    for (i, inspiration) in inputs
        .inspiration_descriptions
        .iter()
        .filter(|d| !d.trim().is_empty())
        .enumerate()
    {
        lines.push(format!("- Inspiration image {}: {}", i + 1, inspiration.trim()));
    }
    if lines.is_empty() {
        "- No specific preferences given; choose tastefully.".to_string()
    } else {
        lines.join("\n")
    }
}

pub fn create_user(
    inputs: &DesignInputs,
    flow: FlowType,
    count: usize,
    variation_of: Option<&DesignConcept>,
) -> String {
    let mut prompt = format!(
        "Design {count} {} concept(s) for this customer.\n\nCustomer preferences:\n{}",
        flow.label(),
        preference_lines(inputs)
    );
    if let Some(previous) = variation_of {
        prompt.push_str(&format!(
            "\n\nThe customer liked this earlier concept and wants fresh alternatives in the same spirit. \
             Keep its overall direction but vary the silhouette and detailing; do not repeat its name.\n{}",
            serde_json::to_string_pretty(previous).unwrap_or_default()
        ));
    }
    prompt
}

pub fn refine_user(concept: &DesignConcept, instruction: &str, views: &[View]) -> String {
    let views = views.iter().map(View::as_str).collect::<Vec<_>>().join(", ");
    format!(
        "Current concept:\n{}\n\nChange request: {}\n\nThe {} view(s) will be re-rendered from your revised concept.",
        serde_json::to_string_pretty(concept).unwrap_or_default(),
        instruction.trim(),
        views
    )
}

pub fn image_to_design_user(preferences: &DesignInputs, count: usize) -> String {
    format!(
        "Propose {count} concept(s) inspired by the attached reference image.\n\nStyle preferences:\n{}",
        preference_lines(preferences)
    )
}

/// Camera direction phrase; unique per view.
pub fn camera_label(view: View) -> &'static str {
    match view {
        View::Hero => "hero three-quarter view",
        View::Side => "side profile view",
        View::Top => "top-down view",
    }
}

fn camera_direction(view: View) -> &'static str {
    match view {
        View::Hero => "Camera slightly above and to the side, showing the face of the center stone and the sweep of the band.",
        View::Side => "Camera level with the piece, showing the full profile: setting height, gallery, prongs and shoulders.",
        View::Top => "Camera directly above, looking straight down onto the table of the center stone and the band.",
    }
}

/// Image prompt restating every concept field visible from `view`.
pub fn view_prompt(concept: &DesignConcept, view: View) -> String {
    let stone = &concept.center_stone;
    let band = &concept.band;
    let mut prompt = format!(
        "{label} of a custom {name} jewelry design. {direction}\n\
         Metal: {metal}.\n\
         Center stone: {shape} {stone_type}, {size} mm, approximately {ct} ct.\n\
         Setting: {setting}; prongs: {prongs}.\n\
         Band: {band_style}, {width} mm wide; pavé: {pave}; shoulders: {shoulders}.\n\
         Accent stones: {accents}.\n",
        label = camera_label(view),
        name = concept.name,
        direction = camera_direction(view),
        metal = concept.metal,
        shape = stone.shape,
        stone_type = stone.stone_type,
        size = stone.size_mm,
        ct = stone.approx_ct,
        setting = concept.setting_style,
        prongs = concept.prongs,
        band_style = band.style,
        width = band.width_mm,
        pave = band.pave,
        shoulders = band.shoulders,
        accents = concept.accent_stones,
    );
    if view != View::Top {
        prompt.push_str(&format!("Gallery: {}.\n", concept.gallery_details));
    }
    prompt.push_str(PHOTOGRAPHY);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::concept;
    use serde_json::Value;

    #[test]
    fn schema_template_covers_every_required_field() {
        let schema: Value = serde_json::from_str(template_schema()).unwrap();
        for path in DesignConcept::REQUIRED_FIELDS {
            let pointer = format!("/{}", path.replace('.', "/"));
            let hint = schema.pointer(&pointer).and_then(Value::as_str);
            assert!(hint.is_some_and(|h| !h.is_empty()), "schema template lacks {path}");
        }
    }

    #[test]
    fn system_prompts_are_fully_filled() {
        for prompt in [
            create_system(3, FlowType::Engagement),
            refine_system(),
            image_to_design_system(2, FlowType::General),
        ] {
            assert!(!prompt.contains("{{"), "unfilled placeholder in: {prompt}");
            assert!(prompt.contains("\"manufacturing_notes\""));
            assert!(prompt.contains("raw JSON array"));
        }
        assert!(create_system(3, FlowType::Engagement).contains("exactly 3 concept objects"));
    }

    #[test]
    fn create_prompt_lists_preferences_and_inspiration() {
        let inputs = DesignInputs {
            metal_preference: Some("platinum".into()),
            stone_shape: Some("oval".into()),
            inspiration_descriptions: vec!["vintage milgrain band".into(), " ".into()],
            ..Default::default()
        };
        let prompt = create_user(&inputs, FlowType::Engagement, 1, None);
        assert!(prompt.contains("- Metal: platinum"));
        assert!(prompt.contains("- Stone shape: oval"));
        assert!(prompt.contains("- Inspiration image 1: vintage milgrain band"));
        assert!(!prompt.contains("Inspiration image 2"));

        let variation = create_user(&inputs, FlowType::Engagement, 2, Some(&concept("Aurelia")));
        assert!(variation.contains("\"Aurelia\""));
    }

    #[test]
    fn view_prompts_restate_every_concept_field() {
        let concept = concept("Aurelia");
        for view in View::ALL {
            let prompt = view_prompt(&concept, view);
            assert!(prompt.starts_with(camera_label(view)));
            assert!(prompt.contains("Platinum 950"));
            assert!(prompt.contains("oval lab-grown diamond"));
            assert!(prompt.contains("knife-edge, 1.8 mm wide"));
            assert!(prompt.contains("no hands"));
        }
        assert!(view_prompt(&concept, View::Side).contains("open scrollwork"));
    }
}
