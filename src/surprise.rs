//! Randomised-but-tasteful inputs for "surprise me" requests.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::models::FlowType;

/// Curated options per field; every draw picks uniformly and independently.
#[derive(Debug)]
pub struct SurpriseTables {
    pub project_types: &'static [&'static str],
    pub styles: &'static [&'static str],
    pub metals: &'static [&'static str],
    pub stone_shapes: &'static [&'static str],
    pub stone_types: &'static [&'static str],
    pub stone_sizes: &'static [&'static str],
    pub band_widths: &'static [&'static str],
    pub pave: &'static [&'static str],
    pub budgets: &'static [&'static str],
    pub description: &'static str,
}

pub static ENGAGEMENT: SurpriseTables = SurpriseTables {
    project_types: &["engagement_ring"],
    styles: &[
        "classic solitaire",
        "hidden halo",
        "vintage-inspired",
        "three-stone",
        "modern bezel",
        "toi et moi",
        "cathedral",
    ],
    metals: &["platinum", "18k yellow gold", "18k white gold", "18k rose gold", "14k white gold"],
    stone_shapes: &["round", "oval", "cushion", "emerald", "pear", "marquise", "radiant", "elongated cushion"],
    stone_types: &["lab-grown diamond", "natural diamond", "moissanite", "sapphire"],
    stone_sizes: &["1.0 ct", "1.5 ct", "2.0 ct", "2.5 ct", "3.0 ct"],
    band_widths: &["1.6 mm", "1.8 mm", "2.0 mm", "2.2 mm", "2.5 mm"],
    pave: &["no pavé", "petite pavé", "half-eternity pavé", "full-eternity pavé"],
    budgets: &["$2,500 - $5,000", "$5,000 - $10,000", "$10,000 - $20,000", "$20,000+"],
    description: "Surprise me with a timeless, beautifully proportioned engagement ring that feels personal and special.",
};

pub static GENERAL: SurpriseTables = SurpriseTables {
    project_types: &["ring", "pendant", "earrings", "bracelet", "necklace"],
    styles: &["minimalist", "art deco", "organic", "nature-inspired", "celestial", "bold statement"],
    metals: &["sterling silver", "14k yellow gold", "14k rose gold", "10k yellow gold", "gold vermeil", "palladium"],
    stone_shapes: &["round", "oval", "pear", "cabochon", "marquise", "hexagon"],
    stone_types: &["sapphire", "emerald", "ruby", "morganite", "aquamarine", "opal", "tourmaline", "pearl"],
    stone_sizes: &["4 mm", "5 mm", "6 mm", "8 mm", "10 mm"],
    band_widths: &["1.5 mm", "2.0 mm", "3.0 mm", "4.0 mm"],
    pave: &["no pavé", "accent pavé", "scattered pavé"],
    budgets: &["$500 - $1,500", "$1,500 - $3,000", "$3,000 - $6,000", "$6,000+"],
    description: "Surprise me with a tasteful, wearable piece that feels unique and beautifully made.",
};

pub fn tables(mode: FlowType) -> &'static SurpriseTables {
    match mode {
        FlowType::Engagement => &ENGAGEMENT,
        FlowType::General => &GENERAL,
    }
}

/// Ephemeral structured input drawn from the surprise tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurpriseInputSample {
    pub mode: FlowType,
    pub project_type: String,
    pub style: String,
    pub metal_preference: String,
    pub stone_shape: String,
    pub stone_type: String,
    pub stone_size: String,
    pub band_width: String,
    pub pave: String,
    pub budget: String,
    pub description: String,
    pub num_concepts: usize,
}

fn pick<R: Rng>(rng: &mut R, options: &[&'static str]) -> String {
    options[rng.gen_range(0..options.len())].to_string()
}

/// Pure: the only source of variation is `rng`.
pub fn sample<R: Rng>(mode: FlowType, rng: &mut R) -> SurpriseInputSample {
    let t = tables(mode);
    SurpriseInputSample {
        mode,
        project_type: pick(rng, t.project_types),
        style: pick(rng, t.styles),
        metal_preference: pick(rng, t.metals),
        stone_shape: pick(rng, t.stone_shapes),
        stone_type: pick(rng, t.stone_types),
        stone_size: pick(rng, t.stone_sizes),
        band_width: pick(rng, t.band_widths),
        pave: pick(rng, t.pave),
        budget: pick(rng, t.budgets),
        description: t.description.to_string(),
        num_concepts: 1,
    }
}
