//! Builds product-creation payloads from a source product.
//!
//! Only image identifiers change. Layers not selected for a swap are copied
//! exactly; swapped layers keep their geometry.

use crate::classifier::{is_body_layer, TrimVocabulary};
use crate::paths;
use crate::types::{ImageLayer, Placeholder, PrintArea, Product, Variant};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

pub const MAX_TITLE_CHARS: usize = 100;
pub const TITLE_BRAND: &str = "CBG Studio";

// ---------------------------------------------------------------------------
// Payload types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateProductPayload {
    pub title: String,
    pub description: String,
    pub blueprint_id: u64,
    pub print_provider_id: u64,
    pub variants: Vec<PayloadVariant>,
    pub print_areas: Vec<PrintArea>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadVariant {
    pub id: u64,
    pub price: u64,
    pub is_enabled: bool,
}

impl From<&Variant> for PayloadVariant {
    fn from(v: &Variant) -> Self {
        Self {
            id: v.id,
            price: v.price,
            is_enabled: true,
        }
    }
}

// ---------------------------------------------------------------------------
// ReplacementMap
// ---------------------------------------------------------------------------

/// Original image id → newly uploaded image id. Filled once per run, then
/// only read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplacementMap {
    map: HashMap<String, String>,
}

impl ReplacementMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, original: impl Into<String>, replacement: impl Into<String>) {
        self.map.insert(original.into(), replacement.into());
    }

    pub fn get(&self, original: &str) -> Option<&str> {
        self.map.get(original).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// ---------------------------------------------------------------------------
// SwapPlan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SwapPlan {
    /// Swap the body only: the main image plus any full-coverage layer
    /// outside trim positions.
    Conservative {
        main_id: Option<String>,
        new_image_id: String,
    },
    /// Swap everything except `logo_id`. Body layers get the body artwork,
    /// the rest get the trim artwork when one was supplied.
    Aggressive {
        main_id: Option<String>,
        body_image_id: String,
        trim_image_id: Option<String>,
        logo_id: String,
    },
    /// Swap exactly the identifiers present in the map.
    Template(ReplacementMap),
}

pub struct Synthesizer {
    vocab: TrimVocabulary,
    scale_threshold: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub payload: CreateProductPayload,
    pub swapped_layers: usize,
}

impl Synthesizer {
    pub fn new(vocab: TrimVocabulary, scale_threshold: f64) -> Self {
        Self {
            vocab,
            scale_threshold,
        }
    }

    /// New image id for `layer`, or `None` to keep it as is.
    pub fn replacement_for<'p>(
        &self,
        plan: &'p SwapPlan,
        layer: &ImageLayer,
        in_trim: bool,
    ) -> Option<&'p str> {
        match plan {
            SwapPlan::Conservative {
                main_id,
                new_image_id,
            } => is_body_layer(layer, in_trim, main_id.as_deref(), self.scale_threshold)
                .then_some(new_image_id.as_str()),
            SwapPlan::Aggressive {
                main_id,
                body_image_id,
                trim_image_id,
                logo_id,
            } => {
                if layer.id == *logo_id {
                    None
                } else if is_body_layer(layer, in_trim, main_id.as_deref(), self.scale_threshold) {
                    Some(body_image_id.as_str())
                } else {
                    Some(trim_image_id.as_deref().unwrap_or(body_image_id.as_str()))
                }
            }
            SwapPlan::Template(map) => map.get(&layer.id),
        }
    }

    pub fn synthesize(
        &self,
        source: &Product,
        plan: &SwapPlan,
        title: &str,
        description: &str,
    ) -> Synthesis {
        let mut swapped_layers = 0;
        let mut print_areas = Vec::new();

        for area in &source.print_areas {
            let mut placeholders = Vec::new();
            for ph in &area.placeholders {
                if ph.images.is_empty() {
                    continue;
                }
                let in_trim = self.vocab.is_trim(&ph.position);
                let images = ph
                    .images
                    .iter()
                    .map(|layer| match self.replacement_for(plan, layer, in_trim) {
                        Some(new_id) => {
                            debug!(position = %ph.position, from = %layer.id, to = new_id, "swapping layer");
                            swapped_layers += 1;
                            layer.swapped(new_id)
                        }
                        None => layer.clone(),
                    })
                    .collect();
                placeholders.push(Placeholder {
                    position: ph.position.clone(),
                    images,
                    extra: Default::default(),
                });
            }
            if placeholders.is_empty() {
                continue;
            }
            print_areas.push(PrintArea {
                variant_ids: area.variant_ids.clone(),
                placeholders,
                background: area.background.clone(),
                extra: Default::default(),
            });
        }

        let payload = CreateProductPayload {
            title: truncate_title(title),
            description: description.to_string(),
            blueprint_id: source.blueprint_id,
            print_provider_id: source.print_provider_id,
            variants: enabled_variants(source),
            print_areas,
        };
        Synthesis {
            payload,
            swapped_layers,
        }
    }
}

pub fn enabled_variants(source: &Product) -> Vec<PayloadVariant> {
    source
        .variants
        .iter()
        .filter(|v| v.enabled())
        .map(PayloadVariant::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Titles
// ---------------------------------------------------------------------------

/// Titles over 100 characters become the first 97 plus `...`.
pub fn truncate_title(title: &str) -> String {
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title.to_string();
    }
    let mut out: String = title.chars().take(MAX_TITLE_CHARS - 3).collect();
    out.push_str("...");
    out
}

/// `CBG Studio | {base} | {name}`, with the name taken from the first
/// artwork prompt when there is one.
pub fn template_title(base: &str, prompt: Option<&str>) -> String {
    let name = prompt
        .map(|p| {
            paths::tokenize(p)
                .into_iter()
                .take(4)
                .map(|w| capitalize(&w))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "Specimen".to_string());
    truncate_title(&format!("{TITLE_BRAND} | {base} | {name}"))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::analyze_main_image;
    use serde_json::json;

    fn source() -> Product {
        serde_json::from_value(json!({
            "id": "src",
            "title": "Glitch Plaid Zip Hoodie",
            "description": "warm",
            "blueprint_id": 450,
            "print_provider_id": 1,
            "variants": [
                {"id": 11, "price": 4999, "is_enabled": true},
                {"id": 12, "price": 4999, "is_enabled": false},
                {"id": 13, "price": 5299}
            ],
            "print_areas": [{
                "variant_ids": [11, 12, 13],
                "background": "#101010",
                "placeholders": [
                    {"position": "front", "images": [
                        {"id": "imgX", "x": 0.5, "y": 0.5, "scale": 0.9, "angle": 0,
                         "src": "https://cdn/x.png", "name": "x.png"}
                    ]},
                    {"position": "front", "images": [
                        {"id": "imgX", "x": 0.45, "y": 0.55, "scale": 1.1, "angle": 15}
                    ]},
                    {"position": "waistband", "images": [
                        {"id": "imgY", "x": 0.5, "y": 0.5, "scale": 0.3, "angle": 0, "name": "y.png"}
                    ]},
                    {"position": "back", "images": []}
                ]
            }]
        }))
        .unwrap()
    }

    fn synth() -> Synthesizer {
        Synthesizer::new(TrimVocabulary::default(), 0.4)
    }

    fn conservative(product: &Product, new_id: &str) -> SwapPlan {
        let main = analyze_main_image(&product.print_areas, &TrimVocabulary::default()).main_id;
        SwapPlan::Conservative {
            main_id: main,
            new_image_id: new_id.to_string(),
        }
    }

    fn layers(payload: &CreateProductPayload) -> Vec<&ImageLayer> {
        payload
            .print_areas
            .iter()
            .flat_map(|a| a.placeholders.iter())
            .flat_map(|p| p.images.iter())
            .collect()
    }

    #[test]
    fn conservative_swaps_body_and_keeps_trim() {
        let product = source();
        let out = synth().synthesize(&product, &conservative(&product, "imgZ"), "T", "D");
        let got = layers(&out.payload);
        assert_eq!(out.swapped_layers, 2);
        assert_eq!(got[0].id, "imgZ");
        assert_eq!(got[1].id, "imgZ");
        assert_eq!(got[2], &product.print_areas[0].placeholders[2].images[0]);
    }

    #[test]
    fn swapped_layers_keep_geometry() {
        let product = source();
        let out = synth().synthesize(&product, &conservative(&product, "imgZ"), "T", "D");
        let originals: Vec<&ImageLayer> = product.layers().map(|(_, l)| l).collect();
        for (orig, new) in originals.iter().zip(layers(&out.payload)) {
            assert_eq!(orig.x, new.x);
            assert_eq!(orig.y, new.y);
            assert_eq!(orig.scale, new.scale);
            assert_eq!(orig.angle, new.angle);
        }
    }

    #[test]
    fn conservative_catches_hidden_full_coverage_layer() {
        let mut product = source();
        product.print_areas[0].placeholders[0]
            .images
            .insert(0, ImageLayer { scale: Some(0.8), ..ImageLayer::new("hidden") });
        let out = synth().synthesize(&product, &conservative(&product, "imgZ"), "T", "D");
        assert_eq!(layers(&out.payload)[0].id, "imgZ");
    }

    #[test]
    fn aggressive_preserves_only_the_logo() {
        let mut product = source();
        product.print_areas[0].placeholders[0]
            .images
            .push(ImageLayer { scale: Some(0.2), ..ImageLayer::new("logo1") });
        let plan = SwapPlan::Aggressive {
            main_id: Some("imgX".into()),
            body_image_id: "body".into(),
            trim_image_id: Some("trim".into()),
            logo_id: "logo1".into(),
        };
        let out = synth().synthesize(&product, &plan, "T", "D");
        let ids: Vec<&str> = layers(&out.payload).iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["body", "logo1", "body", "trim"]);
    }

    #[test]
    fn aggressive_without_trim_uses_body_everywhere() {
        let product = source();
        let plan = SwapPlan::Aggressive {
            main_id: Some("imgX".into()),
            body_image_id: "body".into(),
            trim_image_id: None,
            logo_id: "absent".into(),
        };
        let out = synth().synthesize(&product, &plan, "T", "D");
        assert!(layers(&out.payload).iter().all(|l| l.id == "body"));
    }

    #[test]
    fn template_mode_swaps_only_mapped_ids() {
        let product = source();
        let mut map = ReplacementMap::new();
        map.insert("imgY", "newY");
        let out = synth().synthesize(&product, &SwapPlan::Template(map), "T", "D");
        let got = layers(&out.payload);
        assert_eq!(got[0], &product.print_areas[0].placeholders[0].images[0]);
        assert_eq!(got[2].id, "newY");
        assert!(got[2].extra.is_empty());
        assert_eq!(out.swapped_layers, 1);
    }

    #[test]
    fn payload_carries_product_fields_and_enabled_variants() {
        let product = source();
        let out = synth().synthesize(&product, &SwapPlan::Template(ReplacementMap::new()), "Title", "Desc");
        let p = out.payload;
        assert_eq!(p.title, "Title");
        assert_eq!(p.description, "Desc");
        assert_eq!(p.blueprint_id, 450);
        assert_eq!(p.print_provider_id, 1);
        let ids: Vec<u64> = p.variants.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![11, 13]);
        assert!(p.variants.iter().all(|v| v.is_enabled));
        assert_eq!(p.print_areas[0].background.as_deref(), Some("#101010"));
        assert_eq!(p.print_areas[0].variant_ids, vec![11, 12, 13]);
        // The empty "back" placeholder is dropped.
        assert_eq!(p.print_areas[0].placeholders.len(), 3);
    }

    #[test]
    fn payload_serializes_without_absent_fields() {
        let product = source();
        let out = synth().synthesize(&product, &SwapPlan::Template(ReplacementMap::new()), "T", "D");
        let value = serde_json::to_value(&out.payload).unwrap();
        let kept = &value["print_areas"][0]["placeholders"][0]["images"][0];
        assert_eq!(kept["src"], "https://cdn/x.png");
        assert!(kept.get("pattern").is_none());
    }

    #[test]
    fn title_truncation() {
        assert_eq!(truncate_title("short"), "short");
        let exact = "x".repeat(100);
        assert_eq!(truncate_title(&exact), exact);
        let long = "y".repeat(140);
        let t = truncate_title(&long);
        assert_eq!(t.chars().count(), 100);
        assert!(t.ends_with("..."));
        assert_eq!(&t[..97], &long[..97]);
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let long = "é".repeat(120);
        let t = truncate_title(&long);
        assert_eq!(t.chars().count(), 100);
    }

    #[test]
    fn synthesized_long_title_is_truncated() {
        let product = source();
        let long = format!("{} {}", product.title, "// PROTOCOL_TEST_AGGRESSIVE ".repeat(5));
        let out = synth().synthesize(&product, &conservative(&product, "imgZ"), &long, "D");
        assert_eq!(out.payload.title.chars().count(), 100);
    }

    #[test]
    fn template_title_uses_prompt_words() {
        assert_eq!(
            template_title("Skater Skirt", Some("obsidian lattice, phosphor green glow")),
            "CBG Studio | Skater Skirt | Obsidian Lattice Phosphor Green"
        );
        assert_eq!(template_title("Tee", None), "CBG Studio | Tee | Specimen");
    }
}
