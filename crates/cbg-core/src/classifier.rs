//! Structural role inference for product image layers.
//!
//! Printify products carry no tag saying which upload is the body swatch and
//! which is a logo. Body textures repeat across every placement while trim
//! and logos show up once, in a trim-labelled position or at a small scale.
//! The functions here turn those signals into roles.

use crate::types::{ImageLayer, PrintArea};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

pub const DEFAULT_TRIM_KEYWORDS: &[&str] = &["waistband", "trim", "collar", "cuff"];
pub const DEFAULT_LOGO_SCALE_THRESHOLD: f64 = 0.4;

// ---------------------------------------------------------------------------
// TrimVocabulary
// ---------------------------------------------------------------------------

/// Position-label keywords that mark a placeholder as trim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimVocabulary {
    keywords: Vec<String>,
}

impl TrimVocabulary {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Case-insensitive substring match against any keyword.
    pub fn is_trim(&self, position: &str) -> bool {
        let pos = position.to_lowercase();
        self.keywords.iter().any(|k| pos.contains(k.as_str()))
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

impl Default for TrimVocabulary {
    fn default() -> Self {
        Self::new(DEFAULT_TRIM_KEYWORDS)
    }
}

// ---------------------------------------------------------------------------
// FrequencyTable
// ---------------------------------------------------------------------------

/// Counter that remembers first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrequencyTable {
    entries: Vec<(String, usize)>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str) {
        match self.index.get(key) {
            Some(&i) => self.entries[i].1 += 1,
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), 1));
            }
        }
    }

    pub fn count(&self, key: &str) -> usize {
        self.index.get(key).map(|&i| self.entries[i].1).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, usize)] {
        &self.entries
    }

    /// Highest count wins; on a tie the key seen first wins.
    pub fn dominant(&self) -> Option<(&str, usize)> {
        let mut best: Option<(&str, usize)> = None;
        for (key, count) in &self.entries {
            match best {
                Some((_, c)) if *count <= c => {}
                _ => best = Some((key.as_str(), *count)),
            }
        }
        best
    }
}

// ---------------------------------------------------------------------------
// Main image detection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MainImageAnalysis {
    pub main_id: Option<String>,
    /// Every layer of every placeholder.
    pub all_counts: FrequencyTable,
    /// Only layers in placeholders outside the trim vocabulary.
    pub body_counts: FrequencyTable,
}

/// Pick the body image: the most frequent identifier among non-trim
/// placeholders, falling back to the most frequent identifier overall.
pub fn analyze_main_image(areas: &[PrintArea], vocab: &TrimVocabulary) -> MainImageAnalysis {
    let mut all_counts = FrequencyTable::new();
    let mut body_counts = FrequencyTable::new();

    for area in areas {
        for ph in &area.placeholders {
            let trim = vocab.is_trim(&ph.position);
            for img in &ph.images {
                all_counts.add(&img.id);
                if !trim {
                    body_counts.add(&img.id);
                }
            }
        }
    }

    let main_id = body_counts
        .dominant()
        .or_else(|| all_counts.dominant())
        .map(|(id, _)| id.to_string());

    debug!(main = ?main_id, "main image analysis complete");

    MainImageAnalysis {
        main_id,
        all_counts,
        body_counts,
    }
}

// ---------------------------------------------------------------------------
// Template roles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtworkRole {
    Tile,
    Texture,
    Logo,
}

impl ArtworkRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtworkRole::Tile => "tile",
            ArtworkRole::Texture => "texture",
            ArtworkRole::Logo => "logo",
        }
    }

    /// Directory under the graphics root holding candidates for this role.
    pub fn dir_name(self) -> &'static str {
        match self {
            ArtworkRole::Tile => "tiles",
            ArtworkRole::Texture => "textures",
            ArtworkRole::Logo => "logos",
        }
    }

    pub fn parse(s: &str) -> Option<ArtworkRole> {
        match s.trim().to_lowercase().as_str() {
            "tile" | "tiles" => Some(ArtworkRole::Tile),
            "texture" | "textures" => Some(ArtworkRole::Texture),
            "logo" | "logos" => Some(ArtworkRole::Logo),
            _ => None,
        }
    }
}

impl fmt::Display for ArtworkRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image identifier → role, in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoleMap {
    entries: Vec<(String, ArtworkRole)>,
}

impl RoleMap {
    pub fn get(&self, image_id: &str) -> Option<ArtworkRole> {
        self.entries
            .iter()
            .find(|(id, _)| id == image_id)
            .map(|(_, r)| *r)
    }

    pub fn entries(&self) -> &[(String, ArtworkRole)] {
        &self.entries
    }

    /// Distinct roles present, in first-appearance order.
    pub fn roles(&self) -> Vec<ArtworkRole> {
        let mut out = Vec::new();
        for (_, role) in &self.entries {
            if !out.contains(role) {
                out.push(*role);
            }
        }
        out
    }

    pub fn ids_with_role(&self, role: ArtworkRole) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(move |(_, r)| *r == role)
            .map(|(id, _)| id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First assignment for an identifier sticks.
    fn assign(&mut self, image_id: &str, role: ArtworkRole) {
        if self.get(image_id).is_none() {
            self.entries.push((image_id.to_string(), role));
        }
    }
}

/// Role of a single layer when it is the first occurrence of its image.
pub fn template_role_for(layer: &ImageLayer, in_trim: bool, logo_scale_threshold: f64) -> ArtworkRole {
    if layer.is_tiled() {
        ArtworkRole::Tile
    } else if in_trim {
        ArtworkRole::Texture
    } else if layer.effective_scale() < logo_scale_threshold {
        ArtworkRole::Logo
    } else {
        ArtworkRole::Texture
    }
}

pub fn classify_template_roles(
    areas: &[PrintArea],
    vocab: &TrimVocabulary,
    logo_scale_threshold: f64,
) -> RoleMap {
    let mut roles = RoleMap::default();
    for area in areas {
        for ph in &area.placeholders {
            let trim = vocab.is_trim(&ph.position);
            for img in &ph.images {
                if roles.get(&img.id).is_some() {
                    continue;
                }
                let role = template_role_for(img, trim, logo_scale_threshold);
                debug!(image = %img.id, position = %ph.position, %role, "classified");
                roles.assign(&img.id, role);
            }
        }
    }
    roles
}

// ---------------------------------------------------------------------------
// Per-layer inspection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerRole {
    MainBody,
    Trim,
    Logo,
}

impl LayerRole {
    pub fn as_str(self) -> &'static str {
        match self {
            LayerRole::MainBody => "main_body",
            LayerRole::Trim => "trim",
            LayerRole::Logo => "logo",
        }
    }
}

impl fmt::Display for LayerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the conservative clone would swap this layer: it is the main
/// image, or a full-coverage layer outside trim positions.
pub fn is_body_layer(
    layer: &ImageLayer,
    in_trim: bool,
    main_id: Option<&str>,
    scale_threshold: f64,
) -> bool {
    main_id == Some(layer.id.as_str()) || (!in_trim && layer.effective_scale() > scale_threshold)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerReport {
    pub position: String,
    pub layer_index: usize,
    pub image_id: String,
    pub scale: f64,
    pub role: LayerRole,
}

pub fn inspect_layers(
    areas: &[PrintArea],
    vocab: &TrimVocabulary,
    main_id: Option<&str>,
    scale_threshold: f64,
) -> Vec<LayerReport> {
    let mut out = Vec::new();
    for area in areas {
        for ph in &area.placeholders {
            let trim = vocab.is_trim(&ph.position);
            for (i, img) in ph.images.iter().enumerate() {
                let role = if is_body_layer(img, trim, main_id, scale_threshold) {
                    LayerRole::MainBody
                } else if trim {
                    LayerRole::Trim
                } else {
                    LayerRole::Logo
                };
                out.push(LayerReport {
                    position: ph.position.clone(),
                    layer_index: i,
                    image_id: img.id.clone(),
                    scale: img.effective_scale(),
                    role,
                });
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
