use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Products whose title starts with this prefix are fabrication templates.
pub const TEMPLATE_PREFIX: &str = "[TEMPLATE]: ";

/// Unknown upstream fields, carried through untouched.
pub type Extra = Map<String, Value>;

// ---------------------------------------------------------------------------
// Product
// ---------------------------------------------------------------------------

/// A Printify product as returned by `GET /shops/{shop}/products/{id}.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub blueprint_id: u64,
    pub print_provider_id: u64,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub print_areas: Vec<PrintArea>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Product {
    pub fn is_template(&self) -> bool {
        self.title.starts_with(TEMPLATE_PREFIX)
    }

    /// Title with the template prefix removed.
    pub fn template_base_title(&self) -> &str {
        self.title
            .strip_prefix(TEMPLATE_PREFIX)
            .unwrap_or(&self.title)
            .trim()
    }

    /// Iterate `(position, layer)` over every layer of every print area.
    pub fn layers(&self) -> impl Iterator<Item = (&str, &ImageLayer)> {
        self.print_areas.iter().flat_map(|area| {
            area.placeholders.iter().flat_map(|ph| {
                ph.images
                    .iter()
                    .map(move |img| (ph.position.as_str(), img))
            })
        })
    }

    pub fn references_image(&self, image_id: &str) -> bool {
        self.layers().any(|(_, img)| img.id == image_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: u64,
    #[serde(default)]
    pub price: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Variant {
    /// Variants without an explicit flag count as enabled.
    pub fn enabled(&self) -> bool {
        self.is_enabled.unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintArea {
    #[serde(default)]
    pub variant_ids: Vec<u64>,
    #[serde(default)]
    pub placeholders: Vec<Placeholder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placeholder {
    #[serde(default)]
    pub position: String,
    /// Bottom-to-top layer stack.
    #[serde(default)]
    pub images: Vec<ImageLayer>,
    #[serde(flatten)]
    pub extra: Extra,
}

// ---------------------------------------------------------------------------
// ImageLayer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageLayer {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
    /// Tiling settings; opaque to us.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// `src`, `name`, `type` and whatever else describes the referenced image.
    #[serde(flatten)]
    pub extra: Extra,
}

impl ImageLayer {
    pub const DEFAULT_OFFSET: f64 = 0.5;
    pub const DEFAULT_SCALE: f64 = 1.0;
    pub const DEFAULT_ANGLE: f64 = 0.0;

    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            x: None,
            y: None,
            scale: None,
            angle: None,
            pattern: None,
            width: None,
            height: None,
            extra: Extra::new(),
        }
    }

    pub fn is_tiled(&self) -> bool {
        self.pattern.is_some()
    }

    pub fn effective_scale(&self) -> f64 {
        self.scale.unwrap_or(Self::DEFAULT_SCALE)
    }

    /// Same placement, different image. Geometry and tiling carry over;
    /// fields describing the old image are dropped. Printify requires the
    /// four geometry fields on create, so absent ones get their defaults.
    pub fn swapped(&self, new_id: &str) -> ImageLayer {
        ImageLayer {
            id: new_id.to_string(),
            x: Some(self.x.unwrap_or(Self::DEFAULT_OFFSET)),
            y: Some(self.y.unwrap_or(Self::DEFAULT_OFFSET)),
            scale: Some(self.effective_scale()),
            angle: Some(self.angle.unwrap_or(Self::DEFAULT_ANGLE)),
            pattern: self.pattern.clone(),
            width: self.width,
            height: self.height,
            extra: Extra::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Listing / catalog responses
// ---------------------------------------------------------------------------

/// One page of `GET /shops/{shop}/products.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductPage {
    #[serde(default)]
    pub data: Vec<Product>,
    #[serde(default = "first_page")]
    pub current_page: u32,
    #[serde(default = "first_page")]
    pub last_page: u32,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blueprint {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Response of `POST /uploads/images.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedImage {
    pub id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
