//! Image generation through the Gemini `generateContent` endpoint
//! ("Nanobanana"). Output follows the same run-directory layout as the
//! diffusion backend, with a single `specimen.png` per run.

use crate::credentials::GeminiKey;
use crate::error::{CbgError, Result};
use crate::generator::{decode_image, ArtworkBackend, GeneratedArtwork, RunSlot};
use crate::io;
use crate::paths::PROMPT_FILE;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const SPECIMEN_FILE: &str = "specimen.png";
const ASPECT_RATIO: &str = "1:1";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: [&'static str; 2],
    image_config: Value,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: Option<String>,
    data: String,
}

impl GenerateContentResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
    }
}

pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
    key: GeminiKey,
}

impl GeminiClient {
    pub fn new(key: GeminiKey, base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn generate_content(&self, prompt: &str) -> Result<GenerateContentResponse> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![TextPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_modalities: ["IMAGE", "TEXT"],
                image_config: json!({ "aspectRatio": ASPECT_RATIO }),
            },
        };
        debug!(model = %self.model, "gemini generateContent");
        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", self.key.as_str())
            .json(&body)
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(CbgError::Generation(format!(
                "gemini request failed ({}): {text}",
                status.as_u16()
            )));
        }
        Ok(resp.json()?)
    }

    /// Generate one image and save it as `specimen.png` in a new run directory.
    pub fn generate(&self, prompt: &str, graphics_root: &Path, type_override: Option<&str>) -> Result<GeneratedArtwork> {
        if prompt.trim().is_empty() {
            return Err(CbgError::InvalidArgument("empty prompt is not allowed".to_string()));
        }
        let response = self.generate_content(prompt)?;

        let notes: Vec<&str> = response.parts().filter_map(|p| p.text.as_deref()).collect();
        for note in &notes {
            info!(model = %self.model, "gemini: {note}");
        }
        let Some(image) = response.parts().find_map(|p| p.inline_data.as_ref()) else {
            return Err(CbgError::Generation(format!(
                "gemini returned no image{}",
                if notes.is_empty() { String::new() } else { format!(": {}", notes.join(" ")) }
            )));
        };
        let bytes = decode_image(&image.data)?;

        let slot = RunSlot::open(graphics_root, prompt, type_override)?;
        let path = slot.run_dir.join(SPECIMEN_FILE);
        io::atomic_write(&path, &bytes)?;
        let sidecar = format!("prompt: {prompt}\nmodel: {}\ntimestamp: {}\n", self.model, slot.stamp);
        io::atomic_write(&slot.run_dir.join(PROMPT_FILE), sidecar.as_bytes())?;

        info!(graphic_type = %slot.graphic_type, dir = %slot.run_dir.display(), "artwork generated");
        Ok(GeneratedArtwork {
            graphic_type: slot.graphic_type,
            run_dir: slot.run_dir,
            files: vec![path],
            fallback: None,
            info: json!({
                "model": self.model,
                "mime_type": image.mime_type,
                "text": notes,
            }),
        })
    }
}

impl ArtworkBackend for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn render(&self, prompt: &str, graphics_root: &Path, type_override: Option<&str>) -> Result<GeneratedArtwork> {
        self.generate(prompt, graphics_root, type_override)
    }
}
