//! Artwork synthesis. The Stable Diffusion WebUI client lives here; the
//! Gemini client is in [`crate::gemini`]. Both implement [`ArtworkBackend`].
//!
//! Generated images land in `{graphics_root}/{type}/{stamp}__{slug}/` next to
//! a `prompt.txt` sidecar, which is where the artwork resolver looks for them.

use crate::classifier::ArtworkRole;
use crate::error::{CbgError, Result};
use crate::io;
use crate::paths::{self, GRAPHICS_README, PROMPT_FILE};
use base64::Engine as _;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const STANDALONE: &str = "standalone";
pub const TILES: &str = "tiles";
pub const TEXTURES: &str = "textures";
const LOGOS: &str = "logos";

const TILE_TOKENS: &[&str] = &["tile", "tiles", "tiled", "tiling", "seamless", "repeat", "repeatable"];

// ---------------------------------------------------------------------------
// Prompt composition
// ---------------------------------------------------------------------------

fn role_modifier(role: Option<ArtworkRole>) -> &'static str {
    match role {
        Some(ArtworkRole::Tile) => {
            "seamless textile pattern, repeatable surface design, flat layout, architectural motif"
        }
        Some(ArtworkRole::Texture) => {
            "macro material detail, industrial surface texture, weathered finish, high-fidelity map"
        }
        Some(ArtworkRole::Logo) => {
            "minimalist vector icon, clinical stamp, high-contrast sigil, white or black background"
        }
        None => "high-fidelity 4k render, industrial noir aesthetic, cinematic lighting, sharp detail",
    }
}

/// House-style prompt for `theme`. A `base_prompt` replaces the role
/// modifier entirely. `role = None` means standalone art.
pub fn compose_prompt(theme: &str, role: Option<ArtworkRole>, base_prompt: Option<&str>) -> String {
    if let Some(base) = base_prompt.map(str::trim).filter(|b| !b.is_empty()) {
        return format!("CBG Studio | {theme} Style: {base}");
    }
    format!(
        "CBG Studio | {theme} Aesthetics: {}, industrial noir color palette, phosphor green accents, sharp details, high contrast.",
        role_modifier(role)
    )
}

// ---------------------------------------------------------------------------
// Graphic type routing
// ---------------------------------------------------------------------------

/// Output categories and their descriptions, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicTypes {
    entries: Vec<(String, String)>,
}

impl Default for GraphicTypes {
    fn default() -> Self {
        Self {
            entries: vec![
                (STANDALONE.to_string(), "standalone images".to_string()),
                (TEXTURES.to_string(), "textures for trim or overlays".to_string()),
                (TILES.to_string(), "graphics meant to be tiled".to_string()),
            ],
        }
    }
}

impl GraphicTypes {
    /// Parse `## heading` sections of the graphics README. `logos` is
    /// curated by hand and never a generation target.
    pub fn parse(readme: &str) -> Self {
        let mut entries: Vec<(String, String)> = Vec::new();
        let mut current: Option<(String, Vec<String>)> = None;

        for line in readme.lines() {
            let line = line.trim();
            if let Some(heading) = line.strip_prefix("## ") {
                if let Some((key, body)) = current.take() {
                    entries.push((key, body.join(" ")));
                }
                current = Some((heading.trim().to_lowercase(), Vec::new()));
                continue;
            }
            if let Some((_, body)) = current.as_mut() {
                if !line.is_empty() {
                    body.push(line.to_string());
                }
            }
        }
        if let Some((key, body)) = current {
            entries.push((key, body.join(" ")));
        }

        if entries.is_empty() {
            return Self::default();
        }
        if entries.iter().any(|(k, _)| k == "anchors") && !entries.iter().any(|(k, _)| k == STANDALONE) {
            let desc = entries
                .iter()
                .find(|(k, _)| k == "anchors")
                .map(|(_, d)| d.clone())
                .unwrap_or_default();
            entries.push((STANDALONE.to_string(), desc));
        }
        entries.retain(|(k, _)| k != LOGOS);
        Self { entries }
    }

    pub fn load(graphics_root: &Path) -> Self {
        match std::fs::read_to_string(graphics_root.join(GRAPHICS_README)) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Route a prompt to a category: tiling vocabulary forces `tiles`,
    /// otherwise keyword overlap with each description decides, and a
    /// prompt matching nothing goes to `standalone`.
    pub fn classify(&self, prompt: &str) -> String {
        let prompt_lower = prompt.to_lowercase();
        let tokens: HashSet<String> = paths::tokenize(prompt).into_iter().collect();

        if TILE_TOKENS.iter().any(|t| tokens.contains(*t)) && self.contains(TILES) {
            return TILES.to_string();
        }

        let mut best: Option<(&str, u32)> = None;
        for (key, desc) in &self.entries {
            let mut candidates: HashSet<String> = paths::tokenize(key).into_iter().collect();
            candidates.extend(paths::tokenize(desc));
            let score: u32 = candidates
                .iter()
                .filter(|c| c.len() >= 4)
                .map(|c| {
                    if tokens.contains(c) {
                        2
                    } else if prompt_lower.contains(c.as_str()) {
                        1
                    } else {
                        0
                    }
                })
                .sum();
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((key.as_str(), score));
            }
        }

        match best {
            Some((key, score)) if score > 0 => key.to_string(),
            Some((key, _)) => {
                if self.contains(STANDALONE) {
                    STANDALONE.to_string()
                } else if self.contains("anchors") {
                    "anchors".to_string()
                } else {
                    key.to_string()
                }
            }
            None => STANDALONE.to_string(),
        }
    }

    /// Honour an explicit override when it names a known category.
    pub fn resolve(&self, prompt: &str, override_type: Option<&str>) -> String {
        let wanted = override_type.map(|o| o.trim().to_lowercase());
        let wanted = match wanted.as_deref() {
            Some("anchors") => Some(STANDALONE.to_string()),
            other => other.map(str::to_string),
        };
        match wanted {
            Some(w) if self.contains(&w) => w,
            _ => self.classify(prompt),
        }
    }
}

// ---------------------------------------------------------------------------
// txt2img parameters and OOM ladder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Txt2ImgParams {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfg_scale: f64,
    pub sampler_name: String,
    pub seed: i64,
    pub batch_size: u32,
    pub n_iter: u32,
}

impl Txt2ImgParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: String::new(),
            width: 320,
            height: 320,
            steps: 6,
            cfg_scale: 7.0,
            sampler_name: "Euler a".to_string(),
            seed: -1,
            batch_size: 1,
            n_iter: 1,
        }
    }

    fn with_profile(&self, (width, height, steps): (u32, u32, u32)) -> Self {
        Self {
            width,
            height,
            steps,
            ..self.clone()
        }
    }
}

fn round_to_64(v: u32) -> u32 {
    (v / 64 * 64).max(64)
}

/// Smaller (width, height, steps) profiles to fall back to when the GPU
/// runs out of memory.
pub fn oom_fallback_ladder(width: u32, height: u32, steps: u32) -> [(u32, u32, u32); 4] {
    let w = round_to_64(width);
    let h = round_to_64(height);
    [
        (w.clamp(256, 384), h.clamp(256, 384), steps.clamp(4, 8)),
        (w.clamp(256, 320), h.clamp(256, 320), steps.clamp(4, 6)),
        (256, 256, steps.clamp(4, 6)),
        (256, 256, 4),
    ]
}

/// Requested profile first, then the ladder, without repeats.
pub fn attempt_profiles(params: &Txt2ImgParams, fallback: bool) -> Vec<(u32, u32, u32)> {
    let mut out = vec![(params.width, params.height, params.steps)];
    if fallback {
        for p in oom_fallback_ladder(params.width, params.height, params.steps) {
            if !out.contains(&p) {
                out.push(p);
            }
        }
    }
    out
}

pub fn is_oom(error_text: &str) -> bool {
    let lower = error_text.to_lowercase();
    lower.contains("outofmemoryerror") || lower.contains("cuda out of memory")
}

// ---------------------------------------------------------------------------
// DiffusionClient
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Txt2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    info: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedArtwork {
    pub graphic_type: String,
    pub run_dir: PathBuf,
    pub files: Vec<PathBuf>,
    /// Profile actually used, when it differs from the requested one.
    pub fallback: Option<(u32, u32, u32)>,
    pub info: Value,
}

pub struct DiffusionClient {
    http: Client,
    base_url: String,
    basic_auth: Option<(String, String)>,
    auto_fallback_on_oom: bool,
}

impl DiffusionClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            basic_auth: None,
            auto_fallback_on_oom: true,
        })
    }

    /// `user:password`, as in the `SD_WEBUI_AUTH` variable.
    #[must_use]
    pub fn with_auth(mut self, auth: Option<&str>) -> Self {
        self.basic_auth = auth
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(|a| match a.split_once(':') {
                Some((u, p)) => (u.to_string(), p.to_string()),
                None => (a.to_string(), String::new()),
            });
        self
    }

    #[must_use]
    pub fn with_oom_fallback(mut self, enabled: bool) -> Self {
        self.auto_fallback_on_oom = enabled;
        self
    }

    fn url(&self, route: &str) -> String {
        format!("{}/{}", self.base_url, route.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, route: &str) -> reqwest::blocking::RequestBuilder {
        let req = self.http.request(method, self.url(route));
        match &self.basic_auth {
            Some((u, p)) => req.basic_auth(u, Some(p)),
            None => req,
        }
    }

    pub fn healthcheck(&self) -> bool {
        self.request(reqwest::Method::GET, "/sdapi/v1/options")
            .send()
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// One txt2img call. `Err(text)` carries the server's error text.
    fn txt2img(&self, params: &Txt2ImgParams) -> Result<std::result::Result<Txt2ImgResponse, String>> {
        let resp = self
            .request(reqwest::Method::POST, "/sdapi/v1/txt2img")
            .json(params)
            .send()?;
        if resp.status().is_success() {
            return Ok(Ok(resp.json()?));
        }
        let status = resp.status();
        let raw = resp.text().unwrap_or_default();
        let message = serde_json::from_str::<Value>(&raw)
            .ok()
            .and_then(|v| {
                v.get("errors")
                    .or_else(|| v.get("error"))
                    .or_else(|| v.get("detail"))
                    .map(|e| match e {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
            })
            .unwrap_or_else(|| format!("{status}"));
        Ok(Err(format!("{message} {raw}")))
    }

    /// Generate artwork and save it under `graphics_root`.
    pub fn generate(
        &self,
        params: &Txt2ImgParams,
        graphics_root: &Path,
        type_override: Option<&str>,
    ) -> Result<GeneratedArtwork> {
        if params.prompt.trim().is_empty() {
            return Err(CbgError::InvalidArgument("empty prompt is not allowed".to_string()));
        }
        if !self.healthcheck() {
            return Err(CbgError::Generation(format!(
                "diffusion API not reachable at {}",
                self.base_url
            )));
        }

        let profiles = attempt_profiles(params, self.auto_fallback_on_oom);
        let mut last_error = String::new();

        for (i, profile) in profiles.iter().enumerate() {
            let attempt = params.with_profile(*profile);
            let response = match self.txt2img(&attempt)? {
                Ok(r) => r,
                Err(text) => {
                    let retry = is_oom(&text) && self.auto_fallback_on_oom && i + 1 < profiles.len();
                    if retry {
                        warn!(width = profile.0, height = profile.1, steps = profile.2, "out of memory; trying smaller profile");
                        last_error = text;
                        continue;
                    }
                    return Err(CbgError::Generation(format!("txt2img request failed: {text}")));
                }
            };

            if response.images.is_empty() {
                return Err(CbgError::Generation("txt2img returned no images".to_string()));
            }

            let RunSlot {
                graphic_type,
                run_dir,
                stamp,
            } = RunSlot::open(graphics_root, &params.prompt, type_override)?;
            write_prompt_file(&run_dir, &attempt)?;

            let mut files = Vec::new();
            for (n, blob) in response.images.iter().enumerate() {
                let bytes = decode_image(blob)?;
                let path = run_dir.join(format!("specimen_{stamp}_{:02}.png", n + 1));
                io::atomic_write(&path, &bytes)?;
                files.push(path);
            }

            let info = match response.info {
                Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
                other => other,
            };
            info!(count = files.len(), graphic_type = %graphic_type, dir = %run_dir.display(), "artwork generated");
            return Ok(GeneratedArtwork {
                graphic_type,
                run_dir,
                files,
                fallback: (i > 0).then_some(*profile),
                info,
            });
        }

        Err(CbgError::Generation(format!(
            "txt2img failed after fallback attempts: {last_error}"
        )))
    }
}

/// Sampling settings reused for every prompt sent through the trait.
pub struct DiffusionBackend {
    client: DiffusionClient,
    sampling: Txt2ImgParams,
}

impl DiffusionBackend {
    pub fn new(client: DiffusionClient, sampling: Txt2ImgParams) -> Self {
        Self { client, sampling }
    }
}

impl ArtworkBackend for DiffusionBackend {
    fn name(&self) -> &'static str {
        "diffusion"
    }

    fn render(&self, prompt: &str, graphics_root: &Path, type_override: Option<&str>) -> Result<GeneratedArtwork> {
        let params = Txt2ImgParams {
            prompt: prompt.to_string(),
            ..self.sampling.clone()
        };
        self.client.generate(&params, graphics_root, type_override)
    }
}

// ---------------------------------------------------------------------------
// Shared output layout
// ---------------------------------------------------------------------------

/// An image service that turns a prompt into files under the graphics root.
pub trait ArtworkBackend {
    fn name(&self) -> &'static str;

    fn render(&self, prompt: &str, graphics_root: &Path, type_override: Option<&str>) -> Result<GeneratedArtwork>;
}

/// A freshly created `{type}/{stamp}__{slug}` directory.
pub(crate) struct RunSlot {
    pub graphic_type: String,
    pub run_dir: PathBuf,
    pub stamp: String,
}

impl RunSlot {
    pub(crate) fn open(graphics_root: &Path, prompt: &str, type_override: Option<&str>) -> Result<Self> {
        let graphic_type = GraphicTypes::load(graphics_root).resolve(prompt, type_override);
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let run_dir = paths::run_dir(graphics_root, &graphic_type, &stamp, &paths::slugify_prompt(prompt));
        io::ensure_dir(&run_dir)?;
        Ok(Self {
            graphic_type,
            run_dir,
            stamp,
        })
    }
}

pub(crate) fn decode_image(blob: &str) -> Result<Vec<u8>> {
    let data = blob.split_once(',').map(|(_, d)| d).unwrap_or(blob);
    base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| CbgError::Generation(format!("invalid image payload: {e}")))
}

fn write_prompt_file(run_dir: &Path, params: &Txt2ImgParams) -> Result<()> {
    let body = format!(
        "prompt: {}\nnegative_prompt: {}\n\nparameters:\n{}\n",
        params.prompt,
        params.negative_prompt,
        serde_json::to_string_pretty(params)?
    );
    io::atomic_write(&run_dir.join(PROMPT_FILE), body.as_bytes())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
