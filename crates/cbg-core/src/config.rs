use crate::classifier::{TrimVocabulary, DEFAULT_LOGO_SCALE_THRESHOLD, DEFAULT_TRIM_KEYWORDS};
use crate::error::Result;
use crate::paths;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_SHOP_ID: &str = "12043562";
pub const DEFAULT_API_BASE: &str = "https://api.printify.com/v1";
pub const DEFAULT_DIFFUSION_URL: &str = "http://127.0.0.1:7860";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3.1-flash-image-preview";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ClassifierConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_trim_keywords")]
    pub trim_keywords: Vec<String>,
    /// Layers scaled below this are logos; above it (outside trim) are body.
    #[serde(default = "default_logo_scale_threshold")]
    pub logo_scale_threshold: f64,
}

fn default_trim_keywords() -> Vec<String> {
    DEFAULT_TRIM_KEYWORDS.iter().map(|s| s.to_string()).collect()
}

fn default_logo_scale_threshold() -> f64 {
    DEFAULT_LOGO_SCALE_THRESHOLD
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            trim_keywords: default_trim_keywords(),
            logo_scale_threshold: default_logo_scale_threshold(),
        }
    }
}

impl ClassifierConfig {
    pub fn vocabulary(&self) -> TrimVocabulary {
        TrimVocabulary::new(&self.trim_keywords)
    }
}

// ---------------------------------------------------------------------------
// DiffusionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffusionConfig {
    #[serde(default = "default_diffusion_url")]
    pub url: String,
    #[serde(default = "default_diffusion_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub auto_fallback_on_oom: bool,
}

fn default_diffusion_url() -> String {
    DEFAULT_DIFFUSION_URL.to_string()
}

fn default_diffusion_timeout() -> u64 {
    180
}

fn default_true() -> bool {
    true
}

impl Default for DiffusionConfig {
    fn default() -> Self {
        Self {
            url: default_diffusion_url(),
            timeout_secs: default_diffusion_timeout(),
            auto_fallback_on_oom: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Artwork backends
// ---------------------------------------------------------------------------

/// Which image service `generate` and `specimen` talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Diffusion,
    Gemini,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Diffusion => "diffusion",
            BackendKind::Gemini => "gemini",
        }
    }

    pub fn parse(s: &str) -> Option<BackendKind> {
        match s.trim().to_lowercase().as_str() {
            "diffusion" | "sd" | "stable-diffusion" => Some(BackendKind::Diffusion),
            "gemini" | "nanobanana" | "nano-banana" => Some(BackendKind::Gemini),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default = "default_gemini_api_base")]
    pub api_base: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_gemini_timeout")]
    pub timeout_secs: u64,
}

fn default_gemini_api_base() -> String {
    DEFAULT_GEMINI_API_BASE.to_string()
}

fn default_gemini_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

fn default_gemini_timeout() -> u64 {
    120
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_base: default_gemini_api_base(),
            model: default_gemini_model(),
            timeout_secs: default_gemini_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_shop_id")]
    pub shop_id: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_graphics_root")]
    pub graphics_root: PathBuf,
    /// Pause between template creations, to stay under rate limits.
    #[serde(default = "default_template_pause_ms")]
    pub template_pause_ms: u64,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub diffusion: DiffusionConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
}

fn default_shop_id() -> String {
    DEFAULT_SHOP_ID.to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_graphics_root() -> PathBuf {
    PathBuf::from(paths::DEFAULT_GRAPHICS_ROOT)
}

fn default_template_pause_ms() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shop_id: default_shop_id(),
            api_base: default_api_base(),
            graphics_root: default_graphics_root(),
            template_pause_ms: default_template_pause_ms(),
            classifier: ClassifierConfig::default(),
            retry: RetryPolicy::default(),
            backend: BackendKind::default(),
            diffusion: DiffusionConfig::default(),
            gemini: GeminiConfig::default(),
        }
    }
}

impl Config {
    /// Load `.cbg/config.yaml` (defaults when absent), then apply
    /// environment overrides.
    pub fn load(root: &Path) -> Result<Self> {
        let mut config = Self::load_file(root)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_file(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&paths::config_path(root), data.as_bytes())
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        if let Some(v) = get("PRINTIFY_SHOP_ID") {
            self.shop_id = v;
        }
        if let Some(v) = get("PRINTIFY_API_BASE") {
            self.api_base = v;
        }
        if let Some(v) = get("SD_WEBUI_URL") {
            self.diffusion.url = v;
        }
        if let Some(v) = get("SD_WEBUI_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.diffusion.timeout_secs = v;
        }
        if let Some(v) = get("CBG_BACKEND").and_then(|v| BackendKind::parse(&v)) {
            self.backend = v;
        }
        if let Some(v) = get("GEMINI_API_BASE") {
            self.gemini.api_base = v;
        }
        if let Some(v) = get("GEMINI_MODEL") {
            self.gemini.model = v;
        }
    }

    pub fn graphics_root_in(&self, root: &Path) -> PathBuf {
        paths::graphics_root(root, &self.graphics_root)
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let t = self.classifier.logo_scale_threshold;
        if !(t > 0.0 && t <= 1.0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("classifier.logo_scale_threshold must be in (0, 1], got {t}"),
            });
        }
        if self.classifier.vocabulary().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "classifier.trim_keywords is empty: every placeholder counts as body"
                    .to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "retry.max_attempts is 0: requests are attempted once".to_string(),
            });
        }
        if self.gemini.model.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "gemini.model is empty".to_string(),
            });
        }
        if self.shop_id.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "shop_id is empty".to_string(),
            });
        }
        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_file(dir.path()).unwrap();
        assert_eq!(config.shop_id, DEFAULT_SHOP_ID);
        assert_eq!(config.classifier.logo_scale_threshold, 0.4);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".cbg")).unwrap();
        std::fs::write(
            dir.path().join(".cbg/config.yaml"),
            "shop_id: \"42\"\nclassifier:\n  trim_keywords: [hood]\nretry:\n  max_attempts: 5\n",
        )
        .unwrap();
        let config = Config::load_file(dir.path()).unwrap();
        assert_eq!(config.shop_id, "42");
        assert_eq!(config.classifier.trim_keywords, vec!["hood"]);
        assert_eq!(config.classifier.logo_scale_threshold, 0.4);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.diffusion.url, DEFAULT_DIFFUSION_URL);
        assert_eq!(config.backend, BackendKind::Diffusion);
        assert_eq!(config.gemini.model, DEFAULT_GEMINI_MODEL);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.graphics_root = PathBuf::from("/srv/graphics");
        config.save(dir.path()).unwrap();
        let loaded = Config::load_file(dir.path()).unwrap();
        assert_eq!(loaded.graphics_root, PathBuf::from("/srv/graphics"));
        assert_eq!(loaded.graphics_root_in(dir.path()), PathBuf::from("/srv/graphics"));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            "PRINTIFY_API_BASE" => Some("http://127.0.0.1:9999/v1".into()),
            "SD_WEBUI_TIMEOUT" => Some("30".into()),
            "PRINTIFY_SHOP_ID" => Some("   ".into()),
            "CBG_BACKEND" => Some("Nanobanana".into()),
            "GEMINI_MODEL" => Some("gemini-test".into()),
            _ => None,
        });
        assert_eq!(config.backend, BackendKind::Gemini);
        assert_eq!(config.gemini.model, "gemini-test");
        assert_eq!(config.api_base, "http://127.0.0.1:9999/v1");
        assert_eq!(config.diffusion.timeout_secs, 30);
        assert_eq!(config.shop_id, DEFAULT_SHOP_ID);
    }

    #[test]
    fn validate_flags_bad_threshold_and_empty_vocab() {
        let mut config = Config::default();
        config.classifier.logo_scale_threshold = 1.5;
        config.classifier.trim_keywords = vec![];
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.level == WarnLevel::Error));
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("trim_keywords")));
    }

    #[test]
    fn relative_graphics_root_joins_workspace() {
        let config = Config::default();
        assert_eq!(
            config.graphics_root_in(Path::new("/work")),
            PathBuf::from("/work/artifacts/graphics")
        );
    }
}
