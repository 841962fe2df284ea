use crate::error::{CbgError, Result};
use crate::paths;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const TOKEN_ENV: &str = "PRINTIFY_API_TOKEN";
/// Checked in order for the image-generation key.
pub const GEMINI_KEY_ENVS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Bearer token for the fulfillment API.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    token: String,
}

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Environment first, then the token files under `{root}/.env/`.
    pub fn resolve(root: &Path) -> Result<Self> {
        Self::resolve_with(root, std::env::var(TOKEN_ENV).ok())
    }

    pub fn resolve_with(root: &Path, env_token: Option<String>) -> Result<Self> {
        lookup("Printify", &[(TOKEN_ENV, env_token)], &paths::token_candidates(root))
    }
}

/// API key for the Gemini image backend.
#[derive(Clone, PartialEq, Eq)]
pub struct GeminiKey(String);

impl GeminiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `GEMINI_API_KEY`, `GOOGLE_API_KEY`, then `{root}/.env/gemini_api_key`.
    pub fn resolve(root: &Path) -> Result<Self> {
        let env = GEMINI_KEY_ENVS
            .iter()
            .map(|k| (*k, std::env::var(k).ok()))
            .collect::<Vec<_>>();
        Self::resolve_with(root, &env)
    }

    pub fn resolve_with(root: &Path, env: &[(&str, Option<String>)]) -> Result<Self> {
        let found = lookup("Gemini", env, &[paths::gemini_key_path(root)])?;
        Ok(Self(found.token))
    }
}

impl fmt::Debug for GeminiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GeminiKey").field(&"***").finish()
    }
}

/// First non-blank value among `env`, then among the files in `candidates`.
fn lookup(
    service: &'static str,
    env: &[(&str, Option<String>)],
    candidates: &[PathBuf],
) -> Result<Credentials> {
    for (name, value) in env {
        let value = value.as_deref().map(str::trim).unwrap_or_default();
        if !value.is_empty() {
            debug!(service, variable = *name, "using credentials from environment");
            return Ok(Credentials::new(value));
        }
    }

    for path in candidates {
        let Ok(raw) = std::fs::read_to_string(path) else {
            continue;
        };
        let token = raw.trim();
        if !token.is_empty() {
            debug!(service, path = %path.display(), "using credentials file");
            return Ok(Credentials::new(token));
        }
    }

    Err(CbgError::MissingCredentials {
        service,
        env: env.iter().map(|(k, _)| *k).collect::<Vec<_>>().join(" or "),
        searched: candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("token", &"***").finish()
    }
}
