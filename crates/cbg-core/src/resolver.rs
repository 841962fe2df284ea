//! Picks the artwork to fabricate with for each role.
//!
//! Candidates live in `{graphics_root}/{role}s/`, usually one run folder
//! per generation holding the image and its `prompt.txt`. The newest file
//! is taken as the one the user wants next.

use crate::classifier::ArtworkRole;
use crate::error::Result;
use crate::io;
use crate::paths::{IMAGE_EXTENSIONS, PROMPT_FILE};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ArtworkSource {
    Local(PathBuf),
    Remote(String),
}

impl ArtworkSource {
    /// `http(s)://` strings are remote, anything else is a local path.
    pub fn parse(s: &str) -> Self {
        let lower = s.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            ArtworkSource::Remote(s.to_string())
        } else {
            ArtworkSource::Local(PathBuf::from(s))
        }
    }

    /// File name to register the upload under.
    pub fn file_name(&self) -> String {
        let raw = match self {
            ArtworkSource::Local(p) => p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ArtworkSource::Remote(url) => url
                .split(['?', '#'])
                .next()
                .and_then(|u| u.rsplit('/').next())
                .unwrap_or_default()
                .to_string(),
        };
        if raw.is_empty() {
            "fabricated_specimen.png".to_string()
        } else {
            raw
        }
    }
}

impl fmt::Display for ArtworkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtworkSource::Local(p) => write!(f, "{}", p.display()),
            ArtworkSource::Remote(u) => f.write_str(u),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedArtwork {
    pub role: ArtworkRole,
    pub source: ArtworkSource,
    pub prompt: Option<String>,
}

/// Value of the first `prompt:` line in `dir/prompt.txt`.
pub fn read_prompt(dir: &Path) -> Option<String> {
    let content = std::fs::read_to_string(dir.join(PROMPT_FILE)).ok()?;
    content
        .lines()
        .find_map(|line| line.strip_prefix("prompt:"))
        .map(|rest| rest.trim().to_string())
        .filter(|p| !p.is_empty())
}

pub struct ArtworkResolver {
    graphics_root: PathBuf,
    overrides: HashMap<ArtworkRole, ArtworkSource>,
}

impl ArtworkResolver {
    pub fn new(graphics_root: impl Into<PathBuf>) -> Self {
        Self {
            graphics_root: graphics_root.into(),
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, role: ArtworkRole, source: ArtworkSource) -> Self {
        self.overrides.insert(role, source);
        self
    }

    pub fn graphics_root(&self) -> &Path {
        &self.graphics_root
    }

    pub fn role_dir(&self, role: ArtworkRole) -> PathBuf {
        self.graphics_root.join(role.dir_name())
    }

    /// Resolve artwork for `role`. `Ok(None)` means nothing is available
    /// and the caller should skip the role.
    pub fn resolve(&self, role: ArtworkRole) -> Result<Option<ResolvedArtwork>> {
        if let Some(source) = self.overrides.get(&role) {
            let prompt = match source {
                ArtworkSource::Local(p) => p.parent().and_then(read_prompt),
                ArtworkSource::Remote(_) => None,
            };
            debug!(%role, %source, "using explicit artwork override");
            return Ok(Some(ResolvedArtwork {
                role,
                source: source.clone(),
                prompt,
            }));
        }

        let dir = self.role_dir(role);
        let files = io::collect_files(&dir, IMAGE_EXTENSIONS)?;
        let Some(latest) = io::most_recent(&files) else {
            warn!(%role, dir = %dir.display(), "no artwork available for role; skipping");
            return Ok(None);
        };

        let prompt = latest.parent().and_then(read_prompt);
        debug!(%role, file = %latest.display(), "selected most recent artwork");
        Ok(Some(ResolvedArtwork {
            role,
            source: ArtworkSource::Local(latest),
            prompt,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
