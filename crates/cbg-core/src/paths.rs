use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = ".cbg/config.yaml";
pub const ENV_DIR: &str = ".env";

/// Token files searched under `.env/`, in order. The second entry is a
/// misspelling that exists on real workstations.
pub const TOKEN_FILES: &[&str] = &[
    "printify_api_token.txt",
    "prinitfy_api_token.txt",
    "printify_api_key.txt",
];

pub const GEMINI_KEY_FILE: &str = "gemini_api_key";

pub const DEFAULT_GRAPHICS_ROOT: &str = "artifacts/graphics";
pub const GRAPHICS_README: &str = "README.md";
pub const PROMPT_FILE: &str = "prompt.txt";
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn token_candidates(root: &Path) -> Vec<PathBuf> {
    TOKEN_FILES
        .iter()
        .map(|f| root.join(ENV_DIR).join(f))
        .collect()
}

pub fn gemini_key_path(root: &Path) -> PathBuf {
    root.join(ENV_DIR).join(GEMINI_KEY_FILE)
}

/// Resolve the configured graphics root against the workspace root.
pub fn graphics_root(root: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        root.join(configured)
    }
}

/// `{graphics_root}/{type}/{stamp}__{slug}`
pub fn run_dir(graphics_root: &Path, graphic_type: &str, stamp: &str, slug: &str) -> PathBuf {
    graphics_root
        .join(graphic_type)
        .join(format!("{stamp}__{slug}"))
}

// ---------------------------------------------------------------------------
// Prompt slugs
// ---------------------------------------------------------------------------

static TOKEN_RE: OnceLock<Regex> = OnceLock::new();

fn token_re() -> &'static Regex {
    TOKEN_RE.get_or_init(|| Regex::new(r"[a-z0-9]+").unwrap())
}

/// Lowercase alphanumeric runs of `text`.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    token_re()
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// First eight tokens joined with `-`, capped at 80 characters.
pub fn slugify_prompt(prompt: &str) -> String {
    let words = tokenize(prompt);
    let joined: String = words
        .iter()
        .take(8)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("-");
    let capped: String = joined.chars().take(80).collect();
    let trimmed = capped.trim_matches('-');
    if trimmed.is_empty() {
        "specimen".to_string()
    } else {
        trimmed.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_takes_first_eight_words() {
        let slug = slugify_prompt("Industrial Noir, a goose wearing a berry-patterned waistcoat in neon");
        assert_eq!(slug, "industrial-noir-a-goose-wearing-a-berry-patterned");
    }

    #[test]
    fn slug_falls_back_for_symbols_only() {
        assert_eq!(slugify_prompt("!!! ---"), "specimen");
        assert_eq!(slugify_prompt(""), "specimen");
    }

    #[test]
    fn slug_is_capped() {
        let long = "a".repeat(200);
        assert_eq!(slugify_prompt(&long).len(), 80);
    }

    #[test]
    fn token_candidates_cover_typo() {
        let root = Path::new("/work");
        let c = token_candidates(root);
        assert_eq!(c.len(), 3);
        assert_eq!(c[1], Path::new("/work/.env/prinitfy_api_token.txt"));
    }

    #[test]
    fn run_dir_layout() {
        let dir = run_dir(Path::new("g"), "tiles", "20260101_120000", "noir-weave");
        assert_eq!(dir, Path::new("g/tiles/20260101_120000__noir-weave"));
    }
}
