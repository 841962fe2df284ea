use thiserror::Error;

#[derive(Debug, Error)]
pub enum CbgError {
    #[error("{service} credentials not found: set {env} or create one of {searched}")]
    MissingCredentials {
        service: &'static str,
        env: String,
        searched: String,
    },

    #[error("product not found: {0}")]
    ProductNotFound(String),

    #[error("no templates found: titles must start with '[TEMPLATE]: '")]
    NoTemplates,

    #[error("request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("server error ({status}) persisted after {attempts} attempts: {body}")]
    Transient {
        status: u16,
        attempts: u32,
        body: String,
    },

    #[error("artwork upload failed for '{source_ref}': {reason}")]
    Upload { source_ref: String, reason: String },

    #[error("image generation failed: {0}")]
    Generation(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CbgError>;
