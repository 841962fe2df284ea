pub mod classifier;
pub mod config;
pub mod credentials;
pub mod error;
pub mod fabricator;
pub mod gemini;
pub mod generator;
pub mod io;
pub mod paths;
pub mod printify;
pub mod resolver;
pub mod retry;
pub mod synth;
pub mod types;

pub use error::{CbgError, Result};
