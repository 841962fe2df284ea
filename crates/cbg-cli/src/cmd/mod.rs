pub mod clone;
pub mod config;
pub mod fabricate;
pub mod generate;
pub mod inspect;
pub mod templates;
pub mod update;

use anyhow::Context;
use cbg_core::config::Config;
use cbg_core::fabricator::Fabricator;
use std::path::Path;

pub fn load_config(root: &Path) -> anyhow::Result<Config> {
    Config::load(root).context("failed to load config")
}

pub fn connect(root: &Path) -> anyhow::Result<Fabricator> {
    let config = load_config(root)?;
    Fabricator::connect(root, config).context("failed to set up Printify client")
}
