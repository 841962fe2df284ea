use crate::output::{print_created, print_json, print_report};
use anyhow::Context;
use cbg_core::classifier::ArtworkRole;
use cbg_core::fabricator::{select_template, Fabricator, RunCache};
use cbg_core::resolver::{ArtworkResolver, ArtworkSource};
use cbg_core::CbgError;
use std::path::Path;
use tracing::info;

pub struct FabricateArgs {
    pub template: Option<String>,
    pub search: Option<String>,
    pub tile: Option<String>,
    pub texture: Option<String>,
    pub logo: Option<String>,
}

fn resolver(root: &Path, fabricator: &Fabricator) -> ArtworkResolver {
    ArtworkResolver::new(fabricator.config().graphics_root_in(root))
}

pub fn run(root: &Path, args: FabricateArgs, json: bool) -> anyhow::Result<()> {
    let fabricator = super::connect(root)?;

    let mut resolver = resolver(root, &fabricator);
    for (role, value) in [
        (ArtworkRole::Tile, &args.tile),
        (ArtworkRole::Texture, &args.texture),
        (ArtworkRole::Logo, &args.logo),
    ] {
        if let Some(v) = value {
            resolver = resolver.with_override(role, ArtworkSource::parse(v));
        }
    }

    let mut cache = RunCache::new();
    let created = match args.template {
        Some(id) => fabricator.fabricate_from_template(&id, &resolver, &mut cache)?,
        None => {
            let templates = fabricator
                .client()
                .list_templates()
                .context("failed to list templates")?;
            let template =
                select_template(&templates, args.search.as_deref(), &mut rand::thread_rng())?;
            info!(id = %template.id, title = %template.title, "selected template");
            fabricator.fabricate_from(template, &resolver, &mut cache)?
        }
    };

    if json {
        print_json(&created)
    } else {
        print_created(&created);
        Ok(())
    }
}

pub fn batch(root: &Path, runs: usize, search: Option<&str>, json: bool) -> anyhow::Result<()> {
    if runs == 0 {
        anyhow::bail!("--runs must be at least 1");
    }
    let fabricator = super::connect(root)?;

    let mut templates = fabricator
        .client()
        .list_templates()
        .context("failed to list templates")?;
    if let Some(needle) = search.map(str::to_lowercase) {
        templates.retain(|t| t.title.to_lowercase().contains(&needle));
    }
    if templates.is_empty() {
        return Err(CbgError::NoTemplates.into());
    }

    let report = fabricator.fabricate_batch(&templates, runs, &resolver(root, &fabricator));

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }
    if report.created() == 0 && report.failed() > 0 {
        anyhow::bail!("every fabrication failed");
    }
    Ok(())
}
