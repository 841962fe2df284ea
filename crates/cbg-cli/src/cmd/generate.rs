use crate::output::{print_created, print_json};
use anyhow::{bail, Context};
use cbg_core::classifier::ArtworkRole;
use cbg_core::config::{BackendKind, Config};
use cbg_core::credentials::GeminiKey;
use cbg_core::fabricator::SpecimenRequest;
use cbg_core::gemini::GeminiClient;
use cbg_core::generator::{
    compose_prompt, ArtworkBackend, DiffusionBackend, DiffusionClient, GeneratedArtwork, Txt2ImgParams,
    STANDALONE,
};
use clap::Args;
use std::path::Path;
use std::time::Duration;

pub const AUTH_ENV: &str = "SD_WEBUI_AUTH";

#[derive(Args)]
pub struct SamplingArgs {
    /// Negative prompt
    #[arg(long, default_value = "")]
    negative: String,

    #[arg(long, default_value = "320")]
    width: u32,

    #[arg(long, default_value = "320")]
    height: u32,

    #[arg(long, default_value = "6")]
    steps: u32,

    #[arg(long, default_value = "7.0")]
    cfg_scale: f64,

    #[arg(long, default_value = "Euler a")]
    sampler: String,

    /// -1 for a random seed
    #[arg(long, default_value = "-1", allow_hyphen_values = true)]
    seed: i64,

    /// Images per request
    #[arg(long, default_value = "1")]
    batch_size: u32,

    /// Fail instead of retrying smaller sizes when the GPU runs out of memory
    #[arg(long)]
    no_fallback: bool,
}

impl SamplingArgs {
    fn params(&self, prompt: String) -> Txt2ImgParams {
        Txt2ImgParams {
            negative_prompt: self.negative.clone(),
            width: self.width,
            height: self.height,
            steps: self.steps,
            cfg_scale: self.cfg_scale,
            sampler_name: self.sampler.clone(),
            seed: self.seed,
            batch_size: self.batch_size.max(1),
            ..Txt2ImgParams::new(prompt)
        }
    }
}

#[derive(Args)]
pub struct GenerateArgs {
    /// Prompt text
    #[arg(long, required_unless_present = "theme", conflicts_with = "theme")]
    prompt: Option<String>,

    /// Build a house-style prompt for this theme instead of --prompt
    #[arg(long)]
    theme: Option<String>,

    /// With --theme: tile, texture, logo, or standalone
    #[arg(long, default_value = "standalone")]
    role: String,

    /// With --theme: replaces the role's house-style modifier
    #[arg(long, requires = "theme")]
    base_prompt: Option<String>,

    /// Output category (default: inferred from the prompt)
    #[arg(long = "type", value_name = "TYPE")]
    graphic_type: Option<String>,

    /// diffusion or gemini (default: from config)
    #[arg(long)]
    backend: Option<String>,

    #[command(flatten)]
    sampling: SamplingArgs,
}

#[derive(Args)]
pub struct SpecimenArgs {
    /// Theme named in the prompts, e.g. "Cyberpunk"
    #[arg(long)]
    theme: String,

    /// Pick the template from titles containing this text
    #[arg(long, value_name = "SEARCH")]
    template: Option<String>,

    /// Replaces the house-style role modifiers
    #[arg(long)]
    base_prompt: Option<String>,

    /// diffusion or gemini (default: from config)
    #[arg(long)]
    backend: Option<String>,

    #[command(flatten)]
    sampling: SamplingArgs,
}

fn diffusion_client(config: &Config, fallback: bool) -> anyhow::Result<DiffusionClient> {
    let auth = std::env::var(AUTH_ENV).ok();
    Ok(DiffusionClient::new(
        config.diffusion.url.clone(),
        Duration::from_secs(config.diffusion.timeout_secs),
    )
    .context("failed to build diffusion client")?
    .with_auth(auth.as_deref())
    .with_oom_fallback(fallback && config.diffusion.auto_fallback_on_oom))
}

fn backend(
    root: &Path,
    config: &Config,
    requested: Option<&str>,
    sampling: &SamplingArgs,
) -> anyhow::Result<Box<dyn ArtworkBackend>> {
    let kind = match requested {
        Some(name) => BackendKind::parse(name)
            .with_context(|| format!("unknown backend '{name}': expected diffusion or gemini"))?,
        None => config.backend,
    };
    match kind {
        BackendKind::Diffusion => {
            let client = diffusion_client(config, !sampling.no_fallback)?;
            Ok(Box::new(DiffusionBackend::new(client, sampling.params(String::new()))))
        }
        BackendKind::Gemini => {
            let key = GeminiKey::resolve(root)?;
            let client = GeminiClient::new(
                key,
                config.gemini.api_base.clone(),
                config.gemini.model.clone(),
                Duration::from_secs(config.gemini.timeout_secs),
            )
            .context("failed to build Gemini client")?;
            Ok(Box::new(client))
        }
    }
}

fn parse_role(raw: &str) -> anyhow::Result<Option<ArtworkRole>> {
    match raw.trim().to_lowercase().as_str() {
        "standalone" | "anchor" | "anchors" => Ok(None),
        other => ArtworkRole::parse(other).map(Some).with_context(|| {
            format!("unknown role '{other}': expected tile, texture, logo, or standalone")
        }),
    }
}

fn report(out: &GeneratedArtwork, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(out);
    }
    if let Some((w, h, steps)) = out.fallback {
        println!("Out of memory at the requested size; used {w}x{h} @ {steps} steps.");
    }
    println!("Saved {} image(s) to {} ({})", out.files.len(), out.run_dir.display(), out.graphic_type);
    for f in &out.files {
        println!("  {}", f.display());
    }
    Ok(())
}

pub fn run(root: &Path, args: GenerateArgs, json: bool) -> anyhow::Result<()> {
    let (prompt, type_override) = match (args.prompt, args.theme) {
        (Some(prompt), _) => (prompt, args.graphic_type),
        (None, Some(theme)) => {
            let role = parse_role(&args.role)?;
            let default_type = role.map(ArtworkRole::dir_name).unwrap_or(STANDALONE);
            (
                compose_prompt(&theme, role, args.base_prompt.as_deref()),
                Some(args.graphic_type.unwrap_or_else(|| default_type.to_string())),
            )
        }
        (None, None) => bail!("either --prompt or --theme is required"),
    };

    let config = super::load_config(root)?;
    let backend = backend(root, &config, args.backend.as_deref(), &args.sampling)?;
    let out = backend.render(&prompt, &config.graphics_root_in(root), type_override.as_deref())?;
    report(&out, json)
}

/// Generate a tile and a texture for the theme, then fabricate a product
/// from a template with that artwork.
pub fn specimen(root: &Path, args: SpecimenArgs, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(root)?;
    let fabricator = super::connect(root)?;
    let backend = backend(root, &config, args.backend.as_deref(), &args.sampling)?;

    let request = SpecimenRequest {
        search: args.template,
        base_prompt: args.base_prompt,
        ..SpecimenRequest::new(args.theme)
    };
    let report = fabricator.fabricate_specimen(
        &request,
        backend.as_ref(),
        &config.graphics_root_in(root),
        &mut rand::thread_rng(),
    )?;

    if json {
        return print_json(&report);
    }
    println!("Template: {} ({})", report.template_title, report.template_id);
    for generated in &report.artwork {
        for file in &generated.artwork.files {
            println!("Generated {} via {}: {}", generated.role, report.backend, file.display());
        }
    }
    print_created(&report.product);
    Ok(())
}
