//! End-to-end fabrication flows: clone a product, fabricate from a template,
//! promote shop products to templates, and inspect layer roles.

use crate::classifier::{
    analyze_main_image, classify_template_roles, inspect_layers, ArtworkRole, LayerReport,
    MainImageAnalysis, RoleMap, TrimVocabulary,
};
use crate::config::Config;
use crate::credentials::Credentials;
use crate::error::{CbgError, Result};
use crate::generator::{compose_prompt, ArtworkBackend, GeneratedArtwork};
use crate::printify::{product_admin_url, BlueprintCache, PrintifyClient};
use crate::resolver::{ArtworkResolver, ArtworkSource};
use crate::synth::{
    enabled_variants, template_title, ReplacementMap, Synthesis, Synthesizer, SwapPlan,
};
use crate::types::{Product, TEMPLATE_PREFIX};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_CLONE_SUFFIX: &str = " [CLONE]";
/// Print-area background for promoted templates that carry none.
pub const DEFAULT_TEMPLATE_BACKGROUND: &str = "#ffffff";

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedProduct {
    pub id: String,
    pub title: String,
    pub admin_url: String,
    pub swapped_layers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Created { source: String, product: CreatedProduct },
    Skipped { source: String, reason: String },
    Failed { source: String, error: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<BatchOutcome>,
}

impl BatchReport {
    pub fn push(&mut self, outcome: BatchOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn created(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::Created { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&BatchOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectionReport {
    pub product_id: String,
    pub title: String,
    pub is_template: bool,
    pub blueprint_id: u64,
    pub print_provider_id: u64,
    pub enabled_variants: usize,
    pub main_image: MainImageAnalysis,
    pub template_roles: RoleMap,
    pub layers: Vec<LayerReport>,
}

// ---------------------------------------------------------------------------
// Specimens
// ---------------------------------------------------------------------------

/// Roles generated fresh for every specimen. Logos stay hand-curated.
pub const SPECIMEN_ROLES: [ArtworkRole; 2] = [ArtworkRole::Tile, ArtworkRole::Texture];

#[derive(Debug, Clone)]
pub struct SpecimenRequest {
    pub theme: String,
    /// Case-insensitive template title filter.
    pub search: Option<String>,
    /// Replaces the house role modifiers in each prompt.
    pub base_prompt: Option<String>,
}

impl SpecimenRequest {
    pub fn new(theme: impl Into<String>) -> Self {
        Self {
            theme: theme.into(),
            search: None,
            base_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SpecimenArtwork {
    pub role: ArtworkRole,
    pub prompt: String,
    pub artwork: GeneratedArtwork,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpecimenReport {
    pub template_id: String,
    pub template_title: String,
    pub backend: &'static str,
    pub artwork: Vec<SpecimenArtwork>,
    pub product: CreatedProduct,
}

// ---------------------------------------------------------------------------
// CloneRequest / RunCache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CloneRequest {
    pub product_id: String,
    pub body_artwork: ArtworkSource,
    /// Only used by aggressive clones.
    pub trim_artwork: Option<ArtworkSource>,
    /// Present means aggressive: every layer except this one is swapped.
    pub logo_id: Option<String>,
    pub title_suffix: Option<String>,
}

impl CloneRequest {
    pub fn new(product_id: impl Into<String>, body_artwork: ArtworkSource) -> Self {
        Self {
            product_id: product_id.into(),
            body_artwork,
            trim_artwork: None,
            logo_id: None,
            title_suffix: None,
        }
    }
}

/// Uploaded image id per role, shared by every template fabricated in one run.
#[derive(Debug, Default)]
pub struct RunCache {
    uploads: HashMap<ArtworkRole, String>,
    prompts: HashMap<ArtworkRole, Option<String>>,
    skipped: Vec<ArtworkRole>,
}

impl RunCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uploaded(&self, role: ArtworkRole) -> Option<&str> {
        self.uploads.get(&role).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.uploads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Fabricator
// ---------------------------------------------------------------------------

pub struct Fabricator {
    client: PrintifyClient,
    config: Config,
}

impl Fabricator {
    pub fn new(client: PrintifyClient, config: Config) -> Self {
        Self { client, config }
    }

    /// Resolve credentials under `root` and build a client from `config`.
    pub fn connect(root: &Path, config: Config) -> Result<Self> {
        let credentials = Credentials::resolve(root)?;
        let client = PrintifyClient::new(credentials, config.shop_id.clone(), config.api_base.clone())?
            .with_retry(config.retry.clone());
        Ok(Self::new(client, config))
    }

    pub fn client(&self) -> &PrintifyClient {
        &self.client
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn vocabulary(&self) -> TrimVocabulary {
        self.config.classifier.vocabulary()
    }

    fn threshold(&self) -> f64 {
        self.config.classifier.logo_scale_threshold
    }

    fn synthesizer(&self) -> Synthesizer {
        Synthesizer::new(self.vocabulary(), self.threshold())
    }

    fn created(&self, product: &Product, swapped_layers: usize) -> CreatedProduct {
        CreatedProduct {
            id: product.id.clone(),
            title: product.title.clone(),
            admin_url: product_admin_url(self.client.shop_id(), &product.id),
            swapped_layers,
        }
    }

    // -- inspect ------------------------------------------------------------

    pub fn inspect(&self, product_id: &str) -> Result<InspectionReport> {
        let product = self.client.get_product(product_id)?;
        Ok(self.inspect_product(&product))
    }

    pub fn inspect_product(&self, product: &Product) -> InspectionReport {
        let vocab = self.vocabulary();
        let main_image = analyze_main_image(&product.print_areas, &vocab);
        let layers = inspect_layers(
            &product.print_areas,
            &vocab,
            main_image.main_id.as_deref(),
            self.threshold(),
        );
        InspectionReport {
            product_id: product.id.clone(),
            title: product.title.clone(),
            is_template: product.is_template(),
            blueprint_id: product.blueprint_id,
            print_provider_id: product.print_provider_id,
            enabled_variants: enabled_variants(product).len(),
            template_roles: classify_template_roles(&product.print_areas, &vocab, self.threshold()),
            main_image,
            layers,
        }
    }

    // -- clone --------------------------------------------------------------

    /// Build the swap plan for a clone from already-uploaded image ids.
    pub fn plan_clone(
        &self,
        source: &Product,
        body_image_id: &str,
        trim_image_id: Option<&str>,
        logo_id: Option<&str>,
    ) -> SwapPlan {
        let main_id = analyze_main_image(&source.print_areas, &self.vocabulary()).main_id;
        match logo_id {
            Some(logo) => {
                if !source.references_image(logo) {
                    warn!(logo, product = %source.id, "logo id not found in source product; nothing will be preserved");
                }
                SwapPlan::Aggressive {
                    main_id,
                    body_image_id: body_image_id.to_string(),
                    trim_image_id: trim_image_id.map(str::to_string),
                    logo_id: logo.to_string(),
                }
            }
            None => SwapPlan::Conservative {
                main_id,
                new_image_id: body_image_id.to_string(),
            },
        }
    }

    pub fn clone_product(&self, req: &CloneRequest) -> Result<CreatedProduct> {
        let source = self.client.get_product(&req.product_id)?;
        info!(id = %source.id, title = %source.title, "cloning product");

        let body_id = self
            .client
            .upload_image(&req.body_artwork, &req.body_artwork.file_name())?;

        let trim_id = match (&req.trim_artwork, &req.logo_id) {
            (Some(trim), Some(_)) => Some(self.client.upload_image(trim, &trim.file_name())?),
            (Some(_), None) => {
                warn!("trim artwork is only used by aggressive clones; ignoring");
                None
            }
            (None, _) => None,
        };

        let plan = self.plan_clone(&source, &body_id, trim_id.as_deref(), req.logo_id.as_deref());
        let suffix = req.title_suffix.as_deref().unwrap_or(DEFAULT_CLONE_SUFFIX);
        let title = format!("{}{}", source.title, suffix);
        let Synthesis {
            payload,
            swapped_layers,
        } = self
            .synthesizer()
            .synthesize(&source, &plan, &title, &source.description);

        let product = self.client.create_product(&payload)?;
        Ok(self.created(&product, swapped_layers))
    }

    // -- templates ----------------------------------------------------------

    pub fn fabricate_from_template(
        &self,
        template_id: &str,
        resolver: &ArtworkResolver,
        cache: &mut RunCache,
    ) -> Result<CreatedProduct> {
        let template = self.client.get_product(template_id)?;
        self.fabricate_from(&template, resolver, cache)
    }

    /// Fabricate one product from `template`. Roles without artwork keep
    /// the template's layers.
    pub fn fabricate_from(
        &self,
        template: &Product,
        resolver: &ArtworkResolver,
        cache: &mut RunCache,
    ) -> Result<CreatedProduct> {
        let roles = classify_template_roles(&template.print_areas, &self.vocabulary(), self.threshold());
        info!(template = %template.title, ids = roles.len(), "fabricating from template");

        let mut replacements = ReplacementMap::new();
        let mut prompt: Option<String> = None;

        for role in roles.roles() {
            let Some(new_id) = self.upload_for_role(role, resolver, cache)? else {
                continue;
            };
            if prompt.is_none() {
                prompt = cache.prompts.get(&role).cloned().flatten();
            }
            for id in roles.ids_with_role(role) {
                replacements.insert(id, new_id.clone());
            }
        }

        let title = template_title(template.template_base_title(), prompt.as_deref());
        let Synthesis {
            payload,
            swapped_layers,
        } = self.synthesizer().synthesize(
            template,
            &SwapPlan::Template(replacements),
            &title,
            &template.description,
        );

        let product = self.client.create_product(&payload)?;
        Ok(self.created(&product, swapped_layers))
    }

    fn upload_for_role(
        &self,
        role: ArtworkRole,
        resolver: &ArtworkResolver,
        cache: &mut RunCache,
    ) -> Result<Option<String>> {
        if let Some(id) = cache.uploads.get(&role) {
            return Ok(Some(id.clone()));
        }
        if cache.skipped.contains(&role) {
            return Ok(None);
        }
        let Some(artwork) = resolver.resolve(role)? else {
            cache.skipped.push(role);
            return Ok(None);
        };
        let id = self
            .client
            .upload_image(&artwork.source, &artwork.source.file_name())?;
        cache.uploads.insert(role, id.clone());
        cache.prompts.insert(role, artwork.prompt);
        Ok(Some(id))
    }

    pub fn promote_templates(&self, pause: Duration) -> Result<BatchReport> {
        let products = self.client.list_products()?;
        let mut blueprints = BlueprintCache::new();
        let mut report = BatchReport::default();
        let mut created_any = false;

        for product in &products {
            if product.is_template() {
                report.push(BatchOutcome::Skipped {
                    source: product.id.clone(),
                    reason: "already a template".to_string(),
                });
                continue;
            }
            if created_any && !pause.is_zero() {
                std::thread::sleep(pause);
            }
            created_any = true;

            match self.promote(product, &mut blueprints) {
                Ok(created) => report.push(BatchOutcome::Created {
                    source: product.id.clone(),
                    product: created,
                }),
                Err(e) => {
                    warn!(product = %product.id, error = %e, "template promotion failed");
                    report.push(BatchOutcome::Failed {
                        source: product.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        info!(
            created = report.created(),
            skipped = report.skipped(),
            failed = report.failed(),
            "template promotion finished"
        );
        Ok(report)
    }

    fn promote(&self, product: &Product, blueprints: &mut BlueprintCache) -> Result<CreatedProduct> {
        let (name, description) = match self.client.get_blueprint(product.blueprint_id, blueprints) {
            Ok(bp) if !bp.description.trim().is_empty() => (bp.title, bp.description),
            Ok(bp) => (bp.title, product.description.clone()),
            Err(e) => {
                warn!(
                    product = %product.id,
                    blueprint = product.blueprint_id,
                    error = %e,
                    "blueprint lookup failed; using generic title"
                );
                (format!("Blueprint {}", product.blueprint_id), product.description.clone())
            }
        };
        let title = format!("{TEMPLATE_PREFIX}{name}");
        let mut synthesis = self.synthesizer().synthesize(
            product,
            &SwapPlan::Template(ReplacementMap::new()),
            &title,
            &description,
        );
        for area in &mut synthesis.payload.print_areas {
            area.background
                .get_or_insert_with(|| DEFAULT_TEMPLATE_BACKGROUND.to_string());
        }
        let created = self.client.create_product(&synthesis.payload)?;
        Ok(self.created(&created, 0))
    }

    /// `runs` passes over `templates`, each pass with a fresh upload cache.
    /// Failures are recorded and the batch carries on.
    pub fn fabricate_batch(
        &self,
        templates: &[Product],
        runs: usize,
        resolver: &ArtworkResolver,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        for run in 1..=runs {
            let mut cache = RunCache::new();
            for template in templates {
                match self.fabricate_from(template, resolver, &mut cache) {
                    Ok(product) => report.push(BatchOutcome::Created {
                        source: template.id.clone(),
                        product,
                    }),
                    Err(e) => {
                        warn!(run, template = %template.id, error = %e, "fabrication failed");
                        report.push(BatchOutcome::Failed {
                            source: template.id.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }
        report
    }

    /// Pick a template, generate fresh tile and texture artwork for
    /// `request.theme`, then fabricate with that artwork pinned per role.
    /// A role whose generation fails is skipped; if every role fails,
    /// nothing is created.
    pub fn fabricate_specimen<R: Rng + ?Sized>(
        &self,
        request: &SpecimenRequest,
        backend: &dyn ArtworkBackend,
        graphics_root: &Path,
        rng: &mut R,
    ) -> Result<SpecimenReport> {
        let templates = self.client.list_templates()?;
        let template = select_template(&templates, request.search.as_deref(), rng)?;
        info!(
            template = %template.title,
            theme = %request.theme,
            backend = backend.name(),
            "fabricating specimen"
        );

        let mut resolver = ArtworkResolver::new(graphics_root);
        let mut artwork = Vec::new();
        for role in SPECIMEN_ROLES {
            let prompt = compose_prompt(&request.theme, Some(role), request.base_prompt.as_deref());
            let generated = match backend.render(&prompt, graphics_root, Some(role.dir_name())) {
                Ok(g) => g,
                Err(e) => {
                    warn!(%role, error = %e, "specimen artwork generation failed; skipping role");
                    continue;
                }
            };
            if let Some(file) = generated.files.first() {
                resolver = resolver.with_override(role, ArtworkSource::Local(file.clone()));
            }
            artwork.push(SpecimenArtwork {
                role,
                prompt,
                artwork: generated,
            });
        }
        if artwork.is_empty() {
            return Err(CbgError::Generation(
                "no specimen artwork was generated".to_string(),
            ));
        }

        let product = self.fabricate_from_template(&template.id, &resolver, &mut RunCache::new())?;
        Ok(SpecimenReport {
            template_id: template.id.clone(),
            template_title: template.title.clone(),
            backend: backend.name(),
            artwork,
            product,
        })
    }
}

/// Random template whose title contains `search` (case-insensitive).
/// With no match, any template is picked.
pub fn select_template<'a, R: Rng + ?Sized>(
    templates: &'a [Product],
    search: Option<&str>,
    rng: &mut R,
) -> Result<&'a Product> {
    if templates.is_empty() {
        return Err(CbgError::NoTemplates);
    }
    let needle = search.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());
    let Some(needle) = needle else {
        return templates.choose(rng).ok_or(CbgError::NoTemplates);
    };
    let matches: Vec<&Product> = templates
        .iter()
        .filter(|t| t.title.to_lowercase().contains(&needle))
        .collect();
    if matches.is_empty() {
        warn!(search = %needle, "no template matches search; picking from all templates");
        return templates.choose(rng).ok_or(CbgError::NoTemplates);
    }
    matches.choose(rng).copied().ok_or(CbgError::NoTemplates)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
