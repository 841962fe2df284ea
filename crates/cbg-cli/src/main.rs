mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, templates::TemplatesSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cbg",
    about = "Fabricate Printify products from existing listings, templates, and generated artwork",
    version,
    propagate_version = true
)]
struct Cli {
    /// Workspace root (default: auto-detect from .cbg/ or .git/)
    #[arg(long, global = true, env = "CBG_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how each layer of a product would be classified
    Inspect {
        /// Product id
        product_id: String,
    },

    /// Clone a product with new body artwork
    Clone {
        /// Source product id
        product_id: String,

        /// Body artwork: local path or http(s) URL
        #[arg(long)]
        image: String,

        /// Trim artwork for aggressive clones (defaults to the body artwork)
        #[arg(long)]
        trim_image: Option<String>,

        /// Image id to preserve; switches to aggressive mode
        #[arg(long)]
        logo_id: Option<String>,

        /// Appended to the source title
        #[arg(long)]
        suffix: Option<String>,
    },

    /// Fabricate one product from a template
    Fabricate {
        /// Template product id (default: random template)
        #[arg(long)]
        template: Option<String>,

        /// Only pick among templates whose title contains this text
        #[arg(long)]
        search: Option<String>,

        /// Tile artwork override
        #[arg(long)]
        tile: Option<String>,

        /// Texture artwork override
        #[arg(long)]
        texture: Option<String>,

        /// Logo artwork override
        #[arg(long)]
        logo: Option<String>,
    },

    /// Fabricate from every template, several times over
    Batch {
        /// Passes over the template list
        #[arg(long, default_value = "1")]
        runs: usize,

        /// Only use templates whose title contains this text
        #[arg(long)]
        search: Option<String>,
    },

    /// List or create fabrication templates
    Templates {
        #[command(subcommand)]
        subcommand: TemplatesSubcommand,
    },

    /// Change a product's title or description
    Update {
        product_id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Generate artwork from a prompt or a house-style theme
    Generate(cmd::generate::GenerateArgs),

    /// Generate a tile and texture for a theme, then fabricate from a template
    Specimen(cmd::generate::SpecimenArgs),

    /// Inspect and validate configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Inspect { product_id } => cmd::inspect::run(&root, &product_id, cli.json),
        Commands::Clone {
            product_id,
            image,
            trim_image,
            logo_id,
            suffix,
        } => cmd::clone::run(
            &root,
            cmd::clone::CloneArgs {
                product_id,
                image,
                trim_image,
                logo_id,
                suffix,
            },
            cli.json,
        ),
        Commands::Fabricate {
            template,
            search,
            tile,
            texture,
            logo,
        } => cmd::fabricate::run(
            &root,
            cmd::fabricate::FabricateArgs {
                template,
                search,
                tile,
                texture,
                logo,
            },
            cli.json,
        ),
        Commands::Batch { runs, search } => {
            cmd::fabricate::batch(&root, runs, search.as_deref(), cli.json)
        }
        Commands::Templates { subcommand } => cmd::templates::run(&root, subcommand, cli.json),
        Commands::Update {
            product_id,
            title,
            description,
        } => cmd::update::run(&root, &product_id, title, description, cli.json),
        Commands::Generate(args) => cmd::generate::run(&root, args, cli.json),
        Commands::Specimen(args) => cmd::generate::specimen(&root, args, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
