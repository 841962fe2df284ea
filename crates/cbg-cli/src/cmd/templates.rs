use crate::output::{print_json, print_report, print_table};
use clap::Subcommand;
use std::path::Path;
use std::time::Duration;

#[derive(Subcommand)]
pub enum TemplatesSubcommand {
    /// List products whose title marks them as templates
    List,

    /// Create a template from every shop product that is not one yet
    Promote {
        /// Pause between creations in milliseconds (default: template_pause_ms)
        #[arg(long)]
        pause_ms: Option<u64>,
    },
}

pub fn run(root: &Path, subcmd: TemplatesSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        TemplatesSubcommand::List => list(root, json),
        TemplatesSubcommand::Promote { pause_ms } => promote(root, pause_ms, json),
    }
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let fabricator = super::connect(root)?;
    let templates = fabricator.client().list_templates()?;

    if json {
        let items: Vec<_> = templates
            .iter()
            .map(|t| {
                serde_json::json!({
                    "id": t.id,
                    "title": t.title,
                    "blueprint_id": t.blueprint_id,
                    "print_provider_id": t.print_provider_id,
                })
            })
            .collect();
        return print_json(&items);
    }

    if templates.is_empty() {
        println!("No templates. Run `cbg templates promote` to create some.");
        return Ok(());
    }
    let rows = templates
        .iter()
        .map(|t| {
            vec![
                t.id.clone(),
                t.template_base_title().to_string(),
                t.blueprint_id.to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "TITLE", "BLUEPRINT"], rows);
    Ok(())
}

fn promote(root: &Path, pause_ms: Option<u64>, json: bool) -> anyhow::Result<()> {
    let fabricator = super::connect(root)?;
    let pause = Duration::from_millis(pause_ms.unwrap_or(fabricator.config().template_pause_ms));
    let report = fabricator.promote_templates(pause)?;

    if json {
        print_json(&report)
    } else {
        print_report(&report);
        Ok(())
    }
}
