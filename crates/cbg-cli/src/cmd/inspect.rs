use crate::output::{print_json, print_table};
use std::path::Path;

pub fn run(root: &Path, product_id: &str, json: bool) -> anyhow::Result<()> {
    let fabricator = super::connect(root)?;
    let report = fabricator.inspect(product_id)?;

    if json {
        return print_json(&report);
    }

    println!("{} ({})", report.title, report.product_id);
    println!(
        "blueprint {} / provider {}, {} enabled variants",
        report.blueprint_id, report.print_provider_id, report.enabled_variants
    );
    match &report.main_image.main_id {
        Some(id) => println!("main image: {id}"),
        None => println!("main image: none (product has no layers)"),
    }
    println!();

    let rows = report
        .layers
        .iter()
        .map(|l| {
            let template_role = report
                .template_roles
                .get(&l.image_id)
                .map(|r| r.to_string())
                .unwrap_or_default();
            vec![
                l.position.clone(),
                l.layer_index.to_string(),
                l.image_id.clone(),
                format!("{:.2}", l.scale),
                l.role.to_string(),
                template_role,
            ]
        })
        .collect();
    print_table(
        &["POSITION", "LAYER", "IMAGE", "SCALE", "ROLE", "TEMPLATE ROLE"],
        rows,
    );
    Ok(())
}
