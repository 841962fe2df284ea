use crate::output::print_json;
use cbg_core::printify::{product_admin_url, ProductUpdate};
use std::path::Path;

pub fn run(
    root: &Path,
    product_id: &str,
    title: Option<String>,
    description: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let update = ProductUpdate { title, description };
    if update.is_empty() {
        anyhow::bail!("nothing to update: pass --title and/or --description");
    }

    let fabricator = super::connect(root)?;
    let client = fabricator.client();
    let product = client.update_product(product_id, &update)?;

    if json {
        print_json(&serde_json::json!({
            "id": product.id,
            "title": product.title,
            "admin_url": product_admin_url(client.shop_id(), &product.id),
        }))
    } else {
        println!("Updated {} ({})", product.id, product.title);
        Ok(())
    }
}
