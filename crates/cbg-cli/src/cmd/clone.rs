use crate::output::{print_created, print_json};
use cbg_core::fabricator::CloneRequest;
use cbg_core::resolver::ArtworkSource;
use std::path::Path;

pub struct CloneArgs {
    pub product_id: String,
    pub image: String,
    pub trim_image: Option<String>,
    pub logo_id: Option<String>,
    pub suffix: Option<String>,
}

pub fn run(root: &Path, args: CloneArgs, json: bool) -> anyhow::Result<()> {
    let fabricator = super::connect(root)?;

    let request = CloneRequest {
        product_id: args.product_id,
        body_artwork: ArtworkSource::parse(&args.image),
        trim_artwork: args.trim_image.as_deref().map(ArtworkSource::parse),
        logo_id: args.logo_id,
        title_suffix: args.suffix,
    };
    let created = fabricator.clone_product(&request)?;

    if json {
        print_json(&created)
    } else {
        print_created(&created);
        Ok(())
    }
}
