use super::helpers::{fetcher, list_or_dash};
use crate::config::Config;
use crate::error::Result;
use crate::identity::IdentitySource;
use std::path::Path;

pub fn execute(config: &Config, reference: &str, version_ref: Option<&str>) -> Result<()> {
    let source = IdentitySource::parse(reference, version_ref)?;
    let (manifest, dir) = fetcher(config, Path::new(".")).resolve_identity(&source)?;

    let title = if manifest.emoji.is_empty() {
        format!("{} ({})", manifest.name, manifest.display_name)
    } else {
        format!("{} {} ({})", manifest.emoji, manifest.name, manifest.display_name)
    };
    println!("{}", title);
    if !manifest.description.is_empty() {
        println!("  {}", manifest.description);
    }
    println!();
    println!("  source:           {}", source.label());
    println!("  directory:        {}", dir.display());
    println!("  role:             {}", manifest.role);
    println!("  volume size:      {}GB", manifest.volume_size);
    println!(
        "  model:            {}",
        manifest.model.as_deref().unwrap_or("-")
    );
    println!("  skills:           {}", list_or_dash(&manifest.skills));
    println!("  plugins:          {}", list_or_dash(&manifest.plugins));
    println!("  deps:             {}", list_or_dash(&manifest.deps));
    println!("  template vars:    {}", list_or_dash(&manifest.template_vars));
    println!(
        "  required secrets: {}",
        list_or_dash(&manifest.required_secrets)
    );

    Ok(())
}
