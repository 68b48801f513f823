use crate::config::Config;
use crate::error::Result;
use crate::manifest::load_manifest;

pub fn execute(config: &Config) -> Result<()> {
    let path = config.manifest_path();
    println!("Validating {}...", path.display());

    match load_manifest(&path) {
        Ok(manifest) => {
            println!(
                "✓ Manifest is valid: stack '{}' on {} ({}), {} agent(s)",
                manifest.stack_name,
                manifest.provider,
                manifest.region,
                manifest.agents.len()
            );
            if let Some(root) = &manifest.identities {
                println!("  identity root: {}", root.to_source()?.label());
            }
            Ok(())
        }
        Err(e) => {
            println!("✗ Manifest is invalid!");
            Err(e)
        }
    }
}
