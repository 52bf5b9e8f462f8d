//! `lectern config` subcommands

use anyhow::{bail, Context, Result};
use std::path::Path;

use lectern_config::{ConfigLoader, LecternConfig};

/// Handle config validate command
pub fn handle_config_validate(config_file: &Path) -> Result<()> {
    println!("Validating configuration file: {}", config_file.display());

    if !config_file.exists() {
        bail!("Configuration file not found: {}", config_file.display());
    }

    match ConfigLoader::new().from_file(config_file) {
        Ok(config) => {
            println!("✅ Configuration is valid");
            println!(
                "   server: {}{}",
                config.server.listen_addr(),
                config.server.api_prefix
            );
            println!("   upload dir: {}", config.storage.upload_dir.display());
            println!(
                "   worker grace period: {}ms",
                config.execution.grace_period.as_millis()
            );
            Ok(())
        }
        Err(e) => {
            println!("❌ Configuration validation failed: {}", e);
            Err(e.into())
        }
    }
}

/// Handle config sample command
pub fn handle_config_sample(output: Option<&Path>, force: bool) -> Result<()> {
    let sample = render_sample();

    let Some(path) = output else {
        print!("{}", sample);
        return Ok(());
    };

    if path.exists() && !force {
        bail!(
            "File already exists: {}. Use --force to overwrite.",
            path.display()
        );
    }

    std::fs::write(path, sample)
        .with_context(|| format!("Failed to write sample configuration to {}", path.display()))?;
    println!("✅ Sample configuration written to: {}", path.display());
    Ok(())
}

fn render_sample() -> String {
    format!(
        "# Lectern configuration\n# Every value below is the built-in default.\n{}",
        LecternConfig::generate_sample()
    )
}
