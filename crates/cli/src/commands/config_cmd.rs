//! `monologue config`: configuration management commands.

use std::path::Path;

use anyhow::{Context, bail};
use monologue_config::AppConfig;

pub fn show(config: &AppConfig) -> anyhow::Result<()> {
    config.validate()?;
    let mut shown = config.clone();
    if shown.api_key.is_some() {
        shown.api_key = Some("[REDACTED]".into());
    }
    for provider in shown.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some("[REDACTED]".into());
        }
    }

    let toml_str = toml::to_string_pretty(&shown).context("Failed to render config")?;
    println!("{toml_str}");
    if !config.has_api_key() {
        eprintln!("  warning: no API key set (MONOLOGUE_API_KEY, OPENROUTER_API_KEY or OPENAI_API_KEY)");
    }
    Ok(())
}

pub fn init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
