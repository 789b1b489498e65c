//! config command - Show, validate and create configuration

use anyhow::{bail, Context as _, Result};
use std::path::Path;

use crate::cli::Context;
use crate::core::config::schema::ConfigFile;
use crate::core::config::Config;
use crate::ui::output::{self, format_count};

/// Print the configuration in effect.
///
/// The registry is always printed in full, including the built-in one.
pub fn show(ctx: &Context) -> Result<()> {
    let mut file = ctx.config.file.clone();
    let registry = file.registry();
    file.relationship = registry.relationships;
    file.entity = registry.entities;
    if file.store.is_none() {
        file.store = Some(ctx.config.store());
    }

    match ctx.config.path() {
        Some(path) => output::print(format!("# {}", path.display()), ctx.verbosity),
        None => output::print("# no config file found, using defaults", ctx.verbosity),
    }
    let text = toml::to_string_pretty(&file).context("failed to render configuration")?;
    println!("{}", text);
    Ok(())
}

/// Report that the configuration loaded and validated.
///
/// Loading already validated it; this prints what was found.
pub fn validate(ctx: &Context) -> Result<()> {
    let registry = ctx.config.registry();
    let source = ctx
        .config
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "built-in defaults".to_string());
    output::print(
        format!(
            "Configuration is valid ({}): {}, {}",
            source,
            format_count(registry.relationships.len(), "relationship"),
            format_count(registry.entities.len(), "entity type"),
        ),
        ctx.verbosity,
    );
    Ok(())
}

/// Write a starter config holding the built-in registry.
pub fn init(ctx: &Context, path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("'{}' already exists; use --force to overwrite", path.display());
    }
    Config::write(path, &ConfigFile::with_builtin_registry())?;
    output::print(format!("Wrote {}", path.display()), ctx.verbosity);
    Ok(())
}
