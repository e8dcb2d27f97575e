//! `hatch validate` — check the config file without connecting.

use std::path::Path;

use anyhow::{Context, Result};

use hatch_core::action::Runner;

use crate::config;

pub fn run(config_path: &Path) -> Result<()> {
    println!("Validating {} ...\n", config_path.display());

    let (cfg, registry) = config::load(config_path).context("validation failed")?;

    println!("Config file is valid");
    println!("  Name:    {}", cfg.name);
    if !cfg.description.is_empty() {
        println!("  About:   {}", cfg.description);
    }
    println!("  Version: {}", cfg.version);
    println!("  Actions: {}\n", registry.len());

    for (index, action) in registry.actions().iter().enumerate() {
        let kind = match action.runner {
            Runner::Process(_) => "process",
            Runner::Http(_) => "http",
        };
        println!("  {}. {} ({kind})", index + 1, action.name);
        if !action.description.is_empty() {
            println!("     {}", action.description);
        }
    }

    Ok(())
}
