//! Show and edit saved preferences

use crate::config::{config_file, Config};
use crate::monitor::FilterType;
use anyhow::{Context, Result};
use console::style;

pub fn show() -> Result<()> {
    let config = Config::load()?;
    let content = serde_yaml::to_string(&config).context("Failed to serialize config")?;

    println!("{} {}", style("Config file:").dim(), config_file().display());
    println!();
    print!("{}", content);
    Ok(())
}

pub fn set_filters(filters: Vec<FilterType>) -> Result<()> {
    let mut config = Config::load()?;
    config.set_filters(filters);
    config.save()?;

    println!(
        "{} {}",
        style("Default filters:").green(),
        config
            .filters
            .iter()
            .map(FilterType::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}
