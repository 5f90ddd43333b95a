//! `dlgroup config` – print the effective configuration.

use anyhow::{Context, Result};
use dlgroup_core::config::{self, EngineConfig};

pub fn run_config(cfg: &EngineConfig) -> Result<i32> {
    println!("# {}", config::config_path()?.display());
    println!(
        "{}",
        serde_json::to_string_pretty(cfg).context("serialize config")?
    );
    Ok(0)
}
