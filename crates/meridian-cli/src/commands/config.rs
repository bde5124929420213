//! Config command handlers

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

use meridian_core::Config;

use crate::output::{Output, OutputFormat};

const VALID_KEYS: &str = "data_dir, remote_url, sync_enabled, local_capacity_bytes, log_file, \
     debounce_ms, saved_dwell_ms, error_dwell_ms, remote_poll_secs, local_poll_secs, \
     request_timeout_secs";

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            output.json(&serde_json::json!({
                "data_dir": config.data_dir,
                "remote_url": config.remote_url,
                "sync_enabled": config.sync_enabled,
                "local_capacity_bytes": config.local_capacity_bytes,
                "log_file": config.log_file,
                "timing": config.timing,
                "token_from_env": config.token_override.is_some(),
            }));
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            let timing = &config.timing;
            println!("Configuration:");
            println!("  data_dir:             {}", config.data_dir.display());
            println!("  remote_url:           {}", config.remote_url);
            println!("  sync_enabled:         {}", config.sync_enabled);
            println!("  local_capacity_bytes: {}", config.local_capacity_bytes);
            println!(
                "  log_file:             {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Timing:");
            println!("  debounce_ms:          {}", timing.debounce_ms);
            println!("  saved_dwell_ms:       {}", timing.saved_dwell_ms);
            println!("  error_dwell_ms:       {}", timing.error_dwell_ms);
            println!("  remote_poll_secs:     {}", timing.remote_poll_secs);
            println!("  local_poll_secs:      {}", timing.local_poll_secs);
            println!("  request_timeout_secs: {}", timing.request_timeout_secs);
            println!();
            if config.token_override.is_some() {
                println!("Token: from MERIDIAN_TOKEN (not stored)");
            }
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let timing = &mut config.timing;
    match key {
        "data_dir" => config.data_dir = value.into(),
        "remote_url" => {
            if value.trim().is_empty() {
                bail!("remote_url cannot be empty");
            }
            config.remote_url = value.trim().to_string();
        }
        "sync_enabled" => config.sync_enabled = parse(key, value)?,
        "local_capacity_bytes" => config.local_capacity_bytes = parse(key, value)?,
        "log_file" => {
            config.log_file = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.into())
            };
        }
        "debounce_ms" => timing.debounce_ms = parse(key, value)?,
        "saved_dwell_ms" => timing.saved_dwell_ms = parse(key, value)?,
        "error_dwell_ms" => timing.error_dwell_ms = parse(key, value)?,
        "remote_poll_secs" => timing.remote_poll_secs = positive(key, value)?,
        "local_poll_secs" => timing.local_poll_secs = positive(key, value)?,
        "request_timeout_secs" => timing.request_timeout_secs = positive(key, value)?,
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                VALID_KEYS
            );
        }
    }
    Ok(())
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    match value.trim().parse() {
        Ok(parsed) => Ok(parsed),
        Err(_) => bail!("Invalid value for {}: '{}'", key, value),
    }
}

fn positive(key: &str, value: &str) -> Result<u64> {
    let parsed: u64 = parse(key, value)?;
    if parsed == 0 {
        bail!("{} must be greater than zero", key);
    }
    Ok(parsed)
}
