// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Configuration loading for `core_server` (spec §6 "Environment"): a TOML file merged with CLI
//! flags. Deliberately does not consult environment variables for anything core-owned.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

/// CLI flags recognized by `core_server`. Any flag present overrides the matching TOML field.
#[derive(Parser, Debug, Default)]
#[command(name = "core_server", about = "Device test orchestration core")]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub bind_address: Option<String>,

    #[arg(long)]
    pub allocation_db_path: Option<PathBuf>,

    #[arg(long)]
    pub xts_root: Option<PathBuf>,

    #[arg(long)]
    pub monitor_sink_endpoint: Option<String>,

    #[arg(long)]
    pub log_level: Option<String>,

    #[arg(long)]
    pub host_name: Option<String>,
}

/// The configuration record injected at construction, per spec §6: "flags for sink endpoints and
/// credentials are injected via a configuration record."
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub bind_address: String,
    pub allocation_db_path: PathBuf,
    pub xts_root: PathBuf,
    pub monitor_sink_endpoint: String,
    pub monitor_sink_credentials: Option<String>,
    pub log_level: String,
    pub scheduler_tick_interval_millis: u64,
    pub scheduler_yield_interval_millis: u64,
    pub alive_client_ttl_secs: u64,
    /// Identifies this process in the monitor pipeline's host-level message (spec §4.6). Injected
    /// via config/CLI rather than read from the environment (spec §6).
    pub host_name: String,
}

impl Default for CoreConfig {
    fn default() -> CoreConfig {
        CoreConfig {
            bind_address: "127.0.0.1:50051".to_owned(),
            allocation_db_path: PathBuf::from("./allocations.lmdb"),
            xts_root: PathBuf::from("./xts"),
            monitor_sink_endpoint: String::new(),
            monitor_sink_credentials: None,
            log_level: "info".to_owned(),
            scheduler_tick_interval_millis: 50,
            scheduler_yield_interval_millis: 10,
            alive_client_ttl_secs: 60,
            host_name: "core-server".to_owned(),
        }
    }
}

impl CoreConfig {
    /// Loads configuration from an optional TOML file, then applies CLI overrides. Shell-style
    /// `~`/`$VAR` expressions in path-like TOML values are expanded via `shellexpand`, but no
    /// fallback to reading environment variables directly is performed for any field.
    pub fn load(cli: &Cli) -> Result<CoreConfig, String> {
        let mut config = match &cli.config {
            Some(path) => CoreConfig::from_toml_file(path)?,
            None => CoreConfig::default(),
        };

        if let Some(bind_address) = &cli.bind_address {
            config.bind_address = bind_address.clone();
        }
        if let Some(path) = &cli.allocation_db_path {
            config.allocation_db_path = path.clone();
        }
        if let Some(path) = &cli.xts_root {
            config.xts_root = path.clone();
        }
        if let Some(endpoint) = &cli.monitor_sink_endpoint {
            config.monitor_sink_endpoint = endpoint.clone();
        }
        if let Some(level) = &cli.log_level {
            config.log_level = level.clone();
        }
        if let Some(host_name) = &cli.host_name {
            config.host_name = host_name.clone();
        }

        Ok(config)
    }

    fn from_toml_file(path: &Path) -> Result<CoreConfig, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file {}: {e}", path.display()))?;
        let mut config: CoreConfig =
            toml::from_str(&contents).map_err(|e| format!("invalid config TOML: {e}"))?;

        config.allocation_db_path =
            expand_path(&config.allocation_db_path).map_err(|e| e.to_string())?;
        config.xts_root = expand_path(&config.xts_root).map_err(|e| e.to_string())?;

        Ok(config)
    }
}

fn expand_path(path: &Path) -> Result<PathBuf, shellexpand::LookupError<std::env::VarError>> {
    let as_str = path.to_string_lossy();
    shellexpand::full(&as_str).map(|expanded| PathBuf::from(expanded.into_owned()))
}
