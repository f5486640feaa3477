// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::{Config, GeneralConfig};

/// Configuration directory: `~/.config/reka`.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("reka")
}

/// Load configuration from `~/.config/reka/config.toml`, or from `extra`
/// when given (e.g. a `--config` CLI flag).
///
/// A missing user config is created from the defaults on first run so the
/// user has a file to edit.  A file that exists but fails to parse is a hard
/// error — configuration problems must never be silently swallowed.
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let path = match extra {
        Some(p) => p.to_path_buf(),
        None => {
            let p = config_dir().join("config.toml");
            if !p.exists() {
                // Best-effort: the agent still runs with defaults when the
                // config dir is not writable.
                if let Err(e) = write_default_config(&p) {
                    debug!(path = %p.display(), error = %e, "could not write default config");
                }
            }
            p
        }
    };

    if !path.is_file() {
        if extra.is_some() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        let mut config = Config::default();
        hydrate_models(&mut config);
        return Ok(config);
    }

    debug!(path = %path.display(), "loading config");
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    let user: toml::Value = toml::from_str(&text)
        .with_context(|| format!("parsing {}", path.display()))?;

    // Deep-merge the user file over the defaults so partial configs work.
    let mut merged = toml::Value::try_from(Config::default())
        .context("serializing default config")?;
    merge_toml(&mut merged, user);

    let mut config: Config = merged
        .try_into()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    hydrate_models(&mut config);
    Ok(config)
}

/// Resolve the SQLite history path: env var (name from config) → configured
/// `db_path` → `~/.config/reka/history.db`.
pub fn resolve_db_path(general: &GeneralConfig) -> PathBuf {
    if let Ok(p) = std::env::var(&general.db_path_env_var) {
        if !p.is_empty() {
            return PathBuf::from(p);
        }
    }
    if let Some(p) = general.db_path.as_deref().filter(|p| !p.is_empty()) {
        return PathBuf::from(p);
    }
    config_dir().join("history.db")
}

fn write_default_config(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(&Config::default())?;
    std::fs::write(path, format!("# reka configuration file\n\n{body}"))?;
    Ok(())
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_toml(dst: &mut toml::Value, src: toml::Value) {
    match (dst, src) {
        (toml::Value::Table(d), toml::Value::Table(s)) => {
            for (k, v) in s {
                match d.get_mut(&k) {
                    Some(entry) => merge_toml(entry, v),
                    None => {
                        d.insert(k, v);
                    }
                }
            }
        }
        (dst, src) => *dst = src,
    }
}

/// Copy endpoint details from each model's `[api.*]` reference onto the model
/// itself, and record the alias the model was registered under.  Values set
/// directly on the model win over the API defaults.
fn hydrate_models(config: &mut Config) {
    let api_defs = config.api.clone();
    for (alias, model) in config.models.iter_mut() {
        model.alias = alias.clone();
        let Some(api) = api_defs.get(&model.api) else {
            continue;
        };
        if model.base_url.is_none() && !api.url.is_empty() {
            model.base_url = Some(api.url.clone());
        }
        if model.api_key.is_none() {
            model.api_key = api.api_key.clone();
        }
        if model.api_key_env.is_none() {
            model.api_key_env = api.api_key_env.clone();
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
