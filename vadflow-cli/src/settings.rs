//! VAD options file (JSON) for the replay host.
//!
//! Lookup order: `--options <path>` if given, else the per-user default
//! path if it exists, else built-in defaults. `VADFLOW_*` environment
//! variables are applied last.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use vadflow_core::VadOptions;

pub fn default_options_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vadflow")
            .join("options.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".config")
            })
            .join("vadflow")
            .join("options.json")
    }
}

/// Resolve the effective options for this run.
///
/// An explicit path must exist and parse; a broken default file is only
/// warned about.
pub fn load_options(explicit: Option<&Path>) -> Result<VadOptions> {
    let options = match explicit {
        Some(path) => read_options(path)?,
        None => {
            let path = default_options_path();
            if path.exists() {
                read_options(&path).unwrap_or_else(|e| {
                    warn!(path = %path.display(), "ignoring default options file: {e:#}");
                    VadOptions::default()
                })
            } else {
                VadOptions::default()
            }
        }
    };

    let options = options.with_env_overrides();
    options.validate().context("invalid VAD options")?;
    debug!(?options, "options resolved");
    Ok(options)
}

fn read_options(path: &Path) -> Result<VadOptions> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading options file {}", path.display()))?;
    serde_json::from_str::<VadOptions>(&raw)
        .with_context(|| format!("parsing options file {}", path.display()))
}

pub fn save_options(path: &Path, options: &VadOptions) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(options).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
