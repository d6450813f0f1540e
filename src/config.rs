use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::error_codes::CodedError;
use crate::remap::DiagnosticFormatKind;
use crate::resolver::IncludeLimits;

pub const DEFAULT_CONFIG_FILE: &str = "gshader.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    /// Entry shader; relative paths are taken from the config file's directory.
    pub entry: Option<PathBuf>,
    pub diagnostic_format: Option<DiagnosticFormatKind>,
    pub limits: IncludeLimits,
    pub watch: WatchSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchSettings {
    /// Fallback timestamp check when no filesystem event arrives.
    pub poll_interval_ms: u64,
    /// Quiet period that collapses bursts of editor writes into one reload.
    pub debounce_ms: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            debounce_ms: 50,
        }
    }
}

impl WatchSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

pub fn load_config(path: &Path) -> Result<ProjectConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let mut config: ProjectConfig = serde_yaml::from_str(&contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!(CodedError::usage(
            "INVALID_CONFIG",
            format!(
                "failed to parse yaml in {} at {}: {}",
                path.display(),
                location,
                error
            ),
        ))
    })?;

    validate_config(&mut config, path)?;
    Ok(config)
}

/// `explicit` when given, otherwise `gshader.yaml` in `dir` if present.
pub fn discover_config(explicit: Option<&Path>, dir: &Path) -> Result<Option<ProjectConfig>> {
    if let Some(path) = explicit {
        return load_config(path).map(Some);
    }
    let candidate = dir.join(DEFAULT_CONFIG_FILE);
    if candidate.is_file() {
        load_config(&candidate).map(Some)
    } else {
        Ok(None)
    }
}

fn validate_config(config: &mut ProjectConfig, config_path: &Path) -> Result<()> {
    let invalid = |message: String| anyhow!(CodedError::usage("INVALID_CONFIG", message));

    if config.limits.max_depth == 0 {
        return Err(invalid("limits.max_depth must be at least 1".to_owned()));
    }
    if config.limits.max_files == 0 {
        return Err(invalid("limits.max_files must be at least 1".to_owned()));
    }
    if config.watch.poll_interval_ms == 0 {
        return Err(invalid("watch.poll_interval_ms must be positive".to_owned()));
    }

    if let Some(entry) = &config.entry {
        let config_dir = config_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let resolved = if entry.is_absolute() {
            entry.clone()
        } else {
            config_dir.join(entry)
        };
        if resolved.exists() && !resolved.is_file() {
            return Err(invalid(format!(
                "entry is not a file: {}",
                resolved.display()
            )));
        }
        config.entry = Some(resolved);
    }

    Ok(())
}
