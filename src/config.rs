//! Mock server settings, loaded from TOML or YAML.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File names looked up by [`discover_config`], in order.
pub const CONFIG_FILE_NAMES: [&str; 3] = ["schema-mock.yaml", "schema-mock.yml", "schema-mock.toml"];

/// Defaults applied to every endpoint of a [`crate::MockApi`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MockConfig {
    /// Seed for link sampling and filler generation; random when unset.
    pub seed: Option<u64>,
    /// Items per list response unless the endpoint sets its own.
    pub list_count: usize,
    /// Fail [`crate::MockApi::check`] on dangling link references.
    pub validate_links: bool,
    /// Validate every generated response against its output schema.
    pub validate_responses: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            seed: None,
            list_count: 5,
            validate_links: false,
            validate_responses: false,
        }
    }
}

/// Load a config file. The format follows the extension.
///
/// An empty or comment-only file yields the defaults.
///
/// # Errors
///
/// `ConfigError::NotFound` / `ConfigError::Read` for IO problems, a parse
/// error for malformed content, `ConfigError::UnsupportedFormat` for other
/// extensions.
pub fn load_config(path: &Path) -> Result<MockConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let config = match extension.as_deref() {
        Some("toml") => toml::from_str(&content).map_err(|e| ConfigError::Toml {
            path: path.to_path_buf(),
            source: e,
        })?,
        Some("yaml") | Some("yml") => {
            if is_blank_yaml(&content) {
                MockConfig::default()
            } else {
                serde_yaml::from_str(&content).map_err(|e| ConfigError::Yaml {
                    path: path.to_path_buf(),
                    source: e,
                })?
            }
        }
        _ => {
            return Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    };

    tracing::debug!(path = %path.display(), ?config, "loaded config");
    Ok(config)
}

fn is_blank_yaml(content: &str) -> bool {
    content
        .lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with('#') || line == "---")
}

/// Look for a config file in `dir`, then in its parent.
///
/// Returns `Ok(None)` when neither directory has one.
pub fn discover_config(dir: &Path) -> Result<Option<(PathBuf, MockConfig)>, ConfigError> {
    for candidate_dir in std::iter::once(dir).chain(dir.parent()) {
        for name in CONFIG_FILE_NAMES {
            let path = candidate_dir.join(name);
            if path.is_file() {
                let config = load_config(&path)?;
                return Ok(Some((path, config)));
            }
        }
    }
    Ok(None)
}
