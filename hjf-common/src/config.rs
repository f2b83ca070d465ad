//! Configuration file discovery and data folder resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Application directory name under the platform config/data dirs
const APP_DIR: &str = "hjf";

/// Data folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML config file value
/// 4. OS-dependent compiled default
pub fn resolve_data_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    config_value: Option<&Path>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = config_value {
        return path.to_path_buf();
    }

    default_data_folder()
}

/// OS-dependent default data folder
pub fn default_data_folder() -> PathBuf {
    if cfg!(target_os = "macos") {
        // ~/Library/Application Support/hjf
        dirs::data_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/hjf"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\hjf
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\hjf"))
    } else {
        // ~/.local/share/hjf
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("./hjf_data"))
    }
}

/// Locate the bootstrap TOML file for a module
///
/// Priority: explicit path, then `env_var_name`, then
/// `<config_dir>/hjf/<module>.toml`. Returns `None` when nothing exists.
pub fn locate_config_file(
    explicit: Option<&Path>,
    env_var_name: &str,
    module_name: &str,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join(APP_DIR).join(format!("{}.toml", module_name)))
        .filter(|p| p.exists())
}

/// Load a TOML config file, degrading to defaults when it is absent
///
/// A missing file logs a warning and yields `T::default()`. A file that
/// exists but cannot be parsed is an error.
pub fn load_toml_or_default<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        warn!("No config file found, using compiled defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, using compiled defaults");
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

    info!(path = %path.display(), "Loaded config file");
    Ok(config)
}

/// Ensure the data folder exists and return the database path inside it
pub fn prepare_data_folder(data_folder: &Path, db_file_name: &str) -> Result<PathBuf> {
    if !data_folder.exists() {
        std::fs::create_dir_all(data_folder)?;
        info!(path = %data_folder.display(), "Created data folder");
    }
    Ok(data_folder.join(db_file_name))
}
