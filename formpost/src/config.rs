//! Locating and reading `formpost.config.ron`

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use crate::Formpost;

/// Where a configuration file is looked for, after `FORMPOST_CONFIG`
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = [
    "./formpost.config.ron",
    "/etc/formpost/formpost.config.ron",
];

/// Parse a configuration from RON text
///
/// Variant payloads may be written inline (`File(path: "...")`) and
/// optional values without `Some(...)`.
///
/// # Errors
/// If the text is not a valid configuration
pub fn parse(text: &str) -> anyhow::Result<Formpost> {
    Ok(ron::Options::default()
        .with_default_extension(
            ron::extensions::Extensions::UNWRAP_VARIANT_NEWTYPES
                | ron::extensions::Extensions::IMPLICIT_SOME,
        )
        .from_str(text)?)
}

/// Read and parse the configuration file at `path`
///
/// # Errors
/// If the file cannot be read or is not a valid configuration
pub fn load(path: &Path) -> anyhow::Result<Formpost> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config from {}: {e}", path.display()))?;

    parse(&text).map_err(|e| anyhow::anyhow!("Invalid config in {}: {e}", path.display()))
}

/// Find the configuration file using the following precedence:
/// 1. `FORMPOST_CONFIG` environment variable
/// 2. `./formpost.config.ron` (current working directory)
/// 3. `/etc/formpost/formpost.config.ron` (system-wide config)
///
/// # Errors
/// If `FORMPOST_CONFIG` names a missing file, or no candidate exists
pub fn find_config_file() -> anyhow::Result<PathBuf> {
    let defaults = DEFAULT_CONFIG_PATHS.map(PathBuf::from);
    locate(std::env::var_os("FORMPOST_CONFIG"), &defaults)
}

/// [`find_config_file`] with the environment and candidates supplied
///
/// # Errors
/// As [`find_config_file`]
pub fn locate(env_path: Option<OsString>, candidates: &[PathBuf]) -> anyhow::Result<PathBuf> {
    if let Some(env_path) = env_path {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "FORMPOST_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    if let Some(path) = candidates.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = candidates
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - FORMPOST_CONFIG environment variable\n{paths_tried}"
    )
}
