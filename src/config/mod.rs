//! Configuration Management
//!
//! Named lookup profiles, so the CLI does not need every option on every call.
//!
//! # Configuration Locations
//! - Local: `.kvlookup/config.json` (team-shareable, per-project)
//! - Global: `~/.config/kvlookup/profiles.json` (per-user)
//!
//! # Resolution Precedence
//! 1. Explicit command-line options (highest priority, applied by the CLI)
//! 2. Local config file (`.kvlookup/config.json`)
//! 3. Global config file (`~/.config/kvlookup/profiles.json`)
//!
//! Both files share one format:
//! ```json
//! {
//!   "profiles": {
//!     "threat-intel": { "host": "cache.internal", "key": "ip:{{entity}}", "passwordEnv": "TI_REDIS_PASSWORD" }
//!   },
//!   "default": "threat-intel"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{LookupError, Result};
use crate::options::RawOptions;

/// Profile registry as stored in a config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileRegistry {
    /// Named profiles
    #[serde(default)]
    pub profiles: HashMap<String, StoredProfile>,

    /// Name of the default profile (must exist in `profiles`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// Stored profile
///
/// The lookup options plus an optional environment variable holding the
/// password, so the password itself need not be written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredProfile {
    #[serde(flatten)]
    pub options: RawOptions,

    /// Environment variable name for password (if not storing password directly)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl StoredProfile {
    /// Resolve environment variables and return the options
    pub fn resolve(&self) -> Result<RawOptions> {
        let mut options = self.options.clone();

        if let Some(env_var) = &self.password_env {
            match std::env::var(env_var) {
                Ok(password) => options.password = Some(password),
                Err(_) => {
                    return Err(LookupError::config_error(format!(
                        "Environment variable {env_var} not found for password"
                    )));
                }
            }
        }

        Ok(options)
    }
}

impl ProfileRegistry {
    /// Look up a profile by name, or the default profile when no name is given
    pub fn resolve(&self, name: Option<&str>) -> Result<RawOptions> {
        let profile_name = match name {
            Some(n) => n,
            None => self.default.as_deref().ok_or_else(|| {
                LookupError::config_error(format!(
                    "No default profile set. Available profiles: {:?}. Specify one with --profile.",
                    self.names()
                ))
            })?,
        };

        let stored = self.profiles.get(profile_name).ok_or_else(|| {
            LookupError::config_error(format!(
                "Profile '{profile_name}' not found. Available profiles: {:?}",
                self.names()
            ))
        })?;

        stored.resolve()
    }

    /// Overlay `local` onto `self`: local profiles replace global ones of the
    /// same name, and a local default wins
    #[must_use]
    pub fn merged_with(mut self, local: Self) -> Self {
        self.profiles.extend(local.profiles);
        if local.default.is_some() {
            self.default = local.default;
        }
        self
    }

    /// Profile names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Configuration file location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Local config: `.kvlookup/config.json` (team-shareable)
    Local,
    /// Global config: `~/.config/kvlookup/profiles.json` (per-user)
    Global,
}

/// Get path to local config file (`.kvlookup/config.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        LookupError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(".kvlookup").join("config.json"))
}

/// Get path to global config file (`~/.config/kvlookup/profiles.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| LookupError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("kvlookup").join("profiles.json"))
}

/// Load a profile registry; a missing file is an empty registry
pub fn load_registry(path: &Path) -> Result<ProfileRegistry> {
    if !path.exists() {
        return Ok(ProfileRegistry::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| LookupError::config_error(format!("Could not read config file: {e}")))?;

    serde_json::from_str(&contents)
        .map_err(|e| LookupError::config_error(format!("Invalid config file format: {e}")))
}

/// Save a profile registry, creating parent directories as needed
pub fn save_registry(path: &Path, registry: &ProfileRegistry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            LookupError::config_error(format!("Could not create config directory: {e}"))
        })?;
    }

    let contents = serde_json::to_string_pretty(registry)
        .map_err(|e| LookupError::config_error(format!("Could not serialize config: {e}")))?;

    fs::write(path, contents)
        .map_err(|e| LookupError::config_error(format!("Could not write config file: {e}")))?;

    tracing::debug!(path = %path.display(), profiles = registry.profiles.len(), "Saved profile registry");
    Ok(())
}

/// Load the merged view of global and local registries (local wins)
pub fn load_with_precedence() -> Result<ProfileRegistry> {
    let global = load_registry(&global_config_path()?)?;
    let local = load_registry(&local_config_path()?)?;
    Ok(global.merged_with(local))
}

/// Resolve a profile by name (or the default profile) from the merged view
pub fn resolve_profile(name: Option<&str>) -> Result<RawOptions> {
    load_with_precedence()?.resolve(name)
}

/// Save a profile to a config file
///
/// The first profile saved to a file becomes its default. When `password_env`
/// is given the password is not written.
pub fn save_profile(
    name: &str,
    mut options: RawOptions,
    password_env: Option<String>,
    location: ConfigLocation,
) -> Result<()> {
    let config_path = match location {
        ConfigLocation::Local => local_config_path()?,
        ConfigLocation::Global => global_config_path()?,
    };

    let mut registry = load_registry(&config_path)?;

    if password_env.is_some() {
        options.password = None;
    }

    let is_first_profile = registry.profiles.is_empty();
    registry.profiles.insert(name.to_string(), StoredProfile { options, password_env });
    if is_first_profile {
        registry.default = Some(name.to_string());
    }

    save_registry(&config_path, &registry)
}

/// List all available profiles, sorted by name
///
/// Profiles whose password cannot be resolved are skipped with a warning.
pub fn list_profiles() -> Result<Vec<(String, RawOptions)>> {
    let registry = load_with_precedence()?;

    let mut profiles = Vec::new();
    for name in registry.names() {
        match registry.resolve(Some(name)) {
            Ok(options) => profiles.push((name.to_string(), options)),
            Err(_) => {
                // Error details not logged to prevent credential leakage
                tracing::warn!(profile = name, "Could not resolve profile");
            }
        }
    }

    Ok(profiles)
}
