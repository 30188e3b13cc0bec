//! Bridge configuration: where the native library lives and which layout
//! version `save` writes.

use crate::error::{Result, VrmatError};
use crate::library::{platform_lib_name, VrmatLibrary};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming the native library file
pub const LIBRARY_ENV: &str = "VRMAT_LIBRARY";
/// Environment variable overriding the save layout version
pub const SAVE_VERSION_ENV: &str = "VRMAT_SAVE_VERSION";
/// Base name of the native library when no path is configured
pub const DEFAULT_LIBRARY_NAME: &str = "vrmat";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Explicit path to the native library
    pub library_path: Option<PathBuf>,
    /// Layout version passed to `save`; 0 is the legacy XML layout
    pub save_version: i32,
}

impl BridgeConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = lookup(LIBRARY_ENV).filter(|p| !p.trim().is_empty()) {
            config.library_path = Some(PathBuf::from(path));
        }
        if let Some(version) = lookup(SAVE_VERSION_ENV) {
            config.save_version = version.trim().parse().map_err(|_| {
                VrmatError::Config(format!("{} must be an integer, got '{}'", SAVE_VERSION_ENV, version))
            })?;
        }
        Ok(config)
    }

    /// Parse a JSON configuration document. Missing fields take defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| VrmatError::Config(e.to_string()))
    }

    /// Read a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| VrmatError::Config(format!("cannot read '{}': {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Configured path, or the platform file name of the default library
    pub fn resolve_library_path(&self) -> PathBuf {
        self.library_path
            .clone()
            .unwrap_or_else(|| platform_lib_name(DEFAULT_LIBRARY_NAME))
    }

    pub fn load_library(&self) -> Result<VrmatLibrary> {
        VrmatLibrary::load(self.resolve_library_path())
    }
}
