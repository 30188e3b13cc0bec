//! Container-level operations built on the primitives (snapshot, export, copy).
//!
//! This module provides functions working on whole documents:
//! - Snapshot: Owned, serializable dump of every plugin and parameter
//! - Export: Write a snapshot next to a timestamped manifest
//! - Copy: Clone a plugin with its parameters into another container

use crate::container::Container;
use crate::error::{Result, VrmatError};
use crate::meta::{Meta, MetaMask};
use crate::plugin::{ParamId, PluginId};
use crate::value::Value;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File written by [`export_snapshot`]
pub const SNAPSHOT_FILE: &str = "snapshot.json";

/// Everything a container holds, copied out of native memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    pub root: Meta,
    pub plugins: Vec<PluginSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSnapshot {
    pub id: PluginId,
    pub meta: Meta,
    pub parameters: Vec<ParamSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSnapshot {
    pub id: ParamId,
    pub meta: Meta,
    /// `None` for parameters that were never assigned
    pub value: Option<Value>,
}

impl ContainerSnapshot {
    pub fn plugin(&self, name: &str) -> Option<&PluginSnapshot> {
        self.plugins
            .iter()
            .find(|p| p.meta.plugin_name.as_deref() == Some(name))
    }
}

impl PluginSnapshot {
    pub fn parameter(&self, name: &str) -> Option<&ParamSnapshot> {
        self.parameters
            .iter()
            .find(|p| p.meta.param_name.as_deref() == Some(name))
    }
}

/// Walk the container with cursors and copy out root, plugin and parameter data
pub fn snapshot(container: &Container) -> Result<ContainerSnapshot> {
    let root = container.root_meta()?;
    let mut plugins = Vec::new();
    for entry in container.plugins()?.entries() {
        plugins.push(snapshot_plugin(container, entry?.plugin)?);
    }

    log::debug!(
        "Snapshot of container {}: {} plugin(s)",
        container.id(),
        plugins.len()
    );
    Ok(ContainerSnapshot { root, plugins })
}

fn snapshot_plugin(container: &Container, plugin: PluginId) -> Result<PluginSnapshot> {
    let meta = container.meta(plugin.into(), MetaMask::PLUGIN)?;
    let mut parameters = Vec::new();

    for entry in container.parameters(plugin)?.entries() {
        let entry = entry?;
        let Some(id) = entry.param else {
            continue;
        };
        let value = match entry.tag {
            Some(_) => Some(container.get_value(id)?),
            None => None,
        };
        parameters.push(ParamSnapshot {
            id,
            meta: container.meta(id.into(), MetaMask::PARAM)?,
            value,
        });
    }

    Ok(PluginSnapshot {
        id: plugin,
        meta,
        parameters,
    })
}

/// Export a snapshot of the container to `export_dir`.
/// Returns the path of the written file.
pub fn export_snapshot(container: &Container, export_dir: &Path) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(export_dir)
        .context(format!("Failed to create export directory: {:?}", export_dir))?;

    let snapshot = snapshot(container).context("Failed to read container")?;
    let export_path = export_dir.join(SNAPSHOT_FILE);
    let document = serde_json::json!({
        "library": container.library().name(),
        "file_name": snapshot.root.file_name,
        "plugin_count": snapshot.plugins.len(),
        "exported_at": chrono::Local::now().to_rfc3339(),
        "snapshot": snapshot,
    });

    let content = serde_json::to_string_pretty(&document)?;
    fs::write(&export_path, content)
        .context(format!("Failed to write snapshot: {:?}", export_path))?;

    log::info!("Exported container {} to {:?}", container.id(), export_path);
    Ok(export_path)
}

/// Copy `plugin` with its parameters and values from `src` into `dst`.
///
/// The copy is renamed if `dst` already has a plugin of that name.
pub fn copy_plugin(src: &Container, plugin: PluginId, dst: &mut Container) -> Result<PluginId> {
    let op = "copy_plugin";
    let source = snapshot_plugin(src, plugin)?;
    let meta = &source.meta;
    let (Some(name), Some(plugin_type), Some(class)) = (
        meta.plugin_name.as_deref(),
        meta.plugin_type.as_deref(),
        meta.plugin_class.as_deref(),
    ) else {
        return Err(VrmatError::abi(op, src.id(), format!("incomplete meta for {}", plugin)));
    };

    let new_name = dst.unique_name(name)?;
    let copy = dst.add_plugin(&new_name, plugin_type, class)?;
    if meta.plugin_version != 0 {
        let version = Meta {
            mask: MetaMask::PLUGIN_VERSION,
            plugin_version: meta.plugin_version,
            ..Meta::default()
        };
        dst.set_meta(copy.into(), &version)?;
    }

    for param in &source.parameters {
        let (Some(param_name), Some(param_type)) =
            (param.meta.param_name.as_deref(), param.meta.param_type.as_deref())
        else {
            return Err(VrmatError::abi(op, src.id(), format!("incomplete meta for {}", param.id)));
        };
        let id = dst.add_parameter(copy, param_name, param_type, param.meta.param_custom)?;
        if param.meta.param_file_path {
            let flag = Meta {
                mask: MetaMask::PARAM_FILE_PATH,
                param_file_path: true,
                ..Meta::default()
            };
            dst.set_meta(id.into(), &flag)?;
        }
        if let Some(value) = &param.value {
            dst.set_value(id, value)?;
        }
    }

    log::info!(
        "Copied '{}' from container {} to container {} as '{}'",
        name,
        src.id(),
        dst.id(),
        new_name
    );
    Ok(copy)
}
