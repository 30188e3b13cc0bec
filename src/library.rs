//! Native library loading
//!
//! Resolves every `DataContainer_*` entry point once, up front, so a missing
//! symbol is reported at load time rather than at first use.

use crate::abi::{symbols, NativeTable};
use crate::error::{Result, VrmatError};
use libloading::Library;
use std::path::{Path, PathBuf};

/// A loaded vrmat native library
pub struct VrmatLibrary {
    table: NativeTable,
    /// Display name (path or label) for diagnostics
    name: String,
    /// Keeps the shared object mapped while the table is in use
    _library: Option<Library>,
}

impl VrmatLibrary {
    /// Load the native library from a path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path.display().to_string();

        let library = unsafe {
            Library::new(path).map_err(|e| VrmatError::library_load(path, e.to_string()))?
        };

        let table = unsafe {
            NativeTable {
                create: resolve(&library, &name, symbols::CREATE)?,
                destroy: resolve(&library, &name, symbols::DESTROY)?,
                open: resolve(&library, &name, symbols::OPEN)?,
                load: resolve(&library, &name, symbols::LOAD)?,
                save: resolve(&library, &name, symbols::SAVE)?,
                get_meta: resolve(&library, &name, symbols::GET_META)?,
                set_meta: resolve(&library, &name, symbols::SET_META)?,
                get_unique_name: resolve(&library, &name, symbols::GET_UNIQUE_NAME)?,
                add_plugin: resolve(&library, &name, symbols::ADD_PLUGIN)?,
                add_parameter: resolve(&library, &name, symbols::ADD_PARAMETER)?,
                get_element_id: resolve(&library, &name, symbols::GET_ELEMENT_ID)?,
                remove_element: resolve(&library, &name, symbols::REMOVE_ELEMENT)?,
                set_value: resolve(&library, &name, symbols::SET_VALUE)?,
                get_value: resolve(&library, &name, symbols::GET_VALUE)?,
                iterator_create: resolve(&library, &name, symbols::ITERATOR_CREATE)?,
                iterator_destroy: resolve(&library, &name, symbols::ITERATOR_DESTROY)?,
                iterator_increment: resolve(&library, &name, symbols::ITERATOR_INCREMENT)?,
            }
        };

        log::info!("Loaded vrmat library '{}'", name);

        Ok(Self {
            table,
            name,
            _library: Some(library),
        })
    }

    /// Load the library by base name from the working directory or system paths
    pub fn load_by_name(name: &str) -> Result<Self> {
        Self::load(platform_lib_name(name))
    }

    /// Wrap entry points that are already linked into the process
    pub fn from_table(name: impl Into<String>, table: NativeTable) -> Self {
        Self {
            table,
            name: name.into(),
            _library: None,
        }
    }

    pub(crate) fn table(&self) -> &NativeTable {
        &self.table
    }

    /// Name of the library, for diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for VrmatLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VrmatLibrary").field("name", &self.name).finish()
    }
}

impl Drop for VrmatLibrary {
    fn drop(&mut self) {
        log::debug!("Unloading vrmat library '{}'", self.name);
    }
}

/// Resolve one symbol and copy the function pointer out of the library.
///
/// # Safety
/// `T` must match the exported function's signature.
unsafe fn resolve<T: Copy>(library: &Library, name: &str, symbol: &[u8]) -> Result<T> {
    library.get::<T>(symbol).map(|s| *s).map_err(|_| {
        let symbol = String::from_utf8_lossy(&symbol[..symbol.len() - 1]).into_owned();
        VrmatError::symbol_not_found(name, symbol)
    })
}

/// Platform-specific shared library file name for a base name
pub fn platform_lib_name(name: &str) -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        PathBuf::from(format!("{}.dll", name))
    }
    #[cfg(target_os = "macos")]
    {
        PathBuf::from(format!("lib{}.dylib", name))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        PathBuf::from(format!("lib{}.so", name))
    }
}
