//! FFI (Foreign Function Interface) bindings for cross-language interop.
//!
//! This module exposes containers through C-compatible functions so a managed
//! host (C# via P/Invoke) can drive the bridge instead of the raw native
//! library.
//!
//! # Memory Management
//!
//! - Rust allocates memory and returns pointers to the host
//! - The calling code MUST call `vrmat_bridge_close` for every container and
//!   `vrmat_bridge_free_string` for every returned string
//! - Strings are null-terminated UTF-8
//! - On failure a function returns null, 0 or `CResultCode::Error`; the reason
//!   is available from `vrmat_bridge_last_error` on the same thread
//!
//! # Usage from C# (Windows)
//!
//! ```csharp
//! [DllImport("vrmat_bridge.dll")]
//! private static extern IntPtr vrmat_bridge_open(string library, string file);
//!
//! [DllImport("vrmat_bridge.dll")]
//! private static extern void vrmat_bridge_close(IntPtr container);
//! ```

use crate::config::BridgeConfig;
use crate::container::Container;
use crate::library::VrmatLibrary;
use crate::operations::snapshot;
use crate::plugin::{ElementId, PluginId};
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::fmt::Display;
use std::os::raw::{c_char, c_int, c_uint};
use std::path::PathBuf;
use std::ptr;
use std::sync::Arc;

// ============================================================================
// C-Compatible Types
// ============================================================================

/// Opaque handle to an open container
pub struct CContainer {
    container: Container,
}

/// Result code for operations
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CResultCode {
    Success = 0,
    Error = 1,
}

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

// ============================================================================
// Container Lifecycle
// ============================================================================

/// Load the native library and open a container.
///
/// `library_path` may be null to use `VRMAT_LIBRARY` or the platform default.
/// `file_name` may be null for an empty container.
/// Caller MUST call vrmat_bridge_close() when done.
#[no_mangle]
pub extern "C" fn vrmat_bridge_open(library_path: *const c_char, file_name: *const c_char) -> *mut CContainer {
    let path = if library_path.is_null() {
        match BridgeConfig::from_env() {
            Ok(config) => config.resolve_library_path(),
            Err(e) => return fail("Error reading configuration", e),
        }
    } else {
        match unsafe { str_arg(library_path) } {
            Some(s) => PathBuf::from(s),
            None => return fail("Error opening container", "library path is not UTF-8"),
        }
    };

    match VrmatLibrary::load(&path) {
        Ok(library) => open_with(Arc::new(library), file_name),
        Err(e) => fail("Error loading library", e),
    }
}

fn open_with(library: Arc<VrmatLibrary>, file_name: *const c_char) -> *mut CContainer {
    let opened = if file_name.is_null() {
        Container::create(library)
    } else {
        match unsafe { str_arg(file_name) } {
            Some(file) => Container::open(library, file),
            None => return fail("Error opening container", "file name is not UTF-8"),
        }
    };

    match opened {
        Ok(container) => Box::into_raw(Box::new(CContainer { container })),
        Err(e) => fail("Error opening container", e),
    }
}

/// Close a container returned by vrmat_bridge_open(). Null is ignored.
#[no_mangle]
pub extern "C" fn vrmat_bridge_close(container: *mut CContainer) {
    if !container.is_null() {
        unsafe {
            let _ = Box::from_raw(container);
        }
    }
}

/// Replace the contents with an in-memory document.
#[no_mangle]
pub extern "C" fn vrmat_bridge_load(container: *mut CContainer, buffer: *const c_char) -> CResultCode {
    let Some(c) = (unsafe { container.as_mut() }) else {
        return fail_code("Error loading buffer", "null container");
    };
    let Some(buffer) = (unsafe { str_arg(buffer) }) else {
        return fail_code("Error loading buffer", "buffer is null or not UTF-8");
    };
    to_code("Error loading buffer", c.container.load(buffer))
}

/// Save the container. `version` selects the on-disk layout.
#[no_mangle]
pub extern "C" fn vrmat_bridge_save(container: *const CContainer, file_name: *const c_char, version: c_int) -> CResultCode {
    let Some(c) = (unsafe { container.as_ref() }) else {
        return fail_code("Error saving container", "null container");
    };
    let Some(file) = (unsafe { str_arg(file_name) }) else {
        return fail_code("Error saving container", "file name is null or not UTF-8");
    };
    to_code("Error saving container", c.container.save(file, version))
}

// ============================================================================
// Registry
// ============================================================================

/// Add a plugin. Returns its id, or 0 on error.
#[no_mangle]
pub extern "C" fn vrmat_bridge_add_plugin(
    container: *mut CContainer,
    name: *const c_char,
    plugin_type: *const c_char,
    class: *const c_char,
) -> c_uint {
    let Some(c) = (unsafe { container.as_mut() }) else {
        return fail_id("Error adding plugin", "null container");
    };
    let (Some(name), Some(plugin_type), Some(class)) =
        (unsafe { (str_arg(name), str_arg(plugin_type), str_arg(class)) })
    else {
        return fail_id("Error adding plugin", "null or non-UTF-8 argument");
    };

    match c.container.add_plugin(name, plugin_type, class) {
        Ok(id) => id.get(),
        Err(e) => fail_id("Error adding plugin", e),
    }
}

/// Add a parameter to a plugin. Returns its id, or 0 on error.
#[no_mangle]
pub extern "C" fn vrmat_bridge_add_parameter(
    container: *mut CContainer,
    plugin_id: c_uint,
    name: *const c_char,
    param_type: *const c_char,
    custom: c_int,
) -> c_uint {
    let Some(c) = (unsafe { container.as_mut() }) else {
        return fail_id("Error adding parameter", "null container");
    };
    let Some(plugin) = PluginId::new(plugin_id) else {
        return fail_id("Error adding parameter", format!("invalid plugin id {}", plugin_id));
    };
    let (Some(name), Some(param_type)) = (unsafe { (str_arg(name), str_arg(param_type)) }) else {
        return fail_id("Error adding parameter", "null or non-UTF-8 argument");
    };

    match c.container.add_parameter(plugin, name, param_type, custom) {
        Ok(id) => id.get(),
        Err(e) => fail_id("Error adding parameter", e),
    }
}

/// Resolve a plugin (plugin_id 0) or parameter name. Returns 0 when not found.
#[no_mangle]
pub extern "C" fn vrmat_bridge_element_id(container: *const CContainer, plugin_id: c_uint, name: *const c_char) -> c_uint {
    let Some(c) = (unsafe { container.as_ref() }) else {
        return fail_id("Error resolving element", "null container");
    };
    let Some(name) = (unsafe { str_arg(name) }) else {
        return fail_id("Error resolving element", "name is null or not UTF-8");
    };

    match c.container.element_id(PluginId::new(plugin_id), name) {
        Ok(found) => found.map(ElementId::get).unwrap_or(0),
        Err(e) => fail_id("Error resolving element", e),
    }
}

/// Remove a plugin or parameter.
#[no_mangle]
pub extern "C" fn vrmat_bridge_remove_element(container: *mut CContainer, element_id: c_uint) -> CResultCode {
    let Some(c) = (unsafe { container.as_mut() }) else {
        return fail_code("Error removing element", "null container");
    };
    let Some(element) = ElementId::new(element_id) else {
        return fail_code("Error removing element", "element id 0");
    };
    to_code("Error removing element", c.container.remove_element(element))
}

// ============================================================================
// Snapshot
// ============================================================================

/// Dump the whole container as JSON.
/// Caller MUST call vrmat_bridge_free_string() when done.
#[no_mangle]
pub extern "C" fn vrmat_bridge_snapshot_json(container: *const CContainer) -> *mut c_char {
    let Some(c) = (unsafe { container.as_ref() }) else {
        return fail("Error taking snapshot", "null container");
    };

    let json = snapshot(&c.container)
        .map_err(|e| e.to_string())
        .and_then(|s| serde_json::to_string(&s).map_err(|e| e.to_string()));
    match json {
        Ok(json) => string_to_c_char(&json),
        Err(e) => fail("Error taking snapshot", e),
    }
}

// ============================================================================
// String Management
// ============================================================================

/// Last error recorded on this thread, or null.
/// Caller MUST call vrmat_bridge_free_string() when done.
#[no_mangle]
pub extern "C" fn vrmat_bridge_last_error() -> *mut c_char {
    LAST_ERROR.with(|slot| match slot.borrow().as_deref() {
        Some(message) => string_to_c_char(message),
        None => ptr::null_mut(),
    })
}

/// Free a string returned by FFI functions.
#[no_mangle]
pub extern "C" fn vrmat_bridge_free_string(s: *mut c_char) {
    free_c_char(s);
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Borrow a C string argument.
///
/// # Safety
/// `p` must be null or point to a NUL-terminated string that outlives `'a`.
unsafe fn str_arg<'a>(p: *const c_char) -> Option<&'a str> {
    if p.is_null() {
        return None;
    }
    CStr::from_ptr(p).to_str().ok()
}

fn record_error(context: &str, error: impl Display) {
    let message = format!("{}: {}", context, error);
    log::warn!("{}", message);
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

fn fail<T>(context: &str, error: impl Display) -> *mut T {
    record_error(context, error);
    ptr::null_mut()
}

fn fail_code(context: &str, error: impl Display) -> CResultCode {
    record_error(context, error);
    CResultCode::Error
}

fn fail_id(context: &str, error: impl Display) -> c_uint {
    record_error(context, error);
    0
}

fn to_code<E: Display>(context: &str, result: std::result::Result<(), E>) -> CResultCode {
    match result {
        Ok(()) => CResultCode::Success,
        Err(e) => fail_code(context, e),
    }
}

fn string_to_c_char(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(c_str) => c_str.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn free_c_char(s: *mut c_char) {
    if !s.is_null() {
        unsafe {
            let _ = CString::from_raw(s);
        }
    }
}
