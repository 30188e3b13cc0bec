//! vrmat bridge
//!
//! Safe wrapper around the native vrmat material-container library
//! (`DataContainer_*` C ABI): documents holding plugins, their parameters and
//! typed parameter values.
//!
//! # Architecture
//!
//! The native library is loaded at runtime and every entry point is resolved
//! once into a function table. Each [`Container`] owns one native handle;
//! [`Cursor`]s borrow their container, so the container cannot change while
//! it is being iterated. All native status codes are checked per call and
//! turned into [`VrmatError`]s.
//!
//! The crate is also built as a `cdylib`/`staticlib` exposing a small C API
//! (`ffi` module) for managed hosts.
//!
//! # Modules
//!
//! ## Handle lifecycle (`container` module)
//! - `Container::create()` / `open()` / `load()` / `save()` / `destroy()`
//! - `SharedContainer` - per-handle lock for use from several threads
//!
//! ## Metadata (`meta` module)
//! - `Container::get_meta()` / `set_meta()` driven by a `MetaMask`
//!
//! ## Registry (`registry` module)
//! - `add_plugin()`, `add_parameter()`, `element_id()`, `remove_element()`
//!
//! ## Values (`value` module)
//! - `set_value()` / `get_value()` for ints, floats, strings, arrays and lists
//!
//! ## Iteration (`cursor` module)
//! - `Container::plugins()` / `parameters()` returning a `Cursor`
//!
//! ## Operations (`operations` module)
//! - `snapshot()`, `export_snapshot()`, `copy_plugin()`

pub mod abi;
pub mod config;
pub mod container;
pub mod cursor;
pub mod error;
pub mod ffi;
pub mod library;
pub mod meta;
pub mod operations;
pub mod plugin;
pub mod registry;
pub mod status;
pub mod value;

#[cfg(test)]
mod native_stub;

pub use config::BridgeConfig;
pub use container::{Container, SharedContainer};
pub use cursor::{Cursor, CursorState, Entries, Entry};
pub use error::{HandleId, Result, VrmatError};
pub use library::{platform_lib_name, VrmatLibrary};
pub use meta::{Meta, MetaMask};
pub use operations::{ContainerSnapshot, ParamSnapshot, PluginSnapshot};
pub use plugin::{ElementId, ParamId, PluginId};
pub use status::{FailureKind, NativeCall, Threshold};
pub use value::{RawKind, Sequence, Shape, TypeTag, Value, ValueData, ValueRecord, ValueView};
