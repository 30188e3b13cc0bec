//! Error types for the vrmat bridge

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, VrmatError>;

/// Identity of a native container handle, used to tag errors and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(pub usize);

impl HandleId {
    /// The identity reported once a handle has been released
    pub const RELEASED: Self = Self(0);
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            write!(f, "<released>")
        } else {
            write!(f, "{:#x}", self.0)
        }
    }
}

/// Errors raised while talking to the native vrmat library
#[derive(Debug, Error)]
pub enum VrmatError {
    /// Open, load or save rejected by the native layer
    #[error("{op} failed on container {handle}: {detail}")]
    Io {
        op: &'static str,
        handle: HandleId,
        detail: String,
    },

    /// Registry or value operation rejected (bad arguments or native rejection)
    #[error("{op} rejected on container {handle}: {detail}")]
    Validation {
        op: &'static str,
        handle: HandleId,
        detail: String,
    },

    /// Element id resolution returned zero
    #[error("{op} on container {handle}: {detail} not found")]
    NotFound {
        op: &'static str,
        handle: HandleId,
        detail: String,
    },

    /// The native side broke its documented contract
    #[error("{op} on container {handle} violated the native ABI: {detail}")]
    Abi {
        op: &'static str,
        handle: HandleId,
        detail: String,
    },

    /// Failed to load the native shared library
    #[error("Failed to load library '{path}': {message}")]
    LibraryLoad { path: PathBuf, message: String },

    /// The native library is missing a required entry point
    #[error("Symbol '{symbol}' not found in library '{library}'")]
    SymbolNotFound { library: String, symbol: String },

    /// An outgoing string cannot be expressed as a C string
    #[error("{what} cannot be passed as a C string (interior NUL or non-UTF-8)")]
    InvalidString { what: &'static str },

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

impl VrmatError {
    pub fn io(op: &'static str, handle: HandleId, detail: impl Into<String>) -> Self {
        VrmatError::Io {
            op,
            handle,
            detail: detail.into(),
        }
    }

    pub fn validation(op: &'static str, handle: HandleId, detail: impl Into<String>) -> Self {
        VrmatError::Validation {
            op,
            handle,
            detail: detail.into(),
        }
    }

    pub fn not_found(op: &'static str, handle: HandleId, detail: impl Into<String>) -> Self {
        VrmatError::NotFound {
            op,
            handle,
            detail: detail.into(),
        }
    }

    pub fn abi(op: &'static str, handle: HandleId, detail: impl Into<String>) -> Self {
        VrmatError::Abi {
            op,
            handle,
            detail: detail.into(),
        }
    }

    pub fn library_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        VrmatError::LibraryLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn symbol_not_found(library: impl Into<String>, symbol: impl Into<String>) -> Self {
        VrmatError::SymbolNotFound {
            library: library.into(),
            symbol: symbol.into(),
        }
    }

    /// True for the zero-id lookup miss callers are expected to branch on
    pub fn is_not_found(&self) -> bool {
        matches!(self, VrmatError::NotFound { .. })
    }
}
