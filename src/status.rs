//! Status-code policy for native calls.
//!
//! Each status-returning entry point documents its own success rule, and the
//! rule is looked up per call here. Never test a status with `!= 0`.

use crate::error::{HandleId, Result, VrmatError};

/// Success rule of a native entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    /// Success iff status >= 1
    AtLeastOne,
    /// Success iff status > 0
    Positive,
}

impl Threshold {
    pub fn accepts(self, status: i64) -> bool {
        match self {
            Threshold::AtLeastOne => status >= 1,
            Threshold::Positive => status > 0,
        }
    }
}

/// Which error a rejected call raises
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Io,
    Validation,
    NotFound,
}

/// Every native entry point that reports a status or an id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeCall {
    Open,
    Load,
    Save,
    GetMeta,
    SetMeta,
    AddPlugin,
    AddParameter,
    GetElementId,
    RemoveElement,
    SetValue,
    GetValue,
    IteratorIncrement,
}

impl NativeCall {
    /// Operation name used in errors and logs
    pub const fn name(self) -> &'static str {
        match self {
            NativeCall::Open => "open",
            NativeCall::Load => "load",
            NativeCall::Save => "save",
            NativeCall::GetMeta => "get_meta",
            NativeCall::SetMeta => "set_meta",
            NativeCall::AddPlugin => "add_plugin",
            NativeCall::AddParameter => "add_parameter",
            NativeCall::GetElementId => "element_id",
            NativeCall::RemoveElement => "remove_element",
            NativeCall::SetValue => "set_value",
            NativeCall::GetValue => "get_value",
            NativeCall::IteratorIncrement => "cursor_advance",
        }
    }

    pub const fn threshold(self) -> Threshold {
        match self {
            NativeCall::Open | NativeCall::Load => Threshold::Positive,
            NativeCall::Save
            | NativeCall::GetMeta
            | NativeCall::SetMeta
            | NativeCall::AddPlugin
            | NativeCall::AddParameter
            | NativeCall::GetElementId
            | NativeCall::RemoveElement
            | NativeCall::SetValue
            | NativeCall::GetValue
            | NativeCall::IteratorIncrement => Threshold::AtLeastOne,
        }
    }

    pub const fn failure(self) -> FailureKind {
        match self {
            NativeCall::Open | NativeCall::Load | NativeCall::Save => FailureKind::Io,
            // `Cursor::advance` reads a rejected increment as the end instead
            NativeCall::GetElementId | NativeCall::IteratorIncrement => FailureKind::NotFound,
            NativeCall::GetMeta
            | NativeCall::SetMeta
            | NativeCall::AddPlugin
            | NativeCall::AddParameter
            | NativeCall::RemoveElement
            | NativeCall::SetValue
            | NativeCall::GetValue => FailureKind::Validation,
        }
    }

    pub fn succeeded(self, status: i64) -> bool {
        self.threshold().accepts(status)
    }

    /// Check a status and raise this call's error kind when it is rejected.
    ///
    /// `detail` is only evaluated on failure.
    pub fn check(self, status: i64, handle: HandleId, detail: impl FnOnce() -> String) -> Result<()> {
        if self.succeeded(status) {
            log::debug!("{} on {} returned {}", self.name(), handle, status);
            return Ok(());
        }

        let detail = format!("{} (status {})", detail(), status);
        log::warn!("{} on {} rejected: {}", self.name(), handle, detail);
        Err(match self.failure() {
            FailureKind::Io => VrmatError::io(self.name(), handle, detail),
            FailureKind::Validation => VrmatError::validation(self.name(), handle, detail),
            FailureKind::NotFound => VrmatError::not_found(self.name(), handle, detail),
        })
    }
}
