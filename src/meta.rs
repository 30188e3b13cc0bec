//! Element metadata (`GetMeta` / `SetMeta`).
//!
//! Strings in a native meta record belong to the native side and may be reused
//! as soon as the call returns, so they are copied into owned `String`s before
//! anything else happens.

use crate::abi::RawMeta;
use crate::container::{to_cstring, Container};
use crate::error::Result;
use crate::plugin::ElementId;
use crate::status::NativeCall;
use serde::{Deserialize, Serialize};
use std::ffi::{c_char, CStr, CString};
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::ptr;

/// Selects which meta fields a get or set call considers.
///
/// Bit values come from the native library's header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaMask(u32);

impl MetaMask {
    pub const NONE: Self = Self(0);

    pub const ROOT_VERSION: Self = Self(1 << 0);
    pub const ROOT_CATEGORY: Self = Self(1 << 1);
    pub const ROOT_PREVIEW: Self = Self(1 << 2);
    pub const ROOT_TAG: Self = Self(1 << 3);
    pub const ROOT_FILE_NAME: Self = Self(1 << 4);

    pub const PLUGIN_NAME: Self = Self(1 << 5);
    pub const PLUGIN_TYPE: Self = Self(1 << 6);
    pub const PLUGIN_CLASS: Self = Self(1 << 7);
    pub const PLUGIN_VERSION: Self = Self(1 << 8);

    pub const PARAM_NAME: Self = Self(1 << 9);
    pub const PARAM_TYPE: Self = Self(1 << 10);
    pub const PARAM_CUSTOM: Self = Self(1 << 11);
    pub const PARAM_FILE_PATH: Self = Self(1 << 12);

    pub const ROOT: Self = Self(0x1f);
    pub const PLUGIN: Self = Self(0x1e0);
    pub const PARAM: Self = Self(0x1e00);
    pub const ALL: Self = Self(0x1fff);

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Keeps only documented bits
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for MetaMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MetaMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for MetaMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// Metadata of the document root, a plugin or a parameter.
///
/// Only the fields selected by `mask` are meaningful.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub mask: MetaMask,
    /// XML layout version of the document
    pub version: i32,
    pub category: Option<String>,
    /// Base64 preview image
    pub preview: Option<String>,
    /// Root XML tag, e.g. `vrmat` or `vropt`
    pub tag: Option<String>,
    pub file_name: Option<String>,
    pub plugin_name: Option<String>,
    pub plugin_type: Option<String>,
    pub plugin_class: Option<String>,
    pub plugin_version: i32,
    pub param_name: Option<String>,
    pub param_type: Option<String>,
    /// Custom-parameter flag, kept as the integer the native side stores
    pub param_custom: i32,
    pub param_file_path: bool,
}

impl Meta {
    /// An empty record requesting `mask`
    pub fn request(mask: MetaMask) -> Self {
        Self {
            mask,
            ..Self::default()
        }
    }

    /// Compare only the fields selected by `mask`
    pub fn masked_eq(&self, other: &Meta, mask: MetaMask) -> bool {
        let checks: [(MetaMask, bool); 13] = [
            (MetaMask::ROOT_VERSION, self.version == other.version),
            (MetaMask::ROOT_CATEGORY, self.category == other.category),
            (MetaMask::ROOT_PREVIEW, self.preview == other.preview),
            (MetaMask::ROOT_TAG, self.tag == other.tag),
            (MetaMask::ROOT_FILE_NAME, self.file_name == other.file_name),
            (MetaMask::PLUGIN_NAME, self.plugin_name == other.plugin_name),
            (MetaMask::PLUGIN_TYPE, self.plugin_type == other.plugin_type),
            (MetaMask::PLUGIN_CLASS, self.plugin_class == other.plugin_class),
            (MetaMask::PLUGIN_VERSION, self.plugin_version == other.plugin_version),
            (MetaMask::PARAM_NAME, self.param_name == other.param_name),
            (MetaMask::PARAM_TYPE, self.param_type == other.param_type),
            (MetaMask::PARAM_CUSTOM, self.param_custom == other.param_custom),
            (MetaMask::PARAM_FILE_PATH, self.param_file_path == other.param_file_path),
        ];
        checks
            .iter()
            .all(|(bit, equal)| !mask.contains(*bit) || *equal)
    }

    /// Build the packed record. The returned `CString`s back its pointers and
    /// must outlive the native call.
    fn to_raw(&self) -> Result<(RawMeta, Vec<CString>)> {
        let mut owned = Vec::new();
        let mut field = |value: &Option<String>, what: &'static str| -> Result<*const c_char> {
            match value {
                Some(s) => {
                    let c = to_cstring(s, what)?;
                    let p = c.as_ptr();
                    owned.push(c);
                    Ok(p)
                }
                None => Ok(ptr::null()),
            }
        };

        let raw = RawMeta {
            mask: self.mask.bits(),
            version: self.version,
            category: field(&self.category, "category")?,
            preview: field(&self.preview, "preview")?,
            tag: field(&self.tag, "tag")?,
            file_name: field(&self.file_name, "file name")?,
            plugin_name: field(&self.plugin_name, "plugin name")?,
            plugin_type: field(&self.plugin_type, "plugin type")?,
            plugin_class: field(&self.plugin_class, "plugin class")?,
            plugin_version: self.plugin_version,
            param_name: field(&self.param_name, "parameter name")?,
            param_type: field(&self.param_type, "parameter type")?,
            param_custom: self.param_custom,
            param_file_path: self.param_file_path as i32,
        };
        Ok((raw, owned))
    }

    /// Copy a native record into owned memory.
    ///
    /// # Safety
    /// Every non-null string pointer in `raw` must point to a NUL-terminated
    /// string that is valid for the duration of this call.
    unsafe fn from_raw(raw: &RawMeta) -> Self {
        Self {
            mask: MetaMask::from_bits_truncate(raw.mask),
            version: raw.version,
            category: copy_str(raw.category),
            preview: copy_str(raw.preview),
            tag: copy_str(raw.tag),
            file_name: copy_str(raw.file_name),
            plugin_name: copy_str(raw.plugin_name),
            plugin_type: copy_str(raw.plugin_type),
            plugin_class: copy_str(raw.plugin_class),
            plugin_version: raw.plugin_version,
            param_name: copy_str(raw.param_name),
            param_type: copy_str(raw.param_type),
            param_custom: raw.param_custom,
            param_file_path: raw.param_file_path != 0,
        }
    }
}

unsafe fn copy_str(p: *const c_char) -> Option<String> {
    if p.is_null() {
        None
    } else {
        Some(CStr::from_ptr(p).to_string_lossy().into_owned())
    }
}

impl Container {
    /// Read the metadata of `element`.
    ///
    /// `request.mask` tells the native side which fields are wanted; the
    /// returned record is what the native side filled in.
    pub fn get_meta(&self, element: ElementId, request: &Meta) -> Result<Meta> {
        let call = NativeCall::GetMeta;
        let handle = self.live(call.name())?;
        let (mut raw, _owned) = request.to_raw()?;

        let status = unsafe { (self.table().get_meta)(handle.as_ptr(), element.get(), &mut raw) };
        call.check(status.into(), self.id(), || format!("no meta for {}", element))?;

        Ok(unsafe { Meta::from_raw(&raw) })
    }

    /// Read the fields selected by `mask`
    pub fn meta(&self, element: ElementId, mask: MetaMask) -> Result<Meta> {
        self.get_meta(element, &Meta::request(mask))
    }

    /// Read all document-level fields
    pub fn root_meta(&self) -> Result<Meta> {
        self.meta(ElementId::ROOT, MetaMask::ROOT)
    }

    /// Write the fields of `meta` selected by its mask, and return the record
    /// as the native side now stores it.
    pub fn set_meta(&mut self, element: ElementId, meta: &Meta) -> Result<Meta> {
        let call = NativeCall::SetMeta;
        let handle = self.live(call.name())?;
        let (raw, _owned) = meta.to_raw()?;

        let status = unsafe { (self.table().set_meta)(handle.as_ptr(), element.get(), &raw) };
        call.check(status.into(), self.id(), || {
            format!("meta (mask {:#x}) not accepted for {}", meta.mask.bits(), element)
        })?;

        self.meta(element, meta.mask)
    }
}
