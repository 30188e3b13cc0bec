//! C ABI of the native vrmat library.
//!
//! Mirrors the exported `DataContainer_*` entry points and the two records that
//! cross the boundary. The native header packs both records to 1-byte
//! alignment, so they are declared `#[repr(C, packed)]` here. All entry points
//! use the C (cdecl) calling convention.

use std::ffi::{c_char, c_int, c_uint, c_void};
use std::ptr;

/// Raw data type bits
pub mod rdt {
    pub const NONE: u32 = 0;
    pub const FLOAT: u32 = 1 << 0;
    pub const INT: u32 = 1 << 1;
    pub const STRING: u32 = 1 << 2;
}

/// Structured data type bits
pub mod stdt {
    pub const NONE: u32 = 0;
    pub const SINGLE: u32 = 1 << 3;
    pub const ARRAY3: u32 = 1 << 4;
    pub const ARRAY4: u32 = 1 << 5;
    pub const ARRAY9: u32 = 1 << 6;
    pub const ARRAY12: u32 = 1 << 7;
}

/// Sequential data type bits
pub mod sqdt {
    pub const NONE: u32 = 0;
    pub const SINGLE: u32 = 1 << 8;
    pub const LIST: u32 = 1 << 9;
}

pub const RDT_MASK: u32 = rdt::FLOAT | rdt::INT | rdt::STRING;
pub const STDT_MASK: u32 =
    stdt::SINGLE | stdt::ARRAY3 | stdt::ARRAY4 | stdt::ARRAY9 | stdt::ARRAY12;
pub const SQDT_MASK: u32 = sqdt::SINGLE | sqdt::LIST;

/// Per-element metadata record (`VRMat::Meta`)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct RawMeta {
    pub mask: c_uint,
    pub version: c_int,
    pub category: *const c_char,
    pub preview: *const c_char,
    pub tag: *const c_char,
    pub file_name: *const c_char,
    pub plugin_name: *const c_char,
    pub plugin_type: *const c_char,
    pub plugin_class: *const c_char,
    pub plugin_version: c_int,
    pub param_name: *const c_char,
    pub param_type: *const c_char,
    pub param_custom: c_int,
    pub param_file_path: c_int,
}

impl Default for RawMeta {
    fn default() -> Self {
        Self {
            mask: 0,
            version: 0,
            category: ptr::null(),
            preview: ptr::null(),
            tag: ptr::null(),
            file_name: ptr::null(),
            plugin_name: ptr::null(),
            plugin_type: ptr::null(),
            plugin_class: ptr::null(),
            plugin_version: 0,
            param_name: ptr::null(),
            param_type: ptr::null(),
            param_custom: 0,
            param_file_path: 0,
        }
    }
}

/// Value descriptor handed to value callbacks (`VRMat::ValueData`).
/// Only valid for the duration of the callback that received it.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct RawValueData {
    pub plugin_id: c_uint,
    pub param_id: c_uint,
    pub list_count: c_uint,
    pub list_index: c_uint,
    pub is_list: c_uint,
    pub components: c_uint,
    pub rdt: c_uint,
    pub stdt: c_uint,
    pub sqdt: c_uint,
    pub data: *const c_void,
}

impl Default for RawValueData {
    fn default() -> Self {
        Self {
            plugin_id: 0,
            param_id: 0,
            list_count: 0,
            list_index: 0,
            is_list: 0,
            components: 0,
            rdt: rdt::NONE,
            stdt: stdt::NONE,
            sqdt: sqdt::NONE,
            data: ptr::null(),
        }
    }
}

/// Callback receiving a unique plugin name
pub type UniqueNameCallback = unsafe extern "C" fn(unique_name: *const c_char, user_data: *mut c_void);
/// Callback receiving a value descriptor
pub type ValueCallback = unsafe extern "C" fn(value: *const RawValueData, user_data: *mut c_void);

pub type CreateFn = unsafe extern "C" fn() -> *mut c_void;
pub type DestroyFn = unsafe extern "C" fn(dc: *const c_void);
pub type OpenFn = unsafe extern "C" fn(dc: *mut c_void, file_name: *const c_char) -> c_int;
pub type LoadFn = unsafe extern "C" fn(dc: *mut c_void, buffer: *const c_char, length: c_int) -> c_int;
pub type SaveFn = unsafe extern "C" fn(dc: *const c_void, file_name: *const c_char, version: c_int) -> c_int;
pub type GetMetaFn = unsafe extern "C" fn(dc: *const c_void, element: c_uint, meta: *mut RawMeta) -> c_int;
pub type SetMetaFn = unsafe extern "C" fn(dc: *mut c_void, element: c_uint, meta: *const RawMeta) -> c_int;
pub type GetUniqueNameFn = unsafe extern "C" fn(
    dc: *const c_void,
    plugin_name: *const c_char,
    result_handler: UniqueNameCallback,
    user_data: *mut c_void,
);
pub type AddPluginFn = unsafe extern "C" fn(
    dc: *mut c_void,
    name: *const c_char,
    plugin_type: *const c_char,
    klass: *const c_char,
) -> c_uint;
pub type AddParameterFn = unsafe extern "C" fn(
    dc: *mut c_void,
    plugin_id: c_uint,
    name: *const c_char,
    param_type: *const c_char,
    custom: c_int,
) -> c_uint;
pub type GetElementIdFn =
    unsafe extern "C" fn(dc: *const c_void, plugin_id: c_uint, name: *const c_char) -> c_uint;
pub type RemoveElementFn = unsafe extern "C" fn(dc: *mut c_void, element_id: c_uint) -> c_int;
pub type SetValueFn = unsafe extern "C" fn(
    dc: *mut c_void,
    param_id: c_uint,
    data: *const c_void,
    type_tag: c_uint,
    list_length: c_int,
) -> c_int;
pub type GetValueFn = unsafe extern "C" fn(
    dc: *const c_void,
    param_id: c_uint,
    callback: ValueCallback,
    user_data: *mut c_void,
) -> c_int;
pub type IteratorCreateFn = unsafe extern "C" fn(
    dc: *const c_void,
    plugin_id: c_uint,
    plugin_iterator: *const c_void,
    callback: ValueCallback,
    user_data: *mut c_void,
) -> *mut c_void;
pub type IteratorDestroyFn = unsafe extern "C" fn(it: *const c_void);
pub type IteratorIncrementFn =
    unsafe extern "C" fn(it: *mut c_void, callback: ValueCallback, user_data: *mut c_void) -> c_int;

/// The full set of entry points the bridge consumes
#[derive(Clone, Copy)]
pub struct NativeTable {
    pub create: CreateFn,
    pub destroy: DestroyFn,
    pub open: OpenFn,
    pub load: LoadFn,
    pub save: SaveFn,
    pub get_meta: GetMetaFn,
    pub set_meta: SetMetaFn,
    pub get_unique_name: GetUniqueNameFn,
    pub add_plugin: AddPluginFn,
    pub add_parameter: AddParameterFn,
    pub get_element_id: GetElementIdFn,
    pub remove_element: RemoveElementFn,
    pub set_value: SetValueFn,
    pub get_value: GetValueFn,
    pub iterator_create: IteratorCreateFn,
    pub iterator_destroy: IteratorDestroyFn,
    pub iterator_increment: IteratorIncrementFn,
}

/// Exported symbol names, NUL-terminated for `libloading`
pub mod symbols {
    pub const CREATE: &[u8] = b"DataContainer_Create\0";
    pub const DESTROY: &[u8] = b"DataContainer_Destroy\0";
    pub const OPEN: &[u8] = b"DataContainer_Open\0";
    pub const LOAD: &[u8] = b"DataContainer_Load\0";
    pub const SAVE: &[u8] = b"DataContainer_Save\0";
    pub const GET_META: &[u8] = b"DataContainer_GetMeta\0";
    pub const SET_META: &[u8] = b"DataContainer_SetMeta\0";
    pub const GET_UNIQUE_NAME: &[u8] = b"DataContainer_GetUniqueName\0";
    pub const ADD_PLUGIN: &[u8] = b"DataContainer_AddPlugin\0";
    pub const ADD_PARAMETER: &[u8] = b"DataContainer_AddParameter\0";
    pub const GET_ELEMENT_ID: &[u8] = b"DataContainer_GetElementId\0";
    pub const REMOVE_ELEMENT: &[u8] = b"DataContainer_RemoveElement\0";
    pub const SET_VALUE: &[u8] = b"DataContainer_SetValue\0";
    pub const GET_VALUE: &[u8] = b"DataContainer_GetValue\0";
    pub const ITERATOR_CREATE: &[u8] = b"DataContainer_Iterator_Create\0";
    pub const ITERATOR_DESTROY: &[u8] = b"DataContainer_Iterator_Destroy\0";
    pub const ITERATOR_INCREMENT: &[u8] = b"DataContainer_Iterator_Increment\0";
}
