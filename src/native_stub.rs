//! In-process stand-in for the native vrmat library, used by the tests.
//!
//! Implements the `DataContainer_*` ABI with real `extern "C"` functions over
//! the packed records, including callbacks, a meta string buffer that is reused
//! between calls, and JSON persistence in place of the XML format. Live handle
//! and cursor counts are tracked per thread so tests can assert nothing leaks.

use crate::abi::{rdt, sqdt, stdt, NativeTable, RawMeta, RawValueData, UniqueNameCallback, ValueCallback};
use crate::library::VrmatLibrary;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::ffi::{c_char, c_int, c_uint, c_void, CStr, CString};
use std::ptr;
use std::sync::Arc;

const ROOT_BITS: u32 = 0x1f;
const PLUGIN_BITS: u32 = 0x1e0;
const PARAM_BITS: u32 = 0x1e00;

thread_local! {
    static LIVE_CONTAINERS: Cell<isize> = const { Cell::new(0) };
    static LIVE_CURSORS: Cell<isize> = const { Cell::new(0) };
    static DESTROY_CALLS: Cell<usize> = const { Cell::new(0) };
    static GARBLED: Cell<Option<RawValueData>> = const { Cell::new(None) };
}

/// Backing storage for garbled descriptors, wide enough for any shape
static GARBLED_FLOATS: [f32; 12] = [0.5; 12];

/// Containers created and not yet destroyed on this thread
pub fn live_containers() -> isize {
    LIVE_CONTAINERS.with(Cell::get)
}

/// Cursors created and not yet destroyed on this thread
pub fn live_cursors() -> isize {
    LIVE_CURSORS.with(Cell::get)
}

/// Number of `DataContainer_Destroy` calls made on this thread
pub fn destroy_calls() -> usize {
    DESTROY_CALLS.with(Cell::get)
}

pub fn table() -> NativeTable {
    NativeTable {
        create: stub_create,
        destroy: stub_destroy,
        open: stub_open,
        load: stub_load,
        save: stub_save,
        get_meta: stub_get_meta,
        set_meta: stub_set_meta,
        get_unique_name: stub_get_unique_name,
        add_plugin: stub_add_plugin,
        add_parameter: stub_add_parameter,
        get_element_id: stub_get_element_id,
        remove_element: stub_remove_element,
        set_value: stub_set_value,
        get_value: stub_get_value,
        iterator_create: stub_iterator_create,
        iterator_destroy: stub_iterator_destroy,
        iterator_increment: stub_iterator_increment,
    }
}

pub fn library() -> Arc<VrmatLibrary> {
    Arc::new(VrmatLibrary::from_table("native-stub", table()))
}

/// A table whose `Create` always fails
pub fn failing_create_library() -> Arc<VrmatLibrary> {
    unsafe extern "C" fn null_create() -> *mut c_void {
        ptr::null_mut()
    }
    let mut table = table();
    table.create = null_create;
    Arc::new(VrmatLibrary::from_table("native-stub-null", table))
}

/// A table whose `GetValue` reports success without calling back
pub fn silent_get_value_library() -> Arc<VrmatLibrary> {
    unsafe extern "C" fn silent(_: *const c_void, _: c_uint, _: ValueCallback, _: *mut c_void) -> c_int {
        1
    }
    let mut table = table();
    table.get_value = silent;
    Arc::new(VrmatLibrary::from_table("native-stub-silent", table))
}

/// A table whose `GetValue` and `Iterator_Create` deliver `record` in place
/// of the stored descriptor. Ids are taken from the real element and `data`
/// points at a static float array. Applies to the calling thread.
pub fn garbled_value_library(record: RawValueData) -> Arc<VrmatLibrary> {
    unsafe extern "C" fn garbled_get_value(
        dc: *const c_void,
        param_id: c_uint,
        callback: ValueCallback,
        user_data: *mut c_void,
    ) -> c_int {
        let Some(plugin_id) = container(dc).and_then(|dc| dc.doc.params.get(&param_id)).map(|p| p.plugin) else {
            return 0;
        };
        deliver_garbled(plugin_id, param_id, callback, user_data);
        1
    }

    unsafe extern "C" fn garbled_iterator_create(
        dc: *const c_void,
        plugin_id: c_uint,
        plugin_iterator: *const c_void,
        callback: ValueCallback,
        user_data: *mut c_void,
    ) -> *mut c_void {
        unsafe extern "C" fn ignore(_: *const RawValueData, _: *mut c_void) {}

        let it = stub_iterator_create(dc, plugin_id, plugin_iterator, ignore, ptr::null_mut());
        if let Some(cursor) = (it as *const StubCursor).as_ref() {
            let id = cursor.ids[cursor.pos];
            match cursor.plugin_scope {
                Some(plugin) => deliver_garbled(plugin, id, callback, user_data),
                None => deliver_garbled(id, 0, callback, user_data),
            }
        }
        it
    }

    GARBLED.with(|g| g.set(Some(record)));
    let mut table = table();
    table.get_value = garbled_get_value;
    table.iterator_create = garbled_iterator_create;
    Arc::new(VrmatLibrary::from_table("native-stub-garbled", table))
}

unsafe fn deliver_garbled(plugin_id: u32, param_id: u32, callback: ValueCallback, user_data: *mut c_void) {
    let Some(base) = GARBLED.with(Cell::get) else {
        return;
    };
    let record = RawValueData {
        plugin_id,
        param_id,
        data: GARBLED_FLOATS.as_ptr() as *const c_void,
        ..base
    };
    callback(&record, user_data);
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Root {
    version: i32,
    category: String,
    preview: String,
    tag: String,
    #[serde(skip)]
    file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StubPlugin {
    name: String,
    plugin_type: String,
    class: String,
    version: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StubValue {
    tag: u32,
    count: u32,
    ints: Vec<i32>,
    floats: Vec<f32>,
    strings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StubParam {
    plugin: u32,
    name: String,
    param_type: String,
    custom: i32,
    file_path: i32,
    value: Option<StubValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Document {
    root: Root,
    plugins: BTreeMap<u32, StubPlugin>,
    params: BTreeMap<u32, StubParam>,
    next_id: u32,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            root: Root {
                tag: "vrmat".into(),
                ..Root::default()
            },
            plugins: BTreeMap::new(),
            params: BTreeMap::new(),
            // 1 is the root element
            next_id: 2,
        }
    }
}

#[derive(Default)]
struct StubContainer {
    doc: Document,
    /// Strings handed out by the last GetMeta call
    meta_buffer: Vec<CString>,
    /// Item strings handed out by the last value callback
    value_buffer: Vec<CString>,
}

enum Target {
    Root,
    Plugin(u32),
    Param(u32),
}

impl StubContainer {
    fn target(&self, element: u32) -> Option<Target> {
        if element == 0 || element == 1 {
            Some(Target::Root)
        } else if self.doc.plugins.contains_key(&element) {
            Some(Target::Plugin(element))
        } else if self.doc.params.contains_key(&element) {
            Some(Target::Param(element))
        } else {
            None
        }
    }

    fn emit(&mut self, s: &str) -> *const c_char {
        let c = CString::new(s).unwrap_or_default();
        let p = c.as_ptr();
        self.meta_buffer.push(c);
        p
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.doc.next_id;
        self.doc.next_id += 1;
        id
    }

    /// Value records for one parameter; string values yield one record per item
    fn records(&mut self, param_id: u32) -> Vec<RawValueData> {
        let Some(param) = self.doc.params.get(&param_id) else {
            return Vec::new();
        };
        let plugin_id = param.plugin;
        let Some(value) = param.value.clone() else {
            return vec![RawValueData {
                plugin_id,
                param_id,
                ..RawValueData::default()
            }];
        };

        let list = value.tag & sqdt::LIST != 0;
        let base = RawValueData {
            plugin_id,
            param_id,
            list_count: if list { value.count } else { 0 },
            list_index: 0,
            is_list: list as u32,
            components: components(value.tag & crate::abi::STDT_MASK),
            rdt: value.tag & crate::abi::RDT_MASK,
            stdt: value.tag & crate::abi::STDT_MASK,
            sqdt: value.tag & crate::abi::SQDT_MASK,
            data: ptr::null(),
        };

        let kind = base.rdt;
        if kind == rdt::STRING {
            if value.strings.is_empty() {
                return vec![base];
            }
            self.value_buffer = value
                .strings
                .iter()
                .map(|s| CString::new(s.as_str()).unwrap_or_default())
                .collect();
            return self
                .value_buffer
                .iter()
                .enumerate()
                .map(|(i, s)| RawValueData {
                    list_index: i as u32,
                    data: s.as_ptr() as *const c_void,
                    ..base
                })
                .collect();
        }

        // Point into the stored vectors, which outlive the callback
        let stored = self.doc.params.get(&param_id).and_then(|p| p.value.as_ref());
        let data = match stored {
            Some(v) if kind == rdt::FLOAT => v.floats.as_ptr() as *const c_void,
            Some(v) => v.ints.as_ptr() as *const c_void,
            None => ptr::null(),
        };
        vec![RawValueData { data, ..base }]
    }
}

fn components(stdt_bits: u32) -> u32 {
    match stdt_bits {
        stdt::ARRAY3 => 3,
        stdt::ARRAY4 => 4,
        stdt::ARRAY9 => 9,
        stdt::ARRAY12 => 12,
        _ => 1,
    }
}

unsafe fn container<'a>(dc: *const c_void) -> Option<&'a mut StubContainer> {
    (dc as *mut StubContainer).as_mut()
}

unsafe fn text(p: *const c_char) -> Option<String> {
    if p.is_null() {
        None
    } else {
        Some(CStr::from_ptr(p).to_string_lossy().into_owned())
    }
}

unsafe extern "C" fn stub_create() -> *mut c_void {
    LIVE_CONTAINERS.with(|c| c.set(c.get() + 1));
    Box::into_raw(Box::<StubContainer>::default()) as *mut c_void
}

unsafe extern "C" fn stub_destroy(dc: *const c_void) {
    if dc.is_null() {
        return;
    }
    LIVE_CONTAINERS.with(|c| c.set(c.get() - 1));
    DESTROY_CALLS.with(|c| c.set(c.get() + 1));
    drop(Box::from_raw(dc as *mut StubContainer));
}

unsafe extern "C" fn stub_open(dc: *mut c_void, file_name: *const c_char) -> c_int {
    let (Some(dc), Some(path)) = (container(dc), text(file_name)) else {
        return 0;
    };
    let Ok(content) = std::fs::read_to_string(&path) else {
        return 0;
    };
    match serde_json::from_str::<Document>(&content) {
        Ok(mut doc) => {
            doc.root.file_name = path;
            dc.doc = doc;
            1
        }
        Err(_) => 0,
    }
}

unsafe extern "C" fn stub_load(dc: *mut c_void, buffer: *const c_char, length: c_int) -> c_int {
    let Some(dc) = container(dc) else {
        return 0;
    };
    if buffer.is_null() || length < 0 {
        return 0;
    }
    let bytes = if length == 0 {
        CStr::from_ptr(buffer).to_bytes()
    } else {
        std::slice::from_raw_parts(buffer as *const u8, length as usize)
    };
    match serde_json::from_slice::<Document>(bytes) {
        Ok(doc) => {
            dc.doc = doc;
            1
        }
        Err(_) => 0,
    }
}

unsafe extern "C" fn stub_save(dc: *const c_void, file_name: *const c_char, _version: c_int) -> c_int {
    let (Some(dc), Some(path)) = (container(dc), text(file_name)) else {
        return 0;
    };
    let Ok(content) = serde_json::to_string(&dc.doc) else {
        return 0;
    };
    std::fs::write(path, content).is_ok() as c_int
}

unsafe extern "C" fn stub_get_meta(dc: *const c_void, element: c_uint, meta: *mut RawMeta) -> c_int {
    let Some(dc) = container(dc) else {
        return 0;
    };
    let Some(meta) = meta.as_mut() else {
        return 0;
    };
    let Some(target) = dc.target(element) else {
        return 0;
    };
    dc.meta_buffer.clear();

    let requested = meta.mask;
    let mut out = RawMeta::default();
    match target {
        Target::Root => {
            let root = dc.doc.root.clone();
            out.mask = if requested == 0 { ROOT_BITS } else { requested & ROOT_BITS };
            out.version = root.version;
            out.category = dc.emit(&root.category);
            out.preview = dc.emit(&root.preview);
            out.tag = dc.emit(&root.tag);
            out.file_name = dc.emit(&root.file_name);
        }
        Target::Plugin(id) => {
            let plugin = dc.doc.plugins[&id].clone();
            out.mask = if requested == 0 { PLUGIN_BITS } else { requested & PLUGIN_BITS };
            out.plugin_name = dc.emit(&plugin.name);
            out.plugin_type = dc.emit(&plugin.plugin_type);
            out.plugin_class = dc.emit(&plugin.class);
            out.plugin_version = plugin.version;
        }
        Target::Param(id) => {
            let param = dc.doc.params[&id].clone();
            out.mask = if requested == 0 { PARAM_BITS } else { requested & PARAM_BITS };
            out.param_name = dc.emit(&param.name);
            out.param_type = dc.emit(&param.param_type);
            out.param_custom = param.custom;
            out.param_file_path = param.file_path;
        }
    }
    *meta = out;
    1
}

unsafe extern "C" fn stub_set_meta(dc: *mut c_void, element: c_uint, meta: *const RawMeta) -> c_int {
    let Some(dc) = container(dc) else {
        return 0;
    };
    let Some(meta) = meta.as_ref() else {
        return 0;
    };
    let Some(target) = dc.target(element) else {
        return 0;
    };
    let mask = meta.mask;
    let set = |bit: u32| mask & (1 << bit) != 0;

    match target {
        Target::Root => {
            let root = &mut dc.doc.root;
            if set(0) {
                root.version = meta.version;
            }
            if set(1) {
                root.category = text(meta.category).unwrap_or_default();
            }
            if set(2) {
                root.preview = text(meta.preview).unwrap_or_default();
            }
            if set(3) {
                root.tag = text(meta.tag).unwrap_or_default();
            }
            if set(4) {
                root.file_name = text(meta.file_name).unwrap_or_default();
            }
        }
        Target::Plugin(id) => {
            let Some(plugin) = dc.doc.plugins.get_mut(&id) else {
                return 0;
            };
            if set(5) {
                plugin.name = text(meta.plugin_name).unwrap_or_default();
            }
            if set(6) {
                plugin.plugin_type = text(meta.plugin_type).unwrap_or_default();
            }
            if set(7) {
                plugin.class = text(meta.plugin_class).unwrap_or_default();
            }
            if set(8) {
                plugin.version = meta.plugin_version;
            }
        }
        Target::Param(id) => {
            let Some(param) = dc.doc.params.get_mut(&id) else {
                return 0;
            };
            if set(9) {
                param.name = text(meta.param_name).unwrap_or_default();
            }
            if set(10) {
                param.param_type = text(meta.param_type).unwrap_or_default();
            }
            if set(11) {
                param.custom = meta.param_custom;
            }
            if set(12) {
                param.file_path = meta.param_file_path;
            }
        }
    }
    1
}

unsafe extern "C" fn stub_get_unique_name(
    dc: *const c_void,
    plugin_name: *const c_char,
    result_handler: UniqueNameCallback,
    user_data: *mut c_void,
) {
    let (Some(dc), Some(name)) = (container(dc), text(plugin_name)) else {
        return;
    };
    let taken = |candidate: &str| dc.doc.plugins.values().any(|p| p.name == candidate);
    let mut candidate = name.clone();
    let mut suffix = 1;
    while taken(&candidate) {
        candidate = format!("{}_{}", name, suffix);
        suffix += 1;
    }
    let unique = CString::new(candidate).unwrap_or_default();
    result_handler(unique.as_ptr(), user_data);
}

unsafe extern "C" fn stub_add_plugin(
    dc: *mut c_void,
    name: *const c_char,
    plugin_type: *const c_char,
    klass: *const c_char,
) -> c_uint {
    let Some(dc) = container(dc) else {
        return 0;
    };
    let (Some(name), Some(plugin_type), Some(class)) = (text(name), text(plugin_type), text(klass)) else {
        return 0;
    };
    if name.is_empty() || dc.doc.plugins.values().any(|p| p.name == name) {
        return 0;
    }
    let id = dc.allocate_id();
    dc.doc.plugins.insert(
        id,
        StubPlugin {
            name,
            plugin_type,
            class,
            version: 0,
        },
    );
    id
}

unsafe extern "C" fn stub_add_parameter(
    dc: *mut c_void,
    plugin_id: c_uint,
    name: *const c_char,
    param_type: *const c_char,
    custom: c_int,
) -> c_uint {
    let Some(dc) = container(dc) else {
        return 0;
    };
    let (Some(name), Some(param_type)) = (text(name), text(param_type)) else {
        return 0;
    };
    if !dc.doc.plugins.contains_key(&plugin_id) {
        return 0;
    }
    if dc.doc.params.values().any(|p| p.plugin == plugin_id && p.name == name) {
        return 0;
    }
    let id = dc.allocate_id();
    dc.doc.params.insert(
        id,
        StubParam {
            plugin: plugin_id,
            name,
            param_type,
            custom,
            file_path: 0,
            value: None,
        },
    );
    id
}

unsafe extern "C" fn stub_get_element_id(dc: *const c_void, plugin_id: c_uint, name: *const c_char) -> c_uint {
    let (Some(dc), Some(name)) = (container(dc), text(name)) else {
        return 0;
    };
    let found = if plugin_id == 0 {
        dc.doc.plugins.iter().find(|(_, p)| p.name == name).map(|(id, _)| *id)
    } else {
        dc.doc
            .params
            .iter()
            .find(|(_, p)| p.plugin == plugin_id && p.name == name)
            .map(|(id, _)| *id)
    };
    found.unwrap_or(0)
}

unsafe extern "C" fn stub_remove_element(dc: *mut c_void, element_id: c_uint) -> c_int {
    let Some(dc) = container(dc) else {
        return 0;
    };
    if dc.doc.plugins.remove(&element_id).is_some() {
        dc.doc.params.retain(|_, p| p.plugin != element_id);
        return 1;
    }
    dc.doc.params.remove(&element_id).is_some() as c_int
}

fn single_bit(bits: u32) -> bool {
    bits != 0 && bits & (bits - 1) == 0
}

unsafe extern "C" fn stub_set_value(
    dc: *mut c_void,
    param_id: c_uint,
    data: *const c_void,
    type_tag: c_uint,
    list_length: c_int,
) -> c_int {
    let Some(dc) = container(dc) else {
        return 0;
    };
    let Some(param) = dc.doc.params.get_mut(&param_id) else {
        return 0;
    };
    let kind = type_tag & crate::abi::RDT_MASK;
    let shape = type_tag & crate::abi::STDT_MASK;
    let seq = type_tag & crate::abi::SQDT_MASK;
    let known = crate::abi::RDT_MASK | crate::abi::STDT_MASK | crate::abi::SQDT_MASK;
    if type_tag & !known != 0 || !single_bit(kind) || !single_bit(shape) || !single_bit(seq) {
        return 0;
    }
    if kind != rdt::FLOAT && shape != stdt::SINGLE {
        return 0;
    }
    if list_length < 0 {
        return 0;
    }
    let count = if seq == sqdt::LIST { list_length as usize } else { 1 };
    let width = components(shape) as usize;
    if data.is_null() && count > 0 {
        return 0;
    }

    let mut value = StubValue {
        tag: type_tag,
        count: count as u32,
        ints: Vec::new(),
        floats: Vec::new(),
        strings: Vec::new(),
    };
    if count > 0 {
        match kind {
            rdt::FLOAT => {
                value.floats = std::slice::from_raw_parts(data as *const f32, count * width).to_vec();
            }
            rdt::INT => {
                value.ints = std::slice::from_raw_parts(data as *const i32, count).to_vec();
            }
            _ => {
                for &item in std::slice::from_raw_parts(data as *const *const c_char, count) {
                    match text(item) {
                        Some(s) => value.strings.push(s),
                        None => return 0,
                    }
                }
            }
        }
    }
    param.value = Some(value);
    1
}

unsafe extern "C" fn stub_get_value(
    dc: *const c_void,
    param_id: c_uint,
    callback: ValueCallback,
    user_data: *mut c_void,
) -> c_int {
    let Some(dc) = container(dc) else {
        return 0;
    };
    let has_value = dc.doc.params.get(&param_id).is_some_and(|p| p.value.is_some());
    if !has_value {
        return 0;
    }
    for record in dc.records(param_id) {
        callback(&record, user_data);
    }
    // Buffer is reused: nothing handed out survives the call
    dc.value_buffer.clear();
    1
}

struct StubCursor {
    dc: *mut StubContainer,
    plugin_scope: Option<u32>,
    ids: Vec<u32>,
    pos: usize,
}

impl StubCursor {
    unsafe fn deliver(&self, callback: ValueCallback, user_data: *mut c_void) -> bool {
        let dc = &mut *self.dc;
        let id = self.ids[self.pos];
        match self.plugin_scope {
            None => {
                if !dc.doc.plugins.contains_key(&id) {
                    return false;
                }
                let record = RawValueData {
                    plugin_id: id,
                    ..RawValueData::default()
                };
                callback(&record, user_data);
            }
            Some(_) => {
                let records = dc.records(id);
                let Some(first) = records.first() else {
                    return false;
                };
                callback(first, user_data);
                dc.value_buffer.clear();
            }
        }
        true
    }
}

unsafe extern "C" fn stub_iterator_create(
    dc: *const c_void,
    plugin_id: c_uint,
    plugin_iterator: *const c_void,
    callback: ValueCallback,
    user_data: *mut c_void,
) -> *mut c_void {
    let Some(container_ref) = container(dc) else {
        return ptr::null_mut();
    };
    let mut scope = plugin_id;
    if scope == 0 {
        if let Some(parent) = (plugin_iterator as *const StubCursor).as_ref() {
            match parent.ids.get(parent.pos) {
                Some(id) if parent.plugin_scope.is_none() => scope = *id,
                _ => return ptr::null_mut(),
            }
        }
    }

    let (plugin_scope, ids): (Option<u32>, Vec<u32>) = if scope == 0 {
        (None, container_ref.doc.plugins.keys().copied().collect())
    } else {
        if !container_ref.doc.plugins.contains_key(&scope) {
            return ptr::null_mut();
        }
        let ids = container_ref
            .doc
            .params
            .iter()
            .filter(|(_, p)| p.plugin == scope)
            .map(|(id, _)| *id)
            .collect();
        (Some(scope), ids)
    };
    if ids.is_empty() {
        return ptr::null_mut();
    }

    let cursor = StubCursor {
        dc: dc as *mut StubContainer,
        plugin_scope,
        ids,
        pos: 0,
    };
    if !cursor.deliver(callback, user_data) {
        return ptr::null_mut();
    }
    LIVE_CURSORS.with(|c| c.set(c.get() + 1));
    Box::into_raw(Box::new(cursor)) as *mut c_void
}

unsafe extern "C" fn stub_iterator_destroy(it: *const c_void) {
    if it.is_null() {
        return;
    }
    LIVE_CURSORS.with(|c| c.set(c.get() - 1));
    drop(Box::from_raw(it as *mut StubCursor));
}

unsafe extern "C" fn stub_iterator_increment(it: *mut c_void, callback: ValueCallback, user_data: *mut c_void) -> c_int {
    let Some(cursor) = (it as *mut StubCursor).as_mut() else {
        return 0;
    };
    if cursor.pos + 1 >= cursor.ids.len() {
        cursor.pos = cursor.ids.len();
        return 0;
    }
    cursor.pos += 1;
    cursor.deliver(callback, user_data) as c_int
}
