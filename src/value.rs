//! Typed parameter values (`SetValue` / `GetValue`).
//!
//! A value is described by three tags: the raw kind (float, int or string),
//! the shape (a single component or a fixed float array) and the sequence
//! (one item or a list). Only combinations the native format can store are
//! representable here; anything else coming back from the native side is an
//! ABI error.
//!
//! Reading goes through a synchronous callback. The descriptor handed to the
//! callback is only valid while it runs, so everything is copied out before
//! control returns to the native library.

use crate::abi::{self, rdt, sqdt, stdt, RawValueData, ValueCallback};
use crate::container::{to_cstring, Container};
use crate::error::{HandleId, Result, VrmatError};
use crate::plugin::{ParamId, PluginId};
use crate::status::NativeCall;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::slice;

/// Fundamental data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawKind {
    Float,
    Int,
    String,
}

/// Structure of one item. Only floats can be arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Single,
    /// color or vector
    Array3,
    /// acolor
    Array4,
    /// 3x3 matrix, column vectors
    Array9,
    /// 3x4 transform
    Array12,
}

/// One item or a list of items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sequence {
    Single,
    List,
}

impl RawKind {
    pub const fn bits(self) -> u32 {
        match self {
            RawKind::Float => rdt::FLOAT,
            RawKind::Int => rdt::INT,
            RawKind::String => rdt::STRING,
        }
    }

    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            rdt::FLOAT => Some(RawKind::Float),
            rdt::INT => Some(RawKind::Int),
            rdt::STRING => Some(RawKind::String),
            _ => None,
        }
    }
}

impl Shape {
    pub const fn bits(self) -> u32 {
        match self {
            Shape::Single => stdt::SINGLE,
            Shape::Array3 => stdt::ARRAY3,
            Shape::Array4 => stdt::ARRAY4,
            Shape::Array9 => stdt::ARRAY9,
            Shape::Array12 => stdt::ARRAY12,
        }
    }

    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            stdt::SINGLE => Some(Shape::Single),
            stdt::ARRAY3 => Some(Shape::Array3),
            stdt::ARRAY4 => Some(Shape::Array4),
            stdt::ARRAY9 => Some(Shape::Array9),
            stdt::ARRAY12 => Some(Shape::Array12),
            _ => None,
        }
    }

    /// Scalars per item
    pub const fn components(self) -> usize {
        match self {
            Shape::Single => 1,
            Shape::Array3 => 3,
            Shape::Array4 => 4,
            Shape::Array9 => 9,
            Shape::Array12 => 12,
        }
    }
}

impl Sequence {
    pub const fn bits(self) -> u32 {
        match self {
            Sequence::Single => sqdt::SINGLE,
            Sequence::List => sqdt::LIST,
        }
    }

    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            sqdt::SINGLE => Some(Sequence::Single),
            sqdt::LIST => Some(Sequence::List),
            _ => None,
        }
    }
}

/// A valid kind/shape/sequence combination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TypeTagFields")]
pub struct TypeTag {
    kind: RawKind,
    shape: Shape,
    sequence: Sequence,
}

impl TypeTag {
    /// Returns `None` for combinations the format cannot store
    pub fn new(kind: RawKind, shape: Shape, sequence: Sequence) -> Option<Self> {
        if kind != RawKind::Float && shape != Shape::Single {
            return None;
        }
        Some(Self { kind, shape, sequence })
    }

    /// Decode the OR-ed bits of the native `type` argument
    pub fn from_bits(bits: u32) -> Option<Self> {
        let known = abi::RDT_MASK | abi::STDT_MASK | abi::SQDT_MASK;
        if bits & !known != 0 {
            return None;
        }
        let kind = RawKind::from_bits(bits & abi::RDT_MASK)?;
        let shape = Shape::from_bits(bits & abi::STDT_MASK)?;
        let sequence = Sequence::from_bits(bits & abi::SQDT_MASK)?;
        Self::new(kind, shape, sequence)
    }

    pub const fn bits(self) -> u32 {
        self.kind.bits() | self.shape.bits() | self.sequence.bits()
    }

    pub fn kind(self) -> RawKind {
        self.kind
    }

    pub fn shape(self) -> Shape {
        self.shape
    }

    pub fn sequence(self) -> Sequence {
        self.sequence
    }

    pub fn is_list(self) -> bool {
        self.sequence == Sequence::List
    }
}

#[derive(Deserialize)]
struct TypeTagFields {
    kind: RawKind,
    shape: Shape,
    sequence: Sequence,
}

impl TryFrom<TypeTagFields> for TypeTag {
    type Error = String;

    fn try_from(f: TypeTagFields) -> std::result::Result<Self, String> {
        TypeTag::new(f.kind, f.shape, f.sequence)
            .ok_or_else(|| format!("{:?} cannot have shape {:?}", f.kind, f.shape))
    }
}

/// Flat storage of a value's scalars
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueData {
    Ints(Vec<i32>),
    Floats(Vec<f32>),
    Strings(Vec<String>),
}

impl ValueData {
    fn kind(&self) -> RawKind {
        match self {
            ValueData::Ints(_) => RawKind::Int,
            ValueData::Floats(_) => RawKind::Float,
            ValueData::Strings(_) => RawKind::String,
        }
    }

    fn len(&self) -> usize {
        match self {
            ValueData::Ints(v) => v.len(),
            ValueData::Floats(v) => v.len(),
            ValueData::Strings(v) => v.len(),
        }
    }
}

/// An owned, typed parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ValueFields")]
pub struct Value {
    tag: TypeTag,
    data: ValueData,
}

#[derive(Deserialize)]
struct ValueFields {
    tag: TypeTag,
    data: ValueData,
}

impl TryFrom<ValueFields> for Value {
    type Error = String;

    fn try_from(f: ValueFields) -> std::result::Result<Self, String> {
        let len = f.data.len();
        Value::new(f.tag, f.data).ok_or_else(|| format!("{} items do not fit {:?}", len, f.tag))
    }
}

/// Kind matches and the length is a whole number of shape-sized items
fn fits(tag: TypeTag, data: &ValueData) -> bool {
    if data.kind() != tag.kind() {
        return false;
    }
    let width = tag.shape().components();
    match tag.sequence() {
        Sequence::Single => data.len() == width,
        Sequence::List => data.len() % width == 0,
    }
}

impl Value {
    /// Pair a tag with data, checking kind and length agree
    pub fn new(tag: TypeTag, data: ValueData) -> Option<Self> {
        fits(tag, &data).then_some(Self { tag, data })
    }

    fn single(kind: RawKind, shape: Shape, data: ValueData) -> Self {
        Self {
            tag: TypeTag {
                kind,
                shape,
                sequence: Sequence::Single,
            },
            data,
        }
    }

    fn list(kind: RawKind, shape: Shape, data: ValueData) -> Self {
        Self {
            tag: TypeTag {
                kind,
                shape,
                sequence: Sequence::List,
            },
            data,
        }
    }

    /// integer or bool
    pub fn int(v: i32) -> Self {
        Self::single(RawKind::Int, Shape::Single, ValueData::Ints(vec![v]))
    }

    pub fn float(v: f32) -> Self {
        Self::single(RawKind::Float, Shape::Single, ValueData::Floats(vec![v]))
    }

    pub fn string(v: impl Into<String>) -> Self {
        Self::single(RawKind::String, Shape::Single, ValueData::Strings(vec![v.into()]))
    }

    /// color or vector
    pub fn color(v: [f32; 3]) -> Self {
        Self::single(RawKind::Float, Shape::Array3, ValueData::Floats(v.to_vec()))
    }

    pub fn acolor(v: [f32; 4]) -> Self {
        Self::single(RawKind::Float, Shape::Array4, ValueData::Floats(v.to_vec()))
    }

    pub fn matrix(v: [f32; 9]) -> Self {
        Self::single(RawKind::Float, Shape::Array9, ValueData::Floats(v.to_vec()))
    }

    pub fn transform(v: [f32; 12]) -> Self {
        Self::single(RawKind::Float, Shape::Array12, ValueData::Floats(v.to_vec()))
    }

    pub fn int_list(v: Vec<i32>) -> Self {
        Self::list(RawKind::Int, Shape::Single, ValueData::Ints(v))
    }

    pub fn float_list(v: Vec<f32>) -> Self {
        Self::list(RawKind::Float, Shape::Single, ValueData::Floats(v))
    }

    pub fn string_list<S: Into<String>>(v: impl IntoIterator<Item = S>) -> Self {
        Self::list(
            RawKind::String,
            Shape::Single,
            ValueData::Strings(v.into_iter().map(Into::into).collect()),
        )
    }

    /// A list of float arrays given as one flat slice, e.g. two vectors as
    /// `[x1, y1, z1, x2, y2, z2]`. `None` if the length is not a multiple of
    /// the shape's width.
    pub fn array_list(shape: Shape, flat: Vec<f32>) -> Option<Self> {
        let tag = TypeTag::new(RawKind::Float, shape, Sequence::List)?;
        Self::new(tag, ValueData::Floats(flat))
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn data(&self) -> &ValueData {
        &self.data
    }

    /// Number of list entries, or 0 for a single value (the native `listLength`)
    pub fn list_len(&self) -> usize {
        match self.tag.sequence() {
            Sequence::Single => 0,
            Sequence::List => self.data.len() / self.tag.shape().components(),
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match (&self.data, self.tag.sequence()) {
            (ValueData::Ints(v), Sequence::Single) => v.first().copied(),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match (&self.data, self.tag.sequence(), self.tag.shape()) {
            (ValueData::Floats(v), Sequence::Single, Shape::Single) => v.first().copied(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match (&self.data, self.tag.sequence()) {
            (ValueData::Strings(v), Sequence::Single) => v.first().map(String::as_str),
            _ => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f32]> {
        match &self.data {
            ValueData::Floats(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match &self.data {
            ValueData::Strings(v) => Some(v),
            _ => None,
        }
    }
}

/// Borrowed view of a native value descriptor.
///
/// Only exists inside a value callback; copy what you need with
/// [`ValueView::to_record`].
pub struct ValueView<'a> {
    raw: &'a RawValueData,
}

impl ValueView<'_> {
    pub fn plugin_id(&self) -> Option<PluginId> {
        PluginId::new(self.raw.plugin_id)
    }

    pub fn param_id(&self) -> Option<ParamId> {
        ParamId::new(self.raw.param_id)
    }

    pub fn list_count(&self) -> u32 {
        self.raw.list_count
    }

    pub fn list_index(&self) -> u32 {
        self.raw.list_index
    }

    /// The descriptor's tag; `Ok(None)` when the element carries no value.
    ///
    /// Fails on unknown or multi-bit tag fields, and on a non-zero
    /// `components` count that disagrees with the shape.
    pub fn tag(&self) -> std::result::Result<Option<TypeTag>, String> {
        let (kind, shape, seq) = (self.raw.rdt, self.raw.stdt, self.raw.sqdt);
        if kind == rdt::NONE && shape == stdt::NONE && seq == sqdt::NONE {
            return Ok(None);
        }
        // Each field must hold exactly its own bits
        let in_place = kind & !abi::RDT_MASK == 0 && shape & !abi::STDT_MASK == 0 && seq & !abi::SQDT_MASK == 0;
        let tag = match TypeTag::from_bits(kind | shape | seq) {
            Some(tag) if in_place => tag,
            _ => {
                return Err(format!(
                    "unrecognized type tag rdt={:#x} stdt={:#x} sqdt={:#x}",
                    kind, shape, seq
                ))
            }
        };

        let components = self.raw.components;
        if components != 0 && components as usize != tag.shape().components() {
            return Err(format!("{} components reported for a {:?} value", components, tag.shape()));
        }
        Ok(Some(tag))
    }

    /// Copy the descriptor and the data it points to into owned memory
    pub fn to_record(&self) -> std::result::Result<ValueRecord, String> {
        let tag = self.tag()?;
        let mut record = ValueRecord {
            plugin: self.plugin_id(),
            param: self.param_id(),
            list_count: self.raw.list_count,
            list_index: self.raw.list_index,
            tag,
            data: None,
        };
        let Some(tag) = tag else {
            return Ok(record);
        };

        let width = tag.shape().components();
        let data = self.raw.data;
        let count = match tag.sequence() {
            Sequence::Single => 1,
            Sequence::List => self.raw.list_count as usize,
        };

        record.data = Some(match tag.kind() {
            RawKind::String => {
                // One item per callback: `data` is that item's C string
                if data.is_null() {
                    if tag.is_list() && count == 0 {
                        ValueData::Strings(Vec::new())
                    } else {
                        return Err("null string data".into());
                    }
                } else {
                    let s = unsafe { CStr::from_ptr(data as *const c_char) };
                    ValueData::Strings(vec![s.to_string_lossy().into_owned()])
                }
            }
            RawKind::Float | RawKind::Int if count == 0 => match tag.kind() {
                RawKind::Float => ValueData::Floats(Vec::new()),
                _ => ValueData::Ints(Vec::new()),
            },
            _ if data.is_null() => return Err("null value data".into()),
            RawKind::Float => {
                let v = unsafe { slice::from_raw_parts(data as *const f32, count * width) };
                ValueData::Floats(v.to_vec())
            }
            RawKind::Int => {
                let v = unsafe { slice::from_raw_parts(data as *const i32, count) };
                ValueData::Ints(v.to_vec())
            }
        });
        Ok(record)
    }
}

/// Owned copy of one value descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRecord {
    pub plugin: Option<PluginId>,
    pub param: Option<ParamId>,
    pub list_count: u32,
    pub list_index: u32,
    pub tag: Option<TypeTag>,
    /// For string lists this holds only the item at `list_index`
    pub data: Option<ValueData>,
}

/// State passed through `user_data` to [`value_trampoline`]
pub(crate) struct CallbackSlot<F> {
    f: F,
    panic: Option<Box<dyn Any + Send>>,
}

impl<F: FnMut(ValueView<'_>)> CallbackSlot<F> {
    pub(crate) fn new(f: F) -> Self {
        Self { f, panic: None }
    }

    pub(crate) fn callback(&self) -> ValueCallback {
        value_trampoline::<F>
    }

    pub(crate) fn user_data(&mut self) -> *mut c_void {
        self as *mut Self as *mut c_void
    }

    /// Re-raise a panic caught inside the callback, now that the native
    /// frames are gone
    pub(crate) fn resume(self) {
        if let Some(payload) = self.panic {
            panic::resume_unwind(payload);
        }
    }
}

/// `ValueCallback` that forwards to the closure in a [`CallbackSlot`]
unsafe extern "C" fn value_trampoline<F: FnMut(ValueView<'_>)>(
    value: *const RawValueData,
    user_data: *mut c_void,
) {
    let Some(slot) = (user_data as *mut CallbackSlot<F>).as_mut() else {
        return;
    };
    let Some(raw) = value.as_ref() else {
        return;
    };
    if slot.panic.is_some() {
        return;
    }
    let f = &mut slot.f;
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| f(ValueView { raw }))) {
        slot.panic = Some(payload);
    }
}

/// Accumulates the records of one `GetValue` call
#[derive(Default)]
struct Collector {
    records: Vec<ValueRecord>,
    error: Option<String>,
}

impl Collector {
    fn push(&mut self, view: ValueView<'_>) {
        if self.error.is_some() {
            return;
        }
        match view.to_record() {
            Ok(record) => self.records.push(record),
            Err(e) => self.error = Some(e),
        }
    }

    fn finish(self, param: ParamId, handle: HandleId) -> Result<Value> {
        let op = NativeCall::GetValue.name();
        if let Some(e) = self.error {
            return Err(VrmatError::abi(op, handle, format!("{} for {}", e, param)));
        }
        let Some(first) = self.records.first() else {
            return Err(VrmatError::abi(op, handle, format!("success reported but no value delivered for {}", param)));
        };
        let Some(tag) = first.tag else {
            return Err(VrmatError::validation(op, handle, format!("{} has no value", param)));
        };

        let data = if tag.kind() == RawKind::String && tag.is_list() {
            assemble_strings(&self.records, first.list_count)
                .map_err(|e| VrmatError::abi(op, handle, format!("{} for {}", e, param)))?
        } else {
            if self.records.len() != 1 {
                return Err(VrmatError::abi(
                    op,
                    handle,
                    format!("{} descriptors delivered for single {}", self.records.len(), param),
                ));
            }
            first.data.clone().unwrap_or(ValueData::Ints(Vec::new()))
        };

        Value::new(tag, data).ok_or_else(|| {
            VrmatError::abi(op, handle, format!("value of {} does not match its tag {:?}", param, tag))
        })
    }
}

/// Rebuild a string list delivered one item per callback
fn assemble_strings(records: &[ValueRecord], count: u32) -> std::result::Result<ValueData, String> {
    let mut items: Vec<Option<String>> = vec![None; count as usize];
    for record in records {
        let Some(ValueData::Strings(item)) = &record.data else {
            return Err("mixed descriptors in a string list".into());
        };
        let Some(s) = item.first() else {
            continue;
        };
        let slot = items
            .get_mut(record.list_index as usize)
            .ok_or_else(|| format!("list index {} out of {} items", record.list_index, count))?;
        *slot = Some(s.clone());
    }
    items
        .into_iter()
        .enumerate()
        .map(|(i, s)| s.ok_or_else(|| format!("list item {} never delivered", i)))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(ValueData::Strings)
}

impl Container {
    /// Store `value` in a parameter
    pub fn set_value(&mut self, param: ParamId, value: &Value) -> Result<()> {
        let op = NativeCall::SetValue.name();
        let list_length = c_int::try_from(value.list_len())
            .map_err(|_| VrmatError::validation(op, self.id(), format!("list of {} items is too long", value.list_len())))?;

        match value.data() {
            ValueData::Ints(v) => unsafe {
                self.set_value_raw(param, v.as_ptr() as *const c_void, value.tag(), list_length)
            },
            ValueData::Floats(v) => unsafe {
                self.set_value_raw(param, v.as_ptr() as *const c_void, value.tag(), list_length)
            },
            ValueData::Strings(v) => {
                let owned = v
                    .iter()
                    .map(|s| to_cstring(s, "string value"))
                    .collect::<Result<Vec<CString>>>()?;
                let pointers: Vec<*const c_char> = owned.iter().map(|c| c.as_ptr()).collect();
                unsafe { self.set_value_raw(param, pointers.as_ptr() as *const c_void, value.tag(), list_length) }
            }
        }
    }

    /// Store a value from caller-owned memory.
    ///
    /// # Safety
    /// `data` must point to a flat array matching `tag` and `list_length`
    /// (floats, ints, or `const char*` items) that stays valid for the call.
    /// The native side copies it.
    pub unsafe fn set_value_raw(
        &mut self,
        param: ParamId,
        data: *const c_void,
        tag: TypeTag,
        list_length: i32,
    ) -> Result<()> {
        let call = NativeCall::SetValue;
        let handle = self.live(call.name())?;
        if list_length < 0 || (!tag.is_list() && list_length != 0) {
            return Err(VrmatError::validation(
                call.name(),
                self.id(),
                format!("list length {} does not fit {:?}", list_length, tag),
            ));
        }

        let status = (self.table().set_value)(handle.as_ptr(), param.get(), data, tag.bits(), list_length);
        call.check(status.into(), self.id(), || {
            format!("{:?} with {} entries not accepted for {}", tag, list_length, param)
        })
    }

    /// Read the value of a parameter
    pub fn get_value(&self, param: ParamId) -> Result<Value> {
        let mut collector = Collector::default();
        self.get_value_with(param, |view| collector.push(view))?;
        collector.finish(param, self.id())
    }

    /// Run `f` on each descriptor the native side delivers for `param`.
    ///
    /// `f` runs synchronously inside the native call, once per descriptor
    /// (string lists deliver one per item). The view dies when `f` returns.
    /// `f` must not block and must not call back into this container.
    pub fn get_value_with<F>(&self, param: ParamId, f: F) -> Result<()>
    where
        F: FnMut(ValueView<'_>),
    {
        let call = NativeCall::GetValue;
        let handle = self.live(call.name())?;
        let mut slot = CallbackSlot::new(f);

        let status = unsafe {
            (self.table().get_value)(handle.as_ptr(), param.get(), slot.callback(), slot.user_data())
        };
        slot.resume();
        call.check(status.into(), self.id(), || format!("no value for {}", param))
    }
}
