//! Cursors over the plugins of a container, or the parameters of a plugin.
//!
//! A [`Cursor`] borrows its container, so the container cannot be mutated or
//! destroyed while the cursor is alive. The native cursor is released exactly
//! once, on [`Cursor::destroy`] or drop.

use crate::container::Container;
use crate::error::{Result, VrmatError};
use crate::plugin::{ParamId, PluginId};
use crate::status::NativeCall;
use crate::value::{CallbackSlot, TypeTag, Value, ValueView};
use std::ffi::c_void;
use std::ptr::{self, NonNull};

const CREATE_OP: &str = "cursor_create";

/// Lifecycle of a cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Positioned on an element
    Created,
    /// No more elements; also the state of a cursor over an empty scope
    Exhausted,
    /// Native cursor released
    Destroyed,
}

/// The element a cursor is positioned on
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub plugin: PluginId,
    /// Set when iterating parameters
    pub param: Option<ParamId>,
    /// Type of the parameter's value, if it has one
    pub tag: Option<TypeTag>,
    pub list_count: u32,
}

impl Entry {
    fn from_view(view: &ValueView<'_>) -> std::result::Result<Self, String> {
        let plugin = view
            .plugin_id()
            .ok_or_else(|| "descriptor without a plugin id".to_string())?;
        Ok(Self {
            plugin,
            param: view.param_id(),
            tag: view.tag()?,
            list_count: view.list_count(),
        })
    }
}

type Delivered = Option<std::result::Result<Entry, String>>;

fn capture(slot: &mut Delivered) -> impl FnMut(ValueView<'_>) + '_ {
    move |view: ValueView<'_>| {
        if slot.is_none() {
            *slot = Some(Entry::from_view(&view));
        }
    }
}

/// A native iterator over plugins or parameters
pub struct Cursor<'c> {
    container: &'c Container,
    raw: Option<NonNull<c_void>>,
    state: CursorState,
    current: Option<Entry>,
}

impl<'c> Cursor<'c> {
    /// Start iterating.
    ///
    /// With `plugin` set, iterates that plugin's parameters. With `parent` set
    /// (a plugin cursor), iterates the parameters of the parent's current
    /// plugin. With neither, iterates the container's plugins.
    pub fn create(container: &'c Container, plugin: Option<PluginId>, parent: Option<&Cursor<'_>>) -> Result<Self> {
        let handle = container.live(CREATE_OP)?;
        let parent_raw = match parent {
            Some(p) if p.current.is_none() => {
                return Err(VrmatError::validation(
                    CREATE_OP,
                    container.id(),
                    format!("parent cursor is {:?}, not positioned on a plugin", p.state),
                ));
            }
            Some(p) => p.raw.map(|r| r.as_ptr() as *const c_void).unwrap_or(ptr::null()),
            None => ptr::null(),
        };

        let mut delivered: Delivered = None;
        let mut slot = CallbackSlot::new(capture(&mut delivered));
        let raw = unsafe {
            (container.table().iterator_create)(
                handle.as_ptr(),
                plugin.map(PluginId::get).unwrap_or(0),
                parent_raw,
                slot.callback(),
                slot.user_data(),
            )
        };
        slot.resume();

        let mut cursor = Cursor {
            container,
            raw: NonNull::new(raw),
            state: CursorState::Exhausted,
            current: None,
        };
        if cursor.raw.is_none() {
            log::debug!("Empty cursor on container {}", container.id());
            return Ok(cursor);
        }

        match delivered {
            Some(Ok(entry)) => {
                cursor.state = CursorState::Created;
                cursor.current = Some(entry);
                Ok(cursor)
            }
            Some(Err(e)) => Err(VrmatError::abi(CREATE_OP, container.id(), e)),
            None => Err(VrmatError::abi(
                CREATE_OP,
                container.id(),
                "cursor created without delivering its first element",
            )),
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Element under the cursor; `None` once exhausted or destroyed
    pub fn current(&self) -> Option<&Entry> {
        self.current.as_ref()
    }

    /// Move to the next element. `Ok(false)` means the end was reached.
    pub fn advance(&mut self) -> Result<bool> {
        let call = NativeCall::IteratorIncrement;
        let raw = match (self.state, self.raw) {
            (CursorState::Destroyed, _) => {
                return Err(VrmatError::validation(call.name(), self.container.id(), "cursor was destroyed"));
            }
            (CursorState::Exhausted, _) | (_, None) => return Ok(false),
            (CursorState::Created, Some(raw)) => raw,
        };

        let mut delivered: Delivered = None;
        let mut slot = CallbackSlot::new(capture(&mut delivered));
        let status = unsafe {
            (self.container.table().iterator_increment)(raw.as_ptr(), slot.callback(), slot.user_data())
        };
        slot.resume();

        if !call.succeeded(status.into()) {
            log::debug!("Cursor on container {} exhausted", self.container.id());
            self.state = CursorState::Exhausted;
            self.current = None;
            return Ok(false);
        }

        match delivered {
            Some(Ok(entry)) => {
                self.current = Some(entry);
                Ok(true)
            }
            Some(Err(e)) => Err(VrmatError::abi(call.name(), self.container.id(), e)),
            None => Err(VrmatError::abi(
                call.name(),
                self.container.id(),
                "advanced without delivering an element",
            )),
        }
    }

    /// Full value of the parameter under the cursor
    pub fn value(&self) -> Result<Option<Value>> {
        match &self.current {
            Some(Entry {
                param: Some(param),
                tag: Some(_),
                ..
            }) => self.container.get_value(*param).map(Some),
            _ => Ok(None),
        }
    }

    /// Cursor over the parameters of the plugin under this cursor.
    ///
    /// The native child may keep referring to this cursor, so the child
    /// borrows it and this cursor cannot move or be advanced meanwhile:
    ///
    /// ```compile_fail
    /// fn step_with_child(mut outer: vrmat_bridge::Cursor<'_>) {
    ///     let child = outer.parameters().unwrap();
    ///     outer.advance().unwrap();
    ///     drop(child);
    /// }
    /// ```
    pub fn parameters<'p>(&'p self) -> Result<Cursor<'p>> {
        Cursor::create(self.container, None, Some(self))
    }

    /// Release the native cursor. Calling it again is a no-op.
    pub fn destroy(&mut self) {
        if let Some(raw) = self.raw.take() {
            unsafe { (self.container.table().iterator_destroy)(raw.as_ptr()) };
        }
        self.state = CursorState::Destroyed;
        self.current = None;
    }

    /// Iterate the remaining elements, starting with the current one
    pub fn entries(self) -> Entries<'c> {
        Entries {
            cursor: self,
            started: false,
            failed: false,
        }
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// `Iterator` adapter over a [`Cursor`]
pub struct Entries<'c> {
    cursor: Cursor<'c>,
    started: bool,
    failed: bool,
}

impl Iterator for Entries<'_> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if !self.started {
            self.started = true;
            return self.cursor.current().cloned().map(Ok);
        }
        match self.cursor.advance() {
            Ok(true) => self.cursor.current().cloned().map(Ok),
            Ok(false) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl Container {
    /// Cursor over all plugins
    pub fn plugins(&self) -> Result<Cursor<'_>> {
        Cursor::create(self, None, None)
    }

    /// Cursor over the parameters of `plugin`
    pub fn parameters(&self, plugin: PluginId) -> Result<Cursor<'_>> {
        Cursor::create(self, Some(plugin), None)
    }
}
