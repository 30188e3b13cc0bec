//! Ownership of native container handles.
//!
//! A [`Container`] owns exactly one `DataContainer_*` handle. The handle is
//! released once, either by [`Container::destroy`] or when the container is
//! dropped, and every later operation fails instead of touching freed memory.

use crate::abi::NativeTable;
use crate::error::{HandleId, Result, VrmatError};
use crate::library::VrmatLibrary;
use crate::status::NativeCall;
use parking_lot::{Mutex, MutexGuard};
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::path::Path;
use std::ptr::NonNull;
use std::sync::Arc;

/// An open vrmat document held by the native library
pub struct Container {
    /// `None` once released
    handle: Option<NonNull<c_void>>,
    library: Arc<VrmatLibrary>,
}

// Safety: a handle has no thread affinity. The native side is not reentrant,
// so `Container` is not `Sync`; share it through `SharedContainer`.
unsafe impl Send for Container {}

impl Container {
    /// Create an empty document
    pub fn create(library: Arc<VrmatLibrary>) -> Result<Self> {
        let raw = unsafe { (library.table().create)() };
        let handle = NonNull::new(raw).ok_or_else(|| {
            VrmatError::abi("create", HandleId::RELEASED, "DataContainer_Create returned null")
        })?;
        log::debug!("Created container {:p} via '{}'", raw, library.name());

        Ok(Self {
            handle: Some(handle),
            library,
        })
    }

    /// Create a container and open a file into it.
    ///
    /// Fails fast: if the file cannot be opened the handle is released and no
    /// container is returned.
    pub fn open(library: Arc<VrmatLibrary>, path: impl AsRef<Path>) -> Result<Self> {
        let mut container = Self::create(library)?;
        container.open_file(path)?;
        Ok(container)
    }

    /// Create a container and parse an in-memory document into it
    pub fn from_buffer(library: Arc<VrmatLibrary>, buffer: &str) -> Result<Self> {
        let mut container = Self::create(library)?;
        container.load(buffer)?;
        Ok(container)
    }

    /// Replace the contents with the file at `path`
    pub fn open_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let c_path = path_to_cstring(path)?;
        let handle = self.live(NativeCall::Open.name())?;

        let status = unsafe { (self.table().open)(handle.as_ptr(), c_path.as_ptr()) };
        NativeCall::Open.check(status.into(), self.id(), || format!("could not open '{}'", path.display()))?;

        log::info!("Opened '{}' into container {}", path.display(), self.id());
        Ok(())
    }

    /// Replace the contents with an in-memory document
    pub fn load(&mut self, buffer: &str) -> Result<()> {
        let op = NativeCall::Load.name();
        let handle = self.live(op)?;
        let length = c_int::try_from(buffer.len())
            .map_err(|_| VrmatError::io(op, self.id(), format!("buffer of {} bytes is too large", buffer.len())))?;
        let c_buffer = to_cstring(buffer, "load buffer")?;

        let status = unsafe { (self.table().load)(handle.as_ptr(), c_buffer.as_ptr(), length) };
        NativeCall::Load.check(status.into(), self.id(), || format!("could not parse {} byte buffer", length))?;

        log::info!("Loaded {} bytes into container {}", length, self.id());
        Ok(())
    }

    /// Write the document to `path`.
    ///
    /// `version` selects the on-disk layout and is passed through unchanged.
    pub fn save(&self, path: impl AsRef<Path>, version: i32) -> Result<()> {
        let path = path.as_ref();
        let c_path = path_to_cstring(path)?;
        let handle = self.live(NativeCall::Save.name())?;

        let status = unsafe { (self.table().save)(handle.as_ptr(), c_path.as_ptr(), version) };
        NativeCall::Save.check(status.into(), self.id(), || {
            format!("could not save '{}' (version {})", path.display(), version)
        })?;

        log::info!("Saved container {} to '{}'", self.id(), path.display());
        Ok(())
    }

    /// Release the native handle. Calling it again is a no-op.
    pub fn destroy(&mut self) {
        if let Some(handle) = self.handle.take() {
            log::debug!("Destroying container {:p}", handle.as_ptr());
            unsafe { (self.library.table().destroy)(handle.as_ptr()) };
        }
    }

    /// Whether the handle has not been released yet
    pub fn is_live(&self) -> bool {
        self.handle.is_some()
    }

    /// Identity of the handle for diagnostics
    pub fn id(&self) -> HandleId {
        self.handle
            .map(|h| HandleId(h.as_ptr() as usize))
            .unwrap_or(HandleId::RELEASED)
    }

    pub fn library(&self) -> &Arc<VrmatLibrary> {
        &self.library
    }

    /// Ask the native side for a plugin name not used in this document
    pub fn unique_name(&self, name: &str) -> Result<String> {
        let op = "unique_name";
        let handle = self.live(op)?;
        let c_name = to_cstring(name, "plugin name")?;
        let mut slot: Option<String> = None;

        unsafe {
            (self.table().get_unique_name)(
                handle.as_ptr(),
                c_name.as_ptr(),
                collect_name,
                &mut slot as *mut Option<String> as *mut c_void,
            );
        }

        slot.ok_or_else(|| VrmatError::abi(op, self.id(), format!("no name delivered for '{}'", name)))
    }

    /// Wrap in the per-handle lock required for use from several threads
    pub fn into_shared(self) -> SharedContainer {
        SharedContainer(Arc::new(Mutex::new(self)))
    }

    pub(crate) fn table(&self) -> &NativeTable {
        self.library.table()
    }

    /// The live handle, or an error naming `op` if it was released
    pub(crate) fn live(&self, op: &'static str) -> Result<NonNull<c_void>> {
        self.handle
            .ok_or_else(|| VrmatError::validation(op, HandleId::RELEASED, "container has been destroyed"))
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("handle", &self.id())
            .field("library", &self.library.name())
            .finish()
    }
}

/// A container shared between threads.
///
/// The native library does no locking of its own; every call goes through
/// this mutex, held for the whole call. Callbacks run while the lock is held,
/// so they must not lock the same container again.
#[derive(Clone)]
pub struct SharedContainer(Arc<Mutex<Container>>);

impl SharedContainer {
    pub fn lock(&self) -> MutexGuard<'_, Container> {
        self.0.lock()
    }

    /// Run `f` with exclusive access to the container
    pub fn with<R>(&self, f: impl FnOnce(&mut Container) -> R) -> R {
        f(&mut self.0.lock())
    }
}

unsafe extern "C" fn collect_name(name: *const c_char, user_data: *mut c_void) {
    let Some(slot) = (user_data as *mut Option<String>).as_mut() else {
        return;
    };
    if !name.is_null() {
        *slot = Some(CStr::from_ptr(name).to_string_lossy().into_owned());
    }
}

pub(crate) fn to_cstring(s: &str, what: &'static str) -> Result<CString> {
    CString::new(s).map_err(|_| VrmatError::InvalidString { what })
}

fn path_to_cstring(path: &Path) -> Result<CString> {
    let s = path.to_str().ok_or(VrmatError::InvalidString { what: "path" })?;
    to_cstring(s, "path")
}
