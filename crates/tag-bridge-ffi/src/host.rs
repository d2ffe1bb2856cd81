//! The managed host runtime as a registered capability table.
//!
//! The embedder hands the bridge a [`HostApi`] vtable at initialization. Its
//! callbacks cover everything result marshalling needs: resolving type and
//! member handles by name, constructing objects, writing numeric fields and
//! arrays, appending to the result list, and releasing references. All
//! handles are opaque [`HostRef`]s minted by the host; the bridge never
//! interprets them.
//!
//! All `unsafe` host interaction is confined to this module; the rest of the
//! crate goes through the safe [`Host`] wrapper.

use std::ffi::{c_char, c_void, CStr};

/// Opaque reference minted by the host runtime. Null means failure.
pub type HostRef = *mut c_void;

/// Callbacks into the managed host runtime.
///
/// Every function pointer must remain valid for the process lifetime. The
/// `ctx` pointer is passed back verbatim on every call, so the embedder can
/// carry per-runtime state without globals.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct HostApi {
    pub ctx: *mut c_void,
    /// Resolve a type descriptor by well-known name.
    pub resolve_class: unsafe extern "C" fn(ctx: *mut c_void, name: *const c_char) -> HostRef,
    /// Resolve a method (including the constructor, named `<init>`).
    pub resolve_method:
        unsafe extern "C" fn(ctx: *mut c_void, class: HostRef, name: *const c_char) -> HostRef,
    pub resolve_field:
        unsafe extern "C" fn(ctx: *mut c_void, class: HostRef, name: *const c_char) -> HostRef,
    /// Construct an object; returns a transient reference.
    pub new_object: unsafe extern "C" fn(ctx: *mut c_void, class: HostRef, ctor: HostRef) -> HostRef,
    pub set_int_field:
        unsafe extern "C" fn(ctx: *mut c_void, object: HostRef, field: HostRef, value: i32) -> bool,
    /// Fetch an object-valued field; returns a transient reference.
    pub object_field:
        unsafe extern "C" fn(ctx: *mut c_void, object: HostRef, field: HostRef) -> HostRef,
    pub write_f64_array: unsafe extern "C" fn(
        ctx: *mut c_void,
        array: HostRef,
        values: *const f64,
        len: usize,
    ) -> bool,
    /// Append `item` to `list` through the resolved append method.
    pub append: unsafe extern "C" fn(
        ctx: *mut c_void,
        list: HostRef,
        method: HostRef,
        item: HostRef,
    ) -> bool,
    /// Release a transient reference. Never called on cached member handles.
    pub release_ref: unsafe extern "C" fn(ctx: *mut c_void, handle: HostRef),
}

/// Safe wrapper over a bound [`HostApi`].
pub struct Host {
    api: HostApi,
}

// Host calls are serialized by the bridge lock; the embedder guarantees the
// vtable itself is callable from whichever thread holds it.
unsafe impl Send for Host {}

impl Host {
    /// Bind a host vtable supplied over the C ABI.
    ///
    /// # Safety
    ///
    /// `api` must be null (yielding `None`) or point to a [`HostApi`] whose
    /// function pointers are all valid for the lifetime of the process.
    pub unsafe fn from_raw(api: *const HostApi) -> Option<Self> {
        if api.is_null() {
            return None;
        }
        Some(Self { api: unsafe { *api } })
    }

    pub fn resolve_class(&self, name: &CStr) -> Option<HostRef> {
        let handle = unsafe { (self.api.resolve_class)(self.api.ctx, name.as_ptr()) };
        (!handle.is_null()).then_some(handle)
    }

    pub fn resolve_method(&self, class: HostRef, name: &CStr) -> Option<HostRef> {
        let handle = unsafe { (self.api.resolve_method)(self.api.ctx, class, name.as_ptr()) };
        (!handle.is_null()).then_some(handle)
    }

    pub fn resolve_field(&self, class: HostRef, name: &CStr) -> Option<HostRef> {
        let handle = unsafe { (self.api.resolve_field)(self.api.ctx, class, name.as_ptr()) };
        (!handle.is_null()).then_some(handle)
    }

    pub fn new_object(&self, class: HostRef, ctor: HostRef) -> Option<HostRef> {
        let handle = unsafe { (self.api.new_object)(self.api.ctx, class, ctor) };
        (!handle.is_null()).then_some(handle)
    }

    pub fn set_int_field(&self, object: HostRef, field: HostRef, value: i32) -> bool {
        unsafe { (self.api.set_int_field)(self.api.ctx, object, field, value) }
    }

    pub fn object_field(&self, object: HostRef, field: HostRef) -> Option<HostRef> {
        let handle = unsafe { (self.api.object_field)(self.api.ctx, object, field) };
        (!handle.is_null()).then_some(handle)
    }

    pub fn write_f64_array(&self, array: HostRef, values: &[f64]) -> bool {
        unsafe { (self.api.write_f64_array)(self.api.ctx, array, values.as_ptr(), values.len()) }
    }

    pub fn append(&self, list: HostRef, method: HostRef, item: HostRef) -> bool {
        unsafe { (self.api.append)(self.api.ctx, list, method, item) }
    }

    pub fn release(&self, handle: HostRef) {
        unsafe { (self.api.release_ref)(self.api.ctx, handle) }
    }
}

/// Scoped transient host reference, released when the guard drops.
///
/// Marshalling acquires one of these per object or array it touches and lets
/// it drop before the next loop iteration, keeping the number of
/// simultaneously live transient references constant regardless of how many
/// detections a frame produces.
pub struct TransientRef<'h> {
    host: &'h Host,
    handle: HostRef,
}

impl<'h> TransientRef<'h> {
    pub fn new(host: &'h Host, handle: HostRef) -> Self {
        Self { host, handle }
    }

    #[inline]
    pub fn get(&self) -> HostRef {
        self.handle
    }

    /// Hand the reference to the caller without releasing it.
    pub fn into_raw(self) -> HostRef {
        let handle = self.handle;
        std::mem::forget(self);
        handle
    }
}

impl Drop for TransientRef<'_> {
    fn drop(&mut self) {
        self.host.release(self.handle);
    }
}
