//! C ABI bridge surface.
//!
//! Exactly four operations are exported to the host runtime:
//!
//! | export | role |
//! |---|---|
//! | [`tag_bridge_init`] | bind the host + engine capability tables, resolve the handle cache |
//! | [`tag_bridge_convert_frame`] | NV21 frame -> rotated RGBA surface |
//! | [`tag_bridge_configure_detector`] | replace the live detector configuration |
//! | [`tag_bridge_detect_frame`] | luma frame -> host list of detection records |
//!
//! Bridge state is one explicit `Bridge` value behind a process-wide mutex:
//! entry points run synchronously to completion, and concurrent callers are
//! serialized rather than racing an ambient global. Conversion is stateless
//! and does not touch the lock at all.

mod cache;
mod engine;
mod host;
mod marshal;

pub use cache::{HandleCache, ResolveError, LIST_CLASS, RECORD_CLASS};
pub use engine::{
    CDetection, CDetector, CEngine, CFamily, CIntrinsics, EngineApi, FamilyOps, RawDetector,
    RawFamily,
};
pub use host::{Host, HostApi, HostRef, TransientRef};
pub use marshal::{marshal_detections, MarshalError};

use std::ffi::{c_char, c_int, CStr};
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{error, info, LevelFilter};

use tag_bridge::{
    logger, yuv_to_rgba_rotated, DetectorConfig, DetectorContext, LumaView, Nv21Frame,
    RgbaSurfaceMut, SurfaceFormat, TagFamily,
};

/// Status codes returned by the bridge entry points.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeStatus {
    Ok = 0,
    /// A required pointer argument was null.
    NullPointer = 1,
    /// The operation needs `tag_bridge_init` first.
    NotInitialized = 2,
    /// The host could not resolve a required class or member handle.
    ResolveFailed = 3,
    /// The source buffer does not describe a valid frame.
    InvalidImage = 4,
    /// The destination surface fails the conversion preconditions.
    SurfaceMismatch = 5,
    /// The family name is outside the supported set.
    UnknownFamily = 6,
    /// The engine refused to build the requested detector resources.
    EngineFailure = 7,
}

/// Destination surface descriptor for [`tag_bridge_convert_frame`].
///
/// `pixels` must point to `width * height` packed 32-bit pixels owned (and,
/// where applicable, locked) by the caller.
#[repr(C)]
pub struct RawSurface {
    pub pixels: *mut u32,
    pub width: u32,
    pub height: u32,
    /// Pixel layout tag: [`SURFACE_FORMAT_RGBA8888`] or [`SURFACE_FORMAT_RGB565`].
    pub format: u32,
}

pub const SURFACE_FORMAT_RGBA8888: u32 = 1;
pub const SURFACE_FORMAT_RGB565: u32 = 2;

fn surface_format(tag: u32) -> Option<SurfaceFormat> {
    match tag {
        SURFACE_FORMAT_RGBA8888 => Some(SurfaceFormat::Rgba8888),
        SURFACE_FORMAT_RGB565 => Some(SurfaceFormat::Rgb565),
        _ => None,
    }
}

/// Everything the bridge owns between calls.
struct Bridge {
    host: Host,
    cache: HandleCache,
    context: DetectorContext<CEngine>,
}

static BRIDGE: Mutex<Option<Bridge>> = Mutex::new(None);

fn bridge_lock() -> MutexGuard<'static, Option<Bridge>> {
    BRIDGE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bind the host runtime and detection engine and resolve the handle cache.
///
/// Must be called once before `tag_bridge_configure_detector` or
/// `tag_bridge_detect_frame`. Calling it again rebinds both capability tables
/// and re-resolves the cache; any live detector configuration is released
/// first. A failed call leaves the bridge uninitialized.
///
/// # Safety
///
/// `host` and `engine` must each be null or point to vtables whose function
/// pointers remain valid for the lifetime of the process.
#[no_mangle]
pub unsafe extern "C" fn tag_bridge_init(
    host: *const HostApi,
    engine: *const EngineApi,
) -> BridgeStatus {
    let _ = logger::init_with_level(LevelFilter::Info);

    let Some(host) = (unsafe { Host::from_raw(host) }) else {
        error!("init called with a null host vtable");
        *bridge_lock() = None;
        return BridgeStatus::NullPointer;
    };
    let Some(engine) = (unsafe { CEngine::from_raw(engine) }) else {
        error!("init called with a null engine vtable");
        *bridge_lock() = None;
        return BridgeStatus::NullPointer;
    };

    let cache = match HandleCache::resolve(&host) {
        Ok(cache) => cache,
        Err(err) => {
            error!("handle resolution failed: {err}");
            *bridge_lock() = None;
            return BridgeStatus::ResolveFailed;
        }
    };

    let mut bridge = bridge_lock();
    if bridge.is_some() {
        info!("re-initializing bridge, dropping previous state");
    }
    *bridge = Some(Bridge {
        host,
        cache,
        context: DetectorContext::new(engine),
    });
    BridgeStatus::Ok
}

/// Convert an NV21 frame into a rotated RGBA surface.
///
/// The surface must hold exactly `width * height` packed 32-bit pixels in
/// RGBA8888 layout; violations abort before any write. Does not require
/// `tag_bridge_init` and keeps no state between calls.
///
/// # Safety
///
/// `src` must be readable for `src_len` bytes, `surface` must point to a
/// valid [`RawSurface`] and `surface.pixels` must be writable for
/// `surface.width * surface.height` pixels for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn tag_bridge_convert_frame(
    src: *const u8,
    src_len: usize,
    width: u32,
    height: u32,
    surface: *const RawSurface,
) -> BridgeStatus {
    if src.is_null() || surface.is_null() {
        error!("convert called with a null frame or surface");
        return BridgeStatus::NullPointer;
    }
    let surface = unsafe { &*surface };
    if surface.pixels.is_null() {
        error!("convert called with a null surface pixel buffer");
        return BridgeStatus::NullPointer;
    }

    let data = unsafe { std::slice::from_raw_parts(src, src_len) };
    let frame = match Nv21Frame::new(data, width, height) {
        Ok(frame) => frame,
        Err(err) => {
            error!("invalid source frame: {err}");
            return BridgeStatus::InvalidImage;
        }
    };

    let Some(format) = surface_format(surface.format) else {
        error!("unrecognized surface format tag {}", surface.format);
        return BridgeStatus::SurfaceMismatch;
    };
    let Some(pixel_count) = (surface.width as usize).checked_mul(surface.height as usize) else {
        error!(
            "surface dimensions out of range ({}x{})",
            surface.width, surface.height
        );
        return BridgeStatus::SurfaceMismatch;
    };
    let pixels = unsafe { std::slice::from_raw_parts_mut(surface.pixels, pixel_count) };
    let mut dst = match RgbaSurfaceMut::new(pixels, surface.width, surface.height, format) {
        Ok(dst) => dst,
        Err(err) => {
            error!("invalid destination surface: {err}");
            return BridgeStatus::SurfaceMismatch;
        }
    };

    match yuv_to_rgba_rotated(&frame, &mut dst) {
        Ok(()) => BridgeStatus::Ok,
        Err(err) => {
            error!("frame conversion rejected: {err}");
            BridgeStatus::SurfaceMismatch
        }
    }
}

/// Replace the live detector configuration.
///
/// `family` must be one of the supported family names. An unknown name is
/// rejected before any teardown, leaving the previous configuration (if any)
/// untouched.
///
/// # Safety
///
/// `family` must be null or point to a nul-terminated string valid for the
/// duration of the call.
#[no_mangle]
pub unsafe extern "C" fn tag_bridge_configure_detector(
    family: *const c_char,
    error_bits: c_int,
    decimate: f32,
    sigma: f32,
    threads: c_int,
) -> BridgeStatus {
    if family.is_null() {
        error!("configure called with a null family name");
        return BridgeStatus::NullPointer;
    }
    let name = unsafe { CStr::from_ptr(family) };
    let Ok(name) = name.to_str() else {
        error!("family name is not valid UTF-8; keeping current detector");
        return BridgeStatus::UnknownFamily;
    };
    let family = match name.parse::<TagFamily>() {
        Ok(family) => family,
        Err(err) => {
            error!("{err}; keeping current detector");
            return BridgeStatus::UnknownFamily;
        }
    };

    let mut guard = bridge_lock();
    let Some(bridge) = guard.as_mut() else {
        error!("configure called before init");
        return BridgeStatus::NotInitialized;
    };

    let config = DetectorConfig {
        family,
        error_bits,
        decimate,
        sigma,
        threads,
    };
    match bridge.context.configure(config) {
        Ok(()) => BridgeStatus::Ok,
        Err(err) => {
            error!("detector configuration failed: {err}");
            BridgeStatus::EngineFailure
        }
    }
}

/// Detect markers in a luma frame and return them as a host list.
///
/// Only the first `width * height` bytes of `buf` are read, so a full NV21
/// buffer can be passed as-is. With no live configuration the documented
/// defaults are configured first. Returns null on failure; on success the
/// returned list reference is owned by the caller.
///
/// # Safety
///
/// `buf` must be readable for `len` bytes for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn tag_bridge_detect_frame(
    buf: *const u8,
    len: usize,
    width: u32,
    height: u32,
) -> HostRef {
    if buf.is_null() {
        error!("detect called with a null frame");
        return ptr::null_mut();
    }
    let data = unsafe { std::slice::from_raw_parts(buf, len) };
    let image = match LumaView::new(data, width, height) {
        Ok(image) => image,
        Err(err) => {
            error!("invalid luma frame: {err}");
            return ptr::null_mut();
        }
    };

    let mut guard = bridge_lock();
    let Some(bridge) = guard.as_mut() else {
        error!("detect called before init");
        return ptr::null_mut();
    };

    let detections = match bridge.context.detect(&image) {
        Ok(detections) => detections,
        Err(err) => {
            error!("detection failed: {err}");
            return ptr::null_mut();
        }
    };

    match marshal_detections(&bridge.host, &bridge.cache, &detections) {
        Ok(list) => list,
        Err(err) => {
            error!("marshalling failed: {err}");
            ptr::null_mut()
        }
    }
}
