//! C vtable binding for the external detection engine.
//!
//! The engine library registers an [`EngineApi`] at initialization. Family
//! constructors come as a fixed table of `{create, destroy}` capability
//! pairs indexed by [`TagFamily::index`]; [`CFamily`] binds the destructor to
//! the created resource so it is released on every exit path.

use std::ffi::c_int;

use log::warn;
use nalgebra::{Matrix3, Point2};

use tag_bridge::{
    CameraIntrinsics, DetectorConfig, EngineError, LumaView, PoseEstimate, RawDetection,
    TagEngine, TagFamily,
};

/// Opaque engine-side family resource.
#[repr(C)]
pub struct RawFamily {
    _private: [u8; 0],
}

/// Opaque engine-side detector resource.
#[repr(C)]
pub struct RawDetector {
    _private: [u8; 0],
}

/// One detection on the engine wire.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct CDetection {
    pub id: i32,
    pub hamming: i32,
    /// Center `[x, y]` in image pixel coordinates.
    pub center: [f64; 2],
    /// Corners `[x0, y0, .., x3, y3]` in the engine's corner order.
    pub corners: [f64; 8],
}

/// Pinhole model on the engine wire.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct CIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

/// Constructor/destructor capability pair for one marker family.
///
/// Both pointers must be present for the family to be usable; a zeroed entry
/// means the engine build does not ship that family.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FamilyOps {
    pub create: Option<unsafe extern "C" fn() -> *mut RawFamily>,
    pub destroy: Option<unsafe extern "C" fn(family: *mut RawFamily)>,
}

/// Callbacks into the external detection engine.
///
/// Every function pointer must remain valid for the process lifetime.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct EngineApi {
    /// Family capability pairs indexed by [`TagFamily::index`].
    pub families: [FamilyOps; TagFamily::COUNT],
    pub detector_create: unsafe extern "C" fn() -> *mut RawDetector,
    pub detector_destroy: unsafe extern "C" fn(detector: *mut RawDetector),
    /// Register `family` with the detector, accepting up to `error_bits`
    /// corrected payload bits.
    pub detector_add_family:
        unsafe extern "C" fn(detector: *mut RawDetector, family: *mut RawFamily, error_bits: c_int),
    pub detector_configure: unsafe extern "C" fn(
        detector: *mut RawDetector,
        decimate: f32,
        sigma: f32,
        threads: c_int,
    ),
    /// Detect over a luma plane. Returns an engine-owned array of `out_count`
    /// detections, to be released with `detections_free`.
    pub detect: unsafe extern "C" fn(
        detector: *mut RawDetector,
        luma: *const u8,
        width: c_int,
        height: c_int,
        stride: c_int,
        out_count: *mut usize,
    ) -> *mut CDetection,
    pub detections_free: unsafe extern "C" fn(detections: *mut CDetection, count: usize),
    /// Estimate a pose; writes nine row-major values through `rotation_out`.
    pub estimate_pose: unsafe extern "C" fn(
        detection: *const CDetection,
        intrinsics: *const CIntrinsics,
        tag_size: f64,
        rotation_out: *mut f64,
    ) -> bool,
}

/// Engine family resource with its paired destructor bound at construction.
pub struct CFamily {
    raw: *mut RawFamily,
    destroy: unsafe extern "C" fn(*mut RawFamily),
    family: TagFamily,
}

impl Drop for CFamily {
    fn drop(&mut self) {
        unsafe { (self.destroy)(self.raw) };
    }
}

/// Engine detector resource, released on drop.
pub struct CDetector {
    raw: *mut RawDetector,
    destroy: unsafe extern "C" fn(*mut RawDetector),
}

impl Drop for CDetector {
    fn drop(&mut self) {
        unsafe { (self.destroy)(self.raw) };
    }
}

// Engine resources are only touched under the bridge lock; the engine
// promises its entry points are callable from whichever thread holds it.
unsafe impl Send for CFamily {}
unsafe impl Send for CDetector {}

/// Adapter exposing a registered [`EngineApi`] as a [`TagEngine`].
pub struct CEngine {
    api: EngineApi,
}

unsafe impl Send for CEngine {}

impl CEngine {
    /// Bind an engine vtable supplied over the C ABI.
    ///
    /// # Safety
    ///
    /// `api` must be null (yielding `None`) or point to an [`EngineApi`]
    /// whose function pointers are all valid for the lifetime of the process.
    pub unsafe fn from_raw(api: *const EngineApi) -> Option<Self> {
        if api.is_null() {
            return None;
        }
        Some(Self { api: unsafe { *api } })
    }
}

impl TagEngine for CEngine {
    type Family = CFamily;
    type Detector = CDetector;

    fn create_family(&mut self, family: TagFamily) -> Result<CFamily, EngineError> {
        let ops = self.api.families[family.index()];
        let (Some(create), Some(destroy)) = (ops.create, ops.destroy) else {
            return Err(EngineError::FamilyUnavailable(family));
        };
        let raw = unsafe { create() };
        if raw.is_null() {
            return Err(EngineError::FamilyCreate(family));
        }
        Ok(CFamily {
            raw,
            destroy,
            family,
        })
    }

    fn create_detector(
        &mut self,
        family: &CFamily,
        config: &DetectorConfig,
    ) -> Result<CDetector, EngineError> {
        let raw = unsafe { (self.api.detector_create)() };
        if raw.is_null() {
            return Err(EngineError::DetectorCreate(family.family));
        }
        let detector = CDetector {
            raw,
            destroy: self.api.detector_destroy,
        };
        unsafe {
            (self.api.detector_add_family)(detector.raw, family.raw, config.error_bits);
            (self.api.detector_configure)(
                detector.raw,
                config.decimate,
                config.sigma,
                config.threads,
            );
        }
        Ok(detector)
    }

    fn detect(&mut self, detector: &mut CDetector, image: &LumaView<'_>) -> Vec<RawDetection> {
        let mut count = 0usize;
        let raw = unsafe {
            (self.api.detect)(
                detector.raw,
                image.data().as_ptr(),
                image.width() as c_int,
                image.height() as c_int,
                image.stride() as c_int,
                &mut count,
            )
        };
        if raw.is_null() {
            return Vec::new();
        }

        let detections = unsafe { std::slice::from_raw_parts(raw, count) }
            .iter()
            .map(RawDetection::from)
            .collect();
        // The returned vector is a fresh snapshot; engine-owned detection
        // memory is released before handing it back.
        unsafe { (self.api.detections_free)(raw, count) };
        detections
    }

    fn estimate_pose(
        &self,
        detection: &RawDetection,
        intrinsics: &CameraIntrinsics,
        tag_size: f64,
    ) -> PoseEstimate {
        let det = CDetection::from(detection);
        let intr = CIntrinsics {
            fx: intrinsics.fx,
            fy: intrinsics.fy,
            cx: intrinsics.cx,
            cy: intrinsics.cy,
        };
        let mut rotation = [0.0f64; 9];
        let ok =
            unsafe { (self.api.estimate_pose)(&det, &intr, tag_size, rotation.as_mut_ptr()) };
        if !ok {
            warn!(
                "engine pose estimation failed for tag {}, reporting identity rotation",
                detection.id
            );
            return PoseEstimate {
                rotation: Matrix3::identity(),
            };
        }
        PoseEstimate {
            rotation: Matrix3::from_row_slice(&rotation),
        }
    }
}

impl From<&CDetection> for RawDetection {
    fn from(det: &CDetection) -> Self {
        let c = &det.corners;
        Self {
            id: det.id,
            hamming: det.hamming,
            center: Point2::new(det.center[0], det.center[1]),
            corners: [
                Point2::new(c[0], c[1]),
                Point2::new(c[2], c[3]),
                Point2::new(c[4], c[5]),
                Point2::new(c[6], c[7]),
            ],
        }
    }
}

impl From<&RawDetection> for CDetection {
    fn from(det: &RawDetection) -> Self {
        let c = &det.corners;
        Self {
            id: det.id,
            hamming: det.hamming,
            center: [det.center.x, det.center.y],
            corners: [
                c[0].x, c[0].y, c[1].x, c[1].y, c[2].x, c[2].y, c[3].x, c[3].y,
            ],
        }
    }
}
