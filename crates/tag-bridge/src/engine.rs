//! Seam to the external detection engine.
//!
//! The computer-vision core (quad detection, payload decoding, pose solving)
//! lives outside this crate. Everything it must provide is captured by the
//! [`TagEngine`] trait; the bridge never assumes more than these calls.

use nalgebra::{Matrix3, Point2};
use serde::{Deserialize, Serialize};

use crate::context::DetectorConfig;
use crate::family::TagFamily;
use crate::image::LumaView;

/// One raw detection as reported by the engine.
///
/// Corners are in image pixel coordinates, in the engine's fixed order
/// (counter-clockwise around the tag for AprilTag-style engines). That order
/// is preserved end to end.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawDetection {
    /// Decoded marker id.
    pub id: i32,
    /// Bit errors corrected while decoding the payload.
    pub hamming: i32,
    /// Detection center in image pixel coordinates.
    pub center: Point2<f64>,
    pub corners: [Point2<f64>; 4],
}

/// Pinhole camera model used for pose estimation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Uncalibrated approximation derived from the frame dimensions:
    /// `fx = width`, `fy = height`, principal point at the frame center.
    ///
    /// Good enough for orientation readouts; callers needing metric accuracy
    /// should supply calibrated intrinsics through
    /// [`PoseParams`](crate::PoseParams) instead.
    pub fn assume_from_frame(width: usize, height: usize) -> Self {
        Self {
            fx: width as f64,
            fy: height as f64,
            cx: (width / 2) as f64,
            cy: (height / 2) as f64,
        }
    }
}

/// Estimated marker pose relative to the camera.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PoseEstimate {
    /// Rotation of the tag relative to the camera.
    pub rotation: Matrix3<f64>,
}

/// Failures reported by an engine while building detector resources.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine has no constructor for family {0}")]
    FamilyUnavailable(TagFamily),

    #[error("engine failed to create family {0}")]
    FamilyCreate(TagFamily),

    #[error("engine failed to create a detector for family {0}")]
    DetectorCreate(TagFamily),
}

/// External quad-detection and pose-estimation engine.
///
/// `Family` and `Detector` are engine-owned resources. Implementations bind
/// the matching destructor at construction, so dropping a value releases the
/// engine resource on every exit path; no resource ever outlives its paired
/// release capability.
pub trait TagEngine {
    type Family;
    type Detector;

    /// Construct the engine resource backing `family`.
    fn create_family(&mut self, family: TagFamily) -> Result<Self::Family, EngineError>;

    /// Build a detector over `family`, registered with `config.error_bits`
    /// and configured with its decimation factor, blur sigma and worker
    /// thread count.
    fn create_detector(
        &mut self,
        family: &Self::Family,
        config: &DetectorConfig,
    ) -> Result<Self::Detector, EngineError>;

    /// Run detection over the luma view (`stride == width`).
    ///
    /// The returned detections are a fresh snapshot: any engine-owned
    /// per-detection resources are released before this call returns.
    fn detect(&mut self, detector: &mut Self::Detector, image: &LumaView<'_>) -> Vec<RawDetection>;

    /// Estimate the pose of one detection under the given pinhole model and
    /// physical tag edge length.
    fn estimate_pose(
        &self,
        detection: &RawDetection,
        intrinsics: &CameraIntrinsics,
        tag_size: f64,
    ) -> PoseEstimate;
}
