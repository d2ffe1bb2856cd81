//! Detector lifecycle and per-frame detection.

use log::info;
use nalgebra::{Matrix3, Point2};
use serde::{Deserialize, Serialize};

use crate::engine::{CameraIntrinsics, EngineError, TagEngine};
use crate::family::TagFamily;
use crate::image::LumaView;

/// Detector configuration. Exactly one is live per context.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Marker family the detector decodes.
    pub family: TagFamily,
    /// Error-correction bits accepted when decoding payloads. Large values
    /// sharply increase the false-positive rate.
    pub error_bits: i32,
    /// Downsampling factor applied before quad detection.
    pub decimate: f32,
    /// Gaussian blur sigma applied to the decimated image.
    pub sigma: f32,
    /// Worker threads used inside the engine.
    pub threads: i32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            family: TagFamily::Tag36h11,
            error_bits: 2,
            decimate: 2.0,
            sigma: 0.0,
            threads: 4,
        }
    }
}

/// Pose-estimation inputs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseParams {
    /// Physical tag edge length, in the caller's length units.
    pub tag_size: f64,
    /// Calibrated intrinsics. `None` falls back to
    /// [`CameraIntrinsics::assume_from_frame`] for every frame.
    pub intrinsics: Option<CameraIntrinsics>,
}

impl Default for PoseParams {
    fn default() -> Self {
        Self {
            tag_size: 0.06,
            intrinsics: None,
        }
    }
}

/// One decoded marker with its estimated pose.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Detection {
    pub id: i32,
    pub hamming: i32,
    pub center: Point2<f64>,
    /// Corners in the engine's fixed order, image pixel coordinates.
    pub corners: [Point2<f64>; 4],
    /// Rotation of the tag relative to the camera.
    pub pose: Matrix3<f64>,
}

impl Detection {
    /// Corner coordinates flattened as `[x0, y0, x1, y1, x2, y2, x3, y3]`.
    pub fn corners_flat(&self) -> [f64; 8] {
        let c = &self.corners;
        [
            c[0].x, c[0].y, c[1].x, c[1].y, c[2].x, c[2].y, c[3].x, c[3].y,
        ]
    }

    /// Row-major flattening of the rotation matrix.
    pub fn pose_row_major(&self) -> [f64; 9] {
        let r = &self.pose;
        [
            r[(0, 0)],
            r[(0, 1)],
            r[(0, 2)],
            r[(1, 0)],
            r[(1, 1)],
            r[(1, 2)],
            r[(2, 0)],
            r[(2, 1)],
            r[(2, 2)],
        ]
    }

    /// X-axis rotation angle in degrees, normalized to `[0, 360)`.
    pub fn pitch_degrees(&self) -> f64 {
        let r11 = self.pose[(0, 0)];
        let r21 = self.pose[(1, 0)];
        let r31 = self.pose[(2, 0)];
        normalize_degrees((-r31).atan2((r11 * r11 + r21 * r21).sqrt()))
    }

    /// Y-axis rotation angle in degrees, normalized to `[0, 360)`.
    pub fn roll_degrees(&self) -> f64 {
        let r21 = self.pose[(1, 0)];
        let r22 = self.pose[(1, 1)];
        normalize_degrees(r21.atan2(r22))
    }
}

fn normalize_degrees(radians: f64) -> f64 {
    let degrees = radians.to_degrees();
    if degrees < 0.0 {
        degrees + 360.0
    } else {
        degrees
    }
}

// Field order matters: the detector must drop before the family it references.
struct Live<E: TagEngine> {
    detector: E::Detector,
    family: E::Family,
    config: DetectorConfig,
}

/// Owns the engine and at most one live detector configuration.
///
/// Reconfiguration is teardown-then-create: the previous detector and family
/// are released before their replacements are built, and a mid-create failure
/// leaves the context uninitialized with everything already created released.
///
/// The context is deliberately not internally synchronized; callers invoking
/// it from multiple threads wrap it in a guard (the C bridge surface does).
pub struct DetectorContext<E: TagEngine> {
    engine: E,
    live: Option<Live<E>>,
    pose: PoseParams,
}

impl<E: TagEngine> DetectorContext<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            live: None,
            pose: PoseParams::default(),
        }
    }

    pub fn with_pose_params(mut self, pose: PoseParams) -> Self {
        self.pose = pose;
        self
    }

    pub fn pose_params(&self) -> &PoseParams {
        &self.pose
    }

    pub fn set_pose_params(&mut self, pose: PoseParams) {
        self.pose = pose;
    }

    /// Currently live configuration, if any.
    pub fn config(&self) -> Option<&DetectorConfig> {
        self.live.as_ref().map(|live| &live.config)
    }

    /// Replace any live detector with one built from `config`.
    pub fn configure(&mut self, config: DetectorConfig) -> Result<(), EngineError> {
        // Old detector drops before the family it references.
        self.live = None;
        let family = self.engine.create_family(config.family)?;
        let detector = self.engine.create_detector(&family, &config)?;
        self.live = Some(Live {
            detector,
            family,
            config,
        });
        Ok(())
    }

    /// Release any live detector configuration.
    pub fn teardown(&mut self) {
        self.live = None;
    }

    /// Detect markers in `image` and estimate one pose per detection.
    ///
    /// When no configuration is live, the documented defaults are configured
    /// first. Detections are returned in the engine's order.
    pub fn detect(&mut self, image: &LumaView<'_>) -> Result<Vec<Detection>, EngineError> {
        if self.live.is_none() {
            let config = DetectorConfig::default();
            info!(
                "no detector configured, using defaults (family={}, error_bits={}, decimate={}, sigma={}, threads={})",
                config.family, config.error_bits, config.decimate, config.sigma, config.threads
            );
            self.configure(config)?;
        }
        let Some(live) = self.live.as_mut() else {
            return Ok(Vec::new());
        };

        let intrinsics = self
            .pose
            .intrinsics
            .unwrap_or_else(|| CameraIntrinsics::assume_from_frame(image.width(), image.height()));

        let raw = self.engine.detect(&mut live.detector, image);
        let mut detections = Vec::with_capacity(raw.len());
        for det in raw {
            let pose = self
                .engine
                .estimate_pose(&det, &intrinsics, self.pose.tag_size);
            detections.push(Detection {
                id: det.id,
                hamming: det.hamming,
                center: det.center,
                corners: det.corners,
                pose: pose.rotation,
            });
        }
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::f64::consts::FRAC_PI_2;
    use std::rc::Rc;

    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Point2, Rotation3, Vector3};

    use super::*;
    use crate::engine::{PoseEstimate, RawDetection};

    #[derive(Default)]
    struct EngineStats {
        events: Vec<String>,
        families_live: usize,
        detectors_live: usize,
        fail_detector_create: bool,
        detections: Vec<RawDetection>,
        last_intrinsics: Option<CameraIntrinsics>,
        last_tag_size: Option<f64>,
    }

    struct MockFamily {
        family: TagFamily,
        stats: Rc<RefCell<EngineStats>>,
    }

    impl Drop for MockFamily {
        fn drop(&mut self) {
            let mut stats = self.stats.borrow_mut();
            stats.families_live -= 1;
            stats.events.push(format!("drop family {}", self.family));
        }
    }

    struct MockDetector {
        stats: Rc<RefCell<EngineStats>>,
    }

    impl Drop for MockDetector {
        fn drop(&mut self) {
            let mut stats = self.stats.borrow_mut();
            stats.detectors_live -= 1;
            stats.events.push("drop detector".to_owned());
        }
    }

    struct MockEngine {
        stats: Rc<RefCell<EngineStats>>,
    }

    impl MockEngine {
        fn new() -> (Self, Rc<RefCell<EngineStats>>) {
            let stats = Rc::new(RefCell::new(EngineStats::default()));
            (
                Self {
                    stats: Rc::clone(&stats),
                },
                stats,
            )
        }
    }

    impl TagEngine for MockEngine {
        type Family = MockFamily;
        type Detector = MockDetector;

        fn create_family(&mut self, family: TagFamily) -> Result<Self::Family, EngineError> {
            let mut stats = self.stats.borrow_mut();
            stats.families_live += 1;
            stats.events.push(format!("create family {family}"));
            Ok(MockFamily {
                family,
                stats: Rc::clone(&self.stats),
            })
        }

        fn create_detector(
            &mut self,
            family: &Self::Family,
            _config: &DetectorConfig,
        ) -> Result<Self::Detector, EngineError> {
            let mut stats = self.stats.borrow_mut();
            if stats.fail_detector_create {
                return Err(EngineError::DetectorCreate(family.family));
            }
            stats.detectors_live += 1;
            stats.events.push("create detector".to_owned());
            Ok(MockDetector {
                stats: Rc::clone(&self.stats),
            })
        }

        fn detect(
            &mut self,
            _detector: &mut Self::Detector,
            _image: &LumaView<'_>,
        ) -> Vec<RawDetection> {
            self.stats.borrow().detections.clone()
        }

        fn estimate_pose(
            &self,
            detection: &RawDetection,
            intrinsics: &CameraIntrinsics,
            tag_size: f64,
        ) -> PoseEstimate {
            let mut stats = self.stats.borrow_mut();
            stats.last_intrinsics = Some(*intrinsics);
            stats.last_tag_size = Some(tag_size);
            PoseEstimate {
                rotation: Matrix3::identity() * f64::from(detection.id),
            }
        }
    }

    fn raw(id: i32) -> RawDetection {
        RawDetection {
            id,
            hamming: id % 3,
            center: Point2::new(f64::from(id), f64::from(id) + 0.5),
            corners: [
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(1.0, 1.0),
                Point2::new(0.0, 1.0),
            ],
        }
    }

    fn luma_frame() -> Vec<u8> {
        vec![0u8; 64 * 48]
    }

    #[test]
    fn reconfigure_leaves_exactly_one_live_context() {
        let (engine, stats) = MockEngine::new();
        let mut ctx = DetectorContext::new(engine);

        for family in [TagFamily::Tag36h11, TagFamily::Tag16h5, TagFamily::Tag25h9] {
            ctx.configure(DetectorConfig {
                family,
                ..DetectorConfig::default()
            })
            .expect("configure");
            assert_eq!(stats.borrow().families_live, 1);
            assert_eq!(stats.borrow().detectors_live, 1);
        }
        assert_eq!(ctx.config().map(|c| c.family), Some(TagFamily::Tag25h9));

        drop(ctx);
        assert_eq!(stats.borrow().families_live, 0);
        assert_eq!(stats.borrow().detectors_live, 0);
    }

    #[test]
    fn teardown_releases_detector_before_family() {
        let (engine, stats) = MockEngine::new();
        let mut ctx = DetectorContext::new(engine);
        ctx.configure(DetectorConfig::default()).expect("configure");
        ctx.teardown();

        let events = stats.borrow().events.clone();
        assert_eq!(
            events,
            vec![
                "create family tag36h11",
                "create detector",
                "drop detector",
                "drop family tag36h11",
            ]
        );
        assert!(ctx.config().is_none());
    }

    #[test]
    fn failed_create_releases_the_new_family() {
        let (engine, stats) = MockEngine::new();
        let mut ctx = DetectorContext::new(engine);
        stats.borrow_mut().fail_detector_create = true;

        let err = ctx.configure(DetectorConfig::default()).unwrap_err();
        assert_eq!(err, EngineError::DetectorCreate(TagFamily::Tag36h11));
        assert!(ctx.config().is_none());
        assert_eq!(stats.borrow().families_live, 0);
        assert_eq!(stats.borrow().detectors_live, 0);
    }

    #[test]
    fn detect_without_configure_uses_defaults() {
        let (engine, _stats) = MockEngine::new();
        let mut ctx = DetectorContext::new(engine);

        let buf = luma_frame();
        let image = LumaView::new(&buf, 64, 48).unwrap();
        let detections = ctx.detect(&image).expect("detect");
        assert!(detections.is_empty());
        assert_eq!(ctx.config(), Some(&DetectorConfig::default()));
    }

    #[test]
    fn detect_preserves_engine_order_and_estimates_each_pose() {
        let (engine, stats) = MockEngine::new();
        stats.borrow_mut().detections = vec![raw(5), raw(2), raw(9)];
        let mut ctx = DetectorContext::new(engine);

        let buf = luma_frame();
        let image = LumaView::new(&buf, 64, 48).unwrap();
        let detections = ctx.detect(&image).expect("detect");

        let ids: Vec<i32> = detections.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![5, 2, 9]);
        for det in &detections {
            assert_relative_eq!(det.pose[(0, 0)], f64::from(det.id));
        }
        // Pinhole fallback comes from the frame dimensions.
        assert_eq!(
            stats.borrow().last_intrinsics,
            Some(CameraIntrinsics::assume_from_frame(64, 48))
        );
        assert_eq!(stats.borrow().last_tag_size, Some(0.06));
    }

    #[test]
    fn calibrated_intrinsics_override_the_frame_fallback() {
        let (engine, stats) = MockEngine::new();
        stats.borrow_mut().detections = vec![raw(1)];
        let calibrated = CameraIntrinsics {
            fx: 812.5,
            fy: 811.9,
            cx: 310.2,
            cy: 242.8,
        };
        let mut ctx = DetectorContext::new(engine).with_pose_params(PoseParams {
            tag_size: 0.1,
            intrinsics: Some(calibrated),
        });

        let buf = luma_frame();
        let image = LumaView::new(&buf, 64, 48).unwrap();
        ctx.detect(&image).expect("detect");

        assert_eq!(stats.borrow().last_intrinsics, Some(calibrated));
        assert_eq!(stats.borrow().last_tag_size, Some(0.1));
    }

    #[test]
    fn pose_row_major_flattens_rows_first() {
        let det = Detection {
            id: 0,
            hamming: 0,
            center: Point2::origin(),
            corners: [Point2::origin(); 4],
            pose: Matrix3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0),
        };
        assert_eq!(
            det.pose_row_major(),
            [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]
        );
        assert_eq!(det.corners_flat(), [0.0; 8]);
    }

    #[test]
    fn pitch_and_roll_read_the_rotation_matrix() {
        let upright = Detection {
            id: 0,
            hamming: 0,
            center: Point2::origin(),
            corners: [Point2::origin(); 4],
            pose: Matrix3::identity(),
        };
        assert_relative_eq!(upright.pitch_degrees(), 0.0);
        assert_relative_eq!(upright.roll_degrees(), 0.0);

        let rolled = Detection {
            pose: *Rotation3::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2).matrix(),
            ..upright.clone()
        };
        assert_relative_eq!(rolled.roll_degrees(), 90.0, epsilon = 1e-9);

        let pitched = Detection {
            pose: *Rotation3::from_axis_angle(&Vector3::y_axis(), -0.3).matrix(),
            ..upright
        };
        // Negative angles normalize into [0, 360).
        assert!(pitched.pitch_degrees() > 180.0);
        assert!(pitched.pitch_degrees() < 360.0);
    }
}
