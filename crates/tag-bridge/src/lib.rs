//! Camera-frame conversion and detector lifecycle for fiducial tag bridges.
//!
//! This crate is the safe half of a native bridge between a camera pipeline
//! and an external fiducial-marker engine. It owns the pieces that must be
//! exactly right at the boundary:
//!
//! - [`yuv_to_rgba_rotated`]: fixed-point NV21 -> rotated RGBA conversion,
//!   run once per frame at video rate.
//! - [`DetectorContext`]: the single live detector configuration, with
//!   teardown-then-create reconfiguration and lazy defaults.
//! - [`TagEngine`]: the capability seam to the external detection and
//!   pose-estimation engine. No detection algorithm lives here.
//!
//! The C ABI surface exposed to managed runtimes lives in `tag-bridge-ffi`.
//!
//! ```
//! use tag_bridge::{yuv_to_rgba_rotated, Nv21Frame, RgbaSurfaceMut, SurfaceFormat};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let frame_bytes = vec![128u8; 6 * 4 * 3 / 2];
//! let frame = Nv21Frame::new(&frame_bytes, 6, 4)?;
//!
//! let mut pixels = vec![0u32; 6 * 4];
//! let mut surface = RgbaSurfaceMut::new(&mut pixels, 6, 4, SurfaceFormat::Rgba8888)?;
//! yuv_to_rgba_rotated(&frame, &mut surface)?;
//! # Ok(())
//! # }
//! ```

mod context;
mod convert;
mod engine;
mod family;
mod image;
pub mod logger;

pub use context::{Detection, DetectorConfig, DetectorContext, PoseParams};
pub use convert::{yuv_to_rgba_rotated, ConvertError, RgbaSurfaceMut, SurfaceFormat};
pub use engine::{CameraIntrinsics, EngineError, PoseEstimate, RawDetection, TagEngine};
pub use family::{TagFamily, UnknownFamily};
pub use image::{ImageError, LumaView, Nv21Frame};
