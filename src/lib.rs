//! Hand landmark detection session.
//!
//! The central type is [`HandDetector`], which owns a single [`LandmarkEngine`] and caches the
//! results of the most recent detection. On top of those results it offers a few geometric
//! helpers: pixel-space landmark lists and bounding boxes, a "which fingers are up" heuristic, and
//! landmark-to-landmark distances.
//!
//! # Coordinates
//!
//! Landmark engines report *normalized* coordinates: X and Y are in range 0.0 to 1.0, relative to
//! the width and height of the input image, with Y pointing *down*. [`HandDetector::find_position`]
//! projects them into integer pixel coordinates of the image passed to it.
//!
//! # Soft failures
//!
//! Empty frames are routine when processing live video, so "nothing was detected" is never an
//! error. Operations that have nothing to work with return empty lists, [`None`], or a zero
//! distance. Contract violations (a zero-sized image, a landmark index outside of `0..21`) are
//! reported as [`Error`]s instead.
//!
//! # Environment Variables
//!
//! * `HANDMARK_MODEL_DIR`: Default directory the [`OnnxEngine`] loads its networks from. If unset,
//!   `models` (relative to the working directory) is used.
//!
//! [`OnnxEngine`]: onnx::OnnxEngine

use log::LevelFilter;

pub mod detection;
pub mod detector;
pub mod engine;
mod error;
pub mod image;
pub mod iter;
pub mod landmark;
pub mod nn;
pub mod num;
pub mod onnx;
mod options;
pub mod palm;
pub mod roi;

pub use detector::{Distance, Finger, Fingers, HandDetector, Segment};
pub use engine::LandmarkEngine;
pub use error::{Error, Result};
pub use options::HandDetectorOptions;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .filter(Some("tract_core"), LevelFilter::Warn)
        .filter(Some("tract_onnx"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and handmark will log at *trace*
/// level. Otherwise, they will log at *debug* level.
///
/// `tract` will always log at *warn* level. `RUST_LOG` can be used to override any of this.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
