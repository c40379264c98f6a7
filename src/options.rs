use std::{env, path::PathBuf};

use crate::error::Error;

/// Name of the environment variable overriding the default model directory.
const ENV_VAR_MODEL_DIR: &str = "HANDMARK_MODEL_DIR";

const DEFAULT_MODEL_DIR: &str = "models";

/// Configuration of a [`HandDetector`][crate::HandDetector] and its landmark engine.
///
/// # Example
///
/// ```
/// use handmark::HandDetectorOptions;
///
/// let options = HandDetectorOptions::default()
///     .static_mode(true)
///     .max_hands(1)
///     .detection_confidence(0.7);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct HandDetectorOptions {
    pub(crate) static_mode: bool,
    pub(crate) max_hands: usize,
    pub(crate) detection_confidence: f32,
    pub(crate) tracking_confidence: f32,
    pub(crate) model_dir: PathBuf,
    pub(crate) full_models: bool,
}

impl Default for HandDetectorOptions {
    fn default() -> Self {
        let model_dir = match env::var_os(ENV_VAR_MODEL_DIR) {
            Some(dir) => {
                log::debug!(
                    "model directory override: `{}` is set to '{}'",
                    ENV_VAR_MODEL_DIR,
                    dir.to_string_lossy(),
                );
                PathBuf::from(dir)
            }
            None => PathBuf::from(DEFAULT_MODEL_DIR),
        };
        Self {
            static_mode: false,
            max_hands: 2,
            detection_confidence: 0.5,
            tracking_confidence: 0.5,
            model_dir,
            full_models: true,
        }
    }
}

impl HandDetectorOptions {
    /// Treat every image as unrelated to the previous one.
    ///
    /// By default, images are assumed to be consecutive frames of a video, and hands found in one
    /// frame are tracked into the next instead of being detected from scratch.
    #[inline]
    pub fn static_mode(mut self, static_mode: bool) -> Self {
        self.static_mode = static_mode;
        self
    }

    /// Sets the maximum number of hands to detect in one image. Must be at least 1.
    #[inline]
    pub fn max_hands(mut self, max_hands: usize) -> Self {
        self.max_hands = max_hands;
        self
    }

    /// Sets the minimum palm detection score (0.0 to 1.0) for a hand to be detected.
    #[inline]
    pub fn detection_confidence(mut self, confidence: f32) -> Self {
        self.detection_confidence = confidence;
        self
    }

    /// Sets the minimum landmark presence score (0.0 to 1.0) for a hand to keep being tracked.
    #[inline]
    pub fn tracking_confidence(mut self, confidence: f32) -> Self {
        self.tracking_confidence = confidence;
        self
    }

    /// Sets the directory the ONNX models are loaded from.
    ///
    /// Defaults to the value of `HANDMARK_MODEL_DIR`, or `models` if that is unset.
    #[inline]
    pub fn model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = dir.into();
        self
    }

    /// Selects between the full (more accurate) and lite (faster) network variants.
    #[inline]
    pub fn full_models(mut self, full: bool) -> Self {
        self.full_models = full;
        self
    }

    /// Checks that all values are within their allowed ranges.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_hands == 0 {
            return Err(Error::invalid_option("`max_hands` must be at least 1"));
        }
        for (name, value) in [
            ("detection_confidence", self.detection_confidence),
            ("tracking_confidence", self.tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::invalid_option(format!(
                    "`{name}` must be between 0.0 and 1.0, got {value}"
                )));
            }
        }
        Ok(())
    }
}
