use crate::landmark::NUM_LANDMARKS;

/// Errors returned by [`HandDetector`][crate::HandDetector] and the image types.
///
/// "Nothing was detected" is never reported through this type. See the crate documentation for
/// how those cases are handled.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The image passed in is unusable (zero-sized, wrong channel count, truncated buffer).
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// A landmark index outside of the hand's landmark range was requested.
    #[error("landmark index {index} is out of range (hands have {count} landmarks)")]
    LandmarkOutOfRange { index: usize, count: usize },

    /// A [`HandDetectorOptions`][crate::HandDetectorOptions] value is out of range.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// The landmark engine failed to process an image or could not be created.
    #[error(transparent)]
    Engine(#[from] anyhow::Error),
}

/// Result type alias using [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn invalid_image(msg: impl Into<String>) -> Self {
        Self::InvalidImage(msg.into())
    }

    pub(crate) fn invalid_option(msg: impl Into<String>) -> Self {
        Self::InvalidOption(msg.into())
    }

    pub(crate) fn landmark_out_of_range(index: usize) -> Self {
        Self::LandmarkOutOfRange {
            index,
            count: NUM_LANDMARKS,
        }
    }

    /// Returns whether this error was caused by the caller passing an invalid argument, as opposed
    /// to a failure inside the landmark engine.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::InvalidImage(_) | Self::LandmarkOutOfRange { .. } | Self::InvalidOption(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_argument_errors() {
        assert!(Error::invalid_image("0x0").is_invalid_argument());
        assert!(Error::landmark_out_of_range(21).is_invalid_argument());
        assert!(Error::invalid_option("max_hands").is_invalid_argument());
        assert!(!Error::Engine(anyhow::anyhow!("inference failed")).is_invalid_argument());
    }

    #[test]
    fn out_of_range_message() {
        let msg = Error::landmark_out_of_range(25).to_string();
        assert_eq!(
            msg,
            "landmark index 25 is out of range (hands have 21 landmarks)"
        );
    }
}
