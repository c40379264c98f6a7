//! The landmark engine interface.

use image::RgbImage;

use crate::landmark::Hand;

/// A hand detection and landmark estimation backend.
///
/// Implementations are configured when they are created (see
/// [`HandDetectorOptions`][crate::HandDetectorOptions]) and then fed one image at a time. An
/// engine may keep state between calls, for example to track hands across the frames of a video.
///
/// The crate provides [`OnnxEngine`][crate::onnx::OnnxEngine], which runs pretrained palm detection
/// and hand landmark networks.
pub trait LandmarkEngine {
    /// Finds all hands in `image` and estimates their landmarks.
    ///
    /// `image` is always in RGB channel order. Finding no hands is not an error and returns an
    /// empty list.
    fn process(&mut self, image: &RgbImage) -> anyhow::Result<Vec<Hand>>;
}

impl<E: LandmarkEngine + ?Sized> LandmarkEngine for &mut E {
    fn process(&mut self, image: &RgbImage) -> anyhow::Result<Vec<Hand>> {
        (**self).process(image)
    }
}

impl<E: LandmarkEngine + ?Sized> LandmarkEngine for Box<E> {
    fn process(&mut self, image: &RgbImage) -> anyhow::Result<Vec<Hand>> {
        (**self).process(image)
    }
}
