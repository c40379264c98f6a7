//! Non-Maximum Suppression and Averaging.
//!
//! The palm detector produces many overlapping candidates for every hand in view. Non-Maximum
//! Suppression (NMS) filters these duplicates out, leaving a single detection for each hand.
//!
//! Two variants are available, selected with [`SuppressionMode`]: classic suppression, which
//! discards every less confident overlapping detection ([`SuppressionMode::Remove`]), and
//! Non-Maximum Averaging ([`SuppressionMode::Average`]), which merges overlapping detections into
//! a confidence-weighted average. Averaging reduces jitter between video frames and is the
//! default.

use crate::{iter::zip_exact, num::TotalF32};

use super::{BoundingRect, Detection, Keypoint};

/// A non-maximum suppression algorithm.
pub struct NonMaxSuppression {
    seed_thresh: f32,
    iou_thresh: f32,
    avg_buf: Vec<Detection>,
    out_buf: Vec<Detection>,
    mode: SuppressionMode,
}

impl NonMaxSuppression {
    /// The default intersection-over-union threshold used to determine if two detections overlap.
    pub const DEFAULT_IOU_THRESH: f32 = 0.3;

    /// Creates a new non-maximum suppressor using [`SuppressionMode::Average`].
    ///
    /// `seed_thresh` is the confidence a detection needs to "seed" an NMS round. Less confident
    /// detections are dropped unless they get merged into a more confident one.
    pub fn new(seed_thresh: f32) -> Self {
        Self {
            seed_thresh,
            iou_thresh: Self::DEFAULT_IOU_THRESH,
            avg_buf: Vec::new(),
            out_buf: Vec::new(),
            mode: SuppressionMode::Average,
        }
    }

    /// Sets the intersection-over-union threshold to consider two detections as overlapping.
    ///
    /// By default, [`Self::DEFAULT_IOU_THRESH`] is used.
    pub fn set_iou_thresh(&mut self, iou_thresh: f32) {
        self.iou_thresh = iou_thresh;
    }

    pub fn set_mode(&mut self, mode: SuppressionMode) {
        self.mode = mode;
    }

    /// Runs the suppression algorithm on `detections`, consuming them.
    ///
    /// The surviving detections are yielded in descending order of confidence.
    pub fn process(
        &mut self,
        detections: &mut Vec<Detection>,
    ) -> impl Iterator<Item = Detection> + '_ {
        self.out_buf.clear();

        // Sort by ascending confidence, process highest confidence first by starting at the back.
        detections.sort_unstable_by_key(|det| TotalF32(det.confidence()));

        while let Some(seed) = detections.pop() {
            if seed.confidence() < self.seed_thresh {
                // no more significant detections left
                break;
            }

            let seed_rect = seed.bounding_rect();
            let iou_thresh = self.iou_thresh;
            match self.mode {
                SuppressionMode::Remove => {
                    detections.retain(|other| seed_rect.iou(&other.bounding_rect()) < iou_thresh);
                    self.out_buf.push(seed);
                }
                SuppressionMode::Average => {
                    self.avg_buf.clear();
                    let avg_buf = &mut self.avg_buf;
                    detections.retain(|other| {
                        if seed_rect.iou(&other.bounding_rect()) >= iou_thresh {
                            avg_buf.push(other.clone());
                            false
                        } else {
                            true
                        }
                    });

                    let merged = weighted_average(&seed, &self.avg_buf);
                    self.out_buf.push(merged);
                }
            }
        }

        detections.clear();
        self.avg_buf.clear();
        self.out_buf.drain(..)
    }
}

/// Computes the confidence-weighted average of `seed` and the detections overlapping it.
///
/// The result keeps the seed's confidence.
fn weighted_average(seed: &Detection, overlapping: &[Detection]) -> Detection {
    let mut xc = 0.0;
    let mut yc = 0.0;
    let mut w = 0.0;
    let mut h = 0.0;
    let mut keypoints = vec![(0.0, 0.0); seed.keypoints().len()];
    let mut divisor = 0.0;

    for det in std::iter::once(seed).chain(overlapping) {
        let factor = det.confidence();
        divisor += factor;

        let rect = det.bounding_rect();
        let (x, y) = rect.center();
        xc += x * factor;
        yc += y * factor;
        w += rect.width() * factor;
        h += rect.height() * factor;

        for (acc, kp) in zip_exact(keypoints.iter_mut(), det.keypoints()) {
            acc.0 += kp.x() * factor;
            acc.1 += kp.y() * factor;
        }
    }

    if divisor <= 0.0 {
        return seed.clone();
    }

    Detection::with_keypoints(
        seed.confidence(),
        BoundingRect::from_center(xc / divisor, yc / divisor, w / divisor, h / divisor),
        keypoints
            .into_iter()
            .map(|(x, y)| Keypoint::new(x / divisor, y / divisor))
            .collect(),
    )
}

/// Describes how [`NonMaxSuppression`] should deal with overlapping detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SuppressionMode {
    /// Remove overlapping detections, only retain the detection with highest confidence score.
    Remove,

    /// Compute a confidence-weighted average of overlapping detections.
    Average,
}
