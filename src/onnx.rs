//! Hand tracking using the ONNX palm detection and hand landmark networks.
//!
//! Every image goes through two stages:
//!
//! 1. The palm detector finds palms in the whole image. Each palm is turned into a rotated
//!    region of interest ([`Roi`]) that should contain the entire hand.
//! 2. The landmark network estimates the 21 hand landmarks inside each region, along with a
//!    presence score and the handedness.
//!
//! Outside of static mode, the landmarks of one frame determine the regions for the next, and
//! palm detection only runs while fewer than the maximum number of hands are being tracked.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use image::RgbImage;
use nalgebra::Point2;

use crate::{
    detection::Detection,
    engine::LandmarkEngine,
    image::Resolution,
    iter::zip_exact,
    landmark::{Hand, Handedness, NormalizedLandmark, NUM_LANDMARKS},
    nn::{Cnn, NeuralNetwork},
    options::HandDetectorOptions,
    palm::PalmDetector,
    roi::Roi,
};

/// Regions overlapping at least this much are assumed to contain the same hand.
const SAME_HAND_IOU: f32 = 0.3;

/// Values per landmark in the landmark network output (X, Y and Z).
const LANDMARK_DIMS: usize = 3;

/// A [`LandmarkEngine`] running the palm detection and hand landmark networks on the CPU.
pub struct OnnxEngine {
    palm: PalmDetector,
    landmarker: Cnn,
    tracker: HandTracker,
    regions: Vec<Roi>,
}

impl OnnxEngine {
    /// Loads both networks from the configured model directory.
    ///
    /// The files are called `palm_detection_<variant>.onnx` and `hand_landmark_<variant>.onnx`,
    /// where `<variant>` is either `full` or `lite`.
    pub fn new(options: &HandDetectorOptions) -> anyhow::Result<Self> {
        let (palm_path, landmark_path) = model_paths(&options.model_dir, options.full_models);
        log::debug!(
            "loading hand tracking networks from '{}'",
            options.model_dir.display()
        );

        let palm_nn = NeuralNetwork::load(&palm_path).context("palm detection network")?;
        let landmark_nn = NeuralNetwork::load(&landmark_path).context("hand landmark network")?;
        let palm = PalmDetector::new(palm_nn, options.detection_confidence)?;
        let landmarker = Cnn::new(landmark_nn)?;

        Ok(Self {
            palm,
            landmarker,
            tracker: HandTracker::new(options),
            regions: Vec::new(),
        })
    }

    /// Returns the regions the landmark network was run on for the last successfully processed
    /// image, including regions that turned out not to contain a hand.
    pub fn regions(&self) -> &[Roi] {
        &self.regions
    }

    /// Forgets all tracked hands, so that the next image is searched from scratch.
    pub fn reset(&mut self) {
        self.tracker.reset();
    }

    fn estimate_landmarks(&self, image: &RgbImage, roi: &Roi) -> anyhow::Result<Estimate> {
        let input_res = self.landmarker.input_resolution();
        let crop = roi.extract(image, input_res);
        let outputs = self.landmarker.estimate(&crop)?;

        let mut landmarks = None;
        let mut scalars = Vec::new();
        for index in 0..outputs.len() {
            let data = outputs.as_slice(index)?;
            match data.len() {
                len if len == NUM_LANDMARKS * LANDMARK_DIMS => {
                    // the first landmark output is in crop pixels, a second one in world units
                    landmarks.get_or_insert(data);
                }
                1 => scalars.push(data[0]),
                _ => log::trace!(
                    "ignoring landmark network output of shape {:?}",
                    outputs.shape(index)?
                ),
            }
        }

        let (landmarks, presence, handedness) = match (landmarks, scalars.as_slice()) {
            (Some(landmarks), [presence, handedness, ..]) => (landmarks, *presence, *handedness),
            _ => bail!(
                "hand landmark network '{}' must output {} landmark values, a presence score, \
                 and a handedness score",
                self.landmarker.network().name(),
                NUM_LANDMARKS * LANDMARK_DIMS,
            ),
        };

        let image_res = Resolution::new(image.width(), image.height());
        Ok(Estimate::decode(
            landmarks, presence, handedness, roi, input_res, image_res,
        ))
    }
}

impl LandmarkEngine for OnnxEngine {
    /// Finds hands in `image`.
    ///
    /// If either network fails, the error is returned and the tracking state is left as it was
    /// after the previous image.
    fn process(&mut self, image: &RgbImage) -> anyhow::Result<Vec<Hand>> {
        let mut candidates = self.tracker.carried_over();
        if self.tracker.wants_palms(&candidates) {
            let palms = self.palm.detect(image)?;
            self.tracker.add_palms(&mut candidates, &palms);
        }

        let mut estimates = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let estimate = self.estimate_landmarks(image, &candidate.roi)?;
            estimates.push((candidate, estimate));
        }

        self.regions = estimates.iter().map(|(c, _)| c.roi).collect();
        let hands = self.tracker.finish_frame(estimates);
        log::trace!(
            "{} hand(s) found, {} tracked into the next frame",
            hands.len(),
            self.tracker.tracked.len()
        );
        Ok(hands)
    }
}

/// A region the landmark network is run on.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    roi: Roi,
    /// Whether the region was derived from the previous frame's landmarks (as opposed to a palm
    /// detection in the current frame).
    tracked: bool,
}

/// Picks the regions to estimate landmarks in, and decides which hands are kept and followed into
/// the next frame.
///
/// The tracked regions only change in [`HandTracker::finish_frame`], so a frame that fails half
/// way through does not affect tracking.
#[derive(Debug)]
struct HandTracker {
    static_mode: bool,
    max_hands: usize,
    detection_confidence: f32,
    tracking_confidence: f32,
    tracked: Vec<Roi>,
}

impl HandTracker {
    fn new(options: &HandDetectorOptions) -> Self {
        Self {
            static_mode: options.static_mode,
            max_hands: options.max_hands,
            detection_confidence: options.detection_confidence,
            tracking_confidence: options.tracking_confidence,
            tracked: Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.tracked.clear();
    }

    /// Returns the regions followed from the previous frame. Always empty in static mode.
    fn carried_over(&self) -> Vec<Candidate> {
        if self.static_mode {
            return Vec::new();
        }
        self.tracked
            .iter()
            .map(|&roi| Candidate { roi, tracked: true })
            .collect()
    }

    /// Palm detection is only needed while fewer than `max_hands` hands are known.
    fn wants_palms(&self, candidates: &[Candidate]) -> bool {
        candidates.len() < self.max_hands
    }

    /// Adds the regions of detected `palms` (most confident first) to `candidates`, up to a total
    /// of `max_hands`. Palms whose region overlaps an existing candidate are skipped.
    fn add_palms(&self, candidates: &mut Vec<Candidate>, palms: &[Detection]) {
        for palm in palms {
            if candidates.len() >= self.max_hands {
                break;
            }
            let roi = match Roi::from_palm(palm) {
                Some(roi) => roi,
                None => continue,
            };
            if candidates.iter().any(|c| c.roi.iou(&roi) >= SAME_HAND_IOU) {
                // already tracked
                continue;
            }
            candidates.push(Candidate {
                roi,
                tracked: false,
            });
        }
    }

    /// Filters the landmark estimates by presence, and replaces the tracked regions with the
    /// ones derived from the surviving hands.
    fn finish_frame(&mut self, estimates: Vec<(Candidate, Estimate)>) -> Vec<Hand> {
        let mut next = Vec::new();
        let mut hands = Vec::with_capacity(estimates.len());
        for (candidate, estimate) in estimates {
            let threshold = if candidate.tracked {
                self.tracking_confidence
            } else {
                self.detection_confidence
            };
            if estimate.hand.presence() < threshold {
                log::trace!(
                    "dropping {} hand with presence {:.3} (threshold {})",
                    if candidate.tracked { "tracked" } else { "detected" },
                    estimate.hand.presence(),
                    threshold,
                );
                continue;
            }

            if !self.static_mode {
                match Roi::from_landmarks(&estimate.pixels) {
                    Some(roi) if next.iter().any(|r: &Roi| r.iou(&roi) >= SAME_HAND_IOU) => {
                        log::trace!("dropping duplicate hand at {:?}", roi.center());
                        continue;
                    }
                    Some(roi) => next.push(roi),
                    None => {}
                }
            }
            hands.push(estimate.hand);
        }

        self.tracked = next;
        hands
    }
}

fn model_paths(dir: &Path, full: bool) -> (PathBuf, PathBuf) {
    let variant = if full { "full" } else { "lite" };
    (
        dir.join(format!("palm_detection_{variant}.onnx")),
        dir.join(format!("hand_landmark_{variant}.onnx")),
    )
}

/// Landmark network output for one region.
struct Estimate {
    hand: Hand,
    /// Landmark positions in image pixels.
    pixels: Vec<Point2<f32>>,
}

impl Estimate {
    /// Projects raw landmark output from crop pixels into the full image.
    fn decode(
        raw: &[f32],
        presence: f32,
        handedness: f32,
        roi: &Roi,
        input_res: Resolution,
        image_res: Resolution,
    ) -> Self {
        let (in_w, in_h) = (input_res.width() as f32, input_res.height() as f32);
        let (img_w, img_h) = (image_res.width() as f32, image_res.height() as f32);
        // Z uses the same scale as X
        let z_scale = roi.size() / in_w / img_w;

        let mut landmarks = [NormalizedLandmark::default(); NUM_LANDMARKS];
        let mut pixels = Vec::with_capacity(NUM_LANDMARKS);
        for (lm, xyz) in zip_exact(&mut landmarks, raw.chunks_exact(LANDMARK_DIMS)) {
            let (x, y) = roi.to_image(xyz[0] / in_w, xyz[1] / in_h);
            pixels.push(Point2::new(x, y));
            *lm = NormalizedLandmark::new(x / img_w, y / img_h, xyz[2] * z_scale);
        }

        let handedness = if handedness > 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        };
        Self {
            hand: Hand::new(landmarks, presence.clamp(0.0, 1.0), handedness),
            pixels,
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        detection::{BoundingRect, Keypoint},
        landmark::LandmarkIdx,
    };

    fn raw_landmarks(f: impl Fn(usize) -> [f32; 3]) -> Vec<f32> {
        (0..NUM_LANDMARKS).flat_map(f).collect()
    }

    fn tracker(static_mode: bool, max_hands: usize) -> HandTracker {
        let options = HandDetectorOptions::default()
            .static_mode(static_mode)
            .max_hands(max_hands)
            .detection_confidence(0.8)
            .tracking_confidence(0.3);
        HandTracker::new(&options)
    }

    /// An upright palm of size 40 centered on `(x, y)`, yielding a 104px region.
    fn palm(x: f32, y: f32) -> Detection {
        let keypoints = vec![
            Keypoint::new(x, y + 20.0),
            Keypoint::new(x - 20.0, y),
            Keypoint::new(x, y - 20.0),
        ];
        Detection::with_keypoints(0.9, BoundingRect::from_center(x, y, 40.0, 40.0), keypoints)
    }

    /// An upright hand with landmarks spread around `(x, y)`.
    fn estimate(x: f32, y: f32, presence: f32) -> Estimate {
        let mut pixels = (0..NUM_LANDMARKS)
            .map(|i| Point2::new(x - 10.0 + (i % 5) as f32 * 5.0, y - 10.0 + (i / 5) as f32 * 5.0))
            .collect::<Vec<_>>();
        pixels[LandmarkIdx::Wrist as usize] = Point2::new(x, y + 20.0);
        pixels[LandmarkIdx::MiddleFingerMcp as usize] = Point2::new(x, y - 5.0);
        let hand = Hand::new(
            [NormalizedLandmark::default(); NUM_LANDMARKS],
            presence,
            Handedness::Right,
        );
        Estimate { hand, pixels }
    }

    fn fresh(roi: Roi) -> Candidate {
        Candidate {
            roi,
            tracked: false,
        }
    }

    #[test]
    fn palms_are_capped_at_max_hands() {
        let tracker = tracker(false, 2);
        let palms = [palm(100.0, 100.0), palm(400.0, 100.0), palm(700.0, 100.0)];

        let mut candidates = tracker.carried_over();
        assert!(tracker.wants_palms(&candidates));
        tracker.add_palms(&mut candidates, &palms);
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| !c.tracked));
        assert_eq!(candidates[0].roi, Roi::from_palm(&palms[0]).unwrap());
        assert_eq!(candidates[1].roi, Roi::from_palm(&palms[1]).unwrap());
        assert!(!tracker.wants_palms(&candidates));
    }

    #[test]
    fn palms_overlapping_tracked_hands_are_skipped() {
        let mut tracker = tracker(false, 3);
        let tracked = Roi::from_palm(&palm(100.0, 100.0)).unwrap();
        tracker.tracked = vec![tracked];

        let mut candidates = tracker.carried_over();
        assert_eq!(candidates, [Candidate { roi: tracked, tracked: true }]);
        tracker.add_palms(&mut candidates, &[palm(105.0, 100.0), palm(400.0, 100.0)]);
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].tracked);
        assert_eq!(candidates[1].roi.center().0, 400.0);
    }

    #[test]
    fn static_mode_ignores_tracked_regions() {
        let mut tracker = tracker(true, 2);
        tracker.tracked = vec![Roi::new(50.0, 50.0, 100.0, 0.0)];
        assert!(tracker.carried_over().is_empty());

        let hands = tracker.finish_frame(vec![(
            fresh(Roi::new(100.0, 100.0, 100.0, 0.0)),
            estimate(100.0, 100.0, 0.9),
        )]);
        assert_eq!(hands.len(), 1);
        assert!(tracker.tracked.is_empty());
    }

    #[test]
    fn presence_threshold_depends_on_region_source() {
        let mut tracker = tracker(false, 2);
        let roi = Roi::new(100.0, 100.0, 100.0, 0.0);
        let hands = tracker.finish_frame(vec![
            (Candidate { roi, tracked: true }, estimate(100.0, 100.0, 0.5)),
            (fresh(Roi::new(400.0, 100.0, 100.0, 0.0)), estimate(400.0, 100.0, 0.5)),
        ]);
        assert_eq!(hands.len(), 1);
        assert_eq!(tracker.tracked.len(), 1);
        assert_eq!(tracker.tracked[0].center().0, 100.0);

        let hands = tracker.finish_frame(vec![(fresh(roi), estimate(100.0, 100.0, 0.85))]);
        assert_eq!(hands.len(), 1);
        let hands = tracker.finish_frame(vec![(fresh(roi), estimate(100.0, 100.0, 0.79))]);
        assert!(hands.is_empty());
        assert!(tracker.tracked.is_empty());
    }

    #[test]
    fn duplicate_hands_are_dropped() {
        let mut tracker = tracker(false, 3);
        let hands = tracker.finish_frame(vec![
            (fresh(Roi::new(100.0, 100.0, 100.0, 0.0)), estimate(100.0, 100.0, 0.9)),
            (fresh(Roi::new(110.0, 100.0, 100.0, 0.0)), estimate(102.0, 100.0, 0.95)),
            (fresh(Roi::new(400.0, 100.0, 100.0, 0.0)), estimate(400.0, 100.0, 0.9)),
        ]);
        assert_eq!(hands.len(), 2);
        assert_eq!(hands[0].presence(), 0.9);
        assert_eq!(tracker.tracked.len(), 2);
        assert!(tracker.carried_over().iter().all(|c| c.tracked));
    }

    #[test]
    fn unfinished_frame_keeps_tracking_state() {
        let mut tracker = tracker(false, 2);
        tracker.finish_frame(vec![(
            fresh(Roi::new(100.0, 100.0, 100.0, 0.0)),
            estimate(100.0, 100.0, 0.9),
        )]);
        let before = tracker.tracked.clone();
        assert_eq!(before.len(), 1);

        // a frame whose landmark estimation fails never reaches `finish_frame`
        let mut candidates = tracker.carried_over();
        tracker.add_palms(&mut candidates, &[palm(400.0, 100.0)]);
        assert_eq!(candidates.len(), 2);
        assert_eq!(tracker.tracked, before);
        assert_eq!(tracker.carried_over().len(), 1);

        tracker.reset();
        assert!(tracker.carried_over().is_empty());
    }

    #[test]
    fn model_file_names() {
        let (palm, landmark) = model_paths(Path::new("models"), true);
        assert_eq!(palm, Path::new("models/palm_detection_full.onnx"));
        assert_eq!(landmark, Path::new("models/hand_landmark_full.onnx"));

        let (palm, landmark) = model_paths(Path::new("/m"), false);
        assert_eq!(palm, Path::new("/m/palm_detection_lite.onnx"));
        assert_eq!(landmark, Path::new("/m/hand_landmark_lite.onnx"));
    }

    #[test]
    fn missing_models() {
        let options = HandDetectorOptions::default().model_dir("/nonexistent/handmark");
        let err = OnnxEngine::new(&options).err().unwrap();
        assert!(
            format!("{err:#}").contains("palm_detection_full.onnx"),
            "{err:#}"
        );
    }

    #[test]
    fn decode_upright_region() {
        // 100px region centered in a 200x100 image, 224px network input
        let roi = Roi::new(100.0, 50.0, 100.0, 0.0);
        let raw = raw_landmarks(|i| match i {
            0 => [112.0, 112.0, 0.0],
            1 => [0.0, 0.0, 22.4],
            _ => [224.0, 224.0, 0.0],
        });
        let estimate = Estimate::decode(
            &raw,
            0.9,
            0.8,
            &roi,
            Resolution::new(224, 224),
            Resolution::new(200, 100),
        );

        let hand = &estimate.hand;
        assert_eq!(hand.handedness(), Handedness::Right);
        assert_eq!(hand.presence(), 0.9);

        let center = hand.landmarks()[0];
        assert_relative_eq!(center.x, 0.5);
        assert_relative_eq!(center.y, 0.5);

        let corner = hand.landmarks()[1];
        assert_relative_eq!(corner.x, 0.25);
        assert_relative_eq!(corner.y, 0.0);
        // 10% of the crop width, relative to the image width
        assert_relative_eq!(corner.z, 0.05, epsilon = 1e-6);

        assert_relative_eq!(estimate.pixels[2].x, 150.0, epsilon = 1e-4);
        assert_relative_eq!(estimate.pixels[2].y, 100.0, epsilon = 1e-4);
    }

    #[test]
    fn decode_rotated_region() {
        // rotated clockwise by 90°: the crop's top edge is on the image's right side
        let roi = Roi::new(50.0, 50.0, 40.0, std::f32::consts::FRAC_PI_2);
        let raw = raw_landmarks(|_| [112.0, 0.0, 0.0]);
        let estimate = Estimate::decode(
            &raw,
            2.0,
            0.1,
            &roi,
            Resolution::new(224, 224),
            Resolution::new(100, 100),
        );
        assert_eq!(estimate.hand.handedness(), Handedness::Left);
        assert_eq!(estimate.hand.presence(), 1.0);
        let lm = estimate.hand.landmarks()[7];
        assert_relative_eq!(lm.x, 0.7, epsilon = 1e-5);
        assert_relative_eq!(lm.y, 0.5, epsilon = 1e-5);
    }
}
