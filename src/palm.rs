//! Palm detection.
//!
//! The palm detector is an SSD network that takes a letterboxed, square image and outputs a box
//! and 7 keypoints for each of its anchors, plus a score. Palms are much easier to find than whole
//! hands (they are rigid and roughly square), so they are used to seed the landmark network.

use anyhow::bail;
use image::{
    imageops::{self, FilterType},
    RgbImage,
};

use crate::{
    detection::{
        nms::NonMaxSuppression,
        ssd::{self, AnchorParams, Anchors},
        BoundingRect, Detection, Keypoint,
    },
    image::{Letterbox, Resolution},
    nn::{Cnn, NeuralNetwork},
    num::sigmoid,
};

/// Number of keypoints output per palm.
pub const NUM_KEYPOINTS: usize = 7;

/// Values per anchor in the box regression output: center offset, size, and keypoint offsets.
const BOX_LEN: usize = 4 + NUM_KEYPOINTS * 2;

/// Raw scores are clamped to this range before applying the sigmoid.
const SCORE_CLIP: f32 = 100.0;

/// Detects palms using the palm detection network.
pub struct PalmDetector {
    cnn: Cnn,
    anchors: Anchors,
    nms: NonMaxSuppression,
    min_score: f32,
}

impl PalmDetector {
    /// Wraps a loaded palm detection network.
    ///
    /// Detections scoring below `min_score` are discarded.
    pub fn new(nn: NeuralNetwork, min_score: f32) -> anyhow::Result<Self> {
        let cnn = Cnn::new(nn)?;
        let input_res = cnn.input_resolution();
        if input_res.width() % 16 != 0 || input_res.height() % 16 != 0 {
            bail!(
                "palm detection network has unsupported input resolution {}",
                input_res
            );
        }
        let layers = ssd::palm_layers(input_res);
        let anchors = Anchors::calculate(&AnchorParams { layers: &layers });
        log::debug!(
            "palm detector uses {} anchors for {} input",
            anchors.anchor_count(),
            input_res
        );

        Ok(Self {
            cnn,
            anchors,
            nms: NonMaxSuppression::new(min_score),
            min_score,
        })
    }

    /// Returns the resolution of the network input.
    pub fn input_resolution(&self) -> Resolution {
        self.cnn.input_resolution()
    }

    /// Detects palms in `image`.
    ///
    /// Returns the detections in image pixel coordinates, most confident first.
    pub fn detect(&mut self, image: &RgbImage) -> anyhow::Result<Vec<Detection>> {
        let (input, letterbox) = letterbox_image(image, self.input_resolution());
        let outputs = self.cnn.estimate(&input)?;

        let mut boxes = None;
        let mut scores = None;
        for index in 0..outputs.len() {
            match outputs.shape(index)? {
                [1, n, BOX_LEN] if *n == self.anchors.anchor_count() => {
                    boxes = Some(outputs.as_slice(index)?)
                }
                [1, n, 1] if *n == self.anchors.anchor_count() => {
                    scores = Some(outputs.as_slice(index)?)
                }
                shape => log::trace!("ignoring palm detection output of shape {:?}", shape),
            }
        }
        let (boxes, scores) = match (boxes, scores) {
            (Some(boxes), Some(scores)) => (boxes, scores),
            _ => bail!(
                "palm detection network must output boxes and scores for {} anchors",
                self.anchors.anchor_count()
            ),
        };

        let mut detections = decode(
            boxes,
            scores,
            &self.anchors,
            self.input_resolution(),
            self.min_score,
        );
        let candidates = detections.len();
        let palms = self
            .nms
            .process(&mut detections)
            .map(|det| det.unletterbox(&letterbox))
            .collect::<Vec<_>>();
        log::trace!("{} palm candidates, {} after NMS", candidates, palms.len());
        Ok(palms)
    }
}

/// Decodes the raw network outputs into detections in network input coordinates.
///
/// Anchors scoring below `min_score` are skipped.
pub(crate) fn decode(
    boxes: &[f32],
    scores: &[f32],
    anchors: &Anchors,
    input_res: Resolution,
    min_score: f32,
) -> Vec<Detection> {
    let (w, h) = (input_res.width() as f32, input_res.height() as f32);

    boxes
        .chunks_exact(BOX_LEN)
        .zip(scores)
        .zip(anchors.iter())
        .filter_map(|((raw, &score), anchor)| {
            let confidence = sigmoid(score.clamp(-SCORE_CLIP, SCORE_CLIP));
            if confidence < min_score {
                return None;
            }

            let (ax, ay) = (anchor.x_center() * w, anchor.y_center() * h);
            let rect = BoundingRect::from_center(ax + raw[0], ay + raw[1], raw[2], raw[3]);
            let keypoints = raw[4..]
                .chunks_exact(2)
                .map(|kp| Keypoint::new(ax + kp[0], ay + kp[1]))
                .collect();
            Some(Detection::with_keypoints(confidence, rect, keypoints))
        })
        .collect()
}

/// Scales `image` to fit into `target` and pads it with black borders.
pub(crate) fn letterbox_image(image: &RgbImage, target: Resolution) -> (RgbImage, Letterbox) {
    let letterbox = Resolution::new(image.width(), image.height()).letterbox_into(target);
    let scaled = letterbox.scaled_resolution();

    let mut canvas = RgbImage::new(target.width(), target.height());
    if !scaled.is_empty() {
        let resized = imageops::resize(image, scaled.width(), scaled.height(), FilterType::Triangle);
        imageops::replace(
            &mut canvas,
            &resized,
            letterbox.pad_x().into(),
            letterbox.pad_y().into(),
        );
    }
    (canvas, letterbox)
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    fn anchors() -> Anchors {
        let layers = ssd::palm_layers(Resolution::new(192, 192));
        Anchors::calculate(&AnchorParams { layers: &layers })
    }

    #[test]
    fn decodes_confident_anchors() {
        let anchors = anchors();
        let mut boxes = vec![0.0; anchors.anchor_count() * BOX_LEN];
        let mut scores = vec![-10.0; anchors.anchor_count()];

        // first anchor of the 12x12 layer, centered at (8, 8)
        let index = 24 * 24 * 2;
        scores[index] = 5.0;
        let raw = &mut boxes[index * BOX_LEN..][..BOX_LEN];
        raw[..4].copy_from_slice(&[2.0, -1.0, 30.0, 40.0]);
        raw[4] = 1.0;
        raw[5] = 20.0;

        let dets = decode(&boxes, &scores, &anchors, Resolution::new(192, 192), 0.5);
        assert_eq!(dets.len(), 1);
        let det = &dets[0];
        assert_eq!(det.confidence(), sigmoid(5.0));
        assert_eq!(det.bounding_rect(), BoundingRect::from_center(10.0, 7.0, 30.0, 40.0));
        assert_eq!(det.keypoints().len(), NUM_KEYPOINTS);
        assert_eq!(det.keypoints()[0], Keypoint::new(9.0, 28.0));
        assert_eq!(det.keypoints()[6], Keypoint::new(8.0, 8.0));
    }

    #[test]
    fn low_scores_are_skipped() {
        let anchors = anchors();
        let boxes = vec![0.0; anchors.anchor_count() * BOX_LEN];
        let scores = vec![f32::NEG_INFINITY; anchors.anchor_count()];
        let dets = decode(&boxes, &scores, &anchors, Resolution::new(192, 192), 0.5);
        assert!(dets.is_empty());
    }

    #[test]
    fn letterbox_pads_wide_image() {
        let image = RgbImage::from_pixel(4, 2, Rgb([255, 255, 255]));
        let (boxed, letterbox) = letterbox_image(&image, Resolution::new(4, 4));
        assert_eq!(letterbox.pad_y(), 1);
        assert_eq!(boxed.dimensions(), (4, 4));
        assert_eq!(boxed.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(boxed.get_pixel(2, 1), &Rgb([255, 255, 255]));
        assert_eq!(boxed.get_pixel(2, 2), &Rgb([255, 255, 255]));
        assert_eq!(boxed.get_pixel(3, 3), &Rgb([0, 0, 0]));
    }
}
