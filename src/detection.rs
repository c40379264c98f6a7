//! Object detection building blocks used by the palm detector.
//!
//! SSD-style detectors output one candidate per anchor box; [`ssd::Anchors`] describes those
//! anchors and [`nms::NonMaxSuppression`] merges overlapping candidates afterwards.

pub mod nms;
pub mod ssd;

use crate::image::Letterbox;

/// A detected object.
///
/// A [`Detection`] consists of a [`BoundingRect`] enclosing the detected object, a confidence
/// value, and the set of keypoints located by the detector.
///
/// The confidence value lies between 0.0 and 1.0 (network scores are passed through
/// [`crate::num::sigmoid`]). It is used as the weight when performing non-maximum suppression with
/// [`nms::SuppressionMode::Average`].
///
/// Detections are created in the coordinate system of the network input and can be moved into
/// the original image with [`Detection::unletterbox`].
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    confidence: f32,
    rect: BoundingRect,
    keypoints: Vec<Keypoint>,
}

impl Detection {
    pub fn new(confidence: f32, rect: BoundingRect) -> Self {
        Self {
            confidence,
            rect,
            keypoints: Vec::new(),
        }
    }

    pub fn with_keypoints(confidence: f32, rect: BoundingRect, keypoints: Vec<Keypoint>) -> Self {
        Self {
            confidence,
            rect,
            keypoints,
        }
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn bounding_rect(&self) -> BoundingRect {
        self.rect
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    /// Maps this detection from the letterboxed network input back into the original image.
    pub(crate) fn unletterbox(&self, letterbox: &Letterbox) -> Self {
        let (x0, y0) = letterbox.unmap(self.rect.x_min(), self.rect.y_min());
        let (x1, y1) = letterbox.unmap(self.rect.x_max(), self.rect.y_max());
        Self {
            confidence: self.confidence,
            rect: BoundingRect::from_corners(x0, y0, x1, y1),
            keypoints: self
                .keypoints
                .iter()
                .map(|kp| {
                    let (x, y) = letterbox.unmap(kp.x, kp.y);
                    Keypoint::new(x, y)
                })
                .collect(),
        }
    }
}

/// A 2D keypoint produced as part of a [`Detection`].
///
/// The meaning of a keypoint depends on its index in the keypoint list. The palm detector outputs
/// 7 keypoints per palm, the first being the wrist and the third the base of the middle finger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    x: f32,
    y: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }
}

/// Axis-aligned bounding rectangle of a detected object, with float coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingRect {
    xc: f32,
    yc: f32,
    w: f32,
    h: f32,
}

impl BoundingRect {
    /// Creates a bounding rectangle centered at `(xc,yc)`.
    pub fn from_center(xc: f32, yc: f32, w: f32, h: f32) -> Self {
        Self { xc, yc, w, h }
    }

    /// Creates a bounding rectangle spanning from `(x_min,y_min)` to `(x_max,y_max)`.
    pub fn from_corners(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            xc: (x_min + x_max) * 0.5,
            yc: (y_min + y_max) * 0.5,
            w: x_max - x_min,
            h: y_max - y_min,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.xc, self.yc)
    }

    pub fn width(&self) -> f32 {
        self.w
    }

    pub fn height(&self) -> f32 {
        self.h
    }

    pub fn x_min(&self) -> f32 {
        self.xc - self.w / 2.0
    }

    pub fn y_min(&self) -> f32 {
        self.yc - self.h / 2.0
    }

    pub fn x_max(&self) -> f32 {
        self.xc + self.w / 2.0
    }

    pub fn y_max(&self) -> f32 {
        self.yc + self.h / 2.0
    }

    /// Returns the amount of area covered by `self`.
    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    fn intersection(&self, other: &Self) -> Self {
        let x_min = self.x_min().max(other.x_min());
        let y_min = self.y_min().max(other.y_min());
        let x_max = self.x_max().min(other.x_max());
        let y_max = self.y_max().min(other.y_max());

        // disjoint rects intersect in an empty rect
        Self::from_corners(x_min, y_min, x_max.max(x_min), y_max.max(y_min))
    }

    fn intersection_area(&self, other: &Self) -> f32 {
        self.intersection(other).area()
    }

    fn union_area(&self, other: &Self) -> f32 {
        self.area() + other.area() - self.intersection_area(other)
    }

    /// Computes the Intersection over Union (IOU) of `self` and `other`.
    ///
    /// Returns 0.0 if both rectangles are empty.
    pub fn iou(&self, other: &Self) -> f32 {
        let union = self.union_area(other);
        if union <= 0.0 {
            return 0.0;
        }
        self.intersection_area(other) / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Resolution;

    #[test]
    fn zero_area() {
        let zero = BoundingRect::from_center(0.0, 0.0, 0.0, 0.0);
        let also_zero = BoundingRect::from_center(1.0, 0.0, 0.0, 0.0);
        assert_eq!(zero.area(), 0.0);
        assert_eq!(zero.intersection(&also_zero).area(), 0.0);
        assert_eq!(zero.union_area(&also_zero), 0.0);
        assert_eq!(zero.iou(&also_zero), 0.0);
    }

    #[test]
    fn intersection() {
        let a = BoundingRect::from_center(1.0, 0.0, 1.0, 1.0);
        let b = BoundingRect::from_center(2.0, 0.0, 1.0, 1.0);
        assert_eq!(a.intersection(&b).area(), 0.0);
        assert_eq!(b.intersection(&a).area(), 0.0);

        let c = BoundingRect::from_center(1.5, 0.0, 1.0, 1.0);
        let ac = a.intersection(&c);
        assert_eq!(ac.center(), (1.25, 0.0));
        assert_eq!(ac.width(), 0.5);
        assert_eq!(ac.height(), 1.0);
    }

    #[test]
    fn disjoint_rects_do_not_overlap() {
        let a = BoundingRect::from_corners(0.0, 0.0, 1.0, 1.0);
        let b = BoundingRect::from_corners(5.0, -3.0, 6.0, 9.0);
        assert_eq!(a.intersection_area(&b), 0.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_nested_rects() {
        let smaller = BoundingRect::from_center(9.0, 9.0, 1.0, 1.0);
        let bigger = BoundingRect::from_center(9.0, 9.0, 2.0, 2.0);

        assert_eq!(smaller.intersection(&bigger), smaller);
        assert_eq!(smaller.union_area(&bigger), 4.0);
        assert_eq!(smaller.iou(&bigger), 1.0 / 4.0);
        assert_eq!(bigger.iou(&smaller), 1.0 / 4.0);
        assert_eq!(bigger.iou(&bigger), 1.0);
    }

    #[test]
    fn unletterbox_detection() {
        // 200x100 image letterboxed into 100x100: scale 0.5, 25px padding at the top
        let letterbox = Resolution::new(200, 100).letterbox_into(Resolution::new(100, 100));
        let det = Detection::with_keypoints(
            0.9,
            BoundingRect::from_corners(10.0, 25.0, 30.0, 45.0),
            vec![Keypoint::new(50.0, 50.0)],
        );
        let det = det.unletterbox(&letterbox);
        assert_eq!(det.confidence(), 0.9);
        assert_eq!(det.bounding_rect(), BoundingRect::from_corners(20.0, 0.0, 60.0, 40.0));
        assert_eq!(det.keypoints(), &[Keypoint::new(100.0, 50.0)]);
    }
}
