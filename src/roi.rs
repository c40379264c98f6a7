//! Rotated regions of interest.
//!
//! The landmark network only sees a square crop around a single hand, rotated so that the fingers
//! point up. A [`Roi`] describes such a crop in pixel coordinates of the full image.

use std::f32::consts::FRAC_PI_2;

use image::{Rgb, RgbImage};
use itertools::{Itertools, MinMaxResult};
use nalgebra::{Point2, Rotation2, Vector2};

use crate::{
    detection::{BoundingRect, Detection},
    image::Resolution,
    landmark::LandmarkIdx,
    num::normalize_radians,
};

/// Palm keypoint at the wrist.
const PALM_WRIST: usize = 0;
/// Palm keypoint at the base of the middle finger.
const PALM_MIDDLE_MCP: usize = 2;

/// A square region of an image, rotated around its center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    center: Point2<f32>,
    size: f32,
    rotation: f32,
}

impl Roi {
    /// Scale from the detected palm box to the hand crop.
    pub const PALM_SCALE: f32 = 2.6;
    /// Vertical shift of the crop center, relative to the palm box height.
    pub const PALM_SHIFT_Y: f32 = -0.5;
    /// Scale from the landmark bounding box to the next frame's crop.
    pub const LANDMARK_SCALE: f32 = 2.0;
    /// Vertical shift of the crop center, relative to the landmark bounding box height.
    pub const LANDMARK_SHIFT_Y: f32 = -0.1;

    /// Creates a region centered on `(x, y)` with side length `size`, rotated clockwise by
    /// `rotation` radians.
    pub fn new(x: f32, y: f32, size: f32, rotation: f32) -> Self {
        Self {
            center: Point2::new(x, y),
            size,
            rotation: normalize_radians(rotation),
        }
    }

    /// Computes the hand crop for a palm detection in image coordinates.
    ///
    /// Returns [`None`] if the detection lacks the wrist or middle finger keypoints.
    pub fn from_palm(detection: &Detection) -> Option<Self> {
        let wrist = detection.keypoints().get(PALM_WRIST)?;
        let middle = detection.keypoints().get(PALM_MIDDLE_MCP)?;
        let rotation = hand_rotation(
            Point2::new(wrist.x(), wrist.y()),
            Point2::new(middle.x(), middle.y()),
        );

        let rect = detection.bounding_rect();
        let (xc, yc) = rect.center();
        Some(Self::from_rotated_box(
            Point2::new(xc, yc),
            rect.width(),
            rect.height(),
            rotation,
            Self::PALM_SHIFT_Y,
            Self::PALM_SCALE,
        ))
    }

    /// Computes the crop following a hand, from its landmarks in image pixel coordinates.
    ///
    /// `landmarks` must be indexed by [`LandmarkIdx`]. Returns [`None`] if it is too short.
    pub fn from_landmarks(landmarks: &[Point2<f32>]) -> Option<Self> {
        let wrist = *landmarks.get(LandmarkIdx::Wrist as usize)?;
        let middle = *landmarks.get(LandmarkIdx::MiddleFingerMcp as usize)?;
        let rotation = hand_rotation(wrist, middle);

        // axis-aligned box in image space, used as the pivot
        let (x_min, x_max) = minmax(landmarks.iter().map(|p| p.x))?;
        let (y_min, y_max) = minmax(landmarks.iter().map(|p| p.y))?;
        let pivot = Point2::new((x_min + x_max) * 0.5, (y_min + y_max) * 0.5);

        // box in the rotated frame, where the fingers point up
        let unrotate = Rotation2::new(-rotation);
        let rotated = landmarks
            .iter()
            .map(|p| unrotate * (p - pivot))
            .collect::<Vec<_>>();
        let (rx_min, rx_max) = minmax(rotated.iter().map(|v| v.x))?;
        let (ry_min, ry_max) = minmax(rotated.iter().map(|v| v.y))?;

        let offset = Vector2::new((rx_min + rx_max) * 0.5, (ry_min + ry_max) * 0.5);
        let center = pivot + Rotation2::new(rotation) * offset;

        Some(Self::from_rotated_box(
            center,
            rx_max - rx_min,
            ry_max - ry_min,
            rotation,
            Self::LANDMARK_SHIFT_Y,
            Self::LANDMARK_SCALE,
        ))
    }

    fn from_rotated_box(
        center: Point2<f32>,
        width: f32,
        height: f32,
        rotation: f32,
        shift_y: f32,
        scale: f32,
    ) -> Self {
        let shift = Rotation2::new(rotation) * Vector2::new(0.0, height * shift_y);
        let center = center + shift;
        Self::new(center.x, center.y, width.max(height) * scale, rotation)
    }

    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (self.center.x, self.center.y)
    }

    /// Side length in pixels.
    #[inline]
    pub fn size(&self) -> f32 {
        self.size
    }

    /// Clockwise rotation in radians, in range `[-π, π)`. 0 means the fingers point up.
    #[inline]
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    /// Maps a point from normalized crop coordinates (0.0 to 1.0 along each axis of the rotated
    /// square) to image pixel coordinates.
    pub fn to_image(&self, u: f32, v: f32) -> (f32, f32) {
        let offset = Vector2::new((u - 0.5) * self.size, (v - 0.5) * self.size);
        let p = self.center + Rotation2::new(self.rotation) * offset;
        (p.x, p.y)
    }

    /// Returns the corners in image coordinates: top left, top right, bottom right, bottom left
    /// (as seen in the crop).
    pub fn corners(&self) -> [[f32; 2]; 4] {
        [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)].map(|(u, v)| {
            let (x, y) = self.to_image(u, v);
            [x, y]
        })
    }

    /// Returns the axis-aligned rectangle enclosing this region.
    pub fn bounding_rect(&self) -> BoundingRect {
        let corners = self.corners();
        let xs = corners.map(|c| c[0]);
        let ys = corners.map(|c| c[1]);
        let fold_min = |v: [f32; 4]| v.into_iter().fold(f32::INFINITY, f32::min);
        let fold_max = |v: [f32; 4]| v.into_iter().fold(f32::NEG_INFINITY, f32::max);
        BoundingRect::from_corners(fold_min(xs), fold_min(ys), fold_max(xs), fold_max(ys))
    }

    /// Computes the overlap of the enclosing rectangles of `self` and `other`.
    pub fn iou(&self, other: &Self) -> f32 {
        self.bounding_rect().iou(&other.bounding_rect())
    }

    /// Samples this region of `image` into a new image of resolution `res`.
    ///
    /// Uses bilinear filtering. Parts of the region outside of `image` are black.
    pub fn extract(&self, image: &RgbImage, res: Resolution) -> RgbImage {
        let (w, h) = (res.width(), res.height());
        RgbImage::from_fn(w, h, |x, y| {
            let u = (x as f32 + 0.5) / w as f32;
            let v = (y as f32 + 0.5) / h as f32;
            let (ix, iy) = self.to_image(u, v);
            sample_bilinear(image, ix - 0.5, iy - 0.5)
        })
    }
}

/// Computes the clockwise rotation that makes the `wrist -> middle` direction point up.
fn hand_rotation(wrist: Point2<f32>, middle: Point2<f32>) -> f32 {
    // image Y points down, flip it to get a counterclockwise angle
    let angle = f32::atan2(-(middle.y - wrist.y), middle.x - wrist.x);
    normalize_radians(FRAC_PI_2 - angle)
}

fn minmax(values: impl Iterator<Item = f32>) -> Option<(f32, f32)> {
    match values.minmax_by(f32::total_cmp) {
        MinMaxResult::NoElements => None,
        MinMaxResult::OneElement(v) => Some((v, v)),
        MinMaxResult::MinMax(min, max) => Some((min, max)),
    }
}

fn sample_bilinear(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let x0 = x.floor();
    let y0 = y.floor();
    let (fx, fy) = (x - x0, y - y0);

    let pixel = |px: f32, py: f32| -> [f32; 3] {
        if px < 0.0 || py < 0.0 || px >= image.width() as f32 || py >= image.height() as f32 {
            return [0.0; 3];
        }
        image.get_pixel(px as u32, py as u32).0.map(f32::from)
    };

    let tl = pixel(x0, y0);
    let tr = pixel(x0 + 1.0, y0);
    let bl = pixel(x0, y0 + 1.0);
    let br = pixel(x0 + 1.0, y0 + 1.0);

    let mut out = [0; 3];
    for c in 0..3 {
        let top = tl[c] + (tr[c] - tl[c]) * fx;
        let bottom = bl[c] + (br[c] - bl[c]) * fx;
        out[c] = (top + (bottom - top) * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}
