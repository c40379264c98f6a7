//! Hand landmark types.
//!
//! Landmark engines produce [`Hand`]s made of [`NormalizedLandmark`]s. [`HandDetector`] projects
//! them into pixel-space [`Landmark`]s, collected in a [`LandmarkList`].
//!
//! [`HandDetector`]: crate::HandDetector

use std::{ops::Index, slice};

use itertools::{Itertools, MinMaxResult};

use crate::image::{draw, Color, Image};

/// Number of landmarks estimated for every hand.
pub const NUM_LANDMARKS: usize = 21;

/// Normalized coordinates are clamped to this range before projecting them into an image.
const PROJECTION_RANGE: (f32, f32) = (-1.0, 2.0);

/// Landmark IDs of the fingertips, ordered thumb to pinky.
pub const TIP_IDS: [usize; 5] = [
    LandmarkIdx::ThumbTip as usize,
    LandmarkIdx::IndexFingerTip as usize,
    LandmarkIdx::MiddleFingerTip as usize,
    LandmarkIdx::RingFingerTip as usize,
    LandmarkIdx::PinkyTip as usize,
];

/// Names for the hand pose landmarks.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **IP**: Interphalangeal joint of the thumb.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Pairs of anatomically adjacent landmarks, forming the hand skeleton.
pub const CONNECTIVITY: &[(LandmarkIdx, LandmarkIdx)] = {
    use LandmarkIdx::*;
    &[
        // Surround the palm:
        (Wrist, ThumbCmc),
        (Wrist, IndexFingerMcp),
        (IndexFingerMcp, MiddleFingerMcp),
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, PinkyMcp),
        (PinkyMcp, Wrist),
        // Thumb:
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        // Index:
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        // Middle:
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        // Ring:
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        // Pinky:
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};

/// A landmark position as reported by a landmark engine.
///
/// `x` and `y` are normalized to the input image's width and height, so they are in range 0.0 to
/// 1.0 for landmarks inside the image (landmarks of partially visible hands can lie outside of
/// that range). `z` is the depth relative to the wrist, with smaller values being closer to the
/// camera, using roughly the same scale as `x`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormalizedLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl NormalizedLandmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Projects this landmark into the pixel grid of an image of the given size.
    ///
    /// Coordinates are rounded to the nearest pixel. Positions more than one image size beyond
    /// an edge (including infinities) are clamped to that distance, and NaN maps to 0.
    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        let (min, max) = PROJECTION_RANGE;
        let project = |v: f32, size: u32| (v.clamp(min, max) * size as f32).round() as i32;
        (project(self.x, width), project(self.y, height))
    }
}

/// Which hand a [`Hand`] is, as seen in the (unmirrored) input image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

/// A hand detected by a landmark engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Hand {
    landmarks: [NormalizedLandmark; NUM_LANDMARKS],
    presence: f32,
    handedness: Handedness,
}

impl Hand {
    pub fn new(
        landmarks: [NormalizedLandmark; NUM_LANDMARKS],
        presence: f32,
        handedness: Handedness,
    ) -> Self {
        Self {
            landmarks,
            presence,
            handedness,
        }
    }

    /// Returns the 21 landmarks of this hand, indexed by [`LandmarkIdx`].
    #[inline]
    pub fn landmarks(&self) -> &[NormalizedLandmark; NUM_LANDMARKS] {
        &self.landmarks
    }

    #[inline]
    pub fn landmark(&self, idx: LandmarkIdx) -> NormalizedLandmark {
        self.landmarks[idx as usize]
    }

    /// The landmark engine's confidence that this actually is a hand.
    #[inline]
    pub fn presence(&self) -> f32 {
        self.presence
    }

    #[inline]
    pub fn handedness(&self) -> Handedness {
        self.handedness
    }

    /// Draws the hand skeleton and landmark positions onto `target`.
    pub fn draw(&self, target: &mut Image) {
        let (w, h) = (target.width(), target.height());
        for (a, b) in CONNECTIVITY {
            let (ax, ay) = self.landmark(*a).to_pixel(w, h);
            let (bx, by) = self.landmark(*b).to_pixel(w, h);
            draw::line(target, ax, ay, bx, by)
                .color(Color::WHITE)
                .stroke_width(2);
        }
        for lm in &self.landmarks {
            let (x, y) = lm.to_pixel(w, h);
            draw::circle(target, x, y, 2).filled().color(Color::RED);
        }
    }
}

/// The hands found in one image by a landmark engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionResult {
    hands: Vec<Hand>,
}

impl DetectionResult {
    pub fn new(hands: Vec<Hand>) -> Self {
        Self { hands }
    }

    #[inline]
    pub fn hands(&self) -> &[Hand] {
        &self.hands
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Hand> {
        self.hands.get(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.hands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hands.is_empty()
    }
}

/// A landmark in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Landmark {
    pub id: usize,
    pub x: i32,
    pub y: i32,
}

impl Landmark {
    pub fn new(id: usize, x: i32, y: i32) -> Self {
        Self { id, x, y }
    }
}

/// The pixel-space landmarks of one hand.
///
/// Either empty, or contains exactly [`NUM_LANDMARKS`] entries whose `id` matches their index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LandmarkList {
    landmarks: Vec<Landmark>,
}

impl LandmarkList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Projects a [`Hand`]'s landmarks into the pixel grid of a `width x height` image.
    pub fn from_hand(hand: &Hand, width: u32, height: u32) -> Self {
        Self::from_pixels(hand.landmarks().map(|lm| lm.to_pixel(width, height)))
    }

    /// Creates a list from all 21 landmark pixel positions, ordered by landmark ID.
    pub fn from_pixels(positions: [(i32, i32); NUM_LANDMARKS]) -> Self {
        Self {
            landmarks: positions
                .into_iter()
                .enumerate()
                .map(|(id, (x, y))| Landmark::new(id, x, y))
                .collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    #[inline]
    pub fn get(&self, id: usize) -> Option<Landmark> {
        self.landmarks.get(id).copied()
    }

    pub fn iter(&self) -> slice::Iter<'_, Landmark> {
        self.landmarks.iter()
    }

    pub fn as_slice(&self) -> &[Landmark] {
        &self.landmarks
    }

    pub(crate) fn clear(&mut self) {
        self.landmarks.clear();
    }

    /// Computes the axis-aligned bounding box spanning all landmarks.
    ///
    /// Returns [`None`] if the list is empty.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let (x_min, x_max) = match self.landmarks.iter().map(|lm| lm.x).minmax() {
            MinMaxResult::NoElements => return None,
            MinMaxResult::OneElement(x) => (x, x),
            MinMaxResult::MinMax(min, max) => (min, max),
        };
        let (y_min, y_max) = match self.landmarks.iter().map(|lm| lm.y).minmax() {
            MinMaxResult::NoElements => return None,
            MinMaxResult::OneElement(y) => (y, y),
            MinMaxResult::MinMax(min, max) => (min, max),
        };

        Some(BoundingBox {
            x_min,
            y_min,
            x_max,
            y_max,
        })
    }
}

impl Index<usize> for LandmarkList {
    type Output = Landmark;

    fn index(&self, id: usize) -> &Landmark {
        &self.landmarks[id]
    }
}

impl<'a> IntoIterator for &'a LandmarkList {
    type Item = &'a Landmark;
    type IntoIter = slice::Iter<'a, Landmark>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An axis-aligned pixel rectangle, with both corners inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl BoundingBox {
    #[inline]
    pub fn width(&self) -> i32 {
        self.x_max.saturating_sub(self.x_min)
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.y_max.saturating_sub(self.y_min)
    }

    /// Returns whether `(x, y)` lies inside or on the edge of this box.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        (self.x_min..=self.x_max).contains(&x) && (self.y_min..=self.y_max).contains(&y)
    }

    /// Returns a box grown by `margin` pixels on every side, saturating at the `i32` range.
    pub fn expand(&self, margin: i32) -> Self {
        Self {
            x_min: self.x_min.saturating_sub(margin),
            y_min: self.y_min.saturating_sub(margin),
            x_max: self.x_max.saturating_add(margin),
            y_max: self.y_max.saturating_add(margin),
        }
    }

    /// Returns the corners as `[x_min, y_min, x_max, y_max]`.
    pub fn to_array(&self) -> [i32; 4] {
        [self.x_min, self.y_min, self.x_max, self.y_max]
    }
}
