//! The hand detection session.

use nalgebra::Point2;

use crate::{
    engine::LandmarkEngine,
    error::{Error, Result},
    image::{draw, Color, Image},
    landmark::{BoundingBox, DetectionResult, LandmarkIdx, LandmarkList, NUM_LANDMARKS, TIP_IDS},
    onnx::OnnxEngine,
    options::HandDetectorOptions,
};

/// Margin added around the bounding box drawn by [`HandDetector::find_position`], in pixels.
const BBOX_MARGIN: i32 = 20;

/// A hand detection session wrapping a single [`LandmarkEngine`].
///
/// The detector caches two results, each replaced wholesale by the call producing it:
///
/// - [`find_hands`][Self::find_hands] stores the hands detected in the latest image.
/// - [`find_position`][Self::find_position] stores the pixel landmarks of one of those hands,
///   which [`fingers_up`][Self::fingers_up] and [`find_distance`][Self::find_distance] then
///   operate on.
///
/// Calling the operations out of order is not an error, they just report that nothing was found.
pub struct HandDetector<E = OnnxEngine> {
    engine: E,
    results: DetectionResult,
    landmarks: LandmarkList,
}

impl HandDetector<OnnxEngine> {
    /// Creates a detector backed by the ONNX hand tracking networks.
    ///
    /// Returns [`Error::InvalidOption`] if `options` are out of range, and [`Error::Engine`] if
    /// the networks cannot be loaded.
    pub fn new(options: HandDetectorOptions) -> Result<Self> {
        options.validate()?;
        let engine = OnnxEngine::new(&options)?;
        Ok(Self::with_engine(engine))
    }
}

impl<E: LandmarkEngine> HandDetector<E> {
    /// Creates a detector using an already configured engine.
    pub fn with_engine(engine: E) -> Self {
        Self {
            engine,
            results: DetectionResult::default(),
            landmarks: LandmarkList::new(),
        }
    }

    #[inline]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    #[inline]
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Returns the hands found by the most recent call to [`find_hands`][Self::find_hands].
    #[inline]
    pub fn results(&self) -> &DetectionResult {
        &self.results
    }

    /// Returns the landmark list cached by the most recent call to
    /// [`find_position`][Self::find_position].
    #[inline]
    pub fn landmarks(&self) -> &LandmarkList {
        &self.landmarks
    }

    /// Detects hands in `image` and caches the result.
    ///
    /// Returns a copy of `image`. If `draw` is `true`, the landmarks and skeleton of every detected
    /// hand are drawn onto the copy.
    ///
    /// The previous result is discarded first, so if this fails, no hands are cached.
    pub fn find_hands(&mut self, image: &Image, draw: bool) -> Result<Image> {
        self.results = DetectionResult::default();
        image.check_dimensions()?;

        let hands = self.engine.process(&image.to_rgb())?;
        log::trace!("found {} hand(s) in {} image", hands.len(), image.resolution());
        self.results = DetectionResult::new(hands);

        let mut out = image.clone();
        if draw {
            for hand in self.results.hands() {
                hand.draw(&mut out);
            }
        }
        Ok(out)
    }

    /// Converts the landmarks of detected hand number `hand_index` to pixel coordinates of
    /// `image`, and caches them.
    ///
    /// If no hand with that index was found by the last [`find_hands`][Self::find_hands] call, an
    /// empty list and no bounding box are returned (and cached). If `draw` is `true`, every
    /// landmark and the hand's bounding box are drawn onto `image`.
    pub fn find_position(
        &mut self,
        image: &mut Image,
        hand_index: usize,
        draw: bool,
    ) -> Result<(LandmarkList, Option<BoundingBox>)> {
        image.check_dimensions()?;

        self.landmarks.clear();
        let hand = match self.results.get(hand_index) {
            Some(hand) => hand,
            None => {
                log::trace!(
                    "no hand #{} ({} detected)",
                    hand_index,
                    self.results.len()
                );
                return Ok((LandmarkList::new(), None));
            }
        };

        self.landmarks = LandmarkList::from_hand(hand, image.width(), image.height());
        let bbox = self.landmarks.bounding_box();

        if draw {
            for lm in &self.landmarks {
                draw::circle(image, lm.x, lm.y, 7).filled().color(Color::GREEN);
            }
            if let Some(bbox) = bbox {
                let outer = bbox.expand(BBOX_MARGIN);
                draw::rect(image, outer.x_min, outer.y_min, outer.x_max, outer.y_max)
                    .color(Color::GREEN)
                    .stroke_width(2);
            }
        }

        Ok((self.landmarks.clone(), bbox))
    }

    /// Determines which fingers are extended, based on the cached landmark list.
    ///
    /// Returns [`None`] if no landmarks are cached.
    pub fn fingers_up(&self) -> Option<Fingers> {
        Fingers::from_landmarks(&self.landmarks)
    }

    /// Measures the distance between landmarks `id1` and `id2` of the cached landmark list.
    ///
    /// Both IDs must be below [`NUM_LANDMARKS`], otherwise [`Error::LandmarkOutOfRange`] is
    /// returned. If no landmarks are cached, the distance is 0 and no [`Segment`] is returned.
    ///
    /// The returned image is a copy of `image`; if `draw` is `true`, the two landmarks, the line
    /// connecting them, and its midpoint are drawn onto it.
    pub fn find_distance(
        &self,
        id1: usize,
        id2: usize,
        image: &Image,
        draw: bool,
    ) -> Result<Distance> {
        for id in [id1, id2] {
            if id >= NUM_LANDMARKS {
                return Err(Error::landmark_out_of_range(id));
            }
        }

        let (a, b) = match (self.landmarks.get(id1), self.landmarks.get(id2)) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Ok(Distance {
                    length: 0.0,
                    image: image.clone(),
                    segment: None,
                })
            }
        };

        let segment = Segment::new(a.x, a.y, b.x, b.y);
        let length = segment.length();

        let mut image = image.clone();
        if draw {
            draw::circle(&mut image, a.x, a.y, 10)
                .filled()
                .color(Color::GREEN);
            draw::circle(&mut image, b.x, b.y, 10)
                .filled()
                .color(Color::GREEN);
            draw::line(&mut image, a.x, a.y, b.x, b.y)
                .color(Color::MAGENTA)
                .stroke_width(3);
            draw::circle(&mut image, segment.cx, segment.cy, 10)
                .filled()
                .color(Color::BLUE);
        }

        Ok(Distance {
            length,
            image,
            segment: Some(segment),
        })
    }
}

/// The five fingers of a hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    /// All fingers, ordered thumb to pinky.
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    /// Returns the landmark at the tip of this finger.
    pub fn tip(self) -> usize {
        TIP_IDS[self as usize]
    }
}

/// Which fingers of a hand are extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingers {
    up: [bool; 5],
}

impl Fingers {
    /// Evaluates the finger heuristic on a full landmark list.
    ///
    /// - The thumb counts as extended when its tip is further right (larger X) than the joint below
    ///   it. This assumes an upright right hand facing the camera (or a mirrored left hand) and
    ///   will misclassify rotated hands.
    /// - The other fingers count as extended when their tip is higher up in the image (smaller Y)
    ///   than their PIP joint.
    ///
    /// Returns [`None`] unless `landmarks` contains all [`NUM_LANDMARKS`] landmarks.
    pub fn from_landmarks(landmarks: &LandmarkList) -> Option<Self> {
        if landmarks.len() != NUM_LANDMARKS {
            return None;
        }

        let thumb_tip = landmarks[LandmarkIdx::ThumbTip as usize];
        let thumb_ip = landmarks[LandmarkIdx::ThumbIp as usize];

        let mut up = [false; 5];
        up[0] = thumb_tip.x > thumb_ip.x;
        for (flag, &tip) in up.iter_mut().zip(&TIP_IDS).skip(1) {
            *flag = landmarks[tip].y < landmarks[tip - 2].y;
        }

        Some(Self { up })
    }

    #[inline]
    pub fn is_up(&self, finger: Finger) -> bool {
        self.up[finger as usize]
    }

    /// Returns one flag per finger (thumb to pinky): 1 if extended, 0 otherwise.
    pub fn flags(&self) -> [u8; 5] {
        self.up.map(u8::from)
    }

    /// Returns the number of extended fingers.
    pub fn count(&self) -> usize {
        self.up.iter().filter(|up| **up).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Finger, bool)> + '_ {
        Finger::ALL.into_iter().zip(self.up.iter().copied())
    }
}

/// Two landmark positions and their midpoint, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub cx: i32,
    pub cy: i32,
}

impl Segment {
    /// Creates a segment between two points, computing the midpoint by flooring division.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        // the floored mean of two `i32`s always fits in an `i32`
        let mid = |a: i32, b: i32| (i64::from(a) + i64::from(b)).div_euclid(2) as i32;
        Self {
            x1,
            y1,
            x2,
            y2,
            cx: mid(x1, x2),
            cy: mid(y1, y2),
        }
    }

    /// Returns the Euclidean distance between both end points.
    pub fn length(&self) -> f32 {
        let a = Point2::new(self.x1 as f32, self.y1 as f32);
        let b = Point2::new(self.x2 as f32, self.y2 as f32);
        nalgebra::distance(&a, &b)
    }

    /// Returns `[x1, y1, x2, y2, cx, cy]`.
    pub fn to_array(&self) -> [i32; 6] {
        [self.x1, self.y1, self.x2, self.y2, self.cx, self.cy]
    }
}

/// Result of [`HandDetector::find_distance`].
#[derive(Debug, Clone)]
pub struct Distance {
    /// Euclidean distance between the two landmarks, in pixels. 0 if no landmarks were cached.
    pub length: f32,
    /// Copy of the input image, annotated if drawing was requested.
    pub image: Image,
    /// The measured landmark positions, or [`None`] if no landmarks were cached.
    pub segment: Option<Segment>,
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::landmark::{Hand, Handedness, NormalizedLandmark};

    /// Engine returning the same hands for every image.
    struct FixedEngine(Vec<Hand>);

    impl LandmarkEngine for FixedEngine {
        fn process(&mut self, _: &image::RgbImage) -> anyhow::Result<Vec<Hand>> {
            Ok(self.0.clone())
        }
    }

    fn pixels(f: impl Fn(usize) -> (i32, i32)) -> LandmarkList {
        LandmarkList::from_pixels(std::array::from_fn(f))
    }

    #[test]
    fn finger_heuristic() {
        // all tips above their joints, thumb tip right of its IP joint
        let open = pixels(|i| match i {
            3 => (10, 0),
            4 => (20, 0),
            6 | 10 | 14 | 18 => (0, 100),
            8 | 12 | 16 | 20 => (0, 50),
            _ => (0, 0),
        });
        let fingers = Fingers::from_landmarks(&open).unwrap();
        assert_eq!(fingers.flags(), [1, 1, 1, 1, 1]);
        assert_eq!(fingers.count(), 5);

        let index_down = pixels(|i| match i {
            3 => (10, 0),
            4 => (5, 0),
            6 => (0, 100),
            8 => (0, 150),
            _ => (0, 0),
        });
        let fingers = Fingers::from_landmarks(&index_down).unwrap();
        assert!(!fingers.is_up(Finger::Thumb));
        assert!(!fingers.is_up(Finger::Index));
        assert_eq!(fingers.flags(), [0, 0, 0, 0, 0]);
    }

    #[test]
    fn equal_positions_are_down() {
        let flat = pixels(|_| (7, 7));
        assert_eq!(Fingers::from_landmarks(&flat).unwrap().count(), 0);
    }

    #[test]
    fn fingers_need_full_list() {
        assert_eq!(Fingers::from_landmarks(&LandmarkList::new()), None);
    }

    #[test]
    fn finger_iteration_order() {
        let fingers = Fingers {
            up: [true, false, true, false, false],
        };
        let order = fingers.iter().collect::<Vec<_>>();
        assert_eq!(
            order,
            [
                (Finger::Thumb, true),
                (Finger::Index, false),
                (Finger::Middle, true),
                (Finger::Ring, false),
                (Finger::Pinky, false),
            ]
        );
        assert_eq!(Finger::Pinky.tip(), 20);
    }

    #[test]
    fn segment_midpoint_floors() {
        let seg = Segment::new(0, 0, 3, 4);
        assert_eq!(seg.to_array(), [0, 0, 3, 4, 1, 2]);
        assert_eq!(seg.length(), 5.0);

        let seg = Segment::new(-3, 0, 0, -1);
        assert_eq!((seg.cx, seg.cy), (-2, -1));

        let seg = Segment::new(i32::MAX, i32::MIN, i32::MAX, i32::MIN);
        assert_eq!((seg.cx, seg.cy), (i32::MAX, i32::MIN));
    }

    #[test]
    fn distance_out_of_range_ids() {
        let detector = HandDetector::with_engine(FixedEngine(Vec::new()));
        let image = Image::new(4, 4, Default::default());
        let err = detector.find_distance(4, 21, &image, false).unwrap_err();
        assert!(
            matches!(err, Error::LandmarkOutOfRange { index: 21, .. }),
            "{err}"
        );
    }

    #[test]
    fn position_draws_onto_image() {
        let hand = Hand::new(
            [NormalizedLandmark::new(0.5, 0.5, 0.0); NUM_LANDMARKS],
            1.0,
            Handedness::Left,
        );
        let mut detector = HandDetector::with_engine(FixedEngine(vec![hand]));
        let mut image = Image::new(100, 100, Default::default());
        detector.find_hands(&image, false).unwrap();
        let (list, bbox) = detector.find_position(&mut image, 0, true).unwrap();

        assert_eq!(list.len(), NUM_LANDMARKS);
        assert_eq!(bbox.unwrap().to_array(), [50, 50, 50, 50]);
        assert_eq!(image.get(50, 50), Color::GREEN);
        assert_eq!(image.get(30, 50), Color::GREEN); // bounding box outline
        assert_eq!(image.get(40, 50), Color::BLACK);
    }

    #[test]
    fn distance_draws_on_copy() {
        let hand = Hand::new(
            std::array::from_fn(|i| {
                NormalizedLandmark::new(if i == 8 { 0.8 } else { 0.2 }, 0.5, 0.0)
            }),
            1.0,
            Handedness::Right,
        );
        let mut detector = HandDetector::with_engine(FixedEngine(vec![hand]));
        let mut image = Image::new(100, 100, Default::default());
        detector.find_hands(&image, false).unwrap();
        detector.find_position(&mut image, 0, false).unwrap();

        let distance = detector.find_distance(4, 8, &image, true).unwrap();
        assert_relative_eq!(distance.length, 60.0);
        assert_eq!(distance.segment.unwrap().to_array(), [20, 50, 80, 50, 50, 50]);
        assert_eq!(distance.image.get(50, 50), Color::BLUE);
        assert_eq!(distance.image.get(20, 42), Color::GREEN);
        assert_eq!(distance.image.get(35, 50), Color::MAGENTA);
        assert_eq!(image.get(50, 50), Color::BLACK);
    }
}
