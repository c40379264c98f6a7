//! Types for representing image resolutions.

use std::fmt;

/// Resolution (`width x height`) of an image or neural network input.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    /// Creates a new [`Resolution`] of `width x height`.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns the width of this [`Resolution`].
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of this [`Resolution`].
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn num_pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Returns whether either dimension is zero.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Computes how an image of resolution `self` is placed into `target` when scaled uniformly
    /// to fit, with the remaining area filled with padding.
    ///
    /// The image is centered: if it has a wider aspect ratio than `target`, letterboxing is added
    /// above and below it, otherwise pillarboxing is added left and right.
    pub fn letterbox_into(&self, target: Resolution) -> Letterbox {
        if self.is_empty() || target.is_empty() {
            return Letterbox {
                scale: 1.0,
                pad_x: 0,
                pad_y: 0,
                scaled: Resolution::new(0, 0),
            };
        }

        let scale_x = target.width() as f32 / self.width() as f32;
        let scale_y = target.height() as f32 / self.height() as f32;
        let scale = scale_x.min(scale_y);

        let w = ((self.width() as f32 * scale).round() as u32).clamp(1, target.width());
        let h = ((self.height() as f32 * scale).round() as u32).clamp(1, target.height());
        let letterbox = Letterbox {
            scale,
            pad_x: (target.width() - w) / 2,
            pad_y: (target.height() - h) / 2,
            scaled: Resolution::new(w, h),
        };
        log::trace!("letterbox {} into {} -> {:?}", self, target, letterbox);
        letterbox
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Placement of a uniformly scaled image inside a larger target, computed by
/// [`Resolution::letterbox_into`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    scale: f32,
    pad_x: u32,
    pad_y: u32,
    scaled: Resolution,
}

impl Letterbox {
    /// The factor the source image is scaled by.
    #[inline]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Padding added on the left, in target pixels.
    #[inline]
    pub fn pad_x(&self) -> u32 {
        self.pad_x
    }

    /// Padding added on the top, in target pixels.
    #[inline]
    pub fn pad_y(&self) -> u32 {
        self.pad_y
    }

    /// Size of the scaled source image inside the target.
    #[inline]
    pub fn scaled_resolution(&self) -> Resolution {
        self.scaled
    }

    /// Maps a point in target coordinates back to source image coordinates.
    pub fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}
