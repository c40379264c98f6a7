//! Image storage and manipulation.
//!
//! This module provides:
//!
//! - The [`Image`] type, an owned 8-bit, 3-channel image that remembers its [`ChannelOrder`].
//! - [`Color`], an RGB color used for drawing.
//! - A variety of [`draw`] functions to quickly visualize landmarks and regions.
//! - [`Resolution`] and [`Letterbox`] for describing image sizes and placement.

pub mod draw;
mod resolution;

#[cfg(test)]
mod tests;

use std::{borrow::Cow, fmt, ops::Index, path::Path};

use embedded_graphics::{pixelcolor::raw::RawU24, prelude::PixelColor};
use image::{ImageBuffer, Rgb, RgbImage};

pub use resolution::*;

use crate::error::Error;

#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    fn from_path(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("jpg" | "jpeg") => Ok(Self::Jpeg),
            Some("png") => Ok(Self::Png),
            _ => anyhow::bail!(
                "invalid image path '{}' (must have one of the supported extensions)",
                path.display()
            ),
        }
    }

    fn to_image_format(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
        }
    }
}

/// The order in which an [`Image`] stores its three color channels.
///
/// Camera and video APIs frequently hand out BGR data, while landmark engines expect RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// An 8-bit image with three color channels.
///
/// Pixel data is stored in the image's [`ChannelOrder`], but all accessors and drawing operations
/// take and return RGB [`Color`]s, so callers never have to swap channels themselves.
#[derive(Clone)]
pub struct Image {
    buf: RgbImage,
    order: ChannelOrder,
}

impl Image {
    /// Creates an all-black image of a specified size.
    ///
    /// Images with a width or height of 0 can be created, but are rejected by
    /// [`HandDetector`][crate::HandDetector] operations.
    pub fn new(width: u32, height: u32, order: ChannelOrder) -> Self {
        Self {
            buf: ImageBuffer::new(width, height),
            order,
        }
    }

    /// Creates an image from a raw, row-major buffer of interleaved 8-bit samples.
    ///
    /// Returns an [`Error::InvalidImage`] if `channels` is not 3, if either dimension is 0, or if
    /// `data` does not contain exactly `width * height * channels` bytes.
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: u32,
        data: Vec<u8>,
        order: ChannelOrder,
    ) -> Result<Self, Error> {
        if channels != 3 {
            return Err(Error::invalid_image(format!(
                "expected 3 color channels, got {channels}"
            )));
        }
        if width == 0 || height == 0 {
            return Err(Error::invalid_image(format!(
                "image has zero size ({width}x{height})"
            )));
        }

        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(Error::invalid_image(format!(
                "incorrect buffer size {} for {}x{} image (expected {} bytes)",
                data.len(),
                width,
                height,
                expected,
            )));
        }

        let buf = ImageBuffer::from_raw(width, height, data).ok_or_else(|| {
            Error::invalid_image("buffer size does not match image resolution")
        })?;
        Ok(Self { buf, order })
    }

    /// Wraps an RGB image buffer from the [`image`] crate.
    pub fn from_rgb(buf: RgbImage) -> Self {
        Self {
            buf,
            order: ChannelOrder::Rgb,
        }
    }

    /// Loads an image from the filesystem.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`). The loaded image
    /// uses [`ChannelOrder::Rgb`].
    pub fn load<A: AsRef<Path>>(path: A) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        let format = ImageFormat::from_path(path)?;
        let data = std::fs::read(path)?;
        let buf = image::load_from_memory_with_format(&data, format.to_image_format())?.to_rgb8();
        log::trace!("loaded {}x{} image from {}", buf.width(), buf.height(), path.display());
        Ok(Self::from_rgb(buf))
    }

    /// Saves an image to the file system.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        self.save_impl(path.as_ref())
    }

    fn save_impl(&self, path: &Path) -> anyhow::Result<()> {
        let format = ImageFormat::from_path(path)?;
        self.to_rgb()
            .save_with_format(path, format.to_image_format())?;
        Ok(())
    }

    /// Returns the width of this image, in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    /// Returns the height of this image, in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    /// Returns the size of this image.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Returns the order the color channels are stored in.
    #[inline]
    pub fn channel_order(&self) -> ChannelOrder {
        self.order
    }

    /// Gets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    pub fn get(&self, x: u32, y: u32) -> Color {
        let [a, b, c] = self.buf[(x, y)].0;
        match self.order {
            ChannelOrder::Rgb => Color([a, b, c]),
            ChannelOrder::Bgr => Color([c, b, a]),
        }
    }

    /// Sets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        let [r, g, b] = color.0;
        self.buf[(x, y)] = match self.order {
            ChannelOrder::Rgb => Rgb([r, g, b]),
            ChannelOrder::Bgr => Rgb([b, g, r]),
        };
    }

    /// Returns this image's pixels in RGB order.
    ///
    /// This borrows the underlying buffer when the image already is [`ChannelOrder::Rgb`] and
    /// converts it otherwise.
    pub fn to_rgb(&self) -> Cow<'_, RgbImage> {
        match self.order {
            ChannelOrder::Rgb => Cow::Borrowed(&self.buf),
            ChannelOrder::Bgr => {
                let mut buf = self.buf.clone();
                buf.pixels_mut().for_each(|pix| pix.0.swap(0, 2));
                Cow::Owned(buf)
            }
        }
    }

    /// Clears the image, setting every pixel value to `color`.
    pub fn clear(&mut self, color: Color) {
        let (w, h) = (self.width(), self.height());
        for y in 0..h {
            for x in 0..w {
                self.set(x, y, color);
            }
        }
    }

    /// Returns the raw sample data, in the image's [`ChannelOrder`].
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.buf.as_raw()
    }

    /// Consumes the image and returns the raw sample data, in the image's [`ChannelOrder`].
    pub fn into_raw(self) -> Vec<u8> {
        self.buf.into_raw()
    }

    /// Ensures that the image can be processed (ie. it has a non-zero size).
    pub(crate) fn check_dimensions(&self) -> Result<(), Error> {
        if self.resolution().is_empty() {
            return Err(Error::invalid_image(format!(
                "image has zero size ({})",
                self.resolution()
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} {:?} Image",
            self.width(),
            self.height(),
            self.order
        )
    }
}

/// An 8-bit RGB color.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Color(pub(crate) [u8; 3]);

impl Color {
    pub const BLACK: Self = Self([0, 0, 0]);
    pub const WHITE: Self = Self([255, 255, 255]);
    pub const RED: Self = Self([255, 0, 0]);
    pub const GREEN: Self = Self([0, 255, 0]);
    pub const BLUE: Self = Self([0, 0, 255]);
    pub const YELLOW: Self = Self([255, 255, 0]);
    pub const MAGENTA: Self = Self([255, 0, 255]);
    pub const CYAN: Self = Self([0, 255, 255]);

    #[inline]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b])
    }

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r(), self.g(), self.b())
    }
}

impl Index<usize> for Color {
    type Output = u8;

    #[inline]
    fn index(&self, index: usize) -> &u8 {
        &self.0[index]
    }
}

// FIXME leaks `embedded-graphics` dependency
impl PixelColor for Color {
    type Raw = RawU24;
}
