use super::*;
use Color as C;

fn mkimage<const W: usize, const H: usize>(data: [[Color; W]; H], order: ChannelOrder) -> Image {
    let mut image = Image::new(W as u32, H as u32, order);
    for (y, row) in data.into_iter().enumerate() {
        for (x, color) in row.into_iter().enumerate() {
            image.set(x as u32, y as u32, color);
        }
    }
    image
}

#[test]
fn from_raw_validates() {
    let err = Image::from_raw(2, 2, 4, vec![0; 16], ChannelOrder::Rgb).unwrap_err();
    assert!(matches!(err, Error::InvalidImage(_)), "{err}");

    let err = Image::from_raw(0, 2, 3, Vec::new(), ChannelOrder::Rgb).unwrap_err();
    assert!(matches!(err, Error::InvalidImage(_)), "{err}");

    let err = Image::from_raw(2, 2, 3, vec![0; 11], ChannelOrder::Rgb).unwrap_err();
    assert!(err.to_string().contains("incorrect buffer size 11"), "{err}");

    let image = Image::from_raw(2, 1, 3, vec![1, 2, 3, 4, 5, 6], ChannelOrder::Rgb).unwrap();
    assert_eq!(image.resolution(), Resolution::new(2, 1));
    assert_eq!(image.get(1, 0), Color::from_rgb8(4, 5, 6));
}

#[test]
fn bgr_storage() {
    let image = Image::from_raw(1, 1, 3, vec![10, 20, 30], ChannelOrder::Bgr).unwrap();
    assert_eq!(image.get(0, 0), Color::from_rgb8(30, 20, 10));
    assert_eq!(image.to_rgb().as_raw().as_slice(), &[30, 20, 10]);

    let mut image = Image::new(1, 1, ChannelOrder::Bgr);
    image.set(0, 0, C::RED);
    assert_eq!(image.data(), &[0, 0, 255]);
    assert_eq!(image.get(0, 0), C::RED);
}

#[test]
fn rgb_conversion_borrows() {
    let image = mkimage([[C::RED, C::BLUE]], ChannelOrder::Rgb);
    assert!(matches!(image.to_rgb(), Cow::Borrowed(_)));

    let image = mkimage([[C::RED, C::BLUE]], ChannelOrder::Bgr);
    let rgb = image.to_rgb();
    assert!(matches!(rgb, Cow::Owned(_)));
    assert_eq!(rgb.as_raw().as_slice(), &[255, 0, 0, 0, 0, 255]);
}

#[test]
fn zero_size_is_rejected_on_use() {
    let image = Image::new(0, 5, ChannelOrder::Rgb);
    assert!(image.check_dimensions().is_err());
    assert!(Image::new(1, 1, ChannelOrder::Rgb).check_dimensions().is_ok());
}

#[test]
fn draw_filled_circle() {
    let mut image = Image::new(21, 21, ChannelOrder::Rgb);
    draw::circle(&mut image, 10, 10, 3).filled().color(C::GREEN);
    assert_eq!(image.get(10, 10), C::GREEN);
    assert_eq!(image.get(12, 10), C::GREEN);
    assert_eq!(image.get(10, 8), C::GREEN);
    assert_eq!(image.get(10, 15), C::BLACK);
    assert_eq!(image.get(0, 0), C::BLACK);
}

#[test]
fn draw_outlined_circle_leaves_center() {
    let mut image = Image::new(21, 21, ChannelOrder::Rgb);
    draw::circle(&mut image, 10, 10, 5);
    assert_eq!(image.get(10, 10), C::BLACK);
    assert_eq!(image.get(10, 5), C::GREEN);
}

#[test]
fn draw_rect_outline() {
    let mut image = Image::new(10, 10, ChannelOrder::Bgr);
    draw::rect(&mut image, 2, 2, 6, 6).color(C::BLUE);
    assert_eq!(image.get(2, 2), C::BLUE);
    assert_eq!(image.get(6, 6), C::BLUE);
    assert_eq!(image.get(4, 2), C::BLUE);
    assert_eq!(image.get(4, 4), C::BLACK);
    // stored in BGR order
    assert_eq!(&image.data()[(2 * 10 + 2) * 3..][..3], &[255, 0, 0]);
}

#[test]
fn drawing_is_clipped() {
    let mut image = Image::new(4, 4, ChannelOrder::Rgb);
    draw::line(&mut image, -10, 1, 10, 1).color(C::WHITE);
    draw::circle(&mut image, -100, -100, 5).filled();
    draw::marker(&mut image, 3, 3);
    for x in 0..4 {
        assert_eq!(image.get(x, 1), C::WHITE);
    }
    assert_eq!(image.get(3, 3), C::RED);
}

#[test]
fn polygon_outline() {
    let mut image = Image::new(10, 10, ChannelOrder::Rgb);
    draw::polygon(
        &mut image,
        [[1.0, 1.0], [8.0, 1.0], [8.0, 8.0], [1.0, 8.0]],
    )
    .color(C::YELLOW);
    assert_eq!(image.get(4, 1), C::YELLOW);
    assert_eq!(image.get(8, 4), C::YELLOW);
    assert_eq!(image.get(4, 8), C::YELLOW);
    assert_eq!(image.get(1, 4), C::YELLOW);
    assert_eq!(image.get(4, 4), C::BLACK);
}

#[test]
fn clear_sets_every_pixel() {
    let mut image = Image::new(3, 2, ChannelOrder::Bgr);
    image.clear(C::CYAN);
    for y in 0..2 {
        for x in 0..3 {
            assert_eq!(image.get(x, y), C::CYAN);
        }
    }
}
