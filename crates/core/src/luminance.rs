//! Cell crops and near-white suppression.
//!
//! Only very dark ink survives: every pixel whose luminance reaches the
//! threshold is painted white before recognition.

use image::{imageops, Rgb, RgbImage};
use pdf::Rect;

/// Default luminance cut-off (0-255).
pub const DEFAULT_THRESHOLD: u8 = 10;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// ITU-R BT.601 luma, rounded to the nearest integer.
pub fn luminance(pixel: &Rgb<u8>) -> u8 {
    let [r, g, b] = pixel.0;
    let y = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
    y.round().clamp(0.0, 255.0) as u8
}

/// Paint every pixel with `luminance >= threshold` white, in place.
/// Returns how many pixels changed.
pub fn suppress_light_pixels(image: &mut RgbImage, threshold: u8) -> usize {
    let mut changed = 0;
    for pixel in image.pixels_mut() {
        if luminance(pixel) >= threshold && *pixel != WHITE {
            *pixel = WHITE;
            changed += 1;
        }
    }
    changed
}

/// Pixel rectangle of a cell on a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Map a page-space rectangle to raster pixels.  Coordinates are scaled and
/// truncated, then clamped to the image; `None` when nothing is left.
pub fn pixel_box(rect: &Rect, scale: f32, image_width: u32, image_height: u32) -> Option<PixelBox> {
    let to_px = |v: f32, limit: u32| ((v * scale).floor().max(0.0) as u32).min(limit);

    let x0 = to_px(rect.x0, image_width);
    let y0 = to_px(rect.top, image_height);
    let x1 = to_px(rect.x1, image_width);
    let y1 = to_px(rect.bottom, image_height);

    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(PixelBox {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
    })
}

/// Crop a cell out of a page raster and clean it for recognition.
pub fn prepare_cell(page: &RgbImage, rect: &Rect, scale: f32, threshold: u8) -> Option<RgbImage> {
    let bx = pixel_box(rect, scale, page.width(), page.height())?;
    let mut crop = imageops::crop_imm(page, bx.x, bx.y, bx.width, bx.height).to_image();
    suppress_light_pixels(&mut crop, threshold);
    Some(crop)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient() -> RgbImage {
        RgbImage::from_fn(16, 16, |x, y| {
            let v = ((x + y * 16) % 256) as u8;
            Rgb([v, v / 2, 255 - v])
        })
    }

    #[test]
    fn test_luminance_of_primaries() {
        assert_eq!(luminance(&Rgb([0, 0, 0])), 0);
        assert_eq!(luminance(&Rgb([255, 255, 255])), 255);
        assert_eq!(luminance(&Rgb([255, 0, 0])), 76);
        assert_eq!(luminance(&Rgb([0, 255, 0])), 150);
        assert_eq!(luminance(&Rgb([0, 0, 255])), 29);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut img = RgbImage::from_pixel(1, 2, Rgb([9, 9, 9]));
        img.put_pixel(0, 1, Rgb([10, 10, 10]));
        suppress_light_pixels(&mut img, 10);
        assert_eq!(*img.get_pixel(0, 0), Rgb([9, 9, 9]));
        assert_eq!(*img.get_pixel(0, 1), WHITE);
    }

    #[test]
    fn test_suppression_is_idempotent() {
        for threshold in [0u8, 10, 128, 255] {
            let mut once = gradient();
            suppress_light_pixels(&mut once, threshold);
            let mut twice = once.clone();
            assert_eq!(suppress_light_pixels(&mut twice, threshold), 0);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_pixel_box_scales_and_truncates() {
        let r = Rect::new(10.0, 20.0, 30.5, 40.9);
        let bx = pixel_box(&r, 300.0 / 72.0, 10_000, 10_000).unwrap();
        assert_eq!(bx.x, 41);
        assert_eq!(bx.y, 83);
        assert_eq!(bx.x + bx.width, 127);
        assert_eq!(bx.y + bx.height, 170);
    }

    #[test]
    fn test_pixel_box_clamps_to_image() {
        let r = Rect::new(-5.0, 0.0, 50.0, 50.0);
        let bx = pixel_box(&r, 1.0, 20, 30).unwrap();
        assert_eq!(bx, PixelBox { x: 0, y: 0, width: 20, height: 30 });
    }

    #[test]
    fn test_empty_crop_is_none() {
        assert_eq!(pixel_box(&Rect::new(100.0, 0.0, 120.0, 10.0), 1.0, 50, 50), None);
        assert_eq!(pixel_box(&Rect::new(0.0, 0.0, 0.2, 10.0), 1.0, 50, 50), None);
    }

    #[test]
    fn test_prepare_cell_crops_and_cleans() {
        let mut page = RgbImage::from_pixel(20, 20, Rgb([200, 200, 200]));
        page.put_pixel(5, 5, Rgb([0, 0, 0]));
        let crop = prepare_cell(&page, &Rect::new(4.0, 4.0, 8.0, 8.0), 1.0, DEFAULT_THRESHOLD).unwrap();
        assert_eq!(crop.dimensions(), (4, 4));
        assert_eq!(*crop.get_pixel(1, 1), Rgb([0, 0, 0]));
        assert_eq!(*crop.get_pixel(0, 0), WHITE);
    }
}
