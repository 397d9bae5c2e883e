//! Pixel geometry for a render: product cutout placement and title wrapping.
//!
//! Nothing here touches the canvas. The compositor turns these numbers into layers.

use anyhow::{Result, anyhow};
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};

use crate::font::Typeface;
use crate::remover::BackgroundRemover;

/// Right margin kept free of title text.
pub const WRAP_MARGIN: f32 = 20.0;
/// Extra space between wrapped title lines, on top of the font size.
pub const LINE_GAP: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub scale: f64,
    pub insert_x: i64,
    pub insert_y: i64,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub available_width: u32,
    pub available_height: u32,
}

/// Cutout resized to its placement, ready to paste.
#[derive(Debug, Clone)]
pub struct ProductCutout {
    pub image: RgbaImage,
    pub placement: Placement,
}

/// Tight box around pixels with non-zero alpha.
pub fn bounding_box(image: &RgbaImage) -> Option<Rect> {
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0u32;
    let mut max_y = 0u32;
    let mut found = false;
    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel.0[3] == 0 {
            continue;
        }
        found = true;
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    if !found {
        return None;
    }
    Some(Rect {
        x: min_x,
        y: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    })
}

/// Crops to the visible content. A fully transparent image is returned whole.
pub fn crop_to_content(image: &RgbaImage) -> RgbaImage {
    match bounding_box(image) {
        Some(rect) => imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image(),
        None => image.clone(),
    }
}

/// Uniform scale that fits `content` inside the padded zone, centered in the zone.
pub fn place_in_zone(
    content_width: u32,
    content_height: u32,
    zone_width: u32,
    zone_height: u32,
    padding: u32,
) -> Result<Placement> {
    if content_width == 0 || content_height == 0 {
        return Err(anyhow!("product image is empty"));
    }
    let available_width = zone_width as i64 - 2 * padding as i64;
    let available_height = zone_height as i64 - 2 * padding as i64;
    if available_width <= 0 || available_height <= 0 {
        return Err(anyhow!(
            "padding {} leaves no room in a {}x{} zone",
            padding,
            zone_width,
            zone_height
        ));
    }
    let available_width = available_width as u32;
    let available_height = available_height as u32;

    let scale = f64::min(
        available_width as f64 / content_width as f64,
        available_height as f64 / content_height as f64,
    );
    let scaled_width = ((content_width as f64 * scale).round() as u32).clamp(1, available_width);
    let scaled_height = ((content_height as f64 * scale).round() as u32).clamp(1, available_height);

    Ok(Placement {
        scale,
        insert_x: (zone_width as i64 - scaled_width as i64) / 2,
        insert_y: (zone_height as i64 - scaled_height as i64) / 2,
        scaled_width,
        scaled_height,
        available_width,
        available_height,
    })
}

/// Background removal, crop, fit and resize of a raw product photo.
pub fn compute_product_placement(
    remover: &dyn BackgroundRemover,
    raw: &DynamicImage,
    zone_width: u32,
    zone_height: u32,
    padding: u32,
) -> Result<ProductCutout> {
    let foreground = remover.remove(raw)?;
    let cropped = crop_to_content(&foreground);
    let placement = place_in_zone(
        cropped.width(),
        cropped.height(),
        zone_width,
        zone_height,
        padding,
    )?;
    let image = imageops::resize(
        &cropped,
        placement.scaled_width,
        placement.scaled_height,
        FilterType::Lanczos3,
    );
    Ok(ProductCutout { image, placement })
}

/// Greedy word wrap. A line is accepted while `origin_x + width < canvas_width - 20`.
/// A rejected word commits the current line, even an empty one, and starts the next.
/// The last line is always kept.
pub fn wrap_text(
    text: &str,
    typeface: &Typeface,
    font_size: f32,
    origin_x: f32,
    canvas_width: f32,
) -> Vec<String> {
    let limit = canvas_width - WRAP_MARGIN;
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let tentative = format!("{}{} ", current, word);
        if origin_x + typeface.measure(&tentative, font_size) < limit {
            current = tentative;
        } else {
            lines.push(std::mem::replace(&mut current, format!("{} ", word)));
        }
    }
    lines.push(current);
    lines
}

pub fn line_spacing(font_size: u32) -> u32 {
    font_size + LINE_GAP
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remover::AlphaPassthrough;
    use image::Rgba;

    #[test]
    fn reference_placement_example() {
        let placement = place_in_zone(800, 1200, 648, 1200, 50).expect("placement");
        assert_eq!(placement.available_width, 548);
        assert_eq!(placement.available_height, 1100);
        assert!((placement.scale - 0.685).abs() < 1e-9);
        assert_eq!(placement.scaled_width, 548);
        assert_eq!(placement.scaled_height, 822);
        assert_eq!(placement.insert_x, 50);
        assert_eq!(placement.insert_y, 189);
    }

    #[test]
    fn small_images_are_upscaled() {
        let placement = place_in_zone(10, 20, 648, 1200, 50).expect("placement");
        assert!(placement.scale > 1.0);
        assert_eq!(placement.scaled_width, 548);
        assert_eq!(placement.scaled_height, 1096);
    }

    #[test]
    fn placement_stays_inside_available_area() {
        let sizes = [(1, 1), (3, 997), (997, 3), (640, 480), (1920, 1080), (4000, 4001)];
        for (w, h) in sizes {
            for padding in [0, 13, 50, 200] {
                let p = place_in_zone(w, h, 648, 1200, padding).expect("placement");
                assert!(p.insert_x >= 0 && p.insert_y >= 0, "{}x{} pad {}", w, h, padding);
                assert!(p.scaled_width <= p.available_width);
                assert!(p.scaled_height <= p.available_height);
                let fits_w = (p.scaled_width as f64 - w as f64 * p.scale).abs() <= 1.0;
                let fits_h = (p.scaled_height as f64 - h as f64 * p.scale).abs() <= 1.0;
                assert!(fits_w && fits_h);
            }
        }
    }

    #[test]
    fn oversized_padding_fails() {
        assert!(place_in_zone(100, 100, 648, 1200, 324).is_err());
    }

    #[test]
    fn bounding_box_ignores_transparent_pixels() {
        let mut img = RgbaImage::from_pixel(10, 8, Rgba([0, 0, 0, 0]));
        img.put_pixel(2, 3, Rgba([255, 0, 0, 255]));
        img.put_pixel(6, 5, Rgba([255, 0, 0, 10]));
        let rect = bounding_box(&img).expect("bbox");
        assert_eq!(
            rect,
            Rect {
                x: 2,
                y: 3,
                width: 5,
                height: 3
            }
        );
        assert_eq!(crop_to_content(&img).dimensions(), (5, 3));
    }

    #[test]
    fn fully_transparent_image_is_not_cropped() {
        let img = RgbaImage::from_pixel(30, 40, Rgba([0, 0, 0, 0]));
        assert!(bounding_box(&img).is_none());
        assert_eq!(crop_to_content(&img).dimensions(), (30, 40));
        let raw = DynamicImage::ImageRgba8(img);
        let cutout =
            compute_product_placement(&AlphaPassthrough, &raw, 648, 1200, 50).expect("cutout");
        assert_eq!(cutout.placement.scaled_width, 548);
    }

    #[test]
    fn cutout_is_resized_to_placement() {
        let mut img = RgbaImage::from_pixel(200, 200, Rgba([0, 0, 0, 0]));
        for y in 50..150 {
            for x in 20..120 {
                img.put_pixel(x, y, Rgba([200, 10, 10, 255]));
            }
        }
        let raw = DynamicImage::ImageRgba8(img);
        let cutout =
            compute_product_placement(&AlphaPassthrough, &raw, 648, 1200, 50).expect("cutout");
        assert_eq!(cutout.image.dimensions(), (548, 548));
        assert_eq!(cutout.placement.insert_x, 50);
        assert_eq!(cutout.placement.insert_y, 326);
    }

    #[test]
    fn wraps_reference_title_with_estimated_metrics() {
        let typeface = Typeface::estimated();
        let lines = wrap_text("Red Leather Wallet For Men", &typeface, 50.0, 700.0, 1080.0);
        assert_eq!(lines, vec!["Red Leather ", "Wallet For ", "Men "]);
        for line in &lines {
            assert!(700.0 + typeface.measure(line, 50.0) < 1060.0);
        }
    }

    #[test]
    fn long_word_is_emitted_on_its_own_line() {
        let typeface = Typeface::estimated();
        let lines = wrap_text(
            "Supercalifragilisticexpialidocious bag",
            &typeface,
            95.0,
            700.0,
            1080.0,
        );
        assert_eq!(lines, vec!["", "Supercalifragilisticexpialidocious ", "bag "]);
    }

    #[test]
    fn long_word_after_short_one_does_not_leave_blank_line() {
        let typeface = Typeface::estimated();
        let lines = wrap_text(
            "Big Supercalifragilisticexpialidocious",
            &typeface,
            95.0,
            700.0,
            1080.0,
        );
        assert_eq!(lines, vec!["Big ", "Supercalifragilisticexpialidocious "]);
    }

    #[test]
    fn empty_title_keeps_one_line() {
        let typeface = Typeface::estimated();
        assert_eq!(wrap_text("   ", &typeface, 95.0, 700.0, 1080.0), vec![""]);
    }

    #[test]
    fn wrapping_is_deterministic() {
        let typeface = Typeface::estimated();
        let title = "Classic cotton t-shirt with a round neck and short sleeves";
        let first = wrap_text(title, &typeface, 60.0, 650.0, 1080.0);
        let second = wrap_text(title, &typeface, 60.0, 650.0, 1080.0);
        assert_eq!(first, second);
        assert!(first.len() > 1);
    }

    #[test]
    fn line_spacing_adds_gap() {
        assert_eq!(line_spacing(95), 105);
    }
}
