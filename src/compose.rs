use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use resvg::render;
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::Pixmap;
use tracing::{debug, warn};
use usvg::{Options, Tree};

use crate::font::Typeface;
use crate::layout::{compute_product_placement, line_spacing, wrap_text};
use crate::remover::BackgroundRemover;
use crate::template::{BRAND_PLACEHOLDER, Color, LogoSpec, Point, TemplateParams};

/// Text and photo of one catalog item.
#[derive(Debug, Clone, Copy)]
pub struct RenderInput<'a> {
    pub title: &'a str,
    pub price: Option<&'a str>,
    pub image: Option<&'a [u8]>,
}

pub struct Compositor {
    remover: Arc<dyn BackgroundRemover>,
    typeface: Typeface,
}

impl Compositor {
    pub fn new(remover: Arc<dyn BackgroundRemover>, typeface: Typeface) -> Self {
        Self { remover, typeface }
    }

    pub fn typeface(&self) -> &Typeface {
        &self.typeface
    }

    /// Renders one item onto a fresh canvas. Layers that cannot be produced are
    /// skipped; only a canvas that cannot be rasterized is an error.
    pub fn render(&self, input: &RenderInput<'_>, params: &TemplateParams) -> Result<RgbaImage> {
        let svg = self.compose_svg(input, params);
        rasterize(&svg, params.canvas_width, params.canvas_height, &self.typeface)
    }

    pub fn compose_svg(&self, input: &RenderInput<'_>, params: &TemplateParams) -> String {
        let width = params.canvas_width;
        let height = params.canvas_height;
        let palette = &params.palette;

        let mut svg = String::new();
        svg.push_str(&format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = width,
            h = height
        ));
        push_rect(&mut svg, 0, 0, width, height, palette.canvas);
        push_rect(
            &mut svg,
            0,
            0,
            params.zone_width(),
            params.zone_height(),
            palette.zone,
        );
        push_rect(
            &mut svg,
            0,
            params.footer_top(),
            width,
            params.footer_height,
            palette.footer,
        );

        if let Some(layer) = self.product_layer(input.image, params) {
            svg.push_str(&layer);
        }

        match &params.logo {
            LogoSpec::Image {
                asset,
                target_width,
            } => {
                if let Some(layer) = logo_layer(asset.image(), *target_width, params.logo_position)
                {
                    svg.push_str(&layer);
                }
            }
            LogoSpec::Text { font_size } => {
                self.push_text(
                    &mut svg,
                    BRAND_PLACEHOLDER,
                    params.logo_position,
                    *font_size,
                    palette.logo_text,
                );
            }
        }

        if let Some(label) = price_label(input.price, params) {
            self.push_text(
                &mut svg,
                &label,
                params.price_position,
                params.price_font_size,
                palette.price_text,
            );
        }

        let title_lines = wrap_text(
            input.title,
            &self.typeface,
            params.title_font_size as f32,
            params.title_position.x as f32,
            params.canvas_width as f32,
        );
        let spacing = line_spacing(params.title_font_size) as i32;
        for (idx, line) in title_lines.iter().enumerate() {
            let at = Point::new(
                params.title_position.x,
                params.title_position.y + spacing * idx as i32,
            );
            self.push_text(&mut svg, line, at, params.title_font_size, palette.title_text);
        }

        self.push_text(
            &mut svg,
            &params.footer_left_text,
            params.footer_left_position,
            params.footer_font_size,
            palette.footer_text,
        );
        self.push_text(
            &mut svg,
            &params.footer_right_text,
            params.footer_right_position,
            params.footer_font_size,
            palette.footer_text,
        );

        svg.push_str("</svg>");
        svg
    }

    fn product_layer(&self, bytes: Option<&[u8]>, params: &TemplateParams) -> Option<String> {
        let bytes = bytes?;
        let raw = match image::load_from_memory(bytes) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("product: failed to decode image ({}); zone left blank", err);
                return None;
            }
        };
        let cutout = match compute_product_placement(
            self.remover.as_ref(),
            &raw,
            params.zone_width(),
            params.zone_height(),
            params.padding,
        ) {
            Ok(cutout) => cutout,
            Err(err) => {
                warn!(
                    "product: {} failed ({}); zone left blank",
                    self.remover.name(),
                    err
                );
                return None;
            }
        };
        debug!(
            "product: scale {:.3} -> {}x{} at ({}, {})",
            cutout.placement.scale,
            cutout.placement.scaled_width,
            cutout.placement.scaled_height,
            cutout.placement.insert_x,
            cutout.placement.insert_y
        );
        let uri = png_data_uri(&cutout.image)
            .map_err(|err| warn!("product: {}", err))
            .ok()?;
        Some(image_element(
            &uri,
            cutout.placement.insert_x,
            cutout.placement.insert_y,
            cutout.placement.scaled_width,
            cutout.placement.scaled_height,
        ))
    }

    fn push_text(&self, svg: &mut String, text: &str, at: Point, font_size: u32, fill: Color) {
        if text.trim().is_empty() || font_size == 0 {
            return;
        }
        let baseline = at.y as f32 + self.typeface.ascent_px(font_size as f32);
        svg.push_str(&format!(
            r#"<text x="{x}" y="{y}" font-size="{size}" fill="{fill}" font-family="{family}">{text}</text>"#,
            x = at.x,
            y = baseline,
            size = font_size,
            fill = fill.svg(),
            family = escape_xml(self.typeface.family()),
            text = escape_xml(text)
        ));
    }
}

/// `"{price} {currency}"`, falling back to the placeholder. `None` means no price layer.
pub fn price_label(clean_price: Option<&str>, params: &TemplateParams) -> Option<String> {
    let value = clean_price
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| params.price_placeholder.clone())?;
    if params.currency_suffix.is_empty() {
        Some(value)
    } else {
        Some(format!("{} {}", value, params.currency_suffix))
    }
}

fn logo_layer(logo: &RgbaImage, target_width: u32, at: Point) -> Option<String> {
    let (w, h) = logo.dimensions();
    if target_width == 0 || w == 0 || h == 0 {
        return None;
    }
    let target_height = ((h as f64 * target_width as f64 / w as f64).round() as u32).max(1);
    let scaled = imageops::resize(logo, target_width, target_height, FilterType::Lanczos3);
    let uri = png_data_uri(&scaled)
        .map_err(|err| warn!("logo: {}", err))
        .ok()?;
    Some(image_element(
        &uri,
        at.x as i64,
        at.y as i64,
        target_width,
        target_height,
    ))
}

fn push_rect(svg: &mut String, x: u32, y: u32, w: u32, h: u32, fill: Color) {
    if w == 0 || h == 0 {
        return;
    }
    svg.push_str(&format!(
        r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="{fill}"/>"#,
        fill = fill.svg()
    ));
}

fn image_element(uri: &str, x: i64, y: i64, w: u32, h: u32) -> String {
    format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="{x}" y="{y}" width="{w}" height="{h}" preserveAspectRatio="none"/>"#
    )
}

fn png_data_uri(image: &RgbaImage) -> Result<String> {
    let bytes = encode_png(image)?;
    Ok(format!("data:image/png;base64,{}", BASE64.encode(bytes)))
}

fn rasterize(svg: &str, width: u32, height: u32, typeface: &Typeface) -> Result<RgbaImage> {
    let options = Options {
        fontdb: typeface.database(),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse SVG")?;
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| anyhow!("failed to allocate {}x{} canvas", width, height))?;
    let mut pixmap_mut = pixmap.as_mut();
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);
    RgbaImage::from_raw(width, height, pixmap.take())
        .ok_or_else(|| anyhow!("failed to build image buffer from SVG"))
}

pub fn encode_jpeg(image: &RgbaImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(image.clone()).into_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(&rgb)
        .with_context(|| "failed to encode JPEG")?;
    Ok(bytes)
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut cursor = Cursor::new(&mut bytes);
    image
        .write_to(&mut cursor, image::ImageFormat::Png)
        .with_context(|| "failed to encode PNG")?;
    Ok(bytes)
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
