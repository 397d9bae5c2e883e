use anyhow::{Context, Result, anyhow};
use image::RgbaImage;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

pub const BRAND_PLACEHOLDER: &str = "BRAND";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Color(pub u8, pub u8, pub u8);

impl Color {
    pub const WHITE: Color = Color(255, 255, 255);
    pub const BLACK: Color = Color(0, 0, 0);

    pub(crate) fn svg(&self) -> String {
        format!("rgb({},{},{})", self.0, self.1, self.2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Palette {
    pub canvas: Color,
    pub zone: Color,
    pub footer: Color,
    pub logo_text: Color,
    pub price_text: Color,
    pub title_text: Color,
    pub footer_text: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            canvas: Color::WHITE,
            zone: Color(235, 235, 235),
            footer: Color::BLACK,
            logo_text: Color(30, 30, 30),
            price_text: Color::BLACK,
            title_text: Color(30, 30, 30),
            footer_text: Color::WHITE,
        }
    }
}

/// Decoded logo image shared by every render of a batch.
#[derive(Clone)]
pub struct LogoAsset {
    image: Arc<RgbaImage>,
}

impl std::fmt::Debug for LogoAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogoAsset")
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .finish()
    }
}

impl LogoAsset {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read logo: {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("invalid logo: {}", path.display()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(bytes).with_context(|| "failed to decode logo")?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(anyhow!("logo image is empty"));
        }
        Ok(Self::from_image(decoded.to_rgba8()))
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        self.image.as_ref()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LogoSpec {
    /// Draw the brand placeholder text.
    Text { font_size: u32 },
    /// Paste the logo image scaled to `target_width`.
    Image {
        #[serde(skip)]
        asset: LogoAsset,
        target_width: u32,
    },
}

impl LogoSpec {
    /// Size used when the editor centers the logo on a click.
    pub fn nominal_size(&self) -> u32 {
        match self {
            LogoSpec::Text { font_size } => *font_size,
            LogoSpec::Image { target_width, .. } => *target_width,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateParams {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub product_zone_width_fraction: f32,
    pub footer_height: u32,
    pub padding: u32,
    pub logo: LogoSpec,
    pub logo_position: Point,
    pub price_position: Point,
    pub title_position: Point,
    pub footer_left_position: Point,
    pub footer_right_position: Point,
    pub price_font_size: u32,
    pub title_font_size: u32,
    pub footer_font_size: u32,
    pub footer_left_text: String,
    pub footer_right_text: String,
    pub currency_suffix: String,
    pub price_placeholder: Option<String>,
    pub palette: Palette,
}

impl Default for TemplateParams {
    fn default() -> Self {
        let canvas_height = 1350;
        let footer_height = 150;
        let footer_y = (canvas_height - footer_height + 40) as i32;
        Self {
            canvas_width: 1080,
            canvas_height,
            product_zone_width_fraction: 0.6,
            footer_height,
            padding: 50,
            logo: LogoSpec::Text { font_size: 200 },
            logo_position: Point::new(700, 80),
            price_position: Point::new(700, 500),
            title_position: Point::new(700, 750),
            footer_left_position: Point::new(50, footer_y),
            footer_right_position: Point::new(600, footer_y),
            price_font_size: 180,
            title_font_size: 95,
            footer_font_size: 65,
            footer_left_text: "FREE DELIVERY".to_string(),
            footer_right_text: "30 DAYS".to_string(),
            currency_suffix: "UAH".to_string(),
            price_placeholder: None,
            palette: Palette::default(),
        }
    }
}

impl TemplateParams {
    pub fn zone_width(&self) -> u32 {
        (self.canvas_width as f32 * self.product_zone_width_fraction) as u32
    }

    /// Height of the product zone, i.e. everything above the footer band.
    pub fn zone_height(&self) -> u32 {
        self.canvas_height.saturating_sub(self.footer_height)
    }

    pub fn footer_top(&self) -> u32 {
        self.zone_height()
    }

    /// Names of anchors that fall outside the canvas. Rendering keeps them as-is.
    pub fn out_of_bounds_anchors(&self) -> Vec<&'static str> {
        let w = self.canvas_width as i32;
        let h = self.canvas_height as i32;
        [
            ("logo", self.logo_position),
            ("price", self.price_position),
            ("title", self.title_position),
            ("footer_left", self.footer_left_position),
            ("footer_right", self.footer_right_position),
        ]
        .into_iter()
        .filter(|(_, p)| p.x < 0 || p.y < 0 || p.x >= w || p.y >= h)
        .map(|(name, _)| name)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_matches_reference_geometry() {
        let params = TemplateParams::default();
        assert_eq!(params.zone_width(), 648);
        assert_eq!(params.zone_height(), 1200);
        assert_eq!(params.footer_left_position, Point::new(50, 1240));
        assert!(params.out_of_bounds_anchors().is_empty());
    }

    #[test]
    fn anchors_outside_canvas_are_reported() {
        let params = TemplateParams {
            title_position: Point::new(700, 1400),
            logo_position: Point::new(-5, 10),
            ..TemplateParams::default()
        };
        assert_eq!(params.out_of_bounds_anchors(), vec!["logo", "title"]);
    }

    #[test]
    fn logo_from_png_keeps_alpha_channel() {
        let mut png = Vec::new();
        let img = RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 128]));
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .expect("encode png");
        let logo = LogoAsset::from_bytes(&png).expect("logo");
        assert_eq!(logo.image().get_pixel(0, 0).0[3], 128);
        assert_eq!(logo.image().dimensions(), (4, 2));
    }

    #[test]
    fn nominal_size_follows_variant() {
        assert_eq!(LogoSpec::Text { font_size: 120 }.nominal_size(), 120);
        let asset = LogoAsset::from_image(RgbaImage::new(2, 2));
        let spec = LogoSpec::Image {
            asset,
            target_width: 300,
        };
        assert_eq!(spec.nominal_size(), 300);
    }
}
