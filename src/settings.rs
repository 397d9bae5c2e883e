use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::template::{LogoAsset, LogoSpec, Point, TemplateParams};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackgroundMode {
    BorderKey,
    Alpha,
    Command,
}

#[derive(Debug, Clone)]
pub struct BackgroundSettings {
    pub mode: BackgroundMode,
    pub tolerance: u8,
    pub command: Option<String>,
    pub args: Vec<String>,
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self {
            mode: BackgroundMode::BorderKey,
            tolerance: 24,
            command: None,
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub zone_fraction: f32,
    pub padding: u32,
    pub footer_height: u32,
    pub logo_x: i32,
    pub logo_y: i32,
    pub logo_font_size: u32,
    pub logo_width: u32,
    pub logo_path: Option<String>,
    pub price_x: i32,
    pub price_y: i32,
    pub price_font_size: u32,
    pub currency: String,
    pub price_placeholder: Option<String>,
    pub title_x: i32,
    pub title_y: i32,
    pub title_font_size: u32,
    pub footer_font_size: u32,
    pub footer_left_text: String,
    pub footer_left_x: i32,
    pub footer_left_y: Option<i32>,
    pub footer_right_text: String,
    pub footer_right_x: i32,
    pub footer_right_y: Option<i32>,
    pub font_path: Option<String>,
    pub font_family: Option<String>,
    pub background: BackgroundSettings,
    pub workers: usize,
    pub timeout_secs: u64,
    pub jpeg_quality: u8,
    pub image_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            canvas_width: 1080,
            canvas_height: 1350,
            zone_fraction: 0.6,
            padding: 50,
            footer_height: 150,
            logo_x: 700,
            logo_y: 80,
            logo_font_size: 200,
            logo_width: 200,
            logo_path: None,
            price_x: 700,
            price_y: 500,
            price_font_size: 180,
            currency: "UAH".to_string(),
            price_placeholder: None,
            title_x: 700,
            title_y: 750,
            title_font_size: 95,
            footer_font_size: 65,
            footer_left_text: "FREE DELIVERY".to_string(),
            footer_left_x: 50,
            footer_left_y: None,
            footer_right_text: "30 DAYS".to_string(),
            footer_right_x: 600,
            footer_right_y: None,
            font_path: None,
            font_family: None,
            background: BackgroundSettings::default(),
            workers: 1,
            timeout_secs: 10,
            jpeg_quality: 95,
            image_base_url: "https://YOUR-SITE".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    canvas: Option<CanvasSection>,
    logo: Option<LogoSection>,
    price: Option<PriceSection>,
    title: Option<TitleSection>,
    footer: Option<FooterSection>,
    font: Option<FontSection>,
    background: Option<BackgroundSection>,
    batch: Option<BatchSection>,
}

#[derive(Debug, Default, Deserialize)]
struct CanvasSection {
    width: Option<u32>,
    height: Option<u32>,
    zone_fraction: Option<f32>,
    padding: Option<u32>,
    footer_height: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LogoSection {
    x: Option<i32>,
    y: Option<i32>,
    font_size: Option<u32>,
    width: Option<u32>,
    path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PriceSection {
    x: Option<i32>,
    y: Option<i32>,
    font_size: Option<u32>,
    currency: Option<String>,
    placeholder: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TitleSection {
    x: Option<i32>,
    y: Option<i32>,
    font_size: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct FooterSection {
    font_size: Option<u32>,
    left_text: Option<String>,
    left_x: Option<i32>,
    left_y: Option<i32>,
    right_text: Option<String>,
    right_x: Option<i32>,
    right_y: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct FontSection {
    path: Option<String>,
    family: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BackgroundSection {
    mode: Option<BackgroundMode>,
    tolerance: Option<u8>,
    command: Option<String>,
    args: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct BatchSection {
    workers: Option<usize>,
    timeout_secs: Option<u64>,
    jpeg_quality: Option<u8>,
    image_base_url: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings
                .merge_toml(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        }
    }

    Ok(settings)
}

impl Settings {
    pub fn merge_toml(&mut self, content: &str) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)?;
        self.merge(parsed);
        Ok(())
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(canvas) = incoming.canvas {
            if let Some(width) = canvas.width.filter(|v| *v > 0) {
                self.canvas_width = width;
            }
            if let Some(height) = canvas.height.filter(|v| *v > 0) {
                self.canvas_height = height;
            }
            if let Some(fraction) = canvas.zone_fraction {
                if fraction > 0.0 && fraction <= 1.0 {
                    self.zone_fraction = fraction;
                }
            }
            if let Some(padding) = canvas.padding {
                self.padding = padding;
            }
            if let Some(height) = canvas.footer_height {
                self.footer_height = height;
            }
        }
        if let Some(logo) = incoming.logo {
            if let Some(x) = logo.x {
                self.logo_x = x;
            }
            if let Some(y) = logo.y {
                self.logo_y = y;
            }
            if let Some(size) = logo.font_size.filter(|v| *v > 0) {
                self.logo_font_size = size;
            }
            if let Some(width) = logo.width.filter(|v| *v > 0) {
                self.logo_width = width;
            }
            if let Some(path) = logo.path {
                if !path.trim().is_empty() {
                    self.logo_path = Some(path);
                }
            }
        }
        if let Some(price) = incoming.price {
            if let Some(x) = price.x {
                self.price_x = x;
            }
            if let Some(y) = price.y {
                self.price_y = y;
            }
            if let Some(size) = price.font_size.filter(|v| *v > 0) {
                self.price_font_size = size;
            }
            if let Some(currency) = price.currency {
                self.currency = currency;
            }
            if let Some(placeholder) = price.placeholder {
                self.price_placeholder = Some(placeholder);
            }
        }
        if let Some(title) = incoming.title {
            if let Some(x) = title.x {
                self.title_x = x;
            }
            if let Some(y) = title.y {
                self.title_y = y;
            }
            if let Some(size) = title.font_size.filter(|v| *v > 0) {
                self.title_font_size = size;
            }
        }
        if let Some(footer) = incoming.footer {
            if let Some(size) = footer.font_size.filter(|v| *v > 0) {
                self.footer_font_size = size;
            }
            if let Some(text) = footer.left_text {
                self.footer_left_text = text;
            }
            if let Some(x) = footer.left_x {
                self.footer_left_x = x;
            }
            if let Some(y) = footer.left_y {
                self.footer_left_y = Some(y);
            }
            if let Some(text) = footer.right_text {
                self.footer_right_text = text;
            }
            if let Some(x) = footer.right_x {
                self.footer_right_x = x;
            }
            if let Some(y) = footer.right_y {
                self.footer_right_y = Some(y);
            }
        }
        if let Some(font) = incoming.font {
            if let Some(path) = font.path {
                if !path.trim().is_empty() {
                    self.font_path = Some(path);
                }
            }
            if let Some(family) = font.family {
                if !family.trim().is_empty() {
                    self.font_family = Some(family);
                }
            }
        }
        if let Some(background) = incoming.background {
            if let Some(mode) = background.mode {
                self.background.mode = mode;
            }
            if let Some(tolerance) = background.tolerance {
                self.background.tolerance = tolerance;
            }
            if let Some(command) = background.command {
                if !command.trim().is_empty() {
                    self.background.command = Some(command);
                }
            }
            if let Some(args) = background.args {
                self.background.args = args;
            }
        }
        if let Some(batch) = incoming.batch {
            if let Some(workers) = batch.workers {
                self.workers = workers;
            }
            if let Some(secs) = batch.timeout_secs.filter(|v| *v > 0) {
                self.timeout_secs = secs;
            }
            if let Some(quality) = batch.jpeg_quality {
                if (1..=100).contains(&quality) {
                    self.jpeg_quality = quality;
                }
            }
            if let Some(url) = batch.image_base_url {
                if !url.trim().is_empty() {
                    self.image_base_url = url;
                }
            }
        }
    }

    /// Worker count with `0` meaning one per CPU.
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Builds the render template. The logo variant follows the presence of a logo image.
    pub fn template_params(&self, logo: Option<LogoAsset>) -> TemplateParams {
        let footer_y = self.canvas_height as i32 - self.footer_height as i32 + 40;
        let logo = match logo {
            Some(asset) => LogoSpec::Image {
                asset,
                target_width: self.logo_width,
            },
            None => LogoSpec::Text {
                font_size: self.logo_font_size,
            },
        };
        let params = TemplateParams {
            canvas_width: self.canvas_width,
            canvas_height: self.canvas_height,
            product_zone_width_fraction: self.zone_fraction,
            footer_height: self.footer_height.min(self.canvas_height),
            padding: self.padding,
            logo,
            logo_position: Point::new(self.logo_x, self.logo_y),
            price_position: Point::new(self.price_x, self.price_y),
            title_position: Point::new(self.title_x, self.title_y),
            footer_left_position: Point::new(
                self.footer_left_x,
                self.footer_left_y.unwrap_or(footer_y),
            ),
            footer_right_position: Point::new(
                self.footer_right_x,
                self.footer_right_y.unwrap_or(footer_y),
            ),
            price_font_size: self.price_font_size,
            title_font_size: self.title_font_size,
            footer_font_size: self.footer_font_size,
            footer_left_text: self.footer_left_text.clone(),
            footer_right_text: self.footer_right_text.clone(),
            currency_suffix: self.currency.clone(),
            price_placeholder: self.price_placeholder.clone(),
            ..TemplateParams::default()
        };
        for name in params.out_of_bounds_anchors() {
            warn!("settings: {} anchor lies outside the canvas and will clip", name);
        }
        params
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".feed-composer"))
        }
    })
}
