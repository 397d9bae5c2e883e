use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, Rgba, RgbaImage};
use std::collections::VecDeque;
use std::process::Command;
use std::sync::Arc;
use tracing::debug;

use crate::settings::{BackgroundMode, BackgroundSettings};

const INPUT_PLACEHOLDER: &str = "{input}";
const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Turns a product photo into an image whose alpha isolates the subject.
pub trait BackgroundRemover: Send + Sync {
    fn name(&self) -> &'static str;

    fn remove(&self, image: &DynamicImage) -> Result<RgbaImage>;
}

/// Keeps whatever alpha the source already has. Opaque sources stay opaque.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlphaPassthrough;

impl BackgroundRemover for AlphaPassthrough {
    fn name(&self) -> &'static str {
        "alpha"
    }

    fn remove(&self, image: &DynamicImage) -> Result<RgbaImage> {
        Ok(image.to_rgba8())
    }
}

/// Flood-fills from the border and clears every connected pixel whose color is
/// within `tolerance` (per channel) of the border color.
#[derive(Debug, Clone, Copy)]
pub struct BorderKey {
    pub tolerance: u8,
}

impl Default for BorderKey {
    fn default() -> Self {
        Self { tolerance: 24 }
    }
}

impl BorderKey {
    fn reference_color(image: &RgbaImage) -> [u8; 3] {
        let (w, h) = image.dimensions();
        let corners = [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1)];
        let mut sum = [0u32; 3];
        for (x, y) in corners {
            let px = image.get_pixel(x, y).0;
            for channel in 0..3 {
                sum[channel] += px[channel] as u32;
            }
        }
        [(sum[0] / 4) as u8, (sum[1] / 4) as u8, (sum[2] / 4) as u8]
    }

    fn matches(&self, pixel: &Rgba<u8>, reference: [u8; 3]) -> bool {
        if pixel.0[3] == 0 {
            return true;
        }
        (0..3).all(|c| pixel.0[c].abs_diff(reference[c]) <= self.tolerance)
    }
}

impl BackgroundRemover for BorderKey {
    fn name(&self) -> &'static str {
        "border-key"
    }

    fn remove(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let mut rgba = image.to_rgba8();
        let (w, h) = rgba.dimensions();
        if w == 0 || h == 0 {
            return Err(anyhow!("cannot remove background of an empty image"));
        }
        let reference = Self::reference_color(&rgba);
        let mut visited = vec![false; (w as usize) * (h as usize)];
        let mut queue = VecDeque::new();
        let index = |x: u32, y: u32| (y as usize) * (w as usize) + x as usize;

        for x in 0..w {
            queue.push_back((x, 0));
            queue.push_back((x, h - 1));
        }
        for y in 0..h {
            queue.push_back((0, y));
            queue.push_back((w - 1, y));
        }

        let mut cleared = 0usize;
        while let Some((x, y)) = queue.pop_front() {
            let idx = index(x, y);
            if visited[idx] {
                continue;
            }
            visited[idx] = true;
            if !self.matches(rgba.get_pixel(x, y), reference) {
                continue;
            }
            rgba.get_pixel_mut(x, y).0[3] = 0;
            cleared += 1;
            if x > 0 {
                queue.push_back((x - 1, y));
            }
            if x + 1 < w {
                queue.push_back((x + 1, y));
            }
            if y > 0 {
                queue.push_back((x, y - 1));
            }
            if y + 1 < h {
                queue.push_back((x, y + 1));
            }
        }
        debug!(
            "background: border-key cleared {} of {} pixels",
            cleared,
            visited.len()
        );
        Ok(rgba)
    }
}

/// Runs an external tool (e.g. `rembg i {input} {output}`) on a PNG copy of the image.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let args = if args.is_empty() {
            vec![
                "i".to_string(),
                INPUT_PLACEHOLDER.to_string(),
                OUTPUT_PLACEHOLDER.to_string(),
            ]
        } else {
            args
        };
        Self {
            program: program.into(),
            args,
        }
    }
}

impl BackgroundRemover for ExternalCommand {
    fn name(&self) -> &'static str {
        "command"
    }

    fn remove(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let dir = tempfile::tempdir().with_context(|| "failed to create temp dir")?;
        let input = dir.path().join("input.png");
        let output = dir.path().join("output.png");
        image
            .save_with_format(&input, image::ImageFormat::Png)
            .with_context(|| format!("failed to write {}", input.display()))?;

        let args = self.args.iter().map(|arg| {
            arg.replace(INPUT_PLACEHOLDER, &input.to_string_lossy())
                .replace(OUTPUT_PLACEHOLDER, &output.to_string_lossy())
        });
        let result = Command::new(&self.program)
            .args(args)
            .output()
            .with_context(|| format!("failed to run {} (is it installed?)", self.program))?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(anyhow!("{} failed: {}", self.program, stderr.trim()));
        }
        let cutout = image::open(&output)
            .with_context(|| format!("{} produced no readable output", self.program))?;
        Ok(cutout.to_rgba8())
    }
}

pub fn build_remover(settings: &BackgroundSettings) -> Result<Arc<dyn BackgroundRemover>> {
    let remover: Arc<dyn BackgroundRemover> = match settings.mode {
        BackgroundMode::Alpha => Arc::new(AlphaPassthrough),
        BackgroundMode::BorderKey => Arc::new(BorderKey {
            tolerance: settings.tolerance,
        }),
        BackgroundMode::Command => {
            let program = settings
                .command
                .clone()
                .ok_or_else(|| anyhow!("background mode 'command' requires background.command"))?;
            Arc::new(ExternalCommand::new(program, settings.args.clone()))
        }
    };
    Ok(remover)
}
