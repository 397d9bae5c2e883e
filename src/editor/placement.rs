use serde::{Deserialize, Serialize};

use crate::template::{Point, TemplateParams};

/// Template element that the next click moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    #[default]
    Logo,
    Price,
    Title,
    FooterLeft,
    FooterRight,
}

/// Maps a click on the scaled-down preview back to canvas pixels.
pub fn map_click(screen_x: f64, screen_y: f64, display_scale: f64) -> Point {
    Point::new(
        (screen_x * display_scale).round() as i32,
        (screen_y * display_scale).round() as i32,
    )
}

/// Moves the selected element to `at`. The logo is centered on the click,
/// everything else is anchored by its top-left corner.
pub fn apply_click(params: &mut TemplateParams, selection: Selection, at: Point) -> Point {
    let anchor = match selection {
        Selection::Logo => {
            let half = (params.logo.nominal_size() / 2) as i32;
            Point::new(at.x.saturating_sub(half), at.y.saturating_sub(half))
        }
        _ => at,
    };
    let slot = match selection {
        Selection::Logo => &mut params.logo_position,
        Selection::Price => &mut params.price_position,
        Selection::Title => &mut params.title_position,
        Selection::FooterLeft => &mut params.footer_left_position,
        Selection::FooterRight => &mut params.footer_right_position,
    };
    *slot = anchor;
    anchor
}
