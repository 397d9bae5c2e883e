use serde::{Deserialize, Serialize};

use super::placement::Selection;
use crate::template::{Point, TemplateParams};

#[derive(Debug, Deserialize)]
pub(crate) struct SelectRequest {
    pub(crate) element: Selection,
}

fn default_display_scale() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
pub(crate) struct PlaceRequest {
    pub(crate) x: f64,
    pub(crate) y: f64,
    #[serde(default = "default_display_scale")]
    pub(crate) display_scale: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct TemplateResponse {
    pub(crate) selection: Selection,
    pub(crate) params: TemplateParams,
}

#[derive(Debug, Serialize)]
pub(crate) struct PlaceResponse {
    pub(crate) selection: Selection,
    pub(crate) position: Point,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}
