use thiserror::Error;

/// Reason a single feed item produced no artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemError {
    #[error("required field '{field}' is missing")]
    FieldMissing { field: &'static str },

    #[error("failed to fetch product image: {0}")]
    ImageFetch(String),

    #[error("failed to render item: {0}")]
    Render(String),
}

impl ItemError {
    pub fn kind(&self) -> &'static str {
        match self {
            ItemError::FieldMissing { .. } => "field_missing",
            ItemError::ImageFetch(_) => "image_fetch",
            ItemError::Render(_) => "render",
        }
    }
}
