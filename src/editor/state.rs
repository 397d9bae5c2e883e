use std::sync::Arc;
use tokio::sync::RwLock;

use super::placement::Selection;
use crate::compose::Compositor;
use crate::template::TemplateParams;

/// Feed item re-rendered after every edit.
#[derive(Debug, Clone, Default)]
pub struct PreviewItem {
    pub title: String,
    pub price: Option<String>,
    pub image: Option<Vec<u8>>,
}

pub(crate) struct EditorState {
    pub(crate) params: RwLock<TemplateParams>,
    pub(crate) selection: RwLock<Selection>,
    pub(crate) compositor: Arc<Compositor>,
    pub(crate) preview: PreviewItem,
}

impl EditorState {
    pub(crate) fn new(
        params: TemplateParams,
        compositor: Arc<Compositor>,
        preview: PreviewItem,
    ) -> Self {
        Self {
            params: RwLock::new(params),
            selection: RwLock::new(Selection::default()),
            compositor,
            preview,
        }
    }
}
