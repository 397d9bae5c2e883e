use futures_util::StreamExt;
use futures_util::stream;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

use crate::compose::{Compositor, RenderInput, encode_jpeg};
use crate::error::ItemError;
use crate::feed::{FeedEntry, ProductItem};
use crate::fetch::ImageFetcher;
use crate::template::TemplateParams;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub workers: usize,
    pub jpeg_quality: u8,
    pub image_base_url: String,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            jpeg_quality: 95,
            image_base_url: "https://YOUR-SITE".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    pub index: usize,
    pub name: String,
    pub bytes: Vec<u8>,
}

impl RenderedArtifact {
    pub fn file_name(index: usize) -> String {
        format!("img_{}.jpg", index)
    }

    pub fn archive_path(&self) -> String {
        format!("images/{}", self.name)
    }

    pub fn public_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.archive_path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub index: usize,
    pub error: ItemError,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub total: usize,
    pub artifacts: Vec<RenderedArtifact>,
    pub failures: Vec<ItemFailure>,
}

impl BatchReport {
    /// New image link per rendered item, keyed by item index.
    pub fn link_rewrites(&self, base_url: &str) -> BTreeMap<usize, String> {
        self.artifacts
            .iter()
            .map(|artifact| (artifact.index, artifact.public_url(base_url)))
            .collect()
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "rendered {}/{} items ({} skipped)",
            self.artifacts.len(),
            self.total,
            self.failures.len()
        )];
        for failure in &self.failures {
            lines.push(format!("  item {}: {}", failure.index, failure.error));
        }
        lines.join("\n")
    }
}

/// Renders every feed entry. Per-item failures are recorded in the report and
/// never abort the run. With `workers > 1` items are processed concurrently
/// and the report is put back into feed order.
pub async fn run_batch<F, P>(
    entries: &[FeedEntry],
    params: &TemplateParams,
    compositor: Arc<Compositor>,
    fetcher: &F,
    options: &BatchOptions,
    on_progress: P,
) -> BatchReport
where
    F: ImageFetcher,
    P: Fn(Progress) + Send + Sync,
{
    let total = entries.len();
    let completed = AtomicUsize::new(0);
    info!(
        "batch: {} items, {} worker(s)",
        total,
        options.workers.max(1)
    );

    let results: Vec<(usize, Result<RenderedArtifact, ItemError>)> = stream::iter(entries)
        .map(|entry| {
            let compositor = compositor.clone();
            let completed = &completed;
            let on_progress = &on_progress;
            async move {
                let result = match &entry.item {
                    Ok(item) => process_item(item, params, compositor, fetcher, options).await,
                    Err(err) => Err(err.clone()),
                };
                if let Err(err) = &result {
                    warn!("batch: item {} skipped: {}", entry.index, err);
                }
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                on_progress(Progress {
                    completed: done,
                    total,
                });
                (entry.index, result)
            }
        })
        .buffer_unordered(options.workers.max(1))
        .collect()
        .await;

    let mut report = BatchReport {
        total,
        ..BatchReport::default()
    };
    for (index, result) in results {
        match result {
            Ok(artifact) => report.artifacts.push(artifact),
            Err(error) => report.failures.push(ItemFailure { index, error }),
        }
    }
    report.artifacts.sort_by_key(|artifact| artifact.index);
    report.failures.sort_by_key(|failure| failure.index);
    info!(
        "batch: {} rendered, {} skipped",
        report.artifacts.len(),
        report.failures.len()
    );
    report
}

async fn process_item<F: ImageFetcher>(
    item: &ProductItem,
    params: &TemplateParams,
    compositor: Arc<Compositor>,
    fetcher: &F,
    options: &BatchOptions,
) -> Result<RenderedArtifact, ItemError> {
    let image = fetcher
        .fetch(&item.image_url)
        .await
        .map_err(|err| ItemError::ImageFetch(format!("{:#}", err)))?;

    let index = item.index;
    let title = item.title.clone();
    let price = item.clean_price();
    let params = params.clone();
    let quality = options.jpeg_quality;
    let bytes = tokio::task::spawn_blocking(move || {
        let input = RenderInput {
            title: &title,
            price: price.as_deref(),
            image: Some(&image),
        };
        let canvas = compositor.render(&input, &params)?;
        encode_jpeg(&canvas, quality)
    })
    .await
    .map_err(|err| ItemError::Render(format!("render task failed: {}", err)))?
    .map_err(|err| ItemError::Render(format!("{:#}", err)))?;

    Ok(RenderedArtifact {
        index,
        name: RenderedArtifact::file_name(index),
        bytes,
    })
}
