use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub mod archive;
pub mod batch;
pub mod compose;
pub mod editor;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod font;
pub mod layout;
pub mod logging;
pub mod price;
pub mod remover;
pub mod settings;
pub mod template;
#[cfg(test)]
mod test_util;

pub use batch::{BatchOptions, BatchReport, ItemFailure, Progress, RenderedArtifact, run_batch};
pub use compose::{Compositor, RenderInput};
pub use error::ItemError;
pub use feed::{Feed, FeedEntry, ProductItem};
pub use settings::Settings;
pub use template::{LogoAsset, LogoSpec, Point, TemplateParams};

use fetch::{HttpFetcher, ImageFetcher};

#[derive(Debug, Clone)]
pub enum Command {
    Render {
        feed: String,
        logo: Option<String>,
        output: String,
        limit: Option<usize>,
    },
    Preview {
        feed: String,
        logo: Option<String>,
        index: usize,
        output: String,
    },
    Serve {
        feed: String,
        logo: Option<String>,
        addr: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub settings_path: Option<String>,
    pub command: Command,
}

pub async fn run(config: Config) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;
    execute(settings, config.command).await
}

/// Runs a command against already-resolved settings.
pub async fn execute(settings: Settings, command: Command) -> Result<String> {
    match command {
        Command::Render {
            feed,
            logo,
            output,
            limit,
        } => {
            let session = Session::build(settings, logo.as_deref())?;
            render_feed(&session, &feed, Path::new(&output), limit).await
        }
        Command::Preview {
            feed,
            logo,
            index,
            output,
        } => {
            let session = Session::build(settings, logo.as_deref())?;
            render_preview(&session, &feed, index, Path::new(&output)).await
        }
        Command::Serve { feed, logo, addr } => {
            let session = Session::build(settings, logo.as_deref())?;
            serve_editor(session, &feed, addr).await
        }
    }
}

struct Session {
    settings: Settings,
    params: TemplateParams,
    compositor: Arc<Compositor>,
    fetcher: HttpFetcher,
}

impl Session {
    fn build(settings: Settings, logo_override: Option<&str>) -> Result<Self> {
        let logo_path = logo_override.or(settings.logo_path.as_deref());
        let logo = logo_path.and_then(|path| match LogoAsset::load(Path::new(path)) {
            Ok(asset) => Some(asset),
            Err(err) => {
                warn!("logo: {:#}; drawing the text placeholder instead", err);
                None
            }
        });
        let params = settings.template_params(logo);
        let typeface = font::Typeface::load(
            settings.font_path.as_deref().map(Path::new),
            settings.font_family.as_deref(),
        );
        let remover = remover::build_remover(&settings.background)?;
        info!(
            "session: font {}, background {}",
            typeface.family(),
            remover.name()
        );
        let compositor = Arc::new(Compositor::new(remover, typeface));
        let fetcher = HttpFetcher::new(settings.fetch_timeout())?;
        Ok(Self {
            settings,
            params,
            compositor,
            fetcher,
        })
    }

    async fn load_feed(&self, source: &str) -> Result<Feed> {
        let bytes = fetch::load_feed_source(source, self.settings.fetch_timeout()).await?;
        let feed = Feed::parse(bytes).with_context(|| format!("failed to parse feed: {}", source))?;
        info!("feed: {} items from {}", feed.entries().len(), source);
        Ok(feed)
    }
}

async fn render_feed(
    session: &Session,
    source: &str,
    output: &Path,
    limit: Option<usize>,
) -> Result<String> {
    let feed = session.load_feed(source).await?;
    let entries = feed.entries();
    let entries = &entries[..limit.unwrap_or(entries.len()).min(entries.len())];
    let options = BatchOptions {
        workers: session.settings.effective_workers(),
        jpeg_quality: session.settings.jpeg_quality,
        image_base_url: session.settings.image_base_url.clone(),
    };
    let fetcher = session.fetcher.for_feed(source);
    let report = run_batch(
        entries,
        &session.params,
        session.compositor.clone(),
        &fetcher,
        &options,
        |progress| info!("render: {}/{}", progress.completed, progress.total),
    )
    .await;

    let bytes = archive::write_archive(&report, &feed, &options.image_base_url)?;
    archive::save_output(output, &bytes)?;
    Ok(format!("{}\nwrote {}", report.summary(), output.display()))
}

async fn render_preview(
    session: &Session,
    source: &str,
    index: usize,
    output: &Path,
) -> Result<String> {
    let feed = session.load_feed(source).await?;
    let entry = feed
        .entries()
        .get(index)
        .ok_or_else(|| anyhow!("feed has no item {}", index))?;
    let item = entry
        .item
        .as_ref()
        .map_err(|err| anyhow!("item {} cannot be rendered: {}", index, err))?;
    let image = session.fetcher.for_feed(source).fetch(&item.image_url).await?;
    let price = item.clean_price();
    let input = RenderInput {
        title: &item.title,
        price: price.as_deref(),
        image: Some(&image),
    };
    let canvas = session.compositor.render(&input, &session.params)?;
    let png = compose::encode_png(&canvas)?;
    archive::save_output(output, &png)?;
    Ok(format!("wrote {}", output.display()))
}

async fn serve_editor(session: Session, source: &str, addr: String) -> Result<String> {
    let feed = session.load_feed(source).await?;
    let preview = match feed.entries().iter().find_map(|entry| entry.item.as_ref().ok()) {
        Some(item) => {
            let image = match session.fetcher.for_feed(source).fetch(&item.image_url).await {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    warn!("editor: preview image unavailable: {:#}", err);
                    None
                }
            };
            editor::PreviewItem {
                title: item.title.clone(),
                price: item.clean_price(),
                image,
            }
        }
        None => {
            warn!("editor: feed has no renderable item; previewing an empty template");
            editor::PreviewItem::default()
        }
    };
    editor::run_server(session.params, session.compositor, preview, addr).await?;
    Ok(String::new())
}
