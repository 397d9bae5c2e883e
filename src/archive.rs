use anyhow::{Context, Result};
use std::io::{Cursor, Write};
use std::path::Path;
use tracing::info;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::batch::BatchReport;
use crate::feed::Feed;

pub const FEED_ENTRY_NAME: &str = "new_feed.xml";

/// Packs every rendered image plus the feed with rewritten image links.
pub fn write_archive(report: &BatchReport, feed: &Feed, image_base_url: &str) -> Result<Vec<u8>> {
    let rewritten = feed
        .rewrite_image_links(&report.link_rewrites(image_base_url))
        .with_context(|| "failed to rewrite feed image links")?;

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let file_options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for artifact in &report.artifacts {
        writer
            .start_file(artifact.archive_path(), file_options)
            .with_context(|| "failed to write zip entry")?;
        writer
            .write_all(&artifact.bytes)
            .with_context(|| "failed to write zip content")?;
    }
    writer
        .start_file(FEED_ENTRY_NAME, file_options)
        .with_context(|| "failed to write zip entry")?;
    writer
        .write_all(&rewritten)
        .with_context(|| "failed to write zip content")?;

    let cursor = writer.finish().with_context(|| "failed to finish zip")?;
    Ok(cursor.into_inner())
}

pub fn save_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output dir: {}", parent.display()))?;
    }
    std::fs::write(path, bytes)
        .with_context(|| format!("failed to write output: {}", path.display()))?;
    info!("output: wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{ItemFailure, RenderedArtifact};
    use crate::error::ItemError;
    use std::io::Read;
    use zip::ZipArchive;

    const FEED: &str = r#"<rss xmlns:g="http://base.google.com/ns/1.0"><channel><item><g:title>A</g:title><g:image_link>http://shop/a.jpg</g:image_link><g:price>10</g:price></item><item><g:title>B</g:title><g:image_link>http://shop/b.jpg</g:image_link><g:price>20</g:price></item></channel></rss>"#;

    fn report() -> BatchReport {
        BatchReport {
            total: 2,
            artifacts: vec![RenderedArtifact {
                index: 0,
                name: RenderedArtifact::file_name(0),
                bytes: vec![0xff, 0xd8, 0xff, 0xd9],
            }],
            failures: vec![ItemFailure {
                index: 1,
                error: ItemError::ImageFetch("timed out".to_string()),
            }],
        }
    }

    #[test]
    fn archive_holds_images_and_rewritten_feed() {
        let feed = Feed::parse(FEED.as_bytes().to_vec()).expect("feed");
        let bytes = write_archive(&report(), &feed, "https://cdn.example").expect("archive");
        let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("zip");
        let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["images/img_0.jpg", "new_feed.xml"]);

        let mut image = Vec::new();
        archive
            .by_name("images/img_0.jpg")
            .expect("image entry")
            .read_to_end(&mut image)
            .expect("read image");
        assert_eq!(image, vec![0xff, 0xd8, 0xff, 0xd9]);

        let mut xml = String::new();
        archive
            .by_name(FEED_ENTRY_NAME)
            .expect("feed entry")
            .read_to_string(&mut xml)
            .expect("read feed");
        assert!(xml.contains("<g:image_link>https://cdn.example/images/img_0.jpg</g:image_link>"));
        assert!(xml.contains("<g:image_link>http://shop/b.jpg</g:image_link>"));
    }

    #[test]
    fn save_creates_parent_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out").join("feed_images.zip");
        save_output(&path, b"zip").expect("save");
        assert_eq!(std::fs::read(&path).expect("read"), b"zip");
    }
}
