use std::io::{Cursor, Read};
use std::path::Path;

use feed_composer::{Command, Settings, execute};
use image::{Rgba, RgbaImage};
use zip::ZipArchive;

fn write_photo(path: &Path, color: [u8; 3]) {
    let mut photo = RgbaImage::from_pixel(120, 160, Rgba([250, 250, 250, 255]));
    for x in 30..90 {
        for y in 40..120 {
            photo.put_pixel(x, y, Rgba([color[0], color[1], color[2], 255]));
        }
    }
    photo.save(path).expect("save photo");
}

fn write_feed(dir: &Path) -> String {
    let wallet = dir.join("wallet.png");
    let lamp = dir.join("lamp.png");
    write_photo(&wallet, [150, 30, 30]);
    write_photo(&lamp, [30, 30, 150]);
    let missing = dir.join("missing.png");
    let xml = format!(
        r#"<rss xmlns:g="http://base.google.com/ns/1.0"><channel>
<item><g:title>Wallet</g:title><g:image_link>{}</g:image_link><g:price>450 UAH</g:price></item>
<item><g:title>Ghost</g:title><g:image_link>{}</g:image_link><g:price/></item>
<item><g:title>Lamp</g:title><g:image_link>{}</g:image_link><g:price>99 грн</g:price></item>
</channel></rss>"#,
        wallet.display(),
        missing.display(),
        lamp.display()
    );
    let feed = dir.join("feed.xml");
    std::fs::write(&feed, xml).expect("write feed");
    feed.to_string_lossy().to_string()
}

#[tokio::test]
async fn render_packs_successful_items_and_rewrites_feed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let feed = write_feed(dir.path());
    let output = dir.path().join("feed_images.zip");
    let summary = execute(
        Settings::default(),
        Command::Render {
            feed,
            logo: None,
            output: output.to_string_lossy().to_string(),
            limit: None,
        },
    )
    .await
    .expect("render");
    assert!(summary.starts_with("rendered 2/3 items (1 skipped)"));
    assert!(summary.contains("item 1: failed to fetch product image"));

    let bytes = std::fs::read(&output).expect("zip");
    let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("archive");
    let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(
        names,
        vec!["images/img_0.jpg", "images/img_2.jpg", "new_feed.xml"]
    );

    let mut jpeg = Vec::new();
    archive
        .by_name("images/img_2.jpg")
        .expect("img_2")
        .read_to_end(&mut jpeg)
        .expect("read jpeg");
    let decoded = image::load_from_memory(&jpeg).expect("decode");
    assert_eq!((decoded.width(), decoded.height()), (1080, 1350));

    let mut xml = String::new();
    archive
        .by_name("new_feed.xml")
        .expect("feed")
        .read_to_string(&mut xml)
        .expect("read feed");
    assert!(xml.contains("<g:image_link>https://YOUR-SITE/images/img_0.jpg</g:image_link>"));
    assert!(xml.contains("<g:image_link>https://YOUR-SITE/images/img_2.jpg</g:image_link>"));
    assert!(xml.contains("missing.png</g:image_link>"));
}

#[tokio::test]
async fn limit_renders_only_leading_items() {
    let dir = tempfile::tempdir().expect("tempdir");
    let feed = write_feed(dir.path());
    let output = dir.path().join("out.zip");
    let summary = execute(
        Settings::default(),
        Command::Render {
            feed,
            logo: None,
            output: output.to_string_lossy().to_string(),
            limit: Some(1),
        },
    )
    .await
    .expect("render");
    assert!(summary.starts_with("rendered 1/1 items (0 skipped)"));
}

#[tokio::test]
async fn preview_writes_single_png() {
    let dir = tempfile::tempdir().expect("tempdir");
    let feed = write_feed(dir.path());
    let output = dir.path().join("preview.png");
    execute(
        Settings::default(),
        Command::Preview {
            feed: feed.clone(),
            logo: None,
            index: 2,
            output: output.to_string_lossy().to_string(),
        },
    )
    .await
    .expect("preview");
    let preview = image::open(&output).expect("png");
    assert_eq!((preview.width(), preview.height()), (1080, 1350));

    let missing = execute(
        Settings::default(),
        Command::Preview {
            feed,
            logo: None,
            index: 7,
            output: output.to_string_lossy().to_string(),
        },
    )
    .await;
    assert!(missing.is_err());
}

#[tokio::test]
async fn unreadable_logo_falls_back_to_text() {
    let dir = tempfile::tempdir().expect("tempdir");
    let feed = write_feed(dir.path());
    let logo = dir.path().join("logo.png");
    std::fs::write(&logo, b"not a png").expect("write logo");
    let output = dir.path().join("x.zip");
    let summary = execute(
        Settings::default(),
        Command::Render {
            feed,
            logo: Some(logo.to_string_lossy().to_string()),
            output: output.to_string_lossy().to_string(),
            limit: None,
        },
    )
    .await
    .expect("render");
    assert!(summary.starts_with("rendered 2/3 items (1 skipped)"));
    assert!(output.exists());
}
