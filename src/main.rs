use anyhow::Result;
use clap::{Parser, Subcommand};

use feed_composer::{Command, Config};

#[derive(Parser, Debug)]
#[command(
    name = "feed-composer",
    version,
    about = "Render product feed images into a marketing template"
)]
struct Cli {
    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings", global = true)]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Render every feed item and pack the images with the rewritten feed
    Render {
        /// Feed URL or local path
        #[arg(short = 'f', long = "feed")]
        feed: String,

        /// Logo image (PNG with alpha or JPEG); overrides [logo] path
        #[arg(short = 'l', long = "logo")]
        logo: Option<String>,

        /// Output zip path
        #[arg(short = 'o', long = "output", default_value = "feed_images.zip")]
        output: String,

        /// Only render the first N items
        #[arg(short = 'n', long = "limit")]
        limit: Option<usize>,
    },
    /// Render a single item to a PNG
    Preview {
        /// Feed URL or local path
        #[arg(short = 'f', long = "feed")]
        feed: String,

        /// Logo image (PNG with alpha or JPEG); overrides [logo] path
        #[arg(short = 'l', long = "logo")]
        logo: Option<String>,

        /// Item index within the feed
        #[arg(short = 'i', long = "index", default_value_t = 0)]
        index: usize,

        /// Output PNG path
        #[arg(short = 'o', long = "output", default_value = "preview.png")]
        output: String,
    },
    /// Start the placement editor server
    Serve {
        /// Feed URL or local path (the first renderable item is previewed)
        #[arg(short = 'f', long = "feed")]
        feed: String,

        /// Logo image (PNG with alpha or JPEG); overrides [logo] path
        #[arg(short = 'l', long = "logo")]
        logo: Option<String>,

        /// Listen address
        #[arg(long = "addr", default_value = "127.0.0.1:8787")]
        addr: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    feed_composer::logging::init(cli.verbose)?;

    let command = match cli.command {
        CliCommand::Render {
            feed,
            logo,
            output,
            limit,
        } => Command::Render {
            feed,
            logo,
            output,
            limit,
        },
        CliCommand::Preview {
            feed,
            logo,
            index,
            output,
        } => Command::Preview {
            feed,
            logo,
            index,
            output,
        },
        CliCommand::Serve { feed, logo, addr } => Command::Serve { feed, logo, addr },
    };
    let output = feed_composer::run(Config {
        settings_path: cli.read_settings,
        command,
    })
    .await?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
