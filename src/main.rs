use clap::Parser;
use imgsplit::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;

/// Give every image of your EPUB books a page of its own
#[derive(Parser, Debug)]
#[command(name = "imgsplit", version, about)]
struct Cli {
    /// Directory containing the .epub files to convert
    #[arg(short, long)]
    input: PathBuf,

    /// Directory the converted books are written to
    #[arg(short, long)]
    output: PathBuf,

    /// Keep image pages only and drop all text
    #[arg(long, default_value_t = false)]
    images_only: bool,

    /// Images narrower than this (in pixels) are dropped as placeholders
    #[arg(long, default_value_t = 2)]
    min_width: u32,

    /// Images lower than this (in pixels) are dropped as placeholders
    #[arg(long, default_value_t = 2)]
    min_height: u32,
}

async fn run(cli: Cli) -> Result<BatchReport> {
    let config = SplitConfig::builder()
        .source_path(cli.input)
        .target_path(cli.output)
        .images_only(cli.images_only)
        .min_width(cli.min_width)
        .min_height(cli.min_height)
        .build()?;
    config.convert_directory().await
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let input = cli.input.clone();

    let report = match run(cli).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if report.converted.is_empty() && report.failures.is_empty() {
        println!("No EPUB files found in {}", input.display());
        return ExitCode::SUCCESS;
    }

    for book in &report.converted {
        println!(
            "OK     {} -> {} ({} image pages, {} text pages)",
            book.source.display(),
            book.output.display(),
            book.image_pages,
            book.text_pages
        );
    }
    for (archive, reason) in &report.failures {
        println!("FAILED {}: {}", archive.display(), reason);
    }
    println!(
        "Done. Converted: {}, failed: {}",
        report.converted.len(),
        report.failures.len()
    );

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
