//! The conversion pipeline and the batch driver.
//!
//! [`split_package`] turns one extracted archive into a new book synchronously.
//! [`SplitConfig`] wraps it with archive extraction, output naming, and a
//! semaphore-bounded directory batch in which every archive succeeds or fails
//! on its own.

use log::{debug, error, info, warn};
use std::fs as std_fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, spawn_blocking};

use crate::archive::{extract_archive, write_archive};
use crate::assets::AssetResolver;
use crate::builder::PackageBuilder;
use crate::error::{Error, Result};
use crate::markup::{MarkupDocument, ParseMode};
use crate::package::read_package;
use crate::path_utils::{
    has_epub_extension, is_hidden_file, output_file_name, path_to_string_lossy,
};
use crate::segmenter::DocumentSegmenter;
use crate::types::{BatchReport, ConversionReport, PageKind, SplitExecutionMode, SplitOptions};

/// Converts one extracted archive into a new EPUB at `output`.
///
/// This is the synchronous core of the pipeline: read the package, segment every
/// content document in reading order, lay out the new package in a temporary build
/// directory, and zip it. Nothing is written at `output` unless every step succeeds.
///
/// # Arguments
///
/// * `extracted_root` - Root of the extracted source archive
/// * `output` - Location of the EPUB to write
/// * `options` - Segmentation options
///
/// # Returns
///
/// * `Ok(ConversionReport)` - Counts describing the written book
/// * `Err(Error::EmptyResult)` - Neither images nor text were found
/// * `Err(Error)` - A structural or I/O failure
pub fn split_package(
    extracted_root: &Path,
    output: &Path,
    options: &SplitOptions,
) -> Result<ConversionReport> {
    let package = read_package(extracted_root)?;
    debug!(
        "Package '{}': {} manifest items, {} spine entries",
        path_to_string_lossy(&package.package_path),
        package.manifest.len(),
        package.spine.len()
    );

    let build_dir = tempfile::Builder::new().prefix("imgsplit-build-").tempdir()?;
    let mut builder = PackageBuilder::create(build_dir.path())?;
    let stylesheets = builder.copy_stylesheets(&package)?;

    let mut resolver = AssetResolver::new(
        extracted_root,
        package.package_dir(),
        builder.images_dir(),
        options.min_width,
        options.min_height,
    );
    let mut segmenter = DocumentSegmenter::new(options.images_only);
    let mode = if options.tolerant_markup {
        ParseMode::Tolerant
    } else {
        ParseMode::Strict
    };

    for item in package.content_documents() {
        let document_path = package.resolve_href(&item.href);
        if !document_path.is_file() {
            warn!(
                "Content document '{}' is missing, skipping it",
                path_to_string_lossy(&document_path)
            );
            continue;
        }
        let bytes = std_fs::read(&document_path)?;
        let document = if item.is_xhtml() {
            MarkupDocument::parse_xhtml(&bytes, mode)
        } else {
            MarkupDocument::parse(&bytes, mode)
        };
        if document.parse_errors > 0 {
            debug!(
                "Repaired {} markup errors in '{}'",
                document.parse_errors,
                path_to_string_lossy(&document_path)
            );
        }
        segmenter.segment(&document, &document_path, &mut resolver)?;
    }

    let skipped_images = segmenter.skipped_images();
    let pages = segmenter.into_pages();
    if pages.is_empty() {
        return Err(Error::EmptyResult);
    }
    let image_pages = pages.iter().filter(|p| p.kind() == PageKind::Image).count();
    let assets = resolver.into_assets();

    let built = builder.finish(&package.metadata, &pages, &assets)?;
    write_archive(build_dir.path(), &built.entries, output)?;

    Ok(ConversionReport {
        source: extracted_root.to_path_buf(),
        output: output.to_path_buf(),
        image_pages,
        text_pages: pages.len() - image_pages,
        assets: assets.len(),
        skipped_images,
        stylesheets,
        identifier: built.identifier,
    })
}

/// The conversion configuration, built declaratively using the builder pattern.
///
/// A configuration names where archives come from and where the rewritten books go,
/// and carries the segmentation options. It can then convert a single archive with
/// [`convert_file`](SplitConfig::convert_file) or every archive of a directory with
/// [`convert_directory`](SplitConfig::convert_directory).
///
/// ```rust,no_run
/// # use imgsplit::prelude::*;
/// # use std::path::PathBuf;
/// let config = SplitConfig::builder()
///     .source_path(PathBuf::from("./books"))
///     .target_path(PathBuf::from("./split"))
///     .images_only(true)
///     .build()
///     .expect("Invalid configuration");
/// ```
#[derive(Debug, Clone, derive_builder::Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SplitConfig {
    /// Directory scanned for `.epub` files by
    /// [`convert_directory`](SplitConfig::convert_directory).
    #[builder(default)]
    pub source_path: PathBuf,

    /// Directory the rewritten books are written to.
    #[builder(default)]
    pub target_path: PathBuf,

    /// Produce image pages only, dropping all text.
    #[builder(default = "false")]
    pub images_only: bool,

    /// Images narrower than this many pixels are dropped as placeholders.
    #[builder(default = "2")]
    pub min_width: u32,

    /// Images lower than this many pixels are dropped as placeholders.
    #[builder(default = "2")]
    pub min_height: u32,

    /// Appended to the input file stem to name the output file.
    #[builder(default = "\"_imgsplit\".to_string()")]
    pub output_suffix: String,

    /// Create `target_path` when it does not exist yet.
    #[builder(default = "true")]
    pub create_output_directory: bool,

    /// Swallow markup parse errors instead of logging them as warnings.
    #[builder(default = "true")]
    pub tolerant_markup: bool,

    /// Upper bound on archives converted at the same time.
    #[builder(default = "num_cpus::get().min(4)")]
    pub max_concurrent: usize,
}

impl SplitConfig {
    pub fn builder() -> SplitConfigBuilder {
        SplitConfigBuilder::default()
    }

    /// The per-archive options derived from this configuration.
    pub fn options(&self) -> SplitOptions {
        SplitOptions {
            images_only: self.images_only,
            min_width: self.min_width,
            min_height: self.min_height,
            tolerant_markup: self.tolerant_markup,
        }
    }

    /// Where the book converted from `archive` is written.
    pub fn output_path_for(&self, archive: &Path) -> PathBuf {
        self.target_path
            .join(output_file_name(archive, &self.output_suffix))
    }

    /// Performs validation checks on the configuration for a specific execution mode.
    ///
    /// No file is touched. Both conversion entry points call this themselves.
    ///
    /// # Arguments
    ///
    /// * `mode` - The intended execution mode:
    ///   - [`SplitExecutionMode::FromArchive`]: Validates the target settings
    ///   - [`SplitExecutionMode::FromDirectory`]: Also validates `source_path`
    ///
    /// # Returns
    ///
    /// * `Ok(&self)` - Configuration is valid for the specified mode
    /// * `Err(Error)` - Configuration has validation errors
    pub fn preflight_check(&self, mode: SplitExecutionMode) -> Result<&Self> {
        if self.target_path.as_os_str().is_empty() {
            return Err(Error::Other("Target path is required".to_string()));
        }
        if self.max_concurrent == 0 {
            return Err(Error::Other(
                "At least one concurrent conversion is required".to_string(),
            ));
        }
        if !self.create_output_directory && !self.target_path.is_dir() {
            return Err(Error::NotFound(format!(
                "Target directory does not exist: {:?}",
                self.target_path
            )));
        }

        match mode {
            SplitExecutionMode::FromArchive => {}
            SplitExecutionMode::FromDirectory => {
                if self.source_path.as_os_str().is_empty() {
                    return Err(Error::Other(
                        "`source_path` must be set for `FromDirectory` execution mode."
                            .to_string(),
                    ));
                }
                if !self.source_path.exists() {
                    return Err(Error::NotFound(format!(
                        "Source path does not exist: {:?}",
                        self.source_path
                    )));
                }
                if !self.source_path.is_dir() {
                    return Err(Error::InvalidPath(
                        self.source_path.clone(),
                        "Source path is not a directory.".to_string(),
                    ));
                }
            }
        }

        Ok(self)
    }

    /// Converts one archive, blocking the calling thread.
    ///
    /// The archive is extracted into a scratch directory that is removed afterwards,
    /// whatever the outcome. Errors are tagged with the archive path.
    pub fn convert_file_blocking(&self, archive: &Path) -> Result<ConversionReport> {
        self.convert_archive(archive)
            .map_err(|e| e.in_archive(archive))
    }

    fn convert_archive(&self, archive: &Path) -> Result<ConversionReport> {
        if !archive.is_file() {
            return Err(Error::NotFound(format!(
                "Archive does not exist: {:?}",
                archive
            )));
        }
        if self.create_output_directory {
            std_fs::create_dir_all(&self.target_path)?;
        }

        let workspace = tempfile::Builder::new().prefix("imgsplit-work-").tempdir()?;
        extract_archive(archive, workspace.path())?;

        let output = self.output_path_for(archive);
        let mut report = split_package(workspace.path(), &output, &self.options())?;
        report.source = archive.to_path_buf();
        info!(
            "Converted '{}' -> '{}' ({} image pages, {} text pages)",
            path_to_string_lossy(archive),
            path_to_string_lossy(&output),
            report.image_pages,
            report.text_pages
        );
        Ok(report)
    }

    /// Converts a single `.epub` file into `target_path`.
    ///
    /// # Returns
    ///
    /// * `Ok(ConversionReport)` - The book was written
    /// * `Err(Error::Archive)` - Conversion failed; nothing was written
    pub async fn convert_file(&self, archive: impl Into<PathBuf>) -> Result<ConversionReport> {
        self.preflight_check(SplitExecutionMode::FromArchive)?;
        let archive = archive.into();
        let config = self.clone();
        spawn_blocking(move || config.convert_file_blocking(&archive)).await?
    }

    /// Lists the `.epub` files directly inside `source_path`, sorted by path.
    /// Hidden files are ignored.
    pub async fn collect_archives(&self) -> Result<Vec<PathBuf>> {
        let mut archives = Vec::new();
        let mut entries = fs::read_dir(&self.source_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file()
                || is_hidden_file(&path)
                || !has_epub_extension(&path)
            {
                continue;
            }
            archives.push(path);
        }
        archives.sort();
        Ok(archives)
    }

    /// Converts every `.epub` file of `source_path` into `target_path`.
    ///
    /// Archives are converted concurrently, at most
    /// [`max_concurrent`](SplitConfig::max_concurrent) at a time. A failing archive
    /// is recorded in the report and does not affect the others.
    pub async fn convert_directory(&self) -> Result<BatchReport> {
        self.preflight_check(SplitExecutionMode::FromDirectory)?;
        let started_at = chrono::Utc::now();

        let archives = self.collect_archives().await?;
        if archives.is_empty() {
            info!(
                "No EPUB files found in '{}'",
                path_to_string_lossy(&self.source_path)
            );
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let tasks = archives.into_iter().map(|archive| {
            let semaphore_clone = Arc::clone(&semaphore);
            let config = self.clone();
            let path = archive.clone();
            let task = tokio::spawn(async move {
                let _permit = semaphore_clone.acquire_owned().await?;
                let report: Result<ConversionReport> =
                    spawn_blocking(move || config.convert_file_blocking(&path)).await?;
                report
            });
            settle(archive, task)
        });

        let mut converted = Vec::new();
        let mut failures = Vec::new();
        for (archive, result) in futures::future::join_all(tasks).await {
            match result {
                Ok(report) => converted.push(report),
                Err(e) => {
                    error!("{}", e);
                    failures.push((archive, e.root().to_string()));
                }
            }
        }

        let report = BatchReport {
            converted,
            failures,
            started_at,
            finished_at: chrono::Utc::now(),
        };
        info!(
            "Batch finished: {} converted, {} failed",
            report.converted.len(),
            report.failures.len()
        );
        Ok(report)
    }
}

/// Waits for the conversion task of one archive. A task that panicked or was
/// cancelled counts as a failure of that archive only.
async fn settle(
    archive: PathBuf,
    task: JoinHandle<Result<ConversionReport>>,
) -> (PathBuf, Result<ConversionReport>) {
    let result = match task.await {
        Ok(result) => result,
        Err(e) => Err(Error::Join(e)),
    };
    let result = result.map_err(|e| e.in_archive(&archive));
    (archive, result)
}

impl SplitConfigBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(0) = self.max_concurrent {
            return Err("max_concurrent must be at least 1".to_string());
        }
        if let Some(suffix) = &self.output_suffix {
            if suffix.contains(['/', '\\']) {
                return Err(format!("Invalid output_suffix: {}", suffix));
            }
        }
        Ok(())
    }
}
