//! Core data types, options, and reports for the imgsplit conversion library.
//!
//! This module defines the fundamental data structures used throughout imgsplit:
//! - The parsed source package (`Package`, `PackageMetadata`, `ManifestItem`)
//! - The units produced by segmentation (`Page`, `PageBody`, `CopiedAsset`)
//! - Navigation entries and the engine options (`NavigationEntry`, `SplitOptions`)
//! - Reporting types (`ConversionReport`, `BatchReport`)

use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Media type of XHTML content documents.
pub const MEDIA_TYPE_XHTML: &str = "application/xhtml+xml";
/// Media type of (non-X) HTML content documents, accepted as segmentation input.
pub const MEDIA_TYPE_HTML: &str = "text/html";
/// Media type of CSS stylesheets.
pub const MEDIA_TYPE_CSS: &str = "text/css";
/// Media type of the NCX navigation document.
pub const MEDIA_TYPE_NCX: &str = "application/x-dtbncx+xml";

/// Metadata carried over from the source package document.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PackageMetadata {
    /// Dublin Core fields as `(local-name, value)`, in document order.
    pub dublin_core: Vec<(String, String)>,
    /// Simple `<meta name=".." content=".."/>` annotations, in document order.
    pub annotations: Vec<(String, String)>,
}

impl PackageMetadata {
    /// First non-empty value of the given Dublin Core field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.dublin_core
            .iter()
            .find(|(key, value)| key == name && !value.is_empty())
            .map(|(_, value)| value.as_str())
    }

    /// The pre-existing book identifier, if the source declares one.
    pub fn identifier(&self) -> Option<&str> {
        self.field("identifier")
    }

    pub fn title(&self) -> Option<&str> {
        self.field("title")
    }
}

/// One `<item>` of a package manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ManifestItem {
    pub id: String,
    /// Path relative to the package document's directory.
    pub href: String,
    pub media_type: String,
    /// Space separated property list, possibly empty.
    pub properties: String,
}

impl ManifestItem {
    /// Whether the item is a markup document eligible for segmentation.
    pub fn is_markup(&self) -> bool {
        self.media_type == MEDIA_TYPE_XHTML || self.media_type == MEDIA_TYPE_HTML
    }

    /// Whether the item is declared as XHTML, to be read as XML first.
    pub fn is_xhtml(&self) -> bool {
        self.media_type == MEDIA_TYPE_XHTML
    }

    pub fn is_stylesheet(&self) -> bool {
        self.media_type == MEDIA_TYPE_CSS
    }
}

/// A parsed source package: where it lives, its metadata, manifest, and spine.
#[derive(Debug, Clone)]
pub struct Package {
    /// Absolute path of the package document (`*.opf`).
    pub package_path: PathBuf,
    pub metadata: PackageMetadata,
    /// Manifest items in document order.
    pub manifest: Vec<ManifestItem>,
    /// Spine entries resolved against the manifest, in reading order.
    pub spine: Vec<ManifestItem>,
}

impl Package {
    /// Directory every manifest `href` is relative to.
    pub fn package_dir(&self) -> &Path {
        self.package_path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Resolves a manifest `href` to a path inside the extracted archive.
    ///
    /// The href is percent-decoded; a fragment is dropped.
    pub fn resolve_href(&self, href: &str) -> PathBuf {
        let href = href.split('#').next().unwrap_or_default();
        let decoded = percent_decode_str(href).decode_utf8_lossy();
        self.package_dir().join(decoded.as_ref())
    }

    /// Markup documents to segment, in order.
    ///
    /// Spine entries with a markup media type come first; when the spine has none,
    /// every markup item of the manifest is used in manifest order.
    pub fn content_documents(&self) -> Vec<&ManifestItem> {
        let from_spine: Vec<&ManifestItem> =
            self.spine.iter().filter(|item| item.is_markup()).collect();
        if !from_spine.is_empty() {
            return from_spine;
        }
        self.manifest.iter().filter(|item| item.is_markup()).collect()
    }

    pub fn stylesheets(&self) -> impl Iterator<Item = &ManifestItem> {
        self.manifest.iter().filter(|item| item.is_stylesheet())
    }
}

/// Whether a generated page shows an image or a run of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PageKind {
    Image,
    Text,
}

/// Content of a generated page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageBody {
    /// References a copied asset by its new file name.
    Image { asset: String, alt: String },
    /// A re-serialized markup fragment.
    Text(String),
}

/// A page of the output book, in spine order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub id: String,
    /// Path relative to `OEBPS/`, always under `Text/`.
    pub href: String,
    pub title: String,
    pub body: PageBody,
}

impl Page {
    pub fn kind(&self) -> PageKind {
        match self.body {
            PageBody::Image { .. } => PageKind::Image,
            PageBody::Text(_) => PageKind::Text,
        }
    }
}

/// An image copied into the output's image area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedAsset {
    /// Canonical path of the source file.
    pub source_path: PathBuf,
    /// File name inside `OEBPS/Images/`, e.g. `img0001.png`.
    pub new_name: String,
    pub media_type: String,
}

/// One entry of the navigation map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEntry {
    pub label: String,
    pub target_href: String,
    /// 1-based position in the navigation map.
    pub play_order: usize,
}

/// Options consumed by the conversion engine for one archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SplitOptions {
    /// Suppress every text page; only image pages are produced.
    pub images_only: bool,
    /// Images narrower than this are treated as placeholders and dropped.
    pub min_width: u32,
    /// Images lower than this are treated as placeholders and dropped.
    pub min_height: u32,
    /// Swallow markup parse errors instead of reporting them.
    pub tolerant_markup: bool,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            images_only: false,
            min_width: 2,
            min_height: 2,
            tolerant_markup: true,
        }
    }
}

/// Outcome of converting a single archive.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConversionReport {
    pub source: PathBuf,
    pub output: PathBuf,
    pub image_pages: usize,
    pub text_pages: usize,
    /// Distinct images copied into the output.
    pub assets: usize,
    /// Image occurrences that produced no page (unresolved or placeholder).
    pub skipped_images: usize,
    pub stylesheets: usize,
    /// The identifier written into both the package and the navigation document.
    pub identifier: String,
}

impl ConversionReport {
    pub fn total_pages(&self) -> usize {
        self.image_pages + self.text_pages
    }
}

/// Outcome of converting every archive in a directory.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct BatchReport {
    pub converted: Vec<ConversionReport>,
    /// Archive path and failure description, one per failed archive.
    pub failures: Vec<(PathBuf, String)>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Specifies the intended starting point for a conversion.
/// Used by `SplitConfig::preflight_check` to tailor validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SplitExecutionMode {
    /// A single `.epub` file is converted.
    FromArchive,
    /// Every `.epub` file in `source_path` is converted.
    FromDirectory,
}

/// Guesses a media type from a file extension.
///
/// # Arguments
///
/// * `path` - Path (or bare file name) to inspect
///
/// # Returns
///
/// * `&'static str` - The media type, `application/octet-stream` when unknown
pub fn guess_media_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("xhtml") | Some("html") | Some("htm") => MEDIA_TYPE_XHTML,
        Some("css") => MEDIA_TYPE_CSS,
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}
