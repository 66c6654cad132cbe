//! imgsplit - EPUB Image Page Splitting Library
//!
//! This crate rewrites EPUB archives so that every embedded image gets a page of its
//! own. The text between images is kept, in reading order, on separate text pages,
//! and the book's metadata, stylesheets and navigation are carried over into a fresh
//! package.
//!
//! # Getting Started
//!
//! Configure a conversion with the `SplitConfig` builder, then convert a single
//! archive or a whole directory of them.
//!
//! ```rust,no_run
//! use imgsplit::prelude::*;
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> imgsplit::error::Result<()> {
//!     let config = SplitConfig::builder()
//!         .source_path(PathBuf::from("./books"))
//!         .target_path(PathBuf::from("./split"))
//!         .min_width(16u32)
//!         .min_height(16u32)
//!         .build()?;
//!
//!     // Optional: validate the configuration up front
//!     config.preflight_check(SplitExecutionMode::FromDirectory)?;
//!
//!     let report = config.convert_directory().await?;
//!     for book in &report.converted {
//!         println!("{:?}: {} pages", book.output, book.total_pages());
//!     }
//!     for (archive, reason) in &report.failures {
//!         eprintln!("{:?} failed: {}", archive, reason);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The synchronous [`split_package`] entry point works on an already extracted
//! archive and is what each conversion runs under the hood.

pub mod archive;
pub mod assets;
pub mod builder;
pub mod error;
pub mod markup;
pub mod package;
pub mod path_utils;
pub mod segmenter;
pub mod splitter;
pub mod types;

pub use splitter::{SplitConfig, SplitConfigBuilder, split_package};

pub use types::{
    BatchReport, ConversionReport, CopiedAsset, NavigationEntry, Package, PackageMetadata, Page,
    PageBody, PageKind, SplitExecutionMode, SplitOptions,
};

/// Prelude module for convenient imports.
///
/// Re-exports the types needed for typical use with a single
/// `use imgsplit::prelude::*;` statement.
pub mod prelude {
    pub use super::{
        BatchReport, ConversionReport, Page, PageKind, SplitConfig, SplitConfigBuilder,
        SplitExecutionMode, SplitOptions, split_package,
    };
    pub use crate::error::{Error, Result};
}
