//! Custom error types and result handling for imgsplit operations.
//!
//! This module defines the error handling system used throughout the crate.
//! All operations return a [`Result<T>`] which is a type alias for `std::result::Result<T, Error>`.
//!
//! Only structural problems are errors. Soft misses (an image reference that cannot be
//! resolved, an image that cannot be decoded, a spine entry pointing nowhere) are logged
//! where they happen and never surface here.
use std::path::PathBuf;

/// Type alias for Results with imgsplit errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all imgsplit operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O errors from the standard library
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// ZIP archive errors (reading the source or writing the output)
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    /// Package document / container descriptor parsing errors
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),
    /// Async task join errors
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Semaphore(#[from] tokio::sync::AcquireError),
    #[error(transparent)]
    ConfigBuilder(#[from] crate::splitter::SplitConfigBuilderError),
    /// `META-INF/container.xml` is absent from the extracted archive
    #[error("Container descriptor not found at '{0:?}'")]
    MissingContainer(PathBuf),
    /// The container descriptor declares no usable root file
    #[error("Container descriptor '{0:?}' declares no package document")]
    MissingRootfile(PathBuf),
    /// The package document lacks a manifest or a spine
    #[error("Package document '{0:?}' has no manifest or no spine")]
    MissingManifestOrSpine(PathBuf),
    /// Segmentation produced neither image pages nor text pages
    #[error("No pages were produced: neither images nor text found")]
    EmptyResult,
    /// A failure while converting one archive, tagged with the archive it belongs to
    #[error("Failed to convert '{archive:?}': {source}")]
    Archive {
        archive: PathBuf,
        #[source]
        source: Box<Error>,
    },
    /// Error for invalid file or directory paths
    #[error("The given path '{0:?}' is invalid: {1}")]
    InvalidPath(PathBuf, String),
    /// Error for resources that couldn't be found (e.g., source directory)
    #[error("Not found: {0}")]
    NotFound(String),
    /// Other errors that don't fit into specific categories
    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Attaches the identity of the archive being converted.
    pub fn in_archive(self, archive: impl Into<PathBuf>) -> Self {
        match self {
            already @ Error::Archive { .. } => already,
            other => Error::Archive {
                archive: archive.into(),
                source: Box::new(other),
            },
        }
    }

    /// Returns the underlying cause, looking through [`Error::Archive`].
    pub fn root(&self) -> &Error {
        match self {
            Error::Archive { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<String> for Error {
    fn from(error: String) -> Self {
        Error::Other(error)
    }
}

impl From<&str> for Error {
    fn from(error: &str) -> Self {
        Error::Other(error.to_string())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}
