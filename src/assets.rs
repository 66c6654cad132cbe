//! Image reference resolution and copying.
//!
//! The [`AssetResolver`] turns the `src` of an `img` element into a file inside the
//! extracted archive, filters out placeholder images by their pixel size, and copies
//! every accepted image exactly once into the output's image area under a fresh,
//! sequential name.

use crate::error::Result;
use crate::path_utils::path_to_string_lossy;
use crate::types::{CopiedAsset, guess_media_type};
use image::ImageReader;
use log::{debug, warn};
use percent_encoding::percent_decode_str;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Reads the pixel dimensions of an image without decoding the pixel data.
///
/// # Returns
///
/// * `Option<(u32, u32)>` - `(width, height)`, or `None` when the format is unknown
///   or the header cannot be read
pub fn probe_dimensions(path: &Path) -> Option<(u32, u32)> {
    let reader = match ImageReader::open(path).and_then(|reader| reader.with_guessed_format()) {
        Ok(reader) => reader,
        Err(e) => {
            debug!("Cannot open image '{}': {}", path_to_string_lossy(path), e);
            return None;
        }
    };

    match reader.into_dimensions() {
        Ok(dimensions) => Some(dimensions),
        Err(e) => {
            debug!(
                "Cannot read dimensions of '{}', keeping it: {}",
                path_to_string_lossy(path),
                e
            );
            None
        }
    }
}

/// Resolves, filters, and copies the images referenced by content documents.
///
/// One resolver serves a whole conversion, so the same source file referenced from
/// several documents is copied once and always maps to the same new name.
#[derive(Debug)]
pub struct AssetResolver {
    /// Canonical root of the extracted archive; resolved files must stay inside it.
    root: PathBuf,
    package_dir: PathBuf,
    images_dir: PathBuf,
    min_width: u32,
    min_height: u32,
    next_image_number: u32,
    copied: HashMap<PathBuf, String>,
    rejected: HashSet<PathBuf>,
    assets: Vec<CopiedAsset>,
}

impl AssetResolver {
    /// Creates a resolver.
    ///
    /// # Arguments
    ///
    /// * `root` - Root directory of the extracted archive
    /// * `package_dir` - Directory of the package document, used as a fallback base
    /// * `images_dir` - Existing directory accepted images are copied into
    /// * `min_width`, `min_height` - Smallest dimensions an image may have
    pub fn new(
        root: impl Into<PathBuf>,
        package_dir: impl Into<PathBuf>,
        images_dir: impl Into<PathBuf>,
        min_width: u32,
        min_height: u32,
    ) -> Self {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self {
            root,
            package_dir: package_dir.into(),
            images_dir: images_dir.into(),
            min_width,
            min_height,
            next_image_number: 1,
            copied: HashMap::new(),
            rejected: HashSet::new(),
            assets: Vec::new(),
        }
    }

    /// Locates the file an image reference points at.
    ///
    /// Fragment and query are dropped and the reference is percent-decoded. It is
    /// tried relative to the referencing document first, then relative to the
    /// package document. `data:` URIs and absolute URLs never resolve.
    pub fn resolve(&self, reference: &str, document_path: &Path) -> Option<PathBuf> {
        let reference = reference.trim();
        if reference.is_empty() || reference.starts_with("data:") || reference.contains("://") {
            return None;
        }

        let reference = reference.split(['#', '?']).next().unwrap_or_default();
        let decoded = percent_decode_str(reference).decode_utf8_lossy();
        let relative = decoded.trim_start_matches('/');
        if relative.is_empty() {
            return None;
        }

        let document_dir = document_path.parent().unwrap_or_else(|| Path::new(""));
        [document_dir.join(relative), self.package_dir.join(relative)]
            .into_iter()
            .filter(|candidate| candidate.is_file())
            .filter_map(|candidate| candidate.canonicalize().ok())
            .find(|canonical| canonical.starts_with(&self.root))
    }

    /// Applies the dimension filter to a resolved file and copies it when accepted.
    ///
    /// Files whose dimensions cannot be read are accepted.
    ///
    /// # Returns
    ///
    /// * `Result<Option<String>>` - The new file name, or `None` for a placeholder
    pub fn accept(&mut self, resolved: &Path) -> Result<Option<String>> {
        if let Some((width, height)) = probe_dimensions(resolved) {
            if width < self.min_width || height < self.min_height {
                warn!(
                    "Skipping placeholder image {}x{}: {}",
                    width,
                    height,
                    path_to_string_lossy(resolved)
                );
                return Ok(None);
            }
        }

        let extension = resolved
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        let new_name = format!("img{:04}{}", self.next_image_number, extension);
        self.next_image_number += 1;

        fs::copy(resolved, self.images_dir.join(&new_name))?;
        debug!(
            "Copied image '{}' as '{}'",
            path_to_string_lossy(resolved),
            new_name
        );

        self.assets.push(CopiedAsset {
            source_path: resolved.to_path_buf(),
            media_type: guess_media_type(Path::new(&new_name)).to_string(),
            new_name: new_name.clone(),
        });
        Ok(Some(new_name))
    }

    /// Resolves and accepts an image reference, reusing earlier decisions for the
    /// same file.
    ///
    /// # Returns
    ///
    /// * `Result<Option<String>>` - The new file name, or `None` when the reference
    ///   does not resolve or names a placeholder
    pub fn intern(&mut self, reference: &str, document_path: &Path) -> Result<Option<String>> {
        let Some(resolved) = self.resolve(reference, document_path) else {
            debug!(
                "Unresolved image reference '{}' in '{}'",
                reference,
                path_to_string_lossy(document_path)
            );
            return Ok(None);
        };

        if let Some(name) = self.copied.get(&resolved) {
            return Ok(Some(name.clone()));
        }
        if self.rejected.contains(&resolved) {
            return Ok(None);
        }

        match self.accept(&resolved)? {
            Some(name) => {
                self.copied.insert(resolved, name.clone());
                Ok(Some(name))
            }
            None => {
                self.rejected.insert(resolved);
                Ok(None)
            }
        }
    }

    /// Images copied so far, in copy order.
    pub fn assets(&self) -> &[CopiedAsset] {
        &self.assets
    }

    pub fn into_assets(self) -> Vec<CopiedAsset> {
        self.assets
    }
}
