//! Common test utilities and constants for the imgsplit crate.
//!
//! Provides functions for setting up test directories, building small EPUB
//! fixtures in memory, and inspecting the archives a conversion produced.

use image::{ImageFormat, Rgb, RgbImage};
use imgsplit::error::Result;
use rand::{Rng, distributions::Alphanumeric};
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

#[allow(dead_code)]
pub const TEST_TMP_DIR: &str = "tests/tmp";
#[allow(dead_code)]
pub const TEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct TestDirs {
    #[allow(dead_code)]
    pub base: PathBuf,
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
}

/// Creates a fresh, uniquely named test directory with `source` and `target`
/// subdirectories.
#[allow(dead_code)]
pub async fn setup_test_dirs(sub_path: &str) -> TestDirs {
    let rand_string: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    let base = PathBuf::from(TEST_TMP_DIR).join(format!("{}-{}", sub_path, rand_string));
    if base.exists() {
        fs::remove_dir_all(&base).await.unwrap();
    }
    let source_dir = base.join("source");
    let target_dir = base.join("target");
    fs::create_dir_all(&source_dir).await.unwrap();
    fs::create_dir_all(&target_dir).await.unwrap();

    TestDirs {
        base,
        source_dir,
        target_dir,
    }
}

/// Encodes a solid-color PNG of the given size.
#[allow(dead_code)]
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([255, 0, 0]));
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

/// Builds an EPUB archive from in-memory files.
///
/// The container descriptor pointing at `OEBPS/content.opf` is added unless a
/// custom one is given.
#[derive(Default)]
pub struct EpubFixture {
    files: Vec<(String, Vec<u8>)>,
    container: Option<String>,
    without_container: bool,
}

#[allow(dead_code)]
impl EpubFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, name: &str, content: impl Into<Vec<u8>>) -> Self {
        self.files.push((name.to_string(), content.into()));
        self
    }

    pub fn container(mut self, xml: &str) -> Self {
        self.container = Some(xml.to_string());
        self
    }

    pub fn without_container(mut self) -> Self {
        self.without_container = true;
        self
    }

    /// Adds `OEBPS/content.opf` with the given metadata, manifest items
    /// `(id, href, media-type)`, and spine ids.
    pub fn package(
        self,
        metadata: &str,
        manifest: &[(&str, &str, &str)],
        spine: &[&str],
    ) -> Self {
        let items: String = manifest
            .iter()
            .map(|(id, href, media_type)| {
                format!(
                    "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"/>\n",
                    id, href, media_type
                )
            })
            .collect();
        let itemrefs: String = spine
            .iter()
            .map(|id| format!("    <itemref idref=\"{}\"/>\n", id))
            .collect();
        let opf = format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
{}
  </metadata>
  <manifest>
{}  </manifest>
  <spine>
{}  </spine>
</package>
"#,
            metadata, items, itemrefs
        );
        self.file("OEBPS/content.opf", opf)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut zip = ZipWriter::new(File::create(path)?);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file("mimetype", stored)?;
        zip.write_all(b"application/epub+zip")?;
        if !self.without_container {
            let container = self.container.clone().unwrap_or_else(|| {
                r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#
                    .to_string()
            });
            zip.start_file("META-INF/container.xml", deflated)?;
            zip.write_all(container.as_bytes())?;
        }
        for (name, content) in &self.files {
            zip.start_file(name.as_str(), deflated)?;
            zip.write_all(content)?;
        }
        zip.finish()?;
        Ok(())
    }
}

/// Wraps body markup into a minimal XHTML document.
#[allow(dead_code)]
pub fn xhtml(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>t</title></head>
<body>{}</body></html>"#,
        body
    )
}

/// Entry names of an archive, in stored order.
#[allow(dead_code)]
pub fn entry_names(path: &Path) -> Vec<String> {
    let mut zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_string())
        .collect()
}

#[allow(dead_code)]
pub fn read_entry(path: &Path, name: &str) -> String {
    let mut zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut entry = zip.by_name(name).unwrap();
    let mut content = String::new();
    entry.read_to_string(&mut content).unwrap();
    content
}

/// Raw bytes of an archive entry.
#[allow(dead_code)]
pub fn read_entry_bytes(path: &Path, name: &str) -> Vec<u8> {
    let mut zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut entry = zip.by_name(name).unwrap();
    let mut content = Vec::new();
    entry.read_to_end(&mut content).unwrap();
    content
}

/// Reads all page documents of an output book, in spine order.
#[allow(dead_code)]
pub fn read_pages(path: &Path) -> Vec<String> {
    entry_names(path)
        .into_iter()
        .filter(|name| name.starts_with("OEBPS/Text/"))
        .map(|name| read_entry(path, &name))
        .collect()
}
