//! Reading and writing EPUB container archives.

use crate::error::{Error, Result};
use crate::path_utils::{path_to_string_lossy, to_archive_path};
use log::debug;
use memmap2::MmapOptions;
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Name and content of the first archive entry.
pub const MIMETYPE_ENTRY: &str = "mimetype";
pub const EPUB_MIMETYPE: &str = "application/epub+zip";

/// Extracts an archive into `destination`.
///
/// Entries whose names would leave `destination` are rejected by the zip crate.
pub fn extract_archive(archive: &Path, destination: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!(
                "Failed to open archive '{}': {}",
                path_to_string_lossy(archive),
                e
            ),
        ))
    })?;

    let mut zip = ZipArchive::new(BufReader::new(file))?;
    debug!(
        "Extracting {} entries of '{}'",
        zip.len(),
        path_to_string_lossy(archive)
    );
    zip.extract(destination)?;
    Ok(())
}

/// Zips a package tree into an EPUB file.
///
/// `mimetype` is written first and stored uncompressed; every other entry is
/// deflated, in the order given. The archive is assembled in a temporary file next
/// to `output` and only renamed into place once complete, so a failure leaves
/// nothing at `output`.
///
/// # Arguments
///
/// * `tree_root` - Directory the entries are relative to
/// * `entries` - Relative paths of the files to include
/// * `output` - Final location of the archive
pub fn write_archive(tree_root: &Path, entries: &[PathBuf], output: &Path) -> Result<()> {
    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let partial = tempfile::Builder::new()
        .prefix(".imgsplit-")
        .suffix(".partial")
        .tempfile_in(&parent)?;

    let stored = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .unix_permissions(0o644);
    let deflated = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let mut zip = ZipWriter::new(partial.as_file());
    zip.start_file(MIMETYPE_ENTRY, stored)?;
    zip.write_all(EPUB_MIMETYPE.as_bytes())?;

    for entry in entries {
        let file = File::open(tree_root.join(entry))?;
        zip.start_file(to_archive_path(entry), deflated)?;
        if file.metadata()?.len() > 0 {
            // SAFETY: the build tree is private to this conversion and not modified
            // while it is being archived.
            let mmap = unsafe { MmapOptions::new().map(&file)? };
            zip.write_all(&mmap[..])?;
        }
    }
    zip.finish()?;

    partial.persist(output).map_err(|e| Error::Io(e.error))?;
    debug!(
        "Wrote {} entries to '{}'",
        entries.len() + 1,
        path_to_string_lossy(output)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_mimetype_first_and_stored() {
        let dir = TempDir::new().expect("tempdir");
        let tree = dir.path().join("tree");
        fs::create_dir_all(tree.join("OEBPS/Text")).expect("tree");
        fs::write(tree.join("OEBPS/Text/a.xhtml"), "<html/>").expect("page");
        fs::write(tree.join("OEBPS/empty.css"), "").expect("css");
        let output = dir.path().join("out/book.epub");

        write_archive(
            &tree,
            &[
                PathBuf::from("OEBPS").join("Text").join("a.xhtml"),
                PathBuf::from("OEBPS/empty.css"),
            ],
            &output,
        )
        .expect("write");

        let mut zip = ZipArchive::new(File::open(&output).expect("open")).expect("zip");
        let names: Vec<String> = zip.file_names().map(str::to_string).collect();
        assert_eq!(zip.len(), 3);

        let mut first = zip.by_index(0).expect("first entry");
        assert_eq!(first.name(), MIMETYPE_ENTRY);
        assert_eq!(first.compression(), CompressionMethod::Stored);
        let mut content = String::new();
        first.read_to_string(&mut content).expect("read");
        assert_eq!(content, EPUB_MIMETYPE);
        drop(first);

        assert!(names.contains(&"OEBPS/Text/a.xhtml".to_string()));
        let page = zip.by_name("OEBPS/Text/a.xhtml").expect("page");
        assert_eq!(page.compression(), CompressionMethod::Deflated);

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("out"))
            .expect("out dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_failed_write_leaves_no_output() {
        let dir = TempDir::new().expect("tempdir");
        let output = dir.path().join("book.epub");
        let result = write_archive(dir.path(), &[PathBuf::from("missing.xhtml")], &output);
        assert!(result.is_err());
        assert!(!output.exists());
        assert_eq!(fs::read_dir(dir.path()).expect("dir").count(), 0);
    }

    #[test]
    fn test_extract_round_trip() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("x.txt"), "hello").expect("file");
        let output = dir.path().join("a.epub");
        write_archive(dir.path(), &[PathBuf::from("x.txt")], &output).expect("write");

        let extracted = dir.path().join("extracted");
        extract_archive(&output, &extracted).expect("extract");
        assert_eq!(
            fs::read_to_string(extracted.join("mimetype")).expect("mimetype"),
            EPUB_MIMETYPE
        );
        assert_eq!(
            fs::read_to_string(extracted.join("x.txt")).expect("x"),
            "hello"
        );
    }
}
