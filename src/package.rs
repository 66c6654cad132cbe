//! Reading the source package: container descriptor, package document, manifest, and spine.
//!
//! The container descriptor (`META-INF/container.xml`) names the package document;
//! the package document is parsed namespace-aware so Dublin Core fields can be told
//! apart from generic `<meta>` annotations regardless of the prefixes a book uses.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::{NsReader, Reader};

use crate::error::{Error, Result};
use crate::types::{ManifestItem, Package, PackageMetadata};

/// Relative location of the container descriptor inside an extracted archive.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

pub const OPF_NS: &str = "http://www.idpf.org/2007/opf";
pub const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
pub const NCX_NS: &str = "http://www.daisy.org/z3986/2005/ncx/";

/// Reads the package of an extracted archive.
///
/// # Arguments
///
/// * `root` - Root directory of the extracted archive
///
/// # Returns
///
/// * `Ok(Package)` - Metadata, manifest, and spine of the package document
/// * `Err(Error)` - `MissingContainer`, `MissingRootfile`, `MissingManifestOrSpine`, or I/O and XML errors
pub fn read_package(root: &Path) -> Result<Package> {
    let package_path = find_package_document(root)?;
    parse_package(&package_path)
}

/// Locates the package document declared by the container descriptor.
pub fn find_package_document(root: &Path) -> Result<PathBuf> {
    let container_path = root.join(CONTAINER_PATH);
    if !container_path.is_file() {
        return Err(Error::MissingContainer(container_path));
    }

    let bytes = fs::read(&container_path)?;
    let content = String::from_utf8_lossy(strip_bom(&bytes));
    let full_path = parse_container(&content)?
        .ok_or_else(|| Error::MissingRootfile(container_path.clone()))?;

    let package_path = root.join(full_path);
    Ok(package_path.canonicalize().unwrap_or(package_path))
}

/// Returns the `full-path` of the first declared root file, if any.
///
/// Only the first `<rootfile>` counts; when it lacks a `full-path`, the container
/// is treated as declaring nothing.
pub fn parse_container(content: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"rootfile" => {
                let full_path = attribute(&e, b"full-path").filter(|p| !p.is_empty());
                return Ok(full_path);
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Parses a package document from disk.
pub fn parse_package(package_path: &Path) -> Result<Package> {
    let bytes = fs::read(package_path)?;
    let content = String::from_utf8_lossy(strip_bom(&bytes));
    let parsed = parse_package_document(&content)?
        .ok_or_else(|| Error::MissingManifestOrSpine(package_path.to_path_buf()))?;

    Ok(Package {
        package_path: package_path.to_path_buf(),
        metadata: parsed.metadata,
        manifest: parsed.manifest,
        spine: parsed.spine,
    })
}

/// The namespace-independent content of a package document.
#[derive(Debug, Default)]
pub struct PackageDocument {
    pub metadata: PackageMetadata,
    pub manifest: Vec<ManifestItem>,
    pub spine: Vec<ManifestItem>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum XmlNamespace {
    Opf,
    DublinCore,
    Other,
}

fn classify(resolved: &ResolveResult) -> XmlNamespace {
    match resolved {
        ResolveResult::Bound(Namespace(ns)) if *ns == OPF_NS.as_bytes() => XmlNamespace::Opf,
        ResolveResult::Bound(Namespace(ns)) if *ns == DC_NS.as_bytes() => XmlNamespace::DublinCore,
        _ => XmlNamespace::Other,
    }
}

/// Parses package document text.
///
/// Returns `Ok(None)` when the manifest or the spine section is missing.
/// Manifest items need a non-empty id, href, and media type; spine references
/// that resolve to no manifest item are dropped.
pub fn parse_package_document(content: &str) -> Result<Option<PackageDocument>> {
    let mut reader = NsReader::from_str(content);
    // Text is trimmed per field instead, entity references split text events
    reader.config_mut().trim_text(false);

    let mut document = PackageDocument::default();
    let mut spine_ids: Vec<String> = Vec::new();
    let mut saw_manifest = false;
    let mut saw_spine = false;

    let mut in_metadata = false;
    // Dublin Core field currently collecting text
    let mut current_field: Option<String> = None;
    let mut buf_text = String::new();

    loop {
        let (resolved, event) = reader.read_resolved_event()?;
        let namespace = classify(&resolved);

        match event {
            Event::Start(e) => {
                let local = e.local_name();
                match (namespace, local.as_ref()) {
                    (XmlNamespace::Opf, b"metadata") => in_metadata = true,
                    (XmlNamespace::Opf, b"manifest") => saw_manifest = true,
                    (XmlNamespace::Opf, b"spine") => saw_spine = true,
                    (XmlNamespace::Opf, b"item") => push_item(&mut document, &e),
                    (XmlNamespace::Opf, b"itemref") => push_itemref(&mut spine_ids, &e),
                    (XmlNamespace::Opf, b"meta") if in_metadata => push_meta(&mut document, &e),
                    (XmlNamespace::DublinCore, name) if in_metadata => {
                        current_field = Some(String::from_utf8_lossy(name).to_string());
                        buf_text.clear();
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                let local = e.local_name();
                match (namespace, local.as_ref()) {
                    (XmlNamespace::Opf, b"manifest") => saw_manifest = true,
                    (XmlNamespace::Opf, b"spine") => saw_spine = true,
                    (XmlNamespace::Opf, b"item") => push_item(&mut document, &e),
                    (XmlNamespace::Opf, b"itemref") => push_itemref(&mut spine_ids, &e),
                    (XmlNamespace::Opf, b"meta") if in_metadata => push_meta(&mut document, &e),
                    (XmlNamespace::DublinCore, name) if in_metadata => {
                        let name = String::from_utf8_lossy(name).to_string();
                        document.metadata.dublin_core.push((name, String::new()));
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                if current_field.is_some() {
                    buf_text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::CData(e) => {
                if current_field.is_some() {
                    buf_text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if current_field.is_some() {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    if let Some(resolved) = resolve_entity(&entity) {
                        buf_text.push_str(&resolved);
                    }
                }
            }
            Event::End(e) => {
                let local = e.local_name();
                if namespace == XmlNamespace::Opf && local.as_ref() == b"metadata" {
                    in_metadata = false;
                }
                if namespace == XmlNamespace::DublinCore {
                    if let Some(field) = current_field.take() {
                        let value = buf_text.trim().to_string();
                        document.metadata.dublin_core.push((field, value));
                        buf_text.clear();
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_manifest || !saw_spine {
        return Ok(None);
    }

    for idref in spine_ids {
        match document.manifest.iter().find(|item| item.id == idref) {
            Some(item) => document.spine.push(item.clone()),
            None => debug!("Dropping spine reference to unknown manifest id '{}'", idref),
        }
    }

    Ok(Some(document))
}

fn push_item(document: &mut PackageDocument, e: &BytesStart) {
    let id = attribute(e, b"id").unwrap_or_default();
    let href = attribute(e, b"href").unwrap_or_default();
    let media_type = attribute(e, b"media-type").unwrap_or_default();
    let properties = attribute(e, b"properties").unwrap_or_default();

    if id.is_empty() || href.is_empty() || media_type.is_empty() {
        debug!("Ignoring incomplete manifest item (id '{}', href '{}')", id, href);
        return;
    }

    document.manifest.push(ManifestItem {
        id,
        href,
        media_type,
        properties,
    });
}

fn push_itemref(spine_ids: &mut Vec<String>, e: &BytesStart) {
    if let Some(idref) = attribute(e, b"idref") {
        spine_ids.push(idref);
    }
}

fn push_meta(document: &mut PackageDocument, e: &BytesStart) {
    let name = attribute(e, b"name").filter(|n| !n.is_empty());
    let content = attribute(e, b"content").filter(|c| !c.is_empty());
    if let (Some(name), Some(content)) = (name, content) {
        document.metadata.annotations.push((name, content));
    }
}

/// Reads an attribute by local name, unescaping entity references.
fn attribute(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name)
        .map(|attr| {
            let raw = String::from_utf8_lossy(&attr.value).to_string();
            match quick_xml::escape::unescape(&raw) {
                Ok(unescaped) => unescaped.into_owned(),
                Err(_) => raw,
            }
        })
}

/// Strip UTF-8 BOM if present.
pub fn strip_bom(data: &[u8]) -> &[u8] {
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &data[3..]
    } else {
        data
    }
}

/// Resolve XML entity references.
pub(crate) fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        _ => {}
    }

    let code = if let Some(hex) = entity.strip_prefix("#x") {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse::<u32>().ok()
    } else {
        None
    };
    code.and_then(char::from_u32).map(|c| c.to_string())
}
