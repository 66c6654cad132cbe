//! Building the output package tree.
//!
//! The [`PackageBuilder`] lays out `META-INF/` and `OEBPS/` in a build directory,
//! writes one XHTML document per page, and generates the container descriptor, the
//! package document, and the NCX navigation document. The resulting tree is then
//! zipped by [`crate::archive::write_archive`].

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info};
use quick_xml::Writer;
use quick_xml::escape::escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use uuid::Uuid;

use crate::error::Result;
use crate::package::{CONTAINER_PATH, DC_NS, NCX_NS, OPF_NS};
use crate::path_utils::{get_file_name_lossy, get_file_stem_lossy, path_to_string_lossy, slugify};
use crate::types::{
    CopiedAsset, MEDIA_TYPE_CSS, MEDIA_TYPE_NCX, MEDIA_TYPE_XHTML, NavigationEntry, Package,
    PackageMetadata, Page, PageBody,
};

/// Directory holding the package content inside the archive.
pub const OEBPS: &str = "OEBPS";
const PACKAGE_FILE: &str = "content.opf";
const NCX_FILE: &str = "toc.ncx";
/// Title of the navigation document when the source has no `dc:title`.
const DEFAULT_DOC_TITLE: &str = "Images";

/// Picks the identifier of the output book: the source's first non-empty
/// `dc:identifier`, otherwise a fresh `urn:uuid:` value.
pub fn resolve_identifier(metadata: &PackageMetadata) -> String {
    metadata
        .identifier()
        .map(str::to_string)
        .unwrap_or_else(|| format!("urn:uuid:{}", Uuid::new_v4()))
}

/// One navigation entry per page, in page order, numbered from 1.
pub fn navigation_entries(pages: &[Page]) -> Vec<NavigationEntry> {
    pages
        .iter()
        .enumerate()
        .map(|(index, page)| NavigationEntry {
            label: page.title.clone(),
            target_href: page.href.clone(),
            play_order: index + 1,
        })
        .collect()
}

/// Generates the XHTML document of a page.
///
/// # Arguments
///
/// * `page` - The page to render
/// * `stylesheets` - File names inside `OEBPS/Styles/` every page links to
///
/// # Returns
///
/// * `String` - The complete document
pub fn render_page(page: &Page, stylesheets: &[String]) -> String {
    const IMAGE_TEMPLATE: &str = include_str!("../templates/ImagePage.xhtml");
    const TEXT_TEMPLATE: &str = include_str!("../templates/TextPage.xhtml");

    let css_links: String = stylesheets
        .iter()
        .map(|name| {
            format!(
                "  <link rel=\"stylesheet\" type=\"text/css\" href=\"../Styles/{}\"/>\n",
                escape(name.as_str())
            )
        })
        .collect();
    let title = escape(page.title.as_str());

    // Content is substituted last so placeholders inside it stay literal.
    match &page.body {
        PageBody::Image { asset, alt } => IMAGE_TEMPLATE
            .replace("%title%", &title)
            .replace("%css_links%", &css_links)
            .replace("%alt%", &escape(alt.as_str()))
            .replace("%src%", &format!("../Images/{}", escape(asset.as_str()))),
        PageBody::Text(fragment) => TEXT_TEMPLATE
            .replace("%title%", &title)
            .replace("%css_links%", &css_links)
            .replace("%content%", fragment),
    }
}

/// Files written by [`PackageBuilder::finish`].
#[derive(Debug, Clone)]
pub struct BuiltPackage {
    /// The identifier shared by the package and navigation documents.
    pub identifier: String,
    /// Paths relative to the build root, in archive order (without `mimetype`).
    pub entries: Vec<PathBuf>,
    pub navigation: Vec<NavigationEntry>,
}

/// Lays out the output package in a build directory.
#[derive(Debug)]
pub struct PackageBuilder {
    root: PathBuf,
    /// Stylesheet file names in first-copy order, without duplicates.
    stylesheets: Vec<String>,
}

impl PackageBuilder {
    /// Creates the directory skeleton below `root`.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let builder = Self {
            root: root.into(),
            stylesheets: Vec::new(),
        };
        fs::create_dir_all(builder.root.join("META-INF"))?;
        fs::create_dir_all(builder.text_dir())?;
        fs::create_dir_all(builder.images_dir())?;
        fs::create_dir_all(builder.styles_dir())?;
        Ok(builder)
    }

    pub fn oebps_dir(&self) -> PathBuf {
        self.root.join(OEBPS)
    }

    pub fn text_dir(&self) -> PathBuf {
        self.oebps_dir().join("Text")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.oebps_dir().join("Images")
    }

    pub fn styles_dir(&self) -> PathBuf {
        self.oebps_dir().join("Styles")
    }

    pub fn stylesheets(&self) -> &[String] {
        &self.stylesheets
    }

    /// Copies every stylesheet of the source manifest into `OEBPS/Styles/`.
    ///
    /// Stylesheets are stored flat by file name; a later file with an already used
    /// name overwrites the earlier one. Items whose file is missing are skipped.
    ///
    /// # Returns
    ///
    /// * `Result<usize>` - Number of distinct stylesheets now in the package
    pub fn copy_stylesheets(&mut self, package: &Package) -> Result<usize> {
        for item in package.stylesheets() {
            let source = package.resolve_href(&item.href);
            if !source.is_file() {
                debug!(
                    "Stylesheet '{}' is listed but missing",
                    path_to_string_lossy(&source)
                );
                continue;
            }

            let name = get_file_name_lossy(&source);
            fs::copy(&source, self.styles_dir().join(&name))?;
            if !self.stylesheets.contains(&name) {
                self.stylesheets.push(name);
            }
        }
        Ok(self.stylesheets.len())
    }

    /// Writes the pages and the package metadata files.
    ///
    /// Image assets are expected to be in [`Self::images_dir`] already.
    pub fn finish(
        self,
        metadata: &PackageMetadata,
        pages: &[Page],
        assets: &[CopiedAsset],
    ) -> Result<BuiltPackage> {
        let identifier = resolve_identifier(metadata);
        let navigation = navigation_entries(pages);
        let oebps = Path::new(OEBPS);

        let mut entries = vec![PathBuf::from(CONTAINER_PATH)];
        fs::write(
            self.root.join(CONTAINER_PATH),
            include_str!("../templates/container.xml"),
        )?;

        fs::write(
            self.oebps_dir().join(PACKAGE_FILE),
            render_package_document(metadata, &identifier, &self.stylesheets, pages, assets)?,
        )?;
        entries.push(oebps.join(PACKAGE_FILE));

        fs::write(
            self.oebps_dir().join(NCX_FILE),
            render_navigation(metadata, &identifier, &navigation)?,
        )?;
        entries.push(oebps.join(NCX_FILE));

        for name in &self.stylesheets {
            entries.push(oebps.join("Styles").join(name));
        }
        for page in pages {
            fs::write(
                self.oebps_dir().join(&page.href),
                render_page(page, &self.stylesheets),
            )?;
            entries.push(oebps.join(&page.href));
        }
        for asset in assets {
            entries.push(oebps.join("Images").join(&asset.new_name));
        }

        info!(
            "Built package with {} pages, {} images and {} stylesheets",
            pages.len(),
            assets.len(),
            self.stylesheets.len()
        );
        Ok(BuiltPackage {
            identifier,
            entries,
            navigation,
        })
    }
}

fn write_text_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    attributes: &[(&str, &str)],
    text: &str,
) -> Result<()> {
    let mut start = BytesStart::new(name);
    for attribute in attributes {
        start.push_attribute(*attribute);
    }
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_empty_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    attributes: &[(&str, &str)],
) -> Result<()> {
    let mut element = BytesStart::new(name);
    for attribute in attributes {
        element.push_attribute(*attribute);
    }
    writer.write_event(Event::Empty(element))?;
    Ok(())
}

fn start_document() -> Result<Writer<Vec<u8>>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    Ok(writer)
}

fn finish_document(writer: Writer<Vec<u8>>) -> String {
    let mut document = String::from_utf8_lossy(&writer.into_inner()).into_owned();
    document.push('\n');
    document
}

/// Manifest ids of the stylesheets, unique even when names slugify alike.
fn stylesheet_ids(stylesheets: &[String]) -> Vec<String> {
    let mut used = HashSet::new();
    stylesheets
        .iter()
        .map(|name| {
            let base = format!("css-{}", slugify(&get_file_stem_lossy(Path::new(name))));
            let mut id = base.clone();
            let mut suffix = 2;
            while !used.insert(id.clone()) {
                id = format!("{}-{}", base, suffix);
                suffix += 1;
            }
            id
        })
        .collect()
}

/// Generates `content.opf`.
pub fn render_package_document(
    metadata: &PackageMetadata,
    identifier: &str,
    stylesheets: &[String],
    pages: &[Page],
    assets: &[CopiedAsset],
) -> Result<String> {
    let mut writer = start_document()?;

    let mut package = BytesStart::new("package");
    package.push_attribute(("xmlns", OPF_NS));
    package.push_attribute(("xmlns:dc", DC_NS));
    package.push_attribute(("version", "2.0"));
    package.push_attribute(("unique-identifier", "BookId"));
    writer.write_event(Event::Start(package))?;

    writer.write_event(Event::Start(BytesStart::new("metadata")))?;
    for (name, value) in &metadata.dublin_core {
        if name == "identifier" || value.is_empty() {
            continue;
        }
        write_text_element(&mut writer, &format!("dc:{}", name), &[], value)?;
    }
    write_text_element(&mut writer, "dc:identifier", &[("id", "BookId")], identifier)?;
    for (name, content) in &metadata.annotations {
        write_empty_element(
            &mut writer,
            "meta",
            &[("name", name.as_str()), ("content", content.as_str())],
        )?;
    }
    writer.write_event(Event::End(BytesEnd::new("metadata")))?;

    writer.write_event(Event::Start(BytesStart::new("manifest")))?;
    write_empty_element(
        &mut writer,
        "item",
        &[("id", "ncx"), ("href", NCX_FILE), ("media-type", MEDIA_TYPE_NCX)],
    )?;
    for (id, name) in stylesheet_ids(stylesheets).iter().zip(stylesheets) {
        let href = format!("Styles/{}", name);
        write_empty_element(
            &mut writer,
            "item",
            &[
                ("id", id.as_str()),
                ("href", href.as_str()),
                ("media-type", MEDIA_TYPE_CSS),
            ],
        )?;
    }
    for page in pages {
        write_empty_element(
            &mut writer,
            "item",
            &[
                ("id", page.id.as_str()),
                ("href", page.href.as_str()),
                ("media-type", MEDIA_TYPE_XHTML),
            ],
        )?;
    }
    for (index, asset) in assets.iter().enumerate() {
        let id = format!("image{:04}", index + 1);
        let href = format!("Images/{}", asset.new_name);
        write_empty_element(
            &mut writer,
            "item",
            &[
                ("id", id.as_str()),
                ("href", href.as_str()),
                ("media-type", asset.media_type.as_str()),
            ],
        )?;
    }
    writer.write_event(Event::End(BytesEnd::new("manifest")))?;

    let mut spine = BytesStart::new("spine");
    spine.push_attribute(("toc", "ncx"));
    writer.write_event(Event::Start(spine))?;
    for page in pages {
        write_empty_element(&mut writer, "itemref", &[("idref", page.id.as_str())])?;
    }
    writer.write_event(Event::End(BytesEnd::new("spine")))?;

    writer.write_event(Event::End(BytesEnd::new("package")))?;
    Ok(finish_document(writer))
}

/// Generates `toc.ncx`.
pub fn render_navigation(
    metadata: &PackageMetadata,
    identifier: &str,
    navigation: &[NavigationEntry],
) -> Result<String> {
    let mut writer = start_document()?;

    let mut ncx = BytesStart::new("ncx");
    ncx.push_attribute(("xmlns", NCX_NS));
    ncx.push_attribute(("version", "2005-1"));
    writer.write_event(Event::Start(ncx))?;

    writer.write_event(Event::Start(BytesStart::new("head")))?;
    for (name, content) in [
        ("dtb:uid", identifier),
        ("dtb:depth", "1"),
        ("dtb:totalPageCount", "0"),
        ("dtb:maxPageNumber", "0"),
    ] {
        write_empty_element(&mut writer, "meta", &[("name", name), ("content", content)])?;
    }
    writer.write_event(Event::End(BytesEnd::new("head")))?;

    writer.write_event(Event::Start(BytesStart::new("docTitle")))?;
    write_text_element(
        &mut writer,
        "text",
        &[],
        metadata.title().unwrap_or(DEFAULT_DOC_TITLE),
    )?;
    writer.write_event(Event::End(BytesEnd::new("docTitle")))?;

    writer.write_event(Event::Start(BytesStart::new("navMap")))?;
    for entry in navigation {
        let id = format!("navpoint-{}", entry.play_order);
        let play_order = entry.play_order.to_string();
        let mut nav_point = BytesStart::new("navPoint");
        nav_point.push_attribute(("id", id.as_str()));
        nav_point.push_attribute(("playOrder", play_order.as_str()));
        writer.write_event(Event::Start(nav_point))?;

        writer.write_event(Event::Start(BytesStart::new("navLabel")))?;
        write_text_element(&mut writer, "text", &[], &entry.label)?;
        writer.write_event(Event::End(BytesEnd::new("navLabel")))?;
        write_empty_element(&mut writer, "content", &[("src", entry.target_href.as_str())])?;

        writer.write_event(Event::End(BytesEnd::new("navPoint")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("navMap")))?;

    writer.write_event(Event::End(BytesEnd::new("ncx")))?;
    Ok(finish_document(writer))
}
