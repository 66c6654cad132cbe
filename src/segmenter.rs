//! Splitting content documents into image pages and text pages.
//!
//! The [`DocumentSegmenter`] walks the body of each document in order, buffering
//! everything that is not an image. When an image that survives resolution is
//! reached, the buffered nodes become a text page and the image becomes a page of
//! its own. Elements that merely wrap an image are descended into, so the text
//! around the image inside the same paragraph lands on the correct side of it;
//! each side keeps a copy of the wrapping element's tags.

use crate::assets::AssetResolver;
use crate::error::Result;
use crate::markup::{ContentNode, ElementNode, MarkupDocument};
use crate::path_utils::{get_file_stem_lossy, path_to_string_lossy};
use crate::types::{Page, PageBody};
use log::debug;
use std::path::Path;

/// Per-document state of a segmentation pass.
struct DocumentContext<'p> {
    document_path: &'p Path,
    /// Prefix of text page titles, the document's file stem.
    stem: String,
}

/// A piece of buffered text content.
enum Fragment<'n> {
    Node(&'n ContentNode),
    /// Content found inside an element that also holds an image.
    Wrapped(&'n ElementNode, Vec<Fragment<'n>>),
}

impl Fragment<'_> {
    fn has_visible_text(&self) -> bool {
        match self {
            Fragment::Node(node) => node.has_visible_text(),
            Fragment::Wrapped(_, inner) => inner.iter().any(Fragment::has_visible_text),
        }
    }

    fn render(&self) -> String {
        match self {
            Fragment::Node(node) => node.render(),
            Fragment::Wrapped(element, inner) => {
                let content: String = inner.iter().map(Fragment::render).collect();
                element.render_shell(&content)
            }
        }
    }
}

/// Text content waiting for the next flush, with one level per image-holding
/// element being descended into.
#[derive(Default)]
struct TextBuffer<'n> {
    root: Vec<Fragment<'n>>,
    open: Vec<(&'n ElementNode, Vec<Fragment<'n>>)>,
}

impl<'n> TextBuffer<'n> {
    fn push(&mut self, fragment: Fragment<'n>) {
        match self.open.last_mut() {
            Some((_, inner)) => inner.push(fragment),
            None => self.root.push(fragment),
        }
    }

    fn enter(&mut self, element: &'n ElementNode) {
        self.open.push((element, Vec::new()));
    }

    fn leave(&mut self) {
        if let Some((element, inner)) = self.open.pop() {
            if !inner.is_empty() {
                self.push(Fragment::Wrapped(element, inner));
            }
        }
    }

    /// Takes everything buffered so far. Open elements stay open, so content
    /// that follows lands in fresh copies of them.
    fn take(&mut self) -> Vec<Fragment<'n>> {
        let mut carried: Option<Fragment<'n>> = None;
        for (element, inner) in self.open.iter_mut().rev() {
            let mut content = std::mem::take(inner);
            content.extend(carried.take());
            if !content.is_empty() {
                carried = Some(Fragment::Wrapped(*element, content));
            }
        }
        let mut fragments = std::mem::take(&mut self.root);
        fragments.extend(carried);
        fragments
    }
}

/// Produces the ordered pages of the output book.
///
/// Page identifiers are numbered from a single counter shared by image and text
/// pages, across every document fed to the same segmenter. Text page titles are
/// numbered across the whole book as well.
#[derive(Debug)]
pub struct DocumentSegmenter {
    images_only: bool,
    next_page_number: u32,
    next_text_number: u32,
    skipped_images: usize,
    pages: Vec<Page>,
}

impl DocumentSegmenter {
    pub fn new(images_only: bool) -> Self {
        Self {
            images_only,
            next_page_number: 1,
            next_text_number: 1,
            skipped_images: 0,
            pages: Vec::new(),
        }
    }

    /// Segments one document, appending its pages.
    ///
    /// # Arguments
    ///
    /// * `document` - The parsed document
    /// * `document_path` - Location of the document, the base of its image references
    /// * `resolver` - Resolver shared by the whole conversion
    ///
    /// # Returns
    ///
    /// * `Result<usize>` - Number of pages this document contributed
    pub fn segment(
        &mut self,
        document: &MarkupDocument,
        document_path: &Path,
        resolver: &mut AssetResolver,
    ) -> Result<usize> {
        let stem = get_file_stem_lossy(document_path);
        let context = DocumentContext {
            document_path,
            stem: if stem.is_empty() { "Text".to_string() } else { stem },
        };

        let before = self.pages.len();
        let mut buffer = TextBuffer::default();
        self.walk(document.content(), &mut buffer, &context, resolver)?;
        self.flush(&mut buffer, &context);

        let added = self.pages.len() - before;
        debug!(
            "Segmented '{}' into {} pages",
            path_to_string_lossy(document_path),
            added
        );
        Ok(added)
    }

    fn walk<'n>(
        &mut self,
        nodes: &'n [ContentNode],
        buffer: &mut TextBuffer<'n>,
        context: &DocumentContext<'_>,
        resolver: &mut AssetResolver,
    ) -> Result<()> {
        for node in nodes {
            match node {
                ContentNode::Element(element) if element.is_image() => {
                    self.visit_image(element, buffer, context, resolver)?;
                }
                ContentNode::Element(element) if node.contains_image() => {
                    buffer.enter(element);
                    self.walk(&element.children, buffer, context, resolver)?;
                    buffer.leave();
                }
                _ => buffer.push(Fragment::Node(node)),
            }
        }
        Ok(())
    }

    /// Handles an `img` element. A surviving image flushes the buffer and becomes a
    /// page; a missing or rejected one leaves the buffer untouched.
    fn visit_image(
        &mut self,
        image: &ElementNode,
        buffer: &mut TextBuffer<'_>,
        context: &DocumentContext<'_>,
        resolver: &mut AssetResolver,
    ) -> Result<()> {
        let Some(src) = image.attribute("src").filter(|src| !src.trim().is_empty()) else {
            debug!(
                "Image without a source in '{}'",
                path_to_string_lossy(context.document_path)
            );
            self.skipped_images += 1;
            return Ok(());
        };

        let Some(asset) = resolver.intern(src, context.document_path)? else {
            self.skipped_images += 1;
            return Ok(());
        };

        self.flush(buffer, context);

        let title = get_file_stem_lossy(Path::new(&asset));
        let alt = image
            .attribute("alt")
            .map(str::trim)
            .filter(|alt| !alt.is_empty())
            .map_or_else(|| title.clone(), str::to_string);
        let id = self.next_page_id("imgpage");
        self.pages.push(Page {
            href: format!("Text/{}.xhtml", id),
            title,
            body: PageBody::Image { asset, alt },
            id,
        });
        Ok(())
    }

    /// Turns the buffered content into a text page, unless it shows no text.
    fn flush(&mut self, buffer: &mut TextBuffer<'_>, context: &DocumentContext<'_>) {
        let fragments = buffer.take();
        if self.images_only || fragments.is_empty() {
            return;
        }

        let fragment = fragments
            .iter()
            .filter(|fragment| fragment.has_visible_text())
            .map(Fragment::render)
            .collect::<Vec<_>>()
            .join("\n");
        if fragment.is_empty() {
            return;
        }

        let title = format!("{} {}", context.stem, self.next_text_number);
        self.next_text_number += 1;
        let id = self.next_page_id("textpage");
        self.pages.push(Page {
            href: format!("Text/{}.xhtml", id),
            title,
            body: PageBody::Text(fragment),
            id,
        });
    }

    fn next_page_id(&mut self, prefix: &str) -> String {
        let id = format!("{}{:04}", prefix, self.next_page_number);
        self.next_page_number += 1;
        id
    }

    /// Image occurrences that produced no page.
    pub fn skipped_images(&self) -> usize {
        self.skipped_images
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn into_pages(self) -> Vec<Page> {
        self.pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::ParseMode;
    use crate::types::PageKind;
    use image::{Rgb, RgbImage};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Book {
        _dir: TempDir,
        chapter: PathBuf,
        resolver: AssetResolver,
    }

    fn book() -> Book {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("book");
        let images = root.join("OEBPS/Images");
        fs::create_dir_all(&images).expect("images dir");
        fs::create_dir_all(root.join("OEBPS/Text")).expect("text dir");
        let out = dir.path().join("out");
        fs::create_dir_all(&out).expect("out dir");

        RgbImage::from_pixel(20, 30, Rgb([0, 0, 0]))
            .save(images.join("fig.png"))
            .expect("fig");
        RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]))
            .save(images.join("other.png"))
            .expect("other");
        RgbImage::from_pixel(1, 1, Rgb([0, 0, 0]))
            .save(images.join("pixel.png"))
            .expect("pixel");

        let resolver = AssetResolver::new(&root, root.join("OEBPS"), &out, 2, 2);
        Book {
            chapter: root.join("OEBPS/Text/chapter.xhtml"),
            _dir: dir,
            resolver,
        }
    }

    fn run(book: &mut Book, body: &str, images_only: bool) -> Vec<Page> {
        let html = format!("<html><head><title>x</title></head><body>{}</body></html>", body);
        let document = MarkupDocument::parse(html.as_bytes(), ParseMode::Tolerant);
        let mut segmenter = DocumentSegmenter::new(images_only);
        segmenter
            .segment(&document, &book.chapter, &mut book.resolver)
            .expect("segment");
        segmenter.into_pages()
    }

    fn text_of(page: &Page) -> &str {
        match &page.body {
            PageBody::Text(fragment) => fragment,
            PageBody::Image { .. } => panic!("expected a text page"),
        }
    }

    #[test]
    fn test_text_image_text() {
        let mut book = book();
        let pages = run(
            &mut book,
            "<p>Before</p><img src=\"../Images/fig.png\" alt=\"Figure\"/><p>After</p>",
            false,
        );
        let kinds: Vec<PageKind> = pages.iter().map(Page::kind).collect();
        assert_eq!(kinds, vec![PageKind::Text, PageKind::Image, PageKind::Text]);
        assert_eq!(pages[0].id, "textpage0001");
        assert_eq!(pages[1].id, "imgpage0002");
        assert_eq!(pages[2].id, "textpage0003");
        assert_eq!(pages[0].title, "chapter 1");
        assert_eq!(pages[2].title, "chapter 2");
        assert_eq!(pages[1].title, "img0001");
        assert_eq!(pages[1].href, "Text/imgpage0002.xhtml");
        assert_eq!(
            pages[1].body,
            PageBody::Image {
                asset: "img0001.png".to_string(),
                alt: "Figure".to_string()
            }
        );
        assert_eq!(text_of(&pages[0]), "<p>Before</p>");
        assert_eq!(text_of(&pages[2]), "<p>After</p>");
    }

    #[test]
    fn test_image_inside_paragraph_splits_it() {
        let mut book = book();
        let pages = run(
            &mut book,
            "<div><p>lead <b>in</b></p><p>left <img src=\"../Images/fig.png\"/> right</p></div>",
            false,
        );
        assert_eq!(pages.len(), 3);
        assert_eq!(
            text_of(&pages[0]),
            "<div><p>lead <b>in</b></p><p>left </p></div>"
        );
        assert_eq!(pages[1].title, "img0001");
        assert_eq!(text_of(&pages[2]), "<div><p> right</p></div>");
    }

    #[test]
    fn test_placeholder_image_does_not_split() {
        let mut book = book();
        let pages = run(
            &mut book,
            "<p>intro</p><img src=\"../Images/pixel.png\"/><p>outro</p>",
            false,
        );
        assert_eq!(pages.len(), 1);
        assert_eq!(text_of(&pages[0]), "<p>intro</p>\n<p>outro</p>");
    }

    #[test]
    fn test_unresolved_and_sourceless_images_are_skipped() {
        let mut book = book();
        let html = "<p>a</p><img src=\"../Images/missing.png\"/><img/><p>b</p>";
        let document =
            MarkupDocument::parse(format!("<body>{html}</body>").as_bytes(), ParseMode::Tolerant);
        let mut segmenter = DocumentSegmenter::new(false);
        segmenter
            .segment(&document, &book.chapter, &mut book.resolver)
            .expect("segment");
        assert_eq!(segmenter.skipped_images(), 2);
        assert_eq!(segmenter.pages().len(), 1);
    }

    #[test]
    fn test_images_only() {
        let mut book = book();
        let pages = run(
            &mut book,
            "<p>a</p><img src=\"../Images/fig.png\"/><p>b</p><img src=\"../Images/other.png\"/>",
            true,
        );
        let kinds: Vec<PageKind> = pages.iter().map(Page::kind).collect();
        assert_eq!(kinds, vec![PageKind::Image, PageKind::Image]);
        assert_eq!(pages[0].id, "imgpage0001");
        assert_eq!(pages[1].id, "imgpage0002");
    }

    #[test]
    fn test_repeated_image_reuses_asset() {
        let mut book = book();
        let pages = run(
            &mut book,
            "<img src=\"../Images/fig.png\"/><img src=\"../Images/fig.png\"/>",
            false,
        );
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].body, pages[1].body);
        assert_eq!(book.resolver.assets().len(), 1);
    }

    #[test]
    fn test_whitespace_only_buffer_produces_no_page() {
        let mut book = book();
        let pages = run(
            &mut book,
            "\n  <div> </div>\n<img src=\"../Images/fig.png\"/>\n<script>x()</script>",
            false,
        );
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].kind(), PageKind::Image);
    }

    #[test]
    fn test_counter_continues_across_documents() {
        let mut book = book();
        let mut segmenter = DocumentSegmenter::new(false);
        for body in ["<p>one</p>", "<p>two</p>"] {
            let document = MarkupDocument::parse(
                format!("<body>{body}</body>").as_bytes(),
                ParseMode::Tolerant,
            );
            segmenter
                .segment(&document, &book.chapter, &mut book.resolver)
                .expect("segment");
        }
        let pages = segmenter.into_pages();
        assert_eq!(pages[0].id, "textpage0001");
        assert_eq!(pages[1].id, "textpage0002");
        assert_eq!(pages[0].title, "chapter 1");
        assert_eq!(pages[1].title, "chapter 2");
    }

    #[test]
    fn test_wrapper_tags_are_kept_on_both_sides() {
        let mut book = book();
        let pages = run(
            &mut book,
            "<p class=\"figure\">left <span>a</span><img src=\"../Images/fig.png\"/>right</p>",
            false,
        );
        assert_eq!(pages.len(), 3);
        assert_eq!(
            text_of(&pages[0]),
            "<p class=\"figure\">left <span>a</span></p>"
        );
        assert_eq!(text_of(&pages[2]), "<p class=\"figure\">right</p>");
    }

    #[test]
    fn test_rejected_image_keeps_wrapper_whole() {
        let mut book = book();
        let pages = run(
            &mut book,
            "<p>intro <img src=\"../Images/pixel.png\"/> outro</p>",
            false,
        );
        assert_eq!(pages.len(), 1);
        assert_eq!(text_of(&pages[0]), "<p>intro  outro</p>");
    }

    fn run_xhtml(book: &mut Book, head: &str, body: &str) -> Vec<Page> {
        let xhtml = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<html xmlns=\"http://www.w3.org/1999/xhtml\"><head>{}</head><body>{}</body></html>",
            head, body
        );
        let document = MarkupDocument::parse_xhtml(xhtml.as_bytes(), ParseMode::Tolerant);
        let mut segmenter = DocumentSegmenter::new(false);
        segmenter
            .segment(&document, &book.chapter, &mut book.resolver)
            .expect("segment");
        segmenter.into_pages()
    }

    #[test]
    fn test_xhtml_self_closing_title_keeps_body() {
        let mut book = book();
        let pages = run_xhtml(
            &mut book,
            "<title/><script src=\"a.js\"/>",
            "<p>intro</p><img src=\"../Images/fig.png\"/><p>outro</p>",
        );
        let kinds: Vec<PageKind> = pages.iter().map(Page::kind).collect();
        assert_eq!(kinds, vec![PageKind::Text, PageKind::Image, PageKind::Text]);
        assert_eq!(text_of(&pages[0]), "<p>intro</p>");
        assert_eq!(text_of(&pages[2]), "<p>outro</p>");
    }

    #[test]
    fn test_xhtml_self_closing_script_in_body() {
        let mut book = book();
        let pages = run_xhtml(
            &mut book,
            "<title>t</title>",
            "<p>intro</p><script src=\"a.js\"/><p>outro</p>",
        );
        assert_eq!(pages.len(), 1);
        assert_eq!(text_of(&pages[0]), "<p>intro</p>\n<p>outro</p>");
    }
}
