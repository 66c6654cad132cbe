//! Markup document model: parsing XHTML/HTML into a [`ContentNode`] tree and rendering
//! subtrees back to well-formed markup.
//!
//! XHTML documents are read as XML first, so self-closing `<title/>` or
//! `<script/>` tags close where they are written. Documents that are not
//! well-formed, and plain HTML, go through html5ever with a crate-local
//! `TreeSink` and are repaired the way a browser would. The sink builds a
//! reference-counted tree that is converted into plain owned [`ContentNode`]
//! values once parsing is done.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use html5ever::driver::ParseOpts;
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::tree_builder::{ElementFlags, NodeOrText, QuirksMode, TreeSink};
use html5ever::{Attribute, QualName, parse_document};
use log::{debug, trace, warn};
use quick_xml::NsReader;
use quick_xml::escape::{escape, resolve_html5_entity, resolve_predefined_entity, unescape_with};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};

use crate::error::{Error, Result};
use crate::package::{resolve_entity, strip_bom};

const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";
const SVG_NS: &str = "http://www.w3.org/2000/svg";
const MATHML_NS: &str = "http://www.w3.org/1998/Math/MathML";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

/// Elements that never carry content and are written self-closing.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements removed from rendered fragments, together with their subtrees.
const STRIPPED_ELEMENTS: &[&str] = &["img", "script", "style"];

/// How the markup parser treats recoverable errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Recover silently; parse errors are only traced.
    #[default]
    Tolerant,
    /// Recover, but report every parse error as a warning.
    Strict,
}

/// Namespace of an element, as far as rendering cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupNamespace {
    Html,
    Svg,
    MathMl,
    Other,
}

impl MarkupNamespace {
    fn from_uri(uri: &str) -> Self {
        match uri {
            XHTML_NS => MarkupNamespace::Html,
            SVG_NS => MarkupNamespace::Svg,
            MATHML_NS => MarkupNamespace::MathMl,
            _ => MarkupNamespace::Other,
        }
    }

    fn uri(self) -> Option<&'static str> {
        match self {
            MarkupNamespace::Html => Some(XHTML_NS),
            MarkupNamespace::Svg => Some(SVG_NS),
            MarkupNamespace::MathMl => Some(MATHML_NS),
            MarkupNamespace::Other => None,
        }
    }
}

/// A node of a parsed markup document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentNode {
    Element(ElementNode),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementNode {
    /// Local name, e.g. `p` or `img`.
    pub name: String,
    pub namespace: MarkupNamespace,
    /// Attributes as `(qualified-name, value)`, e.g. `("xlink:href", "..")`.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<ContentNode>,
}

impl ElementNode {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether this is an HTML element with the given local name.
    pub fn is(&self, name: &str) -> bool {
        self.namespace == MarkupNamespace::Html && self.name.eq_ignore_ascii_case(name)
    }

    pub fn is_image(&self) -> bool {
        self.is("img")
    }

    fn is_stripped(&self) -> bool {
        STRIPPED_ELEMENTS.iter().any(|name| self.is(name))
    }

    fn is_void(&self) -> bool {
        self.namespace == MarkupNamespace::Html
            && VOID_ELEMENTS.iter().any(|name| self.name.eq_ignore_ascii_case(name))
    }

    /// Renders this element with its tags only, around already rendered content.
    pub fn render_shell(&self, content: &str) -> String {
        let mut out = String::new();
        self.write_start_tag(&mut out, MarkupNamespace::Html);
        out.push('>');
        out.push_str(content);
        self.write_end_tag(&mut out);
        out
    }

    /// Writes `<name attr="..."` without closing the tag.
    fn write_start_tag(&self, out: &mut String, parent: MarkupNamespace) {
        out.push('<');
        out.push_str(&self.name);
        if self.namespace != parent && self.namespace != MarkupNamespace::Html {
            if let Some(uri) = self.namespace.uri() {
                out.push_str(&format!(" xmlns=\"{}\"", uri));
            }
            if self.namespace == MarkupNamespace::Svg {
                out.push_str(&format!(" xmlns:xlink=\"{}\"", XLINK_NS));
            }
        }
        for (key, value) in &self.attributes {
            if key == "xmlns" || key.starts_with("xmlns:") {
                continue;
            }
            out.push_str(&format!(" {}=\"{}\"", key, escape(value.as_str())));
        }
    }

    fn write_end_tag(&self, out: &mut String) {
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

impl ContentNode {
    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            ContentNode::Element(element) => Some(element),
            ContentNode::Text(_) => None,
        }
    }

    /// Whether this node is an image or has an image anywhere below it.
    pub fn contains_image(&self) -> bool {
        match self {
            ContentNode::Element(element) => {
                element.is_image() || element.children.iter().any(ContentNode::contains_image)
            }
            ContentNode::Text(_) => false,
        }
    }

    /// Text of the subtree, without the content of stripped elements.
    pub fn text_content(&self) -> String {
        let mut text = String::new();
        self.collect_text(&mut text);
        text
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            ContentNode::Text(text) => out.push_str(text),
            ContentNode::Element(element) if element.is_stripped() => {}
            ContentNode::Element(element) => {
                for child in &element.children {
                    child.collect_text(out);
                }
            }
        }
    }

    /// Whether the subtree shows any non-whitespace text once stripped.
    pub fn has_visible_text(&self) -> bool {
        !self.text_content().trim().is_empty()
    }

    /// Serializes the subtree as well-formed markup, leaving out `img`, `script`,
    /// and `style` elements.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, MarkupNamespace::Html);
        out
    }

    fn render_into(&self, out: &mut String, parent: MarkupNamespace) {
        let element = match self {
            ContentNode::Text(text) => {
                out.push_str(&escape(text.as_str()));
                return;
            }
            ContentNode::Element(element) => element,
        };
        if element.is_stripped() {
            return;
        }

        element.write_start_tag(out, parent);
        if element.children.is_empty()
            && (element.is_void() || element.namespace != MarkupNamespace::Html)
        {
            out.push_str("/>");
            return;
        }

        out.push('>');
        for child in &element.children {
            child.render_into(out, element.namespace);
        }
        element.write_end_tag(out);
    }
}

/// A parsed markup document.
#[derive(Debug, Clone, Default)]
pub struct MarkupDocument {
    /// Top-level nodes (normally a single `html` element).
    pub nodes: Vec<ContentNode>,
    /// Number of recoverable parse errors encountered.
    pub parse_errors: usize,
}

impl MarkupDocument {
    /// Parses a document from raw bytes (decoded as UTF-8, lossily).
    pub fn parse(bytes: &[u8], mode: ParseMode) -> Self {
        let sink = parse_document(MarkupSink::new(mode), ParseOpts::default())
            .from_utf8()
            .one(bytes);

        let mut nodes = Vec::new();
        for child in sink.document.children.borrow().iter() {
            convert(child, &mut nodes);
        }
        MarkupDocument {
            nodes,
            parse_errors: sink.errors.get(),
        }
    }

    /// Parses an XHTML document as XML.
    ///
    /// Falls back to [`MarkupDocument::parse`] when the document is not
    /// well-formed; the failed XML read then counts as one parse error.
    pub fn parse_xhtml(bytes: &[u8], mode: ParseMode) -> Self {
        match parse_xml(bytes) {
            Ok(nodes) => MarkupDocument {
                nodes,
                parse_errors: 0,
            },
            Err(e) => {
                match mode {
                    ParseMode::Tolerant => debug!("Reading XHTML as HTML: {}", e),
                    ParseMode::Strict => warn!("XHTML document is not well-formed: {}", e),
                }
                let mut document = Self::parse(bytes, mode);
                document.parse_errors += 1;
                document
            }
        }
    }

    /// The first `body` element, in document order.
    pub fn body(&self) -> Option<&ElementNode> {
        fn find(nodes: &[ContentNode]) -> Option<&ElementNode> {
            nodes.iter().filter_map(ContentNode::as_element).find_map(|element| {
                if element.is("body") {
                    Some(element)
                } else {
                    find(&element.children)
                }
            })
        }
        find(&self.nodes)
    }

    /// Content to segment: the children of `body`, or the whole document without one.
    pub fn content(&self) -> &[ContentNode] {
        match self.body() {
            Some(body) => &body.children,
            None => &self.nodes,
        }
    }
}

fn qualified_name(name: &QualName) -> String {
    match &name.prefix {
        Some(prefix) => format!("{}:{}", prefix, name.local),
        None => name.local.to_string(),
    }
}

fn convert(handle: &Handle, out: &mut Vec<ContentNode>) {
    match &handle.data {
        SinkData::Document | SinkData::Comment => {}
        SinkData::Text(text) => out.push(ContentNode::Text(text.borrow().clone())),
        SinkData::Element { name, attrs } => {
            let mut children = Vec::new();
            for child in handle.children.borrow().iter() {
                convert(child, &mut children);
            }
            out.push(ContentNode::Element(ElementNode {
                name: name.local.to_string(),
                namespace: MarkupNamespace::from_uri(&name.ns),
                attributes: attrs
                    .borrow()
                    .iter()
                    .map(|attr| (qualified_name(&attr.name), attr.value.to_string()))
                    .collect(),
                children,
            }));
        }
    }
}

// ----------------------------------------------------------------------------
// XML reader
// ----------------------------------------------------------------------------

fn parse_xml(bytes: &[u8]) -> Result<Vec<ContentNode>> {
    let mut reader = NsReader::from_reader(strip_bom(bytes));
    reader.config_mut().trim_text(false);
    reader.config_mut().expand_empty_elements = true;

    let mut open: Vec<ElementNode> = Vec::new();
    let mut roots = Vec::new();
    loop {
        let (resolved, event) = reader.read_resolved_event()?;
        match event {
            Event::Start(e) => open.push(ElementNode {
                name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                namespace: xml_namespace(&resolved),
                attributes: xml_attributes(&e)?,
                children: Vec::new(),
            }),
            Event::End(_) => {
                let element = open
                    .pop()
                    .ok_or_else(|| Error::Other("Unbalanced end tag".to_string()))?;
                match open.last_mut() {
                    Some(parent) => parent.children.push(ContentNode::Element(element)),
                    None => roots.push(ContentNode::Element(element)),
                }
            }
            Event::Text(e) => push_text(&mut open, &String::from_utf8_lossy(e.as_ref())),
            Event::CData(e) => push_text(&mut open, &String::from_utf8_lossy(e.as_ref())),
            Event::GeneralRef(e) => {
                let name = String::from_utf8_lossy(e.as_ref());
                let text = resolve_entity(&name)
                    .or_else(|| resolve_html5_entity(&name).map(str::to_string))
                    .ok_or_else(|| Error::Other(format!("Unknown entity '&{};'", name)))?;
                push_text(&mut open, &text);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(element) = open.last() {
        return Err(Error::Other(format!("Unclosed element <{}>", element.name)));
    }
    Ok(roots)
}

/// Unprefixed elements without a default namespace are taken as XHTML.
fn xml_namespace(resolved: &ResolveResult) -> MarkupNamespace {
    match resolved {
        ResolveResult::Bound(Namespace(uri)) => std::str::from_utf8(uri)
            .map_or(MarkupNamespace::Other, MarkupNamespace::from_uri),
        ResolveResult::Unbound => MarkupNamespace::Html,
        ResolveResult::Unknown(_) => MarkupNamespace::Other,
    }
}

fn xml_attributes(e: &BytesStart) -> Result<Vec<(String, String)>> {
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let raw = String::from_utf8_lossy(&attr.value);
        let value = unescape_with(&raw, |name| {
            resolve_predefined_entity(name).or_else(|| resolve_html5_entity(name))
        })
        .map_err(quick_xml::Error::from)?;
        attributes.push((
            String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            value.into_owned(),
        ));
    }
    Ok(attributes)
}

/// Appends text to the innermost open element, merging into a trailing text node.
/// Text outside the root element is dropped.
fn push_text(open: &mut [ElementNode], text: &str) {
    let Some(parent) = open.last_mut() else {
        return;
    };
    if text.is_empty() {
        return;
    }
    match parent.children.last_mut() {
        Some(ContentNode::Text(existing)) => existing.push_str(text),
        _ => parent.children.push(ContentNode::Text(text.to_string())),
    }
}

// ----------------------------------------------------------------------------
// html5ever tree sink
// ----------------------------------------------------------------------------

type Handle = Rc<SinkNode>;

enum SinkData {
    Document,
    Element {
        name: QualName,
        attrs: RefCell<Vec<Attribute>>,
    },
    Text(RefCell<String>),
    Comment,
}

struct SinkNode {
    data: SinkData,
    parent: RefCell<Option<Weak<SinkNode>>>,
    children: RefCell<Vec<Handle>>,
}

impl SinkNode {
    fn new(data: SinkData) -> Handle {
        Rc::new(SinkNode {
            data,
            parent: RefCell::new(None),
            children: RefCell::new(Vec::new()),
        })
    }

    fn parent(&self) -> Option<Handle> {
        self.parent.borrow().as_ref().and_then(Weak::upgrade)
    }
}

fn detach(target: &Handle) {
    let parent = target.parent.borrow_mut().take().and_then(|p| p.upgrade());
    if let Some(parent) = parent {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, target));
    }
}

fn append_node(parent: &Handle, child: Handle) {
    detach(&child);
    *child.parent.borrow_mut() = Some(Rc::downgrade(parent));
    parent.children.borrow_mut().push(child);
}

/// Appends text, merging into a trailing text node.
fn append_text(parent: &Handle, text: &str) {
    if let Some(SinkData::Text(existing)) =
        parent.children.borrow().last().map(|last| &last.data)
    {
        existing.borrow_mut().push_str(text);
        return;
    }
    append_node(parent, SinkNode::new(SinkData::Text(RefCell::new(text.to_string()))));
}

/// Tree sink building a [`SinkNode`] tree.
///
/// html5ever drives the sink through `&self`, so every node keeps its links in
/// `RefCell`s.
struct MarkupSink {
    document: Handle,
    mode: ParseMode,
    errors: Cell<usize>,
}

impl MarkupSink {
    fn new(mode: ParseMode) -> Self {
        Self {
            document: SinkNode::new(SinkData::Document),
            mode,
            errors: Cell::new(0),
        }
    }
}

impl TreeSink for MarkupSink {
    type Handle = Handle;
    type Output = Self;
    type ElemName<'a>
        = &'a QualName
    where
        Self: 'a;

    fn finish(self) -> Self::Output {
        self
    }

    fn parse_error(&self, msg: Cow<'static, str>) {
        self.errors.set(self.errors.get() + 1);
        match self.mode {
            ParseMode::Tolerant => trace!("Tolerated markup parse error: {}", msg),
            ParseMode::Strict => warn!("Markup parse error: {}", msg),
        }
    }

    fn get_document(&self) -> Self::Handle {
        Rc::clone(&self.document)
    }

    fn elem_name<'a>(&'a self, target: &'a Self::Handle) -> Self::ElemName<'a> {
        static EMPTY: QualName = QualName {
            prefix: None,
            ns: html5ever::ns!(),
            local: html5ever::local_name!(""),
        };

        match &target.data {
            SinkData::Element { name, .. } => name,
            _ => &EMPTY,
        }
    }

    fn create_element(
        &self,
        name: QualName,
        attrs: Vec<Attribute>,
        _flags: ElementFlags,
    ) -> Self::Handle {
        SinkNode::new(SinkData::Element {
            name,
            attrs: RefCell::new(attrs),
        })
    }

    fn create_comment(&self, _text: StrTendril) -> Self::Handle {
        SinkNode::new(SinkData::Comment)
    }

    fn create_pi(&self, _target: StrTendril, _data: StrTendril) -> Self::Handle {
        SinkNode::new(SinkData::Comment)
    }

    fn append(&self, parent: &Self::Handle, child: NodeOrText<Self::Handle>) {
        match child {
            NodeOrText::AppendNode(node) => append_node(parent, node),
            NodeOrText::AppendText(text) => append_text(parent, &text),
        }
    }

    fn append_based_on_parent_node(
        &self,
        element: &Self::Handle,
        prev_element: &Self::Handle,
        child: NodeOrText<Self::Handle>,
    ) {
        if element.parent().is_some() {
            self.append_before_sibling(element, child);
        } else {
            self.append(prev_element, child);
        }
    }

    fn append_doctype_to_document(
        &self,
        _name: StrTendril,
        _public_id: StrTendril,
        _system_id: StrTendril,
    ) {
    }

    fn get_template_contents(&self, target: &Self::Handle) -> Self::Handle {
        Rc::clone(target)
    }

    fn same_node(&self, x: &Self::Handle, y: &Self::Handle) -> bool {
        Rc::ptr_eq(x, y)
    }

    fn set_quirks_mode(&self, _mode: QuirksMode) {}

    fn append_before_sibling(&self, sibling: &Self::Handle, new_node: NodeOrText<Self::Handle>) {
        let Some(parent) = sibling.parent() else {
            return;
        };

        let node = match new_node {
            NodeOrText::AppendNode(node) => {
                detach(&node);
                node
            }
            NodeOrText::AppendText(text) => {
                let children = parent.children.borrow();
                let index = children.iter().position(|c| Rc::ptr_eq(c, sibling));
                if let Some(SinkData::Text(existing)) = index
                    .filter(|&i| i > 0)
                    .map(|i| &children[i - 1].data)
                {
                    existing.borrow_mut().push_str(&text);
                    return;
                }
                SinkNode::new(SinkData::Text(RefCell::new(text.to_string())))
            }
        };

        *node.parent.borrow_mut() = Some(Rc::downgrade(&parent));
        let mut children = parent.children.borrow_mut();
        let index = children
            .iter()
            .position(|c| Rc::ptr_eq(c, sibling))
            .unwrap_or(children.len());
        children.insert(index, node);
    }

    fn add_attrs_if_missing(&self, target: &Self::Handle, attrs: Vec<Attribute>) {
        if let SinkData::Element { attrs: existing, .. } = &target.data {
            let mut existing = existing.borrow_mut();
            for attr in attrs {
                if !existing.iter().any(|a| a.name == attr.name) {
                    existing.push(attr);
                }
            }
        }
    }

    fn remove_from_parent(&self, target: &Self::Handle) {
        detach(target);
    }

    fn reparent_children(&self, node: &Self::Handle, new_parent: &Self::Handle) {
        let children = std::mem::take(&mut *node.children.borrow_mut());
        for child in children {
            *child.parent.borrow_mut() = Some(Rc::downgrade(new_parent));
            new_parent.children.borrow_mut().push(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(html: &str) -> MarkupDocument {
        MarkupDocument::parse(html.as_bytes(), ParseMode::Tolerant)
    }

    #[test]
    fn test_body_content() {
        let doc = parse("<html><head><title>t</title></head><body><p>Hello</p></body></html>");
        let content = doc.content();
        assert_eq!(content.len(), 1);
        let p = content[0].as_element().expect("p element");
        assert!(p.is("p"));
        assert_eq!(content[0].text_content(), "Hello");
    }

    #[test]
    fn test_xhtml_input() {
        let doc = parse(
            r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>x</title></head>
<body><p class="a">one &amp; two</p><img src="../Images/x.png" alt="pic"/></body></html>"#,
        );
        let elements: Vec<_> = doc
            .content()
            .iter()
            .filter_map(ContentNode::as_element)
            .collect();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].attribute("class"), Some("a"));
        assert!(elements[1].is_image());
        assert_eq!(elements[1].attribute("src"), Some("../Images/x.png"));
    }

    #[test]
    fn test_render_strips_images_and_scripts() {
        let doc = parse(
            "<body><div id=\"d\">A<img src=\"x.png\"><script>var x = 1;</script><br>B &lt; C</div></body>",
        );
        let rendered = doc.content()[0].render();
        assert_eq!(rendered, "<div id=\"d\">A<br/>B &lt; C</div>");
        assert_eq!(doc.content()[0].text_content(), "AB < C");
    }

    #[test]
    fn test_visible_text() {
        let doc = parse("<body><div><img src=\"x.png\">  </div><p>\u{a0}</p><p>x</p></body>");
        let content = doc.content();
        assert!(!content[0].has_visible_text());
        assert!(content[0].contains_image());
        assert!(!content[1].has_visible_text());
        assert!(content[2].has_visible_text());
    }

    #[test]
    fn test_render_svg_namespace() {
        let doc = parse(
            "<body><p>t<svg viewBox=\"0 0 1 1\"><rect width=\"1\"></rect></svg></p></body>",
        );
        let rendered = doc.content()[0].render();
        assert!(rendered.contains("<svg xmlns=\"http://www.w3.org/2000/svg\""));
        assert!(rendered.contains("viewBox=\"0 0 1 1\""));
        assert!(rendered.contains("<rect width=\"1\"/>"));
    }

    #[test]
    fn test_xhtml_self_closing_raw_text_elements() {
        let doc = MarkupDocument::parse_xhtml(
            br#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title/><script src="a.js"/><style/></head>
<body><p>intro</p><script src="b.js"/><p>outro&nbsp;&#233;</p><textarea/></body></html>"#,
            ParseMode::Strict,
        );
        assert_eq!(doc.parse_errors, 0);
        let elements: Vec<_> = doc
            .content()
            .iter()
            .filter_map(ContentNode::as_element)
            .collect();
        assert_eq!(elements.len(), 4);
        assert!(elements[1].is("script"));
        assert!(elements[1].children.is_empty());
        assert_eq!(doc.content()[2].text_content(), "outro\u{a0}\u{e9}");
        assert!(elements[3].is("textarea"));
    }

    #[test]
    fn test_xhtml_attributes_and_namespaces() {
        let doc = MarkupDocument::parse_xhtml(
            br#"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:svg="http://www.w3.org/2000/svg"><body><p title="a &amp; b&hellip;">x</p><svg:svg><svg:rect width="1"/></svg:svg></body></html>"#,
            ParseMode::Tolerant,
        );
        let content = doc.content();
        let p = content[0].as_element().expect("p element");
        assert_eq!(p.attribute("title"), Some("a & b\u{2026}"));
        let svg = content[1].as_element().expect("svg element");
        assert_eq!(svg.namespace, MarkupNamespace::Svg);
        assert_eq!(svg.name, "svg");
        assert!(content[1].render().starts_with("<svg xmlns=\"http://www.w3.org/2000/svg\""));
    }

    #[test]
    fn test_xhtml_falls_back_to_html_parser() {
        let doc = MarkupDocument::parse_xhtml(
            b"<html><body><p>unclosed <b>bold</p><p>next</body></html>",
            ParseMode::Tolerant,
        );
        assert!(doc.parse_errors > 0);
        let texts: Vec<String> = doc.content().iter().map(ContentNode::text_content).collect();
        assert_eq!(texts, vec!["unclosed bold".to_string(), "next".to_string()]);
    }

    #[test]
    fn test_malformed_markup_is_repaired() {
        let doc = MarkupDocument::parse(b"<p>unclosed <b>bold</p><p>next", ParseMode::Strict);
        let texts: Vec<String> = doc.content().iter().map(ContentNode::text_content).collect();
        assert_eq!(texts, vec!["unclosed bold".to_string(), "next".to_string()]);
        assert!(doc.parse_errors > 0);
    }
}
