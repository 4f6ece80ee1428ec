//! This module parses HTML into a raw DOM and extracts the node shapes and
//! stylesheet sources the analysis runs on.
//!
//! It uses html5ever as the HTML parser through a custom `TreeSink`.

use crate::dom::NodeShape;
use crate::style::stylesheet::StylesheetSource;
use html5ever::interface::{ElemName, ElementFlags, NodeOrText, QuirksMode, TreeSink};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{Attribute, LocalName, Namespace, QualName};
use indexmap::IndexMap;
use log::debug;
use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// A list of void (self-closing) elements in HTML.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose text content is serialised verbatim.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "xmp", "iframe", "noembed", "noframes"];

pub type Handle = Rc<RefCell<RawNode>>;

#[derive(Debug)]
pub enum RawData {
    Document,
    /// Inert content of a `<template>`, kept outside the element tree.
    DocumentFragment,
    Doctype,
    Element {
        name: QualName,
        attributes: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
    ProcessingInstruction,
}

#[derive(Debug)]
pub struct RawNode {
    pub data: RawData,
    pub children: Vec<Handle>,
    parent: Option<Weak<RefCell<RawNode>>>,
    template_contents: Option<Handle>,
}

impl RawNode {
    fn new_handle(data: RawData) -> Handle {
        Rc::new(RefCell::new(RawNode {
            data,
            children: Vec::new(),
            parent: None,
            template_contents: None,
        }))
    }

    /// Lower-cased local name, for element nodes.
    pub fn tag(&self) -> Option<String> {
        match &self.data {
            RawData::Element { name, .. } => Some(name.local.as_ref().to_ascii_lowercase()),
            _ => None,
        }
    }

    pub fn attribute(&self, attr: &str) -> Option<&str> {
        match &self.data {
            RawData::Element { attributes, .. } => attributes
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(attr))
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }
}

/// A parsed HTML document.
#[derive(Debug)]
pub struct Document {
    pub root: Handle,
    pub quirks_mode: QuirksMode,
}

/// Parses an HTML document. Parse errors are recovered by html5ever.
pub fn parse_document(html_content: &str) -> Document {
    html5ever::parse_document(CompatTreeSink::new(), Default::default()).one(html_content)
}

impl Document {
    /// The `<html>` element.
    pub fn document_element(&self) -> Option<Handle> {
        self.root
            .borrow()
            .children
            .iter()
            .find(|child| child.borrow().tag().is_some())
            .cloned()
    }

    /// Converts the document element and its element descendants into a
    /// `NodeShape` tree. Previews are cut to `preview_length` characters.
    pub fn node_shapes(&self, preview_length: usize) -> Option<NodeShape> {
        let html = self.document_element()?;
        Some(build_node_shape(&html, "", preview_length))
    }

    /// `<style>` texts and `<link rel="stylesheet">` hrefs in document order.
    pub fn stylesheet_sources(&self) -> Vec<StylesheetSource> {
        let mut sources = Vec::new();
        collect_stylesheet_sources(&self.root, &mut sources);
        sources
    }
}

fn build_node_shape(handle: &Handle, parent_path: &str, preview_length: usize) -> NodeShape {
    let node = handle.borrow();
    let tag = node.tag().unwrap_or_default();

    let attributes: IndexMap<String, String> = match &node.data {
        RawData::Element { attributes, .. } => attributes.iter().cloned().collect(),
        _ => IndexMap::new(),
    };

    let selector_path = if tag == "html" {
        String::new()
    } else {
        let segment = path_segment(&tag, &attributes);
        if parent_path.is_empty() {
            segment
        } else {
            format!("{} > {}", parent_path, segment)
        }
    };

    let children = node
        .children
        .iter()
        .filter(|child| child.borrow().tag().is_some())
        .map(|child| build_node_shape(child, &selector_path, preview_length))
        .collect();

    NodeShape {
        preview: preview(handle, preview_length),
        tag,
        attributes,
        selector_path,
        children,
    }
}

/// `tag#id`, else `tag.class1.class2`, else `tag`. `body` is always bare.
fn path_segment(tag: &str, attributes: &IndexMap<String, String>) -> String {
    if tag == "body" {
        return tag.to_string();
    }
    if let Some(id) = attributes.get("id").filter(|id| !id.is_empty()) {
        return format!("{}#{}", tag, id);
    }
    let classes: Vec<&str> = attributes
        .get("class")
        .map(|class| class.split_whitespace().collect())
        .unwrap_or_default();
    if classes.is_empty() {
        tag.to_string()
    } else {
        format!("{}.{}", tag, classes.join("."))
    }
}

/// The node's outer HTML cut to `limit` characters.
pub fn preview(handle: &Handle, limit: usize) -> String {
    let mut out = String::new();
    // A char is at most 4 bytes, so this many bytes always covers `limit` chars.
    serialize(handle, &mut out, limit.saturating_mul(4), false);
    out.chars().take(limit).collect()
}

fn escape(text: &str, attribute: bool) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\u{a0}']) {
        return Cow::Borrowed(text);
    }
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '\u{a0}' => escaped.push_str("&nbsp;"),
            '"' if attribute => escaped.push_str("&quot;"),
            '<' if !attribute => escaped.push_str("&lt;"),
            '>' if !attribute => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    Cow::Owned(escaped)
}

/// Serialises `handle` into `out`, stopping once `out` holds `budget` bytes.
fn serialize(handle: &Handle, out: &mut String, budget: usize, raw_text: bool) {
    if out.len() >= budget {
        return;
    }
    let node = handle.borrow();
    match &node.data {
        RawData::Element { name, attributes } => {
            let tag = name.local.as_ref().to_ascii_lowercase();
            out.push('<');
            out.push_str(&tag);
            for (key, value) in attributes {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                out.push_str(&escape(value, true));
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&tag.as_str()) {
                return;
            }
            let raw = RAW_TEXT_ELEMENTS.contains(&tag.as_str());
            for child in &node.children {
                serialize(child, out, budget, raw);
            }
            out.push_str("</");
            out.push_str(&tag);
            out.push('>');
        }
        RawData::Text(text) if raw_text => out.push_str(text),
        RawData::Text(text) => out.push_str(&escape(text, false)),
        RawData::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        RawData::Document => {
            for child in &node.children {
                serialize(child, out, budget, false);
            }
        }
        RawData::DocumentFragment | RawData::Doctype | RawData::ProcessingInstruction => {}
    }
}

fn text_content(handle: &Handle) -> String {
    let node = handle.borrow();
    match &node.data {
        RawData::Text(text) => text.clone(),
        _ => node.children.iter().map(text_content).collect(),
    }
}

fn collect_stylesheet_sources(handle: &Handle, sources: &mut Vec<StylesheetSource>) {
    let node = handle.borrow();
    match node.tag().as_deref() {
        Some("style") => sources.push(StylesheetSource::Inline(text_content(handle))),
        Some("link") => {
            let is_stylesheet = node.attribute("rel").is_some_and(|rel| {
                rel.split_whitespace()
                    .any(|token| token.eq_ignore_ascii_case("stylesheet"))
            });
            if let (true, Some(href)) = (is_stylesheet, node.attribute("href")) {
                if !href.trim().is_empty() {
                    sources.push(StylesheetSource::Linked(href.trim().to_string()));
                }
            }
        }
        _ => {}
    }
    for child in &node.children {
        collect_stylesheet_sources(child, sources);
    }
}

/// A TreeSink building the raw DOM used by the extractor.
pub struct CompatTreeSink {
    document: Handle,
    quirks_mode: RefCell<QuirksMode>,
}

impl Default for CompatTreeSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CompatTreeSink {
    pub fn new() -> Self {
        Self {
            document: RawNode::new_handle(RawData::Document),
            quirks_mode: RefCell::new(QuirksMode::NoQuirks),
        }
    }

    fn detach(target: &Handle) {
        let parent = target.borrow_mut().parent.take();
        if let Some(parent) = parent.and_then(|weak| weak.upgrade()) {
            parent
                .borrow_mut()
                .children
                .retain(|child| !Rc::ptr_eq(child, target));
        }
    }

    fn attach(parent: &Handle, child: &Handle, index: usize) {
        child.borrow_mut().parent = Some(Rc::downgrade(parent));
        let mut parent_mut = parent.borrow_mut();
        let index = index.min(parent_mut.children.len());
        parent_mut.children.insert(index, Rc::clone(child));
    }

    /// Appends text to the text node at `index - 1` if there is one.
    fn merge_text(parent: &Handle, index: usize, text: &str) -> bool {
        let parent_ref = parent.borrow();
        let Some(previous) = index.checked_sub(1).and_then(|i| parent_ref.children.get(i)) else {
            return false;
        };
        let mut previous = previous.borrow_mut();
        if let RawData::Text(existing) = &mut previous.data {
            existing.push_str(text);
            true
        } else {
            false
        }
    }

    fn insert_at(parent: &Handle, index: usize, child: NodeOrText<Handle>) {
        match child {
            NodeOrText::AppendNode(node) => {
                Self::detach(&node);
                Self::attach(parent, &node, index);
            }
            NodeOrText::AppendText(text) => {
                if !Self::merge_text(parent, index, &text) {
                    let node = RawNode::new_handle(RawData::Text(text.to_string()));
                    Self::attach(parent, &node, index);
                }
            }
        }
    }
}

/// Owned element name handed back to html5ever.
#[derive(Debug)]
pub struct OwnedElemName {
    ns: Namespace,
    local: LocalName,
}

impl ElemName for OwnedElemName {
    fn ns(&self) -> &Namespace {
        &self.ns
    }

    fn local_name(&self) -> &LocalName {
        &self.local
    }
}

impl TreeSink for CompatTreeSink {
    type Handle = Handle;
    type Output = Document;
    type ElemName<'a>
        = OwnedElemName
    where
        Self: 'a;

    fn finish(self) -> Self::Output {
        Document {
            root: self.document,
            quirks_mode: self.quirks_mode.into_inner(),
        }
    }

    fn parse_error(&self, msg: Cow<'static, str>) {
        debug!("html parse error: {}", msg);
    }

    fn get_document(&self) -> Self::Handle {
        Rc::clone(&self.document)
    }

    fn elem_name<'a>(&'a self, target: &'a Self::Handle) -> Self::ElemName<'a> {
        match &target.borrow().data {
            RawData::Element { name, .. } => OwnedElemName {
                ns: name.ns.clone(),
                local: name.local.clone(),
            },
            // html5ever only asks for names of elements.
            _ => OwnedElemName {
                ns: Namespace::from(""),
                local: LocalName::from(""),
            },
        }
    }

    fn create_element(
        &self,
        name: QualName,
        attrs: Vec<Attribute>,
        flags: ElementFlags,
    ) -> Self::Handle {
        let attributes = attrs
            .into_iter()
            .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
            .collect();
        let element = RawNode::new_handle(RawData::Element { name, attributes });
        if flags.template {
            element.borrow_mut().template_contents =
                Some(RawNode::new_handle(RawData::DocumentFragment));
        }
        element
    }

    fn create_comment(&self, text: StrTendril) -> Self::Handle {
        RawNode::new_handle(RawData::Comment(text.to_string()))
    }

    fn create_pi(&self, _target: StrTendril, _data: StrTendril) -> Self::Handle {
        RawNode::new_handle(RawData::ProcessingInstruction)
    }

    fn append(&self, parent: &Self::Handle, child: NodeOrText<Self::Handle>) {
        let index = parent.borrow().children.len();
        Self::insert_at(parent, index, child);
    }

    fn append_based_on_parent_node(
        &self,
        element: &Self::Handle,
        prev_element: &Self::Handle,
        child: NodeOrText<Self::Handle>,
    ) {
        let has_parent = element
            .borrow()
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some();
        if has_parent {
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
        let doctype = RawNode::new_handle(RawData::Doctype);
        self.append(&self.document, NodeOrText::AppendNode(doctype));
    }

    /// Template contents go to a detached fragment, so they never show up as
    /// element children.
    fn get_template_contents(&self, target: &Self::Handle) -> Self::Handle {
        let node = target.borrow();
        match &node.template_contents {
            Some(contents) => Rc::clone(contents),
            None => Rc::clone(target),
        }
    }

    fn same_node(&self, x: &Self::Handle, y: &Self::Handle) -> bool {
        Rc::ptr_eq(x, y)
    }

    fn set_quirks_mode(&self, mode: QuirksMode) {
        *self.quirks_mode.borrow_mut() = mode;
    }

    fn append_before_sibling(&self, sibling: &Self::Handle, child: NodeOrText<Self::Handle>) {
        let Some(parent) = sibling
            .borrow()
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
        else {
            return;
        };
        let index = parent
            .borrow()
            .children
            .iter()
            .position(|c| Rc::ptr_eq(c, sibling))
            .unwrap_or(0);
        Self::insert_at(&parent, index, child);
    }

    fn add_attrs_if_missing(&self, target: &Self::Handle, attrs: Vec<Attribute>) {
        let mut target_node = target.borrow_mut();
        if let RawData::Element { attributes, .. } = &mut target_node.data {
            for attr in attrs {
                let key = attr.name.local.to_string();
                if !attributes.iter().any(|(k, _)| k == &key) {
                    attributes.push((key, attr.value.to_string()));
                }
            }
        }
    }

    fn remove_from_parent(&self, target: &Self::Handle) {
        Self::detach(target);
    }

    fn reparent_children(&self, node: &Self::Handle, new_parent: &Self::Handle) {
        let children = std::mem::take(&mut node.borrow_mut().children);
        for child in children {
            let index = new_parent.borrow().children.len();
            Self::attach(new_parent, &child, index);
        }
    }
}
