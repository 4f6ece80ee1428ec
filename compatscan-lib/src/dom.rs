use crate::style::owned_css::{StyleMap, StyleRule};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One element of the analysed page, as delivered by the DOM extractor.
///
/// Tag names are lower-cased, children are element children in document order
/// and `preview` is already truncated to the extractor's maximum length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeShape {
    pub tag: String,
    #[serde(default)]
    pub attributes: IndexMap<String, String>,
    #[serde(default)]
    pub selector_path: String,
    #[serde(default)]
    pub preview: String,
    #[serde(default)]
    pub children: Vec<NodeShape>,
}

impl NodeShape {
    pub fn new(tag: impl Into<String>) -> Self {
        NodeShape {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_preview(mut self, preview: impl Into<String>) -> Self {
        self.preview = preview.into();
        self
    }

    pub fn with_child(mut self, child: NodeShape) -> Self {
        self.children.push(child);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// A `NodeShape` with its resolved cascade and the prefixed form the target
/// browsers expect. Same tree shape as the source `NodeShape` tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedNode {
    pub tag: String,
    #[serde(default)]
    pub attributes: IndexMap<String, String>,
    #[serde(default)]
    pub selector_path: String,
    #[serde(default)]
    pub preview: String,
    #[serde(default)]
    pub styles: StyleMap,
    /// `None` until prefix derivation has run for this node.
    #[serde(default)]
    pub prefixed_styles: Option<StyleMap>,
    #[serde(default)]
    pub applicable_css_rules: Vec<Arc<StyleRule>>,
    #[serde(default)]
    pub children: Vec<AnnotatedNode>,
}

impl AnnotatedNode {
    /// Builds an annotated node from a shape's own data, without children.
    pub fn from_shape(shape: &NodeShape, styles: StyleMap, rules: Vec<Arc<StyleRule>>) -> Self {
        AnnotatedNode {
            tag: shape.tag.clone(),
            attributes: shape.attributes.clone(),
            selector_path: shape.selector_path.clone(),
            preview: shape.preview.clone(),
            styles,
            prefixed_styles: None,
            applicable_css_rules: rules,
            children: Vec::new(),
        }
    }

    pub fn style(&self, property: &str) -> Option<&str> {
        self.styles.get(property).map(String::as_str)
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(AnnotatedNode::len).sum::<usize>()
    }
}

/// A position in a `NodeShape` tree used for selector matching.
///
/// Holds a link to the parent's cursor and the node's index among its siblings,
/// so combinators can walk up and left while the tree itself stays a plain
/// owned structure. Cursors live on the stack of the tree walk.
#[derive(Debug, Clone, Copy)]
pub struct ElementRef<'a> {
    pub node: &'a NodeShape,
    parent: Option<&'a ElementRef<'a>>,
    index: usize,
}

impl<'a> ElementRef<'a> {
    pub fn root(node: &'a NodeShape) -> Self {
        ElementRef {
            node,
            parent: None,
            index: 0,
        }
    }

    /// Cursor for the `index`-th child of `parent`.
    pub fn child(parent: &'a ElementRef<'a>, index: usize) -> Option<Self> {
        parent.node.children.get(index).map(|node| ElementRef {
            node,
            parent: Some(parent),
            index,
        })
    }

    pub fn parent(&self) -> Option<ElementRef<'a>> {
        self.parent.copied()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn prev_sibling(&self) -> Option<ElementRef<'a>> {
        let parent = self.parent?;
        let index = self.index.checked_sub(1)?;
        parent.node.children.get(index).map(|node| ElementRef {
            node,
            parent: Some(parent),
            index,
        })
    }

    pub fn next_sibling(&self) -> Option<ElementRef<'a>> {
        let parent = self.parent?;
        let index = self.index + 1;
        parent.node.children.get(index).map(|node| ElementRef {
            node,
            parent: Some(parent),
            index,
        })
    }

    /// Previous siblings, nearest first.
    pub fn prev_siblings(&self) -> impl Iterator<Item = ElementRef<'a>> {
        std::iter::successors(self.prev_sibling(), |sibling| sibling.prev_sibling())
    }

    /// Following siblings, nearest first.
    pub fn next_siblings(&self) -> impl Iterator<Item = ElementRef<'a>> {
        std::iter::successors(self.next_sibling(), |sibling| sibling.next_sibling())
    }

    /// Ancestors, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = ElementRef<'a>> {
        std::iter::successors(self.parent(), |ancestor| ancestor.parent())
    }
}
