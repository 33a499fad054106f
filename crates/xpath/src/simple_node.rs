//! Simple in-memory document used in tests, benches and quick prototypes.
//!
//! Trees are assembled with a builder and frozen into an arena
//! (`SimpleDocument`). `SimpleNavigator` is a position inside that arena.
//!
//! - Nodes are stored in pre-order; attributes directly follow their owner.
//! - Namespace nodes are not stored. They are computed from the declarations
//!   on the element and its ancestors (plus the implicit `xml` binding).
//! - Document order is total across documents: documents are ordered by
//!   creation, nodes by pre-order index.
//!
//! ```
//! use navxpath::simple_node::{attr, doc, elem, ns, text};
//! use navxpath::XPathNavigator;
//!
//! // <p:root xmlns:p="urn:one" id="r"><child>Hi</child></p:root>
//! let mut nav = doc()
//!     .child(
//!         elem("p:root")
//!             .namespace(ns("p", "urn:one"))
//!             .attr(attr("id", "r"))
//!             .child(elem("child").child(text("Hi"))),
//!     )
//!     .build();
//! assert!(nav.move_to_first_child());
//! assert_eq!(nav.local_name(), "root");
//! assert_eq!(nav.namespace_uri().as_deref(), Some("urn:one"));
//! assert_eq!(nav.value(), "Hi");
//! ```

use core::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::consts::XML_URI;
use crate::model::{NodeKind, NodeOrder, QName, XPathNavigator};

static NEXT_DOCUMENT_ID: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecl {
    prefix: String,
    uri: String,
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    name: Option<QName>,
    value: String,
    parent: Option<usize>,
    /// Index inside the parent's child or attribute list.
    sibling_index: usize,
    children: Vec<usize>,
    attributes: Vec<usize>,
    namespaces: Vec<NamespaceDecl>,
}

/// Frozen arena of one tree.
#[derive(Debug)]
pub struct SimpleDocument {
    id: usize,
    nodes: Vec<NodeData>,
}

impl SimpleDocument {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// In-scope namespaces of an element, nearest declaration first; the
    /// `xml` binding is always last.
    fn in_scope_namespaces(&self, element: usize) -> Vec<NamespaceDecl> {
        let mut seen: Vec<&str> = Vec::new();
        let mut out = Vec::new();
        let mut cur = Some(element);
        while let Some(i) = cur {
            let node = &self.nodes[i];
            for decl in &node.namespaces {
                if seen.contains(&decl.prefix.as_str()) {
                    continue;
                }
                seen.push(&decl.prefix);
                // xmlns="" undeclares the default namespace
                if !decl.uri.is_empty() {
                    out.push(decl.clone());
                }
            }
            cur = node.parent;
        }
        if !seen.contains(&"xml") {
            out.push(NamespaceDecl { prefix: "xml".to_string(), uri: XML_URI.to_string() });
        }
        out
    }

    fn string_value(&self, i: usize, out: &mut String) {
        let node = &self.nodes[i];
        if node.kind == NodeKind::Text {
            out.push_str(&node.value);
        }
        for &c in &node.children {
            self.string_value(c, out);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Node(usize),
    Namespace { owner: usize, index: usize },
}

/// Navigator over a `SimpleDocument`.
#[derive(Clone)]
pub struct SimpleNavigator {
    doc: Arc<SimpleDocument>,
    pos: Position,
}

impl fmt::Debug for SimpleNavigator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleNavigator")
            .field("doc", &self.doc.id)
            .field("pos", &self.pos)
            .field("kind", &self.node_kind())
            .field("name", &self.local_name())
            .finish()
    }
}

impl PartialEq for SimpleNavigator {
    fn eq(&self, other: &Self) -> bool {
        self.is_same_position(other)
    }
}

impl Eq for SimpleNavigator {}

impl SimpleNavigator {
    pub fn document(&self) -> &Arc<SimpleDocument> {
        &self.doc
    }

    fn data(&self) -> Option<&NodeData> {
        match self.pos {
            Position::Node(i) => Some(&self.doc.nodes[i]),
            Position::Namespace { .. } => None,
        }
    }

    fn namespace(&self) -> Option<NamespaceDecl> {
        match self.pos {
            Position::Namespace { owner, index } => self.doc.in_scope_namespaces(owner).into_iter().nth(index),
            Position::Node(_) => None,
        }
    }

    /// Sort key in document order: pre-order index of the node (the owner
    /// for namespace nodes), then namespace rank.
    fn order_key(&self) -> (usize, usize, usize) {
        match self.pos {
            Position::Node(i) => (self.doc.id, i, 0),
            Position::Namespace { owner, index } => (self.doc.id, owner, index + 1),
        }
    }

    fn sibling(&mut self, forward: bool) -> bool {
        let Position::Node(i) = self.pos else { return false };
        let node = &self.doc.nodes[i];
        let Some(parent) = node.parent else { return false };
        let list = match node.kind {
            NodeKind::Attribute => return false,
            _ => &self.doc.nodes[parent].children,
        };
        let next = if forward { node.sibling_index.checked_add(1) } else { node.sibling_index.checked_sub(1) };
        match next.and_then(|k| list.get(k)) {
            Some(&j) => {
                self.pos = Position::Node(j);
                true
            }
            None => false,
        }
    }
}

impl XPathNavigator for SimpleNavigator {
    fn node_kind(&self) -> NodeKind {
        self.data().map_or(NodeKind::Namespace, |n| n.kind)
    }

    fn local_name(&self) -> String {
        match self.pos {
            Position::Node(i) => self.doc.nodes[i].name.as_ref().map(|q| q.local.clone()).unwrap_or_default(),
            Position::Namespace { .. } => self.namespace().map(|d| d.prefix).unwrap_or_default(),
        }
    }

    fn namespace_uri(&self) -> Option<String> {
        self.data().and_then(|n| n.name.as_ref()).and_then(|q| q.ns_uri.clone())
    }

    fn prefix(&self) -> Option<String> {
        self.data().and_then(|n| n.name.as_ref()).and_then(|q| q.prefix.clone())
    }

    fn value(&self) -> String {
        match self.pos {
            Position::Node(i) => {
                let node = &self.doc.nodes[i];
                match node.kind {
                    NodeKind::Element | NodeKind::Document => {
                        let mut out = String::new();
                        self.doc.string_value(i, &mut out);
                        out
                    }
                    _ => node.value.clone(),
                }
            }
            Position::Namespace { .. } => self.namespace().map(|d| d.uri).unwrap_or_default(),
        }
    }

    fn move_to_parent(&mut self) -> bool {
        match self.pos {
            Position::Node(i) => match self.doc.nodes[i].parent {
                Some(p) => {
                    self.pos = Position::Node(p);
                    true
                }
                None => false,
            },
            Position::Namespace { owner, .. } => {
                self.pos = Position::Node(owner);
                true
            }
        }
    }

    fn move_to_first_child(&mut self) -> bool {
        match self.data().and_then(|n| n.children.first().copied()) {
            Some(c) => {
                self.pos = Position::Node(c);
                true
            }
            None => false,
        }
    }

    fn move_to_next(&mut self) -> bool {
        self.sibling(true)
    }

    fn move_to_previous(&mut self) -> bool {
        self.sibling(false)
    }

    fn move_to_first_attribute(&mut self) -> bool {
        match self.data().and_then(|n| n.attributes.first().copied()) {
            Some(a) => {
                self.pos = Position::Node(a);
                true
            }
            None => false,
        }
    }

    fn move_to_next_attribute(&mut self) -> bool {
        let Some(node) = self.data() else { return false };
        if node.kind != NodeKind::Attribute {
            return false;
        }
        let next = node.parent.and_then(|p| self.doc.nodes[p].attributes.get(node.sibling_index + 1).copied());
        match next {
            Some(a) => {
                self.pos = Position::Node(a);
                true
            }
            None => false,
        }
    }

    fn move_to_first_namespace(&mut self) -> bool {
        match self.pos {
            Position::Node(i) if self.doc.nodes[i].kind == NodeKind::Element => {
                self.pos = Position::Namespace { owner: i, index: 0 };
                true
            }
            _ => false,
        }
    }

    fn move_to_next_namespace(&mut self) -> bool {
        let Position::Namespace { owner, index } = self.pos else { return false };
        if index + 1 < self.doc.in_scope_namespaces(owner).len() {
            self.pos = Position::Namespace { owner, index: index + 1 };
            true
        } else {
            false
        }
    }

    fn is_same_position(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.doc, &other.doc) && self.pos == other.pos
    }

    fn compare_position(&self, other: &Self) -> NodeOrder {
        match self.order_key().cmp(&other.order_key()) {
            core::cmp::Ordering::Less => NodeOrder::Before,
            core::cmp::Ordering::Equal => NodeOrder::Same,
            core::cmp::Ordering::Greater => NodeOrder::After,
        }
    }
}

/// Pending node of a tree under construction.
#[derive(Debug, Clone)]
pub struct SimpleNodeBuilder {
    kind: NodeKind,
    name: Option<QName>,
    value: String,
    attributes: Vec<SimpleNodeBuilder>,
    namespaces: Vec<NamespaceDecl>,
    children: Vec<SimpleNodeBuilder>,
}

fn lexical_name(name: &str) -> QName {
    match name.split_once(':') {
        Some((p, l)) => QName::prefixed(p, l),
        None => QName::local(name),
    }
}

impl SimpleNodeBuilder {
    fn new(kind: NodeKind, name: Option<QName>, value: impl Into<String>) -> Self {
        Self {
            kind,
            name,
            value: value.into(),
            attributes: Vec::new(),
            namespaces: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn child(mut self, child: impl Into<SimpleNodeBuilder>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I: IntoIterator<Item = SimpleNodeBuilder>>(mut self, it: I) -> Self {
        self.children.extend(it);
        self
    }

    pub fn attr(mut self, attr: SimpleNodeBuilder) -> Self {
        debug_assert!(attr.kind == NodeKind::Attribute);
        self.attributes.push(attr);
        self
    }

    pub fn namespace(mut self, decl: NamespaceDecl) -> Self {
        self.namespaces.push(decl);
        self
    }

    /// Freeze the tree; the returned navigator sits on its root.
    pub fn build(self) -> SimpleNavigator {
        let mut doc = SimpleDocument { id: NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed), nodes: Vec::new() };
        let mut scopes = Vec::new();
        flatten(&mut doc.nodes, self, None, 0, &mut scopes);
        SimpleNavigator { doc: Arc::new(doc), pos: Position::Node(0) }
    }
}

fn resolve(prefix: &str, scopes: &[Vec<NamespaceDecl>]) -> Option<String> {
    if prefix == "xml" {
        return Some(XML_URI.to_string());
    }
    scopes
        .iter()
        .rev()
        .flat_map(|s| s.iter())
        .find(|d| d.prefix == prefix)
        .filter(|d| !d.uri.is_empty())
        .map(|d| d.uri.clone())
}

fn flatten(
    nodes: &mut Vec<NodeData>,
    b: SimpleNodeBuilder,
    parent: Option<usize>,
    sibling_index: usize,
    scopes: &mut Vec<Vec<NamespaceDecl>>,
) -> usize {
    let idx = nodes.len();
    scopes.push(b.namespaces.clone());
    let name = b.name.map(|mut q| {
        if b.kind == NodeKind::Element {
            q.ns_uri = resolve(q.prefix.as_deref().unwrap_or(""), scopes);
        }
        q
    });
    nodes.push(NodeData {
        kind: b.kind,
        name,
        value: b.value,
        parent,
        sibling_index,
        children: Vec::new(),
        attributes: Vec::new(),
        namespaces: b.namespaces,
    });
    for (k, a) in b.attributes.into_iter().enumerate() {
        let name = a.name.map(|mut q| {
            // unprefixed attributes are in no namespace
            if let Some(p) = q.prefix.as_deref() {
                q.ns_uri = resolve(p, scopes);
            }
            q
        });
        let id = nodes.len();
        nodes.push(NodeData {
            kind: NodeKind::Attribute,
            name,
            value: a.value,
            parent: Some(idx),
            sibling_index: k,
            children: Vec::new(),
            attributes: Vec::new(),
            namespaces: Vec::new(),
        });
        nodes[idx].attributes.push(id);
    }
    for (k, c) in b.children.into_iter().enumerate() {
        let id = flatten(nodes, c, Some(idx), k, scopes);
        nodes[idx].children.push(id);
    }
    scopes.pop();
    idx
}

pub fn doc() -> SimpleNodeBuilder {
    SimpleNodeBuilder::new(NodeKind::Document, None, "")
}

/// Element; `"p:name"` takes its namespace from the in-scope `p` binding.
pub fn elem(name: &str) -> SimpleNodeBuilder {
    SimpleNodeBuilder::new(NodeKind::Element, Some(lexical_name(name)), "")
}

pub fn attr(name: &str, value: &str) -> SimpleNodeBuilder {
    SimpleNodeBuilder::new(NodeKind::Attribute, Some(lexical_name(name)), value)
}

pub fn text(value: &str) -> SimpleNodeBuilder {
    SimpleNodeBuilder::new(NodeKind::Text, None, value)
}

pub fn comment(value: &str) -> SimpleNodeBuilder {
    SimpleNodeBuilder::new(NodeKind::Comment, None, value)
}

pub fn pi(target: &str, data: &str) -> SimpleNodeBuilder {
    SimpleNodeBuilder::new(NodeKind::ProcessingInstruction, Some(QName::local(target)), data)
}

/// Namespace declaration; an empty prefix declares the default namespace.
pub fn ns(prefix: &str, uri: &str) -> NamespaceDecl {
    NamespaceDecl { prefix: prefix.to_string(), uri: uri.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SimpleNavigator {
        doc()
            .child(
                elem("root")
                    .namespace(ns("a", "urn:a"))
                    .attr(attr("id", "r"))
                    .child(elem("a:x").namespace(ns("a", "urn:other")).child(text("1")))
                    .child(elem("y").child(text("2"))),
            )
            .build()
    }

    #[test]
    fn namespaces_are_scoped_and_deduplicated() {
        let mut nav = sample();
        assert!(nav.move_to_first_child());
        assert!(nav.move_to_first_child());
        assert_eq!(nav.namespace_uri().as_deref(), Some("urn:other"));

        let mut ns = nav.clone();
        let mut seen = Vec::new();
        let mut ok = ns.move_to_first_namespace();
        while ok {
            seen.push((ns.local_name(), ns.value()));
            ok = ns.move_to_next_namespace();
        }
        assert_eq!(
            seen,
            vec![("a".to_string(), "urn:other".to_string()), ("xml".to_string(), XML_URI.to_string())]
        );
        assert!(ns.move_to_parent());
        assert!(ns.is_same_position(&nav));
    }

    #[test]
    fn order_puts_namespaces_before_attributes_before_children() {
        let mut root = sample();
        root.move_to_first_child();
        let mut ns = root.clone();
        ns.move_to_first_namespace();
        let mut at = root.clone();
        at.move_to_first_attribute();
        let mut child = root.clone();
        child.move_to_first_child();
        assert_eq!(root.compare_position(&ns), NodeOrder::Before);
        assert_eq!(ns.compare_position(&at), NodeOrder::Before);
        assert_eq!(at.compare_position(&child), NodeOrder::Before);
        assert_eq!(child.compare_position(&root), NodeOrder::After);
    }

    #[test]
    fn separate_documents_have_a_total_order() {
        let first = sample();
        let second = sample();
        assert_eq!(first.compare_position(&second), NodeOrder::Before);
        assert!(!first.is_same_position(&second));
    }

    #[test]
    fn failed_moves_keep_the_position() {
        let mut nav = sample();
        nav.move_to_first_child();
        let mut at = nav.clone();
        at.move_to_first_attribute();
        let before = at.clone();
        assert!(!at.move_to_next());
        assert!(!at.move_to_first_child());
        assert!(!at.move_to_next_attribute());
        assert!(at.is_same_position(&before));
        assert_eq!(nav.value(), "12");
    }
}
