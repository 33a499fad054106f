use core::fmt;

use crate::xdm::AtomicValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Namespace,
}

impl NodeKind {
    /// Attribute and namespace nodes are not children of their owner and are
    /// skipped by tree walks.
    #[inline]
    pub fn is_attribute_like(self) -> bool {
        matches!(self, NodeKind::Attribute | NodeKind::Namespace)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
    pub ns_uri: Option<String>,
}

impl QName {
    pub fn local(local: impl Into<String>) -> Self {
        Self { prefix: None, local: local.into(), ns_uri: None }
    }

    pub fn prefixed(prefix: impl Into<String>, local: impl Into<String>) -> Self {
        Self { prefix: Some(prefix.into()), local: local.into(), ns_uri: None }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(p) if !p.is_empty() => write!(f, "{}:{}", p, self.local),
            _ => f.write_str(&self.local),
        }
    }
}

/// Relative position of two navigators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOrder {
    Before,
    Same,
    After,
    /// The positions belong to trees without a common order.
    Unknown,
}

/// Cursor over a host document tree.
///
/// A navigator is a *position*: every `move_to_*` primitive returns `true` and
/// changes the position when the move is possible, and returns `false` while
/// leaving the position untouched otherwise. Cloning yields an independent
/// navigator on the same position.
///
/// Children exclude attribute and namespace nodes; those are reached through
/// the attribute and namespace primitives and return to their owner element
/// via `move_to_parent`.
pub trait XPathNavigator: Clone + fmt::Debug + 'static {
    fn node_kind(&self) -> NodeKind;
    fn local_name(&self) -> String;
    fn namespace_uri(&self) -> Option<String>;
    fn prefix(&self) -> Option<String> {
        None
    }
    /// String value of the node.
    fn value(&self) -> String;
    /// Typed value used by atomization. Adapters without schema information
    /// return `xs:untypedAtomic` (attributes/elements) or `xs:string`.
    fn typed_value(&self) -> AtomicValue {
        match self.node_kind() {
            NodeKind::Comment | NodeKind::ProcessingInstruction | NodeKind::Namespace => {
                AtomicValue::String(self.value())
            }
            _ => AtomicValue::UntypedAtomic(self.value()),
        }
    }

    fn move_to_parent(&mut self) -> bool;
    fn move_to_first_child(&mut self) -> bool;
    /// Next sibling. Fails on attribute and namespace positions.
    fn move_to_next(&mut self) -> bool;
    /// Previous sibling. Fails on attribute and namespace positions.
    fn move_to_previous(&mut self) -> bool;
    fn move_to_first_attribute(&mut self) -> bool;
    fn move_to_next_attribute(&mut self) -> bool;
    /// First in-scope namespace node of an element.
    fn move_to_first_namespace(&mut self) -> bool;
    fn move_to_next_namespace(&mut self) -> bool;

    fn is_same_position(&self, other: &Self) -> bool;
    fn compare_position(&self, other: &Self) -> NodeOrder;

    fn name(&self) -> Option<QName> {
        match self.node_kind() {
            NodeKind::Element | NodeKind::Attribute | NodeKind::ProcessingInstruction | NodeKind::Namespace => {
                Some(QName { prefix: self.prefix(), local: self.local_name(), ns_uri: self.namespace_uri() })
            }
            _ => None,
        }
    }

    fn move_to_root(&mut self) {
        while self.move_to_parent() {}
    }

    /// Move to the next node in document order (pre-order, attribute and
    /// namespace nodes excluded) whose kind equals `kind` when given.
    ///
    /// Fails without moving when the end of the document or `boundary` is
    /// reached first. From an attribute or namespace position the walk starts
    /// at the owner element's content.
    fn move_to_following(&mut self, kind: Option<NodeKind>, boundary: Option<&Self>) -> bool {
        let mut walk = self.clone();
        if walk.node_kind().is_attribute_like() && !walk.move_to_parent() {
            return false;
        }
        loop {
            if !walk.move_to_first_child() {
                loop {
                    if walk.move_to_next() {
                        break;
                    }
                    if !walk.move_to_parent() {
                        return false;
                    }
                }
            }
            if let Some(end) = boundary
                && walk.is_same_position(end)
            {
                return false;
            }
            if kind.is_none_or(|k| walk.node_kind() == k) {
                *self = walk;
                return true;
            }
        }
    }
}
