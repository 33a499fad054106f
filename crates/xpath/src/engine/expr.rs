//! Expression tree arena.
//!
//! The compiler appends nodes and attaches children; the binder fills in
//! bindings, function handles, flags and rewritten step chains. Afterwards
//! the tree is shared read-only behind an `Rc`.

use crate::ast::{ArithOp, CompOp, Comparison, Quantifier};
use crate::engine::pool::Binding;
use crate::engine::steps::StepDescriptor;
use crate::functions::FunctionEntry;
use crate::runtime::{Error, ErrorCode, StaticContext};
use crate::xdm::{AtomicValue, ExpandedName, XPathResultType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub(crate) usize);

#[derive(Debug, Clone, Copy, Default)]
pub struct ExprFlags {
    pub context_sensitive: bool,
    pub bound: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStart {
    /// Relative path: starts at the context item.
    Context,
    /// `/...`: starts at the root of the context node's tree.
    Root,
    /// `E/...`: starts at the result of an expression (a child of the path).
    Expr(ExprId),
}

#[derive(Debug)]
pub struct PathExpr {
    pub start: PathStart,
    pub steps: Option<Box<StepDescriptor>>,
    /// Statically proven to deliver document order without duplicates.
    pub ordered: bool,
    /// Re-materialize the result in document order.
    pub sort: bool,
    /// Reject atomic values produced by the start expression.
    pub start_nodes_only: bool,
}

pub enum ExprKind<N> {
    Literal(AtomicValue),
    ContextItem,
    Root,
    VarRef { name: ExpandedName, binding: Option<Binding> },
    /// Arguments are the node's children.
    FunctionCall { name: ExpandedName, function: Option<FunctionEntry<N>> },
    Path(PathExpr),
    /// `source[p1][p2]...`: children[0] is the source, the chain holds only
    /// filter steps.
    Filter { steps: Option<Box<StepDescriptor>> },
    Arithmetic(ArithOp),
    Negate,
    And,
    Or,
    Compare(Comparison, CompOp),
    /// children: condition, then, else
    If,
    /// children: in-expression, body
    For { var: ExpandedName, binding: Option<Binding> },
    Quantified { quantifier: Quantifier, var: ExpandedName, binding: Option<Binding> },
    Sequence,
    Range,
    Union,
}

impl<N> ExprKind<N> {
    pub fn label(&self) -> &'static str {
        match self {
            ExprKind::Literal(_) => "literal",
            ExprKind::ContextItem => "context-item",
            ExprKind::Root => "root",
            ExprKind::VarRef { .. } => "variable",
            ExprKind::FunctionCall { .. } => "function-call",
            ExprKind::Path(_) => "path",
            ExprKind::Filter { .. } => "filter",
            ExprKind::Arithmetic(_) => "arithmetic",
            ExprKind::Negate => "negate",
            ExprKind::And => "and",
            ExprKind::Or => "or",
            ExprKind::Compare(..) => "comparison",
            ExprKind::If => "if",
            ExprKind::For { .. } => "for",
            ExprKind::Quantified { .. } => "quantified",
            ExprKind::Sequence => "sequence",
            ExprKind::Range => "range",
            ExprKind::Union => "union",
        }
    }
}

pub struct ExprNode<N> {
    pub kind: ExprKind<N>,
    pub children: Vec<ExprId>,
    pub parent: Option<ExprId>,
    pub flags: ExprFlags,
}

pub struct ExprTree<N> {
    nodes: Vec<ExprNode<N>>,
    static_ctx: StaticContext<N>,
}

impl<N> ExprTree<N> {
    pub fn new(static_ctx: StaticContext<N>) -> Self {
        Self { nodes: Vec::new(), static_ctx }
    }

    pub fn static_context(&self) -> &StaticContext<N> {
        &self.static_ctx
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add(&mut self, kind: ExprKind<N>) -> ExprId {
        let id = ExprId(self.nodes.len());
        self.nodes.push(ExprNode { kind, children: Vec::new(), parent: None, flags: ExprFlags::default() });
        id
    }

    /// Append `child` to `parent`'s children. A node has at most one parent.
    pub fn attach(&mut self, parent: ExprId, child: ExprId) -> Result<(), Error> {
        if parent == child || child.0 >= self.nodes.len() || parent.0 >= self.nodes.len() {
            return Err(Error::format(ErrorCode::XPST0003, &[&format!("invalid attachment of node {}", child.0)]));
        }
        if let Some(existing) = self.nodes[child.0].parent {
            return Err(Error::format(
                ErrorCode::XPST0003,
                &[&format!("node {} already attached to node {}", child.0, existing.0)],
            ));
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        Ok(())
    }

    /// Add a node and attach `children` to it in order.
    pub fn add_with(&mut self, kind: ExprKind<N>, children: &[ExprId]) -> Result<ExprId, Error> {
        let id = self.add(kind);
        for &c in children {
            self.attach(id, c)?;
        }
        Ok(id)
    }

    pub fn node(&self, id: ExprId) -> &ExprNode<N> {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: ExprId) -> &mut ExprNode<N> {
        &mut self.nodes[id.0]
    }

    pub fn kind(&self, id: ExprId) -> &ExprKind<N> {
        &self.nodes[id.0].kind
    }

    pub fn children(&self, id: ExprId) -> &[ExprId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: ExprId) -> Option<ExprId> {
        self.nodes[id.0].parent
    }

    pub fn is_context_sensitive(&self, id: ExprId) -> bool {
        self.nodes[id.0].flags.context_sensitive
    }

    /// Static category of the expression's result.
    pub fn return_type(&self, id: ExprId) -> XPathResultType {
        let children = self.children(id);
        match self.kind(id) {
            ExprKind::Literal(v) => v.result_type(),
            ExprKind::ContextItem => XPathResultType::Any,
            ExprKind::Root | ExprKind::Union => XPathResultType::NodeSet,
            ExprKind::VarRef { binding, .. } => binding.as_ref().map_or(XPathResultType::Any, |b| b.item_type),
            ExprKind::FunctionCall { function, .. } => {
                function.as_ref().map_or(XPathResultType::Any, |f| f.return_type)
            }
            ExprKind::Path(p) => {
                if p.steps.as_deref().is_some_and(StepDescriptor::yields_nodes) {
                    XPathResultType::NodeSet
                } else {
                    XPathResultType::Any
                }
            }
            ExprKind::Filter { .. } => children.first().map_or(XPathResultType::Any, |&c| self.return_type(c)),
            ExprKind::Arithmetic(op) => match children {
                [l, r] => arithmetic_result(*op, self.return_type(*l), self.return_type(*r)),
                _ => XPathResultType::Any,
            },
            ExprKind::Negate => match children.first().map(|&c| self.return_type(c)) {
                Some(XPathResultType::Number) => XPathResultType::Number,
                Some(XPathResultType::Duration) => XPathResultType::Duration,
                _ => XPathResultType::Any,
            },
            ExprKind::And | ExprKind::Or | ExprKind::Compare(..) | ExprKind::Quantified { .. } => {
                XPathResultType::Boolean
            }
            ExprKind::If => match children {
                [_, t, e] if self.return_type(*t) == self.return_type(*e) => self.return_type(*t),
                _ => XPathResultType::Any,
            },
            ExprKind::For { .. } => XPathResultType::Any,
            ExprKind::Sequence => self.common_type(children, Self::return_type),
            ExprKind::Range => XPathResultType::Number,
        }
    }

    /// Static category of each item of the result; used for variable
    /// bindings of `for` and quantified expressions.
    pub fn item_type(&self, id: ExprId) -> XPathResultType {
        let children = self.children(id);
        match self.kind(id) {
            ExprKind::For { .. } => children.get(1).map_or(XPathResultType::Any, |&b| self.item_type(b)),
            ExprKind::Filter { .. } => children.first().map_or(XPathResultType::Any, |&c| self.item_type(c)),
            ExprKind::Sequence => self.common_type(children, Self::item_type),
            _ => self.return_type(id),
        }
    }

    fn common_type(&self, ids: &[ExprId], f: fn(&Self, ExprId) -> XPathResultType) -> XPathResultType {
        let mut types = ids.iter().map(|&c| f(self, c));
        match types.next() {
            Some(first) if types.all(|t| t == first) => first,
            _ => XPathResultType::Any,
        }
    }
}

/// Result category of a binary arithmetic operator.
pub fn arithmetic_result(op: ArithOp, l: XPathResultType, r: XPathResultType) -> XPathResultType {
    use XPathResultType::*;
    match (op, l, r) {
        (_, Number, Number) => Number,
        (ArithOp::Add, DateTime, Duration) | (ArithOp::Add, Duration, DateTime) => DateTime,
        (ArithOp::Add, Date, Duration) | (ArithOp::Add, Duration, Date) => Date,
        (ArithOp::Add, Time, Duration) | (ArithOp::Add, Duration, Time) => Time,
        (ArithOp::Add, Duration, Duration) => Duration,
        (ArithOp::Sub, DateTime, DateTime) | (ArithOp::Sub, Date, Date) | (ArithOp::Sub, Time, Time) => Duration,
        (ArithOp::Sub, DateTime, Duration) => DateTime,
        (ArithOp::Sub, Date, Duration) => Date,
        (ArithOp::Sub, Time, Duration) => Time,
        (ArithOp::Sub, Duration, Duration) => Duration,
        (ArithOp::Mul, Duration, Number) | (ArithOp::Mul, Number, Duration) => Duration,
        (ArithOp::Div, Duration, Number) => Duration,
        (ArithOp::Div, Duration, Duration) => Number,
        _ => Any,
    }
}
