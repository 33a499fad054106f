//! Expression syntax tree as produced by a parser.
//!
//! Names still carry their lexical prefixes; the compiler resolves them
//! against the static context. The constructor helpers keep hand-written
//! trees short.

use core::fmt;

pub use crate::engine::axis::Axis;
pub use crate::model::QName;
use crate::xdm::AtomicValue;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Decimal(f64),
    Double(f64),
    String(String),
    Boolean(bool),
    /// Value of a constructor function folded ahead of time (`xs:date("...")`).
    Typed(AtomicValue),
    EmptySequence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
}

impl ArithOp {
    pub fn as_str(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "div",
            ArithOp::IDiv => "idiv",
            ArithOp::Mod => "mod",
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CompOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompOp::Eq => "eq",
            CompOp::Ne => "ne",
            CompOp::Lt => "lt",
            CompOp::Le => "le",
            CompOp::Gt => "gt",
            CompOp::Ge => "ge",
        })
    }
}

/// `eq`-style value comparison or `=`-style general comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Value,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Some,
    Every,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Arith(ArithOp),
    And,
    Or,
    Compare(Comparison, CompOp),
    Union,
    Range,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarBinding {
    pub var: QName,
    pub in_expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    ContextItem,
    VarRef(QName),
    FunctionCall {
        name: QName,
        args: Vec<Expr>,
    },
    Sequence(Vec<Expr>),
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Negate(Box<Expr>),
    IfThenElse {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    For {
        bindings: Vec<VarBinding>,
        return_expr: Box<Expr>,
    },
    Quantified {
        kind: Quantifier,
        bindings: Vec<VarBinding>,
        satisfies: Box<Expr>,
    },
    Path(PathExpr),
    Filter {
        base: Box<Expr>,
        predicates: Vec<Expr>,
    },
}

// ===== Paths and steps =====

#[derive(Debug, Clone, PartialEq)]
pub enum PathStart {
    /// `/steps`
    Root,
    /// `//steps`
    RootDescendant,
    Relative,
    /// `E/steps`
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    pub start: PathStart,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Axis { axis: Axis, test: NodeTest, predicates: Vec<Expr> },
    /// A general expression used as a step (`a/string()`).
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    Name(NameTest),
    Kind(KindTest),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NameTest {
    QName(QName),
    Wildcard(WildcardName),
}

#[derive(Debug, Clone, PartialEq)]
pub enum WildcardName {
    /// `*`
    Any,
    /// `prefix:*`
    NsWildcard(String),
    /// `*:local`
    LocalWildcard(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum KindTest {
    AnyKind,
    Document,
    Text,
    Comment,
    ProcessingInstruction(Option<String>),
    /// `None` is `element()` / `element(*)`
    Element(Option<QName>),
    Attribute(Option<QName>),
    NamespaceNode,
}

impl NodeTest {
    pub fn name(local: impl Into<String>) -> Self {
        NodeTest::Name(NameTest::QName(QName::local(local)))
    }

    pub fn prefixed(prefix: impl Into<String>, local: impl Into<String>) -> Self {
        NodeTest::Name(NameTest::QName(QName::prefixed(prefix, local)))
    }

    pub fn wildcard() -> Self {
        NodeTest::Name(NameTest::Wildcard(WildcardName::Any))
    }

    pub fn node() -> Self {
        NodeTest::Kind(KindTest::AnyKind)
    }

    pub fn text() -> Self {
        NodeTest::Kind(KindTest::Text)
    }
}

impl Step {
    pub fn new(axis: Axis, test: NodeTest) -> Self {
        Step::Axis { axis, test, predicates: Vec::new() }
    }

    pub fn child(local: &str) -> Self {
        Self::new(Axis::Child, NodeTest::name(local))
    }

    pub fn attribute(local: &str) -> Self {
        Self::new(Axis::Attribute, NodeTest::name(local))
    }

    /// `axis::local`
    pub fn axis(axis: Axis, local: &str) -> Self {
        Self::new(axis, NodeTest::name(local))
    }

    /// The step `//` abbreviates.
    pub fn descendant_or_self() -> Self {
        Self::new(Axis::DescendantOrSelf, NodeTest::node())
    }

    pub fn expr(e: Expr) -> Self {
        Step::Expr(Box::new(e))
    }

    /// Append a predicate; has no effect on expression steps.
    pub fn with_predicate(mut self, p: Expr) -> Self {
        if let Step::Axis { predicates, .. } = &mut self {
            predicates.push(p);
        }
        self
    }
}

impl Expr {
    pub fn int(i: i64) -> Self {
        Expr::Literal(Literal::Integer(i))
    }

    pub fn double(d: f64) -> Self {
        Expr::Literal(Literal::Double(d))
    }

    pub fn decimal(d: f64) -> Self {
        Expr::Literal(Literal::Decimal(d))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(s.into()))
    }

    pub fn typed(v: AtomicValue) -> Self {
        Expr::Literal(Literal::Typed(v))
    }

    pub fn empty() -> Self {
        Expr::Literal(Literal::EmptySequence)
    }

    pub fn var(local: &str) -> Self {
        Expr::VarRef(QName::local(local))
    }

    pub fn call(local: &str, args: Vec<Expr>) -> Self {
        Expr::FunctionCall { name: QName::local(local), args }
    }

    pub fn seq(items: Vec<Expr>) -> Self {
        Expr::Sequence(items)
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary { left: Box::new(left), op, right: Box::new(right) }
    }

    pub fn arith(left: Expr, op: ArithOp, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Arith(op), right)
    }

    /// General comparison (`=`, `<`, ...).
    pub fn cmp(left: Expr, op: CompOp, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Compare(Comparison::General, op), right)
    }

    /// Value comparison (`eq`, `lt`, ...).
    pub fn value_cmp(left: Expr, op: CompOp, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Compare(Comparison::Value, op), right)
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::And, right)
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Or, right)
    }

    pub fn union(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Union, right)
    }

    pub fn range(from: Expr, to: Expr) -> Self {
        Self::binary(from, BinaryOp::Range, to)
    }

    pub fn neg(e: Expr) -> Self {
        Expr::Negate(Box::new(e))
    }

    pub fn if_then_else(cond: Expr, then_expr: Expr, else_expr: Expr) -> Self {
        Expr::IfThenElse { cond: Box::new(cond), then_expr: Box::new(then_expr), else_expr: Box::new(else_expr) }
    }

    /// `for $var in source return body`
    pub fn for_in(var: &str, source: Expr, body: Expr) -> Self {
        Expr::For {
            bindings: vec![VarBinding { var: QName::local(var), in_expr: source }],
            return_expr: Box::new(body),
        }
    }

    pub fn quantified(kind: Quantifier, var: &str, source: Expr, satisfies: Expr) -> Self {
        Expr::Quantified {
            kind,
            bindings: vec![VarBinding { var: QName::local(var), in_expr: source }],
            satisfies: Box::new(satisfies),
        }
    }

    pub fn relative(steps: Vec<Step>) -> Self {
        Expr::Path(PathExpr { start: PathStart::Relative, steps })
    }

    pub fn root(steps: Vec<Step>) -> Self {
        Expr::Path(PathExpr { start: PathStart::Root, steps })
    }

    pub fn root_descendant(steps: Vec<Step>) -> Self {
        Expr::Path(PathExpr { start: PathStart::RootDescendant, steps })
    }

    /// `self/steps`
    pub fn path_from(self, steps: Vec<Step>) -> Self {
        Expr::Path(PathExpr { start: PathStart::Expr(Box::new(self)), steps })
    }

    pub fn filter(base: Expr, predicates: Vec<Expr>) -> Self {
        Expr::Filter { base: Box::new(base), predicates }
    }
}
