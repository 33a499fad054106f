//! Step descriptor chains.
//!
//! A path compiles to a singly linked list of typed steps. Executing the
//! path threads a cursor through the list: every link wraps the cursor built
//! so far. The binder rewrites chains before the tree is frozen.

use core::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::engine::axis::{Axis, AxisCursor};
use crate::engine::cursor::{BoxCursor, NodeCheckCursor};
use crate::engine::expr::{ExprId, ExprTree};
use crate::engine::filter::{PositionFilterCursor, PredicateCursor};
use crate::engine::fused::ChildOverDescendantsCursor;
use crate::engine::join::ExprStepCursor;
use crate::engine::node_test::NodeTest;
use crate::engine::pool::DataPool;
use crate::model::XPathNavigator;

#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    Following,
    PrecedingSibling,
    Preceding,
    Attribute,
    Namespace,
    SelfAxis,
    ChildOverDescendants(Vec<NodeTest>),
    PositionFilter(usize),
    Predicate(ExprId),
    Expr { expr: ExprId, nodes_only: bool },
}

impl StepKind {
    pub fn from_axis(axis: Axis) -> Self {
        match axis {
            Axis::Child => StepKind::Child,
            Axis::Descendant => StepKind::Descendant,
            Axis::DescendantOrSelf => StepKind::DescendantOrSelf,
            Axis::Parent => StepKind::Parent,
            Axis::Ancestor => StepKind::Ancestor,
            Axis::AncestorOrSelf => StepKind::AncestorOrSelf,
            Axis::FollowingSibling => StepKind::FollowingSibling,
            Axis::Following => StepKind::Following,
            Axis::PrecedingSibling => StepKind::PrecedingSibling,
            Axis::Preceding => StepKind::Preceding,
            Axis::Attribute => StepKind::Attribute,
            Axis::Namespace => StepKind::Namespace,
            Axis::SelfAxis => StepKind::SelfAxis,
        }
    }

    pub fn axis(&self) -> Option<Axis> {
        Some(match self {
            StepKind::Child => Axis::Child,
            StepKind::Descendant => Axis::Descendant,
            StepKind::DescendantOrSelf => Axis::DescendantOrSelf,
            StepKind::Parent => Axis::Parent,
            StepKind::Ancestor => Axis::Ancestor,
            StepKind::AncestorOrSelf => Axis::AncestorOrSelf,
            StepKind::FollowingSibling => Axis::FollowingSibling,
            StepKind::Following => Axis::Following,
            StepKind::PrecedingSibling => Axis::PrecedingSibling,
            StepKind::Preceding => Axis::Preceding,
            StepKind::Attribute => Axis::Attribute,
            StepKind::Namespace => Axis::Namespace,
            StepKind::SelfAxis => Axis::SelfAxis,
            _ => return None,
        })
    }

    /// Filters restrict the previous step's output instead of navigating.
    pub fn is_filter(&self) -> bool {
        matches!(self, StepKind::PositionFilter(_) | StepKind::Predicate(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepDescriptor {
    pub kind: StepKind,
    pub test: Option<NodeTest>,
    pub next: Option<Box<StepDescriptor>>,
}

impl StepDescriptor {
    pub fn axis(axis: Axis, test: NodeTest) -> Self {
        Self { kind: StepKind::from_axis(axis), test: Some(test), next: None }
    }

    pub fn new(kind: StepKind) -> Self {
        Self { kind, test: None, next: None }
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepDescriptor> {
        core::iter::successors(Some(self), |s| s.next.as_deref())
    }

    /// Link a list of unlinked descriptors into a chain.
    pub fn link(steps: Vec<StepDescriptor>) -> Option<Box<StepDescriptor>> {
        steps.into_iter().rev().fold(None, |next, mut s| {
            s.next = next;
            Some(Box::new(s))
        })
    }

    /// Break a chain into unlinked descriptors.
    pub fn unlink(chain: Option<Box<StepDescriptor>>) -> Vec<StepDescriptor> {
        let mut out = Vec::new();
        let mut cur = chain;
        while let Some(mut s) = cur {
            cur = s.next.take();
            out.push(*s);
        }
        out
    }

    /// Whether the chain ends in navigation rather than a general expression.
    pub fn yields_nodes(&self) -> bool {
        self.iter()
            .filter(|s| !s.kind.is_filter())
            .last()
            .is_some_and(|s| !matches!(s.kind, StepKind::Expr { .. }))
    }

    /// Cursor for this link on top of `input`. Position filters count per
    /// group when `per_context` is set and over the flat input otherwise.
    pub fn instantiate<N: XPathNavigator>(
        &self,
        input: BoxCursor<N>,
        tree: &Rc<ExprTree<N>>,
        pool: &DataPool<N>,
        per_context: bool,
    ) -> BoxCursor<N> {
        if let Some(axis) = self.kind.axis() {
            let test = self.test.clone().unwrap_or_else(NodeTest::any_node);
            return Box::new(AxisCursor::new(axis, test, input));
        }
        match &self.kind {
            StepKind::ChildOverDescendants(tests) => Box::new(ChildOverDescendantsCursor::new(tests.clone(), input)),
            StepKind::PositionFilter(n) => Box::new(PositionFilterCursor::new(input, *n, per_context)),
            StepKind::Predicate(e) => Box::new(PredicateCursor::new(tree.clone(), *e, input, pool.clone())),
            StepKind::Expr { expr, nodes_only } => {
                let c: BoxCursor<N> = Box::new(ExprStepCursor::new(tree.clone(), *expr, input, pool.clone()));
                if *nodes_only { Box::new(NodeCheckCursor::new(c)) } else { c }
            }
            _ => input,
        }
    }
}

/// Thread `input` through every link of the chain.
pub fn build_chain<N: XPathNavigator>(
    chain: Option<&StepDescriptor>,
    input: BoxCursor<N>,
    tree: &Rc<ExprTree<N>>,
    pool: &DataPool<N>,
    per_context: bool,
) -> BoxCursor<N> {
    let mut cursor = input;
    for step in chain.into_iter().flat_map(StepDescriptor::iter) {
        cursor = step.instantiate(cursor, tree, pool, per_context);
    }
    cursor
}

impl fmt::Display for StepDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match &self.kind {
            StepKind::Child => "Child",
            StepKind::Descendant => "Descendant",
            StepKind::DescendantOrSelf => "DescendantOrSelf",
            StepKind::Parent => "Parent",
            StepKind::Ancestor => "Ancestor",
            StepKind::AncestorOrSelf => "AncestorOrSelf",
            StepKind::FollowingSibling => "FollowingSibling",
            StepKind::Following => "Following",
            StepKind::PrecedingSibling => "PrecedingSibling",
            StepKind::Preceding => "Preceding",
            StepKind::Attribute => "Attribute",
            StepKind::Namespace => "Namespace",
            StepKind::SelfAxis => "Self",
            StepKind::ChildOverDescendants(tests) => {
                let names: Vec<String> = tests.iter().map(ToString::to_string).collect();
                return write!(f, "ChildOverDescendants({})", names.join(","));
            }
            StepKind::PositionFilter(n) => return write!(f, "PositionFilter({n})"),
            StepKind::Predicate(_) => return f.write_str("Predicate"),
            StepKind::Expr { .. } => return f.write_str("Expr"),
        };
        match &self.test {
            Some(t) => write!(f, "{name}({t})"),
            None => write!(f, "{name}(node())"),
        }
    }
}

/// Apply the syntactic rewrites. `literal_position` reports the position a
/// predicate expression denotes when it is a suitable numeric literal.
pub fn rewrite_chain(
    steps: Vec<StepDescriptor>,
    literal_position: impl Fn(ExprId) -> Option<usize>,
) -> Vec<StepDescriptor> {
    // literal numeric predicates
    let steps: Vec<StepDescriptor> = steps
        .into_iter()
        .map(|mut s| {
            if let StepKind::Predicate(e) = s.kind
                && let Some(n) = literal_position(e)
            {
                debug!(position = n, "predicate rewritten to position filter");
                s.kind = StepKind::PositionFilter(n);
            }
            s
        })
        .collect();

    let has_predicates = |i: usize| steps.get(i + 1).is_some_and(|s| s.kind.is_filter());
    let mut out = Vec::with_capacity(steps.len());
    let mut i = 0;
    while i < steps.len() {
        let step = &steps[i];
        let collapsible = step.kind == StepKind::DescendantOrSelf
            && step.test.as_ref().is_none_or(NodeTest::is_any_node)
            && !has_predicates(i);
        if collapsible {
            let run = steps[i + 1..]
                .iter()
                .enumerate()
                .take_while(|(k, s)| s.kind == StepKind::Child && !has_predicates(i + 1 + k))
                .count();
            // a child step that carries predicates is kept out of the run
            if run >= 2 {
                let tests: Vec<NodeTest> = steps[i + 1..i + 1 + run]
                    .iter()
                    .map(|s| s.test.clone().unwrap_or_else(NodeTest::any_node))
                    .collect();
                debug!(steps = run, "descendant-or-self/child run fused");
                out.push(StepDescriptor::new(StepKind::ChildOverDescendants(tests)));
                i += 1 + run;
                continue;
            }
            if run == 1 {
                debug!("descendant-or-self/child collapsed to descendant");
                out.push(StepDescriptor { kind: StepKind::Descendant, test: steps[i + 1].test.clone(), next: None });
                i += 2;
                continue;
            }
        }
        out.push(step.clone());
        i += 1;
    }
    out
}

#[derive(Debug, Clone, Copy)]
struct OrderFacts {
    ordered: bool,
    disjoint: bool,
    singleton: bool,
}

/// Whether a chain started from input with the given facts delivers nodes in
/// document order without duplicates.
pub fn is_ordered(steps: &[StepDescriptor], start_ordered: bool, start_disjoint: bool, start_singleton: bool) -> bool {
    let mut f = OrderFacts { ordered: start_ordered, disjoint: start_disjoint, singleton: start_singleton };
    let none = OrderFacts { ordered: false, disjoint: false, singleton: false };
    for s in steps {
        f = match &s.kind {
            StepKind::Child => {
                if f.ordered && f.disjoint {
                    OrderFacts { singleton: false, ..f }
                } else {
                    none
                }
            }
            StepKind::SelfAxis => {
                if f.ordered && f.disjoint {
                    f
                } else {
                    none
                }
            }
            StepKind::Attribute | StepKind::Namespace => {
                if f.ordered {
                    OrderFacts { ordered: true, disjoint: true, singleton: false }
                } else {
                    none
                }
            }
            StepKind::Descendant | StepKind::DescendantOrSelf | StepKind::ChildOverDescendants(_) => {
                if f.ordered && f.disjoint {
                    OrderFacts { ordered: true, disjoint: false, singleton: false }
                } else {
                    none
                }
            }
            StepKind::FollowingSibling => {
                if f.singleton {
                    OrderFacts { ordered: true, disjoint: true, singleton: false }
                } else {
                    none
                }
            }
            StepKind::Following => {
                if f.singleton {
                    OrderFacts { ordered: true, disjoint: false, singleton: false }
                } else {
                    none
                }
            }
            StepKind::PositionFilter(_) | StepKind::Predicate(_) => f,
            StepKind::Parent
            | StepKind::Ancestor
            | StepKind::AncestorOrSelf
            | StepKind::PrecedingSibling
            | StepKind::Preceding
            | StepKind::Expr { .. } => none,
        };
    }
    f.ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(name: &str) -> StepDescriptor {
        StepDescriptor::axis(Axis::Child, NodeTest::name(name))
    }

    fn dos() -> StepDescriptor {
        StepDescriptor::axis(Axis::DescendantOrSelf, NodeTest::any_node())
    }

    fn render(steps: &[StepDescriptor]) -> Vec<String> {
        steps.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn link_and_unlink_preserve_order() {
        let chain = StepDescriptor::link(vec![child("a"), child("b")]);
        let names: Vec<String> = chain.as_deref().into_iter().flat_map(StepDescriptor::iter).map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["Child(a)", "Child(b)"]);
        assert_eq!(render(&StepDescriptor::unlink(chain)), vec!["Child(a)", "Child(b)"]);
    }

    #[test]
    fn predicate_on_child_blocks_collapse() {
        let steps = vec![dos(), child("b"), StepDescriptor::new(StepKind::Predicate(ExprId(0)))];
        let out = rewrite_chain(steps, |_| Some(1));
        assert_eq!(render(&out), vec!["DescendantOrSelf(node())", "Child(b)", "PositionFilter(1)"]);
    }

    #[test]
    fn run_stops_before_child_with_predicate() {
        let steps = vec![dos(), child("a"), child("b"), child("c"), StepDescriptor::new(StepKind::Predicate(ExprId(3)))];
        let out = rewrite_chain(steps, |_| None);
        assert_eq!(render(&out), vec!["ChildOverDescendants(a,b)", "Child(c)", "Predicate"]);
    }

    #[test]
    fn reverse_axes_are_unordered() {
        let steps = vec![child("a"), StepDescriptor::axis(Axis::PrecedingSibling, NodeTest::wildcard())];
        assert!(!is_ordered(&steps, true, true, true));
        assert!(is_ordered(&steps[..1], true, true, true));
    }

    #[test]
    fn descendant_after_descendant_needs_sorting() {
        let d = StepDescriptor::axis(Axis::Descendant, NodeTest::wildcard());
        assert!(!is_ordered(&[d.clone(), child("x")], true, true, true));
        assert!(is_ordered(&[child("x"), d], true, true, true));
    }
}
