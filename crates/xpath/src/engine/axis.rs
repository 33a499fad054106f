//! Axis iteration over a navigator.
//!
//! One cursor type serves all axes. For every node of its source cursor it
//! walks the axis with an explicit state machine, filters candidates through
//! the node test and numbers the survivors as one group.

use core::fmt;
use core::mem;

use crate::engine::cursor::{BoxCursor, SequenceCursor};
use crate::engine::node_test::NodeTest;
use crate::model::{NodeKind, XPathNavigator};
use crate::runtime::{Error, ErrorCode};
use crate::xdm::Item;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
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
}

impl Axis {
    pub fn principal_kind(self) -> NodeKind {
        match self {
            Axis::Attribute => NodeKind::Attribute,
            Axis::Namespace => NodeKind::Namespace,
            _ => NodeKind::Element,
        }
    }

    /// Reverse axes deliver nodes in reverse document order.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Parent | Axis::Ancestor | Axis::AncestorOrSelf | Axis::PrecedingSibling | Axis::Preceding
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Axis::Child => "child",
            Axis::Descendant => "descendant",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::Parent => "parent",
            Axis::Ancestor => "ancestor",
            Axis::AncestorOrSelf => "ancestor-or-self",
            Axis::FollowingSibling => "following-sibling",
            Axis::Following => "following",
            Axis::PrecedingSibling => "preceding-sibling",
            Axis::Preceding => "preceding",
            Axis::Attribute => "attribute",
            Axis::Namespace => "namespace",
            Axis::SelfAxis => "self",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
enum AxisState<N> {
    // Waiting for the next source item
    Idle,
    SelfOnce(N),
    Parent(N),
    Ancestors { nav: N, pending_self: bool },
    Children { nav: N, started: bool },
    Attributes { nav: N, started: bool },
    Namespaces { nav: N, started: bool },
    // Pre-order walk below the origin; depth 0 is the origin itself
    Descendants { nav: N, depth: usize, pending_self: bool },
    FollowingSiblings(N),
    PrecedingSiblings(N),
    Following { nav: N, started: bool },
    // Backward walk; `below` counts the levels under the origin's ancestor
    // spine so that ancestors are stepped over without being reported
    Preceding { nav: N, below: usize },
    Done,
}

impl<N: XPathNavigator> AxisState<N> {
    fn start(axis: Axis, origin: N) -> Self {
        let attr_like = origin.node_kind().is_attribute_like();
        match axis {
            Axis::SelfAxis => AxisState::SelfOnce(origin),
            Axis::Parent => AxisState::Parent(origin),
            Axis::Ancestor => AxisState::Ancestors { nav: origin, pending_self: false },
            Axis::AncestorOrSelf => AxisState::Ancestors { nav: origin, pending_self: true },
            Axis::Child => AxisState::Children { nav: origin, started: false },
            Axis::Attribute => AxisState::Attributes { nav: origin, started: false },
            Axis::Namespace => AxisState::Namespaces { nav: origin, started: false },
            Axis::Descendant => AxisState::Descendants { nav: origin, depth: 0, pending_self: false },
            Axis::DescendantOrSelf => AxisState::Descendants { nav: origin, depth: 0, pending_self: true },
            Axis::FollowingSibling if attr_like => AxisState::Done,
            Axis::FollowingSibling => AxisState::FollowingSiblings(origin),
            Axis::PrecedingSibling if attr_like => AxisState::Done,
            Axis::PrecedingSibling => AxisState::PrecedingSiblings(origin),
            Axis::Following => AxisState::Following { nav: origin, started: false },
            Axis::Preceding => {
                let mut nav = origin;
                if attr_like && !nav.move_to_parent() {
                    return AxisState::Done;
                }
                AxisState::Preceding { nav, below: 0 }
            }
        }
    }

    /// Next position on the axis, before the node test is applied.
    fn advance(&mut self, kind_hint: Option<NodeKind>) -> Option<N> {
        let next = match self {
            AxisState::Idle | AxisState::Done => None,
            AxisState::SelfOnce(_) | AxisState::Parent(_) => {
                return match mem::replace(self, AxisState::Done) {
                    AxisState::SelfOnce(n) => Some(n),
                    AxisState::Parent(mut n) => n.move_to_parent().then_some(n),
                    _ => None,
                };
            }
            AxisState::Ancestors { nav, pending_self } => {
                if mem::take(pending_self) || nav.move_to_parent() {
                    Some(nav.clone())
                } else {
                    None
                }
            }
            AxisState::Children { nav, started } => {
                let moved = if mem::replace(started, true) { nav.move_to_next() } else { nav.move_to_first_child() };
                moved.then(|| nav.clone())
            }
            AxisState::Attributes { nav, started } => {
                let moved = if mem::replace(started, true) {
                    nav.move_to_next_attribute()
                } else {
                    nav.move_to_first_attribute()
                };
                moved.then(|| nav.clone())
            }
            AxisState::Namespaces { nav, started } => {
                let moved = if mem::replace(started, true) {
                    nav.move_to_next_namespace()
                } else {
                    nav.move_to_first_namespace()
                };
                moved.then(|| nav.clone())
            }
            AxisState::Descendants { nav, depth, pending_self } => {
                if mem::take(pending_self) {
                    return Some(nav.clone());
                }
                step_descendant(nav, depth).then(|| nav.clone())
            }
            AxisState::FollowingSiblings(nav) => nav.move_to_next().then(|| nav.clone()),
            AxisState::PrecedingSiblings(nav) => nav.move_to_previous().then(|| nav.clone()),
            AxisState::Following { nav, started } => {
                if mem::replace(started, true) {
                    nav.move_to_following(kind_hint, None).then(|| nav.clone())
                } else if nav.node_kind().is_attribute_like() {
                    // the owner's content follows its attributes
                    (nav.move_to_parent() && nav.move_to_following(kind_hint, None)).then(|| nav.clone())
                } else {
                    skip_subtree(nav).then(|| nav.clone())
                }
            }
            AxisState::Preceding { nav, below } => step_preceding(nav, below).then(|| nav.clone()),
        };
        if next.is_none() {
            *self = AxisState::Done;
        }
        next
    }
}

/// Advance a pre-order walk confined to the subtree where `depth` was 0.
fn step_descendant<N: XPathNavigator>(nav: &mut N, depth: &mut usize) -> bool {
    if nav.move_to_first_child() {
        *depth += 1;
        return true;
    }
    loop {
        if *depth == 0 {
            return false;
        }
        if nav.move_to_next() {
            return true;
        }
        nav.move_to_parent();
        *depth -= 1;
    }
}

/// Move to the first node after the subtree of the current position.
fn skip_subtree<N: XPathNavigator>(nav: &mut N) -> bool {
    let mut up = nav.clone();
    loop {
        if up.move_to_next() {
            *nav = up;
            return true;
        }
        if !up.move_to_parent() {
            return false;
        }
    }
}

/// Move to the deepest last descendant, returning the number of levels.
fn descend_last<N: XPathNavigator>(nav: &mut N) -> usize {
    let mut levels = 0;
    while nav.move_to_first_child() {
        while nav.move_to_next() {}
        levels += 1;
    }
    levels
}

/// One step backwards in document order, skipping ancestors of the origin.
fn step_preceding<N: XPathNavigator>(nav: &mut N, below: &mut usize) -> bool {
    loop {
        if nav.move_to_previous() {
            *below += descend_last(nav);
            return true;
        }
        if !nav.move_to_parent() {
            return false;
        }
        if *below == 0 {
            continue;
        }
        *below -= 1;
        return true;
    }
}

pub struct AxisCursor<N> {
    axis: Axis,
    test: NodeTest,
    principal: NodeKind,
    source: BoxCursor<N>,
    state: AxisState<N>,
    current: Option<Item<N>>,
    pos: usize,
    finished: bool,
}

impl<N: XPathNavigator> AxisCursor<N> {
    pub fn new(axis: Axis, test: NodeTest, source: BoxCursor<N>) -> Self {
        Self {
            principal: axis.principal_kind(),
            axis,
            test,
            source,
            state: AxisState::Idle,
            current: None,
            pos: 0,
            finished: false,
        }
    }

    fn advance(&mut self) -> Result<bool, Error> {
        let hint = self.test.node_kind(self.principal);
        loop {
            if let Some(n) = self.state.advance(hint) {
                if self.test.matches(&n, self.principal) {
                    self.pos += 1;
                    self.current = Some(Item::Node(n));
                    return Ok(true);
                }
                continue;
            }
            if !self.source.move_next()? {
                return Ok(false);
            }
            match self.source.current() {
                Some(Item::Node(n)) => {
                    self.state = AxisState::start(self.axis, n.clone());
                    self.pos = 0;
                }
                _ => return Err(Error::format(ErrorCode::XPTY0020, &[&self.axis])),
            }
        }
    }
}

impl<N: XPathNavigator> SequenceCursor<N> for AxisCursor<N> {
    fn move_next(&mut self) -> Result<bool, Error> {
        if self.finished {
            return Ok(false);
        }
        match self.advance() {
            Ok(true) => Ok(true),
            other => {
                self.finished = true;
                self.current = None;
                other
            }
        }
    }
    fn current(&self) -> Option<&Item<N>> {
        self.current.as_ref()
    }
    fn reset(&mut self) {
        self.source.reset();
        self.state = AxisState::Idle;
        self.current = None;
        self.pos = 0;
        self.finished = false;
    }
    fn clone_instance(&self) -> BoxCursor<N> {
        Box::new(Self {
            axis: self.axis,
            test: self.test.clone(),
            principal: self.principal,
            source: self.source.clone_instance(),
            state: self.state.clone(),
            current: self.current.clone(),
            pos: self.pos,
            finished: self.finished,
        })
    }
    fn is_finished(&self) -> bool {
        self.finished
    }
    fn sequential_position(&self) -> usize {
        self.pos
    }
    fn reset_sequential_position(&mut self) {
        self.pos = 0;
    }
}
