use smallvec::SmallVec;

use crate::engine::cursor::{BoxCursor, SequenceCursor};
use crate::engine::node_test::NodeTest;
use crate::model::{NodeKind, XPathNavigator};
use crate::runtime::{Error, ErrorCode};
use crate::xdm::Item;

/// `descendant-or-self::node()/child::t1/.../child::tk` in a single
/// depth-first walk per context node.
///
/// At every descendant at least `k` levels below the context, the tests
/// are checked bottom-up: the node against `tk`, its
/// parent against `tk-1`, and so on. Each node is visited once, so the output
/// of one context is in document order without duplicates.
pub struct ChildOverDescendantsCursor<N> {
    tests: SmallVec<[NodeTest; 4]>,
    source: BoxCursor<N>,
    walk: Option<(N, usize)>,
    current: Option<Item<N>>,
    pos: usize,
    finished: bool,
}

impl<N: XPathNavigator> ChildOverDescendantsCursor<N> {
    pub fn new(tests: impl IntoIterator<Item = NodeTest>, source: BoxCursor<N>) -> Self {
        Self { tests: tests.into_iter().collect(), source, walk: None, current: None, pos: 0, finished: false }
    }

    fn chain_matches(&self, nav: &N, depth: usize) -> bool {
        // the topmost test matches a child of the context at the earliest
        if depth < self.tests.len() {
            return false;
        }
        let mut ancestor = nav.clone();
        for (i, test) in self.tests.iter().rev().enumerate() {
            if i > 0 && !ancestor.move_to_parent() {
                return false;
            }
            if !test.matches(&ancestor, NodeKind::Element) {
                return false;
            }
        }
        true
    }

    fn advance(&mut self) -> Result<bool, Error> {
        loop {
            if let Some((mut nav, mut depth)) = self.walk.take() {
                if step(&mut nav, &mut depth) {
                    let hit = self.chain_matches(&nav, depth);
                    self.walk = Some((nav.clone(), depth));
                    if hit {
                        self.pos += 1;
                        self.current = Some(Item::Node(nav));
                        return Ok(true);
                    }
                }
                continue;
            }
            if !self.source.move_next()? {
                return Ok(false);
            }
            match self.source.current() {
                Some(Item::Node(n)) => {
                    self.walk = Some((n.clone(), 0));
                    self.pos = 0;
                }
                _ => return Err(Error::format(ErrorCode::XPTY0020, &[&"descendant-or-self"])),
            }
        }
    }
}

fn step<N: XPathNavigator>(nav: &mut N, depth: &mut usize) -> bool {
    if nav.move_to_first_child() {
        *depth += 1;
        return true;
    }
    while *depth > 0 {
        if nav.move_to_next() {
            return true;
        }
        nav.move_to_parent();
        *depth -= 1;
    }
    false
}

impl<N: XPathNavigator> SequenceCursor<N> for ChildOverDescendantsCursor<N> {
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
        self.walk = None;
        self.current = None;
        self.pos = 0;
        self.finished = false;
    }
    fn clone_instance(&self) -> BoxCursor<N> {
        Box::new(Self {
            tests: self.tests.clone(),
            source: self.source.clone_instance(),
            walk: self.walk.clone(),
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
