use core::cmp::Ordering;
use std::rc::Rc;

use tracing::trace;

use crate::engine::cursor::{BoxCursor, SequenceCursor};
use crate::model::{NodeOrder, XPathNavigator};
use crate::runtime::{Error, ErrorCode};
use crate::xdm::Item;

/// Sort nodes into document order, optionally dropping adjacent duplicates.
/// Positions without a common order compare as equal and keep their
/// relative order.
pub fn sort_document_order<N: XPathNavigator>(nodes: &mut Vec<N>, dedup: bool) {
    nodes.sort_by(|a, b| match a.compare_position(b) {
        NodeOrder::Before => Ordering::Less,
        NodeOrder::After => Ordering::Greater,
        NodeOrder::Same | NodeOrder::Unknown => Ordering::Equal,
    });
    if dedup {
        nodes.dedup_by(|a, b| a.is_same_position(b));
    }
}

/// Drain a sequence and re-deliver it in document order.
///
/// The input must be homogeneous: only nodes (sorted and optionally
/// deduplicated) or only atomic values (passed through in input order).
pub struct DocumentOrderCursor<N> {
    input: Option<BoxCursor<N>>,
    items: Rc<[Item<N>]>,
    dedup: bool,
    idx: usize,
    base: usize,
    finished: bool,
}

impl<N: XPathNavigator> DocumentOrderCursor<N> {
    pub fn new(input: BoxCursor<N>, dedup: bool) -> Self {
        Self { input: Some(input), items: Rc::from(Vec::new()), dedup, idx: 0, base: 0, finished: false }
    }

    fn materialize(&mut self, mut input: BoxCursor<N>) -> Result<(), Error> {
        let mut nodes = Vec::new();
        let mut atomics = Vec::new();
        while input.move_next()? {
            match input.current() {
                Some(Item::Node(n)) => nodes.push(n.clone()),
                Some(it @ Item::Atomic(_)) => atomics.push(it.clone()),
                None => {}
            }
            if !nodes.is_empty() && !atomics.is_empty() {
                return Err(Error::format(ErrorCode::XPTY0018, &[]));
            }
        }
        if atomics.is_empty() {
            let before = nodes.len();
            sort_document_order(&mut nodes, self.dedup);
            trace!(buffered = before, delivered = nodes.len(), "document order materialized");
            self.items = nodes.into_iter().map(Item::Node).collect();
        } else {
            self.items = atomics.into();
        }
        Ok(())
    }
}

impl<N: XPathNavigator> SequenceCursor<N> for DocumentOrderCursor<N> {
    fn move_next(&mut self) -> Result<bool, Error> {
        if self.finished {
            return Ok(false);
        }
        if let Some(input) = self.input.take()
            && let Err(e) = self.materialize(input)
        {
            self.finished = true;
            return Err(e);
        }
        if self.idx < self.items.len() {
            self.idx += 1;
            Ok(true)
        } else {
            self.finished = true;
            Ok(false)
        }
    }
    fn current(&self) -> Option<&Item<N>> {
        if self.finished {
            return None;
        }
        self.idx.checked_sub(1).and_then(|i| self.items.get(i))
    }
    fn reset(&mut self) {
        if let Some(input) = self.input.as_mut() {
            input.reset();
        }
        self.idx = 0;
        self.base = 0;
        self.finished = false;
    }
    fn clone_instance(&self) -> BoxCursor<N> {
        Box::new(Self {
            input: self.input.as_ref().map(|c| c.clone_instance()),
            items: self.items.clone(),
            dedup: self.dedup,
            idx: self.idx,
            base: self.base,
            finished: self.finished,
        })
    }
    fn is_finished(&self) -> bool {
        self.finished
    }
    fn sequential_position(&self) -> usize {
        self.idx - self.base
    }
    fn reset_sequential_position(&mut self) {
        self.base = self.idx;
    }
}
