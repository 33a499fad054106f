use std::rc::Rc;

use crate::engine::atomic::PredicateTruth;
use crate::engine::context::CursorFocus;
use crate::engine::cursor::{BoxCursor, SequenceCursor};
use crate::engine::eval::execute;
use crate::engine::expr::{ExprId, ExprTree};
use crate::engine::pool::DataPool;
use crate::model::XPathNavigator;
use crate::runtime::Error;
use crate::xdm::Item;

/// Keeps the item at position `n` of each group.
///
/// With `per_context` off the input is one flat sequence and the cursor is
/// exhausted right after the match.
pub struct PositionFilterCursor<N> {
    input: BoxCursor<N>,
    n: usize,
    per_context: bool,
    last_input_pos: usize,
    group_done: bool,
    pos: usize,
    finished: bool,
}

impl<N> PositionFilterCursor<N> {
    pub fn new(input: BoxCursor<N>, n: usize, per_context: bool) -> Self {
        Self { input, n, per_context, last_input_pos: 0, group_done: false, pos: 0, finished: false }
    }
}

impl<N: Clone + 'static> PositionFilterCursor<N> {
    fn advance(&mut self) -> Result<bool, Error> {
        if self.group_done && !self.per_context {
            return Ok(false);
        }
        while self.input.move_next()? {
            let p = self.input.sequential_position();
            if p <= self.last_input_pos {
                self.group_done = false;
                self.pos = 0;
            }
            self.last_input_pos = p;
            if !self.group_done && p == self.n {
                self.group_done = true;
                self.pos = 1;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl<N: Clone + 'static> SequenceCursor<N> for PositionFilterCursor<N> {
    fn move_next(&mut self) -> Result<bool, Error> {
        if self.finished {
            return Ok(false);
        }
        match self.advance() {
            Ok(true) => Ok(true),
            other => {
                self.finished = true;
                other
            }
        }
    }
    fn current(&self) -> Option<&Item<N>> {
        if self.finished { None } else { self.input.current() }
    }
    fn reset(&mut self) {
        self.input.reset();
        self.last_input_pos = 0;
        self.group_done = false;
        self.pos = 0;
        self.finished = false;
    }
    fn clone_instance(&self) -> BoxCursor<N> {
        Box::new(Self {
            input: self.input.clone_instance(),
            n: self.n,
            per_context: self.per_context,
            last_input_pos: self.last_input_pos,
            group_done: self.group_done,
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

/// Keeps the items for which a predicate expression holds.
///
/// The predicate sees the input item as context with its position in the
/// group; `last()` is counted on a clone of the input only when asked for.
/// A predicate that does not depend on the focus is evaluated once.
pub struct PredicateCursor<N> {
    tree: Rc<ExprTree<N>>,
    predicate: ExprId,
    context_sensitive: bool,
    input: BoxCursor<N>,
    pool: DataPool<N>,
    invariant: Option<PredicateTruth>,
    last_input_pos: usize,
    group_last: Option<usize>,
    pos: usize,
    finished: bool,
}

impl<N: XPathNavigator> PredicateCursor<N> {
    pub fn new(tree: Rc<ExprTree<N>>, predicate: ExprId, input: BoxCursor<N>, pool: DataPool<N>) -> Self {
        let context_sensitive = tree.is_context_sensitive(predicate);
        Self {
            tree,
            predicate,
            context_sensitive,
            input,
            pool,
            invariant: None,
            last_input_pos: 0,
            group_last: None,
            pos: 0,
            finished: false,
        }
    }

    fn test_current(&mut self, position: usize) -> Result<bool, Error> {
        if let Some(truth) = &self.invariant {
            return Ok(truth.accepts(position));
        }
        let focus = CursorFocus::new(self.input.as_ref(), self.group_last);
        let value = execute(&self.tree, self.predicate, &focus, &self.pool)?;
        let truth = PredicateTruth::from_value(value)?;
        self.group_last = focus.computed_last();
        let keep = truth.accepts(position);
        if !self.context_sensitive {
            self.invariant = Some(truth);
        }
        Ok(keep)
    }

    fn advance(&mut self) -> Result<bool, Error> {
        while self.input.move_next()? {
            let p = self.input.sequential_position();
            if p <= self.last_input_pos {
                self.pos = 0;
                self.group_last = None;
            }
            self.last_input_pos = p;
            if self.test_current(p)? {
                self.pos += 1;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl<N: XPathNavigator> SequenceCursor<N> for PredicateCursor<N> {
    fn move_next(&mut self) -> Result<bool, Error> {
        if self.finished {
            return Ok(false);
        }
        match self.advance() {
            Ok(true) => Ok(true),
            other => {
                self.finished = true;
                other
            }
        }
    }
    fn current(&self) -> Option<&Item<N>> {
        if self.finished { None } else { self.input.current() }
    }
    fn reset(&mut self) {
        self.input.reset();
        self.invariant = None;
        self.last_input_pos = 0;
        self.group_last = None;
        self.pos = 0;
        self.finished = false;
    }
    fn clone_instance(&self) -> BoxCursor<N> {
        Box::new(Self {
            tree: self.tree.clone(),
            predicate: self.predicate,
            context_sensitive: self.context_sensitive,
            input: self.input.clone_instance(),
            pool: self.pool.fork(),
            invariant: self.invariant.clone(),
            last_input_pos: self.last_input_pos,
            group_last: self.group_last,
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
