//! Cursors that execute a sub-expression once per source item.
//!
//! Both keep the inner cursor of the current source item in flight. Cloning
//! forks the data pool and rebuilds the inner cursor by executing the
//! sub-expression again and skipping what was already consumed, so the clone
//! never observes slot writes of the original. A failure during that replay
//! is reported by the clone's first `move_next`.

use std::rc::Rc;

use crate::engine::context::{CursorFocus, Focus};
use crate::engine::cursor::{BoxCursor, SequenceCursor, Value};
use crate::engine::eval::execute;
use crate::engine::expr::{ExprId, ExprTree};
use crate::engine::pool::{Binding, DataPool};
use crate::model::XPathNavigator;
use crate::runtime::Error;
use crate::xdm::Item;

fn replay<N: Clone + 'static>(value: Result<Value<N>, Error>, consumed: usize) -> Result<BoxCursor<N>, Error> {
    let mut cursor = value?.into_cursor();
    for _ in 0..consumed {
        if !cursor.move_next()? {
            break;
        }
    }
    Ok(cursor)
}

/// `for $v in source return body`: binds each source item to the variable's
/// slot and streams the body's result.
pub struct ForCursor<N> {
    tree: Rc<ExprTree<N>>,
    body: ExprId,
    binding: Binding,
    source: BoxCursor<N>,
    focus: Focus<N>,
    pool: DataPool<N>,
    inner: Option<BoxCursor<N>>,
    consumed: usize,
    pending: Option<Error>,
    pos: usize,
    finished: bool,
}

impl<N: XPathNavigator> ForCursor<N> {
    pub fn new(
        tree: Rc<ExprTree<N>>,
        body: ExprId,
        binding: Binding,
        source: BoxCursor<N>,
        focus: Focus<N>,
        pool: DataPool<N>,
    ) -> Self {
        Self {
            tree,
            body,
            binding,
            source,
            focus,
            pool,
            inner: None,
            consumed: 0,
            pending: None,
            pos: 0,
            finished: false,
        }
    }

    fn advance(&mut self) -> Result<bool, Error> {
        if let Some(e) = self.pending.take() {
            return Err(e);
        }
        loop {
            if let Some(inner) = self.inner.as_mut() {
                if inner.move_next()? {
                    self.consumed += 1;
                    self.pos += 1;
                    return Ok(true);
                }
                self.inner = None;
            }
            if !self.source.move_next()? {
                return Ok(false);
            }
            let Some(item) = self.source.current().cloned() else {
                continue;
            };
            self.binding.set(&self.pool, Rc::from(vec![item]));
            self.inner = Some(execute(&self.tree, self.body, &self.focus, &self.pool)?.into_cursor());
            self.consumed = 0;
        }
    }
}

impl<N: XPathNavigator> SequenceCursor<N> for ForCursor<N> {
    fn move_next(&mut self) -> Result<bool, Error> {
        if self.finished {
            return Ok(false);
        }
        match self.advance() {
            Ok(true) => Ok(true),
            other => {
                self.finished = true;
                self.inner = None;
                other
            }
        }
    }
    fn current(&self) -> Option<&Item<N>> {
        self.inner.as_ref().and_then(|c| c.current())
    }
    fn reset(&mut self) {
        self.source.reset();
        self.inner = None;
        self.consumed = 0;
        self.pending = None;
        self.pos = 0;
        self.finished = false;
    }
    fn clone_instance(&self) -> BoxCursor<N> {
        let pool = self.pool.fork();
        let source = self.source.clone_instance();
        let mut pending = self.pending.clone();
        let inner = match (&self.inner, source.current()) {
            (Some(_), Some(item)) => {
                self.binding.set(&pool, Rc::from(vec![item.clone()]));
                match replay(execute(&self.tree, self.body, &self.focus, &pool), self.consumed) {
                    Ok(c) => Some(c),
                    Err(e) => {
                        pending = Some(e);
                        None
                    }
                }
            }
            _ => None,
        };
        Box::new(Self {
            tree: self.tree.clone(),
            body: self.body,
            binding: self.binding.clone(),
            source,
            focus: self.focus.clone(),
            pool,
            inner,
            consumed: self.consumed,
            pending,
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

/// Path step whose right-hand side is a general expression (`a/f(.)`,
/// `a/(b | c)`). The expression runs once per source node with that node as
/// focus; each run forms one group.
pub struct ExprStepCursor<N> {
    tree: Rc<ExprTree<N>>,
    expr: ExprId,
    source: BoxCursor<N>,
    pool: DataPool<N>,
    inner: Option<BoxCursor<N>>,
    consumed: usize,
    pending: Option<Error>,
    pos: usize,
    finished: bool,
}

impl<N: XPathNavigator> ExprStepCursor<N> {
    pub fn new(tree: Rc<ExprTree<N>>, expr: ExprId, source: BoxCursor<N>, pool: DataPool<N>) -> Self {
        Self { tree, expr, source, pool, inner: None, consumed: 0, pending: None, pos: 0, finished: false }
    }

    fn advance(&mut self) -> Result<bool, Error> {
        if let Some(e) = self.pending.take() {
            return Err(e);
        }
        loop {
            if let Some(inner) = self.inner.as_mut() {
                if inner.move_next()? {
                    self.consumed += 1;
                    self.pos += 1;
                    return Ok(true);
                }
                self.inner = None;
            }
            if !self.source.move_next()? {
                return Ok(false);
            }
            let focus = CursorFocus::new(self.source.as_ref(), None);
            let value = execute(&self.tree, self.expr, &focus, &self.pool)?;
            self.inner = Some(value.into_cursor());
            self.consumed = 0;
            self.pos = 0;
        }
    }
}

impl<N: XPathNavigator> SequenceCursor<N> for ExprStepCursor<N> {
    fn move_next(&mut self) -> Result<bool, Error> {
        if self.finished {
            return Ok(false);
        }
        match self.advance() {
            Ok(true) => Ok(true),
            other => {
                self.finished = true;
                self.inner = None;
                other
            }
        }
    }
    fn current(&self) -> Option<&Item<N>> {
        self.inner.as_ref().and_then(|c| c.current())
    }
    fn reset(&mut self) {
        self.source.reset();
        self.inner = None;
        self.consumed = 0;
        self.pending = None;
        self.pos = 0;
        self.finished = false;
    }
    fn clone_instance(&self) -> BoxCursor<N> {
        let pool = self.pool.fork();
        let source = self.source.clone_instance();
        let mut pending = self.pending.clone();
        let inner = if self.inner.is_some() {
            let focus = CursorFocus::new(source.as_ref(), None);
            match replay(execute(&self.tree, self.expr, &focus, &pool), self.consumed) {
                Ok(c) => Some(c),
                Err(e) => {
                    pending = Some(e);
                    None
                }
            }
        } else {
            None
        };
        Box::new(Self {
            tree: self.tree.clone(),
            expr: self.expr,
            source,
            pool,
            inner,
            consumed: self.consumed,
            pending,
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
