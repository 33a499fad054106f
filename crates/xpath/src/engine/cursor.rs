//! Pull cursors: the contract every sequence producer implements, plus the
//! leaf and composite cursors that do not evaluate sub-expressions.

use core::cell::RefCell;
use std::rc::Rc;

use crate::runtime::{Error, ErrorCode};
use crate::xdm::{AtomicValue, Item, Sequence};

pub type BoxCursor<N> = Box<dyn SequenceCursor<N>>;

/// Stateful forward iterator over items.
///
/// `sequential_position` is the 1-based position of the current item inside
/// its *group*. Axis cursors open a new group for every source item; flat
/// cursors form a single group. Consumers detect a new group when the
/// position does not increase.
pub trait SequenceCursor<N> {
    fn move_next(&mut self) -> Result<bool, Error>;
    fn current(&self) -> Option<&Item<N>>;
    /// Rewind to the state right after construction.
    fn reset(&mut self);
    /// Independent copy that continues from the same point.
    fn clone_instance(&self) -> BoxCursor<N>;
    fn is_finished(&self) -> bool;
    fn sequential_position(&self) -> usize;
    fn reset_sequential_position(&mut self);
}

/// Result of executing an expression node.
pub enum Value<N> {
    Item(Item<N>),
    Cursor(BoxCursor<N>),
}

impl<N: Clone + 'static> Value<N> {
    pub fn empty() -> Self {
        Value::Cursor(Box::new(EmptyCursor))
    }

    pub fn atomic(a: AtomicValue) -> Self {
        Value::Item(Item::Atomic(a))
    }

    pub fn boolean(b: bool) -> Self {
        Value::atomic(AtomicValue::Boolean(b))
    }

    pub fn from_items(items: impl Into<Rc<[Item<N>]>>) -> Self {
        Value::Cursor(Box::new(ItemsCursor::new(items.into())))
    }

    pub fn into_cursor(self) -> BoxCursor<N> {
        match self {
            Value::Item(it) => Box::new(ItemsCursor::new(Rc::from(vec![it]))),
            Value::Cursor(c) => c,
        }
    }

    /// Drain into a materialized sequence.
    pub fn into_sequence(self) -> Result<Sequence<N>, Error> {
        match self {
            Value::Item(it) => Ok(vec![it]),
            Value::Cursor(mut c) => drain(c.as_mut()),
        }
    }

    /// Pull at most `limit` items. Used where only the head of a sequence
    /// decides the outcome (effective boolean value, singleton checks).
    pub fn take(self, limit: usize) -> Result<Sequence<N>, Error> {
        match self {
            Value::Item(it) => Ok(vec![it]),
            Value::Cursor(mut c) => {
                let mut out = Vec::with_capacity(limit);
                while out.len() < limit && c.move_next()? {
                    if let Some(it) = c.current() {
                        out.push(it.clone());
                    }
                }
                Ok(out)
            }
        }
    }
}

pub(crate) fn drain<N: Clone>(c: &mut dyn SequenceCursor<N>) -> Result<Sequence<N>, Error> {
    let mut out = Vec::new();
    while c.move_next()? {
        if let Some(it) = c.current() {
            out.push(it.clone());
        }
    }
    Ok(out)
}

pub struct EmptyCursor;

impl<N: 'static> SequenceCursor<N> for EmptyCursor {
    fn move_next(&mut self) -> Result<bool, Error> {
        Ok(false)
    }
    fn current(&self) -> Option<&Item<N>> {
        None
    }
    fn reset(&mut self) {}
    fn clone_instance(&self) -> BoxCursor<N> {
        Box::new(EmptyCursor)
    }
    fn is_finished(&self) -> bool {
        true
    }
    fn sequential_position(&self) -> usize {
        0
    }
    fn reset_sequential_position(&mut self) {}
}

/// Cursor over an already materialized sequence (variable values, literals).
pub struct ItemsCursor<N> {
    items: Rc<[Item<N>]>,
    idx: usize,
    pos: usize,
}

impl<N> ItemsCursor<N> {
    pub fn new(items: Rc<[Item<N>]>) -> Self {
        Self { items, idx: 0, pos: 0 }
    }
}

impl<N: Clone + 'static> SequenceCursor<N> for ItemsCursor<N> {
    fn move_next(&mut self) -> Result<bool, Error> {
        if self.idx >= self.items.len() {
            self.idx = self.items.len() + 1;
            return Ok(false);
        }
        self.idx += 1;
        self.pos += 1;
        Ok(true)
    }
    fn current(&self) -> Option<&Item<N>> {
        self.idx.checked_sub(1).and_then(|i| self.items.get(i))
    }
    fn reset(&mut self) {
        self.idx = 0;
        self.pos = 0;
    }
    fn clone_instance(&self) -> BoxCursor<N> {
        Box::new(Self { items: self.items.clone(), idx: self.idx, pos: self.pos })
    }
    fn is_finished(&self) -> bool {
        self.idx > self.items.len()
    }
    fn sequential_position(&self) -> usize {
        self.pos
    }
    fn reset_sequential_position(&mut self) {
        self.pos = 0;
    }
}

/// Integer range `from to to`, produced on demand.
pub struct RangeCursor<N> {
    from: i64,
    to: i64,
    next: Option<i64>,
    current: Option<Item<N>>,
    pos: usize,
}

impl<N> RangeCursor<N> {
    pub fn new(from: i64, to: i64) -> Self {
        Self { from, to, next: (from <= to).then_some(from), current: None, pos: 0 }
    }
}

impl<N: Clone + 'static> SequenceCursor<N> for RangeCursor<N> {
    fn move_next(&mut self) -> Result<bool, Error> {
        match self.next {
            Some(v) => {
                self.current = Some(Item::Atomic(AtomicValue::Integer(v)));
                self.next = if v < self.to { Some(v + 1) } else { None };
                self.pos += 1;
                Ok(true)
            }
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }
    fn current(&self) -> Option<&Item<N>> {
        self.current.as_ref()
    }
    fn reset(&mut self) {
        self.next = (self.from <= self.to).then_some(self.from);
        self.current = None;
        self.pos = 0;
    }
    fn clone_instance(&self) -> BoxCursor<N> {
        Box::new(Self { from: self.from, to: self.to, next: self.next, current: self.current.clone(), pos: self.pos })
    }
    fn is_finished(&self) -> bool {
        self.next.is_none() && self.current.is_none()
    }
    fn sequential_position(&self) -> usize {
        self.pos
    }
    fn reset_sequential_position(&mut self) {
        self.pos = 0;
    }
}

struct BufferState<N> {
    source: Option<BoxCursor<N>>,
    items: Vec<Item<N>>,
    error: Option<Error>,
}

/// Materializes its source lazily into a cache shared by all clones, so a
/// sequence that is iterated several times is computed once.
pub struct BufferedCursor<N> {
    state: Rc<RefCell<BufferState<N>>>,
    idx: usize,
    current: Option<Item<N>>,
    pos: usize,
    finished: bool,
}

impl<N: Clone + 'static> BufferedCursor<N> {
    pub fn new(source: BoxCursor<N>) -> Self {
        Self::with_state(BufferState { source: Some(source), items: Vec::new(), error: None })
    }

    pub fn from_items(items: Vec<Item<N>>) -> Self {
        Self::with_state(BufferState { source: None, items, error: None })
    }

    fn with_state(state: BufferState<N>) -> Self {
        Self { state: Rc::new(RefCell::new(state)), idx: 0, current: None, pos: 0, finished: false }
    }

    fn fetch(&self, idx: usize) -> Result<Option<Item<N>>, Error> {
        let mut st = self.state.borrow_mut();
        while st.items.len() <= idx {
            if let Some(err) = &st.error {
                return Err(err.clone());
            }
            let Some(src) = st.source.as_mut() else {
                return Ok(None);
            };
            match src.move_next() {
                Ok(true) => {
                    if let Some(it) = src.current().cloned() {
                        st.items.push(it);
                    }
                }
                Ok(false) => st.source = None,
                Err(e) => {
                    st.source = None;
                    st.error = Some(e.clone());
                    return Err(e);
                }
            }
        }
        Ok(st.items.get(idx).cloned())
    }
}

impl<N: Clone + 'static> SequenceCursor<N> for BufferedCursor<N> {
    fn move_next(&mut self) -> Result<bool, Error> {
        if self.finished {
            return Ok(false);
        }
        match self.fetch(self.idx) {
            Ok(Some(it)) => {
                self.idx += 1;
                self.pos += 1;
                self.current = Some(it);
                Ok(true)
            }
            Ok(None) => {
                self.finished = true;
                self.current = None;
                Ok(false)
            }
            Err(e) => {
                self.finished = true;
                self.current = None;
                Err(e)
            }
        }
    }
    fn current(&self) -> Option<&Item<N>> {
        self.current.as_ref()
    }
    fn reset(&mut self) {
        self.idx = 0;
        self.pos = 0;
        self.current = None;
        self.finished = false;
    }
    fn clone_instance(&self) -> BoxCursor<N> {
        Box::new(Self {
            state: self.state.clone(),
            idx: self.idx,
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

/// Concatenation of cursors, numbered as one flat group.
pub struct FlattenCursor<N> {
    parts: Vec<BoxCursor<N>>,
    idx: usize,
    pos: usize,
    finished: bool,
}

impl<N: Clone + 'static> FlattenCursor<N> {
    pub fn new(parts: Vec<BoxCursor<N>>) -> Self {
        Self { parts, idx: 0, pos: 0, finished: false }
    }

    /// Renumber a grouped cursor as one flat sequence.
    pub fn single(part: BoxCursor<N>) -> Self {
        Self::new(vec![part])
    }
}

impl<N: Clone + 'static> SequenceCursor<N> for FlattenCursor<N> {
    fn move_next(&mut self) -> Result<bool, Error> {
        while !self.finished {
            let Some(part) = self.parts.get_mut(self.idx) else {
                self.finished = true;
                break;
            };
            match part.move_next() {
                Ok(true) => {
                    self.pos += 1;
                    return Ok(true);
                }
                Ok(false) => self.idx += 1,
                Err(e) => {
                    self.finished = true;
                    return Err(e);
                }
            }
        }
        Ok(false)
    }
    fn current(&self) -> Option<&Item<N>> {
        if self.finished {
            return None;
        }
        self.parts.get(self.idx).and_then(|p| p.current())
    }
    fn reset(&mut self) {
        for p in &mut self.parts {
            p.reset();
        }
        self.idx = 0;
        self.pos = 0;
        self.finished = false;
    }
    fn clone_instance(&self) -> BoxCursor<N> {
        Box::new(Self {
            parts: self.parts.iter().map(|p| p.clone_instance()).collect(),
            idx: self.idx,
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

/// Passes nodes through and rejects atomic values with XPTY0019. Guards the
/// input of a path step that navigates from its context.
pub struct NodeCheckCursor<N> {
    input: BoxCursor<N>,
    finished: bool,
}

impl<N> NodeCheckCursor<N> {
    pub fn new(input: BoxCursor<N>) -> Self {
        Self { input, finished: false }
    }
}

impl<N: Clone + 'static> SequenceCursor<N> for NodeCheckCursor<N> {
    fn move_next(&mut self) -> Result<bool, Error> {
        if self.finished {
            return Ok(false);
        }
        let more = match self.input.move_next() {
            Ok(m) => m,
            Err(e) => {
                self.finished = true;
                return Err(e);
            }
        };
        if !more {
            self.finished = true;
            return Ok(false);
        }
        if let Some(Item::Atomic(a)) = self.input.current() {
            self.finished = true;
            return Err(Error::format(ErrorCode::XPTY0019, &[&a.type_name()]));
        }
        Ok(true)
    }
    fn current(&self) -> Option<&Item<N>> {
        if self.finished { None } else { self.input.current() }
    }
    fn reset(&mut self) {
        self.input.reset();
        self.finished = false;
    }
    fn clone_instance(&self) -> BoxCursor<N> {
        Box::new(Self { input: self.input.clone_instance(), finished: self.finished })
    }
    fn is_finished(&self) -> bool {
        self.finished
    }
    fn sequential_position(&self) -> usize {
        self.input.sequential_position()
    }
    fn reset_sequential_position(&mut self) {
        self.input.reset_sequential_position();
    }
}
