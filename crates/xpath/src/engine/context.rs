use core::cell::Cell;

use crate::engine::cursor::SequenceCursor;
use crate::runtime::{Error, ErrorCode};
use crate::xdm::Item;

/// Focus seen by an expression: context item, position and size.
pub trait ContextProvider<N> {
    fn context_item(&self) -> Option<&Item<N>>;
    fn position(&self) -> usize;
    fn last(&self) -> Result<usize, Error>;
}

fn undefined_focus() -> Error {
    Error::format(ErrorCode::XPDY0002, &[&"context item"])
}

/// Owned focus snapshot. Lazily executed bodies capture one of these so they
/// do not borrow the caller's provider.
#[derive(Debug, Clone)]
pub struct Focus<N> {
    item: Option<Item<N>>,
    position: usize,
    last: Result<usize, Error>,
}

impl<N: Clone> Focus<N> {
    /// Focus of a top-level evaluation: a singleton sequence.
    pub fn new(item: Option<Item<N>>) -> Self {
        let size = usize::from(item.is_some());
        Self { item, position: size, last: Ok(size) }
    }

    pub fn with_position(item: Item<N>, position: usize, last: usize) -> Self {
        Self { item: Some(item), position, last: Ok(last) }
    }

    /// Copy the provider's focus. `last` is only computed when `need_last`;
    /// a failure to compute it is kept and reported when it is requested.
    pub fn snapshot(provider: &dyn ContextProvider<N>, need_last: bool) -> Self {
        Self {
            item: provider.context_item().cloned(),
            position: provider.position(),
            last: if need_last { provider.last() } else { Err(undefined_focus()) },
        }
    }
}

impl<N> ContextProvider<N> for Focus<N> {
    fn context_item(&self) -> Option<&Item<N>> {
        self.item.as_ref()
    }
    fn position(&self) -> usize {
        self.position
    }
    fn last(&self) -> Result<usize, Error> {
        self.last.clone()
    }
}

/// Focus over the current item of a cursor. `last` is computed on demand by
/// counting a clone of the cursor to the end of the current group.
pub struct CursorFocus<'a, N> {
    input: &'a dyn SequenceCursor<N>,
    last: Cell<Option<usize>>,
}

impl<'a, N> CursorFocus<'a, N> {
    pub fn new(input: &'a dyn SequenceCursor<N>, known_last: Option<usize>) -> Self {
        Self { input, last: Cell::new(known_last) }
    }

    /// Group size if it was computed during this focus' lifetime.
    pub fn computed_last(&self) -> Option<usize> {
        self.last.get()
    }
}

impl<N> ContextProvider<N> for CursorFocus<'_, N> {
    fn context_item(&self) -> Option<&Item<N>> {
        self.input.current()
    }
    fn position(&self) -> usize {
        self.input.sequential_position()
    }
    fn last(&self) -> Result<usize, Error> {
        if let Some(l) = self.last.get() {
            return Ok(l);
        }
        let l = count_group(self.input)?;
        self.last.set(Some(l));
        Ok(l)
    }
}

/// Size of the group the cursor is currently positioned in.
pub fn count_group<N>(input: &dyn SequenceCursor<N>) -> Result<usize, Error> {
    let mut ahead = input.clone_instance();
    let mut last = ahead.sequential_position();
    while ahead.move_next()? {
        let p = ahead.sequential_position();
        if p <= last {
            break;
        }
        last = p;
    }
    Ok(last)
}
