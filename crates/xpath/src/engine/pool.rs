use core::cell::RefCell;
use core::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::runtime::{Error, ErrorCode};
use crate::xdm::{ExpandedName, Item, XPathResultType};

type Slot<N> = Option<Rc<[Item<N>]>>;

/// Per-evaluation variable storage.
///
/// Slots are assigned at bind time; external variables occupy the lowest
/// indices. Cloning the handle shares the storage, `fork` copies it.
pub struct DataPool<N> {
    slots: Rc<RefCell<Vec<Slot<N>>>>,
}

impl<N> Clone for DataPool<N> {
    fn clone(&self) -> Self {
        Self { slots: self.slots.clone() }
    }
}

impl<N> fmt::Debug for DataPool<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.borrow();
        f.debug_struct("DataPool")
            .field("slots", &slots.len())
            .field("set", &slots.iter().filter(|s| s.is_some()).count())
            .finish()
    }
}

impl<N> DataPool<N> {
    pub fn new(size: usize) -> Self {
        Self { slots: Rc::new(RefCell::new(vec![None; size])) }
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, slot: usize) -> Option<Rc<[Item<N>]>> {
        self.slots.borrow().get(slot).cloned().flatten()
    }

    pub fn set(&self, slot: usize, value: Rc<[Item<N>]>) {
        let mut slots = self.slots.borrow_mut();
        if slot >= slots.len() {
            slots.resize(slot + 1, None);
        }
        slots[slot] = Some(value);
    }

    /// Independent copy of the current slot values.
    pub fn fork(&self) -> Self {
        let slots = self.slots.borrow().clone();
        trace!(slots = slots.len(), "forking data pool");
        Self { slots: Rc::new(RefCell::new(slots)) }
    }

    pub fn same_storage(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.slots, &other.slots)
    }
}

/// A variable resolved to its pool slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: ExpandedName,
    pub slot: usize,
    pub item_type: XPathResultType,
}

impl Binding {
    pub fn get<N>(&self, pool: &DataPool<N>) -> Result<Rc<[Item<N>]>, Error> {
        pool.get(self.slot).ok_or_else(|| Error::format(ErrorCode::XPDY0002, &[&format!("${}", self.name)]))
    }

    pub fn set<N>(&self, pool: &DataPool<N>, value: Rc<[Item<N>]>) {
        pool.set(self.slot, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xdm::AtomicValue;

    #[test]
    fn fork_is_independent() {
        let pool = DataPool::<()>::new(2);
        let b = Binding { name: ExpandedName::local("x"), slot: 1, item_type: XPathResultType::Number };
        b.set(&pool, Rc::from(vec![Item::Atomic(AtomicValue::Integer(1))]));
        let fork = pool.fork();
        b.set(&fork, Rc::from(vec![Item::Atomic(AtomicValue::Integer(2))]));
        assert_eq!(b.get(&pool).unwrap()[0], Item::Atomic(AtomicValue::Integer(1)));
        assert_eq!(b.get(&fork).unwrap()[0], Item::Atomic(AtomicValue::Integer(2)));
        assert!(!pool.same_storage(&fork));
        assert!(pool.same_storage(&pool.clone()));
        assert_eq!(format!("{fork:?}"), "DataPool { slots: 2, set: 1 }");
    }

    #[test]
    fn unset_slot_is_undefined() {
        let pool = DataPool::<()>::new(1);
        let b = Binding { name: ExpandedName::local("v"), slot: 0, item_type: XPathResultType::Any };
        let err = b.get(&pool).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPDY0002);
    }
}
