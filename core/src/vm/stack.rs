use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use crate::val::{StackCell, Value};

/// Control words stored at the frame pointer: calling function, return
/// instruction index, caller frame pointer.
pub const STACK_FRAME_SIZE: usize = 3;

/// The value stack of one top-level invocation, shared by all of its frames.
///
/// Storage sits behind `Rc<RefCell<..>>` so closures created in a still
/// running frame can reach it through a `Weak`. Every method borrows only for
/// its own duration; no borrow is ever held across a call out of the VM.
#[derive(Debug, Clone)]
pub struct ExecStack {
    cells: Rc<StackCell>,
}

impl ExecStack {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: Rc::new(RefCell::new(Vec::with_capacity(capacity))),
        }
    }

    pub fn downgrade(&self) -> Weak<StackCell> {
        Rc::downgrade(&self.cells)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.borrow().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.borrow().is_empty()
    }

    #[inline]
    pub fn push(&self, value: Value) {
        self.cells.borrow_mut().push(value);
    }

    #[inline]
    pub fn pop(&self) -> Value {
        self.cells.borrow_mut().pop().unwrap_or_default()
    }

    /// Remove the top `n` values, bottom-most first.
    pub fn pop_n(&self, n: usize) -> Vec<Value> {
        let mut cells = self.cells.borrow_mut();
        let at = cells.len().saturating_sub(n);
        cells.split_off(at)
    }

    pub fn drop_n(&self, n: usize) {
        let mut cells = self.cells.borrow_mut();
        let at = cells.len().saturating_sub(n);
        cells.truncate(at);
    }

    /// Absolute index of the value `offset` positions from the top (-1 = top).
    #[inline]
    pub fn top_index(&self, offset: isize) -> usize {
        (self.len() as isize + offset).max(0) as usize
    }

    /// Copy of the value at `offset` from the top.
    pub fn peek(&self, offset: isize) -> Value {
        self.get(self.top_index(offset))
    }

    pub fn get(&self, idx: usize) -> Value {
        self.cells.borrow().get(idx).cloned().unwrap_or_default()
    }

    /// Replace the value at `idx`, returning the old one.
    pub fn set(&self, idx: usize, value: Value) -> Value {
        match self.cells.borrow_mut().get_mut(idx) {
            Some(slot) => std::mem::replace(slot, value),
            None => Value::Unknown,
        }
    }

    pub fn take(&self, idx: usize) -> Value {
        self.set(idx, Value::Unknown)
    }

    pub fn set_top(&self, offset: isize, value: Value) -> Value {
        self.set(self.top_index(offset), value)
    }

    /// Run `f` on the value at `offset` from the top in place.
    pub fn with_top<R>(&self, offset: isize, f: impl FnOnce(&mut Value) -> R) -> Option<R> {
        let idx = self.top_index(offset);
        self.cells.borrow_mut().get_mut(idx).map(f)
    }

    pub fn truncate(&self, len: usize) {
        self.cells.borrow_mut().truncate(len);
    }

    /// Insert `values` so they end up `below` positions under the top.
    pub fn insert_below(&self, below: usize, values: impl IntoIterator<Item = Value>) {
        let mut cells = self.cells.borrow_mut();
        let at = cells.len().saturating_sub(below);
        cells.splice(at..at, values);
    }

    pub fn with_slice_mut<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        f(&mut self.cells.borrow_mut())
    }

    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.cells.borrow_mut());
        drop(drained);
    }
}
