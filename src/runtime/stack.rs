use std::{cell::RefCell, fmt, rc::Rc};

use super::ExecError;

/// Operand stack.
///
/// A substack is a view sharing its parent's storage, with a floor below which it can
/// neither see nor pop. Everything pushed onto a substack is visible to the parent
/// once the callee returns.
pub struct Stack<E> {
    values: Rc<RefCell<Vec<E>>>,
    floor: usize,
}

impl<E> Clone for Stack<E> {
    fn clone(&self) -> Self {
        Self {
            values: Rc::clone(&self.values),
            floor: self.floor,
        }
    }
}

impl<E> Default for Stack<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> From<Vec<E>> for Stack<E> {
    fn from(values: Vec<E>) -> Self {
        Self {
            values: Rc::new(RefCell::new(values)),
            floor: 0,
        }
    }
}

impl<E> Stack<E> {
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.values.borrow().len().saturating_sub(self.floor)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&self, value: E) {
        self.values.borrow_mut().push(value);
    }

    pub fn pop(&self) -> Result<E, ExecError> {
        if self.is_empty() {
            return Err(ExecError::StackUnderflow);
        }
        self.values.borrow_mut().pop().ok_or(ExecError::StackUnderflow)
    }

    /// Pops `count` values, returned in the order they were pushed.
    pub fn pop_n(&self, count: usize) -> Result<Vec<E>, ExecError> {
        if count > self.len() {
            return Err(ExecError::StackUnderflow);
        }
        let mut values = self.values.borrow_mut();
        let at = values.len() - count;
        Ok(values.split_off(at))
    }

    /// View of the top `depth` values.
    pub fn substack(&self, depth: usize) -> Result<Stack<E>, ExecError> {
        let available = self.len();
        if depth > available {
            return Err(ExecError::SubstackTooDeep {
                requested: depth,
                available,
            });
        }
        Ok(Self {
            values: Rc::clone(&self.values),
            floor: self.values.borrow().len() - depth,
        })
    }

    pub fn check_size_is_exactly(&self, expected: usize) -> Result<(), ExecError> {
        match self.len() {
            actual if actual == expected => Ok(()),
            actual => Err(ExecError::StackSize { expected, actual }),
        }
    }

    pub fn check_is_empty(&self) -> Result<(), ExecError> {
        self.check_size_is_exactly(0)
    }

    pub fn clear(&self) {
        self.values.borrow_mut().truncate(self.floor);
    }

    /// Removes and returns every visible value, bottom first.
    pub fn drain(&self) -> Vec<E> {
        let mut values = self.values.borrow_mut();
        let floor = self.floor.min(values.len());
        values.split_off(floor)
    }
}

impl<E: Clone> Stack<E> {
    /// Value `depth` places below the top.
    pub fn peek(&self, depth: usize) -> Result<E, ExecError> {
        let values = self.values.borrow();
        if depth >= values.len().saturating_sub(self.floor) {
            return Err(ExecError::StackUnderflow);
        }
        Ok(values[values.len() - 1 - depth].clone())
    }

    /// Visible values, bottom first.
    pub fn to_vec(&self) -> Vec<E> {
        let values = self.values.borrow();
        values[self.floor.min(values.len())..].to_vec()
    }
}

impl<E: fmt::Debug> fmt::Debug for Stack<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.values.borrow();
        f.debug_list()
            .entries(&values[self.floor.min(values.len())..])
            .finish()
    }
}
