use std::fmt;

use tracing::trace;

use super::{ExecError, Stack, SymbolMap};

/// The (scope, stack) pair every instruction runs against.
pub struct Frame<E> {
    symbols: SymbolMap<E>,
    stack: Stack<E>,
}

impl<E> Clone for Frame<E> {
    fn clone(&self) -> Self {
        Self {
            symbols: self.symbols.clone(),
            stack: self.stack.clone(),
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for Frame<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame").field("stack", &self.stack).finish_non_exhaustive()
    }
}

/// The caller's top `depth` values as a callee's stack. Asking for more than the
/// caller holds is an underflow of the caller's stack.
fn callee_stack<E>(caller: &Stack<E>, depth: usize) -> Result<Stack<E>, ExecError> {
    caller.substack(depth).map_err(|_| ExecError::StackUnderflow)
}

impl<E> Frame<E> {
    pub fn new(symbols: SymbolMap<E>, stack: Stack<E>) -> Self {
        Self { symbols, stack }
    }

    /// Fresh top scope with an empty stack.
    pub fn top() -> Self {
        Self::from_symbols(SymbolMap::top())
    }

    pub fn from_symbols(symbols: SymbolMap<E>) -> Self {
        Self::new(symbols, Stack::new())
    }

    /// Child scope of `parent` with its own empty stack.
    pub fn local(parent: &SymbolMap<E>) -> Self {
        Self::from_symbols(SymbolMap::local(parent))
    }

    /// Child scope of the enclosing frame, seeing only the top `depth` values.
    pub fn local_with_substack(enclosing: &Frame<E>, depth: usize) -> Result<Self, ExecError> {
        trace!(depth, "local frame");
        Ok(Self::new(
            SymbolMap::local(&enclosing.symbols),
            callee_stack(&enclosing.stack, depth)?,
        ))
    }

    pub fn protection(parent: &SymbolMap<E>) -> Self {
        Self::from_symbols(SymbolMap::protection(parent))
    }

    pub fn protection_with_substack(
        enclosing: &Frame<E>,
        depth: usize,
    ) -> Result<Self, ExecError> {
        Ok(Self::new(
            SymbolMap::protection(&enclosing.symbols),
            callee_stack(&enclosing.stack, depth)?,
        ))
    }

    /// Child scope of the captured definition scope, operating on the caller's stack.
    pub fn closure(
        captured: &SymbolMap<E>,
        callsite: &Frame<E>,
        depth: usize,
    ) -> Result<Self, ExecError> {
        trace!(depth, "closure frame");
        Ok(Self::new(
            SymbolMap::local(captured),
            callee_stack(&callsite.stack, depth)?,
        ))
    }

    pub fn symbols(&self) -> &SymbolMap<E> {
        &self.symbols
    }

    pub fn stack(&self) -> &Stack<E> {
        &self.stack
    }
}

#[cfg(test)]
mod tests {
    use super::Frame;
    use crate::runtime::{ExecError, Stack, SymbolMap};
    use assert2::{check, let_assert};

    #[test]
    fn substack_frames_share_storage() {
        let caller = Frame::new(SymbolMap::top(), Stack::from(vec![1, 2, 3]));
        let_assert!(Ok(callee) = Frame::local_with_substack(&caller, 2));
        check!(callee.stack().to_vec() == vec![2, 3]);
        check!(callee.symbols().parent().is_some_and(|p| p.ptr_eq(caller.symbols())));

        let_assert!(Ok(v) = callee.stack().pop());
        callee.stack().push(v * 10);
        check!(caller.stack().to_vec() == vec![1, 2, 30]);
    }

    #[test]
    fn closure_frames_resolve_from_definition_scope() {
        let definition = SymbolMap::top();
        let_assert!(Ok(()) = definition.put_value("x", 1));
        let caller = Frame::new(SymbolMap::top(), Stack::from(vec![5]));
        let_assert!(Ok(()) = caller.symbols().put_value("x", 2));

        let_assert!(Ok(frame) = Frame::closure(&definition, &caller, 1));
        let_assert!(Ok(Some(x)) = frame.symbols().get("x"));
        check!(x.get() == Ok(1));
        check!(frame.stack().to_vec() == vec![5]);
    }

    #[test]
    fn protection_frames() {
        let caller = Frame::new(SymbolMap::top(), Stack::from(vec![1]));
        let_assert!(Ok(frame) = Frame::protection_with_substack(&caller, 1));
        check!(frame.symbols().put_value("a", 1) == Ok(()));
        check!(frame.symbols().put_value("a", 2) == Err(ExecError::AlreadyDefined { name: "a".into() }));
        check!(Frame::protection_with_substack(&caller, 2).err() == Some(ExecError::StackUnderflow));
    }
}
