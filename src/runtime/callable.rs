//! Functions callable from programs, plus the generic stack helpers every back-end
//! registers.

use std::rc::Rc;

use super::{ExecError, ExecutionError, Frame};

pub trait Callable<E> {
    /// `args` and `returns` are the counts requested at the call site, if any.
    fn call(&self, frame: &Frame<E>, args: Option<usize>, returns: Option<usize>)
        -> Result<(), ExecError>;
}

impl<E, F> Callable<E> for F
where
    F: Fn(&Frame<E>, Option<usize>, Option<usize>) -> Result<(), ExecError>,
{
    fn call(
        &self,
        frame: &Frame<E>,
        args: Option<usize>,
        returns: Option<usize>,
    ) -> Result<(), ExecError> {
        self(frame, args, returns)
    }
}

pub fn expect_args(args: Option<usize>, expected: usize) -> Result<(), ExecError> {
    match args {
        Some(actual) if actual != expected => Err(ExecError::ArgumentCount { expected, actual }),
        _ => Ok(()),
    }
}

pub fn expect_returns(returns: Option<usize>, expected: usize) -> Result<(), ExecError> {
    match returns {
        Some(actual) if actual != expected => Err(ExecError::ReturnCount { expected, actual }),
        _ => Ok(()),
    }
}

pub fn expect_single_return(returns: Option<usize>) -> Result<(), ExecError> {
    expect_returns(returns, 1)
}

type FrameBody<E> = Rc<dyn Fn(&Frame<E>) -> Result<(), ExecError>>;

/// Fixed arity function, run in a local frame over exactly its arguments.
///
/// Leaving anything other than `returns` values behind is an error.
pub struct FixedCallable<E> {
    args: usize,
    returns: usize,
    body: FrameBody<E>,
}

impl<E: 'static> FixedCallable<E> {
    pub fn new(
        args: usize,
        returns: usize,
        body: impl Fn(&Frame<E>) -> Result<(), ExecError> + 'static,
    ) -> Self {
        Self {
            args,
            returns,
            body: Rc::new(body),
        }
    }

    pub fn nullary(f: impl Fn() -> Result<E, ExecError> + 'static) -> Self {
        Self::new(0, 1, move |frame| {
            frame.stack().push(f()?);
            Ok(())
        })
    }

    pub fn unary(f: impl Fn(E) -> Result<E, ExecError> + 'static) -> Self {
        Self::new(1, 1, move |frame| {
            let stack = frame.stack();
            let value = stack.pop()?;
            stack.push(f(value)?);
            Ok(())
        })
    }

    pub fn binary(f: impl Fn(E, E) -> Result<E, ExecError> + 'static) -> Self {
        Self::new(2, 1, move |frame| {
            let stack = frame.stack();
            let right = stack.pop()?;
            let left = stack.pop()?;
            stack.push(f(left, right)?);
            Ok(())
        })
    }
}

impl<E> Callable<E> for FixedCallable<E> {
    fn call(
        &self,
        frame: &Frame<E>,
        args: Option<usize>,
        returns: Option<usize>,
    ) -> Result<(), ExecError> {
        expect_args(args, self.args)?;
        expect_returns(returns, self.returns)?;
        let execution = Frame::local_with_substack(frame, self.args)?;
        (self.body)(&execution)?;
        execution.stack().check_size_is_exactly(self.returns)
    }
}

/// Variadic function producing exactly one value.
pub struct SingleReturn<E> {
    body: Rc<dyn Fn(&Frame<E>, Option<usize>) -> Result<E, ExecError>>,
}

impl<E> SingleReturn<E> {
    pub fn new(body: impl Fn(&Frame<E>, Option<usize>) -> Result<E, ExecError> + 'static) -> Self {
        Self {
            body: Rc::new(body),
        }
    }
}

impl<E> Callable<E> for SingleReturn<E> {
    fn call(
        &self,
        frame: &Frame<E>,
        args: Option<usize>,
        returns: Option<usize>,
    ) -> Result<(), ExecError> {
        expect_single_return(returns)?;
        let result = (self.body)(frame, args)?;
        frame.stack().push(result);
        Ok(())
    }
}

type Fold<E> = Rc<dyn Fn(E, E) -> Result<E, ExecError>>;
type Finish<E> = Rc<dyn Fn(E, usize) -> Result<E, ExecError>>;

/// Folds its arguments (two by default) into one value.
///
/// With zero arguments the result is the null value.
pub struct Accumulator<E> {
    null_value: E,
    fold: Fold<E>,
    finish: Option<Finish<E>>,
}

impl<E> Accumulator<E> {
    /// `fold(value, accumulated)` is applied from the top of the stack downwards.
    pub fn new(null_value: E, fold: impl Fn(E, E) -> Result<E, ExecError> + 'static) -> Self {
        Self {
            null_value,
            fold: Rc::new(fold),
            finish: None,
        }
    }

    /// Post-processes the folded value with the argument count.
    pub fn with_finish(mut self, finish: impl Fn(E, usize) -> Result<E, ExecError> + 'static) -> Self {
        self.finish = Some(Rc::new(finish));
        self
    }
}

impl<E: Clone> Callable<E> for Accumulator<E> {
    fn call(
        &self,
        frame: &Frame<E>,
        args: Option<usize>,
        returns: Option<usize>,
    ) -> Result<(), ExecError> {
        expect_single_return(returns)?;
        let count = args.unwrap_or(2);
        if count == 0 {
            frame.stack().push(self.null_value.clone());
            return Ok(());
        }

        let mut values = frame.stack().pop_n(count)?.into_iter().rev();
        let mut result = values.next().ok_or(ExecError::StackUnderflow)?;
        for value in values {
            result = (self.fold)(value, result)?;
        }
        if let Some(finish) = &self.finish {
            result = finish(result, count)?;
        }
        frame.stack().push(result);
        Ok(())
    }
}

/// Drops values, one by default. Must not be asked for results.
pub struct Pop;

impl<E> Callable<E> for Pop {
    fn call(
        &self,
        frame: &Frame<E>,
        args: Option<usize>,
        returns: Option<usize>,
    ) -> Result<(), ExecError> {
        expect_returns(returns, 0)?;
        frame.stack().pop_n(args.unwrap_or(1))?;
        Ok(())
    }
}

/// Pops `args` values (default 1) and pushes `returns` values (default twice as many),
/// repeating the popped values cyclically.
pub struct Dup;

impl<E: Clone> Callable<E> for Dup {
    fn call(
        &self,
        frame: &Frame<E>,
        args: Option<usize>,
        returns: Option<usize>,
    ) -> Result<(), ExecError> {
        let count = args.unwrap_or(1);
        let out = returns.unwrap_or(2 * count);
        if count == 0 && out > 0 {
            return Err(ExecError::TooFewArguments {
                minimum: 1,
                actual: 0,
            });
        }

        let stack = frame.stack();
        let values = stack.pop_n(count)?;
        for value in values.iter().cycle().take(out) {
            stack.push(value.clone());
        }
        Ok(())
    }
}

pub fn swap<E: 'static>() -> FixedCallable<E> {
    FixedCallable::new(2, 2, |frame| {
        let stack = frame.stack();
        let top = stack.pop()?;
        let below = stack.pop()?;
        stack.push(top);
        stack.push(below);
        Ok(())
    })
}

/// Raises an [`ExecutionError`], with the popped argument as message if given one.
pub struct Fail<E> {
    describe: Rc<dyn Fn(&E) -> String>,
}

impl<E> Fail<E> {
    pub fn new(describe: impl Fn(&E) -> String + 'static) -> Self {
        Self {
            describe: Rc::new(describe),
        }
    }
}

impl<E> Callable<E> for Fail<E> {
    fn call(
        &self,
        frame: &Frame<E>,
        args: Option<usize>,
        _returns: Option<usize>,
    ) -> Result<(), ExecError> {
        let message = match args.unwrap_or(0) {
            0 => None,
            1 => Some((self.describe)(&frame.stack().pop()?)),
            actual => return Err(ExecError::ArgumentCount { expected: 1, actual }),
        };
        Err(ExecutionError { message }.into())
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::{swap, Accumulator, Callable, Dup, Fail, FixedCallable, Pop};
    use crate::runtime::{ExecError, ExecutionError, Frame, Stack, SymbolMap};
    use arbtest::arbtest;
    use assert2::{assert, check, let_assert};

    fn frame(values: Vec<i64>) -> Frame<i64> {
        Frame::new(SymbolMap::top(), Stack::from(values))
    }

    #[test]
    fn pop_counts() {
        let f = frame(vec![1, 2, 3]);
        check!(Pop.call(&f, Some(2), None) == Ok(()));
        check!(f.stack().to_vec() == vec![1]);
        check!(Pop.call(&f, None, Some(1)) == Err(ExecError::ReturnCount { expected: 0, actual: 1 }));
        check!(Pop.call(&f, Some(2), None) == Err(ExecError::StackUnderflow));
        check!(f.stack().to_vec() == vec![1]);
    }

    #[test]
    fn over_popping_the_caller_is_an_underflow() {
        let f = frame(vec![1]);
        let max = Accumulator::new(0, |v: i64, acc: i64| Ok(v.max(acc)));
        check!(max.call(&f, Some(2), None) == Err(ExecError::StackUnderflow));
        check!(swap::<i64>().call(&f, None, None) == Err(ExecError::StackUnderflow));
        check!(Dup.call(&f, Some(2), None) == Err(ExecError::StackUnderflow));
        check!(f.stack().to_vec() == vec![1]);
    }

    #[test]
    fn dup_variants() {
        let f = frame(vec![0, 1, 2]);
        check!(Dup.call(&f, Some(2), None) == Ok(()));
        check!(f.stack().to_vec() == vec![0, 1, 2, 1, 2]);

        let f = frame(vec![1, 2]);
        check!(Dup.call(&f, None, Some(4)) == Ok(()));
        check!(f.stack().to_vec() == vec![1, 2, 2, 2, 2]);

        let f = frame(vec![1, 2, 3, 4]);
        check!(Dup.call(&f, Some(3), Some(5)) == Ok(()));
        check!(f.stack().to_vec() == vec![1, 2, 3, 4, 2, 3]);
    }

    #[test]
    fn swap_checks_counts() {
        let f = frame(vec![1, 2]);
        check!(swap().call(&f, None, None) == Ok(()));
        check!(f.stack().to_vec() == vec![2, 1]);
        check!(swap::<i64>().call(&f, Some(3), None) == Err(ExecError::ArgumentCount { expected: 2, actual: 3 }));
    }

    #[test]
    fn fixed_callable_post_condition() {
        let leaky = FixedCallable::new(1, 1, |frame: &Frame<i64>| {
            frame.stack().push(0);
            Ok(())
        });
        let f = frame(vec![5]);
        check!(leaky.call(&f, None, None) == Err(ExecError::StackSize { expected: 1, actual: 2 }));
    }

    #[test]
    fn fixed_callable_sees_only_its_arguments() {
        arbtest(|u| {
            let below: Vec<i64> = u.arbitrary()?;
            let left: i32 = u.arbitrary()?;
            let right: i32 = u.arbitrary()?;

            let seen = Rc::new(Cell::new(0));
            let seen_inside = Rc::clone(&seen);
            let sub = FixedCallable::new(2, 1, move |frame: &Frame<i64>| {
                seen_inside.set(frame.stack().len());
                let stack = frame.stack();
                let r = stack.pop()?;
                let l = stack.pop()?;
                stack.push(l - r);
                Ok(())
            });

            let mut values = below.clone();
            values.extend([i64::from(left), i64::from(right)]);
            let f = frame(values);
            let_assert!(Ok(()) = sub.call(&f, Some(2), Some(1)));

            let mut expected = below;
            expected.push(i64::from(left) - i64::from(right));
            assert!(seen.get() == 2);
            assert!(f.stack().to_vec() == expected);
            Ok(())
        });
    }

    #[test]
    fn accumulators() {
        let max = Accumulator::new(0, |v: i64, acc: i64| Ok(v.max(acc)));
        let f = frame(vec![9, 2, 7, 3]);
        check!(max.call(&f, Some(3), None) == Ok(()));
        check!(f.stack().to_vec() == vec![9, 7]);
        check!(max.call(&f, Some(0), None) == Ok(()));
        check!(f.stack().to_vec() == vec![9, 7, 0]);

        let avg = Accumulator::new(0, |v: i64, acc: i64| Ok(v + acc))
            .with_finish(|sum, count| Ok(sum / count as i64));
        let f = frame(vec![2, 4, 6]);
        check!(avg.call(&f, Some(3), Some(1)) == Ok(()));
        check!(f.stack().to_vec() == vec![4]);
    }

    #[test]
    fn fail_raises_execution_error() {
        let fail = Fail::new(|v: &i64| v.to_string());
        let f = frame(vec![42]);
        check!(fail.call(&f, None, None) == Err(ExecError::Execution(ExecutionError { message: None })));
        check!(fail.call(&f, Some(1), None) == Err(ExecutionError::new("42").into()));
    }
}
