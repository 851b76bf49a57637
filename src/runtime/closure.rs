//! User-defined functions capturing their definition scope.

use std::rc::Rc;

use tracing::trace;

use super::{callable::expect_args, ExecError, Frame, Program, Symbol, SymbolMap};

/// Destructures a value into bindings.
pub trait BindPattern<E> {
    fn bind(&self, scope: &SymbolMap<E>, value: E) -> Result<(), ExecError>;
}

/// Binds the whole value to a single name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePattern(pub Box<str>);

impl NamePattern {
    pub fn new(name: &str) -> Self {
        Self(name.into())
    }
}

impl<E> BindPattern<E> for NamePattern {
    fn bind(&self, scope: &SymbolMap<E>, value: E) -> Result<(), ExecError> {
        scope.put(&self.0, Symbol::Constant(value))
    }
}

fn bind_arguments<E>(
    frame: &Frame<E>,
    params: &[Rc<dyn BindPattern<E>>],
) -> Result<(), ExecError> {
    let values = frame.stack().drain();
    for (param, value) in params.iter().zip(values) {
        param.bind(frame.symbols(), value)?;
    }
    Ok(())
}

fn check_returns<E>(frame: &Frame<E>, returns: Option<usize>) -> Result<(), ExecError> {
    match returns {
        Some(expected) => frame.stack().check_size_is_exactly(expected).map_err(|_| {
            ExecError::ReturnCount {
                expected,
                actual: frame.stack().len(),
            }
        }),
        None => Ok(()),
    }
}

/// Fixed arity closure.
pub struct Closure<E> {
    scope: SymbolMap<E>,
    params: Vec<Rc<dyn BindPattern<E>>>,
    body: Program<E>,
}

impl<E> Closure<E> {
    pub fn new(scope: &SymbolMap<E>, params: Vec<Rc<dyn BindPattern<E>>>, body: Program<E>) -> Self {
        Self {
            scope: scope.clone(),
            params,
            body,
        }
    }
}

impl<E: Clone + 'static> super::Callable<E> for Closure<E> {
    fn call(
        &self,
        frame: &Frame<E>,
        args: Option<usize>,
        returns: Option<usize>,
    ) -> Result<(), ExecError> {
        expect_args(args, self.params.len())?;
        let execution = Frame::closure(&self.scope, frame, self.params.len())?;
        // params bind bottom to top, stack is empty afterwards
        bind_arguments(&execution, &self.params)?;
        self.body.execute(&execution)?;
        check_returns(&execution, returns)
    }
}

type Cons<E> = Rc<dyn Fn(E, E) -> E>;

/// Closure collecting surplus arguments into a list bound to `rest`.
///
/// The list is built with `cons(arg, tail)` starting from `null`, so the deepest surplus
/// argument ends up first.
pub struct VarArgClosure<E> {
    scope: SymbolMap<E>,
    params: Vec<Rc<dyn BindPattern<E>>>,
    rest: Box<str>,
    null: E,
    cons: Cons<E>,
    body: Program<E>,
}

impl<E> VarArgClosure<E> {
    pub fn new(
        scope: &SymbolMap<E>,
        params: Vec<Rc<dyn BindPattern<E>>>,
        rest: &str,
        null: E,
        cons: impl Fn(E, E) -> E + 'static,
        body: Program<E>,
    ) -> Self {
        Self {
            scope: scope.clone(),
            params,
            rest: rest.into(),
            null,
            cons: Rc::new(cons),
            body,
        }
    }
}

impl<E: Clone + 'static> super::Callable<E> for VarArgClosure<E> {
    fn call(
        &self,
        frame: &Frame<E>,
        args: Option<usize>,
        returns: Option<usize>,
    ) -> Result<(), ExecError> {
        let mandatory = self.params.len();
        let count = args.unwrap_or(mandatory);
        if count < mandatory {
            return Err(ExecError::TooFewArguments {
                minimum: mandatory,
                actual: count,
            });
        }

        let execution = Frame::closure(&self.scope, frame, count)?;
        let mut rest = self.null.clone();
        for _ in mandatory..count {
            let arg = execution.stack().pop()?;
            rest = (self.cons)(arg, rest);
        }
        bind_arguments(&execution, &self.params)?;
        execution.symbols().put(&self.rest, Symbol::Constant(rest))?;

        self.body.execute(&execution)?;
        check_returns(&execution, returns)
    }
}

/// One name introduced by a [`BindingGroup`].
#[derive(Debug, PartialEq, Hash)]
pub enum Binding<E> {
    /// `name: value`
    Value { name: Box<str>, value: Program<E> },
    /// `name(params): body`
    Function {
        name: Box<str>,
        params: Vec<Box<str>>,
        body: Program<E>,
    },
}

/// Names bound together in one protection scope, plus the program run inside it.
///
/// Values are computed and functions capture the scope enclosing the group, so the
/// bindings never see each other. Binding a name twice within the group is an error,
/// shadowing an outer name is not.
#[derive(Debug, PartialEq, Hash)]
pub struct BindingGroup<E> {
    bindings: Vec<Binding<E>>,
    body: Program<E>,
}

impl<E> BindingGroup<E> {
    pub fn new(bindings: Vec<Binding<E>>, body: Program<E>) -> Self {
        Self { bindings, body }
    }

    pub fn bindings(&self) -> &[Binding<E>] {
        &self.bindings
    }

    pub fn body(&self) -> &Program<E> {
        &self.body
    }
}

impl<E: Clone + 'static> BindingGroup<E> {
    /// Runs the body on `frame`'s stack with the group's names in scope.
    pub fn execute(&self, frame: &Frame<E>) -> Result<(), ExecError> {
        trace!(bindings = self.bindings.len(), "binding group");
        let group = Frame::protection_with_substack(frame, 0)?;
        for binding in &self.bindings {
            match binding {
                Binding::Value { name, value } => {
                    let evaluation = Frame::local_with_substack(frame, 0)?;
                    value.execute(&evaluation)?;
                    evaluation.stack().check_size_is_exactly(1)?;
                    NamePattern::new(name).bind(group.symbols(), evaluation.stack().pop()?)?;
                }
                Binding::Function { name, params, body } => {
                    let params = params
                        .iter()
                        .map(|param| Rc::new(NamePattern::new(param)) as Rc<dyn BindPattern<E>>)
                        .collect();
                    let closure = Closure::new(frame.symbols(), params, body.clone());
                    group.symbols().put(name, Symbol::callable(closure))?;
                }
            }
        }
        self.body.execute(&group)
    }
}
