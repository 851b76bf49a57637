//! Execution of compiled [`Program`]s against a [`Frame`].

use std::{
    fmt,
    hash::{Hash, Hasher},
    rc::Rc,
};

use tracing::trace;

use crate::operator::{Arity, Operator};

pub mod callable;
pub mod closure;
pub mod frame;
pub mod stack;
pub mod symbol;

pub use callable::{swap, Accumulator, Callable, Dup, Fail, FixedCallable, Pop, SingleReturn};
pub use closure::{BindPattern, Binding, BindingGroup, Closure, NamePattern, VarArgClosure};
pub use frame::Frame;
pub use stack::Stack;
pub use symbol::{AttributeSource, Symbol, SymbolMap};

/// Raised by user code (e.g. `fail`). Always propagated unchanged.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", .message.as_deref().unwrap_or("execution failed"))]
pub struct ExecutionError {
    pub message: Option<String>,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ExecError {
    #[error("unknown symbol: {name}")]
    UnknownSymbol { name: Box<str> },
    #[error("unknown function: {name}")]
    UnknownCallable { name: Box<str> },
    #[error("stack underflow")]
    StackUnderflow,
    #[error("cannot take substack of {requested} elements, only {available} available")]
    SubstackTooDeep { requested: usize, available: usize },
    #[error("expected stack size {expected}, got {actual}")]
    StackSize { expected: usize, actual: usize },
    #[error("expected {expected} argument(s), got {actual}")]
    ArgumentCount { expected: usize, actual: usize },
    #[error("expected at least {minimum} argument(s), got {actual}")]
    TooFewArguments { minimum: usize, actual: usize },
    #[error("expected {expected} return value(s), got {actual}")]
    ReturnCount { expected: usize, actual: usize },
    #[error("cannot use function as value")]
    NotGettable,
    #[error("symbol '{name}' already defined")]
    AlreadyDefined { name: Box<str> },
    #[error("cannot define '{name}' in a read-only scope")]
    ReadOnlyScope { name: Box<str> },
    #[error("failed to get symbol '{name}'")]
    GetFailed {
        name: Box<str>,
        #[source]
        source: Box<ExecError>,
    },
    #[error("value does not match pattern '{pattern}'")]
    PatternMismatch { pattern: Box<str> },
    #[error("{0}")]
    Failed(Box<str>),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// A single instruction of a [`Program`].
pub enum Executable<E> {
    /// Pushes a copy of the value.
    Value(E),
    /// Resolves the symbol and pushes its value.
    SymbolGet(Rc<str>),
    /// Resolves the symbol and calls it.
    SymbolCall {
        symbol: Rc<str>,
        args: Option<usize>,
        returns: Option<usize>,
    },
    Operator(Rc<Operator<E>>),
    /// Runs the nested program in place. Never stored inside a [`Program`].
    List(Program<E>),
    /// Runs a body with local names bound.
    Bind(Rc<BindingGroup<E>>),
}

impl<E: Clone + 'static> Executable<E> {
    pub fn execute(&self, frame: &Frame<E>) -> Result<(), ExecError> {
        match self {
            Executable::Value(value) => {
                frame.stack().push(value.clone());
                Ok(())
            }
            Executable::SymbolGet(name) => {
                trace!(symbol = %name, "get");
                let symbol = frame
                    .symbols()
                    .get(name)?
                    .ok_or_else(|| ExecError::UnknownSymbol { name: name.as_ref().into() })?;
                let value = symbol.get().map_err(|err| match err {
                    ExecError::Execution(_) => err,
                    err => ExecError::GetFailed {
                        name: name.as_ref().into(),
                        source: Box::new(err),
                    },
                })?;
                frame.stack().push(value);
                Ok(())
            }
            Executable::SymbolCall {
                symbol,
                args,
                returns,
            } => {
                trace!(%symbol, ?args, ?returns, "call");
                frame
                    .symbols()
                    .get(symbol)?
                    .ok_or_else(|| ExecError::UnknownCallable { name: symbol.as_ref().into() })?
                    .call(frame, *args, *returns)
            }
            Executable::Operator(op) => {
                trace!(op = op.id(), "operator");
                op.execute(frame)
            }
            Executable::List(program) => program.execute(frame),
            Executable::Bind(group) => group.execute(frame),
        }
    }
}

impl<E: Clone> Clone for Executable<E> {
    fn clone(&self) -> Self {
        match self {
            Executable::Value(value) => Executable::Value(value.clone()),
            Executable::SymbolGet(name) => Executable::SymbolGet(Rc::clone(name)),
            Executable::SymbolCall {
                symbol,
                args,
                returns,
            } => Executable::SymbolCall {
                symbol: Rc::clone(symbol),
                args: *args,
                returns: *returns,
            },
            Executable::Operator(op) => Executable::Operator(Rc::clone(op)),
            Executable::List(program) => Executable::List(program.clone()),
            Executable::Bind(group) => Executable::Bind(Rc::clone(group)),
        }
    }
}

fn operator_key<E>(op: &Operator<E>) -> (&str, Arity) {
    (op.id(), op.arity())
}

impl<E: PartialEq> PartialEq for Executable<E> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Executable::Value(a), Executable::Value(b)) => a == b,
            (Executable::SymbolGet(a), Executable::SymbolGet(b)) => a == b,
            (
                Executable::SymbolCall {
                    symbol: a,
                    args: a_args,
                    returns: a_returns,
                },
                Executable::SymbolCall {
                    symbol: b,
                    args: b_args,
                    returns: b_returns,
                },
            ) => a == b && a_args == b_args && a_returns == b_returns,
            (Executable::Operator(a), Executable::Operator(b)) => {
                Rc::ptr_eq(a, b) || operator_key(a) == operator_key(b)
            }
            (Executable::List(a), Executable::List(b)) => a == b,
            (Executable::Bind(a), Executable::Bind(b)) => a == b,
            _ => false,
        }
    }
}

impl<E: Hash> Hash for Executable<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Executable::Value(value) => value.hash(state),
            Executable::SymbolGet(name) => name.hash(state),
            Executable::SymbolCall {
                symbol,
                args,
                returns,
            } => (symbol, args, returns).hash(state),
            Executable::Operator(op) => operator_key(op).hash(state),
            Executable::List(program) => program.hash(state),
            Executable::Bind(group) => group.hash(state),
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for Executable<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Executable::Value(value) => write!(f, "{value:?}"),
            Executable::SymbolGet(name) => write!(f, "@{name}"),
            Executable::SymbolCall {
                symbol,
                args,
                returns,
            } => {
                write!(f, "{symbol}$")?;
                if let Some(args) = args {
                    write!(f, "{args}")?;
                }
                if let Some(returns) = returns {
                    write!(f, ",{returns}")?;
                }
                Ok(())
            }
            Executable::Operator(op) => write!(f, "op:{}", op.id()),
            Executable::List(program) => write!(f, "{program:?}"),
            Executable::Bind(group) => write!(f, "let{:?}", group.bindings()),
        }
    }
}

impl<E> From<Program<E>> for Executable<E> {
    fn from(program: Program<E>) -> Self {
        Executable::List(program)
    }
}

/// Immutable, flat instruction sequence. Cheap to clone and share.
pub struct Program<E> {
    steps: Rc<[Executable<E>]>,
}

impl<E> Clone for Program<E> {
    fn clone(&self) -> Self {
        Self {
            steps: Rc::clone(&self.steps),
        }
    }
}

impl<E: Clone> Program<E> {
    /// Builds a program, splicing nested lists in place.
    pub fn new(steps: impl IntoIterator<Item = Executable<E>>) -> Self {
        let mut flat = Vec::new();
        for step in steps {
            match step {
                Executable::List(program) => flat.extend(program.steps.iter().cloned()),
                step => flat.push(step),
            }
        }
        Self { steps: flat.into() }
    }
}

impl<E> Program<E> {
    pub fn empty() -> Self {
        Self {
            steps: Rc::new([]),
        }
    }

    pub fn steps(&self) -> &[Executable<E>] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<E: Clone + 'static> Program<E> {
    pub fn execute(&self, frame: &Frame<E>) -> Result<(), ExecError> {
        self.steps.iter().try_for_each(|step| step.execute(frame))
    }
}

impl<E: PartialEq> PartialEq for Program<E> {
    fn eq(&self, other: &Self) -> bool {
        self.steps[..] == other.steps[..]
    }
}

impl<E: Hash> Hash for Program<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.steps[..].hash(state)
    }
}

impl<E: fmt::Debug> fmt::Debug for Program<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.steps.iter()).finish()
    }
}
