//! Operators and the registry the tokenizer and parsers consult.

use std::{collections::HashMap, fmt, rc::Rc};

use arbitrary::Arbitrary;
use tracing::debug;

use crate::runtime::{ExecError, Frame, SymbolMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Arbitrary)]
pub enum Associativity {
    Left,
    Right,
}

impl Associativity {
    /// Whether an incoming operator with precedence `incoming` must wait for the one
    /// already on the stack (with precedence `pending`) to be reduced first.
    pub fn is_less_than(self, incoming: i32, pending: i32) -> bool {
        match self {
            Associativity::Left => incoming <= pending,
            Associativity::Right => incoming < pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    Unary,
    Binary,
}

impl Arity {
    pub fn operands(self) -> usize {
        match self {
            Arity::Unary => 1,
            Arity::Binary => 2,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Arity::Unary => "unary",
            Arity::Binary => "binary",
        })
    }
}

type UnaryFn<E> = Rc<dyn Fn(E) -> Result<E, ExecError>>;
type BinaryFn<E> = Rc<dyn Fn(E, E) -> Result<E, ExecError>>;
type ScopedUnaryFn<E> = Rc<dyn Fn(&SymbolMap<E>, E) -> Result<E, ExecError>>;
type ScopedBinaryFn<E> = Rc<dyn Fn(&SymbolMap<E>, E, E) -> Result<E, ExecError>>;
type StackBody<E> = Rc<dyn Fn(&Frame<E>) -> Result<(), ExecError>>;

/// How an operator turns operands into results.
pub enum Execution<E> {
    /// Operands popped, result pushed.
    Unary(UnaryFn<E>),
    Binary(BinaryFn<E>),
    /// Same, with read access to the current scope.
    ScopedUnary(ScopedUnaryFn<E>),
    ScopedBinary(ScopedBinaryFn<E>),
    /// Runs in a child frame seeing only the operands and must leave `returns` values.
    StackBased { returns: usize, body: StackBody<E> },
}

pub struct Operator<E> {
    id: Box<str>,
    precedence: i32,
    arity: Arity,
    associativity: Associativity,
    execution: Execution<E>,
}

impl<E> fmt::Debug for Operator<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("id", &self.id)
            .field("precedence", &self.precedence)
            .field("arity", &self.arity)
            .field("associativity", &self.associativity)
            .finish_non_exhaustive()
    }
}

impl<E: 'static> Operator<E> {
    pub fn unary(id: &str, precedence: i32, f: impl Fn(E) -> Result<E, ExecError> + 'static) -> Self {
        Self::with_execution(id, precedence, Arity::Unary, Associativity::Left, Execution::Unary(Rc::new(f)))
    }

    pub fn binary(
        id: &str,
        precedence: i32,
        associativity: Associativity,
        f: impl Fn(E, E) -> Result<E, ExecError> + 'static,
    ) -> Self {
        Self::with_execution(id, precedence, Arity::Binary, associativity, Execution::Binary(Rc::new(f)))
    }

    pub fn scoped_unary(
        id: &str,
        precedence: i32,
        f: impl Fn(&SymbolMap<E>, E) -> Result<E, ExecError> + 'static,
    ) -> Self {
        Self::with_execution(
            id,
            precedence,
            Arity::Unary,
            Associativity::Left,
            Execution::ScopedUnary(Rc::new(f)),
        )
    }

    pub fn scoped_binary(
        id: &str,
        precedence: i32,
        associativity: Associativity,
        f: impl Fn(&SymbolMap<E>, E, E) -> Result<E, ExecError> + 'static,
    ) -> Self {
        Self::with_execution(
            id,
            precedence,
            Arity::Binary,
            associativity,
            Execution::ScopedBinary(Rc::new(f)),
        )
    }

    /// Stack-based operator producing a single value.
    pub fn stack_based(
        id: &str,
        precedence: i32,
        arity: Arity,
        associativity: Associativity,
        body: impl Fn(&Frame<E>) -> Result<(), ExecError> + 'static,
    ) -> Self {
        Self::with_execution(
            id,
            precedence,
            arity,
            associativity,
            Execution::StackBased {
                returns: 1,
                body: Rc::new(body),
            },
        )
    }
}

impl<E> Operator<E> {
    pub fn with_execution(
        id: &str,
        precedence: i32,
        arity: Arity,
        associativity: Associativity,
        execution: Execution<E>,
    ) -> Self {
        Self {
            id: id.into(),
            precedence,
            arity,
            associativity,
            execution,
        }
    }

    /// Overrides the result count of a stack-based operator.
    pub fn returning(mut self, count: usize) -> Self {
        if let Execution::StackBased { returns, .. } = &mut self.execution {
            *returns = count;
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn precedence(&self) -> i32 {
        self.precedence
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn associativity(&self) -> Associativity {
        self.associativity
    }

    /// Whether this incoming operator yields to `pending`. Unary operators never do.
    pub fn is_lower_priority(&self, pending: &Operator<E>) -> bool {
        match self.arity {
            Arity::Unary => false,
            Arity::Binary => self
                .associativity
                .is_less_than(self.precedence, pending.precedence),
        }
    }

    pub fn execute(&self, frame: &Frame<E>) -> Result<(), ExecError> {
        let stack = frame.stack();
        match &self.execution {
            Execution::Unary(f) => {
                let value = stack.pop()?;
                stack.push(f(value)?);
            }
            Execution::Binary(f) => {
                let right = stack.pop()?;
                let left = stack.pop()?;
                stack.push(f(left, right)?);
            }
            Execution::ScopedUnary(f) => {
                let value = stack.pop()?;
                stack.push(f(frame.symbols(), value)?);
            }
            Execution::ScopedBinary(f) => {
                let right = stack.pop()?;
                let left = stack.pop()?;
                stack.push(f(frame.symbols(), left, right)?);
            }
            Execution::StackBased { returns, body } => {
                let execution = Frame::local_with_substack(frame, self.arity.operands())?;
                body(&execution)?;
                execution.stack().check_size_is_exactly(*returns)?;
            }
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{arity} operator '{id}' already registered")]
    DuplicateOperator { id: Box<str>, arity: Arity },
    #[error("default {arity} operator already set to '{existing}'")]
    DuplicateDefault { existing: Box<str>, arity: Arity },
    #[error("transition for '{0}' already registered")]
    DuplicateTransition(Box<str>),
    #[error("node builder for {arity} operator '{id}' already registered")]
    DuplicateNodeBuilder { id: Box<str>, arity: Arity },
    #[error("handler for '{0}' already registered")]
    DuplicateHandler(Box<str>),
}

/// Operators keyed by (id, arity), plus at most one default per arity.
pub struct OperatorRegistry<E> {
    operators: HashMap<(Box<str>, Arity), Rc<Operator<E>>>,
    defaults: HashMap<Arity, Rc<Operator<E>>>,
}

impl<E> Default for OperatorRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> OperatorRegistry<E> {
    pub fn new() -> Self {
        Self {
            operators: HashMap::new(),
            defaults: HashMap::new(),
        }
    }

    pub fn register(&mut self, operator: Operator<E>) -> Result<Rc<Operator<E>>, RegistryError> {
        let key = (Box::from(operator.id()), operator.arity());
        if self.operators.contains_key(&key) {
            return Err(RegistryError::DuplicateOperator {
                id: key.0,
                arity: key.1,
            });
        }
        debug!(id = operator.id(), arity = %operator.arity(), "registered operator");
        let operator = Rc::new(operator);
        self.operators.insert(key, Rc::clone(&operator));
        Ok(operator)
    }

    /// Registers `operator` as the one implied when none is written, e.g. `2(3)`.
    pub fn register_default(
        &mut self,
        operator: Operator<E>,
    ) -> Result<Rc<Operator<E>>, RegistryError> {
        let arity = operator.arity();
        if let Some(existing) = self.defaults.get(&arity) {
            return Err(RegistryError::DuplicateDefault {
                existing: existing.id.clone(),
                arity,
            });
        }
        let operator = self.register(operator)?;
        self.defaults.insert(arity, Rc::clone(&operator));
        Ok(operator)
    }

    pub fn get(&self, id: &str, arity: Arity) -> Option<Rc<Operator<E>>> {
        self.operators.get(&(Box::from(id), arity)).cloned()
    }

    pub fn default_operator(&self, arity: Arity) -> Option<Rc<Operator<E>>> {
        self.defaults.get(&arity).cloned()
    }

    /// Every registered id, for the tokenizer.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.operators.keys().map(|(id, _)| id.as_ref())
    }
}
