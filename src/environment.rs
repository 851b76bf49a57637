//! The host-side owner of a top scope, and the back-end bundle built around it.

use std::rc::Rc;

use tracing::debug;

use crate::{
    compiler::{
        binding,
        node::{ExprNode, SpecialForm},
        state::SymbolTransition,
        CompileError, Compilers, Notation, ValueParser,
    },
    lexer::Span,
    operator::{OperatorRegistry, RegistryError},
    runtime::{Callable, ExecError, Executable, Frame, Program, Symbol, SymbolMap},
};

/// Name of the compile-time evaluation form, `const(expr)`.
pub const CONST_SYMBOL: &str = "const";
/// Bracket evaluating its contents at compile time in postfix notation.
pub const CONST_BRACKET: &str = "[";

/// Top scope plus the value standing in for "nothing".
///
/// Clones share the top scope. Only one evaluation may mutate it at a time.
pub struct Environment<E> {
    top: SymbolMap<E>,
    null_value: E,
}

impl<E: Clone> Clone for Environment<E> {
    fn clone(&self) -> Self {
        Self {
            top: self.top.clone(),
            null_value: self.null_value.clone(),
        }
    }
}

impl<E: Clone + 'static> Environment<E> {
    pub fn new(null_value: E) -> Self {
        Self {
            top: SymbolMap::top(),
            null_value,
        }
    }

    pub fn null_value(&self) -> &E {
        &self.null_value
    }

    pub fn top(&self) -> &SymbolMap<E> {
        &self.top
    }

    /// Binds `name` globally, replacing any previous binding.
    pub fn set_global(&self, name: &str, symbol: Symbol<E>) {
        self.top.insert(name, symbol);
    }

    pub fn set_global_value(&self, name: &str, value: E) {
        self.set_global(name, Symbol::Constant(value));
    }

    pub fn set_global_callable(&self, name: &str, callable: impl Callable<E> + 'static) {
        self.set_global(name, Symbol::callable(callable));
    }

    pub fn top_frame(&self) -> Frame<E> {
        Frame::from_symbols(self.top.clone())
    }

    /// Runs `program` against the top scope and returns what it left on the stack.
    pub fn execute(&self, program: &Program<E>) -> Result<Vec<E>, ExecError> {
        let frame = self.top_frame();
        program.execute(&frame)?;
        Ok(frame.stack().drain())
    }

    /// Runs `program` in a throwaway child of the top scope, with its own stack.
    pub fn execute_isolated(&self, program: &Program<E>) -> Result<Frame<E>, ExecError> {
        let frame = Frame::local(&self.top);
        program.execute(&frame)?;
        Ok(frame)
    }

    /// Evaluates `program` now and returns a program pushing the same values.
    fn fold_constant(&self, program: &Program<E>) -> Result<Program<E>, ExecError> {
        let frame = self.execute_isolated(program)?;
        debug!(values = frame.stack().len(), "evaluated constant");
        Ok(Program::new(frame.stack().drain().into_iter().map(Executable::Value)))
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalcError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl CalcError {
    pub fn span(&self) -> Option<Span> {
        match self {
            CalcError::Compile(err) => err.span(),
            CalcError::Exec(_) => None,
        }
    }
}

/// A back-end: its environment and the compilers for its operators and literals.
pub struct Calculator<E> {
    pub environment: Environment<E>,
    pub compilers: Compilers<E>,
}

impl<E: Clone + 'static> Calculator<E> {
    pub fn new(
        environment: Environment<E>,
        operators: OperatorRegistry<E>,
        value_parser: impl ValueParser<E> + 'static,
    ) -> Result<Self, RegistryError> {
        Ok(Self {
            environment,
            compilers: Compilers::new(Rc::new(operators), Rc::new(value_parser))?,
        })
    }

    /// Adds `const(...)` to the tree notations and `[...]` to postfix. Both evaluate
    /// their contents once, while compiling, and compile to the resulting values.
    pub fn with_constant_evaluation(mut self) -> Result<Self, RegistryError> {
        let environment = self.environment.clone();
        let build = move |name: &str, children: Vec<ExprNode<E>>| -> Result<_, CompileError> {
            let environment = environment.clone();
            Ok(ExprNode::Special(SpecialForm::new(
                name,
                children,
                move |children: &[ExprNode<E>], output: &mut Vec<Executable<E>>| {
                    let mut steps = Vec::new();
                    for child in children {
                        child.flatten(&mut steps)?;
                    }
                    let folded = environment.fold_constant(&Program::new(steps))?;
                    output.extend(folded.steps().iter().cloned());
                    Ok(())
                },
            )))
        };

        let states = [self.compilers.infix_state(), self.compilers.prefix_state()];
        let grammar = self.compilers.grammar_mut();
        for state in states {
            grammar.add_symbol_transition(state, CONST_SYMBOL, SymbolTransition::same_state(build.clone()))?;
        }

        let environment = self.environment.clone();
        self.compilers
            .postfix_mut()
            .add_bracket(CONST_BRACKET, move |program: Program<E>| -> Result<_, CompileError> {
                Ok(Executable::List(environment.fold_constant(&program)?))
            })?;
        Ok(self)
    }

    /// Adds `let(...)` binding groups to the tree notations. The operator registry must
    /// hold the binding separators.
    pub fn with_local_bindings(mut self) -> Result<Self, RegistryError> {
        let states = [self.compilers.infix_state(), self.compilers.prefix_state()];
        binding::register_let(self.compilers.grammar_mut(), &states)?;
        Ok(self)
    }

    pub fn compile(&self, notation: Notation, source: &str) -> Result<Program<E>, CompileError> {
        self.compilers.compile(notation, source)
    }

    pub fn execute(&self, program: &Program<E>) -> Result<Vec<E>, ExecError> {
        self.environment.execute(program)
    }

    pub fn compile_and_execute(&self, notation: Notation, source: &str) -> Result<Vec<E>, CalcError> {
        let program = self.compile(notation, source)?;
        Ok(self.execute(&program)?)
    }
}
