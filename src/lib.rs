pub mod compiler;
pub mod environment;
pub mod fp;
pub mod lexer;
pub mod num;
pub mod operator;
pub mod runtime;

pub use compiler::{CompileError, Compilers, Notation, ValueParser};
pub use environment::{CalcError, Calculator, Environment};
pub use lexer::{LexError, Token, TokenKind, Tokenizer};
pub use num::{Positional, ValueError};
pub use operator::{Arity, Associativity, Operator, OperatorRegistry, RegistryError};
pub use runtime::{
    Callable, ExecError, Executable, ExecutionError, Frame, Program, Stack, Symbol, SymbolMap,
};
