//! Turns source text into [`Program`]s.
//!
//! Prefix and infix notation go through an expression tree: a [`Grammar`] of parser
//! states builds [`ExprNode`]s which are then flattened. Postfix notation needs no
//! tree and appends straight to a [`postfix::ProgramBuilder`].
//!
//! The two tree notations can be nested inside each other:
//!
//! ```text
//! 1 + prefix((* 2 3))     infix, switching to prefix for the argument
//! (+ 1 (infix 2 * 3))     prefix, switching to infix
//! ```

use std::{fmt, rc::Rc, str::FromStr};

use arbitrary::Arbitrary;
use tracing::debug;

use crate::{
    lexer::{LexError, Span, Token, TokenKind, TokenStream, Tokenizer},
    num::ValueError,
    operator::{Arity, OperatorRegistry, RegistryError},
    runtime::{ExecError, Program},
};

pub mod binding;
pub mod infix;
pub mod node;
pub mod postfix;
pub mod prefix;
pub mod state;

use infix::InfixParser;
use node::ExprNode;
use postfix::{PostfixParser, ProgramBuilder};
use prefix::PrefixParser;
use state::{Grammar, ModifierTransition, StateId, SymbolTransition};

/// Prefix turning a symbol into a read of its value: `@x`.
pub const SYMBOL_GET_MODIFIER: &str = "@";

/// Converts literal tokens into values of the back-end's type.
pub trait ValueParser<E> {
    fn parse_token(&self, token: &Token) -> Result<E, ValueError>;
}

impl<E, F> ValueParser<E> for F
where
    F: Fn(&Token) -> Result<E, ValueError>,
{
    fn parse_token(&self, token: &Token) -> Result<E, ValueError> {
        self(token)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("invalid value {token}")]
    InvalidValue {
        token: Token,
        #[source]
        source: ValueError,
    },
    #[error("unexpected {0}")]
    UnexpectedToken(Token),
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unclosed bracket {0}")]
    UnclosedBracket(Token),
    #[error("bracket {opening} closed by {closing}")]
    MismatchedBracket { opening: Token, closing: Token },
    #[error("unknown {arity} operator '{id}'")]
    UnknownOperator { id: Box<str>, arity: Arity, span: Span },
    #[error("'{name}' expects {expected} operand(s), got {actual}")]
    ChildCount {
        name: Box<str>,
        expected: usize,
        actual: usize,
    },
    #[error("bracketed list of {count} elements used as a value")]
    UnresolvedContainer { count: usize },
    #[error("malformed argument counts in {0}")]
    InvalidSymbolArgs(Token),
    #[error("modifier '{modifier}' must be followed by a symbol")]
    ExpectedSymbol { modifier: Box<str> },
    #[error("malformed binding in '{form}', expected `name: value` or `name(params): body`")]
    InvalidBinding { form: Box<str> },
    #[error("'{separator}' is only allowed in a binding list")]
    MisplacedBinding { separator: Box<str> },
    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl CompileError {
    /// Source range the error points at, where one is known.
    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::Lex(err) => err.span(),
            CompileError::InvalidValue { token, .. }
            | CompileError::UnexpectedToken(token)
            | CompileError::UnclosedBracket(token)
            | CompileError::MismatchedBracket { closing: token, .. }
            | CompileError::InvalidSymbolArgs(token) => Some(token.span.clone()),
            CompileError::UnknownOperator { span, .. } => Some(span.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Arbitrary)]
pub enum Notation {
    Prefix,
    Infix,
    Postfix,
}

impl fmt::Display for Notation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Notation::Prefix => "prefix",
            Notation::Infix => "infix",
            Notation::Postfix => "postfix",
        })
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown notation '{0}', expected prefix, infix or postfix")]
pub struct UnknownNotation(pub Box<str>);

impl FromStr for Notation {
    type Err = UnknownNotation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prefix" => Ok(Notation::Prefix),
            "infix" => Ok(Notation::Infix),
            "postfix" => Ok(Notation::Postfix),
            other => Err(UnknownNotation(other.into())),
        }
    }
}

/// Wraps the only argument of a notation switch, so `prefix(x)` compiles to `x`.
fn single_child<E>(symbol: &str, children: Vec<ExprNode<E>>) -> Result<ExprNode<E>, CompileError> {
    match <[_; 1]>::try_from(children) {
        Ok([child]) => Ok(ExprNode::Bracket(Some(Box::new(child)))),
        Err(children) => Err(CompileError::ChildCount {
            name: symbol.into(),
            expected: 1,
            actual: children.len(),
        }),
    }
}

fn symbol_get<E>(modifier: &str, operand: ExprNode<E>) -> Result<ExprNode<E>, CompileError> {
    match operand {
        ExprNode::SymbolGet(name) => Ok(ExprNode::SymbolGet(name)),
        _ => Err(CompileError::ExpectedSymbol {
            modifier: modifier.into(),
        }),
    }
}

fn postfix_symbol_get<E: Clone>(builder: &mut ProgramBuilder<E>, token: Token) -> Result<(), CompileError> {
    match token.kind {
        TokenKind::Symbol => {
            builder.append_symbol_get(&token.text);
            Ok(())
        }
        _ => Err(CompileError::ExpectedSymbol {
            modifier: SYMBOL_GET_MODIFIER.into(),
        }),
    }
}

/// The compilers for every notation of one back-end, sharing its operators.
pub struct Compilers<E> {
    grammar: Grammar<E>,
    infix: StateId,
    prefix: StateId,
    postfix: PostfixParser<E>,
}

impl<E: Clone + 'static> Compilers<E> {
    pub fn new(
        operators: Rc<OperatorRegistry<E>>,
        value_parser: Rc<dyn ValueParser<E>>,
    ) -> Result<Self, RegistryError> {
        let mut grammar = Grammar::new(Rc::clone(&operators), Rc::clone(&value_parser));
        let infix = grammar.add_state(InfixParser);
        let prefix = grammar.add_state(PrefixParser);

        for state in [infix, prefix] {
            grammar
                .add_symbol_transition(state, "infix", SymbolTransition::switch_to(infix, single_child))?
                .add_symbol_transition(state, "prefix", SymbolTransition::switch_to(prefix, single_child))?
                .add_modifier_transition(state, SYMBOL_GET_MODIFIER, ModifierTransition::same_state(symbol_get))?;
        }

        let mut postfix = PostfixParser::new(operators, value_parser);
        postfix.add_modifier(SYMBOL_GET_MODIFIER, postfix_symbol_get)?;

        Ok(Self {
            grammar,
            infix,
            prefix,
            postfix,
        })
    }

    pub fn grammar(&self) -> &Grammar<E> {
        &self.grammar
    }

    pub fn grammar_mut(&mut self) -> &mut Grammar<E> {
        &mut self.grammar
    }

    pub fn postfix_mut(&mut self) -> &mut PostfixParser<E> {
        &mut self.postfix
    }

    pub fn infix_state(&self) -> StateId {
        self.infix
    }

    pub fn prefix_state(&self) -> StateId {
        self.prefix
    }

    /// Tokenizes `source` with every operator and modifier any notation knows.
    pub fn tokenize<'s>(&self, source: &'s str) -> TokenStream<'s> {
        let modifiers = self.grammar.modifiers().chain(self.postfix.modifiers());
        TokenStream::new(Tokenizer::new(source, self.grammar.operators().ids(), modifiers))
    }

    pub fn compile(&self, notation: Notation, source: &str) -> Result<Program<E>, CompileError> {
        let mut tokens = self.tokenize(source);
        let program = match notation {
            Notation::Infix => self.grammar.parse(self.infix, &mut tokens)?.compile()?,
            Notation::Prefix => self.grammar.parse(self.prefix, &mut tokens)?.compile()?,
            Notation::Postfix => self.postfix.parse(&mut tokens)?,
        };
        debug!(%notation, steps = program.len(), "compiled");
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use std::rc::Rc;

    use super::{node::ExprNode, CompileError, Compilers, Notation};
    use crate::{environment::Environment, fp, operator::Arity};

    #[test]
    fn notation_names() {
        for notation in [Notation::Prefix, Notation::Infix, Notation::Postfix] {
            check!(notation.to_string().parse::<Notation>() == Ok(notation));
        }
        check!("rpn".parse::<Notation>().is_err());
    }

    #[test]
    fn notation_switches_nest() {
        let_assert!(Ok(calculator) = fp::calculator());
        let eval = |notation, source| calculator.compile_and_execute(notation, source);
        check!(eval(Notation::Infix, "1 + prefix((* 2 3))") == Ok(vec![7.0]));
        check!(eval(Notation::Infix, "prefix(+ 1 2)") == Ok(vec![3.0]));
        check!(eval(Notation::Prefix, "(+ 1 (infix 2 * 3))") == Ok(vec![7.0]));
        check!(eval(Notation::Prefix, "(infix 1 + prefix((- 5 (infix 2 ^ 2))))") == Ok(vec![2.0]));
    }

    #[test]
    fn symbol_get_modifier() {
        let_assert!(Ok(calculator) = fp::calculator());
        for (notation, source) in [
            (Notation::Infix, "@PI"),
            (Notation::Prefix, "@PI"),
            (Notation::Postfix, "@PI"),
        ] {
            check!(calculator.compile_and_execute(notation, source) == Ok(vec![std::f64::consts::PI]));
        }
        let_assert!(Err(CompileError::ExpectedSymbol { .. }) = calculator.compile(Notation::Infix, "@(1)"));
        let_assert!(Err(CompileError::ExpectedSymbol { .. }) = calculator.compile(Notation::Postfix, "@ 1"));
    }

    #[test]
    fn errors_point_at_source() {
        let_assert!(Ok(calculator) = fp::calculator());
        let_assert!(Err(err) = calculator.compile(Notation::Infix, "1 + 2 ]"));
        check!(err.span() == Some(6..7));
        let_assert!(Err(err) = calculator.compile(Notation::Infix, "1 + ?"));
        check!(err.span() == Some(4..5));
        let_assert!(Err(err) = calculator.compile(Notation::Infix, "1 + é"));
        check!(err.span() == Some(4..6));
    }

    #[test]
    fn custom_node_builders() {
        let_assert!(Ok(operators) = fp::operators());
        let_assert!(Ok(mut compilers) = Compilers::new(Rc::new(operators), Rc::new(fp::DoubleParser)));
        let grammar = compilers.grammar_mut();
        let_assert!(Ok(_) = grammar.add_operator_node_builder("^", Arity::Binary, |_, args| {
            Ok(ExprNode::SymbolCall { symbol: "max".into(), args })
        }));
        grammar
            .register_modifier("!")
            .set_default_modifier_builder(|_, operand| {
                Ok(ExprNode::SymbolCall { symbol: "abs".into(), args: vec![operand] })
            })
            .set_default_symbol_builder(|_, args| Ok(ExprNode::SymbolCall { symbol: "sum".into(), args }));

        let environment = Environment::new(0.0);
        fp::register_functions(&environment);
        let eval = |notation, source| compilers.compile(notation, source).map(|program| environment.execute(&program));
        check!(eval(Notation::Infix, "2 ^ 3") == Ok(Ok(vec![3.0])));
        check!(eval(Notation::Prefix, "(^ 5 1)") == Ok(Ok(vec![5.0])));
        check!(eval(Notation::Infix, "!(1 - 5)") == Ok(Ok(vec![4.0])));
        check!(eval(Notation::Infix, "anything(1, 2, 3)") == Ok(Ok(vec![6.0])));
        // notation switches keep their own builders
        check!(eval(Notation::Infix, "prefix((+ 1 2))") == Ok(Ok(vec![3.0])));
    }
}
