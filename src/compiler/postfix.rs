//! Reverse Polish notation, compiled in a single pass without a tree.
//!
//! ```text
//! 1 2 3 * +       values and operators
//! 1 2 max$2       a call with an explicit argument count
//! 1 2 3 pop$2,0   ... and return count
//! @x              read a symbol instead of calling it
//! ```

use std::{collections::HashMap, rc::Rc};

use super::{state::check_bracket_pair, CompileError, ValueParser};
use crate::{
    lexer::{Token, TokenKind, TokenStream},
    operator::{Arity, OperatorRegistry, RegistryError},
    runtime::{Executable, Program},
};

/// Accumulates the steps of a program under construction.
pub struct ProgramBuilder<E> {
    steps: Vec<Executable<E>>,
    operators: Rc<OperatorRegistry<E>>,
    value_parser: Rc<dyn ValueParser<E>>,
}

impl<E: Clone> ProgramBuilder<E> {
    pub fn new(operators: Rc<OperatorRegistry<E>>, value_parser: Rc<dyn ValueParser<E>>) -> Self {
        Self {
            steps: Vec::new(),
            operators,
            value_parser,
        }
    }

    pub fn append_value(&mut self, token: &Token) -> Result<(), CompileError> {
        let value = self
            .value_parser
            .parse_token(token)
            .map_err(|source| CompileError::InvalidValue {
                token: token.clone(),
                source,
            })?;
        self.steps.push(Executable::Value(value));
        Ok(())
    }

    /// Binary operators win over unary ones of the same name.
    pub fn append_operator(&mut self, token: &Token) -> Result<(), CompileError> {
        let op = self
            .operators
            .get(&token.text, Arity::Binary)
            .or_else(|| self.operators.get(&token.text, Arity::Unary))
            .ok_or_else(|| CompileError::UnknownOperator {
                id: token.text.clone(),
                arity: Arity::Binary,
                span: token.span.clone(),
            })?;
        self.steps.push(Executable::Operator(op));
        Ok(())
    }

    pub fn append_symbol_get(&mut self, name: &str) {
        self.steps.push(Executable::SymbolGet(name.into()));
    }

    pub fn append_symbol_call(&mut self, name: &str, args: Option<usize>, returns: Option<usize>) {
        self.steps.push(Executable::SymbolCall {
            symbol: name.into(),
            args,
            returns,
        });
    }

    /// Lists are spliced into the program, everything else is appended as is.
    pub fn append_sub_list(&mut self, executable: Executable<E>) {
        match executable {
            Executable::List(program) => self.steps.extend(program.steps().iter().cloned()),
            step => self.steps.push(step),
        }
    }

    fn sub_builder(&self) -> Self {
        Self::new(Rc::clone(&self.operators), Rc::clone(&self.value_parser))
    }

    pub fn build(self) -> Program<E> {
        Program::new(self.steps)
    }
}

pub type ModifierHandler<E> = Rc<dyn Fn(&mut ProgramBuilder<E>, Token) -> Result<(), CompileError>>;
pub type BracketHandler<E> = Rc<dyn Fn(Program<E>) -> Result<Executable<E>, CompileError>>;

/// Splits `name$args,returns`. Either count may be left out.
fn parse_symbol_args(token: &Token) -> Result<(&str, Option<usize>, Option<usize>), CompileError> {
    let invalid = || CompileError::InvalidSymbolArgs(token.clone());
    let (name, counts) = token.text.split_once('$').ok_or_else(invalid)?;
    let (args, returns) = counts.split_once(',').unwrap_or((counts, ""));
    let count = |digits: &str| match digits {
        "" => Ok(None),
        digits => digits.parse().map(Some).map_err(|_| invalid()),
    };
    Ok((name, count(args)?, count(returns)?))
}

pub struct PostfixParser<E> {
    operators: Rc<OperatorRegistry<E>>,
    value_parser: Rc<dyn ValueParser<E>>,
    modifiers: HashMap<Box<str>, ModifierHandler<E>>,
    brackets: HashMap<Box<str>, BracketHandler<E>>,
}

impl<E: Clone> PostfixParser<E> {
    pub fn new(operators: Rc<OperatorRegistry<E>>, value_parser: Rc<dyn ValueParser<E>>) -> Self {
        Self {
            operators,
            value_parser,
            modifiers: HashMap::new(),
            brackets: HashMap::new(),
        }
    }

    /// `handler` receives the token following the modifier.
    pub fn add_modifier(
        &mut self,
        modifier: &str,
        handler: impl Fn(&mut ProgramBuilder<E>, Token) -> Result<(), CompileError> + 'static,
    ) -> Result<&mut Self, RegistryError> {
        if self.modifiers.contains_key(modifier) {
            return Err(RegistryError::DuplicateHandler(modifier.into()));
        }
        self.modifiers.insert(modifier.into(), Rc::new(handler));
        Ok(self)
    }

    /// `handler` turns the program between `opening` and its closing bracket into the
    /// step appended in its place. Unhandled brackets just group.
    pub fn add_bracket(
        &mut self,
        opening: &str,
        handler: impl Fn(Program<E>) -> Result<Executable<E>, CompileError> + 'static,
    ) -> Result<&mut Self, RegistryError> {
        if self.brackets.contains_key(opening) {
            return Err(RegistryError::DuplicateHandler(opening.into()));
        }
        self.brackets.insert(opening.into(), Rc::new(handler));
        Ok(self)
    }

    pub fn modifiers(&self) -> impl Iterator<Item = &str> {
        self.modifiers.keys().map(AsRef::as_ref)
    }

    pub fn parse(&self, tokens: &mut TokenStream<'_>) -> Result<Program<E>, CompileError> {
        let mut builder = ProgramBuilder::new(Rc::clone(&self.operators), Rc::clone(&self.value_parser));
        self.parse_into(&mut builder, tokens, None)?;
        Ok(builder.build())
    }

    fn parse_into(
        &self,
        builder: &mut ProgramBuilder<E>,
        tokens: &mut TokenStream<'_>,
        opening: Option<&Token>,
    ) -> Result<(), CompileError> {
        while let Some(token) = tokens.next_token()? {
            match token.kind {
                kind if kind.is_value() => builder.append_value(&token)?,
                TokenKind::Symbol => builder.append_symbol_call(&token.text, None, None),
                TokenKind::SymbolWithArgs => {
                    let (name, args, returns) = parse_symbol_args(&token)?;
                    builder.append_symbol_call(name, args, returns);
                }
                TokenKind::Operator => builder.append_operator(&token)?,
                TokenKind::Modifier => {
                    let handler = self
                        .modifiers
                        .get(token.text.as_ref())
                        .ok_or_else(|| CompileError::UnexpectedToken(token.clone()))?;
                    let operand = tokens.next_token()?.ok_or(CompileError::UnexpectedEnd)?;
                    handler(builder, operand)?;
                }
                TokenKind::LeftBracket => {
                    let mut inner = builder.sub_builder();
                    self.parse_into(&mut inner, tokens, Some(&token))?;
                    let program = inner.build();
                    let step = match self.brackets.get(token.text.as_ref()) {
                        Some(handler) => handler(program)?,
                        None => Executable::List(program),
                    };
                    builder.append_sub_list(step);
                }
                TokenKind::RightBracket => {
                    return match opening {
                        Some(opening) => check_bracket_pair(opening, &token),
                        None => Err(CompileError::UnexpectedToken(token)),
                    };
                }
                _ => return Err(CompileError::UnexpectedToken(token)),
            }
        }

        match opening {
            Some(opening) => Err(CompileError::UnclosedBracket(opening.clone())),
            None => Ok(()),
        }
    }
}
