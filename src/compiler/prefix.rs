//! Lisp-style prefix notation.
//!
//! `(op a b c)` applies a binary operator across all its operands, folding them in
//! the operator's associativity, and `(op a)` applies the unary operator of the same
//! name. `(f a b)` calls `f`. Elements are separated by whitespace; commas between
//! them are accepted and ignored. There are no negative literals: `-1` is written
//! `(- 1)`.
//!
//! Where a whole expression is expected (the input itself, or the argument of a
//! notation switch like `prefix(+ 1 2)`) the outer brackets of an operator
//! application may be left out.

use std::rc::Rc;

use super::{
    node::ExprNode,
    state::{check_bracket_pair, AstParser, Grammar, StateId},
    CompileError,
};
use crate::{
    lexer::{Token, TokenKind, TokenStream},
    operator::{Arity, Associativity},
};

#[derive(Debug, Default, Clone, Copy)]
pub struct PrefixParser;

/// Reads elements with `element` up to the bracket closing `opening`, consuming it.
fn parse_list<E>(
    tokens: &mut TokenStream<'_>,
    opening: &Token,
    mut element: impl FnMut(&mut TokenStream<'_>) -> Result<ExprNode<E>, CompileError>,
) -> Result<(Vec<ExprNode<E>>, Token), CompileError> {
    let mut elements = Vec::new();
    loop {
        match tokens.peek_kind()? {
            None => return Err(CompileError::UnclosedBracket(opening.clone())),
            Some(TokenKind::Separator) => {
                tokens.next_token()?;
            }
            Some(TokenKind::RightBracket) => {
                let closing = tokens.next_token()?.ok_or(CompileError::UnexpectedEnd)?;
                check_bracket_pair(opening, &closing)?;
                return Ok((elements, closing));
            }
            Some(_) => elements.push(element(tokens)?),
        }
    }
}

/// Applies the operator named by `token` to `operands`.
fn apply<E>(grammar: &Grammar<E>, token: &Token, operands: Vec<ExprNode<E>>) -> Result<ExprNode<E>, CompileError> {
    let arity = match operands.len() {
        0 => {
            return Err(CompileError::ChildCount {
                name: token.text.clone(),
                expected: 1,
                actual: 0,
            })
        }
        1 => Arity::Unary,
        _ => Arity::Binary,
    };
    let op = grammar
        .operators()
        .get(&token.text, arity)
        .ok_or_else(|| CompileError::UnknownOperator {
            id: token.text.clone(),
            arity,
            span: token.span.clone(),
        })?;

    let nodes = grammar.nodes();
    if arity == Arity::Unary {
        return nodes.create_op_node(op, operands);
    }

    match op.associativity() {
        Associativity::Left => {
            let mut operands = operands.into_iter();
            let first = operands.next().ok_or(CompileError::UnexpectedEnd)?;
            operands.try_fold(first, |left, right| nodes.create_op_node(Rc::clone(&op), vec![left, right]))
        }
        Associativity::Right => {
            let mut operands = operands.into_iter().rev();
            let last = operands.next().ok_or(CompileError::UnexpectedEnd)?;
            operands.try_fold(last, |right, left| nodes.create_op_node(Rc::clone(&op), vec![left, right]))
        }
    }
}

impl PrefixParser {
    fn parse_element<E: 'static>(
        &self,
        grammar: &Grammar<E>,
        state: StateId,
        tokens: &mut TokenStream<'_>,
    ) -> Result<ExprNode<E>, CompileError> {
        let token = tokens.next_token()?.ok_or(CompileError::UnexpectedEnd)?;
        match token.kind {
            kind if kind.is_value() => grammar.nodes().create_value_node(&token),
            TokenKind::Symbol => Ok(ExprNode::SymbolGet(token.text.as_ref().into())),
            TokenKind::Modifier => {
                let (target, build) = grammar.modifier_transition(state, &token.text);
                let operand = grammar.parser(target).parse_operand(grammar, target, tokens)?;
                build(&token.text, operand)
            }
            TokenKind::LeftBracket if token.text.as_ref() == "(" => self.parse_round(grammar, state, tokens, token),
            TokenKind::LeftBracket => {
                let (children, closing) = parse_list(tokens, &token, |tokens| self.parse_element(grammar, state, tokens))?;
                grammar.nodes().create_bracket_node(&token, &closing, children)
            }
            _ => Err(CompileError::UnexpectedToken(token)),
        }
    }

    /// Everything after `(`: an operator application, a call, or a plain group.
    fn parse_round<E: 'static>(
        &self,
        grammar: &Grammar<E>,
        state: StateId,
        tokens: &mut TokenStream<'_>,
        opening: Token,
    ) -> Result<ExprNode<E>, CompileError> {
        match tokens.peek_kind()? {
            Some(TokenKind::Operator) => {
                let op = tokens.next_token()?.ok_or(CompileError::UnexpectedEnd)?;
                let (operands, _) = parse_list(tokens, &opening, |tokens| self.parse_element(grammar, state, tokens))?;
                apply(grammar, &op, operands)
            }
            Some(TokenKind::Symbol) => {
                let symbol = tokens.next_token()?.ok_or(CompileError::UnexpectedEnd)?;
                let (target, build) = grammar.symbol_transition(state, &symbol.text);
                // a notation switch reads whole expressions, plain calls read elements
                let (args, _) = if grammar.is_notation_switch(state, &symbol.text) {
                    let parser = grammar.parser(target);
                    parse_list(tokens, &opening, |tokens| parser.parse(grammar, target, tokens))?
                } else {
                    parse_list(tokens, &opening, |tokens| self.parse_element(grammar, target, tokens))?
                };
                build(&symbol.text, args)
            }
            _ => {
                let (children, closing) =
                    parse_list(tokens, &opening, |tokens| self.parse_element(grammar, state, tokens))?;
                grammar.nodes().create_bracket_node(&opening, &closing, children)
            }
        }
    }
}

impl<E: 'static> AstParser<E> for PrefixParser {
    fn parse(
        &self,
        grammar: &Grammar<E>,
        state: StateId,
        tokens: &mut TokenStream<'_>,
    ) -> Result<ExprNode<E>, CompileError> {
        if tokens.peek_kind()? != Some(TokenKind::Operator) {
            return self.parse_element(grammar, state, tokens);
        }

        let op = tokens.next_token()?.ok_or(CompileError::UnexpectedEnd)?;
        let mut operands = Vec::new();
        loop {
            match tokens.peek_kind()? {
                None | Some(TokenKind::RightBracket) => break,
                Some(TokenKind::Separator) => {
                    tokens.next_token()?;
                }
                Some(_) => operands.push(self.parse_element(grammar, state, tokens)?),
            }
        }
        apply(grammar, &op, operands)
    }

    fn parse_operand(
        &self,
        grammar: &Grammar<E>,
        state: StateId,
        tokens: &mut TokenStream<'_>,
    ) -> Result<ExprNode<E>, CompileError> {
        self.parse_element(grammar, state, tokens)
    }
}
