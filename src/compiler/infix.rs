//! Operator-precedence parser for infix notation.

use std::rc::Rc;

use super::{
    node::ExprNode,
    state::{AstParser, Grammar, StateId},
    CompileError,
};
use crate::{
    lexer::{TokenKind, TokenStream},
    operator::{Arity, Operator},
};

/// Shunting-yard over operand and operator stacks.
///
/// Unary operators bind tighter than any binary one. Two operands written next to each
/// other (`2(3)`, `5max(2, 3)`) are joined by the registry's default binary operator.
#[derive(Debug, Default, Clone, Copy)]
pub struct InfixParser;

struct Shunting<E> {
    operands: Vec<ExprNode<E>>,
    operators: Vec<Rc<Operator<E>>>,
}

impl<E> Shunting<E> {
    fn reduce(&mut self, grammar: &Grammar<E>, op: Rc<Operator<E>>) -> Result<(), CompileError> {
        let count = op.arity().operands();
        if self.operands.len() < count {
            return Err(CompileError::UnexpectedEnd);
        }
        let children = self.operands.split_off(self.operands.len() - count);
        let node = grammar.nodes().create_op_node(op, children)?;
        self.operands.push(node);
        Ok(())
    }

    fn push_binary(&mut self, grammar: &Grammar<E>, op: Rc<Operator<E>>) -> Result<(), CompileError> {
        while let Some(top) = self.operators.last() {
            if top.arity() == Arity::Unary || op.is_lower_priority(top) {
                let top = Rc::clone(top);
                self.operators.pop();
                self.reduce(grammar, top)?;
            } else {
                break;
            }
        }
        self.operators.push(op);
        Ok(())
    }

    fn finish(mut self, grammar: &Grammar<E>) -> Result<ExprNode<E>, CompileError> {
        while let Some(op) = self.operators.pop() {
            self.reduce(grammar, op)?;
        }
        match (self.operands.pop(), self.operands.is_empty()) {
            (Some(node), true) => Ok(node),
            _ => Err(CompileError::UnexpectedEnd),
        }
    }
}

impl<E: 'static> AstParser<E> for InfixParser {
    fn parse(
        &self,
        grammar: &Grammar<E>,
        state: StateId,
        tokens: &mut TokenStream<'_>,
    ) -> Result<ExprNode<E>, CompileError> {
        let mut shunting = Shunting {
            operands: Vec::new(),
            operators: Vec::new(),
        };
        let mut expect_operand = true;

        loop {
            let Some(kind) = tokens.peek_kind()? else {
                break;
            };

            match kind {
                TokenKind::RightBracket | TokenKind::Separator => break,
                TokenKind::Operator => {
                    let Some(token) = tokens.next_token()? else {
                        break;
                    };
                    let arity = if expect_operand { Arity::Unary } else { Arity::Binary };
                    let op = grammar.operators().get(&token.text, arity).ok_or_else(|| {
                        CompileError::UnknownOperator {
                            id: token.text.clone(),
                            arity,
                            span: token.span.clone(),
                        }
                    })?;
                    match arity {
                        Arity::Unary => shunting.operators.push(op),
                        Arity::Binary => {
                            shunting.push_binary(grammar, op)?;
                            expect_operand = true;
                        }
                    }
                }
                _ if expect_operand => {
                    let operand = self.parse_operand(grammar, state, tokens)?;
                    shunting.operands.push(operand);
                    expect_operand = false;
                }
                _ => {
                    let Some(op) = grammar.operators().default_operator(Arity::Binary) else {
                        let token = tokens.next_token()?;
                        return Err(token.map_or(CompileError::UnexpectedEnd, CompileError::UnexpectedToken));
                    };
                    shunting.push_binary(grammar, op)?;
                    expect_operand = true;
                }
            }
        }

        if expect_operand {
            return Err(match tokens.next_token()? {
                Some(token) => CompileError::UnexpectedToken(token),
                None => CompileError::UnexpectedEnd,
            });
        }
        shunting.finish(grammar)
    }

    fn parse_operand(
        &self,
        grammar: &Grammar<E>,
        state: StateId,
        tokens: &mut TokenStream<'_>,
    ) -> Result<ExprNode<E>, CompileError> {
        let token = tokens.next_token()?.ok_or(CompileError::UnexpectedEnd)?;
        match token.kind {
            kind if kind.is_value() => grammar.nodes().create_value_node(&token),
            TokenKind::Symbol => {
                if tokens
                    .peek()?
                    .is_some_and(|next| next.kind == TokenKind::LeftBracket && next.text.as_ref() == "(")
                {
                    let opening = tokens.next_token()?.ok_or(CompileError::UnexpectedEnd)?;
                    let (target, build) = grammar.symbol_transition(state, &token.text);
                    let (args, _) = grammar.parse_arguments(target, tokens, &opening)?;
                    build(&token.text, args)
                } else {
                    Ok(ExprNode::SymbolGet(token.text.as_ref().into()))
                }
            }
            TokenKind::Modifier => {
                let (target, build) = grammar.modifier_transition(state, &token.text);
                let operand = grammar.parser(target).parse_operand(grammar, target, tokens)?;
                build(&token.text, operand)
            }
            TokenKind::LeftBracket => {
                let (children, closing) = grammar.parse_arguments(state, tokens, &token)?;
                grammar.nodes().create_bracket_node(&token, &closing, children)
            }
            _ => Err(CompileError::UnexpectedToken(token)),
        }
    }
}
