//! Parser states and the transitions between them.
//!
//! Every state pairs an [`AstParser`] with tables saying which state parses the
//! arguments of a given symbol call or the operand of a given modifier, and how the
//! resulting node is built. States live in a [`Grammar`] and refer to each other by
//! [`StateId`], so cyclic transitions need no shared ownership.

use std::{
    collections::{BTreeSet, HashMap},
    rc::Rc,
};

use tracing::trace;

use super::{node::ExprNode, CompileError, ValueParser};
use crate::{
    lexer::{Token, TokenKind, TokenStream},
    operator::{Arity, Operator, OperatorRegistry, RegistryError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(usize);

pub trait AstParser<E> {
    /// Parses one complete expression, stopping before a closing bracket or separator.
    fn parse(
        &self,
        grammar: &Grammar<E>,
        state: StateId,
        tokens: &mut TokenStream<'_>,
    ) -> Result<ExprNode<E>, CompileError>;

    /// Parses the single operand a modifier applies to.
    fn parse_operand(
        &self,
        grammar: &Grammar<E>,
        state: StateId,
        tokens: &mut TokenStream<'_>,
    ) -> Result<ExprNode<E>, CompileError> {
        self.parse(grammar, state, tokens)
    }
}

pub type SymbolNodeBuilder<E> = Rc<dyn Fn(&str, Vec<ExprNode<E>>) -> Result<ExprNode<E>, CompileError>>;
pub type ModifierNodeBuilder<E> = Rc<dyn Fn(&str, ExprNode<E>) -> Result<ExprNode<E>, CompileError>>;
pub type OperatorNodeBuilder<E> =
    Rc<dyn Fn(Rc<Operator<E>>, Vec<ExprNode<E>>) -> Result<ExprNode<E>, CompileError>>;

/// What a symbol call switches to: the state parsing its arguments and the node builder.
pub struct SymbolTransition<E> {
    target: Option<StateId>,
    build: SymbolNodeBuilder<E>,
}

impl<E> SymbolTransition<E> {
    /// Arguments are parsed by the state the call appears in.
    pub fn same_state(
        build: impl Fn(&str, Vec<ExprNode<E>>) -> Result<ExprNode<E>, CompileError> + 'static,
    ) -> Self {
        Self {
            target: None,
            build: Rc::new(build),
        }
    }

    pub fn switch_to(
        target: StateId,
        build: impl Fn(&str, Vec<ExprNode<E>>) -> Result<ExprNode<E>, CompileError> + 'static,
    ) -> Self {
        Self {
            target: Some(target),
            build: Rc::new(build),
        }
    }
}

/// What a modifier switches to: the state parsing its operand and the node builder.
pub struct ModifierTransition<E> {
    target: Option<StateId>,
    build: ModifierNodeBuilder<E>,
}

impl<E> ModifierTransition<E> {
    pub fn same_state(
        build: impl Fn(&str, ExprNode<E>) -> Result<ExprNode<E>, CompileError> + 'static,
    ) -> Self {
        Self {
            target: None,
            build: Rc::new(build),
        }
    }

    pub fn switch_to(
        target: StateId,
        build: impl Fn(&str, ExprNode<E>) -> Result<ExprNode<E>, CompileError> + 'static,
    ) -> Self {
        Self {
            target: Some(target),
            build: Rc::new(build),
        }
    }
}

struct ParserState<E> {
    parser: Rc<dyn AstParser<E>>,
    symbols: HashMap<Box<str>, SymbolTransition<E>>,
    modifiers: HashMap<Box<str>, ModifierTransition<E>>,
}

pub fn closing_bracket(opening: &str) -> Option<&'static str> {
    match opening {
        "(" => Some(")"),
        "[" => Some("]"),
        "{" => Some("}"),
        _ => None,
    }
}

pub fn check_bracket_pair(opening: &Token, closing: &Token) -> Result<(), CompileError> {
    if closing_bracket(&opening.text) == Some(closing.text.as_ref()) {
        Ok(())
    } else {
        Err(CompileError::MismatchedBracket {
            opening: opening.clone(),
            closing: closing.clone(),
        })
    }
}

/// Builds the nodes the parsers do not build through transitions.
pub struct NodeFactory<E> {
    value_parser: Rc<dyn ValueParser<E>>,
    operator_builders: HashMap<(Box<str>, Arity), OperatorNodeBuilder<E>>,
}

impl<E> NodeFactory<E> {
    pub fn create_value_node(&self, token: &Token) -> Result<ExprNode<E>, CompileError> {
        self.value_parser
            .parse_token(token)
            .map(ExprNode::Value)
            .map_err(|source| CompileError::InvalidValue {
                token: token.clone(),
                source,
            })
    }

    /// One child is a plain grouping, anything else is a container.
    pub fn create_bracket_node(
        &self,
        opening: &Token,
        closing: &Token,
        mut children: Vec<ExprNode<E>>,
    ) -> Result<ExprNode<E>, CompileError> {
        check_bracket_pair(opening, closing)?;
        if children.len() == 1 {
            Ok(ExprNode::Bracket(children.pop().map(Box::new)))
        } else {
            Ok(ExprNode::Container {
                opening: opening.text.clone(),
                children,
            })
        }
    }

    pub fn create_op_node(
        &self,
        op: Rc<Operator<E>>,
        mut children: Vec<ExprNode<E>>,
    ) -> Result<ExprNode<E>, CompileError> {
        let expected = op.arity().operands();
        if children.len() != expected {
            return Err(CompileError::ChildCount {
                name: op.id().into(),
                expected,
                actual: children.len(),
            });
        }

        if let Some(build) = self.operator_builders.get(&(Box::from(op.id()), op.arity())) {
            return build(op, children);
        }

        match (children.pop(), children.pop()) {
            (Some(right), Some(left)) => Ok(ExprNode::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            }),
            (Some(operand), None) => Ok(ExprNode::UnaryOp {
                op,
                operand: Box::new(operand),
            }),
            _ => Err(CompileError::UnexpectedEnd),
        }
    }
}

/// Arena of parser states sharing one operator registry and node factory.
pub struct Grammar<E> {
    states: Vec<ParserState<E>>,
    operators: Rc<OperatorRegistry<E>>,
    nodes: NodeFactory<E>,
    modifiers: BTreeSet<Box<str>>,
    default_symbol: SymbolNodeBuilder<E>,
    default_modifier: ModifierNodeBuilder<E>,
}

impl<E: 'static> Grammar<E> {
    pub fn new(operators: Rc<OperatorRegistry<E>>, value_parser: Rc<dyn ValueParser<E>>) -> Self {
        Self {
            states: Vec::new(),
            operators,
            nodes: NodeFactory {
                value_parser,
                operator_builders: HashMap::new(),
            },
            modifiers: BTreeSet::new(),
            default_symbol: Rc::new(|symbol: &str, args: Vec<ExprNode<E>>| -> Result<_, CompileError> {
                Ok(ExprNode::SymbolCall {
                    symbol: symbol.into(),
                    args,
                })
            }),
            default_modifier: Rc::new(|modifier: &str, operand: ExprNode<E>| -> Result<_, CompileError> {
                Ok(ExprNode::SymbolCall {
                    symbol: modifier.into(),
                    args: vec![operand],
                })
            }),
        }
    }
}

impl<E> Grammar<E> {
    pub fn add_state(&mut self, parser: impl AstParser<E> + 'static) -> StateId {
        self.states.push(ParserState {
            parser: Rc::new(parser),
            symbols: HashMap::new(),
            modifiers: HashMap::new(),
        });
        StateId(self.states.len() - 1)
    }

    pub fn add_symbol_transition(
        &mut self,
        state: StateId,
        symbol: &str,
        transition: SymbolTransition<E>,
    ) -> Result<&mut Self, RegistryError> {
        let symbols = &mut self.states[state.0].symbols;
        if symbols.contains_key(symbol) {
            return Err(RegistryError::DuplicateTransition(symbol.into()));
        }
        symbols.insert(symbol.into(), transition);
        Ok(self)
    }

    pub fn add_modifier_transition(
        &mut self,
        state: StateId,
        modifier: &str,
        transition: ModifierTransition<E>,
    ) -> Result<&mut Self, RegistryError> {
        let modifiers = &mut self.states[state.0].modifiers;
        if modifiers.contains_key(modifier) {
            return Err(RegistryError::DuplicateTransition(modifier.into()));
        }
        modifiers.insert(modifier.into(), transition);
        self.modifiers.insert(modifier.into());
        Ok(self)
    }

    /// Makes `modifier` known to the tokenizer without a dedicated transition.
    pub fn register_modifier(&mut self, modifier: &str) -> &mut Self {
        self.modifiers.insert(modifier.into());
        self
    }

    pub fn add_operator_node_builder(
        &mut self,
        id: &str,
        arity: Arity,
        build: impl Fn(Rc<Operator<E>>, Vec<ExprNode<E>>) -> Result<ExprNode<E>, CompileError> + 'static,
    ) -> Result<&mut Self, RegistryError> {
        let key = (Box::from(id), arity);
        if self.nodes.operator_builders.contains_key(&key) {
            return Err(RegistryError::DuplicateNodeBuilder { id: id.into(), arity });
        }
        self.nodes.operator_builders.insert(key, Rc::new(build));
        Ok(self)
    }

    pub fn set_default_symbol_builder(
        &mut self,
        build: impl Fn(&str, Vec<ExprNode<E>>) -> Result<ExprNode<E>, CompileError> + 'static,
    ) -> &mut Self {
        self.default_symbol = Rc::new(build);
        self
    }

    pub fn set_default_modifier_builder(
        &mut self,
        build: impl Fn(&str, ExprNode<E>) -> Result<ExprNode<E>, CompileError> + 'static,
    ) -> &mut Self {
        self.default_modifier = Rc::new(build);
        self
    }

    pub fn operators(&self) -> &OperatorRegistry<E> {
        &self.operators
    }

    pub fn nodes(&self) -> &NodeFactory<E> {
        &self.nodes
    }

    pub fn modifiers(&self) -> impl Iterator<Item = &str> {
        self.modifiers.iter().map(AsRef::as_ref)
    }

    pub fn parser(&self, state: StateId) -> Rc<dyn AstParser<E>> {
        Rc::clone(&self.states[state.0].parser)
    }

    /// State for the arguments of `symbol` called from `state`, and its node builder.
    pub fn symbol_transition(&self, state: StateId, symbol: &str) -> (StateId, SymbolNodeBuilder<E>) {
        match self.states[state.0].symbols.get(symbol) {
            Some(transition) => {
                trace!(symbol, "symbol transition");
                (transition.target.unwrap_or(state), Rc::clone(&transition.build))
            }
            None => (state, Rc::clone(&self.default_symbol)),
        }
    }

    /// Whether `symbol` called from `state` switches notation, even to `state` itself.
    pub fn is_notation_switch(&self, state: StateId, symbol: &str) -> bool {
        self.states[state.0]
            .symbols
            .get(symbol)
            .is_some_and(|transition| transition.target.is_some())
    }

    pub fn modifier_transition(&self, state: StateId, modifier: &str) -> (StateId, ModifierNodeBuilder<E>) {
        match self.states[state.0].modifiers.get(modifier) {
            Some(transition) => {
                trace!(modifier, "modifier transition");
                (transition.target.unwrap_or(state), Rc::clone(&transition.build))
            }
            None => (state, Rc::clone(&self.default_modifier)),
        }
    }

    /// Comma separated expressions up to the bracket closing `opening`, which has
    /// already been consumed.
    pub fn parse_arguments(
        &self,
        state: StateId,
        tokens: &mut TokenStream<'_>,
        opening: &Token,
    ) -> Result<(Vec<ExprNode<E>>, Token), CompileError> {
        let parser = self.parser(state);
        let mut children = Vec::new();

        if tokens.peek_kind()? == Some(TokenKind::RightBracket) {
            if let Some(closing) = tokens.next_token()? {
                check_bracket_pair(opening, &closing)?;
                return Ok((children, closing));
            }
        }

        loop {
            children.push(parser.parse(self, state, tokens)?);
            match tokens.next_token()? {
                Some(token) if token.kind == TokenKind::Separator => {}
                Some(token) if token.kind == TokenKind::RightBracket => {
                    check_bracket_pair(opening, &token)?;
                    return Ok((children, token));
                }
                Some(token) => return Err(CompileError::UnexpectedToken(token)),
                None => return Err(CompileError::UnclosedBracket(opening.clone())),
            }
        }
    }

    /// Parses a whole input in `state`. Leftover tokens are an error.
    pub fn parse(&self, state: StateId, tokens: &mut TokenStream<'_>) -> Result<ExprNode<E>, CompileError> {
        let node = self.parser(state).parse(self, state, tokens)?;
        match tokens.next_token()? {
            Some(token) => Err(CompileError::UnexpectedToken(token)),
            None => Ok(node),
        }
    }
}
