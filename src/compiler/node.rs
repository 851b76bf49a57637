use std::{fmt, rc::Rc};

use super::CompileError;
use crate::{
    operator::Operator,
    runtime::{Executable, Program},
};

type Flatten<E> = Rc<dyn Fn(&[ExprNode<E>], &mut Vec<Executable<E>>) -> Result<(), CompileError>>;

/// Node whose flattening is supplied by whoever built it.
pub struct SpecialForm<E> {
    pub name: Rc<str>,
    pub children: Vec<ExprNode<E>>,
    flatten: Flatten<E>,
}

impl<E> SpecialForm<E> {
    pub fn new(
        name: &str,
        children: Vec<ExprNode<E>>,
        flatten: impl Fn(&[ExprNode<E>], &mut Vec<Executable<E>>) -> Result<(), CompileError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            children,
            flatten: Rc::new(flatten),
        }
    }
}

pub enum ExprNode<E> {
    Value(E),
    SymbolGet(Rc<str>),
    SymbolCall {
        symbol: Rc<str>,
        args: Vec<ExprNode<E>>,
    },
    BinaryOp {
        op: Rc<Operator<E>>,
        left: Box<ExprNode<E>>,
        right: Box<ExprNode<E>>,
    },
    UnaryOp {
        op: Rc<Operator<E>>,
        operand: Box<ExprNode<E>>,
    },
    /// Transparent grouping. Empty groups compile to nothing.
    Bracket(Option<Box<ExprNode<E>>>),
    /// Bracketed list that only makes sense as arguments to something else.
    Container {
        opening: Box<str>,
        children: Vec<ExprNode<E>>,
    },
    Special(SpecialForm<E>),
}

impl<E> ExprNode<E> {
    pub fn children(&self) -> Vec<&ExprNode<E>> {
        match self {
            ExprNode::Value(_) | ExprNode::SymbolGet(_) | ExprNode::Bracket(None) => vec![],
            ExprNode::SymbolCall { args: children, .. }
            | ExprNode::Container { children, .. }
            | ExprNode::Special(SpecialForm { children, .. }) => children.iter().collect(),
            ExprNode::BinaryOp { left, right, .. } => vec![&**left, &**right],
            ExprNode::UnaryOp { operand: child, .. } | ExprNode::Bracket(Some(child)) => vec![&**child],
        }
    }
}

impl<E: Clone> ExprNode<E> {
    /// Appends the postfix instructions for this subtree.
    pub fn flatten(&self, output: &mut Vec<Executable<E>>) -> Result<(), CompileError> {
        match self {
            ExprNode::Value(value) => output.push(Executable::Value(value.clone())),
            ExprNode::SymbolGet(name) => output.push(Executable::SymbolGet(Rc::clone(name))),
            ExprNode::SymbolCall { symbol, args } => {
                for arg in args {
                    arg.flatten(output)?;
                }
                output.push(Executable::SymbolCall {
                    symbol: Rc::clone(symbol),
                    args: Some(args.len()),
                    returns: Some(1),
                });
            }
            ExprNode::BinaryOp { op, left, right } => {
                left.flatten(output)?;
                right.flatten(output)?;
                output.push(Executable::Operator(Rc::clone(op)));
            }
            ExprNode::UnaryOp { op, operand } => {
                operand.flatten(output)?;
                output.push(Executable::Operator(Rc::clone(op)));
            }
            ExprNode::Bracket(child) => {
                if let Some(child) = child {
                    child.flatten(output)?;
                }
            }
            ExprNode::Container { children, .. } => {
                return Err(CompileError::UnresolvedContainer {
                    count: children.len(),
                })
            }
            ExprNode::Special(form) => (form.flatten)(&form.children, output)?,
        }
        Ok(())
    }

    pub fn compile(&self) -> Result<Program<E>, CompileError> {
        let mut output = Vec::new();
        self.flatten(&mut output)?;
        Ok(Program::new(output))
    }
}

impl<E: fmt::Debug> fmt::Debug for ExprNode<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprNode::Value(value) => write!(f, "<v: {value:?}>"),
            ExprNode::SymbolGet(name) => write!(f, "<get: {name}>"),
            ExprNode::SymbolCall { symbol, args } => write!(f, "<call: {symbol} {args:?}>"),
            ExprNode::BinaryOp { op, left, right } => {
                write!(f, "<op: {} {left:?} {right:?}>", op.id())
            }
            ExprNode::UnaryOp { op, operand } => write!(f, "<op: {} {operand:?}>", op.id()),
            ExprNode::Bracket(Some(child)) => write!(f, "<b: {child:?}>"),
            ExprNode::Bracket(None) => f.write_str("<b>"),
            ExprNode::Container { opening, children } => write!(f, "<container{opening} {children:?}>"),
            ExprNode::Special(form) => write!(f, "<{}: {:?}>", form.name, form.children),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::{ExprNode, SpecialForm};
    use crate::{
        compiler::CompileError,
        operator::{Associativity, Operator},
        runtime::{Executable, Program},
    };
    use assert2::{check, let_assert};

    fn value(v: i64) -> ExprNode<i64> {
        ExprNode::Value(v)
    }

    #[test]
    fn calls_carry_argument_counts() {
        let node = ExprNode::SymbolCall {
            symbol: "max".into(),
            args: vec![value(1), ExprNode::SymbolGet("x".into())],
        };
        let_assert!(Ok(program) = node.compile());
        check!(
            program
                == Program::new([
                    Executable::Value(1),
                    Executable::SymbolGet("x".into()),
                    Executable::SymbolCall {
                        symbol: "max".into(),
                        args: Some(2),
                        returns: Some(1)
                    },
                ])
        );
    }

    #[test]
    fn operators_follow_operands() {
        let minus = Rc::new(Operator::binary("-", 1, Associativity::Left, |l: i64, r: i64| Ok(l - r)));
        let node = ExprNode::BinaryOp {
            op: Rc::clone(&minus),
            left: Box::new(value(1)),
            right: Box::new(ExprNode::Bracket(Some(Box::new(value(2))))),
        };
        check!(node.children().len() == 2);
        let_assert!(Ok(program) = node.compile());
        check!(
            program
                == Program::new([Executable::Value(1), Executable::Value(2), Executable::Operator(minus)])
        );
    }

    #[test]
    fn empty_bracket_and_containers() {
        let_assert!(Ok(program) = ExprNode::<i64>::Bracket(None).compile());
        check!(program.is_empty());

        let container = ExprNode::Container {
            opening: "(".into(),
            children: vec![value(1), value(2)],
        };
        let_assert!(Err(CompileError::UnresolvedContainer { count: 2 }) = container.compile());
    }

    #[test]
    fn special_forms_flatten_themselves() {
        let reversed = ExprNode::Special(SpecialForm::new(
            "reverse",
            vec![value(1), value(2)],
            |children, output| {
                for child in children.iter().rev() {
                    child.flatten(output)?;
                }
                Ok(())
            },
        ));
        let_assert!(Ok(program) = reversed.compile());
        check!(program == Program::new([Executable::Value(2), Executable::Value(1)]));
    }
}
