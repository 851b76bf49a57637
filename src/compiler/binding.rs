//! Local binding groups for the tree notations.
//!
//! Infix: `let([x: 2, add(a): a + x], add(x))`.
//! Prefix: `(let [(: x 2) (: (add a) (+ a x))] (add x))`.
//!
//! `=` may be written in place of `:`. Postfix has no spelling of its own; a postfix
//! program sees the separators only as operators that fail when executed.

use std::rc::Rc;

use super::{
    node::{ExprNode, SpecialForm},
    state::{Grammar, StateId, SymbolTransition},
    CompileError,
};
use crate::{
    operator::{Arity, Associativity, Operator, OperatorRegistry, RegistryError},
    runtime::{Binding, BindingGroup, ExecError, Executable},
};

pub const LET_SYMBOL: &str = "let";
pub const BINDING_SEPARATORS: [&str; 2] = [":", "="];

/// Registers the separators as right-associative binary operators at `precedence`,
/// which should be below every other binary operator.
pub fn register_separators<E: 'static>(
    registry: &mut OperatorRegistry<E>,
    precedence: i32,
) -> Result<(), RegistryError> {
    for separator in BINDING_SEPARATORS {
        registry.register(Operator::binary(
            separator,
            precedence,
            Associativity::Right,
            move |_: E, _: E| Err(ExecError::Failed(format!("'{separator}' outside of a binding list").into())),
        ))?;
    }
    Ok(())
}

/// Adds `let` to each of `states` and the separator nodes it reads its bindings from.
pub fn register_let<E: Clone + 'static>(grammar: &mut Grammar<E>, states: &[StateId]) -> Result<(), RegistryError> {
    for separator in BINDING_SEPARATORS {
        grammar.add_operator_node_builder(separator, Arity::Binary, separator_node)?;
    }
    for &state in states {
        grammar.add_symbol_transition(state, LET_SYMBOL, SymbolTransition::same_state(let_node))?;
    }
    Ok(())
}

fn is_separator(name: &str) -> bool {
    BINDING_SEPARATORS.contains(&name)
}

/// `target: value` only compiles as an entry of a binding list.
fn separator_node<E>(op: Rc<Operator<E>>, children: Vec<ExprNode<E>>) -> Result<ExprNode<E>, CompileError> {
    let separator: Box<str> = op.id().into();
    Ok(ExprNode::Special(SpecialForm::new(op.id(), children, move |_, _| {
        Err(CompileError::MisplacedBinding {
            separator: separator.clone(),
        })
    })))
}

enum Target {
    Value(Box<str>),
    Function { name: Box<str>, params: Vec<Box<str>> },
}

fn invalid(form: &str) -> CompileError {
    CompileError::InvalidBinding { form: form.into() }
}

fn split_entry<E>(form: &str, entry: ExprNode<E>) -> Result<(Target, ExprNode<E>), CompileError> {
    let ExprNode::Special(SpecialForm { name, children, .. }) = entry else {
        return Err(invalid(form));
    };
    if !is_separator(&name) {
        return Err(invalid(form));
    }
    let [target, value] = <[ExprNode<E>; 2]>::try_from(children).map_err(|_| invalid(form))?;

    let target = match target {
        ExprNode::SymbolGet(name) => Target::Value(name.as_ref().into()),
        ExprNode::SymbolCall { symbol, args } => Target::Function {
            name: symbol.as_ref().into(),
            params: args
                .into_iter()
                .map(|arg| match arg {
                    ExprNode::SymbolGet(param) => Ok(param.as_ref().into()),
                    _ => Err(invalid(form)),
                })
                .collect::<Result<_, _>>()?,
        },
        _ => return Err(invalid(form)),
    };
    Ok((target, value))
}

/// The entries of the binding list: a bracketed list, a single bracketed entry, or a
/// bare entry.
fn entries<E>(form: &str, list: ExprNode<E>) -> Result<Vec<ExprNode<E>>, CompileError> {
    match list {
        ExprNode::Container { children, .. } => Ok(children),
        ExprNode::Bracket(Some(entry)) => Ok(vec![*entry]),
        ExprNode::Bracket(None) => Ok(Vec::new()),
        entry @ ExprNode::Special(_) => Ok(vec![entry]),
        _ => Err(invalid(form)),
    }
}

fn let_node<E: Clone + 'static>(name: &str, children: Vec<ExprNode<E>>) -> Result<ExprNode<E>, CompileError> {
    let [list, body] = <[ExprNode<E>; 2]>::try_from(children).map_err(|children| CompileError::ChildCount {
        name: name.into(),
        expected: 2,
        actual: children.len(),
    })?;

    let mut targets = Vec::new();
    let mut nodes = Vec::new();
    for entry in entries(name, list)? {
        let (target, value) = split_entry(name, entry)?;
        targets.push(target);
        nodes.push(value);
    }
    nodes.push(body);

    Ok(ExprNode::Special(SpecialForm::new(name, nodes, move |children, output| {
        let Some((body, values)) = children.split_last() else {
            return Err(CompileError::UnexpectedEnd);
        };
        let bindings = targets
            .iter()
            .zip(values)
            .map(|(target, value)| -> Result<Binding<E>, CompileError> {
                Ok(match target {
                    Target::Value(name) => Binding::Value {
                        name: name.clone(),
                        value: value.compile()?,
                    },
                    Target::Function { name, params } => Binding::Function {
                        name: name.clone(),
                        params: params.clone(),
                        body: value.compile()?,
                    },
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        output.push(Executable::Bind(Rc::new(BindingGroup::new(bindings, body.compile()?))));
        Ok(())
    })))
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use crate::{
        compiler::CompileError,
        environment::CalcError,
        fp,
        runtime::{ExecError, Executable},
        Notation,
    };

    #[test]
    fn infix_bindings() {
        let_assert!(Ok(calculator) = fp::calculator());
        let eval = |source| calculator.compile_and_execute(Notation::Infix, source);
        check!(eval("let([x: 2, y: 3], x + y)") == Ok(vec![5.0]));
        check!(eval("let([x = 2, y = 3], x * y)") == Ok(vec![6.0]));
        check!(eval("let(x: 4, x ^ 2)") == Ok(vec![16.0]));
        check!(eval("let([], 7)") == Ok(vec![7.0]));
        check!(eval("let([x(): 2], x())") == Ok(vec![2.0]));
        check!(eval("let([add(a, b): a + b], add(1, 2))") == Ok(vec![3.0]));
        check!(eval("1 + let([x: 2], x) * 3") == Ok(vec![7.0]));
        check!(!calculator.environment.top().defines("x"));
    }

    #[test]
    fn prefix_bindings() {
        let_assert!(Ok(calculator) = fp::calculator());
        let eval = |source| calculator.compile_and_execute(Notation::Prefix, source);
        check!(eval("(let [(: x 2) (: y 3)] (+ x y))") == Ok(vec![5.0]));
        check!(eval("(let [(= x 2)] (* x x))") == Ok(vec![4.0]));
        check!(eval("(let [(: (add a b) (+ a b))] (add 1 2))") == Ok(vec![3.0]));
        check!(eval("(let [(: (f) 9)] (f))") == Ok(vec![9.0]));
    }

    #[test]
    fn shadowing_and_capture() {
        let_assert!(Ok(calculator) = fp::calculator());
        let eval = |source| calculator.compile_and_execute(Notation::Infix, source);
        check!(eval("let([x: 2], let([y: x], let([x: 3], y)))") == Ok(vec![2.0]));
        check!(eval("let([x: 2], let([f(a): a + x], let([x: 3], f(4))))") == Ok(vec![6.0]));
        // values see the enclosing x, not the one bound next to them
        check!(eval("let([x: 5], let([x: 2, y: x], x + y))") == Ok(vec![7.0]));
        check!(eval("let([PI: 3], PI)") == Ok(vec![3.0]));

        let eval = |source| calculator.compile_and_execute(Notation::Prefix, source);
        check!(eval("(let [(: x 2)] (let [(: x 3)] x))") == Ok(vec![3.0]));
        check!(eval("(let [(: x 1)] (let [(: (f) x) (: x 10)] (+ x (f))))") == Ok(vec![11.0]));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let_assert!(Ok(calculator) = fp::calculator());
        let duplicate = Err(CalcError::Exec(ExecError::AlreadyDefined { name: "x".into() }));
        check!(calculator.compile_and_execute(Notation::Infix, "let([x: 1, x: 2], x)") == duplicate);
        check!(calculator.compile_and_execute(Notation::Infix, "let([x: 1, x(): 2], x)") == duplicate);
        check!(calculator.compile_and_execute(Notation::Prefix, "(let [(: x 1) (= x 2)] x)") == duplicate);
    }

    #[test]
    fn malformed_bindings() {
        let_assert!(Ok(calculator) = fp::calculator());
        let compile = |notation, source| calculator.compile(notation, source);

        let_assert!(Err(CompileError::InvalidBinding { form }) = compile(Notation::Infix, "let([x + 1], x)"));
        check!(form.as_ref() == "let");
        let_assert!(Err(CompileError::InvalidBinding { .. }) = compile(Notation::Infix, "let([2: 1], 1)"));
        let_assert!(Err(CompileError::InvalidBinding { .. }) = compile(Notation::Infix, "let([f(1): 1], 1)"));
        let_assert!(Err(CompileError::InvalidBinding { .. }) = compile(Notation::Prefix, "(let 1 2)"));
        let_assert!(
            Err(CompileError::ChildCount { expected: 2, actual: 1, .. }) = compile(Notation::Infix, "let([x: 1])")
        );

        let_assert!(Err(CompileError::MisplacedBinding { separator }) = compile(Notation::Infix, "x: 1"));
        check!(separator.as_ref() == ":");
        let_assert!(Err(CompileError::MisplacedBinding { .. }) = compile(Notation::Prefix, "(+ 1 (= x 2))"));
        check!(
            calculator.compile_and_execute(Notation::Postfix, "1 2 =")
                == Err(CalcError::Exec(ExecError::Failed("'=' outside of a binding list".into())))
        );
    }

    #[test]
    fn compiles_to_one_binding_group() {
        let_assert!(Ok(calculator) = fp::calculator());
        let_assert!(Ok(first) = calculator.compile(Notation::Infix, "let([x: 2, f(a): a * x], f(x))"));
        let_assert!(Ok(second) = calculator.compile(Notation::Prefix, "(let [(: x 2) (: (f a) (* a x))] (f x))"));
        check!(first == second);
        let_assert!([Executable::Bind(group)] = first.steps());
        check!(group.bindings().len() == 2);
        check!(calculator.execute(&first) == Ok(vec![4.0]));
        check!(calculator.execute(&first) == Ok(vec![4.0]));
    }
}
