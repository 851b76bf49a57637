//! Double precision back-end.

use rand::Rng;

use crate::{
    compiler::{binding, ValueParser},
    environment::{Calculator, Environment},
    lexer::Token,
    num::{Positional, ValueError},
    operator::{Associativity, Operator, OperatorRegistry, RegistryError},
    runtime::{swap, Accumulator, Dup, Fail, FixedCallable, Pop},
};

/// Reads every numeric literal form as an `f64`. Strings are rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct DoubleParser;

impl ValueParser<f64> for DoubleParser {
    fn parse_token(&self, token: &Token) -> Result<f64, ValueError> {
        Positional::from_token(token).map(|number| number.to_f64())
    }
}

pub fn operators() -> Result<OperatorRegistry<f64>, RegistryError> {
    use Associativity::{Left, Right};

    let mut registry = OperatorRegistry::new();
    registry.register(Operator::binary("+", 1, Left, |l: f64, r: f64| Ok(l + r)))?;
    registry.register(Operator::binary("-", 1, Left, |l: f64, r: f64| Ok(l - r)))?;
    registry.register_default(Operator::binary("*", 2, Left, |l: f64, r: f64| Ok(l * r)))?;
    registry.register(Operator::binary("/", 2, Left, |l: f64, r: f64| Ok(l / r)))?;
    registry.register(Operator::binary("%", 2, Left, |l: f64, r: f64| Ok(l % r)))?;
    registry.register(Operator::binary("^", 4, Right, |l: f64, r: f64| Ok(l.powf(r))))?;
    registry.register(Operator::binary("**", 4, Right, |l: f64, r: f64| Ok(l.powf(r))))?;
    registry.register(Operator::unary("-", 5, |v: f64| Ok(-v)))?;
    registry.register(Operator::unary("+", 5, |v: f64| Ok(v)))?;
    binding::register_separators(&mut registry, 0)?;
    Ok(registry)
}

fn unary(environment: &Environment<f64>, name: &str, f: fn(f64) -> f64) {
    environment.set_global_callable(name, FixedCallable::unary(move |v: f64| Ok(f(v))));
}

fn signum(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v.signum()
    }
}

/// Standard normal sample, Box-Muller.
fn gauss() -> f64 {
    let mut rng = rand::thread_rng();
    // 1 - [0, 1) keeps the logarithm finite
    let radius = (-2.0 * (1.0 - rng.gen::<f64>()).ln()).sqrt();
    radius * (std::f64::consts::TAU * rng.gen::<f64>()).cos()
}

pub fn register_functions(environment: &Environment<f64>) {
    use std::f64::consts;

    environment.set_global_value("PI", consts::PI);
    environment.set_global_value("E", consts::E);
    environment.set_global_value("INF", f64::INFINITY);
    environment.set_global_value("NAN", f64::NAN);
    environment.set_global_value("MAX", f64::MAX);

    unary(environment, "abs", f64::abs);
    unary(environment, "sgn", signum);
    unary(environment, "sqrt", f64::sqrt);
    unary(environment, "floor", f64::floor);
    unary(environment, "ceil", f64::ceil);
    unary(environment, "round", f64::round);
    unary(environment, "ln", f64::ln);
    unary(environment, "log10", f64::log10);
    unary(environment, "exp", f64::exp);
    unary(environment, "sin", f64::sin);
    unary(environment, "cos", f64::cos);
    unary(environment, "tan", f64::tan);
    unary(environment, "asin", f64::asin);
    unary(environment, "acos", f64::acos);
    unary(environment, "atan", f64::atan);
    unary(environment, "sinh", f64::sinh);
    unary(environment, "cosh", f64::cosh);
    unary(environment, "tanh", f64::tanh);
    unary(environment, "asinh", f64::asinh);
    unary(environment, "acosh", f64::acosh);
    unary(environment, "atanh", f64::atanh);
    unary(environment, "rad", f64::to_radians);
    unary(environment, "deg", f64::to_degrees);

    environment.set_global_callable("rand", FixedCallable::nullary(|| Ok(rand::thread_rng().gen::<f64>())));
    environment.set_global_callable("gauss", FixedCallable::nullary(|| Ok(gauss())));

    environment.set_global_callable("atan2", FixedCallable::binary(|y: f64, x: f64| Ok(y.atan2(x))));
    environment.set_global_callable("log", FixedCallable::binary(|v: f64, base: f64| Ok(v.log(base))));

    environment.set_global_callable("min", Accumulator::new(0.0, |v: f64, acc: f64| Ok(v.min(acc))));
    environment.set_global_callable("max", Accumulator::new(0.0, |v: f64, acc: f64| Ok(v.max(acc))));
    environment.set_global_callable("sum", Accumulator::new(0.0, |v: f64, acc: f64| Ok(v + acc)));
    environment.set_global_callable(
        "avg",
        Accumulator::new(0.0, |v: f64, acc: f64| Ok(v + acc))
            .with_finish(|sum: f64, count: usize| Ok(sum / count as f64)),
    );

    environment.set_global_callable("pop", Pop);
    environment.set_global_callable("dup", Dup);
    environment.set_global_callable("swap", swap::<f64>());
    environment.set_global_callable("fail", Fail::new(|v: &f64| v.to_string()));
}

/// The complete `f64` calculator: operators, functions and compile-time constants.
pub fn calculator() -> Result<Calculator<f64>, RegistryError> {
    let environment = Environment::new(0.0);
    register_functions(&environment);
    Calculator::new(environment, operators()?, DoubleParser)?
        .with_constant_evaluation()?
        .with_local_bindings()
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::{calculator, DoubleParser};
    use crate::{
        compiler::{CompileError, ValueParser},
        environment::CalcError,
        lexer::{Token, TokenKind},
        num::ValueError,
        runtime::{ExecError, ExecutionError},
        Notation,
    };

    #[test]
    fn literals() {
        let token = |kind, text: &str| Token::new(kind, text, 0..text.len());
        check!(DoubleParser.parse_token(&token(TokenKind::DecNumber, "2.5")) == Ok(2.5));
        check!(DoubleParser.parse_token(&token(TokenKind::HexNumber, "0x1.8")) == Ok(1.5));
        check!(DoubleParser.parse_token(&token(TokenKind::QuotedNumber, "3#12")) == Ok(5.0));
        check!(
            DoubleParser.parse_token(&token(TokenKind::String, "x"))
                == Err(ValueError::Unsupported(TokenKind::String))
        );

        let_assert!(Ok(calculator) = calculator());
        let_assert!(
            Err(CompileError::InvalidValue { token, .. }) = calculator.compile(Notation::Infix, "1 + 'one'")
        );
        check!(token.kind == TokenKind::String);
    }

    #[test]
    fn library() {
        let_assert!(Ok(calculator) = calculator());
        let eval = |source| calculator.compile_and_execute(Notation::Infix, source);
        check!(eval("sgn(0) + sgn(-3)") == Ok(vec![-1.0]));
        check!(eval("avg(1, 2, 6)") == Ok(vec![3.0]));
        check!(eval("sum(1, 2, 3, 4)") == Ok(vec![10.0]));
        check!(eval("min(4, 2, 8)") == Ok(vec![2.0]));
        check!(eval("log(1, 2) + log10(1000)") == Ok(vec![3.0]));
        check!(eval("7 % 4") == Ok(vec![3.0]));
        check!(eval("floor(2.7) + ceil(0.2)") == Ok(vec![3.0]));
        check!(eval("2 ** 3 ** 2") == Ok(vec![512.0]));
        check!(eval("-2 ** 2") == Ok(vec![4.0]));
        check!(eval("MAX") == Ok(vec![f64::MAX]));
        let_assert!(Ok(degrees) = eval("deg(PI)"));
        check!((degrees[0] - 180.0).abs() < 1e-12);
        let_assert!(Ok(radians) = eval("rad(180)"));
        check!((radians[0] - std::f64::consts::PI).abs() < 1e-12);
        check!(eval("sinh(0) + tanh(0) + asinh(0) + atanh(0)") == Ok(vec![0.0]));
        check!(eval("cosh(0) + acosh(1)") == Ok(vec![1.0]));
    }

    #[test]
    fn random_sources() {
        let_assert!(Ok(calculator) = calculator());
        let eval = |source| calculator.compile_and_execute(Notation::Infix, source);
        for _ in 0..100 {
            let_assert!(Ok(sample) = eval("rand()"));
            check!(sample.len() == 1);
            check!((0.0..1.0).contains(&sample[0]));
            let_assert!(Ok(normal) = eval("gauss()"));
            check!(normal[0].is_finite());
        }
        check!(eval("rand(1)") == Err(CalcError::Exec(ExecError::ArgumentCount { expected: 0, actual: 1 })));
    }

    #[test]
    fn arity_mismatches() {
        let_assert!(Ok(calculator) = calculator());
        let eval = |source| calculator.compile_and_execute(Notation::Infix, source);
        check!(eval("abs(0, 1)") == Err(CalcError::Exec(ExecError::ArgumentCount { expected: 1, actual: 2 })));
        let_assert!(Err(CalcError::Exec(ExecError::GetFailed { name, source })) = eval("1 + abs"));
        check!(name.as_ref() == "abs");
        check!(*source == ExecError::NotGettable);
    }

    #[test]
    fn fail_is_a_script_error() {
        let_assert!(Ok(calculator) = calculator());
        let eval = |source| calculator.compile_and_execute(Notation::Infix, source);
        check!(eval("fail()") == Err(ExecError::Execution(ExecutionError { message: None }).into()));
        check!(eval("fail(3)") == Err(ExecError::Execution(ExecutionError::new("3")).into()));
    }
}
