//! PEtab math expressions
//!
//! Observable formulas, noise formulas and (for newer problems) condition
//! target values are written in a small infix language. This module parses
//! that language into an [Expr] tree which can be inspected for free
//! symbols, substituted and evaluated numerically.
//!
//! ```rust
//! use petab::math::parse;
//!
//! let expr = parse("2 * observableParameter1_obs_a ^ 2").unwrap();
//! assert!(expr.has_symbol("observableParameter1_obs_a"));
//! ```
pub mod ast;
pub mod builtins;
pub mod eval;
pub mod parser;

use std::str::FromStr;

use thiserror::Error;

pub use ast::{BinaryOp, Expr, ParseError, UnaryOp};
pub use eval::{NoSymbols, SymbolTable};

#[derive(Error, Debug, Clone)]
pub enum MathError {
    #[error("Could not parse formula `{formula}`: {source}")]
    Parse {
        formula: String,
        #[source]
        source: ParseError,
    },
    #[error("Empty formula")]
    EmptyFormula,
    #[error("Formula `{formula}` references unresolved symbols: {missing:?}")]
    UnresolvedSymbols {
        formula: String,
        missing: Vec<String>,
    },
    #[error("Unknown function `{0}`")]
    UnknownFunction(String),
    #[error("Function `{name}` called with {got} arguments")]
    ArgumentCount { name: String, got: usize },
    #[error("No condition of piecewise is true and no otherwise value was given")]
    PiecewiseNoMatch,
}

/// Parse a PEtab math string
///
/// Function names are checked against the known builtins, so `foo(x)` is
/// rejected here rather than at evaluation time.
pub fn parse(formula: &str) -> Result<Expr, MathError> {
    if formula.trim().is_empty() {
        return Err(MathError::EmptyFormula);
    }
    let tokens = parser::tokenize(formula).map_err(|source| MathError::Parse {
        formula: formula.to_string(),
        source,
    })?;
    let expr = parser::Parser::new(tokens)
        .parse_complete()
        .map_err(|source| MathError::Parse {
            formula: formula.to_string(),
            source,
        })?;
    check_calls(&expr)?;
    Ok(expr)
}

fn check_calls(expr: &Expr) -> Result<(), MathError> {
    match expr {
        Expr::Number(_) | Expr::Bool(_) | Expr::Symbol(_) => Ok(()),
        Expr::Unary { rhs, .. } => check_calls(rhs),
        Expr::Binary { lhs, rhs, .. } => {
            check_calls(lhs)?;
            check_calls(rhs)
        }
        Expr::Call { name, args } => {
            let range = builtins::arg_count_range(name)
                .ok_or_else(|| MathError::UnknownFunction(name.clone()))?;
            if !range.contains(&args.len()) {
                return Err(MathError::ArgumentCount {
                    name: name.clone(),
                    got: args.len(),
                });
            }
            args.iter().try_for_each(check_calls)
        }
    }
}

impl FromStr for Expr {
    type Err = MathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_function_is_rejected() {
        assert!(matches!(
            parse("foo(1)"),
            Err(MathError::UnknownFunction(name)) if name == "foo"
        ));
    }

    #[test]
    fn test_empty_formula() {
        assert!(matches!(parse("  "), Err(MathError::EmptyFormula)));
    }

    #[test]
    fn test_unary_minus_and_power() {
        assert_eq!(parse("-2^2").unwrap().eval_constant().unwrap(), -4.0);
        assert_eq!(parse("2**-1").unwrap().eval_constant().unwrap(), 0.5);
    }

    #[test]
    fn test_display_round_trip() {
        for formula in ["a + b*c", "(a + b)*c", "-(a + b)", "a^b^c", "(a^b)^c", "a - (b - c)"] {
            let expr = parse(formula).unwrap();
            assert_eq!(expr.to_string(), formula);
            assert_eq!(parse(&expr.to_string()).unwrap(), expr);
        }
    }

    #[test]
    fn test_e_is_not_a_constant() {
        let expr = parse("e * 2").unwrap();
        assert!(expr.has_symbol("e"));
        assert!(expr.eval_constant().is_err());
    }

    #[test]
    fn test_free_symbols_exclude_pi_and_functions() {
        let expr: Expr = "exp(k1) * pi + log(x, 2)".parse().unwrap();
        let symbols: Vec<String> = expr.free_symbols().into_iter().collect();
        assert_eq!(symbols, vec!["k1".to_string(), "x".to_string()]);
    }
}
