use std::collections::{BTreeMap, HashMap};

use crate::math::ast::{BinaryOp, Expr, UnaryOp};
use crate::math::builtins::eval_call;
use crate::math::MathError;

/// Source of numeric values for the free symbols of an expression
pub trait SymbolTable {
    fn value(&self, name: &str) -> Option<f64>;
}

impl SymbolTable for HashMap<String, f64> {
    fn value(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

impl SymbolTable for BTreeMap<String, f64> {
    fn value(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

impl<F> SymbolTable for F
where
    F: Fn(&str) -> Option<f64>,
{
    fn value(&self, name: &str) -> Option<f64> {
        self(name)
    }
}

/// A table without any symbols, for constant expressions
pub struct NoSymbols;

impl SymbolTable for NoSymbols {
    fn value(&self, _name: &str) -> Option<f64> {
        None
    }
}

fn truth(v: f64) -> f64 {
    if v != 0.0 {
        1.0
    } else {
        0.0
    }
}

impl Expr {
    /// Evaluate the expression numerically
    ///
    /// Booleans evaluate to `1.0` and `0.0`. Every free symbol must be
    /// resolvable through `symbols`, otherwise [MathError::UnresolvedSymbols]
    /// lists the missing ones.
    pub fn eval(&self, symbols: &impl SymbolTable) -> Result<f64, MathError> {
        let missing: Vec<String> = self
            .free_symbols()
            .into_iter()
            .filter(|s| symbols.value(s).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(MathError::UnresolvedSymbols {
                formula: self.to_string(),
                missing,
            });
        }
        self.eval_inner(symbols)
    }

    /// Evaluate an expression without free symbols
    pub fn eval_constant(&self) -> Result<f64, MathError> {
        self.eval(&NoSymbols)
    }

    fn eval_inner(&self, symbols: &impl SymbolTable) -> Result<f64, MathError> {
        match self {
            Expr::Number(v) => Ok(*v),
            Expr::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Expr::Symbol(name) => match name.as_str() {
                "pi" => Ok(std::f64::consts::PI),
                _ => symbols
                    .value(name)
                    .ok_or_else(|| MathError::UnresolvedSymbols {
                        formula: self.to_string(),
                        missing: vec![name.clone()],
                    }),
            },
            Expr::Unary { op, rhs } => {
                let v = rhs.eval_inner(symbols)?;
                Ok(match op {
                    UnaryOp::Neg => -v,
                    UnaryOp::Plus => v,
                    UnaryOp::Not => 1.0 - truth(v),
                })
            }
            Expr::Binary { lhs, op, rhs } => {
                let a = lhs.eval_inner(symbols)?;
                if *op == BinaryOp::And && a == 0.0 {
                    return Ok(0.0);
                }
                if *op == BinaryOp::Or && a != 0.0 {
                    return Ok(1.0);
                }
                let b = rhs.eval_inner(symbols)?;
                Ok(apply_binary(*op, a, b))
            }
            Expr::Call { name, args } => {
                let values = args
                    .iter()
                    .map(|a| a.eval_inner(symbols))
                    .collect::<Result<Vec<f64>, MathError>>()?;
                eval_call(name, &values)
            }
        }
    }
}

fn apply_binary(op: BinaryOp, a: f64, b: f64) -> f64 {
    let cmp = |c: bool| if c { 1.0 } else { 0.0 };
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Pow => a.powf(b),
        BinaryOp::Lt => cmp(a < b),
        BinaryOp::Gt => cmp(a > b),
        BinaryOp::Le => cmp(a <= b),
        BinaryOp::Ge => cmp(a >= b),
        BinaryOp::Eq => cmp(a == b),
        BinaryOp::Ne => cmp(a != b),
        BinaryOp::And => truth(a) * truth(b),
        BinaryOp::Or => truth(a).max(truth(b)),
    }
}
