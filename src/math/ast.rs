// AST types for PEtab math expressions
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Symbols with a fixed meaning that are never treated as free parameters
pub(crate) const RESERVED_CONSTANTS: [&str; 1] = ["pi"];

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Bool(bool),
    Symbol(String), // e.g. k1, observableParameter1_obs_a
    Unary {
        op: UnaryOp,
        rhs: Box<Expr>,
    },
    Binary {
        lhs: Box<Expr>,
        op: BinaryOp,
        rhs: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

// Binding strength used by the printer, mirrors the parser's descent order
const UNARY_PRECEDENCE: u8 = 7;
const ATOM_PRECEDENCE: u8 = 9;

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::Ne => 3,
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div => 6,
            BinaryOp::Pow => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Num(f64),
    Bool(bool),
    Ident(String),
    LParen,
    RParen,
    Comma,
    Op(char),
    Pow,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    Ne,
    And,
    Or,
    Bang,
}

#[derive(Debug, Clone)]
pub struct ParseError {
    pub pos: usize,
    pub found: Option<Token>,
    pub expected: Vec<String>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.expected.is_empty() {
            write!(
                f,
                "parse error at token {} found={:?} expected={:?}",
                self.pos, self.found, self.expected
            )
        } else if let Some(tok) = &self.found {
            write!(f, "parse error at token {} found={:?}", self.pos, tok)
        } else {
            write!(f, "parse error at token {} found=<end>", self.pos)
        }
    }
}

impl std::error::Error for ParseError {}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Number(value)
    }
}

impl Expr {
    /// Create a symbol expression
    pub fn symbol(name: impl Into<String>) -> Self {
        Expr::Symbol(name.into())
    }

    /// All parameter-like symbols referenced by the expression, sorted by name
    ///
    /// Function names and reserved constants such as `pi` are not included.
    pub fn free_symbols(&self) -> BTreeSet<String> {
        let mut symbols = BTreeSet::new();
        self.collect_symbols(&mut symbols);
        symbols
    }

    fn collect_symbols(&self, acc: &mut BTreeSet<String>) {
        match self {
            Expr::Number(_) | Expr::Bool(_) => {}
            Expr::Symbol(name) => {
                if !RESERVED_CONSTANTS.contains(&name.as_str()) {
                    acc.insert(name.clone());
                }
            }
            Expr::Unary { rhs, .. } => rhs.collect_symbols(acc),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_symbols(acc);
                rhs.collect_symbols(acc);
            }
            Expr::Call { args, .. } => args.iter().for_each(|a| a.collect_symbols(acc)),
        }
    }

    /// Whether `name` occurs as a free symbol
    pub fn has_symbol(&self, name: &str) -> bool {
        match self {
            Expr::Number(_) | Expr::Bool(_) => false,
            Expr::Symbol(s) => s == name,
            Expr::Unary { rhs, .. } => rhs.has_symbol(name),
            Expr::Binary { lhs, rhs, .. } => lhs.has_symbol(name) || rhs.has_symbol(name),
            Expr::Call { args, .. } => args.iter().any(|a| a.has_symbol(name)),
        }
    }

    /// True if the expression contains no free symbols
    pub fn is_number(&self) -> bool {
        self.free_symbols().is_empty()
    }

    /// The literal value, if the expression is a (possibly negated) number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Expr::Number(v) => Some(*v),
            Expr::Unary {
                op: UnaryOp::Neg,
                rhs,
            } => rhs.as_number().map(|v| -v),
            Expr::Unary {
                op: UnaryOp::Plus,
                rhs,
            } => rhs.as_number(),
            _ => None,
        }
    }

    /// Replace symbols by expressions
    ///
    /// Substitution is simultaneous: replacements are not substituted again.
    pub fn substitute(&self, replacements: &HashMap<String, Expr>) -> Expr {
        match self {
            Expr::Symbol(name) => replacements
                .get(name)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            Expr::Number(_) | Expr::Bool(_) => self.clone(),
            Expr::Unary { op, rhs } => Expr::Unary {
                op: *op,
                rhs: Box::new(rhs.substitute(replacements)),
            },
            Expr::Binary { lhs, op, rhs } => Expr::Binary {
                lhs: Box::new(lhs.substitute(replacements)),
                op: *op,
                rhs: Box::new(rhs.substitute(replacements)),
            },
            Expr::Call { name, args } => Expr::Call {
                name: name.clone(),
                args: args.iter().map(|a| a.substitute(replacements)).collect(),
            },
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Number(v) if v.is_sign_negative() && !v.is_nan() => UNARY_PRECEDENCE,
            Expr::Number(_) | Expr::Bool(_) | Expr::Symbol(_) | Expr::Call { .. } => {
                ATOM_PRECEDENCE
            }
            Expr::Unary { .. } => UNARY_PRECEDENCE,
            Expr::Binary { op, .. } => op.precedence(),
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, parens: bool) -> fmt::Result {
        if parens {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

fn fmt_number(v: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if v.is_nan() {
        write!(f, "nan")
    } else if v.is_infinite() {
        write!(f, "{}", if v > 0.0 { "inf" } else { "-inf" })
    } else if v != 0.0 && (v.abs() < 1e-4 || v.abs() >= 1e16) {
        write!(f, "{:e}", v)
    } else {
        write!(f, "{}", v)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(v) => fmt_number(*v, f),
            Expr::Bool(b) => write!(f, "{}", b),
            Expr::Symbol(name) => write!(f, "{}", name),
            Expr::Unary { op, rhs } => {
                let sym = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Plus => "+",
                    UnaryOp::Not => "!",
                };
                write!(f, "{}", sym)?;
                rhs.fmt_operand(f, rhs.precedence() < UNARY_PRECEDENCE)
            }
            Expr::Binary { lhs, op, rhs } => {
                let prec = op.precedence();
                // `^` is right-associative, everything else left-associative
                let (lhs_parens, rhs_parens) = if *op == BinaryOp::Pow {
                    (lhs.precedence() <= prec, rhs.precedence() < UNARY_PRECEDENCE)
                } else {
                    (lhs.precedence() < prec, rhs.precedence() <= prec)
                };
                lhs.fmt_operand(f, lhs_parens)?;
                match op {
                    BinaryOp::Pow | BinaryOp::Mul | BinaryOp::Div => write!(f, "{}", op.symbol())?,
                    _ => write!(f, " {} ", op.symbol())?,
                }
                rhs.fmt_operand(f, rhs_parens)
            }
            Expr::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}
