use crate::math::ast::{BinaryOp, Expr, ParseError, Token, UnaryOp};

// Tokenizer + recursive-descent parser
pub fn tokenize(s: &str) -> Result<Vec<Token>, ParseError> {
    let mut toks = Vec::new();
    let mut chars = s.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c.is_ascii_digit() || c == '.' {
            let mut num = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit()
                    || d == '.'
                    || d == 'e'
                    || d == 'E'
                    || ((d == '+' || d == '-') && (num.ends_with('e') || num.ends_with('E')))
                {
                    num.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            match num.parse::<f64>() {
                Ok(v) => toks.push(Token::Num(v)),
                Err(_) => {
                    return Err(ParseError {
                        pos: toks.len(),
                        found: Some(Token::Ident(num)),
                        expected: vec!["number".to_string()],
                    })
                }
            }
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let mut id = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_alphanumeric() || d == '_' {
                    id.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            match id.to_ascii_lowercase().as_str() {
                "true" => toks.push(Token::Bool(true)),
                "false" => toks.push(Token::Bool(false)),
                "inf" | "infinity" => toks.push(Token::Num(f64::INFINITY)),
                "nan" => toks.push(Token::Num(f64::NAN)),
                _ => toks.push(Token::Ident(id)),
            }
            continue;
        }
        chars.next();
        match c {
            '(' => toks.push(Token::LParen),
            ')' => toks.push(Token::RParen),
            ',' => toks.push(Token::Comma),
            '+' | '-' | '/' => toks.push(Token::Op(c)),
            '*' => {
                if let Some(&'*') = chars.peek() {
                    chars.next();
                    toks.push(Token::Pow);
                } else {
                    toks.push(Token::Op('*'));
                }
            }
            '^' => toks.push(Token::Pow),
            '<' => {
                if let Some(&'=') = chars.peek() {
                    chars.next();
                    toks.push(Token::Le);
                } else {
                    toks.push(Token::Lt);
                }
            }
            '>' => {
                if let Some(&'=') = chars.peek() {
                    chars.next();
                    toks.push(Token::Ge);
                } else {
                    toks.push(Token::Gt);
                }
            }
            '=' => {
                if let Some(&'=') = chars.peek() {
                    chars.next();
                    toks.push(Token::EqEq);
                } else {
                    return Err(ParseError {
                        pos: toks.len(),
                        found: None,
                        expected: vec!["==".to_string()],
                    });
                }
            }
            '!' => {
                if let Some(&'=') = chars.peek() {
                    chars.next();
                    toks.push(Token::Ne);
                } else {
                    toks.push(Token::Bang);
                }
            }
            '&' => {
                if let Some(&'&') = chars.peek() {
                    chars.next();
                    toks.push(Token::And);
                } else {
                    return Err(ParseError {
                        pos: toks.len(),
                        found: None,
                        expected: vec!["&&".to_string()],
                    });
                }
            }
            '|' => {
                if let Some(&'|') = chars.peek() {
                    chars.next();
                    toks.push(Token::Or);
                } else {
                    return Err(ParseError {
                        pos: toks.len(),
                        found: None,
                        expected: vec!["||".to_string()],
                    });
                }
            }
            other => {
                return Err(ParseError {
                    pos: toks.len(),
                    found: Some(Token::Ident(other.to_string())),
                    expected: Vec::new(),
                })
            }
        }
    }
    Ok(toks)
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    expected: Vec<String>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            expected: Vec::new(),
        }
    }

    fn expected_push(&mut self, s: &str) {
        if !self.expected.contains(&s.to_string()) {
            self.expected.push(s.to_string());
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let r = self.tokens.get(self.pos);
        if r.is_some() {
            self.pos += 1;
        }
        r
    }

    fn error(&self) -> ParseError {
        ParseError {
            pos: self.pos,
            found: self.peek().cloned(),
            expected: self.expected.clone(),
        }
    }

    /// Parse the whole token stream as a single expression
    pub fn parse_complete(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expr().ok_or_else(|| self.error())?;
        if self.peek().is_some() {
            self.expected_push("<end>");
            return Err(self.error());
        }
        Ok(expr)
    }

    pub fn parse_expr(&mut self) -> Option<Expr> {
        self.parse_or()
    }

    fn binary(lhs: Expr, op: BinaryOp, rhs: Expr) -> Expr {
        Expr::Binary {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        }
    }

    fn parse_or(&mut self) -> Option<Expr> {
        let mut node = self.parse_and()?;
        while let Some(Token::Or) = self.peek() {
            self.next();
            let rhs = self.parse_and()?;
            node = Self::binary(node, BinaryOp::Or, rhs);
        }
        Some(node)
    }

    fn parse_and(&mut self) -> Option<Expr> {
        let mut node = self.parse_eq()?;
        while let Some(Token::And) = self.peek() {
            self.next();
            let rhs = self.parse_eq()?;
            node = Self::binary(node, BinaryOp::And, rhs);
        }
        Some(node)
    }

    fn parse_eq(&mut self) -> Option<Expr> {
        let mut node = self.parse_cmp()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                _ => break,
            };
            self.next();
            let rhs = self.parse_cmp()?;
            node = Self::binary(node, op, rhs);
        }
        Some(node)
    }

    fn parse_cmp(&mut self) -> Option<Expr> {
        let mut node = self.parse_add_sub()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => break,
            };
            self.next();
            let rhs = self.parse_add_sub()?;
            node = Self::binary(node, op, rhs);
        }
        Some(node)
    }

    fn parse_add_sub(&mut self) -> Option<Expr> {
        let mut node = self.parse_mul_div()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op('+')) => BinaryOp::Add,
                Some(Token::Op('-')) => BinaryOp::Sub,
                _ => break,
            };
            self.next();
            let rhs = self.parse_mul_div()?;
            node = Self::binary(node, op, rhs);
        }
        Some(node)
    }

    fn parse_mul_div(&mut self) -> Option<Expr> {
        let mut node = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op('*')) => BinaryOp::Mul,
                Some(Token::Op('/')) => BinaryOp::Div,
                _ => break,
            };
            self.next();
            let rhs = self.parse_unary()?;
            node = Self::binary(node, op, rhs);
        }
        Some(node)
    }

    // Unary operators bind weaker than `^`: -2^2 == -(2^2)
    fn parse_unary(&mut self) -> Option<Expr> {
        let op = match self.peek() {
            Some(Token::Op('-')) => UnaryOp::Neg,
            Some(Token::Op('+')) => UnaryOp::Plus,
            Some(Token::Bang) => UnaryOp::Not,
            _ => return self.parse_power(),
        };
        self.next();
        let rhs = self.parse_unary()?;
        Some(match (op, rhs) {
            (UnaryOp::Neg, Expr::Number(v)) => Expr::Number(-v),
            (UnaryOp::Plus, Expr::Number(v)) => Expr::Number(v),
            (op, rhs) => Expr::Unary {
                op,
                rhs: Box::new(rhs),
            },
        })
    }

    fn parse_power(&mut self) -> Option<Expr> {
        let node = self.parse_primary()?;
        if let Some(Token::Pow) = self.peek() {
            self.next();
            // right-associative, exponent may carry a sign
            let rhs = self.parse_unary()?;
            return Some(Self::binary(node, BinaryOp::Pow, rhs));
        }
        Some(node)
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        let Some(tok) = self.next().cloned() else {
            self.expected_push("number|identifier|'('");
            return None;
        };
        match tok {
            Token::Num(v) => Some(Expr::Number(v)),
            Token::Bool(b) => Some(Expr::Bool(b)),
            Token::Ident(id) => {
                // function call?
                if let Some(Token::LParen) = self.peek() {
                    self.next();
                    let mut args: Vec<Expr> = Vec::new();
                    if let Some(Token::RParen) = self.peek() {
                        self.next();
                        return Some(Expr::Call { name: id, args });
                    }
                    loop {
                        if let Some(expr) = self.parse_expr() {
                            args.push(expr);
                        } else {
                            self.expected_push("expression");
                            return None;
                        }
                        match self.peek() {
                            Some(Token::Comma) => {
                                self.next();
                            }
                            Some(Token::RParen) => {
                                self.next();
                                break;
                            }
                            _ => {
                                self.expected_push(",|)");
                                return None;
                            }
                        }
                    }
                    Some(Expr::Call { name: id, args })
                } else {
                    Some(Expr::Symbol(id))
                }
            }
            Token::LParen => {
                let expr = self.parse_expr();
                if let Some(Token::RParen) = self.peek() {
                    self.next();
                    if expr.is_none() {
                        self.expected_push("expression");
                    }
                    expr
                } else {
                    self.expected_push(")");
                    None
                }
            }
            _ => {
                // step back so the error reports the offending token
                self.pos -= 1;
                self.expected_push("number|identifier|'('");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Expr {
        Parser::new(tokenize(s).unwrap()).parse_complete().unwrap()
    }

    #[test]
    fn test_power_binds_tighter_than_unary_minus() {
        let expr = parse("-2^2");
        assert_eq!(
            expr,
            Expr::Unary {
                op: UnaryOp::Neg,
                rhs: Box::new(Expr::Binary {
                    lhs: Box::new(Expr::Number(2.0)),
                    op: BinaryOp::Pow,
                    rhs: Box::new(Expr::Number(2.0)),
                }),
            }
        );
    }

    #[test]
    fn test_double_star_is_power() {
        assert_eq!(parse("a**2"), parse("a^2"));
    }

    #[test]
    fn test_power_is_right_associative() {
        let expr = parse("2^3^2");
        match expr {
            Expr::Binary { lhs, op, rhs } => {
                assert_eq!(*lhs, Expr::Number(2.0));
                assert_eq!(op, BinaryOp::Pow);
                assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Pow, .. }));
            }
            _ => panic!("expected power"),
        }
    }

    #[test]
    fn test_trailing_tokens_are_rejected() {
        let tokens = tokenize("a b").unwrap();
        assert!(Parser::new(tokens).parse_complete().is_err());
    }

    #[test]
    fn test_unknown_character_is_rejected() {
        assert!(tokenize("a $ b").is_err());
    }

    #[test]
    fn test_function_call() {
        let expr = parse("log(x, 10)");
        assert_eq!(
            expr,
            Expr::Call {
                name: "log".to_string(),
                args: vec![Expr::symbol("x"), Expr::Number(10.0)],
            }
        );
    }
}
