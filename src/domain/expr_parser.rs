//! Definition language parser.
//!
//! Recursive descent parser for expressions and single-line statements.
//! Converts text to AST with error messages carrying the character offset.
//!
//! Precedence, loosest first: `or`, `and`, `not`, comparisons, `+ -`,
//! `* / // %`, unary `-`, `**`.

use crate::domain::error::ParseError;
use crate::domain::expr::{BinaryOp, Expr, Statement, UnaryOp, Value};

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    /// Skips whitespace and a trailing `#` comment.
    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else if ch == '#' {
                self.pos = self.input.len();
            } else {
                break;
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            position: self.pos,
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(self.error(format!("expected '{}', found '{}'", expected, ch))),
            None => Err(self.error(format!("expected '{}', found end of input", expected))),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        let remaining = self.remaining();
        remaining.starts_with(keyword)
            && !remaining[keyword.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();
        if self.peek_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn consume_exact(&mut self, s: &str) -> bool {
        self.skip_whitespace();
        if self.remaining().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn peek_word(&self) -> String {
        let word: String = self
            .remaining()
            .chars()
            .take_while(|ch| ch.is_alphanumeric() || *ch == '_')
            .collect();
        if word.is_empty() {
            self.peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "end of input".to_string())
        } else {
            word
        }
    }

    fn parse_identifier(&mut self) -> Option<String> {
        self.skip_whitespace();
        let first = self.peek()?;
        if !(first.is_alphabetic() || first == '_') {
            return None;
        }
        let ident: String = self
            .remaining()
            .chars()
            .take_while(|ch| ch.is_alphanumeric() || *ch == '_')
            .collect();
        self.pos += ident.len();
        Some(ident)
    }

    fn parse_number(&mut self) -> Result<Value, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut is_float = false;
        let mut digits = 0;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '_' && digits > 0 {
                self.advance();
            } else if ch == '.' && !is_float {
                is_float = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(ParseError {
                message: "expected number".to_string(),
                position: start,
            });
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            is_float = true;
            self.advance();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.advance();
            }
            let exp_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
            if self.pos == exp_start {
                return Err(self.error("expected exponent digits"));
            }
        }

        let num_str: String = self.input[start..self.pos]
            .chars()
            .filter(|c| *c != '_')
            .collect();
        if is_float {
            num_str
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| ParseError {
                    message: format!("invalid number: {}", num_str),
                    position: start,
                })
        } else {
            num_str
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| ParseError {
                    message: format!("invalid number: {}", num_str),
                    position: start,
                })
        }
    }

    fn parse_string(&mut self) -> Result<Value, ParseError> {
        let start = self.pos;
        let quote = match self.advance() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error("expected string")),
        };
        let mut out = String::new();
        loop {
            match self.advance() {
                None => {
                    return Err(ParseError {
                        message: "unterminated string literal".to_string(),
                        position: start,
                    });
                }
                Some(ch) if ch == quote => break,
                Some('\\') => match self.advance() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(ch @ ('\\' | '"' | '\'')) => out.push(ch),
                    Some(ch) => {
                        out.push('\\');
                        out.push(ch);
                    }
                    None => {
                        return Err(ParseError {
                            message: "unterminated string literal".to_string(),
                            position: start,
                        });
                    }
                },
                Some(ch) => out.push(ch),
            }
        }
        Ok(Value::Str(out))
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.consume_keyword("or") {
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not()?;
        while self.consume_keyword("and") {
            let right = self.parse_not()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.consume_keyword("not") {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn comparison_op(&mut self) -> Option<BinaryOp> {
        // Two-character operators first so "<=" is not read as "<".
        for (text, op) in [
            ("==", BinaryOp::Eq),
            ("!=", BinaryOp::Ne),
            ("<=", BinaryOp::Le),
            (">=", BinaryOp::Ge),
            ("<", BinaryOp::Lt),
            (">", BinaryOp::Gt),
        ] {
            if self.consume_exact(text) {
                return Some(op);
            }
        }
        None
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_additive()?;
        match self.comparison_op() {
            Some(op) => {
                let right = self.parse_additive()?;
                if self.comparison_op().is_some() {
                    return Err(self.error("chained comparisons are not supported"));
                }
                Ok(binary(op, left, right))
            }
            None => Ok(left),
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_term()?;
        loop {
            let op = if self.consume_exact("+") {
                BinaryOp::Add
            } else if self.consume_exact("-") {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.parse_term()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            self.skip_whitespace();
            let op = if self.remaining().starts_with("**") {
                break;
            } else if self.consume_exact("//") {
                BinaryOp::FloorDiv
            } else if self.consume_exact("*") {
                BinaryOp::Mul
            } else if self.consume_exact("/") {
                BinaryOp::Div
            } else if self.consume_exact("%") {
                BinaryOp::Mod
            } else {
                break;
            };
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.consume_exact("-") {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        if self.consume_exact("+") {
            return self.parse_unary();
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_atom()?;
        if self.consume_exact("**") {
            // Right-associative and binds tighter than unary minus on its left.
            let exponent = self.parse_unary()?;
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_sequence(&mut self, close: char) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(close) {
            self.advance();
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr()?);
            self.skip_whitespace();
            if self.peek() == Some(close) {
                self.advance();
                return Ok(items);
            }
            self.expect_char(',')?;
            // Trailing comma.
            self.skip_whitespace();
            if self.peek() == Some(close) {
                self.advance();
                return Ok(items);
            }
        }
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch.is_ascii_digit() || ch == '.' => {
                return Ok(Expr::Literal(self.parse_number()?));
            }
            Some('"') | Some('\'') => return Ok(Expr::Literal(self.parse_string()?)),
            Some('(') => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect_char(')')?;
                return Ok(inner);
            }
            Some('[') => {
                self.advance();
                return Ok(Expr::List(self.parse_sequence(']')?));
            }
            _ => {}
        }

        let start = self.pos;
        let Some(ident) = self.parse_identifier() else {
            let found = self.peek_word();
            return Err(self.error(format!("expected expression, found '{}'", found)));
        };

        match ident.as_str() {
            "True" => return Ok(Expr::Literal(Value::Bool(true))),
            "False" => return Ok(Expr::Literal(Value::Bool(false))),
            "None" => return Ok(Expr::Literal(Value::None)),
            "and" | "or" | "not" => {
                return Err(ParseError {
                    message: format!("expected expression, found '{}'", ident),
                    position: start,
                });
            }
            _ => {}
        }

        self.skip_whitespace();
        if self.peek() == Some('(') {
            self.advance();
            let args = self.parse_sequence(')')?;
            return Ok(Expr::Call {
                function: ident,
                args,
            });
        }
        Ok(Expr::Name(ident))
    }

    fn finish(&mut self) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.error(format!(
                "unexpected input after expression: '{}'",
                self.remaining()
            )));
        }
        Ok(())
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let checkpoint = self.pos;
        if let Some(name) = self.parse_identifier() {
            self.skip_whitespace();
            let rest = self.remaining();
            if rest.starts_with('=') && !rest.starts_with("==") && is_identifier(&name) {
                self.advance();
                let value = self.parse_expr()?;
                self.finish()?;
                return Ok(Statement::Assign { name, value });
            }
        }
        self.pos = checkpoint;
        let expr = self.parse_expr()?;
        self.finish()?;
        Ok(Statement::Expr(expr))
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Parse a complete expression.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(input);
    let expr = parser.parse_expr()?;
    parser.finish()?;
    Ok(expr)
}

/// Parse one script line: `name = expr` or a bare expression.
pub fn parse_statement(input: &str) -> Result<Statement, ParseError> {
    Parser::new(input).parse_statement()
}

/// True when `name` is usable as a binding name.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
        && !matches!(name, "and" | "or" | "not" | "True" | "False" | "None")
}
