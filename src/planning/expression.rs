//! Computed-field expression evaluation
//!
//! A small, side-effect-free expression language evaluated over a document
//! attribute map during indexing. Supports literals, attribute identifiers,
//! arithmetic, comparisons, boolean connectives and grouping. There are no
//! loops and no calls, so evaluation always terminates.

use serde_json::Value as Json;

use crate::config::{ComputedField, ComputedKind};
use crate::error::{Result, ShoalError};

/// Runtime value of an expression
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Bool(_) => "boolean",
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

/// Token types for expression parsing
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),

    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    And,
    Or,
    Not,

    LeftParen,
    RightParen,

    Eof,
}

struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    fn tokenize(mut self) -> std::result::Result<Vec<Token>, String> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> std::result::Result<Token, String> {
        self.skip_whitespace();

        if self.position >= self.input.len() {
            return Ok(Token::Eof);
        }

        let ch = self.current_char();
        match ch {
            '+' => {
                self.advance();
                Ok(Token::Plus)
            }
            '-' => {
                self.advance();
                Ok(Token::Minus)
            }
            '*' => {
                self.advance();
                Ok(Token::Star)
            }
            '/' => {
                self.advance();
                Ok(Token::Slash)
            }
            '%' => {
                self.advance();
                Ok(Token::Percent)
            }
            '(' => {
                self.advance();
                Ok(Token::LeftParen)
            }
            ')' => {
                self.advance();
                Ok(Token::RightParen)
            }
            '=' => {
                self.advance();
                if self.current_is('=') {
                    self.advance();
                    Ok(Token::Eq)
                } else {
                    Err("expected '==' but found single '='".to_string())
                }
            }
            '!' => {
                self.advance();
                if self.current_is('=') {
                    self.advance();
                    Ok(Token::Ne)
                } else {
                    Ok(Token::Not)
                }
            }
            '<' => {
                self.advance();
                if self.current_is('=') {
                    self.advance();
                    Ok(Token::Le)
                } else {
                    Ok(Token::Lt)
                }
            }
            '>' => {
                self.advance();
                if self.current_is('=') {
                    self.advance();
                    Ok(Token::Ge)
                } else {
                    Ok(Token::Gt)
                }
            }
            '&' => {
                self.advance();
                if self.current_is('&') {
                    self.advance();
                    Ok(Token::And)
                } else {
                    Err("expected '&&'".to_string())
                }
            }
            '|' => {
                self.advance();
                if self.current_is('|') {
                    self.advance();
                    Ok(Token::Or)
                } else {
                    Err("expected '||'".to_string())
                }
            }
            '"' | '\'' => {
                let quote = ch;
                self.advance();
                self.read_quoted_string(quote)
            }
            _ if ch.is_ascii_digit() => self.read_number(),
            _ if ch.is_alphabetic() || ch == '_' => Ok(self.read_ident()),
            _ => Err(format!(
                "unexpected character at position {}: '{}'",
                self.position, ch
            )),
        }
    }

    fn read_quoted_string(&mut self, quote: char) -> std::result::Result<Token, String> {
        let mut s = String::new();
        while self.position < self.input.len() {
            let ch = self.current_char();
            if ch == quote {
                self.advance();
                return Ok(Token::Str(s));
            }
            if ch == '\\' {
                self.advance();
                if self.position < self.input.len() {
                    let escaped = self.current_char();
                    match escaped {
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        other => s.push(other),
                    }
                    self.advance();
                }
            } else {
                s.push(ch);
                self.advance();
            }
        }
        Err("unterminated string literal".to_string())
    }

    fn read_number(&mut self) -> std::result::Result<Token, String> {
        let mut num = String::new();
        let mut has_dot = false;
        while self.position < self.input.len() {
            let ch = self.current_char();
            if ch.is_ascii_digit() {
                num.push(ch);
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                num.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        if has_dot {
            num.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| format!("invalid number: {num}"))
        } else {
            num.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| format!("invalid number: {num}"))
        }
    }

    fn read_ident(&mut self) -> Token {
        let mut ident = String::new();
        while self.position < self.input.len() {
            let ch = self.current_char();
            if ch.is_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        match ident.as_str() {
            "true" => Token::Bool(true),
            "false" => Token::Bool(false),
            _ => Token::Ident(ident),
        }
    }

    fn current_char(&self) -> char {
        self.input[self.position]
    }

    fn current_is(&self, ch: char) -> bool {
        self.position < self.input.len() && self.input[self.position] == ch
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while self.position < self.input.len() && self.current_char().is_whitespace() {
            self.advance();
        }
    }
}

/// Recursive-descent evaluator, precedence: `||` < `&&` < comparison <
/// additive < multiplicative < unary.
struct Evaluator<'a> {
    tokens: Vec<Token>,
    position: usize,
    attrs: &'a serde_json::Map<String, Json>,
}

impl<'a> Evaluator<'a> {
    fn run(expression: &str, attrs: &'a serde_json::Map<String, Json>) -> std::result::Result<Value, String> {
        let tokens = Lexer::new(expression).tokenize()?;
        let mut eval = Evaluator {
            tokens,
            position: 0,
            attrs,
        };
        let value = eval.or_expr()?;
        if eval.peek() != &Token::Eof {
            return Err(format!("unexpected trailing token: {:?}", eval.peek()));
        }
        Ok(value)
    }

    fn or_expr(&mut self) -> std::result::Result<Value, String> {
        let mut left = self.and_expr()?;
        while self.peek() == &Token::Or {
            self.advance();
            let right = self.and_expr()?;
            left = match (left, right) {
                (Value::Bool(a), Value::Bool(b)) => Value::Bool(a || b),
                (a, b) => return Err(mismatch("||", &a, &b)),
            };
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> std::result::Result<Value, String> {
        let mut left = self.cmp_expr()?;
        while self.peek() == &Token::And {
            self.advance();
            let right = self.cmp_expr()?;
            left = match (left, right) {
                (Value::Bool(a), Value::Bool(b)) => Value::Bool(a && b),
                (a, b) => return Err(mismatch("&&", &a, &b)),
            };
        }
        Ok(left)
    }

    fn cmp_expr(&mut self) -> std::result::Result<Value, String> {
        let left = self.add_expr()?;
        let op = match self.peek() {
            Token::Eq => "==",
            Token::Ne => "!=",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            _ => return Ok(left),
        };
        self.advance();
        let right = self.add_expr()?;
        compare(op, &left, &right).map(Value::Bool)
    }

    fn add_expr(&mut self) -> std::result::Result<Value, String> {
        let mut left = self.mul_expr()?;
        loop {
            let op = match self.peek() {
                Token::Plus => '+',
                Token::Minus => '-',
                _ => return Ok(left),
            };
            self.advance();
            let right = self.mul_expr()?;
            left = match (op, left, right) {
                ('+', Value::Str(a), Value::Str(b)) => Value::Str(a + &b),
                ('+', Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(b)),
                ('-', Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_sub(b)),
                (_, a, b) => {
                    let (x, y) = numeric_pair(&op.to_string(), &a, &b)?;
                    if op == '+' {
                        Value::Float(x + y)
                    } else {
                        Value::Float(x - y)
                    }
                }
            };
        }
    }

    fn mul_expr(&mut self) -> std::result::Result<Value, String> {
        let mut left = self.unary_expr()?;
        loop {
            let op = match self.peek() {
                Token::Star => '*',
                Token::Slash => '/',
                Token::Percent => '%',
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary_expr()?;
            left = match (op, &left, &right) {
                ('*', Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_mul(*b)),
                ('/', Value::Int(a), Value::Int(b)) => {
                    if *b == 0 {
                        return Err("division by zero".to_string());
                    }
                    Value::Int(a / b)
                }
                ('%', Value::Int(a), Value::Int(b)) => {
                    if *b == 0 {
                        return Err("division by zero".to_string());
                    }
                    Value::Int(a % b)
                }
                ('%', a, b) => return Err(mismatch("%", a, b)),
                (_, a, b) => {
                    let (x, y) = numeric_pair(&op.to_string(), a, b)?;
                    if op == '*' {
                        Value::Float(x * y)
                    } else {
                        if y == 0.0 {
                            return Err("division by zero".to_string());
                        }
                        Value::Float(x / y)
                    }
                }
            };
        }
    }

    fn unary_expr(&mut self) -> std::result::Result<Value, String> {
        match self.peek() {
            Token::Minus => {
                self.advance();
                match self.unary_expr()? {
                    Value::Int(i) => Ok(Value::Int(-i)),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    other => Err(format!("unary '-' needs a number, got {}", other.type_name())),
                }
            }
            Token::Not => {
                self.advance();
                match self.unary_expr()? {
                    Value::Bool(b) => Ok(Value::Bool(!b)),
                    other => Err(format!("'!' needs a boolean, got {}", other.type_name())),
                }
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> std::result::Result<Value, String> {
        let token = self.peek().clone();
        match token {
            Token::Int(i) => {
                self.advance();
                Ok(Value::Int(i))
            }
            Token::Float(f) => {
                self.advance();
                Ok(Value::Float(f))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Value::Str(s))
            }
            Token::Bool(b) => {
                self.advance();
                Ok(Value::Bool(b))
            }
            Token::Ident(name) => {
                self.advance();
                self.lookup(&name)
            }
            Token::LeftParen => {
                self.advance();
                let value = self.or_expr()?;
                if self.peek() != &Token::RightParen {
                    return Err("expected ')'".to_string());
                }
                self.advance();
                Ok(value)
            }
            other => Err(format!("unexpected token: {other:?}")),
        }
    }

    fn lookup(&self, name: &str) -> std::result::Result<Value, String> {
        let json = self
            .attrs
            .get(name)
            .ok_or_else(|| format!("unresolved identifier '{name}'"))?;
        match json {
            Json::String(s) => Ok(Value::Str(s.clone())),
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Int(i))
                } else {
                    Ok(Value::Float(n.as_f64().unwrap_or(0.0)))
                }
            }
            other => Err(format!(
                "attribute '{name}' has unsupported type for expressions: {other}"
            )),
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.position]
    }

    fn advance(&mut self) {
        self.position += 1;
    }
}

fn mismatch(op: &str, a: &Value, b: &Value) -> String {
    format!(
        "operator '{op}' cannot combine {} and {}",
        a.type_name(),
        b.type_name()
    )
}

fn numeric_pair(op: &str, a: &Value, b: &Value) -> std::result::Result<(f64, f64), String> {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(mismatch(op, a, b)),
    }
}

fn compare(op: &str, a: &Value, b: &Value) -> std::result::Result<bool, String> {
    let ordering = match (a, b) {
        (Value::Str(x), Value::Str(y)) => x.partial_cmp(y),
        (Value::Bool(x), Value::Bool(y)) => {
            return match op {
                "==" => Ok(x == y),
                "!=" => Ok(x != y),
                _ => Err(mismatch(op, a, b)),
            }
        }
        _ => {
            let (x, y) = numeric_pair(op, a, b)?;
            x.partial_cmp(&y)
        }
    };
    let ordering = ordering.ok_or_else(|| mismatch(op, a, b))?;
    Ok(match op {
        "==" => ordering.is_eq(),
        "!=" => !ordering.is_eq(),
        "<" => ordering.is_lt(),
        "<=" => ordering.is_le(),
        ">" => ordering.is_gt(),
        ">=" => ordering.is_ge(),
        _ => unreachable!("unknown comparison operator"),
    })
}

/// Evaluate a computed field over a document's attribute map, coercing the
/// result to the field's declared type. Returns a JSON value ready to be
/// inserted into the document before indexing.
pub fn evaluate_computed_field(
    field: &ComputedField,
    attrs: &serde_json::Map<String, Json>,
) -> Result<Json> {
    let expression_error = |message: String| ShoalError::Expression {
        field: field.name.clone(),
        message,
    };

    let value = Evaluator::run(&field.expression, attrs).map_err(expression_error)?;

    match (field.kind, value) {
        (ComputedKind::String, Value::Str(s)) => Ok(Json::String(s)),
        (ComputedKind::Boolean, Value::Bool(b)) => Ok(Json::Bool(b)),
        (ComputedKind::Integer, Value::Int(i)) => Ok(Json::from(i)),
        (ComputedKind::Float, Value::Float(f)) => serde_json::Number::from_f64(f)
            .map(Json::Number)
            .ok_or_else(|| expression_error("expression produced a non-finite float".to_string())),
        (ComputedKind::Float, Value::Int(i)) => Ok(Json::from(i as f64)),
        (kind, value) => Err(expression_error(format!(
            "expression produced {} but the field is declared {kind:?}",
            value.type_name()
        ))),
    }
}
