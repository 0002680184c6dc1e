//! Lexer - tokenization of Swona source

use std::fmt;
use std::rc::Rc;

use crate::error::CompileError;
use crate::location::SourceLocation;
use crate::value::Value;

type Result<T> = std::result::Result<T, CompileError>;

/// Token type
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Identifier(String),
    /// `42`, `"foo"`, `true`
    Literal(Value),
    Keyword(Keyword),
    Operator(Operator),
    Punctuation(Punctuation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Else,
    Fun,
    If,
    Unless,
    Var,
    Val,
    While,
}

impl Keyword {
    fn from_name(name: &str) -> Option<Keyword> {
        match name {
            "else" => Some(Keyword::Else),
            "fun" => Some(Keyword::Fun),
            "if" => Some(Keyword::If),
            "unless" => Some(Keyword::Unless),
            "var" => Some(Keyword::Var),
            "val" => Some(Keyword::Val),
            "while" => Some(Keyword::While),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Keyword::Else => "else",
            Keyword::Fun => "fun",
            Keyword::If => "if",
            Keyword::Unless => "unless",
            Keyword::Var => "var",
            Keyword::Val => "val",
            Keyword::While => "while",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Plus,
    Minus,
    Multiply,
    Divide,
    EqualEqual,
    NotEqual,
    Not,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
    And,
    Or,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::EqualEqual => "==",
            Operator::NotEqual => "!=",
            Operator::Not => "!",
            Operator::LessThan => "<",
            Operator::GreaterThan => ">",
            Operator::LessThanOrEqual => "<=",
            Operator::GreaterThanOrEqual => ">=",
            Operator::And => "&&",
            Operator::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punctuation {
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Equal,
    Colon,
    Semicolon,
    Comma,
}

impl Punctuation {
    pub fn symbol(self) -> &'static str {
        match self {
            Punctuation::LeftParen => "(",
            Punctuation::RightParen => ")",
            Punctuation::LeftBrace => "{",
            Punctuation::RightBrace => "}",
            Punctuation::Equal => "=",
            Punctuation::Colon => ":",
            Punctuation::Semicolon => ";",
            Punctuation::Comma => ",",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Identifier(name) => write!(f, "{}", name),
            Token::Literal(value) => write!(f, "{}", value),
            Token::Keyword(keyword) => write!(f, "{}", keyword.name()),
            Token::Operator(op) => write!(f, "{}", op.symbol()),
            Token::Punctuation(p) => write!(f, "'{}'", p.symbol()),
        }
    }
}

/// A token with the location where it starts
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub token: Token,
    pub location: SourceLocation,
}

/// Lexer state
///
/// The position always points at the start of the next token or at the end
/// of input: whitespace is skipped on construction and after every token.
pub struct Lexer {
    source: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    file: Rc<str>,
    lines: Vec<Rc<str>>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self::with_file(source, "<unknown>")
    }

    pub fn with_file(source: &str, file: &str) -> Self {
        let mut lexer = Self {
            source: source.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            file: Rc::from(file),
            lines: source.split('\n').map(Rc::from).collect(),
        };
        lexer.skip_whitespace();
        lexer
    }

    /// Does the source contain more tokens?
    pub fn has_more(&self) -> bool {
        self.position < self.source.len()
    }

    /// Read the next token along with its location.
    pub fn read_token(&mut self) -> Result<TokenInfo> {
        let location = self.current_location();
        let ch = self.peek_char()?;

        let token = if ch.is_alphabetic() {
            self.read_symbol()
        } else if ch.is_ascii_digit() {
            self.read_number()?
        } else if ch == '"' {
            self.read_string()?
        } else {
            self.read_operator(ch)?
        };

        self.skip_whitespace();

        Ok(TokenInfo { token, location })
    }

    fn read_operator(&mut self, ch: char) -> Result<Token> {
        self.advance();
        let token = match ch {
            '+' => Token::Operator(Operator::Plus),
            '-' => Token::Operator(Operator::Minus),
            '*' => Token::Operator(Operator::Multiply),
            '/' => Token::Operator(Operator::Divide),
            '(' => Token::Punctuation(Punctuation::LeftParen),
            ')' => Token::Punctuation(Punctuation::RightParen),
            '{' => Token::Punctuation(Punctuation::LeftBrace),
            '}' => Token::Punctuation(Punctuation::RightBrace),
            ':' => Token::Punctuation(Punctuation::Colon),
            ';' => Token::Punctuation(Punctuation::Semicolon),
            ',' => Token::Punctuation(Punctuation::Comma),
            '=' if self.read_if('=') => Token::Operator(Operator::EqualEqual),
            '=' => Token::Punctuation(Punctuation::Equal),
            '!' if self.read_if('=') => Token::Operator(Operator::NotEqual),
            '!' => Token::Operator(Operator::Not),
            '<' if self.read_if('=') => Token::Operator(Operator::LessThanOrEqual),
            '<' => Token::Operator(Operator::LessThan),
            '>' if self.read_if('=') => Token::Operator(Operator::GreaterThanOrEqual),
            '>' => Token::Operator(Operator::GreaterThan),
            '&' if self.read_if('&') => Token::Operator(Operator::And),
            '&' => return Err(self.fail("got '&', did you mean '&&'?")),
            '|' if self.read_if('|') => Token::Operator(Operator::Or),
            '|' => return Err(self.fail("got '|', did you mean '||'?")),
            _ => return Err(self.fail(format!("unexpected character '{}'", ch))),
        };
        Ok(token)
    }

    /// Keywords, boolean literals and identifiers
    fn read_symbol(&mut self) -> Token {
        let symbol = self.read_while(|c| c.is_alphanumeric() || c == '_');
        if let Some(keyword) = Keyword::from_name(&symbol) {
            return Token::Keyword(keyword);
        }
        match symbol.as_str() {
            "true" => Token::Literal(Value::Bool(true)),
            "false" => Token::Literal(Value::Bool(false)),
            _ => Token::Identifier(symbol),
        }
    }

    fn read_number(&mut self) -> Result<Token> {
        let digits = self.read_while(|c| c.is_ascii_digit());
        digits
            .parse::<i64>()
            .map(|i| Token::Literal(Value::Integer(i)))
            .map_err(|_| self.fail(format!("expected Int, but got '{}'", digits)))
    }

    /// A backslash includes the following character verbatim.
    fn read_string(&mut self) -> Result<Token> {
        let mut text = String::new();
        let mut escape = false;

        self.advance();

        while let Some(ch) = self.advance() {
            if escape {
                text.push(ch);
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                return Ok(Token::Literal(Value::String(text)));
            } else {
                text.push(ch);
            }
        }

        Err(CompileError::unexpected_end(self.current_location()))
    }

    fn peek_char(&self) -> Result<char> {
        self.source
            .get(self.position)
            .copied()
            .ok_or_else(|| CompileError::unexpected_end(self.current_location()))
    }

    fn read_if(&mut self, ch: char) -> bool {
        if self.source.get(self.position) == Some(&ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn read_while(&mut self, predicate: impl Fn(char) -> bool) -> String {
        let mut result = String::new();
        while let Some(&ch) = self.source.get(self.position) {
            if !predicate(ch) {
                break;
            }
            result.push(ch);
            self.advance();
        }
        result
    }

    /// The only place where the position moves, keeping line and column in sync.
    fn advance(&mut self) -> Option<char> {
        let ch = *self.source.get(self.position)?;
        self.position += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        self.read_while(char::is_whitespace);
    }

    pub fn current_location(&self) -> SourceLocation {
        let line_text = self
            .lines
            .get(self.line - 1)
            .cloned()
            .unwrap_or_else(|| Rc::from(""));
        SourceLocation::new(self.file.clone(), self.line, self.column, line_text)
    }

    fn fail(&self, message: impl Into<String>) -> CompileError {
        CompileError::syntax(self.current_location(), message)
    }
}

/// Single token lookahead over [`Lexer`]
pub struct LookaheadLexer {
    lexer: Lexer,
    lookahead: Option<TokenInfo>,
}

impl LookaheadLexer {
    pub fn new(lexer: Lexer) -> Self {
        Self {
            lexer,
            lookahead: None,
        }
    }

    pub fn has_more(&self) -> bool {
        self.lookahead.is_some() || self.lexer.has_more()
    }

    /// Consume and return the next token.
    pub fn read(&mut self) -> Result<TokenInfo> {
        match self.lookahead.take() {
            Some(info) => Ok(info),
            None => self.lexer.read_token(),
        }
    }

    /// Return the next token without consuming it.
    pub fn peek(&mut self) -> Result<&TokenInfo> {
        if self.lookahead.is_none() {
            self.lookahead = Some(self.lexer.read_token()?);
        }
        match &self.lookahead {
            Some(info) => Ok(info),
            None => Err(CompileError::unexpected_end(self.lexer.current_location())),
        }
    }

    pub fn next_location(&mut self) -> Result<SourceLocation> {
        Ok(self.peek()?.location.clone())
    }

    pub fn next_is(&mut self, token: &Token) -> Result<bool> {
        Ok(self.has_more() && self.peek()?.token == *token)
    }

    /// Consume the next token if it is `token`.
    pub fn read_if(&mut self, token: &Token) -> Result<bool> {
        if self.next_is(token)? {
            self.read()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Consume `expected` and return its location, or fail.
    pub fn expect(&mut self, expected: &Token) -> Result<SourceLocation> {
        let info = self.read()?;
        if info.token == *expected {
            Ok(info.location)
        } else {
            Err(CompileError::syntax(
                info.location,
                format!("expected token {}, but got {}", expected, info.token),
            ))
        }
    }

    pub fn current_location(&self) -> SourceLocation {
        self.lexer.current_location()
    }
}
