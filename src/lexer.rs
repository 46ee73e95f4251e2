use crate::error::{SableError, Span};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Colon,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Star,
    Ampersand,
    Pipe,

    // One or two character tokens
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    AndAnd,
    OrOr,

    // Literals
    Identifier,
    String,
    Number,
    Boolean,
    Null,

    // Keywords
    Let,
    Const,
    If,
    Else,
    Loop,
    Next,
    Stop,
    Function,
    Return,
    Print,
    Take,

    // Special
    Eof,
}

impl TokenType {
    /// Upper-case name used by token listings.
    pub fn name(&self) -> &'static str {
        match self {
            TokenType::LeftParen => "LPAREN",
            TokenType::RightParen => "RPAREN",
            TokenType::LeftBrace => "LBRACE",
            TokenType::RightBrace => "RBRACE",
            TokenType::LeftBracket => "LBRACKET",
            TokenType::RightBracket => "RBRACKET",
            TokenType::Comma => "COMMA",
            TokenType::Colon => "COLON",
            TokenType::Dot => "DOT",
            TokenType::Minus => "MINUS",
            TokenType::Plus => "PLUS",
            TokenType::Semicolon => "SEMICOLON",
            TokenType::Slash => "DIV",
            TokenType::Star => "MUL",
            TokenType::Ampersand => "AMPERSAND",
            TokenType::Pipe => "PIPE",
            TokenType::Bang => "NOT",
            TokenType::BangEqual => "NOT_EQUAL",
            TokenType::Equal => "ASSIGN",
            TokenType::EqualEqual => "EQUAL",
            TokenType::Greater => "GREATER",
            TokenType::GreaterEqual => "GREATER_EQUAL",
            TokenType::Less => "LESS",
            TokenType::LessEqual => "LESS_EQUAL",
            TokenType::AndAnd => "AND",
            TokenType::OrOr => "OR",
            TokenType::Identifier => "IDENTIFIER",
            TokenType::String => "STRING",
            TokenType::Number => "NUMBER",
            TokenType::Boolean => "BOOLEAN",
            TokenType::Null => "NULL",
            TokenType::Let => "LET",
            TokenType::Const => "CONST",
            TokenType::If => "IF",
            TokenType::Else => "ELSE",
            TokenType::Loop => "LOOP",
            TokenType::Next => "NEXT",
            TokenType::Stop => "STOP",
            TokenType::Function => "FUNCTION",
            TokenType::Return => "RETURN",
            TokenType::Print => "PRINT",
            TokenType::Take => "TAKE",
            TokenType::Eof => "END",
        }
    }
}

/// Operators, longest first so two-character forms win over their prefixes.
const OPERATORS: &[(&str, TokenType)] = &[
    ("==", TokenType::EqualEqual),
    ("!=", TokenType::BangEqual),
    (">=", TokenType::GreaterEqual),
    ("<=", TokenType::LessEqual),
    ("&&", TokenType::AndAnd),
    ("||", TokenType::OrOr),
    (".", TokenType::Dot),
    ("-", TokenType::Minus),
    ("+", TokenType::Plus),
    ("/", TokenType::Slash),
    ("*", TokenType::Star),
    (")", TokenType::RightParen),
    ("(", TokenType::LeftParen),
    ("{", TokenType::LeftBrace),
    ("}", TokenType::RightBrace),
    ("[", TokenType::LeftBracket),
    ("]", TokenType::RightBracket),
    (";", TokenType::Semicolon),
    (":", TokenType::Colon),
    (",", TokenType::Comma),
    ("=", TokenType::Equal),
    (">", TokenType::Greater),
    ("<", TokenType::Less),
    ("!", TokenType::Bang),
    ("&", TokenType::Ampersand),
    ("|", TokenType::Pipe),
];

fn is_operator_char(c: char) -> bool {
    matches!(
        c,
        '.' | '-' | '+' | '/' | '*' | ')' | '(' | '{' | '}' | '[' | ']' | ';' | ':' | ',' | '='
            | '>' | '<' | '!' | '&' | '|'
    )
}

/// Payload carried by literal tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Number(f64),
    Text(String),
    Boolean(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub literal: Literal,
    pub span: Span,
}

impl Token {
    pub fn new(token_type: TokenType, lexeme: String, literal: Literal, span: Span) -> Self {
        Self {
            token_type,
            lexeme,
            literal,
            span,
        }
    }

    pub fn line(&self) -> usize {
        self.span.line
    }

    pub fn column(&self) -> usize {
        self.span.column
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.literal {
            Literal::None => write!(f, "{}", self.token_type.name()),
            Literal::Number(n) => write!(f, "{} {}", self.token_type.name(), n),
            Literal::Text(text) => write!(f, "{} {}", self.token_type.name(), text),
            Literal::Boolean(b) => write!(f, "{} {}", self.token_type.name(), b),
        }
    }
}

/// Single forward pass over an immutable source buffer.
pub struct Lexer {
    source: Vec<char>,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: usize,
    column: usize,
    start_line: usize,
    start_column: usize,
    keywords: HashMap<&'static str, TokenType>,
}

impl Lexer {
    pub fn new(source: String) -> Self {
        let mut keywords = HashMap::new();
        keywords.insert("let", TokenType::Let);
        keywords.insert("const", TokenType::Const);
        keywords.insert("if", TokenType::If);
        keywords.insert("else", TokenType::Else);
        keywords.insert("loop", TokenType::Loop);
        keywords.insert("next", TokenType::Next);
        keywords.insert("stop", TokenType::Stop);
        keywords.insert("function", TokenType::Function);
        keywords.insert("return", TokenType::Return);
        keywords.insert("print", TokenType::Print);
        keywords.insert("take", TokenType::Take);
        keywords.insert("true", TokenType::Boolean);
        keywords.insert("false", TokenType::Boolean);
        keywords.insert("null", TokenType::Null);

        Self {
            source: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
            column: 1,
            start_line: 1,
            start_column: 1,
            keywords,
        }
    }

    /// Tokenizes the whole buffer. The last token is always `Eof`.
    pub fn scan_tokens(mut self) -> Result<Vec<Token>, SableError> {
        loop {
            self.skip_trivia();
            if self.is_at_end() {
                break;
            }
            self.start = self.current;
            self.start_line = self.line;
            self.start_column = self.column;
            self.scan_token()?;
        }

        self.tokens.push(Token::new(
            TokenType::Eof,
            String::new(),
            Literal::None,
            Span::single(self.current, self.line, self.column),
        ));

        debug!(count = self.tokens.len(), "lexed source");
        Ok(self.tokens)
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    /// Skips whitespace and `//` comments.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                ' ' | '\r' | '\t' | '\n' => {
                    self.advance();
                }
                '/' if self.peek_next() == '/' => {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                }
                c if c.is_whitespace() && !self.is_at_end() => {
                    self.advance();
                }
                _ => return,
            }
        }
    }

    fn scan_token(&mut self) -> Result<(), SableError> {
        let c = self.peek();

        match c {
            '"' => self.string(),
            c if c.is_ascii_digit() => self.number(),
            c if is_operator_char(c) => {
                self.operator();
                Ok(())
            }
            _ => self.word(),
        }
    }

    fn operator(&mut self) {
        for (text, token_type) in OPERATORS {
            if self.matches_ahead(text) {
                for _ in 0..text.chars().count() {
                    self.advance();
                }
                self.add_token(*token_type, Literal::None);
                return;
            }
        }
        unreachable!("is_operator_char and OPERATORS disagree");
    }

    fn matches_ahead(&self, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(offset, expected)| self.source.get(self.current + offset) == Some(&expected))
    }

    fn advance(&mut self) -> char {
        let c = match self.source.get(self.current) {
            Some(c) => *c,
            None => return '\0',
        };
        self.current += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn peek(&self) -> char {
        self.source.get(self.current).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.source.get(self.current + 1).copied().unwrap_or('\0')
    }

    fn string(&mut self) -> Result<(), SableError> {
        // Opening quote
        self.advance();

        while self.peek() != '"' && !self.is_at_end() {
            self.advance();
        }

        if self.is_at_end() {
            return Err(SableError::lex_error(
                self.current_span(),
                "Unterminated string".to_string(),
            ));
        }

        // Closing quote
        self.advance();

        let content: String = self.source[self.start + 1..self.current - 1]
            .iter()
            .collect();
        self.add_token(TokenType::String, Literal::Text(content));
        Ok(())
    }

    fn number(&mut self) -> Result<(), SableError> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        // A '.' only belongs to the number when a digit follows it.
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();

            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let text = self.lexeme();
        let value = text.parse::<f64>().map_err(|_| {
            SableError::lex_error(self.current_span(), format!("Invalid number: {}", text))
        })?;
        self.add_token(TokenType::Number, Literal::Number(value));
        Ok(())
    }

    fn word(&mut self) -> Result<(), SableError> {
        while !self.is_at_end() {
            let c = self.peek();
            if c.is_whitespace() || is_operator_char(c) || c == '"' {
                break;
            }
            self.advance();
        }

        let text = self.lexeme();
        let is_identifier = {
            let mut chars = text.chars();
            matches!(chars.next(), Some(first) if first.is_alphabetic() || first == '_')
                && chars.all(|c| c.is_alphanumeric() || c == '_')
        };

        if !is_identifier {
            return Err(SableError::lex_error(
                self.current_span(),
                format!("Unrecognized character sequence: '{}'", text),
            ));
        }

        match self.keywords.get(text.as_str()).copied() {
            Some(TokenType::Boolean) => {
                let value = text == "true";
                self.add_token(TokenType::Boolean, Literal::Boolean(value));
            }
            Some(token_type) => self.add_token(token_type, Literal::None),
            None => self.add_token(TokenType::Identifier, Literal::Text(text)),
        }
        Ok(())
    }

    fn lexeme(&self) -> String {
        self.source[self.start..self.current].iter().collect()
    }

    fn current_span(&self) -> Span {
        Span::new(self.start, self.current, self.start_line, self.start_column)
    }

    fn add_token(&mut self, token_type: TokenType, literal: Literal) {
        let lexeme = self.lexeme();
        self.tokens
            .push(Token::new(token_type, lexeme, literal, self.current_span()));
    }
}
