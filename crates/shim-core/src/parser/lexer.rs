// Tokenizer for host source files

use super::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifiers and keywords
    Word(String),
    Integer(i64),
    Float(f64),
    Str(String),
    Symbol(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Word(w) => format!("`{w}`"),
            TokenKind::Integer(n) => format!("integer {n}"),
            TokenKind::Float(f) => format!("float {f}"),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Symbol(s) => format!("`{s}`"),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}

pub const KEYWORDS: &[&str] = &[
    "abstract", "class", "extends", "fn", "new", "let", "const", "public", "protected", "private",
    "static", "self", "parent", "this", "true", "false", "null", "return", "if", "else", "while",
    "for", "in", "break", "continue", "throw", "try", "catch", "finally", "yield", "exit", "use",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

// Longest first so that `...` wins over `.`
const SYMBOLS: &[&str] = &[
    "...", "=>", "==", "!=", "<=", ">=", "&&", "||", "::", "(", ")", "{", "}", "[", "]", ",", ";",
    ":", ".", "=", "<", ">", "+", "-", "*", "/", "%", "!", "&", "?",
];

struct Cursor {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Cursor {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn starts_with(&self, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(i, expected)| self.peek_at(i) == Some(expected))
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.line, self.column)
    }
}

/// Split `source` into tokens, dropping whitespace and comments.
/// The returned vector always ends with an `Eof` token.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut cursor = Cursor::new(source);
    let mut tokens = Vec::new();

    loop {
        skip_trivia(&mut cursor)?;
        let (line, column) = (cursor.line, cursor.column);
        let Some(ch) = cursor.peek() else {
            tokens.push(Token {
                kind: TokenKind::Eof,
                line,
                column,
            });
            return Ok(tokens);
        };

        let kind = if ch.is_ascii_alphabetic() || ch == '_' {
            let mut word = String::new();
            while let Some(c) = cursor.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    word.push(c);
                    cursor.bump();
                } else {
                    break;
                }
            }
            TokenKind::Word(word)
        } else if ch.is_ascii_digit() {
            lex_number(&mut cursor)?
        } else if ch == '"' {
            lex_string(&mut cursor)?
        } else if let Some(symbol) = SYMBOLS.iter().find(|s| cursor.starts_with(s)) {
            for _ in 0..symbol.len() {
                cursor.bump();
            }
            TokenKind::Symbol(*symbol)
        } else {
            return Err(cursor.error(format!("unexpected character `{ch}`")));
        };

        tokens.push(Token { kind, line, column });
    }
}

fn skip_trivia(cursor: &mut Cursor) -> Result<(), ParseError> {
    loop {
        match cursor.peek() {
            Some(c) if c.is_whitespace() => {
                cursor.bump();
            }
            Some('/') if cursor.peek_at(1) == Some('/') => {
                while let Some(c) = cursor.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            Some('/') if cursor.peek_at(1) == Some('*') => {
                let start = cursor.error("unterminated block comment");
                cursor.bump();
                cursor.bump();
                loop {
                    if cursor.starts_with("*/") {
                        cursor.bump();
                        cursor.bump();
                        break;
                    }
                    if cursor.bump().is_none() {
                        return Err(start);
                    }
                }
            }
            _ => return Ok(()),
        }
    }
}

fn lex_number(cursor: &mut Cursor) -> Result<TokenKind, ParseError> {
    let (line, column) = (cursor.line, cursor.column);
    let mut text = String::new();
    let mut is_float = false;

    while let Some(c) = cursor.peek() {
        if c.is_ascii_digit() {
            text.push(c);
            cursor.bump();
        } else if c == '.'
            && !is_float
            && cursor.peek_at(1).is_some_and(|next| next.is_ascii_digit())
        {
            is_float = true;
            text.push(c);
            cursor.bump();
        } else if (c == 'e' || c == 'E')
            && (cursor.peek_at(1).is_some_and(|next| next.is_ascii_digit())
                || (matches!(cursor.peek_at(1), Some('+') | Some('-'))
                    && cursor.peek_at(2).is_some_and(|next| next.is_ascii_digit())))
        {
            is_float = true;
            text.push(c);
            cursor.bump();
            if let Some(sign @ ('+' | '-')) = cursor.peek() {
                text.push(sign);
                cursor.bump();
            }
        } else {
            break;
        }
    }

    if is_float {
        text.parse::<f64>()
            .map(TokenKind::Float)
            .map_err(|e| ParseError::new(format!("invalid float `{text}`: {e}"), line, column))
    } else {
        text.parse::<i64>()
            .map(TokenKind::Integer)
            .map_err(|e| ParseError::new(format!("invalid integer `{text}`: {e}"), line, column))
    }
}

fn lex_string(cursor: &mut Cursor) -> Result<TokenKind, ParseError> {
    let start = cursor.error("unterminated string literal");
    cursor.bump();
    let mut value = String::new();
    loop {
        match cursor.bump() {
            None => return Err(start),
            Some('"') => return Ok(TokenKind::Str(value)),
            Some('\\') => {
                let escaped = match cursor.bump() {
                    Some('n') => '\n',
                    Some('t') => '\t',
                    Some('r') => '\r',
                    Some('"') => '"',
                    Some('\\') => '\\',
                    Some(other) => {
                        return Err(cursor.error(format!("unknown escape `\\{other}`")));
                    }
                    None => return Err(start),
                };
                value.push(escaped);
            }
            Some(c) => value.push(c),
        }
    }
}
