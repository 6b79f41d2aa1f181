//! Tokenizer for VASM-style assembly source (spec.md §4.1), grounded on
//! `original_source/ssp/scripting/source.py` and `.../assembler/lexer.py`.
//!
//! A [`Source`] is a minimal `peek`/`get`/`is_eof` character cursor over a
//! `&str`; [`Lexer`] drives it one token at a time, tracking 1-based
//! line/column and folding `#...\n` comments into skipped whitespace.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Identifier,
    Integer,
    Real,
    String,
    StartList,
    EndList,
    StartDict,
    EndDict,
    Comma,
    Colon,
}

impl TokenType {
    pub fn type_name(self) -> &'static str {
        match self {
            TokenType::Identifier => "identifier",
            TokenType::Integer => "integer",
            TokenType::Real => "real",
            TokenType::String => "string",
            TokenType::StartList => "list",
            TokenType::EndList => "end of list",
            TokenType::StartDict => "dictionary",
            TokenType::EndDict => "end of dictionary",
            TokenType::Comma => "comma",
            TokenType::Colon => "colon",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// A literal value attached to a token, when the token type carries one.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Real(f64),
    Str(String),
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenType,
    pub literal: Literal,
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}:{}", self.kind, self.line, self.col)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LexError {
    #[error("unexpected character '{ch}' [{line}:{col}]")]
    UnexpectedChar { ch: char, line: u32, col: u32 },
    #[error("malformed numeric literal '{text}' [{line}:{col}]")]
    MalformedNumeric { text: String, line: u32, col: u32 },
    #[error("unterminated string literal [{line}:{col}]")]
    UnterminatedString { line: u32, col: u32 },
}

impl LexError {
    pub fn line(&self) -> u32 {
        match self {
            LexError::UnexpectedChar { line, .. } => *line,
            LexError::MalformedNumeric { line, .. } => *line,
            LexError::UnterminatedString { line, .. } => *line,
        }
    }

    pub fn col(&self) -> u32 {
        match self {
            LexError::UnexpectedChar { col, .. } => *col,
            LexError::MalformedNumeric { col, .. } => *col,
            LexError::UnterminatedString { col, .. } => *col,
        }
    }
}

/// A character cursor over the full source text, tracking position as it
/// goes (`original_source`'s `Source`/`FileSource` split, minus the
/// chunked-buffering detail, which is moot once the whole file is in
/// memory as a `&str`).
struct Source<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Source<'a> {
    fn new(text: &'a str) -> Self {
        Source {
            chars: text.chars().peekable(),
        }
    }

    fn is_eof(&mut self) -> bool {
        self.chars.peek().is_none()
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn get(&mut self) -> Option<char> {
        self.chars.next()
    }
}

pub struct Lexer<'a> {
    src: Source<'a>,
    line: u32,
    col: u32,
    lookahead: Option<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str) -> Self {
        Lexer {
            src: Source::new(text),
            line: 1,
            col: 1,
            lookahead: None,
        }
    }

    pub fn is_eof(&mut self) -> Result<bool, LexError> {
        Ok(self.peek_token()?.is_none())
    }

    pub fn peek_token(&mut self) -> Result<Option<&Token>, LexError> {
        if self.lookahead.is_none() {
            self.lookahead = self.parse_token()?;
        }
        Ok(self.lookahead.as_ref())
    }

    pub fn get_token(&mut self) -> Result<Option<Token>, LexError> {
        if self.lookahead.is_none() {
            self.lookahead = self.parse_token()?;
        }
        Ok(self.lookahead.take())
    }

    fn parse_token(&mut self) -> Result<Option<Token>, LexError> {
        self.skip_whitespace_and_comments();
        if self.src.is_eof() {
            return Ok(None);
        }

        let (line, col) = (self.line, self.col);
        let peeked = self.src.peek().unwrap();

        let simple = match peeked {
            '[' => Some(TokenType::StartList),
            ']' => Some(TokenType::EndList),
            '{' => Some(TokenType::StartDict),
            '}' => Some(TokenType::EndDict),
            ',' => Some(TokenType::Comma),
            ':' => Some(TokenType::Colon),
            _ => None,
        };
        if let Some(kind) = simple {
            self.advance();
            return Ok(Some(Token {
                kind,
                literal: Literal::None,
                line,
                col,
            }));
        }

        if peeked.is_alphabetic() {
            return Ok(Some(self.parse_identifier(line, col)));
        }
        if peeked.is_ascii_digit() || peeked == '-' {
            return self.parse_numeric(line, col).map(Some);
        }
        if peeked == '"' {
            return self.parse_string(line, col).map(Some);
        }

        Err(LexError::UnexpectedChar {
            ch: peeked,
            line,
            col,
        })
    }

    fn skip_whitespace_and_comments(&mut self) {
        let mut in_comment = false;
        loop {
            match self.src.peek() {
                Some(c) if c.is_whitespace() => {
                    if in_comment && c == '\n' {
                        in_comment = false;
                    }
                    self.advance();
                }
                Some('#') if !in_comment => {
                    in_comment = true;
                    self.advance();
                }
                Some(_) if in_comment => {
                    self.advance();
                }
                _ => break,
            }
        }
    }

    fn advance(&mut self) -> Option<char> {
        let got = self.src.get();
        match got {
            Some('\n') => {
                self.line += 1;
                self.col = 1;
            }
            Some(_) => self.col += 1,
            None => {}
        }
        got
    }

    fn parse_identifier(&mut self, line: u32, col: u32) -> Token {
        let mut ident = String::new();
        while let Some(c) = self.src.peek() {
            if c.is_alphabetic() {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }
        Token {
            kind: TokenType::Identifier,
            literal: Literal::Str(ident),
            line,
            col,
        }
    }

    /// Numeric literals: optional leading `-`, digits, an optional single
    /// embedded `.` for reals, or a canonical `0x`/`0b` prefix for
    /// hex/binary integers (spec.md §9 resolves the prefix-vs-postfix
    /// open question in favor of the conventional prefix form).
    fn parse_numeric(&mut self, line: u32, col: u32) -> Result<Token, LexError> {
        let mut text = String::new();
        let is_negative = if self.src.peek() == Some('-') {
            text.push('-');
            self.advance();
            true
        } else {
            false
        };

        // Detect 0x / 0b prefixes before falling back to plain decimal/real.
        if self.src.peek() == Some('0') {
            let snapshot_text = text.clone();
            text.push('0');
            self.advance();
            match self.src.peek() {
                Some('x') | Some('X') => {
                    self.advance();
                    let mut digits = String::new();
                    while let Some(c) = self.src.peek() {
                        if c.is_ascii_hexdigit() {
                            digits.push(c);
                            self.advance();
                        } else {
                            break;
                        }
                    }
                    if digits.is_empty() {
                        return Err(LexError::MalformedNumeric {
                            text: format!("{}0x{}", snapshot_text, digits),
                            line,
                            col,
                        });
                    }
                    let value = i64::from_str_radix(&digits, 16).map_err(|_| {
                        LexError::MalformedNumeric {
                            text: digits.clone(),
                            line,
                            col,
                        }
                    })?;
                    let value = if is_negative { -value } else { value };
                    return Ok(Token {
                        kind: TokenType::Integer,
                        literal: Literal::Int(value),
                        line,
                        col,
                    });
                }
                Some('b') | Some('B') => {
                    self.advance();
                    let mut digits = String::new();
                    while let Some(c) = self.src.peek() {
                        if c == '0' || c == '1' {
                            digits.push(c);
                            self.advance();
                        } else {
                            break;
                        }
                    }
                    if digits.is_empty() {
                        return Err(LexError::MalformedNumeric {
                            text: format!("{}b{}", snapshot_text, digits),
                            line,
                            col,
                        });
                    }
                    let value = i64::from_str_radix(&digits, 2).map_err(|_| {
                        LexError::MalformedNumeric {
                            text: digits.clone(),
                            line,
                            col,
                        }
                    })?;
                    let value = if is_negative { -value } else { value };
                    return Ok(Token {
                        kind: TokenType::Integer,
                        literal: Literal::Int(value),
                        line,
                        col,
                    });
                }
                _ => {} // plain "0..." decimal/real, fall through below
            }
        }

        let mut seen_dot = false;
        while let Some(c) = self.src.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else if c == '.' && !seen_dot {
                seen_dot = true;
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }

        if seen_dot {
            text.parse::<f64>()
                .map(|value| Token {
                    kind: TokenType::Real,
                    literal: Literal::Real(value),
                    line,
                    col,
                })
                .map_err(|_| LexError::MalformedNumeric { text, line, col })
        } else {
            text.parse::<i64>()
                .map(|value| Token {
                    kind: TokenType::Integer,
                    literal: Literal::Int(value),
                    line,
                    col,
                })
                .map_err(|_| LexError::MalformedNumeric { text, line, col })
        }
    }

    fn parse_string(&mut self, line: u32, col: u32) -> Result<Token, LexError> {
        self.advance(); // opening quote
        let mut value = String::new();
        let mut escaped = false;
        loop {
            match self.src.peek() {
                None => return Err(LexError::UnterminatedString { line, col }),
                Some('"') if !escaped => {
                    self.advance();
                    break;
                }
                Some('\\') if !escaped => {
                    escaped = true;
                    self.advance();
                }
                Some(c) if escaped => {
                    let resolved = match c {
                        't' => '\t',
                        'f' => '\x0c',
                        'r' => '\r',
                        'n' => '\n',
                        'a' => '\x07',
                        '"' => '"',
                        '\\' => '\\',
                        other => other,
                    };
                    value.push(resolved);
                    self.advance();
                    escaped = false;
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
        Ok(Token {
            kind: TokenType::String,
            literal: Literal::Str(value),
            line,
            col,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        while let Some(tok) = lexer.get_token().unwrap() {
            out.push(tok);
        }
        out
    }

    #[test]
    fn identifier_is_letters_only() {
        let toks = tokens("PUSH");
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].kind, TokenType::Identifier);
        assert_eq!(toks[0].literal, Literal::Str("PUSH".to_string()));
    }

    #[test]
    fn comment_is_skipped() {
        let toks = tokens("PUSH # comment here\n1");
        assert_eq!(toks.len(), 2);
        assert_eq!(toks[1].line, 2);
    }

    #[test]
    fn negative_integer_and_real() {
        let toks = tokens("-4 -4.5");
        assert_eq!(toks[0].literal, Literal::Int(-4));
        assert_eq!(toks[1].literal, Literal::Real(-4.5));
    }

    #[test]
    fn hex_and_binary_prefixes() {
        let toks = tokens("0xFF 0b101");
        assert_eq!(toks[0].literal, Literal::Int(255));
        assert_eq!(toks[1].literal, Literal::Int(5));
    }

    #[test]
    fn string_escapes() {
        let toks = tokens("\"a\\nb\\t\\\"\"");
        assert_eq!(toks[0].literal, Literal::Str("a\nb\t\"".to_string()));
    }

    #[test]
    fn unterminated_string_errors() {
        let mut lexer = Lexer::new("\"abc");
        assert!(matches!(
            lexer.get_token(),
            Err(LexError::UnterminatedString { .. })
        ));
    }

    #[test]
    fn unknown_char_errors() {
        let mut lexer = Lexer::new("$");
        assert!(matches!(
            lexer.get_token(),
            Err(LexError::UnexpectedChar { ch: '$', .. })
        ));
    }

    #[test]
    fn punctuation_tokens() {
        let toks = tokens("[ ] { } , :");
        let kinds: Vec<_> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenType::StartList,
                TokenType::EndList,
                TokenType::StartDict,
                TokenType::EndDict,
                TokenType::Comma,
                TokenType::Colon,
            ]
        );
    }
}
