//! UTF-8 lexer for the rule DSL.
//!
//! Pure: no global state, no I/O. Accepts the identifier shapes real
//! OpenTelemetry data carries — URIs, Kubernetes labels, Unicode.

use crate::error::LexError;
use crate::token::{Token, TokenKind};

/// Code points, besides letters/underscore/non-ASCII, that may start or
/// continue an identifier. OTel span/attribute names routinely use these.
const SAFE_SPECIAL_CHARS: &[char] = &['-', '/', ':', '@', '#', '$', '%', '*', '?', '&', '='];

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || (c as u32) > 0x7F || SAFE_SPECIAL_CHARS.contains(&c)
}

fn is_identifier_continue(c: char) -> bool {
    is_identifier_start(c) || c.is_ascii_digit()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Lexer {
            chars: input.chars().collect(),
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

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let (line, column) = (self.line, self.column);
            let Some(c) = self.peek() else {
                tokens.push(Token::new(TokenKind::Eof, "", line, column));
                break;
            };

            match c {
                '.' => {
                    self.advance();
                    tokens.push(Token::new(TokenKind::Dot, ".", line, column));
                }
                ',' => {
                    self.advance();
                    tokens.push(Token::new(TokenKind::Comma, ",", line, column));
                }
                '(' => {
                    self.advance();
                    tokens.push(Token::new(TokenKind::LeftParen, "(", line, column));
                }
                ')' => {
                    self.advance();
                    tokens.push(Token::new(TokenKind::RightParen, ")", line, column));
                }
                '[' => {
                    self.advance();
                    tokens.push(Token::new(TokenKind::LeftBracket, "[", line, column));
                }
                ']' => {
                    self.advance();
                    tokens.push(Token::new(TokenKind::RightBracket, "]", line, column));
                }
                '"' => tokens.push(self.lex_string(line, column)?),
                '!' => {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        tokens.push(Token::new(TokenKind::NotEq, "!=", line, column));
                    } else {
                        return Err(LexError::UnexpectedChar { ch: '!', line, column });
                    }
                }
                '>' => {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        tokens.push(Token::new(TokenKind::GtEq, ">=", line, column));
                    } else {
                        tokens.push(Token::new(TokenKind::Gt, ">", line, column));
                    }
                }
                '<' => {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        tokens.push(Token::new(TokenKind::LtEq, "<=", line, column));
                    } else {
                        tokens.push(Token::new(TokenKind::Lt, "<", line, column));
                    }
                }
                '=' if self.peek_at(1) == Some('=') => {
                    self.advance();
                    self.advance();
                    tokens.push(Token::new(TokenKind::EqEq, "==", line, column));
                }
                c if c.is_ascii_digit() => tokens.push(self.lex_number(line, column)?),
                c if is_identifier_start(c) => tokens.push(self.lex_identifier(line, column)),
                other => {
                    return Err(LexError::UnexpectedChar {
                        ch: other,
                        line,
                        column,
                    })
                }
            }
        }
        Ok(tokens)
    }

    fn lex_string(&mut self, line: usize, column: usize) -> Result<Token, LexError> {
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            match self.peek() {
                None => return Err(LexError::UnterminatedString { line, column }),
                Some('\n') => return Err(LexError::UnterminatedString { line, column }),
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') if self.peek_at(1) == Some('"') => {
                    self.advance();
                    self.advance();
                    text.push('"');
                }
                Some(c) => {
                    self.advance();
                    text.push(c);
                }
            }
        }
        Ok(Token::new(TokenKind::String, text, line, column))
    }

    fn lex_number(&mut self, line: usize, column: usize) -> Result<Token, LexError> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            text.push('.');
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
        }
        if text.parse::<f64>().is_err() {
            return Err(LexError::InvalidNumber { text, line, column });
        }
        Ok(Token::new(TokenKind::Number, text, line, column))
    }

    /// Scans an identifier, folding a `.` into the token when the code
    /// point right after it would itself start an identifier segment.
    /// This lets the parser later split on dots uniformly whether the
    /// lexer folded them or emitted separate dot tokens.
    fn lex_identifier(&mut self, line: usize, column: usize) -> Token {
        let mut text = String::new();
        loop {
            match self.peek() {
                Some(c) if is_identifier_continue(c) => {
                    text.push(c);
                    self.advance();
                }
                Some('.') if self.peek_at(1).is_some_and(is_identifier_start) => {
                    text.push('.');
                    self.advance();
                }
                _ => break,
            }
        }
        let kind = match text.as_str() {
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "in" => TokenKind::In,
            "matches" => TokenKind::Matches,
            "true" | "false" => TokenKind::Boolean,
            _ => TokenKind::Identifier,
        };
        Token::new(kind, text, line, column)
    }
}

/// Lex `input` into a token stream terminated by `Eof`, or the first
/// lexical error encountered.
pub fn lex(input: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(input).run()
}
