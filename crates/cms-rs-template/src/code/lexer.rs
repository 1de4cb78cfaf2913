//! Lexer for the inline-code language.
//!
//! In template mode the source is literal text with embedded `<? ... ?>` and
//! `<?= ... ?>` islands; in code mode the whole source is one island. Literal
//! text becomes [`Token::InlineText`], `<?=` becomes [`Token::OpenEcho`] and
//! `?>` becomes [`Token::CloseTag`], which the parser treats as a statement
//! terminator. That is what lets control structures span literal text.

use cms_rs_core::error::EngineError;

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Literal text outside of code islands.
    InlineText(String),
    /// `<?=`
    OpenEcho,
    /// `?>`
    CloseTag,
    /// `$name`
    Variable(String),
    Ident(String),
    Str(String),
    /// A double-quoted string containing `$name` interpolations.
    Interpolated(Vec<StrPart>),
    Int(i64),
    Float(f64),
    Symbol(&'static str),
}

/// A segment of a double-quoted string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrPart {
    Literal(String),
    Var(String),
}

/// A token with the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

/// Where lexing starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Template,
    Code,
}

// Longest first, so that `===` wins over `==` and `=`.
const SYMBOLS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "->", "=>", ".=", "+=", "-=", "++", "--",
    "(", ")", "{", "}", "[", "]", ",", ";", ".", "=", "<", ">", "!", "+", "-", "*", "/", "%",
    ":", "?",
];

/// Tokenizes inline-code source.
///
/// # Errors
///
/// Returns a parse-error diagnostic for unterminated strings or comments and
/// for characters the language does not know.
pub fn tokenize(source: &str, mode: Mode) -> Result<Vec<Spanned>, EngineError> {
    Lexer {
        src: source,
        pos: 0,
        line: 1,
        tokens: Vec::new(),
    }
    .run(mode)
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    tokens: Vec<Spanned>,
}

impl<'a> Lexer<'a> {
    fn run(mut self, mut mode: Mode) -> Result<Vec<Spanned>, EngineError> {
        while self.pos < self.src.len() {
            mode = match mode {
                Mode::Template => self.lex_text(),
                Mode::Code => self.lex_code()?,
            };
        }
        Ok(self.tokens)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn push(&mut self, token: Token, line: usize) {
        self.tokens.push(Spanned { token, line });
    }

    fn advance(&mut self, bytes: usize) {
        let consumed = &self.src[self.pos..self.pos + bytes];
        self.line += consumed.matches('\n').count();
        self.pos += bytes;
    }

    fn error(&self, message: impl Into<String>) -> EngineError {
        EngineError::parse(message, Some(self.line))
    }

    fn lex_text(&mut self) -> Mode {
        let line = self.line;
        let rest = self.rest();
        let Some(open) = rest.find("<?") else {
            let text = rest.to_string();
            let len = rest.len();
            self.push(Token::InlineText(text), line);
            self.advance(len);
            return Mode::Template;
        };

        if open > 0 {
            let text = rest[..open].to_string();
            self.push(Token::InlineText(text), line);
            self.advance(open);
        }

        let line = self.line;
        if self.rest().starts_with("<?=") {
            self.push(Token::OpenEcho, line);
            self.advance(3);
        } else if self.rest().starts_with("<?php") {
            self.advance(5);
        } else {
            self.advance(2);
        }
        Mode::Code
    }

    /// Lexes one token (or skips trivia) in code mode.
    fn lex_code(&mut self) -> Result<Mode, EngineError> {
        let Some(c) = self.peek() else {
            return Ok(Mode::Code);
        };
        let line = self.line;

        if c.is_whitespace() {
            self.advance(c.len_utf8());
            return Ok(Mode::Code);
        }

        let rest = self.rest();
        if rest.starts_with("?>") {
            self.push(Token::CloseTag, line);
            self.advance(2);
            // A newline directly after a close tag belongs to the tag.
            if self.rest().starts_with("\r\n") {
                self.advance(2);
            } else if self.rest().starts_with('\n') {
                self.advance(1);
            }
            return Ok(Mode::Template);
        }
        if rest.starts_with("//") || rest.starts_with('#') {
            self.skip_line_comment();
            return Ok(Mode::Code);
        }
        if rest.starts_with("/*") {
            let end = rest[2..]
                .find("*/")
                .ok_or_else(|| self.error("syntax error, unterminated comment"))?;
            self.advance(end + 4);
            return Ok(Mode::Code);
        }

        match c {
            '$' => {
                let name = ident_prefix(&rest[1..]);
                if name.is_empty() {
                    return Err(self.error("syntax error, unexpected '$'"));
                }
                let len = name.len();
                self.push(Token::Variable(name.to_string()), line);
                self.advance(len + 1);
            }
            c if c.is_alphabetic() || c == '_' => {
                let name = ident_prefix(rest);
                let len = name.len();
                self.push(Token::Ident(name.to_string()), line);
                self.advance(len);
            }
            c if c.is_ascii_digit() => self.lex_number()?,
            '\'' => self.lex_single_quoted()?,
            '"' => self.lex_double_quoted()?,
            _ => {
                let symbol = SYMBOLS
                    .iter()
                    .find(|s| rest.starts_with(**s))
                    .ok_or_else(|| self.error(format!("syntax error, unexpected '{c}'")))?;
                self.push(Token::Symbol(*symbol), line);
                self.advance(symbol.len());
            }
        }
        Ok(Mode::Code)
    }

    fn skip_line_comment(&mut self) {
        let rest = self.rest();
        let newline = rest.find('\n').unwrap_or(rest.len());
        let close = rest.find("?>").unwrap_or(rest.len());
        self.advance(newline.min(close));
    }

    fn lex_number(&mut self) -> Result<(), EngineError> {
        let line = self.line;
        let rest = self.rest();
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let bytes = rest.as_bytes();
        let is_float = bytes.get(int_len) == Some(&b'.')
            && bytes.get(int_len + 1).is_some_and(u8::is_ascii_digit);

        if is_float {
            let frac_len = rest[int_len + 1..]
                .bytes()
                .take_while(u8::is_ascii_digit)
                .count();
            let len = int_len + 1 + frac_len;
            let value: f64 = rest[..len]
                .parse()
                .map_err(|_| self.error(format!("syntax error, invalid number '{}'", &rest[..len])))?;
            self.push(Token::Float(value), line);
            self.advance(len);
        } else {
            let text = &rest[..int_len];
            let token = text.parse::<i64>().map_or_else(
                |_| text.parse::<f64>().map(Token::Float),
                |n| Ok(Token::Int(n)),
            );
            let token =
                token.map_err(|_| self.error(format!("syntax error, invalid number '{text}'")))?;
            self.push(token, line);
            self.advance(int_len);
        }
        Ok(())
    }

    fn lex_single_quoted(&mut self) -> Result<(), EngineError> {
        let line = self.line;
        let mut value = String::new();
        let mut chars = self.rest().char_indices().skip(1);
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, '\'')) => value.push('\''),
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, other)) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => break,
                },
                '\'' => {
                    self.push(Token::Str(value), line);
                    self.advance(i + 1);
                    return Ok(());
                }
                _ => value.push(c),
            }
        }
        Err(self.error("syntax error, unterminated string"))
    }

    fn lex_double_quoted(&mut self) -> Result<(), EngineError> {
        let line = self.line;
        let rest = self.rest();
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = rest.char_indices().skip(1).peekable();

        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, 'n')) => literal.push('\n'),
                    Some((_, 't')) => literal.push('\t'),
                    Some((_, 'r')) => literal.push('\r'),
                    Some((_, '"')) => literal.push('"'),
                    Some((_, '$')) => literal.push('$'),
                    Some((_, '\\')) => literal.push('\\'),
                    Some((_, other)) => {
                        literal.push('\\');
                        literal.push(other);
                    }
                    None => break,
                },
                '$' => {
                    let name = ident_prefix(&rest[i + 1..]);
                    if name.is_empty() {
                        literal.push('$');
                        continue;
                    }
                    if !literal.is_empty() {
                        parts.push(StrPart::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(StrPart::Var(name.to_string()));
                    for _ in 0..name.chars().count() {
                        chars.next();
                    }
                }
                '"' => {
                    let token = if parts.is_empty() {
                        Token::Str(literal)
                    } else {
                        if !literal.is_empty() {
                            parts.push(StrPart::Literal(literal));
                        }
                        Token::Interpolated(parts)
                    };
                    self.push(token, line);
                    self.advance(i + 1);
                    return Ok(());
                }
                _ => literal.push(c),
            }
        }
        Err(self.error("syntax error, unterminated string"))
    }
}

fn ident_prefix(s: &str) -> &str {
    let mut end = 0;
    for (i, c) in s.char_indices() {
        let ok = if i == 0 {
            c.is_alphabetic() || c == '_'
        } else {
            c.is_alphanumeric() || c == '_'
        };
        if !ok {
            break;
        }
        end = i + c.len_utf8();
    }
    &s[..end]
}
