//! Byte-accurate lexer with a line table for diagnostics.
//!
//! Token length is never stored: it is recomputed on demand from the source
//! bytes and a per-kind rule. This keeps [`Token`] to
//! two fields and avoids a second source of truth for where a lexeme ends.

use crate::diagnostics::{Diagnostic, DiagnosticBag, Span};

/// Index into the token stream. Index 0 is a reserved dummy token so every
/// real token has a nonzero index elsewhere in the compiler (the "0 =
/// absent" convention used throughout).
pub type TokenIndex = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Eof,
    Dummy,
    Number,
    String,
    Ident,
    // keywords
    Fun,
    Return,
    False,
    True,
    Val,
    Var,
    If,
    Else,
    While,
    // punctuation / operators
    LParen,
    RParen,
    LBrace,
    RBrace,
    Colon,
    Comma,
    Dot,
    Eq,
    EqEq,
    Bang,
    BangEq,
    Lt,
    Le,
    Gt,
    Ge,
    AmpAmp,
    PipePipe,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
}

#[derive(Debug, Clone, Copy)]
pub struct Token {
    pub kind: TokenKind,
    pub source_offset: u32,
}

/// Ordered source offsets: entry `i` is the start of line `i + 1`; a
/// sentinel entry equal to the source length is appended so callers can
/// look up the line containing any valid offset, including EOF, without
/// special-casing it.
#[derive(Debug, Clone)]
pub struct LineTable {
    line_starts: Vec<u32>,
}

impl LineTable {
    fn build(source: &[u8]) -> Self {
        let mut line_starts = vec![0u32];
        for (i, &b) in source.iter().enumerate() {
            if b == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        line_starts.push(source.len() as u32);
        LineTable { line_starts }
    }

    /// 0-indexed `(line, column)` for a byte offset.
    pub fn line_col(&self, offset: u32) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert_at) => insert_at.saturating_sub(1),
        };
        let line = line.min(self.line_starts.len() - 2);
        let col = offset - self.line_starts[line];
        (line, col as usize)
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic()
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// The length, in bytes, of the lexeme starting at `offset` with the given
/// `kind`. Fixed for punctuation/keywords; scanned from the source for
/// number/identifier/string.
pub fn token_len(kind: TokenKind, source: &[u8], offset: u32) -> u32 {
    use TokenKind::*;
    match kind {
        Eof | Dummy => 0,
        Fun => 3,
        Return => 6,
        False => 5,
        True => 4,
        Val => 3,
        Var => 3,
        If => 2,
        Else => 4,
        While => 5,
        LParen | RParen | LBrace | RBrace | Colon | Comma | Dot | Eq | Bang | Lt | Gt | Plus
        | Minus | Star | Slash | Percent => 1,
        EqEq | BangEq | Le | Ge | AmpAmp | PipePipe => 2,
        Ident => {
            let mut end = offset as usize;
            while end < source.len() && is_ident_continue(source[end]) {
                end += 1;
            }
            end as u32 - offset
        }
        Number => {
            let mut end = offset as usize;
            while end < source.len() && (source[end].is_ascii_digit() || source[end] == b'_') {
                end += 1;
            }
            if end < source.len() && (source[end] == b'L' || source[end] == b'l') {
                end += 1;
            }
            end as u32 - offset
        }
        String => {
            // offset points at the opening quote; scan to the matching
            // closing quote (or EOF, for an unterminated literal).
            let mut end = offset as usize + 1;
            while end < source.len() && source[end] != b'"' {
                end += 1;
            }
            if end < source.len() {
                end += 1; // include the closing quote
            }
            end as u32 - offset
        }
    }
}

pub struct LexResult {
    pub tokens: Vec<Token>,
    pub line_table: LineTable,
    pub diagnostics: DiagnosticBag,
}

pub fn lex(source: &[u8]) -> LexResult {
    let mut tokens = vec![Token {
        kind: TokenKind::Dummy,
        source_offset: 0,
    }];
    let mut diagnostics = DiagnosticBag::new();
    let line_table = LineTable::build(source);
    let mut i: usize = 0;

    while i < source.len() {
        let b = source[i];
        match b {
            b' ' | b'\t' | b'\r' | b'\n' => {
                i += 1;
            }
            b'/' if source.get(i + 1) == Some(&b'/') => {
                while i < source.len() && source[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if source.get(i + 1) == Some(&b'*') => {
                let start = i;
                i += 2;
                let mut closed = false;
                while i + 1 < source.len() {
                    if source[i] == b'*' && source[i + 1] == b'/' {
                        i += 2;
                        closed = true;
                        break;
                    }
                    i += 1;
                }
                if !closed {
                    i = source.len();
                    diagnostics.push(Diagnostic::error(
                        "unterminated block comment",
                        Span::point(start as u32),
                    ));
                }
            }
            b'"' => {
                let kind = TokenKind::String;
                let len = token_len(kind, source, i as u32);
                let closed = len >= 2 && source[i + len as usize - 1] == b'"';
                if !closed {
                    diagnostics.push(Diagnostic::error(
                        "unterminated string literal",
                        Span::point(i as u32),
                    ));
                }
                tokens.push(Token {
                    kind,
                    source_offset: i as u32,
                });
                i += len as usize;
            }
            b'0'..=b'9' => {
                let kind = TokenKind::Number;
                let len = token_len(kind, source, i as u32);
                let lexeme = &source[i..i + len as usize];
                let digits: String = lexeme
                    .iter()
                    .copied()
                    .filter(|&c| c != b'_' && c != b'L' && c != b'l')
                    .map(|c| c as char)
                    .collect();
                if digits.parse::<u64>().is_err() {
                    diagnostics.push(Diagnostic::error(
                        "integer literal overflows 64 bits",
                        Span::point(i as u32),
                    ));
                }
                tokens.push(Token {
                    kind,
                    source_offset: i as u32,
                });
                i += len as usize;
            }
            _ if is_ident_start(b) => {
                let len = token_len(TokenKind::Ident, source, i as u32);
                let lexeme = std::str::from_utf8(&source[i..i + len as usize]).unwrap_or("");
                let kind = keyword_kind(lexeme).unwrap_or(TokenKind::Ident);
                tokens.push(Token {
                    kind,
                    source_offset: i as u32,
                });
                i += len as usize;
            }
            _ => {
                if let Some((kind, len)) = punctuation(source, i) {
                    tokens.push(Token {
                        kind,
                        source_offset: i as u32,
                    });
                    i += len;
                } else {
                    diagnostics.push(Diagnostic::error(
                        format!("unexpected byte 0x{b:02x}"),
                        Span::point(i as u32),
                    ));
                    i += 1;
                }
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        source_offset: source.len() as u32,
    });

    LexResult {
        tokens,
        line_table,
        diagnostics,
    }
}

fn keyword_kind(lexeme: &str) -> Option<TokenKind> {
    Some(match lexeme {
        "fun" => TokenKind::Fun,
        "return" => TokenKind::Return,
        "false" => TokenKind::False,
        "true" => TokenKind::True,
        "val" => TokenKind::Val,
        "var" => TokenKind::Var,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        _ => return None,
    })
}

fn punctuation(source: &[u8], i: usize) -> Option<(TokenKind, usize)> {
    let two = (source[i], source.get(i + 1).copied());
    match two {
        (b'=', Some(b'=')) => return Some((TokenKind::EqEq, 2)),
        (b'!', Some(b'=')) => return Some((TokenKind::BangEq, 2)),
        (b'<', Some(b'=')) => return Some((TokenKind::Le, 2)),
        (b'>', Some(b'=')) => return Some((TokenKind::Ge, 2)),
        (b'&', Some(b'&')) => return Some((TokenKind::AmpAmp, 2)),
        (b'|', Some(b'|')) => return Some((TokenKind::PipePipe, 2)),
        _ => {}
    }
    let kind = match source[i] {
        b'(' => TokenKind::LParen,
        b')' => TokenKind::RParen,
        b'{' => TokenKind::LBrace,
        b'}' => TokenKind::RBrace,
        b':' => TokenKind::Colon,
        b',' => TokenKind::Comma,
        b'.' => TokenKind::Dot,
        b'=' => TokenKind::Eq,
        b'!' => TokenKind::Bang,
        b'<' => TokenKind::Lt,
        b'>' => TokenKind::Gt,
        b'+' => TokenKind::Plus,
        b'-' => TokenKind::Minus,
        b'*' => TokenKind::Star,
        b'/' => TokenKind::Slash,
        b'%' => TokenKind::Percent,
        _ => return None,
    };
    Some((kind, 1))
}

/// The source text of a token, with number literals stripped of `_`
/// separators and a trailing `L`/`l` suffix (the parser re-derives the
/// literal's value and "is it `Long`-suffixed" flag from this).
pub fn lexeme<'a>(source: &'a [u8], token: &Token) -> &'a str {
    let len = token_len(token.kind, source, token.source_offset) as usize;
    let start = token.source_offset as usize;
    std::str::from_utf8(&source[start..start + len]).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src.as_bytes()).tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_hello_world() {
        let k = kinds(r#"fun main() { println("hi") }"#);
        assert_eq!(
            k,
            vec![
                TokenKind::Dummy,
                TokenKind::Fun,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::String,
                TokenKind::RParen,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn number_with_underscore_and_long_suffix() {
        let result = lex(b"1_000_000L");
        assert!(!result.diagnostics.has_errors());
        let tok = result.tokens[1];
        assert_eq!(tok.kind, TokenKind::Number);
        assert_eq!(lexeme(b"1_000_000L", &tok), "1_000_000L");
    }

    #[test]
    fn two_char_operators_are_not_split() {
        assert_eq!(
            kinds("a <= b && c != d"),
            vec![
                TokenKind::Dummy,
                TokenKind::Ident,
                TokenKind::Le,
                TokenKind::Ident,
                TokenKind::AmpAmp,
                TokenKind::Ident,
                TokenKind::BangEq,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn line_table_has_sentinel() {
        let result = lex(b"a\nb\nc");
        let (line, col) = result.line_table.line_col(5);
        assert_eq!((line, col), (2, 1));
    }

    #[test]
    fn unterminated_string_is_diagnosed_not_panicked() {
        let result = lex(b"\"oops");
        assert!(result.diagnostics.has_errors());
        assert_eq!(result.tokens[1].kind, TokenKind::String);
    }
}
