use crate::token::{Tok, TokKind};
use crate::SyntaxError;
use clasp_ast::span::SourceLocation;
use clasp_ast::strings::decode_escape;

/// Maximum number of tokens allowed in a single source file.
/// This prevents denial of service from pathological inputs.
const MAX_TOKEN_COUNT: usize = 200_000;

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    /// Location of the byte at `pos`.
    sl: SourceLocation,
    /// Number of tokens emitted (for limit enforcement)
    token_count: usize,
}

/// The supported character set: printable ASCII plus tab and newline.
fn supported(b: u8) -> bool {
    b == b'\t' || b == b'\n' || (b' '..=b'~').contains(&b)
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
            sl: SourceLocation::START,
            token_count: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        self.sl.advance(b as char);
        Some(b)
    }

    fn lex_err(&self, msg: impl Into<String>, sl: SourceLocation) -> SyntaxError {
        SyntaxError::Lex {
            msg: msg.into(),
            sl,
        }
    }

    fn skip_ws_and_comments(&mut self) -> Result<(), SyntaxError> {
        loop {
            match self.peek() {
                Some(b) if !supported(b) => {
                    return Err(self.lex_err("unsupported character", self.sl));
                }
                Some(b' ' | b'\t' | b'\n') => {
                    self.bump();
                }
                Some(b'#') => {
                    while let Some(b) = self.peek() {
                        if !supported(b) {
                            return Err(self.lex_err("unsupported character", self.sl));
                        }
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    pub fn next_tok(&mut self) -> Result<Tok, SyntaxError> {
        self.token_count += 1;
        if self.token_count > MAX_TOKEN_COUNT {
            return Err(self.lex_err(
                format!("token count limit exceeded (max {MAX_TOKEN_COUNT} tokens)"),
                self.sl,
            ));
        }

        self.skip_ws_and_comments()?;
        let start = self.sl;
        let Some(b) = self.peek() else {
            return Ok(Tok {
                kind: TokKind::Eof,
                sl: start,
            });
        };
        if !supported(b) {
            return Err(self.lex_err("unsupported character", start));
        }

        // integer literal
        if b.is_ascii_digit() || b == b'-' || b == b'+' {
            let mut text = String::new();
            if b == b'-' || b == b'+' {
                text.push(self.bump().unwrap_or(b) as char);
            }
            let mut has_digit = false;
            while matches!(self.peek(), Some(d) if d.is_ascii_digit()) {
                has_digit = true;
                if let Some(d) = self.bump() {
                    text.push(d as char);
                }
            }
            if !has_digit {
                return Err(self.lex_err("incomplete integer literal", start));
            }
            let value: i64 = text
                .parse()
                .map_err(|_| self.lex_err(format!("integer literal out of range: {text}"), start))?;
            return Ok(Tok {
                kind: TokKind::Int(value),
                sl: start,
            });
        }

        // string literal: kept raw, quotes and escapes included
        if b == b'"' {
            let mut text = String::from('"');
            self.bump();
            loop {
                let esc_sl = self.sl;
                match self.bump() {
                    None => return Err(self.lex_err("incomplete string literal", start)),
                    Some(b'"') => {
                        text.push('"');
                        break;
                    }
                    Some(b'\\') => {
                        text.push('\\');
                        let Some(c) = self.bump() else {
                            return Err(self.lex_err("incomplete string literal", start));
                        };
                        if !supported(c) {
                            return Err(self.lex_err("unsupported character", esc_sl));
                        }
                        if decode_escape(c).is_none() {
                            return Err(self.lex_err("invalid escape sequence", esc_sl));
                        }
                        text.push(c as char);
                    }
                    Some(c) => {
                        if !supported(c) {
                            return Err(self.lex_err("unsupported character", esc_sl));
                        }
                        text.push(c as char);
                    }
                }
            }
            return Ok(Tok {
                kind: TokKind::Str(text),
                sl: start,
            });
        }

        // identifier / keyword
        if is_ident_start(b) {
            let mut text = String::new();
            while matches!(self.peek(), Some(c) if is_ident_continue(c)) {
                if let Some(c) = self.bump() {
                    text.push(c as char);
                }
            }
            let kind = match text.as_str() {
                "lambda" => TokKind::KwLambda,
                "letrec" => TokKind::KwLetrec,
                "if" => TokKind::KwIf,
                _ => TokKind::Ident(text),
            };
            return Ok(Tok { kind, sl: start });
        }

        // intrinsic: a dot up to whitespace or a closing paren
        if b == b'.' {
            let mut text = String::new();
            while let Some(c) = self.peek() {
                if c == b' ' || c == b'\t' || c == b'\n' || c == b')' {
                    break;
                }
                if !supported(c) {
                    return Err(self.lex_err("unsupported character", self.sl));
                }
                self.bump();
                text.push(c as char);
            }
            return Ok(Tok {
                kind: TokKind::Intrinsic(text),
                sl: start,
            });
        }

        // special symbol
        let single = match b {
            b'(' => Some(TokKind::LParen),
            b')' => Some(TokKind::RParen),
            b'{' => Some(TokKind::LBrace),
            b'}' => Some(TokKind::RBrace),
            b'@' => Some(TokKind::At),
            _ => None,
        };
        if let Some(kind) = single {
            self.bump();
            return Ok(Tok { kind, sl: start });
        }

        Err(self.lex_err("unsupported starting character", start))
    }
}
