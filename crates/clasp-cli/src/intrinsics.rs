//! Intrinsic operations and the host I/O boundary.
//!
//! Intrinsics are dispatched by name at call time; their arguments arrive
//! as heap locations and their results are fresh values the evaluator
//! stores into new heap slots. Everything that touches the outside world
//! goes through the [`Io`] trait so tests can script the streams.

use crate::eval::{EvalError, Location, State, Value};
use clasp_ast::span::SourceLocation;
use clasp_ast::strings;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::io::{self, Read, Write};

/// Host input/output used by `.getchar`, `.getint`, `.putstr`, `.flush`.
/// Both directions carry raw bytes; no encoding is applied anywhere.
///
/// `.getchar` and `.getint` read the same stream; `.getint` pushes the
/// byte that terminated the number back so a later `.getchar` sees it.
pub trait Io {
    /// One raw byte, or `None` at end of input.
    fn getchar(&mut self) -> io::Result<Option<u8>>;
    /// Skip leading ASCII whitespace, then read an optional sign and the
    /// longest run of digits. `None` when no digits follow or the value
    /// does not fit an `i64`.
    fn getint(&mut self) -> io::Result<Option<i64>>;
    fn putstr(&mut self, s: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

/// Shared `.getint` scanner. Returns the parsed value (if any) and the
/// byte that terminated scanning, which the caller must push back.
fn scan_int(
    mut next: impl FnMut() -> io::Result<Option<u8>>,
) -> io::Result<(Option<i64>, Option<u8>)> {
    let mut b = loop {
        match next()? {
            Some(c) if c.is_ascii_whitespace() => continue,
            Some(c) => break c,
            None => return Ok((None, None)),
        }
    };
    let mut negative = false;
    if b == b'+' || b == b'-' {
        negative = b == b'-';
        match next()? {
            Some(c) => b = c,
            None => return Ok((None, None)),
        }
    }
    let mut digits = 0usize;
    let mut acc: i128 = 0;
    let pushback;
    loop {
        if b.is_ascii_digit() {
            digits += 1;
            // clamp instead of growing without bound; the clamp sits past
            // i64::MIN's magnitude so the range check below still fails
            acc = (acc * 10 + i128::from(b - b'0')).min(i128::from(i64::MAX) + 2);
        } else {
            pushback = Some(b);
            break;
        }
        match next()? {
            Some(c) => b = c,
            None => {
                pushback = None;
                break;
            }
        }
    }
    if digits == 0 {
        return Ok((None, pushback));
    }
    let signed = if negative { -acc } else { acc };
    let value = i64::try_from(signed).ok();
    Ok((value, pushback))
}

/// Process stdin/stdout, with a one-byte pushback buffer for `.getint`.
#[derive(Debug, Default)]
pub struct StdIo {
    pending: Option<u8>,
}

impl StdIo {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        if let Some(b) = self.pending.take() {
            return Ok(Some(b));
        }
        let mut buf = [0u8; 1];
        match io::stdin().read(&mut buf)? {
            0 => Ok(None),
            _ => Ok(Some(buf[0])),
        }
    }
}

impl Io for StdIo {
    fn getchar(&mut self) -> io::Result<Option<u8>> {
        self.read_byte()
    }

    fn getint(&mut self) -> io::Result<Option<i64>> {
        let (value, pushback) = scan_int(|| self.read_byte())?;
        self.pending = pushback;
        Ok(value)
    }

    fn putstr(&mut self, s: &[u8]) -> io::Result<()> {
        io::stdout().write_all(s)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

/// Scripted streams for tests and embedding: reads come from a fixed
/// buffer, writes accumulate in memory.
#[derive(Debug, Default)]
pub struct MemoryIo {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl MemoryIo {
    pub fn new(input: impl AsRef<[u8]>) -> Self {
        Self {
            input: input.as_ref().iter().copied().collect(),
            output: Vec::new(),
        }
    }

    /// Accumulated output decoded for display; bytes that are not valid
    /// UTF-8 show as U+FFFD. Use [`MemoryIo::output_bytes`] for the
    /// exact bytes.
    pub fn output(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.output)
    }

    pub fn output_bytes(&self) -> &[u8] {
        &self.output
    }
}

impl Io for MemoryIo {
    fn getchar(&mut self) -> io::Result<Option<u8>> {
        Ok(self.input.pop_front())
    }

    fn getint(&mut self) -> io::Result<Option<i64>> {
        let input = &mut self.input;
        let (value, pushback) = scan_int(|| Ok(input.pop_front()))?;
        if let Some(b) = pushback {
            self.input.push_front(b);
        }
        Ok(value)
    }

    fn putstr(&mut self, s: &[u8]) -> io::Result<()> {
        self.output.extend_from_slice(s);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl State {
    fn type_error(&self, name: &str, sl: SourceLocation) -> EvalError {
        self.runtime_error(format!("type error in {name} call"), sl)
    }

    fn no_args(&self, name: &str, args: &[Location], sl: SourceLocation) -> Result<(), EvalError> {
        if args.is_empty() {
            Ok(())
        } else {
            Err(self.type_error(name, sl))
        }
    }

    fn one_value(&self, name: &str, args: &[Location], sl: SourceLocation) -> Result<&Value, EvalError> {
        match args {
            [a] => Ok(&self.heap[*a]),
            _ => Err(self.type_error(name, sl)),
        }
    }

    fn one_int(&self, name: &str, args: &[Location], sl: SourceLocation) -> Result<i64, EvalError> {
        match self.one_value(name, args, sl)? {
            Value::Int(v) => Ok(*v),
            _ => Err(self.type_error(name, sl)),
        }
    }

    fn one_str(
        &self,
        name: &str,
        args: &[Location],
        sl: SourceLocation,
    ) -> Result<&[u8], EvalError> {
        match self.one_value(name, args, sl)? {
            Value::Str(s) => Ok(s),
            _ => Err(self.type_error(name, sl)),
        }
    }

    fn two_ints(
        &self,
        name: &str,
        args: &[Location],
        sl: SourceLocation,
    ) -> Result<(i64, i64), EvalError> {
        match args {
            [a, b] => match (&self.heap[*a], &self.heap[*b]) {
                (Value::Int(x), Value::Int(y)) => Ok((*x, *y)),
                _ => Err(self.type_error(name, sl)),
            },
            _ => Err(self.type_error(name, sl)),
        }
    }

    fn two_strs(
        &self,
        name: &str,
        args: &[Location],
        sl: SourceLocation,
    ) -> Result<(&[u8], &[u8]), EvalError> {
        match args {
            [a, b] => match (&self.heap[*a], &self.heap[*b]) {
                (Value::Str(x), Value::Str(y)) => Ok((x, y)),
                _ => Err(self.type_error(name, sl)),
            },
            _ => Err(self.type_error(name, sl)),
        }
    }

    pub(crate) fn call_intrinsic(
        &self,
        sl: SourceLocation,
        name: &str,
        args: &[Location],
        io: &mut dyn Io,
    ) -> Result<Value, EvalError> {
        let io_err = |e: io::Error| self.runtime_error(format!("i/o error: {e}"), sl);
        match name {
            ".void" => {
                self.no_args(name, args, sl)?;
                Ok(Value::Void)
            }

            // integer arithmetic wraps; only zero divisors fail
            ".+" => {
                let (a, b) = self.two_ints(name, args, sl)?;
                Ok(Value::Int(a.wrapping_add(b)))
            }
            ".-" => {
                let (a, b) = self.two_ints(name, args, sl)?;
                Ok(Value::Int(a.wrapping_sub(b)))
            }
            ".*" => {
                let (a, b) = self.two_ints(name, args, sl)?;
                Ok(Value::Int(a.wrapping_mul(b)))
            }
            "./" => {
                let (a, b) = self.two_ints(name, args, sl)?;
                if b == 0 {
                    return Err(self.runtime_error("division by zero", sl));
                }
                Ok(Value::Int(a.wrapping_div(b)))
            }
            ".%" => {
                let (a, b) = self.two_ints(name, args, sl)?;
                if b == 0 {
                    return Err(self.runtime_error("division by zero", sl));
                }
                Ok(Value::Int(a.wrapping_rem(b)))
            }

            ".<" => {
                let (a, b) = self.two_ints(name, args, sl)?;
                Ok(Value::Int(i64::from(a < b)))
            }
            ".<=" => {
                let (a, b) = self.two_ints(name, args, sl)?;
                Ok(Value::Int(i64::from(a <= b)))
            }
            ".>" => {
                let (a, b) = self.two_ints(name, args, sl)?;
                Ok(Value::Int(i64::from(a > b)))
            }
            ".>=" => {
                let (a, b) = self.two_ints(name, args, sl)?;
                Ok(Value::Int(i64::from(a >= b)))
            }
            ".=" => {
                let (a, b) = self.two_ints(name, args, sl)?;
                Ok(Value::Int(i64::from(a == b)))
            }
            "./=" => {
                let (a, b) = self.two_ints(name, args, sl)?;
                Ok(Value::Int(i64::from(a != b)))
            }

            // both operands are evaluated before we get here; short-circuit
            // is spelled with `if` in the source language
            ".and" => {
                let (a, b) = self.two_ints(name, args, sl)?;
                Ok(Value::Int(i64::from(a != 0 && b != 0)))
            }
            ".or" => {
                let (a, b) = self.two_ints(name, args, sl)?;
                Ok(Value::Int(i64::from(a != 0 || b != 0)))
            }
            ".not" => {
                let a = self.one_int(name, args, sl)?;
                Ok(Value::Int(i64::from(a == 0)))
            }

            ".s+" => {
                let (a, b) = self.two_strs(name, args, sl)?;
                let mut r = Vec::with_capacity(a.len() + b.len());
                r.extend_from_slice(a);
                r.extend_from_slice(b);
                Ok(Value::Str(r))
            }
            ".s<" => {
                let (a, b) = self.two_strs(name, args, sl)?;
                Ok(Value::Int(i64::from(a < b)))
            }
            ".s<=" => {
                let (a, b) = self.two_strs(name, args, sl)?;
                Ok(Value::Int(i64::from(a <= b)))
            }
            ".s>" => {
                let (a, b) = self.two_strs(name, args, sl)?;
                Ok(Value::Int(i64::from(a > b)))
            }
            ".s>=" => {
                let (a, b) = self.two_strs(name, args, sl)?;
                Ok(Value::Int(i64::from(a >= b)))
            }
            ".s=" => {
                let (a, b) = self.two_strs(name, args, sl)?;
                Ok(Value::Int(i64::from(a == b)))
            }
            ".s/=" => {
                let (a, b) = self.two_strs(name, args, sl)?;
                Ok(Value::Int(i64::from(a != b)))
            }
            ".s||" => {
                let s = self.one_str(name, args, sl)?;
                Ok(Value::Int(s.len() as i64))
            }

            // half-open byte slice, 0 <= l <= r <= |s|
            ".s[]" => {
                let (s, l, r) = match args {
                    [a, b, c] => match (&self.heap[*a], &self.heap[*b], &self.heap[*c]) {
                        (Value::Str(s), Value::Int(l), Value::Int(r)) => (s, *l, *r),
                        _ => return Err(self.type_error(name, sl)),
                    },
                    _ => return Err(self.type_error(name, sl)),
                };
                let n = s.len() as i64;
                if !(0 <= l && l <= r && r <= n) {
                    return Err(self.runtime_error("invalid substring range", sl));
                }
                Ok(Value::Str(s[l as usize..r as usize].to_vec()))
            }

            ".quote" => {
                let s = self.one_str(name, args, sl)?;
                Ok(Value::Str(strings::quote(s)))
            }
            ".unquote" => {
                let s = self.one_str(name, args, sl)?;
                let unquoted = strings::unquote(s)
                    .map_err(|e| self.runtime_error(e.to_string(), sl))?;
                Ok(Value::Str(unquoted))
            }

            // exactly an optional sign plus digits; no whitespace, no
            // trailing garbage
            ".s->i" => {
                let s = self.one_str(name, args, sl)?;
                let digits = match s.split_first() {
                    Some((&(b'+' | b'-'), rest)) => rest,
                    _ => s,
                };
                let ok = !digits.is_empty() && digits.iter().all(u8::is_ascii_digit);
                let parsed = if ok {
                    std::str::from_utf8(s).ok().and_then(|t| t.parse::<i64>().ok())
                } else {
                    None
                };
                match parsed {
                    Some(v) => Ok(Value::Int(v)),
                    None => Err(self.runtime_error(
                        format!(
                            "cannot convert {} to an integer",
                            String::from_utf8_lossy(&strings::quote(s))
                        ),
                        sl,
                    )),
                }
            }
            ".i->s" => {
                let v = self.one_int(name, args, sl)?;
                Ok(Value::Str(v.to_string().into_bytes()))
            }

            ".type" => {
                let tag = match self.one_value(name, args, sl)? {
                    Value::Void => 0,
                    Value::Int(_) => 1,
                    Value::Str(_) | Value::Closure(_) => 2,
                };
                Ok(Value::Int(tag))
            }

            // run a source string in a fresh machine sharing this host's
            // streams; its errors propagate unchanged. Decoding is lossy,
            // but any byte outside the source character set is rejected
            // by the lexer anyway.
            ".eval" => {
                let source =
                    String::from_utf8_lossy(self.one_str(name, args, sl)?).into_owned();
                let mut nested = State::new(&source)?;
                nested.execute(io)?;
                match nested.result_value() {
                    Some(Value::Closure(_)) => Err(self.runtime_error(
                        "a closure cannot escape .eval",
                        sl,
                    )),
                    Some(value) => Ok(value.clone()),
                    None => Err(self.runtime_error("internal: .eval produced no result", sl)),
                }
            }

            ".getchar" => {
                self.no_args(name, args, sl)?;
                match io.getchar().map_err(io_err)? {
                    Some(b) => Ok(Value::Str(vec![b])),
                    None => Ok(Value::Void),
                }
            }
            ".getint" => {
                self.no_args(name, args, sl)?;
                match io.getint().map_err(io_err)? {
                    Some(v) => Ok(Value::Int(v)),
                    None => Ok(Value::Void),
                }
            }
            ".putstr" => {
                let s = self.one_str(name, args, sl)?;
                io.putstr(s).map_err(io_err)?;
                Ok(Value::Void)
            }
            ".flush" => {
                self.no_args(name, args, sl)?;
                io.flush().map_err(io_err)?;
                Ok(Value::Void)
            }

            _ => Err(self.runtime_error(format!("unknown intrinsic {name}"), sl)),
        }
    }
}
