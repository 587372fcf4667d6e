//! Low-level sinks and sources for the binary and text model layouts.
//!
//! Both layouts write the same sections in the same order. The binary layout
//! is a run of little-endian `i32`/`f64` values with no framing; the text
//! layout puts a `# <comment>` line before each section and writes every
//! array as one tab-separated line. Codecs talk to a [`Sink`] or [`Source`]
//! and never look at the underlying stream.

use std::fmt::Write as _;
use std::io::{BufRead, Read, Write};

use crate::ModelError;

/// Serialized representation, chosen explicitly by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum Format {
    /// Little-endian fixed-width binary.
    Binary,
    /// Commented, tab-separated text.
    Text,
}

/// Upper bound on speculative pre-allocation when decoding untrusted sizes.
const MAX_PREALLOC: usize = 1 << 16;

/// Write side of a layout.
pub(crate) trait Sink {
    /// Start a section. Text writes `# {comment}`; binary writes nothing.
    fn header(&mut self, comment: &str) -> Result<(), ModelError>;

    /// Write one `i32` array.
    fn ints(&mut self, values: &[i32]) -> Result<(), ModelError>;

    /// Write one `f64` array.
    fn floats(&mut self, values: &[f64]) -> Result<(), ModelError>;

    /// Write the feature-name section body.
    fn names(&mut self, names: &[String]) -> Result<(), ModelError>;

    /// Flush the underlying stream.
    fn finish(&mut self) -> Result<(), ModelError>;
}

/// Read side of a layout.
pub(crate) trait Source {
    /// Consume the header of the next section.
    fn header(&mut self, comment: &'static str) -> Result<(), ModelError>;

    /// Whether an optional section comes next.
    ///
    /// Binary carries no marker, so it trusts `declared`; text looks at the
    /// next header line and ignores `declared`.
    fn has_section(&mut self, comment: &'static str, declared: bool) -> Result<bool, ModelError>;

    /// Read an `i32` array of length `n`.
    fn ints(&mut self, n: usize, field: &'static str) -> Result<Vec<i32>, ModelError>;

    /// Read an `f64` array of length `n`.
    fn floats(&mut self, n: usize, field: &'static str) -> Result<Vec<f64>, ModelError>;

    /// Read the feature-name section body for `n` names.
    fn names(&mut self, n: usize) -> Result<Vec<String>, ModelError>;
}

/// Convert an in-memory size to its `i32` layout field.
pub(crate) fn to_i32(field: &'static str, value: usize) -> Result<i32, ModelError> {
    i32::try_from(value).map_err(|_| ModelError::DimensionOverflow { field, value })
}

/// Convert a decoded `i32` size field back to `usize`.
pub(crate) fn to_usize(field: &'static str, value: i32) -> Result<usize, ModelError> {
    usize::try_from(value).map_err(|_| ModelError::NegativeDimension { field, value })
}

// ---------------------------------------------------------------------------
// Binary
// ---------------------------------------------------------------------------

/// Little-endian binary sink; buffers one array at a time.
pub(crate) struct BinarySink<'w, W: Write> {
    out: &'w mut W,
    buf: Vec<u8>,
    written: usize,
}

impl<'w, W: Write> BinarySink<'w, W> {
    pub(crate) fn new(out: &'w mut W) -> Self {
        Self {
            out,
            buf: Vec::new(),
            written: 0,
        }
    }

    /// Bytes written so far.
    pub(crate) fn written(&self) -> usize {
        self.written
    }

    fn flush_buf(&mut self) -> Result<(), ModelError> {
        self.out.write_all(&self.buf)?;
        self.written += self.buf.len();
        self.buf.clear();
        Ok(())
    }
}

impl<W: Write> Sink for BinarySink<'_, W> {
    fn header(&mut self, _comment: &str) -> Result<(), ModelError> {
        Ok(())
    }

    fn ints(&mut self, values: &[i32]) -> Result<(), ModelError> {
        self.buf.reserve(values.len() * 4);
        for v in values {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
        self.flush_buf()
    }

    fn floats(&mut self, values: &[f64]) -> Result<(), ModelError> {
        self.buf.reserve(values.len() * 8);
        for v in values {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
        self.flush_buf()
    }

    fn names(&mut self, names: &[String]) -> Result<(), ModelError> {
        let lengths = names
            .iter()
            .map(|n| to_i32("feature name length", n.len()))
            .collect::<Result<Vec<_>, _>>()?;
        self.ints(&lengths)?;
        for name in names {
            self.buf.extend_from_slice(name.as_bytes());
        }
        self.flush_buf()
    }

    fn finish(&mut self) -> Result<(), ModelError> {
        self.out.flush()?;
        Ok(())
    }
}

/// Little-endian binary source.
pub(crate) struct BinarySource<'r, R: BufRead> {
    input: &'r mut R,
    read: usize,
}

impl<'r, R: BufRead> BinarySource<'r, R> {
    pub(crate) fn new(input: &'r mut R) -> Self {
        Self { input, read: 0 }
    }

    /// Bytes consumed so far.
    pub(crate) fn consumed(&self) -> usize {
        self.read
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], ModelError> {
        let mut bytes = [0u8; N];
        self.input.read_exact(&mut bytes)?;
        self.read += N;
        Ok(bytes)
    }
}

impl<R: BufRead> Source for BinarySource<'_, R> {
    fn header(&mut self, _comment: &'static str) -> Result<(), ModelError> {
        Ok(())
    }

    fn has_section(&mut self, _comment: &'static str, declared: bool) -> Result<bool, ModelError> {
        Ok(declared)
    }

    fn ints(&mut self, n: usize, _field: &'static str) -> Result<Vec<i32>, ModelError> {
        let mut out = Vec::with_capacity(n.min(MAX_PREALLOC));
        for _ in 0..n {
            out.push(i32::from_le_bytes(self.take::<4>()?));
        }
        Ok(out)
    }

    fn floats(&mut self, n: usize, _field: &'static str) -> Result<Vec<f64>, ModelError> {
        let mut out = Vec::with_capacity(n.min(MAX_PREALLOC));
        for _ in 0..n {
            out.push(f64::from_le_bytes(self.take::<8>()?));
        }
        Ok(out)
    }

    fn names(&mut self, n: usize) -> Result<Vec<String>, ModelError> {
        let lengths = self.ints(n, "feature name lengths")?;
        let mut names = Vec::with_capacity(n.min(MAX_PREALLOC));
        for (index, len) in lengths.into_iter().enumerate() {
            let len = to_usize("feature name length", len)?;
            let mut bytes = Vec::with_capacity(len.min(MAX_PREALLOC));
            let got = (&mut *self.input).take(len as u64).read_to_end(&mut bytes)?;
            if got != len {
                return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
            }
            self.read += len;
            let name = String::from_utf8(bytes).map_err(|_| ModelError::InvalidUtf8Name { index })?;
            names.push(name);
        }
        Ok(names)
    }
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

/// Commented, tab-separated text sink.
pub(crate) struct TextSink<'w, W: Write> {
    out: &'w mut W,
    line: String,
}

impl<'w, W: Write> TextSink<'w, W> {
    pub(crate) fn new(out: &'w mut W) -> Self {
        Self {
            out,
            line: String::new(),
        }
    }

    fn emit<T>(&mut self, values: &[T], fmt: impl Fn(&mut String, &T)) -> Result<(), ModelError> {
        // An empty array has no line at all.
        if values.is_empty() {
            return Ok(());
        }
        self.line.clear();
        for (i, v) in values.iter().enumerate() {
            if i > 0 {
                self.line.push('\t');
            }
            fmt(&mut self.line, v);
        }
        self.line.push('\n');
        self.out.write_all(self.line.as_bytes())?;
        Ok(())
    }
}

impl<W: Write> Sink for TextSink<'_, W> {
    fn header(&mut self, comment: &str) -> Result<(), ModelError> {
        writeln!(self.out, "# {comment}")?;
        Ok(())
    }

    fn ints(&mut self, values: &[i32]) -> Result<(), ModelError> {
        self.emit(values, |s, v| {
            let _ = write!(s, "{v}");
        })
    }

    fn floats(&mut self, values: &[f64]) -> Result<(), ModelError> {
        self.emit(values, |s, v| write_float(s, *v))
    }

    fn names(&mut self, names: &[String]) -> Result<(), ModelError> {
        if let Some(index) = names
            .iter()
            .position(|n| n.contains(['\t', '\n', '\r']))
        {
            return Err(ModelError::UnrepresentableFeatureName {
                index,
                name: names[index].clone(),
            });
        }
        self.emit(names, |s, v| s.push_str(v))
    }

    fn finish(&mut self) -> Result<(), ModelError> {
        self.out.flush()?;
        Ok(())
    }
}

/// Append `v` as the shortest decimal that parses back to the same bits.
///
/// Positional for decimal exponents in `-4..16`, otherwise scientific with a
/// signed exponent of at least two digits (`1e-07`, `1.5e+16`). Integral
/// values keep a trailing `.0`.
fn write_float(s: &mut String, v: f64) {
    if !v.is_finite() {
        let _ = write!(s, "{v:?}");
        return;
    }
    let sci = format!("{v:e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    if !(-4..16).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        let _ = write!(s, "{mantissa}e{sign}{:02}", exp.unsigned_abs());
        return;
    }

    let (neg, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    if neg {
        s.push('-');
    }
    if exp < 0 {
        s.push_str("0.");
        for _ in 0..(-exp - 1) {
            s.push('0');
        }
        s.push_str(&digits);
        return;
    }
    let int_len = exp as usize + 1;
    if digits.len() <= int_len {
        s.push_str(&digits);
        for _ in digits.len()..int_len {
            s.push('0');
        }
        s.push_str(".0");
    } else {
        s.push_str(&digits[..int_len]);
        s.push('.');
        s.push_str(&digits[int_len..]);
    }
}

/// Line-oriented text source with one line of lookahead.
pub(crate) struct TextSource<'r, R: BufRead> {
    input: &'r mut R,
    peeked: Option<String>,
    line_no: usize,
}

impl<'r, R: BufRead> TextSource<'r, R> {
    pub(crate) fn new(input: &'r mut R) -> Self {
        Self {
            input,
            peeked: None,
            line_no: 0,
        }
    }

    fn fill(&mut self) -> Result<(), ModelError> {
        if self.peeked.is_none() {
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
            }
            if line.ends_with('\n') {
                line.pop();
                if line.ends_with('\r') {
                    line.pop();
                }
            }
            self.peeked = Some(line);
        }
        Ok(())
    }

    fn peek(&mut self) -> Result<&str, ModelError> {
        self.fill()?;
        Ok(self.peeked.as_deref().unwrap_or_default())
    }

    fn next_line(&mut self) -> Result<String, ModelError> {
        self.fill()?;
        self.line_no += 1;
        Ok(self.peeked.take().unwrap_or_default())
    }

    fn tokens(&mut self, n: usize, field: &'static str) -> Result<(usize, String), ModelError> {
        if n == 0 {
            return Ok((self.line_no, String::new()));
        }
        let line = self.next_line()?;
        let got = line.split('\t').count();
        if got != n {
            return Err(ModelError::TokenCountMismatch {
                line: self.line_no,
                field,
                expected: n,
                got,
            });
        }
        Ok((self.line_no, line))
    }

    fn parse_all<T: std::str::FromStr>(
        &mut self,
        n: usize,
        field: &'static str,
    ) -> Result<Vec<T>, ModelError> {
        let (line_no, line) = self.tokens(n, field)?;
        if n == 0 {
            return Ok(Vec::new());
        }
        line.split('\t')
            .map(|token| {
                token.parse().map_err(|_| ModelError::InvalidToken {
                    line: line_no,
                    field,
                    token: token.to_string(),
                })
            })
            .collect()
    }
}

impl<R: BufRead> Source for TextSource<'_, R> {
    fn header(&mut self, comment: &'static str) -> Result<(), ModelError> {
        let line = self.next_line()?;
        match line.strip_prefix("# ") {
            Some(rest) if rest == comment => Ok(()),
            _ => Err(ModelError::MissingSection {
                line: self.line_no,
                expected: comment,
            }),
        }
    }

    fn has_section(&mut self, comment: &'static str, _declared: bool) -> Result<bool, ModelError> {
        let next = self.peek()?;
        Ok(next.strip_prefix("# ") == Some(comment))
    }

    fn ints(&mut self, n: usize, field: &'static str) -> Result<Vec<i32>, ModelError> {
        self.parse_all(n, field)
    }

    fn floats(&mut self, n: usize, field: &'static str) -> Result<Vec<f64>, ModelError> {
        self.parse_all(n, field)
    }

    fn names(&mut self, n: usize) -> Result<Vec<String>, ModelError> {
        let (_, line) = self.tokens(n, "feature names")?;
        if n == 0 {
            return Ok(Vec::new());
        }
        Ok(line.split('\t').map(str::to_string).collect())
    }
}
