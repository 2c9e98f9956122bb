//! Streaming reader for version 2 flow log records.
//!
//! Each non-blank line becomes a [`FlowLine`]: either a [`FlowKey`] or a skip
//! with its reason. Malformed lines never stop the stream.

use std::fmt;
use std::io::BufRead;

use crate::error::Result;
use crate::models::FlowKey;

/// The only flow log version accepted.
pub const SUPPORTED_VERSION: &str = "2";

/// Fields needed to reach `dstport` (6) and `protocol` (7).
const MIN_FIELDS: usize = 8;
const DST_PORT_FIELD: usize = 6;
const PROTOCOL_FIELD: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowLogOptions {
    /// Upper bound on space separated fields per line. Version 2 records have 14;
    /// one extra is tolerated so that a trailing space does not reject the line.
    pub max_fields: usize,
}

impl Default for FlowLogOptions {
    fn default() -> Self {
        Self { max_fields: 15 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    UnsupportedVersion(String),
    TooManyFields { found: usize, max: usize },
    TooFewFields(usize),
    InvalidEncoding,
}

impl SkipReason {
    /// Stable identifier used as a summary key.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedVersion(_) => "unsupported_version",
            Self::TooManyFields { .. } => "too_many_fields",
            Self::TooFewFields(_) => "too_few_fields",
            Self::InvalidEncoding => "invalid_encoding",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion(v) => write!(
                f,
                "flow log version '{v}' is not supported, only version {SUPPORTED_VERSION}"
            ),
            Self::TooManyFields { found, max } => {
                write!(f, "{found} fields, at most {max} expected")
            }
            Self::TooFewFields(n) => write!(f, "{n} fields, at least {MIN_FIELDS} expected"),
            Self::InvalidEncoding => write!(f, "line is not valid UTF-8"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number in the source.
    pub line: u64,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowLine {
    Record(FlowKey),
    Skipped(SkippedLine),
}

/// Classify a single line, already stripped of its terminator.
pub fn parse_line(line: &str, options: &FlowLogOptions) -> std::result::Result<FlowKey, SkipReason> {
    let fields: Vec<&str> = line.split(' ').collect();

    if fields.len() > options.max_fields {
        return Err(SkipReason::TooManyFields {
            found: fields.len(),
            max: options.max_fields,
        });
    }
    if fields[0] != SUPPORTED_VERSION {
        return Err(SkipReason::UnsupportedVersion(fields[0].to_string()));
    }
    if fields.len() < MIN_FIELDS {
        return Err(SkipReason::TooFewFields(fields.len()));
    }

    Ok(FlowKey::new(fields[DST_PORT_FIELD], fields[PROTOCOL_FIELD]))
}

/// Lazy, single pass iterator over a flow log.
///
/// Blank lines are counted and dropped. I/O failures end the run and are
/// yielded as `Err`.
pub struct FlowLogReader<R> {
    inner: R,
    options: FlowLogOptions,
    buf: Vec<u8>,
    line_no: u64,
    blank_lines: u64,
}

impl<R: BufRead> FlowLogReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_options(inner, FlowLogOptions::default())
    }

    pub fn with_options(inner: R, options: FlowLogOptions) -> Self {
        Self {
            inner,
            options,
            buf: Vec::with_capacity(256),
            line_no: 0,
            blank_lines: 0,
        }
    }

    /// Lines consumed so far, blank ones included.
    pub fn lines_read(&self) -> u64 {
        self.line_no
    }

    pub fn blank_lines(&self) -> u64 {
        self.blank_lines
    }

    fn classify(&self) -> FlowLine {
        let mut bytes = self.buf.as_slice();
        if let Some(rest) = bytes.strip_suffix(b"\n") {
            bytes = rest;
        }
        if let Some(rest) = bytes.strip_suffix(b"\r") {
            bytes = rest;
        }

        let outcome = match std::str::from_utf8(bytes) {
            Ok(text) => parse_line(text, &self.options),
            Err(_) => Err(SkipReason::InvalidEncoding),
        };

        match outcome {
            Ok(key) => FlowLine::Record(key),
            Err(reason) => {
                tracing::warn!(line = self.line_no, reason = %reason, "skipping flow log line");
                FlowLine::Skipped(SkippedLine {
                    line: self.line_no,
                    reason,
                })
            }
        }
    }
}

impl<R: BufRead> Iterator for FlowLogReader<R> {
    type Item = Result<FlowLine>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.inner.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.line_no += 1;

            if self.buf.iter().all(u8::is_ascii_whitespace) {
                self.blank_lines += 1;
                continue;
            }
            return Some(Ok(self.classify()));
        }
    }
}
