/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Compact delimited-text codec used for durable log records.
//!
//! A compact body is a comma-separated list of fields in a fixed,
//! per-type order. Commas, backslashes and line breaks inside a field are
//! backslash-escaped so that every record fits on one line and splits
//! unambiguously.

use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

/// Field separator inside a compact body.
pub const FIELD_SEPARATOR: char = ',';

const ESCAPE: char = '\\';

/// Errors raised while encoding or decoding protocol records.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The tag is not one of the known command characters.
    #[error("unknown command tag {0:?}")]
    UnknownTag(String),

    /// A log record does not start with `<tag>:`.
    #[error("record has no tag delimiter: {0:?}")]
    MissingDelimiter(String),

    /// A channel name is not of the form `<namespace>:<tag>`.
    #[error("malformed channel key {0:?}")]
    MalformedChannel(String),

    /// The record ended before a required field.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A field was present but could not be interpreted.
    #[error("invalid value {value:?} for field `{field}`: {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// The raw field text.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The record carried more fields than its type defines.
    #[error("{count} unexpected trailing field(s)")]
    TrailingFields {
        /// Number of surplus fields.
        count: usize,
    },

    /// The record ended in the middle of an escape sequence.
    #[error("record ends with a dangling escape")]
    DanglingEscape,

    /// A structured (JSON) payload failed to parse or serialize.
    #[error("structured payload error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Types with a compact delimited-text representation.
pub trait CompactRecord: Sized {
    /// Writes this value's fields in their canonical order.
    fn write_fields(&self, writer: &mut CompactWriter);

    /// Reads a value from the fields of a compact body.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when a field is missing or invalid.
    fn read_fields(reader: &mut CompactReader) -> Result<Self, CodecError>;

    /// Encodes this value as a compact body.
    #[must_use]
    fn to_compact(&self) -> String {
        let mut writer = CompactWriter::new();
        self.write_fields(&mut writer);
        writer.finish()
    }

    /// Decodes a compact body, rejecting surplus fields.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when the body does not describe exactly one
    /// value of this type.
    fn from_compact(body: &str) -> Result<Self, CodecError> {
        let mut reader = CompactReader::new(body)?;
        let value = Self::read_fields(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }
}

/// Accumulates escaped fields into a compact body.
#[derive(Debug, Default)]
pub struct CompactWriter {
    buf: String,
    fields: usize,
}

impl CompactWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a string field.
    pub fn push_str(&mut self, value: &str) -> &mut Self {
        if self.fields > 0 {
            self.buf.push(FIELD_SEPARATOR);
        }
        for c in value.chars() {
            match c {
                ESCAPE | FIELD_SEPARATOR => {
                    self.buf.push(ESCAPE);
                    self.buf.push(c);
                }
                '\n' => self.buf.push_str("\\n"),
                '\r' => self.buf.push_str("\\r"),
                _ => self.buf.push(c),
            }
        }
        self.fields += 1;
        self
    }

    /// Appends any displayable field.
    pub fn push<T: Display>(&mut self, value: T) -> &mut Self {
        self.push_str(&value.to_string())
    }

    /// Returns the finished body.
    #[must_use]
    pub fn finish(self) -> String {
        self.buf
    }
}

/// Sequential reader over the unescaped fields of a compact body.
#[derive(Debug)]
pub struct CompactReader {
    fields: std::vec::IntoIter<String>,
}

impl CompactReader {
    /// Splits and unescapes a compact body. An empty body has no fields.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::DanglingEscape`] if the body ends mid-escape.
    pub fn new(body: &str) -> Result<Self, CodecError> {
        let mut fields = Vec::new();
        if !body.is_empty() {
            let mut current = String::new();
            let mut chars = body.chars();
            while let Some(c) = chars.next() {
                match c {
                    ESCAPE => match chars.next() {
                        Some('n') => current.push('\n'),
                        Some('r') => current.push('\r'),
                        Some(other) => current.push(other),
                        None => return Err(CodecError::DanglingEscape),
                    },
                    FIELD_SEPARATOR => fields.push(std::mem::take(&mut current)),
                    _ => current.push(c),
                }
            }
            fields.push(current);
        }
        Ok(Self {
            fields: fields.into_iter(),
        })
    }

    /// Takes the next field verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MissingField`] when the body is exhausted.
    pub fn string(&mut self, field: &'static str) -> Result<String, CodecError> {
        self.fields.next().ok_or(CodecError::MissingField(field))
    }

    /// Takes the next field and parses it.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MissingField`] or [`CodecError::InvalidField`].
    pub fn parse<T>(&mut self, field: &'static str) -> Result<T, CodecError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.string(field)?;
        raw.parse().map_err(|e: T::Err| CodecError::InvalidField {
            field,
            reason: e.to_string(),
            value: raw,
        })
    }

    /// Succeeds only if every field has been consumed.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TrailingFields`] otherwise.
    pub fn finish(self) -> Result<(), CodecError> {
        match self.fields.len() {
            0 => Ok(()),
            count => Err(CodecError::TrailingFields { count }),
        }
    }
}
