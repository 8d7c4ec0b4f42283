//! Bounded measurement report builder.
//!
//! A report is a flat JSON object, one numeric field per measured
//! quantity, written in the caller's order into a fixed-capacity arena:
//!
//! ```text
//! {"air_temperature_celsius":21.5,"air_humidity_percentage":48.2,"soil_resistivity_raw":612}
//! ```
//!
//! Names and values are encoded by `serde_json`.  Every [`ReportDoc::set`]
//! is all-or-nothing: the encoded fragment is first run through a counting
//! sink, and only if it plus the closing brace fits is it written into the
//! buffer.  The first failure is latched; later writes keep counting how
//! many bytes the full report would have needed.  A latched document can
//! never become a [`Report`], so a truncated payload cannot reach the
//! transport.

use std::io;

use log::warn;
use serde::{Serialize, Serializer};

use crate::error::{ReportError, SensorError};

/// A single sensor reading, ready to serialize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    /// Physical quantity (°C, %).  Non-finite values serialize as `null`.
    Float(f32),
    /// Raw count (ADC reading).
    Unsigned(u32),
    /// The read failed; serialized as `null`.
    Missing,
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Float(v) if v.is_finite() => serializer.serialize_f32(*v),
            Self::Unsigned(v) => serializer.serialize_u32(*v),
            Self::Float(_) | Self::Missing => serializer.serialize_none(),
        }
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        Self::Unsigned(v)
    }
}

impl From<u16> for FieldValue {
    fn from(v: u16) -> Self {
        Self::Unsigned(u32::from(v))
    }
}

impl<T: Into<FieldValue>> From<Result<T, SensorError>> for FieldValue {
    fn from(reading: Result<T, SensorError>) -> Self {
        reading.map_or(Self::Missing, Into::into)
    }
}

/// Sink that only counts bytes.
#[derive(Default)]
struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sink over the document buffer; refuses bytes past capacity.
struct Arena<'a, const N: usize>(&'a mut heapless::Vec<u8, N>);

impl<const N: usize> io::Write for Arena<'_, N> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .extend_from_slice(buf)
            .map_err(|()| io::Error::from(io::ErrorKind::WriteZero))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// One `,"name":value` member as it appears on the wire.
struct Fragment<'a> {
    comma: bool,
    name: &'a str,
    value: FieldValue,
}

impl Fragment<'_> {
    fn encode<W: io::Write>(&self, mut out: W) -> io::Result<()> {
        if self.comma {
            out.write_all(b",")?;
        }
        serde_json::to_writer(&mut out, self.name)?;
        out.write_all(b":")?;
        serde_json::to_writer(&mut out, &self.value)?;
        Ok(())
    }

    fn encoded_len(&self) -> io::Result<usize> {
        let mut counter = ByteCounter::default();
        self.encode(&mut counter)?;
        Ok(counter.0)
    }

    /// Offset of the quoted key within the encoded fragment.
    fn key_offset(&self) -> usize {
        usize::from(self.comma)
    }

    fn key_len(&self) -> io::Result<usize> {
        let mut counter = ByteCounter::default();
        serde_json::to_writer(&mut counter, self.name)?;
        Ok(counter.0)
    }
}

/// Whether the quoted `key` already opens a member of `written`.
///
/// Values are numbers or `null`, so every unescaped quote in the buffer
/// belongs to a key.
fn has_key(mut written: &[u8], key: &[u8]) -> bool {
    while let Some(open) = written.iter().position(|&b| b == b'"') {
        let mut at = open + 1;
        while let Some(&b) = written.get(at) {
            match b {
                b'\\' => at += 2,
                b'"' => break,
                _ => at += 1,
            }
        }
        let end = (at + 1).min(written.len());
        if &written[open..end] == key {
            return true;
        }
        written = &written[end..];
    }
    false
}

/// Document handle passed to the report writer closure.
pub struct ReportDoc<const N: usize> {
    buf: heapless::Vec<u8, N>,
    /// Fields the writer attempted (written or not).
    attempted: usize,
    /// Bytes the complete report needs, including both braces.
    needed: usize,
    error: Option<ReportError>,
}

impl<const N: usize> Default for ReportDoc<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ReportDoc<N> {
    pub fn new() -> Self {
        let mut buf = heapless::Vec::new();
        // "{}" must always fit; a zero or one byte buffer fails on finish().
        let fits = N >= 2 && buf.push(b'{').is_ok();
        Self {
            buf,
            attempted: 0,
            needed: 2,
            error: if fits {
                None
            } else {
                Some(ReportError::Overflow {
                    needed: 2,
                    capacity: N,
                })
            },
        }
    }

    /// Write one named field.
    ///
    /// Field names must be unique within the report; any other string is
    /// accepted and escaped.  Returns the document's latched error once it
    /// has failed, so callers may stop early with `?`.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<(), ReportError> {
        let fragment = Fragment {
            comma: self.attempted > 0,
            name,
            value: value.into(),
        };
        self.attempted += 1;

        let (Ok(len), Ok(key_len)) = (fragment.encoded_len(), fragment.key_len()) else {
            return self.fail(ReportError::Encode);
        };
        self.needed += len;

        if let Some(err) = &mut self.error {
            if let ReportError::Overflow { needed, .. } = err {
                *needed = self.needed;
            }
            return Err(*err);
        }
        if self.needed > N {
            return self.fail(ReportError::Overflow {
                needed: self.needed,
                capacity: N,
            });
        }

        let mark = self.buf.len();
        if fragment.encode(Arena(&mut self.buf)).is_err() {
            // Unreachable given the size check, but never leave half a field.
            self.buf.truncate(mark);
            return self.fail(ReportError::Overflow {
                needed: self.needed,
                capacity: N,
            });
        }

        let key_start = mark + fragment.key_offset();
        let key = &self.buf[key_start..key_start + key_len];
        if has_key(&self.buf[..mark], key) {
            warn!("report: duplicate field {:?}", name);
            self.buf.truncate(mark);
            return self.fail(ReportError::DuplicateField);
        }
        Ok(())
    }

    fn fail(&mut self, err: ReportError) -> Result<(), ReportError> {
        Err(*self.error.get_or_insert(err))
    }

    /// Number of fields written so far.
    pub fn len(&self) -> usize {
        self.attempted
    }

    pub fn is_empty(&self) -> bool {
        self.attempted == 0
    }

    /// Whether the document has already failed.
    pub fn has_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Close the object and hand back the finished report.
    pub fn finish(mut self) -> Result<Report<N>, ReportError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        if self.buf.push(b'}').is_err() {
            return Err(ReportError::Overflow {
                needed: self.needed,
                capacity: N,
            });
        }
        let body = heapless::String::from_utf8(self.buf).map_err(|_| ReportError::Encode)?;
        Ok(Report {
            body,
            fields: self.attempted,
        })
    }
}

/// A complete, size-bounded measurement report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report<const N: usize> {
    body: heapless::String<N>,
    fields: usize,
}

impl<const N: usize> Report<N> {
    /// Run `write` against a fresh document and finish it.
    ///
    /// ```
    /// use fieldnode::report::Report;
    ///
    /// let report = Report::<64>::build(|doc| doc.set("soil_resistivity_raw", 612_u32)).unwrap();
    /// assert_eq!(report.as_str(), r#"{"soil_resistivity_raw":612}"#);
    /// ```
    pub fn build<F>(write: F) -> Result<Self, ReportError>
    where
        F: FnOnce(&mut ReportDoc<N>) -> Result<(), ReportError>,
    {
        let mut doc = ReportDoc::new();
        let written = write(&mut doc);
        // A latched document reports its own, up to date, error.
        let report = doc.finish()?;
        written.map(|()| report)
    }

    pub fn as_str(&self) -> &str {
        &self.body
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.body.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields == 0
    }

    /// Number of fields in the report.
    pub fn field_count(&self) -> usize {
        self.fields
    }

    /// Fixed buffer capacity in bytes.
    pub const fn capacity() -> usize {
        N
    }
}
