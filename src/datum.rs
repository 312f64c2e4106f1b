//! Field types, values and fixed-width tuples.
//!
//! Every tuple of a table has the same serialized width, determined by its
//! [`TupleDescriptor`]:
//!
//! ```text
//! Int64   -> 8 bytes, little-endian two's complement
//! Float64 -> 8 bytes, little-endian IEEE-754
//! Text(w) -> w bytes, UTF-8 right-padded with 0x00
//! ```
//!
//! Encoding goes through [`bytes::BufMut`] and decoding through
//! [`bytes::Buf`], so the same code serves page images and scratch buffers.

use std::fmt;
use std::sync::Arc;

use bytes::{Buf, BufMut};
use thiserror::Error;

/// Page number within a heap file.
pub type PageNo = usize;

/// Slot number within a page.
pub type SlotNo = usize;

/// Errors from tuple construction and (de)serialization.
#[derive(Debug, Error)]
pub enum DatumError {
    /// Buffer too small for the operation.
    #[error("buffer too small: need {required} bytes, have {available}")]
    BufferTooSmall {
        /// Bytes required.
        required: usize,
        /// Bytes available.
        available: usize,
    },
    /// Number of values does not match the descriptor.
    #[error("tuple has {actual} values, descriptor has {expected} fields")]
    ArityMismatch { expected: usize, actual: usize },
    /// Value type does not match the field type.
    #[error("field `{field}` expects {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: Type,
        actual: Type,
    },
    /// Text value does not fit in its fixed width.
    #[error("text of {len} bytes exceeds field width {width}")]
    TextTooLong { len: usize, width: usize },
    /// Stored text is not valid UTF-8.
    #[error("invalid utf-8 in text field")]
    InvalidUtf8,
    /// Field lookup by name failed.
    #[error("field `{0}` not found")]
    FieldNotFound(String),
    /// Field lookup by name matched more than one field.
    #[error("field `{0}` is ambiguous")]
    AmbiguousField(String),
}

/// Primitive field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// 8-byte signed integer.
    Int64,
    /// 8-byte floating point.
    Float64,
    /// Fixed-width string, zero padded.
    Text { width: usize },
}

impl Type {
    /// Returns the serialized size of a value of this type.
    pub const fn width(self) -> usize {
        match self {
            Type::Int64 | Type::Float64 => 8,
            Type::Text { width } => width,
        }
    }

    /// Returns true for types that take part in numeric statistics.
    pub const fn is_numeric(self) -> bool {
        matches!(self, Type::Int64 | Type::Float64)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int64 => write!(f, "INT64"),
            Type::Float64 => write!(f, "FLOAT64"),
            Type::Text { width } => write!(f, "TEXT({})", width),
        }
    }
}

/// A single typed column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int64(i64),
    Float64(f64),
    Text(String),
}

impl Value {
    /// Returns true if this value can be stored in a field of type `ty`.
    pub fn conforms_to(&self, ty: Type) -> bool {
        matches!(
            (self, ty),
            (Value::Int64(_), Type::Int64)
                | (Value::Float64(_), Type::Float64)
                | (Value::Text(_), Type::Text { .. })
        )
    }

    /// Returns the type of this value. Text reports its byte length as width.
    pub fn value_type(&self) -> Type {
        match self {
            Value::Int64(_) => Type::Int64,
            Value::Float64(_) => Type::Float64,
            Value::Text(s) => Type::Text { width: s.len() },
        }
    }

    /// Returns the value as `f64` if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            Value::Text(_) => None,
        }
    }

    /// Writes this value in its fixed-width form for `ty`.
    ///
    /// # Errors
    ///
    /// Returns `DatumError::TextTooLong` if a text value exceeds the width,
    /// or `DatumError::BufferTooSmall` if `buf` cannot hold the encoding.
    pub fn encode(&self, ty: Type, buf: &mut impl BufMut) -> Result<(), DatumError> {
        let width = ty.width();
        if buf.remaining_mut() < width {
            return Err(DatumError::BufferTooSmall {
                required: width,
                available: buf.remaining_mut(),
            });
        }
        match (self, ty) {
            (Value::Int64(v), Type::Int64) => buf.put_i64_le(*v),
            (Value::Float64(v), Type::Float64) => buf.put_f64_le(*v),
            (Value::Text(s), Type::Text { width }) => {
                if s.len() > width {
                    return Err(DatumError::TextTooLong {
                        len: s.len(),
                        width,
                    });
                }
                buf.put_slice(s.as_bytes());
                buf.put_bytes(0, width - s.len());
            }
            (value, expected) => {
                return Err(DatumError::TypeMismatch {
                    field: String::new(),
                    expected,
                    actual: value.value_type(),
                });
            }
        }
        Ok(())
    }

    /// Reads a value of type `ty`, consuming exactly `ty.width()` bytes.
    ///
    /// Text values have their trailing zero padding stripped.
    pub fn decode(ty: Type, buf: &mut impl Buf) -> Result<Self, DatumError> {
        let width = ty.width();
        if buf.remaining() < width {
            return Err(DatumError::BufferTooSmall {
                required: width,
                available: buf.remaining(),
            });
        }
        Ok(match ty {
            Type::Int64 => Value::Int64(buf.get_i64_le()),
            Type::Float64 => Value::Float64(buf.get_f64_le()),
            Type::Text { width } => {
                let mut raw = vec![0u8; width];
                buf.copy_to_slice(&mut raw);
                let end = raw.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
                raw.truncate(end);
                Value::Text(String::from_utf8(raw).map_err(|_| DatumError::InvalidUtf8)?)
            }
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A named, typed column with an optional table qualifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldType {
    pub name: String,
    pub qualifier: Option<String>,
    pub ty: Type,
}

impl FieldType {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            qualifier: None,
            ty,
        }
    }

    pub fn int64(name: impl Into<String>) -> Self {
        Self::new(name, Type::Int64)
    }

    pub fn float64(name: impl Into<String>) -> Self {
        Self::new(name, Type::Float64)
    }

    pub fn text(name: impl Into<String>, width: usize) -> Self {
        Self::new(name, Type::Text { width })
    }
}

/// Ordered list of fields describing a tuple layout.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TupleDescriptor {
    fields: Vec<FieldType>,
}

impl TupleDescriptor {
    pub fn new(fields: Vec<FieldType>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldType] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serialized size of one tuple in bytes.
    pub fn width(&self) -> usize {
        self.fields.iter().map(|f| f.ty.width()).sum()
    }

    /// Returns a descriptor with the fields of `self` followed by those of `other`.
    pub fn merge(&self, other: &TupleDescriptor) -> TupleDescriptor {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().cloned());
        TupleDescriptor { fields }
    }

    /// Returns a copy with every field qualified by `alias`.
    pub fn with_qualifier(&self, alias: &str) -> TupleDescriptor {
        let fields = self
            .fields
            .iter()
            .map(|f| FieldType {
                qualifier: Some(alias.to_string()),
                ..f.clone()
            })
            .collect();
        TupleDescriptor { fields }
    }

    /// Finds the index of the field called `name`.
    ///
    /// With a qualifier, only fields carrying that qualifier match. Without
    /// one, the name must be unique across all qualifiers.
    ///
    /// # Errors
    ///
    /// `FieldNotFound` if nothing matches, `AmbiguousField` if an
    /// unqualified name matches more than one field.
    pub fn find_field(&self, name: &str, qualifier: Option<&str>) -> Result<usize, DatumError> {
        let mut found = None;
        for (i, field) in self.fields.iter().enumerate() {
            if field.name != name {
                continue;
            }
            if let Some(q) = qualifier {
                if field.qualifier.as_deref() == Some(q) {
                    return Ok(i);
                }
                continue;
            }
            if found.is_some() {
                return Err(DatumError::AmbiguousField(name.to_string()));
            }
            found = Some(i);
        }
        found.ok_or_else(|| DatumError::FieldNotFound(name.to_string()))
    }
}

/// Physical location of a tuple: page number and slot number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub page_no: PageNo,
    pub slot_no: SlotNo,
}

impl RecordId {
    pub const fn new(page_no: PageNo, slot_no: SlotNo) -> Self {
        Self { page_no, slot_no }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_no, self.slot_no)
    }
}

/// A row: values laid out by a shared descriptor, plus its location once stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    desc: Arc<TupleDescriptor>,
    values: Vec<Value>,
    rid: Option<RecordId>,
}

impl Tuple {
    /// Creates a tuple after checking the values against the descriptor.
    ///
    /// # Errors
    ///
    /// `ArityMismatch`, `TypeMismatch`, or `TextTooLong` when a value does
    /// not fit its field.
    pub fn new(desc: Arc<TupleDescriptor>, values: Vec<Value>) -> Result<Self, DatumError> {
        if values.len() != desc.len() {
            return Err(DatumError::ArityMismatch {
                expected: desc.len(),
                actual: values.len(),
            });
        }
        for (field, value) in desc.fields().iter().zip(&values) {
            if !value.conforms_to(field.ty) {
                return Err(DatumError::TypeMismatch {
                    field: field.name.clone(),
                    expected: field.ty,
                    actual: value.value_type(),
                });
            }
            if let (Value::Text(s), Type::Text { width }) = (value, field.ty)
                && s.len() > width
            {
                return Err(DatumError::TextTooLong {
                    len: s.len(),
                    width,
                });
            }
        }
        Ok(Self {
            desc,
            values,
            rid: None,
        })
    }

    pub fn descriptor(&self) -> &Arc<TupleDescriptor> {
        &self.desc
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn rid(&self) -> Option<RecordId> {
        self.rid
    }

    pub fn set_rid(&mut self, rid: Option<RecordId>) {
        self.rid = rid;
    }

    /// Appends the fixed-width encoding of every field in descriptor order.
    pub fn encode(&self, buf: &mut impl BufMut) -> Result<(), DatumError> {
        for (field, value) in self.desc.fields().iter().zip(&self.values) {
            value.encode(field.ty, buf)?;
        }
        Ok(())
    }

    /// Reads one tuple laid out by `desc`. The result carries no record id.
    pub fn decode(desc: Arc<TupleDescriptor>, buf: &mut impl Buf) -> Result<Self, DatumError> {
        let required = desc.width();
        if buf.remaining() < required {
            return Err(DatumError::BufferTooSmall {
                required,
                available: buf.remaining(),
            });
        }
        let values = desc
            .fields()
            .iter()
            .map(|f| Value::decode(f.ty, buf))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            desc,
            values,
            rid: None,
        })
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}
