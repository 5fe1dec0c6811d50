//! Field events emitted by leaf handlers

use std::fmt;

use serde::Serialize;

use crate::header::TypeCode;

/// Decoded value of one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Uint(u64),
    Int(i64),
    Text(String),
    Type(TypeCode),
    /// Raw bytes, rendered as lowercase hex
    Bytes(#[serde(serialize_with = "serialize_hex")] Vec<u8>),
}

fn serialize_hex<T, S>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: AsRef<[u8]>,
    S: serde::Serializer,
{
    serializer.collect_str(&HexSlice(bytes.as_ref()))
}

struct HexSlice<'a>(&'a [u8]);

impl fmt::Display for HexSlice<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Uint(v) => write!(f, "{}", v),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Text(s) => write!(f, "{:?}", s),
            FieldValue::Type(t) => write!(f, "{}", t),
            FieldValue::Bytes(b) => write!(f, "{}", HexSlice(b)),
        }
    }
}

macro_rules! uint_field {
    ($($t:ty),*) => {
        $(impl From<$t> for FieldValue {
            fn from(v: $t) -> Self {
                FieldValue::Uint(v as u64)
            }
        })*
    };
}

uint_field!(u8, u16, u32, u64, usize);

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<TypeCode> for FieldValue {
    fn from(v: TypeCode) -> Self {
        FieldValue::Type(v)
    }
}

impl From<&[u8]> for FieldValue {
    fn from(v: &[u8]) -> Self {
        FieldValue::Bytes(v.to_vec())
    }
}

/// One named field of a record body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: &'static str,
    /// Absolute offset of the field's first byte
    pub offset: usize,
    pub value: FieldValue,
}

/// Collects the fields a handler decodes from one record body
#[derive(Debug, Default)]
pub struct FieldSink {
    fields: Vec<Field>,
}

impl FieldSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &'static str, offset: usize, value: impl Into<FieldValue>) {
        self.fields.push(Field {
            name,
            offset,
            value: value.into(),
        });
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_fields(self) -> Vec<Field> {
        self.fields
    }
}
