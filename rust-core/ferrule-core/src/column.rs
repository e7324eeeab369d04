//! # Column Values
//!
//! Conversion between record fields and stored column values, plus the
//! change hash used for dirty tracking.
//!
//! Storage conventions:
//!
//! - booleans are written as `0` / `1` integers and read back from integers
//! - arrays are written as compact JSON text (one space after an object
//!   key's colon) and read back by decoding it; NULL or undecodable text
//!   yields an empty sequence
//! - `Option<T>` maps `None` to SQL NULL

use crate::database::DbValue;
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;
use tracing::debug;
use xxhash_rust::xxh3::{xxh3_64, xxh3_64_with_seed};

/// A record field type that can be persisted in one column
pub trait ColumnValue: Sized {
    /// Field kind label used in conversion errors
    const KIND: &'static str;

    /// Serialize the field for a bound statement parameter
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if an array element cannot be encoded.
    fn to_db(&self) -> Result<DbValue>;

    /// Rebuild the field from a stored column value
    ///
    /// # Errors
    ///
    /// Returns `Error::Conversion` if the stored value has an incompatible type.
    fn from_db(column: &str, value: DbValue) -> Result<Self>;
}

fn mismatch(column: &str, expected: &'static str, found: &DbValue) -> Error {
    Error::Conversion {
        column: column.to_string(),
        expected,
        found: found.type_name().to_string(),
    }
}

impl ColumnValue for i64 {
    const KIND: &'static str = "integer";

    fn to_db(&self) -> Result<DbValue> {
        Ok(DbValue::Int(*self))
    }

    fn from_db(column: &str, value: DbValue) -> Result<Self> {
        match value {
            DbValue::Int(v) => Ok(v),
            DbValue::Bool(b) => Ok(Self::from(b)),
            DbValue::String(ref s) => s
                .trim()
                .parse()
                .map_err(|_| mismatch(column, Self::KIND, &value)),
            #[allow(clippy::cast_possible_truncation)]
            DbValue::Float(f) if f.fract() == 0.0 => Ok(f as Self),
            other => Err(mismatch(column, Self::KIND, &other)),
        }
    }
}

impl ColumnValue for i32 {
    const KIND: &'static str = "integer";

    fn to_db(&self) -> Result<DbValue> {
        Ok(DbValue::Int(i64::from(*self)))
    }

    fn from_db(column: &str, value: DbValue) -> Result<Self> {
        let found = value.clone();
        let wide = i64::from_db(column, value)?;
        Self::try_from(wide).map_err(|_| mismatch(column, Self::KIND, &found))
    }
}

impl ColumnValue for f64 {
    const KIND: &'static str = "float";

    fn to_db(&self) -> Result<DbValue> {
        Ok(DbValue::Float(*self))
    }

    fn from_db(column: &str, value: DbValue) -> Result<Self> {
        match value {
            DbValue::Float(f) => Ok(f),
            #[allow(clippy::cast_precision_loss)]
            DbValue::Int(v) => Ok(v as Self),
            DbValue::String(ref s) => s
                .trim()
                .parse()
                .map_err(|_| mismatch(column, Self::KIND, &value)),
            other => Err(mismatch(column, Self::KIND, &other)),
        }
    }
}

impl ColumnValue for String {
    const KIND: &'static str = "string";

    fn to_db(&self) -> Result<DbValue> {
        Ok(DbValue::String(self.clone()))
    }

    fn from_db(column: &str, value: DbValue) -> Result<Self> {
        match value {
            DbValue::String(s) => Ok(s),
            DbValue::Int(v) => Ok(v.to_string()),
            DbValue::Float(f) => Ok(f.to_string()),
            DbValue::Bool(b) => Ok(if b { "1" } else { "0" }.to_string()),
            DbValue::Bytes(bytes) => {
                Self::from_utf8(bytes).map_err(|_| Error::Conversion {
                    column: column.to_string(),
                    expected: Self::KIND,
                    found: "non-utf8 bytes".to_string(),
                })
            }
            DbValue::Null => Err(mismatch(column, Self::KIND, &DbValue::Null)),
        }
    }
}

impl ColumnValue for bool {
    const KIND: &'static str = "boolean";

    fn to_db(&self) -> Result<DbValue> {
        Ok(DbValue::Int(i64::from(*self)))
    }

    fn from_db(column: &str, value: DbValue) -> Result<Self> {
        match value {
            DbValue::Bool(b) => Ok(b),
            DbValue::Int(v) => Ok(v != 0),
            DbValue::Float(f) => Ok(f != 0.0),
            DbValue::String(ref s) => match s.trim() {
                "1" | "true" => Ok(true),
                "0" | "false" | "" => Ok(false),
                _ => Err(mismatch(column, Self::KIND, &value)),
            },
            other => Err(mismatch(column, Self::KIND, &other)),
        }
    }
}

impl<T> ColumnValue for Vec<T>
where
    T: Serialize + DeserializeOwned,
{
    const KIND: &'static str = "array";

    fn to_db(&self) -> Result<DbValue> {
        encode_array(self).map(DbValue::String)
    }

    fn from_db(column: &str, value: DbValue) -> Result<Self> {
        let decoded = match value {
            DbValue::Null => return Ok(Self::new()),
            DbValue::String(text) => serde_json::from_str(&text),
            DbValue::Bytes(bytes) => serde_json::from_slice(&bytes),
            other => return Err(mismatch(column, Self::KIND, &other)),
        };
        Ok(decoded.unwrap_or_else(|e| {
            debug!(column, error = %e, "Undecodable array column, using empty sequence");
            Self::new()
        }))
    }
}

impl<T: ColumnValue> ColumnValue for Option<T> {
    const KIND: &'static str = T::KIND;

    fn to_db(&self) -> Result<DbValue> {
        self.as_ref().map_or(Ok(DbValue::Null), T::to_db)
    }

    fn from_db(column: &str, value: DbValue) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_db(column, value).map(Some)
        }
    }
}

struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_object_value<W>(&mut self, writer: &mut W) -> std::io::Result<()>
    where
        W: ?Sized + std::io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Encode a sequence as the stored array text
///
/// # Errors
///
/// Returns `Error::Json` if an element cannot be serialized.
pub fn encode_array<T: Serialize>(items: &[T]) -> Result<String> {
    let mut buffer = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, SpacedFormatter);
    items.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Canonical text of a stored value, the input of the change hash
#[must_use]
pub fn canonical_text(value: &DbValue) -> Cow<'_, [u8]> {
    match value {
        DbValue::Null => Cow::Borrowed(b"".as_slice()),
        DbValue::Int(v) => Cow::Owned(v.to_string().into_bytes()),
        DbValue::Float(f) => Cow::Owned(f.to_string().into_bytes()),
        DbValue::String(s) => Cow::Borrowed(s.as_bytes()),
        DbValue::Bool(true) => Cow::Borrowed(b"1".as_slice()),
        DbValue::Bool(false) => Cow::Borrowed(b"0".as_slice()),
        DbValue::Bytes(bytes) => Cow::Borrowed(bytes.as_slice()),
    }
}

const NULL_SEED: u64 = 0x6e75_6c6c;

/// Checksum of a value as last persisted
///
/// NULL is hashed under its own seed so it never matches an empty text.
#[must_use]
pub fn change_hash(value: &DbValue) -> u64 {
    match value {
        DbValue::Null => xxh3_64_with_seed(b"", NULL_SEED),
        other => xxh3_64(&canonical_text(other)),
    }
}
