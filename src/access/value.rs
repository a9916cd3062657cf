//! Field types and their fixed-width binary codec.
//!
//! Every field type has a fixed encoded size, so a tuple's byte width is
//! fully determined by its schema and pages can pack tuples into fixed
//! slots. Integers are 4-byte big-endian; text is a 4-byte big-endian
//! length followed by `TEXT_LEN` data bytes, zero-padded. The layout is
//! the engine's on-disk wire format and must not change without a file
//! format migration.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::error::{DbError, DbResult};

/// Maximum number of bytes stored for a text field.
pub const TEXT_LEN: usize = 128;

/// Data types supported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Int,
    Text,
}

impl FieldType {
    /// Encoded size of a field of this type, in bytes.
    pub fn byte_size(&self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Text => 4 + TEXT_LEN,
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Int => write!(f, "int"),
            FieldType::Text => write!(f, "text"),
        }
    }
}

/// Comparison operators usable in filter and join predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A single typed field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Int(i32),
    Text(String),
}

impl Field {
    pub fn field_type(&self) -> FieldType {
        match self {
            Field::Int(_) => FieldType::Int,
            Field::Text(_) => FieldType::Text,
        }
    }

    /// Evaluates `self op other`. Both operands must share a type.
    pub fn compare(&self, op: CompareOp, other: &Field) -> DbResult<bool> {
        let ordering = match (self, other) {
            (Field::Int(a), Field::Int(b)) => a.cmp(b),
            (Field::Text(a), Field::Text(b)) => a.cmp(b),
            _ => {
                return Err(DbError::SchemaMismatch(format!(
                    "cannot compare {} with {}",
                    self.field_type(),
                    other.field_type()
                )))
            }
        };
        Ok(match op {
            CompareOp::Eq => ordering.is_eq(),
            CompareOp::Ne => ordering.is_ne(),
            CompareOp::Lt => ordering.is_lt(),
            CompareOp::Le => ordering.is_le(),
            CompareOp::Gt => ordering.is_gt(),
            CompareOp::Ge => ordering.is_ge(),
        })
    }

    /// Writes the fixed-width encoding of this field.
    pub fn encode<W: Write>(&self, out: &mut W) -> DbResult<()> {
        match self {
            Field::Int(v) => out.write_i32::<BigEndian>(*v)?,
            Field::Text(s) => {
                let bytes = s.as_bytes();
                if bytes.len() > TEXT_LEN {
                    return Err(DbError::SchemaMismatch(format!(
                        "text value of {} bytes exceeds the {} byte limit",
                        bytes.len(),
                        TEXT_LEN
                    )));
                }
                out.write_u32::<BigEndian>(bytes.len() as u32)?;
                out.write_all(bytes)?;
                out.write_all(&vec![0u8; TEXT_LEN - bytes.len()])?;
            }
        }
        Ok(())
    }

    /// Reads one field of the given type from its fixed-width encoding.
    pub fn decode<R: Read>(ty: FieldType, input: &mut R) -> DbResult<Field> {
        match ty {
            FieldType::Int => Ok(Field::Int(input.read_i32::<BigEndian>()?)),
            FieldType::Text => {
                let len = input.read_u32::<BigEndian>()? as usize;
                let mut buf = vec![0u8; TEXT_LEN];
                input.read_exact(&mut buf)?;
                if len > TEXT_LEN {
                    return Err(DbError::SchemaMismatch(format!(
                        "text length prefix {} exceeds the {} byte limit",
                        len, TEXT_LEN
                    )));
                }
                buf.truncate(len);
                let s = String::from_utf8(buf)
                    .map_err(|e| DbError::SchemaMismatch(format!("invalid utf-8: {}", e)))?;
                Ok(Field::Text(s))
            }
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{}", v),
            Field::Text(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_sizes() {
        assert_eq!(FieldType::Int.byte_size(), 4);
        assert_eq!(FieldType::Text.byte_size(), 132);
    }

    #[test]
    fn test_int_round_trip() -> DbResult<()> {
        let mut buf = Vec::new();
        Field::Int(-42).encode(&mut buf)?;
        assert_eq!(buf.len(), 4);
        assert_eq!(buf, (-42i32).to_be_bytes());

        let decoded = Field::decode(FieldType::Int, &mut buf.as_slice())?;
        assert_eq!(decoded, Field::Int(-42));
        Ok(())
    }

    #[test]
    fn test_text_round_trip() -> DbResult<()> {
        let mut buf = Vec::new();
        Field::Text("hello".into()).encode(&mut buf)?;
        assert_eq!(buf.len(), 4 + TEXT_LEN);

        let decoded = Field::decode(FieldType::Text, &mut buf.as_slice())?;
        assert_eq!(decoded, Field::Text("hello".into()));
        Ok(())
    }

    #[test]
    fn test_text_too_long_rejected() {
        let long = "x".repeat(TEXT_LEN + 1);
        let mut buf = Vec::new();
        assert!(Field::Text(long).encode(&mut buf).is_err());
    }

    #[test]
    fn test_compare_same_type() -> DbResult<()> {
        let a = Field::Int(1);
        let b = Field::Int(2);
        assert!(a.compare(CompareOp::Lt, &b)?);
        assert!(a.compare(CompareOp::Le, &b)?);
        assert!(a.compare(CompareOp::Ne, &b)?);
        assert!(!a.compare(CompareOp::Eq, &b)?);
        assert!(b.compare(CompareOp::Gt, &a)?);
        assert!(b.compare(CompareOp::Ge, &b.clone())?);

        let s = Field::Text("abc".into());
        let t = Field::Text("abd".into());
        assert!(s.compare(CompareOp::Lt, &t)?);
        Ok(())
    }

    #[test]
    fn test_compare_mixed_types_fails() {
        let a = Field::Int(1);
        let s = Field::Text("1".into());
        assert!(a.compare(CompareOp::Eq, &s).is_err());
    }
}
