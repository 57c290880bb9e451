//! Tuple codec: encodes/decodes a row's [`Value`]s against its attribute
//! forms.
//!
//! The nulls bitmap is the one place this crate deliberately uses
//! big-endian encoding while every page-level structure is little-endian —
//! do not "fix" this asymmetry.

use crate::catalog::{AttributeRow, TYPE_BIGINT, TYPE_BOOLEAN, TYPE_CHAR, TYPE_DOUBLE, TYPE_INTEGER, TYPE_REAL, TYPE_TEXT, TYPE_VARCHAR};
use crate::codec::{self, Endian};
use crate::common::Value;
use crate::error::{Error, ErrorKind, Result};

const NULLS_BITMAP_BYTES: usize = 8;

fn nulls_bit(values: &[Value]) -> u64 {
    let mut mask = 0u64;
    for (i, v) in values.iter().enumerate() {
        if v.is_null() {
            mask |= 1 << i;
        }
    }
    mask
}

/// Encode a row. Column order follows `columns` (already sorted by
/// `column_index` by the catalog). Fails with a rollback error when a
/// NOT-NULL column receives NULL.
pub fn encode(columns: &[&AttributeRow], values: &[Value]) -> Result<Vec<u8>> {
    if columns.len() != values.len() {
        return Err(Error::with_message(
            ErrorKind::Mismatch,
            format!("expected {} columns, got {} values", columns.len(), values.len()),
        ));
    }
    for (col, val) in columns.iter().zip(values) {
        if col.notnull && val.is_null() {
            return Err(Error::with_message(
                ErrorKind::Constraint,
                format!("column \"{}\" may not be NULL", col.name),
            ));
        }
    }

    let mut out = Vec::new();
    codec::write_u64(nulls_bit(values), Endian::Big, &mut out);
    debug_assert_eq!(out.len(), NULLS_BITMAP_BYTES);

    for (col, val) in columns.iter().zip(values) {
        if val.is_null() {
            continue;
        }
        encode_value(col, val, &mut out)?;
    }
    Ok(out)
}

fn encode_value(col: &AttributeRow, val: &Value, out: &mut Vec<u8>) -> Result<()> {
    match (col.type_oid, val) {
        (TYPE_INTEGER, Value::Integer(v)) => codec::write_i32_le(*v, out),
        (TYPE_BIGINT, Value::Bigint(v)) => codec::write_i64_le(*v, out),
        (TYPE_REAL, Value::Real(v)) => codec::write_f32_le(*v, out),
        (TYPE_DOUBLE, Value::Double(v)) => codec::write_f64_le(*v, out),
        (TYPE_BOOLEAN, Value::Boolean(v)) => out.push(*v as u8),
        (TYPE_CHAR, Value::Char(v)) => out.push(*v),
        (TYPE_VARCHAR, Value::Varchar(s)) => {
            let max = col.length as usize;
            let truncated: String = s.chars().take(max).collect();
            let bytes = truncated.as_bytes();
            codec::write_u32_le(bytes.len() as u32, out);
            out.extend_from_slice(bytes);
        }
        (TYPE_TEXT, Value::Text(s)) => {
            let bytes = s.as_bytes();
            codec::write_u32_le(bytes.len() as u32, out);
            out.extend_from_slice(bytes);
        }
        _ => {
            return Err(Error::with_message(
                ErrorKind::Mismatch,
                format!("value does not match declared type of column \"{}\"", col.name),
            ))
        }
    }
    Ok(())
}

/// Decode a row previously produced by [`encode`].
pub fn decode(columns: &[&AttributeRow], buf: &[u8]) -> Result<Vec<Value>> {
    let nulls = codec::read_u64(codec::take(buf, 0, NULLS_BITMAP_BYTES)?, Endian::Big);
    let mut offset = NULLS_BITMAP_BYTES;
    let mut values = Vec::with_capacity(columns.len());

    for (i, col) in columns.iter().enumerate() {
        if nulls & (1 << i) != 0 {
            values.push(Value::Null);
            continue;
        }
        values.push(decode_value(col, buf, &mut offset)?);
    }
    Ok(values)
}

fn decode_value(col: &AttributeRow, buf: &[u8], offset: &mut usize) -> Result<Value> {
    match col.type_oid {
        TYPE_INTEGER => {
            let v = codec::read_i32_le(codec::take(buf, *offset, 4)?);
            *offset += 4;
            Ok(Value::Integer(v))
        }
        TYPE_BIGINT => {
            let v = codec::read_i64_le(codec::take(buf, *offset, 8)?);
            *offset += 8;
            Ok(Value::Bigint(v))
        }
        TYPE_REAL => {
            let v = codec::read_f32_le(codec::take(buf, *offset, 4)?);
            *offset += 4;
            Ok(Value::Real(v))
        }
        TYPE_DOUBLE => {
            let v = codec::read_f64_le(codec::take(buf, *offset, 8)?);
            *offset += 8;
            Ok(Value::Double(v))
        }
        TYPE_BOOLEAN => {
            let v = codec::take(buf, *offset, 1)?[0] != 0;
            *offset += 1;
            Ok(Value::Boolean(v))
        }
        TYPE_CHAR => {
            let v = codec::take(buf, *offset, 1)?[0];
            *offset += 1;
            Ok(Value::Char(v))
        }
        TYPE_VARCHAR | TYPE_TEXT => {
            let len = codec::read_u32_le(codec::take(buf, *offset, 4)?) as usize;
            *offset += 4;
            let bytes = codec::take(buf, *offset, len)?;
            *offset += len;
            let s = String::from_utf8(bytes.to_vec())
                .map_err(|e| Error::with_message(ErrorKind::Corrupt, e.to_string()))?;
            if col.type_oid == TYPE_VARCHAR {
                Ok(Value::Varchar(s))
            } else {
                Ok(Value::Text(s))
            }
        }
        other => Err(Error::with_message(
            ErrorKind::Mismatch,
            format!("unknown column type oid {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::RelationKind;

    fn attr(name: &str, type_oid: u64, length: u32, notnull: bool, index: u32) -> AttributeRow {
        AttributeRow {
            class_oid: 1,
            name: name.to_string(),
            type_oid,
            length,
            column_index: index,
            notnull,
        }
    }

    #[test]
    fn round_trips_mixed_columns_with_one_null() {
        let id = attr("id", TYPE_INTEGER, 4, true, 0);
        let name = attr("name", TYPE_VARCHAR, 8, false, 1);
        let note = attr("note", TYPE_TEXT, 0, false, 2);
        let columns = vec![&id, &name, &note];
        let values = vec![
            Value::Integer(42),
            Value::Varchar("a very long name".to_string()),
            Value::Null,
        ];

        let bytes = encode(&columns, &values).unwrap();
        let back = decode(&columns, &bytes).unwrap();
        assert_eq!(back[0], Value::Integer(42));
        assert_eq!(back[1], Value::Varchar("a very l".to_string()));
        assert_eq!(back[2], Value::Null);
    }

    #[test]
    fn notnull_column_rejects_null() {
        let id = attr("id", TYPE_INTEGER, 4, true, 0);
        let err = encode(&[&id], &[Value::Null]).unwrap_err();
        assert_eq!(err.code, ErrorKind::Constraint);
    }

    #[test]
    fn relation_kind_from_u8_roundtrips_all_variants() {
        for k in [
            RelationKind::Heap,
            RelationKind::Btree,
            RelationKind::System,
            RelationKind::Temp,
            RelationKind::Memory,
        ] {
            assert_eq!(RelationKind::from_u8(k as u8), Some(k));
        }
    }
}
