// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Dynamically typed column values and their block-level encoding.

use siodb_codec::{decode_varint, encode_varint};

use crate::{
	datatypes::ColumnDataType,
	error::{internal_codes, DbError, DbResult},
};

/// A single column value.
#[derive(Clone, Debug, PartialEq)]
pub enum Variant {
	/// SQL NULL.
	Null,
	/// Boolean.
	Bool(bool),
	/// Signed 8-bit integer.
	Int8(i8),
	/// Unsigned 8-bit integer.
	UInt8(u8),
	/// Signed 16-bit integer.
	Int16(i16),
	/// Unsigned 16-bit integer.
	UInt16(u16),
	/// Signed 32-bit integer.
	Int32(i32),
	/// Unsigned 32-bit integer.
	UInt32(u32),
	/// Signed 64-bit integer.
	Int64(i64),
	/// Unsigned 64-bit integer.
	UInt64(u64),
	/// 32-bit float.
	Float(f32),
	/// 64-bit float.
	Double(f64),
	/// UTF-8 text.
	Text(String),
	/// Raw bytes.
	Binary(Vec<u8>),
	/// Seconds since the epoch.
	Timestamp(u64),
}

fn zigzag_encode(value: i64) -> u64 {
	((value << 1) ^ (value >> 63)) as u64
}

fn zigzag_decode(value: u64) -> i64 {
	((value >> 1) as i64) ^ -((value & 1) as i64)
}

fn corrupt(what: &str) -> DbError {
	DbError::internal(internal_codes::CORRUPTED_RECORD, format!("corrupted column value: {}", what))
}

impl Variant {
	/// Returns true for SQL NULL.
	pub fn is_null(&self) -> bool {
		matches!(self, Variant::Null)
	}

	/// Encodes the value as a one-byte presence tag followed by the typed payload.
	pub fn serialize(&self) -> Vec<u8> {
		let mut out = Vec::new();
		match self {
			Variant::Null => out.push(0),
			other => {
				out.push(1);
				other.serialize_payload(&mut out);
			},
		}
		out
	}

	fn serialize_payload(&self, out: &mut Vec<u8>) {
		match self {
			Variant::Null => unreachable!("null has no payload; qed"),
			Variant::Bool(v) => out.push(*v as u8),
			Variant::Int8(v) => encode_varint(zigzag_encode(*v as i64), out),
			Variant::UInt8(v) => encode_varint(*v as u64, out),
			Variant::Int16(v) => encode_varint(zigzag_encode(*v as i64), out),
			Variant::UInt16(v) => encode_varint(*v as u64, out),
			Variant::Int32(v) => encode_varint(zigzag_encode(*v as i64), out),
			Variant::UInt32(v) => encode_varint(*v as u64, out),
			Variant::Int64(v) => encode_varint(zigzag_encode(*v), out),
			Variant::UInt64(v) => encode_varint(*v, out),
			Variant::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
			Variant::Double(v) => out.extend_from_slice(&v.to_le_bytes()),
			Variant::Text(v) => {
				encode_varint(v.len() as u64, out);
				out.extend_from_slice(v.as_bytes());
			},
			Variant::Binary(v) => {
				encode_varint(v.len() as u64, out);
				out.extend_from_slice(v);
			},
			Variant::Timestamp(v) => encode_varint(*v, out),
		}
	}

	/// Decodes a value of `data_type`. Returns the value and the bytes consumed.
	pub fn deserialize(data_type: ColumnDataType, data: &[u8]) -> DbResult<(Self, usize)> {
		let tag = *data.first().ok_or_else(|| corrupt("missing presence tag"))?;
		match tag {
			0 => Ok((Variant::Null, 1)),
			1 => {
				let (value, consumed) = Self::deserialize_payload(data_type, &data[1..])?;
				Ok((value, consumed + 1))
			},
			other => Err(corrupt(&format!("invalid presence tag {}", other))),
		}
	}

	fn deserialize_payload(data_type: ColumnDataType, data: &[u8]) -> DbResult<(Self, usize)> {
		let read_varint =
			|data: &[u8]| decode_varint(data).map_err(|e| corrupt(&format!("bad varint: {}", e)));
		Ok(match data_type {
			ColumnDataType::Bool => {
				let byte = *data.first().ok_or_else(|| corrupt("missing bool payload"))?;
				(Variant::Bool(byte != 0), 1)
			},
			ColumnDataType::Int8 => {
				let (raw, n) = read_varint(data)?;
				(Variant::Int8(zigzag_decode(raw) as i8), n)
			},
			ColumnDataType::UInt8 => {
				let (raw, n) = read_varint(data)?;
				(Variant::UInt8(raw as u8), n)
			},
			ColumnDataType::Int16 => {
				let (raw, n) = read_varint(data)?;
				(Variant::Int16(zigzag_decode(raw) as i16), n)
			},
			ColumnDataType::UInt16 => {
				let (raw, n) = read_varint(data)?;
				(Variant::UInt16(raw as u16), n)
			},
			ColumnDataType::Int32 => {
				let (raw, n) = read_varint(data)?;
				(Variant::Int32(zigzag_decode(raw) as i32), n)
			},
			ColumnDataType::UInt32 => {
				let (raw, n) = read_varint(data)?;
				(Variant::UInt32(raw as u32), n)
			},
			ColumnDataType::Int64 => {
				let (raw, n) = read_varint(data)?;
				(Variant::Int64(zigzag_decode(raw)), n)
			},
			ColumnDataType::UInt64 => {
				let (raw, n) = read_varint(data)?;
				(Variant::UInt64(raw), n)
			},
			ColumnDataType::Float => {
				if data.len() < 4 {
					return Err(corrupt("short float payload"));
				}
				let mut raw = [0u8; 4];
				raw.copy_from_slice(&data[..4]);
				(Variant::Float(f32::from_le_bytes(raw)), 4)
			},
			ColumnDataType::Double => {
				if data.len() < 8 {
					return Err(corrupt("short double payload"));
				}
				let mut raw = [0u8; 8];
				raw.copy_from_slice(&data[..8]);
				(Variant::Double(f64::from_le_bytes(raw)), 8)
			},
			ColumnDataType::Text => {
				let (len, n) = read_varint(data)?;
				let len = len as usize;
				if data.len() < n + len {
					return Err(corrupt("short text payload"));
				}
				let text = std::str::from_utf8(&data[n..n + len]).map_err(|_| corrupt("invalid utf-8"))?;
				(Variant::Text(text.to_owned()), n + len)
			},
			ColumnDataType::Binary => {
				let (len, n) = read_varint(data)?;
				let len = len as usize;
				if data.len() < n + len {
					return Err(corrupt("short binary payload"));
				}
				(Variant::Binary(data[n..n + len].to_vec()), n + len)
			},
			ColumnDataType::Timestamp => {
				let (raw, n) = read_varint(data)?;
				(Variant::Timestamp(raw), n)
			},
		})
	}

	/// Text content, or an internal error for other variants.
	pub fn as_text(&self) -> DbResult<&str> {
		match self {
			Variant::Text(v) => Ok(v),
			other => Err(corrupt(&format!("expected text, found {:?}", other))),
		}
	}

	/// Optional text content: NULL maps to `None`.
	pub fn as_opt_text(&self) -> DbResult<Option<&str>> {
		match self {
			Variant::Null => Ok(None),
			Variant::Text(v) => Ok(Some(v)),
			other => Err(corrupt(&format!("expected text or null, found {:?}", other))),
		}
	}

	/// Unsigned 8-bit content.
	pub fn as_u8(&self) -> DbResult<u8> {
		match self {
			Variant::UInt8(v) => Ok(*v),
			other => Err(corrupt(&format!("expected uint8, found {:?}", other))),
		}
	}

	/// Unsigned 32-bit content; any unsigned integer narrows with a range check.
	pub fn as_u32(&self) -> DbResult<u32> {
		let wide = self.as_u64()?;
		u32::try_from(wide).map_err(|_| corrupt("uint32 out of range"))
	}

	/// Unsigned 64-bit content; accepts any unsigned integer variant.
	pub fn as_u64(&self) -> DbResult<u64> {
		match self {
			Variant::UInt8(v) => Ok(*v as u64),
			Variant::UInt16(v) => Ok(*v as u64),
			Variant::UInt32(v) => Ok(*v as u64),
			Variant::UInt64(v) => Ok(*v),
			other => Err(corrupt(&format!("expected unsigned integer, found {:?}", other))),
		}
	}

	/// Binary content.
	pub fn as_binary(&self) -> DbResult<&[u8]> {
		match self {
			Variant::Binary(v) => Ok(v),
			other => Err(corrupt(&format!("expected binary, found {:?}", other))),
		}
	}

	/// Optional timestamp content: NULL maps to `None`.
	pub fn as_opt_timestamp(&self) -> DbResult<Option<u64>> {
		match self {
			Variant::Null => Ok(None),
			Variant::Timestamp(v) => Ok(Some(*v)),
			other => Err(corrupt(&format!("expected timestamp or null, found {:?}", other))),
		}
	}
}

impl From<Option<String>> for Variant {
	fn from(value: Option<String>) -> Self {
		match value {
			Some(text) => Variant::Text(text),
			None => Variant::Null,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn roundtrip(value: Variant, data_type: ColumnDataType) {
		let bytes = value.serialize();
		let (decoded, consumed) = Variant::deserialize(data_type, &bytes).unwrap();
		assert_eq!(decoded, value);
		assert_eq!(consumed, bytes.len());
	}

	#[test]
	fn roundtrips() {
		roundtrip(Variant::Null, ColumnDataType::Text);
		roundtrip(Variant::Bool(true), ColumnDataType::Bool);
		roundtrip(Variant::Int8(-5), ColumnDataType::Int8);
		roundtrip(Variant::UInt8(200), ColumnDataType::UInt8);
		roundtrip(Variant::Int32(-70_000), ColumnDataType::Int32);
		roundtrip(Variant::UInt64(u64::MAX), ColumnDataType::UInt64);
		roundtrip(Variant::Float(1.5), ColumnDataType::Float);
		roundtrip(Variant::Double(-2.25), ColumnDataType::Double);
		roundtrip(Variant::Text("naïve".into()), ColumnDataType::Text);
		roundtrip(Variant::Binary(vec![0, 1, 2, 255]), ColumnDataType::Binary);
		roundtrip(Variant::Timestamp(1_600_000_000), ColumnDataType::Timestamp);
	}

	#[test]
	fn null_encodes_as_single_byte() {
		assert_eq!(Variant::Null.serialize(), vec![0]);
	}

	#[test]
	fn truncated_payload_is_rejected() {
		let bytes = Variant::Text("hello".into()).serialize();
		assert!(Variant::deserialize(ColumnDataType::Text, &bytes[..3]).is_err());
	}

	#[test]
	fn accessors() {
		assert_eq!(Variant::Text("x".into()).as_text().unwrap(), "x");
		assert_eq!(Variant::Null.as_opt_text().unwrap(), None);
		assert_eq!(Variant::UInt8(3).as_u64().unwrap(), 3);
		assert!(Variant::Text("x".into()).as_u64().is_err());
	}
}
