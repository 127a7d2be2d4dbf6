// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use uuid::Uuid;

use crate::{
	error::{DecodeError, FieldError},
	traits::{deserialize_record, Record},
	varint::decode_varint,
};

/// Cursor over a serialized record body.
///
/// Field accessors take the field name so that every failure names the exact
/// `Class.field` that could not be read.
pub struct RecordReader<'a> {
	class: &'static str,
	class_version: u32,
	data: &'a [u8],
	pos: usize,
}

impl<'a> RecordReader<'a> {
	pub(crate) fn new(class: &'static str, class_version: u32, data: &'a [u8], pos: usize) -> Self {
		RecordReader { class, class_version, data, pos }
	}

	/// Class version found in the record envelope.
	pub fn class_version(&self) -> u32 {
		self.class_version
	}

	/// Number of bytes consumed so far, counted from the start of the envelope.
	pub fn consumed(&self) -> usize {
		self.pos
	}

	/// Number of unread bytes.
	pub fn remaining(&self) -> usize {
		self.data.len() - self.pos
	}

	fn fail(&self, field: &'static str, source: FieldError) -> DecodeError {
		DecodeError::field(self.class, field, source)
	}

	fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
		if self.remaining() < len {
			return Err(self.fail(field, FieldError::NotEnoughData));
		}
		let slice = &self.data[self.pos..self.pos + len];
		self.pos += len;
		Ok(slice)
	}

	/// Reads a varint-encoded unsigned integer.
	pub fn read_varint(&mut self, field: &'static str) -> Result<u64, DecodeError> {
		let (value, consumed) = decode_varint(&self.data[self.pos..]).map_err(|e| self.fail(field, e))?;
		self.pos += consumed;
		Ok(value)
	}

	/// Reads a varint and checks that it fits into `u32`.
	pub fn read_varint_u32(&mut self, field: &'static str) -> Result<u32, DecodeError> {
		let value = self.read_varint(field)?;
		u32::try_from(value).map_err(|_| self.fail(field, FieldError::OutOfRange))
	}

	/// Reads a single raw byte.
	pub fn read_u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
		Ok(self.take(1, field)?[0])
	}

	/// Reads a one-byte boolean; any tag other than 0 or 1 is invalid.
	pub fn read_bool(&mut self, field: &'static str) -> Result<bool, DecodeError> {
		match self.read_u8(field)? {
			0 => Ok(false),
			1 => Ok(true),
			tag => Err(self.fail(field, FieldError::InvalidTag(tag))),
		}
	}

	/// Reads a raw 16-byte UUID.
	pub fn read_uuid(&mut self, field: &'static str) -> Result<Uuid, DecodeError> {
		let bytes = self.take(16, field)?;
		let mut raw = [0u8; 16];
		raw.copy_from_slice(bytes);
		Ok(Uuid::from_bytes(raw))
	}

	/// Reads a varint-length-prefixed byte vector.
	pub fn read_bytes(&mut self, field: &'static str) -> Result<Vec<u8>, DecodeError> {
		let len = self.read_varint(field)?;
		let len = usize::try_from(len).map_err(|_| self.fail(field, FieldError::OutOfRange))?;
		Ok(self.take(len, field)?.to_vec())
	}

	/// Reads a varint-length-prefixed string.
	pub fn read_str(&mut self, field: &'static str) -> Result<String, DecodeError> {
		let bytes = self.read_bytes(field)?;
		String::from_utf8(bytes).map_err(|_| self.fail(field, FieldError::InvalidUtf8))
	}

	/// Reads an optional string behind a one-byte presence tag.
	pub fn read_opt_str(&mut self, field: &'static str) -> Result<Option<String>, DecodeError> {
		if self.read_bool(field)? {
			Ok(Some(self.read_str(field)?))
		} else {
			Ok(None)
		}
	}

	/// Reads an optional varint behind a one-byte presence tag.
	pub fn read_opt_varint(&mut self, field: &'static str) -> Result<Option<u64>, DecodeError> {
		if self.read_bool(field)? {
			Ok(Some(self.read_varint(field)?))
		} else {
			Ok(None)
		}
	}

	/// Reads a nested record with its full class-UUID envelope.
	pub fn read_nested<T: Record>(&mut self, field: &'static str) -> Result<T, DecodeError> {
		let (value, consumed) = deserialize_record::<T>(&self.data[self.pos..])
			.map_err(|e| self.fail(field, FieldError::Nested(Box::new(e))))?;
		self.pos += consumed;
		Ok(value)
	}
}
