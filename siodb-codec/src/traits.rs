// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use uuid::Uuid;

use crate::{
	error::DecodeError,
	reader::RecordReader,
	varint::{decode_varint, encode_varint, varint_size},
	writer::RecordWriter,
	CLASS_UUID_SIZE,
};

/// A record that serializes with a class-UUID envelope.
pub trait Record: Sized {
	/// Human-readable class name used in error messages.
	const CLASS_NAME: &'static str;
	/// Class UUID binding serialized payloads to this type.
	const CLASS_UUID: Uuid;
	/// Highest class version this implementation writes and understands.
	const CLASS_VERSION: u32;

	/// Writes the record body, without the envelope.
	fn serialize_body(&self, w: &mut RecordWriter);

	/// Reads the record body, without the envelope.
	fn deserialize_body(r: &mut RecordReader) -> Result<Self, DecodeError>;
}

/// Serializes `record` with its envelope into a fresh buffer.
pub fn serialize_record<T: Record>(record: &T) -> Vec<u8> {
	let mut out = Vec::new();
	serialize_record_into(record, &mut out);
	out
}

pub(crate) fn serialize_record_into<T: Record>(record: &T, out: &mut Vec<u8>) {
	out.extend_from_slice(T::CLASS_UUID.as_bytes());
	encode_varint(T::CLASS_VERSION as u64, out);
	let mut writer = RecordWriter::new();
	record.serialize_body(&mut writer);
	out.extend_from_slice(&writer.into_inner());
}

/// Upper-bound helper for pre-sizing buffers: envelope overhead of a record.
pub fn serialized_size<T: Record>(body_size: usize) -> usize {
	CLASS_UUID_SIZE + varint_size(T::CLASS_VERSION as u64) + body_size
}

/// Deserializes a record with its envelope from the head of `data`.
///
/// Returns the record and the number of bytes consumed. The class UUID is verified
/// and versions newer than [`Record::CLASS_VERSION`] are rejected.
pub fn deserialize_record<T: Record>(data: &[u8]) -> Result<(T, usize), DecodeError> {
	if data.len() < CLASS_UUID_SIZE {
		return Err(DecodeError::NotEnoughData);
	}
	if &data[..CLASS_UUID_SIZE] != T::CLASS_UUID.as_bytes() {
		return Err(DecodeError::ClassUuidMismatch { class: T::CLASS_NAME });
	}

	let (version, consumed) = decode_varint(&data[CLASS_UUID_SIZE..])
		.map_err(|e| DecodeError::field(T::CLASS_NAME, "$classVersion", e))?;
	let version = u32::try_from(version)
		.map_err(|_| DecodeError::UnsupportedClassVersion { class: T::CLASS_NAME, actual: u32::MAX, supported: T::CLASS_VERSION })?;
	if version > T::CLASS_VERSION {
		return Err(DecodeError::UnsupportedClassVersion { class: T::CLASS_NAME, actual: version, supported: T::CLASS_VERSION });
	}

	let start = CLASS_UUID_SIZE + consumed;
	let mut reader = RecordReader::new(T::CLASS_NAME, version, data, start);
	let value = T::deserialize_body(&mut reader)?;
	Ok((value, reader.consumed()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::FieldError;
	use uuid::uuid;

	#[derive(Debug, PartialEq)]
	struct Animal {
		id: u64,
		name: String,
		nickname: Option<String>,
		alive: bool,
	}

	impl Record for Animal {
		const CLASS_NAME: &'static str = "Animal";
		const CLASS_UUID: Uuid = uuid!("5f2b1d1e-4a27-4a3c-9a43-5a1f0e9ad001");
		const CLASS_VERSION: u32 = 0;

		fn serialize_body(&self, w: &mut RecordWriter) {
			w.write_varint(self.id);
			w.write_str(&self.name);
			w.write_opt_str(self.nickname.as_deref());
			w.write_bool(self.alive);
		}

		fn deserialize_body(r: &mut RecordReader) -> Result<Self, DecodeError> {
			Ok(Animal {
				id: r.read_varint("id")?,
				name: r.read_str("name")?,
				nickname: r.read_opt_str("nickname")?,
				alive: r.read_bool("alive")?,
			})
		}
	}

	#[derive(Debug, PartialEq)]
	struct Zoo {
		name: String,
		star: Animal,
	}

	impl Record for Zoo {
		const CLASS_NAME: &'static str = "Zoo";
		const CLASS_UUID: Uuid = uuid!("5f2b1d1e-4a27-4a3c-9a43-5a1f0e9ad002");
		const CLASS_VERSION: u32 = 0;

		fn serialize_body(&self, w: &mut RecordWriter) {
			w.write_str(&self.name);
			w.write_nested(&self.star);
		}

		fn deserialize_body(r: &mut RecordReader) -> Result<Self, DecodeError> {
			Ok(Zoo { name: r.read_str("name")?, star: r.read_nested("star")? })
		}
	}

	fn cat() -> Animal {
		Animal { id: 300, name: "cat".into(), nickname: Some("tom".into()), alive: true }
	}

	#[test]
	fn roundtrip() {
		let animal = cat();
		let bytes = serialize_record(&animal);
		let (decoded, consumed) = deserialize_record::<Animal>(&bytes).unwrap();
		assert_eq!(decoded, animal);
		assert_eq!(consumed, bytes.len());
	}

	#[test]
	fn nested_roundtrip() {
		let zoo = Zoo { name: "central".into(), star: cat() };
		let bytes = serialize_record(&zoo);
		let (decoded, consumed) = deserialize_record::<Zoo>(&bytes).unwrap();
		assert_eq!(decoded, zoo);
		assert_eq!(consumed, bytes.len());
	}

	#[test]
	fn envelope_layout() {
		let bytes = serialize_record(&cat());
		assert_eq!(&bytes[..16], Animal::CLASS_UUID.as_bytes());
		// version 0 as a single varint byte
		assert_eq!(bytes[16], 0);
	}

	#[test]
	fn rejects_wrong_uuid() {
		let bytes = serialize_record(&cat());
		let err = deserialize_record::<Zoo>(&bytes).unwrap_err();
		assert_eq!(err, DecodeError::ClassUuidMismatch { class: "Zoo" });
	}

	#[test]
	fn rejects_newer_version() {
		let mut bytes = serialize_record(&cat());
		bytes[16] = 9;
		let err = deserialize_record::<Animal>(&bytes).unwrap_err();
		assert_eq!(err, DecodeError::UnsupportedClassVersion { class: "Animal", actual: 9, supported: 0 });
	}

	#[test]
	fn reports_failing_field() {
		let bytes = serialize_record(&cat());
		// truncate inside the name payload
		let err = deserialize_record::<Animal>(&bytes[..20]).unwrap_err();
		assert_eq!(err, DecodeError::field("Animal", "name", FieldError::NotEnoughData));
		assert_eq!(err.to_string(), "failed to deserialize field Animal.name: not enough data");
	}

	#[test]
	fn short_input() {
		assert_eq!(deserialize_record::<Animal>(&[0u8; 3]).unwrap_err(), DecodeError::NotEnoughData);
	}
}
