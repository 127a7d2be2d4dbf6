// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use siodb_codec::{DecodeError, Record, RecordReader, RecordWriter};
use uuid::{uuid, Uuid};

/// Per-database cipher key record.
///
/// Serialized, encrypted under the instance master key and written to
/// `<db-dir>/key`. The record id is `(database id) << 32`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CipherKeyRecord {
	/// Record id.
	pub id: u64,
	/// Cipher the key belongs to.
	pub cipher_id: String,
	/// Raw cipher key.
	pub key: Vec<u8>,
}

impl CipherKeyRecord {
	/// Record id of the key of `database_id`.
	pub fn record_id_for_database(database_id: u32) -> u64 {
		(database_id as u64) << 32
	}
}

impl Record for CipherKeyRecord {
	const CLASS_NAME: &'static str = "CipherKeyRecord";
	const CLASS_UUID: Uuid = uuid!("dffb2d5a-a781-428b-bdb5-54633e3ab8dd");
	const CLASS_VERSION: u32 = 0;

	fn serialize_body(&self, w: &mut RecordWriter) {
		w.write_varint(self.id);
		w.write_str(&self.cipher_id);
		w.write_bytes(&self.key);
	}

	fn deserialize_body(r: &mut RecordReader) -> Result<Self, DecodeError> {
		Ok(CipherKeyRecord {
			id: r.read_varint("id")?,
			cipher_id: r.read_str("cipherId")?,
			key: r.read_bytes("key")?,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use siodb_codec::{deserialize_record, serialize_record};

	#[test]
	fn record_roundtrip() {
		let record = CipherKeyRecord {
			id: CipherKeyRecord::record_id_for_database(7),
			cipher_id: "aes128".into(),
			key: vec![0x11; 16],
		};
		let bytes = serialize_record(&record);
		let (decoded, consumed) = deserialize_record::<CipherKeyRecord>(&bytes).unwrap();
		assert_eq!(decoded, record);
		assert_eq!(consumed, bytes.len());
	}

	#[test]
	fn record_id_packs_database_id() {
		assert_eq!(CipherKeyRecord::record_id_for_database(1), 1u64 << 32);
		assert_eq!(CipherKeyRecord::record_id_for_database(7) >> 32, 7);
	}
}
