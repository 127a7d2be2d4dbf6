// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::{BTreeMap, HashMap};

use siodb_codec::{DecodeError, Record, RecordReader, RecordWriter};
use uuid::{uuid, Uuid};

/// Database catalog record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseRecord {
	/// Database id; id 1 is reserved for the system database.
	pub id: u32,
	/// Database UUID.
	pub uuid: Uuid,
	/// Database name.
	pub name: String,
	/// Cipher id of the database, `none` when encryption is off.
	pub cipher_id: String,
	/// Optional description.
	pub description: Option<String>,
}

impl Record for DatabaseRecord {
	const CLASS_NAME: &'static str = "DatabaseRecord";
	const CLASS_UUID: Uuid = uuid!("9a52d437-22ae-43e1-a24a-9c9f49b2d1a4");
	const CLASS_VERSION: u32 = 0;

	fn serialize_body(&self, w: &mut RecordWriter) {
		w.write_varint(self.id as u64);
		w.write_uuid(&self.uuid);
		w.write_str(&self.name);
		w.write_str(&self.cipher_id);
		w.write_opt_str(self.description.as_deref());
	}

	fn deserialize_body(r: &mut RecordReader) -> Result<Self, DecodeError> {
		Ok(DatabaseRecord {
			id: r.read_varint_u32("id")?,
			uuid: r.read_uuid("uuid")?,
			name: r.read_str("name")?,
			cipher_id: r.read_str("cipherId")?,
			description: r.read_opt_str("description")?,
		})
	}
}

/// Registry of known databases, keyed by id and by name.
#[derive(Default)]
pub struct DatabaseRegistry {
	by_id: BTreeMap<u32, DatabaseRecord>,
	id_by_name: HashMap<String, u32>,
}

impl DatabaseRegistry {
	/// New empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a record. Duplicate ids or names are a bug.
	pub fn insert(&mut self, record: DatabaseRecord) {
		assert!(!self.by_id.contains_key(&record.id), "duplicate database id {}", record.id);
		assert!(!self.id_by_name.contains_key(&record.name), "duplicate database name '{}'", record.name);
		self.id_by_name.insert(record.name.clone(), record.id);
		self.by_id.insert(record.id, record);
	}

	/// Looks up a record by id.
	pub fn get_by_id(&self, id: u32) -> Option<&DatabaseRecord> {
		self.by_id.get(&id)
	}

	/// Looks up a record by name.
	pub fn get_by_name(&self, name: &str) -> Option<&DatabaseRecord> {
		self.id_by_name.get(name).and_then(|id| self.by_id.get(id))
	}

	/// Returns true when a database with this name exists.
	pub fn contains_name(&self, name: &str) -> bool {
		self.id_by_name.contains_key(name)
	}

	/// Erases a record by id. Returns the erased record.
	pub fn erase(&mut self, id: u32) -> Option<DatabaseRecord> {
		let record = self.by_id.remove(&id)?;
		self.id_by_name.remove(&record.name);
		Some(record)
	}

	/// Number of records.
	pub fn len(&self) -> usize {
		self.by_id.len()
	}

	/// Returns true when the registry is empty.
	pub fn is_empty(&self) -> bool {
		self.by_id.is_empty()
	}

	/// Iterates records in id order.
	pub fn iter(&self) -> impl Iterator<Item = &DatabaseRecord> {
		self.by_id.values()
	}

	/// Swaps contents with another registry.
	pub fn swap(&mut self, other: &mut DatabaseRegistry) {
		std::mem::swap(self, other);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use siodb_codec::{deserialize_record, serialize_record};

	fn sample() -> DatabaseRecord {
		DatabaseRecord {
			id: 2,
			uuid: Uuid::from_u128(0x1234),
			name: "SALES".into(),
			cipher_id: "aes128".into(),
			description: Some("sales data".into()),
		}
	}

	#[test]
	fn record_roundtrip() {
		let record = sample();
		let bytes = serialize_record(&record);
		let (decoded, consumed) = deserialize_record::<DatabaseRecord>(&bytes).unwrap();
		assert_eq!(decoded, record);
		assert_eq!(consumed, bytes.len());
	}

	#[test]
	fn registry_lookups() {
		let mut reg = DatabaseRegistry::new();
		reg.insert(sample());
		assert_eq!(reg.get_by_name("SALES").unwrap().id, 2);
		assert_eq!(reg.get_by_id(2).unwrap().name, "SALES");
		assert!(reg.contains_name("SALES"));
		assert!(!reg.contains_name("HR"));

		let erased = reg.erase(2).unwrap();
		assert_eq!(erased.name, "SALES");
		assert!(reg.is_empty());
	}

	#[test]
	#[should_panic(expected = "duplicate database name")]
	fn duplicate_name_is_a_bug() {
		let mut reg = DatabaseRegistry::new();
		reg.insert(sample());
		let mut other = sample();
		other.id = 3;
		reg.insert(other);
	}
}
