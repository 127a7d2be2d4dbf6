// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::{BTreeMap, HashMap};

use siodb_codec::{DecodeError, FieldError, Record, RecordReader, RecordWriter};
use uuid::{uuid, Uuid};

use crate::datatypes::TableType;

/// Table catalog record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableRecord {
	/// Table id; the system range is below [`crate::constants::FIRST_USER_TABLE_ID`].
	pub id: u32,
	/// Table storage type.
	pub table_type: TableType,
	/// Table name.
	pub name: String,
	/// First TRID of the user range of this table.
	pub first_user_trid: u64,
	/// Id of the current column set defining the row shape.
	pub current_column_set_id: u64,
	/// Optional description.
	pub description: Option<String>,
}

impl Record for TableRecord {
	const CLASS_NAME: &'static str = "TableRecord";
	const CLASS_UUID: Uuid = uuid!("5b4e5c49-8fd3-4d6a-9b14-3e7f2c1a8b02");
	const CLASS_VERSION: u32 = 0;

	fn serialize_body(&self, w: &mut RecordWriter) {
		w.write_varint(self.id as u64);
		w.write_u8(self.table_type as u8);
		w.write_str(&self.name);
		w.write_varint(self.first_user_trid);
		w.write_varint(self.current_column_set_id);
		w.write_opt_str(self.description.as_deref());
	}

	fn deserialize_body(r: &mut RecordReader) -> Result<Self, DecodeError> {
		let id = r.read_varint_u32("id")?;
		let raw_type = r.read_u8("type")?;
		let table_type = TableType::from_u8(raw_type)
			.ok_or_else(|| DecodeError::field(Self::CLASS_NAME, "type", FieldError::InvalidTag(raw_type)))?;
		Ok(TableRecord {
			id,
			table_type,
			name: r.read_str("name")?,
			first_user_trid: r.read_varint("firstUserTrid")?,
			current_column_set_id: r.read_varint("currentColumnSetId")?,
			description: r.read_opt_str("description")?,
		})
	}
}

/// Registry of a database's tables, keyed by id and by name.
#[derive(Default)]
pub struct TableRegistry {
	by_id: BTreeMap<u32, TableRecord>,
	id_by_name: HashMap<String, u32>,
}

impl TableRegistry {
	/// New empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a record. Duplicate ids or names are a bug.
	pub fn insert(&mut self, record: TableRecord) {
		assert!(!self.by_id.contains_key(&record.id), "duplicate table id {}", record.id);
		assert!(!self.id_by_name.contains_key(&record.name), "duplicate table name '{}'", record.name);
		self.id_by_name.insert(record.name.clone(), record.id);
		self.by_id.insert(record.id, record);
	}

	/// Looks up a record by id.
	pub fn get_by_id(&self, id: u32) -> Option<&TableRecord> {
		self.by_id.get(&id)
	}

	/// Looks up a record by name.
	pub fn get_by_name(&self, name: &str) -> Option<&TableRecord> {
		self.id_by_name.get(name).and_then(|id| self.by_id.get(id))
	}

	/// Returns true when a table with this name exists.
	pub fn contains_name(&self, name: &str) -> bool {
		self.id_by_name.contains_key(name)
	}

	/// Replaces the record with the same id, keeping the name index in step.
	pub fn replace(&mut self, record: TableRecord) {
		if let Some(old) = self.by_id.remove(&record.id) {
			self.id_by_name.remove(&old.name);
		}
		self.id_by_name.insert(record.name.clone(), record.id);
		self.by_id.insert(record.id, record);
	}

	/// Erases a record by id. Returns the erased record.
	pub fn erase(&mut self, id: u32) -> Option<TableRecord> {
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
	pub fn iter(&self) -> impl Iterator<Item = &TableRecord> {
		self.by_id.values()
	}

	/// Highest recorded table id, zero when empty.
	pub fn max_id(&self) -> u32 {
		self.by_id.keys().next_back().copied().unwrap_or(0)
	}

	/// Swaps contents with another registry.
	pub fn swap(&mut self, other: &mut TableRegistry) {
		std::mem::swap(self, other);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use siodb_codec::{deserialize_record, serialize_record};

	fn sample() -> TableRecord {
		TableRecord {
			id: 4097,
			table_type: TableType::Disk,
			name: "ORDERS".into(),
			first_user_trid: 1,
			current_column_set_id: 12,
			description: None,
		}
	}

	#[test]
	fn record_roundtrip() {
		let record = sample();
		let bytes = serialize_record(&record);
		let (decoded, consumed) = deserialize_record::<TableRecord>(&bytes).unwrap();
		assert_eq!(decoded, record);
		assert_eq!(consumed, bytes.len());
	}

	#[test]
	fn invalid_table_type_is_rejected() {
		let mut bytes = serialize_record(&sample());
		// type byte sits right after the envelope and the varint id
		let type_offset = 16 + 1 + 2;
		assert_eq!(bytes[type_offset], TableType::Disk as u8);
		bytes[type_offset] = 17;
		let err = deserialize_record::<TableRecord>(&bytes).unwrap_err();
		assert_eq!(err, DecodeError::field("TableRecord", "type", FieldError::InvalidTag(17)));
	}

	#[test]
	fn replace_updates_name_index() {
		let mut reg = TableRegistry::new();
		reg.insert(sample());
		let mut renamed = sample();
		renamed.name = "ORDERS_V2".into();
		reg.replace(renamed);
		assert!(!reg.contains_name("ORDERS"));
		assert_eq!(reg.get_by_name("ORDERS_V2").unwrap().id, 4097);
	}
}
