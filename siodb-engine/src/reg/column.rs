// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use siodb_codec::{DecodeError, FieldError, Record, RecordReader, RecordWriter};
use uuid::{uuid, Uuid};

use crate::datatypes::{ColumnDataType, ColumnState};

/// Column catalog record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnRecord {
	/// Column id, unique within the database.
	pub id: u64,
	/// Column name, unique within the owning table.
	pub name: String,
	/// Column data type.
	pub data_type: ColumnDataType,
	/// Id of the owning table.
	pub table_id: u32,
	/// Column lifecycle state.
	pub state: ColumnState,
	/// Data area size of this column's blocks.
	pub data_block_data_area_size: u32,
	/// Optional description.
	pub description: Option<String>,
}

impl Record for ColumnRecord {
	const CLASS_NAME: &'static str = "ColumnRecord";
	const CLASS_UUID: Uuid = uuid!("3f8e2a17-9b5c-4d20-8e6f-2a3b4c5d6e05");
	const CLASS_VERSION: u32 = 0;

	fn serialize_body(&self, w: &mut RecordWriter) {
		w.write_varint(self.id);
		w.write_str(&self.name);
		w.write_u8(self.data_type as u8);
		w.write_varint(self.table_id as u64);
		w.write_u8(self.state as u8);
		w.write_varint(self.data_block_data_area_size as u64);
		w.write_opt_str(self.description.as_deref());
	}

	fn deserialize_body(r: &mut RecordReader) -> Result<Self, DecodeError> {
		let id = r.read_varint("id")?;
		let name = r.read_str("name")?;
		let raw_data_type = r.read_u8("dataType")?;
		let data_type = ColumnDataType::from_u8(raw_data_type)
			.ok_or_else(|| DecodeError::field(Self::CLASS_NAME, "dataType", FieldError::InvalidTag(raw_data_type)))?;
		let table_id = r.read_varint_u32("tableId")?;
		let raw_state = r.read_u8("state")?;
		let state = ColumnState::from_u8(raw_state)
			.ok_or_else(|| DecodeError::field(Self::CLASS_NAME, "state", FieldError::InvalidTag(raw_state)))?;
		Ok(ColumnRecord {
			id,
			name,
			data_type,
			table_id,
			state,
			data_block_data_area_size: r.read_varint_u32("dataBlockDataAreaSize")?,
			description: r.read_opt_str("description")?,
		})
	}
}

/// Registry of a database's columns, keyed by id, by table and by `(table, name)`.
#[derive(Default)]
pub struct ColumnRegistry {
	by_id: BTreeMap<u64, ColumnRecord>,
	by_table_id: BTreeMap<u32, BTreeSet<u64>>,
	id_by_table_and_name: HashMap<(u32, String), u64>,
}

impl ColumnRegistry {
	/// New empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a record. A duplicate id or `(table, name)` pair is a bug.
	pub fn insert(&mut self, record: ColumnRecord) {
		assert!(!self.by_id.contains_key(&record.id), "duplicate column id {}", record.id);
		let name_key = (record.table_id, record.name.clone());
		assert!(
			!self.id_by_table_and_name.contains_key(&name_key),
			"duplicate column name '{}' in table {}",
			record.name,
			record.table_id
		);
		self.by_table_id.entry(record.table_id).or_default().insert(record.id);
		self.id_by_table_and_name.insert(name_key, record.id);
		self.by_id.insert(record.id, record);
	}

	/// Looks up a record by id.
	pub fn get_by_id(&self, id: u64) -> Option<&ColumnRecord> {
		self.by_id.get(&id)
	}

	/// Looks up a record by owning table and name.
	pub fn get_by_table_and_name(&self, table_id: u32, name: &str) -> Option<&ColumnRecord> {
		self.id_by_table_and_name.get(&(table_id, name.to_owned())).and_then(|id| self.by_id.get(id))
	}

	/// Ids of columns of a table, in id order.
	pub fn ids_of_table(&self, table_id: u32) -> Vec<u64> {
		self.by_table_id.get(&table_id).map(|ids| ids.iter().copied().collect()).unwrap_or_default()
	}

	/// Replaces the record with the same id, keeping the indices in step.
	pub fn replace(&mut self, record: ColumnRecord) {
		self.erase(record.id);
		self.insert(record);
	}

	/// Erases a record by id. Returns the erased record.
	pub fn erase(&mut self, id: u64) -> Option<ColumnRecord> {
		let record = self.by_id.remove(&id)?;
		if let Some(ids) = self.by_table_id.get_mut(&record.table_id) {
			ids.remove(&id);
			if ids.is_empty() {
				self.by_table_id.remove(&record.table_id);
			}
		}
		self.id_by_table_and_name.remove(&(record.table_id, record.name.clone()));
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
	pub fn iter(&self) -> impl Iterator<Item = &ColumnRecord> {
		self.by_id.values()
	}

	/// Highest recorded column id, zero when empty.
	pub fn max_id(&self) -> u64 {
		self.by_id.keys().next_back().copied().unwrap_or(0)
	}

	/// Swaps contents with another registry.
	pub fn swap(&mut self, other: &mut ColumnRegistry) {
		std::mem::swap(self, other);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use siodb_codec::{deserialize_record, serialize_record};

	fn sample(id: u64, name: &str) -> ColumnRecord {
		ColumnRecord {
			id,
			name: name.into(),
			data_type: ColumnDataType::Text,
			table_id: 4097,
			state: ColumnState::Active,
			data_block_data_area_size: 128 * 1024,
			description: None,
		}
	}

	#[test]
	fn record_roundtrip() {
		let record = sample(5, "NAME");
		let bytes = serialize_record(&record);
		let (decoded, consumed) = deserialize_record::<ColumnRecord>(&bytes).unwrap();
		assert_eq!(decoded, record);
		assert_eq!(consumed, bytes.len());
	}

	#[test]
	fn table_scoped_lookups() {
		let mut reg = ColumnRegistry::new();
		reg.insert(sample(1, "TRID"));
		reg.insert(sample(2, "NAME"));
		let mut other_table = sample(3, "TRID");
		other_table.table_id = 4098;
		reg.insert(other_table);

		assert_eq!(reg.ids_of_table(4097), vec![1, 2]);
		assert_eq!(reg.ids_of_table(4098), vec![3]);
		assert_eq!(reg.get_by_table_and_name(4097, "NAME").unwrap().id, 2);
		assert!(reg.get_by_table_and_name(4098, "NAME").is_none());

		reg.erase(2);
		assert_eq!(reg.ids_of_table(4097), vec![1]);
		assert!(reg.get_by_table_and_name(4097, "NAME").is_none());
	}
}
