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

use super::{read_nested_records, write_nested_records};
use crate::datatypes::IndexType;

/// One indexed column of an index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexColumnRecord {
	/// Index column id, unique within the database.
	pub id: u64,
	/// Id of the owning index.
	pub index_id: u64,
	/// Id of the indexed column definition.
	pub column_definition_id: u64,
	/// Descending sort order flag.
	pub descending: bool,
}

impl Record for IndexColumnRecord {
	const CLASS_NAME: &'static str = "IndexColumnRecord";
	const CLASS_UUID: Uuid = uuid!("d9c8b7a6-f5e4-4d3c-8b2a-19087f6e5d0b");
	const CLASS_VERSION: u32 = 0;

	fn serialize_body(&self, w: &mut RecordWriter) {
		w.write_varint(self.id);
		w.write_varint(self.index_id);
		w.write_varint(self.column_definition_id);
		w.write_bool(self.descending);
	}

	fn deserialize_body(r: &mut RecordReader) -> Result<Self, DecodeError> {
		Ok(IndexColumnRecord {
			id: r.read_varint("id")?,
			index_id: r.read_varint("indexId")?,
			column_definition_id: r.read_varint("columnDefinitionId")?,
			descending: r.read_bool("descending")?,
		})
	}
}

/// Ordered column list of one index, keyed by index column id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexColumnRegistry {
	by_id: BTreeMap<u64, IndexColumnRecord>,
}

impl IndexColumnRegistry {
	/// New empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a record. A duplicate id is a bug.
	pub fn insert(&mut self, record: IndexColumnRecord) {
		assert!(!self.by_id.contains_key(&record.id), "duplicate index column id {}", record.id);
		self.by_id.insert(record.id, record);
	}

	/// Number of indexed columns.
	pub fn len(&self) -> usize {
		self.by_id.len()
	}

	/// Returns true when there are no indexed columns.
	pub fn is_empty(&self) -> bool {
		self.by_id.is_empty()
	}

	/// Iterates indexed columns in id order.
	pub fn iter(&self) -> impl Iterator<Item = &IndexColumnRecord> {
		self.by_id.values()
	}

	/// Highest indexed column id, zero when empty.
	pub fn max_id(&self) -> u64 {
		self.by_id.keys().next_back().copied().unwrap_or(0)
	}
}

/// Index catalog record with its nested column list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexRecord {
	/// Index id, unique within the database.
	pub id: u64,
	/// Index type.
	pub index_type: IndexType,
	/// Uniqueness flag.
	pub unique: bool,
	/// Index name, unique within the database.
	pub name: String,
	/// Id of the owning table.
	pub table_id: u32,
	/// Size of the index data file.
	pub data_file_size: u32,
	/// Indexed columns, ordered.
	pub columns: IndexColumnRegistry,
	/// Optional description.
	pub description: Option<String>,
}

impl Record for IndexRecord {
	const CLASS_NAME: &'static str = "IndexRecord";
	const CLASS_UUID: Uuid = uuid!("b0a1c2d3-e4f5-4061-8273-8495a6b7c80a");
	const CLASS_VERSION: u32 = 0;

	fn serialize_body(&self, w: &mut RecordWriter) {
		w.write_varint(self.id);
		w.write_u8(self.index_type as u8);
		w.write_bool(self.unique);
		w.write_str(&self.name);
		w.write_varint(self.table_id as u64);
		w.write_varint(self.data_file_size as u64);
		write_nested_records(w, self.columns.len(), self.columns.iter());
		w.write_opt_str(self.description.as_deref());
	}

	fn deserialize_body(r: &mut RecordReader) -> Result<Self, DecodeError> {
		let id = r.read_varint("id")?;
		let raw_type = r.read_u8("type")?;
		let index_type = IndexType::from_u8(raw_type)
			.ok_or_else(|| DecodeError::field(Self::CLASS_NAME, "type", FieldError::InvalidTag(raw_type)))?;
		let unique = r.read_bool("unique")?;
		let name = r.read_str("name")?;
		let table_id = r.read_varint_u32("tableId")?;
		let data_file_size = r.read_varint_u32("dataFileSize")?;
		let mut columns = IndexColumnRegistry::new();
		for record in read_nested_records::<IndexColumnRecord>(r, "columns")? {
			columns.insert(record);
		}
		Ok(IndexRecord {
			id,
			index_type,
			unique,
			name,
			table_id,
			data_file_size,
			columns,
			description: r.read_opt_str("description")?,
		})
	}
}

/// Registry of a database's indices, keyed by id, by name and by owning table.
#[derive(Default)]
pub struct IndexRegistry {
	by_id: BTreeMap<u64, IndexRecord>,
	id_by_name: HashMap<String, u64>,
	by_table_id: BTreeMap<u32, BTreeSet<u64>>,
}

impl IndexRegistry {
	/// New empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a record. Duplicate ids or names are a bug.
	pub fn insert(&mut self, record: IndexRecord) {
		assert!(!self.by_id.contains_key(&record.id), "duplicate index id {}", record.id);
		assert!(!self.id_by_name.contains_key(&record.name), "duplicate index name '{}'", record.name);
		self.id_by_name.insert(record.name.clone(), record.id);
		self.by_table_id.entry(record.table_id).or_default().insert(record.id);
		self.by_id.insert(record.id, record);
	}

	/// Looks up a record by id.
	pub fn get_by_id(&self, id: u64) -> Option<&IndexRecord> {
		self.by_id.get(&id)
	}

	/// Looks up a record by name.
	pub fn get_by_name(&self, name: &str) -> Option<&IndexRecord> {
		self.id_by_name.get(name).and_then(|id| self.by_id.get(id))
	}

	/// Ids of indices of a table, in id order.
	pub fn ids_of_table(&self, table_id: u32) -> Vec<u64> {
		self.by_table_id.get(&table_id).map(|ids| ids.iter().copied().collect()).unwrap_or_default()
	}

	/// Erases a record by id. Returns the erased record.
	pub fn erase(&mut self, id: u64) -> Option<IndexRecord> {
		let record = self.by_id.remove(&id)?;
		self.id_by_name.remove(&record.name);
		if let Some(ids) = self.by_table_id.get_mut(&record.table_id) {
			ids.remove(&id);
			if ids.is_empty() {
				self.by_table_id.remove(&record.table_id);
			}
		}
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
	pub fn iter(&self) -> impl Iterator<Item = &IndexRecord> {
		self.by_id.values()
	}

	/// Highest recorded index id, zero when empty.
	pub fn max_id(&self) -> u64 {
		self.by_id.keys().next_back().copied().unwrap_or(0)
	}

	/// Highest indexed column id across all indices, zero when empty.
	pub fn max_index_column_id(&self) -> u64 {
		self.by_id.values().map(|i| i.columns.max_id()).max().unwrap_or(0)
	}

	/// Swaps contents with another registry.
	pub fn swap(&mut self, other: &mut IndexRegistry) {
		std::mem::swap(self, other);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use siodb_codec::{deserialize_record, serialize_record};

	fn sample() -> IndexRecord {
		let mut columns = IndexColumnRegistry::new();
		columns.insert(IndexColumnRecord { id: 21, index_id: 6, column_definition_id: 100, descending: false });
		IndexRecord {
			id: 6,
			index_type: IndexType::LinearIndexU64,
			unique: true,
			name: "MCI_ORDERS".into(),
			table_id: 4097,
			data_file_size: 8192,
			columns,
			description: None,
		}
	}

	#[test]
	fn record_roundtrip() {
		let record = sample();
		let bytes = serialize_record(&record);
		let (decoded, consumed) = deserialize_record::<IndexRecord>(&bytes).unwrap();
		assert_eq!(decoded, record);
		assert_eq!(consumed, bytes.len());
	}

	#[test]
	fn table_index_lookup() {
		let mut reg = IndexRegistry::new();
		reg.insert(sample());
		assert_eq!(reg.ids_of_table(4097), vec![6]);
		assert_eq!(reg.get_by_name("MCI_ORDERS").unwrap().id, 6);
		reg.erase(6);
		assert!(reg.ids_of_table(4097).is_empty());
	}
}
