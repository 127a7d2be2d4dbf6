// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::{BTreeMap, BTreeSet};

use siodb_codec::{DecodeError, Record, RecordReader, RecordWriter};
use uuid::{uuid, Uuid};

use super::{read_nested_records, write_nested_records};

/// Membership of one column in a column set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSetColumnRecord {
	/// Column set column id, unique within the database.
	pub id: u64,
	/// Id of the owning column set.
	pub column_set_id: u64,
	/// Id of the member column.
	pub column_id: u64,
	/// Id of the column definition in effect for this membership.
	pub column_definition_id: u64,
}

impl Record for ColumnSetColumnRecord {
	const CLASS_NAME: &'static str = "ColumnSetColumnRecord";
	const CLASS_UUID: Uuid = uuid!("8d2b1f60-7c4a-49ee-b3a9-1f5e6d7c8904");
	const CLASS_VERSION: u32 = 0;

	fn serialize_body(&self, w: &mut RecordWriter) {
		w.write_varint(self.id);
		w.write_varint(self.column_set_id);
		w.write_varint(self.column_id);
		w.write_varint(self.column_definition_id);
	}

	fn deserialize_body(r: &mut RecordReader) -> Result<Self, DecodeError> {
		Ok(ColumnSetColumnRecord {
			id: r.read_varint("id")?,
			column_set_id: r.read_varint("columnSetId")?,
			column_id: r.read_varint("columnId")?,
			column_definition_id: r.read_varint("columnDefinitionId")?,
		})
	}
}

/// Ordered membership of a column set, keyed by column set column id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColumnSetColumnRegistry {
	by_id: BTreeMap<u64, ColumnSetColumnRecord>,
}

impl ColumnSetColumnRegistry {
	/// New empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a record. A duplicate id is a bug.
	pub fn insert(&mut self, record: ColumnSetColumnRecord) {
		assert!(!self.by_id.contains_key(&record.id), "duplicate column set column id {}", record.id);
		self.by_id.insert(record.id, record);
	}

	/// Looks up a record by id.
	pub fn get_by_id(&self, id: u64) -> Option<&ColumnSetColumnRecord> {
		self.by_id.get(&id)
	}

	/// Number of member columns.
	pub fn len(&self) -> usize {
		self.by_id.len()
	}

	/// Returns true when the set has no members.
	pub fn is_empty(&self) -> bool {
		self.by_id.is_empty()
	}

	/// Iterates members in id order, which is the column order of the set.
	pub fn iter(&self) -> impl Iterator<Item = &ColumnSetColumnRecord> {
		self.by_id.values()
	}

	/// Highest member id, zero when empty.
	pub fn max_id(&self) -> u64 {
		self.by_id.keys().next_back().copied().unwrap_or(0)
	}
}

/// Column set catalog record with its nested membership.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSetRecord {
	/// Column set id, unique within the database.
	pub id: u64,
	/// Id of the owning table.
	pub table_id: u32,
	/// Ordered membership.
	pub columns: ColumnSetColumnRegistry,
}

impl Record for ColumnSetRecord {
	const CLASS_NAME: &'static str = "ColumnSetRecord";
	const CLASS_UUID: Uuid = uuid!("0c7a3de5-5b19-4c81-9f5e-6a2d4e8b9c03");
	const CLASS_VERSION: u32 = 0;

	fn serialize_body(&self, w: &mut RecordWriter) {
		w.write_varint(self.id);
		w.write_varint(self.table_id as u64);
		write_nested_records(w, self.columns.len(), self.columns.iter());
	}

	fn deserialize_body(r: &mut RecordReader) -> Result<Self, DecodeError> {
		let id = r.read_varint("id")?;
		let table_id = r.read_varint_u32("tableId")?;
		let mut columns = ColumnSetColumnRegistry::new();
		for record in read_nested_records::<ColumnSetColumnRecord>(r, "columns")? {
			columns.insert(record);
		}
		Ok(ColumnSetRecord { id, table_id, columns })
	}
}

/// Registry of a database's column sets, keyed by id and by owning table.
#[derive(Default)]
pub struct ColumnSetRegistry {
	by_id: BTreeMap<u64, ColumnSetRecord>,
	by_table_id: BTreeMap<u32, BTreeSet<u64>>,
}

impl ColumnSetRegistry {
	/// New empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a record. A duplicate id is a bug.
	pub fn insert(&mut self, record: ColumnSetRecord) {
		assert!(!self.by_id.contains_key(&record.id), "duplicate column set id {}", record.id);
		self.by_table_id.entry(record.table_id).or_default().insert(record.id);
		self.by_id.insert(record.id, record);
	}

	/// Looks up a record by id.
	pub fn get_by_id(&self, id: u64) -> Option<&ColumnSetRecord> {
		self.by_id.get(&id)
	}

	/// Ids of column sets of a table, in id order.
	pub fn ids_of_table(&self, table_id: u32) -> Vec<u64> {
		self.by_table_id.get(&table_id).map(|ids| ids.iter().copied().collect()).unwrap_or_default()
	}

	/// Erases a record by id. Returns the erased record.
	pub fn erase(&mut self, id: u64) -> Option<ColumnSetRecord> {
		let record = self.by_id.remove(&id)?;
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
	pub fn iter(&self) -> impl Iterator<Item = &ColumnSetRecord> {
		self.by_id.values()
	}

	/// Highest recorded column set id, zero when empty.
	pub fn max_id(&self) -> u64 {
		self.by_id.keys().next_back().copied().unwrap_or(0)
	}

	/// Highest member id across all column sets, zero when empty.
	pub fn max_member_id(&self) -> u64 {
		self.by_id.values().map(|cs| cs.columns.max_id()).max().unwrap_or(0)
	}

	/// Swaps contents with another registry.
	pub fn swap(&mut self, other: &mut ColumnSetRegistry) {
		std::mem::swap(self, other);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use siodb_codec::{deserialize_record, serialize_record};

	fn sample() -> ColumnSetRecord {
		let mut columns = ColumnSetColumnRegistry::new();
		columns.insert(ColumnSetColumnRecord { id: 10, column_set_id: 3, column_id: 1, column_definition_id: 100 });
		columns.insert(ColumnSetColumnRecord { id: 11, column_set_id: 3, column_id: 2, column_definition_id: 101 });
		ColumnSetRecord { id: 3, table_id: 4097, columns }
	}

	#[test]
	fn record_roundtrip_with_nested_members() {
		let record = sample();
		let bytes = serialize_record(&record);
		let (decoded, consumed) = deserialize_record::<ColumnSetRecord>(&bytes).unwrap();
		assert_eq!(decoded, record);
		assert_eq!(consumed, bytes.len());
	}

	#[test]
	fn members_iterate_in_column_order()	{
		let record = sample();
		let ids: Vec<u64> = record.columns.iter().map(|c| c.id).collect();
		assert_eq!(ids, vec![10, 11]);
	}

	#[test]
	fn by_table_index() {
		let mut reg = ColumnSetRegistry::new();
		reg.insert(sample());
		assert_eq!(reg.ids_of_table(4097), vec![3]);
		assert_eq!(reg.max_member_id(), 11);
		reg.erase(3);
		assert!(reg.ids_of_table(4097).is_empty());
	}
}
