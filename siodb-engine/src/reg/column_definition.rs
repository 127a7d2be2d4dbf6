// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::BTreeMap;

use siodb_codec::{DecodeError, Record, RecordReader, RecordWriter};
use uuid::{uuid, Uuid};

use super::{read_nested_records, write_nested_records};

/// Link between a column definition and one of its constraints.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnDefinitionConstraintRecord {
	/// Link id, unique within the database.
	pub id: u64,
	/// Id of the owning column definition.
	pub column_definition_id: u64,
	/// Id of the linked constraint.
	pub constraint_id: u64,
}

impl Record for ColumnDefinitionConstraintRecord {
	const CLASS_NAME: &'static str = "ColumnDefinitionConstraintRecord";
	const CLASS_UUID: Uuid = uuid!("e5d4c3b2-a190-4878-9695-84a3b2c1d007");
	const CLASS_VERSION: u32 = 0;

	fn serialize_body(&self, w: &mut RecordWriter) {
		w.write_varint(self.id);
		w.write_varint(self.column_definition_id);
		w.write_varint(self.constraint_id);
	}

	fn deserialize_body(r: &mut RecordReader) -> Result<Self, DecodeError> {
		Ok(ColumnDefinitionConstraintRecord {
			id: r.read_varint("id")?,
			column_definition_id: r.read_varint("columnDefinitionId")?,
			constraint_id: r.read_varint("constraintId")?,
		})
	}
}

/// Constraint links of one column definition, keyed by link id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColumnDefinitionConstraintRegistry {
	by_id: BTreeMap<u64, ColumnDefinitionConstraintRecord>,
}

impl ColumnDefinitionConstraintRegistry {
	/// New empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a record. A duplicate id is a bug.
	pub fn insert(&mut self, record: ColumnDefinitionConstraintRecord) {
		assert!(!self.by_id.contains_key(&record.id), "duplicate column definition constraint id {}", record.id);
		self.by_id.insert(record.id, record);
	}

	/// Number of links.
	pub fn len(&self) -> usize {
		self.by_id.len()
	}

	/// Returns true when there are no links.
	pub fn is_empty(&self) -> bool {
		self.by_id.is_empty()
	}

	/// Iterates links in id order.
	pub fn iter(&self) -> impl Iterator<Item = &ColumnDefinitionConstraintRecord> {
		self.by_id.values()
	}

	/// Highest link id, zero when empty.
	pub fn max_id(&self) -> u64 {
		self.by_id.keys().next_back().copied().unwrap_or(0)
	}
}

/// Column definition catalog record.
///
/// Columns evolve through successive definitions when their constraints change;
/// the definition in effect is referenced from the current column set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnDefinitionRecord {
	/// Column definition id, unique within the database.
	pub id: u64,
	/// Id of the owning column.
	pub column_id: u64,
	/// Constraint links of this definition.
	pub constraints: ColumnDefinitionConstraintRegistry,
}

impl Record for ColumnDefinitionRecord {
	const CLASS_NAME: &'static str = "ColumnDefinitionRecord";
	const CLASS_UUID: Uuid = uuid!("6a1b9c83-2d4e-4f56-a708-b9c0d1e2f306");
	const CLASS_VERSION: u32 = 0;

	fn serialize_body(&self, w: &mut RecordWriter) {
		w.write_varint(self.id);
		w.write_varint(self.column_id);
		write_nested_records(w, self.constraints.len(), self.constraints.iter());
	}

	fn deserialize_body(r: &mut RecordReader) -> Result<Self, DecodeError> {
		let id = r.read_varint("id")?;
		let column_id = r.read_varint("columnId")?;
		let mut constraints = ColumnDefinitionConstraintRegistry::new();
		for record in read_nested_records::<ColumnDefinitionConstraintRecord>(r, "constraints")? {
			constraints.insert(record);
		}
		Ok(ColumnDefinitionRecord { id, column_id, constraints })
	}
}

/// Registry of a database's column definitions, keyed by id and ordered by
/// `(column id, id)` for per-column range scans.
#[derive(Default)]
pub struct ColumnDefinitionRegistry {
	by_id: BTreeMap<u64, ColumnDefinitionRecord>,
	by_column_and_id: BTreeMap<(u64, u64), ()>,
}

impl ColumnDefinitionRegistry {
	/// New empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a record. A duplicate id is a bug.
	pub fn insert(&mut self, record: ColumnDefinitionRecord) {
		assert!(!self.by_id.contains_key(&record.id), "duplicate column definition id {}", record.id);
		self.by_column_and_id.insert((record.column_id, record.id), ());
		self.by_id.insert(record.id, record);
	}

	/// Looks up a record by id.
	pub fn get_by_id(&self, id: u64) -> Option<&ColumnDefinitionRecord> {
		self.by_id.get(&id)
	}

	/// Ids of definitions of a column, in id order.
	pub fn ids_of_column(&self, column_id: u64) -> Vec<u64> {
		self.by_column_and_id
			.range((column_id, 0)..(column_id + 1, 0))
			.map(|((_, id), _)| *id)
			.collect()
	}

	/// Replaces the record with the same id, keeping the indices in step.
	pub fn replace(&mut self, record: ColumnDefinitionRecord) {
		self.erase(record.id);
		self.insert(record);
	}

	/// Erases a record by id. Returns the erased record.
	pub fn erase(&mut self, id: u64) -> Option<ColumnDefinitionRecord> {
		let record = self.by_id.remove(&id)?;
		self.by_column_and_id.remove(&(record.column_id, id));
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
	pub fn iter(&self) -> impl Iterator<Item = &ColumnDefinitionRecord> {
		self.by_id.values()
	}

	/// Highest recorded definition id, zero when empty.
	pub fn max_id(&self) -> u64 {
		self.by_id.keys().next_back().copied().unwrap_or(0)
	}

	/// Highest link id across all definitions, zero when empty.
	pub fn max_link_id(&self) -> u64 {
		self.by_id.values().map(|d| d.constraints.max_id()).max().unwrap_or(0)
	}

	/// Swaps contents with another registry.
	pub fn swap(&mut self, other: &mut ColumnDefinitionRegistry) {
		std::mem::swap(self, other);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use siodb_codec::{deserialize_record, serialize_record};

	fn sample(id: u64, column_id: u64) -> ColumnDefinitionRecord {
		let mut constraints = ColumnDefinitionConstraintRegistry::new();
		constraints.insert(ColumnDefinitionConstraintRecord { id: id * 10, column_definition_id: id, constraint_id: 77 });
		ColumnDefinitionRecord { id, column_id, constraints }
	}

	#[test]
	fn record_roundtrip() {
		let record = sample(5, 2);
		let bytes = serialize_record(&record);
		let (decoded, consumed) = deserialize_record::<ColumnDefinitionRecord>(&bytes).unwrap();
		assert_eq!(decoded, record);
		assert_eq!(consumed, bytes.len());
	}

	#[test]
	fn per_column_range_scan() {
		let mut reg = ColumnDefinitionRegistry::new();
		reg.insert(sample(1, 7));
		reg.insert(sample(2, 7));
		reg.insert(sample(3, 8));
		assert_eq!(reg.ids_of_column(7), vec![1, 2]);
		assert_eq!(reg.ids_of_column(8), vec![3]);
		assert!(reg.ids_of_column(9).is_empty());
		reg.erase(2);
		assert_eq!(reg.ids_of_column(7), vec![1]);
	}
}
