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

use crate::datatypes::ConstraintState;

/// Constraint catalog record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstraintRecord {
	/// Constraint id, unique within the database.
	pub id: u64,
	/// Constraint name, unique within the database.
	pub name: String,
	/// Constraint lifecycle state.
	pub state: ConstraintState,
	/// Id of the owning table.
	pub table_id: u32,
	/// Id of the owning column, zero for table-level constraints.
	pub column_id: u64,
	/// Id of the shared constraint definition.
	pub constraint_definition_id: u64,
	/// Optional description.
	pub description: Option<String>,
}

impl Record for ConstraintRecord {
	const CLASS_NAME: &'static str = "ConstraintRecord";
	const CLASS_UUID: Uuid = uuid!("1f2e3d4c-5b6a-4798-8897-96a5b4c3d208");
	const CLASS_VERSION: u32 = 0;

	fn serialize_body(&self, w: &mut RecordWriter) {
		w.write_varint(self.id);
		w.write_str(&self.name);
		w.write_u8(self.state as u8);
		w.write_varint(self.table_id as u64);
		w.write_varint(self.column_id);
		w.write_varint(self.constraint_definition_id);
		w.write_opt_str(self.description.as_deref());
	}

	fn deserialize_body(r: &mut RecordReader) -> Result<Self, DecodeError> {
		let id = r.read_varint("id")?;
		let name = r.read_str("name")?;
		let raw_state = r.read_u8("state")?;
		let state = ConstraintState::from_u8(raw_state)
			.ok_or_else(|| DecodeError::field(Self::CLASS_NAME, "state", FieldError::InvalidTag(raw_state)))?;
		Ok(ConstraintRecord {
			id,
			name,
			state,
			table_id: r.read_varint_u32("tableId")?,
			column_id: r.read_varint("columnId")?,
			constraint_definition_id: r.read_varint("constraintDefinitionId")?,
			description: r.read_opt_str("description")?,
		})
	}
}

/// Registry of a database's constraints, keyed by id, by name, by owning table
/// and by constraint definition.
#[derive(Default)]
pub struct ConstraintRegistry {
	by_id: BTreeMap<u64, ConstraintRecord>,
	id_by_name: HashMap<String, u64>,
	by_table_id: BTreeMap<u32, BTreeSet<u64>>,
	by_constraint_definition_id: BTreeMap<u64, BTreeSet<u64>>,
}

impl ConstraintRegistry {
	/// New empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a record. Duplicate ids or names are a bug.
	pub fn insert(&mut self, record: ConstraintRecord) {
		assert!(!self.by_id.contains_key(&record.id), "duplicate constraint id {}", record.id);
		assert!(!self.id_by_name.contains_key(&record.name), "duplicate constraint name '{}'", record.name);
		self.id_by_name.insert(record.name.clone(), record.id);
		self.by_table_id.entry(record.table_id).or_default().insert(record.id);
		self.by_constraint_definition_id.entry(record.constraint_definition_id).or_default().insert(record.id);
		self.by_id.insert(record.id, record);
	}

	/// Looks up a record by id.
	pub fn get_by_id(&self, id: u64) -> Option<&ConstraintRecord> {
		self.by_id.get(&id)
	}

	/// Looks up a record by name.
	pub fn get_by_name(&self, name: &str) -> Option<&ConstraintRecord> {
		self.id_by_name.get(name).and_then(|id| self.by_id.get(id))
	}

	/// Returns true when a constraint with this name exists.
	pub fn contains_name(&self, name: &str) -> bool {
		self.id_by_name.contains_key(name)
	}

	/// Ids of constraints of a table, in id order.
	pub fn ids_of_table(&self, table_id: u32) -> Vec<u64> {
		self.by_table_id.get(&table_id).map(|ids| ids.iter().copied().collect()).unwrap_or_default()
	}

	/// Ids of constraints referencing a constraint definition, in id order.
	pub fn ids_of_constraint_definition(&self, constraint_definition_id: u64) -> BTreeSet<u64> {
		self.by_constraint_definition_id.get(&constraint_definition_id).cloned().unwrap_or_default()
	}

	/// Erases a record by id. Returns the erased record.
	pub fn erase(&mut self, id: u64) -> Option<ConstraintRecord> {
		let record = self.by_id.remove(&id)?;
		self.id_by_name.remove(&record.name);
		if let Some(ids) = self.by_table_id.get_mut(&record.table_id) {
			ids.remove(&id);
			if ids.is_empty() {
				self.by_table_id.remove(&record.table_id);
			}
		}
		if let Some(ids) = self.by_constraint_definition_id.get_mut(&record.constraint_definition_id) {
			ids.remove(&id);
			if ids.is_empty() {
				self.by_constraint_definition_id.remove(&record.constraint_definition_id);
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
	pub fn iter(&self) -> impl Iterator<Item = &ConstraintRecord> {
		self.by_id.values()
	}

	/// Highest recorded constraint id, zero when empty.
	pub fn max_id(&self) -> u64 {
		self.by_id.keys().next_back().copied().unwrap_or(0)
	}

	/// Swaps contents with another registry.
	pub fn swap(&mut self, other: &mut ConstraintRegistry) {
		std::mem::swap(self, other);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use siodb_codec::{deserialize_record, serialize_record};

	fn sample(id: u64, name: &str, definition: u64) -> ConstraintRecord {
		ConstraintRecord {
			id,
			name: name.into(),
			state: ConstraintState::Active,
			table_id: 4097,
			column_id: 5,
			constraint_definition_id: definition,
			description: None,
		}
	}

	#[test]
	fn record_roundtrip() {
		let record = sample(9, "NN_ORDERS_NAME", 1);
		let bytes = serialize_record(&record);
		let (decoded, consumed) = deserialize_record::<ConstraintRecord>(&bytes).unwrap();
		assert_eq!(decoded, record);
		assert_eq!(consumed, bytes.len());
	}

	#[test]
	fn definition_index_tracks_references() {
		let mut reg = ConstraintRegistry::new();
		reg.insert(sample(1, "NN_A", 1));
		reg.insert(sample(2, "NN_B", 1));
		reg.insert(sample(3, "DF_C", 4097));

		let refs: Vec<u64> = reg.ids_of_constraint_definition(1).into_iter().collect();
		assert_eq!(refs, vec![1, 2]);

		reg.erase(1);
		let refs: Vec<u64> = reg.ids_of_constraint_definition(1).into_iter().collect();
		assert_eq!(refs, vec![2]);
		assert!(!reg.contains_name("NN_A"));
	}
}
