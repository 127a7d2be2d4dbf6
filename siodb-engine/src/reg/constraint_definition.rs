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
use xxhash_rust::xxh64::xxh64;

use crate::datatypes::ConstraintType;

/// Seed of the constraint definition hash.
const HASH_SEED: u64 = 0x3ff6_a09e_667f_3bcd;

/// Computes the xxHash64 of a constraint definition over its type and expression.
pub fn compute_constraint_definition_hash(constraint_type: ConstraintType, expression: &[u8]) -> u64 {
	let mut data = Vec::with_capacity(expression.len() + 1);
	data.push(constraint_type as u8);
	data.extend_from_slice(expression);
	xxh64(&data, HASH_SEED)
}

/// Constraint definition catalog record.
///
/// Definitions are shared across constraints with identical semantics and
/// de-duplicated by `(type, expression)`, indexed by hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstraintDefinitionRecord {
	/// Constraint definition id; system-range ids are reserved.
	pub id: u64,
	/// Constraint type.
	pub constraint_type: ConstraintType,
	/// Serialized constraint expression.
	pub expression: Vec<u8>,
	/// xxHash64 of `(type, expression)`.
	pub hash: u64,
}

impl ConstraintDefinitionRecord {
	/// New record with its hash computed.
	pub fn new(id: u64, constraint_type: ConstraintType, expression: Vec<u8>) -> Self {
		let hash = compute_constraint_definition_hash(constraint_type, &expression);
		ConstraintDefinitionRecord { id, constraint_type, expression, hash }
	}

	/// Returns true when `other` carries the same `(type, expression)`.
	pub fn is_equal_definition(&self, constraint_type: ConstraintType, expression: &[u8]) -> bool {
		self.constraint_type == constraint_type && self.expression == expression
	}
}

impl Record for ConstraintDefinitionRecord {
	const CLASS_NAME: &'static str = "ConstraintDefinitionRecord";
	const CLASS_UUID: Uuid = uuid!("7c8d9e0f-1a2b-4c3d-9e5f-6a7b8c9d0e09");
	const CLASS_VERSION: u32 = 0;

	fn serialize_body(&self, w: &mut RecordWriter) {
		w.write_varint(self.id);
		w.write_u8(self.constraint_type as u8);
		w.write_bytes(&self.expression);
	}

	fn deserialize_body(r: &mut RecordReader) -> Result<Self, DecodeError> {
		let id = r.read_varint("id")?;
		let raw_type = r.read_u8("type")?;
		let constraint_type = ConstraintType::from_u8(raw_type)
			.ok_or_else(|| DecodeError::field(Self::CLASS_NAME, "type", FieldError::InvalidTag(raw_type)))?;
		let expression = r.read_bytes("expression")?;
		Ok(ConstraintDefinitionRecord::new(id, constraint_type, expression))
	}
}

/// Registry of a database's constraint definitions, keyed by id and by hash.
#[derive(Default)]
pub struct ConstraintDefinitionRegistry {
	by_id: BTreeMap<u64, ConstraintDefinitionRecord>,
	by_hash: HashMap<u64, BTreeSet<u64>>,
}

impl ConstraintDefinitionRegistry {
	/// New empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a record. A duplicate id is a bug.
	pub fn insert(&mut self, record: ConstraintDefinitionRecord) {
		assert!(!self.by_id.contains_key(&record.id), "duplicate constraint definition id {}", record.id);
		self.by_hash.entry(record.hash).or_default().insert(record.id);
		self.by_id.insert(record.id, record);
	}

	/// Looks up a record by id.
	pub fn get_by_id(&self, id: u64) -> Option<&ConstraintDefinitionRecord> {
		self.by_id.get(&id)
	}

	/// Finds a definition equal to `(type, expression)`, resolving hash collisions.
	pub fn find_equal_definition(
		&self,
		constraint_type: ConstraintType,
		expression: &[u8],
	) -> Option<&ConstraintDefinitionRecord> {
		let hash = compute_constraint_definition_hash(constraint_type, expression);
		self.by_hash.get(&hash)?.iter().find_map(|id| {
			self.by_id.get(id).filter(|record| record.is_equal_definition(constraint_type, expression))
		})
	}

	/// Erases a record by id. Returns the erased record.
	pub fn erase(&mut self, id: u64) -> Option<ConstraintDefinitionRecord> {
		let record = self.by_id.remove(&id)?;
		if let Some(ids) = self.by_hash.get_mut(&record.hash) {
			ids.remove(&id);
			if ids.is_empty() {
				self.by_hash.remove(&record.hash);
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
	pub fn iter(&self) -> impl Iterator<Item = &ConstraintDefinitionRecord> {
		self.by_id.values()
	}

	/// Highest recorded definition id, zero when empty.
	pub fn max_id(&self) -> u64 {
		self.by_id.keys().next_back().copied().unwrap_or(0)
	}

	/// Swaps contents with another registry.
	pub fn swap(&mut self, other: &mut ConstraintDefinitionRegistry) {
		std::mem::swap(self, other);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use siodb_codec::{deserialize_record, serialize_record};

	#[test]
	fn record_roundtrip_recomputes_hash() {
		let record = ConstraintDefinitionRecord::new(1, ConstraintType::NotNull, vec![1]);
		let bytes = serialize_record(&record);
		let (decoded, consumed) = deserialize_record::<ConstraintDefinitionRecord>(&bytes).unwrap();
		assert_eq!(decoded, record);
		assert_eq!(decoded.hash, record.hash);
		assert_eq!(consumed, bytes.len());
	}

	#[test]
	fn hash_depends_on_type_and_expression() {
		let not_null = compute_constraint_definition_hash(ConstraintType::NotNull, &[1]);
		let default_value = compute_constraint_definition_hash(ConstraintType::DefaultValue, &[1]);
		let other_expr = compute_constraint_definition_hash(ConstraintType::NotNull, &[2]);
		assert_ne!(not_null, default_value);
		assert_ne!(not_null, other_expr);
	}

	#[test]
	fn deduplication_lookup() {
		let mut reg = ConstraintDefinitionRegistry::new();
		reg.insert(ConstraintDefinitionRecord::new(1, ConstraintType::NotNull, vec![1]));
		reg.insert(ConstraintDefinitionRecord::new(4097, ConstraintType::DefaultValue, vec![0, 5]));

		let found = reg.find_equal_definition(ConstraintType::NotNull, &[1]).unwrap();
		assert_eq!(found.id, 1);
		assert!(reg.find_equal_definition(ConstraintType::NotNull, &[9]).is_none());

		reg.erase(1);
		assert!(reg.find_equal_definition(ConstraintType::NotNull, &[1]).is_none());
	}
}
