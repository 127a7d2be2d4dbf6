// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::BTreeMap;

use siodb_codec::{DecodeError, FieldError, Record, RecordReader, RecordWriter};
use uuid::{uuid, Uuid};

use crate::datatypes::DatabaseObjectType;

/// User permission catalog record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserPermissionRecord {
	/// Permission record id, unique across the instance.
	pub id: u64,
	/// Id of the user holding the permission.
	pub user_id: u32,
	/// Id of the database the object belongs to.
	pub database_id: u32,
	/// Type of the object the permission applies to.
	pub object_type: DatabaseObjectType,
	/// Id of the object the permission applies to.
	pub object_id: u64,
	/// Granted permission bitmask.
	pub permissions: u64,
	/// GRANT OPTION bitmask.
	pub grant_options: u64,
}

impl Record for UserPermissionRecord {
	const CLASS_NAME: &'static str = "UserPermissionRecord";
	const CLASS_UUID: Uuid = uuid!("c3d4e5f6-a7b8-4910-8a1b-2c3d4e5f6a0f");
	const CLASS_VERSION: u32 = 0;

	fn serialize_body(&self, w: &mut RecordWriter) {
		w.write_varint(self.id);
		w.write_varint(self.user_id as u64);
		w.write_varint(self.database_id as u64);
		w.write_u8(self.object_type as u8);
		w.write_varint(self.object_id);
		w.write_varint(self.permissions);
		w.write_varint(self.grant_options);
	}

	fn deserialize_body(r: &mut RecordReader) -> Result<Self, DecodeError> {
		let id = r.read_varint("id")?;
		let user_id = r.read_varint_u32("userId")?;
		let database_id = r.read_varint_u32("databaseId")?;
		let raw_object_type = r.read_u8("objectType")?;
		let object_type = DatabaseObjectType::from_u8(raw_object_type)
			.ok_or_else(|| DecodeError::field(Self::CLASS_NAME, "objectType", FieldError::InvalidTag(raw_object_type)))?;
		Ok(UserPermissionRecord {
			id,
			user_id,
			database_id,
			object_type,
			object_id: r.read_varint("objectId")?,
			permissions: r.read_varint("permissions")?,
			grant_options: r.read_varint("grantOptions")?,
		})
	}
}

/// Permissions of one user, keyed by permission record id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserPermissionRegistry {
	by_id: BTreeMap<u64, UserPermissionRecord>,
}

impl UserPermissionRegistry {
	/// New empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a record. A duplicate id is a bug.
	pub fn insert(&mut self, record: UserPermissionRecord) {
		assert!(!self.by_id.contains_key(&record.id), "duplicate user permission id {}", record.id);
		self.by_id.insert(record.id, record);
	}

	/// Number of permission records.
	pub fn len(&self) -> usize {
		self.by_id.len()
	}

	/// Returns true when there are no permission records.
	pub fn is_empty(&self) -> bool {
		self.by_id.is_empty()
	}

	/// Iterates records in id order.
	pub fn iter(&self) -> impl Iterator<Item = &UserPermissionRecord> {
		self.by_id.values()
	}

	/// Swaps contents with another registry.
	pub fn swap(&mut self, other: &mut UserPermissionRegistry) {
		std::mem::swap(self, other);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::datatypes::permissions;
	use siodb_codec::{deserialize_record, serialize_record};

	#[test]
	fn record_roundtrip() {
		let record = UserPermissionRecord {
			id: 4,
			user_id: 2,
			database_id: 2,
			object_type: DatabaseObjectType::Table,
			object_id: 4097,
			permissions: permissions::SELECT | permissions::INSERT,
			grant_options: permissions::SELECT,
		};
		let bytes = serialize_record(&record);
		let (decoded, consumed) = deserialize_record::<UserPermissionRecord>(&bytes).unwrap();
		assert_eq!(decoded, record);
		assert_eq!(consumed, bytes.len());
	}
}
