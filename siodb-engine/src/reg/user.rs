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

use super::{read_nested_records, write_nested_records};

/// User access key catalog record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserAccessKeyRecord {
	/// Access key id, unique across the instance.
	pub id: u64,
	/// Id of the owning user.
	pub user_id: u32,
	/// Key name, unique within the user.
	pub name: String,
	/// Public key text.
	pub text: String,
	/// Active flag.
	pub active: bool,
	/// Optional description.
	pub description: Option<String>,
}

impl Record for UserAccessKeyRecord {
	const CLASS_NAME: &'static str = "UserAccessKeyRecord";
	const CLASS_UUID: Uuid = uuid!("a1b2c3d4-e5f6-4a58-9c0d-1e2f3a4b5c0d");
	const CLASS_VERSION: u32 = 0;

	fn serialize_body(&self, w: &mut RecordWriter) {
		w.write_varint(self.id);
		w.write_varint(self.user_id as u64);
		w.write_str(&self.name);
		w.write_str(&self.text);
		w.write_bool(self.active);
		w.write_opt_str(self.description.as_deref());
	}

	fn deserialize_body(r: &mut RecordReader) -> Result<Self, DecodeError> {
		Ok(UserAccessKeyRecord {
			id: r.read_varint("id")?,
			user_id: r.read_varint_u32("userId")?,
			name: r.read_str("name")?,
			text: r.read_str("text")?,
			active: r.read_bool("active")?,
			description: r.read_opt_str("description")?,
		})
	}
}

/// Access keys of one user, keyed by id and by name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserAccessKeyRegistry {
	by_id: BTreeMap<u64, UserAccessKeyRecord>,
	id_by_name: HashMap<String, u64>,
}

impl UserAccessKeyRegistry {
	/// New empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a record. Duplicate ids or names are a bug.
	pub fn insert(&mut self, record: UserAccessKeyRecord) {
		assert!(!self.by_id.contains_key(&record.id), "duplicate user access key id {}", record.id);
		assert!(!self.id_by_name.contains_key(&record.name), "duplicate user access key name '{}'", record.name);
		self.id_by_name.insert(record.name.clone(), record.id);
		self.by_id.insert(record.id, record);
	}

	/// Looks up a record by name.
	pub fn get_by_name(&self, name: &str) -> Option<&UserAccessKeyRecord> {
		self.id_by_name.get(name).and_then(|id| self.by_id.get(id))
	}

	/// Number of keys.
	pub fn len(&self) -> usize {
		self.by_id.len()
	}

	/// Returns true when the user has no keys.
	pub fn is_empty(&self) -> bool {
		self.by_id.is_empty()
	}

	/// Iterates keys in id order.
	pub fn iter(&self) -> impl Iterator<Item = &UserAccessKeyRecord> {
		self.by_id.values()
	}

	/// Swaps contents with another registry.
	pub fn swap(&mut self, other: &mut UserAccessKeyRegistry) {
		std::mem::swap(self, other);
	}
}

/// User token catalog record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserTokenRecord {
	/// Token id, unique across the instance.
	pub id: u64,
	/// Id of the owning user.
	pub user_id: u32,
	/// Token name, unique within the user.
	pub name: String,
	/// Token value hash.
	pub value: Vec<u8>,
	/// Optional expiration timestamp, seconds since the epoch.
	pub expiration_timestamp: Option<u64>,
	/// Optional description.
	pub description: Option<String>,
}

impl Record for UserTokenRecord {
	const CLASS_NAME: &'static str = "UserTokenRecord";
	const CLASS_UUID: Uuid = uuid!("0f1e2d3c-4b5a-4968-8776-a5b4c3d2e10e");
	const CLASS_VERSION: u32 = 0;

	fn serialize_body(&self, w: &mut RecordWriter) {
		w.write_varint(self.id);
		w.write_varint(self.user_id as u64);
		w.write_str(&self.name);
		w.write_bytes(&self.value);
		w.write_opt_varint(self.expiration_timestamp);
		w.write_opt_str(self.description.as_deref());
	}

	fn deserialize_body(r: &mut RecordReader) -> Result<Self, DecodeError> {
		Ok(UserTokenRecord {
			id: r.read_varint("id")?,
			user_id: r.read_varint_u32("userId")?,
			name: r.read_str("name")?,
			value: r.read_bytes("value")?,
			expiration_timestamp: r.read_opt_varint("expirationTimestamp")?,
			description: r.read_opt_str("description")?,
		})
	}
}

/// Tokens of one user, keyed by id and by name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserTokenRegistry {
	by_id: BTreeMap<u64, UserTokenRecord>,
	id_by_name: HashMap<String, u64>,
}

impl UserTokenRegistry {
	/// New empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a record. Duplicate ids or names are a bug.
	pub fn insert(&mut self, record: UserTokenRecord) {
		assert!(!self.by_id.contains_key(&record.id), "duplicate user token id {}", record.id);
		assert!(!self.id_by_name.contains_key(&record.name), "duplicate user token name '{}'", record.name);
		self.id_by_name.insert(record.name.clone(), record.id);
		self.by_id.insert(record.id, record);
	}

	/// Looks up a record by name.
	pub fn get_by_name(&self, name: &str) -> Option<&UserTokenRecord> {
		self.id_by_name.get(name).and_then(|id| self.by_id.get(id))
	}

	/// Number of tokens.
	pub fn len(&self) -> usize {
		self.by_id.len()
	}

	/// Returns true when the user has no tokens.
	pub fn is_empty(&self) -> bool {
		self.by_id.is_empty()
	}

	/// Iterates tokens in id order.
	pub fn iter(&self) -> impl Iterator<Item = &UserTokenRecord> {
		self.by_id.values()
	}

	/// Swaps contents with another registry.
	pub fn swap(&mut self, other: &mut UserTokenRegistry) {
		std::mem::swap(self, other);
	}
}

/// User catalog record with nested access keys and tokens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
	/// User id; id 1 is the super user.
	pub id: u32,
	/// User name.
	pub name: String,
	/// Optional real name.
	pub real_name: Option<String>,
	/// Optional description.
	pub description: Option<String>,
	/// Active flag.
	pub active: bool,
	/// Access keys of the user.
	pub access_keys: UserAccessKeyRegistry,
	/// Tokens of the user.
	pub tokens: UserTokenRegistry,
}

impl Record for UserRecord {
	const CLASS_NAME: &'static str = "UserRecord";
	const CLASS_UUID: Uuid = uuid!("4e5f6a7b-8c9d-4ea1-b2c3-d4e5f6a7b80c");
	const CLASS_VERSION: u32 = 0;

	fn serialize_body(&self, w: &mut RecordWriter) {
		w.write_varint(self.id as u64);
		w.write_str(&self.name);
		w.write_opt_str(self.real_name.as_deref());
		w.write_opt_str(self.description.as_deref());
		w.write_bool(self.active);
		write_nested_records(w, self.access_keys.len(), self.access_keys.iter());
		write_nested_records(w, self.tokens.len(), self.tokens.iter());
	}

	fn deserialize_body(r: &mut RecordReader) -> Result<Self, DecodeError> {
		let id = r.read_varint_u32("id")?;
		let name = r.read_str("name")?;
		let real_name = r.read_opt_str("realName")?;
		let description = r.read_opt_str("description")?;
		let active = r.read_bool("active")?;
		let mut access_keys = UserAccessKeyRegistry::new();
		for record in read_nested_records::<UserAccessKeyRecord>(r, "accessKeys")? {
			access_keys.insert(record);
		}
		let mut tokens = UserTokenRegistry::new();
		for record in read_nested_records::<UserTokenRecord>(r, "tokens")? {
			tokens.insert(record);
		}
		Ok(UserRecord { id, name, real_name, description, active, access_keys, tokens })
	}
}

/// Registry of the instance's users, keyed by id and by name.
#[derive(Default)]
pub struct UserRegistry {
	by_id: BTreeMap<u32, UserRecord>,
	id_by_name: HashMap<String, u32>,
}

impl UserRegistry {
	/// New empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a record. Duplicate ids or names are a bug.
	pub fn insert(&mut self, record: UserRecord) {
		assert!(!self.by_id.contains_key(&record.id), "duplicate user id {}", record.id);
		assert!(!self.id_by_name.contains_key(&record.name), "duplicate user name '{}'", record.name);
		self.id_by_name.insert(record.name.clone(), record.id);
		self.by_id.insert(record.id, record);
	}

	/// Looks up a record by id.
	pub fn get_by_id(&self, id: u32) -> Option<&UserRecord> {
		self.by_id.get(&id)
	}

	/// Looks up a record by name.
	pub fn get_by_name(&self, name: &str) -> Option<&UserRecord> {
		self.id_by_name.get(name).and_then(|id| self.by_id.get(id))
	}

	/// Returns true when a user with this name exists.
	pub fn contains_name(&self, name: &str) -> bool {
		self.id_by_name.contains_key(name)
	}

	/// Erases a record by id. Returns the erased record.
	pub fn erase(&mut self, id: u32) -> Option<UserRecord> {
		let record = self.by_id.remove(&id)?;
		self.id_by_name.remove(&record.name);
		Some(record)
	}

	/// Number of users.
	pub fn len(&self) -> usize {
		self.by_id.len()
	}

	/// Returns true when the registry is empty.
	pub fn is_empty(&self) -> bool {
		self.by_id.is_empty()
	}

	/// Iterates users in id order.
	pub fn iter(&self) -> impl Iterator<Item = &UserRecord> {
		self.by_id.values()
	}

	/// Swaps contents with another registry.
	pub fn swap(&mut self, other: &mut UserRegistry) {
		std::mem::swap(self, other);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use siodb_codec::{deserialize_record, serialize_record};

	fn sample_user() -> UserRecord {
		let mut access_keys = UserAccessKeyRegistry::new();
		access_keys.insert(UserAccessKeyRecord {
			id: 1,
			user_id: 1,
			name: "initial".into(),
			text: "ssh-ed25519 AAAA...".into(),
			active: true,
			description: None,
		});
		let mut tokens = UserTokenRegistry::new();
		tokens.insert(UserTokenRecord {
			id: 1,
			user_id: 1,
			name: "ci".into(),
			value: vec![0xde, 0xad],
			expiration_timestamp: Some(1_700_000_000),
			description: Some("ci token".into()),
		});
		UserRecord {
			id: 1,
			name: "root".into(),
			real_name: None,
			description: Some("super user".into()),
			active: true,
			access_keys,
			tokens,
		}
	}

	#[test]
	fn record_roundtrip_with_nested_registries() {
		let record = sample_user();
		let bytes = serialize_record(&record);
		let (decoded, consumed) = deserialize_record::<UserRecord>(&bytes).unwrap();
		assert_eq!(decoded, record);
		assert_eq!(consumed, bytes.len());
	}

	#[test]
	fn registry_lookups() {
		let mut reg = UserRegistry::new();
		reg.insert(sample_user());
		assert!(reg.contains_name("root"));
		assert_eq!(reg.get_by_name("root").unwrap().id, 1);
		assert_eq!(reg.get_by_id(1).unwrap().access_keys.len(), 1);
		assert!(reg.get_by_id(1).unwrap().access_keys.get_by_name("initial").is_some());
	}
}
