// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Live user objects.

use std::{
	collections::HashMap,
	sync::atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;

use crate::{
	constants::SUPER_USER_ID,
	permission::{UserPermissionDataEx, UserPermissionKey},
	reg::{UserAccessKeyRegistry, UserPermissionRegistry, UserRecord, UserTokenRegistry},
};

/// Outcome of a grant on the in-memory permission map.
#[derive(Clone, Copy, Debug)]
pub struct GrantOutcome {
	/// Updated bitmasks.
	pub data: UserPermissionDataEx,
	/// True when no `SYS_USER_PERMISSIONS` row exists for the key yet.
	pub is_new_record: bool,
}

/// Outcome of a revoke on the in-memory permission map.
#[derive(Clone, Copy, Debug)]
pub struct RevokeOutcome {
	/// Updated bitmasks; permissions of zero mean the entry was removed.
	pub data: UserPermissionDataEx,
	/// True when the entry was removed and its row must be deleted.
	pub removed: bool,
}

/// A live user with its permission map.
pub struct User {
	id: u32,
	name: String,
	real_name: Option<String>,
	description: Option<String>,
	active: AtomicBool,
	access_keys: UserAccessKeyRegistry,
	tokens: UserTokenRegistry,
	permissions: Mutex<HashMap<UserPermissionKey, UserPermissionDataEx>>,
}

impl User {
	/// Builds a live user from its record and permission registry.
	pub fn from_record(record: &UserRecord, permissions: &UserPermissionRegistry) -> Self {
		let mut map = HashMap::with_capacity(permissions.len());
		for permission in permissions.iter() {
			map.insert(UserPermissionKey::from(permission), UserPermissionDataEx::from(permission));
		}
		User {
			id: record.id,
			name: record.name.clone(),
			real_name: record.real_name.clone(),
			description: record.description.clone(),
			active: AtomicBool::new(record.active),
			access_keys: record.access_keys.clone(),
			tokens: record.tokens.clone(),
			permissions: Mutex::new(map),
		}
	}

	/// Catalog record of this user.
	pub fn to_record(&self) -> UserRecord {
		UserRecord {
			id: self.id,
			name: self.name.clone(),
			real_name: self.real_name.clone(),
			description: self.description.clone(),
			active: self.is_active(),
			access_keys: self.access_keys.clone(),
			tokens: self.tokens.clone(),
		}
	}

	/// User id.
	pub fn id(&self) -> u32 {
		self.id
	}

	/// User name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Optional real name.
	pub fn real_name(&self) -> Option<&str> {
		self.real_name.as_deref()
	}

	/// Optional description.
	pub fn description(&self) -> Option<&str> {
		self.description.as_deref()
	}

	/// Returns true for the super user.
	pub fn is_super_user(&self) -> bool {
		self.id == SUPER_USER_ID
	}

	/// Active flag.
	pub fn is_active(&self) -> bool {
		self.active.load(Ordering::Acquire)
	}

	/// Sets the active flag. The caller enforces that the super user stays active.
	pub fn set_active(&self, active: bool) {
		self.active.store(active, Ordering::Release);
	}

	/// Access keys of this user.
	pub fn access_keys(&self) -> &UserAccessKeyRegistry {
		&self.access_keys
	}

	/// Tokens of this user.
	pub fn tokens(&self) -> &UserTokenRegistry {
		&self.tokens
	}

	/// Checks whether the user holds every bit of `mask` on `key`.
	///
	/// The super user holds every permission implicitly.
	pub fn has_permissions(&self, key: UserPermissionKey, mask: u64, with_grant_option: bool) -> bool {
		if self.is_super_user() {
			return true;
		}
		self.permissions.lock().get(&key).map(|data| data.data.covers(mask, with_grant_option)).unwrap_or(false)
	}

	/// Unions `mask` into the grant for `key`.
	pub fn grant_permissions(&self, key: UserPermissionKey, mask: u64, with_grant_option: bool) -> GrantOutcome {
		let mut permissions = self.permissions.lock();
		let entry = permissions.entry(key).or_default();
		entry.data.add_permissions(mask, with_grant_option);
		GrantOutcome { data: *entry, is_new_record: entry.id == 0 }
	}

	/// Retains the `SYS_USER_PERMISSIONS` record id of a freshly persisted grant.
	pub fn set_permission_record_id(&self, key: UserPermissionKey, id: u64) {
		if let Some(entry) = self.permissions.lock().get_mut(&key) {
			entry.id = id;
		}
	}

	/// Removes `mask` from the grant for `key`. Returns `None` when the user
	/// holds nothing on `key`.
	pub fn revoke_permissions(&self, key: UserPermissionKey, mask: u64) -> Option<RevokeOutcome> {
		let mut permissions = self.permissions.lock();
		let entry = permissions.get_mut(&key)?;
		entry.data.remove_permissions(mask);
		let data = *entry;
		if data.data.permissions() == 0 {
			permissions.remove(&key);
			return Some(RevokeOutcome { data, removed: true });
		}
		Some(RevokeOutcome { data, removed: false })
	}

	/// Snapshot of the permission map, for consistency checks.
	pub fn permission_count(&self) -> usize {
		self.permissions.lock().len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::datatypes::{permissions::*, DatabaseObjectType};

	fn plain_user(id: u32, name: &str) -> User {
		let record = UserRecord {
			id,
			name: name.into(),
			real_name: None,
			description: None,
			active: true,
			access_keys: Default::default(),
			tokens: Default::default(),
		};
		User::from_record(&record, &UserPermissionRegistry::new())
	}

	#[test]
	fn super_user_holds_everything() {
		let root = plain_user(SUPER_USER_ID, "root");
		let key = UserPermissionKey::table(2, 4097);
		assert!(root.has_permissions(key, SELECT | INSERT | DROP, true));
	}

	#[test]
	fn grant_then_revoke_lifecycle() {
		let user = plain_user(2, "alice");
		let key = UserPermissionKey::table(2, 4097);
		assert!(!user.has_permissions(key, SELECT, false));

		let outcome = user.grant_permissions(key, SELECT | INSERT, true);
		assert!(outcome.is_new_record);
		user.set_permission_record_id(key, 17);
		assert!(user.has_permissions(key, SELECT, true));
		assert!(user.has_permissions(key, SELECT | INSERT, true));
		assert!(!user.has_permissions(key, DELETE, false));

		let outcome = user.revoke_permissions(key, INSERT).unwrap();
		assert!(!outcome.removed);
		assert_eq!(outcome.data.id, 17);
		assert!(!user.has_permissions(key, INSERT, false));
		assert!(user.has_permissions(key, SELECT, false));

		let outcome = user.revoke_permissions(key, SELECT).unwrap();
		assert!(outcome.removed);
		assert!(!user.has_permissions(key, SELECT, false));
		assert_eq!(user.permission_count(), 0);
	}

	#[test]
	fn different_objects_have_independent_grants() {
		let user = plain_user(2, "bob");
		let table_key = UserPermissionKey::table(2, 4097);
		let database_key = UserPermissionKey::new(2, DatabaseObjectType::Database, 2);
		user.grant_permissions(table_key, SELECT, false);
		assert!(!user.has_permissions(database_key, SELECT, false));
	}
}
