// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Permission grant/revoke with persistence through SYS_USER_PERMISSIONS.

use siodb_engine::{
	codes,
	datatypes::permissions::{EXECUTE, INSERT, SELECT},
	DatabaseObjectType, Instance, SiodbOptions, UserPermissionKey,
};

const SUPER: u32 = 1;

fn new_instance(dir: &tempfile::TempDir) -> std::sync::Arc<Instance> {
	let mut options = SiodbOptions::with_defaults("siodb_perm", dir.path().join("data"));
	options.encryption.master_cipher_id = "none".into();
	options.encryption.system_db_cipher_id = "none".into();
	options.encryption.default_cipher_id = "none".into();
	options.general.super_user_initial_access_key = "k".repeat(64);
	Instance::new(options).unwrap()
}

// Grant SELECT,INSERT WITH GRANT OPTION, then revoke them one by one: the row
// is first updated, then deleted.
#[test]
fn grant_and_revoke_lifecycle() {
	let dir = tempfile::tempdir().unwrap();
	let instance = new_instance(&dir);

	let user = instance.create_user("u1", None, None, true, SUPER).unwrap();
	let user_id = user.id();
	assert!(!user.is_super_user());

	let key = UserPermissionKey::table(2, 4097);
	assert!(!user.has_permissions(key, SELECT, false));

	// Grant SELECT, INSERT WITH GRANT OPTION.
	instance.grant_permissions(user_id, key, SELECT | INSERT, true, SUPER).unwrap();
	assert!(user.has_permissions(key, SELECT, true));
	assert!(user.has_permissions(key, SELECT | INSERT, true));

	let permissions = instance.system_database().read_all_user_permissions().unwrap();
	let row = permissions.get(&user_id).unwrap().iter().next().unwrap().clone();
	assert_eq!(row.permissions, SELECT | INSERT);
	assert_eq!(row.grant_options, SELECT | INSERT);
	let row_id = row.id;

	// Revoke INSERT: the row is updated, not deleted.
	instance.revoke_permissions(user_id, key, INSERT, SUPER).unwrap();
	assert!(!user.has_permissions(key, INSERT, false));
	assert!(user.has_permissions(key, SELECT, false));

	let permissions = instance.system_database().read_all_user_permissions().unwrap();
	let row = permissions.get(&user_id).unwrap().iter().next().unwrap().clone();
	assert_eq!(row.id, row_id);
	assert_eq!(row.permissions, SELECT);

	// Revoke SELECT: the row is deleted.
	instance.revoke_permissions(user_id, key, SELECT, SUPER).unwrap();
	assert!(!user.has_permissions(key, SELECT, false));
	let permissions = instance.system_database().read_all_user_permissions().unwrap();
	assert!(permissions.get(&user_id).is_none());
}

// The super user passes every permission check without any grant.
#[test]
fn super_user_bypasses_checks() {
	let dir = tempfile::tempdir().unwrap();
	let instance = new_instance(&dir);
	let root = instance.find_user("root").unwrap().unwrap();
	assert!(root.has_permissions(UserPermissionKey::table(2, 4097), SELECT | INSERT, true));
}

// Requests for bits outside the permitted mask of the object type fail.
#[test]
fn unpermitted_bits_are_rejected() {
	let dir = tempfile::tempdir().unwrap();
	let instance = new_instance(&dir);
	let user = instance.create_user("u2", None, None, true, SUPER).unwrap();

	let key = UserPermissionKey::table(2, 4097);
	let error = instance.grant_permissions(user.id(), key, EXECUTE, false, SUPER).unwrap_err();
	assert_eq!(error.code(), codes::INVALID_PERMISSION_SPEC);

	let key = UserPermissionKey::new(2, DatabaseObjectType::Procedure, 9);
	instance.grant_permissions(user.id(), key, EXECUTE, false, SUPER).unwrap();
	assert!(user.has_permissions(key, EXECUTE, false));
}

// Grants survive an instance restart through SYS_USER_PERMISSIONS.
#[test]
fn grants_survive_restart() {
	let dir = tempfile::tempdir().unwrap();
	let data_dir = dir.path().join("data");
	let mut options = SiodbOptions::with_defaults("siodb_perm2", &data_dir);
	options.encryption.master_cipher_id = "none".into();
	options.encryption.system_db_cipher_id = "none".into();
	options.encryption.default_cipher_id = "none".into();
	options.general.super_user_initial_access_key = "k".repeat(64);

	let key = UserPermissionKey::table(2, 4097);
	let user_id = {
		let instance = Instance::new(options.clone()).unwrap();
		let user = instance.create_user("walter", None, None, true, SUPER).unwrap();
		instance.grant_permissions(user.id(), key, SELECT, true, SUPER).unwrap();
		user.id()
	};

	let instance = Instance::new(options).unwrap();
	let user = instance.find_user("walter").unwrap().unwrap();
	assert_eq!(user.id(), user_id);
	assert!(user.has_permissions(key, SELECT, true));
	assert!(!user.has_permissions(key, INSERT, false));
}
