// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Instance bootstrap: fresh start, reopen, envelope key round-trip.

use siodb_codec::deserialize_record;
use siodb_engine::{
	constants::{
		sys_tables, CIPHER_KEY_FILE_NAME, INSTANCE_INITIALIZATION_FLAG_FILE, SUPER_USER_ID,
		SYSTEM_DATABASE_NAME, SYSTEM_DATABASE_UUID,
	},
	reg::CipherKeyRecord,
	Instance, SiodbOptions,
};

fn test_options(data_dir: &std::path::Path) -> SiodbOptions {
	let mut options = SiodbOptions::with_defaults("siodb_test", data_dir);
	options.encryption.master_cipher_key = (0..16u8).collect();
	options.general.super_user_initial_access_key = "k".repeat(64);
	options
}

fn plaintext_options(data_dir: &std::path::Path) -> SiodbOptions {
	let mut options = SiodbOptions::with_defaults("siodb_plain", data_dir);
	options.encryption.master_cipher_id = "none".into();
	options.encryption.system_db_cipher_id = "none".into();
	options.encryption.default_cipher_id = "none".into();
	options.general.super_user_initial_access_key = "k".repeat(64);
	options
}

// Fresh instance over an empty data directory, then a second start-up with the
// same inputs reopening without mutation.
#[test]
fn fresh_instance_bootstrap_and_reopen() {
	let dir = tempfile::tempdir().unwrap();
	let data_dir = dir.path().join("data");
	let options = test_options(&data_dir);

	let instance = Instance::new(options.clone()).unwrap();
	assert_eq!(instance.metadata_version(), 1);
	assert!(data_dir.join(INSTANCE_INITIALIZATION_FLAG_FILE).exists());

	// The system database carries the well-known UUID.
	let system = instance.find_database_checked(SYSTEM_DATABASE_NAME).unwrap();
	assert_eq!(system.uuid(), SYSTEM_DATABASE_UUID);
	assert_eq!(system.id(), 1);
	assert!(system.is_system_database());

	// All instance-wide tables exist.
	for name in [
		sys_tables::SYS_USERS,
		sys_tables::SYS_USER_ACCESS_KEYS,
		sys_tables::SYS_USER_TOKENS,
		sys_tables::SYS_DATABASES,
		sys_tables::SYS_USER_PERMISSIONS,
	] {
		system.find_table_checked(name).unwrap();
	}

	// Super user id 1 with its initial access key id 1.
	let root = instance.find_user("root").unwrap().unwrap();
	assert_eq!(root.id(), SUPER_USER_ID);
	assert!(root.is_super_user());
	assert!(root.is_active());
	let initial_key = root.access_keys().get_by_name("initial").unwrap();
	assert_eq!(initial_key.id, 1);
	assert_eq!(initial_key.text, "k".repeat(64));

	let instance_uuid = instance.uuid();
	drop(instance);

	// Second start-up with the same inputs.
	let reopened = Instance::new(options).unwrap();
	assert_eq!(reopened.uuid(), instance_uuid);
	assert_eq!(reopened.metadata_version(), 1);
	let root = reopened.find_user("root").unwrap().unwrap();
	assert_eq!(root.id(), SUPER_USER_ID);
	assert_eq!(root.access_keys().get_by_name("initial").unwrap().id, 1);
	let system = reopened.find_database_checked(SYSTEM_DATABASE_NAME).unwrap();
	assert_eq!(system.uuid(), SYSTEM_DATABASE_UUID);
}

// The recorded instance name is cross-checked on reopen; a mismatch is fatal.
#[test]
fn instance_name_mismatch_is_fatal() {
	let dir = tempfile::tempdir().unwrap();
	let data_dir = dir.path().join("data");
	Instance::new(test_options(&data_dir)).unwrap();

	let mut other = test_options(&data_dir);
	other.general.name = "siodb_other".into();
	let error = Instance::new(other).unwrap_err();
	assert!(error.to_string().contains("mismatch"), "unexpected error: {}", error);
}

// The per-database key file round-trips through the master cipher envelope.
#[test]
fn envelope_key_roundtrip() {
	let dir = tempfile::tempdir().unwrap();
	let options = test_options(&dir.path().join("data"));
	let instance = Instance::new(options.clone()).unwrap();

	let key: Vec<u8> = (100..116u8).collect();
	let database = instance
		.create_database("SALES", Some("aes128".into()), Some(key.clone()), None, SUPER_USER_ID)
		.unwrap();
	let database_id = database.id();
	let key_file = database.data_dir().join(CIPHER_KEY_FILE_NAME);
	drop(database);
	drop(instance);

	// Restart and check the key file parses back to the exact same key.
	let instance = Instance::new(options).unwrap();
	let raw = std::fs::read(&key_file).unwrap();
	let decrypted = instance.master_crypto().decrypt_with_master(&raw).unwrap();
	let (record, _) = deserialize_record::<CipherKeyRecord>(&decrypted).unwrap();
	assert_eq!(record.id, (database_id as u64) << 32);
	assert_eq!(record.cipher_id, "aes128");
	assert_eq!(record.key, key);

	// The reopened database exposes the same key material.
	let database = instance.find_database_checked("SALES").unwrap();
	assert_eq!(database.cipher_key(), &key[..]);
	assert_eq!(database.cipher_id(), "aes128");
}

// Encrypt/decrypt with the master key honours block alignment both ways.
#[test]
fn master_envelope_alignment() {
	let dir = tempfile::tempdir().unwrap();
	let instance = Instance::new(test_options(&dir.path().join("data"))).unwrap();
	let master = instance.master_crypto();

	// Aligned input: decrypt(encrypt(x)) == x.
	let aligned: Vec<u8> = (0..64u8).collect();
	let encrypted = master.encrypt_with_master(&aligned).unwrap();
	assert_eq!(encrypted.len(), 64);
	assert_ne!(encrypted, aligned);
	assert_eq!(master.decrypt_with_master(&encrypted).unwrap(), aligned);

	// Unaligned input grows to the next block; the decrypted head is the input
	// and the tail is the zero padding.
	let unaligned: Vec<u8> = (0..21u8).collect();
	let encrypted = master.encrypt_with_master(&unaligned).unwrap();
	assert_eq!(encrypted.len(), 32);
	let decrypted = master.decrypt_with_master(&encrypted).unwrap();
	assert_eq!(&decrypted[..21], &unaligned[..]);
	assert!(decrypted[21..].iter().all(|&b| b == 0));

	// Unaligned ciphertext is rejected.
	let error = master.decrypt_with_master(&encrypted[..20]).unwrap_err();
	assert!(error.to_string().contains("invalid data size"));
}

// A plaintext instance (cipher `none`) bootstraps and reopens as well.
#[test]
fn plaintext_instance_bootstrap() {
	let dir = tempfile::tempdir().unwrap();
	let data_dir = dir.path().join("data");
	let options = plaintext_options(&data_dir);

	let instance = Instance::new(options.clone()).unwrap();
	let system = instance.find_database_checked(SYSTEM_DATABASE_NAME).unwrap();
	assert_eq!(system.cipher_id(), "none");
	drop(instance);

	let reopened = Instance::new(options).unwrap();
	assert!(reopened.find_user("root").unwrap().is_some());
}

// Sessions get collision-free UUIDs; ending a missing session is an error.
#[test]
fn client_sessions() {
	let dir = tempfile::tempdir().unwrap();
	let instance = Instance::new(plaintext_options(&dir.path().join("data"))).unwrap();

	let session = instance.begin_session(SUPER_USER_ID).unwrap();
	assert_eq!(instance.session_count(), 1);
	instance.end_session(session).unwrap();
	assert_eq!(instance.session_count(), 0);

	let error = instance.end_session(session).unwrap_err();
	assert_eq!(error.code(), siodb_engine::codes::SESSION_DOES_NOT_EXIST);
}
