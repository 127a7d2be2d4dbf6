// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Instance configuration.
//!
//! Options are either constructed programmatically or parsed from the
//! `key = value` instance configuration file at
//! `/etc/siodb/instances/<name>/config`. The `SIODB_INSTANCE` environment
//! variable selects the active instance name when not passed explicitly.

use std::{
	env, fs,
	path::{Path, PathBuf},
};

use crate::{
	constants::{
		INSTANCE_CONFIG_FILE, INSTANCE_CONFIG_ROOT, INSTANCE_ENV_VAR, INSTANCE_INITIAL_ACCESS_KEY_FILE,
		INSTANCE_SYSTEM_DB_KEY_FILE, MAX_INSTANCE_NAME_LENGTH,
	},
	error::{codes, DbError, DbResult},
};

/// Default maximum number of users.
pub const DEFAULT_MAX_USERS: usize = 512;

/// Default maximum number of databases.
pub const DEFAULT_MAX_DATABASES: usize = 65536;

/// Default maximum number of tables per database.
pub const DEFAULT_MAX_TABLE_COUNT_PER_DATABASE: usize = 65536;

/// Default capacity of per-column block caches.
pub const DEFAULT_BLOCK_CACHE_CAPACITY: usize = 103;

/// General instance options.
#[derive(Clone, Debug)]
pub struct GeneralOptions {
	/// Instance name.
	pub name: String,
	/// Instance data directory.
	pub data_directory: PathBuf,
	/// Allow CREATE TABLE in the system database.
	pub allow_creating_user_tables_in_system_database: bool,
	/// Super user initial access key text; loaded from the instance config
	/// directory when empty.
	pub super_user_initial_access_key: String,
}

/// Encryption options.
#[derive(Clone, Debug)]
pub struct EncryptionOptions {
	/// Cipher used for new databases unless specified otherwise.
	pub default_cipher_id: String,
	/// Cipher of the instance master key.
	pub master_cipher_id: String,
	/// Raw master cipher key; loaded from `master_cipher_key_path` when empty.
	pub master_cipher_key: Vec<u8>,
	/// Path of the master cipher key file.
	pub master_cipher_key_path: Option<PathBuf>,
	/// Cipher of the system database.
	pub system_db_cipher_id: String,
}

/// I/O manager options.
#[derive(Clone, Debug)]
pub struct IoManagerOptions {
	/// Maximum number of users.
	pub max_users: usize,
	/// Maximum number of databases.
	pub max_databases: usize,
	/// Maximum number of tables per database.
	pub max_table_count_per_database: usize,
	/// Capacity of per-column block caches.
	pub block_cache_capacity: usize,
}

/// Complete instance options.
#[derive(Clone, Debug)]
pub struct SiodbOptions {
	/// General options.
	pub general: GeneralOptions,
	/// Encryption options.
	pub encryption: EncryptionOptions,
	/// I/O manager options.
	pub io_manager: IoManagerOptions,
}

impl SiodbOptions {
	/// Options with defaults for the given instance name and data directory.
	pub fn with_defaults(name: impl Into<String>, data_directory: impl Into<PathBuf>) -> Self {
		SiodbOptions {
			general: GeneralOptions {
				name: name.into(),
				data_directory: data_directory.into(),
				allow_creating_user_tables_in_system_database: false,
				super_user_initial_access_key: String::new(),
			},
			encryption: EncryptionOptions {
				default_cipher_id: "aes128".into(),
				master_cipher_id: "aes128".into(),
				master_cipher_key: Vec::new(),
				master_cipher_key_path: None,
				system_db_cipher_id: "aes128".into(),
			},
			io_manager: IoManagerOptions {
				max_users: DEFAULT_MAX_USERS,
				max_databases: DEFAULT_MAX_DATABASES,
				max_table_count_per_database: DEFAULT_MAX_TABLE_COUNT_PER_DATABASE,
				block_cache_capacity: DEFAULT_BLOCK_CACHE_CAPACITY,
			},
		}
	}

	/// Loads options for the named instance from its configuration directory.
	///
	/// The instance name falls back to the `SIODB_INSTANCE` environment variable
	/// when `name` is `None`.
	pub fn load(name: Option<&str>) -> DbResult<Self> {
		let name = match name {
			Some(name) => name.to_owned(),
			None => env::var(INSTANCE_ENV_VAR).map_err(|_| {
				DbError::user(codes::INVALID_OBJECT_NAME, "instance name is not specified and SIODB_INSTANCE is not set")
			})?,
		};
		validate_instance_name(&name)?;

		let config_path = instance_config_dir(&name).join(INSTANCE_CONFIG_FILE);
		let text = fs::read_to_string(&config_path)
			.map_err(|e| DbError::io(format!("can't read instance config '{}'", config_path.display()), e))?;
		Self::parse(&name, &text)
	}

	/// Parses a `key = value` configuration file body.
	pub fn parse(name: &str, text: &str) -> DbResult<Self> {
		let mut options = Self::with_defaults(name, "");
		for (line_number, line) in text.lines().enumerate() {
			let line = line.trim();
			if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
				continue;
			}
			let (key, value) = line.split_once('=').ok_or_else(|| {
				DbError::user(
					codes::INVALID_OBJECT_NAME,
					format!("invalid configuration line {}: '{}'", line_number + 1, line),
				)
			})?;
			let key = key.trim();
			let value = value.trim();
			match key {
				"data_dir" => options.general.data_directory = PathBuf::from(value),
				"allow_creating_user_tables_in_system_database" =>
					options.general.allow_creating_user_tables_in_system_database = parse_bool(key, value)?,
				"encryption.default_cipher_id" => options.encryption.default_cipher_id = value.to_owned(),
				"encryption.master_cipher_id" => options.encryption.master_cipher_id = value.to_owned(),
				"encryption.master_key" =>
					options.encryption.master_cipher_key_path = Some(PathBuf::from(value)),
				"encryption.system_db_cipher_id" => options.encryption.system_db_cipher_id = value.to_owned(),
				"iomgr.max_users" => options.io_manager.max_users = parse_usize(key, value)?,
				"iomgr.max_databases" => options.io_manager.max_databases = parse_usize(key, value)?,
				"iomgr.max_tables_per_db" =>
					options.io_manager.max_table_count_per_database = parse_usize(key, value)?,
				"iomgr.block_cache_capacity" =>
					options.io_manager.block_cache_capacity = parse_usize(key, value)?,
				// Listener and protocol options belong to the outer processes.
				_ => {},
			}
		}
		if options.general.data_directory.as_os_str().is_empty() {
			return Err(DbError::user(codes::INVALID_OBJECT_NAME, "configuration does not specify data_dir"));
		}
		Ok(options)
	}

	/// Path of the master cipher key file, explicit or conventional.
	pub fn master_cipher_key_path(&self) -> PathBuf {
		self.encryption
			.master_cipher_key_path
			.clone()
			.unwrap_or_else(|| instance_config_dir(&self.general.name).join(INSTANCE_SYSTEM_DB_KEY_FILE))
	}

	/// Path of the super user initial access key file.
	pub fn initial_access_key_path(&self) -> PathBuf {
		instance_config_dir(&self.general.name).join(INSTANCE_INITIAL_ACCESS_KEY_FILE)
	}
}

/// Configuration directory of the named instance.
pub fn instance_config_dir(name: &str) -> PathBuf {
	Path::new(INSTANCE_CONFIG_ROOT).join(name)
}

/// Validates an instance name: non-empty, bounded, `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_instance_name(name: &str) -> DbResult<()> {
	let valid = !name.is_empty()
		&& name.len() <= MAX_INSTANCE_NAME_LENGTH
		&& name.chars().next().map(|c| c.is_ascii_alphabetic() || c == '_').unwrap_or(false)
		&& name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
	if !valid {
		return Err(DbError::user(codes::INVALID_OBJECT_NAME, format!("invalid instance name '{}'", name)));
	}
	Ok(())
}

fn parse_bool(key: &str, value: &str) -> DbResult<bool> {
	match value {
		"true" | "yes" | "1" => Ok(true),
		"false" | "no" | "0" => Ok(false),
		_ => Err(DbError::user(codes::INVALID_OBJECT_NAME, format!("invalid boolean value of option '{}'", key))),
	}
}

fn parse_usize(key: &str, value: &str) -> DbResult<usize> {
	value
		.parse()
		.map_err(|_| DbError::user(codes::INVALID_OBJECT_NAME, format!("invalid numeric value of option '{}'", key)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_config_body() {
		let text = "\
# instance configuration
data_dir = /var/lib/siodb/siodb1/data
encryption.default_cipher_id = aes256
iomgr.max_users = 64

; listener options are ignored here
ipv4_port = 50000
";
		let options = SiodbOptions::parse("siodb1", text).unwrap();
		assert_eq!(options.general.name, "siodb1");
		assert_eq!(options.general.data_directory, PathBuf::from("/var/lib/siodb/siodb1/data"));
		assert_eq!(options.encryption.default_cipher_id, "aes256");
		assert_eq!(options.encryption.master_cipher_id, "aes128");
		assert_eq!(options.io_manager.max_users, 64);
	}

	#[test]
	fn rejects_missing_data_dir() {
		assert!(SiodbOptions::parse("siodb1", "encryption.default_cipher_id = aes128\n").is_err());
	}

	#[test]
	fn instance_name_validation() {
		assert!(validate_instance_name("siodb1").is_ok());
		assert!(validate_instance_name("_test").is_ok());
		assert!(validate_instance_name("").is_err());
		assert!(validate_instance_name("1abc").is_err());
		assert!(validate_instance_name("has space").is_err());
		assert!(validate_instance_name(&"x".repeat(64)).is_err());
	}

	#[test]
	fn conventional_paths() {
		let options = SiodbOptions::with_defaults("prod", "/data");
		assert_eq!(options.master_cipher_key_path(), PathBuf::from("/etc/siodb/instances/prod/system_db_key"));
		assert_eq!(options.initial_access_key_path(), PathBuf::from("/etc/siodb/instances/prod/initial_access_key"));
	}
}
