// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Well-known ids, names and file system locations.

use uuid::{uuid, Uuid};

/// Id of the system database.
pub const SYSTEM_DATABASE_ID: u32 = 1;

/// First id available to user databases.
pub const FIRST_USER_DATABASE_ID: u32 = 2;

/// Name of the system database.
pub const SYSTEM_DATABASE_NAME: &str = "SYS";

/// Well-known UUID of the system database.
pub const SYSTEM_DATABASE_UUID: Uuid = uuid!("53595300-5349-4f44-8000-000000000001");

/// Id of the super user. The super user cannot be dropped or fully deactivated.
pub const SUPER_USER_ID: u32 = 1;

/// Name of the super user.
pub const SUPER_USER_NAME: &str = "root";

/// Name of the super user's initial access key.
pub const SUPER_USER_INITIAL_ACCESS_KEY_NAME: &str = "initial";

/// First id available to ordinary users.
pub const FIRST_USER_USER_ID: u32 = 2;

/// First table id available to user tables; lower ids are the system range.
pub const FIRST_USER_TABLE_ID: u32 = 4097;

/// First column id available to user table columns; lower ids are the system range.
pub const FIRST_USER_COLUMN_ID: u64 = 4097;

/// First constraint definition id available to user constraint definitions.
pub const FIRST_USER_CONSTRAINT_DEFINITION_ID: u64 = 4097;

/// Reserved constraint definition id of the system `NOT NULL` definition.
pub const SYSTEM_NOT_NULL_CONSTRAINT_DEFINITION_ID: u64 = 1;

/// Name of the master column present in every table.
pub const MASTER_COLUMN_NAME: &str = "TRID";

/// Maximum length of an instance name.
pub const MAX_INSTANCE_NAME_LENGTH: usize = 63;

/// Maximum size of a user access key.
pub const MAX_USER_ACCESS_KEY_SIZE: u64 = 8 * 1024;

/// Maximum size of an encrypted per-database cipher key file.
pub const MAX_CIPHER_KEY_FILE_SIZE: u64 = 8 * 1024;

/// Instance initialization flag file inside the data directory.
pub const INSTANCE_INITIALIZATION_FLAG_FILE: &str = "initialized";

/// Database initialization flag file inside a database directory.
pub const DATABASE_INITIALIZATION_FLAG_FILE: &str = "initialized";

/// System objects file inside a database directory.
pub const SYSTEM_OBJECTS_FILE_NAME: &str = "system_objects";

/// Encrypted per-database cipher key file inside a database directory.
pub const CIPHER_KEY_FILE_NAME: &str = "key";

/// Memory-mapped instance metadata file inside the data directory.
pub const METADATA_FILE_NAME: &str = "instance_metadata";

/// Current version of the instance metadata file.
pub const CURRENT_METADATA_VERSION: u32 = 1;

/// Size of the instance metadata file.
pub const METADATA_FILE_SIZE: u64 = 8 * 1024;

/// Prefix of per-database directories inside the data directory.
pub const DATABASE_DIR_PREFIX: &str = "db_";

/// Prefix of per-table data directories inside a database directory.
pub const TABLE_DIR_PREFIX: &str = "t";

/// Prefix of per-column data directories inside a table directory.
pub const COLUMN_DIR_PREFIX: &str = "c";

/// Root of per-instance configuration directories.
pub const INSTANCE_CONFIG_ROOT: &str = "/etc/siodb/instances";

/// Instance configuration file name.
pub const INSTANCE_CONFIG_FILE: &str = "config";

/// Master cipher key file name inside an instance configuration directory.
pub const INSTANCE_SYSTEM_DB_KEY_FILE: &str = "system_db_key";

/// Super user initial access key file name inside an instance configuration directory.
pub const INSTANCE_INITIAL_ACCESS_KEY_FILE: &str = "initial_access_key";

/// Environment variable selecting the active instance name.
pub const INSTANCE_ENV_VAR: &str = "SIODB_INSTANCE";

/// Per-database catalog table names, in creation order.
pub mod sys_tables {
	/// Tables of this database.
	pub const SYS_TABLES: &str = "SYS_TABLES";
	/// Placeholder table reserving a system table id.
	pub const SYS_DUMMY: &str = "SYS_DUMMY";
	/// Column sets of this database.
	pub const SYS_COLUMN_SETS: &str = "SYS_COLUMN_SETS";
	/// Column set membership.
	pub const SYS_COLUMN_SET_COLUMNS: &str = "SYS_COLUMN_SET_COLUMNS";
	/// Columns of this database.
	pub const SYS_COLUMNS: &str = "SYS_COLUMNS";
	/// Column definitions.
	pub const SYS_COLUMN_DEFS: &str = "SYS_COLUMN_DEFS";
	/// Links between column definitions and constraints.
	pub const SYS_COLUMN_DEF_CONSTRAINTS: &str = "SYS_COLUMN_DEF_CONSTRAINTS";
	/// Constraint definitions, de-duplicated by `(type, expression)`.
	pub const SYS_CONSTRAINT_DEFS: &str = "SYS_CONSTRAINT_DEFS";
	/// Constraints of this database.
	pub const SYS_CONSTRAINTS: &str = "SYS_CONSTRAINTS";
	/// Indices of this database.
	pub const SYS_INDICES: &str = "SYS_INDICES";
	/// Indexed column lists.
	pub const SYS_INDEX_COLUMNS: &str = "SYS_INDEX_COLUMNS";

	/// System-database-only tables, in creation order.
	pub const SYS_USERS: &str = "SYS_USERS";
	/// User access keys.
	pub const SYS_USER_ACCESS_KEYS: &str = "SYS_USER_ACCESS_KEYS";
	/// User tokens.
	pub const SYS_USER_TOKENS: &str = "SYS_USER_TOKENS";
	/// Known databases.
	pub const SYS_DATABASES: &str = "SYS_DATABASES";
	/// User permissions.
	pub const SYS_USER_PERMISSIONS: &str = "SYS_USER_PERMISSIONS";
}
