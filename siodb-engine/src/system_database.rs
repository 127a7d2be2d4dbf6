// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The system database.
//!
//! On first run the instance-wide tables (`SYS_USERS`, `SYS_USER_ACCESS_KEYS`,
//! `SYS_USER_TOKENS`, `SYS_DATABASES`, `SYS_USER_PERMISSIONS`) are created in a
//! fixed order on top of the regular per-database catalog; on subsequent runs
//! they are reopened and scanned through the master column main index to
//! rebuild the registries.

use std::{collections::HashMap, sync::Arc};

use log::debug;
use siodb_columnstore::MainIndex;
use uuid::Uuid;

use crate::{
	column::{ColumnConstraintSpecification, ColumnSpecification},
	constants::{
		sys_tables, FIRST_USER_DATABASE_ID, FIRST_USER_USER_ID, SUPER_USER_ID, SYSTEM_DATABASE_ID,
		SYSTEM_DATABASE_NAME, SYSTEM_DATABASE_UUID,
	},
	database::{Database, DatabaseEnvironment},
	datatypes::{ColumnDataType, DatabaseObjectType},
	error::{internal_codes, DbError, DbResult},
	instance::MasterCrypto,
	master_column::TransactionParams,
	reg::{
		DatabaseRecord, DatabaseRegistry, UserAccessKeyRecord, UserAccessKeyRegistry, UserPermissionRecord,
		UserPermissionRegistry, UserRecord, UserRegistry, UserTokenRecord, UserTokenRegistry,
	},
	table::Table,
	variant::Variant,
};

/// The system database with handles to the instance-wide tables.
pub struct SystemDatabase {
	database: Arc<Database>,
	sys_users: Arc<Table>,
	sys_user_access_keys: Arc<Table>,
	sys_user_tokens: Arc<Table>,
	sys_databases: Arc<Table>,
	sys_user_permissions: Arc<Table>,
}

impl SystemDatabase {
	/// Creates the system database for a new instance.
	pub fn create(
		env: DatabaseEnvironment,
		master: &MasterCrypto,
		cipher_id: &str,
		cipher_key: Vec<u8>,
	) -> DbResult<Arc<SystemDatabase>> {
		debug!(target: "dbengine", "Creating the system database");
		let database = Database::create(
			env,
			master,
			SYSTEM_DATABASE_ID,
			SYSTEM_DATABASE_NAME,
			cipher_id,
			cipher_key,
			Some("Siodb system database".to_owned()),
			Some(SYSTEM_DATABASE_UUID),
		)?;

		let not_null = || vec![ColumnConstraintSpecification::not_null()];
		let plain = Vec::new;
		let spec = |name: &str, data_type, constraints| ColumnSpecification {
			name: name.into(),
			data_type,
			data_block_data_area_size: siodb_columnstore::SYSTEM_TABLE_DATA_AREA_SIZE,
			constraints,
			description: None,
		};
		let id64 = ColumnDataType::UInt64;

		let sys_users = database.create_system_table(
			sys_tables::SYS_USERS,
			FIRST_USER_USER_ID as u64,
			vec![
				spec("NAME", ColumnDataType::Text, not_null()),
				spec("REAL_NAME", ColumnDataType::Text, plain()),
				spec("STATE", ColumnDataType::UInt8, not_null()),
				spec("DESCRIPTION", ColumnDataType::Text, plain()),
			],
		)?;

		let sys_user_access_keys = database.create_system_table(
			sys_tables::SYS_USER_ACCESS_KEYS,
			0,
			vec![
				spec("USER_ID", id64, not_null()),
				spec("NAME", ColumnDataType::Text, not_null()),
				spec("TEXT", ColumnDataType::Text, not_null()),
				spec("STATE", ColumnDataType::UInt8, not_null()),
				spec("DESCRIPTION", ColumnDataType::Text, plain()),
			],
		)?;
		// Skip one TRID to reserve the super user's initial access key id.
		sys_user_access_keys.generate_next_user_trid();

		let sys_user_tokens = database.create_system_table(
			sys_tables::SYS_USER_TOKENS,
			0,
			vec![
				spec("USER_ID", id64, not_null()),
				spec("NAME", ColumnDataType::Text, not_null()),
				spec("VALUE", ColumnDataType::Binary, not_null()),
				spec("EXPIRATION_TIMESTAMP", ColumnDataType::Timestamp, plain()),
				spec("DESCRIPTION", ColumnDataType::Text, plain()),
			],
		)?;

		let sys_databases = database.create_system_table(
			sys_tables::SYS_DATABASES,
			FIRST_USER_DATABASE_ID as u64,
			vec![
				spec("UUID", ColumnDataType::Text, not_null()),
				spec("NAME", ColumnDataType::Text, not_null()),
				spec("CIPHER_ID", ColumnDataType::Text, not_null()),
				spec("DESCRIPTION", ColumnDataType::Text, plain()),
			],
		)?;
		sys_databases.set_last_system_trid(database.id() as u64);

		let sys_user_permissions = database.create_system_table(
			sys_tables::SYS_USER_PERMISSIONS,
			0,
			vec![
				spec("USER_ID", id64, not_null()),
				spec("DATABASE_ID", id64, not_null()),
				spec("OBJECT_TYPE", ColumnDataType::UInt8, not_null()),
				spec("OBJECT_ID", id64, not_null()),
				spec("PERMISSIONS", id64, not_null()),
				spec("GRANT_OPTIONS", id64, not_null()),
			],
		)?;

		let system = Arc::new(SystemDatabase {
			database: database.clone(),
			sys_users,
			sys_user_access_keys,
			sys_user_tokens,
			sys_databases,
			sys_user_permissions,
		});

		// Record everything into the catalog and the database into SYS_DATABASES,
		// then publish the snapshot and the initialization flag.
		let tp = database.begin_transaction(SUPER_USER_ID);
		database.preallocate_all_blocks()?;
		database.record_all_tables(&tp)?;
		system.record_database(&database.to_record(), &tp)?;
		database.save_system_objects()?;
		database.create_initialization_flag_file()?;
		Ok(system)
	}

	/// Opens the system database of an existing instance.
	pub fn open(env: DatabaseEnvironment, master: &MasterCrypto, cipher_id: &str) -> DbResult<Arc<SystemDatabase>> {
		debug!(target: "dbengine", "Opening the system database");
		let record = DatabaseRecord {
			id: SYSTEM_DATABASE_ID,
			uuid: SYSTEM_DATABASE_UUID,
			name: SYSTEM_DATABASE_NAME.to_owned(),
			cipher_id: cipher_id.to_owned(),
			description: Some("Siodb system database".to_owned()),
		};
		let database = Database::open(env, master, &record)?;
		let sys_users = database.find_table_checked(sys_tables::SYS_USERS)?;
		let sys_user_access_keys = database.find_table_checked(sys_tables::SYS_USER_ACCESS_KEYS)?;
		let sys_user_tokens = database.find_table_checked(sys_tables::SYS_USER_TOKENS)?;
		let sys_databases = database.find_table_checked(sys_tables::SYS_DATABASES)?;
		let sys_user_permissions = database.find_table_checked(sys_tables::SYS_USER_PERMISSIONS)?;
		Ok(Arc::new(SystemDatabase {
			database,
			sys_users,
			sys_user_access_keys,
			sys_user_tokens,
			sys_databases,
			sys_user_permissions,
		}))
	}

	/// The underlying database.
	pub fn database(&self) -> &Arc<Database> {
		&self.database
	}

	/// `SYS_DATABASES` table.
	pub fn sys_databases(&self) -> &Arc<Table> {
		&self.sys_databases
	}

	/// `SYS_USER_PERMISSIONS` table.
	pub fn sys_user_permissions(&self) -> &Arc<Table> {
		&self.sys_user_permissions
	}

	// ---- id generation ----

	/// Hands out the next user id.
	pub fn generate_next_user_id(&self) -> u32 {
		self.sys_users.generate_next_user_trid() as u32
	}

	/// Hands out the next user access key id.
	pub fn generate_next_user_access_key_id(&self) -> u64 {
		self.sys_user_access_keys.generate_next_user_trid()
	}

	/// Hands out the next user token id.
	pub fn generate_next_user_token_id(&self) -> u64 {
		self.sys_user_tokens.generate_next_user_trid()
	}

	/// Hands out the next database id.
	pub fn generate_next_database_id(&self, system: bool) -> u32 {
		if system {
			self.sys_databases.generate_next_system_trid() as u32
		} else {
			self.sys_databases.generate_next_user_trid() as u32
		}
	}

	/// Hands out the next user permission record id.
	pub fn generate_next_user_permission_id(&self) -> u64 {
		self.sys_user_permissions.generate_next_user_trid()
	}

	// ---- recording ----

	/// Records a user into `SYS_USERS`.
	pub fn record_user(&self, record: &UserRecord, tp: &TransactionParams) -> DbResult<()> {
		debug!(target: "dbengine", "Recording user #{} '{}'", record.id, record.name);
		self.sys_users.insert_row(
			&[
				Variant::Text(record.name.clone()),
				record.real_name.clone().into(),
				Variant::UInt8(record.active as u8),
				record.description.clone().into(),
			],
			*tp,
			Some(record.id as u64),
		)?;
		Ok(())
	}

	/// Records a user access key into `SYS_USER_ACCESS_KEYS`.
	pub fn record_user_access_key(&self, record: &UserAccessKeyRecord, tp: &TransactionParams) -> DbResult<()> {
		self.sys_user_access_keys.insert_row(
			&[
				Variant::UInt64(record.user_id as u64),
				Variant::Text(record.name.clone()),
				Variant::Text(record.text.clone()),
				Variant::UInt8(record.active as u8),
				record.description.clone().into(),
			],
			*tp,
			Some(record.id),
		)?;
		Ok(())
	}

	/// Records a user token into `SYS_USER_TOKENS`.
	pub fn record_user_token(&self, record: &UserTokenRecord, tp: &TransactionParams) -> DbResult<()> {
		self.sys_user_tokens.insert_row(
			&[
				Variant::UInt64(record.user_id as u64),
				Variant::Text(record.name.clone()),
				Variant::Binary(record.value.clone()),
				record.expiration_timestamp.map(Variant::Timestamp).unwrap_or(Variant::Null),
				record.description.clone().into(),
			],
			*tp,
			Some(record.id),
		)?;
		Ok(())
	}

	/// Records a database into `SYS_DATABASES`.
	pub fn record_database(&self, record: &DatabaseRecord, tp: &TransactionParams) -> DbResult<()> {
		debug!(target: "dbengine", "Recording database #{} '{}'", record.id, record.name);
		self.sys_databases.insert_row(
			&[
				Variant::Text(record.uuid.to_string()),
				Variant::Text(record.name.clone()),
				Variant::Text(record.cipher_id.clone()),
				record.description.clone().into(),
			],
			*tp,
			Some(record.id as u64),
		)?;
		Ok(())
	}

	/// Records a user permission into `SYS_USER_PERMISSIONS`. Recording an
	/// existing id overwrites the row (the main index points at the new version).
	pub fn record_user_permission(&self, record: &UserPermissionRecord, tp: &TransactionParams) -> DbResult<()> {
		self.sys_user_permissions.insert_row(
			&[
				Variant::UInt64(record.user_id as u64),
				Variant::UInt64(record.database_id as u64),
				Variant::UInt8(record.object_type as u8),
				Variant::UInt64(record.object_id),
				Variant::UInt64(record.permissions),
				Variant::UInt64(record.grant_options),
			],
			*tp,
			Some(record.id),
		)?;
		Ok(())
	}

	/// Deletes a user permission row.
	pub fn delete_user_permission(&self, id: u64, tp: &TransactionParams) -> DbResult<()> {
		self.sys_user_permissions.delete_row(id, *tp, true)?;
		Ok(())
	}

	/// Deletes a database row.
	pub fn delete_database(&self, id: u32, tp: &TransactionParams) -> DbResult<()> {
		self.sys_databases.delete_row(id as u64, *tp, true)?;
		Ok(())
	}

	// ---- registry loading ----

	/// Reads all users back from `SYS_USERS` and the nested key/token tables.
	pub fn read_all_users(&self) -> DbResult<UserRegistry> {
		let mut access_key_registries = self.read_all_user_access_keys()?;
		let mut token_registries = self.read_all_user_tokens()?;

		debug!(target: "dbengine", "Reading all users");
		let mut registry = UserRegistry::new();
		walk_table(&self.sys_users, |trid, values| {
			let user_id = trid as u32;
			let access_keys = access_key_registries.remove(&user_id).unwrap_or_default();
			let tokens = token_registries.remove(&user_id).unwrap_or_default();
			registry.insert(UserRecord {
				id: user_id,
				name: values[0].as_text()?.to_owned(),
				real_name: values[1].as_opt_text()?.map(str::to_owned),
				active: values[2].as_u8()? != 0,
				description: values[3].as_opt_text()?.map(str::to_owned),
				access_keys,
				tokens,
			});
			Ok(())
		})?;
		Ok(registry)
	}

	/// Reads all databases back from `SYS_DATABASES`.
	pub fn read_all_databases(&self) -> DbResult<DatabaseRegistry> {
		debug!(target: "dbengine", "Reading all databases");
		let mut registry = DatabaseRegistry::new();
		walk_table(&self.sys_databases, |trid, values| {
			let raw_uuid = values[0].as_text()?;
			let uuid = Uuid::parse_str(raw_uuid).map_err(|_| {
				DbError::internal(internal_codes::CORRUPTED_RECORD, format!("invalid database UUID '{}'", raw_uuid))
			})?;
			registry.insert(DatabaseRecord {
				id: trid as u32,
				uuid,
				name: values[1].as_text()?.to_owned(),
				cipher_id: values[2].as_text()?.to_owned(),
				description: values[3].as_opt_text()?.map(str::to_owned),
			});
			Ok(())
		})?;
		Ok(registry)
	}

	/// Reads all user access keys, grouped by user id.
	pub fn read_all_user_access_keys(&self) -> DbResult<HashMap<u32, UserAccessKeyRegistry>> {
		debug!(target: "dbengine", "Reading all user access keys");
		let mut registries: HashMap<u32, UserAccessKeyRegistry> = HashMap::new();
		walk_table(&self.sys_user_access_keys, |trid, values| {
			let user_id = values[0].as_u32()?;
			registries.entry(user_id).or_default().insert(UserAccessKeyRecord {
				id: trid,
				user_id,
				name: values[1].as_text()?.to_owned(),
				text: values[2].as_text()?.to_owned(),
				active: values[3].as_u8()? != 0,
				description: values[4].as_opt_text()?.map(str::to_owned),
			});
			Ok(())
		})?;
		Ok(registries)
	}

	/// Reads all user tokens, grouped by user id.
	pub fn read_all_user_tokens(&self) -> DbResult<HashMap<u32, UserTokenRegistry>> {
		debug!(target: "dbengine", "Reading all user tokens");
		let mut registries: HashMap<u32, UserTokenRegistry> = HashMap::new();
		walk_table(&self.sys_user_tokens, |trid, values| {
			let user_id = values[0].as_u32()?;
			registries.entry(user_id).or_default().insert(UserTokenRecord {
				id: trid,
				user_id,
				name: values[1].as_text()?.to_owned(),
				value: values[2].as_binary()?.to_vec(),
				expiration_timestamp: values[3].as_opt_timestamp()?,
				description: values[4].as_opt_text()?.map(str::to_owned),
			});
			Ok(())
		})?;
		Ok(registries)
	}

	/// Reads all user permissions, grouped by user id.
	pub fn read_all_user_permissions(&self) -> DbResult<HashMap<u32, UserPermissionRegistry>> {
		debug!(target: "dbengine", "Reading all user permissions");
		let mut registries: HashMap<u32, UserPermissionRegistry> = HashMap::new();
		walk_table(&self.sys_user_permissions, |trid, values| {
			let user_id = values[0].as_u32()?;
			let raw_object_type = values[2].as_u8()?;
			let object_type = DatabaseObjectType::from_u8(raw_object_type).ok_or_else(|| {
				DbError::internal(
					internal_codes::CORRUPTED_RECORD,
					format!("invalid database object type {}", raw_object_type),
				)
			})?;
			registries.entry(user_id).or_default().insert(UserPermissionRecord {
				id: trid,
				user_id,
				database_id: values[1].as_u32()?,
				object_type,
				object_id: values[3].as_u64()?,
				permissions: values[4].as_u64()?,
				grant_options: values[5].as_u64()?,
			});
			Ok(())
		})?;
		Ok(registries)
	}
}

/// Walks a system table from the minimum to the maximum TRID through the master
/// column main index, reading every row.
fn walk_table(
	table: &Arc<Table>,
	mut visit: impl FnMut(u64, Vec<Variant>) -> DbResult<()>,
) -> DbResult<()> {
	let columns = table.columns();
	let (master, user_columns) = columns.split_first().ok_or_else(|| {
		DbError::internal(internal_codes::INTERNAL_ERROR, format!("{}: table has no columns", table.display_name()))
	})?;
	let index = master.main_index()?;

	let (min_trid, max_trid) = {
		let index = index.lock();
		match (index.min_key(), index.max_key()) {
			(Some(min), Some(max)) => (min, max),
			_ => return Ok(()),
		}
	};
	if min_trid > max_trid {
		return Err(DbError::internal(
			internal_codes::INDEX_CORRUPTED,
			format!("{}: master column index is corrupted: TRID range inverted", table.display_name()),
		));
	}

	let mut cursor = Some(min_trid);
	while let Some(trid) = cursor {
		let address = index.lock().find(trid).ok_or_else(|| {
			DbError::internal(
				internal_codes::INDEX_CORRUPTED,
				format!("{}: master column index is corrupted: key {} vanished", table.display_name(), trid),
			)
		})?;
		let record = master.read_master_record(address)?;
		table.check_record_column_count(&record, user_columns.len(), address)?;

		let mut values = Vec::with_capacity(record.column_addresses.len());
		for (column, value_address) in user_columns.iter().zip(&record.column_addresses) {
			values.push(column.read_value(*value_address)?);
		}
		visit(trid, values)?;

		cursor = index.lock().find_next_key(trid);
	}
	Ok(())
}
