// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Live database objects.
//!
//! A database owns its tables, catalog registries and constraint definitions.
//! The catalog itself is stored in ordinary tables (`SYS_TABLES`, `SYS_COLUMNS`,
//! …) inside the database, cross-linked by the system objects file in the
//! database directory. A coarse per-database lock guards every registry
//! mutation; column block I/O takes the per-column lock and may be entered
//! while the database lock is held, never the other way around.

mod lifecycle;

pub use lifecycle::is_valid_database_object_name;

use std::{
	collections::HashMap,
	path::PathBuf,
	sync::{
		atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering},
		Arc,
	},
};

use log::debug;
use parking_lot::RwLock;
use siodb_codec::{deserialize_record, serialize_record};
use siodb_columnstore::{MainIndex, DEFAULT_DATA_AREA_SIZE, INDEX_NODE_SIZE, SYSTEM_TABLE_DATA_AREA_SIZE};
use siodb_crypto::Cipher;
use siodb_iofile::{FileAccessor, FileFactory};
use uuid::Uuid;

use crate::{
	column::{Column, ColumnConstraintSpecification, ColumnEnvironment, ColumnSpecification},
	constants::{
		sys_tables, CIPHER_KEY_FILE_NAME, DATABASE_DIR_PREFIX, DATABASE_INITIALIZATION_FLAG_FILE,
		FIRST_USER_COLUMN_ID, FIRST_USER_CONSTRAINT_DEFINITION_ID, FIRST_USER_TABLE_ID, MASTER_COLUMN_NAME,
		MAX_CIPHER_KEY_FILE_SIZE, SYSTEM_DATABASE_ID, SYSTEM_NOT_NULL_CONSTRAINT_DEFINITION_ID,
		SYSTEM_OBJECTS_FILE_NAME, TABLE_DIR_PREFIX,
	},
	datatypes::{ColumnDataType, ColumnState, ConstraintState, ConstraintType, IndexType, TableType},
	error::{codes, internal_codes, DbError, DbResult},
	instance::MasterCrypto,
	master_column::TransactionParams,
	reg::{
		CipherKeyRecord, ColumnDefinitionConstraintRecord, ColumnDefinitionRecord, ColumnDefinitionRegistry,
		ColumnRecord, ColumnRegistry, ColumnSetColumnRecord, ColumnSetColumnRegistry, ColumnSetRecord,
		ColumnSetRegistry, ConstraintDefinitionRecord, ConstraintDefinitionRegistry, ConstraintRecord,
		ConstraintRegistry, DatabaseRecord, IndexColumnRecord, IndexColumnRegistry, IndexRecord, IndexRegistry,
		SystemObjectsRecord, TableRecord, TableRegistry,
	},
	table::{current_timestamp, Table},
	variant::Variant,
};

/// Environment a database needs from the owning instance.
#[derive(Clone)]
pub struct DatabaseEnvironment {
	/// Instance data directory.
	pub data_dir: PathBuf,
	/// Capacity of per-column block caches.
	pub block_cache_capacity: usize,
	/// Maximum number of tables per database.
	pub max_table_count: usize,
	/// Allow CREATE TABLE in the system database.
	pub allow_user_tables_in_system_database: bool,
}

/// Catalog registries of one database, guarded together by the database lock.
#[derive(Default)]
pub struct DatabaseRegistries {
	/// Tables.
	pub tables: TableRegistry,
	/// Column sets.
	pub column_sets: ColumnSetRegistry,
	/// Columns.
	pub columns: ColumnRegistry,
	/// Column definitions.
	pub column_definitions: ColumnDefinitionRegistry,
	/// Constraints.
	pub constraints: ConstraintRegistry,
	/// Constraint definitions.
	pub constraint_definitions: ConstraintDefinitionRegistry,
	/// Indices.
	pub indices: IndexRegistry,
}

struct IdCounters {
	last_system_table_id: AtomicU32,
	last_user_table_id: AtomicU32,
	last_system_column_id: AtomicU64,
	last_user_column_id: AtomicU64,
	last_column_set_id: AtomicU64,
	last_column_set_column_id: AtomicU64,
	last_column_definition_id: AtomicU64,
	last_column_def_constraint_id: AtomicU64,
	last_constraint_id: AtomicU64,
	last_user_constraint_definition_id: AtomicU64,
	last_index_id: AtomicU64,
	last_index_column_id: AtomicU64,
	last_transaction_id: AtomicU64,
}

impl IdCounters {
	fn new() -> Self {
		IdCounters {
			last_system_table_id: AtomicU32::new(0),
			last_user_table_id: AtomicU32::new(FIRST_USER_TABLE_ID - 1),
			last_system_column_id: AtomicU64::new(0),
			last_user_column_id: AtomicU64::new(FIRST_USER_COLUMN_ID - 1),
			last_column_set_id: AtomicU64::new(0),
			last_column_set_column_id: AtomicU64::new(0),
			last_column_definition_id: AtomicU64::new(0),
			last_column_def_constraint_id: AtomicU64::new(0),
			last_constraint_id: AtomicU64::new(0),
			last_user_constraint_definition_id: AtomicU64::new(FIRST_USER_CONSTRAINT_DEFINITION_ID - 1),
			last_index_id: AtomicU64::new(0),
			last_index_column_id: AtomicU64::new(0),
			last_transaction_id: AtomicU64::new(0),
		}
	}

	fn recover(&self, reg: &DatabaseRegistries) {
		let max_table_id = reg.tables.max_id();
		if max_table_id >= FIRST_USER_TABLE_ID {
			self.last_user_table_id.store(max_table_id, Ordering::Release);
		}
		let max_system_table_id =
			reg.tables.iter().map(|t| t.id).filter(|id| *id < FIRST_USER_TABLE_ID).max().unwrap_or(0);
		self.last_system_table_id.store(max_system_table_id, Ordering::Release);

		let max_column_id = reg.columns.max_id();
		if max_column_id >= FIRST_USER_COLUMN_ID {
			self.last_user_column_id.store(max_column_id, Ordering::Release);
		}
		let max_system_column_id =
			reg.columns.iter().map(|c| c.id).filter(|id| *id < FIRST_USER_COLUMN_ID).max().unwrap_or(0);
		self.last_system_column_id.store(max_system_column_id, Ordering::Release);

		self.last_column_set_id.store(reg.column_sets.max_id(), Ordering::Release);
		self.last_column_set_column_id.store(reg.column_sets.max_member_id(), Ordering::Release);
		self.last_column_definition_id.store(reg.column_definitions.max_id(), Ordering::Release);
		self.last_column_def_constraint_id.store(reg.column_definitions.max_link_id(), Ordering::Release);
		self.last_constraint_id.store(reg.constraints.max_id(), Ordering::Release);
		let max_user_definition_id = reg.constraint_definitions.max_id();
		if max_user_definition_id >= FIRST_USER_CONSTRAINT_DEFINITION_ID {
			self.last_user_constraint_definition_id.store(max_user_definition_id, Ordering::Release);
		}
		self.last_index_id.store(reg.indices.max_id(), Ordering::Release);
		self.last_index_column_id.store(reg.indices.max_index_column_id(), Ordering::Release);
	}
}

/// Handles to the catalog tables of one database, in creation order.
pub struct CatalogTables {
	/// `SYS_TABLES`.
	pub sys_tables: Arc<Table>,
	/// `SYS_DUMMY`.
	pub sys_dummy: Arc<Table>,
	/// `SYS_COLUMN_SETS`.
	pub sys_column_sets: Arc<Table>,
	/// `SYS_COLUMN_SET_COLUMNS`.
	pub sys_column_set_columns: Arc<Table>,
	/// `SYS_COLUMNS`.
	pub sys_columns: Arc<Table>,
	/// `SYS_COLUMN_DEFS`.
	pub sys_column_defs: Arc<Table>,
	/// `SYS_COLUMN_DEF_CONSTRAINTS`.
	pub sys_column_def_constraints: Arc<Table>,
	/// `SYS_CONSTRAINT_DEFS`.
	pub sys_constraint_defs: Arc<Table>,
	/// `SYS_CONSTRAINTS`.
	pub sys_constraints: Arc<Table>,
	/// `SYS_INDICES`.
	pub sys_indices: Arc<Table>,
	/// `SYS_INDEX_COLUMNS`.
	pub sys_index_columns: Arc<Table>,
}

impl CatalogTables {
	fn ids(&self) -> Vec<u32> {
		[
			&self.sys_tables,
			&self.sys_dummy,
			&self.sys_column_sets,
			&self.sys_column_set_columns,
			&self.sys_columns,
			&self.sys_column_defs,
			&self.sys_column_def_constraints,
			&self.sys_constraint_defs,
			&self.sys_constraints,
			&self.sys_indices,
			&self.sys_index_columns,
		]
		.iter()
		.map(|t| t.id())
		.collect()
	}
}

/// A live database.
pub struct Database {
	id: u32,
	uuid: Uuid,
	name: String,
	cipher_id: String,
	cipher: Option<Arc<dyn Cipher>>,
	cipher_key: Vec<u8>,
	files: FileFactory,
	data_dir: PathBuf,
	description: Option<String>,
	env: DatabaseEnvironment,
	reg: RwLock<DatabaseRegistries>,
	tables: RwLock<HashMap<u32, Arc<Table>>>,
	catalog: RwLock<Option<Arc<CatalogTables>>>,
	counters: IdCounters,
	use_count: AtomicUsize,
}

impl Database {
	/// Creates a new database: directory, cipher key file, catalog tables.
	///
	/// The caller records the tables and publishes the snapshot once every table
	/// exists (the system database adds its extra tables first).
	pub fn create(
		env: DatabaseEnvironment,
		master: &MasterCrypto,
		id: u32,
		name: impl Into<String>,
		cipher_id: impl Into<String>,
		cipher_key: Vec<u8>,
		description: Option<String>,
		uuid: Option<Uuid>,
	) -> DbResult<Arc<Database>> {
		let name = name.into();
		let cipher_id = cipher_id.into();
		let uuid = uuid.unwrap_or_else(|| compute_database_uuid(&name, current_timestamp()));
		debug!(target: "dbengine", "Database {}: creating, uuid {}", name, uuid);

		let cipher = siodb_crypto::get_cipher(&cipher_id)?;
		check_cipher_key(&cipher, &cipher_id, &cipher_key)?;

		let data_dir = env.data_dir.join(format!("{}{}", DATABASE_DIR_PREFIX, uuid));
		std::fs::create_dir_all(&data_dir)
			.map_err(|e| DbError::io(format!("can't create database directory '{}'", data_dir.display()), e))?;

		save_cipher_key_file(&data_dir, master, id, &cipher_id, &cipher_key)?;

		let files = make_file_factory(&cipher, &cipher_key)?;
		let database = Arc::new(Database {
			id,
			uuid,
			name,
			cipher_id,
			cipher,
			cipher_key,
			files,
			data_dir,
			description,
			env,
			reg: RwLock::new(DatabaseRegistries::default()),
			tables: RwLock::new(HashMap::new()),
			catalog: RwLock::new(None),
			counters: IdCounters::new(),
			use_count: AtomicUsize::new(0),
		});

		database.register_system_constraint_definitions();
		database.create_catalog_tables()?;
		Ok(database)
	}

	/// Opens an existing database from its catalog record.
	pub fn open(env: DatabaseEnvironment, master: &MasterCrypto, record: &DatabaseRecord) -> DbResult<Arc<Database>> {
		debug!(target: "dbengine", "Database {}: opening, uuid {}", record.name, record.uuid);
		let data_dir = env.data_dir.join(format!("{}{}", DATABASE_DIR_PREFIX, record.uuid));
		if !data_dir.join(DATABASE_INITIALIZATION_FLAG_FILE).exists() {
			return Err(DbError::internal(
				internal_codes::INTERNAL_ERROR,
				format!("database '{}' is not initialized", record.name),
			));
		}

		let cipher = siodb_crypto::get_cipher(&record.cipher_id)?;
		let cipher_key = load_cipher_key_file(&data_dir, master, &cipher, record)?;
		let files = make_file_factory(&cipher, &cipher_key)?;

		let database = Arc::new(Database {
			id: record.id,
			uuid: record.uuid,
			name: record.name.clone(),
			cipher_id: record.cipher_id.clone(),
			cipher,
			cipher_key,
			files,
			data_dir,
			description: record.description.clone(),
			env,
			reg: RwLock::new(DatabaseRegistries::default()),
			tables: RwLock::new(HashMap::new()),
			catalog: RwLock::new(None),
			counters: IdCounters::new(),
			use_count: AtomicUsize::new(0),
		});

		let catalog_table_ids = database.load_system_objects()?;
		database.counters.recover(&database.reg.read());
		database.open_catalog_tables(&catalog_table_ids)?;
		Ok(database)
	}

	/// Database id.
	pub fn id(&self) -> u32 {
		self.id
	}

	/// Database UUID.
	pub fn uuid(&self) -> Uuid {
		self.uuid
	}

	/// Database name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Cipher id, `none` when encryption is off.
	pub fn cipher_id(&self) -> &str {
		&self.cipher_id
	}

	/// The database cipher, if encryption is on.
	pub fn cipher(&self) -> Option<&Arc<dyn Cipher>> {
		self.cipher.as_ref()
	}

	/// Raw cipher key. Empty when encryption is off.
	pub fn cipher_key(&self) -> &[u8] {
		&self.cipher_key
	}

	/// Optional description.
	pub fn description(&self) -> Option<&str> {
		self.description.as_deref()
	}

	/// Database directory.
	pub fn data_dir(&self) -> &PathBuf {
		&self.data_dir
	}

	/// File factory carrying this database's cipher configuration.
	pub fn file_factory(&self) -> &FileFactory {
		&self.files
	}

	/// Returns true for the system database.
	pub fn is_system_database(&self) -> bool {
		self.id == SYSTEM_DATABASE_ID
	}

	/// Catalog registries, for read-side inspection.
	pub fn registries(&self) -> &RwLock<DatabaseRegistries> {
		&self.reg
	}

	/// Catalog table handles.
	pub fn catalog_tables(&self) -> DbResult<Arc<CatalogTables>> {
		self.catalog.read().clone().ok_or_else(|| {
			DbError::internal(internal_codes::MISSING_SYSTEM_TABLE, format!("database '{}' has no catalog", self.name))
		})
	}

	/// Marks the database as used by one more session.
	pub fn increment_use_count(&self) {
		self.use_count.fetch_add(1, Ordering::AcqRel);
	}

	/// Releases one use of the database.
	pub fn decrement_use_count(&self) {
		self.use_count.fetch_sub(1, Ordering::AcqRel);
	}

	/// Returns true while any session references the database.
	pub fn is_used(&self) -> bool {
		self.use_count.load(Ordering::Acquire) > 0
	}

	/// Fresh transaction attribution for `user_id`.
	pub fn begin_transaction(&self, user_id: u32) -> TransactionParams {
		TransactionParams::new(user_id, self.generate_next_transaction_id(), current_timestamp())
	}

	/// Hands out the next transaction id.
	pub fn generate_next_transaction_id(&self) -> u64 {
		self.counters.last_transaction_id.fetch_add(1, Ordering::AcqRel) + 1
	}

	/// Finds a table by name, materializing the live object on first access.
	pub fn find_table(&self, name: &str) -> DbResult<Option<Arc<Table>>> {
		let record = match self.reg.read().tables.get_by_name(name) {
			Some(record) => record.clone(),
			None => return Ok(None),
		};
		if let Some(table) = self.tables.read().get(&record.id) {
			return Ok(Some(table.clone()));
		}
		let table = self.materialize_table(&record)?;
		self.tables.write().insert(record.id, table.clone());
		Ok(Some(table))
	}

	/// Finds a table by name or fails with a user-visible error.
	pub fn find_table_checked(&self, name: &str) -> DbResult<Arc<Table>> {
		self.find_table(name)?.ok_or_else(|| {
			DbError::user(codes::TABLE_DOES_NOT_EXIST, format!("table '{}'.'{}' does not exist", self.name, name))
		})
	}

	/// Number of tables in the catalog.
	pub fn table_count(&self) -> usize {
		self.reg.read().tables.len()
	}

	// ---- creation internals ----

	fn register_system_constraint_definitions(&self) {
		let mut reg = self.reg.write();
		reg.constraint_definitions.insert(ConstraintDefinitionRecord::new(
			SYSTEM_NOT_NULL_CONSTRAINT_DEFINITION_ID,
			ConstraintType::NotNull,
			vec![1],
		));
	}

	fn create_catalog_tables(&self) -> DbResult<()> {
		let not_null = || vec![ColumnConstraintSpecification::not_null()];
		let plain = Vec::new;
		let area = SYSTEM_TABLE_DATA_AREA_SIZE;
		let id64 = ColumnDataType::UInt64;

		let spec = |name: &str, data_type, constraints: Vec<ColumnConstraintSpecification>| ColumnSpecification {
			name: name.into(),
			data_type,
			data_block_data_area_size: area,
			constraints,
			description: None,
		};

		let sys_tables = self.create_system_table(
			sys_tables::SYS_TABLES,
			FIRST_USER_TABLE_ID as u64,
			vec![
				spec("TYPE", ColumnDataType::UInt8, not_null()),
				spec("NAME", ColumnDataType::Text, not_null()),
				spec("FIRST_USER_TRID", id64, not_null()),
				spec("CURRENT_COLUMN_SET_ID", id64, not_null()),
				spec("DESCRIPTION", ColumnDataType::Text, plain()),
			],
		)?;
		let sys_dummy = self.create_system_table(
			sys_tables::SYS_DUMMY,
			0,
			vec![spec("DUMMY", ColumnDataType::UInt8, not_null())],
		)?;
		let sys_column_sets = self.create_system_table(
			sys_tables::SYS_COLUMN_SETS,
			0,
			vec![spec("TABLE_ID", id64, not_null()), spec("COLUMN_COUNT", id64, not_null())],
		)?;
		let sys_column_set_columns = self.create_system_table(
			sys_tables::SYS_COLUMN_SET_COLUMNS,
			0,
			vec![
				spec("COLUMN_SET_ID", id64, not_null()),
				spec("COLUMN_ID", id64, not_null()),
				spec("COLUMN_DEF_ID", id64, not_null()),
			],
		)?;
		let sys_columns = self.create_system_table(
			sys_tables::SYS_COLUMNS,
			FIRST_USER_COLUMN_ID,
			vec![
				spec("TABLE_ID", id64, not_null()),
				spec("DATA_TYPE", ColumnDataType::UInt8, not_null()),
				spec("NAME", ColumnDataType::Text, not_null()),
				spec("STATE", ColumnDataType::UInt8, not_null()),
				spec("BLOCK_DATA_AREA_SIZE", ColumnDataType::UInt32, not_null()),
				spec("DESCRIPTION", ColumnDataType::Text, plain()),
			],
		)?;
		let sys_column_defs = self.create_system_table(
			sys_tables::SYS_COLUMN_DEFS,
			0,
			vec![spec("COLUMN_ID", id64, not_null()), spec("CONSTRAINT_COUNT", id64, not_null())],
		)?;
		let sys_column_def_constraints = self.create_system_table(
			sys_tables::SYS_COLUMN_DEF_CONSTRAINTS,
			0,
			vec![spec("COLUMN_DEF_ID", id64, not_null()), spec("CONSTRAINT_ID", id64, not_null())],
		)?;
		let sys_constraint_defs = self.create_system_table(
			sys_tables::SYS_CONSTRAINT_DEFS,
			FIRST_USER_CONSTRAINT_DEFINITION_ID,
			vec![spec("TYPE", ColumnDataType::UInt8, not_null()), spec("EXPR", ColumnDataType::Binary, not_null())],
		)?;
		let sys_constraints = self.create_system_table(
			sys_tables::SYS_CONSTRAINTS,
			0,
			vec![
				spec("NAME", ColumnDataType::Text, not_null()),
				spec("STATE", ColumnDataType::UInt8, not_null()),
				spec("TABLE_ID", id64, not_null()),
				spec("COLUMN_ID", id64, not_null()),
				spec("DEF_ID", id64, not_null()),
				spec("DESCRIPTION", ColumnDataType::Text, plain()),
			],
		)?;
		let sys_indices = self.create_system_table(
			sys_tables::SYS_INDICES,
			0,
			vec![
				spec("TYPE", ColumnDataType::UInt8, not_null()),
				spec("UNIQUE", ColumnDataType::UInt8, not_null()),
				spec("NAME", ColumnDataType::Text, not_null()),
				spec("TABLE_ID", id64, not_null()),
				spec("DATA_FILE_SIZE", ColumnDataType::UInt32, not_null()),
				spec("DESCRIPTION", ColumnDataType::Text, plain()),
			],
		)?;
		let sys_index_columns = self.create_system_table(
			sys_tables::SYS_INDEX_COLUMNS,
			0,
			vec![
				spec("INDEX_ID", id64, not_null()),
				spec("COLUMN_DEF_ID", id64, not_null()),
				spec("SORT_DESC", ColumnDataType::UInt8, not_null()),
			],
		)?;

		*self.catalog.write() = Some(Arc::new(CatalogTables {
			sys_tables,
			sys_dummy,
			sys_column_sets,
			sys_column_set_columns,
			sys_columns,
			sys_column_defs,
			sys_column_def_constraints,
			sys_constraint_defs,
			sys_constraints,
			sys_indices,
			sys_index_columns,
		}));
		Ok(())
	}

	/// Creates a system-range table with the given columns and closes its column set.
	pub fn create_system_table(
		&self,
		name: &str,
		first_user_trid: u64,
		column_specs: Vec<ColumnSpecification>,
	) -> DbResult<Arc<Table>> {
		let table = self.create_table_unlocked(name, TableType::Disk, first_user_trid, None, true)?;
		for spec in column_specs {
			self.create_column_unlocked(&table, spec, true)?;
		}
		self.close_current_column_set(&table)?;
		Ok(table)
	}

	/// Creates a table with its master column and main index. Does not close the
	/// column set; the caller adds user columns first.
	pub(crate) fn create_table_unlocked(
		&self,
		name: &str,
		table_type: TableType,
		first_user_trid: u64,
		description: Option<String>,
		system: bool,
	) -> DbResult<Arc<Table>> {
		{
			let reg = self.reg.read();
			if reg.tables.len() >= self.env.max_table_count {
				return Err(DbError::user(
					codes::TOO_MANY_OBJECTS,
					format!("too many tables in database '{}'", self.name),
				));
			}
			if reg.tables.contains_name(name) {
				return Err(DbError::user(
					codes::TABLE_ALREADY_EXISTS,
					format!("table '{}'.'{}' already exists", self.name, name),
				));
			}
		}

		let table_id = if system {
			let id = self.counters.last_system_table_id.fetch_add(1, Ordering::AcqRel) + 1;
			debug_assert!(id < FIRST_USER_TABLE_ID, "system table id range exhausted");
			id
		} else {
			self.counters.last_user_table_id.fetch_add(1, Ordering::AcqRel) + 1
		};

		let data_dir = self.data_dir.join(format!("{}{}", TABLE_DIR_PREFIX, table_id));
		std::fs::create_dir_all(&data_dir)
			.map_err(|e| DbError::io(format!("can't create table data directory '{}'", data_dir.display()), e))?;

		let table = Arc::new(Table::new(
			table_id,
			name,
			table_type,
			first_user_trid,
			description,
			self.name.clone(),
			data_dir,
		));

		// Master column with its main index, then the index catalog entry.
		let master_area_size = if system { SYSTEM_TABLE_DATA_AREA_SIZE } else { DEFAULT_DATA_AREA_SIZE };
		let master_spec = ColumnSpecification {
			name: MASTER_COLUMN_NAME.into(),
			data_type: ColumnDataType::UInt64,
			data_block_data_area_size: master_area_size,
			constraints: Vec::new(),
			description: None,
		};
		let master = self.create_column_on(&table, master_spec, system, true)?;

		{
			let mut reg = self.reg.write();
			reg.tables.insert(TableRecord {
				id: table_id,
				table_type,
				name: name.to_owned(),
				first_user_trid: table.first_user_trid(),
				current_column_set_id: 0,
				description: table.description().map(str::to_owned),
			});

			let master_definition_id = reg
				.column_definitions
				.ids_of_column(master.id())
				.last()
				.copied()
				.expect("master column was just defined; qed");
			let index_id = self.counters.last_index_id.fetch_add(1, Ordering::AcqRel) + 1;
			let index_column_id = self.counters.last_index_column_id.fetch_add(1, Ordering::AcqRel) + 1;
			let mut index_columns = IndexColumnRegistry::new();
			index_columns.insert(IndexColumnRecord {
				id: index_column_id,
				index_id,
				column_definition_id: master_definition_id,
				descending: false,
			});
			reg.indices.insert(IndexRecord {
				id: index_id,
				index_type: IndexType::LinearIndexU64,
				unique: true,
				name: format!("MCI_{}", name),
				table_id,
				data_file_size: INDEX_NODE_SIZE,
				columns: index_columns,
				description: None,
			});
		}

		self.tables.write().insert(table_id, table.clone());
		Ok(table)
	}

	/// Creates a user column on a table being built.
	pub(crate) fn create_column_unlocked(
		&self,
		table: &Arc<Table>,
		spec: ColumnSpecification,
		system: bool,
	) -> DbResult<Arc<Column>> {
		self.create_column_on(table, spec, system, false)
	}

	fn create_column_on(
		&self,
		table: &Arc<Table>,
		spec: ColumnSpecification,
		system: bool,
		master: bool,
	) -> DbResult<Arc<Column>> {
		crate::column::validate_data_area_size(spec.data_block_data_area_size)?;

		let column_id = if system {
			let id = self.counters.last_system_column_id.fetch_add(1, Ordering::AcqRel) + 1;
			debug_assert!(id < FIRST_USER_COLUMN_ID, "system column id range exhausted");
			id
		} else {
			self.counters.last_user_column_id.fetch_add(1, Ordering::AcqRel) + 1
		};

		let column_env = ColumnEnvironment {
			database_name: self.name.clone(),
			database_uuid: self.uuid,
			table_id: table.id(),
			table_name: table.name().to_owned(),
			table_data_dir: table.data_dir().clone(),
			files: self.files.clone(),
			block_cache_capacity: self.env.block_cache_capacity,
		};
		let column = Arc::new(Column::create(
			&column_env,
			column_id,
			&spec.name,
			spec.data_type,
			spec.data_block_data_area_size,
			master,
		)?);
		table.attach_column(column.clone());

		let mut reg = self.reg.write();
		reg.columns.insert(ColumnRecord {
			id: column_id,
			name: spec.name.clone(),
			data_type: spec.data_type,
			table_id: table.id(),
			state: ColumnState::Creating,
			data_block_data_area_size: spec.data_block_data_area_size,
			description: spec.description.clone(),
		});

		// Column definition with the column's constraints.
		let definition_id = self.counters.last_column_definition_id.fetch_add(1, Ordering::AcqRel) + 1;
		let mut definition =
			ColumnDefinitionRecord { id: definition_id, column_id, constraints: Default::default() };
		for constraint_spec in &spec.constraints {
			let constraint_id =
				self.register_constraint(&mut reg, table, &spec.name, column_id, constraint_spec)?;
			let link_id = self.counters.last_column_def_constraint_id.fetch_add(1, Ordering::AcqRel) + 1;
			definition.constraints.insert(ColumnDefinitionConstraintRecord {
				id: link_id,
				column_definition_id: definition_id,
				constraint_id,
			});
		}
		reg.column_definitions.insert(definition);

		Ok(column)
	}

	fn register_constraint(
		&self,
		reg: &mut DatabaseRegistries,
		table: &Arc<Table>,
		column_name: &str,
		column_id: u64,
		spec: &ColumnConstraintSpecification,
	) -> DbResult<u64> {
		// Find or create the shared constraint definition.
		let definition_id =
			match reg.constraint_definitions.find_equal_definition(spec.constraint_type, &spec.expression) {
				Some(definition) => definition.id,
				None => {
					let id = self.counters.last_user_constraint_definition_id.fetch_add(1, Ordering::AcqRel) + 1;
					reg.constraint_definitions.insert(ConstraintDefinitionRecord::new(
						id,
						spec.constraint_type,
						spec.expression.clone(),
					));
					id
				},
			};

		let name = match &spec.name {
			Some(name) => name.clone(),
			None => format!("{}_{}_{}", spec.constraint_type.name_prefix(), table.name(), column_name),
		};
		let constraint_id = self.counters.last_constraint_id.fetch_add(1, Ordering::AcqRel) + 1;
		reg.constraints.insert(ConstraintRecord {
			id: constraint_id,
			name,
			state: ConstraintState::Active,
			table_id: table.id(),
			column_id,
			constraint_definition_id: definition_id,
			description: spec.description.clone(),
		});
		Ok(constraint_id)
	}

	/// Closes the current column set of a table being built: the set now defines
	/// the row shape, and the table's columns become active.
	pub(crate) fn close_current_column_set(&self, table: &Arc<Table>) -> DbResult<()> {
		let mut reg = self.reg.write();
		let column_set_id = self.counters.last_column_set_id.fetch_add(1, Ordering::AcqRel) + 1;
		let mut members = ColumnSetColumnRegistry::new();
		for column in table.columns() {
			let definition_id = reg
				.column_definitions
				.ids_of_column(column.id())
				.last()
				.copied()
				.ok_or_else(|| {
					DbError::internal(
						internal_codes::INTERNAL_ERROR,
						format!("column #{} has no definition", column.id()),
					)
				})?;
			let member_id = self.counters.last_column_set_column_id.fetch_add(1, Ordering::AcqRel) + 1;
			members.insert(ColumnSetColumnRecord {
				id: member_id,
				column_set_id,
				column_id: column.id(),
				column_definition_id: definition_id,
			});

			if let Some(record) = reg.columns.get_by_id(column.id()) {
				if record.state == ColumnState::Creating {
					let mut updated = record.clone();
					updated.state = ColumnState::Active;
					reg.columns.replace(updated);
					column.set_state(ColumnState::Active);
				}
			}
		}
		reg.column_sets.insert(ColumnSetRecord { id: column_set_id, table_id: table.id(), columns: members });

		table.set_current_column_set_id(column_set_id);
		let mut record = reg
			.tables
			.get_by_id(table.id())
			.cloned()
			.ok_or_else(|| {
				DbError::internal(internal_codes::INTERNAL_ERROR, format!("table #{} is not registered", table.id()))
			})?;
		record.current_column_set_id = column_set_id;
		reg.tables.replace(record);
		Ok(())
	}

	/// Pre-creates a genesis data block on every column of every live table.
	pub fn preallocate_all_blocks(&self) -> DbResult<()> {
		let tables: Vec<Arc<Table>> = self.tables.read().values().cloned().collect();
		for table in tables {
			for column in table.columns() {
				debug!(target: "dbengine", "Pre-allocating data block for {}", column.display_name());
				column.preallocate_first_block()?;
			}
		}
		Ok(())
	}

	/// Records every registered table into the catalog tables, in table id order.
	pub fn record_all_tables(&self, tp: &TransactionParams) -> DbResult<()> {
		let tables: Vec<Arc<Table>> = {
			let reg = self.reg.read();
			let mut ids: Vec<u32> = reg.tables.iter().map(|t| t.id).collect();
			ids.sort_unstable();
			let live = self.tables.read();
			ids.iter().filter_map(|id| live.get(id).cloned()).collect()
		};
		for table in tables {
			self.record_table_definition(&table, tp)?;
		}
		Ok(())
	}

	/// Records a table and all its related catalog objects into the catalog tables.
	pub fn record_table_definition(&self, table: &Arc<Table>, tp: &TransactionParams) -> DbResult<()> {
		debug!(target: "dbengine", "Database {}: recording table {}", self.name, table.name());
		let catalog = self.catalog_tables()?;
		let reg = self.reg.read();
		let table_id = table.id();

		let record = reg.tables.get_by_id(table_id).ok_or_else(|| {
			DbError::internal(internal_codes::INTERNAL_ERROR, format!("table #{} is not registered", table_id))
		})?;
		catalog.sys_tables.insert_row(
			&[
				Variant::UInt8(record.table_type as u8),
				Variant::Text(record.name.clone()),
				Variant::UInt64(record.first_user_trid),
				Variant::UInt64(record.current_column_set_id),
				record.description.clone().into(),
			],
			*tp,
			Some(table_id as u64),
		)?;

		for column_set_id in reg.column_sets.ids_of_table(table_id) {
			let column_set = reg.column_sets.get_by_id(column_set_id).expect("id from index; qed");
			catalog.sys_column_sets.insert_row(
				&[Variant::UInt64(table_id as u64), Variant::UInt64(column_set.columns.len() as u64)],
				*tp,
				Some(column_set_id),
			)?;
			for member in column_set.columns.iter() {
				catalog.sys_column_set_columns.insert_row(
					&[
						Variant::UInt64(member.column_set_id),
						Variant::UInt64(member.column_id),
						Variant::UInt64(member.column_definition_id),
					],
					*tp,
					Some(member.id),
				)?;
			}
		}

		for column_id in reg.columns.ids_of_table(table_id) {
			let column = reg.columns.get_by_id(column_id).expect("id from index; qed");
			catalog.sys_columns.insert_row(
				&[
					Variant::UInt64(table_id as u64),
					Variant::UInt8(column.data_type as u8),
					Variant::Text(column.name.clone()),
					Variant::UInt8(column.state as u8),
					Variant::UInt32(column.data_block_data_area_size),
					column.description.clone().into(),
				],
				*tp,
				Some(column_id),
			)?;

			for definition_id in reg.column_definitions.ids_of_column(column_id) {
				let definition = reg.column_definitions.get_by_id(definition_id).expect("id from index; qed");
				catalog.sys_column_defs.insert_row(
					&[Variant::UInt64(column_id), Variant::UInt64(definition.constraints.len() as u64)],
					*tp,
					Some(definition_id),
				)?;
				for link in definition.constraints.iter() {
					catalog.sys_column_def_constraints.insert_row(
						&[Variant::UInt64(link.column_definition_id), Variant::UInt64(link.constraint_id)],
						*tp,
						Some(link.id),
					)?;
				}
			}
		}

		for constraint_id in reg.constraints.ids_of_table(table_id) {
			let constraint = reg.constraints.get_by_id(constraint_id).expect("id from index; qed");

			// Shared constraint definitions are recorded once, on first reference.
			let definition_recorded = {
				let master = catalog.sys_constraint_defs.master_column();
				let index = master.main_index()?;
				let present = index.lock().find(constraint.constraint_definition_id).is_some();
				present
			};
			if !definition_recorded {
				let definition = reg
					.constraint_definitions
					.get_by_id(constraint.constraint_definition_id)
					.ok_or_else(|| {
						DbError::internal(
							internal_codes::INTERNAL_ERROR,
							format!("constraint definition #{} is missing", constraint.constraint_definition_id),
						)
					})?;
				catalog.sys_constraint_defs.insert_row(
					&[Variant::UInt8(definition.constraint_type as u8), Variant::Binary(definition.expression.clone())],
					*tp,
					Some(definition.id),
				)?;
			}

			catalog.sys_constraints.insert_row(
				&[
					Variant::Text(constraint.name.clone()),
					Variant::UInt8(constraint.state as u8),
					Variant::UInt64(constraint.table_id as u64),
					Variant::UInt64(constraint.column_id),
					Variant::UInt64(constraint.constraint_definition_id),
					constraint.description.clone().into(),
				],
				*tp,
				Some(constraint_id),
			)?;
		}

		for index_id in reg.indices.ids_of_table(table_id) {
			let index = reg.indices.get_by_id(index_id).expect("id from index; qed");
			catalog.sys_indices.insert_row(
				&[
					Variant::UInt8(index.index_type as u8),
					Variant::UInt8(index.unique as u8),
					Variant::Text(index.name.clone()),
					Variant::UInt64(index.table_id as u64),
					Variant::UInt32(index.data_file_size),
					index.description.clone().into(),
				],
				*tp,
				Some(index_id),
			)?;
			for column in index.columns.iter() {
				catalog.sys_index_columns.insert_row(
					&[
						Variant::UInt64(column.index_id),
						Variant::UInt64(column.column_definition_id),
						Variant::UInt8(column.descending as u8),
					],
					*tp,
					Some(column.id),
				)?;
			}
		}

		Ok(())
	}

	// ---- open internals ----

	fn open_catalog_tables(&self, catalog_table_ids: &[u32]) -> DbResult<()> {
		let mut tables = Vec::with_capacity(catalog_table_ids.len());
		for &id in catalog_table_ids {
			let record = self.reg.read().tables.get_by_id(id).cloned().ok_or_else(|| {
				DbError::internal(
					internal_codes::MISSING_SYSTEM_TABLE,
					format!("database '{}': missing catalog table #{}", self.name, id),
				)
			})?;
			let table = self.materialize_table(&record)?;
			self.tables.write().insert(id, table.clone());
			tables.push(table);
		}
		if tables.len() != 11 {
			return Err(DbError::internal(
				internal_codes::MISSING_SYSTEM_TABLE,
				format!("database '{}': expected 11 catalog tables, found {}", self.name, tables.len()),
			));
		}
		let mut iter = tables.into_iter();
		*self.catalog.write() = Some(Arc::new(CatalogTables {
			sys_tables: iter.next().expect("length checked; qed"),
			sys_dummy: iter.next().expect("length checked; qed"),
			sys_column_sets: iter.next().expect("length checked; qed"),
			sys_column_set_columns: iter.next().expect("length checked; qed"),
			sys_columns: iter.next().expect("length checked; qed"),
			sys_column_defs: iter.next().expect("length checked; qed"),
			sys_column_def_constraints: iter.next().expect("length checked; qed"),
			sys_constraint_defs: iter.next().expect("length checked; qed"),
			sys_constraints: iter.next().expect("length checked; qed"),
			sys_indices: iter.next().expect("length checked; qed"),
			sys_index_columns: iter.next().expect("length checked; qed"),
		}));
		Ok(())
	}

	/// Builds a live table from its catalog records.
	fn materialize_table(&self, record: &TableRecord) -> DbResult<Arc<Table>> {
		let reg = self.reg.read();
		let column_set = reg.column_sets.get_by_id(record.current_column_set_id).ok_or_else(|| {
			DbError::internal(
				internal_codes::INTERNAL_ERROR,
				format!("table '{}': missing column set #{}", record.name, record.current_column_set_id),
			)
		})?;

		let data_dir = self.data_dir.join(format!("{}{}", TABLE_DIR_PREFIX, record.id));
		let table = Arc::new(Table::new(
			record.id,
			record.name.clone(),
			record.table_type,
			record.first_user_trid,
			record.description.clone(),
			self.name.clone(),
			data_dir,
		));
		table.set_current_column_set_id(column_set.id);

		let column_env = ColumnEnvironment {
			database_name: self.name.clone(),
			database_uuid: self.uuid,
			table_id: record.id,
			table_name: record.name.clone(),
			table_data_dir: table.data_dir().clone(),
			files: self.files.clone(),
			block_cache_capacity: self.env.block_cache_capacity,
		};

		for (position, member) in column_set.columns.iter().enumerate() {
			let column_record = reg.columns.get_by_id(member.column_id).ok_or_else(|| {
				DbError::internal(
					internal_codes::INTERNAL_ERROR,
					format!("table '{}': missing column #{}", record.name, member.column_id),
				)
			})?;
			let master = position == 0;
			let column = Arc::new(Column::open(&column_env, column_record, master)?);
			table.attach_column(column);
		}

		table.init_trid_counters_from_index()?;
		Ok(table)
	}

	// ---- persistence of the catalog snapshot ----

	/// Saves the system objects file cross-linking the catalog tables.
	pub fn save_system_objects(&self) -> DbResult<()> {
		let record = {
			let reg = self.reg.read();
			let catalog = self.catalog_tables()?;
			let mut record = SystemObjectsRecord { catalog_table_ids: catalog.ids(), ..Default::default() };
			for table in reg.tables.iter() {
				record.tables.insert(table.clone());
			}
			for column_set in reg.column_sets.iter() {
				record.column_sets.insert(column_set.clone());
			}
			for column in reg.columns.iter() {
				record.columns.insert(column.clone());
			}
			for definition in reg.column_definitions.iter() {
				record.column_definitions.insert(definition.clone());
			}
			for constraint in reg.constraints.iter() {
				record.constraints.insert(constraint.clone());
			}
			for definition in reg.constraint_definitions.iter() {
				record.constraint_definitions.insert(definition.clone());
			}
			for index in reg.indices.iter() {
				record.indices.insert(index.clone());
			}
			record
		};
		let bytes = serialize_record(&record);

		let path = self.data_dir.join(SYSTEM_OBJECTS_FILE_NAME);
		let tmp_path = self.data_dir.join(format!("{}.tmp", SYSTEM_OBJECTS_FILE_NAME));
		let _ = std::fs::remove_file(&tmp_path);
		let file = self.files.create_file(&tmp_path, 0, 0o660, bytes.len() as u64).map_err(|e| {
			DbError::io(format!("can't create system objects file '{}'", tmp_path.display()), e)
		})?;
		let mut size_prefix = Vec::with_capacity(10);
		siodb_codec::encode_varint(bytes.len() as u64, &mut size_prefix);
		file.write_all_at(&size_prefix, 0)
			.and_then(|_| file.write_all_at(&bytes, size_prefix.len() as u64))
			.and_then(|_| file.flush())
			.map_err(|e| DbError::io(format!("can't write system objects file '{}'", tmp_path.display()), e))?;
		drop(file);
		std::fs::rename(&tmp_path, &path)
			.map_err(|e| DbError::io(format!("can't publish system objects file '{}'", path.display()), e))?;
		Ok(())
	}

	/// Loads the system objects file into the registries. Returns the catalog
	/// table ids in creation order.
	fn load_system_objects(&self) -> DbResult<Vec<u32>> {
		let path = self.data_dir.join(SYSTEM_OBJECTS_FILE_NAME);
		let file = self
			.files
			.open_file(&path, 0)
			.map_err(|e| DbError::io(format!("can't open system objects file '{}'", path.display()), e))?;
		let file_len = file.len().map_err(|e| DbError::io("can't stat system objects file", e))?;
		let mut raw = vec![0u8; file_len as usize];
		file.read_exact_at(&mut raw, 0)
			.map_err(|e| DbError::io(format!("can't read system objects file '{}'", path.display()), e))?;

		let (payload_len, consumed) = siodb_codec::decode_varint(&raw).map_err(|e| {
			DbError::internal(
				internal_codes::CORRUPTED_RECORD,
				format!("corrupted system objects file '{}': {}", path.display(), e),
			)
		})?;
		let end = consumed + payload_len as usize;
		if end > raw.len() {
			return Err(DbError::internal(
				internal_codes::CORRUPTED_RECORD,
				format!("corrupted system objects file '{}': truncated payload", path.display()),
			));
		}
		let (record, _) = deserialize_record::<SystemObjectsRecord>(&raw[consumed..end])?;

		let mut reg = self.reg.write();
		reg.tables = record.tables;
		reg.column_sets = record.column_sets;
		reg.columns = record.columns;
		reg.column_definitions = record.column_definitions;
		reg.constraints = record.constraints;
		reg.constraint_definitions = record.constraint_definitions;
		reg.indices = record.indices;
		Ok(record.catalog_table_ids)
	}

	/// Writes the database initialization flag file.
	pub fn create_initialization_flag_file(&self) -> DbResult<()> {
		let path = self.data_dir.join(DATABASE_INITIALIZATION_FLAG_FILE);
		let contents = format!("\"{}\"\n{}\n{}\n", self.name, self.uuid, current_timestamp());
		std::fs::write(&path, contents)
			.map_err(|e| DbError::io(format!("can't create initialization flag file '{}'", path.display()), e))
	}

	/// Flushes every live table.
	pub fn flush(&self) -> DbResult<()> {
		let tables: Vec<Arc<Table>> = self.tables.read().values().cloned().collect();
		for table in tables {
			table.flush()?;
		}
		Ok(())
	}

	/// Catalog record of this database.
	pub fn to_record(&self) -> DatabaseRecord {
		DatabaseRecord {
			id: self.id,
			uuid: self.uuid,
			name: self.name.clone(),
			cipher_id: self.cipher_id.clone(),
			description: self.description.clone(),
		}
	}

	pub(crate) fn forget_table(&self, table_id: u32) {
		self.tables.write().remove(&table_id);
	}
}

/// Computes a database UUID from its name and creation timestamp (MD5-based,
/// UUID version 3).
pub fn compute_database_uuid(name: &str, create_timestamp: u64) -> Uuid {
	let material = format!("{}:{}", name, create_timestamp);
	Uuid::new_v3(&Uuid::NAMESPACE_OID, material.as_bytes())
}

fn check_cipher_key(cipher: &Option<Arc<dyn Cipher>>, cipher_id: &str, key: &[u8]) -> DbResult<()> {
	match cipher {
		Some(cipher) if cipher.key_size() != key.len() => Err(DbError::internal(
			internal_codes::INVALID_CIPHER_KEY,
			format!("cipher '{}' requires a {}-byte key, got {}", cipher_id, cipher.key_size(), key.len()),
		)),
		None if !key.is_empty() => Err(DbError::internal(
			internal_codes::INVALID_CIPHER_KEY,
			"cipher key given but encryption is off".to_owned(),
		)),
		_ => Ok(()),
	}
}

fn make_file_factory(cipher: &Option<Arc<dyn Cipher>>, key: &[u8]) -> DbResult<FileFactory> {
	match cipher {
		Some(cipher) => Ok(FileFactory::encrypted(
			cipher.create_encryption_context(key)?,
			cipher.create_decryption_context(key)?,
		)),
		None => Ok(FileFactory::plaintext()),
	}
}

fn save_cipher_key_file(
	data_dir: &std::path::Path,
	master: &MasterCrypto,
	database_id: u32,
	cipher_id: &str,
	key: &[u8],
) -> DbResult<()> {
	let record = CipherKeyRecord {
		id: CipherKeyRecord::record_id_for_database(database_id),
		cipher_id: cipher_id.to_owned(),
		key: key.to_vec(),
	};
	let encrypted = master.encrypt_with_master(&serialize_record(&record))?;
	let path = data_dir.join(CIPHER_KEY_FILE_NAME);
	std::fs::write(&path, encrypted)
		.map_err(|e| DbError::io(format!("can't write cipher key file '{}'", path.display()), e))
}

fn load_cipher_key_file(
	data_dir: &std::path::Path,
	master: &MasterCrypto,
	cipher: &Option<Arc<dyn Cipher>>,
	record: &DatabaseRecord,
) -> DbResult<Vec<u8>> {
	let path = data_dir.join(CIPHER_KEY_FILE_NAME);
	let metadata = std::fs::metadata(&path)
		.map_err(|e| DbError::io(format!("can't stat cipher key file '{}'", path.display()), e))?;
	if metadata.len() == 0 || metadata.len() > MAX_CIPHER_KEY_FILE_SIZE {
		return Err(DbError::internal(
			internal_codes::INVALID_CIPHER_KEY,
			format!("cipher key file '{}' has invalid size {}", path.display(), metadata.len()),
		));
	}
	let raw = std::fs::read(&path)
		.map_err(|e| DbError::io(format!("can't read cipher key file '{}'", path.display()), e))?;
	let decrypted = master.decrypt_with_master(&raw)?;
	let (key_record, _) = deserialize_record::<CipherKeyRecord>(&decrypted)?;

	if key_record.cipher_id != record.cipher_id {
		return Err(DbError::internal(
			internal_codes::INVALID_CIPHER_KEY,
			format!(
				"database '{}': cipher key file names cipher '{}', database uses '{}'",
				record.name, key_record.cipher_id, record.cipher_id
			),
		));
	}
	if let Some(cipher) = cipher {
		if key_record.key.len() != cipher.key_size() {
			return Err(DbError::internal(
				internal_codes::INVALID_CIPHER_KEY,
				format!(
					"database '{}': cipher key length {} does not match cipher '{}'",
					record.name,
					key_record.key.len(),
					record.cipher_id
				),
			));
		}
	}
	Ok(key_record.key)
}
