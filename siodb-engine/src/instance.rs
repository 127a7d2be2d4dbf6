// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Instance control.
//!
//! The instance opens its metadata file, loads the master cipher, creates or
//! loads the system database and the super user, and serves database and user
//! lookups through LRU caches over the registries.

use std::{
	fs,
	io::Read,
	num::NonZeroUsize,
	path::{Path, PathBuf},
	sync::Arc,
};

use log::{debug, info, warn};
use lru::LruCache;
use memmap2::MmapMut;
use parking_lot::{Mutex, RwLock};
use rand::RngCore;
use siodb_columnstore::MainIndex;
use uuid::Uuid;

use crate::{
	constants::{
		CURRENT_METADATA_VERSION, DATABASE_DIR_PREFIX, FIRST_USER_DATABASE_ID,
		INSTANCE_INITIALIZATION_FLAG_FILE, MAX_USER_ACCESS_KEY_SIZE, METADATA_FILE_NAME, METADATA_FILE_SIZE,
		SUPER_USER_ID, SUPER_USER_INITIAL_ACCESS_KEY_NAME, SUPER_USER_NAME, SYSTEM_DATABASE_UUID,
	},
	database::{Database, DatabaseEnvironment},
	error::{codes, internal_codes, DbError, DbResult},
	options::{validate_instance_name, SiodbOptions},
	permission::{validate_permission_mask, UserPermissionKey},
	reg::{DatabaseRegistry, UserAccessKeyRecord, UserAccessKeyRegistry, UserPermissionRecord, UserRecord, UserRegistry},
	session::SessionRegistry,
	system_database::SystemDatabase,
	table::current_timestamp,
	user::User,
};

use siodb_crypto::{Cipher, CipherContext};

/// Number of databases kept materialized in the cache.
const DATABASE_CACHE_CAPACITY: usize = 16;

/// Number of users kept materialized in the cache.
const USER_CACHE_CAPACITY: usize = 64;

/// The instance master cipher with its key schedule.
///
/// The master cipher envelope-encrypts per-database cipher keys. With no master
/// cipher both transforms are identity copies.
pub struct MasterCrypto {
	cipher: Option<Arc<dyn Cipher>>,
	encryption: Option<Arc<dyn CipherContext>>,
	decryption: Option<Arc<dyn CipherContext>>,
}

impl MasterCrypto {
	/// New master crypto from an optional cipher and its key.
	pub fn new(cipher: Option<Arc<dyn Cipher>>, key: &[u8]) -> DbResult<Self> {
		match cipher {
			Some(cipher) => {
				if key.len() != cipher.key_size() {
					return Err(DbError::internal(
						internal_codes::INVALID_CIPHER_KEY,
						format!(
							"master cipher '{}' requires a {}-byte key, got {}",
							cipher.cipher_id(),
							cipher.key_size(),
							key.len()
						),
					));
				}
				let encryption = cipher.create_encryption_context(key)?;
				let decryption = cipher.create_decryption_context(key)?;
				Ok(MasterCrypto { cipher: Some(cipher), encryption: Some(encryption), decryption: Some(decryption) })
			},
			None => Ok(MasterCrypto { cipher: None, encryption: None, decryption: None }),
		}
	}

	/// The master cipher, if encryption is on.
	pub fn cipher(&self) -> Option<&Arc<dyn Cipher>> {
		self.cipher.as_ref()
	}

	/// Encrypts `data` under the master key.
	///
	/// Whole blocks are transformed directly; a trailing partial block is
	/// zero-padded in a scratch buffer and encrypted as one additional block.
	pub fn encrypt_with_master(&self, data: &[u8]) -> DbResult<Vec<u8>> {
		let encryption = match &self.encryption {
			Some(encryption) => encryption,
			None => return Ok(data.to_vec()),
		};
		if data.is_empty() {
			return Ok(Vec::new());
		}
		let block_size = encryption.block_size();
		let remainder = data.len() % block_size;
		let whole = data.len() - remainder;
		let out_len = if remainder == 0 { whole } else { whole + block_size };

		let mut out = vec![0u8; out_len];
		if whole > 0 {
			encryption.transform(&data[..whole], whole / block_size, &mut out[..whole])?;
		}
		if remainder > 0 {
			let mut scratch = vec![0u8; block_size];
			scratch[..remainder].copy_from_slice(&data[whole..]);
			encryption.transform(&scratch, 1, &mut out[whole..])?;
		}
		Ok(out)
	}

	/// Decrypts `data` under the master key.
	///
	/// The input length must be a multiple of the master block size.
	pub fn decrypt_with_master(&self, data: &[u8]) -> DbResult<Vec<u8>> {
		let decryption = match &self.decryption {
			Some(decryption) => decryption,
			None => return Ok(data.to_vec()),
		};
		if data.is_empty() {
			return Ok(Vec::new());
		}
		let block_size = decryption.block_size();
		if data.len() % block_size != 0 {
			return Err(DbError::user(codes::INVALID_DATA_SIZE, "invalid data size".to_owned()));
		}
		let mut out = vec![0u8; data.len()];
		decryption.transform(data, data.len() / block_size, &mut out)?;
		Ok(out)
	}
}

/// Memory-mapped instance metadata file with a versioned header.
pub struct InstanceMetadata {
	mmap: MmapMut,
}

impl InstanceMetadata {
	/// Creates the metadata file with the current version.
	pub fn create(path: &Path) -> DbResult<Self> {
		let file = fs::OpenOptions::new()
			.read(true)
			.write(true)
			.create_new(true)
			.open(path)
			.map_err(|e| DbError::io(format!("can't create metadata file '{}'", path.display()), e))?;
		file.set_len(METADATA_FILE_SIZE)
			.map_err(|e| DbError::io(format!("can't size metadata file '{}'", path.display()), e))?;
		// SAFETY: the mapping is private to this process and backed by a regular file.
		let mut mmap = unsafe { MmapMut::map_mut(&file) }
			.map_err(|e| DbError::io(format!("can't map metadata file '{}'", path.display()), e))?;
		mmap[..4].copy_from_slice(&CURRENT_METADATA_VERSION.to_le_bytes());
		mmap.flush().map_err(|e| DbError::io("can't flush metadata file", e))?;
		Ok(InstanceMetadata { mmap })
	}

	/// Opens an existing metadata file and validates its version.
	pub fn open(path: &Path) -> DbResult<Self> {
		let file = fs::OpenOptions::new()
			.read(true)
			.write(true)
			.open(path)
			.map_err(|e| DbError::io(format!("can't open metadata file '{}'", path.display()), e))?;
		// SAFETY: the mapping is private to this process and backed by a regular file.
		let mmap = unsafe { MmapMut::map_mut(&file) }
			.map_err(|e| DbError::io(format!("can't map metadata file '{}'", path.display()), e))?;
		if mmap.len() < 4 {
			return Err(DbError::internal(
				internal_codes::CORRUPTED_RECORD,
				format!("metadata file '{}' is too short", path.display()),
			));
		}
		let metadata = InstanceMetadata { mmap };
		let version = metadata.version();
		if version > CURRENT_METADATA_VERSION {
			return Err(DbError::internal(
				internal_codes::CORRUPTED_RECORD,
				format!("metadata file '{}' has unsupported version {}", path.display(), version),
			));
		}
		Ok(metadata)
	}

	/// Metadata format version.
	pub fn version(&self) -> u32 {
		let mut raw = [0u8; 4];
		raw.copy_from_slice(&self.mmap[..4]);
		u32::from_le_bytes(raw)
	}

	/// Flushes the mapping to disk.
	pub fn flush(&self) -> DbResult<()> {
		self.mmap.flush().map_err(|e| DbError::io("can't flush metadata file", e))
	}
}

/// The database instance: process-wide root object of the storage engine.
pub struct Instance {
	uuid: Uuid,
	name: String,
	data_dir: PathBuf,
	default_database_cipher_id: String,
	system_database_cipher_id: String,
	master: MasterCrypto,
	max_users: usize,
	max_databases: usize,
	env: DatabaseEnvironment,
	metadata: Mutex<InstanceMetadata>,
	system_database: Arc<SystemDatabase>,
	database_registry: RwLock<DatabaseRegistry>,
	databases: Mutex<LruCache<u32, Arc<Database>>>,
	user_registry: RwLock<UserRegistry>,
	users: Mutex<LruCache<u32, Arc<User>>>,
	sessions: SessionRegistry,
}

impl Instance {
	/// Creates or loads the instance described by `options`.
	pub fn new(options: SiodbOptions) -> DbResult<Arc<Instance>> {
		validate_instance_name(&options.general.name)?;
		let data_dir = options.general.data_directory.clone();
		ensure_data_dir(&data_dir)?;

		let master_cipher = siodb_crypto::get_cipher(&options.encryption.master_cipher_id)?;
		let master_key = match &master_cipher {
			Some(cipher) =>
				if options.encryption.master_cipher_key.is_empty() {
					load_master_cipher_key(&options.master_cipher_key_path(), cipher.key_size())?
				} else {
					options.encryption.master_cipher_key.clone()
				},
			None => Vec::new(),
		};
		let master = MasterCrypto::new(master_cipher, &master_key)?;

		let super_user_initial_access_key = if options.general.super_user_initial_access_key.is_empty() {
			load_super_user_initial_access_key(&options.initial_access_key_path())?
		} else {
			options.general.super_user_initial_access_key.clone()
		};

		let env = DatabaseEnvironment {
			data_dir: data_dir.clone(),
			block_cache_capacity: options.io_manager.block_cache_capacity,
			max_table_count: options.io_manager.max_table_count_per_database,
			allow_user_tables_in_system_database: options.general.allow_creating_user_tables_in_system_database,
		};

		let initialized = data_dir.join(INSTANCE_INITIALIZATION_FLAG_FILE).exists();
		let instance = if initialized {
			Self::load(options, data_dir, master, super_user_initial_access_key, env)?
		} else {
			Self::create(options, data_dir, master, super_user_initial_access_key, env)?
		};
		instance.check_data_consistency()?;
		Ok(instance)
	}

	fn create(
		options: SiodbOptions,
		data_dir: PathBuf,
		master: MasterCrypto,
		super_user_initial_access_key: String,
		env: DatabaseEnvironment,
	) -> DbResult<Arc<Instance>> {
		info!(target: "dbengine", "Instance '{}': creating new instance data", options.general.name);
		let metadata = InstanceMetadata::create(&data_dir.join(METADATA_FILE_NAME))?;
		let uuid = Uuid::new_v4();

		// System database with a fresh random key when encryption is on.
		let system_cipher = siodb_crypto::get_cipher(&options.encryption.system_db_cipher_id)?;
		let system_db_key = match &system_cipher {
			Some(cipher) => {
				let mut key = vec![0u8; cipher.key_size()];
				rand::thread_rng().fill_bytes(&mut key);
				key
			},
			None => Vec::new(),
		};
		let system_database =
			SystemDatabase::create(env.clone(), &master, &options.encryption.system_db_cipher_id, system_db_key)?;

		// Super user with its initial access key under the reserved id 1.
		debug!(target: "dbengine", "Instance '{}': creating super user", options.general.name);
		let mut access_keys = UserAccessKeyRegistry::new();
		access_keys.insert(UserAccessKeyRecord {
			id: 1,
			user_id: SUPER_USER_ID,
			name: SUPER_USER_INITIAL_ACCESS_KEY_NAME.to_owned(),
			text: super_user_initial_access_key,
			active: true,
			description: None,
		});
		let super_user = UserRecord {
			id: SUPER_USER_ID,
			name: SUPER_USER_NAME.to_owned(),
			real_name: None,
			description: Some("Super user".to_owned()),
			active: true,
			access_keys,
			tokens: Default::default(),
		};

		let tp = system_database.database().begin_transaction(SUPER_USER_ID);
		system_database.record_user(&super_user, &tp)?;
		for key in super_user.access_keys.iter() {
			system_database.record_user_access_key(key, &tp)?;
		}

		let mut user_registry = UserRegistry::new();
		user_registry.insert(super_user);
		let mut database_registry = DatabaseRegistry::new();
		database_registry.insert(system_database.database().to_record());

		metadata.flush()?;
		create_initialization_flag_file(&data_dir, &options.general.name, uuid)?;

		Ok(Arc::new(Instance {
			uuid,
			name: options.general.name,
			data_dir,
			default_database_cipher_id: options.encryption.default_cipher_id,
			system_database_cipher_id: options.encryption.system_db_cipher_id,
			master,
			max_users: options.io_manager.max_users,
			max_databases: options.io_manager.max_databases,
			env,
			metadata: Mutex::new(metadata),
			system_database,
			database_registry: RwLock::new(database_registry),
			databases: Mutex::new(new_cache(DATABASE_CACHE_CAPACITY)),
			user_registry: RwLock::new(user_registry),
			users: Mutex::new(new_cache(USER_CACHE_CAPACITY)),
			sessions: SessionRegistry::new(),
		}))
	}

	fn load(
		options: SiodbOptions,
		data_dir: PathBuf,
		master: MasterCrypto,
		_super_user_initial_access_key: String,
		env: DatabaseEnvironment,
	) -> DbResult<Arc<Instance>> {
		info!(target: "dbengine", "Instance '{}': loading instance data", options.general.name);
		let uuid = check_initialization_flag_file(&data_dir, &options.general.name)?;
		let metadata = InstanceMetadata::open(&data_dir.join(METADATA_FILE_NAME))?;

		let system_database =
			SystemDatabase::open(env.clone(), &master, &options.encryption.system_db_cipher_id)?;

		let database_registry = system_database.read_all_databases()?;
		let recorded_system = database_registry.get_by_id(crate::constants::SYSTEM_DATABASE_ID);
		if recorded_system.map(|r| r.uuid) != Some(SYSTEM_DATABASE_UUID) {
			return Err(DbError::internal(
				internal_codes::INTERNAL_ERROR,
				"SYS_DATABASES does not record the system database".to_owned(),
			));
		}

		let user_registry = system_database.read_all_users()?;
		if user_registry.get_by_id(SUPER_USER_ID).is_none() {
			return Err(DbError::internal(internal_codes::INTERNAL_ERROR, "super user is missing".to_owned()));
		}

		Ok(Arc::new(Instance {
			uuid,
			name: options.general.name,
			data_dir,
			default_database_cipher_id: options.encryption.default_cipher_id,
			system_database_cipher_id: options.encryption.system_db_cipher_id,
			master,
			max_users: options.io_manager.max_users,
			max_databases: options.io_manager.max_databases,
			env,
			metadata: Mutex::new(metadata),
			system_database,
			database_registry: RwLock::new(database_registry),
			databases: Mutex::new(new_cache(DATABASE_CACHE_CAPACITY)),
			user_registry: RwLock::new(user_registry),
			users: Mutex::new(new_cache(USER_CACHE_CAPACITY)),
			sessions: SessionRegistry::new(),
		}))
	}

	/// Instance UUID.
	pub fn uuid(&self) -> Uuid {
		self.uuid
	}

	/// Instance name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Instance data directory.
	pub fn data_dir(&self) -> &PathBuf {
		&self.data_dir
	}

	/// Master crypto of this instance.
	pub fn master_crypto(&self) -> &MasterCrypto {
		&self.master
	}

	/// Cipher id used for new databases when none is given.
	pub fn default_database_cipher_id(&self) -> &str {
		&self.default_database_cipher_id
	}

	/// Cipher id of the system database.
	pub fn system_database_cipher_id(&self) -> &str {
		&self.system_database_cipher_id
	}

	/// Metadata file version.
	pub fn metadata_version(&self) -> u32 {
		self.metadata.lock().version()
	}

	/// The system database.
	pub fn system_database(&self) -> &Arc<SystemDatabase> {
		&self.system_database
	}

	/// Known-database registry, for read-side inspection.
	pub fn database_registry(&self) -> &RwLock<DatabaseRegistry> {
		&self.database_registry
	}

	/// Known-user registry, for read-side inspection.
	pub fn user_registry(&self) -> &RwLock<UserRegistry> {
		&self.user_registry
	}

	// ---- databases ----

	/// Finds a database by name, materializing it on a cache miss.
	pub fn find_database(&self, name: &str) -> DbResult<Option<Arc<Database>>> {
		let record = match self.database_registry.read().get_by_name(name) {
			Some(record) => record.clone(),
			None => return Ok(None),
		};
		if record.id == crate::constants::SYSTEM_DATABASE_ID {
			return Ok(Some(self.system_database.database().clone()));
		}
		let mut cache = self.databases.lock();
		if let Some(database) = cache.get(&record.id) {
			return Ok(Some(database.clone()));
		}
		let database = Database::open(self.env.clone(), &self.master, &record)?;
		cache.put(record.id, database.clone());
		Ok(Some(database))
	}

	/// Finds a database by name or fails with a user-visible error.
	pub fn find_database_checked(&self, name: &str) -> DbResult<Arc<Database>> {
		self.find_database(name)?
			.ok_or_else(|| DbError::user(codes::DATABASE_DOES_NOT_EXIST, format!("database '{}' does not exist", name)))
	}

	/// Creates a database.
	pub fn create_database(
		&self,
		name: &str,
		cipher_id: Option<String>,
		cipher_key: Option<Vec<u8>>,
		description: Option<String>,
		current_user_id: u32,
	) -> DbResult<Arc<Database>> {
		if !crate::database::is_valid_database_object_name(name) {
			return Err(DbError::user(codes::INVALID_OBJECT_NAME, format!("invalid database name '{}'", name)));
		}
		{
			let registry = self.database_registry.read();
			if registry.contains_name(name) {
				return Err(DbError::user(
					codes::DATABASE_ALREADY_EXISTS,
					format!("database '{}' already exists", name),
				));
			}
			if registry.len() >= self.max_databases {
				return Err(DbError::user(codes::TOO_MANY_OBJECTS, "too many databases".to_owned()));
			}
		}

		let cipher_id = cipher_id.unwrap_or_else(|| self.default_database_cipher_id.clone());
		let cipher = siodb_crypto::get_cipher(&cipher_id)?;
		let cipher_key = match (&cipher, cipher_key) {
			(Some(_), Some(key)) => key,
			(Some(cipher), None) => {
				let mut key = vec![0u8; cipher.key_size()];
				rand::thread_rng().fill_bytes(&mut key);
				key
			},
			(None, _) => Vec::new(),
		};

		let id = self.system_database.generate_next_database_id(false);
		debug_assert!(id >= FIRST_USER_DATABASE_ID);
		let database =
			Database::create(self.env.clone(), &self.master, id, name, cipher_id, cipher_key, description, None)?;

		let tp = database.begin_transaction(current_user_id);
		database.preallocate_all_blocks()?;
		database.record_all_tables(&tp)?;
		database.save_system_objects()?;
		database.create_initialization_flag_file()?;

		let record = database.to_record();
		let system_tp = self.system_database.database().begin_transaction(current_user_id);
		self.system_database.record_database(&record, &system_tp)?;
		self.database_registry.write().insert(record);
		self.databases.lock().put(id, database.clone());
		Ok(database)
	}

	/// Drops a database. Rejected while the database is used by any session.
	pub fn drop_database(&self, name: &str, database_must_exist: bool, current_user_id: u32) -> DbResult<()> {
		let record = match self.database_registry.read().get_by_name(name) {
			Some(record) => record.clone(),
			None => {
				if !database_must_exist {
					return Ok(());
				}
				return Err(DbError::user(
					codes::DATABASE_DOES_NOT_EXIST,
					format!("database '{}' does not exist", name),
				));
			},
		};
		if record.id == crate::constants::SYSTEM_DATABASE_ID {
			return Err(DbError::user(
				codes::CANNOT_DROP_SYSTEM_DATABASE,
				"the system database cannot be dropped".to_owned(),
			));
		}
		if let Some(database) = self.databases.lock().peek(&record.id) {
			if database.is_used() {
				return Err(DbError::user(codes::DATABASE_IN_USE, format!("database '{}' is in use", name)));
			}
		}

		let tp = self.system_database.database().begin_transaction(current_user_id);
		self.system_database.delete_database(record.id, &tp)?;
		self.database_registry.write().erase(record.id);
		self.databases.lock().pop(&record.id);

		let dir = self.data_dir.join(format!("{}{}", DATABASE_DIR_PREFIX, record.uuid));
		if let Err(e) = fs::remove_dir_all(&dir) {
			warn!(target: "dbengine", "DROP DATABASE {}: can't remove data directory '{}': {}", name, dir.display(), e);
		}
		Ok(())
	}

	// ---- users ----

	/// Finds a user by name, materializing it on a cache miss.
	pub fn find_user(&self, name: &str) -> DbResult<Option<Arc<User>>> {
		let id = match self.user_registry.read().get_by_name(name) {
			Some(record) => record.id,
			None => return Ok(None),
		};
		self.find_user_by_id(id)
	}

	/// Finds a user by id, materializing it on a cache miss.
	pub fn find_user_by_id(&self, id: u32) -> DbResult<Option<Arc<User>>> {
		if let Some(user) = self.users.lock().get(&id) {
			return Ok(Some(user.clone()));
		}
		let record = match self.user_registry.read().get_by_id(id) {
			Some(record) => record.clone(),
			None => return Ok(None),
		};
		let permissions = self.system_database.read_all_user_permissions()?.remove(&id).unwrap_or_default();
		let user = Arc::new(User::from_record(&record, &permissions));
		self.users.lock().put(id, user.clone());
		Ok(Some(user))
	}

	/// Finds a user by id or fails with a user-visible error.
	pub fn find_user_by_id_checked(&self, id: u32) -> DbResult<Arc<User>> {
		self.find_user_by_id(id)?
			.ok_or_else(|| DbError::user(codes::USER_DOES_NOT_EXIST, format!("user #{} does not exist", id)))
	}

	/// Finds a user by name or fails with a user-visible error.
	pub fn find_user_checked(&self, name: &str) -> DbResult<Arc<User>> {
		self.find_user(name)?
			.ok_or_else(|| DbError::user(codes::USER_DOES_NOT_EXIST, format!("user '{}' does not exist", name)))
	}

	/// Creates a user.
	pub fn create_user(
		&self,
		name: &str,
		real_name: Option<String>,
		description: Option<String>,
		active: bool,
		current_user_id: u32,
	) -> DbResult<Arc<User>> {
		if !crate::database::is_valid_database_object_name(name) {
			return Err(DbError::user(codes::INVALID_OBJECT_NAME, format!("invalid user name '{}'", name)));
		}
		{
			let registry = self.user_registry.read();
			if registry.contains_name(name) {
				return Err(DbError::user(codes::USER_ALREADY_EXISTS, format!("user '{}' already exists", name)));
			}
			if registry.len() >= self.max_users {
				return Err(DbError::user(codes::TOO_MANY_OBJECTS, "too many users".to_owned()));
			}
		}

		let id = self.system_database.generate_next_user_id();
		let record = UserRecord {
			id,
			name: name.to_owned(),
			real_name,
			description,
			active,
			access_keys: Default::default(),
			tokens: Default::default(),
		};
		let tp = self.system_database.database().begin_transaction(current_user_id);
		self.system_database.record_user(&record, &tp)?;
		self.user_registry.write().insert(record.clone());

		let user = Arc::new(User::from_record(&record, &Default::default()));
		self.users.lock().put(id, user.clone());
		Ok(user)
	}

	/// Drops a user. The super user cannot be dropped.
	pub fn drop_user(&self, name: &str, user_must_exist: bool, _current_user_id: u32) -> DbResult<()> {
		let id = match self.user_registry.read().get_by_name(name) {
			Some(record) => record.id,
			None => {
				if !user_must_exist {
					return Ok(());
				}
				return Err(DbError::user(codes::USER_DOES_NOT_EXIST, format!("user '{}' does not exist", name)));
			},
		};
		if id == SUPER_USER_ID {
			return Err(DbError::user(
				codes::CANNOT_MODIFY_SUPER_USER,
				"the super user cannot be dropped".to_owned(),
			));
		}

		let tp = self.system_database.database().begin_transaction(SUPER_USER_ID);
		let record = self.user_registry.read().get_by_id(id).cloned().expect("registry was just consulted; qed");

		// Dependent rows first, then the user row itself.
		let sys_user_access_keys =
			self.system_database.database().find_table_checked(crate::constants::sys_tables::SYS_USER_ACCESS_KEYS)?;
		for key in record.access_keys.iter() {
			sys_user_access_keys.delete_row(key.id, tp, true)?;
		}
		let sys_user_tokens =
			self.system_database.database().find_table_checked(crate::constants::sys_tables::SYS_USER_TOKENS)?;
		for token in record.tokens.iter() {
			sys_user_tokens.delete_row(token.id, tp, true)?;
		}
		for permissions in self.system_database.read_all_user_permissions()?.remove(&id).iter() {
			for permission in permissions.iter() {
				self.system_database.delete_user_permission(permission.id, &tp)?;
			}
		}
		let sys_users =
			self.system_database.database().find_table_checked(crate::constants::sys_tables::SYS_USERS)?;
		sys_users.delete_row(id as u64, tp, true)?;

		self.user_registry.write().erase(id);
		self.users.lock().pop(&id);
		Ok(())
	}

	// ---- permissions ----

	/// Grants permissions on an object to a user; masks union, a new
	/// `SYS_USER_PERMISSIONS` row is inserted when none exists for the key.
	pub fn grant_permissions(
		&self,
		grantee_user_id: u32,
		key: UserPermissionKey,
		permissions: u64,
		with_grant_option: bool,
		current_user_id: u32,
	) -> DbResult<()> {
		validate_permission_mask(key.object_type, permissions)?;
		let user = self.find_user_by_id_checked(grantee_user_id)?;

		let outcome = user.grant_permissions(key, permissions, with_grant_option);
		let tp = self.system_database.database().begin_transaction(current_user_id);
		let record_id = if outcome.is_new_record {
			self.system_database.generate_next_user_permission_id()
		} else {
			outcome.data.id
		};
		let record = UserPermissionRecord {
			id: record_id,
			user_id: grantee_user_id,
			database_id: key.database_id,
			object_type: key.object_type,
			object_id: key.object_id,
			permissions: outcome.data.data.permissions(),
			grant_options: outcome.data.data.raw_grant_options(),
		};
		self.system_database.record_user_permission(&record, &tp)?;
		if outcome.is_new_record {
			user.set_permission_record_id(key, record_id);
		}
		Ok(())
	}

	/// Revokes permissions; the row is updated, or deleted when the permission
	/// bitmask reaches zero.
	pub fn revoke_permissions(
		&self,
		grantee_user_id: u32,
		key: UserPermissionKey,
		permissions: u64,
		current_user_id: u32,
	) -> DbResult<()> {
		validate_permission_mask(key.object_type, permissions)?;
		let user = self.find_user_by_id_checked(grantee_user_id)?;

		let outcome = match user.revoke_permissions(key, permissions) {
			Some(outcome) => outcome,
			None => return Ok(()),
		};
		if outcome.data.id == 0 {
			return Ok(());
		}
		let tp = self.system_database.database().begin_transaction(current_user_id);
		if outcome.removed {
			self.system_database.delete_user_permission(outcome.data.id, &tp)?;
		} else {
			let record = UserPermissionRecord {
				id: outcome.data.id,
				user_id: grantee_user_id,
				database_id: key.database_id,
				object_type: key.object_type,
				object_id: key.object_id,
				permissions: outcome.data.data.permissions(),
				grant_options: outcome.data.data.raw_grant_options(),
			};
			self.system_database.record_user_permission(&record, &tp)?;
		}
		Ok(())
	}

	// ---- sessions ----

	/// Opens a client session for a user.
	pub fn begin_session(&self, user_id: u32) -> DbResult<Uuid> {
		let user = self.find_user_by_id_checked(user_id)?;
		if !user.is_active() {
			return Err(DbError::user(codes::USER_DOES_NOT_EXIST, format!("user '{}' is not active", user.name())));
		}
		Ok(self.sessions.begin_session(user_id))
	}

	/// Ends a client session. Ending a missing session is an error.
	pub fn end_session(&self, session_uuid: Uuid) -> DbResult<()> {
		self.sessions.end_session(session_uuid)?;
		Ok(())
	}

	/// Number of open sessions.
	pub fn session_count(&self) -> usize {
		self.sessions.len()
	}

	// ---- consistency ----

	/// Cross-checks registry entry counts against the main index key counts of
	/// the instance-wide tables. A mismatch after a clean startup is fatal.
	pub fn check_data_consistency(&self) -> DbResult<()> {
		debug!(target: "dbengine", "Instance '{}': checking data consistency", self.name);
		let checks: [(&str, usize, usize); 2] = [
			("SYS_USERS", self.user_registry.read().len(), {
				let table = self.system_database.database().find_table_checked(crate::constants::sys_tables::SYS_USERS)?;
				let master = table.master_column();
				let index = master.main_index()?;
				let count = index.lock().key_count();
				count
			}),
			("SYS_DATABASES", self.database_registry.read().len(), {
				let master = self.system_database.sys_databases().master_column();
				let index = master.main_index()?;
				let count = index.lock().key_count();
				count
			}),
		];
		for (table, registry_count, index_count) in checks {
			if registry_count != index_count {
				return Err(DbError::internal(
					internal_codes::INDEX_CORRUPTED,
					format!(
						"{}: registry holds {} entries, main index holds {} keys",
						table, registry_count, index_count
					),
				));
			}
		}
		Ok(())
	}
}

fn new_cache<K: std::hash::Hash + Eq, V>(capacity: usize) -> LruCache<K, V> {
	LruCache::new(NonZeroUsize::new(capacity).expect("capacity is non-zero; qed"))
}

fn ensure_data_dir(data_dir: &Path) -> DbResult<()> {
	if data_dir.exists() {
		if !data_dir.is_dir() {
			return Err(DbError::user(
				codes::INVALID_OBJECT_NAME,
				format!("data directory path '{}' is not a directory", data_dir.display()),
			));
		}
		return Ok(());
	}
	fs::create_dir_all(data_dir)
		.map_err(|e| DbError::io(format!("can't create data directory '{}'", data_dir.display()), e))
}

fn load_master_cipher_key(path: &Path, expected_size: usize) -> DbResult<Vec<u8>> {
	debug!(target: "dbengine", "Loading master cipher key from '{}'", path.display());
	let metadata = fs::metadata(path)
		.map_err(|e| DbError::io(format!("can't stat master cipher key '{}'", path.display()), e))?;
	if metadata.len() != expected_size as u64 {
		return Err(DbError::internal(
			internal_codes::INVALID_CIPHER_KEY,
			format!(
				"master cipher key '{}' has size {}, expected {}",
				path.display(),
				metadata.len(),
				expected_size
			),
		));
	}
	let mut key = vec![0u8; expected_size];
	let mut file = fs::File::open(path)
		.map_err(|e| DbError::io(format!("can't open master cipher key '{}'", path.display()), e))?;
	file.read_exact(&mut key)
		.map_err(|e| DbError::io(format!("can't read master cipher key '{}'", path.display()), e))?;
	Ok(key)
}

fn load_super_user_initial_access_key(path: &Path) -> DbResult<String> {
	debug!(target: "dbengine", "Loading super user initial access key from '{}'", path.display());
	let metadata = fs::metadata(path)
		.map_err(|e| DbError::io(format!("can't stat super user access key '{}'", path.display()), e))?;
	if metadata.len() == 0 || metadata.len() > MAX_USER_ACCESS_KEY_SIZE {
		return Err(DbError::internal(
			internal_codes::INTERNAL_ERROR,
			format!("super user access key '{}' has invalid size {}", path.display(), metadata.len()),
		));
	}
	fs::read_to_string(path)
		.map(|text| text.trim_end().to_owned())
		.map_err(|e| DbError::io(format!("can't read super user access key '{}'", path.display()), e))
}

fn create_initialization_flag_file(data_dir: &Path, name: &str, uuid: Uuid) -> DbResult<()> {
	debug!(target: "dbengine", "Instance '{}': creating initialization flag file", name);
	let path = data_dir.join(INSTANCE_INITIALIZATION_FLAG_FILE);
	let contents = format!("\"{}\"\n{}\n{}\n", name, uuid, current_timestamp());
	fs::write(&path, contents)
		.map_err(|e| DbError::io(format!("can't create initialization flag file '{}'", path.display()), e))
}

fn check_initialization_flag_file(data_dir: &Path, name: &str) -> DbResult<Uuid> {
	debug!(target: "dbengine", "Instance '{}': checking initialization flag file", name);
	let path = data_dir.join(INSTANCE_INITIALIZATION_FLAG_FILE);
	let contents = fs::read_to_string(&path)
		.map_err(|e| DbError::io(format!("can't open initialization flag file '{}'", path.display()), e))?;
	let mut lines = contents.lines();

	let recorded_name = lines.next().unwrap_or("");
	let expected = format!("\"{}\"", name);
	if recorded_name != expected {
		return Err(DbError::internal(
			internal_codes::INSTANCE_NAME_MISMATCH,
			format!("instance name mismatch: recorded {}, configured '{}'", recorded_name, name),
		));
	}

	let raw_uuid = lines.next().unwrap_or("");
	Uuid::parse_str(raw_uuid).map_err(|_| {
		DbError::internal(
			internal_codes::CORRUPTED_RECORD,
			format!("initialization flag file '{}' holds an invalid UUID", path.display()),
		)
	})
}
