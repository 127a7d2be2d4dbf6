// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Live column objects.
//!
//! A column owns its block chain through a [`ColumnBlockStore`] and, for master
//! columns, the main index mapping TRIDs to master column record addresses.
//! Values are stored varint-length-prefixed so they can be read back by address
//! alone. Columns hold their owners' ids and names, never back-pointers.

use std::path::PathBuf;

use parking_lot::Mutex;
use siodb_codec::{decode_varint, encode_varint, varint_size};
use siodb_columnstore::{
	ColumnBlockStore, DataAddress, LinearIndexFile, MainIndex, StoreContext, MAIN_INDEX_FILE_NAME,
};
use siodb_iofile::FileFactory;
use uuid::Uuid;

use crate::{
	constants::COLUMN_DIR_PREFIX,
	datatypes::{ColumnDataType, ColumnState, ConstraintType},
	error::{codes, internal_codes, DbError, DbResult},
	master_column::MasterColumnRecord,
	reg::ColumnRecord,
	variant::Variant,
};

/// Constraint part of a column specification.
#[derive(Clone, Debug)]
pub struct ColumnConstraintSpecification {
	/// Constraint name; empty means a name is generated.
	pub name: Option<String>,
	/// Constraint type.
	pub constraint_type: ConstraintType,
	/// Serialized constraint expression.
	pub expression: Vec<u8>,
	/// Optional description.
	pub description: Option<String>,
}

impl ColumnConstraintSpecification {
	/// Unnamed NOT NULL constraint specification.
	pub fn not_null() -> Self {
		ColumnConstraintSpecification {
			name: None,
			constraint_type: ConstraintType::NotNull,
			expression: vec![1],
			description: None,
		}
	}
}

/// Column part of a CREATE TABLE request.
#[derive(Clone, Debug)]
pub struct ColumnSpecification {
	/// Column name.
	pub name: String,
	/// Column data type.
	pub data_type: ColumnDataType,
	/// Data area size of the column's blocks.
	pub data_block_data_area_size: u32,
	/// Constraints of the column.
	pub constraints: Vec<ColumnConstraintSpecification>,
	/// Optional description.
	pub description: Option<String>,
}

impl ColumnSpecification {
	/// Specification with the default data area size and no constraints.
	pub fn new(name: impl Into<String>, data_type: ColumnDataType) -> Self {
		ColumnSpecification {
			name: name.into(),
			data_type,
			data_block_data_area_size: siodb_columnstore::DEFAULT_DATA_AREA_SIZE,
			constraints: Vec::new(),
			description: None,
		}
	}

	/// Adds a NOT NULL constraint.
	pub fn not_null(mut self) -> Self {
		self.constraints.push(ColumnConstraintSpecification::not_null());
		self
	}

	/// Overrides the data area size.
	pub fn with_data_area_size(mut self, size: u32) -> Self {
		self.data_block_data_area_size = size;
		self
	}
}

/// Identity and I/O environment a column needs from its owners.
#[derive(Clone)]
pub struct ColumnEnvironment {
	/// Name of the owning database.
	pub database_name: String,
	/// UUID of the owning database.
	pub database_uuid: Uuid,
	/// Id of the owning table.
	pub table_id: u32,
	/// Name of the owning table.
	pub table_name: String,
	/// Data directory of the owning table.
	pub table_data_dir: PathBuf,
	/// File factory carrying the database cipher configuration.
	pub files: FileFactory,
	/// Capacity of the block cache.
	pub block_cache_capacity: usize,
}

/// A live column with its block chain and, for master columns, the main index.
pub struct Column {
	id: u64,
	name: String,
	display_name: String,
	data_type: ColumnDataType,
	table_id: u32,
	master: bool,
	data_block_data_area_size: u32,
	state: Mutex<ColumnState>,
	data_dir: PathBuf,
	store: Mutex<ColumnBlockStore>,
	main_index: Option<Mutex<LinearIndexFile>>,
}

impl Column {
	/// Creates a new column: its data directory, empty block store and, for the
	/// master column, the main index file.
	pub fn create(
		env: &ColumnEnvironment,
		id: u64,
		name: impl Into<String>,
		data_type: ColumnDataType,
		data_block_data_area_size: u32,
		master: bool,
	) -> DbResult<Self> {
		let name = name.into();
		let data_dir = env.table_data_dir.join(format!("{}{}", COLUMN_DIR_PREFIX, id));
		std::fs::create_dir_all(&data_dir)
			.map_err(|e| DbError::io(format!("can't create column data directory '{}'", data_dir.display()), e))?;

		let store = ColumnBlockStore::new(
			store_context(env, id, &name, data_block_data_area_size, &data_dir),
			env.block_cache_capacity,
		);

		let main_index = if master {
			let path = data_dir.join(MAIN_INDEX_FILE_NAME);
			Some(Mutex::new(LinearIndexFile::create(&env.files, &path).map_err(|e| {
				DbError::io(format!("can't create main index file '{}'", path.display()), e)
			})?))
		} else {
			None
		};

		let display_name = format!("'{}'.'{}'.'{}'", env.database_name, env.table_name, name);
		Ok(Column {
			id,
			name,
			display_name,
			data_type,
			table_id: env.table_id,
			master,
			data_block_data_area_size,
			state: Mutex::new(ColumnState::Creating),
			data_dir,
			store: Mutex::new(store),
			main_index,
		})
	}

	/// Opens an existing column from its catalog record.
	pub fn open(env: &ColumnEnvironment, record: &ColumnRecord, master: bool) -> DbResult<Self> {
		let data_dir = env.table_data_dir.join(format!("{}{}", COLUMN_DIR_PREFIX, record.id));

		let store = ColumnBlockStore::open(
			store_context(env, record.id, &record.name, record.data_block_data_area_size, &data_dir),
			env.block_cache_capacity,
		)?;

		let main_index = if master {
			let path = data_dir.join(MAIN_INDEX_FILE_NAME);
			Some(Mutex::new(LinearIndexFile::open(&env.files, &path).map_err(|e| {
				DbError::io(format!("can't open main index file '{}'", path.display()), e)
			})?))
		} else {
			None
		};

		let display_name = format!("'{}'.'{}'.'{}'", env.database_name, env.table_name, record.name);
		Ok(Column {
			id: record.id,
			name: record.name.clone(),
			display_name,
			data_type: record.data_type,
			table_id: record.table_id,
			master,
			data_block_data_area_size: record.data_block_data_area_size,
			state: Mutex::new(record.state),
			data_dir,
			store: Mutex::new(store),
			main_index,
		})
	}

	/// Column id.
	pub fn id(&self) -> u64 {
		self.id
	}

	/// Column name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Column data type.
	pub fn data_type(&self) -> ColumnDataType {
		self.data_type
	}

	/// Id of the owning table.
	pub fn table_id(&self) -> u32 {
		self.table_id
	}

	/// Returns true for the master column.
	pub fn is_master_column(&self) -> bool {
		self.master
	}

	/// Data area size of this column's blocks.
	pub fn data_block_data_area_size(&self) -> u32 {
		self.data_block_data_area_size
	}

	/// Current lifecycle state.
	pub fn state(&self) -> ColumnState {
		*self.state.lock()
	}

	/// Sets the lifecycle state. The owning database persists the transition.
	pub fn set_state(&self, state: ColumnState) {
		*self.state.lock() = state;
	}

	/// Column data directory.
	pub fn data_dir(&self) -> &PathBuf {
		&self.data_dir
	}

	/// Per-column block store, guarded by the per-column lock.
	pub fn store(&self) -> &Mutex<ColumnBlockStore> {
		&self.store
	}

	/// Display name, `'db'.'table'.'column'`.
	pub fn display_name(&self) -> &str {
		&self.display_name
	}

	/// Pre-allocates the first data block of this column.
	pub fn preallocate_first_block(&self) -> DbResult<()> {
		self.store.lock().select_available_block(1)?;
		Ok(())
	}

	/// Writes a value and returns its address.
	pub fn write_value(&self, value: &Variant) -> DbResult<DataAddress> {
		self.write_with_prefix(&value.serialize())
	}

	/// Reads the value at `address`.
	pub fn read_value(&self, address: DataAddress) -> DbResult<Variant> {
		let payload = self.read_with_prefix(address)?;
		let (value, consumed) = Variant::deserialize(self.data_type, &payload)?;
		if consumed != payload.len() {
			return Err(DbError::internal(
				internal_codes::CORRUPTED_RECORD,
				format!("{}: trailing bytes after value at {:?}", self.display_name(), address),
			));
		}
		Ok(value)
	}

	/// Writes a master column record and returns its address.
	pub fn write_master_record(&self, record: &MasterColumnRecord) -> DbResult<DataAddress> {
		debug_assert!(self.master, "not a master column");
		self.write_with_prefix(&record.serialize())
	}

	/// Reads the master column record at `address`.
	pub fn read_master_record(&self, address: DataAddress) -> DbResult<MasterColumnRecord> {
		debug_assert!(self.master, "not a master column");
		let payload = self.read_with_prefix(address)?;
		let (record, _) = MasterColumnRecord::deserialize(&payload)?;
		Ok(record)
	}

	/// Main index of the master column.
	pub fn main_index(&self) -> DbResult<&Mutex<LinearIndexFile>> {
		self.main_index.as_ref().ok_or_else(|| {
			DbError::internal(
				internal_codes::INTERNAL_ERROR,
				format!("{}: not a master column, no main index", self.display_name()),
			)
		})
	}

	/// Erases a TRID from the main index. Returns true when the key was present.
	pub fn erase_from_main_index(&self, trid: u64) -> DbResult<bool> {
		let index = self.main_index()?;
		let erased = index.lock().erase(trid).map_err(|e| DbError::io("can't update main index", e))?;
		Ok(erased)
	}

	/// Rewinds the column to `address`, releasing everything written after it.
	pub fn rollback_to_address(&self, address: DataAddress) -> DbResult<()> {
		self.store.lock().rollback_to(address)?;
		Ok(())
	}

	/// Flushes the block store and the main index.
	pub fn flush(&self) -> DbResult<()> {
		self.store.lock().flush()?;
		if let Some(index) = &self.main_index {
			index.lock().flush().map_err(|e| DbError::io("can't flush main index", e))?;
		}
		Ok(())
	}

	fn write_with_prefix(&self, payload: &[u8]) -> DbResult<DataAddress> {
		let mut buf = Vec::with_capacity(payload.len() + varint_size(payload.len() as u64));
		encode_varint(payload.len() as u64, &mut buf);
		buf.extend_from_slice(payload);
		Ok(self.store.lock().append_data(&buf)?)
	}

	fn read_with_prefix(&self, address: DataAddress) -> DbResult<Vec<u8>> {
		let mut store = self.store.lock();
		let data_area_size = store.ctx().data_area_size;
		if address.offset >= data_area_size {
			return Err(DbError::internal(
				internal_codes::CORRUPTED_RECORD,
				format!("{}: value address {:?} is out of the data area", self.display_name(), address),
			));
		}

		let available = (data_area_size - address.offset) as usize;
		let mut head = [0u8; 10];
		let head_len = available.min(head.len());
		store.read_data_at(address, &mut head[..head_len])?;
		let (payload_len, consumed) = decode_varint(&head[..head_len]).map_err(|e| {
			DbError::internal(
				internal_codes::CORRUPTED_RECORD,
				format!("{}: bad value length at {:?}: {}", self.display_name(), address, e),
			)
		})?;
		let payload_len = payload_len as usize;
		if consumed + payload_len > available {
			return Err(DbError::internal(
				internal_codes::CORRUPTED_RECORD,
				format!("{}: value at {:?} exceeds the data area", self.display_name(), address),
			));
		}

		let mut payload = vec![0u8; payload_len];
		store.read_data_at(DataAddress::new(address.block_id, address.offset + consumed as u32), &mut payload)?;
		Ok(payload)
	}
}

/// Validates a data area size: non-zero multiple of the index node size, at
/// least one index node.
pub fn validate_data_area_size(size: u32) -> DbResult<()> {
	if size == 0 || size % siodb_columnstore::INDEX_NODE_SIZE != 0 {
		return Err(DbError::user(
			codes::INVALID_DATA_AREA_SIZE,
			format!(
				"invalid data area size {}: must be a non-zero multiple of {}",
				size,
				siodb_columnstore::INDEX_NODE_SIZE
			),
		));
	}
	Ok(())
}

fn store_context(
	env: &ColumnEnvironment,
	id: u64,
	name: &str,
	data_area_size: u32,
	data_dir: &PathBuf,
) -> StoreContext {
	StoreContext {
		database_name: env.database_name.clone(),
		table_name: env.table_name.clone(),
		column_name: name.to_owned(),
		database_uuid: env.database_uuid,
		table_id: env.table_id,
		column_id: id as u32,
		data_dir: data_dir.clone(),
		data_area_size,
		files: env.files.clone(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::master_column::TransactionParams;
	use siodb_columnstore::SYSTEM_TABLE_DATA_AREA_SIZE;

	fn test_env(dir: &std::path::Path) -> ColumnEnvironment {
		ColumnEnvironment {
			database_name: "db".into(),
			database_uuid: Uuid::from_u128(0xfeed),
			table_id: 4097,
			table_name: "T".into(),
			table_data_dir: dir.to_owned(),
			files: FileFactory::plaintext(),
			block_cache_capacity: 8,
		}
	}

	#[test]
	fn value_roundtrip() {
		let dir = tempfile::tempdir().unwrap();
		let env = test_env(dir.path());
		let column =
			Column::create(&env, 2, "NAME", ColumnDataType::Text, SYSTEM_TABLE_DATA_AREA_SIZE, false).unwrap();

		let address = column.write_value(&Variant::Text("hello".into())).unwrap();
		assert_eq!(column.read_value(address).unwrap(), Variant::Text("hello".into()));

		let null_address = column.write_value(&Variant::Null).unwrap();
		assert!(column.read_value(null_address).unwrap().is_null());
	}

	#[test]
	fn master_column_records_and_index() {
		let dir = tempfile::tempdir().unwrap();
		let env = test_env(dir.path());
		let master =
			Column::create(&env, 1, "TRID", ColumnDataType::UInt64, SYSTEM_TABLE_DATA_AREA_SIZE, true).unwrap();

		let record = MasterColumnRecord::new_insert(
			1,
			TransactionParams::new(1, 10, 100),
			vec![DataAddress::new(1, 0)],
		);
		let address = master.write_master_record(&record).unwrap();
		master.main_index().unwrap().lock().insert(1, address).unwrap();

		let read_back = master.read_master_record(address).unwrap();
		assert_eq!(read_back, record);
		assert_eq!(master.main_index().unwrap().lock().find(1), Some(address));

		assert!(master.erase_from_main_index(1).unwrap());
		assert!(!master.erase_from_main_index(1).unwrap());
	}

	#[test]
	fn non_master_column_has_no_index() {
		let dir = tempfile::tempdir().unwrap();
		let env = test_env(dir.path());
		let column =
			Column::create(&env, 2, "C", ColumnDataType::Int32, SYSTEM_TABLE_DATA_AREA_SIZE, false).unwrap();
		assert!(column.main_index().is_err());
	}

	#[test]
	fn reopen_reads_back_values() {
		let dir = tempfile::tempdir().unwrap();
		let env = test_env(dir.path());
		let address = {
			let column =
				Column::create(&env, 3, "N", ColumnDataType::UInt64, SYSTEM_TABLE_DATA_AREA_SIZE, false).unwrap();
			let address = column.write_value(&Variant::UInt64(777)).unwrap();
			column.flush().unwrap();
			address
		};

		let record = ColumnRecord {
			id: 3,
			name: "N".into(),
			data_type: ColumnDataType::UInt64,
			table_id: 4097,
			state: ColumnState::Active,
			data_block_data_area_size: SYSTEM_TABLE_DATA_AREA_SIZE,
			description: None,
		};
		let column = Column::open(&env, &record, false).unwrap();
		assert_eq!(column.read_value(address).unwrap(), Variant::UInt64(777));
	}

	#[test]
	fn data_area_size_validation() {
		assert!(validate_data_area_size(SYSTEM_TABLE_DATA_AREA_SIZE).is_ok());
		assert!(validate_data_area_size(0).is_err());
		assert!(validate_data_area_size(8191).is_err());
	}
}
