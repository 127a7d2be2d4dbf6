// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Live table objects.
//!
//! A table owns its columns; the first column is always the master column whose
//! main index maps TRIDs to master column record addresses. Rows are written by
//! appending every user column value, then the master column record, then the
//! main index entry. The owning database drives table construction and keeps the
//! catalog registries in step.

use std::{
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	sync::Arc,
	time::{SystemTime, UNIX_EPOCH},
};

use parking_lot::RwLock;
use siodb_columnstore::{DataAddress, MainIndex};

use crate::{
	column::Column,
	datatypes::TableType,
	error::{internal_codes, DbError, DbResult},
	master_column::{MasterColumnRecord, TransactionParams},
	variant::Variant,
};

/// Outcome of a row deletion.
#[derive(Clone, Copy, Debug)]
pub struct DeleteRowResult {
	/// Address of the deletion marker; rolling the master column back to this
	/// address undoes the deletion and everything after it.
	pub rollback_address: DataAddress,
	/// Id of the master column block holding the deletion marker.
	pub next_block_id: u64,
}

/// A live table.
pub struct Table {
	id: u32,
	name: String,
	table_type: TableType,
	first_user_trid: u64,
	description: Option<String>,
	database_name: String,
	data_dir: PathBuf,
	columns: RwLock<Vec<Arc<Column>>>,
	current_column_set_id: AtomicU64,
	last_user_trid: AtomicU64,
	last_system_trid: AtomicU64,
}

impl Table {
	/// New table shell without columns. The owning database attaches the master
	/// column before first use.
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		id: u32,
		name: impl Into<String>,
		table_type: TableType,
		first_user_trid: u64,
		description: Option<String>,
		database_name: impl Into<String>,
		data_dir: PathBuf,
	) -> Self {
		let first_user_trid = first_user_trid.max(1);
		Table {
			id,
			name: name.into(),
			table_type,
			first_user_trid,
			description,
			database_name: database_name.into(),
			data_dir,
			columns: RwLock::new(Vec::new()),
			current_column_set_id: AtomicU64::new(0),
			last_user_trid: AtomicU64::new(first_user_trid - 1),
			last_system_trid: AtomicU64::new(0),
		}
	}

	/// Table id.
	pub fn id(&self) -> u32 {
		self.id
	}

	/// Table name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Table storage type.
	pub fn table_type(&self) -> TableType {
		self.table_type
	}

	/// First TRID of the user range.
	pub fn first_user_trid(&self) -> u64 {
		self.first_user_trid
	}

	/// Optional description.
	pub fn description(&self) -> Option<&str> {
		self.description.as_deref()
	}

	/// Table data directory.
	pub fn data_dir(&self) -> &PathBuf {
		&self.data_dir
	}

	/// Display name, `'db'.'table'`.
	pub fn display_name(&self) -> String {
		format!("'{}'.'{}'", self.database_name, self.name)
	}

	/// Id of the current column set.
	pub fn current_column_set_id(&self) -> u64 {
		self.current_column_set_id.load(Ordering::Acquire)
	}

	/// Sets the current column set.
	pub fn set_current_column_set_id(&self, id: u64) {
		self.current_column_set_id.store(id, Ordering::Release);
	}

	/// Attaches the next column. The first attached column must be the master.
	pub fn attach_column(&self, column: Arc<Column>) {
		let mut columns = self.columns.write();
		debug_assert!(
			columns.is_empty() == column.is_master_column(),
			"master column must be attached first and only first"
		);
		columns.push(column);
	}

	/// The master column.
	pub fn master_column(&self) -> Arc<Column> {
		self.columns.read().first().expect("master column is attached at creation; qed").clone()
	}

	/// All columns in column set order, master first.
	pub fn columns(&self) -> Vec<Arc<Column>> {
		self.columns.read().clone()
	}

	/// Number of columns including the master column.
	pub fn column_count(&self) -> usize {
		self.columns.read().len()
	}

	/// Finds a column by name.
	pub fn find_column(&self, name: &str) -> Option<Arc<Column>> {
		self.columns.read().iter().find(|c| c.name() == name).cloned()
	}

	/// Hands out the next TRID of the user range.
	pub fn generate_next_user_trid(&self) -> u64 {
		self.last_user_trid.fetch_add(1, Ordering::AcqRel) + 1
	}

	/// Hands out the next TRID of the system range.
	pub fn generate_next_system_trid(&self) -> u64 {
		self.last_system_trid.fetch_add(1, Ordering::AcqRel) + 1
	}

	/// Reserves system TRIDs up to and including `trid`.
	pub fn set_last_system_trid(&self, trid: u64) {
		self.last_system_trid.store(trid, Ordering::Release);
	}

	/// Recovers the TRID counters from the main index after reopening.
	pub fn init_trid_counters_from_index(&self) -> DbResult<()> {
		let master = self.master_column();
		let index = master.main_index()?;
		let index = index.lock();

		if let Some(max_key) = index.max_key() {
			if max_key >= self.first_user_trid {
				self.last_user_trid.store(max_key, Ordering::Release);
			}
		}

		// Largest key below the user range bounds the system counter.
		let mut last_system = 0;
		let mut cursor = index.min_key();
		while let Some(key) = cursor {
			if key >= self.first_user_trid {
				break;
			}
			last_system = key;
			cursor = index.find_next_key(key);
		}
		drop(index);
		self.last_system_trid.fetch_max(last_system, Ordering::AcqRel);
		Ok(())
	}

	/// Inserts a row and indexes it.
	///
	/// `values` are the user column values in column set order. When `trid` is
	/// given the row is recorded under that explicit id (catalog rows use their
	/// entity id); otherwise a fresh user-range TRID is assigned.
	pub fn insert_row(
		&self,
		values: &[Variant],
		transaction: TransactionParams,
		trid: Option<u64>,
	) -> DbResult<(u64, DataAddress)> {
		let columns = self.columns();
		let (master, user_columns) = columns.split_first().ok_or_else(|| {
			DbError::internal(internal_codes::INTERNAL_ERROR, format!("{}: table has no columns", self.display_name()))
		})?;
		if values.len() != user_columns.len() {
			return Err(DbError::internal(
				internal_codes::INTERNAL_ERROR,
				format!(
					"{}: row has {} values, table has {} columns",
					self.display_name(),
					values.len(),
					user_columns.len()
				),
			));
		}

		let trid = trid.unwrap_or_else(|| self.generate_next_user_trid());

		let mut column_addresses = Vec::with_capacity(values.len());
		for (column, value) in user_columns.iter().zip(values) {
			column_addresses.push(column.write_value(value)?);
		}

		let record = MasterColumnRecord::new_insert(trid, transaction, column_addresses);
		let address = master.write_master_record(&record)?;
		master
			.main_index()?
			.lock()
			.insert(trid, address)
			.map_err(|e| DbError::io("can't update main index", e))?;
		Ok((trid, address))
	}

	/// Deletes a row by writing a deletion marker.
	///
	/// Returns `None` when the row does not exist. The main index entry is erased
	/// only when `update_main_index` is set; DROP TABLE erases entries in a
	/// separate later pass so that in-memory indices match the on-disk state even
	/// if the process dies in between.
	pub fn delete_row(
		&self,
		trid: u64,
		transaction: TransactionParams,
		update_main_index: bool,
	) -> DbResult<Option<DeleteRowResult>> {
		let master = self.master_column();
		let existing = master.main_index()?.lock().find(trid);
		if existing.is_none() {
			return Ok(None);
		}

		let marker = MasterColumnRecord::new_delete(trid, transaction);
		let marker_address = master.write_master_record(&marker)?;
		if update_main_index {
			master.erase_from_main_index(trid)?;
		}
		Ok(Some(DeleteRowResult { rollback_address: marker_address, next_block_id: marker_address.block_id }))
	}

	/// Reads a row by TRID. Returns `None` when the row does not exist.
	pub fn read_row(&self, trid: u64) -> DbResult<Option<Vec<Variant>>> {
		let columns = self.columns();
		let (master, user_columns) =
			columns.split_first().expect("master column is attached at creation; qed");

		let address = match master.main_index()?.lock().find(trid) {
			Some(address) => address,
			None => return Ok(None),
		};
		let record = master.read_master_record(address)?;
		self.check_record_column_count(&record, user_columns.len(), address)?;

		let mut values = Vec::with_capacity(record.column_addresses.len());
		for (column, address) in user_columns.iter().zip(&record.column_addresses) {
			values.push(column.read_value(*address)?);
		}
		Ok(Some(values))
	}

	/// Validates that a master column record addresses exactly the expected
	/// number of user columns.
	pub fn check_record_column_count(
		&self,
		record: &MasterColumnRecord,
		expected: usize,
		address: DataAddress,
	) -> DbResult<()> {
		if record.column_count() != expected {
			return Err(DbError::internal(
				internal_codes::INVALID_MASTER_RECORD,
				format!(
					"{}: master column record at {:?} has {} columns, expected {}",
					self.display_name(),
					address,
					record.column_count(),
					expected
				),
			));
		}
		Ok(())
	}

	/// Flushes every column of the table.
	pub fn flush(&self) -> DbResult<()> {
		for column in self.columns() {
			column.flush()?;
		}
		Ok(())
	}
}

/// Current time in seconds since the epoch.
pub fn current_timestamp() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
