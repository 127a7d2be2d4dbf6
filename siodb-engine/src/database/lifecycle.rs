// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Table lifecycle: CREATE TABLE and the four-phase DROP TABLE.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use log::{debug, error, warn};
use siodb_columnstore::{DataAddress, MainIndex};

use super::Database;
use crate::{
	column::ColumnSpecification,
	datatypes::TableType,
	error::{codes, DbError, DbResult, ErrorRecord},
	master_column::TransactionParams,
	table::Table,
	variant::Variant,
};

/// Validates a database object name: `[A-Za-z_][A-Za-z0-9_]*`, at most 255 bytes.
pub fn is_valid_database_object_name(name: &str) -> bool {
	!name.is_empty()
		&& name.len() <= 255
		&& name.chars().next().map(|c| c.is_ascii_alphabetic() || c == '_').unwrap_or(false)
		&& name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Deletes catalog rows from one system table and remembers what it takes to
/// undo them: the earliest deletion marker address (the rollback point) and the
/// master column block holding the latest marker.
struct SystemTableRowDeleter {
	table: Arc<Table>,
	tp: TransactionParams,
	dropped_table_name: String,
	rollback_address: Option<DataAddress>,
	next_block_id: u64,
	deleted_trids: Vec<u64>,
}

impl SystemTableRowDeleter {
	fn new(table: Arc<Table>, tp: TransactionParams, dropped_table_name: &str) -> Self {
		SystemTableRowDeleter {
			table,
			tp,
			dropped_table_name: dropped_table_name.to_owned(),
			rollback_address: None,
			next_block_id: 0,
			deleted_trids: Vec::new(),
		}
	}

	fn delete_row(&mut self, trid: u64) -> DbResult<()> {
		debug!(
			target: "dbengine",
			"DROP TABLE {}: {}: removing TRID #{}",
			self.dropped_table_name,
			self.table.name(),
			trid
		);
		if let Some(result) = self.table.delete_row(trid, self.tp, false)? {
			if self.rollback_address.is_none() {
				self.rollback_address = Some(result.rollback_address);
			}
			self.next_block_id = result.next_block_id;
			self.deleted_trids.push(trid);
		}
		Ok(())
	}

	fn rollback_if_changed(&self) -> DbResult<()> {
		if let Some(address) = self.rollback_address {
			debug!(target: "dbengine", "DROP TABLE {}: rolling back {}", self.dropped_table_name, self.table.name());
			if let Err(e) = self.table.master_column().rollback_to_address(address) {
				error!(
					target: "dbengine",
					"DROP TABLE {}: rollback failed for the system table {}: {}",
					self.dropped_table_name,
					self.table.name(),
					e
				);
				return Err(e);
			}
		}
		Ok(())
	}

	fn update_main_index(&self) -> DbResult<()> {
		let master = self.table.master_column();
		for &trid in &self.deleted_trids {
			debug!(
				target: "dbengine",
				"DROP TABLE {}: {}: updating index for TRID #{}",
				self.dropped_table_name,
				self.table.name(),
				trid
			);
			if let Err(e) = master.erase_from_main_index(trid) {
				error!(
					target: "dbengine",
					"DROP TABLE {}: main index update failed for the system table {}: {}",
					self.dropped_table_name,
					self.table.name(),
					e
				);
				return Err(e);
			}
		}
		Ok(())
	}
}

impl Database {
	/// Creates a user table.
	///
	/// Validation findings (bad or duplicate column names, bad or duplicate
	/// constraint names, clashes with existing constraints, repeated constraint
	/// types on one column) are collected and raised together as a compound
	/// error; the schema is mutated only after validation passes.
	pub fn create_user_table(
		self: &Arc<Self>,
		name: &str,
		table_type: TableType,
		column_specs: Vec<ColumnSpecification>,
		current_user_id: u32,
		description: Option<String>,
	) -> DbResult<Arc<Table>> {
		if table_type != TableType::Disk {
			return Err(DbError::user(
				codes::TABLE_TYPE_NOT_SUPPORTED,
				format!("table type {:?} is not supported", table_type),
			));
		}
		if self.is_system_database() && !self.env.allow_user_tables_in_system_database {
			return Err(DbError::user(
				codes::USER_TABLES_NOT_ALLOWED,
				"user tables cannot be created in the system database".to_owned(),
			));
		}
		if !is_valid_database_object_name(name) {
			return Err(DbError::user(codes::INVALID_OBJECT_NAME, format!("invalid table name '{}'", name)));
		}
		debug!(target: "dbengine", "Database {}: creating user table {}", self.name, name);

		if self.reg.read().tables.contains_name(name) {
			return Err(DbError::user(
				codes::TABLE_ALREADY_EXISTS,
				format!("table '{}'.'{}' already exists", self.name, name),
			));
		}

		let mut errors: Vec<ErrorRecord> = Vec::new();
		let mut known_columns: HashSet<&str> = HashSet::new();
		let mut known_constraints: HashSet<&str> = HashSet::new();
		{
			let reg = self.reg.read();
			for column_spec in &column_specs {
				if !is_valid_database_object_name(&column_spec.name) {
					errors.push(ErrorRecord {
						code: codes::INVALID_OBJECT_NAME,
						message: format!("invalid column name '{}'", column_spec.name),
					});
					continue;
				}
				if !known_columns.insert(&column_spec.name) {
					errors.push(ErrorRecord {
						code: codes::DUPLICATE_COLUMN_NAME,
						message: format!("duplicate column name '{}'", column_spec.name),
					});
					continue;
				}

				let mut constraint_type_counts: HashMap<u8, usize> = HashMap::new();
				for constraint_spec in &column_spec.constraints {
					*constraint_type_counts.entry(constraint_spec.constraint_type as u8).or_default() += 1;
					let constraint_name = match &constraint_spec.name {
						// Empty names get generated later and cannot clash.
						None => continue,
						Some(name) => name.as_str(),
					};
					if !is_valid_database_object_name(constraint_name) {
						errors.push(ErrorRecord {
							code: codes::INVALID_OBJECT_NAME,
							message: format!("invalid constraint name '{}'", constraint_name),
						});
						continue;
					}
					if !known_constraints.insert(constraint_name) {
						errors.push(ErrorRecord {
							code: codes::DUPLICATE_CONSTRAINT_NAME,
							message: format!("duplicate constraint name '{}'", constraint_name),
						});
					}
					if reg.constraints.contains_name(constraint_name) {
						errors.push(ErrorRecord {
							code: codes::CONSTRAINT_ALREADY_EXISTS,
							message: format!(
								"constraint '{}' already exists in database '{}'",
								constraint_name, self.name
							),
						});
					}
				}
				for (constraint_type, count) in constraint_type_counts {
					if count > 1 {
						let display = crate::datatypes::ConstraintType::from_u8(constraint_type)
							.map(|t| t.display_name())
							.unwrap_or("?");
						errors.push(ErrorRecord {
							code: codes::DUPLICATE_CONSTRAINT_TYPE,
							message: format!(
								"duplicate {} constraint on column '{}'",
								display, column_spec.name
							),
						});
					}
				}
			}
		}
		if !errors.is_empty() {
			return Err(DbError::Compound(errors));
		}

		let table = self.create_table_unlocked(name, table_type, 1, description, false)?;
		for column_spec in column_specs {
			self.create_column_unlocked(&table, column_spec, false)?;
		}
		self.close_current_column_set(&table)?;

		let tp = self.begin_transaction(current_user_id);
		self.record_table_definition(&table, &tp)?;

		// Pre-allocate the first data block on every column and the first main
		// index slot of the master column.
		for column in table.columns() {
			debug!(target: "dbengine", "Pre-allocating data block for {}", column.display_name());
			column.preallocate_first_block()?;
			if column.is_master_column() {
				debug!(target: "dbengine", "Pre-allocating index storage for {}", column.display_name());
				column
					.main_index()?
					.lock()
					.preallocate(1)
					.map_err(|e| DbError::io("can't preallocate main index", e))?;
			}
		}

		self.save_system_objects()?;
		Ok(table)
	}

	/// Drops a table.
	///
	/// Phase A collects every related catalog object in deterministic order.
	/// Phase B deletes the catalog rows inner-to-outer through
	/// [`SystemTableRowDeleter`]s; any failure triggers Phase C, which rolls the
	/// affected master columns back in reverse order. Phase D erases the main
	/// index entries in a separate pass, unregisters everything in memory and
	/// removes the table data directory (a failure there is only a warning).
	pub fn drop_table(self: &Arc<Self>, name: &str, table_must_exist: bool, current_user_id: u32) -> DbResult<()> {
		let table = match self.find_table(name)? {
			Some(table) => table,
			None => {
				if !table_must_exist {
					return Ok(());
				}
				return Err(DbError::user(
					codes::TABLE_DOES_NOT_EXIST,
					format!("table '{}'.'{}' does not exist", self.name, name),
				));
			},
		};
		let table_id = table.id();
		let table_data_dir = table.data_dir().clone();
		debug!(target: "dbengine", "Database {}: dropping table {}", self.name, name);

		// Phase A: collect related objects, never touching disk. Ordered maps keep
		// the deletion sequence deterministic so rollback is reproducible.

		// column set id -> member ids
		let mut column_sets_to_remove: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
		// column id -> { column definition id -> { link id -> constraint id } }
		let mut columns_to_remove: BTreeMap<u64, BTreeMap<u64, BTreeMap<u64, u64>>> = BTreeMap::new();
		// constraint definition id -> referencing constraint ids within the drop set
		let mut constraint_definitions_to_remove: BTreeMap<u64, BTreeSet<u64>> = BTreeMap::new();
		// index id -> index column ids
		let mut indices_to_remove: BTreeMap<u64, Vec<u64>> = BTreeMap::new();

		{
			let reg = self.reg.read();

			for column_set_id in reg.column_sets.ids_of_table(table_id) {
				let column_set = reg.column_sets.get_by_id(column_set_id).expect("id from index; qed");
				let mut member_ids: Vec<u64> = column_set.columns.iter().map(|m| m.id).collect();
				member_ids.sort_unstable();

				for member in column_set.columns.iter() {
					if columns_to_remove.contains_key(&member.column_id) {
						continue;
					}
					// Skip columns that are already gone from the registry.
					if reg.columns.get_by_id(member.column_id).is_none() {
						continue;
					}

					let mut definitions_to_remove: BTreeMap<u64, BTreeMap<u64, u64>> = BTreeMap::new();
					for definition_id in reg.column_definitions.ids_of_column(member.column_id) {
						let definition =
							reg.column_definitions.get_by_id(definition_id).expect("id from index; qed");
						let mut links: BTreeMap<u64, u64> = BTreeMap::new();
						for link in definition.constraints.iter() {
							let constraint = match reg.constraints.get_by_id(link.constraint_id) {
								Some(constraint) => constraint,
								None => continue,
							};
							links.insert(link.id, link.constraint_id);
							constraint_definitions_to_remove
								.entry(constraint.constraint_definition_id)
								.or_default()
								.insert(link.constraint_id);
						}
						definitions_to_remove.insert(definition_id, links);
					}
					columns_to_remove.insert(member.column_id, definitions_to_remove);
				}

				column_sets_to_remove.insert(column_set_id, member_ids);
			}

			// A constraint definition goes only when every constraint referencing it
			// is part of the drop set.
			constraint_definitions_to_remove.retain(|definition_id, dropped_references| {
				let all_references = reg.constraints.ids_of_constraint_definition(*definition_id);
				all_references == *dropped_references
			});

			for index_id in reg.indices.ids_of_table(table_id) {
				let index = reg.indices.get_by_id(index_id).expect("id from index; qed");
				let mut column_ids: Vec<u64> = index.columns.iter().map(|c| c.id).collect();
				column_ids.sort_unstable();
				indices_to_remove.insert(index_id, column_ids);
			}
		}

		// Phase B: delete rows from the catalog tables, inner to outer.

		let tp = self.begin_transaction(current_user_id);
		let catalog = self.catalog_tables()?;

		let mut index_columns_deleter = SystemTableRowDeleter::new(catalog.sys_index_columns.clone(), tp, name);
		let mut indices_deleter = SystemTableRowDeleter::new(catalog.sys_indices.clone(), tp, name);
		let mut column_set_columns_deleter =
			SystemTableRowDeleter::new(catalog.sys_column_set_columns.clone(), tp, name);
		let mut column_sets_deleter = SystemTableRowDeleter::new(catalog.sys_column_sets.clone(), tp, name);
		let mut tables_deleter = SystemTableRowDeleter::new(catalog.sys_tables.clone(), tp, name);
		let mut constraints_deleter = SystemTableRowDeleter::new(catalog.sys_constraints.clone(), tp, name);
		let mut column_def_constraints_deleter =
			SystemTableRowDeleter::new(catalog.sys_column_def_constraints.clone(), tp, name);
		let mut column_defs_deleter = SystemTableRowDeleter::new(catalog.sys_column_defs.clone(), tp, name);
		let mut columns_deleter = SystemTableRowDeleter::new(catalog.sys_columns.clone(), tp, name);
		let mut constraint_defs_deleter =
			SystemTableRowDeleter::new(catalog.sys_constraint_defs.clone(), tp, name);

		let phase_b = (|| -> DbResult<()> {
			for (index_id, index_column_ids) in &indices_to_remove {
				for index_column_id in index_column_ids {
					index_columns_deleter.delete_row(*index_column_id)?;
				}
				indices_deleter.delete_row(*index_id)?;
			}

			for (column_set_id, member_ids) in &column_sets_to_remove {
				for member_id in member_ids {
					column_set_columns_deleter.delete_row(*member_id)?;
				}
				column_sets_deleter.delete_row(*column_set_id)?;
			}

			tables_deleter.delete_row(table_id as u64)?;

			for (column_id, definitions) in &columns_to_remove {
				for (definition_id, links) in definitions {
					for (link_id, constraint_id) in links {
						constraints_deleter.delete_row(*constraint_id)?;
						column_def_constraints_deleter.delete_row(*link_id)?;
					}
					column_defs_deleter.delete_row(*definition_id)?;
				}
				columns_deleter.delete_row(*column_id)?;
			}

			for definition_id in constraint_definitions_to_remove.keys() {
				constraint_defs_deleter.delete_row(*definition_id)?;
			}

			Ok(())
		})();

		// Phase C: compensating rollback in reverse order of Phase B.
		if let Err(phase_b_error) = phase_b {
			let rollbacks = [
				constraint_defs_deleter.rollback_if_changed(),
				columns_deleter.rollback_if_changed(),
				column_defs_deleter.rollback_if_changed(),
				column_def_constraints_deleter.rollback_if_changed(),
				constraints_deleter.rollback_if_changed(),
				tables_deleter.rollback_if_changed(),
				column_sets_deleter.rollback_if_changed(),
				column_set_columns_deleter.rollback_if_changed(),
				indices_deleter.rollback_if_changed(),
				index_columns_deleter.rollback_if_changed(),
			];
			for rollback in rollbacks {
				// Partial rollback is not silently accepted.
				rollback?;
			}
			return Err(phase_b_error);
		}

		// Phase D: erase main index entries in a second pass, then drop in-memory
		// state. The separate pass keeps in-memory indices consistent with the
		// on-disk state even if the process dies between the phases.

		index_columns_deleter.update_main_index()?;
		indices_deleter.update_main_index()?;
		column_set_columns_deleter.update_main_index()?;
		column_sets_deleter.update_main_index()?;
		tables_deleter.update_main_index()?;
		constraints_deleter.update_main_index()?;
		column_def_constraints_deleter.update_main_index()?;
		column_defs_deleter.update_main_index()?;
		columns_deleter.update_main_index()?;
		constraint_defs_deleter.update_main_index()?;

		self.forget_table(table_id);
		{
			let mut reg = self.reg.write();
			for index_id in indices_to_remove.keys() {
				reg.indices.erase(*index_id);
			}
			for column_set_id in column_sets_to_remove.keys() {
				reg.column_sets.erase(*column_set_id);
			}
			reg.tables.erase(table_id);
			for (column_id, definitions) in &columns_to_remove {
				reg.columns.erase(*column_id);
				for (definition_id, links) in definitions {
					reg.column_definitions.erase(*definition_id);
					for constraint_id in links.values() {
						reg.constraints.erase(*constraint_id);
					}
				}
			}
			for definition_id in constraint_definitions_to_remove.keys() {
				reg.constraint_definitions.erase(*definition_id);
			}
		}
		self.save_system_objects()?;

		if let Err(e) = std::fs::remove_dir_all(&table_data_dir) {
			warn!(
				target: "dbengine",
				"DROP TABLE {}: can't remove data directory '{}': {}",
				name,
				table_data_dir.display(),
				e
			);
		}
		Ok(())
	}

	/// Inserts a row into a user table under a fresh transaction.
	pub fn insert_table_row(
		self: &Arc<Self>,
		table: &Arc<Table>,
		values: &[Variant],
		current_user_id: u32,
	) -> DbResult<u64> {
		let tp = self.begin_transaction(current_user_id);
		let (trid, _) = table.insert_row(values, tp, None)?;
		Ok(trid)
	}
}
