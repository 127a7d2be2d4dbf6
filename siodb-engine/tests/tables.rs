// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Table lifecycle: block chaining, compound validation, DROP TABLE and
//! compensating rollback.

use std::sync::Arc;

use siodb_columnstore::{
	BlockHeader, MainIndex, DATA_FILE_HEADER_SIZE, INITIAL_PREV_BLOCK_DIGEST, SERIALIZED_HEADER_SIZE,
};
use siodb_crypto::Sha256Hasher;
use siodb_engine::{
	codes, ColumnDataType, ColumnSpecification, Database, Instance, SiodbOptions, TableType, Variant,
};

const SUPER: u32 = 1;

fn plaintext_options(data_dir: &std::path::Path) -> SiodbOptions {
	let mut options = SiodbOptions::with_defaults("siodb_tables", data_dir);
	options.encryption.master_cipher_id = "none".into();
	options.encryption.system_db_cipher_id = "none".into();
	options.encryption.default_cipher_id = "none".into();
	options.general.super_user_initial_access_key = "k".repeat(64);
	options
}

fn new_instance(dir: &tempfile::TempDir) -> Arc<Instance> {
	Instance::new(plaintext_options(&dir.path().join("data"))).unwrap()
}

fn user_database(instance: &Arc<Instance>) -> Arc<Database> {
	instance.create_database("TESTDB", None, None, None, SUPER).unwrap()
}

// Wide rows force a chain of blocks whose digests obey the published recurrence.
#[test]
fn block_chain_integrity() {
	let dir = tempfile::tempdir().unwrap();
	let instance = new_instance(&dir);
	let database = user_database(&instance);

	let table = database
		.create_user_table(
			"T",
			TableType::Disk,
			vec![ColumnSpecification::new("C", ColumnDataType::Text).not_null()],
			SUPER,
			None,
		)
		.unwrap();

	// Five rows of ~3.5 MiB each against a 10 MiB data area: two rows per block,
	// so the column chains through three blocks.
	let payload = "x".repeat(3_670_016);
	for _ in 0..5 {
		database.insert_table_row(&table, &[Variant::Text(payload.clone())], SUPER).unwrap();
	}
	table.flush().unwrap();

	let column = table.find_column("C").unwrap();
	let data_dir = column.data_dir().clone();
	for block in 1..=3u64 {
		assert!(data_dir.join(format!("b{}.siodf", block)).exists(), "missing block {}", block);
	}
	assert!(!data_dir.join("b4.siodf").exists());

	// Chain structure.
	{
		let store = column.store().lock();
		assert_eq!(store.registry().prev_block_id(1), Some(0));
		assert_eq!(store.registry().prev_block_id(2), Some(1));
		assert_eq!(store.registry().prev_block_id(3), Some(2));
	}

	// Verify the digest recurrence against the raw block files.
	let read_header = |block: u64| -> BlockHeader {
		let raw = std::fs::read(data_dir.join(format!("b{}.siodf", block))).unwrap();
		BlockHeader::deserialize(&raw[..SERIALIZED_HEADER_SIZE]).unwrap()
	};
	let expected_digest = |header: &BlockHeader, prev: &[u8; 32]| -> [u8; 32] {
		let raw = std::fs::read(data_dir.join(format!("b{}.siodf", header.block_id))).unwrap();
		let data_len = header.next_data_offset as usize;
		let mut meta = [0u8; 44];
		meta[..16].copy_from_slice(header.database_uuid.as_bytes());
		meta[16..20].copy_from_slice(&header.table_id.to_le_bytes());
		meta[20..24].copy_from_slice(&header.column_id.to_le_bytes());
		meta[24..32].copy_from_slice(&header.block_id.to_le_bytes());
		meta[32..40].copy_from_slice(&header.fill_timestamp.to_le_bytes());
		meta[40..44].copy_from_slice(&(data_len as u32).to_le_bytes());
		let mut hasher = Sha256Hasher::new();
		hasher.update(prev);
		hasher.update(&meta);
		hasher.update(&raw[DATA_FILE_HEADER_SIZE..DATA_FILE_HEADER_SIZE + data_len]);
		hasher.finish()
	};

	let header1 = read_header(1);
	let header2 = read_header(2);
	let header3 = read_header(3);

	// Finalised blocks carry a fill timestamp and the chained digest.
	assert_ne!(header1.fill_timestamp, 0);
	assert_ne!(header2.fill_timestamp, 0);
	assert_eq!(header1.digest, expected_digest(&header1, &INITIAL_PREV_BLOCK_DIGEST));
	assert_eq!(header2.digest, expected_digest(&header2, &header1.digest));
	// The current block is not finalised yet.
	assert_eq!(header3.fill_timestamp, 0);
	assert_eq!(header3.digest, [0u8; 32]);

	// All five rows read back.
	for trid in 1..=5u64 {
		let row = table.read_row(trid).unwrap().unwrap();
		assert_eq!(row[0], Variant::Text(payload.clone()));
	}
}

// A CREATE TABLE with several findings raises one compound error and mutates
// nothing.
#[test]
fn compound_validation_error() {
	let dir = tempfile::tempdir().unwrap();
	let instance = new_instance(&dir);
	let database = user_database(&instance);

	let specs = vec![
		ColumnSpecification::new("A", ColumnDataType::Int32),
		ColumnSpecification::new("A", ColumnDataType::Text),
		ColumnSpecification::new("B", ColumnDataType::Int32).not_null().not_null(),
	];
	let error = database.create_user_table("T", TableType::Disk, specs, SUPER, None).unwrap_err();
	match &error {
		siodb_engine::DbError::Compound(findings) => {
			assert!(findings.iter().any(|f| f.code == codes::DUPLICATE_COLUMN_NAME && f.message.contains("'A'")));
			assert!(findings.iter().any(|f| f.code == codes::DUPLICATE_CONSTRAINT_TYPE
				&& f.message.contains("NOT NULL")
				&& f.message.contains("'B'")));
		},
		other => panic!("expected a compound error, got {}", other),
	}

	// No partial objects in any registry.
	assert!(database.find_table("T").unwrap().is_none());
	let reg = database.registries().read();
	assert!(!reg.tables.contains_name("T"));
	assert!(reg.columns.iter().all(|c| c.name != "A" && c.name != "B"));
}

// Creating and reopening a user table across an instance restart.
#[test]
fn table_survives_restart() {
	let dir = tempfile::tempdir().unwrap();
	let data_dir = dir.path().join("data");
	let options = plaintext_options(&data_dir);

	{
		let instance = Instance::new(options.clone()).unwrap();
		let database = instance.create_database("TESTDB", None, None, None, SUPER).unwrap();
		let table = database
			.create_user_table(
				"EVENTS",
				TableType::Disk,
				vec![
					ColumnSpecification::new("NAME", ColumnDataType::Text).not_null(),
					ColumnSpecification::new("WEIGHT", ColumnDataType::UInt64),
				],
				SUPER,
				None,
			)
			.unwrap();
		for i in 0..10u64 {
			database
				.insert_table_row(&table, &[Variant::Text(format!("event-{}", i)), Variant::UInt64(i)], SUPER)
				.unwrap();
		}
		database.flush().unwrap();
	}

	let instance = Instance::new(options).unwrap();
	let database = instance.find_database_checked("TESTDB").unwrap();
	let table = database.find_table_checked("EVENTS").unwrap();
	assert_eq!(table.column_count(), 3);
	for i in 0..10u64 {
		let row = table.read_row(i + 1).unwrap().unwrap();
		assert_eq!(row[0], Variant::Text(format!("event-{}", i)));
		assert_eq!(row[1], Variant::UInt64(i));
	}
	// Fresh TRIDs continue after the recovered maximum.
	let trid = database.insert_table_row(&table, &[Variant::Text("next".into()), Variant::Null], SUPER).unwrap();
	assert_eq!(trid, 11);
}

// After DROP TABLE no registry nor catalog table references any dropped id, and
// the data directory is gone.
#[test]
fn drop_table_clears_catalog() {
	let dir = tempfile::tempdir().unwrap();
	let instance = new_instance(&dir);
	let database = user_database(&instance);

	let table = database
		.create_user_table(
			"T",
			TableType::Disk,
			vec![
				ColumnSpecification::new("A", ColumnDataType::Text).not_null(),
				ColumnSpecification::new("B", ColumnDataType::UInt64).not_null(),
				ColumnSpecification::new("C", ColumnDataType::Double),
			],
			SUPER,
			None,
		)
		.unwrap();
	let table_id = table.id();
	let table_dir = table.data_dir().clone();
	for i in 0..20u64 {
		database
			.insert_table_row(
				&table,
				&[Variant::Text(format!("row{}", i)), Variant::UInt64(i), Variant::Double(i as f64)],
				SUPER,
			)
			.unwrap();
	}

	// Snapshot the ids that must disappear.
	let (column_ids, constraint_ids, column_set_ids, index_ids) = {
		let reg = database.registries().read();
		(
			reg.columns.ids_of_table(table_id),
			reg.constraints.ids_of_table(table_id),
			reg.column_sets.ids_of_table(table_id),
			reg.indices.ids_of_table(table_id),
		)
	};
	assert_eq!(column_ids.len(), 4);
	assert_eq!(constraint_ids.len(), 2);
	assert_eq!(index_ids.len(), 1);
	drop(table);

	database.drop_table("T", true, SUPER).unwrap();

	// Registries hold nothing of the table.
	{
		let reg = database.registries().read();
		assert!(!reg.tables.contains_name("T"));
		assert!(reg.columns.ids_of_table(table_id).is_empty());
		assert!(reg.constraints.ids_of_table(table_id).is_empty());
		assert!(reg.column_sets.ids_of_table(table_id).is_empty());
		assert!(reg.indices.ids_of_table(table_id).is_empty());
		// The shared system NOT NULL definition is still referenced by the catalog.
		assert!(reg.constraint_definitions.get_by_id(1).is_some());
	}

	// The catalog tables' main indices no longer hold the dropped ids.
	let catalog = database.catalog_tables().unwrap();
	let index_holds = |table: &Arc<siodb_engine::Table>, key: u64| -> bool {
		let master = table.master_column();
		let index = master.main_index().unwrap();
		let found = index.lock().find(key).is_some();
		found
	};
	assert!(!index_holds(&catalog.sys_tables, table_id as u64));
	for id in column_ids {
		assert!(!index_holds(&catalog.sys_columns, id));
	}
	for id in constraint_ids {
		assert!(!index_holds(&catalog.sys_constraints, id));
	}
	for id in column_set_ids {
		assert!(!index_holds(&catalog.sys_column_sets, id));
	}
	for id in index_ids {
		assert!(!index_holds(&catalog.sys_indices, id));
	}

	assert!(!table_dir.exists());
	assert!(database.find_table("T").unwrap().is_none());

	// DROP TABLE IF EXISTS of a missing table is a non-error.
	database.drop_table("T", false, SUPER).unwrap();
	let error = database.drop_table("T", true, SUPER).unwrap_err();
	assert_eq!(error.code(), codes::TABLE_DOES_NOT_EXIST);
}

// The deletion markers written by a partial drop are fully compensated by
// rolling the master column back to the first marker's address.
#[test]
fn delete_rollback_restores_rows() {
	let dir = tempfile::tempdir().unwrap();
	let instance = new_instance(&dir);
	let database = user_database(&instance);

	let table = database
		.create_user_table(
			"R",
			TableType::Disk,
			vec![ColumnSpecification::new("V", ColumnDataType::UInt64).not_null()],
			SUPER,
			None,
		)
		.unwrap();
	for i in 0..5u64 {
		database.insert_table_row(&table, &[Variant::UInt64(i * 10)], SUPER).unwrap();
	}

	let tp = database.begin_transaction(SUPER);
	let first = table.delete_row(2, tp, false).unwrap().unwrap();
	table.delete_row(3, tp, false).unwrap();
	table.delete_row(4, tp, false).unwrap();

	// Compensate: rewind the master column to the first marker.
	table.master_column().rollback_to_address(first.rollback_address).unwrap();

	// Every row is still addressable and intact.
	for trid in 1..=5u64 {
		let row = table.read_row(trid).unwrap().unwrap();
		assert_eq!(row[0], Variant::UInt64((trid - 1) * 10));
	}

	// The rewound space is reused by the next write.
	let trid = database.insert_table_row(&table, &[Variant::UInt64(999)], SUPER).unwrap();
	assert_eq!(table.read_row(trid).unwrap().unwrap()[0], Variant::UInt64(999));
}

// Memory tables are scoped out and rejected up front.
#[test]
fn memory_tables_are_rejected() {
	let dir = tempfile::tempdir().unwrap();
	let instance = new_instance(&dir);
	let database = user_database(&instance);
	let error = database
		.create_user_table("M", TableType::Memory, vec![], SUPER, None)
		.unwrap_err();
	assert_eq!(error.code(), codes::TABLE_TYPE_NOT_SUPPORTED);
}

// User tables are rejected in the system database unless explicitly allowed.
#[test]
fn user_tables_in_system_database_are_rejected() {
	let dir = tempfile::tempdir().unwrap();
	let instance = new_instance(&dir);
	let system = instance.find_database_checked("SYS").unwrap();
	let error = system
		.create_user_table("T", TableType::Disk, vec![], SUPER, None)
		.unwrap_err();
	assert_eq!(error.code(), codes::USER_TABLES_NOT_ALLOWED);
}
