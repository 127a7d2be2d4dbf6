// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use siodb_codec::{DecodeError, Record, RecordReader, RecordWriter};
use uuid::{uuid, Uuid};

use super::{
	read_nested_records, write_nested_records, ColumnDefinitionRecord, ColumnDefinitionRegistry, ColumnRecord,
	ColumnRegistry, ColumnSetRecord, ColumnSetRegistry, ConstraintDefinitionRecord, ConstraintDefinitionRegistry,
	ConstraintRecord, ConstraintRegistry, IndexRecord, IndexRegistry, TableRecord, TableRegistry,
};

/// Serialized catalog of one database: every registry plus the ids of its
/// catalog tables, written to the system objects file in the database directory.
#[derive(Default)]
pub struct SystemObjectsRecord {
	/// Ids of the catalog tables, in creation order.
	pub catalog_table_ids: Vec<u32>,
	/// Table registry.
	pub tables: TableRegistry,
	/// Column set registry.
	pub column_sets: ColumnSetRegistry,
	/// Column registry.
	pub columns: ColumnRegistry,
	/// Column definition registry.
	pub column_definitions: ColumnDefinitionRegistry,
	/// Constraint registry.
	pub constraints: ConstraintRegistry,
	/// Constraint definition registry.
	pub constraint_definitions: ConstraintDefinitionRegistry,
	/// Index registry.
	pub indices: IndexRegistry,
}

impl Record for SystemObjectsRecord {
	const CLASS_NAME: &'static str = "SystemObjectsRecord";
	const CLASS_UUID: Uuid = uuid!("2a3b4c5d-6e7f-4081-92a3-b4c5d6e7f810");
	const CLASS_VERSION: u32 = 0;

	fn serialize_body(&self, w: &mut RecordWriter) {
		w.write_varint(self.catalog_table_ids.len() as u64);
		for id in &self.catalog_table_ids {
			w.write_varint(*id as u64);
		}
		write_nested_records(w, self.tables.len(), self.tables.iter());
		write_nested_records(w, self.column_sets.len(), self.column_sets.iter());
		write_nested_records(w, self.columns.len(), self.columns.iter());
		write_nested_records(w, self.column_definitions.len(), self.column_definitions.iter());
		write_nested_records(w, self.constraints.len(), self.constraints.iter());
		write_nested_records(w, self.constraint_definitions.len(), self.constraint_definitions.iter());
		write_nested_records(w, self.indices.len(), self.indices.iter());
	}

	fn deserialize_body(r: &mut RecordReader) -> Result<Self, DecodeError> {
		let count = r.read_varint("catalogTableIds")?;
		let mut catalog_table_ids = Vec::with_capacity(count.min(64) as usize);
		for _ in 0..count {
			catalog_table_ids.push(r.read_varint_u32("catalogTableIds")?);
		}

		let mut record = SystemObjectsRecord { catalog_table_ids, ..Default::default() };
		for table in read_nested_records::<TableRecord>(r, "tables")? {
			record.tables.insert(table);
		}
		for column_set in read_nested_records::<ColumnSetRecord>(r, "columnSets")? {
			record.column_sets.insert(column_set);
		}
		for column in read_nested_records::<ColumnRecord>(r, "columns")? {
			record.columns.insert(column);
		}
		for definition in read_nested_records::<ColumnDefinitionRecord>(r, "columnDefinitions")? {
			record.column_definitions.insert(definition);
		}
		for constraint in read_nested_records::<ConstraintRecord>(r, "constraints")? {
			record.constraints.insert(constraint);
		}
		for definition in read_nested_records::<ConstraintDefinitionRecord>(r, "constraintDefinitions")? {
			record.constraint_definitions.insert(definition);
		}
		for index in read_nested_records::<IndexRecord>(r, "indices")? {
			record.indices.insert(index);
		}
		Ok(record)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::datatypes::{ColumnDataType, ColumnState, ConstraintState, ConstraintType, TableType};
	use siodb_codec::{deserialize_record, serialize_record};

	#[test]
	fn roundtrip_preserves_all_registries() {
		let mut record = SystemObjectsRecord::default();
		record.catalog_table_ids = vec![1, 2, 3];
		record.tables.insert(TableRecord {
			id: 1,
			table_type: TableType::Disk,
			name: "SYS_TABLES".into(),
			first_user_trid: 4097,
			current_column_set_id: 1,
			description: None,
		});
		record.columns.insert(ColumnRecord {
			id: 1,
			name: "TRID".into(),
			data_type: ColumnDataType::UInt64,
			table_id: 1,
			state: ColumnState::Active,
			data_block_data_area_size: 128 * 1024,
			description: None,
		});
		record.constraint_definitions.insert(ConstraintDefinitionRecord::new(1, ConstraintType::NotNull, vec![1]));
		record.constraints.insert(ConstraintRecord {
			id: 1,
			name: "NN_SYS_TABLES_NAME".into(),
			state: ConstraintState::Active,
			table_id: 1,
			column_id: 2,
			constraint_definition_id: 1,
			description: None,
		});

		let bytes = serialize_record(&record);
		let (decoded, consumed) = deserialize_record::<SystemObjectsRecord>(&bytes).unwrap();
		assert_eq!(consumed, bytes.len());
		assert_eq!(decoded.catalog_table_ids, vec![1, 2, 3]);
		assert_eq!(decoded.tables.len(), 1);
		assert_eq!(decoded.tables.get_by_name("SYS_TABLES").unwrap().id, 1);
		assert_eq!(decoded.columns.len(), 1);
		assert_eq!(decoded.constraints.get_by_name("NN_SYS_TABLES_NAME").unwrap().id, 1);
		assert_eq!(decoded.constraint_definitions.len(), 1);
	}
}
