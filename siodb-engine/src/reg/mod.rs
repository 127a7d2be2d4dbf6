// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Catalog records and their in-memory registries.
//!
//! Every catalog entity has a paired record type with a stable class UUID and an
//! integer class version, serialized through `siodb-codec`. Registries are
//! multi-indexed collections keyed simultaneously by id, by name where meaningful,
//! by foreign id, and by hash for constraint definitions. Uniqueness of ids and
//! names is a registry invariant; duplicate insertion is a bug, not a recoverable
//! error.

mod cipher_key;
mod column;
mod column_definition;
mod column_set;
mod constraint;
mod constraint_definition;
mod database;
mod index;
mod system_objects;
mod table;
mod user;
mod user_permission;

pub use cipher_key::CipherKeyRecord;
pub use column::{ColumnRecord, ColumnRegistry};
pub use column_definition::{
	ColumnDefinitionConstraintRecord, ColumnDefinitionConstraintRegistry, ColumnDefinitionRecord,
	ColumnDefinitionRegistry,
};
pub use column_set::{ColumnSetColumnRecord, ColumnSetColumnRegistry, ColumnSetRecord, ColumnSetRegistry};
pub use constraint::{ConstraintRecord, ConstraintRegistry};
pub use constraint_definition::{compute_constraint_definition_hash, ConstraintDefinitionRecord, ConstraintDefinitionRegistry};
pub use database::{DatabaseRecord, DatabaseRegistry};
pub use index::{IndexColumnRecord, IndexColumnRegistry, IndexRecord, IndexRegistry};
pub use system_objects::SystemObjectsRecord;
pub use table::{TableRecord, TableRegistry};
pub use user::{
	UserAccessKeyRecord, UserAccessKeyRegistry, UserRecord, UserRegistry, UserTokenRecord, UserTokenRegistry,
};
pub use user_permission::{UserPermissionRecord, UserPermissionRegistry};

use siodb_codec::{DecodeError, Record, RecordReader, RecordWriter};

/// Writes a nested registry as a varint count followed by each record's envelope.
pub(crate) fn write_nested_records<'a, T, I>(w: &mut RecordWriter, count: usize, records: I)
where
	T: Record + 'a,
	I: Iterator<Item = &'a T>,
{
	w.write_varint(count as u64);
	for record in records {
		w.write_nested(record);
	}
}

/// Reads a nested registry written by [`write_nested_records`].
pub(crate) fn read_nested_records<T: Record>(
	r: &mut RecordReader,
	field: &'static str,
) -> Result<Vec<T>, DecodeError> {
	let count = r.read_varint(field)?;
	let mut records = Vec::with_capacity(count.min(1024) as usize);
	for _ in 0..count {
		records.push(r.read_nested(field)?);
	}
	Ok(records)
}
