// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Enumerations of the catalog: data types, object states and permission bits.

/// Column data type.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnDataType {
	/// Boolean.
	Bool = 0,
	/// Signed 8-bit integer.
	Int8 = 1,
	/// Unsigned 8-bit integer.
	UInt8 = 2,
	/// Signed 16-bit integer.
	Int16 = 3,
	/// Unsigned 16-bit integer.
	UInt16 = 4,
	/// Signed 32-bit integer.
	Int32 = 5,
	/// Unsigned 32-bit integer.
	UInt32 = 6,
	/// Signed 64-bit integer.
	Int64 = 7,
	/// Unsigned 64-bit integer.
	UInt64 = 8,
	/// 32-bit float.
	Float = 9,
	/// 64-bit float.
	Double = 10,
	/// UTF-8 text.
	Text = 11,
	/// Raw bytes.
	Binary = 12,
	/// Seconds since the epoch.
	Timestamp = 13,
}

/// Data type of every master column.
pub const MASTER_COLUMN_DATA_TYPE: ColumnDataType = ColumnDataType::UInt64;

impl ColumnDataType {
	/// Decodes a stored discriminant.
	pub fn from_u8(value: u8) -> Option<Self> {
		use ColumnDataType::*;
		Some(match value {
			0 => Bool,
			1 => Int8,
			2 => UInt8,
			3 => Int16,
			4 => UInt16,
			5 => Int32,
			6 => UInt32,
			7 => Int64,
			8 => UInt64,
			9 => Float,
			10 => Double,
			11 => Text,
			12 => Binary,
			13 => Timestamp,
			_ => return None,
		})
	}
}

/// Table storage type.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableType {
	/// Disk-backed table.
	Disk = 1,
	/// In-memory table. Reserved, not supported yet.
	Memory = 2,
}

impl TableType {
	/// Decodes a stored discriminant.
	pub fn from_u8(value: u8) -> Option<Self> {
		match value {
			1 => Some(TableType::Disk),
			2 => Some(TableType::Memory),
			_ => None,
		}
	}
}

/// Column lifecycle state. Transitions: creating → active, active → deleted.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnState {
	/// Column is being created.
	Creating = 0,
	/// Column is active.
	Active = 1,
	/// Column is deleted.
	Deleted = 2,
}

impl ColumnState {
	/// Decodes a stored discriminant.
	pub fn from_u8(value: u8) -> Option<Self> {
		match value {
			0 => Some(ColumnState::Creating),
			1 => Some(ColumnState::Active),
			2 => Some(ColumnState::Deleted),
			_ => None,
		}
	}
}

/// Constraint lifecycle state. Transitions: creating → active, active → deleted.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintState {
	/// Constraint is being created.
	Creating = 0,
	/// Constraint is active.
	Active = 1,
	/// Constraint is deleted.
	Deleted = 2,
}

impl ConstraintState {
	/// Decodes a stored discriminant.
	pub fn from_u8(value: u8) -> Option<Self> {
		match value {
			0 => Some(ConstraintState::Creating),
			1 => Some(ConstraintState::Active),
			2 => Some(ConstraintState::Deleted),
			_ => None,
		}
	}
}

/// Constraint type.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstraintType {
	/// NOT NULL constraint.
	NotNull = 1,
	/// DEFAULT value constraint; the expression is the serialized default.
	DefaultValue = 2,
}

impl ConstraintType {
	/// Decodes a stored discriminant.
	pub fn from_u8(value: u8) -> Option<Self> {
		match value {
			1 => Some(ConstraintType::NotNull),
			2 => Some(ConstraintType::DefaultValue),
			_ => None,
		}
	}

	/// Display name used in error messages and generated constraint names.
	pub fn display_name(&self) -> &'static str {
		match self {
			ConstraintType::NotNull => "NOT NULL",
			ConstraintType::DefaultValue => "DEFAULT",
		}
	}

	/// Short prefix used in generated constraint names.
	pub fn name_prefix(&self) -> &'static str {
		match self {
			ConstraintType::NotNull => "NN",
			ConstraintType::DefaultValue => "DF",
		}
	}
}

/// Index type. Only the linear variant is implemented; the rest reserve ids.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexType {
	/// File-backed linear index over 64-bit keys.
	LinearIndexU64 = 1,
	/// B+ tree index. Reserved.
	BPlusTree = 2,
	/// Hash index. Reserved.
	Hash = 3,
}

impl IndexType {
	/// Decodes a stored discriminant.
	pub fn from_u8(value: u8) -> Option<Self> {
		match value {
			1 => Some(IndexType::LinearIndexU64),
			2 => Some(IndexType::BPlusTree),
			3 => Some(IndexType::Hash),
			_ => None,
		}
	}
}

/// Database object types used in permission control.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DatabaseObjectType {
	/// The whole instance.
	Instance = 0,
	/// A database.
	Database = 1,
	/// A table.
	Table = 2,
	/// A single column.
	Column = 3,
	/// An index.
	Index = 4,
	/// A constraint.
	Constraint = 5,
	/// A trigger.
	Trigger = 6,
	/// A stored procedure.
	Procedure = 7,
	/// A function.
	Function = 8,
}

impl DatabaseObjectType {
	/// Decodes a stored discriminant.
	pub fn from_u8(value: u8) -> Option<Self> {
		use DatabaseObjectType::*;
		Some(match value {
			0 => Instance,
			1 => Database,
			2 => Table,
			3 => Column,
			4 => Index,
			5 => Constraint,
			6 => Trigger,
			7 => Procedure,
			8 => Function,
			_ => return None,
		})
	}
}

/// Permission bits, after ISO/IEC 9075-1:2016(E) 4.6.11.
pub mod permissions {
	/// SELECT.
	pub const SELECT: u64 = 0x1;
	/// INSERT.
	pub const INSERT: u64 = 0x2;
	/// UPDATE.
	pub const UPDATE: u64 = 0x4;
	/// DELETE.
	pub const DELETE: u64 = 0x8;
	/// REFERENCES.
	pub const REFERENCES: u64 = 0x10;
	/// USAGE.
	pub const USAGE: u64 = 0x20;
	/// UNDER.
	pub const UNDER: u64 = 0x40;
	/// TRIGGER.
	pub const TRIGGER: u64 = 0x80;
	/// EXECUTE.
	pub const EXECUTE: u64 = 0x100;
	/// CREATE.
	pub const CREATE: u64 = 0x200;
	/// ALTER.
	pub const ALTER: u64 = 0x400;
	/// DROP.
	pub const DROP: u64 = 0x800;
	/// SHOW.
	pub const SHOW: u64 = 0x1000;
}

/// Permission bits grantable on a given object type.
pub fn permitted_permissions(object_type: DatabaseObjectType) -> u64 {
	use permissions::*;
	match object_type {
		DatabaseObjectType::Instance => CREATE | ALTER | DROP | SHOW,
		DatabaseObjectType::Database => CREATE | ALTER | DROP | SHOW | USAGE,
		DatabaseObjectType::Table =>
			SELECT | INSERT | UPDATE | DELETE | REFERENCES | TRIGGER | ALTER | DROP | SHOW,
		DatabaseObjectType::Column => SELECT | INSERT | UPDATE | REFERENCES,
		DatabaseObjectType::Index => ALTER | DROP | SHOW,
		DatabaseObjectType::Constraint => ALTER | DROP | SHOW,
		DatabaseObjectType::Trigger => ALTER | DROP | SHOW,
		DatabaseObjectType::Procedure => EXECUTE | ALTER | DROP | SHOW,
		DatabaseObjectType::Function => EXECUTE | ALTER | DROP | SHOW,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn discriminant_roundtrips() {
		for v in 0..=13u8 {
			assert_eq!(ColumnDataType::from_u8(v).unwrap() as u8, v);
		}
		assert!(ColumnDataType::from_u8(14).is_none());
		assert_eq!(TableType::from_u8(1), Some(TableType::Disk));
		assert_eq!(DatabaseObjectType::from_u8(2), Some(DatabaseObjectType::Table));
		assert!(DatabaseObjectType::from_u8(9).is_none());
	}

	#[test]
	fn table_permissions_include_crud() {
		let mask = permitted_permissions(DatabaseObjectType::Table);
		assert_eq!(mask & permissions::SELECT, permissions::SELECT);
		assert_eq!(mask & permissions::INSERT, permissions::INSERT);
		assert_eq!(mask & permissions::EXECUTE, 0);
	}
}
