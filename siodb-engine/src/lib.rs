// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Siodb storage engine core.
//!
//! A relational instance in which every logical column is materialised as an
//! independent, append-only, cryptographically chained file of fixed-size data
//! blocks, and in which the entire catalog is bootstrapped as ordinary tables
//! inside a distinguished system database.
//!
//! The crate covers the catalog registries and their serialization, the system
//! database bootstrap, the per-database object lifecycle with compensating
//! rollback, instance control with envelope encryption of per-database cipher
//! keys, and the permission model. The block store itself lives in
//! `siodb-columnstore`, the file substrate in `siodb-iofile` and the record
//! envelope codec in `siodb-codec`.

pub mod column;
pub mod constants;
pub mod database;
pub mod datatypes;
pub mod error;
pub mod instance;
pub mod master_column;
pub mod options;
pub mod permission;
pub mod reg;
pub mod session;
pub mod system_database;
pub mod table;
pub mod user;
pub mod variant;

pub use crate::{
	column::{Column, ColumnConstraintSpecification, ColumnSpecification},
	database::{Database, DatabaseEnvironment, DatabaseRegistries},
	datatypes::{
		permitted_permissions, ColumnDataType, ColumnState, ConstraintState, ConstraintType, DatabaseObjectType,
		IndexType, TableType,
	},
	error::{codes, DbError, DbResult, ErrorRecord},
	instance::{Instance, InstanceMetadata, MasterCrypto},
	master_column::{MasterColumnRecord, RowOperation, TransactionParams},
	options::SiodbOptions,
	permission::{UserPermissionData, UserPermissionKey},
	session::{ClientSession, SessionRegistry},
	system_database::SystemDatabase,
	table::Table,
	user::User,
	variant::Variant,
};
