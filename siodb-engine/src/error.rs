// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Storage engine error taxonomy.
//!
//! Error kinds map to well-known numeric id ranges: user-visible errors are
//! 1000–1999, I/O errors 2000–2999 and internal errors 3000–3999. CREATE TABLE
//! validation failures are raised together as a compound error.

use std::{error, fmt, io};

use siodb_codec::DecodeError;
use siodb_columnstore::StoreError;
use siodb_crypto::CryptoError;

/// User-visible error codes.
pub mod codes {
	/// Table with this name already exists.
	pub const TABLE_ALREADY_EXISTS: u32 = 1001;
	/// Table with this name does not exist.
	pub const TABLE_DOES_NOT_EXIST: u32 = 1002;
	/// Name is not a valid database object name.
	pub const INVALID_OBJECT_NAME: u32 = 1003;
	/// Duplicate column name in a CREATE TABLE statement.
	pub const DUPLICATE_COLUMN_NAME: u32 = 1004;
	/// Duplicate constraint name in a CREATE TABLE statement.
	pub const DUPLICATE_CONSTRAINT_NAME: u32 = 1005;
	/// Constraint with this name already exists in the database.
	pub const CONSTRAINT_ALREADY_EXISTS: u32 = 1006;
	/// The same constraint type appears twice on one column.
	pub const DUPLICATE_CONSTRAINT_TYPE: u32 = 1007;
	/// Database with this name already exists.
	pub const DATABASE_ALREADY_EXISTS: u32 = 1008;
	/// Database with this name does not exist.
	pub const DATABASE_DOES_NOT_EXIST: u32 = 1009;
	/// Database is referenced by an open session.
	pub const DATABASE_IN_USE: u32 = 1010;
	/// The system database cannot be dropped.
	pub const CANNOT_DROP_SYSTEM_DATABASE: u32 = 1011;
	/// User with this name already exists.
	pub const USER_ALREADY_EXISTS: u32 = 1012;
	/// User does not exist.
	pub const USER_DOES_NOT_EXIST: u32 = 1013;
	/// Permission bits are outside the permitted mask of the object type.
	pub const INVALID_PERMISSION_SPEC: u32 = 1014;
	/// Session does not exist.
	pub const SESSION_DOES_NOT_EXIST: u32 = 1015;
	/// Table type is not supported.
	pub const TABLE_TYPE_NOT_SUPPORTED: u32 = 1016;
	/// User tables are not allowed in the system database.
	pub const USER_TABLES_NOT_ALLOWED: u32 = 1017;
	/// Encrypted payload size is not a multiple of the cipher block size.
	pub const INVALID_DATA_SIZE: u32 = 1018;
	/// An object count limit was reached.
	pub const TOO_MANY_OBJECTS: u32 = 1019;
	/// The super user cannot be dropped or deactivated.
	pub const CANNOT_MODIFY_SUPER_USER: u32 = 1020;
	/// Column data area size is invalid.
	pub const INVALID_DATA_AREA_SIZE: u32 = 1021;
}

/// I/O error code.
pub const IO_ERROR: u32 = 2001;

/// Internal error codes.
pub mod internal_codes {
	/// Unclassified broken invariant.
	pub const INTERNAL_ERROR: u32 = 3001;
	/// Master column main index is corrupted.
	pub const INDEX_CORRUPTED: u32 = 3002;
	/// Master column record column count does not match the table.
	pub const INVALID_MASTER_RECORD: u32 = 3003;
	/// On-disk record failed to deserialize.
	pub const CORRUPTED_RECORD: u32 = 3004;
	/// A required system table is missing.
	pub const MISSING_SYSTEM_TABLE: u32 = 3005;
	/// Cipher key record does not match the database cipher.
	pub const INVALID_CIPHER_KEY: u32 = 3006;
	/// Recorded instance name does not match the configured one.
	pub const INSTANCE_NAME_MISMATCH: u32 = 3007;
	/// Block store reported a broken invariant.
	pub const STORE_ERROR: u32 = 3008;
}

/// A single coded finding: error code plus formatted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
	/// Well-known numeric error code.
	pub code: u32,
	/// Formatted message.
	pub message: String,
}

impl fmt::Display for ErrorRecord {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "[{}] {}", self.code, self.message)
	}
}

/// Storage engine error.
#[derive(Debug)]
pub enum DbError {
	/// User-visible error translated to an SQL-style error number.
	User(ErrorRecord),
	/// Aggregate of validation findings raised together.
	Compound(Vec<ErrorRecord>),
	/// File I/O failure with the originating error.
	Io {
		/// What failed.
		message: String,
		/// Underlying error.
		source: io::Error,
	},
	/// Broken invariant or corrupted on-disk structure.
	Internal(ErrorRecord),
}

impl DbError {
	/// New user-visible error.
	pub fn user(code: u32, message: impl Into<String>) -> Self {
		DbError::User(ErrorRecord { code, message: message.into() })
	}

	/// New internal error.
	pub fn internal(code: u32, message: impl Into<String>) -> Self {
		DbError::Internal(ErrorRecord { code, message: message.into() })
	}

	/// New I/O error.
	pub fn io(message: impl Into<String>, source: io::Error) -> Self {
		DbError::Io { message: message.into(), source }
	}

	/// Error code of this error; compound errors report their first finding.
	pub fn code(&self) -> u32 {
		match self {
			DbError::User(record) => record.code,
			DbError::Compound(records) => records.first().map(|r| r.code).unwrap_or(internal_codes::INTERNAL_ERROR),
			DbError::Io { .. } => IO_ERROR,
			DbError::Internal(record) => record.code,
		}
	}

	/// Returns true for user-visible errors carrying `code`.
	pub fn is_user_error(&self, code: u32) -> bool {
		matches!(self, DbError::User(record) if record.code == code)
	}
}

impl fmt::Display for DbError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			DbError::User(record) => write!(f, "{}", record),
			DbError::Compound(records) => {
				write!(f, "multiple errors ({}):", records.len())?;
				for record in records {
					write!(f, " {};", record)?;
				}
				Ok(())
			},
			DbError::Io { message, source } => write!(f, "[{}] {}: {}", IO_ERROR, message, source),
			DbError::Internal(record) => write!(f, "{}", record),
		}
	}
}

impl error::Error for DbError {
	fn source(&self) -> Option<&(dyn error::Error + 'static)> {
		match self {
			DbError::Io { source, .. } => Some(source),
			_ => None,
		}
	}
}

impl From<io::Error> for DbError {
	fn from(e: io::Error) -> Self {
		DbError::Io { message: "file I/O failed".into(), source: e }
	}
}

impl From<StoreError> for DbError {
	fn from(e: StoreError) -> Self {
		match e {
			StoreError::Io { operation, block, source } =>
				DbError::Io { message: format!("block {}: can't {}", block, operation), source },
			other => DbError::internal(internal_codes::STORE_ERROR, other.to_string()),
		}
	}
}

impl From<DecodeError> for DbError {
	fn from(e: DecodeError) -> Self {
		DbError::internal(internal_codes::CORRUPTED_RECORD, e.to_string())
	}
}

impl From<CryptoError> for DbError {
	fn from(e: CryptoError) -> Self {
		DbError::internal(internal_codes::INVALID_CIPHER_KEY, e.to_string())
	}
}

/// Storage engine result.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn code_ranges() {
		assert!(codes::TABLE_ALREADY_EXISTS >= 1000 && codes::TABLE_ALREADY_EXISTS < 2000);
		assert!(IO_ERROR >= 2000 && IO_ERROR < 3000);
		assert!(internal_codes::INDEX_CORRUPTED >= 3000 && internal_codes::INDEX_CORRUPTED < 4000);
	}

	#[test]
	fn compound_reports_first_code() {
		let error = DbError::Compound(vec![
			ErrorRecord { code: codes::DUPLICATE_COLUMN_NAME, message: "duplicate column 'A'".into() },
			ErrorRecord { code: codes::DUPLICATE_CONSTRAINT_TYPE, message: "duplicate NOT NULL".into() },
		]);
		assert_eq!(error.code(), codes::DUPLICATE_COLUMN_NAME);
		let text = error.to_string();
		assert!(text.contains("multiple errors (2)"));
		assert!(text.contains("duplicate column 'A'"));
	}
}
