// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::{error, fmt, io};

/// Column block store error.
///
/// I/O variants carry the full block coordinates so a failure can be traced to a
/// single file on disk.
#[derive(Debug)]
pub enum StoreError {
	/// File I/O failed.
	Io {
		/// What was being done, e.g. `"write header"`.
		operation: &'static str,
		/// Display coordinates of the affected block.
		block: String,
		/// Underlying error.
		source: io::Error,
	},
	/// Block file header is shorter than the serialized header size.
	InvalidHeaderSize {
		/// Display coordinates of the affected block.
		block: String,
		/// Number of header bytes actually present.
		actual: usize,
	},
	/// Block file header version or identity does not match the expected block.
	InvalidHeader {
		/// Display coordinates of the affected block.
		block: String,
		/// Version found in the file.
		version: u32,
	},
	/// Attempt to access the data area out of its bounds. This is a logic error.
	OutOfRange {
		/// Display coordinates of the affected block.
		block: String,
		/// Requested position within the data area.
		pos: u32,
		/// Requested length.
		len: usize,
		/// Size of the data area.
		data_area_size: u32,
	},
	/// The referenced block does not exist in this column.
	BlockDoesNotExist {
		/// Display coordinates of the missing block.
		block: String,
	},
	/// The referenced block is required to be resident but is not.
	BlockNotAvailable {
		/// Display coordinates of the missing block.
		block: String,
	},
	/// Requested free space is zero or exceeds the data area size.
	InvalidRequiredSpace {
		/// Requested length.
		required: usize,
		/// Size of the data area.
		data_area_size: u32,
	},
}

impl fmt::Display for StoreError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			StoreError::Io { operation, block, source } =>
				write!(f, "block {}: can't {}: {}", block, operation, source),
			StoreError::InvalidHeaderSize { block, actual } =>
				write!(f, "block {}: invalid data file header size {}", block, actual),
			StoreError::InvalidHeader { block, version } =>
				write!(f, "block {}: invalid data file header (version {})", block, version),
			StoreError::OutOfRange { block, pos, len, data_area_size } =>
				write!(f, "block {}: invalid offset or length: {}, {} (data area size {})", block, pos, len, data_area_size),
			StoreError::BlockDoesNotExist { block } => write!(f, "block {} does not exist", block),
			StoreError::BlockNotAvailable { block } => write!(f, "block {} is not available", block),
			StoreError::InvalidRequiredSpace { required, data_area_size } =>
				write!(f, "invalid required space {} for data area size {}", required, data_area_size),
		}
	}
}

impl error::Error for StoreError {
	fn source(&self) -> Option<&(dyn error::Error + 'static)> {
		match self {
			StoreError::Io { source, .. } => Some(source),
			_ => None,
		}
	}
}

/// Column block store result.
pub type StoreResult<T> = Result<T, StoreError>;
