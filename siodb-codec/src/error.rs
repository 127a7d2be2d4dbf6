// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::{error, fmt};

/// Reason a single field failed to deserialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
	/// Input ended before the field was complete.
	NotEnoughData,
	/// Varint does not terminate within ten bytes or overflows the target width.
	VarIntOverflow,
	/// Value does not fit the declared integer width.
	OutOfRange,
	/// String field holds invalid UTF-8.
	InvalidUtf8,
	/// Presence tag or enum discriminant is not a known value.
	InvalidTag(u8),
	/// A nested record failed to deserialize.
	Nested(Box<DecodeError>),
}

impl fmt::Display for FieldError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			FieldError::NotEnoughData => write!(f, "not enough data"),
			FieldError::VarIntOverflow => write!(f, "varint overflow"),
			FieldError::OutOfRange => write!(f, "value out of range"),
			FieldError::InvalidUtf8 => write!(f, "invalid utf-8"),
			FieldError::InvalidTag(tag) => write!(f, "invalid tag {}", tag),
			FieldError::Nested(e) => write!(f, "{}", e),
		}
	}
}

/// Record deserialization error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
	/// Input is shorter than a class UUID.
	NotEnoughData,
	/// Leading class UUID does not match the expected record type.
	ClassUuidMismatch {
		/// Expected record class name.
		class: &'static str,
	},
	/// Serialized class version is newer than this implementation supports.
	UnsupportedClassVersion {
		/// Record class name.
		class: &'static str,
		/// Version found in the input.
		actual: u32,
		/// Highest supported version.
		supported: u32,
	},
	/// A field failed to deserialize.
	Field {
		/// Record class name.
		class: &'static str,
		/// Field name.
		field: &'static str,
		/// Failure reason.
		source: FieldError,
	},
}

impl DecodeError {
	/// Wraps a field failure with its class and field names.
	pub fn field(class: &'static str, field: &'static str, source: FieldError) -> Self {
		DecodeError::Field { class, field, source }
	}
}

impl fmt::Display for DecodeError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			DecodeError::NotEnoughData => write!(f, "not enough data"),
			DecodeError::ClassUuidMismatch { class } => write!(f, "invalid class UUID for {}", class),
			DecodeError::UnsupportedClassVersion { class, actual, supported } =>
				write!(f, "unsupported class version {} for {}: at most {} is supported", actual, class, supported),
			DecodeError::Field { class, field, source } =>
				write!(f, "failed to deserialize field {}.{}: {}", class, field, source),
		}
	}
}

impl error::Error for DecodeError {}
