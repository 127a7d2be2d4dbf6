// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::{error, fmt};

/// Cipher schedule error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
	/// The requested cipher id is not known to the catalog.
	UnknownCipher(String),
	/// Raw key length does not match the cipher key size.
	InvalidKeyLength {
		/// Cipher id.
		cipher_id: &'static str,
		/// Expected key length in bytes.
		expected: usize,
		/// Actual key length in bytes.
		actual: usize,
	},
	/// Output buffer is too small for the requested number of blocks.
	OutputBufferTooSmall {
		/// Required length in bytes.
		required: usize,
		/// Actual length in bytes.
		actual: usize,
	},
	/// Input does not cover the requested number of blocks.
	InputBufferTooSmall {
		/// Required length in bytes.
		required: usize,
		/// Actual length in bytes.
		actual: usize,
	},
}

impl fmt::Display for CryptoError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			CryptoError::UnknownCipher(id) => write!(f, "unknown cipher '{}'", id),
			CryptoError::InvalidKeyLength { cipher_id, expected, actual } =>
				write!(f, "invalid key length for cipher '{}': expected {} bytes, got {}", cipher_id, expected, actual),
			CryptoError::OutputBufferTooSmall { required, actual } =>
				write!(f, "output buffer too small: required {} bytes, got {}", required, actual),
			CryptoError::InputBufferTooSmall { required, actual } =>
				write!(f, "input buffer too small: required {} bytes, got {}", required, actual),
		}
	}
}

impl error::Error for CryptoError {}
