// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use sha2::{Digest, Sha256};

/// Size of a SHA-256 digest in bytes.
pub const DIGEST_SIZE: usize = 32;

/// Stateful SHA-256 computation.
pub struct Sha256Hasher(Sha256);

impl Sha256Hasher {
	/// New hasher with empty state.
	pub fn new() -> Self {
		Sha256Hasher(Sha256::new())
	}

	/// Feeds more data into the hasher.
	pub fn update(&mut self, data: &[u8]) {
		self.0.update(data);
	}

	/// Consumes the hasher and returns the digest.
	pub fn finish(self) -> [u8; DIGEST_SIZE] {
		self.0.finalize().into()
	}
}

impl Default for Sha256Hasher {
	fn default() -> Self {
		Self::new()
	}
}

/// Single-step SHA-256 digest computation.
pub fn sha256(data: &[u8]) -> [u8; DIGEST_SIZE] {
	let mut hasher = Sha256Hasher::new();
	hasher.update(data);
	hasher.finish()
}

#[cfg(test)]
mod tests {
	use super::*;
	use hex_literal::hex;

	#[test]
	fn empty_input() {
		assert_eq!(sha256(b""), hex!("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"));
	}

	#[test]
	fn abc() {
		assert_eq!(sha256(b"abc"), hex!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"));
	}

	#[test]
	fn incremental_matches_single_step() {
		let mut hasher = Sha256Hasher::new();
		hasher.update(b"hello ");
		hasher.update(b"world");
		assert_eq!(hasher.finish(), sha256(b"hello world"));
	}
}
