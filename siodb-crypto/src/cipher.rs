// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::sync::Arc;

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes256};

use crate::error::CryptoError;

/// Description of a symmetric whole-block cipher.
///
/// A cipher yields independent encryption and decryption contexts from a raw key.
/// The same key must be handed to both to get a matching pair.
pub trait Cipher: Send + Sync {
	/// Well-known cipher id, e.g. `aes128`.
	fn cipher_id(&self) -> &'static str;

	/// Key size in bits.
	fn key_size_bits(&self) -> usize;

	/// Block size in bits.
	fn block_size_bits(&self) -> usize;

	/// Creates an encryption context from a raw key.
	fn create_encryption_context(&self, key: &[u8]) -> Result<Arc<dyn CipherContext>, CryptoError>;

	/// Creates a decryption context from a raw key.
	fn create_decryption_context(&self, key: &[u8]) -> Result<Arc<dyn CipherContext>, CryptoError>;

	/// Key size in bytes.
	fn key_size(&self) -> usize {
		self.key_size_bits() / 8
	}

	/// Block size in bytes.
	fn block_size(&self) -> usize {
		self.block_size_bits() / 8
	}
}

/// One direction of a cipher key schedule.
///
/// Transforms whole cipher blocks only. Input and output may not alias.
pub trait CipherContext: Send + Sync + std::fmt::Debug {
	/// Transforms `block_count` blocks from `input` into `output`.
	fn transform(&self, input: &[u8], block_count: usize, output: &mut [u8]) -> Result<(), CryptoError>;

	/// Block size in bytes.
	fn block_size(&self) -> usize;
}

/// Resolves a cipher id to a catalog entry.
///
/// The id `none` (or an empty id) means encryption is off and resolves to `None`.
pub fn get_cipher(cipher_id: &str) -> Result<Option<Arc<dyn Cipher>>, CryptoError> {
	match cipher_id {
		"" | "none" => Ok(None),
		"aes128" => Ok(Some(Arc::new(Aes128Cipher))),
		"aes256" => Ok(Some(Arc::new(Aes256Cipher))),
		other => Err(CryptoError::UnknownCipher(other.to_owned())),
	}
}

fn check_key_length(cipher_id: &'static str, expected: usize, key: &[u8]) -> Result<(), CryptoError> {
	if key.len() != expected {
		return Err(CryptoError::InvalidKeyLength { cipher_id, expected, actual: key.len() });
	}
	Ok(())
}

fn check_buffers(block_size: usize, block_count: usize, input: &[u8], output: &[u8]) -> Result<(), CryptoError> {
	let required = block_size * block_count;
	if input.len() < required {
		return Err(CryptoError::InputBufferTooSmall { required, actual: input.len() });
	}
	if output.len() < required {
		return Err(CryptoError::OutputBufferTooSmall { required, actual: output.len() });
	}
	Ok(())
}

macro_rules! impl_aes_cipher {
	($cipher:ident, $enc_ctx:ident, $dec_ctx:ident, $core:ty, $id:expr, $key_bits:expr) => {
		/// AES cipher catalog entry.
		pub struct $cipher;

		#[derive(Debug)]
		struct $enc_ctx($core);
		#[derive(Debug)]
		struct $dec_ctx($core);

		impl Cipher for $cipher {
			fn cipher_id(&self) -> &'static str {
				$id
			}

			fn key_size_bits(&self) -> usize {
				$key_bits
			}

			fn block_size_bits(&self) -> usize {
				128
			}

			fn create_encryption_context(&self, key: &[u8]) -> Result<Arc<dyn CipherContext>, CryptoError> {
				check_key_length($id, $key_bits / 8, key)?;
				Ok(Arc::new($enc_ctx(<$core>::new(GenericArray::from_slice(key)))))
			}

			fn create_decryption_context(&self, key: &[u8]) -> Result<Arc<dyn CipherContext>, CryptoError> {
				check_key_length($id, $key_bits / 8, key)?;
				Ok(Arc::new($dec_ctx(<$core>::new(GenericArray::from_slice(key)))))
			}
		}

		impl CipherContext for $enc_ctx {
			fn transform(&self, input: &[u8], block_count: usize, output: &mut [u8]) -> Result<(), CryptoError> {
				check_buffers(16, block_count, input, output)?;
				for i in 0..block_count {
					let mut block = GenericArray::clone_from_slice(&input[i * 16..(i + 1) * 16]);
					self.0.encrypt_block(&mut block);
					output[i * 16..(i + 1) * 16].copy_from_slice(&block);
				}
				Ok(())
			}

			fn block_size(&self) -> usize {
				16
			}
		}

		impl CipherContext for $dec_ctx {
			fn transform(&self, input: &[u8], block_count: usize, output: &mut [u8]) -> Result<(), CryptoError> {
				check_buffers(16, block_count, input, output)?;
				for i in 0..block_count {
					let mut block = GenericArray::clone_from_slice(&input[i * 16..(i + 1) * 16]);
					self.0.decrypt_block(&mut block);
					output[i * 16..(i + 1) * 16].copy_from_slice(&block);
				}
				Ok(())
			}

			fn block_size(&self) -> usize {
				16
			}
		}
	};
}

impl_aes_cipher!(Aes128Cipher, Aes128EncryptionContext, Aes128DecryptionContext, Aes128, "aes128", 128);
impl_aes_cipher!(Aes256Cipher, Aes256EncryptionContext, Aes256DecryptionContext, Aes256, "aes256", 256);

#[cfg(test)]
mod tests {
	use super::*;
	use hex_literal::hex;

	#[test]
	fn cipher_catalog() {
		assert!(get_cipher("none").unwrap().is_none());
		assert!(get_cipher("").unwrap().is_none());
		assert_eq!(get_cipher("aes128").unwrap().unwrap().key_size(), 16);
		assert_eq!(get_cipher("aes256").unwrap().unwrap().key_size(), 32);
		assert_eq!(get_cipher("aes128").unwrap().unwrap().block_size(), 16);
		assert!(matches!(get_cipher("des"), Err(CryptoError::UnknownCipher(_))));
	}

	#[test]
	fn rejects_wrong_key_length() {
		let cipher = get_cipher("aes128").unwrap().unwrap();
		let err = cipher.create_encryption_context(&[0u8; 15]).unwrap_err();
		assert_eq!(err, CryptoError::InvalidKeyLength { cipher_id: "aes128", expected: 16, actual: 15 });
	}

	// FIPS-197 appendix C.1 known answer.
	#[test]
	fn aes128_known_answer() {
		let key = hex!("000102030405060708090a0b0c0d0e0f");
		let plain = hex!("00112233445566778899aabbccddeeff");
		let expected = hex!("69c4e0d86a7b0430d8cdb78070b4c55a");

		let cipher = get_cipher("aes128").unwrap().unwrap();
		let enc = cipher.create_encryption_context(&key).unwrap();
		let dec = cipher.create_decryption_context(&key).unwrap();

		let mut out = [0u8; 16];
		enc.transform(&plain, 1, &mut out).unwrap();
		assert_eq!(out, expected);

		let mut back = [0u8; 16];
		dec.transform(&out, 1, &mut back).unwrap();
		assert_eq!(back, plain);
	}

	#[test]
	fn multi_block_roundtrip() {
		let cipher = get_cipher("aes256").unwrap().unwrap();
		let key = [7u8; 32];
		let enc = cipher.create_encryption_context(&key).unwrap();
		let dec = cipher.create_decryption_context(&key).unwrap();

		let input: Vec<u8> = (0..64u8).collect();
		let mut encrypted = vec![0u8; 64];
		enc.transform(&input, 4, &mut encrypted).unwrap();
		assert_ne!(encrypted, input);

		let mut decrypted = vec![0u8; 64];
		dec.transform(&encrypted, 4, &mut decrypted).unwrap();
		assert_eq!(decrypted, input);
	}

	#[test]
	fn transform_checks_buffer_sizes() {
		let cipher = get_cipher("aes128").unwrap().unwrap();
		let enc = cipher.create_encryption_context(&[0u8; 16]).unwrap();
		let input = [0u8; 16];
		let mut short = [0u8; 8];
		assert!(matches!(
			enc.transform(&input, 1, &mut short),
			Err(CryptoError::OutputBufferTooSmall { required: 16, actual: 8 })
		));
	}
}
