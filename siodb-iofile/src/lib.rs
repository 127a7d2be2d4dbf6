// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Positioned file I/O for the storage engine.
//!
//! Two implementations of the same small capability set `{read_at, write_at, flush}`:
//! a plain file backed by direct positioned syscalls, and an encrypted file that
//! transparently applies a whole-block cipher around I/O at cipher block boundaries.
//! The variant is chosen at open time through [`FileFactory`].

mod encrypted;
mod normal;

use std::{io, path::Path, sync::Arc};

use siodb_crypto::CipherContext;

pub use crate::{encrypted::EncryptedFile, normal::NormalFile};

/// Converts an error to an `io::Error`.
pub fn other_io_err<E>(e: E) -> io::Error
where
	E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
	io::Error::new(io::ErrorKind::Other, e)
}

/// Uniform positioned file handle.
///
/// All offsets address the logical (decrypted) file content.
pub trait FileAccessor: Send + Sync + std::fmt::Debug {
	/// Reads up to `buf.len()` bytes at `offset`. Returns the number of bytes read.
	fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

	/// Writes up to `buf.len()` bytes at `offset`. Returns the number of bytes written.
	fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize>;

	/// Flushes file data to stable storage.
	fn flush(&self) -> io::Result<()>;

	/// Current file size in bytes.
	fn len(&self) -> io::Result<u64>;

	/// Raw file descriptor of the underlying file.
	fn raw_fd(&self) -> i32;

	/// Reads exactly `buf.len()` bytes at `offset`.
	fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
		let mut done = 0;
		while done < buf.len() {
			match self.read_at(&mut buf[done..], offset + done as u64)? {
				0 => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "unexpected end of file")),
				n => done += n,
			}
		}
		Ok(())
	}

	/// Writes the whole of `buf` at `offset`.
	fn write_all_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
		let mut done = 0;
		while done < buf.len() {
			match self.write_at(&buf[done..], offset + done as u64)? {
				0 => return Err(io::Error::new(io::ErrorKind::WriteZero, "failed to write whole buffer")),
				n => done += n,
			}
		}
		Ok(())
	}
}

/// Returns true when the error indicates that `O_TMPFILE` is not supported
/// by the filesystem, so the caller should fall back to a named temp file.
pub fn is_tmpfile_unsupported(err: &io::Error) -> bool {
	matches!(err.raw_os_error(), Some(libc::EOPNOTSUPP) | Some(libc::EINVAL) | Some(libc::EISDIR))
}

/// Links an anonymous (`O_TMPFILE`) file into the filesystem at `target`.
///
/// Publication is atomic: either the full file appears at `target` or nothing does.
pub fn publish_anonymous_file(file: &dyn FileAccessor, target: &Path) -> io::Result<()> {
	use std::ffi::CString;
	use std::os::unix::ffi::OsStrExt;

	let fd_path = CString::new(format!("/proc/self/fd/{}", file.raw_fd())).map_err(other_io_err)?;
	let target = CString::new(target.as_os_str().as_bytes()).map_err(other_io_err)?;
	// SAFETY: both paths are valid NUL-terminated C strings for the duration of the call.
	let rc = unsafe {
		libc::linkat(libc::AT_FDCWD, fd_path.as_ptr(), libc::AT_FDCWD, target.as_ptr(), libc::AT_SYMLINK_FOLLOW)
	};
	if rc < 0 {
		return Err(io::Error::last_os_error());
	}
	Ok(())
}

/// Chooses the file implementation from the database cipher configuration.
#[derive(Clone, Debug)]
pub struct FileFactory {
	cipher: Option<(Arc<dyn CipherContext>, Arc<dyn CipherContext>)>,
}

impl FileFactory {
	/// Factory producing plain files.
	pub fn plaintext() -> Self {
		FileFactory { cipher: None }
	}

	/// Factory producing encrypted files from an encryption/decryption context pair.
	pub fn encrypted(encryption: Arc<dyn CipherContext>, decryption: Arc<dyn CipherContext>) -> Self {
		FileFactory { cipher: Some((encryption, decryption)) }
	}

	/// Returns true when produced files are encrypted.
	pub fn is_encrypted(&self) -> bool {
		self.cipher.is_some()
	}

	/// Creates a new file of `initial_size` bytes. Fails if the file already exists.
	pub fn create_file(&self, path: &Path, extra_flags: i32, mode: u32, initial_size: u64) -> io::Result<Box<dyn FileAccessor>> {
		match &self.cipher {
			Some((enc, dec)) => {
				let aligned = align_up(initial_size, enc.block_size() as u64);
				let inner = NormalFile::create(path, extra_flags, mode, aligned)?;
				Ok(Box::new(EncryptedFile::new(inner, enc.clone(), dec.clone())))
			},
			None => Ok(Box::new(NormalFile::create(path, extra_flags, mode, initial_size)?)),
		}
	}

	/// Opens an existing file. Fails if the file does not exist.
	pub fn open_file(&self, path: &Path, extra_flags: i32) -> io::Result<Box<dyn FileAccessor>> {
		match &self.cipher {
			Some((enc, dec)) => {
				let inner = NormalFile::open(path, extra_flags)?;
				Ok(Box::new(EncryptedFile::new(inner, enc.clone(), dec.clone())))
			},
			None => Ok(Box::new(NormalFile::open(path, extra_flags)?)),
		}
	}

	/// Creates an anonymous `O_TMPFILE` file inside `dir`.
	///
	/// Check failures with [`is_tmpfile_unsupported`] to decide on a named-file fallback.
	pub fn create_anonymous(&self, dir: &Path, extra_flags: i32, mode: u32, initial_size: u64) -> io::Result<Box<dyn FileAccessor>> {
		match &self.cipher {
			Some((enc, dec)) => {
				let aligned = align_up(initial_size, enc.block_size() as u64);
				let inner = NormalFile::create_anonymous(dir, extra_flags, mode, aligned)?;
				Ok(Box::new(EncryptedFile::new(inner, enc.clone(), dec.clone())))
			},
			None => Ok(Box::new(NormalFile::create_anonymous(dir, extra_flags, mode, initial_size)?)),
		}
	}
}

pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
	debug_assert!(alignment.is_power_of_two());
	(value + alignment - 1) & !(alignment - 1)
}

pub(crate) fn align_down(value: u64, alignment: u64) -> u64 {
	debug_assert!(alignment.is_power_of_two());
	value & !(alignment - 1)
}

#[cfg(test)]
mod tests {
	use super::*;
	use siodb_crypto::get_cipher;

	fn aes128_factory() -> FileFactory {
		let cipher = get_cipher("aes128").unwrap().unwrap();
		let key = [0x42u8; 16];
		FileFactory::encrypted(
			cipher.create_encryption_context(&key).unwrap(),
			cipher.create_decryption_context(&key).unwrap(),
		)
	}

	#[test]
	fn plain_create_open_roundtrip() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("data");

		let file = FileFactory::plaintext().create_file(&path, 0, 0o660, 4096).unwrap();
		assert_eq!(file.len().unwrap(), 4096);
		file.write_all_at(b"hello", 100).unwrap();
		file.flush().unwrap();
		drop(file);

		let file = FileFactory::plaintext().open_file(&path, 0).unwrap();
		let mut buf = [0u8; 5];
		file.read_exact_at(&mut buf, 100).unwrap();
		assert_eq!(&buf, b"hello");
	}

	#[test]
	fn encrypted_roundtrip_unaligned() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("data");
		let factory = aes128_factory();

		let file = factory.create_file(&path, 0, 0o660, 1000).unwrap();
		// size aligned up to the cipher block size
		assert_eq!(file.len().unwrap(), 1008);

		let payload: Vec<u8> = (0..200u8).collect();
		file.write_all_at(&payload, 13).unwrap();
		file.write_all_at(b"tail", 996).unwrap();
		drop(file);

		let file = factory.open_file(&path, 0).unwrap();
		let mut buf = vec![0u8; 200];
		file.read_exact_at(&mut buf, 13).unwrap();
		assert_eq!(buf, payload);
		let mut tail = [0u8; 4];
		file.read_exact_at(&mut tail, 996).unwrap();
		assert_eq!(&tail, b"tail");
	}

	#[test]
	fn encrypted_bytes_differ_on_disk() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("data");
		let factory = aes128_factory();

		let file = factory.create_file(&path, 0, 0o660, 64).unwrap();
		file.write_all_at(b"secret secret secret", 0).unwrap();
		file.flush().unwrap();
		drop(file);

		let raw = std::fs::read(&path).unwrap();
		assert!(!raw.windows(6).any(|w| w == b"secret"));
	}

	#[test]
	fn anonymous_publication() {
		let dir = tempfile::tempdir().unwrap();
		let target = dir.path().join("published");
		let factory = FileFactory::plaintext();

		let file = match factory.create_anonymous(dir.path(), 0, 0o660, 128) {
			Ok(file) => file,
			Err(ref e) if is_tmpfile_unsupported(e) => return,
			Err(e) => panic!("unexpected error: {}", e),
		};
		file.write_all_at(b"payload", 0).unwrap();
		assert!(!target.exists());
		publish_anonymous_file(file.as_ref(), &target).unwrap();
		assert!(target.exists());

		let reopened = factory.open_file(&target, 0).unwrap();
		let mut buf = [0u8; 7];
		reopened.read_exact_at(&mut buf, 0).unwrap();
		assert_eq!(&buf, b"payload");
	}
}
