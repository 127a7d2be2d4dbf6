// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::{io, sync::Arc};

use siodb_crypto::CipherContext;

use crate::{align_down, align_up, other_io_err, FileAccessor, NormalFile};

/// File with a whole-block symmetric cipher transparently applied around I/O.
///
/// All offsets address the logical (decrypted) content. Physical I/O happens at
/// cipher block boundaries: reads decrypt the covering block range, writes
/// read-modify-write the partially covered boundary blocks. The physical file
/// size is always a multiple of the cipher block size.
#[derive(Debug)]
pub struct EncryptedFile {
	inner: NormalFile,
	encryption: Arc<dyn CipherContext>,
	decryption: Arc<dyn CipherContext>,
}

impl EncryptedFile {
	/// Wraps an open file with an encryption/decryption context pair.
	pub fn new(inner: NormalFile, encryption: Arc<dyn CipherContext>, decryption: Arc<dyn CipherContext>) -> Self {
		EncryptedFile { inner, encryption, decryption }
	}

	fn block_size(&self) -> u64 {
		self.encryption.block_size() as u64
	}

	fn decrypt_block_into(&self, physical_offset: u64, out: &mut [u8]) -> io::Result<()> {
		let bs = self.block_size() as usize;
		let mut raw = vec![0u8; bs];
		self.inner.read_exact_at(&mut raw, physical_offset)?;
		self.decryption.transform(&raw, 1, &mut out[..bs]).map_err(other_io_err)
	}
}

impl FileAccessor for EncryptedFile {
	fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
		if buf.is_empty() {
			return Ok(0);
		}
		let bs = self.block_size();
		let file_len = self.inner.len()?;
		if offset >= file_len {
			return Ok(0);
		}
		let avail = (file_len - offset).min(buf.len() as u64) as usize;

		let start = align_down(offset, bs);
		let end = align_up(offset + avail as u64, bs).min(file_len);
		let raw_len = (end - start) as usize;

		let mut raw = vec![0u8; raw_len];
		self.inner.read_exact_at(&mut raw, start)?;
		let mut plain = vec![0u8; raw_len];
		self.decryption.transform(&raw, raw_len / bs as usize, &mut plain).map_err(other_io_err)?;

		let skip = (offset - start) as usize;
		buf[..avail].copy_from_slice(&plain[skip..skip + avail]);
		Ok(avail)
	}

	fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
		if buf.is_empty() {
			return Ok(0);
		}
		let bs = self.block_size();
		let file_len = self.inner.len()?;

		let start = align_down(offset, bs);
		let end = align_up(offset + buf.len() as u64, bs);
		let run_len = (end - start) as usize;
		let mut plain = vec![0u8; run_len];

		// Preserve existing content of partially covered boundary blocks.
		let head_partial = offset > start;
		let tail_partial = offset + (buf.len() as u64) < end;
		let last_block = end - bs;
		if head_partial && start < file_len {
			self.decrypt_block_into(start, &mut plain[..])?;
		}
		if tail_partial && last_block < file_len && !(head_partial && last_block == start) {
			let tail_skip = (last_block - start) as usize;
			self.decrypt_block_into(last_block, &mut plain[tail_skip..])?;
		}

		let skip = (offset - start) as usize;
		plain[skip..skip + buf.len()].copy_from_slice(buf);

		let mut raw = vec![0u8; run_len];
		self.encryption.transform(&plain, run_len / bs as usize, &mut raw).map_err(other_io_err)?;
		self.inner.write_all_at(&raw, start)?;
		Ok(buf.len())
	}

	fn flush(&self) -> io::Result<()> {
		self.inner.flush()
	}

	fn len(&self) -> io::Result<u64> {
		self.inner.len()
	}

	fn raw_fd(&self) -> i32 {
		self.inner.raw_fd()
	}
}
