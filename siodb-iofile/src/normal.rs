// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::{
	fs::{File, OpenOptions},
	io,
	os::unix::fs::{FileExt, OpenOptionsExt},
	os::unix::io::AsRawFd,
	path::Path,
};

use crate::FileAccessor;

/// Plain file backed by direct positioned syscalls.
#[derive(Debug)]
pub struct NormalFile {
	file: File,
}

impl NormalFile {
	/// Creates a new file of `initial_size` bytes. Fails if the file already exists.
	pub fn create(path: &Path, extra_flags: i32, mode: u32, initial_size: u64) -> io::Result<Self> {
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.create_new(true)
			.mode(mode)
			.custom_flags(extra_flags | libc::O_CLOEXEC)
			.open(path)?;
		file.set_len(initial_size)?;
		Ok(NormalFile { file })
	}

	/// Opens an existing file for reading and writing.
	pub fn open(path: &Path, extra_flags: i32) -> io::Result<Self> {
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.custom_flags(extra_flags | libc::O_CLOEXEC)
			.open(path)?;
		Ok(NormalFile { file })
	}

	/// Creates an anonymous `O_TMPFILE` file inside `dir`.
	pub fn create_anonymous(dir: &Path, extra_flags: i32, mode: u32, initial_size: u64) -> io::Result<Self> {
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.mode(mode)
			.custom_flags(extra_flags | libc::O_TMPFILE | libc::O_CLOEXEC)
			.open(dir)?;
		file.set_len(initial_size)?;
		Ok(NormalFile { file })
	}
}

impl FileAccessor for NormalFile {
	fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
		self.file.read_at(buf, offset)
	}

	fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
		self.file.write_at(buf, offset)
	}

	fn flush(&self) -> io::Result<()> {
		self.file.sync_data()
	}

	fn len(&self) -> io::Result<u64> {
		Ok(self.file.metadata()?.len())
	}

	fn raw_fd(&self) -> i32 {
		self.file.as_raw_fd()
	}
}
