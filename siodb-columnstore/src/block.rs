// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::{
	io,
	path::PathBuf,
	sync::Arc,
	time::{SystemTime, UNIX_EPOCH},
};

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};
use siodb_crypto::Sha256Hasher;
use siodb_iofile::{is_tmpfile_unsupported, publish_anonymous_file, FileAccessor};

use crate::{
	error::{StoreError, StoreResult},
	header::{BlockHeader, CURRENT_DATA_FILE_VERSION, DATA_FILE_HEADER_SIZE, SERIALIZED_HEADER_SIZE},
	registry::BlockState,
	StoreContext, DATA_FILE_CREATION_MODE, TEMP_FILE_EXTENSION,
};

/// One column data block backed by a `b<id>.siodf` file.
///
/// The file is `header-area (1 KiB) + data-area`; the data area size is fixed per
/// column. Writes append at `next_data_offset`; finalization stamps the fill
/// timestamp and the chained digest into the header.
#[derive(Debug)]
pub struct DataBlock {
	ctx: Arc<StoreContext>,
	header: BlockHeader,
	prev_block_id: u64,
	state: BlockState,
	data_file_path: PathBuf,
	file: Box<dyn FileAccessor>,
	header_modified: bool,
	data_modified: bool,
}

impl DataBlock {
	/// Creates a new block file and publishes it atomically.
	///
	/// The file is first populated as an anonymous `O_TMPFILE` inode and linked into
	/// place, falling back to a named `.tmp` file and `rename` where `O_TMPFILE` is
	/// not supported. A failure before publication abandons the partial file.
	pub(crate) fn create(ctx: Arc<StoreContext>, block_id: u64, prev_block_id: u64, state: BlockState) -> StoreResult<Self> {
		debug!(
			target: "columnstore",
			"Creating block {}.{}.{}.{}",
			ctx.database_name, ctx.table_name, ctx.column_name, block_id
		);
		let data_file_path = ctx.block_file_path(block_id);
		let file_size = (DATA_FILE_HEADER_SIZE as u64) + ctx.data_area_size as u64;
		let header = BlockHeader::new(ctx.database_uuid, ctx.table_id, ctx.column_id, block_id);

		let io_err = |operation: &'static str, source: io::Error| StoreError::Io {
			operation,
			block: ctx.block_display(block_id),
			source,
		};

		let file = match ctx.files.create_anonymous(&ctx.data_dir, libc::O_DSYNC, DATA_FILE_CREATION_MODE, file_size) {
			Ok(file) => {
				write_header_area(file.as_ref(), &header).map_err(|e| io_err("write header", e))?;
				publish_anonymous_file(file.as_ref(), &data_file_path)
					.map_err(|e| io_err("link new file to the filesystem", e))?;
				file
			},
			Err(ref e) if is_tmpfile_unsupported(e) => {
				let tmp_path = PathBuf::from(format!("{}{}", data_file_path.display(), TEMP_FILE_EXTENSION));
				let result = ctx
					.files
					.create_file(&tmp_path, libc::O_DSYNC, DATA_FILE_CREATION_MODE, file_size)
					.and_then(|file| {
						write_header_area(file.as_ref(), &header)?;
						std::fs::rename(&tmp_path, &data_file_path)?;
						Ok(file)
					});
				match result {
					Ok(file) => file,
					Err(e) => {
						let _ = std::fs::remove_file(&tmp_path);
						return Err(io_err("create new block file", e));
					},
				}
			},
			Err(e) => return Err(io_err("create new block file", e)),
		};

		Ok(DataBlock {
			ctx,
			header,
			prev_block_id,
			state,
			data_file_path,
			file,
			header_modified: false,
			data_modified: false,
		})
	}

	/// Opens an existing block file and validates its header.
	pub(crate) fn open(ctx: Arc<StoreContext>, block_id: u64, prev_block_id: u64, state: BlockState) -> StoreResult<Self> {
		let data_file_path = ctx.block_file_path(block_id);
		let file = ctx
			.files
			.open_file(&data_file_path, libc::O_DSYNC)
			.map_err(|e| match e.kind() {
				io::ErrorKind::NotFound => StoreError::BlockDoesNotExist { block: ctx.block_display(block_id) },
				_ => StoreError::Io { operation: "open block file", block: ctx.block_display(block_id), source: e },
			})?;

		let file_len = file
			.len()
			.map_err(|e| StoreError::Io { operation: "stat block file", block: ctx.block_display(block_id), source: e })?;
		if file_len < SERIALIZED_HEADER_SIZE as u64 {
			return Err(StoreError::InvalidHeaderSize { block: ctx.block_display(block_id), actual: file_len as usize });
		}

		let mut buf = [0u8; SERIALIZED_HEADER_SIZE];
		file.read_exact_at(&mut buf, 0)
			.map_err(|e| StoreError::Io { operation: "read header", block: ctx.block_display(block_id), source: e })?;
		let header = BlockHeader::deserialize(&buf)
			.expect("buffer holds a full serialized header; qed");

		let expected = BlockHeader::new(ctx.database_uuid, ctx.table_id, ctx.column_id, block_id);
		if header.version > CURRENT_DATA_FILE_VERSION || !header.same_identity(&expected) {
			return Err(StoreError::InvalidHeader { block: ctx.block_display(block_id), version: header.version });
		}

		Ok(DataBlock {
			ctx,
			header,
			prev_block_id,
			state,
			data_file_path,
			file,
			header_modified: false,
			data_modified: false,
		})
	}

	/// Block id within the column.
	pub fn id(&self) -> u64 {
		self.header.block_id
	}

	/// Id of the preceding block, zero for genesis blocks.
	pub fn prev_block_id(&self) -> u64 {
		self.prev_block_id
	}

	/// Current lifecycle state.
	pub fn state(&self) -> BlockState {
		self.state
	}

	/// Sets the lifecycle state. The owning store keeps its registry in step.
	pub fn set_state(&mut self, state: BlockState) {
		self.state = state;
	}

	/// Chained digest from the header, zero until finalised.
	pub fn digest(&self) -> &[u8; 32] {
		&self.header.digest
	}

	/// Fill timestamp from the header, zero until finalised.
	pub fn fill_timestamp(&self) -> u64 {
		self.header.fill_timestamp
	}

	/// Next write position within the data area.
	pub fn next_data_offset(&self) -> u32 {
		self.header.next_data_offset
	}

	/// Remaining free space in the data area.
	pub fn free_data_space(&self) -> u32 {
		self.ctx.data_area_size - self.header.next_data_offset
	}

	/// Path of the backing data file.
	pub fn data_file_path(&self) -> &PathBuf {
		&self.data_file_path
	}

	fn check_bounds(&self, pos: u32, len: usize) -> StoreResult<()> {
		if pos as u64 + len as u64 > self.ctx.data_area_size as u64 {
			return Err(StoreError::OutOfRange {
				block: self.ctx.block_display(self.id()),
				pos,
				len,
				data_area_size: self.ctx.data_area_size,
			});
		}
		Ok(())
	}

	/// Reads `buf.len()` bytes from the data area at `pos`.
	pub fn read_data(&self, buf: &mut [u8], pos: u32) -> StoreResult<()> {
		self.check_bounds(pos, buf.len())?;
		self.file
			.read_exact_at(buf, DATA_FILE_HEADER_SIZE as u64 + pos as u64)
			.map_err(|e| StoreError::Io { operation: "read data", block: self.ctx.block_display(self.id()), source: e })
	}

	/// Writes `data` into the data area at `pos`.
	pub fn write_data(&mut self, data: &[u8], pos: u32) -> StoreResult<()> {
		self.check_bounds(pos, data.len())?;
		self.file
			.write_all_at(data, DATA_FILE_HEADER_SIZE as u64 + pos as u64)
			.map_err(|e| StoreError::Io { operation: "write data", block: self.ctx.block_display(self.id()), source: e })?;
		self.data_modified = true;
		Ok(())
	}

	/// Appends `data` at the next data offset and advances it.
	///
	/// Returns the data-area offset the payload was written at.
	pub fn append(&mut self, data: &[u8]) -> StoreResult<u32> {
		let pos = self.header.next_data_offset;
		self.write_data(data, pos)?;
		self.header.next_data_offset += data.len() as u32;
		self.header_modified = true;
		Ok(pos)
	}

	/// Rewinds the write position, clearing any finalization marks.
	///
	/// Used by compensating rollback; content past `pos` is treated as free space.
	pub fn reset_to_offset(&mut self, pos: u32) {
		self.header.next_data_offset = pos;
		self.header.fill_timestamp = 0;
		self.header.digest = [0u8; 32];
		self.header_modified = true;
	}

	/// Computes the chained digest of this block without mutating it.
	///
	/// `digest = SHA-256(prev_digest ‖ identity ‖ fill_timestamp ‖ data_len ‖ data[..data_len])`
	pub fn compute_digest(&self, prev_block_digest: &[u8; 32]) -> StoreResult<[u8; 32]> {
		let data_length = self.header.next_data_offset;

		let mut meta = [0u8; 44];
		meta[..16].copy_from_slice(self.header.database_uuid.as_bytes());
		LittleEndian::write_u32(&mut meta[16..20], self.header.table_id);
		LittleEndian::write_u32(&mut meta[20..24], self.header.column_id);
		LittleEndian::write_u64(&mut meta[24..32], self.header.block_id);
		LittleEndian::write_u64(&mut meta[32..40], self.header.fill_timestamp);
		LittleEndian::write_u32(&mut meta[40..44], data_length);

		let mut hasher = Sha256Hasher::new();
		hasher.update(prev_block_digest);
		hasher.update(&meta);
		if data_length > 0 {
			let mut buffer = vec![0u8; data_length as usize];
			self.read_data(&mut buffer, 0)?;
			hasher.update(&buffer);
		}
		Ok(hasher.finish())
	}

	/// Finalizes the block: stamps the fill timestamp, computes and persists the digest.
	///
	/// The owning store drives the current → closing → closed state transitions.
	pub fn finalize(&mut self, prev_block_digest: &[u8; 32]) -> StoreResult<[u8; 32]> {
		self.header.fill_timestamp = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map(|d| d.as_secs())
			.unwrap_or(0);
		let digest = self.compute_digest(prev_block_digest)?;
		self.header.digest = digest;
		self.header_modified = true;
		self.save_header()?;
		Ok(digest)
	}

	/// Persists the header area.
	pub fn save_header(&mut self) -> StoreResult<()> {
		let mut buf = [0u8; SERIALIZED_HEADER_SIZE];
		self.header.serialize(&mut buf);
		self.file
			.write_all_at(&buf, 0)
			.map_err(|e| StoreError::Io { operation: "write header", block: self.ctx.block_display(self.id()), source: e })?;
		self.header_modified = false;
		Ok(())
	}

	/// Flushes file data to stable storage.
	pub fn flush(&self) -> StoreResult<()> {
		self.file
			.flush()
			.map_err(|e| StoreError::Io { operation: "flush", block: self.ctx.block_display(self.id()), source: e })
	}
}

impl Drop for DataBlock {
	fn drop(&mut self) {
		let was_modified = self.header_modified || self.data_modified;
		if self.header_modified {
			if let Err(e) = self.save_header() {
				warn!(target: "columnstore", "failed to save header on drop: {}", e);
			}
		}
		if was_modified {
			if let Err(e) = self.flush() {
				warn!(target: "columnstore", "failed to flush block on drop: {}", e);
			}
		}
	}
}

fn write_header_area(file: &dyn FileAccessor, header: &BlockHeader) -> io::Result<()> {
	let mut area = vec![0u8; DATA_FILE_HEADER_SIZE];
	let mut buf = [0u8; SERIALIZED_HEADER_SIZE];
	header.serialize(&mut buf);
	area[..SERIALIZED_HEADER_SIZE].copy_from_slice(&buf);
	file.write_all_at(&area, 0)
}
