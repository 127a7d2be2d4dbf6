// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Append-only, digest-chained column data block store.
//!
//! A column's on-disk footprint is a directory of fixed-size block files named
//! `b<block-id>.siodf`, each `header-area (1 KiB) + data-area`. Blocks form a chain
//! through their registry: a block is finalised with a SHA-256 digest computed over
//! its predecessor's digest, its identity and its data, which makes the chain
//! tamper-evident.
//!
//! [`ColumnBlockStore`] is single-owner state; the owning column serialises access
//! with its own lock and may share [`BlockHandle`]s across readers.

mod block;
mod error;
mod header;
mod main_index;
mod registry;

use std::{collections::BTreeMap, num::NonZeroUsize, path::PathBuf, sync::Arc};

use log::warn;
use lru::LruCache;
use parking_lot::Mutex;
use siodb_iofile::FileFactory;
use uuid::Uuid;

pub use crate::{
	block::DataBlock,
	error::{StoreError, StoreResult},
	header::{
		BlockHeader, CURRENT_DATA_FILE_VERSION, DATA_FILE_HEADER_SIZE, INITIAL_PREV_BLOCK_DIGEST,
		SERIALIZED_HEADER_SIZE,
	},
	main_index::{DataAddress, LinearIndexFile, MainIndex, INDEX_NODE_SIZE},
	registry::{BlockListing, BlockRegistry, BlockState},
};

/// Default data area size of a user table column block.
pub const DEFAULT_DATA_AREA_SIZE: u32 = 10 * 1024 * 1024;

/// Data area size of a system table column block.
pub const SYSTEM_TABLE_DATA_AREA_SIZE: u32 = 128 * 1024;

/// Block data file extension.
pub const DATA_FILE_EXTENSION: &str = ".siodf";

/// Extension of named temporary files used when `O_TMPFILE` is unavailable.
pub const TEMP_FILE_EXTENSION: &str = ".tmp";

/// Block file name prefix.
pub const BLOCK_FILE_PREFIX: &str = "b";

/// Creation mode of data files.
pub const DATA_FILE_CREATION_MODE: u32 = 0o660;

/// File name of the master column main index within a column data directory.
pub const MAIN_INDEX_FILE_NAME: &str = "mci.sioidx";

/// Default capacity of the per-column block cache.
pub const DEFAULT_BLOCK_CACHE_CAPACITY: usize = 32;

/// Identity and I/O environment of one column's block store.
#[derive(Debug)]
pub struct StoreContext {
	/// Database name, for diagnostics.
	pub database_name: String,
	/// Table name, for diagnostics.
	pub table_name: String,
	/// Column name, for diagnostics.
	pub column_name: String,
	/// UUID of the owning database.
	pub database_uuid: Uuid,
	/// Id of the owning table.
	pub table_id: u32,
	/// Id of the owning column as stored in block headers.
	pub column_id: u32,
	/// Column data directory holding the block files.
	pub data_dir: PathBuf,
	/// Data area size of every block in this column.
	pub data_area_size: u32,
	/// File factory carrying the database cipher configuration.
	pub files: FileFactory,
}

impl StoreContext {
	/// Path of the block data file for `block_id`.
	pub fn block_file_path(&self, block_id: u64) -> PathBuf {
		self.data_dir.join(format!("{}{}{}", BLOCK_FILE_PREFIX, block_id, DATA_FILE_EXTENSION))
	}

	/// Display coordinates of a block, `'db'.'table'.'column'.'id'`.
	pub fn block_display(&self, block_id: u64) -> String {
		format!("'{}'.'{}'.'{}'.'{}'", self.database_name, self.table_name, self.column_name, block_id)
	}
}

/// Shared handle to a resident block.
pub type BlockHandle = Arc<Mutex<DataBlock>>;

/// Per-column block manager: registry, cache and the available-block set.
#[derive(Debug)]
pub struct ColumnBlockStore {
	ctx: Arc<StoreContext>,
	registry: BlockRegistry,
	cache: LruCache<u64, BlockHandle>,
	available_blocks: BTreeMap<u64, u32>,
}

impl ColumnBlockStore {
	/// New store for a freshly created column with no blocks yet.
	pub fn new(ctx: StoreContext, cache_capacity: usize) -> Self {
		let capacity = NonZeroUsize::new(cache_capacity.max(1)).expect("capacity is at least one; qed");
		ColumnBlockStore {
			ctx: Arc::new(ctx),
			registry: BlockRegistry::new(),
			cache: LruCache::new(capacity),
			available_blocks: BTreeMap::new(),
		}
	}

	/// Opens the store of an existing column by scanning its data directory.
	///
	/// Blocks are rechained in id order; blocks with a fill timestamp are closed,
	/// the newest unfinalised block becomes current, any others become available.
	pub fn open(ctx: StoreContext, cache_capacity: usize) -> StoreResult<Self> {
		let mut store = Self::new(ctx, cache_capacity);

		let mut ids = store.scan_block_ids()?;
		ids.sort_unstable();

		let mut prev = 0u64;
		let mut unfinalized = Vec::new();
		for &id in &ids {
			store.registry.record_block(id, prev, BlockState::Creating);
			let handle = store.load_block(id)?;
			let (finalized, free) = {
				let block = handle.lock();
				(block.fill_timestamp() != 0, block.free_data_space())
			};
			let state = if finalized { BlockState::Closed } else { BlockState::Available };
			handle.lock().set_state(state);
			store.registry.update_state(id, state);
			if !finalized {
				unfinalized.push(id);
				store.available_blocks.insert(id, free);
			}
			prev = id;
		}

		if let Some(&newest) = unfinalized.last() {
			store.registry.update_state(newest, BlockState::Current);
			store.load_block(newest)?.lock().set_state(BlockState::Current);
		}

		Ok(store)
	}

	/// Store context.
	pub fn ctx(&self) -> &StoreContext {
		&self.ctx
	}

	/// Block registry.
	pub fn registry(&self) -> &BlockRegistry {
		&self.registry
	}

	/// The available-block set, `block id → free space`.
	pub fn available_blocks(&self) -> &BTreeMap<u64, u32> {
		&self.available_blocks
	}

	/// Creates a new block chained after `prev_block_id` (zero for a genesis block).
	pub fn create_block(&mut self, prev_block_id: u64, state: BlockState) -> StoreResult<BlockHandle> {
		let block_id = self.registry.generate_next_block_id();
		let block = DataBlock::create(self.ctx.clone(), block_id, prev_block_id, state)?;
		let handle = Arc::new(Mutex::new(block));
		self.cache.put(block_id, handle.clone());
		self.registry.record_block(block_id, prev_block_id, state);
		Ok(handle)
	}

	/// Returns a resident handle to `block_id`, opening the file on a cache miss.
	pub fn load_block(&mut self, block_id: u64) -> StoreResult<BlockHandle> {
		if let Some(handle) = self.cache.get(&block_id) {
			return Ok(handle.clone());
		}
		let listing = self
			.registry
			.find(block_id)
			.ok_or_else(|| StoreError::BlockDoesNotExist { block: self.ctx.block_display(block_id) })?;
		let block = DataBlock::open(self.ctx.clone(), block_id, listing.prev_block_id, listing.state)?;
		let handle = Arc::new(Mutex::new(block));
		self.cache.put(block_id, handle.clone());
		Ok(handle)
	}

	/// Records the free space of a block in the available set.
	pub fn update_available_block(&mut self, block_id: u64, free_space: u32) {
		self.available_blocks.insert(block_id, free_space);
	}

	/// Selects a block with at least `required_len` bytes of free space.
	///
	/// Creates the genesis block when the column is empty; otherwise picks any
	/// available block with enough room, or chains a new successor to the fullest
	/// available block, finalising it in the process.
	pub fn select_available_block(&mut self, required_len: usize) -> StoreResult<BlockHandle> {
		if required_len == 0 || required_len as u64 > self.ctx.data_area_size as u64 {
			return Err(StoreError::InvalidRequiredSpace { required: required_len, data_area_size: self.ctx.data_area_size });
		}

		// No available blocks: start the chain.
		if self.available_blocks.is_empty() {
			let block = self.create_block(0, BlockState::Current)?;
			let (id, free) = {
				let block = block.lock();
				(block.id(), block.free_data_space())
			};
			self.available_blocks.insert(id, free);
			return Ok(block);
		}

		// Any block with enough room wins; otherwise remember the fullest-free one.
		let mut fitting = None;
		let mut best = (0u64, 0u32);
		for (&id, &free) in &self.available_blocks {
			if free as usize >= required_len {
				fitting = Some(id);
				break;
			}
			if free >= best.1 {
				best = (id, free);
			}
		}
		if let Some(id) = fitting {
			return self.load_block(id);
		}

		let block = self.load_block(best.0)?;
		self.available_blocks.remove(&best.0);
		self.create_or_get_next_block(block, required_len)
	}

	/// Chains a successor to `block` and finalises `block`.
	///
	/// Reuses an existing next block in state current or available with enough free
	/// space, otherwise creates a new one. The predecessor of `block` must be
	/// resident so its digest can seed the chain; a missing predecessor is fatal.
	fn create_or_get_next_block(&mut self, block: BlockHandle, required_len: usize) -> StoreResult<BlockHandle> {
		let block_id = block.lock().id();

		let mut next_block = None;
		let next_ids = self.registry.next_block_ids(block_id).to_vec();
		// Iterate existing next blocks in reverse order: the most recently chained
		// block is the most likely to still have free space.
		for &next_id in next_ids.iter().rev() {
			let candidate = self.load_block(next_id)?;
			let (state, free) = {
				let candidate = candidate.lock();
				(candidate.state(), candidate.free_data_space())
			};
			if (state == BlockState::Current || state == BlockState::Available) && free as usize >= required_len {
				next_block = Some(candidate);
				break;
			}
		}
		let next_block = match next_block {
			Some(handle) => handle,
			None => self.create_block(block_id, BlockState::Current)?,
		};

		let prev_block_id = block.lock().prev_block_id();
		let prev_block_digest = if prev_block_id == 0 {
			INITIAL_PREV_BLOCK_DIGEST
		} else {
			let prev = self
				.cache
				.peek(&prev_block_id)
				.cloned()
				.ok_or_else(|| StoreError::BlockNotAvailable { block: self.ctx.block_display(prev_block_id) })?;
			let digest = *prev.lock().digest();
			digest
		};

		self.registry.update_state(block_id, BlockState::Closing);
		block.lock().set_state(BlockState::Closing);
		block.lock().finalize(&prev_block_digest)?;
		block.lock().set_state(BlockState::Closed);
		self.registry.update_state(block_id, BlockState::Closed);
		self.available_blocks.remove(&block_id);

		let (next_id, next_free) = {
			let next = next_block.lock();
			(next.id(), next.free_data_space())
		};
		self.available_blocks.insert(next_id, next_free);
		Ok(next_block)
	}

	/// Appends a payload to the column and returns its address.
	pub fn append_data(&mut self, data: &[u8]) -> StoreResult<DataAddress> {
		let handle = self.select_available_block(data.len())?;
		let (block_id, offset, free) = {
			let mut block = handle.lock();
			let offset = block.append(data)?;
			(block.id(), offset, block.free_data_space())
		};
		self.available_blocks.insert(block_id, free);
		Ok(DataAddress::new(block_id, offset))
	}

	/// Reads `buf.len()` bytes at `address`.
	pub fn read_data_at(&mut self, address: DataAddress, buf: &mut [u8]) -> StoreResult<()> {
		let handle = self.load_block(address.block_id)?;
		let block = handle.lock();
		block.read_data(buf, address.offset)
	}

	/// Rewinds the column so the next append lands at `address`.
	///
	/// Blocks chained after the target are demoted to empty available blocks; the
	/// target becomes the current block again. Used by compensating rollback.
	pub fn rollback_to(&mut self, address: DataAddress) -> StoreResult<()> {
		for id in self.registry.descendants(address.block_id) {
			let handle = self.load_block(id)?;
			let free = {
				let mut block = handle.lock();
				block.reset_to_offset(0);
				block.set_state(BlockState::Available);
				block.free_data_space()
			};
			self.registry.update_state(id, BlockState::Available);
			self.available_blocks.insert(id, free);
		}

		let handle = self.load_block(address.block_id)?;
		let free = {
			let mut block = handle.lock();
			block.reset_to_offset(address.offset);
			block.set_state(BlockState::Current);
			block.free_data_space()
		};
		self.registry.update_state(address.block_id, BlockState::Current);
		self.available_blocks.insert(address.block_id, free);
		Ok(())
	}

	/// Flushes every resident modified block.
	pub fn flush(&mut self) -> StoreResult<()> {
		for (_, handle) in self.cache.iter() {
			let mut block = handle.lock();
			block.save_header()?;
			block.flush()?;
		}
		Ok(())
	}

	/// Scans the data directory for the lowest valid block id, zero when none exist.
	///
	/// Files that are neither block files nor well-known auxiliary files are
	/// reported with a warning.
	pub fn find_first_block(&self) -> StoreResult<u64> {
		Ok(self.scan_block_ids()?.into_iter().min().unwrap_or(0))
	}

	fn scan_block_ids(&self) -> StoreResult<Vec<u64>> {
		let io_err = |operation: &'static str, source: std::io::Error| StoreError::Io {
			operation,
			block: self.ctx.block_display(0),
			source,
		};

		let mut ids = Vec::new();
		for entry in std::fs::read_dir(&self.ctx.data_dir).map_err(|e| io_err("read data directory", e))? {
			let entry = entry.map_err(|e| io_err("read data directory", e))?;
			if !entry.file_type().map_err(|e| io_err("stat directory entry", e))?.is_file() {
				continue;
			}
			let name = entry.file_name();
			let name = name.to_string_lossy();
			match parse_block_file_name(&name) {
				Some(id) => ids.push(id),
				None =>
					if !is_well_known_file(&name) {
						warn!(
							target: "columnstore",
							"Consistency check for column '{}'.'{}'.'{}': file '{}' ignored",
							self.ctx.database_name, self.ctx.table_name, self.ctx.column_name, name
						);
					},
			}
		}
		Ok(ids)
	}
}

fn parse_block_file_name(name: &str) -> Option<u64> {
	let stem = name.strip_prefix(BLOCK_FILE_PREFIX)?.strip_suffix(DATA_FILE_EXTENSION)?;
	if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
		return None;
	}
	stem.parse().ok()
}

fn is_well_known_file(name: &str) -> bool {
	name == MAIN_INDEX_FILE_NAME || name.ends_with(TEMP_FILE_EXTENSION)
}

#[cfg(test)]
mod tests {
	use super::*;
	use siodb_crypto::{sha256, Sha256Hasher};
	use std::path::Path;

	const TEST_DATA_AREA: u32 = INDEX_NODE_SIZE;

	fn test_ctx(dir: &Path) -> StoreContext {
		StoreContext {
			database_name: "db".into(),
			table_name: "t".into(),
			column_name: "c".into(),
			database_uuid: Uuid::from_u128(0xdead_beef),
			table_id: 256,
			column_id: 257,
			data_dir: dir.to_owned(),
			data_area_size: TEST_DATA_AREA,
			files: FileFactory::plaintext(),
		}
	}

	fn expected_digest(prev: &[u8; 32], ctx: &StoreContext, block_id: u64, fill_ts: u64, data: &[u8]) -> [u8; 32] {
		use byteorder::{ByteOrder, LittleEndian};
		let mut meta = [0u8; 44];
		meta[..16].copy_from_slice(ctx.database_uuid.as_bytes());
		LittleEndian::write_u32(&mut meta[16..20], ctx.table_id);
		LittleEndian::write_u32(&mut meta[20..24], ctx.column_id);
		LittleEndian::write_u64(&mut meta[24..32], block_id);
		LittleEndian::write_u64(&mut meta[32..40], fill_ts);
		LittleEndian::write_u32(&mut meta[40..44], data.len() as u32);
		let mut hasher = Sha256Hasher::new();
		hasher.update(prev);
		hasher.update(&meta);
		hasher.update(data);
		hasher.finish()
	}

	#[test]
	fn genesis_block_creation() {
		let dir = tempfile::tempdir().unwrap();
		let mut store = ColumnBlockStore::new(test_ctx(dir.path()), 8);

		let block = store.select_available_block(100).unwrap();
		{
			let block = block.lock();
			assert_eq!(block.id(), 1);
			assert_eq!(block.prev_block_id(), 0);
			assert_eq!(block.state(), BlockState::Current);
			assert_eq!(block.free_data_space(), TEST_DATA_AREA);
		}
		assert!(dir.path().join("b1.siodf").exists());
		let file_len = std::fs::metadata(dir.path().join("b1.siodf")).unwrap().len();
		assert_eq!(file_len, DATA_FILE_HEADER_SIZE as u64 + TEST_DATA_AREA as u64);
	}

	#[test]
	fn append_and_read_back() {
		let dir = tempfile::tempdir().unwrap();
		let mut store = ColumnBlockStore::new(test_ctx(dir.path()), 8);

		let addr1 = store.append_data(b"first").unwrap();
		let addr2 = store.append_data(b"second").unwrap();
		assert_eq!(addr1, DataAddress::new(1, 0));
		assert_eq!(addr2, DataAddress::new(1, 5));

		let mut buf = [0u8; 6];
		store.read_data_at(addr2, &mut buf).unwrap();
		assert_eq!(&buf, b"second");
	}

	#[test]
	fn out_of_range_write_is_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let mut store = ColumnBlockStore::new(test_ctx(dir.path()), 8);
		let block = store.select_available_block(1).unwrap();
		let mut block = block.lock();
		let err = block.write_data(&[0u8; 16], TEST_DATA_AREA - 8).unwrap_err();
		assert!(matches!(err, StoreError::OutOfRange { .. }));
	}

	#[test]
	fn chains_blocks_and_verifies_digests() {
		let dir = tempfile::tempdir().unwrap();
		let ctx = test_ctx(dir.path());
		let mut store = ColumnBlockStore::new(test_ctx(dir.path()), 8);

		// Three payloads of ~2/3 the data area force a three-block chain.
		let payload_len = (TEST_DATA_AREA as usize) * 2 / 3;
		let payloads: Vec<Vec<u8>> = (0..3u8).map(|i| vec![i + 1; payload_len]).collect();
		let mut addresses = Vec::new();
		for payload in &payloads {
			addresses.push(store.append_data(payload).unwrap());
		}
		assert_eq!(addresses[0], DataAddress::new(1, 0));
		assert_eq!(addresses[1], DataAddress::new(2, 0));
		assert_eq!(addresses[2], DataAddress::new(3, 0));

		assert_eq!(store.registry().prev_block_id(1), Some(0));
		assert_eq!(store.registry().prev_block_id(2), Some(1));
		assert_eq!(store.registry().prev_block_id(3), Some(2));
		assert_eq!(store.registry().find(1).unwrap().state, BlockState::Closed);
		assert_eq!(store.registry().find(2).unwrap().state, BlockState::Closed);
		assert_eq!(store.registry().find(3).unwrap().state, BlockState::Current);

		// Verify the digest recurrence from the genesis constant.
		let block1 = store.load_block(1).unwrap();
		let (ts1, digest1) = {
			let b = block1.lock();
			(b.fill_timestamp(), *b.digest())
		};
		assert_eq!(digest1, expected_digest(&INITIAL_PREV_BLOCK_DIGEST, &ctx, 1, ts1, &payloads[0]));

		let block2 = store.load_block(2).unwrap();
		let (ts2, digest2) = {
			let b = block2.lock();
			(b.fill_timestamp(), *b.digest())
		};
		assert_eq!(digest2, expected_digest(&digest1, &ctx, 2, ts2, &payloads[1]));
	}

	#[test]
	fn exactly_one_current_block() {
		let dir = tempfile::tempdir().unwrap();
		let mut store = ColumnBlockStore::new(test_ctx(dir.path()), 8);
		let payload = vec![0xaau8; (TEST_DATA_AREA as usize) * 2 / 3];
		for _ in 0..4 {
			store.append_data(&payload).unwrap();
		}
		let current: Vec<u64> = store
			.registry()
			.iter()
			.filter(|(_, listing)| listing.state == BlockState::Current)
			.map(|(id, _)| id)
			.collect();
		assert_eq!(current.len(), 1);
	}

	#[test]
	fn reopen_recovers_chain() {
		let dir = tempfile::tempdir().unwrap();
		let payload = vec![0x55u8; (TEST_DATA_AREA as usize) * 2 / 3];
		{
			let mut store = ColumnBlockStore::new(test_ctx(dir.path()), 8);
			for _ in 0..3 {
				store.append_data(&payload).unwrap();
			}
			store.flush().unwrap();
		}

		let mut store = ColumnBlockStore::open(test_ctx(dir.path()), 8).unwrap();
		assert_eq!(store.registry().len(), 3);
		assert_eq!(store.registry().prev_block_id(3), Some(2));
		assert_eq!(store.registry().find(1).unwrap().state, BlockState::Closed);
		assert_eq!(store.registry().find(3).unwrap().state, BlockState::Current);
		assert_eq!(store.find_first_block().unwrap(), 1);

		// The recovered current block continues the chain where it left off.
		let addr = store.append_data(b"more").unwrap();
		assert_eq!(addr.block_id, 3);
	}

	#[test]
	fn rollback_rewinds_write_position() {
		let dir = tempfile::tempdir().unwrap();
		let mut store = ColumnBlockStore::new(test_ctx(dir.path()), 8);

		let keep = store.append_data(b"keep").unwrap();
		let first_discarded = store.append_data(b"discard1").unwrap();
		store.append_data(b"discard2").unwrap();

		store.rollback_to(first_discarded).unwrap();
		let addr = store.append_data(b"redo").unwrap();
		assert_eq!(addr, first_discarded);

		let mut buf = [0u8; 4];
		store.read_data_at(keep, &mut buf).unwrap();
		assert_eq!(&buf, b"keep");
	}

	#[test]
	fn unknown_files_are_ignored() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("stray.dat"), b"x").unwrap();
		std::fs::write(dir.path().join(MAIN_INDEX_FILE_NAME), b"x").unwrap();
		let store = ColumnBlockStore::new(test_ctx(dir.path()), 8);
		assert_eq!(store.find_first_block().unwrap(), 0);
	}

	#[test]
	fn block_file_name_parsing() {
		assert_eq!(parse_block_file_name("b1.siodf"), Some(1));
		assert_eq!(parse_block_file_name("b123.siodf"), Some(123));
		assert_eq!(parse_block_file_name("b.siodf"), None);
		assert_eq!(parse_block_file_name("b12x.siodf"), None);
		assert_eq!(parse_block_file_name("x12.siodf"), None);
		assert_eq!(parse_block_file_name("b12.tmp"), None);
	}

	#[test]
	fn encrypted_store_roundtrip() {
		use siodb_crypto::get_cipher;
		let cipher = get_cipher("aes128").unwrap().unwrap();
		let key = [3u8; 16];
		let files = FileFactory::encrypted(
			cipher.create_encryption_context(&key).unwrap(),
			cipher.create_decryption_context(&key).unwrap(),
		);

		let dir = tempfile::tempdir().unwrap();
		let mut ctx = test_ctx(dir.path());
		ctx.files = files.clone();
		let mut store = ColumnBlockStore::new(ctx, 8);
		let addr = store.append_data(b"confidential").unwrap();
		store.flush().unwrap();
		drop(store);

		// Ciphertext on disk.
		let raw = std::fs::read(dir.path().join("b1.siodf")).unwrap();
		assert!(!raw.windows(12).any(|w| w == b"confidential"));

		let mut ctx = test_ctx(dir.path());
		ctx.files = files;
		let mut store = ColumnBlockStore::open(ctx, 8).unwrap();
		let mut buf = [0u8; 12];
		store.read_data_at(addr, &mut buf).unwrap();
		assert_eq!(&buf, b"confidential");
	}

	// sanity: the digest helper in tests matches the block implementation
	#[test]
	fn digest_helper_matches_compute_digest() {
		let dir = tempfile::tempdir().unwrap();
		let ctx = test_ctx(dir.path());
		let mut store = ColumnBlockStore::new(test_ctx(dir.path()), 8);
		store.append_data(b"abc").unwrap();
		let block = store.load_block(1).unwrap();
		let block = block.lock();
		let computed = block.compute_digest(&INITIAL_PREV_BLOCK_DIGEST).unwrap();
		assert_eq!(computed, expected_digest(&INITIAL_PREV_BLOCK_DIGEST, &ctx, 1, 0, b"abc"));
		// and it is not a plain hash of the data
		assert_ne!(computed, sha256(b"abc"));
	}
}
