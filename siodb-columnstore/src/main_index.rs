// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::{
	collections::{BTreeMap, BTreeSet},
	io,
	ops::Bound,
	path::{Path, PathBuf},
};

use byteorder::{ByteOrder, LittleEndian};
use siodb_iofile::{other_io_err, FileAccessor, FileFactory};

/// Address of a value within a column's block chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DataAddress {
	/// Block id within the column.
	pub block_id: u64,
	/// Offset within the block data area.
	pub offset: u32,
}

impl DataAddress {
	/// Size of the fixed binary encoding.
	pub const SERIALIZED_SIZE: usize = 12;

	/// New address.
	pub fn new(block_id: u64, offset: u32) -> Self {
		DataAddress { block_id, offset }
	}

	/// Returns true for the all-zero null address.
	pub fn is_null(&self) -> bool {
		self.block_id == 0 && self.offset == 0
	}

	/// Encodes into a fixed 12-byte buffer.
	pub fn encode(&self, buf: &mut [u8; Self::SERIALIZED_SIZE]) {
		LittleEndian::write_u64(&mut buf[..8], self.block_id);
		LittleEndian::write_u32(&mut buf[8..12], self.offset);
	}

	/// Decodes from a fixed 12-byte buffer.
	pub fn decode(buf: &[u8]) -> Option<Self> {
		if buf.len() < Self::SERIALIZED_SIZE {
			return None;
		}
		Some(DataAddress { block_id: LittleEndian::read_u64(&buf[..8]), offset: LittleEndian::read_u32(&buf[8..12]) })
	}
}

/// Contract of the master-column main index.
///
/// Keys are 64-bit TRIDs, payloads are master column record addresses.
/// Point operations are serialised by the owning column.
pub trait MainIndex: Send {
	/// Smallest present key.
	fn min_key(&self) -> Option<u64>;

	/// Largest present key.
	fn max_key(&self) -> Option<u64>;

	/// Looks up the payload of `key`.
	fn find(&self, key: u64) -> Option<DataAddress>;

	/// Smallest present key strictly greater than `key`.
	fn find_next_key(&self, key: u64) -> Option<u64>;

	/// Inserts or overwrites the payload of `key`.
	fn insert(&mut self, key: u64, value: DataAddress) -> io::Result<()>;

	/// Erases `key`. Returns true when the key was present.
	fn erase(&mut self, key: u64) -> io::Result<bool>;

	/// Reserves storage for `key` without making it present.
	fn preallocate(&mut self, key: u64) -> io::Result<()>;

	/// Number of present keys.
	fn key_count(&self) -> usize;

	/// Flushes index data to stable storage.
	fn flush(&self) -> io::Result<()>;
}

/// Index node size. Column data area sizes must be a multiple of this.
pub const INDEX_NODE_SIZE: u32 = 8 * 1024;

const INDEX_MAGIC: &[u8; 8] = b"SIOLIDX1";
const INDEX_VERSION: u32 = 1;
const SLOT_SIZE: u64 = 16;

const SLOT_FREE: u8 = 0;
const SLOT_PRESENT: u8 = 1;
const SLOT_RESERVED: u8 = 2;

/// File-backed linear main index.
///
/// The slot of a key sits at a position derived directly from the key, so lookups
/// are a single read. Node 0 holds the file header; slots are 16 bytes:
/// `tag (1 B) ‖ padding (3 B) ‖ block id (8 B LE) ‖ offset (4 B LE)`.
#[derive(Debug)]
pub struct LinearIndexFile {
	file: Box<dyn FileAccessor>,
	path: PathBuf,
	present: BTreeMap<u64, DataAddress>,
	reserved: BTreeSet<u64>,
}

impl LinearIndexFile {
	/// Creates a new empty index file. Fails if the file already exists.
	pub fn create(files: &FileFactory, path: &Path) -> io::Result<Self> {
		let file = files.create_file(path, libc::O_DSYNC, 0o660, INDEX_NODE_SIZE as u64)?;
		let mut header = [0u8; 16];
		header[..8].copy_from_slice(INDEX_MAGIC);
		LittleEndian::write_u32(&mut header[8..12], INDEX_VERSION);
		LittleEndian::write_u32(&mut header[12..16], SLOT_SIZE as u32);
		file.write_all_at(&header, 0)?;
		Ok(LinearIndexFile { file, path: path.to_owned(), present: BTreeMap::new(), reserved: BTreeSet::new() })
	}

	/// Opens an existing index file and loads the key directory.
	pub fn open(files: &FileFactory, path: &Path) -> io::Result<Self> {
		let file = files.open_file(path, libc::O_DSYNC)?;

		let mut header = [0u8; 16];
		file.read_exact_at(&mut header, 0)?;
		if &header[..8] != INDEX_MAGIC {
			return Err(other_io_err(format!("{}: not a linear index file", path.display())));
		}
		let version = LittleEndian::read_u32(&header[8..12]);
		if version > INDEX_VERSION {
			return Err(other_io_err(format!("{}: unsupported index version {}", path.display(), version)));
		}

		let mut index =
			LinearIndexFile { file, path: path.to_owned(), present: BTreeMap::new(), reserved: BTreeSet::new() };
		index.load_slots()?;
		Ok(index)
	}

	fn load_slots(&mut self) -> io::Result<()> {
		let file_len = self.file.len()?;
		let mut offset = INDEX_NODE_SIZE as u64;
		let mut node = vec![0u8; INDEX_NODE_SIZE as usize];
		while offset < file_len {
			let chunk = ((file_len - offset).min(INDEX_NODE_SIZE as u64)) as usize;
			self.file.read_exact_at(&mut node[..chunk], offset)?;
			for slot_start in (0..chunk).step_by(SLOT_SIZE as usize) {
				if slot_start + SLOT_SIZE as usize > chunk {
					break;
				}
				let slot = &node[slot_start..slot_start + SLOT_SIZE as usize];
				let key = (offset + slot_start as u64 - INDEX_NODE_SIZE as u64) / SLOT_SIZE + 1;
				match slot[0] {
					SLOT_FREE => {},
					SLOT_PRESENT => {
						let address = DataAddress::decode(&slot[4..]).expect("slot holds a full address; qed");
						self.present.insert(key, address);
					},
					SLOT_RESERVED => {
						self.reserved.insert(key);
					},
					tag =>
						return Err(other_io_err(format!(
							"{}: corrupt slot tag {} for key {}",
							self.path.display(),
							tag,
							key
						))),
				}
			}
			offset += chunk as u64;
		}
		Ok(())
	}

	fn slot_offset(key: u64) -> u64 {
		INDEX_NODE_SIZE as u64 + (key - 1) * SLOT_SIZE
	}

	fn check_key(key: u64) -> io::Result<()> {
		if key == 0 {
			return Err(io::Error::new(io::ErrorKind::InvalidInput, "zero key"));
		}
		Ok(())
	}

	/// Extends the file with explicit zeroes up to a whole node covering `min_len`.
	///
	/// Holes are not usable here: with an encrypted backing file an unwritten
	/// region does not decrypt to zero tags.
	fn ensure_size(&mut self, min_len: u64) -> io::Result<()> {
		let current = self.file.len()?;
		if current >= min_len {
			return Ok(());
		}
		let target = (min_len + INDEX_NODE_SIZE as u64 - 1) / INDEX_NODE_SIZE as u64 * INDEX_NODE_SIZE as u64;
		let zeroes = vec![0u8; INDEX_NODE_SIZE as usize];
		let mut offset = current;
		while offset < target {
			let chunk = ((target - offset).min(INDEX_NODE_SIZE as u64)) as usize;
			self.file.write_all_at(&zeroes[..chunk], offset)?;
			offset += chunk as u64;
		}
		Ok(())
	}

	fn write_slot(&mut self, key: u64, tag: u8, address: DataAddress) -> io::Result<()> {
		let offset = Self::slot_offset(key);
		self.ensure_size(offset + SLOT_SIZE)?;
		let mut slot = [0u8; SLOT_SIZE as usize];
		slot[0] = tag;
		let mut encoded = [0u8; DataAddress::SERIALIZED_SIZE];
		address.encode(&mut encoded);
		slot[4..16].copy_from_slice(&encoded);
		self.file.write_all_at(&slot, offset)
	}
}

impl MainIndex for LinearIndexFile {
	fn min_key(&self) -> Option<u64> {
		self.present.keys().next().copied()
	}

	fn max_key(&self) -> Option<u64> {
		self.present.keys().next_back().copied()
	}

	fn find(&self, key: u64) -> Option<DataAddress> {
		self.present.get(&key).copied()
	}

	fn find_next_key(&self, key: u64) -> Option<u64> {
		self.present.range((Bound::Excluded(key), Bound::Unbounded)).next().map(|(k, _)| *k)
	}

	fn insert(&mut self, key: u64, value: DataAddress) -> io::Result<()> {
		Self::check_key(key)?;
		self.write_slot(key, SLOT_PRESENT, value)?;
		self.reserved.remove(&key);
		self.present.insert(key, value);
		Ok(())
	}

	fn erase(&mut self, key: u64) -> io::Result<bool> {
		Self::check_key(key)?;
		if self.present.remove(&key).is_none() {
			return Ok(false);
		}
		self.write_slot(key, SLOT_FREE, DataAddress::default())?;
		Ok(true)
	}

	fn preallocate(&mut self, key: u64) -> io::Result<()> {
		Self::check_key(key)?;
		if self.present.contains_key(&key) {
			return Ok(());
		}
		self.write_slot(key, SLOT_RESERVED, DataAddress::default())?;
		self.reserved.insert(key);
		Ok(())
	}

	fn key_count(&self) -> usize {
		self.present.len()
	}

	fn flush(&self) -> io::Result<()> {
		self.file.flush()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn factory() -> FileFactory {
		FileFactory::plaintext()
	}

	#[test]
	fn insert_find_erase() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("mci.sioidx");
		let mut index = LinearIndexFile::create(&factory(), &path).unwrap();

		assert_eq!(index.min_key(), None);
		index.insert(3, DataAddress::new(1, 100)).unwrap();
		index.insert(1, DataAddress::new(1, 0)).unwrap();
		index.insert(7, DataAddress::new(2, 50)).unwrap();

		assert_eq!(index.min_key(), Some(1));
		assert_eq!(index.max_key(), Some(7));
		assert_eq!(index.find(3), Some(DataAddress::new(1, 100)));
		assert_eq!(index.find(4), None);
		assert_eq!(index.find_next_key(1), Some(3));
		assert_eq!(index.find_next_key(3), Some(7));
		assert_eq!(index.find_next_key(7), None);
		assert_eq!(index.key_count(), 3);

		assert!(index.erase(3).unwrap());
		assert!(!index.erase(3).unwrap());
		assert_eq!(index.find_next_key(1), Some(7));
	}

	#[test]
	fn survives_reopen() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("mci.sioidx");
		{
			let mut index = LinearIndexFile::create(&factory(), &path).unwrap();
			index.insert(1, DataAddress::new(1, 0)).unwrap();
			index.insert(600, DataAddress::new(4, 4096)).unwrap();
			index.preallocate(601).unwrap();
			index.flush().unwrap();
		}
		let index = LinearIndexFile::open(&factory(), &path).unwrap();
		assert_eq!(index.find(1), Some(DataAddress::new(1, 0)));
		assert_eq!(index.find(600), Some(DataAddress::new(4, 4096)));
		assert_eq!(index.find(601), None);
		assert_eq!(index.key_count(), 2);
	}

	#[test]
	fn preallocate_then_insert() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("mci.sioidx");
		let mut index = LinearIndexFile::create(&factory(), &path).unwrap();
		index.preallocate(1).unwrap();
		assert_eq!(index.find(1), None);
		index.insert(1, DataAddress::new(1, 16)).unwrap();
		assert_eq!(index.find(1), Some(DataAddress::new(1, 16)));
	}

	#[test]
	fn rejects_zero_key() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("mci.sioidx");
		let mut index = LinearIndexFile::create(&factory(), &path).unwrap();
		assert!(index.insert(0, DataAddress::default()).is_err());
	}

	#[test]
	fn encrypted_index_survives_reopen() {
		use siodb_crypto::get_cipher;
		let cipher = get_cipher("aes128").unwrap().unwrap();
		let key = [9u8; 16];
		let files = FileFactory::encrypted(
			cipher.create_encryption_context(&key).unwrap(),
			cipher.create_decryption_context(&key).unwrap(),
		);

		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("mci.sioidx");
		{
			let mut index = LinearIndexFile::create(&files, &path).unwrap();
			index.insert(2, DataAddress::new(1, 128)).unwrap();
			index.flush().unwrap();
		}
		let index = LinearIndexFile::open(&files, &path).unwrap();
		assert_eq!(index.find(2), Some(DataAddress::new(1, 128)));
	}
}
