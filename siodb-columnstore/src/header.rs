// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use byteorder::{ByteOrder, LittleEndian};
use uuid::Uuid;

/// Size of the serialized block header. The remainder of the header area is zero padding.
pub const SERIALIZED_HEADER_SIZE: usize = 80;

/// Size of the header area preceding the data area.
pub const DATA_FILE_HEADER_SIZE: usize = 1024;

/// Current block file format version.
pub const CURRENT_DATA_FILE_VERSION: u32 = 1;

/// Digest of the non-existent predecessor of a genesis block.
pub const INITIAL_PREV_BLOCK_DIGEST: [u8; 32] = [0u8; 32];

/// Fixed-layout column data block header.
///
/// ```text
/// offset  0: 16 B  database UUID
/// offset 16:  4 B  table id (LE)
/// offset 20:  4 B  column id (LE)
/// offset 24:  8 B  block id (LE)
/// offset 32:  4 B  version (LE)
/// offset 36:  8 B  fill timestamp (LE, 0 if not finalised)
/// offset 44:  4 B  next-data offset (LE)
/// offset 48: 32 B  SHA-256 digest (zero until finalised)
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
	/// UUID of the owning database.
	pub database_uuid: Uuid,
	/// Id of the owning table.
	pub table_id: u32,
	/// Id of the owning column.
	pub column_id: u32,
	/// Block id within the column.
	pub block_id: u64,
	/// Block file format version.
	pub version: u32,
	/// Seconds since the epoch at finalization, zero before.
	pub fill_timestamp: u64,
	/// Next write position within the data area.
	pub next_data_offset: u32,
	/// Chained digest, zero until finalised.
	pub digest: [u8; 32],
}

impl BlockHeader {
	/// New header for a freshly created block.
	pub fn new(database_uuid: Uuid, table_id: u32, column_id: u32, block_id: u64) -> Self {
		BlockHeader {
			database_uuid,
			table_id,
			column_id,
			block_id,
			version: CURRENT_DATA_FILE_VERSION,
			fill_timestamp: 0,
			next_data_offset: 0,
			digest: [0u8; 32],
		}
	}

	/// Serializes the header into a fixed-size buffer.
	pub fn serialize(&self, buf: &mut [u8; SERIALIZED_HEADER_SIZE]) {
		buf[..16].copy_from_slice(self.database_uuid.as_bytes());
		LittleEndian::write_u32(&mut buf[16..20], self.table_id);
		LittleEndian::write_u32(&mut buf[20..24], self.column_id);
		LittleEndian::write_u64(&mut buf[24..32], self.block_id);
		LittleEndian::write_u32(&mut buf[32..36], self.version);
		LittleEndian::write_u64(&mut buf[36..44], self.fill_timestamp);
		LittleEndian::write_u32(&mut buf[44..48], self.next_data_offset);
		buf[48..80].copy_from_slice(&self.digest);
	}

	/// Deserializes a header from the head of a header area.
	pub fn deserialize(buf: &[u8]) -> Option<Self> {
		if buf.len() < SERIALIZED_HEADER_SIZE {
			return None;
		}
		let mut uuid_bytes = [0u8; 16];
		uuid_bytes.copy_from_slice(&buf[..16]);
		let mut digest = [0u8; 32];
		digest.copy_from_slice(&buf[48..80]);
		Some(BlockHeader {
			database_uuid: Uuid::from_bytes(uuid_bytes),
			table_id: LittleEndian::read_u32(&buf[16..20]),
			column_id: LittleEndian::read_u32(&buf[20..24]),
			block_id: LittleEndian::read_u64(&buf[24..32]),
			version: LittleEndian::read_u32(&buf[32..36]),
			fill_timestamp: LittleEndian::read_u64(&buf[36..44]),
			next_data_offset: LittleEndian::read_u32(&buf[44..48]),
			digest,
		})
	}

	/// Returns true when `other` names the same `(database, table, column, block)`.
	pub fn same_identity(&self, other: &BlockHeader) -> bool {
		self.database_uuid == other.database_uuid
			&& self.table_id == other.table_id
			&& self.column_id == other.column_id
			&& self.block_id == other.block_id
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample() -> BlockHeader {
		let mut header = BlockHeader::new(Uuid::from_u128(0x0102030405060708090a0b0c0d0e0f10), 7, 3, 42);
		header.fill_timestamp = 1_600_000_000;
		header.next_data_offset = 512;
		header.digest = [0xab; 32];
		header
	}

	#[test]
	fn roundtrip() {
		let header = sample();
		let mut buf = [0u8; SERIALIZED_HEADER_SIZE];
		header.serialize(&mut buf);
		assert_eq!(BlockHeader::deserialize(&buf).unwrap(), header);
	}

	#[test]
	fn field_offsets() {
		let header = sample();
		let mut buf = [0u8; SERIALIZED_HEADER_SIZE];
		header.serialize(&mut buf);
		assert_eq!(&buf[..16], header.database_uuid.as_bytes());
		assert_eq!(LittleEndian::read_u32(&buf[16..20]), 7);
		assert_eq!(LittleEndian::read_u32(&buf[20..24]), 3);
		assert_eq!(LittleEndian::read_u64(&buf[24..32]), 42);
		assert_eq!(LittleEndian::read_u32(&buf[32..36]), CURRENT_DATA_FILE_VERSION);
		assert_eq!(LittleEndian::read_u64(&buf[36..44]), 1_600_000_000);
		assert_eq!(LittleEndian::read_u32(&buf[44..48]), 512);
		assert_eq!(&buf[48..80], &[0xab; 32][..]);
	}

	#[test]
	fn short_buffer() {
		assert!(BlockHeader::deserialize(&[0u8; 79]).is_none());
	}
}
