// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Master column records.
//!
//! Every table has an implicit first column holding one master column record per
//! row: the TRID, the transaction that produced the row version, and the address
//! of every user column value of that row.

use siodb_codec::{decode_varint, encode_varint};
use siodb_columnstore::DataAddress;

use crate::error::{internal_codes, DbError, DbResult};

/// Transaction attribution of a row version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransactionParams {
	/// Id of the user that ran the transaction.
	pub user_id: u32,
	/// Transaction id, unique within the database.
	pub transaction_id: u64,
	/// Transaction timestamp, seconds since the epoch.
	pub timestamp: u64,
}

impl TransactionParams {
	/// New transaction attribution.
	pub fn new(user_id: u32, transaction_id: u64, timestamp: u64) -> Self {
		TransactionParams { user_id, transaction_id, timestamp }
	}
}

/// Row operation recorded in a master column record.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowOperation {
	/// Row insertion.
	Insert = 0,
	/// Row deletion marker.
	Delete = 1,
}

impl RowOperation {
	/// Decodes a stored discriminant.
	pub fn from_u8(value: u8) -> Option<Self> {
		match value {
			0 => Some(RowOperation::Insert),
			1 => Some(RowOperation::Delete),
			_ => None,
		}
	}
}

/// One master column record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MasterColumnRecord {
	/// Table row id.
	pub trid: u64,
	/// Row operation.
	pub operation: RowOperation,
	/// Transaction attribution.
	pub transaction: TransactionParams,
	/// Addresses of the user column values, in column set order. Empty for
	/// deletion markers.
	pub column_addresses: Vec<DataAddress>,
}

impl MasterColumnRecord {
	/// New insertion record.
	pub fn new_insert(trid: u64, transaction: TransactionParams, column_addresses: Vec<DataAddress>) -> Self {
		MasterColumnRecord { trid, operation: RowOperation::Insert, transaction, column_addresses }
	}

	/// New deletion marker.
	pub fn new_delete(trid: u64, transaction: TransactionParams) -> Self {
		MasterColumnRecord { trid, operation: RowOperation::Delete, transaction, column_addresses: Vec::new() }
	}

	/// Number of user column values this record addresses.
	pub fn column_count(&self) -> usize {
		self.column_addresses.len()
	}

	/// Serializes the record body.
	pub fn serialize(&self) -> Vec<u8> {
		let mut out = Vec::with_capacity(16 + self.column_addresses.len() * 6);
		out.push(self.operation as u8);
		encode_varint(self.trid, &mut out);
		encode_varint(self.transaction.user_id as u64, &mut out);
		encode_varint(self.transaction.transaction_id, &mut out);
		encode_varint(self.transaction.timestamp, &mut out);
		encode_varint(self.column_addresses.len() as u64, &mut out);
		for address in &self.column_addresses {
			encode_varint(address.block_id, &mut out);
			encode_varint(address.offset as u64, &mut out);
		}
		out
	}

	/// Deserializes a record body. Returns the record and the bytes consumed.
	pub fn deserialize(data: &[u8]) -> DbResult<(Self, usize)> {
		let corrupt = |what: &str| {
			DbError::internal(internal_codes::CORRUPTED_RECORD, format!("corrupted master column record: {}", what))
		};

		let raw_operation = *data.first().ok_or_else(|| corrupt("missing operation"))?;
		let operation = RowOperation::from_u8(raw_operation)
			.ok_or_else(|| corrupt(&format!("invalid operation {}", raw_operation)))?;
		let mut pos = 1;

		let mut next = |what: &'static str, pos: &mut usize| -> DbResult<u64> {
			let (value, consumed) = decode_varint(&data[*pos..]).map_err(|_| corrupt(what))?;
			*pos += consumed;
			Ok(value)
		};

		let trid = next("trid", &mut pos)?;
		let user_id = next("userId", &mut pos)?;
		let user_id = u32::try_from(user_id).map_err(|_| corrupt("userId out of range"))?;
		let transaction_id = next("transactionId", &mut pos)?;
		let timestamp = next("timestamp", &mut pos)?;

		let count = next("columnCount", &mut pos)?;
		let mut column_addresses = Vec::with_capacity(count.min(4096) as usize);
		for _ in 0..count {
			let block_id = next("columnAddress.blockId", &mut pos)?;
			let offset = next("columnAddress.offset", &mut pos)?;
			let offset = u32::try_from(offset).map_err(|_| corrupt("columnAddress.offset out of range"))?;
			column_addresses.push(DataAddress::new(block_id, offset));
		}

		Ok((
			MasterColumnRecord {
				trid,
				operation,
				transaction: TransactionParams::new(user_id, transaction_id, timestamp),
				column_addresses,
			},
			pos,
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn insert_record_roundtrip() {
		let record = MasterColumnRecord::new_insert(
			42,
			TransactionParams::new(1, 900, 1_600_000_000),
			vec![DataAddress::new(1, 0), DataAddress::new(3, 12345)],
		);
		let bytes = record.serialize();
		let (decoded, consumed) = MasterColumnRecord::deserialize(&bytes).unwrap();
		assert_eq!(decoded, record);
		assert_eq!(consumed, bytes.len());
		assert_eq!(decoded.column_count(), 2);
	}

	#[test]
	fn delete_marker_roundtrip() {
		let record = MasterColumnRecord::new_delete(42, TransactionParams::new(1, 901, 1_600_000_100));
		let bytes = record.serialize();
		let (decoded, _) = MasterColumnRecord::deserialize(&bytes).unwrap();
		assert_eq!(decoded.operation, RowOperation::Delete);
		assert!(decoded.column_addresses.is_empty());
	}

	#[test]
	fn truncated_record_is_rejected() {
		let record = MasterColumnRecord::new_insert(
			1,
			TransactionParams::new(1, 1, 1),
			vec![DataAddress::new(1, 0)],
		);
		let bytes = record.serialize();
		assert!(MasterColumnRecord::deserialize(&bytes[..bytes.len() - 1]).is_err());
	}
}
