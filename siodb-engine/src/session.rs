// Copyright 2021 Parity Technologies
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Client sessions.

use std::collections::HashMap;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::{
	error::{codes, DbError, DbResult},
	table::current_timestamp,
};

/// One client session.
#[derive(Clone, Copy, Debug)]
pub struct ClientSession {
	/// Session UUID.
	pub uuid: Uuid,
	/// Id of the authenticated user.
	pub user_id: u32,
	/// Session start, seconds since the epoch.
	pub started_at: u64,
}

/// Registry of open client sessions with collision-free UUIDs.
#[derive(Default)]
pub struct SessionRegistry {
	sessions: Mutex<HashMap<Uuid, ClientSession>>,
}

impl SessionRegistry {
	/// New empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Opens a session for `user_id` and returns its UUID.
	pub fn begin_session(&self, user_id: u32) -> Uuid {
		let mut sessions = self.sessions.lock();
		loop {
			let uuid = Uuid::new_v4();
			if sessions.contains_key(&uuid) {
				continue;
			}
			sessions.insert(uuid, ClientSession { uuid, user_id, started_at: current_timestamp() });
			return uuid;
		}
	}

	/// Ends a session. Ending a missing session is an error.
	pub fn end_session(&self, uuid: Uuid) -> DbResult<ClientSession> {
		self.sessions.lock().remove(&uuid).ok_or_else(|| {
			DbError::user(codes::SESSION_DOES_NOT_EXIST, format!("session {} does not exist", uuid))
		})
	}

	/// Looks up an open session.
	pub fn find_session(&self, uuid: Uuid) -> Option<ClientSession> {
		self.sessions.lock().get(&uuid).copied()
	}

	/// Number of open sessions.
	pub fn len(&self) -> usize {
		self.sessions.lock().len()
	}

	/// Returns true when no session is open.
	pub fn is_empty(&self) -> bool {
		self.sessions.lock().is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn session_lifecycle() {
		let registry = SessionRegistry::new();
		let uuid = registry.begin_session(1);
		assert_eq!(registry.len(), 1);
		assert_eq!(registry.find_session(uuid).unwrap().user_id, 1);

		let session = registry.end_session(uuid).unwrap();
		assert_eq!(session.uuid, uuid);
		assert!(registry.is_empty());
	}

	#[test]
	fn ending_missing_session_is_an_error() {
		let registry = SessionRegistry::new();
		let error = registry.end_session(Uuid::new_v4()).unwrap_err();
		assert_eq!(error.code(), codes::SESSION_DOES_NOT_EXIST);
	}

	#[test]
	fn uuids_are_unique() {
		let registry = SessionRegistry::new();
		let a = registry.begin_session(1);
		let b = registry.begin_session(1);
		assert_ne!(a, b);
	}
}
