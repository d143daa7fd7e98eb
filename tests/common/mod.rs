//! Shared helpers for the integration tests.
//!
//! The in-crate fixture utilities are compiled only for unit tests, so the
//! integration tests define their own record layout against the public
//! surface: 16-byte objects carrying an 8-byte big-endian key and an 8-byte
//! big-endian payload. Whole-object comparison covers all 16 bytes, so
//! records sharing a key stay strictly ordered by payload.

#![allow(dead_code)]

use tanoak::{ObjectOps, Tree};

use std::cell::Cell;
use std::cmp::Ordering;
use std::rc::Rc;

/// Byte width of the test record.
pub const RECORD_SIZE: usize = 16;

/// Encodes a test record.
pub fn record(key: u64, payload: u64) -> [u8; RECORD_SIZE] {
	let mut buf = [0u8; RECORD_SIZE];
	buf[..8].copy_from_slice(&key.to_be_bytes());
	buf[8..].copy_from_slice(&payload.to_be_bytes());
	buf
}

/// Encodes a bare search key.
pub fn key_bytes(key: u64) -> [u8; 8] {
	key.to_be_bytes()
}

/// Reads the key back out of a record.
pub fn record_key(object: &[u8]) -> u64 {
	u64::from_be_bytes(object[..8].try_into().expect("record carries an 8-byte key"))
}

/// Reads the payload back out of a record.
pub fn record_payload(object: &[u8]) -> u64 {
	u64::from_be_bytes(object[8..16].try_into().expect("record carries an 8-byte payload"))
}

/// Callbacks for the test record layout, counting deletions through a shared
/// cell so tests can observe the count after the tree is gone.
#[derive(Default)]
pub struct RecordOps {
	pub deleted: Rc<Cell<usize>>,
}

impl RecordOps {
	/// Returns the ops and a handle onto its deletion counter.
	pub fn counted() -> (RecordOps, Rc<Cell<usize>>) {
		let ops = RecordOps::default();
		let deleted = ops.deleted.clone();
		(ops, deleted)
	}
}

impl ObjectOps for RecordOps {
	fn object_size(&self) -> usize {
		RECORD_SIZE
	}

	fn cmp_objects(&self, a: &[u8], b: &[u8]) -> Ordering {
		a.cmp(b)
	}

	fn cmp_keys(&self, key: &[u8], object_key: &[u8]) -> Ordering {
		key.cmp(object_key)
	}

	fn key_of<'o>(&self, object: &'o [u8]) -> &'o [u8] {
		&object[..8]
	}

	fn on_delete(&mut self, _object: &[u8]) {
		self.deleted.set(self.deleted.get() + 1);
	}
}

/// Collects every stored key in walk order.
pub fn keys_of(tree: &Tree<RecordOps>) -> Vec<u64> {
	let mut keys = Vec::new();
	tree.walk(|object| keys.push(record_key(object)));
	keys
}

/// Collects every stored object in walk order.
pub fn objects_of(tree: &Tree<RecordOps>) -> Vec<Vec<u8>> {
	let mut objects = Vec::new();
	tree.walk(|object| objects.push(object.to_vec()));
	objects
}
