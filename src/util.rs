//! Test utilities: a canonical record layout and a JSON fixture loader.
//!
//! Growing a specific tree shape through insertions is tedious and couples a
//! test to the split policy, so structural tests describe the exact tree they
//! want in JSON instead and have it built node by node.
//!
//! The fixture format mirrors the node structure. Objects are 16-byte
//! records, written as `key`/`payload` pairs of unsigned integers; a node
//! without an `"edges"` array is a leaf:
//!
//! ```json
//! {
//! 	"min_degree": 2,
//! 	"root": {
//! 		"objects": [{ "key": 20, "payload": 200 }],
//! 		"edges": [
//! 			{ "objects": [{ "key": 10, "payload": 100 }] },
//! 			{ "objects": [{ "key": 30, "payload": 300 }] }
//! 		]
//! 	}
//! }
//! ```
//!
//! The loader trusts the fixture: call `assert_invariants` on the result when
//! a test depends on the shape being legal.

use crate::{Node, ObjectOps, Tree};

use serde::Deserialize;

use std::cell::Cell;
use std::cmp::Ordering;
use std::rc::Rc;

/// Byte width of the test record: an 8-byte big-endian key followed by an
/// 8-byte big-endian payload.
pub(crate) const RECORD_SIZE: usize = 16;

/// Encodes a test record.
pub(crate) fn record(key: u64, payload: u64) -> [u8; RECORD_SIZE] {
	let mut buf = [0u8; RECORD_SIZE];
	buf[..8].copy_from_slice(&key.to_be_bytes());
	buf[8..].copy_from_slice(&payload.to_be_bytes());
	buf
}

/// Reads the key back out of a test record.
pub(crate) fn record_key(object: &[u8]) -> u64 {
	u64::from_be_bytes(object[..8].try_into().expect("record carries an 8-byte key"))
}

/// Callbacks for the test record layout.
///
/// Whole-object comparison covers all 16 bytes, so records sharing a key are
/// ordered by payload and only byte-identical records compare equal.
/// Deletions are counted through a shared cell so tests can observe the
/// count after the tree is gone.
#[derive(Default)]
pub(crate) struct RecordOps {
	pub(crate) deleted: Rc<Cell<usize>>,
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

#[derive(Deserialize)]
struct SampleObject {
	key: u64,
	payload: u64,
}

#[derive(Deserialize)]
struct SampleNode {
	objects: Vec<SampleObject>,
	#[serde(default)]
	edges: Vec<SampleNode>,
}

#[derive(Deserialize)]
struct SampleTree {
	min_degree: usize,
	root: SampleNode,
}

fn translate(sample: &SampleNode, t: usize) -> Box<Node> {
	let leaf = sample.edges.is_empty();
	let mut node = Node::new(leaf, t, RECORD_SIZE);
	for (pos, object) in sample.objects.iter().enumerate() {
		node.objects.write(pos, &record(object.key, object.payload));
	}
	node.len = sample.objects.len() as u16;
	for edge in &sample.edges {
		node.edges.push(translate(edge, t));
	}
	Box::new(node)
}

fn depth(node: &Node) -> usize {
	if node.leaf {
		1
	} else {
		1 + depth(&node.edges[0])
	}
}

/// Builds a tree with the exact structure described by `json`.
///
/// # Panics
///
/// Panics if the JSON does not parse into the fixture schema.
pub(crate) fn sample_tree(json: &str) -> Tree<RecordOps> {
	let sample: SampleTree = serde_json::from_str(json).expect("fixture must parse");
	let root = translate(&sample.root, sample.min_degree);
	let height = depth(&root);

	Tree {
		root: Some(root),
		ops: RecordOps::default(),
		min_degree: sample.min_degree,
		object_size: RECORD_SIZE,
		height,
	}
}
