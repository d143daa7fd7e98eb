//! Implementation of an in-memory B-tree for fixed-size opaque objects.
//!
//! The tree stores application objects as raw byte records of a uniform,
//! caller-declared width, ordered by caller-supplied comparators. Objects are
//! copied by value into node storage and back out through search buffers; the
//! tree never interprets object bytes itself. Object width, ordering, key
//! extraction and the teardown notification all come through the
//! [`ObjectOps`] trait.
//!
//! ```
//! use std::cmp::Ordering;
//! use tanoak::{ObjectOps, Tree};
//!
//! // Objects are 16-byte records: an 8-byte big-endian key and an 8-byte payload.
//! struct Records;
//!
//! impl ObjectOps for Records {
//! 	fn object_size(&self) -> usize {
//! 		16
//! 	}
//!
//! 	fn cmp_objects(&self, a: &[u8], b: &[u8]) -> Ordering {
//! 		a.cmp(b)
//! 	}
//!
//! 	fn cmp_keys(&self, key: &[u8], object_key: &[u8]) -> Ordering {
//! 		key.cmp(object_key)
//! 	}
//!
//! 	fn key_of<'o>(&self, object: &'o [u8]) -> &'o [u8] {
//! 		&object[..8]
//! 	}
//! }
//!
//! let mut tree = Tree::new(Records)?;
//!
//! let mut record = [0u8; 16];
//! record[..8].copy_from_slice(&42u64.to_be_bytes());
//! record[8..].copy_from_slice(&7u64.to_be_bytes());
//! tree.insert(&record)?;
//!
//! let mut buf = [0u8; 16];
//! assert_eq!(tree.search(&42u64.to_be_bytes(), &mut buf)?, Some(&record[..]));
//! # Ok::<(), tanoak::Error>(())
//! ```

use smallvec::SmallVec;

use std::cmp::Ordering;

pub mod alloc;
pub mod error;
mod objects;
#[cfg(test)]
pub(crate) mod util;

pub use error::{Error, Result};

use objects::ObjectArray;

/// Minimum degree used by [`Tree::new`].
pub const DEFAULT_MIN_DEGREE: usize = 15;

/// Largest accepted minimum degree.
///
/// Keeps node occupancy (`2t - 1` objects) within the internal `u16`
/// counters.
pub const MAX_MIN_DEGREE: usize = 1 << 15;

/// Inline capacity of the per-node child array before it spills to the heap.
const INLINE_EDGES: usize = 4;

/// Application callbacks describing the objects stored in a [`Tree`].
///
/// # Consistency
///
/// For any two objects `a` and `b` that could coexist in one tree,
/// `cmp_objects(a, b)` and `cmp_keys(key_of(a), key_of(b))` must agree in
/// sign, and both must be deterministic. The tree cannot detect a violation,
/// and every ordering invariant is void if this does not hold.
///
/// Duplicate handling is entirely defined by `cmp_objects`: the tree inserts
/// whatever the comparator admits and never rejects duplicates itself.
/// Callers that want unique keys perform a `search` before inserting.
///
/// Callbacks must not operate on the tree they are registered with. For
/// mutating operations the borrow checker already rules this out: the tree is
/// exclusively borrowed for the duration of the call, and the callbacks only
/// ever receive byte slices.
pub trait ObjectOps {
	/// Byte width of every object stored in the tree.
	fn object_size(&self) -> usize;

	/// Total order over whole objects. Used to place insertions.
	fn cmp_objects(&self, a: &[u8], b: &[u8]) -> Ordering;

	/// Compares a search key against the key region of a stored object.
	/// Used by search and delete descent.
	fn cmp_keys(&self, key: &[u8], object_key: &[u8]) -> Ordering;

	/// Returns the key region inside an object.
	fn key_of<'o>(&self, object: &'o [u8]) -> &'o [u8];

	/// Invoked exactly once per stored object immediately before it leaves
	/// the tree, whether through [`Tree::remove`], replacement during an
	/// internal delete, or [`Tree::clear`] and drop.
	fn on_delete(&mut self, _object: &[u8]) {}
}

/// In-memory B-tree over fixed-size opaque objects.
///
/// The tree follows the minimum-degree formulation: every node other than the
/// root holds between `t - 1` and `2t - 1` objects, the root holds between
/// `1` and `2t - 1` (or is absent when the tree is empty), and all leaves sit
/// at the same depth. Insertion splits full nodes on the way down; deletion
/// refills underfull children on the way down, so neither ever has to walk
/// back up the tree.
///
/// All operations are single-threaded and run to completion on the calling
/// thread. Mutating operations take `&mut self`; the only data that escapes
/// the tree are byte copies written into caller-provided buffers, so no
/// reference into node storage can be invalidated by a later operation.
pub struct Tree<O: ObjectOps> {
	root: Option<Box<Node>>,
	ops: O,
	min_degree: usize,
	object_size: usize,
	height: usize,
}

impl<O: ObjectOps> Tree<O> {
	/// Makes a new, empty `Tree` with the default minimum degree.
	pub fn new(ops: O) -> Result<Self> {
		Self::with_degree(ops, DEFAULT_MIN_DEGREE)
	}

	/// Makes a new, empty `Tree` with minimum degree `min_degree`.
	///
	/// Node capacities follow from the degree: `2t - 1` objects and `2t`
	/// children per node.
	///
	/// # Errors
	///
	/// Returns [`Error::MinDegree`] unless `2 <= min_degree <= MAX_MIN_DEGREE`,
	/// and [`Error::ZeroObjectSize`] if the callbacks declare zero-width
	/// objects.
	pub fn with_degree(ops: O, min_degree: usize) -> Result<Self> {
		if !(2..=MAX_MIN_DEGREE).contains(&min_degree) {
			return Err(Error::MinDegree {
				found: min_degree,
			});
		}
		let object_size = ops.object_size();
		if object_size == 0 {
			return Err(Error::ZeroObjectSize);
		}
		Ok(Tree {
			root: None,
			ops,
			min_degree,
			object_size,
			height: 0,
		})
	}

	/// Returns the configured minimum degree.
	pub fn min_degree(&self) -> usize {
		self.min_degree
	}

	/// Returns the byte width of stored objects.
	pub fn object_size(&self) -> usize {
		self.object_size
	}

	/// Returns a reference to the registered callbacks.
	pub fn ops(&self) -> &O {
		&self.ops
	}

	/// Returns the height of the tree: 0 when empty, 1 for a lone leaf root.
	pub fn height(&self) -> usize {
		self.height
	}

	/// Returns true if the tree holds no objects.
	pub fn is_empty(&self) -> bool {
		self.root.is_none()
	}

	/// Returns the number of stored objects by walking the tree.
	pub fn len(&self) -> usize {
		let mut count = 0usize;
		self.walk(|_| count += 1);
		count
	}

	/// Inserts a copy of `object` into the tree.
	///
	/// Equal objects (as defined by [`ObjectOps::cmp_objects`]) are kept; the
	/// new copy lands after the existing ones in walk order.
	///
	/// # Errors
	///
	/// Returns [`Error::ObjectSize`] if the slice length does not match the
	/// configured object size. The tree is unchanged on error.
	pub fn insert(&mut self, object: &[u8]) -> Result<()> {
		if object.len() != self.object_size {
			return Err(Error::ObjectSize {
				expected: self.object_size,
				found: object.len(),
			});
		}
		let t = self.min_degree;
		match self.root.as_mut() {
			None => {
				let mut root = Node::new(true, t, self.object_size);
				root.objects.write(0, object);
				root.len = 1;
				self.root = Some(Box::new(root));
				self.height = 1;
				return Ok(());
			}
			Some(root) if root.is_full(t) => {}
			Some(root) => {
				root.insert_non_full(&self.ops, object, t);
				return Ok(());
			}
		}

		// The root is full: grow a level, then descend into the new root.
		let old_root = self.root.take().expect("root is present");
		let mut new_root = Node::new(false, t, self.object_size);
		new_root.edges.push(old_root);
		new_root.split_edge(0, t);
		self.root = Some(Box::new(new_root));
		self.height += 1;
		self.root
			.as_mut()
			.expect("root was just installed")
			.insert_non_full(&self.ops, object, t);
		Ok(())
	}

	/// Searches for an object matching `key` and copies it into `buf`.
	///
	/// Returns `Ok(Some(..))` with the filled prefix of `buf` on a match and
	/// `Ok(None)` if no stored object has an equal key. When several stored
	/// objects share the key, the copy returned is the shallowest match on
	/// the descent. A search never mutates the tree.
	///
	/// # Errors
	///
	/// Returns [`Error::BufferSize`] if `buf` is shorter than one object.
	pub fn search<'b>(&self, key: &[u8], buf: &'b mut [u8]) -> Result<Option<&'b [u8]>> {
		if buf.len() < self.object_size {
			return Err(Error::BufferSize {
				expected: self.object_size,
				found: buf.len(),
			});
		}
		let found = match self.root.as_ref() {
			Some(root) => root.find(&self.ops, key),
			None => None,
		};
		match found {
			Some(object) => {
				let out = &mut buf[..self.object_size];
				out.copy_from_slice(object);
				Ok(Some(out))
			}
			None => Ok(None),
		}
	}

	/// Returns true if some stored object matches `key`.
	pub fn contains_key(&self, key: &[u8]) -> bool {
		match self.root.as_ref() {
			Some(root) => root.find(&self.ops, key).is_some(),
			None => false,
		}
	}

	/// Removes one object matching `key` (the shallowest match on the
	/// descent), invoking [`ObjectOps::on_delete`] for it. Removing an
	/// absent key is a no-op.
	pub fn remove(&mut self, key: &[u8]) {
		let t = self.min_degree;
		match self.root.as_mut() {
			Some(root) => root.remove_key(&mut self.ops, key, t),
			None => return,
		}

		// An emptied root collapses: an internal root hands the tree to its
		// sole remaining child, a leaf root leaves the tree empty. This is
		// the only path by which the height decreases.
		if self.root.as_ref().is_some_and(|root| root.len == 0) {
			let mut old_root = self.root.take().expect("root is present");
			if old_root.leaf {
				self.height = 0;
			} else {
				self.root = Some(old_root.edges.remove(0));
				self.height -= 1;
			}
		}
	}

	/// Visits every stored object in ascending order.
	pub fn walk<F: FnMut(&[u8])>(&self, mut visitor: F) {
		if let Some(root) = self.root.as_ref() {
			root.walk(&mut visitor);
		}
	}

	/// Destroys all nodes, invoking [`ObjectOps::on_delete`] once per stored
	/// object. The tree remains usable afterwards.
	///
	/// Dropping the tree performs the same teardown, so the delete callback
	/// fires exactly once for every object copy the tree ever owned.
	pub fn clear(&mut self) {
		if let Some(root) = self.root.take() {
			Node::destroy(root, &mut self.ops);
		}
		self.height = 0;
	}

	/// Validates the structural invariants, panicking on any violation.
	///
	/// Checks occupancy bounds, object ordering within nodes, separator
	/// bounds between parents and children, uniform leaf depth and the
	/// tracked height. Ordering and separator checks reject inversions but
	/// accept the equal objects a duplicate-admitting comparator produces.
	/// Intended for tests; the cost is a full traversal.
	pub fn assert_invariants(&self) {
		match self.root.as_ref() {
			Some(root) => {
				assert!(root.len >= 1, "root must hold at least one object");
				let depth = root.check(&self.ops, self.min_degree, true, None, None);
				assert_eq!(depth, self.height, "tracked height must match leaf depth");
			}
			None => {
				assert_eq!(self.height, 0, "empty tree must have height 0");
			}
		}
	}
}

impl<O: ObjectOps> Drop for Tree<O> {
	fn drop(&mut self) {
		self.clear();
	}
}

/// A B-tree node.
///
/// Both node kinds share one layout: `objects` holds up to `2t - 1` objects
/// in strictly ascending order, and `edges` holds `len + 1` child references
/// when the node is internal. A node's kind never changes after creation;
/// `edges` stays empty for the lifetime of a leaf.
pub(crate) struct Node {
	len: u16,
	leaf: bool,
	objects: ObjectArray,
	edges: SmallVec<[Box<Node>; INLINE_EDGES]>,
}

impl Node {
	/// Creates an empty node with storage for `2t - 1` objects, reserving
	/// edge capacity for `2t` children when internal.
	fn new(leaf: bool, t: usize, object_size: usize) -> Node {
		Node {
			len: 0,
			leaf,
			objects: ObjectArray::new(object_size, 2 * t - 1),
			edges: if leaf {
				SmallVec::new()
			} else {
				SmallVec::with_capacity(2 * t)
			},
		}
	}

	#[inline]
	fn is_full(&self, t: usize) -> bool {
		self.len as usize == 2 * t - 1
	}

	/// Returns the smallest position whose object key is not less than `key`,
	/// and whether it is an exact match. Position `len` means every stored
	/// key is smaller.
	fn lower_bound<O: ObjectOps>(&self, ops: &O, key: &[u8]) -> (u16, bool) {
		let mut lower = 0u16;
		let mut upper = self.len;

		while lower < upper {
			let mid = ((upper - lower) / 2) + lower;

			match ops.cmp_keys(key, ops.key_of(self.objects.object(mid as usize))) {
				Ordering::Greater => lower = mid + 1,
				// An equal key at mid may not be the first one; keep narrowing.
				_ => upper = mid,
			}
		}

		let exact = lower < self.len
			&& ops.cmp_keys(key, ops.key_of(self.objects.object(lower as usize)))
				== Ordering::Equal;
		(lower, exact)
	}

	/// Returns the first position whose object is strictly greater than
	/// `object`, so equal objects are passed on the way to the right.
	fn upper_bound<O: ObjectOps>(&self, ops: &O, object: &[u8]) -> u16 {
		let mut lower = 0u16;
		let mut upper = self.len;

		while lower < upper {
			let mid = ((upper - lower) / 2) + lower;

			match ops.cmp_objects(object, self.objects.object(mid as usize)) {
				Ordering::Less => upper = mid,
				_ => lower = mid + 1,
			}
		}

		lower
	}

	fn find<'n, O: ObjectOps>(&'n self, ops: &O, key: &[u8]) -> Option<&'n [u8]> {
		let (pos, exact) = self.lower_bound(ops, key);
		if exact {
			return Some(self.objects.object(pos as usize));
		}
		if self.leaf {
			None
		} else {
			self.edges[pos as usize].find(ops, key)
		}
	}

	fn walk<F: FnMut(&[u8])>(&self, visitor: &mut F) {
		for pos in 0..self.len as usize {
			if !self.leaf {
				self.edges[pos].walk(visitor);
			}
			visitor(self.objects.object(pos));
		}
		if !self.leaf {
			self.edges[self.len as usize].walk(visitor);
		}
	}

	/// Inserts `object` into the subtree rooted at this node, which must not
	/// be full. Full children are split before descending, so the recursion
	/// never enters a full node.
	fn insert_non_full<O: ObjectOps>(&mut self, ops: &O, object: &[u8], t: usize) {
		let mut pos = self.upper_bound(ops, object) as usize;
		if self.leaf {
			self.objects.insert(pos, self.len as usize, object);
			self.len += 1;
		} else {
			if self.edges[pos].is_full(t) {
				self.split_edge(pos, t);
				// Objects equal to the lifted median keep moving right, the
				// same placement after existing copies the leaf shift uses.
				if ops.cmp_objects(object, self.objects.object(pos)) != Ordering::Less {
					pos += 1;
				}
			}
			self.edges[pos].insert_non_full(ops, object, t);
		}
	}

	/// Splits the full child at `pos` into two `t - 1`-object nodes and
	/// lifts the median object into this node. The new right sibling is
	/// allocated before either node is mutated.
	fn split_edge(&mut self, pos: usize, t: usize) {
		let right;
		let median;
		{
			let left = &mut self.edges[pos];
			debug_assert!(left.len as usize == 2 * t - 1, "split target must be full");

			let mut node = Node::new(left.leaf, t, left.objects.object_size());
			node.objects.copy_from(&left.objects, t, 0, t - 1);
			node.len = (t - 1) as u16;
			if !left.leaf {
				node.edges.extend(left.edges.drain(t..));
			}
			median = left.objects.object(t - 1).to_vec();
			left.len = (t - 1) as u16;
			right = node;
		}
		self.objects.insert(pos, self.len as usize, &median);
		self.edges.insert(pos + 1, Box::new(right));
		self.len += 1;
	}

	/// Removes the first object matching `key` from the subtree rooted at
	/// this node. Except for the root, the node holds at least `t` objects on
	/// entry, because the descent refills children before entering them.
	fn remove_key<O: ObjectOps>(&mut self, ops: &mut O, key: &[u8], t: usize) {
		let (pos, exact) = self.lower_bound(ops, key);
		let pos = pos as usize;

		if exact {
			if self.leaf {
				ops.on_delete(self.objects.object(pos));
				self.objects.close_gap(pos, self.len as usize);
				self.len -= 1;
			} else if self.edges[pos].len as usize >= t {
				// Replace with the in-order predecessor, then delete the
				// predecessor from the left subtree.
				let pred = self.edges[pos].rightmost_object().to_vec();
				ops.on_delete(self.objects.object(pos));
				self.objects.write(pos, &pred);
				let pred_key = ops.key_of(&pred);
				self.edges[pos].remove_key(ops, pred_key, t);
			} else if self.edges[pos + 1].len as usize >= t {
				let succ = self.edges[pos + 1].leftmost_object().to_vec();
				ops.on_delete(self.objects.object(pos));
				self.objects.write(pos, &succ);
				let succ_key = ops.key_of(&succ);
				self.edges[pos + 1].remove_key(ops, succ_key, t);
			} else {
				// Both adjacent children are at minimum occupancy. Pull the
				// separator down, merge, and continue in the merged child.
				self.merge_edges(pos);
				self.edges[pos].remove_key(ops, key, t);
			}
		} else if !self.leaf {
			let last = pos == self.len as usize;
			if (self.edges[pos].len as usize) < t {
				self.fill_edge(pos, t);
			}
			// A rightmost child disappears when it merges into its left
			// sibling; the descent shifts one slot left with it.
			let pos = if last && pos > self.len as usize { pos - 1 } else { pos };
			self.edges[pos].remove_key(ops, key, t);
		}
		// A leaf without a match: the key is absent and the tree unchanged.
	}

	/// Brings the child at `pos`, currently at minimum occupancy, up to at
	/// least `t` objects: borrow from the left sibling, else from the right,
	/// else merge with a sibling.
	fn fill_edge(&mut self, pos: usize, t: usize) {
		if pos > 0 && self.edges[pos - 1].len as usize >= t {
			self.borrow_from_left(pos);
		} else if pos < self.len as usize && self.edges[pos + 1].len as usize >= t {
			self.borrow_from_right(pos);
		} else if pos < self.len as usize {
			self.merge_edges(pos);
		} else {
			self.merge_edges(pos - 1);
		}
	}

	/// Rotates the left sibling's greatest object through the separator at
	/// `pos - 1` into the front of the child at `pos`.
	fn borrow_from_left(&mut self, pos: usize) {
		let (head, tail) = self.edges.split_at_mut(pos);
		let left = head[pos - 1].as_mut();
		let child = tail[0].as_mut();

		child.objects.open_gap(0, child.len as usize);
		child.objects.write(0, self.objects.object(pos - 1));
		if !child.leaf {
			let edge = left.edges.pop().expect("internal sibling has a rightmost edge");
			child.edges.insert(0, edge);
		}
		self.objects.write(pos - 1, left.objects.object(left.len as usize - 1));
		left.len -= 1;
		child.len += 1;
	}

	/// Rotates the right sibling's least object through the separator at
	/// `pos` onto the back of the child at `pos`.
	fn borrow_from_right(&mut self, pos: usize) {
		let (head, tail) = self.edges.split_at_mut(pos + 1);
		let child = head[pos].as_mut();
		let right = tail[0].as_mut();

		child.objects.write(child.len as usize, self.objects.object(pos));
		if !child.leaf {
			child.edges.push(right.edges.remove(0));
		}
		self.objects.write(pos, right.objects.object(0));
		right.objects.close_gap(0, right.len as usize);
		child.len += 1;
		right.len -= 1;
	}

	/// Merges the child at `pos + 1` into the child at `pos`, pulling the
	/// separator at `pos` down as the middle object. Both children are at
	/// minimum occupancy, so the merged child ends exactly full at `2t - 1`.
	fn merge_edges(&mut self, pos: usize) {
		let mut absorbed = self.edges.remove(pos + 1);
		let left = self.edges[pos].as_mut();

		left.objects.write(left.len as usize, self.objects.object(pos));
		left.objects.copy_from(&absorbed.objects, 0, left.len as usize + 1, absorbed.len as usize);
		if !left.leaf {
			left.edges.extend(absorbed.edges.drain(..));
		}
		left.len += absorbed.len + 1;

		self.objects.close_gap(pos, self.len as usize);
		self.len -= 1;
		// The absorbed node's storage is released here; its objects moved,
		// so no delete callback fires.
	}

	/// Returns the greatest object in the subtree rooted at this node.
	fn rightmost_object(&self) -> &[u8] {
		let mut node = self;
		while !node.leaf {
			node = node.edges[node.len as usize].as_ref();
		}
		node.objects.object(node.len as usize - 1)
	}

	/// Returns the least object in the subtree rooted at this node.
	fn leftmost_object(&self) -> &[u8] {
		let mut node = self;
		while !node.leaf {
			node = node.edges[0].as_ref();
		}
		node.objects.object(0)
	}

	/// Tears down the subtree rooted at `node`: children first, then the
	/// delete callback for each object in array order, then the storage.
	fn destroy<O: ObjectOps>(mut node: Box<Node>, ops: &mut O) {
		for edge in node.edges.drain(..) {
			Node::destroy(edge, ops);
		}
		for pos in 0..node.len as usize {
			ops.on_delete(node.objects.object(pos));
		}
	}

	/// Recursively validates this subtree against `lower` and `upper`
	/// bounds, returning its depth.
	fn check<O: ObjectOps>(
		&self,
		ops: &O,
		t: usize,
		root: bool,
		lower: Option<&[u8]>,
		upper: Option<&[u8]>,
	) -> usize {
		let len = self.len as usize;
		assert!(len <= 2 * t - 1, "node exceeds 2t - 1 objects");
		if !root {
			assert!(len >= t - 1, "non-root node below t - 1 objects");
		}

		for pos in 0..len {
			let object = self.objects.object(pos);
			// Equal neighbors are legal whenever the comparator admits equal
			// objects; what the checks rule out is an inversion.
			if pos > 0 {
				assert_ne!(
					ops.cmp_objects(self.objects.object(pos - 1), object),
					Ordering::Greater,
					"objects within a node must be ascending"
				);
			}
			if let Some(bound) = lower {
				assert_ne!(
					ops.cmp_objects(bound, object),
					Ordering::Greater,
					"object below the subtree's lower separator"
				);
			}
			if let Some(bound) = upper {
				assert_ne!(
					ops.cmp_objects(object, bound),
					Ordering::Greater,
					"object above the subtree's upper separator"
				);
			}
		}

		if self.leaf {
			assert!(self.edges.is_empty(), "leaf node with child references");
			1
		} else {
			assert_eq!(self.edges.len(), len + 1, "internal node must hold len + 1 children");
			let mut depth = None;
			for pos in 0..=len {
				let lower = if pos == 0 { lower } else { Some(self.objects.object(pos - 1)) };
				let upper = if pos == len { upper } else { Some(self.objects.object(pos)) };
				let child_depth = self.edges[pos].check(ops, t, false, lower, upper);
				match depth {
					None => depth = Some(child_depth),
					Some(seen) => {
						assert_eq!(seen, child_depth, "all leaves must sit at the same depth")
					}
				}
			}
			depth.expect("internal node has children") + 1
		}
	}

	#[cfg(test)]
	pub(crate) fn object_bytes(&self) -> Vec<Vec<u8>> {
		(0..self.len as usize).map(|pos| self.objects.object(pos).to_vec()).collect()
	}
}
