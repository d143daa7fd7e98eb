//! Error types for the B-tree.
//!
//! All operations are deterministic and synchronous, so the only failures the
//! tree reports are contract errors that can be checked cheaply at the public
//! surface: a degenerate minimum degree, an object slice whose length does not
//! match the configured object size, or an output buffer too small to receive
//! a copy of a stored object.
//!
//! A missing key is not an error: `search` returns `Ok(None)` and `remove` is
//! a silent no-op. Comparator inconsistency (see [`crate::ObjectOps`]) cannot
//! be detected at runtime and is a contract violation on the caller's side.

use thiserror::Error;

/// Errors reported by tree construction and the object-carrying operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
	/// The requested minimum degree is outside the supported range.
	///
	/// A B-tree needs `t >= 2` to be able to split and merge; the upper
	/// bound keeps node occupancy within the internal `u16` counters.
	#[error("minimum degree must be in 2..={max}, got {found}", max = crate::MAX_MIN_DEGREE)]
	MinDegree {
		/// The rejected degree.
		found: usize,
	},

	/// The configured object size is zero.
	///
	/// Objects are copied by value into node storage; a zero-width object
	/// cannot carry a key and is rejected at construction.
	#[error("object size must be nonzero")]
	ZeroObjectSize,

	/// An object slice passed to `insert` has the wrong length.
	///
	/// Every object in the tree has exactly the byte width declared by the
	/// [`crate::ObjectOps::object_size`] callback.
	#[error("object must be exactly {expected} bytes, got {found}")]
	ObjectSize {
		/// The configured object size.
		expected: usize,
		/// The length of the rejected slice.
		found: usize,
	},

	/// The output buffer passed to `search` cannot hold one object.
	#[error("output buffer must hold at least {expected} bytes, got {found}")]
	BufferSize {
		/// The configured object size.
		expected: usize,
		/// The length of the rejected buffer.
		found: usize,
	},
}

/// A Result type alias using the tree's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;
