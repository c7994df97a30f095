//! Byte-level access to class file data.
//!
//! Class bytes reach the engine from two kinds of sources: buffers the host hands over at load
//! time, and `.class` files on disk that the hierarchy resolver reads on demand. Both are exposed
//! through the [`Backend`] trait so loaders can treat them uniformly, and both are decoded through
//! the bounds-checked [`parser::Parser`].
//!
//! # Key Components
//!
//! - [`Backend`] - Read-only view over a contiguous byte source
//! - [`Memory`] - Owned in-memory backend
//! - [`Physical`] - Memory-mapped file backend
//! - [`parser::Parser`] - Cursor used by every decoder in the crate
//! - [`io`] - Big-endian primitive encoding

pub mod io;
pub mod parser;

mod memory;
mod physical;

pub use memory::Memory;
pub use physical::Physical;

use crate::Result;

/// Read-only access to a contiguous byte source.
///
/// Implementations must be shareable across the threads that load classes concurrently.
pub trait Backend: Send + Sync {
    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the requested range exceeds the source.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the complete data.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data.
    fn len(&self) -> usize;

    /// Returns `true` if the source holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
