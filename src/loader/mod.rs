//! Class resource resolution.
//!
//! The hierarchy resolver reads the headers of supertypes on demand. Where those bytes come from
//! is abstracted by the [`ClassLoader`] trait: the loader that is defining the class under
//! transformation is asked first, then a bootstrap loader standing in for the platform's own
//! classes.
//!
//! # Implementations
//!
//! - [`MemoryLoader`]: class files held in memory, keyed by internal name
//! - [`DirectoryLoader`]: a class path directory, `<root>/<name>.class`, read through a memory map
//! - [`BuiltinLoader`]: synthesized headers for the core platform types, the default bootstrap
//!
//! [`TransformingLoader`] wraps any of these and patches the classes it returns, for hosts that
//! load classes through this crate instead of intercepting their own loader.

mod builtin;
mod directory;
mod memory;
mod transforming;

pub use builtin::BuiltinLoader;
pub use directory::DirectoryLoader;
pub use memory::MemoryLoader;
pub use transforming::TransformingLoader;

use crate::Result;

/// A source of class files.
pub trait ClassLoader: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Returns the class file for the internal name `name`, or `None` if this loader does not
    /// know the class.
    ///
    /// # Errors
    /// Fails if the class exists but cannot be read.
    fn find_class(&self, name: &str) -> Result<Option<Vec<u8>>>;
}
