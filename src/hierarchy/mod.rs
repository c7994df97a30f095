//! Type hierarchy resolution.
//!
//! Re-serializing a patched method needs to know, for any two reference types that meet at a
//! control flow join, their most specific common supertype. This module answers that question by
//! reading the headers of the types involved on demand and caching what it learns.
//!
//! # Architecture
//!
//! - [`HierarchyIndex`] is the process-wide cache: type name to [`TypeDescriptor`], and type name
//!   to the full set of its ancestors. Both maps only ever grow; an entry, once published, is
//!   final. Concurrent resolutions of the same name compute the same value from the same bytes,
//!   so whichever write lands first is kept and the other is discarded.
//! - [`TypeResolver`] is a short-lived view binding an index to the loader of the class under
//!   transformation and a bootstrap loader. It implements
//!   [`CommonSuperclass`](crate::classfile::CommonSuperclass) for the class writer.
//!
//! # Examples
//!
//! ```rust
//! use classmend::{
//!     hierarchy::{HierarchyIndex, TypeResolver},
//!     loader::BuiltinLoader,
//! };
//!
//! let index = HierarchyIndex::new();
//! let resolver = TypeResolver::new(&index, None, &BuiltinLoader);
//! assert_eq!(
//!     resolver.common_ancestor("java/lang/Integer", "java/lang/Long")?,
//!     "java/lang/Number"
//! );
//! # Ok::<(), classmend::Error>(())
//! ```

mod resolver;

use std::{collections::HashSet, sync::Arc};

use dashmap::DashMap;

pub use resolver::TypeResolver;

/// The universal root type, an ancestor of every other type.
pub const ROOT: &str = "java/lang/Object";

/// Deepest chain of superclasses and superinterfaces that is followed before resolution gives up.
pub const MAX_RECURSION_DEPTH: usize = 256;

/// The identity of a named type as far as the hierarchy is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    /// Internal name
    pub name: String,
    /// Direct superclass, `None` only for the root type
    pub parent: Option<String>,
    /// Directly implemented or extended interfaces
    pub interfaces: Vec<String>,
    /// `true` for interface types
    pub interface: bool,
}

/// Append-only cache of resolved types, shared by every transformation in the process.
#[derive(Debug, Default)]
pub struct HierarchyIndex {
    types: DashMap<String, Arc<TypeDescriptor>>,
    ancestors: DashMap<String, Arc<HashSet<String>>>,
}

impl HierarchyIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        HierarchyIndex::default()
    }

    /// Returns the descriptor of `name`, if resolved.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the ancestor set of `name`, if computed.
    #[must_use]
    pub fn ancestors(&self, name: &str) -> Option<Arc<HashSet<String>>> {
        self.ancestors.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns `true` if a descriptor for `name` is known.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Number of known descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if nothing has been resolved yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Names of every resolved type, in no particular order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.types.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Publishes `descriptor` unless one is already present, and returns the retained entry.
    pub fn publish(&self, descriptor: TypeDescriptor) -> Arc<TypeDescriptor> {
        let entry = self
            .types
            .entry(descriptor.name.clone())
            .or_insert_with(|| Arc::new(descriptor));
        Arc::clone(entry.value())
    }

    pub(crate) fn publish_ancestors(
        &self,
        name: &str,
        ancestors: HashSet<String>,
    ) -> Arc<HashSet<String>> {
        let entry = self
            .ancestors
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ancestors));
        Arc::clone(entry.value())
    }
}
