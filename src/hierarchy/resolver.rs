use std::{collections::HashSet, sync::Arc};

use crate::{
    classfile::{read_header, ClassAccess, ClassFile, CommonSuperclass},
    hierarchy::{HierarchyIndex, TypeDescriptor, MAX_RECURSION_DEPTH, ROOT},
    loader::ClassLoader,
    Error, Result,
};

/// Answers ancestry questions, resolving unknown types through a pair of loaders.
///
/// Types are looked up in the [`HierarchyIndex`] first. On a miss, the header is read from the
/// active loader (the one defining the class under transformation) and then from the bootstrap
/// loader, and the result is published to the index for every later query.
#[derive(Clone, Copy)]
pub struct TypeResolver<'a> {
    index: &'a HierarchyIndex,
    loader: Option<&'a dyn ClassLoader>,
    bootstrap: &'a dyn ClassLoader,
}

impl<'a> TypeResolver<'a> {
    /// Creates a resolver over `index`.
    #[must_use]
    pub fn new(
        index: &'a HierarchyIndex,
        loader: Option<&'a dyn ClassLoader>,
        bootstrap: &'a dyn ClassLoader,
    ) -> Self {
        TypeResolver {
            index,
            loader,
            bootstrap,
        }
    }

    /// Records the class under transformation from its parsed form.
    ///
    /// The class is usually not yet visible through its loader while it is being defined.
    pub fn seed(&self, class: &ClassFile) -> Arc<TypeDescriptor> {
        self.index.publish(TypeDescriptor {
            name: class.name.clone(),
            parent: class.super_name.clone(),
            interfaces: class.interfaces.clone(),
            interface: class.access.contains(ClassAccess::INTERFACE),
        })
    }

    fn fetch(&self, name: &str) -> Result<Vec<u8>> {
        if let Some(loader) = self.loader {
            if let Some(bytes) = loader.find_class(name)? {
                return Ok(bytes);
            }
        }
        self.bootstrap.find_class(name)?.ok_or_else(|| {
            Error::Resolution(format!(
                "No class file for {} in {} or {}",
                name,
                self.loader.map_or("<none>", |loader| loader.name()),
                self.bootstrap.name()
            ))
        })
    }

    /// Returns the descriptor of `name`, resolving it if needed.
    ///
    /// # Errors
    /// Returns [`Error::Resolution`] if no loader provides the class, or a parse error if its
    /// header is invalid.
    pub fn descriptor(&self, name: &str) -> Result<Arc<TypeDescriptor>> {
        if let Some(descriptor) = self.index.descriptor(name) {
            return Ok(descriptor);
        }

        let header = read_header(&self.fetch(name)?)?;
        if header.name != name {
            return Err(Error::Resolution(format!(
                "Class file for {} declares {}",
                name, header.name
            )));
        }
        Ok(self.index.publish(TypeDescriptor {
            name: header.name,
            parent: header.super_name,
            interfaces: header.interfaces,
            interface: header.access.contains(ClassAccess::INTERFACE),
        }))
    }

    /// Returns every type `name` is assignable to: itself, its superclasses and all
    /// superinterfaces, transitively.
    ///
    /// # Errors
    /// Returns [`Error::Resolution`] if any type on the way cannot be found, and
    /// [`Error::RecursionLimit`] for cyclic or absurdly deep hierarchies.
    pub fn ancestors_of(&self, name: &str) -> Result<Arc<HashSet<String>>> {
        self.ancestors_at(name, 0)
    }

    fn ancestors_at(&self, name: &str, depth: usize) -> Result<Arc<HashSet<String>>> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(Error::RecursionLimit(MAX_RECURSION_DEPTH));
        }
        if let Some(ancestors) = self.index.ancestors(name) {
            return Ok(ancestors);
        }

        let descriptor = self.descriptor(name)?;
        let mut ancestors = HashSet::new();
        ancestors.insert(name.to_string());
        match &descriptor.parent {
            Some(parent) => ancestors.extend(self.ancestors_at(parent, depth + 1)?.iter().cloned()),
            None => {
                ancestors.insert(ROOT.to_string());
            }
        }
        for interface in &descriptor.interfaces {
            ancestors.extend(self.ancestors_at(interface, depth + 1)?.iter().cloned());
        }

        Ok(self.index.publish_ancestors(name, ancestors))
    }

    /// Returns the direct superclass of `name`, `None` for the root type.
    ///
    /// # Errors
    /// Returns [`Error::Resolution`] if `name` cannot be found.
    pub fn parent_of(&self, name: &str) -> Result<Option<String>> {
        Ok(self.descriptor(name)?.parent.clone())
    }

    /// Returns `true` if `name` is an interface.
    ///
    /// # Errors
    /// Returns [`Error::Resolution`] if `name` cannot be found.
    pub fn is_interface(&self, name: &str) -> Result<bool> {
        Ok(self.descriptor(name)?.interface)
    }

    /// Returns the most specific type that both `a` and `b` are assignable to.
    ///
    /// Mirrors the verifier's assignability check: if either type is an ancestor of the other,
    /// that type is the answer; otherwise, if either is an interface, the answer is the root
    /// type; otherwise the superclass chain of `a` is walked until it meets an ancestor of `b`.
    ///
    /// # Errors
    /// Returns [`Error::Resolution`] if any type involved cannot be found.
    pub fn common_ancestor(&self, a: &str, b: &str) -> Result<String> {
        if a == b {
            return Ok(a.to_string());
        }

        let ancestors_b = self.ancestors_of(b)?;
        if ancestors_b.contains(a) {
            return Ok(a.to_string());
        }
        let ancestors_a = self.ancestors_of(a)?;
        if ancestors_a.contains(b) {
            return Ok(b.to_string());
        }
        if self.is_interface(a)? || self.is_interface(b)? {
            return Ok(ROOT.to_string());
        }

        let mut current = a.to_string();
        for _ in 0..MAX_RECURSION_DEPTH {
            match self.parent_of(&current)? {
                Some(parent) if ancestors_b.contains(&parent) => return Ok(parent),
                Some(parent) => current = parent,
                None => return Ok(ROOT.to_string()),
            }
        }
        Err(Error::RecursionLimit(MAX_RECURSION_DEPTH))
    }
}

impl CommonSuperclass for TypeResolver<'_> {
    fn common_superclass(&self, a: &str, b: &str) -> Result<String> {
        self.common_ancestor(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        loader::{BuiltinLoader, MemoryLoader},
        test::zoo_loader,
    };

    #[test]
    fn ancestors_are_transitive() {
        let index = HierarchyIndex::new();
        let loader = zoo_loader();
        let resolver = TypeResolver::new(&index, Some(&loader), &BuiltinLoader);

        let ancestors = resolver.ancestors_of("zoo/Puppy").unwrap();
        for expected in [
            "zoo/Puppy",
            "zoo/Dog",
            "zoo/Animal",
            "zoo/Pet",
            "java/lang/Comparable",
            "java/io/Serializable",
            ROOT,
        ] {
            assert!(ancestors.contains(expected), "missing {expected}");
        }
        assert!(!ancestors.contains("zoo/Cat"));
    }

    #[test]
    fn common_ancestor_cases() {
        let index = HierarchyIndex::new();
        let loader = zoo_loader();
        let resolver = TypeResolver::new(&index, Some(&loader), &BuiltinLoader);

        assert_eq!(resolver.common_ancestor("zoo/Dog", "zoo/Cat").unwrap(), "zoo/Animal");
        assert_eq!(resolver.common_ancestor("zoo/Puppy", "zoo/Cat").unwrap(), "zoo/Animal");
        assert_eq!(resolver.common_ancestor("zoo/Puppy", "zoo/Dog").unwrap(), "zoo/Dog");
        assert_eq!(resolver.common_ancestor("zoo/Dog", "zoo/Puppy").unwrap(), "zoo/Dog");
        assert_eq!(resolver.common_ancestor("zoo/Dog", "java/lang/String").unwrap(), ROOT);
        // ancestor containment wins over the interface rule
        assert_eq!(resolver.common_ancestor("zoo/Dog", "zoo/Pet").unwrap(), "zoo/Pet");
        assert_eq!(resolver.common_ancestor("zoo/Cat", "zoo/Pet").unwrap(), ROOT);
    }

    #[test]
    fn parents_and_interfaces() {
        let index = HierarchyIndex::new();
        let loader = zoo_loader();
        let resolver = TypeResolver::new(&index, Some(&loader), &BuiltinLoader);

        assert!(resolver.is_interface("zoo/Pet").unwrap());
        assert!(!resolver.is_interface("zoo/Dog").unwrap());
        assert_eq!(resolver.parent_of("zoo/Puppy").unwrap().as_deref(), Some("zoo/Dog"));
        assert_eq!(resolver.parent_of(ROOT).unwrap(), None);
    }

    #[test]
    fn missing_type_is_a_resolution_error() {
        let index = HierarchyIndex::new();
        let resolver = TypeResolver::new(&index, None, &BuiltinLoader);
        assert!(matches!(
            resolver.ancestors_of("zoo/Unknown"),
            Err(Error::Resolution(_))
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn cycles_hit_the_recursion_limit() {
        let mut loader = MemoryLoader::new("cyclic");
        loader
            .add(
                crate::classfile::ClassBuilder::new("loop/A")
                    .super_name("loop/B")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        loader
            .add(
                crate::classfile::ClassBuilder::new("loop/B")
                    .super_name("loop/A")
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let index = HierarchyIndex::new();
        let resolver = TypeResolver::new(&index, Some(&loader), &BuiltinLoader);
        assert!(matches!(
            resolver.ancestors_of("loop/A"),
            Err(Error::RecursionLimit(_))
        ));
    }

    #[test]
    fn seeded_class_needs_no_loader() {
        let index = HierarchyIndex::new();
        let resolver = TypeResolver::new(&index, None, &BuiltinLoader);
        let class = crate::classfile::ClassBuilder::new("app/Service")
            .super_name("java/lang/Thread")
            .build_class();
        resolver.seed(&class);

        assert_eq!(
            resolver.common_ancestor("app/Service", "java/lang/Thread").unwrap(),
            "java/lang/Thread"
        );
        assert!(resolver.ancestors_of("app/Service").unwrap().contains("java/lang/Runnable"));
    }

    #[test]
    fn resolved_types_are_cached() {
        let index = HierarchyIndex::new();
        let loader = zoo_loader();
        {
            let resolver = TypeResolver::new(&index, Some(&loader), &BuiltinLoader);
            resolver.ancestors_of("zoo/Dog").unwrap();
        }
        // no loader this time, everything comes from the index
        let resolver = TypeResolver::new(&index, None, &BuiltinLoader);
        assert!(resolver.ancestors_of("zoo/Dog").unwrap().contains("zoo/Animal"));
    }
}
