use std::collections::HashMap;

use crate::{
    classfile::read_header,
    file::{Backend, Memory},
    loader::ClassLoader,
    Result,
};

/// Class files held in memory.
///
/// ```rust
/// use classmend::{classfile::ClassBuilder, loader::{ClassLoader, MemoryLoader}};
///
/// let mut loader = MemoryLoader::new("app");
/// loader.add(ClassBuilder::new("com/acme/Widget").build()?)?;
/// assert!(loader.find_class("com/acme/Widget")?.is_some());
/// # Ok::<(), classmend::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    name: String,
    classes: HashMap<String, Memory>,
}

impl MemoryLoader {
    /// Creates an empty loader.
    #[must_use]
    pub fn new(name: &str) -> Self {
        MemoryLoader {
            name: name.to_string(),
            classes: HashMap::new(),
        }
    }

    /// Stores `bytes` under the name found in its header.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `bytes` is not a class file.
    pub fn add(&mut self, bytes: Vec<u8>) -> Result<&mut Self> {
        let header = read_header(&bytes)?;
        self.classes.insert(header.name, Memory::new(bytes));
        Ok(self)
    }

    /// Stores `bytes` under `name` without inspecting them.
    pub fn insert(&mut self, name: &str, bytes: Vec<u8>) -> &mut Self {
        self.classes.insert(name.to_string(), Memory::new(bytes));
        self
    }

    /// Number of stored classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if no class is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl ClassLoader for MemoryLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn find_class(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.classes.get(name).map(|class| class.data().to_vec()))
    }
}
