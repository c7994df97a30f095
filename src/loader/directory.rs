use std::path::{Path, PathBuf};

use crate::{
    file::{Backend, Physical},
    loader::ClassLoader,
    Result,
};

/// A class path directory laid out by package, `<root>/com/acme/Widget.class`.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    name: String,
    root: PathBuf,
}

impl DirectoryLoader {
    /// Creates a loader reading from `root`.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        DirectoryLoader {
            name: root.display().to_string(),
            root,
        }
    }

    /// Path at which the class `name` is expected.
    #[must_use]
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.class"))
    }
}

impl ClassLoader for DirectoryLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn find_class(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_of(name);
        if !path.is_file() {
            return Ok(None);
        }
        let file = Physical::new(&path)?;
        Ok(Some(file.data().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::ClassBuilder;

    #[test]
    fn reads_package_layout() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = ClassBuilder::new("com/acme/Widget").build().unwrap();
        std::fs::create_dir_all(dir.path().join("com/acme")).unwrap();
        std::fs::write(dir.path().join("com/acme/Widget.class"), &bytes).unwrap();

        let loader = DirectoryLoader::new(dir.path());
        assert_eq!(loader.find_class("com/acme/Widget").unwrap(), Some(bytes));
        assert_eq!(loader.find_class("com/acme/Missing").unwrap(), None);
    }

    #[test]
    fn empty_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Empty.class"), []).unwrap();
        let loader = DirectoryLoader::new(dir.path());
        assert!(loader.find_class("Empty").is_err());
    }
}
