use super::Backend;
use crate::{
    Error::{Empty, Error, FileError},
    Result,
};

use memmap2::Mmap;
use std::{fs, path::Path};

/// Memory-mapped file backend.
///
/// Used by [`crate::loader::DirectoryLoader`] to read `.class` resources without copying the
/// whole file into the heap before the header has been inspected.
#[derive(Debug)]
pub struct Physical {
    data: Mmap,
}

impl Physical {
    /// Maps the file at `path` read-only.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened, [`crate::Error::Empty`]
    /// for zero-length files, and [`crate::Error::Error`] if mapping fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(error) => return Err(FileError(error)),
        };

        if file.metadata()?.len() == 0 {
            return Err(Empty);
        }

        // The mapping is read-only and the class resources are not expected to change while
        // the engine is running.
        let mmap = match unsafe { Mmap::map(&file) } {
            Ok(mmap) => mmap,
            Err(error) => return Err(Error(error.to_string())),
        };

        Ok(Physical { data: mmap })
    }
}

impl Backend for Physical {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(out_of_bounds_error!());
        };

        if offset_end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        Ok(&self.data[offset..offset_end])
    }

    fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}
