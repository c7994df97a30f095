//! Debug export of rewritten classes.
//!
//! Each class is written to `<dir>/<internal name>.class` through a memory-mapped file. A file
//! that could not be written completely is removed again.

use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
};

use memmap2::{MmapMut, MmapOptions};

use crate::{Error, Result};

/// A memory-mapped output file, removed on drop unless finalized.
pub(crate) struct Output {
    mmap: MmapMut,
    target_path: PathBuf,
    finalized: bool,
}

impl Output {
    /// Creates `target_path` with `size` bytes and maps it for writing.
    pub(crate) fn create(target_path: &Path, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::Empty);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(target_path)?;
        file.set_len(size as u64)?;

        // Safety: the file was just created and truncated by us, and is not shared while mapped
        let mmap = unsafe { MmapOptions::new().map_mut(&file)? };

        Ok(Output {
            mmap,
            target_path: target_path.to_path_buf(),
            finalized: false,
        })
    }

    /// Copies `data` to `offset`.
    pub(crate) fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(data.len())
            .ok_or(out_of_bounds_error!())?;
        if end > self.mmap.len() {
            return Err(out_of_bounds_error!());
        }
        self.mmap[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Flushes the mapping and keeps the file.
    pub(crate) fn finalize(mut self) -> Result<PathBuf> {
        self.mmap.flush()?;
        self.finalized = true;
        Ok(self.target_path.clone())
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        if !self.finalized {
            let _ = std::fs::remove_file(&self.target_path);
        }
    }
}

/// Path a class is exported to.
#[must_use]
pub fn export_path(dir: &Path, class_name: &str) -> PathBuf {
    let mut path = dir.to_path_buf();
    let (package, simple) = class_name.rsplit_once('/').unwrap_or(("", class_name));
    for segment in package.split('/').filter(|segment| !segment.is_empty()) {
        path.push(segment);
    }
    path.push(format!("{simple}.class"));
    path
}

/// Writes `bytes` to the export location of `class_name` under `dir`, creating directories as
/// needed, and returns the written path.
///
/// # Errors
/// Returns [`Error::FileError`] if the file cannot be created or written, and
/// [`Error::Malformed`] for class names that would escape `dir`.
pub fn export_class(dir: &Path, class_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    if class_name
        .split('/')
        .any(|segment| segment == ".." || segment == ".")
    {
        return Err(malformed_error!("Refusing to export {}", class_name));
    }

    let path = export_path(dir, class_name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut output = Output::create(&path, bytes.len())?;
    output.write_at(0, bytes)?;
    output.finalize()
}
