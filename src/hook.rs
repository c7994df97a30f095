//! The interception hook.
//!
//! A host runtime calls its registered [`ClassFileTransformer`] once per class load, on the
//! loading thread. [`ClassFileHook`] adapts a [`Transformer`] to that contract: whatever happens
//! inside, the call returns either replacement bytes or `None` for "load the original".

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, error};

use crate::{
    loader::ClassLoader,
    transform::{panic_message, Transformer},
};

/// Per-load callback of a host runtime.
pub trait ClassFileTransformer: Send + Sync {
    /// Returns replacement bytes for the class `class_name` defined by `loader`, or `None` to keep
    /// `bytes`. Must not panic.
    fn transform(
        &self,
        loader: Option<&dyn ClassLoader>,
        class_name: Option<&str>,
        bytes: &[u8],
    ) -> Option<Vec<u8>>;
}

/// Runs a [`Transformer`] behind a boundary no error or panic crosses.
///
/// Loads without a loader (bootstrap classes) or without a name (hidden classes) are never
/// transformed.
///
/// ```rust
/// use classmend::{
///     hook::{ClassFileHook, ClassFileTransformer},
///     loader::MemoryLoader,
///     patch::PatchRegistry,
/// };
///
/// let hook = ClassFileHook::new(PatchRegistry::new().build_transformer());
/// let loader = MemoryLoader::new("app");
/// assert_eq!(hook.transform(Some(&loader), Some("org/app/Main"), b"not a class"), None);
/// assert_eq!(hook.transform(None, Some("org/app/Main"), b"not a class"), None);
/// ```
#[derive(Clone)]
pub struct ClassFileHook {
    transformer: Transformer,
}

impl ClassFileHook {
    /// Wraps `transformer`.
    #[must_use]
    pub fn new(transformer: Transformer) -> Self {
        ClassFileHook { transformer }
    }

    /// The wrapped transformer.
    #[must_use]
    pub fn transformer(&self) -> &Transformer {
        &self.transformer
    }
}

impl ClassFileTransformer for ClassFileHook {
    fn transform(
        &self,
        loader: Option<&dyn ClassLoader>,
        class_name: Option<&str>,
        bytes: &[u8],
    ) -> Option<Vec<u8>> {
        let (Some(loader), Some(class_name)) = (loader, class_name) else {
            return None;
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.transformer.transform(Some(loader), class_name, bytes)
        }));
        match outcome {
            Ok(Ok(Some(output))) => {
                debug!("Transformed {}", class_name);
                Some(output)
            }
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                error!(error = %e, "Encountered an error while transforming {}", class_name);
                None
            }
            Err(payload) => {
                error!(
                    error = %panic_message(payload.as_ref()),
                    "Encountered an error while transforming {}",
                    class_name
                );
                None
            }
        }
    }
}
