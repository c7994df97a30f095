use crate::{
    hook::{ClassFileHook, ClassFileTransformer},
    loader::ClassLoader,
    transform::Transformer,
    Result,
};

type NameFilter = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// A loader that patches the classes it hands out.
///
/// Every class found in the wrapped loader whose internal name passes all filters is run through
/// the [`Transformer`] before it is returned. Supertypes are resolved against the wrapped loader,
/// so their headers are read unpatched. A failing transform is logged and the original bytes are
/// returned.
///
/// ```rust
/// use classmend::{
///     classfile::ClassBuilder,
///     loader::{ClassLoader, MemoryLoader, TransformingLoader},
///     patch::PatchRegistry,
/// };
///
/// let mut classes = MemoryLoader::new("app");
/// classes.add(ClassBuilder::new("org/app/Main").build()?)?;
///
/// let loader = TransformingLoader::new(classes, PatchRegistry::new().build_transformer())
///     .with_filter(|name| !name.starts_with("org/app/internal/"));
/// assert!(loader.find_class("org/app/Main")?.is_some());
/// # Ok::<(), classmend::Error>(())
/// ```
pub struct TransformingLoader<L> {
    inner: L,
    hook: ClassFileHook,
    filters: Vec<NameFilter>,
}

impl<L: ClassLoader> TransformingLoader<L> {
    /// Wraps `inner`, transforming every class it provides.
    #[must_use]
    pub fn new(inner: L, transformer: Transformer) -> Self {
        TransformingLoader {
            inner,
            hook: ClassFileHook::new(transformer),
            filters: Vec::new(),
        }
    }

    /// Restricts transformation to names `filter` accepts, in addition to earlier filters.
    pub fn add_filter(
        &mut self,
        filter: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> &mut Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Builder form of [`TransformingLoader::add_filter`].
    #[must_use]
    pub fn with_filter(mut self, filter: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.add_filter(filter);
        self
    }

    /// Returns `true` if classes named `name` are transformed.
    #[must_use]
    pub fn accepts(&self, name: &str) -> bool {
        self.filters.iter().all(|filter| filter(name))
    }

    /// The wrapped loader.
    #[must_use]
    pub fn inner(&self) -> &L {
        &self.inner
    }
}

impl<L: ClassLoader> ClassLoader for TransformingLoader<L> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn find_class(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let Some(bytes) = self.inner.find_class(name)? else {
            return Ok(None);
        };
        if !self.accepts(name) {
            return Ok(Some(bytes));
        }

        let inner: &dyn ClassLoader = &self.inner;
        let patched = self.hook.transform(Some(inner), Some(name), &bytes);
        Ok(Some(patched.unwrap_or(bytes)))
    }
}
