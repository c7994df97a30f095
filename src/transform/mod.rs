//! The transformation pipeline.
//!
//! [`Transformer::transform`] takes the bytes of one class as it is being loaded and applies every
//! enabled, matching [`PatchDescriptor`] to it:
//!
//! 1. descriptors whose flag is off, or whose target name does not fit, are skipped without
//!    parsing anything,
//! 2. the class is parsed on the first descriptor that passes, and the full target selector is
//!    checked against the parsed header,
//! 3. each method accepted by the method selector is handed to the action with its body decoded,
//!    once per method for method-level actions and once per matching instruction otherwise,
//! 4. if at least one action completed, the class is written back with frames recomputed against
//!    the [`HierarchyIndex`], and optionally exported.
//!
//! An action that fails, by error or by panic, is logged and its edits are rolled back; the
//! remaining actions still run. Failures outside actions (malformed input, a type that cannot be
//! resolved while computing frames) end the transform with an error.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use classmend::{
//!     classfile::{code::opcodes::ARETURN, ClassBuilder, ClassFile, Insn, MethodAccess},
//!     patch::{
//!         Executable, MapSettings, MethodSelector, PatchAction, PatchDefinition, PatchRegistry,
//!         TargetSelector,
//!     },
//! };
//!
//! let mut registry =
//!     PatchRegistry::with_settings(Arc::new(MapSettings::new().with("patch.demo.name", "true")));
//! registry.add(
//!     PatchDefinition::new("Anonymize")
//!         .category("demo")
//!         .target(TargetSelector::new("org/demo/User"))
//!         .action(
//!             PatchAction::new(
//!                 "name",
//!                 "name",
//!                 Executable::method(|_, method, _| {
//!                     let code = method.clear_body();
//!                     code.instructions.push(Insn::ldc_string("anonymous"));
//!                     code.instructions.push(Insn::op(ARETURN));
//!                     Ok(())
//!                 }),
//!             )
//!             .method(MethodSelector::new("getName", "()Ljava/lang/String;")),
//!         ),
//! )?;
//!
//! let original = ClassBuilder::new("org/demo/User")
//!     .method(
//!         MethodAccess::PUBLIC,
//!         "getName",
//!         "()Ljava/lang/String;",
//!         [Insn::ldc_string("alice"), Insn::op(ARETURN)],
//!     )
//!     .build()?;
//!
//! let transformer = registry.build_transformer();
//! let patched = transformer.transform(None, "org/demo/User", &original)?.expect("patched");
//! let mut class = ClassFile::parse(&patched)?;
//! let pool = class.pool.clone();
//! let method = class.method_mut("getName", "()Ljava/lang/String;").expect("method");
//! method.load_code(&pool)?;
//! assert_eq!(method.code().expect("code").instructions.len(), 2);
//!
//! assert!(transformer.transform(None, "org/demo/Other", &original)?.is_none());
//! # Ok::<(), classmend::Error>(())
//! ```

mod config;
mod export;

use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use tracing::{debug, warn};

use crate::{
    classfile::{internal_name, ClassFile, ClassWriter, MethodNode},
    hierarchy::{HierarchyIndex, TypeResolver},
    loader::{BuiltinLoader, ClassLoader},
    matcher,
    patch::PatchDescriptor,
    Result,
};

pub use config::{
    working_dir, TransformConfig, EXPORT_DIR_NAME, EXPORT_DIR_SETTING, EXPORT_SETTING,
    WORKING_DIR_ENV,
};
pub use export::{export_class, export_path};

/// Applies registered patches to classes as they load.
///
/// Holds a read-only snapshot of the descriptors; safe to share between loading threads.
#[derive(Clone)]
pub struct Transformer {
    descriptors: Vec<Arc<PatchDescriptor>>,
    index: Arc<HierarchyIndex>,
    bootstrap: Arc<dyn ClassLoader>,
    config: TransformConfig,
}

impl Transformer {
    /// Creates a transformer with a fresh hierarchy index, the [`BuiltinLoader`] as bootstrap
    /// resource space and the default configuration.
    #[must_use]
    pub fn new(descriptors: Vec<Arc<PatchDescriptor>>) -> Self {
        Transformer {
            descriptors,
            index: Arc::new(HierarchyIndex::new()),
            bootstrap: Arc::new(BuiltinLoader),
            config: TransformConfig::default(),
        }
    }

    /// Shares `index` with other transformers or resolvers.
    #[must_use]
    pub fn with_index(mut self, index: Arc<HierarchyIndex>) -> Self {
        self.index = index;
        self
    }

    /// Resolves types not found through the active loader from `bootstrap`.
    #[must_use]
    pub fn with_bootstrap(mut self, bootstrap: Arc<dyn ClassLoader>) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: TransformConfig) -> Self {
        self.config = config;
        self
    }

    /// The descriptors, in registration order.
    #[must_use]
    pub fn descriptors(&self) -> &[Arc<PatchDescriptor>] {
        &self.descriptors
    }

    /// The hierarchy index used for frame computation.
    #[must_use]
    pub fn index(&self) -> &Arc<HierarchyIndex> {
        &self.index
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Transforms one class.
    ///
    /// `loader` is the loader defining the class, used to resolve the types frame computation
    /// needs; `name` may use `.` or `/` as separator. Returns `None` if no action completed, in
    /// which case the original bytes should be used.
    ///
    /// # Errors
    /// Returns an error if the class cannot be parsed or written back, or if a failing action
    /// replaced its constant pool. Other failing actions are not errors.
    pub fn transform(
        &self,
        loader: Option<&dyn ClassLoader>,
        name: &str,
        bytes: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        let name = internal_name(name);
        let mut parsed: Option<ClassFile> = None;
        let mut applied = 0usize;

        for descriptor in &self.descriptors {
            if !descriptor.is_enabled() || !matcher::matches_target_name(descriptor.target(), &name)
            {
                continue;
            }

            if parsed.is_none() {
                parsed = Some(ClassFile::parse(bytes)?);
            }
            let Some(class) = parsed.as_mut() else {
                continue;
            };
            if !matcher::matches_class(descriptor.target(), class) {
                continue;
            }
            applied += apply(descriptor, class)?;
        }

        let Some(class) = parsed else {
            return Ok(None);
        };
        if applied == 0 {
            return Ok(None);
        }

        let resolver = TypeResolver::new(&self.index, loader, self.bootstrap.as_ref());
        resolver.seed(&class);
        let output = ClassWriter::with_frames(&resolver).write(&class)?;
        debug!(class = %class.name, actions = applied, "Rewrote class");

        if self.config.export {
            match export_class(&self.config.export_dir, &class.name, &output) {
                Ok(path) => debug!(path = %path.display(), "Exported {}", class.name),
                Err(e) => warn!(error = %e, "Failed to export {}", class.name),
            }
        }
        Ok(Some(output))
    }
}

/// Applies one descriptor to every matching method of `class`, returning how many invocations
/// completed.
fn apply(descriptor: &PatchDescriptor, class: &mut ClassFile) -> Result<usize> {
    let mut applied = 0;
    let mut index = 0;
    while index < class.methods.len() {
        if !descriptor.matches_method(&class.methods[index]) {
            index += 1;
            continue;
        }

        class.methods[index].load_code(&class.pool)?;
        if descriptor.insn_selector().is_none() {
            if invoke(descriptor, class, index, |class, method| {
                descriptor.visit(class, method)
            })? {
                applied += 1;
            }
            index += 1;
            continue;
        }

        let Some(ids) = class.methods[index]
            .code()
            .map(|code| code.instructions.ids())
        else {
            index += 1;
            continue;
        };

        for id in ids {
            let Some(method) = class.methods.get(index) else {
                break;
            };
            let Some(insn) = method
                .code()
                .and_then(|code| code.instructions.get(id))
                .filter(|insn| descriptor.matches_insn(insn))
                .cloned()
            else {
                continue;
            };
            if invoke(descriptor, class, index, |class, method| {
                descriptor.visit_insn(class, method, id, &insn)
            })? {
                applied += 1;
            }
        }
        index += 1;
    }
    Ok(applied)
}

/// Runs `action` on the method at `index`, detached from `class` while it runs.
///
/// On error or panic the class and method are restored to their state before the call and
/// `Ok(false)` is returned. An action that replaced the constant pool cannot be undone, which
/// fails the whole class.
fn invoke<F>(
    descriptor: &PatchDescriptor,
    class: &mut ClassFile,
    index: usize,
    action: F,
) -> Result<bool>
where
    F: FnOnce(&mut ClassFile, &mut MethodNode) -> Result<()>,
{
    let mut method = class.methods.remove(index);
    let snapshot = class.snapshot();
    let backup = method.clone();

    let outcome = catch_unwind(AssertUnwindSafe(|| action(class, &mut method)));
    let failure = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(payload) => Some(panic_message(payload.as_ref())),
    };

    let Some(error) = failure else {
        let position = index.min(class.methods.len());
        class.methods.insert(position, method);
        return Ok(true);
    };

    class.restore(snapshot)?;
    warn!(
        definition = descriptor.definition(),
        action = descriptor.action(),
        class = %class.name,
        method = %backup.name,
        %error,
        "Patch action failed"
    );
    class.methods.insert(index, backup);
    Ok(false)
}

/// Extracts the message of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classfile::{code::opcodes::*, Insn},
        patch::{
            Executable, InsnSelector, MapSettings, MethodInsnSelector, MethodSelector,
            PatchAction, PatchDefinition, PatchRegistry, TargetSelector,
        },
        test::greeter_class,
        Error,
    };

    fn registry(definition: PatchDefinition) -> PatchRegistry {
        let settings = MapSettings::new().with("patch.test.on", "true");
        let mut registry = PatchRegistry::with_settings(Arc::new(settings));
        registry.add(definition).unwrap();
        registry
    }

    fn definition() -> PatchDefinition {
        PatchDefinition::new("Test")
            .category("test")
            .target(TargetSelector::new("app/"))
    }

    fn decoded(bytes: &[u8], name: &str, descriptor: &str) -> Vec<Insn> {
        let mut class = ClassFile::parse(bytes).unwrap();
        let pool = class.pool.clone();
        let method = class.method_mut(name, descriptor).unwrap();
        method.load_code(&pool).unwrap();
        method.code().unwrap().instructions.iter().cloned().collect()
    }

    #[test]
    fn disabled_descriptors_never_parse() {
        let mut registry = PatchRegistry::new();
        registry
            .add(definition().action(PatchAction::new(
                "on",
                "on",
                Executable::method(|_, _, _| panic!("must not run")),
            )))
            .unwrap();
        // not a class file at all
        let result = registry.build_transformer().transform(None, "app/Greeter", b"junk");
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn unmatched_names_never_parse() {
        let transformer = registry(definition().action(PatchAction::new(
            "on",
            "on",
            Executable::method(|_, _, _| Ok(())),
        )))
        .build_transformer();
        assert!(transformer.transform(None, "lib/Other", b"junk").unwrap().is_none());
        assert!(transformer.transform(None, "app/Greeter", b"junk").is_err());
    }

    #[test]
    fn method_actions_see_each_matching_method() {
        let transformer = registry(
            definition().action(
                PatchAction::new(
                    "on",
                    "on",
                    Executable::method(|_, method, _| {
                        let code = method.clear_body();
                        code.instructions.push(Insn::ldc_string("patched"));
                        code.instructions.push(Insn::op(ARETURN));
                        Ok(())
                    }),
                )
                .method(MethodSelector::new("describe", "Ljava/lang/String;")),
            ),
        )
        .build_transformer();

        let bytes = greeter_class("app/Greeter");
        let patched = transformer.transform(None, "app.Greeter", &bytes).unwrap().unwrap();
        assert_eq!(
            decoded(&patched, "describe", "()Ljava/lang/String;"),
            vec![Insn::ldc_string("patched"), Insn::op(ARETURN)]
        );
        // untouched methods are kept
        assert_eq!(
            decoded(&patched, "count", "(I)I"),
            decoded(&bytes, "count", "(I)I")
        );
    }

    #[test]
    fn failed_actions_are_rolled_back() {
        let transformer = registry(
            definition()
                .action(PatchAction::new(
                    "error",
                    "on",
                    Executable::method(|class, method, _| {
                        class.interfaces.push("java/lang/Runnable".to_string());
                        method.clear_body();
                        Err(Error::action("error", "refused"))
                    }),
                ))
                .action(PatchAction::new(
                    "panic",
                    "on",
                    Executable::method(|class, _, _| {
                        class.fields.clear();
                        panic!("boom");
                    }),
                )),
        )
        .build_transformer();

        // nothing completed, so nothing is rewritten
        let bytes = greeter_class("app/Greeter");
        assert!(transformer.transform(None, "app/Greeter", &bytes).unwrap().is_none());
    }

    #[test]
    fn rollback_keeps_earlier_edits() {
        let transformer = registry(
            definition()
                .action(
                    PatchAction::new(
                        "rename",
                        "on",
                        Executable::method(|_, method, _| {
                            method.name = "renamed".to_string();
                            Ok(())
                        }),
                    )
                    .method(MethodSelector::new("count", "")),
                )
                .action(PatchAction::new(
                    "fail",
                    "on",
                    Executable::method(|class, _, _| {
                        class.methods.clear();
                        Err(Error::action("fail", "no"))
                    }),
                )),
        )
        .build_transformer();

        let patched = transformer
            .transform(None, "app/Greeter", &greeter_class("app/Greeter"))
            .unwrap()
            .unwrap();
        let class = ClassFile::parse(&patched).unwrap();
        let names: Vec<&str> = class.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["<init>", "describe", "renamed"]);
    }

    #[test]
    fn insn_actions_skip_inserted_nodes() {
        let transformer = registry(
            definition().action(
                PatchAction::new(
                    "on",
                    "on",
                    Executable::method_insn(|_, method, site, _| {
                        let code = method.code_mut().ok_or_else(|| Error::action("on", "no code"))?;
                        // a second matching call right behind the visited one
                        code.instructions.insert_after(site.node, [
                            Insn::op(POP),
                            Insn::method(
                                INVOKESTATIC,
                                "app/Util",
                                "touch",
                                "()Ljava/lang/Object;",
                            ),
                        ])?;
                        Ok(())
                    }),
                )
                .insn(InsnSelector::Method(MethodInsnSelector::new(
                    "app/Util", "touch", "",
                ))),
            ),
        )
        .build_transformer();

        let bytes = crate::classfile::ClassBuilder::new("app/Caller")
            .method(
                crate::classfile::MethodAccess::PUBLIC | crate::classfile::MethodAccess::STATIC,
                "run",
                "()Ljava/lang/Object;",
                [
                    Insn::method(INVOKESTATIC, "app/Util", "touch", "()Ljava/lang/Object;"),
                    Insn::op(ARETURN),
                ],
            )
            .build()
            .unwrap();

        let resolver_loader = crate::loader::MemoryLoader::new("app");
        let patched = transformer
            .transform(Some(&resolver_loader), "app/Caller", &bytes)
            .unwrap()
            .unwrap();
        let calls = decoded(&patched, "run", "()Ljava/lang/Object;")
            .into_iter()
            .filter(|insn| insn.as_method().is_some())
            .count();
        assert_eq!(calls, 2);
    }

    fn counter_class() -> Vec<u8> {
        crate::classfile::ClassBuilder::new("app/Counter")
            .method(
                crate::classfile::MethodAccess::PUBLIC | crate::classfile::MethodAccess::STATIC,
                "run",
                "()I",
                [Insn::op(ICONST_1), Insn::op(IRETURN)],
            )
            .build()
            .unwrap()
    }

    #[test]
    fn method_actions_see_the_decoded_body() {
        let transformer = registry(
            definition().action(
                PatchAction::new(
                    "on",
                    "on",
                    Executable::method(|_, method, _| {
                        let existing = method.code().map(|code| code.instructions.len());
                        if existing != Some(2) {
                            return Err(Error::action("on", format!("body is {existing:?}")));
                        }
                        let code = method.code_mut().ok_or_else(|| Error::action("on", "no code"))?;
                        code.instructions.insert_at(
                            0,
                            [Insn::method(INVOKESTATIC, "app/Guard", "check", "()V")],
                        )
                    }),
                )
                .method(MethodSelector::new("run", "()I")),
            ),
        )
        .build_transformer();

        let patched = transformer
            .transform(None, "app/Counter", &counter_class())
            .unwrap()
            .unwrap();
        assert_eq!(
            decoded(&patched, "run", "()I"),
            vec![
                Insn::method(INVOKESTATIC, "app/Guard", "check", "()V"),
                Insn::op(ICONST_1),
                Insn::op(IRETURN),
            ]
        );
    }

    #[test]
    fn rollback_drops_constants_of_failed_actions() {
        let transformer = registry(
            definition()
                .action(
                    PatchAction::new(
                        "leak",
                        "on",
                        Executable::method(|class, _, _| {
                            class.pool.string_index("leaked")?;
                            class.pool.method_ref_index("app/Leak", "leak", "()V", false)?;
                            Err(Error::action("leak", "refused"))
                        }),
                    )
                    .method(MethodSelector::new("run", "()I")),
                )
                .action(
                    PatchAction::new(
                        "zero",
                        "on",
                        Executable::method(|_, method, _| {
                            let code = method.clear_body();
                            code.instructions.push(Insn::op(ICONST_0));
                            code.instructions.push(Insn::op(IRETURN));
                            Ok(())
                        }),
                    )
                    .method(MethodSelector::new("run", "()I")),
                ),
        )
        .build_transformer();

        let patched = transformer
            .transform(None, "app/Counter", &counter_class())
            .unwrap()
            .unwrap();
        let class = ClassFile::parse(&patched).unwrap();

        let texts: Vec<&str> = (1..class.pool.len())
            .filter_map(|index| class.pool.utf8(index as u16).ok())
            .collect();
        assert!(!texts.contains(&"leaked"));
        assert!(!texts.contains(&"app/Leak"));
        assert_eq!(
            decoded(&patched, "run", "()I"),
            vec![Insn::op(ICONST_0), Insn::op(IRETURN)]
        );
    }

    #[test]
    fn replaced_pool_fails_the_class() {
        let transformer = registry(
            definition().action(
                PatchAction::new(
                    "replace",
                    "on",
                    Executable::method(|class, _, _| {
                        class.pool = crate::classfile::ConstantPool::new();
                        Err(Error::action("replace", "refused"))
                    }),
                )
                .method(MethodSelector::new("run", "()I")),
            ),
        )
        .build_transformer();

        assert!(transformer.transform(None, "app/Counter", &counter_class()).is_err());
    }

    #[test]
    fn panic_messages() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u32), "panic with non-string payload");
    }
}
