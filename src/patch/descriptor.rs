use std::sync::Arc;

use crate::{
    classfile::{code::insn::NodeId, ClassFile, Insn, MethodNode},
    matcher,
    patch::{
        definition::{Bindings, Context, Executable, FieldInsnSite, MethodInsnSite},
        selector::{InsnSelector, MethodSelector, TargetSelector},
    },
    Error, Result,
};

/// One action of a registered definition, validated and bound to its settings.
///
/// Descriptors are immutable. Two descriptors are equal when every part is: same definition
/// and action, same flag value, same selectors, and the very same executable and bindings.
#[derive(Debug, Clone)]
pub struct PatchDescriptor {
    pub(crate) definition: Arc<str>,
    pub(crate) action: String,
    pub(crate) enabled: bool,
    pub(crate) receiver: Context,
    pub(crate) target: Arc<TargetSelector>,
    pub(crate) method: Option<MethodSelector>,
    pub(crate) insn: Option<InsnSelector>,
    pub(crate) executable: Executable,
    pub(crate) bindings: Arc<Bindings>,
}

impl PatchDescriptor {
    /// Name of the definition the action belongs to.
    #[must_use]
    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// Name of the action.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Value of the enablement flag, read once at registration.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the action runs against the definition's instance settings.
    #[must_use]
    pub fn receiver(&self) -> Context {
        self.receiver
    }

    /// The target selector.
    #[must_use]
    pub fn target(&self) -> &TargetSelector {
        &self.target
    }

    /// The method selector, `None` to apply to every method.
    #[must_use]
    pub fn method_selector(&self) -> Option<&MethodSelector> {
        self.method.as_ref()
    }

    /// The instruction selector, `None` for a method-level action.
    #[must_use]
    pub fn insn_selector(&self) -> Option<&InsnSelector> {
        self.insn.as_ref()
    }

    /// The settings bound into the action.
    #[must_use]
    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// Returns `true` if the action applies to `method`.
    #[must_use]
    pub fn matches_method(&self, method: &MethodNode) -> bool {
        self.method
            .as_ref()
            .map_or(true, |selector| matcher::matches_method(selector, method))
    }

    /// Returns `true` if the action applies to `insn`. Always `false` for method-level actions.
    #[must_use]
    pub fn matches_insn(&self, insn: &Insn) -> bool {
        self.insn
            .as_ref()
            .is_some_and(|selector| matcher::matches_insn(selector, insn))
    }

    /// Runs a method-level action.
    ///
    /// # Errors
    /// Returns whatever the action reports, or [`Error::Action`] if this is an instruction-level
    /// action.
    pub fn visit(&self, class: &mut ClassFile, method: &mut MethodNode) -> Result<()> {
        match &self.executable {
            Executable::Method(f) => f(class, method, &self.bindings),
            other => Err(Error::action(
                &self.action,
                format!("{} cannot visit a method", other.shape()),
            )),
        }
    }

    /// Runs an instruction-level action against the instruction `node` of `method`.
    ///
    /// # Errors
    /// Returns whatever the action reports, or [`Error::Action`] if the instruction does not have
    /// the shape the action takes.
    pub fn visit_insn(
        &self,
        class: &mut ClassFile,
        method: &mut MethodNode,
        node: NodeId,
        insn: &Insn,
    ) -> Result<()> {
        match (&self.executable, insn) {
            (Executable::FieldInsn(f), Insn::Field(field)) => {
                let site = FieldInsnSite {
                    node,
                    insn: field.clone(),
                };
                f(class, method, &site, &self.bindings)
            }
            (Executable::MethodInsn(f), Insn::Method(call)) => {
                let site = MethodInsnSite {
                    node,
                    insn: call.clone(),
                };
                f(class, method, &site, &self.bindings)
            }
            (executable, _) => Err(Error::action(
                &self.action,
                format!("{} cannot visit {:?}", executable.shape(), insn),
            )),
        }
    }
}

impl PartialEq for PatchDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.definition == other.definition
            && self.action == other.action
            && self.enabled == other.enabled
            && self.receiver == other.receiver
            && self.target == other.target
            && self.method == other.method
            && self.insn == other.insn
            && self.executable.same(&other.executable)
            && Arc::ptr_eq(&self.bindings, &other.bindings)
    }
}

impl Eq for PatchDescriptor {}
