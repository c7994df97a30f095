//! The declarative form of a patch, as supplied by its author.

use std::{collections::BTreeMap, fmt, sync::Arc};

use strum::Display;

use crate::{
    classfile::{
        code::insn::{FieldInsn, MethodInsn, NodeId},
        ClassFile, MethodNode,
    },
    patch::selector::{InsnSelector, MethodSelector, TargetSelector},
    Result,
};

/// Settings resolved for one action at registration time, by setting name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings(BTreeMap<String, String>);

impl Bindings {
    /// Creates empty bindings.
    #[must_use]
    pub fn new() -> Self {
        Bindings::default()
    }

    /// Returns the value bound to `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Binds `name` to `value`.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Number of bound settings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

/// A field access instruction matched by an action's selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInsnSite {
    /// The matched node, valid in the method's instruction list
    pub node: NodeId,
    /// The instruction as it was matched
    pub insn: FieldInsn,
}

/// A method invocation instruction matched by an action's selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInsnSite {
    /// The matched node, valid in the method's instruction list
    pub node: NodeId,
    /// The instruction as it was matched
    pub insn: MethodInsn,
}

/// Applied once per matched method.
pub type MethodFn = dyn Fn(&mut ClassFile, &mut MethodNode, &Bindings) -> Result<()> + Send + Sync;
/// Applied once per matched field access instruction.
pub type FieldInsnFn =
    dyn Fn(&mut ClassFile, &mut MethodNode, &FieldInsnSite, &Bindings) -> Result<()> + Send + Sync;
/// Applied once per matched method invocation instruction.
pub type MethodInsnFn =
    dyn Fn(&mut ClassFile, &mut MethodNode, &MethodInsnSite, &Bindings) -> Result<()> + Send + Sync;

/// The code of an action.
///
/// While it runs, the method is detached from `class.methods`; it is put back at its original
/// position afterwards.
#[derive(Clone)]
pub enum Executable {
    /// Takes the class and the matched method
    Method(Arc<MethodFn>),
    /// Takes the class, the method and the matched field access
    FieldInsn(Arc<FieldInsnFn>),
    /// Takes the class, the method and the matched invocation
    MethodInsn(Arc<MethodInsnFn>),
}

impl Executable {
    /// Wraps a method-level action.
    pub fn method<F>(f: F) -> Self
    where
        F: Fn(&mut ClassFile, &mut MethodNode, &Bindings) -> Result<()> + Send + Sync + 'static,
    {
        Executable::Method(Arc::new(f))
    }

    /// Wraps a field-access-level action.
    pub fn field_insn<F>(f: F) -> Self
    where
        F: Fn(&mut ClassFile, &mut MethodNode, &FieldInsnSite, &Bindings) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        Executable::FieldInsn(Arc::new(f))
    }

    /// Wraps an invocation-level action.
    pub fn method_insn<F>(f: F) -> Self
    where
        F: Fn(&mut ClassFile, &mut MethodNode, &MethodInsnSite, &Bindings) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        Executable::MethodInsn(Arc::new(f))
    }

    /// The parameter shape of this executable.
    #[must_use]
    pub fn shape(&self) -> ActionShape {
        match self {
            Executable::Method(_) => ActionShape::Method,
            Executable::FieldInsn(_) => ActionShape::FieldInsn,
            Executable::MethodInsn(_) => ActionShape::MethodInsn,
        }
    }

    pub(crate) fn same(&self, other: &Executable) -> bool {
        match (self, other) {
            (Executable::Method(a), Executable::Method(b)) => Arc::ptr_eq(a, b),
            (Executable::FieldInsn(a), Executable::FieldInsn(b)) => Arc::ptr_eq(a, b),
            (Executable::MethodInsn(a), Executable::MethodInsn(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Executable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Executable{}", self.shape())
    }
}

/// The closed set of parameter shapes an action can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ActionShape {
    /// `(ClassFile, MethodNode)`
    #[strum(serialize = "(ClassFile, MethodNode)")]
    Method,
    /// `(ClassFile, MethodNode, FieldInsn)`
    #[strum(serialize = "(ClassFile, MethodNode, FieldInsn)")]
    FieldInsn,
    /// `(ClassFile, MethodNode, MethodInsn)`
    #[strum(serialize = "(ClassFile, MethodNode, MethodInsn)")]
    MethodInsn,
}

impl ActionShape {
    /// The shape an action with `selector` must have.
    #[must_use]
    pub fn required_by(selector: Option<&InsnSelector>) -> ActionShape {
        match selector {
            None => ActionShape::Method,
            Some(InsnSelector::Field(_)) => ActionShape::FieldInsn,
            Some(InsnSelector::Method(_)) => ActionShape::MethodInsn,
        }
    }
}

/// Kind of value a setting holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    /// Text, the only kind that can be bound
    String,
    /// `true` or `false`
    Boolean,
    /// A whole number
    Integer,
    /// Anything else, by type name
    Other(String),
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::String => f.write_str("String"),
            ValueKind::Boolean => f.write_str("Boolean"),
            ValueKind::Integer => f.write_str("Integer"),
            ValueKind::Other(name) => f.write_str(name),
        }
    }
}

/// Whether a setting is shared by the definition or owned by its instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Context {
    /// Shared by every action of the definition
    Static,
    /// Needs an instance of the definition
    Instance,
}

/// A value an action receives from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingField {
    /// Binding name the action looks the value up by
    pub name: String,
    /// Setting label, the last part of the setting path
    pub label: String,
    /// Kind of value
    pub kind: ValueKind,
    /// Static or instance setting
    pub context: Context,
    /// Constant settings cannot be bound
    pub constant: bool,
    /// Value used when configuration provides none
    pub default: Option<String>,
}

impl SettingField {
    /// A static string setting.
    #[must_use]
    pub fn string(name: &str, label: &str) -> Self {
        SettingField {
            name: name.to_string(),
            label: label.to_string(),
            kind: ValueKind::String,
            context: Context::Static,
            constant: false,
            default: None,
        }
    }

    /// Changes the kind of value.
    #[must_use]
    pub fn kind(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }

    /// Makes this an instance setting.
    #[must_use]
    pub fn instance(mut self) -> Self {
        self.context = Context::Instance;
        self
    }

    /// Marks the setting constant.
    #[must_use]
    pub fn constant(mut self) -> Self {
        self.constant = true;
        self
    }

    /// Sets the fallback value.
    #[must_use]
    pub fn default_value(mut self, value: &str) -> Self {
        self.default = Some(value.to_string());
        self
    }
}

/// One member action of a definition.
#[derive(Debug, Clone)]
pub struct PatchAction {
    /// Action name, used in logs and errors
    pub name: String,
    /// Setting label of the enablement flag
    pub label: String,
    /// Methods to apply to, every method when empty
    pub methods: Vec<MethodSelector>,
    /// Instruction selectors, at most one is accepted
    pub insn_selectors: Vec<InsnSelector>,
    /// Static or instance action
    pub receiver: Context,
    /// The code, `None` for an abstract action
    pub executable: Option<Executable>,
}

impl PatchAction {
    /// Creates a static action whose enablement flag has the label `label`.
    #[must_use]
    pub fn new(name: &str, label: &str, executable: Executable) -> Self {
        PatchAction {
            name: name.to_string(),
            label: label.to_string(),
            methods: Vec::new(),
            insn_selectors: Vec::new(),
            receiver: Context::Static,
            executable: Some(executable),
        }
    }

    /// Creates an action without code.
    #[must_use]
    pub fn abstract_action(name: &str, label: &str) -> Self {
        PatchAction {
            executable: None,
            ..PatchAction::new(name, label, Executable::method(|_, _, _| Ok(())))
        }
    }

    /// Adds a method selector.
    #[must_use]
    pub fn method(mut self, selector: MethodSelector) -> Self {
        self.methods.push(selector);
        self
    }

    /// Adds an instruction selector.
    #[must_use]
    pub fn insn(mut self, selector: InsnSelector) -> Self {
        self.insn_selectors.push(selector);
        self
    }

    /// Makes this an instance action.
    #[must_use]
    pub fn instance(mut self) -> Self {
        self.receiver = Context::Instance;
        self
    }
}

/// A patch as supplied by its author: a target, settings and member actions.
///
/// ```rust
/// use classmend::{
///     classfile::{code::opcodes::RETURN, Insn},
///     patch::{Executable, MethodSelector, PatchAction, PatchDefinition, TargetSelector},
/// };
///
/// let definition = PatchDefinition::new("DisableShutdownHook")
///     .category("app")
///     .target(TargetSelector::new("org/app/Runtime"))
///     .action(
///         PatchAction::new(
///             "hook",
///             "shutdown-hook",
///             Executable::method(|_, method, _| {
///                 method.clear_body().instructions.push(Insn::op(RETURN));
///                 Ok(())
///             }),
///         )
///         .method(MethodSelector::new("installShutdownHook", "()V")),
///     );
/// assert_eq!(definition.actions.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct PatchDefinition {
    /// Unique name
    pub name: String,
    /// Setting label shared by every member
    pub category: String,
    /// Classes to apply to; a definition without target is rejected
    pub target: Option<TargetSelector>,
    /// Whether the definition can have an instance
    pub instantiable: bool,
    /// Values bound from configuration
    pub settings: Vec<SettingField>,
    /// Member actions
    pub actions: Vec<PatchAction>,
}

impl PatchDefinition {
    /// Creates an instantiable definition without target.
    #[must_use]
    pub fn new(name: &str) -> Self {
        PatchDefinition {
            name: name.to_string(),
            category: String::new(),
            target: None,
            instantiable: true,
            settings: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Sets the category label.
    #[must_use]
    pub fn category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    /// Sets the target selector.
    #[must_use]
    pub fn target(mut self, target: TargetSelector) -> Self {
        self.target = Some(target);
        self
    }

    /// Marks the definition as impossible to instantiate.
    #[must_use]
    pub fn abstract_definition(mut self) -> Self {
        self.instantiable = false;
        self
    }

    /// Adds a setting.
    #[must_use]
    pub fn setting(mut self, setting: SettingField) -> Self {
        self.settings.push(setting);
        self
    }

    /// Adds an action.
    #[must_use]
    pub fn action(mut self, action: PatchAction) -> Self {
        self.actions.push(action);
        self
    }
}
