use std::{collections::HashSet, sync::Arc};

use tracing::{debug, error};

use crate::{
    patch::{
        definition::{ActionShape, Bindings, Context, PatchDefinition, ValueKind},
        descriptor::PatchDescriptor,
        settings::{setting_path, Settings},
    },
    transform::{TransformConfig, Transformer},
    Error, Result,
};

/// Validates patch definitions and collects their descriptors.
///
/// Every definition is checked completely before any of its descriptors is added, so a rejected
/// definition leaves nothing behind but its name. Descriptors keep registration order.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
///
/// use classmend::patch::{
///     Executable, MapSettings, PatchAction, PatchDefinition, PatchRegistry, TargetSelector,
/// };
///
/// let settings = MapSettings::new().with("patch.demo.noop", "true");
/// let mut registry = PatchRegistry::with_settings(Arc::new(settings));
///
/// let accepted = registry.register(
///     PatchDefinition::new("Demo")
///         .category("demo")
///         .target(TargetSelector::new("org/demo/"))
///         .action(PatchAction::new("noop", "noop", Executable::method(|_, _, _| Ok(())))),
/// );
/// assert!(accepted);
/// assert!(registry.descriptors()[0].is_enabled());
///
/// // no target selector
/// assert!(!registry.register(PatchDefinition::new("Broken")));
/// ```
#[derive(Default)]
pub struct PatchRegistry {
    names: HashSet<String>,
    descriptors: Vec<Arc<PatchDescriptor>>,
    settings: Option<Arc<dyn Settings>>,
}

impl PatchRegistry {
    /// Creates a registry without configuration: every flag reads `false`.
    #[must_use]
    pub fn new() -> Self {
        PatchRegistry::default()
    }

    /// Creates a registry reading flags and settings from `settings`.
    #[must_use]
    pub fn with_settings(settings: Arc<dyn Settings>) -> Self {
        PatchRegistry {
            settings: Some(settings),
            ..PatchRegistry::default()
        }
    }

    /// Registers a definition, logging instead of failing.
    ///
    /// Returns `true` if the definition was accepted.
    pub fn register(&mut self, definition: PatchDefinition) -> bool {
        let name = definition.name.clone();
        match self.add(definition) {
            Ok(_) => {
                debug!("Registered {}", name);
                true
            }
            Err(e) => {
                error!(error = %e, "Encountered an error while registering {}", name);
                false
            }
        }
    }

    /// Registers a definition.
    ///
    /// # Errors
    /// Returns [`Error::Registration`] if the name was seen before or the definition is invalid.
    pub fn add(&mut self, definition: PatchDefinition) -> Result<&mut Self> {
        if !self.names.insert(definition.name.clone()) {
            return Err(Error::registration(
                &definition.name,
                "already registered",
            ));
        }

        let descriptors = self.bind(definition)?;
        self.descriptors.extend(descriptors.into_iter().map(Arc::new));
        Ok(self)
    }

    /// Removes every descriptor. Names stay taken.
    pub fn clear(&mut self) {
        self.descriptors.clear();
    }

    /// The registered descriptors, in registration order.
    #[must_use]
    pub fn descriptors(&self) -> &[Arc<PatchDescriptor>] {
        &self.descriptors
    }

    /// Number of registered descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Creates a transformer over a snapshot of the registered descriptors.
    ///
    /// The export switch is read from the registry's settings.
    #[must_use]
    pub fn build_transformer(&self) -> Transformer {
        let config = self
            .settings
            .as_deref()
            .map_or_else(TransformConfig::default, TransformConfig::from_settings);
        Transformer::new(self.descriptors.clone()).with_config(config)
    }

    fn read_bool(&self, category: &str, label: &str) -> bool {
        match (&self.settings, setting_path(category, label)) {
            (Some(settings), Some(path)) => settings.get_bool(&path).unwrap_or(false),
            _ => false,
        }
    }

    fn read_string(&self, category: &str, label: &str) -> Option<String> {
        let settings = self.settings.as_ref()?;
        settings
            .get_string(&setting_path(category, label)?)
            .filter(|value| !value.trim().is_empty())
    }

    fn bind(&self, definition: PatchDefinition) -> Result<Vec<PatchDescriptor>> {
        let name = definition.name.as_str();
        let Some(target) = definition.target else {
            return Err(Error::registration(name, "Missing target selector"));
        };

        let mut shared = Bindings::new();
        let mut owned = Bindings::new();
        for setting in &definition.settings {
            if setting.kind != ValueKind::String {
                return Err(Error::registration(
                    name,
                    format!(
                        "Invalid setting {}! Expected {} but found {}",
                        setting.name,
                        ValueKind::String,
                        setting.kind
                    ),
                ));
            }
            if setting.context == Context::Instance && !definition.instantiable {
                return Err(Error::registration(
                    name,
                    format!("Invalid setting {}! Expected static but found instance", setting.name),
                ));
            }
            if setting.constant {
                return Err(Error::registration(
                    name,
                    format!("Invalid setting {}! Constant", setting.name),
                ));
            }

            let value = self
                .read_string(&definition.category, &setting.label)
                .or_else(|| setting.default.clone());
            if let Some(value) = value {
                match setting.context {
                    Context::Static => shared.insert(&setting.name, value),
                    Context::Instance => owned.insert(&setting.name, value),
                }
            }
        }

        for (key, value) in shared.iter() {
            if owned.get(key).is_none() {
                owned.insert(key, value);
            }
        }
        let shared = Arc::new(shared);
        let owned = Arc::new(owned);

        let definition_name: Arc<str> = Arc::from(name);
        let target = Arc::new(target);
        let mut descriptors = Vec::new();
        for action in definition.actions {
            if action.insn_selectors.len() > 1 {
                return Err(Error::registration(
                    name,
                    format!(
                        "Invalid action {}! Cannot have multiple instruction selectors",
                        action.name
                    ),
                ));
            }
            let Some(executable) = action.executable else {
                return Err(Error::registration(
                    name,
                    format!("Invalid action {}! Cannot be abstract", action.name),
                ));
            };
            if action.receiver == Context::Instance && !definition.instantiable {
                return Err(Error::registration(
                    name,
                    format!("Invalid action {}! Expected static but found instance", action.name),
                ));
            }

            let insn = action.insn_selectors.into_iter().next();
            let required = ActionShape::required_by(insn.as_ref());
            if executable.shape() != required {
                return Err(Error::registration(
                    name,
                    format!(
                        "Invalid action {}! Expected {} but found {}",
                        action.name,
                        required,
                        executable.shape()
                    ),
                ));
            }

            let enabled = self.read_bool(&definition.category, &action.label);
            let bindings = match action.receiver {
                Context::Static => Arc::clone(&shared),
                Context::Instance => Arc::clone(&owned),
            };
            let methods = if action.methods.is_empty() {
                vec![None]
            } else {
                action.methods.into_iter().map(Some).collect()
            };
            for method in methods {
                descriptors.push(PatchDescriptor {
                    definition: Arc::clone(&definition_name),
                    action: action.name.clone(),
                    enabled,
                    receiver: action.receiver,
                    target: Arc::clone(&target),
                    method,
                    insn: insn.clone(),
                    executable: executable.clone(),
                    bindings: Arc::clone(&bindings),
                });
            }
        }
        Ok(descriptors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classfile::code::opcodes::INVOKESTATIC,
        patch::{
            settings::MapSettings, Executable, InsnSelector, MethodInsnSelector, MethodSelector,
            PatchAction, SettingField, TargetSelector,
        },
    };

    fn noop() -> Executable {
        Executable::method(|_, _, _| Ok(()))
    }

    fn definition(name: &str) -> PatchDefinition {
        PatchDefinition::new(name)
            .category("test")
            .target(TargetSelector::new("org/test/"))
    }

    fn rejection(registry: &mut PatchRegistry, definition: PatchDefinition) -> String {
        match registry.add(definition) {
            Err(Error::Registration { message, .. }) => message,
            Err(e) => panic!("unexpected error {e}"),
            Ok(_) => panic!("definition was accepted"),
        }
    }

    #[test]
    fn flags_are_read_at_registration() {
        let settings = MapSettings::new()
            .with("patch.test.on", "true")
            .with("patch.test.off", "false");
        let mut registry = PatchRegistry::with_settings(Arc::new(settings));
        registry
            .add(
                definition("Flags")
                    .action(PatchAction::new("on", "on", noop()))
                    .action(PatchAction::new("off", "off", noop()))
                    .action(PatchAction::new("unset", "unset", noop())),
            )
            .unwrap();

        let enabled: Vec<bool> = registry.descriptors().iter().map(|d| d.is_enabled()).collect();
        assert_eq!(enabled, vec![true, false, false]);
    }

    #[test]
    fn without_settings_everything_is_disabled() {
        let mut registry = PatchRegistry::new();
        registry
            .add(definition("Quiet").action(PatchAction::new("a", "a", noop())))
            .unwrap();
        assert!(!registry.descriptors()[0].is_enabled());
    }

    #[test]
    fn one_descriptor_per_method_selector() {
        let mut registry = PatchRegistry::new();
        registry
            .add(
                definition("Many").action(
                    PatchAction::new("a", "a", noop())
                        .method(MethodSelector::new("one", ""))
                        .method(MethodSelector::new("two", "")),
                ),
            )
            .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.descriptors()[1].method_selector().map(|m| m.name.as_str()),
            Some("two")
        );
        assert_ne!(registry.descriptors()[0], registry.descriptors()[1]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = PatchRegistry::new();
        assert!(registry.register(definition("Twice")));
        assert!(!registry.register(definition("Twice")));
        let message = rejection(&mut registry, definition("Twice"));
        assert!(message.contains("already registered"));
    }

    #[test]
    fn invalid_definitions_are_rejected() {
        let mut registry = PatchRegistry::new();

        let message = rejection(&mut registry, PatchDefinition::new("NoTarget"));
        assert!(message.contains("Missing target"));

        let message = rejection(
            &mut registry,
            definition("Abstract").action(PatchAction::abstract_action("a", "a")),
        );
        assert!(message.contains("Cannot be abstract"));

        let message = rejection(
            &mut registry,
            definition("NoInstance")
                .abstract_definition()
                .action(PatchAction::new("a", "a", noop()).instance()),
        );
        assert!(message.contains("Expected static"));

        let call = InsnSelector::Method(MethodInsnSelector::new("a/B", "c", "()V"));
        let message = rejection(
            &mut registry,
            definition("TwoSelectors").action(
                PatchAction::new("a", "a", Executable::method_insn(|_, _, _, _| Ok(())))
                    .insn(call.clone())
                    .insn(call.clone()),
            ),
        );
        assert!(message.contains("multiple instruction selectors"));

        let message = rejection(
            &mut registry,
            definition("WrongShape").action(PatchAction::new("a", "a", noop()).insn(call)),
        );
        assert!(message.contains("Expected (ClassFile, MethodNode, MethodInsn)"));
        assert!(registry.is_empty());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut registry = PatchRegistry::new();

        let message = rejection(
            &mut registry,
            definition("Kind").setting(SettingField::string("n", "n").kind(ValueKind::Boolean)),
        );
        assert!(message.contains("Expected String but found Boolean"));

        let message = rejection(
            &mut registry,
            definition("Instance")
                .abstract_definition()
                .setting(SettingField::string("n", "n").instance()),
        );
        assert!(message.contains("Expected static"));

        let message = rejection(
            &mut registry,
            definition("Constant").setting(SettingField::string("n", "n").constant()),
        );
        assert!(message.contains("Constant"));
    }

    #[test]
    fn settings_are_bound_by_context() {
        let settings = MapSettings::new()
            .with("patch.test.shared", "from config")
            .with("patch.test.blank", "  ");
        let mut registry = PatchRegistry::with_settings(Arc::new(settings));
        registry
            .add(
                definition("Bound")
                    .setting(SettingField::string("shared", "shared"))
                    .setting(SettingField::string("blank", "blank").default_value("fallback"))
                    .setting(
                        SettingField::string("own", "own")
                            .instance()
                            .default_value("mine"),
                    )
                    .action(PatchAction::new("static", "s", noop()))
                    .action(PatchAction::new("instance", "i", noop()).instance()),
            )
            .unwrap();

        let statics = registry.descriptors()[0].bindings();
        assert_eq!(statics.get("shared"), Some("from config"));
        assert_eq!(statics.get("blank"), Some("fallback"));
        assert_eq!(statics.get("own"), None);

        let instance = registry.descriptors()[1].bindings();
        assert_eq!(instance.get("shared"), Some("from config"));
        assert_eq!(instance.get("own"), Some("mine"));
        assert_eq!(instance.len(), 3);
    }

    #[test]
    fn clear_keeps_names() {
        let mut registry = PatchRegistry::new();
        registry
            .add(definition("Once").action(PatchAction::new("a", "a", noop())))
            .unwrap();
        registry.clear();
        assert!(registry.is_empty());
        assert!(!registry.register(definition("Once")));
    }

    #[test]
    fn field_shape_matches_field_selector() {
        let mut registry = PatchRegistry::new();
        let accepted = registry.register(
            definition("Field").action(
                PatchAction::new("a", "a", Executable::field_insn(|_, _, _, _| Ok(())))
                    .insn(InsnSelector::Field(crate::patch::FieldInsnSelector::new(
                        "a/B", "c",
                    ))),
            ),
        );
        assert!(accepted);

        let rejected = registry.register(
            definition("Mismatch").action(
                PatchAction::new("a", "a", Executable::field_insn(|_, _, _, _| Ok(())))
                    .insn(InsnSelector::Method(
                        MethodInsnSelector::new("a/B", "c", "()V").opcode(INVOKESTATIC),
                    )),
            ),
        );
        assert!(!rejected);
    }
}
