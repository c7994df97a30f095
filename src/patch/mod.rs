//! Patch definitions and their registry.
//!
//! A [`PatchDefinition`] is the declarative form of a patch: a [`TargetSelector`] naming the
//! classes it applies to, string [`SettingField`]s bound from configuration, and member
//! [`PatchAction`]s. Each action carries method selectors, at most one instruction selector, an
//! enablement flag label and an [`Executable`] whose [`ActionShape`] must fit the selector.
//!
//! The [`PatchRegistry`] validates definitions once, up front, and turns every action into
//! immutable [`PatchDescriptor`]s with their flags and settings already resolved. Nothing about a
//! definition is checked again while classes are transformed.
//!
//! # Setting paths
//!
//! Flags and settings are looked up under `patch.<category>.<label>`, see [`setting_path`]. A
//! flag that is absent reads as disabled.

mod definition;
mod descriptor;
mod registry;
pub mod selector;
mod settings;

pub use definition::{
    ActionShape, Bindings, Context, Executable, FieldInsnFn, FieldInsnSite, MethodFn,
    MethodInsnFn, MethodInsnSite, PatchAction, PatchDefinition, SettingField, ValueKind,
};
pub use descriptor::PatchDescriptor;
pub use registry::PatchRegistry;
pub use selector::{
    FieldInsnSelector, InsnSelector, MethodInsnSelector, MethodSelector, TargetSelector,
};
pub use settings::{setting_path, MapSettings, Settings, SETTING_PREFIX};
