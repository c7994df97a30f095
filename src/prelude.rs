//! # classmend Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the classmend library. Import this module to get quick access to everything needed to
//! write patch definitions and wire them up to a host runtime.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all classmend operations
pub use crate::Error;

/// The result type used throughout classmend
pub use crate::Result;

// ================================================================================================
// Class File Model
// ================================================================================================

/// The class file model and its editing helpers
pub use crate::classfile::{
    internal_name, ClassAccess, ClassBuilder, ClassFile, ClassVersion, ClassWriter, Code,
    FieldAccess, FieldNode, Insn, InsnList, Label, MethodAccess, MethodNode, TryCatchBlock,
};

/// Opcode constants for building instructions
pub use crate::classfile::code::opcodes;

// ================================================================================================
// Patching
// ================================================================================================

/// Selectors, definitions and the registry
pub use crate::patch::{
    Bindings, Executable, FieldInsnSelector, FieldInsnSite, InsnSelector, MapSettings,
    MethodInsnSelector, MethodInsnSite, MethodSelector, PatchAction, PatchDefinition,
    PatchDescriptor, PatchRegistry, SettingField, Settings, TargetSelector,
};

/// The pipeline and the hook
pub use crate::{
    hook::{ClassFileHook, ClassFileTransformer},
    transform::{TransformConfig, Transformer},
};

// ================================================================================================
// Type Resolution
// ================================================================================================

/// Resource spaces and the hierarchy resolver
pub use crate::{
    hierarchy::{HierarchyIndex, TypeResolver},
    loader::{BuiltinLoader, ClassLoader, DirectoryLoader, MemoryLoader, TransformingLoader},
};
