//! Declarative selectors for classes, methods and instructions.
//!
//! Every field of a selector is optional: an empty string, an empty list or `None` matches
//! anything. See [`crate::matcher`] for the exact matching rules of each field.

use crate::classfile::{ClassAccess, ClassVersion, MethodAccess};

/// Selects the classes a patch definition applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSelector {
    /// Internal class name, or a package prefix ending in `/`
    pub name: String,
    /// Exact class file version
    pub version: Option<ClassVersion>,
    /// Flags the class must have set
    pub access: Option<ClassAccess>,
    /// Exact generic signature
    pub signature: String,
    /// Superclass name, or a package prefix ending in `/`
    pub super_name: String,
    /// Interfaces the class must directly implement
    pub interfaces: Vec<String>,
}

impl TargetSelector {
    /// Selects classes by name or package prefix.
    #[must_use]
    pub fn new(name: &str) -> Self {
        TargetSelector {
            name: name.to_string(),
            ..TargetSelector::default()
        }
    }

    /// Requires an exact class file version.
    #[must_use]
    pub fn version(mut self, version: ClassVersion) -> Self {
        self.version = Some(version);
        self
    }

    /// Requires the access flags in `access`.
    #[must_use]
    pub fn access(mut self, access: ClassAccess) -> Self {
        self.access = Some(access);
        self
    }

    /// Requires an exact generic signature.
    #[must_use]
    pub fn signature(mut self, signature: &str) -> Self {
        self.signature = signature.to_string();
        self
    }

    /// Requires a superclass, or a superclass in a package.
    #[must_use]
    pub fn super_name(mut self, super_name: &str) -> Self {
        self.super_name = super_name.to_string();
        self
    }

    /// Requires a directly implemented interface.
    #[must_use]
    pub fn interface(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }
}

/// Selects the methods an action is applied to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodSelector {
    /// Flags the method must have set
    pub access: Option<MethodAccess>,
    /// Exact method name
    pub name: String,
    /// Full descriptor, parameter fragment `(...)` or return type fragment
    pub descriptor: String,
    /// Exact generic signature
    pub signature: String,
    /// Exceptions the method must declare
    pub exceptions: Vec<String>,
}

impl MethodSelector {
    /// Selects methods by name and descriptor.
    #[must_use]
    pub fn new(name: &str, descriptor: &str) -> Self {
        MethodSelector {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            ..MethodSelector::default()
        }
    }

    /// Requires the access flags in `access`.
    #[must_use]
    pub fn access(mut self, access: MethodAccess) -> Self {
        self.access = Some(access);
        self
    }

    /// Requires an exact generic signature.
    #[must_use]
    pub fn signature(mut self, signature: &str) -> Self {
        self.signature = signature.to_string();
        self
    }

    /// Requires a declared exception.
    #[must_use]
    pub fn exception(mut self, exception: &str) -> Self {
        self.exceptions.push(exception.to_string());
        self
    }
}

/// Selects field access instructions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldInsnSelector {
    /// Exact opcode
    pub opcode: Option<u8>,
    /// Owner name, or a package prefix ending in `/`
    pub owner: String,
    /// Exact field name
    pub name: String,
    /// Exact field descriptor
    pub descriptor: String,
}

impl FieldInsnSelector {
    /// Selects accesses to `owner.name`.
    #[must_use]
    pub fn new(owner: &str, name: &str) -> Self {
        FieldInsnSelector {
            owner: owner.to_string(),
            name: name.to_string(),
            ..FieldInsnSelector::default()
        }
    }

    /// Requires an exact opcode, e.g. `putfield`.
    #[must_use]
    pub fn opcode(mut self, opcode: u8) -> Self {
        self.opcode = Some(opcode);
        self
    }

    /// Requires an exact descriptor.
    #[must_use]
    pub fn descriptor(mut self, descriptor: &str) -> Self {
        self.descriptor = descriptor.to_string();
        self
    }
}

/// Selects method invocation instructions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodInsnSelector {
    /// Exact opcode
    pub opcode: Option<u8>,
    /// Owner name, or a package prefix ending in `/`
    pub owner: String,
    /// Exact method name
    pub name: String,
    /// Full descriptor, parameter fragment `(...)` or return type fragment
    pub descriptor: String,
}

impl MethodInsnSelector {
    /// Selects calls to `owner.name` with `descriptor`.
    #[must_use]
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        MethodInsnSelector {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            ..MethodInsnSelector::default()
        }
    }

    /// Requires an exact opcode, e.g. `invokeinterface`.
    #[must_use]
    pub fn opcode(mut self, opcode: u8) -> Self {
        self.opcode = Some(opcode);
        self
    }
}

/// The instruction selector of an action, one of the supported shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsnSelector {
    /// Field access instructions
    Field(FieldInsnSelector),
    /// Method invocation instructions
    Method(MethodInsnSelector),
}
