//! Selector matching.
//!
//! Stateless predicates deciding whether a selector from [`crate::patch::selector`] applies to a
//! concrete class, method or instruction. Every selector field is optional; an unspecified field
//! (empty string, empty list, `None`) matches anything.
//!
//! | field                 | rule                                                            |
//! |-----------------------|-----------------------------------------------------------------|
//! | class / owner name    | exact, or namespace prefix when the selector ends in `/`        |
//! | superclass name       | as class name                                                   |
//! | access flags          | the subject has every flag of the selector set                  |
//! | version               | exact                                                           |
//! | signature, member name| exact                                                           |
//! | interfaces, exceptions| the subject declares every listed name                          |
//! | method descriptor     | exact, `(...)` parameter prefix, or return suffix               |
//! | field descriptor      | exact                                                           |
//!
//! # Examples
//!
//! ```rust
//! use classmend::matcher::{matches_descriptor, matches_name};
//!
//! assert!(matches_name("com/foo/", "com/foo/Bar"));
//! assert!(!matches_name("com/foo/", "com/foobar/Baz"));
//!
//! assert!(matches_descriptor("(I)", "(I)Ljava/lang/String;"));
//! assert!(matches_descriptor("V", "(Ljava/lang/String;J)V"));
//! assert!(!matches_descriptor("(I)", "(II)V"));
//! ```

use std::collections::HashSet;

use bitflags::Flags;

use crate::{
    classfile::{
        code::insn::{FieldInsn, MethodInsn},
        ClassFile, MethodNode,
    },
    patch::selector::{
        FieldInsnSelector, InsnSelector, MethodInsnSelector, MethodSelector, TargetSelector,
    },
};

/// The namespace separator of internal names.
pub const SEPARATOR: char = '/';

/// Matches a class or owner name.
///
/// An empty selector matches every name. A selector ending in [`SEPARATOR`] matches every name
/// inside that namespace, nested namespaces included. Anything else must match exactly.
#[must_use]
pub fn matches_name(selector: &str, name: &str) -> bool {
    if selector.is_empty() {
        return true;
    }
    if selector.ends_with(SEPARATOR) {
        return name.starts_with(selector);
    }
    selector == name
}

/// Matches a set of access flags: every flag of the selector must be set on the subject.
#[must_use]
pub fn matches_access<F: Flags + Copy>(selector: Option<F>, subject: F) -> bool {
    selector.map_or(true, |required| subject.contains(required))
}

/// Matches a value that is either unspecified or compared exactly.
#[must_use]
pub fn matches_exact(selector: &str, subject: &str) -> bool {
    selector.is_empty() || selector == subject
}

fn matches_optional(selector: &str, subject: Option<&str>) -> bool {
    selector.is_empty() || subject == Some(selector)
}

/// Matches a required subset of names against the names a subject declares.
#[must_use]
pub fn matches_all(selector: &[String], subject: &[String]) -> bool {
    if selector.is_empty() {
        return true;
    }
    let declared: HashSet<&str> = subject.iter().map(String::as_str).collect();
    selector.iter().all(|name| declared.contains(name.as_str()))
}

/// Matches a method descriptor, allowing partial selectors.
///
/// - `""` matches every descriptor,
/// - a parameter fragment such as `(I)` or `(Ljava/lang/String;` ... `)` matches every descriptor
///   with exactly those parameters,
/// - a selector not starting with `(` is a return fragment and matches every descriptor ending
///   with it,
/// - anything else must be equal.
#[must_use]
pub fn matches_descriptor(selector: &str, descriptor: &str) -> bool {
    if selector.is_empty() {
        return true;
    }
    if !selector.starts_with('(') {
        return descriptor.ends_with(selector);
    }
    if selector.ends_with(')') {
        return descriptor.starts_with(selector);
    }
    selector == descriptor
}

/// Cheap pre-check against a class name alone, before the class is parsed.
#[must_use]
pub fn matches_target_name(selector: &TargetSelector, name: &str) -> bool {
    matches_name(&selector.name, name)
}

/// Matches a parsed class against every field of a target selector.
#[must_use]
pub fn matches_class(selector: &TargetSelector, class: &ClassFile) -> bool {
    matches_name(&selector.name, &class.name)
        && selector.version.map_or(true, |version| version == class.version)
        && matches_access(selector.access, class.access)
        && matches_optional(&selector.signature, class.signature.as_deref())
        && (selector.super_name.is_empty()
            || class
                .super_name
                .as_deref()
                .is_some_and(|super_name| matches_name(&selector.super_name, super_name)))
        && matches_all(&selector.interfaces, &class.interfaces)
}

/// Matches a method declaration.
#[must_use]
pub fn matches_method(selector: &MethodSelector, method: &MethodNode) -> bool {
    matches_access(selector.access, method.access)
        && matches_exact(&selector.name, &method.name)
        && matches_descriptor(&selector.descriptor, &method.descriptor)
        && matches_optional(&selector.signature, method.signature.as_deref())
        && matches_all(&selector.exceptions, &method.exceptions)
}

/// Matches a field access instruction. The descriptor has no partial form.
#[must_use]
pub fn matches_field_insn(selector: &FieldInsnSelector, insn: &FieldInsn) -> bool {
    selector.opcode.map_or(true, |opcode| opcode == insn.opcode)
        && matches_name(&selector.owner, &insn.owner)
        && matches_exact(&selector.name, &insn.name)
        && matches_exact(&selector.descriptor, &insn.descriptor)
}

/// Matches a method invocation instruction.
#[must_use]
pub fn matches_method_insn(selector: &MethodInsnSelector, insn: &MethodInsn) -> bool {
    selector.opcode.map_or(true, |opcode| opcode == insn.opcode)
        && matches_name(&selector.owner, &insn.owner)
        && matches_exact(&selector.name, &insn.name)
        && matches_descriptor(&selector.descriptor, &insn.descriptor)
}

/// Matches any instruction against an instruction selector of either shape.
///
/// Instructions of the other shape, and non-member instructions, never match.
#[must_use]
pub fn matches_insn(selector: &InsnSelector, insn: &crate::classfile::Insn) -> bool {
    match selector {
        InsnSelector::Field(selector) => insn
            .as_field()
            .is_some_and(|field| matches_field_insn(selector, field)),
        InsnSelector::Method(selector) => insn
            .as_method()
            .is_some_and(|method| matches_method_insn(selector, method)),
    }
}
