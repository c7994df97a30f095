//! Fluent construction of class files.
//!
//! [`ClassBuilder`] assembles small classes from symbolic instructions. It is the quickest way to
//! produce input for the transformation pipeline, and the hierarchy fixtures of the test suite
//! are built with it.
//!
//! ```rust
//! use classmend::classfile::{
//!     code::{opcodes::*, Insn},
//!     ClassBuilder, ClassFile, MethodAccess,
//! };
//!
//! let bytes = ClassBuilder::new("com/acme/Greeter")
//!     .constructor()
//!     .method(
//!         MethodAccess::PUBLIC,
//!         "greet",
//!         "()Ljava/lang/String;",
//!         [Insn::ldc_string("hello"), Insn::op(ARETURN)],
//!     )
//!     .build()?;
//!
//! let class = ClassFile::parse(&bytes)?;
//! assert!(class.method("greet", "()Ljava/lang/String;").is_some());
//! # Ok::<(), classmend::Error>(())
//! ```

use crate::{
    classfile::{
        code::{opcodes::*, Code, CommonSuperclass, Insn, InsnList},
        ClassAccess, ClassFile, ClassVersion, ClassWriter, FieldAccess, FieldNode, MethodAccess,
        MethodNode,
    },
    Result,
};

/// Builder for [`ClassFile`]s.
#[derive(Debug, Clone)]
pub struct ClassBuilder {
    class: ClassFile,
}

impl ClassBuilder {
    /// Starts a public class extending `java/lang/Object`, in Java 8 format.
    #[must_use]
    pub fn new(name: &str) -> Self {
        ClassBuilder {
            class: ClassFile::new(
                ClassVersion::JAVA_8,
                ClassAccess::PUBLIC | ClassAccess::SUPER,
                name,
                Some("java/lang/Object"),
            ),
        }
    }

    /// Sets the class file version.
    #[must_use]
    pub fn version(mut self, version: ClassVersion) -> Self {
        self.class.version = version;
        self
    }

    /// Replaces the access flags.
    #[must_use]
    pub fn access(mut self, access: ClassAccess) -> Self {
        self.class.access = access;
        self
    }

    /// Turns the class into an interface.
    #[must_use]
    pub fn interface_type(mut self) -> Self {
        self.class.access = ClassAccess::PUBLIC | ClassAccess::INTERFACE | ClassAccess::ABSTRACT;
        self
    }

    /// Sets the superclass.
    #[must_use]
    pub fn super_name(mut self, name: &str) -> Self {
        self.class.super_name = Some(name.to_string());
        self
    }

    /// Removes the superclass, as for `java/lang/Object` itself.
    #[must_use]
    pub fn no_super(mut self) -> Self {
        self.class.super_name = None;
        self
    }

    /// Adds a directly implemented interface.
    #[must_use]
    pub fn interface(mut self, name: &str) -> Self {
        self.class.interfaces.push(name.to_string());
        self
    }

    /// Sets the generic signature.
    #[must_use]
    pub fn signature(mut self, signature: &str) -> Self {
        self.class.signature = Some(signature.to_string());
        self
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, access: FieldAccess, name: &str, descriptor: &str) -> Self {
        self.class.fields.push(FieldNode::new(access, name, descriptor));
        self
    }

    /// Adds a method whose body is the straight-line sequence `insns`.
    #[must_use]
    pub fn method(
        self,
        access: MethodAccess,
        name: &str,
        descriptor: &str,
        insns: impl IntoIterator<Item = Insn>,
    ) -> Self {
        let code = Code {
            instructions: InsnList::from_iter(insns),
            ..Code::default()
        };
        self.method_with_code(access, name, descriptor, code)
    }

    /// Adds a method with a prepared body, for code with branches or exception handlers.
    #[must_use]
    pub fn method_with_code(
        mut self,
        access: MethodAccess,
        name: &str,
        descriptor: &str,
        code: Code,
    ) -> Self {
        let mut method = MethodNode::new(access, name, descriptor);
        method.set_code(code);
        self.class.methods.push(method);
        self
    }

    /// Declares `exceptions` on the most recently added method.
    #[must_use]
    pub fn throwing(mut self, exceptions: &[&str]) -> Self {
        if let Some(method) = self.class.methods.last_mut() {
            method
                .exceptions
                .extend(exceptions.iter().map(|name| (*name).to_string()));
        }
        self
    }

    /// Adds a public abstract method.
    #[must_use]
    pub fn abstract_method(mut self, name: &str, descriptor: &str) -> Self {
        self.class.methods.push(MethodNode::new(
            MethodAccess::PUBLIC | MethodAccess::ABSTRACT,
            name,
            descriptor,
        ));
        self
    }

    /// Adds a public no-argument constructor that calls the superclass constructor.
    #[must_use]
    pub fn constructor(self) -> Self {
        let parent = self
            .class
            .super_name
            .clone()
            .unwrap_or_else(|| "java/lang/Object".to_string());
        self.method(
            MethodAccess::PUBLIC,
            "<init>",
            "()V",
            [
                Insn::var(ALOAD, 0),
                Insn::method(INVOKESPECIAL, parent, "<init>", "()V"),
                Insn::op(RETURN),
            ],
        )
    }

    /// Returns the class model.
    #[must_use]
    pub fn build_class(self) -> ClassFile {
        self.class
    }

    /// Serializes the class, merging reference types to `java/lang/Object`.
    ///
    /// # Errors
    /// Fails if a method body cannot be assembled.
    pub fn build(self) -> Result<Vec<u8>> {
        ClassWriter::new().write(&self.class)
    }

    /// Serializes the class, merging reference types through `hierarchy`.
    ///
    /// # Errors
    /// Fails if a method body cannot be assembled or `hierarchy` fails.
    pub fn build_with(self, hierarchy: &dyn CommonSuperclass) -> Result<Vec<u8>> {
        ClassWriter::with_frames(hierarchy).write(&self.class)
    }
}
