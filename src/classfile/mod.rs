//! The in-memory class file model.
//!
//! [`ClassFile`] is a mutable, tree-shaped view of a JVM class file: header, fields, methods and
//! attributes with every constant pool reference already resolved to its text. Patch actions edit
//! this tree directly; the [`ClassWriter`] serializes it back into bytes.
//!
//! # Fidelity
//!
//! The model is built to disturb unpatched parts of a class as little as possible:
//!
//! - the original constant pool is written back unchanged, new constants are appended,
//! - method bodies are decoded only when a patch action asks for them, and bodies that were never
//!   decoded are written back byte for byte (including their debug attributes and frames),
//! - attributes the model does not interpret are kept as raw [`Attribute`]s.
//!
//! # Examples
//!
//! ```rust,no_run
//! use classmend::classfile::{ClassFile, ClassWriter};
//!
//! let bytes = std::fs::read("Example.class")?;
//! let mut class = ClassFile::parse(&bytes)?;
//! class.methods.retain(|method| method.name != "debugDump");
//! let patched = ClassWriter::new().write(&class)?;
//! # Ok::<(), classmend::Error>(())
//! ```

pub mod access;
pub mod builder;
pub mod code;
pub mod constant;
pub mod mutf8;

mod reader;
mod writer;

use std::{fmt, sync::Arc};

pub use access::{ClassAccess, FieldAccess, MethodAccess};
pub use builder::ClassBuilder;
pub use code::{internal_name, Code, CommonSuperclass, Insn, InsnList, Label, TryCatchBlock};
pub use constant::{Constant, ConstantPool};
pub use reader::{read_header, ClassHeader};
pub use writer::ClassWriter;

use crate::Result;

use constant::PoolCheckpoint;

/// The `0xCAFEBABE` magic every class file starts with.
pub const MAGIC: u32 = 0xCAFE_BABE;

/// Class file format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassVersion {
    /// Major version, 52 for Java 8
    pub major: u16,
    /// Minor version
    pub minor: u16,
}

impl ClassVersion {
    /// Java 5, the last version without stack map frames.
    pub const JAVA_5: ClassVersion = ClassVersion {
        major: 49,
        minor: 0,
    };
    /// Java 8.
    pub const JAVA_8: ClassVersion = ClassVersion {
        major: 52,
        minor: 0,
    };
    /// Java 17.
    pub const JAVA_17: ClassVersion = ClassVersion {
        major: 61,
        minor: 0,
    };
}

impl fmt::Display for ClassVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// An attribute the model keeps as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name
    pub name: String,
    /// Attribute contents, excluding name and length
    pub data: Vec<u8>,
}

/// A field declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldNode {
    /// Access flags
    pub access: FieldAccess,
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// Generic signature
    pub signature: Option<String>,
    /// Uninterpreted attributes
    pub attributes: Vec<Attribute>,
}

impl FieldNode {
    /// Creates a field without attributes.
    #[must_use]
    pub fn new(access: FieldAccess, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        FieldNode {
            access,
            name: name.into(),
            descriptor: descriptor.into(),
            signature: None,
            attributes: Vec::new(),
        }
    }
}

/// A method declaration and its body.
#[derive(Debug, Clone)]
pub struct MethodNode {
    /// Access flags
    pub access: MethodAccess,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Generic signature
    pub signature: Option<String>,
    /// Internal names of the declared exceptions
    pub exceptions: Vec<String>,
    /// Uninterpreted attributes
    pub attributes: Vec<Attribute>,
    raw_code: Option<Arc<[u8]>>,
    code: Option<Code>,
    modified: bool,
}

impl MethodNode {
    /// Creates a method without body.
    #[must_use]
    pub fn new(access: MethodAccess, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        MethodNode {
            access,
            name: name.into(),
            descriptor: descriptor.into(),
            signature: None,
            exceptions: Vec::new(),
            attributes: Vec::new(),
            raw_code: None,
            code: None,
            modified: false,
        }
    }

    /// Returns `true` if the method has a body, decoded or not.
    #[must_use]
    pub fn has_code(&self) -> bool {
        self.code.is_some() || self.raw_code.is_some()
    }

    /// Returns the decoded body.
    ///
    /// `None` for abstract and native methods, and for bodies not yet decoded through
    /// [`MethodNode::load_code`].
    #[must_use]
    pub fn code(&self) -> Option<&Code> {
        self.code.as_ref()
    }

    /// Returns the decoded body for modification.
    ///
    /// The method is re-assembled on write from then on, whether or not the body changed.
    pub fn code_mut(&mut self) -> Option<&mut Code> {
        if self.code.is_some() {
            self.modified = true;
        }
        self.code.as_mut()
    }

    /// Replaces the body.
    pub fn set_code(&mut self, code: Code) {
        self.code = Some(code);
        self.raw_code = None;
        self.modified = true;
    }

    /// Empties the body and returns it for refilling.
    ///
    /// Works on bodies that were never decoded as well; the original bytecode is discarded.
    pub fn clear_body(&mut self) -> &mut Code {
        self.raw_code = None;
        self.modified = true;
        let code = self.code.get_or_insert_with(Code::default);
        code.clear();
        code.max_stack = 0;
        code.max_locals = 0;
        code
    }

    /// Removes the body, e.g. before turning a method abstract.
    pub fn remove_code(&mut self) {
        self.code = None;
        self.raw_code = None;
        self.modified = true;
    }

    /// Returns `true` if the body has been handed out for modification or replaced.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Decodes the body against the pool of its class, if that did not happen yet.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for bytecode that cannot be decoded.
    pub fn load_code(&mut self, pool: &ConstantPool) -> Result<()> {
        if self.code.is_none() {
            if let Some(raw) = &self.raw_code {
                self.code = Some(reader::read_code(raw, pool)?);
            }
        }
        Ok(())
    }

    pub(crate) fn raw_code(&self) -> Option<&[u8]> {
        self.raw_code.as_deref()
    }
}

/// A parsed class file.
#[derive(Debug, Clone)]
pub struct ClassFile {
    /// Format version
    pub version: ClassVersion,
    /// Access flags
    pub access: ClassAccess,
    /// Internal name, e.g. `java/lang/String`
    pub name: String,
    /// Internal name of the superclass, `None` only for `java/lang/Object` and modules
    pub super_name: Option<String>,
    /// Internal names of the directly implemented interfaces
    pub interfaces: Vec<String>,
    /// Generic signature
    pub signature: Option<String>,
    /// Declared fields
    pub fields: Vec<FieldNode>,
    /// Declared methods
    pub methods: Vec<MethodNode>,
    /// Uninterpreted class attributes
    pub attributes: Vec<Attribute>,
    /// The constant pool, original entries first
    pub pool: ConstantPool,
}

impl ClassFile {
    /// Parses a complete class file.
    ///
    /// Method bodies are kept encoded until [`MethodNode::load_code`] is called.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for anything that is
    /// not a well-formed class file.
    pub fn parse(data: &[u8]) -> Result<ClassFile> {
        reader::read_class(data)
    }

    /// Creates an empty class.
    #[must_use]
    pub fn new(
        version: ClassVersion,
        access: ClassAccess,
        name: impl Into<String>,
        super_name: Option<&str>,
    ) -> ClassFile {
        ClassFile {
            version,
            access,
            name: name.into(),
            super_name: super_name.map(str::to_string),
            interfaces: Vec::new(),
            signature: None,
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
            pool: ConstantPool::new(),
        }
    }

    /// Returns `true` for interfaces and annotation types.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.access.contains(ClassAccess::INTERFACE)
    }

    /// Looks up a method by name and descriptor.
    #[must_use]
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodNode> {
        self.methods
            .iter()
            .find(|method| method.name == name && method.descriptor == descriptor)
    }

    /// Looks up a method by name and descriptor for modification.
    pub fn method_mut(&mut self, name: &str, descriptor: &str) -> Option<&mut MethodNode> {
        self.methods
            .iter_mut()
            .find(|method| method.name == name && method.descriptor == descriptor)
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldNode> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Captures the class for a later [`ClassFile::restore`].
    ///
    /// Undecoded method bodies are shared, not copied, and the constant pool is only measured.
    pub(crate) fn snapshot(&self) -> ClassSnapshot {
        ClassSnapshot {
            version: self.version,
            access: self.access,
            name: self.name.clone(),
            super_name: self.super_name.clone(),
            interfaces: self.interfaces.clone(),
            signature: self.signature.clone(),
            fields: self.fields.clone(),
            methods: self.methods.clone(),
            attributes: self.attributes.clone(),
            pool: self.pool.checkpoint(),
        }
    }

    /// Puts the class back into the state captured by `snapshot`.
    ///
    /// # Errors
    /// Fails if the constant pool was replaced since the snapshot; the class is left as is.
    pub(crate) fn restore(&mut self, snapshot: ClassSnapshot) -> Result<()> {
        self.pool.rollback(&snapshot.pool)?;
        self.version = snapshot.version;
        self.access = snapshot.access;
        self.name = snapshot.name;
        self.super_name = snapshot.super_name;
        self.interfaces = snapshot.interfaces;
        self.signature = snapshot.signature;
        self.fields = snapshot.fields;
        self.methods = snapshot.methods;
        self.attributes = snapshot.attributes;
        Ok(())
    }
}

/// Saved state of a [`ClassFile`], see [`ClassFile::snapshot`].
pub(crate) struct ClassSnapshot {
    version: ClassVersion,
    access: ClassAccess,
    name: String,
    super_name: Option<String>,
    interfaces: Vec<String>,
    signature: Option<String>,
    fields: Vec<FieldNode>,
    methods: Vec<MethodNode>,
    attributes: Vec<Attribute>,
    pool: PoolCheckpoint,
}
