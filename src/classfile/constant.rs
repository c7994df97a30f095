//! The constant pool.
//!
//! A parsed [`ConstantPool`] keeps the exact bytes of the pool it was read from. Constants that a
//! rewrite needs and that are not already present are appended behind the original entries, so
//! every index that raw attributes (annotations, bootstrap methods, inner class tables, untouched
//! method bodies) refer to keeps pointing at the same entry after re-serialization.
//!
//! # Examples
//!
//! ```rust
//! use classmend::classfile::ConstantPool;
//!
//! let mut pool = ConstantPool::new();
//! let object = pool.class_index("java/lang/Object")?;
//! assert_eq!(pool.class_index("java/lang/Object")?, object);
//! assert_eq!(pool.class_name(object)?, "java/lang/Object");
//! # Ok::<(), classmend::Error>(())
//! ```

use std::{collections::HashMap, sync::Arc};

use crate::{
    classfile::mutf8,
    file::{io::ByteSink, parser::Parser},
    Error, Result,
};

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_LONG: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELDREF: u8 = 9;
const TAG_METHODREF: u8 = 10;
const TAG_INTERFACE_METHODREF: u8 = 11;
const TAG_NAME_AND_TYPE: u8 = 12;
const TAG_METHOD_HANDLE: u8 = 15;
const TAG_METHOD_TYPE: u8 = 16;
const TAG_DYNAMIC: u8 = 17;
const TAG_INVOKE_DYNAMIC: u8 = 18;
const TAG_MODULE: u8 = 19;
const TAG_PACKAGE: u8 = 20;

/// A single constant pool entry. Indices refer to other entries of the same pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    /// Raw IEEE 754 bits, so that NaN payloads survive and the type stays hashable.
    Float(u32),
    Long(i64),
    /// Raw IEEE 754 bits.
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
}

impl Constant {
    /// Returns `true` for the entries that occupy two pool slots.
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Constant::Utf8(value) => {
                let bytes = mutf8::encode(value);
                let len = u16::try_from(bytes.len())
                    .map_err(|_| Error::CodeTooLarge("string constant".to_string()))?;
                out.put(TAG_UTF8);
                out.put(len);
                out.put_bytes(&bytes);
            }
            Constant::Integer(value) => {
                out.put(TAG_INTEGER);
                out.put(*value);
            }
            Constant::Float(bits) => {
                out.put(TAG_FLOAT);
                out.put(*bits);
            }
            Constant::Long(value) => {
                out.put(TAG_LONG);
                out.put(*value);
            }
            Constant::Double(bits) => {
                out.put(TAG_DOUBLE);
                out.put(*bits);
            }
            Constant::Class(index) => {
                out.put(TAG_CLASS);
                out.put(*index);
            }
            Constant::String(index) => {
                out.put(TAG_STRING);
                out.put(*index);
            }
            Constant::FieldRef {
                class,
                name_and_type,
            } => {
                out.put(TAG_FIELDREF);
                out.put(*class);
                out.put(*name_and_type);
            }
            Constant::MethodRef {
                class,
                name_and_type,
            } => {
                out.put(TAG_METHODREF);
                out.put(*class);
                out.put(*name_and_type);
            }
            Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => {
                out.put(TAG_INTERFACE_METHODREF);
                out.put(*class);
                out.put(*name_and_type);
            }
            Constant::NameAndType { name, descriptor } => {
                out.put(TAG_NAME_AND_TYPE);
                out.put(*name);
                out.put(*descriptor);
            }
            Constant::MethodHandle { kind, reference } => {
                out.put(TAG_METHOD_HANDLE);
                out.put(*kind);
                out.put(*reference);
            }
            Constant::MethodType(index) => {
                out.put(TAG_METHOD_TYPE);
                out.put(*index);
            }
            Constant::Dynamic {
                bootstrap,
                name_and_type,
            } => {
                out.put(TAG_DYNAMIC);
                out.put(*bootstrap);
                out.put(*name_and_type);
            }
            Constant::InvokeDynamic {
                bootstrap,
                name_and_type,
            } => {
                out.put(TAG_INVOKE_DYNAMIC);
                out.put(*bootstrap);
                out.put(*name_and_type);
            }
            Constant::Module(index) => {
                out.put(TAG_MODULE);
                out.put(*index);
            }
            Constant::Package(index) => {
                out.put(TAG_PACKAGE);
                out.put(*index);
            }
        }
        Ok(())
    }

    fn read(parser: &mut Parser) -> Result<Constant> {
        let tag = parser.read_be::<u8>()?;
        let constant = match tag {
            TAG_UTF8 => {
                let len = parser.read_be::<u16>()?;
                Constant::Utf8(mutf8::decode(parser.read_bytes(len as usize)?)?)
            }
            TAG_INTEGER => Constant::Integer(parser.read_be()?),
            TAG_FLOAT => Constant::Float(parser.read_be()?),
            TAG_LONG => Constant::Long(parser.read_be()?),
            TAG_DOUBLE => Constant::Double(parser.read_be()?),
            TAG_CLASS => Constant::Class(parser.read_be()?),
            TAG_STRING => Constant::String(parser.read_be()?),
            TAG_FIELDREF => Constant::FieldRef {
                class: parser.read_be()?,
                name_and_type: parser.read_be()?,
            },
            TAG_METHODREF => Constant::MethodRef {
                class: parser.read_be()?,
                name_and_type: parser.read_be()?,
            },
            TAG_INTERFACE_METHODREF => Constant::InterfaceMethodRef {
                class: parser.read_be()?,
                name_and_type: parser.read_be()?,
            },
            TAG_NAME_AND_TYPE => Constant::NameAndType {
                name: parser.read_be()?,
                descriptor: parser.read_be()?,
            },
            TAG_METHOD_HANDLE => Constant::MethodHandle {
                kind: parser.read_be()?,
                reference: parser.read_be()?,
            },
            TAG_METHOD_TYPE => Constant::MethodType(parser.read_be()?),
            TAG_DYNAMIC => Constant::Dynamic {
                bootstrap: parser.read_be()?,
                name_and_type: parser.read_be()?,
            },
            TAG_INVOKE_DYNAMIC => Constant::InvokeDynamic {
                bootstrap: parser.read_be()?,
                name_and_type: parser.read_be()?,
            },
            TAG_MODULE => Constant::Module(parser.read_be()?),
            TAG_PACKAGE => Constant::Package(parser.read_be()?),
            _ => return Err(malformed_error!("Unknown constant pool tag {}", tag)),
        };
        Ok(constant)
    }
}

/// Resolved view of a field or method reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    /// Internal name of the declaring type
    pub owner: &'a str,
    /// Member name
    pub name: &'a str,
    /// Member descriptor
    pub descriptor: &'a str,
    /// `true` for `CONSTANT_InterfaceMethodref`
    pub interface: bool,
}

/// The constant pool of one class file.
///
/// Slot 0 and the second slot of long/double entries are unusable and hold `None`.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<Option<Constant>>,
    lookup: HashMap<Constant, u16>,
    original: Arc<[u8]>,
    appended: Vec<u8>,
}

/// The size of a pool at one point in time, see [`ConstantPool::checkpoint`].
#[derive(Debug, Clone)]
pub(crate) struct PoolCheckpoint {
    original: Arc<[u8]>,
    entries: usize,
    appended: usize,
}

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool::new()
    }
}

impl ConstantPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> ConstantPool {
        ConstantPool {
            entries: vec![None],
            lookup: HashMap::new(),
            original: Arc::from(Vec::new()),
            appended: Vec::new(),
        }
    }

    /// Reads a pool, starting at its `constant_pool_count`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown tags or invalid text, and
    /// [`crate::Error::OutOfBounds`] for truncated input.
    pub fn parse(parser: &mut Parser) -> Result<ConstantPool> {
        let count = parser.read_be::<u16>()?;
        if count == 0 {
            return Err(malformed_error!("Constant pool count must be at least 1"));
        }

        let start = parser.pos();
        let mut pool = ConstantPool::new();
        pool.entries.reserve(count as usize);

        while pool.entries.len() < count as usize {
            let index = pool.entries.len() as u16;
            let constant = Constant::read(parser)?;
            let wide = constant.is_wide();
            pool.lookup.entry(constant.clone()).or_insert(index);
            pool.entries.push(Some(constant));
            if wide {
                pool.entries.push(None);
            }
        }

        if pool.entries.len() != count as usize {
            return Err(malformed_error!("Wide constant overruns the constant pool"));
        }

        pool.original = Arc::from(&parser.data()[start..parser.pos()]);
        Ok(pool)
    }

    /// Returns the `constant_pool_count`, one more than the highest usable index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the pool has no usable entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Returns the entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the index designates no entry.
    pub fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(index as usize) {
            Some(Some(constant)) => Ok(constant),
            _ => Err(malformed_error!("Invalid constant pool index {}", index)),
        }
    }

    /// Returns the text of the `CONSTANT_Utf8` entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value),
            other => Err(malformed_error!(
                "Expected Utf8 at index {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Returns the internal name of the `CONSTANT_Class` entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            other => Err(malformed_error!(
                "Expected Class at index {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Returns `(name, descriptor)` of the `CONSTANT_NameAndType` entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            other => Err(malformed_error!(
                "Expected NameAndType at index {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Resolves a field, method or interface method reference.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn member_ref(&self, index: u16) -> Result<MemberRef<'_>> {
        let (class, name_and_type, interface) = match self.get(index)? {
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type, false),
            Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type, true),
            other => {
                return Err(malformed_error!(
                    "Expected member reference at index {}, found {:?}",
                    index,
                    other
                ))
            }
        };
        let (name, descriptor) = self.name_and_type(name_and_type)?;
        Ok(MemberRef {
            owner: self.class_name(class)?,
            name,
            descriptor,
            interface,
        })
    }

    /// Returns the index of `constant`, appending it if the pool does not hold it yet.
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeTooLarge`] if the pool would exceed 65535 slots, or for text
    /// longer than 65535 bytes in modified UTF-8.
    pub fn intern(&mut self, constant: Constant) -> Result<u16> {
        if let Some(&index) = self.lookup.get(&constant) {
            return Ok(index);
        }

        let slots = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + slots > usize::from(u16::MAX) {
            return Err(Error::CodeTooLarge("constant pool".to_string()));
        }

        let index = self.entries.len() as u16;
        constant.write(&mut self.appended)?;
        self.lookup.insert(constant.clone(), index);
        self.entries.push(Some(constant));
        if slots == 2 {
            self.entries.push(None);
        }
        Ok(index)
    }

    /// Index of a `CONSTANT_Utf8` entry for `value`.
    ///
    /// # Errors
    /// See [`ConstantPool::intern`].
    pub fn utf8_index(&mut self, value: &str) -> Result<u16> {
        self.intern(Constant::Utf8(value.to_string()))
    }

    /// Index of a `CONSTANT_Class` entry for the internal name (or array descriptor) `name`.
    ///
    /// # Errors
    /// See [`ConstantPool::intern`].
    pub fn class_index(&mut self, name: &str) -> Result<u16> {
        let name = self.utf8_index(name)?;
        self.intern(Constant::Class(name))
    }

    /// Index of a `CONSTANT_String` entry for `value`.
    ///
    /// # Errors
    /// See [`ConstantPool::intern`].
    pub fn string_index(&mut self, value: &str) -> Result<u16> {
        let value = self.utf8_index(value)?;
        self.intern(Constant::String(value))
    }

    /// Index of a `CONSTANT_MethodType` entry for `descriptor`.
    ///
    /// # Errors
    /// See [`ConstantPool::intern`].
    pub fn method_type_index(&mut self, descriptor: &str) -> Result<u16> {
        let descriptor = self.utf8_index(descriptor)?;
        self.intern(Constant::MethodType(descriptor))
    }

    /// Index of a `CONSTANT_NameAndType` entry.
    ///
    /// # Errors
    /// See [`ConstantPool::intern`].
    pub fn name_and_type_index(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.utf8_index(name)?;
        let descriptor = self.utf8_index(descriptor)?;
        self.intern(Constant::NameAndType { name, descriptor })
    }

    /// Index of a `CONSTANT_Fieldref` entry.
    ///
    /// # Errors
    /// See [`ConstantPool::intern`].
    pub fn field_ref_index(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.class_index(owner)?;
        let name_and_type = self.name_and_type_index(name, descriptor)?;
        self.intern(Constant::FieldRef {
            class,
            name_and_type,
        })
    }

    /// Index of a `CONSTANT_Methodref` or `CONSTANT_InterfaceMethodref` entry.
    ///
    /// # Errors
    /// See [`ConstantPool::intern`].
    pub fn method_ref_index(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) -> Result<u16> {
        let class = self.class_index(owner)?;
        let name_and_type = self.name_and_type_index(name, descriptor)?;
        if interface {
            self.intern(Constant::InterfaceMethodRef {
                class,
                name_and_type,
            })
        } else {
            self.intern(Constant::MethodRef {
                class,
                name_and_type,
            })
        }
    }

    /// Returns `true` if constants were appended since the pool was parsed.
    #[must_use]
    pub fn is_extended(&self) -> bool {
        !self.appended.is_empty()
    }

    /// Records the current size, so that later appends can be undone.
    pub(crate) fn checkpoint(&self) -> PoolCheckpoint {
        PoolCheckpoint {
            original: Arc::clone(&self.original),
            entries: self.entries.len(),
            appended: self.appended.len(),
        }
    }

    /// Drops every constant appended after `checkpoint` was taken.
    ///
    /// Fails if the pool is not the one the checkpoint was taken from, or has been replaced by a
    /// smaller one since.
    pub(crate) fn rollback(&mut self, checkpoint: &PoolCheckpoint) -> Result<()> {
        if !Arc::ptr_eq(&self.original, &checkpoint.original)
            || self.entries.len() < checkpoint.entries
            || self.appended.len() < checkpoint.appended
        {
            return Err(Error::Error(
                "Constant pool was replaced and cannot be rolled back".to_string(),
            ));
        }

        let limit = checkpoint.entries;
        self.entries.truncate(limit);
        self.appended.truncate(checkpoint.appended);
        self.lookup.retain(|_, index| usize::from(*index) < limit);
        Ok(())
    }

    /// Writes `constant_pool_count` followed by the original and appended entries.
    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.put(self.entries.len() as u16);
        out.put_bytes(&self.original);
        out.put_bytes(&self.appended);
    }
}
