//! Field and method descriptor parsing.

use crate::{file::parser::Parser, Result};

/// A field type as written in a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum FieldType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Float,
    Long,
    Double,
    /// Internal name for class types, the full descriptor for array types
    Reference(String),
}

impl FieldType {
    /// Parses a complete field descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `descriptor` is not exactly one field type.
    pub fn parse(descriptor: &str) -> Result<FieldType> {
        let mut parser = Parser::new(descriptor.as_bytes());
        let field = read_field_type(&mut parser, descriptor)?;
        if parser.has_more_data() {
            return Err(malformed_error!("Trailing data in descriptor {}", descriptor));
        }
        Ok(field)
    }

    /// Number of local variable or operand stack slots a value of this type takes.
    #[must_use]
    pub fn size(&self) -> u16 {
        match self {
            FieldType::Long | FieldType::Double => 2,
            _ => 1,
        }
    }
}

/// Parameter and return types of a method descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// Parameter types in declaration order
    pub params: Vec<FieldType>,
    /// Return type, `None` for `void`
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    /// Parses a method descriptor such as `(ILjava/lang/String;)V`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for anything that is not a method descriptor.
    pub fn parse(descriptor: &str) -> Result<MethodDescriptor> {
        let mut parser = Parser::new(descriptor.as_bytes());
        if parser.read_be::<u8>()? != b'(' {
            return Err(malformed_error!("Invalid method descriptor {}", descriptor));
        }

        let mut params = Vec::new();
        while parser.peek_byte()? != b')' {
            params.push(read_field_type(&mut parser, descriptor)?);
        }
        parser.advance_by(1)?;

        let ret = if parser.peek_byte()? == b'V' {
            parser.advance_by(1)?;
            None
        } else {
            Some(read_field_type(&mut parser, descriptor)?)
        };

        if parser.has_more_data() {
            return Err(malformed_error!("Trailing data in descriptor {}", descriptor));
        }
        Ok(MethodDescriptor { params, ret })
    }

    /// Total slots taken by the parameters, receiver excluded.
    #[must_use]
    pub fn argument_slots(&self) -> u16 {
        self.params.iter().map(FieldType::size).sum()
    }
}

fn read_field_type(parser: &mut Parser, descriptor: &str) -> Result<FieldType> {
    let start = parser.pos();
    let tag = parser.read_be::<u8>()?;
    Ok(match tag {
        b'Z' => FieldType::Boolean,
        b'B' => FieldType::Byte,
        b'C' => FieldType::Char,
        b'S' => FieldType::Short,
        b'I' => FieldType::Int,
        b'F' => FieldType::Float,
        b'J' => FieldType::Long,
        b'D' => FieldType::Double,
        b'L' => {
            let name_start = parser.pos();
            while parser.read_be::<u8>()? != b';' {}
            let name = &descriptor[name_start..parser.pos() - 1];
            if name.is_empty() {
                return Err(malformed_error!("Empty class name in descriptor {}", descriptor));
            }
            FieldType::Reference(name.to_string())
        }
        b'[' => {
            while parser.peek_byte()? == b'[' {
                parser.advance_by(1)?;
            }
            read_field_type(parser, descriptor)?;
            FieldType::Reference(descriptor[start..parser.pos()].to_string())
        }
        _ => {
            return Err(malformed_error!(
                "Invalid type tag {:?} in descriptor {}",
                tag as char,
                descriptor
            ))
        }
    })
}

/// Converts a dotted class name to its internal form.
///
/// ```rust
/// use classmend::classfile::internal_name;
///
/// assert_eq!(internal_name("java.lang.String"), "java/lang/String");
/// ```
#[must_use]
pub fn internal_name(name: &str) -> String {
    name.replace('.', "/")
}
