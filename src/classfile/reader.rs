//! Class file deserialization.

use crate::{
    classfile::{
        access::{ClassAccess, FieldAccess, MethodAccess},
        code::{
            decoder::{decode, RawHandler},
            Code,
        },
        constant::ConstantPool,
        Attribute, ClassFile, ClassVersion, FieldNode, MethodNode, MAGIC,
    },
    file::parser::Parser,
    Result,
};

/// The part of a class file that describes its place in the type hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHeader {
    /// Format version
    pub version: ClassVersion,
    /// Access flags
    pub access: ClassAccess,
    /// Internal name
    pub name: String,
    /// Internal name of the superclass
    pub super_name: Option<String>,
    /// Internal names of the directly implemented interfaces
    pub interfaces: Vec<String>,
}

/// Reads the header of a class file, skipping its members.
///
/// ```rust,no_run
/// use classmend::classfile::read_header;
///
/// let header = read_header(&std::fs::read("Example.class")?)?;
/// println!("{} extends {:?}", header.name, header.super_name);
/// # Ok::<(), classmend::Error>(())
/// ```
///
/// # Errors
/// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for truncated or invalid
/// input.
pub fn read_header(data: &[u8]) -> Result<ClassHeader> {
    let mut parser = Parser::new(data);
    let (header, _) = read_header_with_pool(&mut parser)?;
    Ok(header)
}

fn read_header_with_pool(parser: &mut Parser) -> Result<(ClassHeader, ConstantPool)> {
    let magic = parser.read_be::<u32>()?;
    if magic != MAGIC {
        return Err(malformed_error!("Invalid magic {:#010x}", magic));
    }

    let minor = parser.read_be::<u16>()?;
    let major = parser.read_be::<u16>()?;
    if major < 45 {
        return Err(malformed_error!("Unsupported class file version {}.{}", major, minor));
    }

    let pool = ConstantPool::parse(parser)?;
    let access = ClassAccess::from_bits_retain(parser.read_be::<u16>()?);
    let name = pool.class_name(parser.read_be::<u16>()?)?.to_string();
    let super_index = parser.read_be::<u16>()?;
    let super_name = if super_index == 0 {
        None
    } else {
        Some(pool.class_name(super_index)?.to_string())
    };

    let count = parser.read_be::<u16>()?;
    let mut interfaces = Vec::with_capacity(count as usize);
    for _ in 0..count {
        interfaces.push(pool.class_name(parser.read_be::<u16>()?)?.to_string());
    }

    Ok((
        ClassHeader {
            version: ClassVersion { major, minor },
            access,
            name,
            super_name,
            interfaces,
        },
        pool,
    ))
}

fn read_attributes(parser: &mut Parser, pool: &ConstantPool) -> Result<Vec<Attribute>> {
    let count = parser.read_be::<u16>()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = pool.utf8(parser.read_be::<u16>()?)?.to_string();
        let length = parser.read_be::<u32>()?;
        let data = parser.read_bytes(length as usize)?.to_vec();
        attributes.push(Attribute { name, data });
    }
    Ok(attributes)
}

fn signature(data: &[u8], pool: &ConstantPool) -> Result<String> {
    let mut parser = Parser::new(data);
    Ok(pool.utf8(parser.read_be::<u16>()?)?.to_string())
}

/// Moves the `Signature` attribute out of `attributes`.
fn take_signature(attributes: &mut Vec<Attribute>, pool: &ConstantPool) -> Result<Option<String>> {
    match attributes.iter().position(|a| a.name == "Signature") {
        Some(index) => {
            let attribute = attributes.remove(index);
            Ok(Some(signature(&attribute.data, pool)?))
        }
        None => Ok(None),
    }
}

fn read_field(parser: &mut Parser, pool: &ConstantPool) -> Result<FieldNode> {
    let access = FieldAccess::from_bits_retain(parser.read_be::<u16>()?);
    let name = pool.utf8(parser.read_be::<u16>()?)?.to_string();
    let descriptor = pool.utf8(parser.read_be::<u16>()?)?.to_string();
    let mut attributes = read_attributes(parser, pool)?;
    let signature = take_signature(&mut attributes, pool)?;

    Ok(FieldNode {
        access,
        name,
        descriptor,
        signature,
        attributes,
    })
}

fn read_method(parser: &mut Parser, pool: &ConstantPool) -> Result<MethodNode> {
    let access = MethodAccess::from_bits_retain(parser.read_be::<u16>()?);
    let name = pool.utf8(parser.read_be::<u16>()?)?.to_string();
    let descriptor = pool.utf8(parser.read_be::<u16>()?)?.to_string();
    let mut attributes = read_attributes(parser, pool)?;
    let signature = take_signature(&mut attributes, pool)?;

    let mut method = MethodNode::new(access, name, descriptor);
    method.signature = signature;

    let mut kept = Vec::with_capacity(attributes.len());
    for attribute in attributes {
        match attribute.name.as_str() {
            "Code" => method.raw_code = Some(attribute.data.into()),
            "Exceptions" => {
                let mut exceptions = Parser::new(&attribute.data);
                let count = exceptions.read_be::<u16>()?;
                for _ in 0..count {
                    method
                        .exceptions
                        .push(pool.class_name(exceptions.read_be::<u16>()?)?.to_string());
                }
            }
            _ => kept.push(attribute),
        }
    }
    method.attributes = kept;
    Ok(method)
}

pub(crate) fn read_class(data: &[u8]) -> Result<ClassFile> {
    let mut parser = Parser::new(data);
    let (header, pool) = read_header_with_pool(&mut parser)?;

    let count = parser.read_be::<u16>()?;
    let mut fields = Vec::with_capacity(count as usize);
    for _ in 0..count {
        fields.push(read_field(&mut parser, &pool)?);
    }

    let count = parser.read_be::<u16>()?;
    let mut methods = Vec::with_capacity(count as usize);
    for _ in 0..count {
        methods.push(read_method(&mut parser, &pool)?);
    }

    let mut attributes = read_attributes(&mut parser, &pool)?;
    let signature = take_signature(&mut attributes, &pool)?;

    if parser.has_more_data() {
        return Err(malformed_error!(
            "{} trailing bytes after class {}",
            parser.remaining(),
            header.name
        ));
    }

    Ok(ClassFile {
        version: header.version,
        access: header.access,
        name: header.name,
        super_name: header.super_name,
        interfaces: header.interfaces,
        signature,
        fields,
        methods,
        attributes,
        pool,
    })
}

/// Decodes the contents of a `Code` attribute.
pub(crate) fn read_code(data: &[u8], pool: &ConstantPool) -> Result<Code> {
    let mut parser = Parser::new(data);
    let max_stack = parser.read_be::<u16>()?;
    let max_locals = parser.read_be::<u16>()?;
    let length = parser.read_be::<u32>()?;
    if length == 0 || length > 65535 {
        return Err(malformed_error!("Invalid code length {}", length));
    }
    let bytecode = parser.read_bytes(length as usize)?;

    let count = parser.read_be::<u16>()?;
    let mut handlers = Vec::with_capacity(count as usize);
    for _ in 0..count {
        handlers.push(RawHandler {
            start: parser.read_be::<u16>()?,
            end: parser.read_be::<u16>()?,
            handler: parser.read_be::<u16>()?,
            catch_type: parser.read_be::<u16>()?,
        });
    }

    decode(bytecode, &handlers, pool, max_stack, max_locals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{
        code::{opcodes::*, Insn},
        ClassBuilder,
    };

    #[test]
    fn header_only() {
        let bytes = ClassBuilder::new("com/acme/Widget")
            .super_name("com/acme/Base")
            .interface("java/lang/Runnable")
            .build()
            .unwrap();
        let header = read_header(&bytes).unwrap();
        assert_eq!(header.name, "com/acme/Widget");
        assert_eq!(header.super_name.as_deref(), Some("com/acme/Base"));
        assert_eq!(header.interfaces, vec!["java/lang/Runnable".to_string()]);
        assert_eq!(header.version, ClassVersion::JAVA_8);
    }

    #[test]
    fn members_and_lazy_code() {
        let bytes = ClassBuilder::new("com/acme/Widget")
            .field(FieldAccess::PRIVATE, "count", "I")
            .method(
                MethodAccess::PUBLIC,
                "size",
                "()I",
                vec![
                    Insn::var(ALOAD, 0),
                    Insn::field(GETFIELD, "com/acme/Widget", "count", "I"),
                    Insn::op(IRETURN),
                ],
            )
            .abstract_method("close", "()V")
            .build()
            .unwrap();

        let mut class = ClassFile::parse(&bytes).unwrap();
        assert_eq!(class.fields[0].name, "count");
        assert_eq!(class.methods.len(), 2);
        assert!(class.methods[1].access.contains(MethodAccess::ABSTRACT));
        assert!(!class.methods[1].has_code());

        let pool = class.pool.clone();
        let method = &mut class.methods[0];
        assert!(method.code().is_none());
        method.load_code(&pool).unwrap();
        let code = method.code().unwrap();
        assert_eq!(code.instructions.len(), 3);
        assert!(!method.is_modified());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = ClassBuilder::new("a/B").build().unwrap();
        bytes[0] = 0;
        assert!(ClassFile::parse(&bytes).is_err());
        assert!(read_header(&bytes[..6]).is_err());
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = ClassBuilder::new("a/B").build().unwrap();
        bytes.push(0);
        assert!(ClassFile::parse(&bytes).is_err());
    }
}
