//! Class file serialization.

use crate::{
    classfile::{
        code::{assemble, CommonSuperclass, MethodContext, ObjectSuperclass},
        constant::ConstantPool,
        Attribute, ClassFile, MAGIC,
    },
    file::io::ByteSink,
    Error, Result,
};

static OBJECT_SUPERCLASS: ObjectSuperclass = ObjectSuperclass;

/// Serializes [`ClassFile`]s.
///
/// Modified method bodies are re-assembled with freshly computed `max_stack`, `max_locals` and
/// stack map frames. Frame computation needs the common supertype of any two reference types that
/// meet at a control flow join; [`ClassWriter::with_frames`] supplies a real hierarchy for that,
/// while [`ClassWriter::new`] assumes `java/lang/Object` for every such pair.
///
/// ```rust
/// use classmend::classfile::{ClassBuilder, ClassFile, ClassWriter};
///
/// let bytes = ClassBuilder::new("com/acme/Empty").build()?;
/// let class = ClassFile::parse(&bytes)?;
/// assert_eq!(ClassWriter::new().write(&class)?, bytes);
/// # Ok::<(), classmend::Error>(())
/// ```
#[derive(Clone, Copy)]
pub struct ClassWriter<'a> {
    hierarchy: &'a dyn CommonSuperclass,
}

impl ClassWriter<'static> {
    /// Creates a writer that merges distinct reference types to `java/lang/Object`.
    #[must_use]
    pub fn new() -> Self {
        ClassWriter {
            hierarchy: &OBJECT_SUPERCLASS,
        }
    }
}

impl Default for ClassWriter<'static> {
    fn default() -> Self {
        ClassWriter::new()
    }
}

impl<'a> ClassWriter<'a> {
    /// Creates a writer that consults `hierarchy` when merging reference types.
    #[must_use]
    pub fn with_frames(hierarchy: &'a dyn CommonSuperclass) -> Self {
        ClassWriter { hierarchy }
    }

    /// Serializes `class`.
    ///
    /// # Errors
    /// Fails if a modified method body cannot be assembled, if the hierarchy cannot answer a
    /// merge, or if the class exceeds the limits of the format.
    pub fn write(&self, class: &ClassFile) -> Result<Vec<u8>> {
        let mut pool = class.pool.clone();
        let mut body = Vec::new();

        body.put(class.access.bits());
        body.put(pool.class_index(&class.name)?);
        match &class.super_name {
            Some(name) => body.put(pool.class_index(name)?),
            None => body.put(0u16),
        }
        body.put(count(class.interfaces.len(), "interfaces")?);
        for interface in &class.interfaces {
            body.put(pool.class_index(interface)?);
        }

        body.put(count(class.fields.len(), "fields")?);
        for field in &class.fields {
            body.put(field.access.bits());
            body.put(pool.utf8_index(&field.name)?);
            body.put(pool.utf8_index(&field.descriptor)?);
            let mut attributes = Vec::new();
            if let Some(signature) = &field.signature {
                attributes.push(signature_attribute(&mut pool, signature)?);
            }
            attributes.extend(field.attributes.iter().cloned());
            write_attributes(&mut body, &mut pool, &attributes)?;
        }

        body.put(count(class.methods.len(), "methods")?);
        for method in &class.methods {
            body.put(method.access.bits());
            body.put(pool.utf8_index(&method.name)?);
            body.put(pool.utf8_index(&method.descriptor)?);

            let mut attributes = Vec::new();
            let code = match method.code() {
                Some(code) if method.is_modified() || method.raw_code().is_none() => {
                    let context = MethodContext {
                        owner: &class.name,
                        access: method.access,
                        name: &method.name,
                        descriptor: &method.descriptor,
                    };
                    Some(assemble(
                        code,
                        &context,
                        class.version,
                        &mut pool,
                        self.hierarchy,
                    )?)
                }
                _ => method.raw_code().map(<[u8]>::to_vec),
            };
            if let Some(data) = code {
                attributes.push(Attribute {
                    name: "Code".to_string(),
                    data,
                });
            }
            if !method.exceptions.is_empty() {
                let mut data = Vec::with_capacity(2 + 2 * method.exceptions.len());
                data.put(count(method.exceptions.len(), "exceptions")?);
                for exception in &method.exceptions {
                    data.put(pool.class_index(exception)?);
                }
                attributes.push(Attribute {
                    name: "Exceptions".to_string(),
                    data,
                });
            }
            if let Some(signature) = &method.signature {
                attributes.push(signature_attribute(&mut pool, signature)?);
            }
            attributes.extend(method.attributes.iter().cloned());
            write_attributes(&mut body, &mut pool, &attributes)?;
        }

        let mut attributes = Vec::new();
        if let Some(signature) = &class.signature {
            attributes.push(signature_attribute(&mut pool, signature)?);
        }
        attributes.extend(class.attributes.iter().cloned());
        write_attributes(&mut body, &mut pool, &attributes)?;

        let mut out = Vec::with_capacity(body.len() + pool.len() * 8 + 10);
        out.put(MAGIC);
        out.put(class.version.minor);
        out.put(class.version.major);
        pool.write(&mut out);
        out.put_bytes(&body);
        Ok(out)
    }
}

/// Checks that a table fits its `u16` length prefix.
fn count(len: usize, table: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::CodeTooLarge(format!("{table} count")))
}

fn signature_attribute(pool: &mut ConstantPool, signature: &str) -> Result<Attribute> {
    let mut data = Vec::with_capacity(2);
    data.put(pool.utf8_index(signature)?);
    Ok(Attribute {
        name: "Signature".to_string(),
        data,
    })
}

fn write_attributes(
    out: &mut Vec<u8>,
    pool: &mut ConstantPool,
    attributes: &[Attribute],
) -> Result<()> {
    out.put(count(attributes.len(), "attributes")?);
    for attribute in attributes {
        out.put(pool.utf8_index(&attribute.name)?);
        let len = u32::try_from(attribute.data.len())
            .map_err(|_| Error::CodeTooLarge(format!("attribute {}", attribute.name)))?;
        out.put(len);
        out.put_bytes(&attribute.data);
    }
    Ok(())
}
