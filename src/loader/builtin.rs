use crate::{
    classfile::{ClassBuilder, ClassVersion},
    loader::ClassLoader,
    Result,
};

/// (name, superclass, interfaces, is interface)
type CoreType = (&'static str, Option<&'static str>, &'static [&'static str], bool);

const OBJECT: Option<&str> = Some("java/lang/Object");

#[rustfmt::skip]
const CORE_TYPES: &[CoreType] = &[
    ("java/lang/Object", None, &[], false),
    // interfaces
    ("java/io/Serializable", OBJECT, &[], true),
    ("java/io/Closeable", OBJECT, &["java/lang/AutoCloseable"], true),
    ("java/io/Flushable", OBJECT, &[], true),
    ("java/lang/AutoCloseable", OBJECT, &[], true),
    ("java/lang/Appendable", OBJECT, &[], true),
    ("java/lang/CharSequence", OBJECT, &[], true),
    ("java/lang/Cloneable", OBJECT, &[], true),
    ("java/lang/Comparable", OBJECT, &[], true),
    ("java/lang/Iterable", OBJECT, &[], true),
    ("java/lang/Runnable", OBJECT, &[], true),
    ("java/util/Collection", OBJECT, &["java/lang/Iterable"], true),
    ("java/util/List", OBJECT, &["java/util/Collection"], true),
    ("java/util/Map", OBJECT, &[], true),
    ("java/util/RandomAccess", OBJECT, &[], true),
    ("java/sql/Wrapper", OBJECT, &[], true),
    ("java/sql/Connection", OBJECT, &["java/sql/Wrapper", "java/lang/AutoCloseable"], true),
    ("javax/sql/DataSource", OBJECT, &["java/sql/Wrapper"], true),
    ("javax/naming/Context", OBJECT, &[], true),
    // classes
    ("java/lang/String", OBJECT, &["java/io/Serializable", "java/lang/Comparable", "java/lang/CharSequence"], false),
    ("java/lang/AbstractStringBuilder", OBJECT, &["java/lang/Appendable", "java/lang/CharSequence"], false),
    ("java/lang/StringBuilder", Some("java/lang/AbstractStringBuilder"), &["java/io/Serializable", "java/lang/CharSequence"], false),
    ("java/lang/Class", OBJECT, &["java/io/Serializable"], false),
    ("java/lang/Thread", OBJECT, &["java/lang/Runnable"], false),
    ("java/lang/Number", OBJECT, &["java/io/Serializable"], false),
    ("java/lang/Integer", Some("java/lang/Number"), &["java/lang/Comparable"], false),
    ("java/lang/Long", Some("java/lang/Number"), &["java/lang/Comparable"], false),
    ("java/lang/Boolean", OBJECT, &["java/io/Serializable", "java/lang/Comparable"], false),
    ("java/lang/Throwable", OBJECT, &["java/io/Serializable"], false),
    ("java/lang/Exception", Some("java/lang/Throwable"), &[], false),
    ("java/lang/Error", Some("java/lang/Throwable"), &[], false),
    ("java/lang/RuntimeException", Some("java/lang/Exception"), &[], false),
    ("java/lang/IllegalArgumentException", Some("java/lang/RuntimeException"), &[], false),
    ("java/lang/IllegalStateException", Some("java/lang/RuntimeException"), &[], false),
    ("java/lang/NullPointerException", Some("java/lang/RuntimeException"), &[], false),
    ("java/lang/SecurityException", Some("java/lang/RuntimeException"), &[], false),
    ("java/lang/UnsupportedOperationException", Some("java/lang/RuntimeException"), &[], false),
    ("java/io/IOException", Some("java/lang/Exception"), &[], false),
    ("java/io/InputStream", OBJECT, &["java/io/Closeable"], false),
    ("java/io/OutputStream", OBJECT, &["java/io/Closeable", "java/io/Flushable"], false),
    ("java/sql/SQLException", Some("java/lang/Exception"), &["java/lang/Iterable"], false),
    ("javax/naming/NamingException", Some("java/lang/Exception"), &[], false),
    ("java/util/AbstractCollection", OBJECT, &["java/util/Collection"], false),
    ("java/util/AbstractList", Some("java/util/AbstractCollection"), &["java/util/List"], false),
    ("java/util/ArrayList", Some("java/util/AbstractList"), &["java/util/List", "java/util/RandomAccess", "java/lang/Cloneable", "java/io/Serializable"], false),
    ("java/util/AbstractMap", OBJECT, &["java/util/Map"], false),
    ("java/util/HashMap", Some("java/util/AbstractMap"), &["java/util/Map", "java/lang/Cloneable", "java/io/Serializable"], false),
];

/// Header-only class files for the core platform types.
///
/// Serves as the bootstrap resource space when no platform class path is available. Each class
/// is synthesized with the superclass and interfaces of its platform counterpart and no members,
/// which is all the hierarchy resolver reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinLoader;

impl BuiltinLoader {
    /// Internal names of every class this loader knows.
    pub fn names() -> impl Iterator<Item = &'static str> {
        CORE_TYPES.iter().map(|(name, ..)| *name)
    }
}

impl ClassLoader for BuiltinLoader {
    fn name(&self) -> &str {
        "builtin"
    }

    fn find_class(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let Some((name, parent, interfaces, interface)) =
            CORE_TYPES.iter().find(|(candidate, ..)| *candidate == name)
        else {
            return Ok(None);
        };

        let mut builder = ClassBuilder::new(name).version(ClassVersion::JAVA_8);
        if *interface {
            builder = builder.interface_type();
        }
        builder = match parent {
            Some(parent) => builder.super_name(parent),
            None => builder.no_super(),
        };
        for implemented in *interfaces {
            builder = builder.interface(implemented);
        }
        builder.build().map(Some)
    }
}
