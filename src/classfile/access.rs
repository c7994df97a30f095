//! Access flag sets for classes, fields and methods.

use bitflags::bitflags;

bitflags! {
    /// Access and property flags of a class or interface.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClassAccess: u16 {
        /// Declared `public`
        const PUBLIC = 0x0001;
        /// Declared `final`
        const FINAL = 0x0010;
        /// Treat superclass methods specially for `invokespecial`
        const SUPER = 0x0020;
        /// Is an interface
        const INTERFACE = 0x0200;
        /// Declared `abstract`
        const ABSTRACT = 0x0400;
        /// Not present in source
        const SYNTHETIC = 0x1000;
        /// Declared as an annotation interface
        const ANNOTATION = 0x2000;
        /// Declared as an enum class
        const ENUM = 0x4000;
        /// Is a module descriptor
        const MODULE = 0x8000;
    }
}

bitflags! {
    /// Access and property flags of a field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldAccess: u16 {
        /// Declared `public`
        const PUBLIC = 0x0001;
        /// Declared `private`
        const PRIVATE = 0x0002;
        /// Declared `protected`
        const PROTECTED = 0x0004;
        /// Declared `static`
        const STATIC = 0x0008;
        /// Declared `final`
        const FINAL = 0x0010;
        /// Declared `volatile`
        const VOLATILE = 0x0040;
        /// Declared `transient`
        const TRANSIENT = 0x0080;
        /// Not present in source
        const SYNTHETIC = 0x1000;
        /// Element of an enum class
        const ENUM = 0x4000;
    }
}

bitflags! {
    /// Access and property flags of a method.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodAccess: u16 {
        /// Declared `public`
        const PUBLIC = 0x0001;
        /// Declared `private`
        const PRIVATE = 0x0002;
        /// Declared `protected`
        const PROTECTED = 0x0004;
        /// Declared `static`
        const STATIC = 0x0008;
        /// Declared `final`
        const FINAL = 0x0010;
        /// Declared `synchronized`
        const SYNCHRONIZED = 0x0020;
        /// Compiler-generated bridge method
        const BRIDGE = 0x0040;
        /// Declared with variable arity
        const VARARGS = 0x0080;
        /// Declared `native`
        const NATIVE = 0x0100;
        /// Declared `abstract`
        const ABSTRACT = 0x0400;
        /// Declared `strictfp`
        const STRICT = 0x0800;
        /// Not present in source
        const SYNTHETIC = 0x1000;
    }
}
