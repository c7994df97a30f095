//! Shared fixtures for unit tests.

use crate::{
    classfile::{code::opcodes::*, ClassBuilder, Insn, MethodAccess},
    loader::MemoryLoader,
};

/// A small hierarchy:
///
/// ```text
/// zoo/Animal  extends Object  implements Comparable
/// zoo/Pet     interface       extends Serializable
/// zoo/Dog     extends Animal  implements Pet
/// zoo/Cat     extends Animal
/// zoo/Puppy   extends Dog
/// ```
pub fn zoo_loader() -> MemoryLoader {
    let mut loader = MemoryLoader::new("zoo");
    for bytes in [
        ClassBuilder::new("zoo/Animal").interface("java/lang/Comparable"),
        ClassBuilder::new("zoo/Pet")
            .interface_type()
            .interface("java/io/Serializable"),
        ClassBuilder::new("zoo/Dog")
            .super_name("zoo/Animal")
            .interface("zoo/Pet"),
        ClassBuilder::new("zoo/Cat").super_name("zoo/Animal"),
        ClassBuilder::new("zoo/Puppy").super_name("zoo/Dog"),
    ]
    .map(|builder| builder.build().unwrap())
    {
        loader.add(bytes).unwrap();
    }
    loader
}

/// A class whose `describe` method returns a string constant.
pub fn greeter_class(name: &str) -> Vec<u8> {
    ClassBuilder::new(name)
        .constructor()
        .method(
            MethodAccess::PUBLIC,
            "describe",
            "()Ljava/lang/String;",
            [Insn::ldc_string("original"), Insn::op(ARETURN)],
        )
        .method(
            MethodAccess::PUBLIC | MethodAccess::STATIC,
            "count",
            "(I)I",
            [Insn::var(ILOAD, 0), Insn::op(IRETURN)],
        )
        .build()
        .unwrap()
}
