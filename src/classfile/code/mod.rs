//! Method bodies.
//!
//! A [`Code`] is the editable form of a `Code` attribute: an [`InsnList`] of symbolic
//! instructions plus the exception table expressed in [`Label`]s. Bodies are decoded from
//! bytecode when a patch action first touches them and assembled again when the class is
//! written.
//!
//! # Assembly
//!
//! [`assemble`] turns a body back into the contents of a `Code` attribute:
//!
//! 1. the [`encoder`] lays out and emits the bytecode,
//! 2. the [`frames`] analysis computes `max_stack`, `max_locals` and the entry frame of every
//!    reachable instruction,
//! 3. unreachable instructions are overwritten with `nop ... athrow` and cut out of the exception
//!    table, so the verifier never sees code it cannot type,
//! 4. for class files version 50 and above, a `StackMapTable` is emitted for every branch
//!    target, exception handler and unreachable block.
//!
//! Older class files get the maxima only. Debug attributes of the original body (line numbers,
//! local variable tables) refer to offsets that no longer exist and are not carried over.

pub mod descriptor;
pub mod encoder;
pub mod frames;
pub mod insn;
pub mod opcodes;

pub(crate) mod decoder;
mod stackmap;

use std::collections::{BTreeMap, BTreeSet, HashMap};

pub use descriptor::{internal_name, FieldType, MethodDescriptor};
pub use frames::{CommonSuperclass, MethodContext, ObjectSuperclass};
pub use insn::{
    FieldInsn, Insn, InsnList, InsnNode, InvokeDynamicInsn, Label, LdcValue, MethodInsn, NodeId,
};

use crate::{
    classfile::{constant::ConstantPool, ClassVersion},
    file::io::ByteSink,
    Result,
};

use self::{
    frames::{Frame, VType},
    opcodes::{ATHROW, JSR, NOP, RET},
};

/// One entry of a method's exception table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryCatchBlock {
    /// First covered instruction
    pub start: Label,
    /// End of the covered range, exclusive
    pub end: Label,
    /// Handler entry point
    pub handler: Label,
    /// Internal name of the caught type, `None` catches everything
    pub catch_type: Option<String>,
}

/// An editable method body.
#[derive(Debug, Clone, Default)]
pub struct Code {
    /// The instructions
    pub instructions: InsnList,
    /// Exception handlers, in priority order
    pub try_catch_blocks: Vec<TryCatchBlock>,
    /// `max_stack` of the decoded body; recomputed on assembly
    pub max_stack: u16,
    /// `max_locals` of the decoded body; recomputed on assembly
    pub max_locals: u16,
}

impl Code {
    /// Drops every instruction and exception handler.
    pub fn clear(&mut self) {
        self.instructions.clear();
        self.try_catch_blocks.clear();
    }
}

/// Builds the contents of a `Code` attribute for `code`.
///
/// `hierarchy` answers the common supertype queries of frame merging; it is only consulted for
/// class files that carry stack map frames.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for bodies that cannot be typed (stack underflow, falling
/// off the end, subroutines in framed classes), [`crate::Error::CodeTooLarge`] past the class file
/// limits, and errors of `hierarchy`.
pub fn assemble(
    code: &Code,
    method: &MethodContext,
    version: ClassVersion,
    pool: &mut ConstantPool,
    hierarchy: &dyn CommonSuperclass,
) -> Result<Vec<u8>> {
    let framed = version.major >= 50;
    let encoded = encoder::encode(code, pool)?;
    let insns: Vec<&Insn> = code.instructions.iter().collect();

    if framed
        && insns.iter().any(|insn| {
            matches!(insn, Insn::Jump { opcode: JSR, .. } | Insn::Var { opcode: RET, .. })
        })
    {
        return Err(malformed_error!(
            "Subroutines are not allowed in {} with stack map frames",
            method.name
        ));
    }

    let analysis = if framed {
        frames::analyze(method, code, hierarchy)?
    } else {
        frames::analyze(method, code, &ObjectSuperclass)?
    };
    let layout = &encoded.layout;
    let mut bytes = encoded.bytes;
    let mut max_stack = analysis.max_stack;

    // Byte ranges of unreachable instructions
    let mut dead: Vec<(u32, u32)> = Vec::new();
    if framed {
        let mut start: Option<u32> = None;
        for (index, insn) in insns.iter().enumerate() {
            let reachable = analysis.frames[index].is_some();
            let offset = layout.offsets[index];
            match (start, reachable) {
                (None, false) if !matches!(insn, Insn::Label(_)) => start = Some(offset),
                (Some(from), true) if offset > from => {
                    dead.push((from, offset));
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(from) = start {
            dead.push((from, layout.code_length));
        }
        for &(from, to) in &dead {
            let from = from as usize;
            let to = to as usize;
            bytes[from..to - 1].fill(NOP);
            bytes[to - 1] = ATHROW;
        }
        if !dead.is_empty() {
            max_stack = max_stack.max(1);
        }
    }

    let mut exception_table: Vec<(u16, u16, u16, u16)> = Vec::new();
    for block in &code.try_catch_blocks {
        let start = layout.offset(position(&encoded.labels, block.start)?);
        let end = layout.offset(position(&encoded.labels, block.end)?);
        let handler = layout.offset(position(&encoded.labels, block.handler)?);
        let catch_type = match &block.catch_type {
            Some(name) => pool.class_index(name)?,
            None => 0,
        };
        for (from, to) in subtract_ranges(start, end, &dead) {
            exception_table.push((from as u16, to as u16, handler as u16, catch_type));
        }
    }

    let mut attributes: Vec<(u16, Vec<u8>)> = Vec::new();
    if framed {
        let mut points: BTreeMap<u32, Frame> = BTreeMap::new();
        let mut targets: BTreeSet<usize> = BTreeSet::new();
        for (index, insn) in insns.iter().enumerate() {
            for label in insn.targets() {
                targets.insert(position(&encoded.labels, label)?);
            }
            if layout.widened[index] && index + 1 < insns.len() {
                targets.insert(index + 1);
            }
        }
        for block in &code.try_catch_blocks {
            targets.insert(position(&encoded.labels, block.handler)?);
        }
        for index in targets {
            if let Some(frame) = &analysis.frames[index] {
                points.insert(layout.offset(index), frame.clone());
            }
        }
        for &(from, _) in &dead {
            points.insert(
                from,
                Frame {
                    locals: Vec::new(),
                    stack: vec![VType::Object("java/lang/Throwable".to_string())],
                },
            );
        }

        if !points.is_empty() {
            let initial = method.initial_frame()?;
            let offsets = layout.offsets.clone();
            let table = stackmap::write_stack_map(&points, &initial, pool, &|node| {
                offsets.get(node).copied().unwrap_or(0)
            })?;
            attributes.push((pool.utf8_index("StackMapTable")?, table));
        }
    }

    let mut out = Vec::with_capacity(bytes.len() + 32);
    out.put(max_stack);
    out.put(analysis.max_locals);
    out.put(bytes.len() as u32);
    out.put_bytes(&bytes);
    out.put(exception_table.len() as u16);
    for (start, end, handler, catch_type) in exception_table {
        out.put(start);
        out.put(end);
        out.put(handler);
        out.put(catch_type);
    }
    out.put(attributes.len() as u16);
    for (name, data) in attributes {
        out.put(name);
        out.put(data.len() as u32);
        out.put_bytes(&data);
    }
    Ok(out)
}

fn position(labels: &HashMap<Label, usize>, label: Label) -> Result<usize> {
    labels
        .get(&label)
        .copied()
        .ok_or_else(|| malformed_error!("Label {:?} is not placed", label))
}

/// Removes the `dead` ranges from `start..end`.
fn subtract_ranges(start: u32, end: u32, dead: &[(u32, u32)]) -> Vec<(u32, u32)> {
    let mut live = vec![(start, end)];
    for &(from, to) in dead {
        live = live
            .into_iter()
            .flat_map(|(a, b)| {
                let mut pieces = Vec::with_capacity(2);
                if from >= b || to <= a {
                    pieces.push((a, b));
                } else {
                    if a < from {
                        pieces.push((a, from));
                    }
                    if to < b {
                        pieces.push((to, b));
                    }
                }
                pieces
            })
            .collect();
    }
    live.retain(|(a, b)| a < b);
    live
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{access::MethodAccess, code::opcodes::*};

    const JAVA_8: ClassVersion = ClassVersion {
        major: 52,
        minor: 0,
    };

    fn context(descriptor: &str) -> MethodContext<'_> {
        MethodContext {
            owner: "test/Owner",
            access: MethodAccess::STATIC,
            name: "run",
            descriptor,
        }
    }

    fn split(body: &[u8]) -> (u16, u16, &[u8], &[u8]) {
        let max_stack = u16::from_be_bytes([body[0], body[1]]);
        let max_locals = u16::from_be_bytes([body[2], body[3]]);
        let length = u32::from_be_bytes([body[4], body[5], body[6], body[7]]) as usize;
        (max_stack, max_locals, &body[8..8 + length], &body[8 + length..])
    }

    #[test]
    fn straight_line_has_no_frames() {
        let code = Code {
            instructions: InsnList::from_iter([Insn::op(ACONST_NULL), Insn::op(ARETURN)]),
            ..Code::default()
        };
        let mut pool = ConstantPool::new();
        let body = assemble(
            &code,
            &context("()Ljava/lang/Object;"),
            JAVA_8,
            &mut pool,
            &ObjectSuperclass,
        )
        .unwrap();
        let (max_stack, max_locals, bytes, rest) = split(&body);
        assert_eq!((max_stack, max_locals), (1, 0));
        assert_eq!(bytes, &[ACONST_NULL, ARETURN]);
        // no handlers, no attributes
        assert_eq!(rest, &[0, 0, 0, 0]);
    }

    #[test]
    fn branch_target_gets_frame() {
        let mut instructions = InsnList::new();
        let skip = instructions.new_label();
        instructions.extend([
            Insn::var(ILOAD, 0),
            Insn::jump(IFEQ, skip),
            Insn::op(NOP),
            Insn::Label(skip),
            Insn::op(RETURN),
        ]);
        let code = Code {
            instructions,
            ..Code::default()
        };
        let mut pool = ConstantPool::new();
        let body = assemble(&code, &context("(Z)V"), JAVA_8, &mut pool, &ObjectSuperclass)
            .unwrap();
        let (_, max_locals, bytes, rest) = split(&body);
        assert_eq!(max_locals, 1);
        assert_eq!(bytes.len(), 6);

        let name = pool.utf8_index("StackMapTable").unwrap();
        let [hi, lo] = name.to_be_bytes();
        // one attribute: one same frame at offset 5
        assert_eq!(rest, &[0, 0, 0, 1, hi, lo, 0, 0, 0, 3, 0, 1, 5]);
    }

    #[test]
    fn dead_code_is_neutralized() {
        let code = Code {
            instructions: InsnList::from_iter([
                Insn::op(RETURN),
                Insn::iconst(1),
                Insn::op(POP),
                Insn::op(RETURN),
            ]),
            ..Code::default()
        };
        let mut pool = ConstantPool::new();
        let body = assemble(&code, &context("()V"), JAVA_8, &mut pool, &ObjectSuperclass)
            .unwrap();
        let (max_stack, _, bytes, _) = split(&body);
        assert_eq!(bytes, &[RETURN, NOP, NOP, ATHROW]);
        assert_eq!(max_stack, 1);
    }

    #[test]
    fn old_versions_skip_frames() {
        let mut instructions = InsnList::new();
        let skip = instructions.new_label();
        instructions.extend([
            Insn::var(ILOAD, 0),
            Insn::jump(IFEQ, skip),
            Insn::op(NOP),
            Insn::Label(skip),
            Insn::op(RETURN),
        ]);
        let code = Code {
            instructions,
            ..Code::default()
        };
        let mut pool = ConstantPool::new();
        let old = ClassVersion {
            major: 49,
            minor: 0,
        };
        let body = assemble(&code, &context("(Z)V"), old, &mut pool, &ObjectSuperclass).unwrap();
        let (_, _, _, rest) = split(&body);
        assert_eq!(rest, &[0, 0, 0, 0]);
    }

    #[test]
    fn subroutines_rejected_with_frames() {
        let mut instructions = InsnList::new();
        let sub = instructions.new_label();
        instructions.extend([
            Insn::jump(JSR, sub),
            Insn::op(RETURN),
            Insn::Label(sub),
            Insn::var(ASTORE, 0),
            Insn::var(RET, 0),
        ]);
        let code = Code {
            instructions,
            ..Code::default()
        };
        let mut pool = ConstantPool::new();
        assert!(assemble(&code, &context("()V"), JAVA_8, &mut pool, &ObjectSuperclass).is_err());
    }

    #[test]
    fn range_subtraction() {
        assert_eq!(subtract_ranges(0, 10, &[(3, 5)]), vec![(0, 3), (5, 10)]);
        assert_eq!(subtract_ranges(0, 10, &[(0, 10)]), vec![]);
        assert_eq!(subtract_ranges(4, 8, &[(0, 2), (9, 12)]), vec![(4, 8)]);
    }
}
