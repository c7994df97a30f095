//! Instruction stream to bytecode encoding.
//!
//! Encoding runs in three passes over the stream:
//!
//! 1. **Operands**: every symbolic constant (field and method references, class names, literals)
//!    is interned into the [`ConstantPool`], which fixes the size of `ldc` versus `ldc_w`.
//! 2. **Layout**: offsets are assigned with the compact form of every instruction. Branches whose
//!    displacement does not fit in a signed 16 bit offset are widened and the layout is repeated
//!    until it is stable. Widening only ever grows instructions, so this terminates.
//! 3. **Emission**: bytes are written with branch displacements taken from the final layout.
//!
//! # Widening
//!
//! | Form          | Compact          | Widened                                   |
//! |---------------|------------------|-------------------------------------------|
//! | `goto`        | `goto` (3)       | `goto_w` (5)                              |
//! | `jsr`         | `jsr` (3)        | `jsr_w` (5)                               |
//! | conditional   | `ifxx` (3)       | inverted `ifxx` over a `goto_w` (3 + 5)   |
//!
//! The instruction following a widened conditional becomes a branch target of the inverted jump
//! and therefore needs a stack map frame; [`Layout::widened`] reports those nodes.

use std::collections::HashMap;

use crate::{
    classfile::{
        code::{
            insn::{Insn, Label, LdcValue},
            opcodes::*,
            Code,
        },
        constant::{Constant, ConstantPool},
    },
    file::io::ByteSink,
    Error, Result,
};

/// Largest permitted code array.
pub const MAX_CODE_LENGTH: u32 = 65535;

/// Offsets assigned to the nodes of an instruction stream.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    /// Byte offset of each node; labels share the offset of the next instruction
    pub offsets: Vec<u32>,
    /// `true` for conditional jumps emitted as inverted jump plus `goto_w`
    pub widened: Vec<bool>,
    /// Length of the code array
    pub code_length: u32,
}

impl Layout {
    /// Offset of the node at `index`, or the code length past the end.
    #[must_use]
    pub fn offset(&self, index: usize) -> u32 {
        self.offsets
            .get(index)
            .copied()
            .unwrap_or(self.code_length)
    }
}

/// Encoded bytecode with its layout.
#[derive(Debug, Clone)]
pub struct Encoded {
    /// The code array
    pub bytes: Vec<u8>,
    /// Where each node ended up
    pub layout: Layout,
    /// Label to node index
    pub labels: HashMap<Label, usize>,
}

/// Encodes `code`, interning the constants it references into `pool`.
///
/// # Errors
/// Returns [`Error::Malformed`] for references to unplaced labels or invalid operands, and
/// [`Error::CodeTooLarge`] if the result exceeds [`MAX_CODE_LENGTH`] or the pool overflows.
pub fn encode(code: &Code, pool: &mut ConstantPool) -> Result<Encoded> {
    let insns: Vec<&Insn> = code.instructions.iter().collect();
    let labels = super::frames::label_positions(code)?;

    let operands = insns
        .iter()
        .map(|insn| operand(insn, pool))
        .collect::<Result<Vec<_>>>()?;

    let layout = layout(&insns, &operands, &labels)?;

    let mut bytes = Vec::with_capacity(layout.code_length as usize);
    for (index, insn) in insns.iter().enumerate() {
        debug_assert_eq!(bytes.len() as u32, layout.offsets[index]);
        emit(
            &mut bytes,
            insn,
            operands[index],
            index,
            &layout,
            &labels,
        )?;
    }

    Ok(Encoded {
        bytes,
        layout,
        labels,
    })
}

fn operand(insn: &Insn, pool: &mut ConstantPool) -> Result<u16> {
    Ok(match insn {
        Insn::Ldc(value) => match value {
            LdcValue::Int(v) => pool.intern(Constant::Integer(*v))?,
            LdcValue::Float(v) => pool.intern(Constant::Float(v.to_bits()))?,
            LdcValue::Long(v) => pool.intern(Constant::Long(*v))?,
            LdcValue::Double(v) => pool.intern(Constant::Double(v.to_bits()))?,
            LdcValue::String(v) => pool.string_index(v)?,
            LdcValue::Type(v) => pool.class_index(v)?,
            LdcValue::MethodType(v) => pool.method_type_index(v)?,
            LdcValue::Handle(index) | LdcValue::Dynamic { index, .. } => *index,
        },
        Insn::Type { descriptor, .. } | Insn::MultiANewArray { descriptor, .. } => {
            pool.class_index(descriptor)?
        }
        Insn::Field(field) => pool.field_ref_index(&field.owner, &field.name, &field.descriptor)?,
        Insn::Method(method) => pool.method_ref_index(
            &method.owner,
            &method.name,
            &method.descriptor,
            method.interface,
        )?,
        Insn::InvokeDynamic(call) => call.index,
        _ => 0,
    })
}

fn target(labels: &HashMap<Label, usize>, label: Label) -> Result<usize> {
    labels
        .get(&label)
        .copied()
        .ok_or_else(|| malformed_error!("Label {:?} is not placed", label))
}

fn switch_padding(offset: u32) -> u32 {
    (4 - (offset + 1) % 4) % 4
}

fn size(insn: &Insn, operand: u16, offset: u32, wide: bool) -> u32 {
    match insn {
        Insn::Label(_) => 0,
        Insn::Op(_) => 1,
        Insn::Int { opcode, .. } => {
            if *opcode == SIPUSH {
                3
            } else {
                2
            }
        }
        Insn::Var { opcode, var } => {
            if *var <= 3 && *opcode != RET {
                1
            } else if *var <= 255 {
                2
            } else {
                4
            }
        }
        Insn::Iinc { var, increment } => {
            if *var <= 255 && i8::try_from(*increment).is_ok() {
                3
            } else {
                6
            }
        }
        Insn::Jump { opcode, .. } => match (wide, *opcode) {
            (false, _) => 3,
            (true, GOTO | JSR) => 5,
            (true, _) => 8,
        },
        Insn::Ldc(value) => {
            if value.is_wide() || operand > 255 {
                3
            } else {
                2
            }
        }
        Insn::Type { .. } | Insn::Field(_) => 3,
        Insn::Method(method) => {
            if method.opcode == INVOKEINTERFACE {
                5
            } else {
                3
            }
        }
        Insn::InvokeDynamic(_) => 5,
        Insn::MultiANewArray { .. } => 4,
        Insn::TableSwitch { targets, .. } => {
            1 + switch_padding(offset) + 12 + 4 * targets.len() as u32
        }
        Insn::LookupSwitch { keys, .. } => 1 + switch_padding(offset) + 8 + 8 * keys.len() as u32,
    }
}

fn layout(insns: &[&Insn], operands: &[u16], labels: &HashMap<Label, usize>) -> Result<Layout> {
    let mut widened = vec![false; insns.len()];
    loop {
        let mut offsets = Vec::with_capacity(insns.len());
        let mut offset = 0u32;
        for (index, insn) in insns.iter().enumerate() {
            offsets.push(offset);
            offset += size(insn, operands[index], offset, widened[index]);
        }

        if offset > MAX_CODE_LENGTH {
            return Err(Error::CodeTooLarge(format!("{offset} bytes of code")));
        }

        let mut changed = false;
        for (index, insn) in insns.iter().enumerate() {
            if let Insn::Jump { target: label, .. } = insn {
                if widened[index] {
                    continue;
                }
                let delta =
                    i64::from(offsets[target(labels, *label)?]) - i64::from(offsets[index]);
                if i16::try_from(delta).is_err() {
                    widened[index] = true;
                    changed = true;
                }
            }
        }

        if !changed {
            return Ok(Layout {
                offsets,
                widened,
                code_length: offset,
            });
        }
    }
}

/// The opposite condition of a conditional jump.
fn invert(opcode: u8) -> Result<u8> {
    Ok(match opcode {
        IFEQ => IFNE,
        IFNE => IFEQ,
        IFLT => IFGE,
        IFGE => IFLT,
        IFGT => IFLE,
        IFLE => IFGT,
        IF_ICMPEQ => IF_ICMPNE,
        IF_ICMPNE => IF_ICMPEQ,
        IF_ICMPLT => IF_ICMPGE,
        IF_ICMPGE => IF_ICMPLT,
        IF_ICMPGT => IF_ICMPLE,
        IF_ICMPLE => IF_ICMPGT,
        IF_ACMPEQ => IF_ACMPNE,
        IF_ACMPNE => IF_ACMPEQ,
        IFNULL => IFNONNULL,
        IFNONNULL => IFNULL,
        other => return Err(malformed_error!("Opcode {:#x} is not a conditional jump", other)),
    })
}

fn relative(labels: &HashMap<Label, usize>, layout: &Layout, from: u32, label: Label) -> Result<i32> {
    let to = layout.offsets[target(labels, label)?];
    Ok(to as i32 - from as i32)
}

fn emit(
    out: &mut Vec<u8>,
    insn: &Insn,
    operand: u16,
    index: usize,
    layout: &Layout,
    labels: &HashMap<Label, usize>,
) -> Result<()> {
    let offset = layout.offsets[index];
    match insn {
        Insn::Label(_) => {}
        Insn::Op(opcode) => out.put(*opcode),
        Insn::Int { opcode, value } => {
            let out_of_range =
                || malformed_error!("Operand {} out of range for opcode {}", value, opcode);
            match *opcode {
                SIPUSH => {
                    let value = i16::try_from(*value).map_err(|_| out_of_range())?;
                    out.put(SIPUSH);
                    out.put(value);
                }
                NEWARRAY => {
                    let value = u8::try_from(*value).map_err(|_| out_of_range())?;
                    out.put(NEWARRAY);
                    out.put(value);
                }
                _ => {
                    let value = i8::try_from(*value).map_err(|_| out_of_range())?;
                    out.put(*opcode);
                    out.put(value);
                }
            }
        }
        Insn::Var { opcode, var } => {
            if *var <= 3 && *opcode != RET {
                let short = match *opcode {
                    ILOAD..=ALOAD => ILOAD_0 + (opcode - ILOAD) * 4,
                    ISTORE..=ASTORE => ISTORE_0 + (opcode - ISTORE) * 4,
                    other => return Err(malformed_error!("Invalid local variable opcode {}", other)),
                };
                out.put(short + *var as u8);
            } else if *var <= 255 {
                out.put(*opcode);
                out.put(*var as u8);
            } else {
                out.put(WIDE);
                out.put(*opcode);
                out.put(*var);
            }
        }
        Insn::Iinc { var, increment } => {
            if *var <= 255 && i8::try_from(*increment).is_ok() {
                out.put(IINC);
                out.put(*var as u8);
                out.put(*increment as i8);
            } else {
                out.put(WIDE);
                out.put(IINC);
                out.put(*var);
                out.put(*increment);
            }
        }
        Insn::Jump { opcode, target } => {
            let delta = relative(labels, layout, offset, *target)?;
            if !layout.widened[index] {
                out.put(*opcode);
                out.put(delta as i16);
            } else if *opcode == GOTO || *opcode == JSR {
                out.put(if *opcode == GOTO { GOTO_W } else { JSR_W });
                out.put(delta);
            } else {
                out.put(invert(*opcode)?);
                out.put(8i16);
                out.put(GOTO_W);
                out.put(delta - 3);
            }
        }
        Insn::Ldc(value) => {
            if value.is_wide() {
                out.put(LDC2_W);
                out.put(operand);
            } else if operand > 255 {
                out.put(LDC_W);
                out.put(operand);
            } else {
                out.put(LDC);
                out.put(operand as u8);
            }
        }
        Insn::Type { opcode, .. } => {
            out.put(*opcode);
            out.put(operand);
        }
        Insn::Field(field) => {
            out.put(field.opcode);
            out.put(operand);
        }
        Insn::Method(method) => {
            out.put(method.opcode);
            out.put(operand);
            if method.opcode == INVOKEINTERFACE {
                let descriptor = super::descriptor::MethodDescriptor::parse(&method.descriptor)?;
                out.put((descriptor.argument_slots() + 1) as u8);
                out.put(0u8);
            }
        }
        Insn::InvokeDynamic(_) => {
            out.put(INVOKEDYNAMIC);
            out.put(operand);
            out.put(0u16);
        }
        Insn::MultiANewArray { dimensions, .. } => {
            out.put(MULTIANEWARRAY);
            out.put(operand);
            out.put(*dimensions);
        }
        Insn::TableSwitch {
            low,
            high,
            default,
            targets,
        } => {
            out.put(TABLESWITCH);
            out.put_bytes(&[0; 3][..switch_padding(offset) as usize]);
            out.put(relative(labels, layout, offset, *default)?);
            out.put(*low);
            out.put(*high);
            for label in targets {
                out.put(relative(labels, layout, offset, *label)?);
            }
        }
        Insn::LookupSwitch {
            default,
            keys,
            targets,
        } => {
            out.put(LOOKUPSWITCH);
            out.put_bytes(&[0; 3][..switch_padding(offset) as usize]);
            out.put(relative(labels, layout, offset, *default)?);
            out.put(keys.len() as u32);
            for (key, label) in keys.iter().zip(targets) {
                out.put(*key);
                out.put(relative(labels, layout, offset, *label)?);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::code::{decoder::decode, insn::InsnList};

    fn encode_list(instructions: InsnList) -> (Encoded, ConstantPool) {
        let mut pool = ConstantPool::new();
        let code = Code {
            instructions,
            ..Code::default()
        };
        let encoded = encode(&code, &mut pool).unwrap();
        (encoded, pool)
    }

    #[test]
    fn immediates_must_fit_their_opcode() {
        let mut pool = ConstantPool::new();
        for insn in [
            Insn::Int { opcode: BIPUSH, value: 128 },
            Insn::Int { opcode: BIPUSH, value: -129 },
            Insn::Int { opcode: SIPUSH, value: 40_000 },
            Insn::Int { opcode: NEWARRAY, value: 256 },
        ] {
            let code = Code {
                instructions: InsnList::from_iter([insn.clone(), Insn::op(POP), Insn::op(RETURN)]),
                ..Code::default()
            };
            assert!(encode(&code, &mut pool).is_err(), "{insn:?} encoded");
        }

        let (encoded, _) = encode_list(InsnList::from_iter([
            Insn::Int { opcode: BIPUSH, value: -128 },
            Insn::Int { opcode: SIPUSH, value: -32768 },
            Insn::op(POP2),
            Insn::op(RETURN),
        ]));
        assert_eq!(encoded.bytes, vec![BIPUSH, 0x80, SIPUSH, 0x80, 0x00, POP2, RETURN]);
    }

    #[test]
    fn compact_forms() {
        let (encoded, _) = encode_list(InsnList::from_iter([
            Insn::var(ALOAD, 0),
            Insn::var(ISTORE, 3),
            Insn::var(ILOAD, 4),
            Insn::var(DLOAD, 300),
            Insn::Iinc {
                var: 1,
                increment: -1,
            },
            Insn::Iinc {
                var: 1,
                increment: 1000,
            },
            Insn::op(RETURN),
        ]));
        assert_eq!(
            encoded.bytes,
            vec![
                ALOAD_0, ISTORE_3, ILOAD, 4, WIDE, DLOAD, 0x01, 0x2C, IINC, 1, 0xFF, WIDE, IINC,
                0, 1, 0x03, 0xE8, RETURN
            ]
        );
    }

    #[test]
    fn short_branch() {
        let mut list = InsnList::new();
        let end = list.new_label();
        list.extend([
            Insn::var(ILOAD, 0),
            Insn::jump(IFEQ, end),
            Insn::op(NOP),
            Insn::Label(end),
            Insn::op(RETURN),
        ]);
        let (encoded, _) = encode_list(list);
        assert_eq!(encoded.bytes, vec![ILOAD_0, IFEQ, 0, 4, NOP, RETURN]);
        assert_eq!(encoded.layout.offsets, vec![0, 1, 4, 5, 5]);
        assert!(!encoded.layout.widened[1]);
    }

    #[test]
    fn widens_far_branches() {
        let mut list = InsnList::new();
        let end = list.new_label();
        list.push(Insn::var(ILOAD, 0));
        list.push(Insn::jump(IFEQ, end));
        list.extend(std::iter::repeat(Insn::op(NOP)).take(40_000));
        list.push(Insn::Label(end));
        list.push(Insn::op(RETURN));

        let (encoded, _) = encode_list(list);
        assert!(encoded.layout.widened[1]);
        assert_eq!(&encoded.bytes[1..4], &[IFNE, 0, 8]);
        assert_eq!(encoded.bytes[4], GOTO_W);
        let delta = i32::from_be_bytes([
            encoded.bytes[5],
            encoded.bytes[6],
            encoded.bytes[7],
            encoded.bytes[8],
        ]);
        assert_eq!(delta, 40_000 + 5);
        assert_eq!(encoded.layout.code_length, 1 + 8 + 40_000 + 1);
    }

    #[test]
    fn rejects_oversized_code() {
        let list = InsnList::from_iter(std::iter::repeat(Insn::op(NOP)).take(70_000));
        let mut pool = ConstantPool::new();
        let code = Code {
            instructions: list,
            ..Code::default()
        };
        assert!(matches!(
            encode(&code, &mut pool),
            Err(Error::CodeTooLarge(_))
        ));
    }

    #[test]
    fn switch_padding_and_roundtrip() {
        let mut list = InsnList::new();
        let a = list.new_label();
        let b = list.new_label();
        list.extend([
            Insn::var(ILOAD, 0),
            Insn::TableSwitch {
                low: 0,
                high: 1,
                default: b,
                targets: vec![a, b],
            },
            Insn::Label(a),
            Insn::iconst(1),
            Insn::op(IRETURN),
            Insn::Label(b),
            Insn::iconst(0),
            Insn::op(IRETURN),
        ]);
        let (encoded, pool) = encode_list(list);
        // opcode at 1, padding to 4
        assert_eq!(&encoded.bytes[1..4], &[TABLESWITCH, 0, 0]);

        let decoded = decode(&encoded.bytes, &[], &pool, 1, 1).unwrap();
        let opcodes: Vec<_> = decoded
            .instructions
            .iter()
            .filter_map(Insn::opcode)
            .collect();
        assert_eq!(
            opcodes,
            vec![ILOAD, TABLESWITCH, ICONST_1, IRETURN, ICONST_0, IRETURN]
        );
    }

    #[test]
    fn constants_are_interned() {
        let (encoded, pool) = encode_list(InsnList::from_iter([
            Insn::ldc_string("java:"),
            Insn::method(
                INVOKEVIRTUAL,
                "java/lang/String",
                "startsWith",
                "(Ljava/lang/String;)Z",
            ),
            Insn::Ldc(LdcValue::Long(7)),
            Insn::op(POP2),
            Insn::op(IRETURN),
        ]));
        assert_eq!(encoded.bytes[0], LDC);
        assert_eq!(encoded.bytes[2], INVOKEVIRTUAL);
        assert_eq!(encoded.bytes[5], LDC2_W);

        let index = u16::from_be_bytes([encoded.bytes[3], encoded.bytes[4]]);
        let reference = pool.member_ref(index).unwrap();
        assert_eq!(reference.owner, "java/lang/String");
        assert_eq!(reference.name, "startsWith");
    }

    #[test]
    fn unplaced_label() {
        let mut list = InsnList::new();
        let nowhere = list.new_label();
        list.push(Insn::jump(GOTO, nowhere));
        let mut pool = ConstantPool::new();
        let code = Code {
            instructions: list,
            ..Code::default()
        };
        assert!(encode(&code, &mut pool).is_err());
    }
}
