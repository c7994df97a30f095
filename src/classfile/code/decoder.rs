//! Bytecode to instruction stream decoding.
//!
//! Branch targets and exception range boundaries become [`Label`]s placed in front of the
//! instruction at that offset. Short forms (`iload_0`, `goto_w`, `wide`) are normalized to their
//! long forms; the encoder picks the compact encoding again on write.

use std::collections::BTreeSet;

use crate::{
    classfile::{
        code::{
            insn::{FieldInsn, Insn, InsnList, InvokeDynamicInsn, Label, LdcValue, MethodInsn},
            opcodes::*,
            Code, TryCatchBlock,
        },
        constant::{Constant, ConstantPool},
    },
    file::parser::Parser,
    Result,
};

/// One exception table entry as stored in the Code attribute.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawHandler {
    pub start: u16,
    pub end: u16,
    pub handler: u16,
    pub catch_type: u16,
}

/// Decodes the bytecode of one method.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for unknown opcodes, branches into the middle of an
/// instruction and invalid pool references.
pub(crate) fn decode(
    bytecode: &[u8],
    handlers: &[RawHandler],
    pool: &ConstantPool,
    max_stack: u16,
    max_locals: u16,
) -> Result<Code> {
    let mut decoded = Vec::new();
    let mut targets = BTreeSet::new();
    let mut parser = Parser::new(bytecode);

    while parser.has_more_data() {
        let offset = parser.pos() as u32;
        let insn = decode_insn(&mut parser, offset, pool, bytecode.len())?;
        targets.extend(insn.targets().into_iter().map(|label| label.0));
        decoded.push((offset, insn));
    }

    for handler in handlers {
        if handler.start >= handler.end || usize::from(handler.end) > bytecode.len() {
            return Err(malformed_error!(
                "Invalid exception range {}..{}",
                handler.start,
                handler.end
            ));
        }
        targets.insert(u32::from(handler.start));
        targets.insert(u32::from(handler.end));
        targets.insert(u32::from(handler.handler));
    }

    let code_len = bytecode.len() as u32;
    let mut instructions = InsnList::with_label_base(code_len + 1);
    let mut pending = targets.iter().copied().peekable();

    for (offset, insn) in decoded {
        while let Some(&target) = pending.peek() {
            if target > offset {
                break;
            }
            if target < offset {
                return Err(malformed_error!(
                    "Branch target {} is not an instruction boundary",
                    target
                ));
            }
            instructions.push(Insn::Label(Label(target)));
            pending.next();
        }
        instructions.push(insn);
    }

    match pending.next() {
        Some(target) if target == code_len => {
            instructions.push(Insn::Label(Label(code_len)));
            if let Some(extra) = pending.next() {
                return Err(malformed_error!("Branch target {} is outside the code", extra));
            }
        }
        Some(target) => {
            return Err(malformed_error!("Branch target {} is outside the code", target));
        }
        None => {}
    }

    let try_catch_blocks = handlers
        .iter()
        .map(|handler| {
            let catch_type = match handler.catch_type {
                0 => None,
                index => Some(pool.class_name(index)?.to_string()),
            };
            Ok(TryCatchBlock {
                start: Label(u32::from(handler.start)),
                end: Label(u32::from(handler.end)),
                handler: Label(u32::from(handler.handler)),
                catch_type,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Code {
        instructions,
        try_catch_blocks,
        max_stack,
        max_locals,
    })
}

fn branch(offset: u32, delta: i32, code_len: usize) -> Result<Label> {
    let target = i64::from(offset) + i64::from(delta);
    if target < 0 || target >= code_len as i64 {
        return Err(malformed_error!(
            "Branch from {} by {} leaves the method",
            offset,
            delta
        ));
    }
    Ok(Label(target as u32))
}

fn ldc_value(pool: &ConstantPool, index: u16) -> Result<LdcValue> {
    Ok(match pool.get(index)? {
        Constant::Integer(value) => LdcValue::Int(*value),
        Constant::Float(bits) => LdcValue::Float(f32::from_bits(*bits)),
        Constant::Long(value) => LdcValue::Long(*value),
        Constant::Double(bits) => LdcValue::Double(f64::from_bits(*bits)),
        Constant::String(value) => LdcValue::String(pool.utf8(*value)?.to_string()),
        Constant::Class(name) => LdcValue::Type(pool.utf8(*name)?.to_string()),
        Constant::MethodType(descriptor) => {
            LdcValue::MethodType(pool.utf8(*descriptor)?.to_string())
        }
        Constant::MethodHandle { .. } => LdcValue::Handle(index),
        Constant::Dynamic { name_and_type, .. } => LdcValue::Dynamic {
            index,
            descriptor: pool.name_and_type(*name_and_type)?.1.to_string(),
        },
        other => {
            return Err(malformed_error!(
                "Constant {:?} at {} cannot be loaded",
                other,
                index
            ))
        }
    })
}

fn decode_insn(parser: &mut Parser, offset: u32, pool: &ConstantPool, code_len: usize) -> Result<Insn> {
    let opcode = parser.read_be::<u8>()?;
    Ok(match opcode {
        NOP..=DCONST_1
        | IALOAD..=SALOAD
        | IASTORE..=LXOR
        | I2L..=DCMPG
        | IRETURN..=RETURN
        | ARRAYLENGTH
        | ATHROW
        | MONITORENTER
        | MONITOREXIT => Insn::Op(opcode),
        BIPUSH => Insn::Int {
            opcode,
            value: i32::from(parser.read_be::<i8>()?),
        },
        SIPUSH => Insn::Int {
            opcode,
            value: i32::from(parser.read_be::<i16>()?),
        },
        NEWARRAY => Insn::Int {
            opcode,
            value: i32::from(parser.read_be::<u8>()?),
        },
        LDC => Insn::Ldc(ldc_value(pool, u16::from(parser.read_be::<u8>()?))?),
        LDC_W | LDC2_W => Insn::Ldc(ldc_value(pool, parser.read_be::<u16>()?)?),
        ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Insn::Var {
            opcode,
            var: u16::from(parser.read_be::<u8>()?),
        },
        ILOAD_0..=ALOAD_3 => Insn::Var {
            opcode: ILOAD + (opcode - ILOAD_0) / 4,
            var: u16::from((opcode - ILOAD_0) % 4),
        },
        ISTORE_0..=ASTORE_3 => Insn::Var {
            opcode: ISTORE + (opcode - ISTORE_0) / 4,
            var: u16::from((opcode - ISTORE_0) % 4),
        },
        IINC => Insn::Iinc {
            var: u16::from(parser.read_be::<u8>()?),
            increment: i16::from(parser.read_be::<i8>()?),
        },
        IFEQ..=JSR | IFNULL | IFNONNULL => Insn::Jump {
            opcode,
            target: branch(offset, i32::from(parser.read_be::<i16>()?), code_len)?,
        },
        GOTO_W | JSR_W => Insn::Jump {
            opcode: if opcode == GOTO_W { GOTO } else { JSR },
            target: branch(offset, parser.read_be::<i32>()?, code_len)?,
        },
        TABLESWITCH => {
            parser.align(0, 4)?;
            let default = branch(offset, parser.read_be::<i32>()?, code_len)?;
            let low = parser.read_be::<i32>()?;
            let high = parser.read_be::<i32>()?;
            if high < low {
                return Err(malformed_error!("tableswitch with high {} < low {}", high, low));
            }
            let count = (i64::from(high) - i64::from(low) + 1) as usize;
            if count * 4 > parser.remaining() {
                return Err(out_of_bounds_error!());
            }
            let targets = (0..count)
                .map(|_| branch(offset, parser.read_be::<i32>()?, code_len))
                .collect::<Result<Vec<_>>>()?;
            Insn::TableSwitch {
                low,
                high,
                default,
                targets,
            }
        }
        LOOKUPSWITCH => {
            parser.align(0, 4)?;
            let default = branch(offset, parser.read_be::<i32>()?, code_len)?;
            let pairs = parser.read_be::<i32>()?;
            if pairs < 0 || pairs as usize * 8 > parser.remaining() {
                return Err(malformed_error!("Invalid lookupswitch pair count {}", pairs));
            }
            let mut keys = Vec::with_capacity(pairs as usize);
            let mut targets = Vec::with_capacity(pairs as usize);
            for _ in 0..pairs {
                keys.push(parser.read_be::<i32>()?);
                targets.push(branch(offset, parser.read_be::<i32>()?, code_len)?);
            }
            Insn::LookupSwitch {
                default,
                keys,
                targets,
            }
        }
        GETSTATIC..=PUTFIELD => {
            let member = pool.member_ref(parser.read_be::<u16>()?)?;
            Insn::Field(FieldInsn {
                opcode,
                owner: member.owner.to_string(),
                name: member.name.to_string(),
                descriptor: member.descriptor.to_string(),
            })
        }
        INVOKEVIRTUAL..=INVOKEINTERFACE => {
            let member = pool.member_ref(parser.read_be::<u16>()?)?;
            if opcode == INVOKEINTERFACE {
                // count and a reserved zero byte, both derived again on write
                parser.advance_by(2)?;
            }
            Insn::Method(MethodInsn {
                opcode,
                owner: member.owner.to_string(),
                name: member.name.to_string(),
                descriptor: member.descriptor.to_string(),
                interface: member.interface,
            })
        }
        INVOKEDYNAMIC => {
            let index = parser.read_be::<u16>()?;
            parser.advance_by(2)?;
            let Constant::InvokeDynamic { name_and_type, .. } = pool.get(index)? else {
                return Err(malformed_error!("invokedynamic without call site at {}", index));
            };
            let (name, descriptor) = pool.name_and_type(*name_and_type)?;
            Insn::InvokeDynamic(InvokeDynamicInsn {
                index,
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            })
        }
        NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => Insn::Type {
            opcode,
            descriptor: pool.class_name(parser.read_be::<u16>()?)?.to_string(),
        },
        MULTIANEWARRAY => Insn::MultiANewArray {
            descriptor: pool.class_name(parser.read_be::<u16>()?)?.to_string(),
            dimensions: parser.read_be::<u8>()?,
        },
        WIDE => {
            let widened = parser.read_be::<u8>()?;
            match widened {
                IINC => Insn::Iinc {
                    var: parser.read_be::<u16>()?,
                    increment: parser.read_be::<i16>()?,
                },
                ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Insn::Var {
                    opcode: widened,
                    var: parser.read_be::<u16>()?,
                },
                _ => return Err(malformed_error!("Invalid wide opcode {:#x}", widened)),
            }
        }
        _ => {
            return Err(malformed_error!(
                "Unknown opcode {:#x} at offset {}",
                opcode,
                offset
            ))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_forms_are_normalized() {
        let pool = ConstantPool::new();
        // aload_0, istore_3, wide iinc 300 -2, return
        let bytecode = [ALOAD_0, ISTORE_3, WIDE, IINC, 0x01, 0x2C, 0xFF, 0xFE, RETURN];
        let code = decode(&bytecode, &[], &pool, 1, 301).unwrap();

        let insns: Vec<_> = code.instructions.iter().cloned().collect();
        assert_eq!(
            insns,
            vec![
                Insn::var(ALOAD, 0),
                Insn::var(ISTORE, 3),
                Insn::Iinc {
                    var: 300,
                    increment: -2
                },
                Insn::op(RETURN),
            ]
        );
    }

    #[test]
    fn branches_get_labels() {
        let pool = ConstantPool::new();
        // 0: iload_1  1: ifeq +5 (-> 6)  4: iconst_1  5: ireturn  6: iconst_0  7: ireturn
        let bytecode = [ILOAD_1, IFEQ, 0x00, 0x05, ICONST_1, IRETURN, ICONST_0, IRETURN];
        let code = decode(&bytecode, &[], &pool, 1, 2).unwrap();

        let insns: Vec<_> = code.instructions.iter().cloned().collect();
        assert_eq!(insns[1], Insn::jump(IFEQ, Label(6)));
        assert_eq!(insns[4], Insn::Label(Label(6)));
        assert_eq!(insns.len(), 7);
    }

    #[test]
    fn exception_ranges_get_labels() {
        let mut pool = ConstantPool::new();
        let exception = pool.class_index("java/lang/Exception").unwrap();
        // 0: aconst_null 1: athrow 2: astore_1 3: return
        let bytecode = [ACONST_NULL, ATHROW, ASTORE_1, RETURN];
        let handlers = [RawHandler {
            start: 0,
            end: 2,
            handler: 2,
            catch_type: exception,
        }];
        let code = decode(&bytecode, &handlers, &pool, 1, 2).unwrap();

        assert_eq!(code.try_catch_blocks.len(), 1);
        assert_eq!(
            code.try_catch_blocks[0].catch_type.as_deref(),
            Some("java/lang/Exception")
        );
        assert_eq!(code.instructions.iter().next(), Some(&Insn::Label(Label(0))));
    }

    #[test]
    fn rejects_misaligned_branch() {
        let pool = ConstantPool::new();
        // goto +1 lands inside the goto itself
        let bytecode = [GOTO, 0x00, 0x01, RETURN];
        assert!(decode(&bytecode, &[], &pool, 0, 0).is_err());
    }

    #[test]
    fn rejects_unknown_opcode() {
        let pool = ConstantPool::new();
        assert!(decode(&[0xCB], &[], &pool, 0, 0).is_err());
    }
}
