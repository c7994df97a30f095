//! Dataflow analysis over verification types.
//!
//! Computes, for every node of a method body, the local variable and operand stack types on
//! entry, by propagating types forward from the method's initial frame until a fixpoint is
//! reached. Where control flow joins, reference types are merged into their most specific common
//! supertype through a [`CommonSuperclass`] implementation; this is the only place the rewrite
//! path depends on the class hierarchy.
//!
//! The result yields `max_stack`, `max_locals`, the frames to record in the `StackMapTable`
//! attribute, and which instructions are unreachable.
//!
//! Long and double values occupy two slots, modelled as the value type followed by
//! [`VType::Top`], so the `dup`/`swap` family can operate on raw slots.

use std::collections::{HashMap, VecDeque};

use crate::{
    classfile::{
        access::MethodAccess,
        code::{
            descriptor::{FieldType, MethodDescriptor},
            insn::{Insn, Label, LdcValue},
            opcodes::*,
            Code,
        },
    },
    Result,
};

/// Internal name of the type every reference type is assignable to.
pub const OBJECT: &str = "java/lang/Object";

const THROWABLE: &str = "java/lang/Throwable";

/// Answers the common supertype question that frame merging needs.
///
/// Implemented by [`crate::hierarchy::TypeResolver`] for real class hierarchies.
pub trait CommonSuperclass {
    /// Returns the most specific type both `a` and `b` are assignable to.
    ///
    /// Both names are internal names of class or interface types, never arrays.
    ///
    /// # Errors
    /// Implementations fail if either type cannot be resolved.
    fn common_superclass(&self, a: &str, b: &str) -> Result<String>;
}

/// Merges every pair of distinct classes to `java/lang/Object`.
///
/// Sound for classes whose branches never join differently typed references, and used when a
/// class is serialized without access to its hierarchy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectSuperclass;

impl CommonSuperclass for ObjectSuperclass {
    fn common_superclass(&self, _a: &str, _b: &str) -> Result<String> {
        Ok(OBJECT.to_string())
    }
}

/// A verification type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VType {
    /// Unusable slot, or second half of a long/double
    Top,
    /// `boolean`, `byte`, `char`, `short` or `int`
    Integer,
    /// `float`
    Float,
    /// `long`, first slot
    Long,
    /// `double`, first slot
    Double,
    /// The `null` reference
    Null,
    /// `this` inside a constructor before the super constructor ran
    UninitializedThis,
    /// Internal name of a class, or descriptor of an array type
    Object(String),
    /// Result of the `new` instruction at the given node index, not yet constructed
    Uninitialized(usize),
}

impl VType {
    fn is_wide(&self) -> bool {
        matches!(self, VType::Long | VType::Double)
    }

    fn from_field(field: &FieldType) -> VType {
        match field {
            FieldType::Boolean
            | FieldType::Byte
            | FieldType::Char
            | FieldType::Short
            | FieldType::Int => VType::Integer,
            FieldType::Float => VType::Float,
            FieldType::Long => VType::Long,
            FieldType::Double => VType::Double,
            FieldType::Reference(name) => VType::Object(name.clone()),
        }
    }
}

/// Local variable and operand stack types at one point of a method.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    /// Local variable slots
    pub locals: Vec<VType>,
    /// Operand stack slots, bottom first
    pub stack: Vec<VType>,
}

impl Frame {
    fn push(&mut self, value: VType) {
        let wide = value.is_wide();
        self.stack.push(value);
        if wide {
            self.stack.push(VType::Top);
        }
    }

    fn push_field(&mut self, field: &FieldType) {
        self.push(VType::from_field(field));
    }

    fn pop(&mut self) -> Result<VType> {
        self.stack
            .pop()
            .ok_or_else(|| malformed_error!("Operand stack underflow"))
    }

    fn pop_n(&mut self, slots: usize) -> Result<()> {
        if slots > self.stack.len() {
            return Err(malformed_error!("Operand stack underflow"));
        }
        self.stack.truncate(self.stack.len() - slots);
        Ok(())
    }

    fn local(&self, var: u16) -> VType {
        self.locals
            .get(var as usize)
            .cloned()
            .unwrap_or(VType::Top)
    }

    fn set_local(&mut self, var: u16, value: VType) {
        let var = var as usize;
        let wide = value.is_wide();
        let needed = var + if wide { 2 } else { 1 };
        if self.locals.len() < needed {
            self.locals.resize(needed, VType::Top);
        }
        if var > 0 && self.locals[var - 1].is_wide() {
            self.locals[var - 1] = VType::Top;
        }
        self.locals[var] = value;
        if wide {
            self.locals[var + 1] = VType::Top;
        }
    }

    fn replace(&mut self, from: &VType, to: &VType) {
        for slot in self.locals.iter_mut().chain(self.stack.iter_mut()) {
            if slot == from {
                *slot = to.clone();
            }
        }
    }
}

/// The method being analysed.
#[derive(Debug, Clone, Copy)]
pub struct MethodContext<'a> {
    /// Internal name of the declaring class
    pub owner: &'a str,
    /// Method access flags
    pub access: MethodAccess,
    /// Method name
    pub name: &'a str,
    /// Method descriptor
    pub descriptor: &'a str,
}

impl MethodContext<'_> {
    /// The frame on method entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an invalid descriptor.
    pub fn initial_frame(&self) -> Result<Frame> {
        let descriptor = MethodDescriptor::parse(self.descriptor)?;
        let mut frame = Frame::default();
        if !self.access.contains(MethodAccess::STATIC) {
            if self.name == "<init>" && self.owner != OBJECT {
                frame.locals.push(VType::UninitializedThis);
            } else {
                frame.locals.push(VType::Object(self.owner.to_string()));
            }
        }
        for param in &descriptor.params {
            let value = VType::from_field(param);
            let wide = value.is_wide();
            frame.locals.push(value);
            if wide {
                frame.locals.push(VType::Top);
            }
        }
        Ok(frame)
    }
}

/// Result of [`analyze`].
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Entry frame per node, `None` for unreachable nodes
    pub frames: Vec<Option<Frame>>,
    /// Largest operand stack depth, in slots
    pub max_stack: u16,
    /// Number of local variable slots used
    pub max_locals: u16,
}

/// Maps every label of `code` to the index of its [`Insn::Label`] node.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a label is placed twice.
pub fn label_positions(code: &Code) -> Result<HashMap<Label, usize>> {
    let mut positions = HashMap::new();
    for (index, insn) in code.instructions.iter().enumerate() {
        if let Insn::Label(label) = insn {
            if positions.insert(*label, index).is_some() {
                return Err(malformed_error!("Label {:?} placed twice", label));
            }
        }
    }
    Ok(positions)
}

fn resolve(labels: &HashMap<Label, usize>, label: Label) -> Result<usize> {
    labels
        .get(&label)
        .copied()
        .ok_or_else(|| malformed_error!("Label {:?} is not placed", label))
}

struct Handler {
    start: usize,
    end: usize,
    target: usize,
    catch: VType,
}

/// Runs the dataflow analysis over `code`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for code that underflows the stack, joins stacks of
/// different heights, falls off its end or references unplaced labels, and propagates failures
/// of `hierarchy`.
pub fn analyze(
    method: &MethodContext,
    code: &Code,
    hierarchy: &dyn CommonSuperclass,
) -> Result<Analysis> {
    let insns: Vec<&Insn> = code.instructions.iter().collect();
    if insns.is_empty() {
        return Err(malformed_error!("Method {} has an empty body", method.name));
    }

    let labels = label_positions(code)?;
    let handlers = code
        .try_catch_blocks
        .iter()
        .map(|block| {
            Ok(Handler {
                start: resolve(&labels, block.start)?,
                end: resolve(&labels, block.end)?,
                target: resolve(&labels, block.handler)?,
                catch: VType::Object(
                    block
                        .catch_type
                        .clone()
                        .unwrap_or_else(|| THROWABLE.to_string()),
                ),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let initial = method.initial_frame()?;
    let mut max_locals = initial.locals.len();
    let mut max_stack = 0usize;

    let mut frames: Vec<Option<Frame>> = vec![None; insns.len()];
    let mut queued = vec![false; insns.len()];
    let mut worklist = VecDeque::new();
    frames[0] = Some(initial);
    queued[0] = true;
    worklist.push_back(0usize);

    while let Some(index) = worklist.pop_front() {
        queued[index] = false;
        let Some(entry) = frames[index].clone() else {
            continue;
        };
        let insn = insns[index];

        let mut successors: Vec<(usize, Frame)> = Vec::new();

        if !matches!(insn, Insn::Label(_)) {
            for handler in &handlers {
                if handler.start <= index && index < handler.end {
                    successors.push((
                        handler.target,
                        Frame {
                            locals: entry.locals.clone(),
                            stack: vec![handler.catch.clone()],
                        },
                    ));
                }
            }
        }

        let mut exit = entry.clone();
        execute(insn, index, &insns, method, &mut exit, &mut max_locals)?;
        max_stack = max_stack.max(exit.stack.len()).max(entry.stack.len());
        max_locals = max_locals.max(exit.locals.len());

        match insn {
            Insn::Jump { opcode: JSR, target } => {
                // Subroutines only survive in classes without stack map frames; the return
                // address is modelled as an opaque slot.
                let mut called = exit.clone();
                called.stack.push(VType::Top);
                max_stack = max_stack.max(called.stack.len());
                successors.push((resolve(&labels, *target)?, called));
            }
            _ => {
                for target in insn.targets() {
                    successors.push((resolve(&labels, target)?, exit.clone()));
                }
            }
        }

        if !insn.ends_flow() {
            if index + 1 >= insns.len() {
                return Err(malformed_error!(
                    "Execution falls off the end of {}",
                    method.name
                ));
            }
            successors.push((index + 1, exit));
        }

        for (successor, incoming) in successors {
            let changed = match &mut frames[successor] {
                slot @ None => {
                    *slot = Some(incoming);
                    true
                }
                Some(existing) => merge_frame(existing, &incoming, hierarchy)?,
            };
            if changed && !queued[successor] {
                queued[successor] = true;
                worklist.push_back(successor);
            }
        }
    }

    let max_stack = u16::try_from(max_stack)
        .map_err(|_| crate::Error::CodeTooLarge(format!("operand stack of {}", method.name)))?;
    let max_locals = u16::try_from(max_locals)
        .map_err(|_| crate::Error::CodeTooLarge(format!("locals of {}", method.name)))?;

    Ok(Analysis {
        frames,
        max_stack,
        max_locals,
    })
}

fn merge_frame(
    existing: &mut Frame,
    incoming: &Frame,
    hierarchy: &dyn CommonSuperclass,
) -> Result<bool> {
    if existing.stack.len() != incoming.stack.len() {
        return Err(malformed_error!(
            "Inconsistent stack height {} != {}",
            existing.stack.len(),
            incoming.stack.len()
        ));
    }

    let mut changed = false;
    for (slot, other) in existing.stack.iter_mut().zip(&incoming.stack) {
        let merged = merge_type(slot, other, hierarchy)?;
        if merged != *slot {
            *slot = merged;
            changed = true;
        }
    }

    // Locals missing on either side are unusable after the join
    let len = existing.locals.len().max(incoming.locals.len());
    for index in 0..len {
        let other = incoming.locals.get(index).unwrap_or(&VType::Top);
        let current = existing.locals.get(index).cloned().unwrap_or(VType::Top);
        let merged = merge_type(&current, other, hierarchy)?;
        if index >= existing.locals.len() {
            existing.locals.push(merged);
            changed = true;
        } else if merged != current {
            existing.locals[index] = merged;
            changed = true;
        }
    }
    while existing.locals.last() == Some(&VType::Top) {
        existing.locals.pop();
    }

    Ok(changed)
}

fn merge_type(a: &VType, b: &VType, hierarchy: &dyn CommonSuperclass) -> Result<VType> {
    if a == b {
        return Ok(a.clone());
    }
    Ok(match (a, b) {
        (VType::Null, VType::Object(_)) => b.clone(),
        (VType::Object(_), VType::Null) => a.clone(),
        (VType::Object(x), VType::Object(y)) => VType::Object(merge_references(x, y, hierarchy)?),
        _ => VType::Top,
    })
}

/// Merges two reference types given as internal names or array descriptors.
fn merge_references(a: &str, b: &str, hierarchy: &dyn CommonSuperclass) -> Result<String> {
    if a == b {
        return Ok(a.to_string());
    }
    match (a.strip_prefix('['), b.strip_prefix('[')) {
        (Some(x), Some(y)) => {
            let (Some(x), Some(y)) = (element_reference(x), element_reference(y)) else {
                return Ok(OBJECT.to_string());
            };
            let merged = merge_references(&x, &y, hierarchy)?;
            Ok(if merged.starts_with('[') {
                format!("[{merged}")
            } else {
                format!("[L{merged};")
            })
        }
        (None, None) => {
            if a == OBJECT || b == OBJECT {
                return Ok(OBJECT.to_string());
            }
            hierarchy.common_superclass(a, b)
        }
        _ => Ok(OBJECT.to_string()),
    }
}

/// Element type of an array as an internal name or array descriptor, `None` for primitives.
fn element_reference(element: &str) -> Option<String> {
    if element.starts_with('[') {
        Some(element.to_string())
    } else {
        element
            .strip_prefix('L')
            .and_then(|rest| rest.strip_suffix(';'))
            .map(str::to_string)
    }
}

fn array_of(descriptor: &str) -> String {
    if descriptor.starts_with('[') {
        format!("[{descriptor}")
    } else {
        format!("[L{descriptor};")
    }
}

fn execute(
    insn: &Insn,
    index: usize,
    insns: &[&Insn],
    method: &MethodContext,
    frame: &mut Frame,
    max_locals: &mut usize,
) -> Result<()> {
    match insn {
        Insn::Label(_) => {}
        Insn::Op(opcode) => execute_op(*opcode, frame)?,
        Insn::Int { opcode, value } => {
            if *opcode == NEWARRAY {
                frame.pop()?;
                let element = match u8::try_from(*value).unwrap_or(0) {
                    T_BOOLEAN => "[Z",
                    T_CHAR => "[C",
                    T_FLOAT => "[F",
                    T_DOUBLE => "[D",
                    T_BYTE => "[B",
                    T_SHORT => "[S",
                    T_INT => "[I",
                    T_LONG => "[J",
                    other => return Err(malformed_error!("Invalid newarray type {}", other)),
                };
                frame.push(VType::Object(element.to_string()));
            } else {
                frame.push(VType::Integer);
            }
        }
        Insn::Var { opcode, var } => {
            let width = if matches!(*opcode, LLOAD | DLOAD | LSTORE | DSTORE) {
                2
            } else {
                1
            };
            *max_locals = (*max_locals).max(*var as usize + width);
            match *opcode {
                ILOAD => frame.push(VType::Integer),
                LLOAD => frame.push(VType::Long),
                FLOAD => frame.push(VType::Float),
                DLOAD => frame.push(VType::Double),
                ALOAD => frame.push(frame.local(*var)),
                ISTORE | FSTORE | ASTORE => {
                    let value = frame.pop()?;
                    frame.set_local(*var, value);
                }
                LSTORE | DSTORE => {
                    frame.pop()?;
                    let value = frame.pop()?;
                    frame.set_local(*var, value);
                }
                RET => {}
                other => return Err(malformed_error!("Invalid local variable opcode {}", other)),
            }
        }
        Insn::Iinc { var, .. } => {
            *max_locals = (*max_locals).max(*var as usize + 1);
        }
        Insn::Jump { opcode, .. } => match *opcode {
            IFEQ..=IFLE | IFNULL | IFNONNULL => frame.pop_n(1)?,
            IF_ICMPEQ..=IF_ACMPNE => frame.pop_n(2)?,
            GOTO | JSR => {}
            other => return Err(malformed_error!("Invalid jump opcode {}", other)),
        },
        Insn::Ldc(value) => match value {
            LdcValue::Int(_) => frame.push(VType::Integer),
            LdcValue::Float(_) => frame.push(VType::Float),
            LdcValue::Long(_) => frame.push(VType::Long),
            LdcValue::Double(_) => frame.push(VType::Double),
            LdcValue::String(_) => frame.push(VType::Object("java/lang/String".to_string())),
            LdcValue::Type(_) => frame.push(VType::Object("java/lang/Class".to_string())),
            LdcValue::MethodType(_) => {
                frame.push(VType::Object("java/lang/invoke/MethodType".to_string()));
            }
            LdcValue::Handle(_) => {
                frame.push(VType::Object("java/lang/invoke/MethodHandle".to_string()));
            }
            LdcValue::Dynamic { descriptor, .. } => frame.push_field(&FieldType::parse(descriptor)?),
        },
        Insn::Type { opcode, descriptor } => match *opcode {
            NEW => frame.push(VType::Uninitialized(index)),
            ANEWARRAY => {
                frame.pop()?;
                frame.push(VType::Object(array_of(descriptor)));
            }
            CHECKCAST => {
                frame.pop()?;
                frame.push(VType::Object(descriptor.clone()));
            }
            INSTANCEOF => {
                frame.pop()?;
                frame.push(VType::Integer);
            }
            other => return Err(malformed_error!("Invalid type opcode {}", other)),
        },
        Insn::Field(field) => {
            let field_type = FieldType::parse(&field.descriptor)?;
            match field.opcode {
                GETSTATIC => frame.push_field(&field_type),
                PUTSTATIC => frame.pop_n(field_type.size() as usize)?,
                GETFIELD => {
                    frame.pop()?;
                    frame.push_field(&field_type);
                }
                PUTFIELD => frame.pop_n(field_type.size() as usize + 1)?,
                other => return Err(malformed_error!("Invalid field opcode {}", other)),
            }
        }
        Insn::Method(call) => {
            let descriptor = MethodDescriptor::parse(&call.descriptor)?;
            frame.pop_n(descriptor.argument_slots() as usize)?;
            if call.opcode != INVOKESTATIC {
                let receiver = frame.pop()?;
                if call.opcode == INVOKESPECIAL && call.name == "<init>" {
                    let initialized = match &receiver {
                        VType::UninitializedThis => VType::Object(method.owner.to_string()),
                        VType::Uninitialized(new_index) => match insns.get(*new_index) {
                            Some(Insn::Type { descriptor, .. }) => VType::Object(descriptor.clone()),
                            _ => return Err(malformed_error!("Constructor call without new")),
                        },
                        _ => receiver.clone(),
                    };
                    frame.replace(&receiver, &initialized);
                }
            }
            if let Some(ret) = &descriptor.ret {
                frame.push_field(ret);
            }
        }
        Insn::InvokeDynamic(call) => {
            let descriptor = MethodDescriptor::parse(&call.descriptor)?;
            frame.pop_n(descriptor.argument_slots() as usize)?;
            if let Some(ret) = &descriptor.ret {
                frame.push_field(ret);
            }
        }
        Insn::TableSwitch { .. } | Insn::LookupSwitch { .. } => frame.pop_n(1)?,
        Insn::MultiANewArray {
            descriptor,
            dimensions,
        } => {
            frame.pop_n(*dimensions as usize)?;
            frame.push(VType::Object(descriptor.clone()));
        }
    }
    Ok(())
}

fn execute_op(opcode: u8, frame: &mut Frame) -> Result<()> {
    use VType::{Double, Float, Integer, Long};

    // (slots popped, value pushed)
    let simple: Option<(usize, Option<VType>)> = match opcode {
        NOP => Some((0, None)),
        ACONST_NULL => Some((0, Some(VType::Null))),
        ICONST_M1..=ICONST_5 => Some((0, Some(Integer))),
        LCONST_0 | LCONST_1 => Some((0, Some(Long))),
        FCONST_0..=FCONST_2 => Some((0, Some(Float))),
        DCONST_0 | DCONST_1 => Some((0, Some(Double))),
        IALOAD | BALOAD | CALOAD | SALOAD => Some((2, Some(Integer))),
        LALOAD => Some((2, Some(Long))),
        FALOAD => Some((2, Some(Float))),
        DALOAD => Some((2, Some(Double))),
        IASTORE | FASTORE | AASTORE | BASTORE | CASTORE | SASTORE => Some((3, None)),
        LASTORE | DASTORE => Some((4, None)),
        POP => Some((1, None)),
        POP2 => Some((2, None)),
        IADD | ISUB | IMUL | IDIV | IREM | ISHL | ISHR | IUSHR | IAND | IOR | IXOR => {
            Some((2, Some(Integer)))
        }
        LADD | LSUB | LMUL | LDIV | LREM | LAND | LOR | LXOR => Some((4, Some(Long))),
        LSHL | LSHR | LUSHR => Some((3, Some(Long))),
        FADD | FSUB | FMUL | FDIV | FREM => Some((2, Some(Float))),
        DADD | DSUB | DMUL | DDIV | DREM => Some((4, Some(Double))),
        INEG => Some((1, Some(Integer))),
        LNEG => Some((2, Some(Long))),
        FNEG => Some((1, Some(Float))),
        DNEG => Some((2, Some(Double))),
        I2L | F2L => Some((1, Some(Long))),
        I2F => Some((1, Some(Float))),
        I2D | F2D => Some((1, Some(Double))),
        L2I | D2I => Some((2, Some(Integer))),
        L2F | D2F => Some((2, Some(Float))),
        L2D => Some((2, Some(Double))),
        D2L => Some((2, Some(Long))),
        F2I | I2B | I2C | I2S => Some((1, Some(Integer))),
        LCMP | DCMPL | DCMPG => Some((4, Some(Integer))),
        FCMPL | FCMPG => Some((2, Some(Integer))),
        IRETURN | FRETURN | ARETURN | ATHROW | MONITORENTER | MONITOREXIT => Some((1, None)),
        LRETURN | DRETURN => Some((2, None)),
        RETURN => Some((0, None)),
        ARRAYLENGTH => Some((1, Some(Integer))),
        _ => None,
    };

    if let Some((pops, push)) = simple {
        frame.pop_n(pops)?;
        if let Some(value) = push {
            frame.push(value);
        }
        return Ok(());
    }

    match opcode {
        AALOAD => {
            frame.pop()?;
            let array = frame.pop()?;
            let element = match array {
                VType::Object(descriptor) => descriptor
                    .strip_prefix('[')
                    .and_then(element_reference)
                    .map_or(VType::Object(OBJECT.to_string()), VType::Object),
                _ => VType::Null,
            };
            frame.push(element);
        }
        DUP => {
            let v1 = frame.pop()?;
            frame.stack.extend([v1.clone(), v1]);
        }
        DUP_X1 => {
            let v1 = frame.pop()?;
            let v2 = frame.pop()?;
            frame.stack.extend([v1.clone(), v2, v1]);
        }
        DUP_X2 => {
            let v1 = frame.pop()?;
            let v2 = frame.pop()?;
            let v3 = frame.pop()?;
            frame.stack.extend([v1.clone(), v3, v2, v1]);
        }
        DUP2 => {
            let v1 = frame.pop()?;
            let v2 = frame.pop()?;
            frame.stack.extend([v2.clone(), v1.clone(), v2, v1]);
        }
        DUP2_X1 => {
            let v1 = frame.pop()?;
            let v2 = frame.pop()?;
            let v3 = frame.pop()?;
            frame.stack.extend([v2.clone(), v1.clone(), v3, v2, v1]);
        }
        DUP2_X2 => {
            let v1 = frame.pop()?;
            let v2 = frame.pop()?;
            let v3 = frame.pop()?;
            let v4 = frame.pop()?;
            frame.stack.extend([v2.clone(), v1.clone(), v4, v3, v2, v1]);
        }
        SWAP => {
            let v1 = frame.pop()?;
            let v2 = frame.pop()?;
            frame.stack.extend([v1, v2]);
        }
        other => return Err(malformed_error!("Unexpected opcode {:#x}", other)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::code::{insn::InsnList, TryCatchBlock};

    fn context<'a>(name: &'a str, descriptor: &'a str, access: MethodAccess) -> MethodContext<'a> {
        MethodContext {
            owner: "test/Owner",
            access,
            name,
            descriptor,
        }
    }

    struct Fixed;

    impl CommonSuperclass for Fixed {
        fn common_superclass(&self, _a: &str, _b: &str) -> Result<String> {
            Ok("test/Base".to_string())
        }
    }

    #[test]
    fn straight_line_maxs() {
        let code = Code {
            instructions: InsnList::from_iter([
                Insn::var(LLOAD, 1),
                Insn::var(LLOAD, 1),
                Insn::op(LADD),
                Insn::op(LRETURN),
            ]),
            ..Code::default()
        };
        let method = context("twice", "(J)J", MethodAccess::empty());
        let analysis = analyze(&method, &code, &ObjectSuperclass).unwrap();

        assert_eq!(analysis.max_stack, 4);
        assert_eq!(analysis.max_locals, 3);
        assert!(analysis.frames.iter().all(Option::is_some));
    }

    #[test]
    fn merges_references_at_join() {
        let mut instructions = InsnList::new();
        let other = instructions.new_label();
        let join = instructions.new_label();
        instructions.extend([
            Insn::var(ILOAD, 0),
            Insn::jump(IFEQ, other),
            Insn::type_insn(NEW, "test/Left"),
            Insn::jump(GOTO, join),
            Insn::Label(other),
            Insn::type_insn(NEW, "test/Right"),
            Insn::Label(join),
            Insn::op(ARETURN),
        ]);
        // uninitialized values differ, so the join degrades them to top
        let code = Code {
            instructions,
            ..Code::default()
        };
        let method = context("pick", "(Z)Ljava/lang/Object;", MethodAccess::STATIC);
        let analysis = analyze(&method, &code, &Fixed).unwrap();
        assert_eq!(analysis.frames[6].as_ref().unwrap().stack, vec![VType::Top]);
    }

    #[test]
    fn common_superclass_is_consulted() {
        let mut instructions = InsnList::new();
        let other = instructions.new_label();
        let join = instructions.new_label();
        instructions.extend([
            Insn::var(ILOAD, 0),
            Insn::jump(IFEQ, other),
            Insn::var(ALOAD, 1),
            Insn::jump(GOTO, join),
            Insn::Label(other),
            Insn::var(ALOAD, 2),
            Insn::Label(join),
            Insn::op(ARETURN),
        ]);
        let code = Code {
            instructions,
            ..Code::default()
        };
        let method = context(
            "pick",
            "(ZLtest/Left;Ltest/Right;)Ljava/lang/Object;",
            MethodAccess::STATIC,
        );
        let analysis = analyze(&method, &code, &Fixed).unwrap();
        assert_eq!(
            analysis.frames[6].as_ref().unwrap().stack,
            vec![VType::Object("test/Base".to_string())]
        );
    }

    #[test]
    fn constructor_initializes_this() {
        let code = Code {
            instructions: InsnList::from_iter([
                Insn::var(ALOAD, 0),
                Insn::method(INVOKESPECIAL, OBJECT, "<init>", "()V"),
                Insn::var(ALOAD, 0),
                Insn::op(POP),
                Insn::op(RETURN),
            ]),
            ..Code::default()
        };
        let method = context("<init>", "()V", MethodAccess::PUBLIC);
        let analysis = analyze(&method, &code, &ObjectSuperclass).unwrap();

        assert_eq!(
            analysis.frames[0].as_ref().unwrap().locals,
            vec![VType::UninitializedThis]
        );
        assert_eq!(
            analysis.frames[2].as_ref().unwrap().locals,
            vec![VType::Object("test/Owner".to_string())]
        );
    }

    #[test]
    fn new_dup_init_sequence() {
        let code = Code {
            instructions: InsnList::from_iter([
                Insn::type_insn(NEW, "java/sql/SQLException"),
                Insn::op(DUP),
                Insn::ldc_string("blocked"),
                Insn::ldc_string("08001"),
                Insn::method(
                    INVOKESPECIAL,
                    "java/sql/SQLException",
                    "<init>",
                    "(Ljava/lang/String;Ljava/lang/String;)V",
                ),
                Insn::op(ATHROW),
            ]),
            ..Code::default()
        };
        let method = context("fail", "()V", MethodAccess::STATIC);
        let analysis = analyze(&method, &code, &ObjectSuperclass).unwrap();

        assert_eq!(analysis.max_stack, 4);
        assert_eq!(
            analysis.frames[5].as_ref().unwrap().stack,
            vec![VType::Object("java/sql/SQLException".to_string())]
        );
    }

    #[test]
    fn unreachable_code_has_no_frame() {
        let code = Code {
            instructions: InsnList::from_iter([
                Insn::op(RETURN),
                Insn::op(NOP),
                Insn::op(RETURN),
            ]),
            ..Code::default()
        };
        let method = context("dead", "()V", MethodAccess::STATIC);
        let analysis = analyze(&method, &code, &ObjectSuperclass).unwrap();
        assert!(analysis.frames[1].is_none());
        assert!(analysis.frames[2].is_none());
    }

    #[test]
    fn handler_frame_from_locals() {
        let mut instructions = InsnList::new();
        let start = instructions.new_label();
        let end = instructions.new_label();
        let handler = instructions.new_label();
        instructions.extend([
            Insn::Label(start),
            Insn::iconst(1),
            Insn::var(ISTORE, 0),
            Insn::op(RETURN),
            Insn::Label(end),
            Insn::Label(handler),
            Insn::op(ATHROW),
        ]);
        let code = Code {
            instructions,
            try_catch_blocks: vec![TryCatchBlock {
                start,
                end,
                handler,
                catch_type: Some("java/io/IOException".to_string()),
            }],
            ..Code::default()
        };
        let method = context("guarded", "()V", MethodAccess::STATIC);
        let analysis = analyze(&method, &code, &ObjectSuperclass).unwrap();

        let frame = analysis.frames[5].as_ref().unwrap();
        assert_eq!(
            frame.stack,
            vec![VType::Object("java/io/IOException".to_string())]
        );
        // the store happened in one path and not the other
        assert!(frame.locals.is_empty());
    }

    #[test]
    fn falls_off_end() {
        let code = Code {
            instructions: InsnList::from_iter([Insn::op(NOP)]),
            ..Code::default()
        };
        let method = context("bad", "()V", MethodAccess::STATIC);
        assert!(analyze(&method, &code, &ObjectSuperclass).is_err());
    }

    #[test]
    fn array_merges() {
        assert_eq!(
            merge_references("[Ltest/A;", "[Ltest/B;", &Fixed).unwrap(),
            "[Ltest/Base;"
        );
        assert_eq!(merge_references("[I", "[J", &Fixed).unwrap(), OBJECT);
        assert_eq!(
            merge_references("[[I", "[[J", &Fixed).unwrap(),
            "[Ljava/lang/Object;"
        );
        assert_eq!(merge_references("[I", "test/A", &Fixed).unwrap(), OBJECT);
    }
}
