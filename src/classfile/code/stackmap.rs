//! `StackMapTable` serialization.
//!
//! Frames are written as deltas against the previous frame, using the most compact of the
//! `same`, `same_locals_1_stack_item`, `chop`, `append` and `full_frame` forms.

use std::collections::BTreeMap;

use crate::{
    classfile::{
        code::frames::{Frame, VType},
        constant::ConstantPool,
    },
    file::io::ByteSink,
    Result,
};

const SAME_EXTENDED: u8 = 251;
const SAME_LOCALS_1_STACK_ITEM: u8 = 64;
const SAME_LOCALS_1_STACK_ITEM_EXTENDED: u8 = 247;
const FULL_FRAME: u8 = 255;

/// Collapses two-slot values into single verification types and drops trailing unusable locals.
fn compact(slots: &[VType], trim: bool) -> Vec<VType> {
    let mut types = Vec::with_capacity(slots.len());
    let mut index = 0;
    while index < slots.len() {
        let value = &slots[index];
        types.push(value.clone());
        index += if matches!(value, VType::Long | VType::Double) {
            2
        } else {
            1
        };
    }
    if trim {
        while types.last() == Some(&VType::Top) {
            types.pop();
        }
    }
    types
}

fn write_type(
    out: &mut Vec<u8>,
    value: &VType,
    pool: &mut ConstantPool,
    offset_of: &dyn Fn(usize) -> u32,
) -> Result<()> {
    match value {
        VType::Top => out.put(0u8),
        VType::Integer => out.put(1u8),
        VType::Float => out.put(2u8),
        VType::Double => out.put(3u8),
        VType::Long => out.put(4u8),
        VType::Null => out.put(5u8),
        VType::UninitializedThis => out.put(6u8),
        VType::Object(name) => {
            out.put(7u8);
            out.put(pool.class_index(name)?);
        }
        VType::Uninitialized(node) => {
            out.put(8u8);
            out.put(offset_of(*node) as u16);
        }
    }
    Ok(())
}

/// Writes the body of a `StackMapTable` attribute, entry count included.
///
/// `frames` maps bytecode offsets to the frame at that offset, `initial` is the implicit frame
/// on method entry, and `offset_of` translates the node index recorded in
/// [`VType::Uninitialized`] to the offset of its `new` instruction.
///
/// # Errors
/// Fails if the constant pool overflows.
pub(crate) fn write_stack_map(
    frames: &BTreeMap<u32, Frame>,
    initial: &Frame,
    pool: &mut ConstantPool,
    offset_of: &dyn Fn(usize) -> u32,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.put(frames.len() as u16);

    let mut previous_locals = compact(&initial.locals, true);
    let mut previous_offset: Option<u32> = None;

    for (&offset, frame) in frames {
        let delta = match previous_offset {
            None => offset,
            Some(previous) => offset - previous - 1,
        };
        let delta = delta as u16;
        let locals = compact(&frame.locals, true);
        let stack = compact(&frame.stack, false);

        let same_locals = locals == previous_locals;
        let common = locals
            .iter()
            .zip(&previous_locals)
            .take_while(|(a, b)| a == b)
            .count();

        if same_locals && stack.is_empty() {
            if delta < 64 {
                out.put(delta as u8);
            } else {
                out.put(SAME_EXTENDED);
                out.put(delta);
            }
        } else if same_locals && stack.len() == 1 {
            if delta < 64 {
                out.put(SAME_LOCALS_1_STACK_ITEM + delta as u8);
            } else {
                out.put(SAME_LOCALS_1_STACK_ITEM_EXTENDED);
                out.put(delta);
            }
            write_type(&mut out, &stack[0], pool, offset_of)?;
        } else if stack.is_empty()
            && common == locals.len()
            && previous_locals.len() > locals.len()
            && previous_locals.len() - locals.len() <= 3
        {
            out.put(SAME_EXTENDED - (previous_locals.len() - locals.len()) as u8);
            out.put(delta);
        } else if stack.is_empty()
            && common == previous_locals.len()
            && locals.len() > previous_locals.len()
            && locals.len() - previous_locals.len() <= 3
        {
            out.put(SAME_EXTENDED + (locals.len() - previous_locals.len()) as u8);
            out.put(delta);
            for value in &locals[previous_locals.len()..] {
                write_type(&mut out, value, pool, offset_of)?;
            }
        } else {
            out.put(FULL_FRAME);
            out.put(delta);
            out.put(locals.len() as u16);
            for value in &locals {
                write_type(&mut out, value, pool, offset_of)?;
            }
            out.put(stack.len() as u16);
            for value in &stack {
                write_type(&mut out, value, pool, offset_of)?;
            }
        }

        previous_locals = locals;
        previous_offset = Some(offset);
    }

    Ok(out)
}
