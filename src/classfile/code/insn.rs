//! Symbolic instructions and the editable instruction stream.
//!
//! Instructions reference constants by value (owner, name, descriptor, literal) rather than by
//! pool index, and branch targets by [`Label`], so patch actions can insert, move and delete
//! instructions freely. Offsets and indices are assigned again when the method is encoded.

use crate::{classfile::code::opcodes::*, Result};

/// A position in an instruction stream that branches and exception ranges can refer to.
///
/// Labels are placed in the stream with [`Insn::Label`] and allocated through
/// [`InsnList::new_label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub(crate) u32);

/// Stable identity of one node in an [`InsnList`].
///
/// Survives insertions and removals around the node, unlike its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

/// Operand of `ldc`, `ldc_w` and `ldc2_w`.
#[derive(Debug, Clone, PartialEq)]
pub enum LdcValue {
    /// `int` literal
    Int(i32),
    /// `float` literal
    Float(f32),
    /// `long` literal
    Long(i64),
    /// `double` literal
    Double(f64),
    /// `String` literal
    String(String),
    /// Class literal, internal name or array descriptor
    Type(String),
    /// Method type constant, as a method descriptor
    MethodType(String),
    /// Method handle constant, by index into the original constant pool
    Handle(u16),
    /// Dynamically computed constant, by index into the original constant pool
    Dynamic {
        /// Pool index of the `CONSTANT_Dynamic` entry
        index: u16,
        /// Field descriptor of the produced value
        descriptor: String,
    },
}

impl LdcValue {
    /// Returns `true` for values that need `ldc2_w`.
    #[must_use]
    pub fn is_wide(&self) -> bool {
        match self {
            LdcValue::Long(_) | LdcValue::Double(_) => true,
            LdcValue::Dynamic { descriptor, .. } => descriptor == "J" || descriptor == "D",
            _ => false,
        }
    }
}

/// `getstatic`, `putstatic`, `getfield` or `putfield`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldInsn {
    /// The opcode
    pub opcode: u8,
    /// Internal name of the declaring type
    pub owner: String,
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
}

/// `invokevirtual`, `invokespecial`, `invokestatic` or `invokeinterface`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodInsn {
    /// The opcode
    pub opcode: u8,
    /// Internal name of the declaring type
    pub owner: String,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// `true` if `owner` is an interface
    pub interface: bool,
}

/// `invokedynamic`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvokeDynamicInsn {
    /// Pool index of the `CONSTANT_InvokeDynamic` entry, whose bootstrap method lives in the
    /// class's raw `BootstrapMethods` attribute
    pub index: u16,
    /// Call site name
    pub name: String,
    /// Call site descriptor
    pub descriptor: String,
}

/// One node of an instruction stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    /// Branch target marker, occupies no bytes
    Label(Label),
    /// Instruction without operands
    Op(u8),
    /// `bipush`, `sipush` or `newarray`
    Int {
        /// The opcode
        opcode: u8,
        /// Immediate value, or the element type code for `newarray`
        value: i32,
    },
    /// Local variable load or store, or `ret`
    Var {
        /// The long-form opcode (`iload`, never `iload_0`)
        opcode: u8,
        /// Local variable index
        var: u16,
    },
    /// `iinc`
    Iinc {
        /// Local variable index
        var: u16,
        /// Signed increment
        increment: i16,
    },
    /// Conditional or unconditional branch, `jsr`
    Jump {
        /// The opcode (`goto`, never `goto_w`)
        opcode: u8,
        /// Branch target
        target: Label,
    },
    /// Constant load
    Ldc(LdcValue),
    /// `new`, `anewarray`, `checkcast` or `instanceof`
    Type {
        /// The opcode
        opcode: u8,
        /// Internal name or array descriptor
        descriptor: String,
    },
    /// Field access
    Field(FieldInsn),
    /// Method invocation
    Method(MethodInsn),
    /// Dynamic call site
    InvokeDynamic(InvokeDynamicInsn),
    /// `tableswitch`
    TableSwitch {
        /// Lowest key
        low: i32,
        /// Highest key
        high: i32,
        /// Target for keys outside `low..=high`
        default: Label,
        /// One target per key in `low..=high`
        targets: Vec<Label>,
    },
    /// `lookupswitch`
    LookupSwitch {
        /// Target for unlisted keys
        default: Label,
        /// Keys in ascending order
        keys: Vec<i32>,
        /// One target per key
        targets: Vec<Label>,
    },
    /// `multianewarray`
    MultiANewArray {
        /// Array descriptor
        descriptor: String,
        /// Number of dimensions to allocate
        dimensions: u8,
    },
}

impl Insn {
    /// An instruction without operands.
    #[must_use]
    pub fn op(opcode: u8) -> Insn {
        Insn::Op(opcode)
    }

    /// Pushes the `int` constant `value` using the shortest encoding.
    #[must_use]
    pub fn iconst(value: i32) -> Insn {
        match value {
            -1..=5 => Insn::Op((i32::from(ICONST_0) + value) as u8),
            -128..=127 => Insn::Int {
                opcode: BIPUSH,
                value,
            },
            -32768..=32767 => Insn::Int {
                opcode: SIPUSH,
                value,
            },
            _ => Insn::Ldc(LdcValue::Int(value)),
        }
    }

    /// A local variable instruction.
    #[must_use]
    pub fn var(opcode: u8, var: u16) -> Insn {
        Insn::Var { opcode, var }
    }

    /// A branch to `target`.
    #[must_use]
    pub fn jump(opcode: u8, target: Label) -> Insn {
        Insn::Jump { opcode, target }
    }

    /// Loads the string literal `value`.
    #[must_use]
    pub fn ldc_string(value: impl Into<String>) -> Insn {
        Insn::Ldc(LdcValue::String(value.into()))
    }

    /// A type instruction such as `new` or `checkcast`.
    #[must_use]
    pub fn type_insn(opcode: u8, descriptor: impl Into<String>) -> Insn {
        Insn::Type {
            opcode,
            descriptor: descriptor.into(),
        }
    }

    /// A field access.
    #[must_use]
    pub fn field(
        opcode: u8,
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Insn {
        Insn::Field(FieldInsn {
            opcode,
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        })
    }

    /// A method invocation on a class.
    #[must_use]
    pub fn method(
        opcode: u8,
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Insn {
        Insn::Method(MethodInsn {
            opcode,
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
            interface: opcode == INVOKEINTERFACE,
        })
    }

    /// Returns the opcode, or `None` for labels.
    #[must_use]
    pub fn opcode(&self) -> Option<u8> {
        Some(match self {
            Insn::Label(_) => return None,
            Insn::Op(opcode)
            | Insn::Int { opcode, .. }
            | Insn::Var { opcode, .. }
            | Insn::Jump { opcode, .. }
            | Insn::Type { opcode, .. } => *opcode,
            Insn::Iinc { .. } => IINC,
            Insn::Ldc(_) => LDC,
            Insn::Field(field) => field.opcode,
            Insn::Method(method) => method.opcode,
            Insn::InvokeDynamic(_) => INVOKEDYNAMIC,
            Insn::TableSwitch { .. } => TABLESWITCH,
            Insn::LookupSwitch { .. } => LOOKUPSWITCH,
            Insn::MultiANewArray { .. } => MULTIANEWARRAY,
        })
    }

    /// Returns `true` if execution never falls through to the next instruction.
    #[must_use]
    pub fn ends_flow(&self) -> bool {
        match self {
            Insn::Op(op) => matches!(
                *op,
                IRETURN | LRETURN | FRETURN | DRETURN | ARETURN | RETURN | ATHROW
            ),
            Insn::Jump { opcode, .. } => *opcode == GOTO,
            Insn::Var { opcode, .. } => *opcode == RET,
            Insn::TableSwitch { .. } | Insn::LookupSwitch { .. } => true,
            _ => false,
        }
    }

    /// Returns the branch targets of this instruction, fallthrough excluded.
    #[must_use]
    pub fn targets(&self) -> Vec<Label> {
        match self {
            Insn::Jump { target, .. } => vec![*target],
            Insn::TableSwitch {
                default, targets, ..
            }
            | Insn::LookupSwitch {
                default, targets, ..
            } => {
                let mut all = Vec::with_capacity(targets.len() + 1);
                all.push(*default);
                all.extend_from_slice(targets);
                all
            }
            _ => Vec::new(),
        }
    }

    /// Returns the field access, if this is one.
    #[must_use]
    pub fn as_field(&self) -> Option<&FieldInsn> {
        match self {
            Insn::Field(field) => Some(field),
            _ => None,
        }
    }

    /// Returns the method invocation, if this is one.
    #[must_use]
    pub fn as_method(&self) -> Option<&MethodInsn> {
        match self {
            Insn::Method(method) => Some(method),
            _ => None,
        }
    }
}

/// A node of an [`InsnList`].
#[derive(Debug, Clone, PartialEq)]
pub struct InsnNode {
    id: NodeId,
    /// The instruction
    pub insn: Insn,
}

impl InsnNode {
    /// Returns the stable identity of this node.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }
}

/// Ordered, editable instruction stream of one method body.
#[derive(Debug, Clone, Default)]
pub struct InsnList {
    nodes: Vec<InsnNode>,
    next_id: u32,
    next_label: u32,
}

impl InsnList {
    /// Creates an empty stream.
    #[must_use]
    pub fn new() -> InsnList {
        InsnList::default()
    }

    pub(crate) fn with_label_base(next_label: u32) -> InsnList {
        InsnList {
            next_label,
            ..InsnList::default()
        }
    }

    /// Allocates a label that is unique within this stream.
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    fn node(&mut self, insn: Insn) -> InsnNode {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        InsnNode { id, insn }
    }

    /// Number of nodes, labels included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the stream holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over the instructions in order.
    pub fn iter(&self) -> impl Iterator<Item = &Insn> {
        self.nodes.iter().map(|node| &node.insn)
    }

    /// Returns the nodes in order.
    #[must_use]
    pub fn nodes(&self) -> &[InsnNode] {
        &self.nodes
    }

    /// Returns the ids of all nodes, in order.
    #[must_use]
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|node| node.id).collect()
    }

    /// Returns the current index of node `id`.
    #[must_use]
    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.nodes.iter().position(|node| node.id == id)
    }

    /// Returns the instruction of node `id`.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Insn> {
        self.position(id).map(|index| &self.nodes[index].insn)
    }

    /// Returns the instruction of node `id` for modification.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Insn> {
        let index = self.position(id)?;
        Some(&mut self.nodes[index].insn)
    }

    /// Appends `insn` and returns its id.
    pub fn push(&mut self, insn: Insn) -> NodeId {
        let node = self.node(insn);
        let id = node.id;
        self.nodes.push(node);
        id
    }

    /// Appends every instruction of `insns`.
    pub fn extend(&mut self, insns: impl IntoIterator<Item = Insn>) {
        for insn in insns {
            self.push(insn);
        }
    }

    /// Inserts `insns` at `index`, shifting later nodes back.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `index` is past the end.
    pub fn insert_at(&mut self, index: usize, insns: impl IntoIterator<Item = Insn>) -> Result<()> {
        if index > self.nodes.len() {
            return Err(out_of_bounds_error!());
        }
        let new: Vec<InsnNode> = insns.into_iter().map(|insn| self.node(insn)).collect();
        self.nodes.splice(index..index, new);
        Ok(())
    }

    /// Inserts `insns` directly before node `id`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `id` is not part of this stream.
    pub fn insert_before(&mut self, id: NodeId, insns: impl IntoIterator<Item = Insn>) -> Result<()> {
        let index = self
            .position(id)
            .ok_or_else(|| malformed_error!("Unknown instruction node {:?}", id))?;
        self.insert_at(index, insns)
    }

    /// Inserts `insns` directly after node `id`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `id` is not part of this stream.
    pub fn insert_after(&mut self, id: NodeId, insns: impl IntoIterator<Item = Insn>) -> Result<()> {
        let index = self
            .position(id)
            .ok_or_else(|| malformed_error!("Unknown instruction node {:?}", id))?;
        self.insert_at(index + 1, insns)
    }

    /// Removes node `id` and returns its instruction.
    pub fn remove(&mut self, id: NodeId) -> Option<Insn> {
        let index = self.position(id)?;
        Some(self.nodes.remove(index).insn)
    }

    /// Removes every node. Labels allocated so far stay reserved.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

impl FromIterator<Insn> for InsnList {
    fn from_iter<T: IntoIterator<Item = Insn>>(iter: T) -> Self {
        let mut list = InsnList::new();
        list.extend(iter);
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iconst_picks_shortest_form() {
        assert_eq!(Insn::iconst(-1), Insn::Op(ICONST_M1));
        assert_eq!(Insn::iconst(5), Insn::Op(ICONST_5));
        assert_eq!(
            Insn::iconst(100),
            Insn::Int {
                opcode: BIPUSH,
                value: 100
            }
        );
        assert_eq!(
            Insn::iconst(1000),
            Insn::Int {
                opcode: SIPUSH,
                value: 1000
            }
        );
        assert_eq!(Insn::iconst(1 << 20), Insn::Ldc(LdcValue::Int(1 << 20)));
    }

    #[test]
    fn insert_around_stable_ids() {
        let mut list = InsnList::new();
        let first = list.push(Insn::op(ACONST_NULL));
        let last = list.push(Insn::op(ARETURN));

        list.insert_before(last, [Insn::op(NOP)]).unwrap();
        list.insert_after(first, [Insn::op(DUP), Insn::op(POP)]).unwrap();

        let opcodes: Vec<_> = list.iter().filter_map(Insn::opcode).collect();
        assert_eq!(opcodes, vec![ACONST_NULL, DUP, POP, NOP, ARETURN]);
        assert_eq!(list.position(last), Some(4));
        assert_eq!(list.get(first), Some(&Insn::op(ACONST_NULL)));

        assert_eq!(list.remove(first), Some(Insn::op(ACONST_NULL)));
        assert!(list.insert_after(first, [Insn::op(NOP)]).is_err());
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn labels_are_unique() {
        let mut list = InsnList::with_label_base(3);
        let a = list.new_label();
        let b = list.new_label();
        assert_eq!(a, Label(3));
        assert_ne!(a, b);

        list.clear();
        assert_ne!(list.new_label(), a);
    }

    #[test]
    fn flow_queries() {
        let mut list = InsnList::new();
        let target = list.new_label();
        assert!(Insn::op(ATHROW).ends_flow());
        assert!(Insn::jump(GOTO, target).ends_flow());
        assert!(!Insn::jump(IFEQ, target).ends_flow());
        assert_eq!(Insn::jump(IFEQ, target).targets(), vec![target]);
        assert!(Insn::method(INVOKEINTERFACE, "a/I", "m", "()V")
            .as_method()
            .unwrap()
            .interface);
    }
}
