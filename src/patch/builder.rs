//! Construction of injected instruction sequences.
//!
//! A [`PatchBuilder`] records primitives with known stack effects and checks the running stack
//! depth as each one is added, so a sequence that would underflow or leave the wrong number of
//! values behind is rejected when the patch is written, not when the host runs it. The result is
//! a symbolic [`Sequence`]: member references and named locals stay unresolved until the
//! sequence is assembled against a concrete method with [`Sequence::assemble`].
//!
//! The builder emits straight-line code only; there are no branch primitives.
//!
//! # Examples
//!
//! ```rust
//! use classweave::patch::{PatchBuilder, ValueKind};
//!
//! // return 0
//! let body = PatchBuilder::new().push_int(0)?.return_value(ValueKind::Int)?.build()?;
//! assert_eq!(body.peak(), 1);
//!
//! // value * 4, applied to an int already on the stack
//! let scaled = PatchBuilder::consuming(1).push_int(4)?.int_op(classweave::patch::IntOp::Mul)?.build()?;
//! assert_eq!(scaled.delta(), 0);
//! # Ok::<(), classweave::Error>(())
//! ```

use crate::{
    assembly::opcodes::{
        ACONST_NULL, ARRAYLENGTH, BIPUSH, DUP, FCONST_0, GETFIELD, GETSTATIC, IADD, ICONST_0,
        IDIV, ILOAD, ILOAD_0, IMUL, INVOKEINTERFACE, INVOKESPECIAL, INVOKESTATIC, INVOKEVIRTUAL,
        IREM, IRETURN, ISTORE, ISTORE_0, ISUB, LDC, LDC_W, POP, POP2, PUTFIELD, PUTSTATIC, RETURN,
        SIPUSH, WIDE,
    },
    classfile::{ClassFile, FieldType, MethodDescriptor},
    file::writer::Writer,
    patch::{
        catalog::{SymbolCatalog, SymbolKey, SymbolRef},
        slots::SlotResolver,
    },
    Error, Result,
};

/// The computational type of a value, selecting the typed opcode family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `int`, `boolean`, `byte`, `char`, `short`
    Int,
    /// `long`
    Long,
    /// `float`
    Float,
    /// `double`
    Double,
    /// Any reference
    Reference,
}

impl ValueKind {
    /// Stack and local slots taken by a value of this kind.
    #[must_use]
    pub fn width(self) -> u16 {
        match self {
            ValueKind::Long | ValueKind::Double => 2,
            _ => 1,
        }
    }

    /// The kind of a value of field type `field`.
    #[must_use]
    pub fn of(field: &FieldType) -> Self {
        match field {
            FieldType::Long => ValueKind::Long,
            FieldType::Float => ValueKind::Float,
            FieldType::Double => ValueKind::Double,
            FieldType::Object(_) | FieldType::Array(_) => ValueKind::Reference,
            _ => ValueKind::Int,
        }
    }

    // Position within the i/l/f/d/a opcode families.
    fn family(self) -> u8 {
        match self {
            ValueKind::Int => 0,
            ValueKind::Long => 1,
            ValueKind::Float => 2,
            ValueKind::Double => 3,
            ValueKind::Reference => 4,
        }
    }
}

/// A local variable, by slot or by debug name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocalRef {
    /// A fixed slot
    Slot(u16),
    /// Resolved through the `LocalVariableTable` at the splice offset
    Named(String),
}

impl From<u16> for LocalRef {
    fn from(slot: u16) -> Self {
        LocalRef::Slot(slot)
    }
}

impl From<&str> for LocalRef {
    fn from(name: &str) -> Self {
        LocalRef::Named(name.to_string())
    }
}

/// The invocation instruction to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    /// `invokestatic`
    Static,
    /// `invokevirtual`
    Virtual,
    /// `invokespecial`
    Special,
    /// `invokeinterface`
    Interface,
}

impl InvokeKind {
    fn opcode(self) -> u8 {
        match self {
            InvokeKind::Static => INVOKESTATIC,
            InvokeKind::Virtual => INVOKEVIRTUAL,
            InvokeKind::Special => INVOKESPECIAL,
            InvokeKind::Interface => INVOKEINTERFACE,
        }
    }
}

/// Binary `int` arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum IntOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl IntOp {
    fn opcode(self) -> u8 {
        match self {
            IntOp::Add => IADD,
            IntOp::Sub => ISUB,
            IntOp::Mul => IMUL,
            IntOp::Div => IDIV,
            IntOp::Rem => IREM,
        }
    }
}

/// An `int` operand of [`PatchBuilder::min`] / [`PatchBuilder::max`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IntArg {
    /// A literal, pushed with [`PatchBuilder::push_int`]
    Literal(i32),
    /// An `int` local
    Local(LocalRef),
    /// A value already on the stack
    OnStack,
}

impl From<i32> for IntArg {
    fn from(value: i32) -> Self {
        IntArg::Literal(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Op {
    Simple(u8),
    Byte(i8),
    Short(i16),
    PooledInt(i32),
    PooledFloat(u32),
    Invoke {
        kind: InvokeKind,
        symbol: SymbolRef,
        arg_slots: u16,
    },
    Field {
        opcode: u8,
        symbol: SymbolRef,
    },
    Local {
        kind: ValueKind,
        store: bool,
        local: LocalRef,
    },
}

/// Records primitives and tracks the stack depth relative to the splice point.
#[derive(Debug, Clone, Default)]
pub struct PatchBuilder {
    ops: Vec<Op>,
    consumes: u16,
    depth: i32,
    peak: i32,
}

impl PatchBuilder {
    /// A builder for a sequence that starts with no values of its own on the stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder for a sequence that takes over `n` slots already on the stack at the splice
    /// point, e.g. the value produced by the preceding instruction.
    #[must_use]
    pub fn consuming(n: u16) -> Self {
        PatchBuilder {
            consumes: n,
            ..Self::default()
        }
    }

    fn effect(&mut self, pops: u16, pushes: u16) -> Result<()> {
        let available = self.depth + i32::from(self.consumes);
        if available < i32::from(pops) {
            return Err(Error::StackImbalance {
                expected: i32::from(pops),
                actual: available,
            });
        }
        self.depth += i32::from(pushes) - i32::from(pops);
        self.peak = self.peak.max(self.depth);
        Ok(())
    }

    fn push_op(&mut self, op: Op, pops: u16, pushes: u16) -> Result<&mut Self> {
        self.effect(pops, pushes)?;
        self.ops.push(op);
        Ok(self)
    }

    /// Push an `int` literal with the shortest of `iconst_*`, `bipush` and `sipush`.
    ///
    /// # Errors
    /// Returns [`crate::Error::EncodingOverflow`] outside the 16-bit range of `sipush`; use
    /// [`PatchBuilder::push_int_pooled`] for wider values.
    pub fn push_int(&mut self, value: i32) -> Result<&mut Self> {
        let op = match value {
            -1..=5 => Op::Simple(ICONST_0.wrapping_add_signed(value as i8)),
            _ => {
                if let Ok(byte) = i8::try_from(value) {
                    Op::Byte(byte)
                } else if let Ok(short) = i16::try_from(value) {
                    Op::Short(short)
                } else {
                    return Err(Error::EncodingOverflow {
                        value: i64::from(value),
                        min: i64::from(i16::MIN),
                        max: i64::from(i16::MAX),
                    });
                }
            }
        };
        self.push_op(op, 0, 1)
    }

    /// Push an `int` constant through the constant pool (`ldc` / `ldc_w`).
    ///
    /// # Errors
    /// Never fails; the signature matches the other primitives.
    pub fn push_int_pooled(&mut self, value: i32) -> Result<&mut Self> {
        self.push_op(Op::PooledInt(value), 0, 1)
    }

    /// Push `true` or `false`.
    ///
    /// # Errors
    /// Never fails; the signature matches the other primitives.
    pub fn push_bool(&mut self, value: bool) -> Result<&mut Self> {
        self.push_int(i32::from(value))
    }

    /// Push `null`.
    ///
    /// # Errors
    /// Never fails; the signature matches the other primitives.
    pub fn push_null(&mut self) -> Result<&mut Self> {
        self.push_op(Op::Simple(ACONST_NULL), 0, 1)
    }

    /// Push a `float`, using `fconst_*` for 0, 1 and 2.
    ///
    /// # Errors
    /// Never fails; the signature matches the other primitives.
    pub fn push_float(&mut self, value: f32) -> Result<&mut Self> {
        let bits = value.to_bits();
        let op = [0.0_f32, 1.0, 2.0]
            .iter()
            .position(|constant| constant.to_bits() == bits)
            .and_then(|position| u8::try_from(position).ok())
            .map_or(Op::PooledFloat(bits), |position| {
                Op::Simple(FCONST_0 + position)
            });
        self.push_op(op, 0, 1)
    }

    /// Invoke a method. The stack effect follows the descriptor: the receiver (unless static)
    /// and the arguments are popped, the return value is pushed.
    ///
    /// # Errors
    /// Returns [`crate::Error::SymbolNotResolvable`] for a malformed descriptor and
    /// [`crate::Error::StackImbalance`] if the arguments are not on the stack.
    pub fn invoke(&mut self, kind: InvokeKind, symbol: impl Into<SymbolRef>) -> Result<&mut Self> {
        let symbol = symbol.into();
        let descriptor = MethodDescriptor::parse(symbol.signature())
            .map_err(|_| Error::SymbolNotResolvable(symbol.to_string()))?;
        let receiver = u16::from(kind != InvokeKind::Static);
        let arg_slots = receiver + descriptor.param_slots();
        self.push_op(
            Op::Invoke {
                kind,
                symbol,
                arg_slots,
            },
            arg_slots,
            descriptor.return_width(),
        )
    }

    fn field(&mut self, opcode: u8, symbol: SymbolRef) -> Result<&mut Self> {
        let field = FieldType::parse(symbol.signature())
            .map_err(|_| Error::SymbolNotResolvable(symbol.to_string()))?;
        let width = field.slot_width();
        let (pops, pushes) = match opcode {
            GETSTATIC => (0, width),
            PUTSTATIC => (width, 0),
            GETFIELD => (1, width),
            _ => (1 + width, 0),
        };
        self.push_op(Op::Field { opcode, symbol }, pops, pushes)
    }

    /// Read an instance field of the object on top of the stack.
    ///
    /// # Errors
    /// See [`PatchBuilder::invoke`].
    pub fn get_field(&mut self, symbol: impl Into<SymbolRef>) -> Result<&mut Self> {
        self.field(GETFIELD, symbol.into())
    }

    /// Write an instance field: pops the object and the value.
    ///
    /// # Errors
    /// See [`PatchBuilder::invoke`].
    pub fn put_field(&mut self, symbol: impl Into<SymbolRef>) -> Result<&mut Self> {
        self.field(PUTFIELD, symbol.into())
    }

    /// Read a static field.
    ///
    /// # Errors
    /// See [`PatchBuilder::invoke`].
    pub fn get_static(&mut self, symbol: impl Into<SymbolRef>) -> Result<&mut Self> {
        self.field(GETSTATIC, symbol.into())
    }

    /// Write a static field.
    ///
    /// # Errors
    /// See [`PatchBuilder::invoke`].
    pub fn put_static(&mut self, symbol: impl Into<SymbolRef>) -> Result<&mut Self> {
        self.field(PUTSTATIC, symbol.into())
    }

    /// Replace the array on top of the stack by its length.
    ///
    /// # Errors
    /// Returns [`crate::Error::StackImbalance`] on an empty stack.
    pub fn array_length(&mut self) -> Result<&mut Self> {
        self.push_op(Op::Simple(ARRAYLENGTH), 1, 1)
    }

    /// Push a local variable.
    ///
    /// # Errors
    /// Never fails at construction; named locals are resolved at assembly.
    pub fn load_local(&mut self, kind: ValueKind, local: impl Into<LocalRef>) -> Result<&mut Self> {
        let op = Op::Local {
            kind,
            store: false,
            local: local.into(),
        };
        self.push_op(op, 0, kind.width())
    }

    /// Pop the top of the stack into a local variable.
    ///
    /// # Errors
    /// Returns [`crate::Error::StackImbalance`] if the value is not on the stack.
    pub fn store_local(&mut self, kind: ValueKind, local: impl Into<LocalRef>) -> Result<&mut Self> {
        let op = Op::Local {
            kind,
            store: true,
            local: local.into(),
        };
        self.push_op(op, kind.width(), 0)
    }

    /// Combine the two `int`s on top of the stack.
    ///
    /// # Errors
    /// Returns [`crate::Error::StackImbalance`] if fewer than two values are available.
    pub fn int_op(&mut self, op: IntOp) -> Result<&mut Self> {
        self.push_op(Op::Simple(op.opcode()), 2, 1)
    }

    /// `Math.min(a, b)`.
    ///
    /// # Errors
    /// Propagates the errors of the operand pushes and the invocation.
    pub fn min(&mut self, a: impl Into<IntArg>, b: impl Into<IntArg>) -> Result<&mut Self> {
        self.math("min", a.into(), b.into())
    }

    /// `Math.max(a, b)`.
    ///
    /// # Errors
    /// Propagates the errors of the operand pushes and the invocation.
    pub fn max(&mut self, a: impl Into<IntArg>, b: impl Into<IntArg>) -> Result<&mut Self> {
        self.math("max", a.into(), b.into())
    }

    fn math(&mut self, name: &str, a: IntArg, b: IntArg) -> Result<&mut Self> {
        for arg in [a, b] {
            match arg {
                IntArg::Literal(value) => {
                    self.push_int(value)?;
                }
                IntArg::Local(local) => {
                    self.load_local(ValueKind::Int, local)?;
                }
                IntArg::OnStack => {}
            }
        }
        self.invoke(
            InvokeKind::Static,
            SymbolKey::method("java/lang/Math", name, "(II)I"),
        )
    }

    /// Discard the top value.
    ///
    /// # Errors
    /// Returns [`crate::Error::StackImbalance`] if the value is not on the stack.
    pub fn pop(&mut self, kind: ValueKind) -> Result<&mut Self> {
        let opcode = if kind.width() == 2 { POP2 } else { POP };
        self.push_op(Op::Simple(opcode), kind.width(), 0)
    }

    /// Duplicate the single-slot value on top of the stack.
    ///
    /// # Errors
    /// Returns [`crate::Error::StackImbalance`] on an empty stack.
    pub fn dup(&mut self) -> Result<&mut Self> {
        self.push_op(Op::Simple(DUP), 1, 2)
    }

    /// Return the value on top of the stack.
    ///
    /// # Errors
    /// Returns [`crate::Error::StackImbalance`] if the value is not on the stack.
    pub fn return_value(&mut self, kind: ValueKind) -> Result<&mut Self> {
        self.push_op(Op::Simple(IRETURN + kind.family()), kind.width(), 0)
    }

    /// Return from a `void` method.
    ///
    /// # Errors
    /// Never fails; the signature matches the other primitives.
    pub fn return_void(&mut self) -> Result<&mut Self> {
        self.push_op(Op::Simple(RETURN), 0, 0)
    }

    /// Finish a sequence that leaves the stack as it found it.
    ///
    /// # Errors
    /// Returns [`crate::Error::StackImbalance`] if the net effect is not zero.
    pub fn build(&self) -> Result<Sequence> {
        self.finish(0)
    }

    /// Finish a sequence that replaces a value-producing instruction and therefore leaves
    /// `width` additional slots on the stack.
    ///
    /// # Errors
    /// Returns [`crate::Error::StackImbalance`] if the net effect is not `width`.
    pub fn build_value(&self, width: u16) -> Result<Sequence> {
        self.finish(i32::from(width))
    }

    fn finish(&self, expected: i32) -> Result<Sequence> {
        if self.depth != expected {
            return Err(Error::StackImbalance {
                expected,
                actual: self.depth,
            });
        }
        Ok(Sequence {
            ops: self.ops.clone(),
            consumes: self.consumes,
            delta: self.depth,
            peak: u16::try_from(self.peak).unwrap_or(u16::MAX),
        })
    }
}

/// A checked, still symbolic instruction sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sequence {
    ops: Vec<Op>,
    consumes: u16,
    delta: i32,
    peak: u16,
}

/// A sequence encoded for one splice point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledSequence {
    /// Instruction bytes
    pub bytes: Vec<u8>,
    /// Slots taken over from the stack at the splice point
    pub consumes: u16,
    /// Net stack effect in slots
    pub delta: i32,
    /// Highest stack depth reached above the splice point
    pub peak: u16,
    /// Local slots needed to cover every local the sequence touches
    pub max_locals: u16,
}

impl Sequence {
    /// Net stack effect in slots.
    #[must_use]
    pub fn delta(&self) -> i32 {
        self.delta
    }

    /// Highest stack depth reached above the splice point.
    #[must_use]
    pub fn peak(&self) -> u16 {
        self.peak
    }

    /// Slots taken over from the stack at the splice point.
    #[must_use]
    pub fn consumes(&self) -> u16 {
        self.consumes
    }

    /// Returns true if the sequence has no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Member references used by the sequence.
    pub fn symbols(&self) -> impl Iterator<Item = &SymbolRef> {
        self.ops.iter().filter_map(|op| match op {
            Op::Invoke { symbol, .. } | Op::Field { symbol, .. } => Some(symbol),
            _ => None,
        })
    }

    /// Debug names of the locals used by the sequence.
    pub fn named_locals(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(|op| match op {
            Op::Local {
                local: LocalRef::Named(name),
                ..
            } => Some(name.as_str()),
            _ => None,
        })
    }

    /// Encode the sequence for a splice at offset `at` of a method of `class`.
    ///
    /// Member references are resolved through `catalog` (growing the class constant pool as
    /// needed) and named locals through `slots` at offset `at`.
    ///
    /// # Errors
    /// Returns [`crate::Error::SymbolNotResolvable`] and [`crate::Error::VariableNotFound`]
    /// for references that cannot be resolved and [`crate::Error::PoolOverflow`] if the
    /// constant pool is full.
    pub fn assemble(
        &self,
        catalog: &SymbolCatalog,
        class: &mut ClassFile,
        slots: &SlotResolver,
        at: u32,
    ) -> Result<AssembledSequence> {
        let mut writer = Writer::with_capacity(self.ops.len() * 3);
        let mut max_locals = 0_u16;

        for op in &self.ops {
            match op {
                Op::Simple(opcode) => writer.write_be(*opcode),
                Op::Byte(value) => {
                    writer.write_be(BIPUSH);
                    writer.write_be(*value);
                }
                Op::Short(value) => {
                    writer.write_be(SIPUSH);
                    writer.write_be(*value);
                }
                Op::PooledInt(value) => {
                    let index = class.constant_pool.integer_index(*value)?;
                    write_ldc(&mut writer, index);
                }
                Op::PooledFloat(bits) => {
                    let index = class.constant_pool.float_index(f32::from_bits(*bits))?;
                    write_ldc(&mut writer, index);
                }
                Op::Invoke {
                    kind,
                    symbol,
                    arg_slots,
                } => {
                    let index = pool_index(catalog, class, symbol)?;
                    writer.write_be(kind.opcode());
                    writer.write_be(index);
                    if *kind == InvokeKind::Interface {
                        let count = u8::try_from(*arg_slots)
                            .map_err(|_| Error::SymbolNotResolvable(symbol.to_string()))?;
                        writer.write_be(count);
                        writer.write_be(0_u8);
                    }
                }
                Op::Field { opcode, symbol } => {
                    let index = pool_index(catalog, class, symbol)?;
                    writer.write_be(*opcode);
                    writer.write_be(index);
                }
                Op::Local { kind, store, local } => {
                    let slot = match local {
                        LocalRef::Slot(slot) => *slot,
                        LocalRef::Named(name) => slots.resolve(name, at)?,
                    };
                    max_locals = max_locals.max(slot.saturating_add(kind.width()));
                    write_local(&mut writer, *kind, *store, slot);
                }
            }
        }

        Ok(AssembledSequence {
            bytes: writer.into_inner(),
            consumes: self.consumes,
            delta: self.delta,
            peak: self.peak,
            max_locals,
        })
    }
}

fn pool_index(catalog: &SymbolCatalog, class: &mut ClassFile, symbol: &SymbolRef) -> Result<u16> {
    let id = catalog.resolve(class, symbol)?;
    catalog
        .pool_index(id)
        .ok_or_else(|| Error::SymbolNotResolvable(symbol.to_string()))
}

fn write_ldc(writer: &mut Writer, index: u16) {
    match u8::try_from(index) {
        Ok(short) => {
            writer.write_be(LDC);
            writer.write_be(short);
        }
        Err(_) => {
            writer.write_be(LDC_W);
            writer.write_be(index);
        }
    }
}

fn write_local(writer: &mut Writer, kind: ValueKind, store: bool, slot: u16) {
    let (generic, short) = if store {
        (ISTORE, ISTORE_0)
    } else {
        (ILOAD, ILOAD_0)
    };
    let generic = generic + kind.family();

    match u8::try_from(slot) {
        Ok(slot @ 0..=3) => writer.write_be(short + kind.family() * 4 + slot),
        Ok(slot) => {
            writer.write_be(generic);
            writer.write_be(slot);
        }
        Err(_) => {
            writer.write_be(WIDE);
            writer.write_be(generic);
            writer.write_be(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{
            decode_stream,
            opcodes::{ALOAD_0, ASTORE, DSTORE_3, FCONST_2, ICONST_M1, LLOAD},
        },
        classfile::{CodeAttribute, FieldAccessFlags},
    };

    fn assemble(sequence: &Sequence) -> (ClassFile, AssembledSequence) {
        let mut class = ClassFile::new("host/Item", "java/lang/Object").unwrap();
        class
            .add_field(FieldAccessFlags::PRIVATE, "templateId", "I")
            .unwrap();
        let catalog = SymbolCatalog::new();
        let mut code = CodeAttribute::new(1, 2, vec![0x00; 8]);
        code.add_local_variable(&mut class.constant_pool, "pcost", "I", 0, 8, 6)
            .unwrap();
        let slots = SlotResolver::new(&code, &class.constant_pool).unwrap();
        let assembled = sequence.assemble(&catalog, &mut class, &slots, 4).unwrap();
        (class, assembled)
    }

    #[test]
    fn literal_encodings() {
        let cases: [(i32, Vec<u8>); 6] = [
            (-1, vec![ICONST_M1]),
            (5, vec![ICONST_0 + 5]),
            (6, vec![BIPUSH, 6]),
            (-128, vec![BIPUSH, 0x80]),
            (300, vec![SIPUSH, 0x01, 0x2C]),
            (-32768, vec![SIPUSH, 0x80, 0x00]),
        ];
        for (value, bytes) in cases {
            let sequence = PatchBuilder::new()
                .push_int(value)
                .unwrap()
                .build_value(1)
                .unwrap();
            assert_eq!(assemble(&sequence).1.bytes, bytes, "literal {value}");
        }

        for value in [32768, -32769, i32::MAX] {
            assert!(matches!(
                PatchBuilder::new().push_int(value),
                Err(Error::EncodingOverflow { min: -32768, max: 32767, .. })
            ));
        }
    }

    #[test]
    fn pooled_constants() {
        let sequence = PatchBuilder::new()
            .push_int_pooled(100_000)
            .unwrap()
            .push_float(2.0)
            .unwrap()
            .push_float(0.5)
            .unwrap()
            .build_value(3)
            .unwrap();
        let (class, assembled) = assemble(&sequence);
        let int_index = class.constant_pool.iter().find_map(|(index, entry)| {
            (*entry == crate::classfile::PoolEntry::Integer(100_000)).then_some(index)
        });
        let int_index = u8::try_from(int_index.unwrap()).unwrap();
        assert_eq!(&assembled.bytes[..3], &[LDC, int_index, FCONST_2]);
        assert_eq!(assembled.bytes[3], LDC);
    }

    #[test]
    fn locals_pick_the_short_forms() {
        let sequence = PatchBuilder::new()
            .load_local(ValueKind::Reference, 0_u16)
            .unwrap()
            .store_local(ValueKind::Reference, 9_u16)
            .unwrap()
            .load_local(ValueKind::Long, 300_u16)
            .unwrap()
            .store_local(ValueKind::Double, 3_u16)
            .unwrap()
            .push_int(0)
            .unwrap()
            .store_local(ValueKind::Int, "pcost")
            .unwrap()
            .build()
            .unwrap();
        let (_, assembled) = assemble(&sequence);
        assert_eq!(
            assembled.bytes,
            vec![ALOAD_0, ASTORE, 9, WIDE, LLOAD, 0x01, 0x2C, DSTORE_3, ICONST_0, ISTORE, 6]
        );
        assert_eq!(assembled.max_locals, 302);
        assert_eq!(assembled.peak, 2);
    }

    #[test]
    fn invocations_follow_descriptors() {
        let sequence = PatchBuilder::new()
            .min(IntArg::Local(LocalRef::Named("pcost".to_string())), 150)
            .unwrap()
            .pop(ValueKind::Int)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(sequence.peak(), 2);
        assert_eq!(sequence.symbols().count(), 1);
        assert_eq!(sequence.named_locals().collect::<Vec<_>>(), vec!["pcost"]);

        let (class, assembled) = assemble(&sequence);
        let instructions = decode_stream(&assembled.bytes).unwrap();
        let mnemonics: Vec<&str> = instructions.iter().map(|i| i.mnemonic).collect();
        assert_eq!(mnemonics, vec!["iload", "sipush", "invokestatic", "pop"]);
        let target = class
            .constant_pool
            .member_ref(instructions[2].pool_index().unwrap())
            .unwrap();
        assert_eq!(
            (target.owner, target.name, target.descriptor),
            ("java/lang/Math", "min", "(II)I")
        );
    }

    #[test]
    fn interface_calls_carry_argument_count() {
        let sequence = PatchBuilder::consuming(1)
            .push_int(1)
            .unwrap()
            .push_int(2)
            .unwrap()
            .invoke(
                InvokeKind::Interface,
                SymbolKey::interface_method("java/util/List", "set", "(ILjava/lang/Object;)Ljava/lang/Object;"),
            )
            .unwrap()
            .build()
            .unwrap();
        let (_, assembled) = assemble(&sequence);
        assert_eq!(assembled.bytes[2], INVOKEINTERFACE);
        assert_eq!(&assembled.bytes[5..], &[3, 0]);
        assert_eq!(assembled.consumes, 1);
    }

    #[test]
    fn stack_checks_happen_while_building() {
        assert!(matches!(
            PatchBuilder::new().int_op(IntOp::Add),
            Err(Error::StackImbalance {
                expected: 2,
                actual: 0
            })
        ));
        assert!(matches!(
            PatchBuilder::consuming(1).push_int(4).unwrap().int_op(IntOp::Mul).unwrap().int_op(IntOp::Mul),
            Err(Error::StackImbalance { .. })
        ));
        assert!(matches!(
            PatchBuilder::new().push_int(1).unwrap().build(),
            Err(Error::StackImbalance {
                expected: 0,
                actual: 1
            })
        ));
        assert!(matches!(
            PatchBuilder::new().push_null().unwrap().build_value(2),
            Err(Error::StackImbalance { .. })
        ));
        assert!(matches!(
            PatchBuilder::new().invoke(InvokeKind::Static, SymbolKey::method("Lib", "f", "(I")),
            Err(Error::SymbolNotResolvable(_))
        ));
        assert!(matches!(
            PatchBuilder::new().invoke(InvokeKind::Static, SymbolKey::method("Lib", "f", "(I)V")),
            Err(Error::StackImbalance { .. })
        ));
    }

    #[test]
    fn own_fields_resolve_against_the_class() {
        let sequence = PatchBuilder::new()
            .load_local(ValueKind::Reference, 0_u16)
            .unwrap()
            .get_field(SymbolRef::own_field("templateId", "I"))
            .unwrap()
            .return_value(ValueKind::Int)
            .unwrap()
            .build()
            .unwrap();
        let (class, assembled) = assemble(&sequence);
        assert_eq!(assembled.bytes[1], GETFIELD);
        let index = u16::from_be_bytes([assembled.bytes[2], assembled.bytes[3]]);
        let field = class.constant_pool.member_ref(index).unwrap();
        assert_eq!((field.owner, field.name), ("host/Item", "templateId"));
        assert_eq!(assembled.bytes[4], IRETURN);

        let missing = PatchBuilder::new()
            .get_static(SymbolRef::own_field("PVPSERVER", "Z"))
            .unwrap()
            .pop(ValueKind::Int)
            .unwrap()
            .build()
            .unwrap();
        let mut class = ClassFile::new("host/Item", "java/lang/Object").unwrap();
        assert!(matches!(
            missing.assemble(&SymbolCatalog::new(), &mut class, &SlotResolver::default(), 0),
            Err(Error::SymbolNotResolvable(_))
        ));
    }
}
