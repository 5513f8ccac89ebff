//! Decoded JVM instructions.
//!
//! An [`Instruction`] is a position in one revision of a method body plus its decoded operand.
//! Offsets are byte offsets from the start of the `code` array; they are only meaningful for the
//! revision the instruction was decoded from.

use std::fmt;

use crate::assembly::opcodes::{
    BIPUSH, GETFIELD, GETSTATIC, GOTO, GOTO_W, ICONST_5, ICONST_M1, INVOKEINTERFACE,
    INVOKEVIRTUAL, JSR, JSR_W, PUTFIELD, PUTSTATIC, SIPUSH,
};

/// The decoded operand of an instruction.
///
/// Implicit operands (`iconst_3`, `aload_0`) are not represented here; see
/// [`Instruction::int_literal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// No operand
    None,
    /// Immediate of `bipush` / `sipush`
    Int(i32),
    /// Local variable index
    Local(u16),
    /// Constant pool index
    Pool(u16),
    /// Branch offset relative to the instruction start
    Branch(i32),
    /// `iinc` local index and increment
    Iinc {
        /// Local variable index
        index: u16,
        /// Signed increment
        delta: i16,
    },
    /// `invokeinterface` pool index and argument slot count
    Interface {
        /// Constant pool index of the `InterfaceMethodref`
        index: u16,
        /// Argument slots including the receiver
        count: u8,
    },
    /// `invokedynamic` pool index
    Dynamic(u16),
    /// `newarray` primitive type code
    ArrayType(u8),
    /// `multianewarray` class and dimensions
    MultiArray {
        /// Constant pool index of the array class
        index: u16,
        /// Number of dimensions to create
        dimensions: u8,
    },
    /// `tableswitch` jump table, offsets relative to the instruction start
    TableSwitch {
        /// Default target
        default: i32,
        /// Lowest case value
        low: i32,
        /// One offset per case value starting at `low`
        offsets: Vec<i32>,
    },
    /// `lookupswitch` match/offset pairs, offsets relative to the instruction start
    LookupSwitch {
        /// Default target
        default: i32,
        /// Sorted `(match, offset)` pairs
        pairs: Vec<(i32, i32)>,
    },
}

/// A decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Offset of the first byte (the `wide` prefix, if any)
    pub offset: u32,
    /// Opcode, never `wide`
    pub opcode: u8,
    /// Mnemonic as used by `javap`
    pub mnemonic: &'static str,
    /// Decoded operand
    pub operand: Operand,
    /// Encoded size in bytes, including switch padding and the `wide` prefix
    pub size: u32,
    /// Whether the instruction carried the `wide` prefix
    pub wide: bool,
}

impl Instruction {
    /// Offset of the next instruction.
    #[must_use]
    pub fn end(&self) -> u32 {
        self.offset + self.size
    }

    /// Returns true for instructions with relative jump offsets, switches included.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self.operand,
            Operand::Branch(_) | Operand::TableSwitch { .. } | Operand::LookupSwitch { .. }
        )
    }

    /// Returns true for `tableswitch` and `lookupswitch`.
    #[must_use]
    pub fn is_switch(&self) -> bool {
        matches!(
            self.operand,
            Operand::TableSwitch { .. } | Operand::LookupSwitch { .. }
        )
    }

    /// Returns true for branches that use a 32-bit offset.
    #[must_use]
    pub fn is_wide_branch(&self) -> bool {
        matches!(self.opcode, GOTO_W | JSR_W)
    }

    /// Returns true for unconditional jumps and subroutine calls.
    #[must_use]
    pub fn is_jump(&self) -> bool {
        matches!(self.opcode, GOTO | JSR | GOTO_W | JSR_W)
    }

    /// Absolute targets of all relative offsets this instruction carries.
    ///
    /// Values are returned as `i64` so a corrupt offset pointing before the method start is
    /// visible to the caller instead of wrapping.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<i64> {
        let base = i64::from(self.offset);
        match &self.operand {
            Operand::Branch(relative) => vec![base + i64::from(*relative)],
            Operand::TableSwitch {
                default, offsets, ..
            } => std::iter::once(default)
                .chain(offsets)
                .map(|relative| base + i64::from(*relative))
                .collect(),
            Operand::LookupSwitch { default, pairs } => std::iter::once(default)
                .chain(pairs.iter().map(|(_, relative)| relative))
                .map(|relative| base + i64::from(*relative))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Returns true for `invokevirtual`, `invokespecial`, `invokestatic` and `invokeinterface`.
    #[must_use]
    pub fn is_invoke(&self) -> bool {
        (INVOKEVIRTUAL..=INVOKEINTERFACE).contains(&self.opcode)
    }

    /// Returns true for `getstatic`, `putstatic`, `getfield` and `putfield`.
    #[must_use]
    pub fn is_field_access(&self) -> bool {
        matches!(self.opcode, GETSTATIC | PUTSTATIC | GETFIELD | PUTFIELD)
    }

    /// Constant pool index referenced by the operand, if any.
    #[must_use]
    pub fn pool_index(&self) -> Option<u16> {
        match self.operand {
            Operand::Pool(index)
            | Operand::Dynamic(index)
            | Operand::Interface { index, .. }
            | Operand::MultiArray { index, .. } => Some(index),
            _ => None,
        }
    }

    /// The integer pushed by `iconst_*`, `bipush` or `sipush`.
    #[must_use]
    pub fn int_literal(&self) -> Option<i32> {
        match (self.opcode, &self.operand) {
            (ICONST_M1..=ICONST_5, _) => Some(i32::from(self.opcode) - i32::from(ICONST_M1) - 1),
            (BIPUSH | SIPUSH, Operand::Int(value)) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>5}: ", self.offset)?;
        if self.wide {
            write!(f, "wide ")?;
        }
        write!(f, "{}", self.mnemonic)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Int(value) => write!(f, " {value}"),
            Operand::Local(index) => write!(f, " {index}"),
            Operand::Pool(index) | Operand::Dynamic(index) => write!(f, " #{index}"),
            Operand::Branch(_) => match self.branch_targets().first() {
                Some(target) => write!(f, " {target}"),
                None => Ok(()),
            },
            Operand::Iinc { index, delta } => write!(f, " {index}, {delta}"),
            Operand::Interface { index, count } => write!(f, " #{index}, {count}"),
            Operand::ArrayType(code) => write!(f, " {code}"),
            Operand::MultiArray { index, dimensions } => write!(f, " #{index}, {dimensions}"),
            Operand::TableSwitch { low, offsets, .. } => {
                write!(f, " {low}..+{}", offsets.len())
            }
            Operand::LookupSwitch { pairs, .. } => write!(f, " [{} cases]", pairs.len()),
        }
    }
}
