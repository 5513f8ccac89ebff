//! Instruction encoding, the reverse of [`crate::assembly::decode_instruction`].
//!
//! The encoder writes decoded [`Instruction`]s back to bytes. It is used after a splice, when
//! every instruction of a body is re-emitted with relocated branch offsets. Operands are written
//! exactly as given; no instruction is ever widened or shortened.

use crate::{
    assembly::{
        instruction::{Instruction, Operand},
        opcodes::{self, OperandKind, WIDE},
    },
    file::writer::Writer,
    Error, Result,
};

/// Encode one instruction at the writer's current position.
///
/// The writer must start at the first byte of the `code` array so that switch padding is
/// computed against the right origin.
///
/// # Errors
/// Returns [`crate::Error::BranchOutOfRange`] if a 16-bit branch offset does not fit, and
/// [`crate::Error::Malformed`] if the operand does not match the opcode.
pub fn encode_instruction(instruction: &Instruction, writer: &mut Writer) -> Result<()> {
    let Some(info) = opcodes::info(instruction.opcode) else {
        return Err(malformed_error!("Invalid opcode 0x{:02X}", instruction.opcode));
    };
    let start = writer.pos();

    if instruction.wide {
        writer.write_be(WIDE);
    }
    writer.write_be(instruction.opcode);

    match (info.operand, &instruction.operand) {
        (OperandKind::None, Operand::None) => {}
        (OperandKind::Byte, Operand::Int(value)) => writer.write_be(narrow::<i8>(*value)?),
        (OperandKind::Short, Operand::Int(value)) => writer.write_be(narrow::<i16>(*value)?),
        (OperandKind::PoolByte, Operand::Pool(index)) => writer.write_be(narrow::<u8>(*index)?),
        (OperandKind::Pool, Operand::Pool(index)) => writer.write_be(*index),
        (OperandKind::Local, Operand::Local(index)) if instruction.wide => writer.write_be(*index),
        (OperandKind::Local, Operand::Local(index)) => writer.write_be(narrow::<u8>(*index)?),
        (OperandKind::Iinc, Operand::Iinc { index, delta }) if instruction.wide => {
            writer.write_be(*index);
            writer.write_be(*delta);
        }
        (OperandKind::Iinc, Operand::Iinc { index, delta }) => {
            writer.write_be(narrow::<u8>(*index)?);
            writer.write_be(narrow::<i8>(*delta)?);
        }
        (OperandKind::Branch, Operand::Branch(relative)) => {
            let Ok(relative) = i16::try_from(*relative) else {
                return Err(Error::BranchOutOfRange(position(start)?));
            };
            writer.write_be(relative);
        }
        (OperandKind::WideBranch, Operand::Branch(relative)) => writer.write_be(*relative),
        (
            OperandKind::TableSwitch,
            Operand::TableSwitch {
                default,
                low,
                offsets,
            },
        ) => {
            pad(writer);
            writer.write_be(*default);
            writer.write_be(*low);
            let count = i32::try_from(offsets.len())
                .map_err(|_| malformed_error!("tableswitch with {} cases", offsets.len()))?;
            writer.write_be(low.saturating_add(count - 1));
            for relative in offsets {
                writer.write_be(*relative);
            }
        }
        (OperandKind::LookupSwitch, Operand::LookupSwitch { default, pairs }) => {
            pad(writer);
            writer.write_be(*default);
            let count = i32::try_from(pairs.len())
                .map_err(|_| malformed_error!("lookupswitch with {} pairs", pairs.len()))?;
            writer.write_be(count);
            for (key, relative) in pairs {
                writer.write_be(*key);
                writer.write_be(*relative);
            }
        }
        (OperandKind::Interface, Operand::Interface { index, count }) => {
            writer.write_be(*index);
            writer.write_be(*count);
            writer.write_be(0_u8);
        }
        (OperandKind::Dynamic, Operand::Dynamic(index)) => {
            writer.write_be(*index);
            writer.write_be(0_u16);
        }
        (OperandKind::ArrayType, Operand::ArrayType(code)) => writer.write_be(*code),
        (OperandKind::MultiArray, Operand::MultiArray { index, dimensions }) => {
            writer.write_be(*index);
            writer.write_be(*dimensions);
        }
        (kind, operand) => {
            return Err(malformed_error!(
                "Operand {:?} does not fit {} ({:?})",
                operand,
                info.mnemonic,
                kind
            ))
        }
    }

    Ok(())
}

/// Encode a sequence of instructions into a fresh `code` array.
///
/// # Errors
/// Propagates the errors of [`encode_instruction`].
pub fn encode_stream(instructions: &[Instruction]) -> Result<Vec<u8>> {
    let mut writer = Writer::with_capacity(instructions.len() * 3);
    for instruction in instructions {
        encode_instruction(instruction, &mut writer)?;
    }
    Ok(writer.into_inner())
}

fn pad(writer: &mut Writer) {
    while writer.pos() % 4 != 0 {
        writer.write_be(0_u8);
    }
}

fn position(pos: usize) -> Result<u32> {
    u32::try_from(pos).map_err(|_| Error::CodeTooLarge(pos))
}

fn narrow<T>(value: impl Into<i64> + Copy) -> Result<T>
where
    T: TryFrom<i64> + Into<i64> + Bounded,
{
    T::try_from(value.into()).map_err(|_| Error::EncodingOverflow {
        value: value.into(),
        min: T::MIN_VALUE.into(),
        max: T::MAX_VALUE.into(),
    })
}

trait Bounded: Sized {
    const MIN_VALUE: Self;
    const MAX_VALUE: Self;
}

macro_rules! bounded {
    ($($ty:ty),*) => {
        $(impl Bounded for $ty {
            const MIN_VALUE: Self = <$ty>::MIN;
            const MAX_VALUE: Self = <$ty>::MAX;
        })*
    };
}

bounded!(i8, u8, i16);
