//! Linear decoding of method bodies.
//!
//! The decoder walks a `code` array front to back. It performs no control flow analysis: every
//! byte is assumed to belong to exactly one instruction, which holds for all code accepted by
//! the JVM verifier.

use crate::{
    assembly::{
        instruction::{Instruction, Operand},
        opcodes::{self, OperandKind, WIDE},
    },
    file::parser::Parser,
    Result,
};

/// Decode a complete method body.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for unknown opcodes or invalid operands and
/// [`crate::Error::OutOfBounds`] if the last instruction is truncated.
///
/// # Examples
///
/// ```rust
/// use classweave::assembly::decode_stream;
///
/// // aload_0; getfield #2; ireturn
/// let instructions = decode_stream(&[0x2A, 0xB4, 0x00, 0x02, 0xAC])?;
/// assert_eq!(instructions.len(), 3);
/// assert_eq!(instructions[1].mnemonic, "getfield");
/// assert_eq!(instructions[2].offset, 4);
/// # Ok::<(), classweave::Error>(())
/// ```
pub fn decode_stream(code: &[u8]) -> Result<Vec<Instruction>> {
    let mut parser = Parser::new(code);
    let mut instructions = Vec::new();

    while parser.has_more_data() {
        instructions.push(decode_instruction(&mut parser)?);
    }

    Ok(instructions)
}

/// Decode the instruction at the current parser position.
///
/// The parser must span the whole `code` array with position 0 at its first byte: the padding
/// of `tableswitch` and `lookupswitch` is aligned relative to that start.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for unknown opcodes, a `wide` prefix on an instruction
/// that cannot be widened and inverted switch bounds, and [`crate::Error::OutOfBounds`] on
/// truncation.
pub fn decode_instruction(parser: &mut Parser) -> Result<Instruction> {
    let start = parser.pos();
    let Ok(offset) = u32::try_from(start) else {
        return Err(out_of_bounds_error!());
    };

    let mut opcode = parser.read_be::<u8>()?;
    let wide = opcode == WIDE;
    if wide {
        opcode = parser.read_be::<u8>()?;
    }

    let Some(info) = opcodes::info(opcode) else {
        return Err(malformed_error!(
            "Invalid opcode 0x{:02X} at offset {}",
            opcode,
            offset
        ));
    };
    if wide && !matches!(info.operand, OperandKind::Local | OperandKind::Iinc) {
        return Err(malformed_error!(
            "Opcode {} at offset {} cannot be widened",
            info.mnemonic,
            offset
        ));
    }

    let operand = match info.operand {
        OperandKind::None => Operand::None,
        OperandKind::Byte => Operand::Int(i32::from(parser.read_be::<i8>()?)),
        OperandKind::Short => Operand::Int(i32::from(parser.read_be::<i16>()?)),
        OperandKind::PoolByte => Operand::Pool(u16::from(parser.read_be::<u8>()?)),
        OperandKind::Pool => Operand::Pool(parser.read_be()?),
        OperandKind::Local if wide => Operand::Local(parser.read_be()?),
        OperandKind::Local => Operand::Local(u16::from(parser.read_be::<u8>()?)),
        OperandKind::Iinc if wide => Operand::Iinc {
            index: parser.read_be()?,
            delta: parser.read_be()?,
        },
        OperandKind::Iinc => Operand::Iinc {
            index: u16::from(parser.read_be::<u8>()?),
            delta: i16::from(parser.read_be::<i8>()?),
        },
        OperandKind::Branch => Operand::Branch(i32::from(parser.read_be::<i16>()?)),
        OperandKind::WideBranch => Operand::Branch(parser.read_be()?),
        OperandKind::TableSwitch => {
            parser.align(4)?;
            let default = parser.read_be::<i32>()?;
            let low = parser.read_be::<i32>()?;
            let high = parser.read_be::<i32>()?;
            if high < low {
                return Err(malformed_error!(
                    "tableswitch at offset {} has low {} above high {}",
                    offset,
                    low,
                    high
                ));
            }
            let count = usize::try_from(i64::from(high) - i64::from(low) + 1)
                .map_err(|_| out_of_bounds_error!())?;
            if count.saturating_mul(4) > parser.remaining() {
                return Err(out_of_bounds_error!());
            }
            let offsets = (0..count)
                .map(|_| parser.read_be::<i32>())
                .collect::<Result<Vec<_>>>()?;
            Operand::TableSwitch {
                default,
                low,
                offsets,
            }
        }
        OperandKind::LookupSwitch => {
            parser.align(4)?;
            let default = parser.read_be::<i32>()?;
            let npairs = parser.read_be::<i32>()?;
            let Ok(count) = usize::try_from(npairs) else {
                return Err(malformed_error!(
                    "lookupswitch at offset {} has negative pair count {}",
                    offset,
                    npairs
                ));
            };
            if count.saturating_mul(8) > parser.remaining() {
                return Err(out_of_bounds_error!());
            }
            let pairs = (0..count)
                .map(|_| -> Result<(i32, i32)> {
                    Ok((parser.read_be()?, parser.read_be()?))
                })
                .collect::<Result<Vec<_>>>()?;
            Operand::LookupSwitch { default, pairs }
        }
        OperandKind::Interface => {
            let index = parser.read_be()?;
            let count = parser.read_be()?;
            parser.advance_by(1)?;
            Operand::Interface { index, count }
        }
        OperandKind::Dynamic => {
            let index = parser.read_be()?;
            parser.advance_by(2)?;
            Operand::Dynamic(index)
        }
        OperandKind::ArrayType => Operand::ArrayType(parser.read_be()?),
        OperandKind::MultiArray => Operand::MultiArray {
            index: parser.read_be()?,
            dimensions: parser.read_be()?,
        },
        OperandKind::Wide => {
            return Err(malformed_error!("Nested wide prefix at offset {}", offset));
        }
    };

    let Ok(size) = u32::try_from(parser.pos() - start) else {
        return Err(out_of_bounds_error!());
    };

    Ok(Instruction {
        offset,
        opcode,
        mnemonic: info.mnemonic,
        operand,
        size,
        wide,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::opcodes::{IINC, ILOAD, LOOKUPSWITCH, TABLESWITCH},
        Error,
    };

    #[test]
    fn simple_sequence() {
        // iconst_2; bipush -3; sipush 300; ifeq +5; return
        let code = [0x05, 0x10, 0xFD, 0x11, 0x01, 0x2C, 0x99, 0x00, 0x05, 0xB1];
        let instructions = decode_stream(&code).unwrap();
        let offsets: Vec<u32> = instructions.iter().map(|i| i.offset).collect();
        assert_eq!(offsets, vec![0, 1, 3, 6, 9]);
        assert_eq!(instructions[1].operand, Operand::Int(-3));
        assert_eq!(instructions[2].int_literal(), Some(300));
        assert_eq!(instructions[3].branch_targets(), vec![11]);
    }

    #[test]
    fn wide_forms() {
        // wide iload 0x0102; wide iinc 5 -2
        let code = [0xC4, ILOAD, 0x01, 0x02, 0xC4, IINC, 0x00, 0x05, 0xFF, 0xFE];
        let instructions = decode_stream(&code).unwrap();
        assert_eq!(instructions.len(), 2);
        assert!(instructions[0].wide);
        assert_eq!(instructions[0].operand, Operand::Local(0x0102));
        assert_eq!(instructions[0].size, 4);
        assert_eq!(
            instructions[1].operand,
            Operand::Iinc {
                index: 5,
                delta: -2
            }
        );
        assert_eq!(instructions[1].size, 6);

        // wide nop
        assert!(matches!(
            decode_stream(&[0xC4, 0x00]),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn switch_padding_is_relative_to_code_start() {
        // nop; tableswitch (2 padding bytes) default=20 low=0 high=1 [12, 16]
        let mut code = vec![0x00, TABLESWITCH, 0x00, 0x00];
        for value in [20_i32, 0, 1, 12, 16] {
            code.extend_from_slice(&value.to_be_bytes());
        }
        code.push(0xB1);
        let instructions = decode_stream(&code).unwrap();
        assert_eq!(instructions[1].size, 23);
        assert_eq!(instructions[1].branch_targets(), vec![21, 13, 17]);
        assert_eq!(instructions[2].offset, 24);

        // lookupswitch at offset 0 (3 padding bytes), no pairs
        let mut code = vec![LOOKUPSWITCH, 0, 0, 0];
        code.extend_from_slice(&8_i32.to_be_bytes());
        code.extend_from_slice(&0_i32.to_be_bytes());
        let instructions = decode_stream(&code).unwrap();
        assert_eq!(instructions[0].size, 12);
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_stream(&[0xCB]).is_err());
        assert!(matches!(
            decode_stream(&[0x11, 0x01]),
            Err(Error::OutOfBounds { .. })
        ));
        let mut code = vec![TABLESWITCH, 0, 0, 0];
        for value in [0_i32, 5, 1] {
            code.extend_from_slice(&value.to_be_bytes());
        }
        assert!(decode_stream(&code).is_err());
    }
}
