//! JVM bytecode decoding and encoding.
//!
//! This module turns the `code` array of a method into [`Instruction`]s and back. It is the
//! instruction-level layer below [`crate::patch`]: the patch engine scans decoded instructions
//! for anchors, edits the stream, and re-emits it through the encoder with relocated branch
//! offsets.
//!
//! # Key Components
//!
//! - [`opcodes`] - Opcode constants and the static opcode table
//! - [`Instruction`] / [`Operand`] - A decoded instruction
//! - [`decode_stream`] / [`decode_instruction`] - Linear decoding
//! - [`encode_stream`] / [`encode_instruction`] - Encoding
//!
//! # Usage Examples
//!
//! ```rust
//! use classweave::assembly::{decode_stream, encode_stream, Operand};
//!
//! // iload_1; ifeq +4; iconst_1; ireturn
//! let code = [0x1B, 0x99, 0x00, 0x04, 0x04, 0xAC];
//! let instructions = decode_stream(&code)?;
//! assert_eq!(instructions[1].operand, Operand::Branch(4));
//! assert_eq!(instructions[1].branch_targets(), vec![5]);
//! assert_eq!(encode_stream(&instructions)?, code);
//! # Ok::<(), classweave::Error>(())
//! ```

mod decoder;
mod encoder;
mod instruction;
pub mod opcodes;

pub use decoder::{decode_instruction, decode_stream};
pub use encoder::{encode_instruction, encode_stream};
pub use instruction::{Instruction, Operand};
pub use opcodes::{OpcodeInfo, OperandKind};
