//! `StackMapTable` frames.
//!
//! Frames are stored in the file as deltas from the previous frame, using a family of compact
//! encodings whose applicability depends on the delta. The engine keeps frames at absolute
//! offsets ([`StackMapFrame::offset`]) so they can be relocated by a splice, and re-encodes them
//! with the smallest valid form when the method is written back.

use crate::{
    file::{parser::Parser, writer::Writer},
    Result,
};

/// A verification type of a local or stack entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    /// Constant pool index of the class
    Object(u16),
    /// Offset of the `new` instruction that created the value
    Uninitialized(u16),
}

impl VerificationType {
    fn parse(parser: &mut Parser) -> Result<Self> {
        Ok(match parser.read_be::<u8>()? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(parser.read_be()?),
            8 => VerificationType::Uninitialized(parser.read_be()?),
            tag => return Err(malformed_error!("Invalid verification type tag {}", tag)),
        })
    }

    fn write(self, writer: &mut Writer) {
        match self {
            VerificationType::Top => writer.write_be(0_u8),
            VerificationType::Integer => writer.write_be(1_u8),
            VerificationType::Float => writer.write_be(2_u8),
            VerificationType::Double => writer.write_be(3_u8),
            VerificationType::Long => writer.write_be(4_u8),
            VerificationType::Null => writer.write_be(5_u8),
            VerificationType::UninitializedThis => writer.write_be(6_u8),
            VerificationType::Object(index) => {
                writer.write_be(7_u8);
                writer.write_be(index);
            }
            VerificationType::Uninitialized(offset) => {
                writer.write_be(8_u8);
                writer.write_be(offset);
            }
        }
    }
}

/// The content of a frame, independent of its encoded delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// Same locals as the previous frame, empty stack
    Same,
    /// Same locals, one stack entry
    SameLocals1StackItem(VerificationType),
    /// The last `n` (1..=3) locals are absent, empty stack
    Chop(u8),
    /// One to three additional locals, empty stack
    Append(Vec<VerificationType>),
    /// Complete description of locals and stack
    Full {
        /// Local variable types
        locals: Vec<VerificationType>,
        /// Operand stack types
        stack: Vec<VerificationType>,
    },
}

/// A frame at an absolute bytecode offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackMapFrame {
    /// Absolute offset in the code array
    pub offset: u32,
    /// Frame content
    pub kind: FrameKind,
}

impl StackMapFrame {
    /// Apply `map` to every `Uninitialized(offset)` entry of the frame.
    pub fn map_uninitialized<F: FnMut(u16) -> u16>(&mut self, mut map: F) {
        let mut remap = |vt: &mut VerificationType| {
            if let VerificationType::Uninitialized(offset) = vt {
                *offset = map(*offset);
            }
        };
        match &mut self.kind {
            FrameKind::Same | FrameKind::Chop(_) => {}
            FrameKind::SameLocals1StackItem(vt) => remap(vt),
            FrameKind::Append(locals) => locals.iter_mut().for_each(&mut remap),
            FrameKind::Full { locals, stack } => {
                locals.iter_mut().for_each(&mut remap);
                stack.iter_mut().for_each(&mut remap);
            }
        }
    }
}

fn read_types(parser: &mut Parser, count: usize) -> Result<Vec<VerificationType>> {
    (0..count).map(|_| VerificationType::parse(parser)).collect()
}

/// Parse the payload of a `StackMapTable` attribute.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for reserved frame types or invalid verification tags.
pub fn parse_frames(data: &[u8]) -> Result<Vec<StackMapFrame>> {
    let mut parser = Parser::new(data);
    let count = parser.read_be::<u16>()?;
    let mut frames = Vec::with_capacity(usize::from(count));
    let mut previous: Option<u32> = None;

    for _ in 0..count {
        let frame_type = parser.read_be::<u8>()?;
        let (delta, kind) = match frame_type {
            0..=63 => (u16::from(frame_type), FrameKind::Same),
            64..=127 => (
                u16::from(frame_type - 64),
                FrameKind::SameLocals1StackItem(VerificationType::parse(&mut parser)?),
            ),
            247 => {
                let delta = parser.read_be::<u16>()?;
                (
                    delta,
                    FrameKind::SameLocals1StackItem(VerificationType::parse(&mut parser)?),
                )
            }
            248..=250 => (parser.read_be::<u16>()?, FrameKind::Chop(251 - frame_type)),
            251 => (parser.read_be::<u16>()?, FrameKind::Same),
            252..=254 => {
                let delta = parser.read_be::<u16>()?;
                let locals = read_types(&mut parser, usize::from(frame_type - 251))?;
                (delta, FrameKind::Append(locals))
            }
            255 => {
                let delta = parser.read_be::<u16>()?;
                let local_count = parser.read_be::<u16>()?;
                let locals = read_types(&mut parser, usize::from(local_count))?;
                let stack_count = parser.read_be::<u16>()?;
                let stack = read_types(&mut parser, usize::from(stack_count))?;
                (delta, FrameKind::Full { locals, stack })
            }
            reserved => {
                return Err(malformed_error!("Reserved stack map frame type {}", reserved))
            }
        };

        let offset = match previous {
            None => u32::from(delta),
            Some(prev) => prev + u32::from(delta) + 1,
        };
        previous = Some(offset);
        frames.push(StackMapFrame { offset, kind });
    }

    if parser.has_more_data() {
        return Err(malformed_error!(
            "{} trailing bytes after stack map frames",
            parser.remaining()
        ));
    }

    Ok(frames)
}

/// Encode frames as a `StackMapTable` payload.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if frame offsets are not strictly increasing or do not
/// fit the 16-bit delta encoding.
pub fn write_frames(frames: &[StackMapFrame], writer: &mut Writer) -> Result<()> {
    writer.write_count(frames.len())?;
    let mut previous: Option<u32> = None;

    for frame in frames {
        let delta = match previous {
            None => Some(frame.offset),
            Some(prev) => frame.offset.checked_sub(prev + 1),
        };
        let Some(delta) = delta.and_then(|delta| u16::try_from(delta).ok()) else {
            return Err(malformed_error!(
                "Stack map frame at {} does not follow {:?}",
                frame.offset,
                previous
            ));
        };
        previous = Some(frame.offset);

        match &frame.kind {
            FrameKind::Same if delta <= 63 => writer.write_be(delta as u8),
            FrameKind::Same => {
                writer.write_be(251_u8);
                writer.write_be(delta);
            }
            FrameKind::SameLocals1StackItem(vt) if delta <= 63 => {
                writer.write_be(64 + delta as u8);
                vt.write(writer);
            }
            FrameKind::SameLocals1StackItem(vt) => {
                writer.write_be(247_u8);
                writer.write_be(delta);
                vt.write(writer);
            }
            FrameKind::Chop(count @ 1..=3) => {
                writer.write_be(251 - count);
                writer.write_be(delta);
            }
            FrameKind::Append(locals) if (1..=3).contains(&locals.len()) => {
                writer.write_be(251 + locals.len() as u8);
                writer.write_be(delta);
                for vt in locals {
                    vt.write(writer);
                }
            }
            FrameKind::Full { locals, stack } => {
                writer.write_be(255_u8);
                writer.write_be(delta);
                writer.write_count(locals.len())?;
                for vt in locals {
                    vt.write(writer);
                }
                writer.write_count(stack.len())?;
                for vt in stack {
                    vt.write(writer);
                }
            }
            other => return Err(malformed_error!("Unencodable stack map frame {:?}", other)),
        }
    }

    Ok(())
}
