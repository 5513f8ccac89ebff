//! The `Code` attribute of a method.
//!
//! Besides the instruction bytes, a `Code` attribute carries the exception table and a set of
//! nested attributes. The nested attributes whose content refers to bytecode offsets
//! (`LineNumberTable`, `LocalVariableTable`, `LocalVariableTypeTable`, `StackMapTable`) are
//! decoded so a splice can relocate them. Every other nested attribute is carried through as
//! raw bytes.
//!
//! # Usage Examples
//!
//! ```rust
//! use classweave::classfile::{CodeAttribute, ConstantPool};
//!
//! let pool = ConstantPool::new();
//! // iconst_0; ireturn
//! let code = CodeAttribute::new(1, 1, vec![0x03, 0xAC]);
//! let bytes = code.to_bytes()?;
//! let parsed = CodeAttribute::parse(&bytes, &pool)?;
//! assert_eq!(parsed, code);
//! # Ok::<(), classweave::Error>(())
//! ```

use crate::{
    classfile::{
        constpool::ConstantPool,
        member::AttributeInfo,
        stackmap::{parse_frames, write_frames, StackMapFrame},
    },
    file::{parser::Parser, writer::Writer},
    Result,
};

/// Attribute name of the method body.
pub const CODE: &str = "Code";
/// Attribute name of the line number debug table.
pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";
/// Attribute name of the local variable debug table.
pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
/// Attribute name of the generic local variable debug table.
pub const LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";
/// Attribute name of the verifier frame table.
pub const STACK_MAP_TABLE: &str = "StackMapTable";

/// One entry of the exception table; `end_pc` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Constant pool index of the caught class, 0 for `finally`
    pub catch_type: u16,
}

/// One `LineNumberTable` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line_number: u16,
}

/// One `LocalVariableTable` / `LocalVariableTypeTable` entry.
///
/// The variable holds a value in the half-open range `[start_pc, start_pc + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariable {
    /// First offset at which the variable has a value
    pub start_pc: u16,
    /// Length of the live range in bytes
    pub length: u16,
    /// Constant pool index of the variable name
    pub name_index: u16,
    /// Constant pool index of the descriptor (or signature for the type table)
    pub descriptor_index: u16,
    /// Local variable slot
    pub index: u16,
}

impl LocalVariable {
    /// Exclusive end of the live range.
    #[must_use]
    pub fn end_pc(&self) -> u32 {
        u32::from(self.start_pc) + u32::from(self.length)
    }
}

/// A nested attribute of a `Code` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CodeAttr {
    LineNumbers {
        name_index: u16,
        entries: Vec<LineNumber>,
    },
    LocalVariables {
        name_index: u16,
        entries: Vec<LocalVariable>,
    },
    LocalVariableTypes {
        name_index: u16,
        entries: Vec<LocalVariable>,
    },
    StackMap {
        name_index: u16,
        frames: Vec<StackMapFrame>,
    },
    Raw(AttributeInfo),
}

impl CodeAttr {
    /// Constant pool index of the attribute name.
    #[must_use]
    pub fn name_index(&self) -> u16 {
        match self {
            CodeAttr::LineNumbers { name_index, .. }
            | CodeAttr::LocalVariables { name_index, .. }
            | CodeAttr::LocalVariableTypes { name_index, .. }
            | CodeAttr::StackMap { name_index, .. } => *name_index,
            CodeAttr::Raw(info) => info.name_index,
        }
    }
}

/// A decoded `Code` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    /// Maximum operand stack depth in slots
    pub max_stack: u16,
    /// Number of local variable slots, including parameters
    pub max_locals: u16,
    /// Instruction bytes
    pub code: Vec<u8>,
    /// Exception handlers in priority order
    pub exception_table: Vec<ExceptionTableEntry>,
    /// Nested attributes in file order
    pub attributes: Vec<CodeAttr>,
}

impl CodeAttribute {
    /// Create a body without handlers or nested attributes.
    #[must_use]
    pub fn new(max_stack: u16, max_locals: u16, code: Vec<u8>) -> Self {
        CodeAttribute {
            max_stack,
            max_locals,
            code,
            exception_table: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Decode the payload of a `Code` attribute (everything after `attribute_length`).
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncation and [`crate::Error::Malformed`] for
    /// inconsistent nested attributes.
    pub fn parse(data: &[u8], pool: &ConstantPool) -> Result<Self> {
        let mut parser = Parser::new(data);
        let max_stack = parser.read_be::<u16>()?;
        let max_locals = parser.read_be::<u16>()?;
        let code_length = parser.read_be::<u32>()?;
        if code_length == 0 || code_length > u32::from(u16::MAX) {
            return Err(malformed_error!("Invalid code length {}", code_length));
        }
        let code = parser.read_bytes(code_length as usize)?.to_vec();

        let handler_count = parser.read_be::<u16>()?;
        let mut exception_table = Vec::with_capacity(usize::from(handler_count));
        for _ in 0..handler_count {
            exception_table.push(ExceptionTableEntry {
                start_pc: parser.read_be()?,
                end_pc: parser.read_be()?,
                handler_pc: parser.read_be()?,
                catch_type: parser.read_be()?,
            });
        }

        let attribute_count = parser.read_be::<u16>()?;
        let mut attributes = Vec::with_capacity(usize::from(attribute_count));
        for _ in 0..attribute_count {
            let raw = AttributeInfo::parse(&mut parser)?;
            attributes.push(Self::decode_nested(raw, pool)?);
        }

        if parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes in Code attribute",
                parser.remaining()
            ));
        }

        Ok(CodeAttribute {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    fn decode_nested(raw: AttributeInfo, pool: &ConstantPool) -> Result<CodeAttr> {
        let Ok(name) = pool.utf8(raw.name_index) else {
            return Ok(CodeAttr::Raw(raw));
        };

        let name_index = raw.name_index;
        Ok(match name {
            LINE_NUMBER_TABLE => {
                let mut parser = Parser::new(&raw.data);
                let count = parser.read_be::<u16>()?;
                let mut entries = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    entries.push(LineNumber {
                        start_pc: parser.read_be()?,
                        line_number: parser.read_be()?,
                    });
                }
                CodeAttr::LineNumbers {
                    name_index,
                    entries,
                }
            }
            LOCAL_VARIABLE_TABLE => CodeAttr::LocalVariables {
                name_index,
                entries: Self::decode_locals(&raw.data)?,
            },
            LOCAL_VARIABLE_TYPE_TABLE => CodeAttr::LocalVariableTypes {
                name_index,
                entries: Self::decode_locals(&raw.data)?,
            },
            STACK_MAP_TABLE => CodeAttr::StackMap {
                name_index,
                frames: parse_frames(&raw.data)?,
            },
            _ => CodeAttr::Raw(raw),
        })
    }

    fn decode_locals(data: &[u8]) -> Result<Vec<LocalVariable>> {
        let mut parser = Parser::new(data);
        let count = parser.read_be::<u16>()?;
        let mut entries = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            entries.push(LocalVariable {
                start_pc: parser.read_be()?,
                length: parser.read_be()?,
                name_index: parser.read_be()?,
                descriptor_index: parser.read_be()?,
                index: parser.read_be()?,
            });
        }
        Ok(entries)
    }

    /// Encode the attribute payload (everything after `attribute_length`).
    ///
    /// # Errors
    /// Returns [`crate::Error::CodeTooLarge`] if the body exceeds 65535 bytes and
    /// [`crate::Error::Malformed`] if a nested table cannot be encoded.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.code.is_empty() || self.code.len() > usize::from(u16::MAX) {
            return Err(crate::Error::CodeTooLarge(self.code.len()));
        }

        let mut writer = Writer::with_capacity(self.code.len() + 64);
        writer.write_be(self.max_stack);
        writer.write_be(self.max_locals);
        writer.write_be(self.code.len() as u32);
        writer.write_bytes(&self.code);

        writer.write_count(self.exception_table.len())?;
        for entry in &self.exception_table {
            writer.write_be(entry.start_pc);
            writer.write_be(entry.end_pc);
            writer.write_be(entry.handler_pc);
            writer.write_be(entry.catch_type);
        }

        writer.write_count(self.attributes.len())?;
        for attribute in &self.attributes {
            writer.write_be(attribute.name_index());
            let length_at = writer.reserve_u32();
            match attribute {
                CodeAttr::LineNumbers { entries, .. } => {
                    writer.write_count(entries.len())?;
                    for entry in entries {
                        writer.write_be(entry.start_pc);
                        writer.write_be(entry.line_number);
                    }
                }
                CodeAttr::LocalVariables { entries, .. }
                | CodeAttr::LocalVariableTypes { entries, .. } => {
                    writer.write_count(entries.len())?;
                    for entry in entries {
                        writer.write_be(entry.start_pc);
                        writer.write_be(entry.length);
                        writer.write_be(entry.name_index);
                        writer.write_be(entry.descriptor_index);
                        writer.write_be(entry.index);
                    }
                }
                CodeAttr::StackMap { frames, .. } => write_frames(frames, &mut writer)?,
                CodeAttr::Raw(info) => writer.write_bytes(&info.data),
            }
            writer.patch_u32(length_at)?;
        }

        Ok(writer.into_inner())
    }

    /// Iterate over all `LocalVariableTable` entries.
    pub fn local_variables(&self) -> impl Iterator<Item = &LocalVariable> {
        self.attributes
            .iter()
            .filter_map(|attribute| match attribute {
                CodeAttr::LocalVariables { entries, .. } => Some(entries),
                _ => None,
            })
            .flatten()
    }

    /// Iterate over all `LineNumberTable` entries.
    pub fn line_numbers(&self) -> impl Iterator<Item = &LineNumber> {
        self.attributes
            .iter()
            .filter_map(|attribute| match attribute {
                CodeAttr::LineNumbers { entries, .. } => Some(entries),
                _ => None,
            })
            .flatten()
    }

    /// The stack map frames, if the body has a `StackMapTable`.
    #[must_use]
    pub fn stack_map(&self) -> Option<&[StackMapFrame]> {
        self.attributes.iter().find_map(|attribute| match attribute {
            CodeAttr::StackMap { frames, .. } => Some(frames.as_slice()),
            _ => None,
        })
    }

    /// Record a named local variable in the `LocalVariableTable`, creating the table if needed.
    ///
    /// # Errors
    /// Returns [`crate::Error::PoolOverflow`] if the names cannot be added to the pool.
    pub fn add_local_variable(
        &mut self,
        pool: &mut ConstantPool,
        name: &str,
        descriptor: &str,
        start_pc: u16,
        length: u16,
        index: u16,
    ) -> Result<()> {
        let entry = LocalVariable {
            start_pc,
            length,
            name_index: pool.utf8_index(name)?,
            descriptor_index: pool.utf8_index(descriptor)?,
            index,
        };

        for attribute in &mut self.attributes {
            if let CodeAttr::LocalVariables { entries, .. } = attribute {
                entries.push(entry);
                return Ok(());
            }
        }

        self.attributes.push(CodeAttr::LocalVariables {
            name_index: pool.utf8_index(LOCAL_VARIABLE_TABLE)?,
            entries: vec![entry],
        });
        Ok(())
    }

    /// Record a source line for the instruction at `start_pc`, creating the table if needed.
    ///
    /// # Errors
    /// Returns [`crate::Error::PoolOverflow`] if the attribute name cannot be added to the pool.
    pub fn add_line_number(
        &mut self,
        pool: &mut ConstantPool,
        start_pc: u16,
        line_number: u16,
    ) -> Result<()> {
        let entry = LineNumber {
            start_pc,
            line_number,
        };

        for attribute in &mut self.attributes {
            if let CodeAttr::LineNumbers { entries, .. } = attribute {
                entries.push(entry);
                return Ok(());
            }
        }

        self.attributes.push(CodeAttr::LineNumbers {
            name_index: pool.utf8_index(LINE_NUMBER_TABLE)?,
            entries: vec![entry],
        });
        Ok(())
    }
}
