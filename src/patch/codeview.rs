//! A mutable view of one method body.
//!
//! [`CodeView`] owns a decoded [`CodeAttribute`] for the duration of one patch request. It finds
//! splice points and performs splices, keeping every offset-bearing structure of the body
//! consistent: branch and switch offsets, the exception table, `LineNumberTable`,
//! `LocalVariableTable`, `LocalVariableTypeTable` and `StackMapTable`.
//!
//! # Offset rules
//!
//! A splice at `offset` that removes `remove` bytes and inserts a gap of `gap` bytes shifts
//! everything behind it by `delta = gap - remove`:
//!
//! - instruction starts at or after the splice move by `delta` (for a pure insertion, the
//!   instruction at `offset` itself moves);
//! - jump targets and table offsets equal to `offset` stay put, so a branch to the splice point
//!   executes the inserted code first; targets after `offset` move by `delta`;
//! - an insertion behind an instruction ([`CodeView::insert_after`]) is exclusive: targets,
//!   handlers, range bounds and frames equal to `offset` move past the gap as well, so the
//!   inserted code only runs when control falls through the anchoring instruction;
//! - `Uninitialized` verification types name the `new` instruction and follow the instruction
//!   rule.
//!
//! When a `tableswitch` or `lookupswitch` lies behind the splice point, the gap is padded with
//! `nop` until `delta` is a multiple of four, so the switch's alignment padding is unchanged.
//! The returned gap length includes that padding.
//!
//! Offsets obtained before a splice must not be used afterwards; scan again from the returned
//! position instead.

use log::debug;

use crate::{
    assembly::{
        decode_stream, encode_instruction,
        opcodes::{GETFIELD, GETSTATIC, INVOKESTATIC, NOP, POP, POP2, PUTSTATIC},
        Instruction, Operand,
    },
    classfile::{CodeAttr, CodeAttribute, ConstantPool, FieldType, MethodDescriptor},
    file::writer::Writer,
    patch::builder::AssembledSequence,
    Error, Result,
};

const MAX_CODE_LENGTH: usize = u16::MAX as usize;

/// Exclusive access to one method body during a patch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeView {
    code: CodeAttribute,
}

impl CodeView {
    /// Take ownership of a decoded body.
    #[must_use]
    pub fn new(code: CodeAttribute) -> Self {
        CodeView { code }
    }

    /// The current revision of the body.
    #[must_use]
    pub fn code(&self) -> &CodeAttribute {
        &self.code
    }

    /// The current instruction bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.code.code
    }

    /// Release the body for committing.
    #[must_use]
    pub fn into_code(self) -> CodeAttribute {
        self.code
    }

    /// Decode the current revision.
    ///
    /// # Errors
    /// Returns decoding errors for a malformed body.
    pub fn instructions(&self) -> Result<Vec<Instruction>> {
        decode_stream(&self.code.code)
    }

    /// The instruction starting exactly at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOffset`] if no instruction starts there.
    pub fn instruction_at(&self, offset: u32) -> Result<Instruction> {
        self.instructions()?
            .into_iter()
            .find(|instruction| instruction.offset == offset)
            .ok_or(Error::InvalidOffset(offset))
    }

    /// The first instruction at or after `from` accepted by `predicate`.
    ///
    /// # Errors
    /// Returns decoding errors for a malformed body and the errors of `predicate`.
    pub fn find_from<F>(&self, from: u32, mut predicate: F) -> Result<Option<Instruction>>
    where
        F: FnMut(&Instruction) -> Result<bool>,
    {
        for instruction in self.instructions()? {
            if instruction.offset >= from && predicate(&instruction)? {
                return Ok(Some(instruction));
            }
        }
        Ok(None)
    }

    fn locate_all<F>(&self, mut predicate: F) -> Result<Vec<u32>>
    where
        F: FnMut(&Instruction) -> Result<bool>,
    {
        let mut offsets = Vec::new();
        for instruction in self.instructions()? {
            if predicate(&instruction)? {
                offsets.push(instruction.offset);
            }
        }
        Ok(offsets)
    }

    /// The first call at or after `from` to a method with simple name `name`.
    ///
    /// # Errors
    /// Returns decoding errors for a malformed body or constant pool reference.
    pub fn next_call_site(
        &self,
        pool: &ConstantPool,
        name: &str,
        from: u32,
    ) -> Result<Option<Instruction>> {
        self.find_from(from, |instruction| is_call_to(pool, instruction, name))
    }

    /// Offsets of every call to a method with simple name `name`.
    ///
    /// Matching on the simple name survives recompilation of unrelated host code.
    ///
    /// # Errors
    /// Returns decoding errors for a malformed body or constant pool reference.
    pub fn locate_call_site(&self, pool: &ConstantPool, name: &str) -> Result<Vec<u32>> {
        self.locate_all(|instruction| is_call_to(pool, instruction, name))
    }

    /// The first read or write at or after `from` of a field with simple name `name`.
    ///
    /// # Errors
    /// Returns decoding errors for a malformed body or constant pool reference.
    pub fn next_field_access(
        &self,
        pool: &ConstantPool,
        name: &str,
        from: u32,
    ) -> Result<Option<Instruction>> {
        self.find_from(from, |instruction| is_access_to(pool, instruction, name))
    }

    /// Offsets of every read or write of a field with simple name `name`.
    ///
    /// # Errors
    /// Returns decoding errors for a malformed body or constant pool reference.
    pub fn locate_field_access(&self, pool: &ConstantPool, name: &str) -> Result<Vec<u32>> {
        self.locate_all(|instruction| is_access_to(pool, instruction, name))
    }

    /// The first instruction at or after `from` with `opcode` pushing `value`.
    ///
    /// # Errors
    /// Returns decoding errors for a malformed body.
    pub fn next_literal(&self, opcode: u8, value: i32, from: u32) -> Result<Option<Instruction>> {
        self.find_from(from, |instruction| Ok(is_literal(instruction, opcode, value)))
    }

    /// Offsets of every `iconst_*`, `bipush` or `sipush` with `opcode` pushing `value`.
    ///
    /// Literal matching depends on the host's constants and silently stops matching when they
    /// change; prefer [`CodeView::locate_call_site`] where a call anchors the splice.
    ///
    /// # Errors
    /// Returns decoding errors for a malformed body.
    pub fn locate_literal(&self, opcode: u8, value: i32) -> Result<Vec<u32>> {
        self.locate_all(|instruction| Ok(is_literal(instruction, opcode, value)))
    }

    /// Insert raw bytes before the instruction at `offset`. Returns the gap length, which
    /// exceeds `bytes.len()` only when switch padding was needed.
    ///
    /// `max_stack` and `max_locals` are not touched; see [`CodeView::insert_sequence`].
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOffset`] if `offset` is not an instruction boundary,
    /// [`crate::Error::BranchOutOfRange`] if a 16-bit branch no longer fits and
    /// [`crate::Error::CodeTooLarge`] if the body exceeds 65535 bytes.
    pub fn insert_at(&mut self, offset: u32, bytes: &[u8]) -> Result<u32> {
        self.splice(offset, 0, bytes)
    }

    /// Insert an assembled sequence before the instruction at `offset`, raising `max_stack` by
    /// the sequence's peak depth and `max_locals` to cover its locals.
    ///
    /// Nothing is known about the operand stack at a bare offset, so the sequence may not
    /// consume values.
    ///
    /// # Errors
    /// Returns [`crate::Error::StackImbalance`] for a sequence with a non-zero net effect or one
    /// that consumes values, and the errors of [`CodeView::insert_at`].
    pub fn insert_sequence(&mut self, offset: u32, sequence: &AssembledSequence) -> Result<u32> {
        self.insert_checked(offset, sequence, 0, false)
    }

    /// Insert an assembled sequence in front of `instruction`.
    ///
    /// The sequence may consume the operands of a call or field access; at offset 0 the stack
    /// is empty.
    ///
    /// # Errors
    /// Returns [`crate::Error::StackImbalance`] if the sequence consumes more than those
    /// operands or has a non-zero net effect, and the errors of [`CodeView::insert_at`].
    pub fn insert_before(
        &mut self,
        pool: &ConstantPool,
        instruction: &Instruction,
        sequence: &AssembledSequence,
    ) -> Result<u32> {
        let available = if instruction.offset == 0 {
            0
        } else {
            operands_of(pool, instruction)?
        };
        self.insert_checked(instruction.offset, sequence, available, false)
    }

    /// Insert an assembled sequence behind `instruction`.
    ///
    /// The sequence runs only when control falls through `instruction`: jumps, handlers and
    /// frames that targeted the following instruction still reach it, past the gap. The
    /// sequence may consume the value `instruction` pushed (an integer literal, a call result
    /// or a field read).
    ///
    /// # Errors
    /// Returns [`crate::Error::StackImbalance`] if the sequence consumes more than that value
    /// or has a non-zero net effect, and the errors of [`CodeView::insert_at`].
    pub fn insert_after(
        &mut self,
        pool: &ConstantPool,
        instruction: &Instruction,
        sequence: &AssembledSequence,
    ) -> Result<u32> {
        let available = result_of(pool, instruction)?;
        self.insert_checked(instruction.end(), sequence, available, true)
    }

    fn insert_checked(
        &mut self,
        offset: u32,
        sequence: &AssembledSequence,
        available: u16,
        exclusive: bool,
    ) -> Result<u32> {
        if sequence.delta != 0 {
            return Err(Error::StackImbalance {
                expected: 0,
                actual: sequence.delta,
            });
        }
        if sequence.consumes > available {
            return Err(Error::StackImbalance {
                expected: i32::from(available),
                actual: i32::from(sequence.consumes),
            });
        }
        let gap = self.splice_with(offset, 0, &sequence.bytes, exclusive)?;
        self.grow_frame(sequence.peak, sequence.max_locals);
        Ok(gap)
    }

    /// Replace the call or field access at `offset`.
    ///
    /// The values the instruction consumed are discarded (`pop` / `pop2`, last argument first,
    /// receiver last) and `sequence` runs in its place. The sequence must push exactly what the
    /// instruction pushed. Returns the length of the replacement, padding included.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOffset`] if no call or field access starts at `offset`,
    /// [`crate::Error::StackImbalance`] if the sequence's effect differs from the instruction's
    /// result, and the errors of [`CodeView::insert_at`].
    pub fn replace_call(
        &mut self,
        pool: &ConstantPool,
        offset: u32,
        sequence: &AssembledSequence,
    ) -> Result<u32> {
        let instruction = self.instruction_at(offset)?;
        let (consumed, produced) = stack_contract(pool, &instruction)?;
        let expected = i32::from(produced);
        if sequence.consumes != 0 || sequence.delta != expected {
            return Err(Error::StackImbalance {
                expected,
                actual: sequence.delta - i32::from(sequence.consumes),
            });
        }

        let mut bytes: Vec<u8> = consumed
            .iter()
            .rev()
            .map(|width| if *width == 2 { POP2 } else { POP })
            .collect();
        bytes.extend_from_slice(&sequence.bytes);

        let length = self.splice(offset, instruction.size, &bytes)?;
        let consumed_slots: u16 = consumed.iter().sum();
        self.grow_frame(
            sequence.peak.saturating_sub(consumed_slots),
            sequence.max_locals,
        );
        Ok(length)
    }

    /// Replace the whole body.
    ///
    /// The exception table is cleared and all nested attributes (line numbers, local variable
    /// tables, stack map) are dropped, since they describe the old body.
    ///
    /// # Errors
    /// Returns decoding errors if `bytes` is not a valid instruction stream and
    /// [`crate::Error::CodeTooLarge`] if it is empty or longer than 65535 bytes.
    pub fn set_body(&mut self, bytes: &[u8], max_stack: u16, max_locals: u16) -> Result<()> {
        if bytes.is_empty() || bytes.len() > MAX_CODE_LENGTH {
            return Err(Error::CodeTooLarge(bytes.len()));
        }
        decode_stream(bytes)?;

        self.code.code = bytes.to_vec();
        self.code.max_stack = max_stack;
        self.code.max_locals = max_locals;
        self.code.exception_table.clear();
        self.code.attributes.clear();
        debug!("replaced body with {} bytes", bytes.len());
        Ok(())
    }

    /// Replace the whole body by an assembled sequence. `max_locals` is at least `min_locals`,
    /// which should cover the method's parameters.
    ///
    /// # Errors
    /// Returns [`crate::Error::StackImbalance`] if the sequence expects values on the stack or
    /// leaves values behind, and the errors of [`CodeView::set_body`].
    pub fn set_body_sequence(&mut self, sequence: &AssembledSequence, min_locals: u16) -> Result<()> {
        if sequence.consumes != 0 || sequence.delta != 0 {
            return Err(Error::StackImbalance {
                expected: 0,
                actual: sequence.delta - i32::from(sequence.consumes),
            });
        }
        self.set_body(
            &sequence.bytes,
            sequence.peak,
            sequence.max_locals.max(min_locals),
        )
    }

    fn grow_frame(&mut self, extra_stack: u16, locals: u16) {
        self.code.max_stack = self.code.max_stack.saturating_add(extra_stack);
        self.code.max_locals = self.code.max_locals.max(locals);
    }

    /// Replace the `remove` bytes at `offset` by `bytes` and relocate everything behind them.
    /// Returns the length of the inserted gap, padding included.
    ///
    /// Both ends of the removed range must be instruction boundaries. A replacement that would
    /// be empty is a single `nop`.
    ///
    /// # Errors
    /// See [`CodeView::insert_at`].
    pub fn splice(&mut self, offset: u32, remove: u32, bytes: &[u8]) -> Result<u32> {
        self.splice_with(offset, remove, bytes, false)
    }

    fn splice_with(&mut self, offset: u32, remove: u32, bytes: &[u8], exclusive: bool) -> Result<u32> {
        let instructions = self.instructions()?;
        let code_length = self.code.code.len();
        let is_boundary = |at: u32| {
            usize::try_from(at).is_ok_and(|at| at == code_length)
                || instructions
                    .binary_search_by_key(&at, |instruction| instruction.offset)
                    .is_ok()
        };

        let removed_end = offset
            .checked_add(remove)
            .ok_or(Error::InvalidOffset(offset))?;
        if !is_boundary(offset) {
            return Err(Error::InvalidOffset(offset));
        }
        if !is_boundary(removed_end) {
            return Err(Error::InvalidOffset(removed_end));
        }

        let mut gap = bytes.to_vec();
        if gap.is_empty() && remove > 0 {
            gap.push(NOP);
        }
        let switch_follows = instructions
            .iter()
            .any(|instruction| instruction.offset >= removed_end && instruction.is_switch());
        if switch_follows {
            let padding = (i64::from(remove) - len_i64(gap.len())).rem_euclid(4);
            gap.extend(std::iter::repeat(NOP).take(usize::try_from(padding).unwrap_or(0)));
        }

        let removed = usize::try_from(remove).map_err(|_| Error::InvalidOffset(removed_end))?;
        let new_length = code_length - removed + gap.len();
        if new_length > MAX_CODE_LENGTH {
            return Err(Error::CodeTooLarge(new_length));
        }

        let relocation = Relocation {
            offset,
            removed_end,
            delta: len_i64(gap.len()) - i64::from(remove),
            exclusive,
        };

        let mut writer = Writer::with_capacity(new_length);
        for instruction in &instructions {
            if instruction.offset == offset {
                writer.write_bytes(&gap);
            }
            if instruction.offset >= offset && instruction.offset < removed_end {
                continue;
            }
            let relocated = relocation.instruction(instruction)?;
            if u32::try_from(writer.pos()).ok() != Some(relocated.offset) {
                return Err(malformed_error!(
                    "Instruction at {} lost its position while splicing",
                    instruction.offset
                ));
            }
            encode_instruction(&relocated, &mut writer)?;
        }
        if usize::try_from(offset).is_ok_and(|offset| offset == code_length) {
            writer.write_bytes(&gap);
        }

        let mut exception_table = self.code.exception_table.clone();
        for entry in &mut exception_table {
            entry.start_pc = relocation.target_u16(entry.start_pc)?;
            entry.end_pc = relocation.target_u16(entry.end_pc)?;
            entry.handler_pc = relocation.target_u16(entry.handler_pc)?;
        }

        let mut attributes = self.code.attributes.clone();
        for attribute in &mut attributes {
            relocation.attribute(attribute)?;
        }

        self.code.code = writer.into_inner();
        self.code.exception_table = exception_table;
        self.code.attributes = attributes;

        let gap_length = u32::try_from(gap.len()).map_err(|_| Error::CodeTooLarge(gap.len()))?;
        debug!("spliced {gap_length} bytes over {remove} at offset {offset}");
        Ok(gap_length)
    }
}

fn len_i64(length: usize) -> i64 {
    i64::try_from(length).unwrap_or(i64::MAX)
}

struct Relocation {
    offset: u32,
    removed_end: u32,
    delta: i64,
    /// Targets equal to `offset` move past the gap.
    exclusive: bool,
}

impl Relocation {
    fn shift(&self, at: u32) -> Result<u32> {
        u32::try_from(i64::from(at) + self.delta)
            .map_err(|_| malformed_error!("Offset {} cannot be relocated", at))
    }

    /// New start of an instruction that survived the splice.
    fn position(&self, at: u32) -> Result<u32> {
        if at < self.removed_end {
            Ok(at)
        } else {
            self.shift(at)
        }
    }

    /// New value of a jump target or range bound.
    fn target(&self, at: u32) -> Result<u32> {
        if at < self.offset || (at == self.offset && !self.exclusive) {
            Ok(at)
        } else {
            self.shift(at)
        }
    }

    fn target_u16(&self, at: u16) -> Result<u16> {
        let moved = self.target(u32::from(at))?;
        u16::try_from(moved).map_err(|_| Error::CodeTooLarge(moved as usize))
    }

    fn position_u16(&self, at: u16) -> Result<u16> {
        let moved = self.position(u32::from(at))?;
        u16::try_from(moved).map_err(|_| Error::CodeTooLarge(moved as usize))
    }

    fn relative(&self, old_base: u32, new_base: u32, relative: i32) -> Result<i32> {
        let target = u32::try_from(i64::from(old_base) + i64::from(relative)).map_err(|_| {
            malformed_error!("Branch at {} points before the method start", old_base)
        })?;
        let moved = self.target(target)?;
        i32::try_from(i64::from(moved) - i64::from(new_base))
            .map_err(|_| Error::BranchOutOfRange(new_base))
    }

    fn instruction(&self, instruction: &Instruction) -> Result<Instruction> {
        let mut relocated = instruction.clone();
        let old_base = instruction.offset;
        let new_base = self.position(old_base)?;
        relocated.offset = new_base;

        match &mut relocated.operand {
            Operand::Branch(relative) => *relative = self.relative(old_base, new_base, *relative)?,
            Operand::TableSwitch {
                default, offsets, ..
            } => {
                *default = self.relative(old_base, new_base, *default)?;
                for relative in offsets {
                    *relative = self.relative(old_base, new_base, *relative)?;
                }
            }
            Operand::LookupSwitch { default, pairs } => {
                *default = self.relative(old_base, new_base, *default)?;
                for (_, relative) in pairs {
                    *relative = self.relative(old_base, new_base, *relative)?;
                }
            }
            _ => {}
        }

        Ok(relocated)
    }

    fn attribute(&self, attribute: &mut CodeAttr) -> Result<()> {
        match attribute {
            CodeAttr::LineNumbers { entries, .. } => {
                for entry in entries {
                    entry.start_pc = self.target_u16(entry.start_pc)?;
                }
            }
            CodeAttr::LocalVariables { entries, .. }
            | CodeAttr::LocalVariableTypes { entries, .. } => {
                for entry in entries {
                    let start = self.target(u32::from(entry.start_pc))?;
                    let end = self.target(entry.end_pc())?;
                    entry.start_pc = u16::try_from(start)
                        .map_err(|_| Error::CodeTooLarge(start as usize))?;
                    entry.length = u16::try_from(end.saturating_sub(start))
                        .map_err(|_| Error::CodeTooLarge(end as usize))?;
                }
            }
            CodeAttr::StackMap { frames, .. } => {
                for frame in frames.iter_mut() {
                    frame.offset = self.target(frame.offset)?;
                    let mut failed = None;
                    frame.map_uninitialized(|at| match self.position_u16(at) {
                        Ok(moved) => moved,
                        Err(error) => {
                            failed = Some(error);
                            at
                        }
                    });
                    if let Some(error) = failed {
                        return Err(error);
                    }
                }
            }
            CodeAttr::Raw(_) => {}
        }
        Ok(())
    }
}

fn is_call_to(pool: &ConstantPool, instruction: &Instruction, name: &str) -> Result<bool> {
    if !instruction.is_invoke() {
        return Ok(false);
    }
    match instruction.pool_index() {
        Some(index) => Ok(pool.member_ref(index)?.name == name),
        None => Ok(false),
    }
}

fn is_access_to(pool: &ConstantPool, instruction: &Instruction, name: &str) -> Result<bool> {
    if !instruction.is_field_access() {
        return Ok(false);
    }
    match instruction.pool_index() {
        Some(index) => Ok(pool.member_ref(index)?.name == name),
        None => Ok(false),
    }
}

fn is_literal(instruction: &Instruction, opcode: u8, value: i32) -> bool {
    instruction.opcode == opcode && instruction.int_literal() == Some(value)
}

/// Slots known to be on the stack in front of `instruction`: the operands of a call or field
/// access.
fn operands_of(pool: &ConstantPool, instruction: &Instruction) -> Result<u16> {
    if !instruction.is_invoke() && !instruction.is_field_access() {
        return Ok(0);
    }
    let (consumed, _) = stack_contract(pool, instruction)?;
    Ok(consumed.iter().sum())
}

/// Slots known to be on the stack behind `instruction`: an integer literal, or the result of a
/// call or field read.
fn result_of(pool: &ConstantPool, instruction: &Instruction) -> Result<u16> {
    if instruction.int_literal().is_some() {
        return Ok(1);
    }
    if !instruction.is_invoke() && !instruction.is_field_access() {
        return Ok(0);
    }
    let (_, produced) = stack_contract(pool, instruction)?;
    Ok(produced)
}

/// Slots consumed (in push order) and produced by a call or field access.
fn stack_contract(pool: &ConstantPool, instruction: &Instruction) -> Result<(Vec<u16>, u16)> {
    let Some(index) = instruction
        .pool_index()
        .filter(|_| instruction.is_invoke() || instruction.is_field_access())
    else {
        return Err(Error::InvalidOffset(instruction.offset));
    };
    let member = pool.member_ref(index)?;

    if instruction.is_invoke() {
        let descriptor = MethodDescriptor::parse(member.descriptor)?;
        let mut consumed = Vec::with_capacity(descriptor.arity() + 1);
        if instruction.opcode != INVOKESTATIC {
            consumed.push(1);
        }
        consumed.extend(descriptor.params.iter().map(FieldType::slot_width));
        return Ok((consumed, descriptor.return_width()));
    }

    let width = FieldType::parse(member.descriptor)?.slot_width();
    Ok(match instruction.opcode {
        GETSTATIC => (Vec::new(), width),
        PUTSTATIC => (vec![width], 0),
        GETFIELD => (vec![1], width),
        _ => (vec![1, width], 0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::opcodes::{
            GOTO, ICONST_0, ICONST_1, ICONST_2, IFEQ, ILOAD_1, IMUL, INVOKEVIRTUAL, IRETURN,
            LOOKUPSWITCH, SIPUSH,
        },
        classfile::{
            ExceptionTableEntry, FrameKind, LineNumber, LocalVariable, MemberKind, StackMapFrame,
            VerificationType,
        },
    };

    fn pool_with(name: &str, descriptor: &str) -> (ConstantPool, u16) {
        let mut pool = ConstantPool::new();
        let index = pool
            .member_ref_index(MemberKind::Method, "host/Lib", name, descriptor)
            .unwrap();
        (pool, index)
    }

    fn assembled(bytes: Vec<u8>, delta: i32, peak: u16) -> AssembledSequence {
        AssembledSequence {
            bytes,
            consumes: 0,
            delta,
            peak,
            max_locals: 0,
        }
    }

    /// ```text
    ///  0: iload_1
    ///  1: ifeq 11
    ///  4: aload_0
    ///  5: invokevirtual clamp
    ///  8: goto 12
    /// 11: iconst_0
    /// 12: ireturn
    /// ```
    fn clamp_body(clamp: u16) -> CodeAttribute {
        let [hi, lo] = clamp.to_be_bytes();
        let code = vec![
            ILOAD_1, IFEQ, 0x00, 0x0A, 0x2A, INVOKEVIRTUAL, hi, lo, GOTO, 0x00, 0x04, ICONST_0,
            IRETURN,
        ];
        let mut body = CodeAttribute::new(2, 2, code);
        body.exception_table.push(ExceptionTableEntry {
            start_pc: 4,
            end_pc: 8,
            handler_pc: 11,
            catch_type: 0,
        });
        body.attributes.push(CodeAttr::LineNumbers {
            name_index: 1,
            entries: vec![
                LineNumber {
                    start_pc: 0,
                    line_number: 10,
                },
                LineNumber {
                    start_pc: 4,
                    line_number: 11,
                },
                LineNumber {
                    start_pc: 11,
                    line_number: 12,
                },
            ],
        });
        body.attributes.push(CodeAttr::LocalVariables {
            name_index: 1,
            entries: vec![LocalVariable {
                start_pc: 4,
                length: 9,
                name_index: 1,
                descriptor_index: 1,
                index: 2,
            }],
        });
        body.attributes.push(CodeAttr::StackMap {
            name_index: 1,
            frames: vec![
                StackMapFrame {
                    offset: 11,
                    kind: FrameKind::Same,
                },
                StackMapFrame {
                    offset: 12,
                    kind: FrameKind::SameLocals1StackItem(VerificationType::Integer),
                },
            ],
        });
        body
    }

    #[test]
    fn locates_call_sites_by_name() {
        let (pool, clamp) = pool_with("clamp", "()I");
        let view = CodeView::new(clamp_body(clamp));
        assert_eq!(view.locate_call_site(&pool, "clamp").unwrap(), vec![5]);
        assert!(view.locate_call_site(&pool, "min").unwrap().is_empty());
        assert_eq!(
            view.next_call_site(&pool, "clamp", 5).unwrap().map(|i| i.offset),
            Some(5)
        );
        assert!(view.next_call_site(&pool, "clamp", 6).unwrap().is_none());
        assert_eq!(view.locate_literal(ICONST_0, 0).unwrap(), vec![11]);
        assert!(view.locate_literal(ICONST_1, 0).unwrap().is_empty());
    }

    #[test]
    fn insertion_shifts_everything_behind_the_splice() {
        let (pool, clamp) = pool_with("clamp", "()I");
        let mut view = CodeView::new(clamp_body(clamp));
        let before = view.instructions().unwrap();

        let gap = view.insert_at(5, &[0x00; 5]).unwrap();
        assert_eq!(gap, 5);
        assert_eq!(view.locate_call_site(&pool, "clamp").unwrap(), vec![10]);

        let after = view.instructions().unwrap();
        assert_eq!(after.len(), before.len() + 5);
        for old in &before {
            let expected = if old.offset < 5 { old.offset } else { old.offset + 5 };
            assert!(
                after
                    .iter()
                    .any(|new| new.offset == expected && new.opcode == old.opcode),
                "{old} did not move to {expected}"
            );
        }

        // ifeq 11 -> 16, goto 12 -> 17
        let ifeq = &after[1];
        assert_eq!(ifeq.branch_targets(), vec![16]);
        let goto = after.iter().find(|i| i.opcode == GOTO).unwrap();
        assert_eq!(goto.offset, 13);
        assert_eq!(goto.branch_targets(), vec![17]);

        let code = view.code();
        assert_eq!(
            code.exception_table[0],
            ExceptionTableEntry {
                start_pc: 4,
                end_pc: 13,
                handler_pc: 16,
                catch_type: 0
            }
        );
        let lines: Vec<u16> = code.line_numbers().map(|line| line.start_pc).collect();
        assert_eq!(lines, vec![0, 4, 16]);
        let variable = code.local_variables().next().unwrap();
        assert_eq!((variable.start_pc, variable.length), (4, 14));
        let frames: Vec<u32> = code
            .stack_map()
            .unwrap()
            .iter()
            .map(|frame| frame.offset)
            .collect();
        assert_eq!(frames, vec![16, 17]);
    }

    #[test]
    fn branch_to_the_splice_point_runs_the_inserted_code() {
        let (_, clamp) = pool_with("clamp", "()I");
        let mut view = CodeView::new(clamp_body(clamp));
        // ifeq targets 11 and the frame sits at 11
        view.insert_at(11, &[0x00, 0x00]).unwrap();
        let instructions = view.instructions().unwrap();
        assert_eq!(instructions[1].branch_targets(), vec![11]);
        let goto = instructions.iter().find(|i| i.opcode == GOTO).unwrap();
        assert_eq!(goto.branch_targets(), vec![14]);
        assert_eq!(view.code().stack_map().unwrap()[0].offset, 11);
        assert_eq!(view.code().exception_table[0].handler_pc, 11);
        assert_eq!(view.code().exception_table[0].end_pc, 8);
    }

    #[test]
    fn switch_behind_the_splice_keeps_its_alignment() {
        // iload_1; lookupswitch default -> 21, 7 -> 20; iconst_0; ireturn
        let mut code = vec![ILOAD_1, LOOKUPSWITCH, 0, 0];
        for value in [20_i32, 1, 7, 19] {
            code.extend_from_slice(&value.to_be_bytes());
        }
        code.extend_from_slice(&[ICONST_0, IRETURN]);
        let mut view = CodeView::new(CodeAttribute::new(1, 2, code));

        let gap = view.insert_at(1, &[ICONST_0, 0x57, 0x00]).unwrap();
        assert_eq!(gap, 4);
        assert_eq!(&view.bytes()[1..5], &[ICONST_0, 0x57, 0x00, NOP]);

        let instructions = view.instructions().unwrap();
        let switch = &instructions[5];
        assert_eq!(switch.offset, 5);
        assert_eq!(switch.size, 19);
        assert_eq!(switch.branch_targets(), vec![25, 24]);
        assert_eq!(instructions[6].offset, 24);
    }

    #[test]
    fn replace_call_discards_arguments() {
        let (pool, clamp) = pool_with("clamp", "(IJ)I");
        let [hi, lo] = clamp.to_be_bytes();
        // aload_0; iconst_1; lconst_0; invokevirtual clamp(IJ)I; ireturn
        let code = vec![0x2A, ICONST_1, 0x09, INVOKEVIRTUAL, hi, lo, IRETURN];
        let mut view = CodeView::new(CodeAttribute::new(4, 1, code));

        let length = view
            .replace_call(&pool, 3, &assembled(vec![SIPUSH, 0x01, 0x2C], 1, 1))
            .unwrap();
        assert_eq!(length, 6);
        assert_eq!(
            view.bytes(),
            &[0x2A, ICONST_1, 0x09, POP2, POP, POP, SIPUSH, 0x01, 0x2C, IRETURN]
        );
        assert_eq!(view.code().max_stack, 4);

        let wrong = assembled(vec![0x00], 0, 0);
        let (pool, clamp) = pool_with("clamp", "()I");
        let mut view = CodeView::new(clamp_body(clamp));
        assert!(matches!(
            view.replace_call(&pool, 5, &wrong),
            Err(Error::StackImbalance {
                expected: 1,
                actual: 0
            })
        ));
        assert!(matches!(
            view.replace_call(&pool, 4, &wrong),
            Err(Error::InvalidOffset(4))
        ));
    }

    #[test]
    fn rejects_offsets_inside_instructions() {
        let (_, clamp) = pool_with("clamp", "()I");
        let mut view = CodeView::new(clamp_body(clamp));
        let original = view.clone();
        assert!(matches!(
            view.insert_at(2, &[0x00]),
            Err(Error::InvalidOffset(2))
        ));
        assert!(matches!(
            view.insert_at(100, &[0x00]),
            Err(Error::InvalidOffset(100))
        ));
        assert_eq!(view, original);
    }

    #[test]
    fn overflowing_branches_and_bodies_fail() {
        // goto +32765 over a long run of nops
        let mut code = vec![GOTO, 0x7F, 0xFD];
        code.resize(32765, NOP);
        code.push(IRETURN);
        let mut view = CodeView::new(CodeAttribute::new(1, 1, code));
        assert!(matches!(
            view.insert_at(3, &[NOP; 4]),
            Err(Error::BranchOutOfRange(0))
        ));

        let mut view = CodeView::new(CodeAttribute::new(1, 1, vec![NOP; 65530]));
        assert!(matches!(
            view.insert_at(0, &[NOP; 10]),
            Err(Error::CodeTooLarge(65540))
        ));
    }

    fn taking(consumes: u16, delta: i32) -> AssembledSequence {
        AssembledSequence {
            bytes: vec![NOP],
            consumes,
            delta,
            peak: 0,
            max_locals: 0,
        }
    }

    /// ```text
    ///  0: iload_1
    ///  1: ifeq 10
    ///  4: sipush 150
    ///  7: goto 13
    /// 10: sipush 300
    /// 13: ireturn
    /// ```
    fn choice_body() -> CodeAttribute {
        let mut body = CodeAttribute::new(
            1,
            2,
            vec![
                ILOAD_1, IFEQ, 0x00, 0x09, SIPUSH, 0x00, 0x96, GOTO, 0x00, 0x06, SIPUSH, 0x01,
                0x2C, IRETURN,
            ],
        );
        body.attributes.push(CodeAttr::StackMap {
            name_index: 1,
            frames: vec![
                StackMapFrame {
                    offset: 10,
                    kind: FrameKind::Same,
                },
                StackMapFrame {
                    offset: 13,
                    kind: FrameKind::SameLocals1StackItem(VerificationType::Integer),
                },
            ],
        });
        body
    }

    #[test]
    fn insertion_after_a_literal_is_skipped_by_jumps_to_its_successor() {
        let pool = ConstantPool::new();
        let scale = AssembledSequence {
            bytes: vec![ICONST_2, IMUL],
            consumes: 1,
            delta: 0,
            peak: 1,
            max_locals: 0,
        };
        let mut view = CodeView::new(choice_body());

        let small = view.instruction_at(4).unwrap();
        assert_eq!(view.insert_after(&pool, &small, &scale).unwrap(), 2);
        let large = view.instruction_at(12).unwrap();
        assert_eq!(view.insert_after(&pool, &large, &scale).unwrap(), 2);

        // The goto joins behind the second multiplication, so each path scales once.
        assert_eq!(
            view.bytes(),
            &[
                ILOAD_1, IFEQ, 0x00, 0x0B, SIPUSH, 0x00, 0x96, ICONST_2, IMUL, GOTO, 0x00, 0x08,
                SIPUSH, 0x01, 0x2C, ICONST_2, IMUL, IRETURN,
            ]
        );
        let frames: Vec<u32> = match view.code().attributes.last() {
            Some(CodeAttr::StackMap { frames, .. }) => frames.iter().map(|f| f.offset).collect(),
            _ => Vec::new(),
        };
        assert_eq!(frames, vec![12, 17]);
    }

    #[test]
    fn consumed_operands_must_be_on_the_stack() {
        let (pool, clamp) = pool_with("clamp", "()I");
        let mut view = CodeView::new(clamp_body(clamp));
        let original = view.clone();
        let start = view.instruction_at(0).unwrap();
        let call = view.instruction_at(5).unwrap();

        assert!(matches!(
            view.insert_before(&pool, &start, &taking(1, 0)),
            Err(Error::StackImbalance {
                expected: 0,
                actual: 1
            })
        ));
        assert!(matches!(
            view.insert_before(&pool, &call, &taking(2, 0)),
            Err(Error::StackImbalance {
                expected: 1,
                actual: 2
            })
        ));
        assert!(matches!(
            view.insert_after(&pool, &call, &taking(2, 0)),
            Err(Error::StackImbalance {
                expected: 1,
                actual: 2
            })
        ));
        assert!(matches!(
            view.insert_sequence(5, &taking(0, 1)),
            Err(Error::StackImbalance {
                expected: 0,
                actual: 1
            })
        ));
        assert!(matches!(
            view.insert_sequence(5, &taking(1, 0)),
            Err(Error::StackImbalance {
                expected: 0,
                actual: 1
            })
        ));
        assert_eq!(view, original);

        assert_eq!(view.insert_after(&pool, &call, &taking(1, 0)).unwrap(), 1);
        let literal = view.instruction_at(12).unwrap();
        assert_eq!(literal.opcode, ICONST_0);
        assert_eq!(view.insert_after(&pool, &literal, &taking(1, 0)).unwrap(), 1);
    }

    #[test]
    fn set_body_replaces_everything() {
        let (_, clamp) = pool_with("clamp", "()I");
        let mut view = CodeView::new(clamp_body(clamp));
        let body = assembled(vec![ICONST_0, IRETURN], 0, 1);

        view.set_body_sequence(&body, 2).unwrap();
        let once = view.clone();
        view.set_body_sequence(&body, 2).unwrap();
        assert_eq!(view, once);

        let code = view.into_code();
        assert_eq!(code.code, vec![ICONST_0, IRETURN]);
        assert!(code.exception_table.is_empty());
        assert!(code.attributes.is_empty());
        assert_eq!((code.max_stack, code.max_locals), (1, 2));

        let mut view = CodeView::new(clamp_body(clamp));
        assert!(view.set_body(&[0xFF], 1, 1).is_err());
        assert!(matches!(
            view.set_body(&[], 1, 1),
            Err(Error::CodeTooLarge(0))
        ));
    }
}
