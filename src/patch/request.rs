//! Patch requests and their outcomes.
//!
//! A [`PatchRequest`] names one method of one type and lists the operations to perform on its
//! body, in order. Requests are plain data: they can be built up front, long before the host
//! type is loaded, and handed to [`crate::patch::PatchApplication::apply`] in a batch.
//!
//! # Usage
//!
//! ```rust
//! use classweave::patch::{MethodSelector, PatchBuilder, PatchRequest};
//!
//! let request = PatchRequest::new(
//!     "host.Mailbox",
//!     MethodSelector::method("isFull", "()Z"),
//! )
//! .replace_call("checkQuota", PatchBuilder::new().push_bool(false)?.build_value(1)?);
//!
//! assert_eq!(request.type_name, "host/Mailbox");
//! assert_eq!(request.operations.len(), 1);
//! # Ok::<(), classweave::Error>(())
//! ```

use std::fmt;

use crate::{
    assembly::Instruction,
    classfile::{internal_name, ConstantPool, FieldAccessFlags, MemberKind},
    patch::{
        builder::Sequence,
        catalog::{SymbolKey, SymbolKind, SymbolRef},
        codeview::CodeView,
        locator::MethodSelector,
    },
    Error, Result,
};

/// The member a call or field access must refer to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberTarget {
    /// Any member with this simple name, whatever its owner and descriptor
    Name(String),
    /// Exactly this owner, name and descriptor
    Member(SymbolKey),
}

impl MemberTarget {
    fn matches(&self, pool: &ConstantPool, instruction: &Instruction) -> Result<bool> {
        let Some(index) = instruction.pool_index() else {
            return Ok(false);
        };
        let member = pool.member_ref(index)?;
        Ok(match self {
            MemberTarget::Name(name) => member.name == name,
            MemberTarget::Member(key) => {
                let kind_matches = match key.kind {
                    SymbolKind::Field => member.kind == MemberKind::Field,
                    SymbolKind::Method | SymbolKind::InterfaceMethod => {
                        member.kind != MemberKind::Field
                    }
                    SymbolKind::Type => false,
                };
                kind_matches
                    && member.owner == key.owner
                    && member.name == key.name
                    && member.descriptor == key.signature
            }
        })
    }

    /// The first call to this member at or after `from`.
    ///
    /// # Errors
    /// Returns decoding errors for a malformed body or constant pool reference.
    pub fn next_call(
        &self,
        view: &CodeView,
        pool: &ConstantPool,
        from: u32,
    ) -> Result<Option<Instruction>> {
        match self {
            MemberTarget::Name(name) => view.next_call_site(pool, name, from),
            MemberTarget::Member(_) => view.find_from(from, |instruction| {
                Ok(instruction.is_invoke() && self.matches(pool, instruction)?)
            }),
        }
    }

    /// The first read or write of this member at or after `from`.
    ///
    /// # Errors
    /// Returns decoding errors for a malformed body or constant pool reference.
    pub fn next_access(
        &self,
        view: &CodeView,
        pool: &ConstantPool,
        from: u32,
    ) -> Result<Option<Instruction>> {
        match self {
            MemberTarget::Name(name) => view.next_field_access(pool, name, from),
            MemberTarget::Member(_) => view.find_from(from, |instruction| {
                Ok(instruction.is_field_access() && self.matches(pool, instruction)?)
            }),
        }
    }
}

impl From<&str> for MemberTarget {
    fn from(name: &str) -> Self {
        MemberTarget::Name(name.to_string())
    }
}

impl From<SymbolKey> for MemberTarget {
    fn from(key: SymbolKey) -> Self {
        MemberTarget::Member(key)
    }
}

impl fmt::Display for MemberTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberTarget::Name(name) => write!(f, "{name}"),
            MemberTarget::Member(key) => write!(f, "{key}"),
        }
    }
}

/// Where an insertion is anchored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Anchor {
    /// Offset 0 of the body
    MethodStart,
    /// A fixed offset of the body as left by the preceding operations
    Offset(u32),
    /// Every call to a member
    CallSite(MemberTarget),
    /// Every read or write of a field
    FieldAccess(MemberTarget),
    /// Every `iconst_*` / `bipush` / `sipush` with this opcode and value
    Literal {
        /// Opcode of the literal push
        opcode: u8,
        /// Pushed value
        value: i32,
    },
    /// Every literal push with this opcode and any of the values, matched in one pass so code
    /// inserted for one value is never matched as another
    AnyLiteral {
        /// Opcode of the literal push
        opcode: u8,
        /// Accepted values
        values: Vec<i32>,
    },
}

impl Anchor {
    /// Anchor at every call to `target`.
    pub fn call_site(target: impl Into<MemberTarget>) -> Self {
        Anchor::CallSite(target.into())
    }

    /// Anchor at every access of `target`.
    pub fn field_access(target: impl Into<MemberTarget>) -> Self {
        Anchor::FieldAccess(target.into())
    }

    /// Anchor at every literal push of `value` by `opcode`.
    #[must_use]
    pub fn literal(opcode: u8, value: i32) -> Self {
        Anchor::Literal { opcode, value }
    }

    /// Anchor at every literal push of one of `values` by `opcode`.
    #[must_use]
    pub fn any_literal(opcode: u8, values: &[i32]) -> Self {
        Anchor::AnyLiteral {
            opcode,
            values: values.to_vec(),
        }
    }

    /// Returns true for anchors that match at most one place.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Anchor::MethodStart | Anchor::Offset(_))
    }

    /// The first matching instruction at or after `from`.
    ///
    /// # Errors
    /// Returns decoding errors for a malformed body and [`crate::Error::InvalidOffset`] for an
    /// offset anchor that is not an instruction boundary.
    pub fn next(
        &self,
        view: &CodeView,
        pool: &ConstantPool,
        from: u32,
    ) -> Result<Option<Instruction>> {
        match self {
            Anchor::MethodStart => view.instruction_at(0).map(Some),
            Anchor::Offset(offset) => view.instruction_at(*offset).map(Some),
            Anchor::CallSite(target) => target.next_call(view, pool, from),
            Anchor::FieldAccess(target) => target.next_access(view, pool, from),
            Anchor::Literal { opcode, value } => view.next_literal(*opcode, *value, from),
            Anchor::AnyLiteral { opcode, values } => view.find_from(from, |instruction| {
                Ok(instruction.opcode == *opcode
                    && instruction
                        .int_literal()
                        .is_some_and(|value| values.contains(&value)))
            }),
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anchor::MethodStart => write!(f, "method start"),
            Anchor::Offset(offset) => write!(f, "offset {offset}"),
            Anchor::CallSite(target) => write!(f, "call to {target}"),
            Anchor::FieldAccess(target) => write!(f, "access to {target}"),
            Anchor::Literal { opcode, value } => write!(f, "literal 0x{opcode:02X} {value}"),
            Anchor::AnyLiteral { opcode, values } => {
                write!(f, "literal 0x{opcode:02X} {values:?}")
            }
        }
    }
}

/// Which side of the anchor instruction receives the insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    /// In front of the anchor; branches to the anchor run the inserted code
    Before,
    /// Behind the anchor
    After,
}

/// One mutation of a method body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatchOperation {
    /// Replace every call to `target` by discards and `sequence`
    ReplaceCall {
        /// Called member
        target: MemberTarget,
        /// Replacement, producing the call's result
        sequence: Sequence,
    },
    /// Replace every access to field `target` by discards and `sequence`
    ReplaceField {
        /// Accessed field
        target: MemberTarget,
        /// Replacement, producing the read value (nothing for writes)
        sequence: Sequence,
    },
    /// Insert `sequence` at every place `anchor` matches
    InsertAt {
        /// Where to insert
        anchor: Anchor,
        /// Side of the anchor
        placement: Placement,
        /// Inserted code, stack neutral
        sequence: Sequence,
    },
    /// Replace the whole body
    SetBody {
        /// New body, ending in a return
        sequence: Sequence,
    },
    /// Declare a field on the patched type, so sequences can reference it as an own field.
    /// Applied while resolving, before any splice.
    AddField {
        /// Access flags of the new field
        access: FieldAccessFlags,
        /// Simple name
        name: String,
        /// Field descriptor
        descriptor: String,
    },
}

impl PatchOperation {
    /// The sequence the operation splices, if any.
    #[must_use]
    pub fn sequence(&self) -> Option<&Sequence> {
        match self {
            PatchOperation::ReplaceCall { sequence, .. }
            | PatchOperation::ReplaceField { sequence, .. }
            | PatchOperation::InsertAt { sequence, .. }
            | PatchOperation::SetBody { sequence } => Some(sequence),
            PatchOperation::AddField { .. } => None,
        }
    }
}

impl fmt::Display for PatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchOperation::ReplaceCall { target, .. } => write!(f, "replace calls to {target}"),
            PatchOperation::ReplaceField { target, .. } => {
                write!(f, "replace accesses to {target}")
            }
            PatchOperation::InsertAt {
                anchor, placement, ..
            } => match placement {
                Placement::Before => write!(f, "insert before {anchor}"),
                Placement::After => write!(f, "insert after {anchor}"),
            },
            PatchOperation::SetBody { .. } => write!(f, "set body"),
            PatchOperation::AddField {
                name, descriptor, ..
            } => write!(f, "add field {name}:{descriptor}"),
        }
    }
}

/// All operations on one method of one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRequest {
    /// Internal name of the patched type
    pub type_name: String,
    /// The patched method
    pub method: MethodSelector,
    /// Operations in application order
    pub operations: Vec<PatchOperation>,
    /// Symbols resolved up front, in addition to those the sequences reference
    pub symbols: Vec<SymbolRef>,
}

impl PatchRequest {
    /// Start a request. `type_name` may be dotted or internal.
    #[must_use]
    pub fn new(type_name: &str, method: MethodSelector) -> Self {
        PatchRequest {
            type_name: internal_name(type_name),
            method,
            operations: Vec::new(),
            symbols: Vec::new(),
        }
    }

    /// Append an operation.
    #[must_use]
    pub fn with(mut self, operation: PatchOperation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Declare a symbol that must resolve before anything is spliced.
    #[must_use]
    pub fn declare(mut self, symbol: impl Into<SymbolRef>) -> Self {
        self.symbols.push(symbol.into());
        self
    }

    /// Replace every call to `target`.
    #[must_use]
    pub fn replace_call(self, target: impl Into<MemberTarget>, sequence: Sequence) -> Self {
        self.with(PatchOperation::ReplaceCall {
            target: target.into(),
            sequence,
        })
    }

    /// Replace every access to field `target`.
    #[must_use]
    pub fn replace_field(self, target: impl Into<MemberTarget>, sequence: Sequence) -> Self {
        self.with(PatchOperation::ReplaceField {
            target: target.into(),
            sequence,
        })
    }

    /// Insert `sequence` before every match of `anchor`.
    #[must_use]
    pub fn insert_before(self, anchor: Anchor, sequence: Sequence) -> Self {
        self.with(PatchOperation::InsertAt {
            anchor,
            placement: Placement::Before,
            sequence,
        })
    }

    /// Insert `sequence` after every match of `anchor`.
    #[must_use]
    pub fn insert_after(self, anchor: Anchor, sequence: Sequence) -> Self {
        self.with(PatchOperation::InsertAt {
            anchor,
            placement: Placement::After,
            sequence,
        })
    }

    /// Replace the whole body.
    #[must_use]
    pub fn set_body(self, sequence: Sequence) -> Self {
        self.with(PatchOperation::SetBody { sequence })
    }

    /// Declare a field on the patched type.
    #[must_use]
    pub fn add_field(self, access: FieldAccessFlags, name: &str, descriptor: &str) -> Self {
        self.with(PatchOperation::AddField {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    /// Every symbol the request needs: declared ones first, then those of each sequence.
    pub fn required_symbols(&self) -> impl Iterator<Item = &SymbolRef> {
        self.symbols.iter().chain(
            self.operations
                .iter()
                .filter_map(PatchOperation::sequence)
                .flat_map(Sequence::symbols),
        )
    }

    /// Every named local the sequences load or store.
    pub fn named_locals(&self) -> impl Iterator<Item = &str> {
        self.operations
            .iter()
            .filter_map(PatchOperation::sequence)
            .flat_map(Sequence::named_locals)
    }
}

/// Phase of a request's application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Stage {
    /// Loading the type, locating the method, resolving symbols and locals
    Resolving,
    /// Performing the operations on the body
    Splicing,
    /// Writing the body back and re-materializing the type
    Committing,
}

/// Record of a committed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchSummary {
    /// Internal name of the patched type
    pub type_name: String,
    /// Name and descriptor of the patched method
    pub method: String,
    /// Number of splices performed (a body replacement counts as one)
    pub splices: usize,
    /// Length of the committed body in bytes
    pub code_length: usize,
    /// SHA-1 of the re-materialized class, lowercase hex
    pub digest: String,
}

/// Record of an aborted request.
#[derive(Debug)]
pub struct PatchFailure {
    /// Phase that failed
    pub stage: Stage,
    /// Internal name of the requested type
    pub type_name: String,
    /// The requested method, as resolved or as selected
    pub method: String,
    /// Cause
    pub reason: Error,
}

impl fmt::Display for PatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} failed while {}: {}",
            self.type_name, self.method, self.stage, self.reason
        )
    }
}

/// Outcome of one request.
#[derive(Debug)]
pub enum ApplyResult {
    /// The body was committed
    Succeeded(PatchSummary),
    /// Nothing was committed
    Failed(PatchFailure),
}

impl ApplyResult {
    /// Returns true if the request was committed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ApplyResult::Succeeded(_))
    }

    /// The commit record, if any.
    #[must_use]
    pub fn summary(&self) -> Option<&PatchSummary> {
        match self {
            ApplyResult::Succeeded(summary) => Some(summary),
            ApplyResult::Failed(_) => None,
        }
    }

    /// The failure record, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&PatchFailure> {
        match self {
            ApplyResult::Succeeded(_) => None,
            ApplyResult::Failed(failure) => Some(failure),
        }
    }
}
