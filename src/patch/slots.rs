//! Named local variable resolution.
//!
//! Compilers reuse local slots: the same debug name can live in different slots over different
//! ranges of a method, and one slot can hold different variables. A [`SlotResolver`] therefore
//! only answers "which slot holds `name` at offset `at`", never "which slot is `name`".

use crate::{
    classfile::{CodeAttribute, ConstantPool},
    Error, Result,
};

/// One live range of a named local, half-open `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSlotBinding {
    /// Debug name
    pub name: String,
    /// Local variable slot
    pub slot: u16,
    /// First offset covered
    pub start: u32,
    /// First offset no longer covered
    pub end: u32,
}

impl LocalSlotBinding {
    /// Returns true if `at` lies inside the live range.
    #[must_use]
    pub fn covers(&self, at: u32) -> bool {
        self.start <= at && at < self.end
    }
}

/// Maps `(name, offset)` to a local slot using the `LocalVariableTable`.
#[derive(Debug, Clone, Default)]
pub struct SlotResolver {
    bindings: Vec<LocalSlotBinding>,
}

impl SlotResolver {
    /// Collect the bindings of a method body.
    ///
    /// A body compiled without debug information yields an empty resolver, on which every
    /// lookup fails.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a variable name index is not a Utf8 entry.
    pub fn new(code: &CodeAttribute, pool: &ConstantPool) -> Result<Self> {
        let bindings = code
            .local_variables()
            .map(|variable| -> Result<LocalSlotBinding> {
                Ok(LocalSlotBinding {
                    name: pool.utf8(variable.name_index)?.to_string(),
                    slot: variable.index,
                    start: u32::from(variable.start_pc),
                    end: variable.end_pc(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SlotResolver { bindings })
    }

    /// The slot that holds `name` at offset `at`.
    ///
    /// # Errors
    /// Returns [`crate::Error::VariableNotFound`] if the name is unknown or none of its ranges
    /// covers `at`.
    pub fn resolve(&self, name: &str, at: u32) -> Result<u16> {
        self.bindings(name)
            .find(|binding| binding.covers(at))
            .map(|binding| binding.slot)
            .ok_or_else(|| Error::VariableNotFound {
                name: name.to_string(),
                offset: at,
            })
    }

    /// All live ranges recorded for `name`.
    pub fn bindings<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a LocalSlotBinding> {
        self.bindings
            .iter()
            .filter(move |binding| binding.name == name)
    }

    /// Returns true if `name` has at least one binding.
    #[must_use]
    pub fn knows(&self, name: &str) -> bool {
        self.bindings(name).next().is_some()
    }

    /// Returns true if the body carries no local variable debug information.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
