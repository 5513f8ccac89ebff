//! The method patching engine.
//!
//! This module turns declarative [`PatchRequest`]s into edited method bodies. It is organized
//! bottom-up, each layer depending only on the ones listed before it:
//!
//! # Key Components
//!
//! - [`SymbolCatalog`] - Stable ids for the external symbols patches reference, interned into
//!   the target's constant pool
//! - [`MethodLocator`] - Finds the method (or constructor) a request names
//! - [`SlotResolver`] - Maps a named local to its slot at a given offset
//! - [`CodeView`] - Scans a body for splice points and splices with full offset fix-up
//! - [`PatchBuilder`] - Builds stack-checked, still symbolic instruction [`Sequence`]s
//! - [`PatchRequest`] / [`PatchOperation`] - What to do to which method
//! - [`PatchApplication`] - Runs requests against a [`crate::file::TypeStore`]
//!
//! # Usage Examples
//!
//! ```rust
//! use classweave::classfile::{ClassFile, CodeAttribute, MemberKind, MethodAccessFlags};
//! use classweave::file::MemoryTypeStore;
//! use classweave::patch::{
//!     Anchor, IntArg, MethodSelector, PatchApplication, PatchBuilder, PatchRequest,
//! };
//!
//! let mut class = ClassFile::new("demo/Scale", "java/lang/Object")?;
//! let clamp = class
//!     .constant_pool
//!     .member_ref_index(MemberKind::Method, "demo/Lib", "clamp", "(I)I")?;
//! let [hi, lo] = clamp.to_be_bytes();
//! // iload_0; invokestatic clamp; ireturn
//! let body = CodeAttribute::new(1, 1, vec![0x1A, 0xB8, hi, lo, 0xAC]);
//! class.add_method(
//!     MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
//!     "scale",
//!     "(I)I",
//!     Some(body),
//! )?;
//!
//! let mut store = MemoryTypeStore::new();
//! store.insert(&class)?;
//!
//! // Cap the argument at 100 before every clamp call.
//! let cap = PatchBuilder::consuming(1)
//!     .min(IntArg::OnStack, 100)?
//!     .build()?;
//! let request = PatchRequest::new("demo.Scale", MethodSelector::method("scale", "(I)I"))
//!     .insert_before(Anchor::call_site("clamp"), cap);
//!
//! let mut application = PatchApplication::new(store);
//! let results = application.apply(&[request]);
//! assert_eq!(results[0].summary().map(|s| s.splices), Some(1));
//! # Ok::<(), classweave::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! Application is sequential. [`SymbolCatalog`] can be read from several threads, but
//! appending requires `&mut` access to the constant pool it interns into.

mod application;
mod builder;
mod catalog;
mod codeview;
mod locator;
mod request;
mod slots;

pub use application::{PatchApplication, TypeRegistry, TypeSnapshot};
pub use builder::{
    AssembledSequence, IntArg, IntOp, InvokeKind, LocalRef, PatchBuilder, Sequence, ValueKind,
};
pub use catalog::{Symbol, SymbolCatalog, SymbolId, SymbolKey, SymbolKind, SymbolRef};
pub use codeview::CodeView;
pub use locator::{FieldHandle, MethodHandle, MethodLocator, MethodSelector};
pub use request::{
    Anchor, ApplyResult, MemberTarget, PatchFailure, PatchOperation, PatchRequest, PatchSummary,
    Placement, Stage,
};
pub use slots::{LocalSlotBinding, SlotResolver};
