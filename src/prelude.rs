//! # classweave Prelude
//!
//! The types needed to build patch requests, run them against a store and apply the bundled
//! features. Import this module to get them in one line.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all classweave operations
pub use crate::Error;

/// The result type used throughout classweave
pub use crate::Result;

// ================================================================================================
// Class File Model
// ================================================================================================

/// Parsed class files and their parts
pub use crate::classfile::{
    ClassFile, CodeAttribute, ConstantPool, FieldAccessFlags, MemberKind, MethodAccessFlags,
};

/// Decoded instructions
pub use crate::assembly::{decode_stream, encode_stream, Instruction, Operand};

// ================================================================================================
// Stores
// ================================================================================================

/// Where types are loaded from and defined into
pub use crate::file::{DirectoryTypeStore, MemoryTypeStore, TypeStore};

// ================================================================================================
// Patching Engine
// ================================================================================================

/// Requests and their outcomes
pub use crate::patch::{
    Anchor, ApplyResult, MemberTarget, PatchFailure, PatchOperation, PatchRequest, PatchSummary,
    Placement, Stage,
};

/// Building replacement sequences
pub use crate::patch::{IntArg, IntOp, InvokeKind, LocalRef, PatchBuilder, Sequence, ValueKind};

/// Symbols and method selection
pub use crate::patch::{MethodSelector, SymbolKey, SymbolRef};

/// Running requests
pub use crate::patch::{CodeView, PatchApplication, TypeRegistry};

// ================================================================================================
// Features
// ================================================================================================

/// The bundled server patches
pub use crate::features::{
    CrateCapacity, CrateCapacityConfig, Feature, FeatureConfig, FeatureSet, NoHolyGround,
    NoMailCost, PvpSurfaceMiningSlope,
};
