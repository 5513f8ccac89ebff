//! Byte-level access to class files and the stores they live in.
//!
//! This module provides the plumbing below the class file model: a bounds-checked big-endian
//! reader, a growable writer with back-patching, and the [`TypeStore`] abstraction that hands
//! class bytes to the patching engine and takes patched classes back.
//!
//! # Key Components
//!
//! ## Parsing Infrastructure
//! - [`crate::file::parser::Parser`] - Cursor over a byte slice
//! - [`crate::file::writer::Writer`] - Output buffer used when encoding classes and code
//! - [`crate::file::io`] - Low-level big-endian primitives
//!
//! ## Stores
//! - [`TypeStore`] - Trait for loading and defining types by name
//! - [`MemoryTypeStore`] - Class bytes held in a map
//! - [`DirectoryTypeStore`] - Memory-mapped class files in a package tree
//!
//! # Examples
//!
//! ```rust
//! use classweave::file::{MemoryTypeStore, TypeStore};
//! use classweave::classfile::ClassFile;
//!
//! let mut store = MemoryTypeStore::new();
//! store.define(&ClassFile::new("demo/Flags", "java/lang/Object")?)?;
//!
//! let class = store.load("demo.Flags")?;
//! assert_eq!(class.name()?, "demo/Flags");
//! # Ok::<(), classweave::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! [`Parser`] and [`Writer`] are plain cursors. Stores are `Send` when their contents are;
//! mutation through [`TypeStore::define`] requires `&mut`.

pub mod io;
pub mod parser;
mod store;
pub mod writer;

pub use parser::Parser;
pub use store::{DirectoryTypeStore, MemoryTypeStore, TypeStore};
pub use writer::Writer;
