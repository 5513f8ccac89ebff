// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]
// - 'file/store.rs' uses mmap to map a class file into memory

//! # classweave
//!
//! A load-time patching engine for JVM class files. `classweave` edits method bodies of compiled
//! types before they are defined: it replaces calls and field reads, inserts instruction
//! sequences at anchors, replaces whole bodies and adds fields, and keeps every branch, switch,
//! exception range, debug table and stack map frame consistent while doing so.
//!
//! ## Features
//!
//! - **📦 Lossless class files** - Everything the engine does not edit is written back as read
//! - **🔍 Symbolic anchors** - Splice points are found by call target, field, literal or offset
//! - **⚡ Stack-checked sequences** - Replacement code is validated when it is built, not when
//!   the host verifier rejects it
//! - **🛡️ Isolated failures** - A request that fails leaves its method untouched and the rest of
//!   the batch running
//!
//! ## Quick Start
//!
//! ### Using the Prelude
//!
//! ```rust
//! use classweave::prelude::*;
//!
//! let mut store = MemoryTypeStore::new();
//! store.insert(&ClassFile::new("demo/Empty", "java/lang/Object")?)?;
//!
//! let mut application = PatchApplication::new(store);
//! let results = FeatureSet::from_config(&FeatureConfig::default()).apply(&mut application)?;
//!
//! // None of the server types are present, so every request reports a failure.
//! assert!(results.iter().all(|result| !result.is_success()));
//! # Ok::<(), classweave::Error>(())
//! ```
//!
//! ### Patching a class directory
//!
//! ```rust,no_run
//! use classweave::file::DirectoryTypeStore;
//! use classweave::features::{FeatureConfig, FeatureSet};
//! use classweave::patch::PatchApplication;
//!
//! let store = DirectoryTypeStore::new("server/classes", "server/patched");
//! let mut application = PatchApplication::new(store);
//!
//! for result in FeatureSet::from_config(&FeatureConfig::default()).apply(&mut application)? {
//!     if let Some(failure) = result.failure() {
//!         eprintln!("{failure}");
//!     }
//! }
//! # Ok::<(), classweave::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`file`] - Byte level reading and writing, and the [`file::TypeStore`] boundary
//! - [`classfile`] - The class file model: constant pool, members, `Code` and its attributes
//! - [`assembly`] - Instruction decoding and encoding
//! - [`patch`] - The patching engine
//! - [`features`] - Ready-made patches built on the engine
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`] with the crate wide [`Error`]. Inside a batch,
//! errors of single requests are caught and reported as [`patch::PatchFailure`]s.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

pub mod file;

pub mod classfile;

pub mod assembly;

pub mod patch;

pub mod features;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use classweave::prelude::*;
///
/// let request = PatchRequest::new("demo.Type", MethodSelector::by_name("run"))
///     .insert_before(Anchor::MethodStart, PatchBuilder::new().build()?);
/// assert_eq!(request.type_name, "demo/Type");
/// # Ok::<(), classweave::Error>(())
/// ```
pub mod prelude;

/// `classweave` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `classweave` Error type
///
/// # Examples
///
/// ```rust
/// use classweave::{ClassFile, Error};
///
/// match ClassFile::from_bytes(&[0xCA, 0xFE]) {
///     Ok(_) => println!("Loaded"),
///     Err(Error::OutOfBounds { .. }) => println!("Truncated"),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub use error::Error;

/// A parsed class file. See [`classfile::ClassFile`].
pub use classfile::ClassFile;

/// Big-endian cursor used to decode class files and instructions.
pub use file::Parser;
