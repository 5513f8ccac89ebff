//! Type stores: where class bytes come from and where patched classes go.
//!
//! The patching engine never touches a class loader or the file system directly. It asks a
//! [`TypeStore`] for a type by name and hands the encoded bytes of every re-materialized type
//! back through [`TypeStore::define_bytes`]. Two implementations ship with the crate:
//!
//! - [`MemoryTypeStore`] keeps class bytes in a map, for embedding and tests
//! - [`DirectoryTypeStore`] memory-maps `<root>/a/b/C.class` and writes patched classes into a
//!   separate output tree

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use memmap2::Mmap;

use crate::{
    classfile::{internal_name, ClassFile},
    Error, Result,
};

/// Source and sink of class files.
///
/// Names may be given in dotted (`a.b.C`) or internal (`a/b/C`) form.
pub trait TypeStore {
    /// Load and parse the type `name`.
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeNotFound`] if the store has no such type, and parsing errors
    /// for malformed class bytes.
    fn load(&self, name: &str) -> Result<ClassFile>;

    /// Make the encoded class `bytes` the current definition of `name`.
    ///
    /// # Errors
    /// Returns I/O errors of the backing storage.
    fn define_bytes(&mut self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Make `class` the current definition of its type.
    ///
    /// # Errors
    /// Returns encoding errors and the errors of [`TypeStore::define_bytes`].
    fn define(&mut self, class: &ClassFile) -> Result<()> {
        self.define_bytes(class.name()?, &class.to_bytes()?)
    }
}

/// Class bytes held in memory, keyed by internal name.
#[derive(Debug, Clone, Default)]
pub struct MemoryTypeStore {
    classes: HashMap<String, Vec<u8>>,
}

impl MemoryTypeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        MemoryTypeStore::default()
    }

    /// Add raw class bytes under `name`, replacing an earlier definition.
    pub fn insert_bytes(&mut self, name: &str, bytes: Vec<u8>) {
        self.classes.insert(internal_name(name), bytes);
    }

    /// Encode and add `class` under its own name.
    ///
    /// # Errors
    /// Returns encoding errors of `class`.
    pub fn insert(&mut self, class: &ClassFile) -> Result<()> {
        let name = class.name()?.to_string();
        self.classes.insert(name, class.to_bytes()?);
        Ok(())
    }

    /// The current bytes of `name`.
    #[must_use]
    pub fn bytes(&self, name: &str) -> Option<&[u8]> {
        self.classes.get(&internal_name(name)).map(Vec::as_slice)
    }

    /// Internal names of all stored types.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// Number of stored types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns true if the store holds no types.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl TypeStore for MemoryTypeStore {
    fn load(&self, name: &str) -> Result<ClassFile> {
        match self.bytes(name) {
            Some(bytes) => ClassFile::from_bytes(bytes),
            None => Err(Error::TypeNotFound(internal_name(name))),
        }
    }

    fn define_bytes(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        self.insert_bytes(name, bytes.to_vec());
        Ok(())
    }
}

/// Class files in a package directory tree.
///
/// Types are read from `input` and written to `output`; the input tree is never modified.
/// Pointing both at the same directory patches in place.
#[derive(Debug, Clone)]
pub struct DirectoryTypeStore {
    input: PathBuf,
    output: PathBuf,
}

impl DirectoryTypeStore {
    /// Create a store reading from `input` and writing to `output`.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        DirectoryTypeStore {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
        }
    }

    /// Path of `name` below the input root.
    #[must_use]
    pub fn input_path(&self, name: &str) -> PathBuf {
        class_path(&self.input, name)
    }

    /// Path of `name` below the output root.
    #[must_use]
    pub fn output_path(&self, name: &str) -> PathBuf {
        class_path(&self.output, name)
    }
}

fn class_path(root: &Path, name: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for segment in internal_name(name).split('/') {
        path.push(segment);
    }
    path.set_extension("class");
    path
}

impl TypeStore for DirectoryTypeStore {
    fn load(&self, name: &str) -> Result<ClassFile> {
        let path = self.input_path(name);
        if !path.is_file() {
            return Err(Error::TypeNotFound(internal_name(name)));
        }

        let file = fs::File::open(&path)?;
        if file.metadata()?.len() == 0 {
            return Err(Error::Empty);
        }

        let data = unsafe { Mmap::map(&file) }?;
        ClassFile::from_bytes(&data)
    }

    fn define_bytes(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.output_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(())
    }
}
