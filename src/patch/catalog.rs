//! The per-type symbol catalog.
//!
//! A [`SymbolCatalog`] tracks every external reference the patches of one type have asked for.
//! Each distinct [`SymbolKey`] is assigned a stable, 1-based [`SymbolId`] on first use, together
//! with the constant pool entry that backs it. Asking again for the same key, from the same or
//! a different feature module, returns the same id and leaves the pool untouched.
//!
//! The catalog is append-only: entries are never removed or renumbered, and existing constant
//! pool indices never move.
//!
//! # Examples
//!
//! ```rust
//! use classweave::classfile::ConstantPool;
//! use classweave::patch::{SymbolCatalog, SymbolKey};
//!
//! let mut pool = ConstantPool::new();
//! let catalog = SymbolCatalog::new();
//!
//! let min = SymbolKey::method("Lib", "min", "(II)I");
//! let first = catalog.lookup_or_create(&mut pool, &min)?;
//! let again = catalog.lookup_or_create(&mut pool, &min)?;
//! assert_eq!(first, again);
//! assert_eq!(first.get(), 1);
//! # Ok::<(), classweave::Error>(())
//! ```

use std::fmt;

use dashmap::DashMap;
use strum::Display;

use crate::{
    classfile::{ClassFile, ConstantPool, FieldType, MemberKind, MethodDescriptor},
    Error, Result,
};

/// What a symbol refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum SymbolKind {
    /// A class or interface
    Type,
    /// A field
    Field,
    /// A method of a class
    Method,
    /// A method of an interface, invoked with `invokeinterface`
    InterfaceMethod,
}

/// Identity of a symbol: kind, declaring type, simple name and signature.
///
/// For [`SymbolKind::Type`] only `owner` is meaningful; `name` and `signature` are empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolKey {
    /// What the symbol refers to
    pub kind: SymbolKind,
    /// Internal name of the declaring type (`a/b/C`)
    pub owner: String,
    /// Simple member name
    pub name: String,
    /// Field or method descriptor
    pub signature: String,
}

impl SymbolKey {
    fn new(kind: SymbolKind, owner: &str, name: &str, signature: &str) -> Self {
        SymbolKey {
            kind,
            owner: owner.replace('.', "/"),
            name: name.to_string(),
            signature: signature.to_string(),
        }
    }

    /// A class reference.
    #[must_use]
    pub fn type_ref(owner: &str) -> Self {
        Self::new(SymbolKind::Type, owner, "", "")
    }

    /// A field reference.
    #[must_use]
    pub fn field(owner: &str, name: &str, signature: &str) -> Self {
        Self::new(SymbolKind::Field, owner, name, signature)
    }

    /// A class method reference.
    #[must_use]
    pub fn method(owner: &str, name: &str, signature: &str) -> Self {
        Self::new(SymbolKind::Method, owner, name, signature)
    }

    /// An interface method reference.
    #[must_use]
    pub fn interface_method(owner: &str, name: &str, signature: &str) -> Self {
        Self::new(SymbolKind::InterfaceMethod, owner, name, signature)
    }

    /// Check that the key can be synthesized into a constant pool entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::SymbolNotResolvable`] for an empty owner or name, or a signature
    /// that does not parse for the symbol's kind.
    pub fn validate(&self) -> Result<()> {
        let not_resolvable = || Error::SymbolNotResolvable(self.to_string());

        if self.owner.is_empty() {
            return Err(not_resolvable());
        }
        match self.kind {
            SymbolKind::Type => Ok(()),
            _ if self.name.is_empty() => Err(not_resolvable()),
            SymbolKind::Field => FieldType::parse(&self.signature)
                .map(|_| ())
                .map_err(|_| not_resolvable()),
            SymbolKind::Method | SymbolKind::InterfaceMethod => {
                MethodDescriptor::parse(&self.signature)
                    .map(|_| ())
                    .map_err(|_| not_resolvable())
            }
        }
    }
}

impl fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SymbolKind::Type => write!(f, "Type {}", self.owner),
            SymbolKind::Field => write!(f, "Field {}.{}:{}", self.owner, self.name, self.signature),
            kind => write!(f, "{kind} {}.{}{}", self.owner, self.name, self.signature),
        }
    }
}

/// How a patch names a symbol before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SymbolRef {
    /// A fully specified reference; always synthesizable if well formed.
    External(SymbolKey),
    /// A field that must already be declared on the target type with this descriptor.
    OwnField {
        /// Simple field name
        name: String,
        /// Expected field descriptor
        signature: String,
    },
}

impl SymbolRef {
    /// A field of the patched type itself.
    #[must_use]
    pub fn own_field(name: &str, signature: &str) -> Self {
        SymbolRef::OwnField {
            name: name.to_string(),
            signature: signature.to_string(),
        }
    }

    /// Field or method descriptor of the reference.
    #[must_use]
    pub fn signature(&self) -> &str {
        match self {
            SymbolRef::External(key) => &key.signature,
            SymbolRef::OwnField { signature, .. } => signature,
        }
    }

    /// Simple member name of the reference.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            SymbolRef::External(key) => &key.name,
            SymbolRef::OwnField { name, .. } => name,
        }
    }
}

impl From<SymbolKey> for SymbolRef {
    fn from(key: SymbolKey) -> Self {
        SymbolRef::External(key)
    }
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolRef::External(key) => write!(f, "{key}"),
            SymbolRef::OwnField { name, signature } => write!(f, "own field {name}:{signature}"),
        }
    }
}

/// Stable, 1-based identifier of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    /// The numeric id.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// The symbol's identity
    pub key: SymbolKey,
    /// Constant pool index of the backing `Class` / `Fieldref` / `Methodref` entry
    pub pool_index: u16,
}

/// Append-only symbol table of one loaded type.
#[derive(Debug)]
pub struct SymbolCatalog {
    symbols: boxcar::Vec<Symbol>,
    index: DashMap<SymbolKey, SymbolId>,
}

impl Default for SymbolCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        SymbolCatalog {
            symbols: boxcar::Vec::new(),
            index: DashMap::new(),
        }
    }

    /// Return the id of `key`, registering it first if it is new.
    ///
    /// A new symbol is backed by an existing constant pool entry when one matches structurally;
    /// otherwise the missing entries are appended to `pool`.
    ///
    /// # Errors
    /// Returns [`crate::Error::SymbolNotResolvable`] for malformed keys and
    /// [`crate::Error::PoolOverflow`] if the pool cannot grow.
    pub fn lookup_or_create(&self, pool: &mut ConstantPool, key: &SymbolKey) -> Result<SymbolId> {
        if let Some(id) = self.index.get(key) {
            return Ok(*id);
        }

        key.validate()?;
        let pool_index = match key.kind {
            SymbolKind::Type => pool.class_index(&key.owner)?,
            SymbolKind::Field => {
                pool.member_ref_index(MemberKind::Field, &key.owner, &key.name, &key.signature)?
            }
            SymbolKind::Method => {
                pool.member_ref_index(MemberKind::Method, &key.owner, &key.name, &key.signature)?
            }
            SymbolKind::InterfaceMethod => pool.member_ref_index(
                MemberKind::InterfaceMethod,
                &key.owner,
                &key.name,
                &key.signature,
            )?,
        };

        let position = self.symbols.push(Symbol {
            key: key.clone(),
            pool_index,
        });
        let id = SymbolId(u32::try_from(position + 1).map_err(|_| Error::PoolOverflow)?);
        self.index.insert(key.clone(), id);
        Ok(id)
    }

    /// Resolve a patch-level reference against `class`.
    ///
    /// # Errors
    /// Returns [`crate::Error::SymbolNotResolvable`] if an own field is not declared on the
    /// class or an external key is malformed.
    pub fn resolve(&self, class: &mut ClassFile, symbol: &SymbolRef) -> Result<SymbolId> {
        match symbol {
            SymbolRef::External(key) => self.lookup_or_create(&mut class.constant_pool, key),
            SymbolRef::OwnField { name, signature } => {
                let owner = class.name()?.to_string();
                let declared = match class.find_field(name) {
                    Some(field) => Some(field.descriptor(&class.constant_pool)?),
                    None => None,
                };
                if declared != Some(signature.as_str()) {
                    return Err(Error::SymbolNotResolvable(format!(
                        "field {name}:{signature} is not declared on {owner}"
                    )));
                }
                let key = SymbolKey::field(&owner, name, signature);
                self.lookup_or_create(&mut class.constant_pool, &key)
            }
        }
    }

    /// Look up a symbol by id.
    #[must_use]
    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        let position = usize::try_from(id.0).ok()?.checked_sub(1)?;
        self.symbols.get(position)
    }

    /// Look up the id of an already registered key.
    #[must_use]
    pub fn find(&self, key: &SymbolKey) -> Option<SymbolId> {
        self.index.get(key).map(|id| *id)
    }

    /// Constant pool index backing a symbol.
    #[must_use]
    pub fn pool_index(&self, id: SymbolId) -> Option<u16> {
        self.get(id).map(|symbol| symbol.pool_index)
    }

    /// Number of registered symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.count()
    }

    /// Returns true if no symbol has been registered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over all symbols in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .filter_map(|(position, symbol)| {
                let id = u32::try_from(position + 1).ok()?;
                Some((SymbolId(id), symbol))
            })
    }
}
