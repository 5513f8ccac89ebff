//! The class file constant pool.
//!
//! The constant pool is the symbol table of a class: every type, member, string and numeric
//! literal referenced by the bytecode is an index into it. Indices are 1-based, index 0 is
//! never valid, and `CONSTANT_Long` / `CONSTANT_Double` occupy two consecutive slots.
//!
//! # Key Components
//!
//! - [`ConstantPool`] - Parsed pool with lookup and append-only interning
//! - [`PoolEntry`] - One decoded entry
//! - [`PoolTag`] - The entry tags defined by the class file format
//! - [`MemberRef`] - Resolved view of a `Fieldref` / `Methodref` / `InterfaceMethodref`
//!
//! # Append-only growth
//!
//! The pool never removes or reorders entries. The `*_index` methods first look for an
//! identical entry and only append when none exists, so indices held by untouched methods stay
//! valid and repeated requests for the same reference do not grow the pool.
//!
//! # Usage Examples
//!
//! ```rust
//! use classweave::classfile::{ConstantPool, MemberKind};
//!
//! let mut pool = ConstantPool::new();
//! let min = pool.member_ref_index(MemberKind::Method, "java/lang/Math", "min", "(II)I")?;
//! let again = pool.member_ref_index(MemberKind::Method, "java/lang/Math", "min", "(II)I")?;
//! assert_eq!(min, again);
//!
//! let member = pool.member_ref(min)?;
//! assert_eq!(member.owner, "java/lang/Math");
//! assert_eq!(member.name, "min");
//! # Ok::<(), classweave::Error>(())
//! ```

use strum::{Display, FromRepr};

use crate::{
    file::{parser::Parser, writer::Writer},
    Error, Result,
};

/// Tag byte of a constant pool entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum PoolTag {
    Utf8 = 1,
    Integer = 3,
    Float = 4,
    Long = 5,
    Double = 6,
    Class = 7,
    String = 8,
    Fieldref = 9,
    Methodref = 10,
    InterfaceMethodref = 11,
    NameAndType = 12,
    MethodHandle = 15,
    MethodType = 16,
    Dynamic = 17,
    InvokeDynamic = 18,
    Module = 19,
    Package = 20,
}

/// One constant pool entry.
///
/// Floating point constants are kept as raw bits so that NaN payloads survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum PoolEntry {
    /// Index 0 and the upper half of a `Long` / `Double`.
    Unusable,
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    Fieldref {
        class_index: u16,
        name_and_type_index: u16,
    },
    Methodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType(u16),
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    Module(u16),
    Package(u16),
}

impl PoolEntry {
    /// The tag of this entry, `None` for [`PoolEntry::Unusable`].
    #[must_use]
    pub fn tag(&self) -> Option<PoolTag> {
        Some(match self {
            PoolEntry::Unusable => return None,
            PoolEntry::Utf8(_) => PoolTag::Utf8,
            PoolEntry::Integer(_) => PoolTag::Integer,
            PoolEntry::Float(_) => PoolTag::Float,
            PoolEntry::Long(_) => PoolTag::Long,
            PoolEntry::Double(_) => PoolTag::Double,
            PoolEntry::Class(_) => PoolTag::Class,
            PoolEntry::String(_) => PoolTag::String,
            PoolEntry::Fieldref { .. } => PoolTag::Fieldref,
            PoolEntry::Methodref { .. } => PoolTag::Methodref,
            PoolEntry::InterfaceMethodref { .. } => PoolTag::InterfaceMethodref,
            PoolEntry::NameAndType { .. } => PoolTag::NameAndType,
            PoolEntry::MethodHandle { .. } => PoolTag::MethodHandle,
            PoolEntry::MethodType(_) => PoolTag::MethodType,
            PoolEntry::Dynamic { .. } => PoolTag::Dynamic,
            PoolEntry::InvokeDynamic { .. } => PoolTag::InvokeDynamic,
            PoolEntry::Module(_) => PoolTag::Module,
            PoolEntry::Package(_) => PoolTag::Package,
        })
    }

    /// Number of pool slots the entry occupies.
    #[must_use]
    pub fn width(&self) -> usize {
        match self {
            PoolEntry::Long(_) | PoolEntry::Double(_) => 2,
            _ => 1,
        }
    }
}

/// The three kinds of member reference entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum MemberKind {
    /// `CONSTANT_Fieldref`
    Field,
    /// `CONSTANT_Methodref`
    Method,
    /// `CONSTANT_InterfaceMethodref`
    InterfaceMethod,
}

/// A member reference with all indirections resolved to strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    /// Which kind of reference entry this came from
    pub kind: MemberKind,
    /// Internal name of the declaring type
    pub owner: &'a str,
    /// Simple member name
    pub name: &'a str,
    /// Field or method descriptor
    pub descriptor: &'a str,
}

/// Parsed constant pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<PoolEntry>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Create an empty pool (containing only the unusable slot 0).
    #[must_use]
    pub fn new() -> Self {
        ConstantPool {
            entries: vec![PoolEntry::Unusable],
        }
    }

    /// Parse the pool starting at `constant_pool_count`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown tags or a count of zero, and
    /// [`crate::Error::OutOfBounds`] on truncated input.
    pub fn parse(parser: &mut Parser) -> Result<Self> {
        let count = usize::from(parser.read_be::<u16>()?);
        if count == 0 {
            return Err(malformed_error!("Constant pool count of zero"));
        }

        let mut entries = Vec::with_capacity(count);
        entries.push(PoolEntry::Unusable);
        while entries.len() < count {
            let index = entries.len();
            let tag = parser.read_be::<u8>()?;
            let Some(tag) = PoolTag::from_repr(tag) else {
                return Err(malformed_error!(
                    "Unknown constant pool tag {} at index {}",
                    tag,
                    index
                ));
            };

            let entry = match tag {
                PoolTag::Utf8 => PoolEntry::Utf8(parser.read_utf8()?),
                PoolTag::Integer => PoolEntry::Integer(parser.read_be()?),
                PoolTag::Float => PoolEntry::Float(parser.read_be()?),
                PoolTag::Long => PoolEntry::Long(parser.read_be()?),
                PoolTag::Double => PoolEntry::Double(parser.read_be()?),
                PoolTag::Class => PoolEntry::Class(parser.read_be()?),
                PoolTag::String => PoolEntry::String(parser.read_be()?),
                PoolTag::Fieldref => PoolEntry::Fieldref {
                    class_index: parser.read_be()?,
                    name_and_type_index: parser.read_be()?,
                },
                PoolTag::Methodref => PoolEntry::Methodref {
                    class_index: parser.read_be()?,
                    name_and_type_index: parser.read_be()?,
                },
                PoolTag::InterfaceMethodref => PoolEntry::InterfaceMethodref {
                    class_index: parser.read_be()?,
                    name_and_type_index: parser.read_be()?,
                },
                PoolTag::NameAndType => PoolEntry::NameAndType {
                    name_index: parser.read_be()?,
                    descriptor_index: parser.read_be()?,
                },
                PoolTag::MethodHandle => PoolEntry::MethodHandle {
                    reference_kind: parser.read_be()?,
                    reference_index: parser.read_be()?,
                },
                PoolTag::MethodType => PoolEntry::MethodType(parser.read_be()?),
                PoolTag::Dynamic => PoolEntry::Dynamic {
                    bootstrap_method_attr_index: parser.read_be()?,
                    name_and_type_index: parser.read_be()?,
                },
                PoolTag::InvokeDynamic => PoolEntry::InvokeDynamic {
                    bootstrap_method_attr_index: parser.read_be()?,
                    name_and_type_index: parser.read_be()?,
                },
                PoolTag::Module => PoolEntry::Module(parser.read_be()?),
                PoolTag::Package => PoolEntry::Package(parser.read_be()?),
            };

            let width = entry.width();
            entries.push(entry);
            if width == 2 {
                if entries.len() >= count {
                    return Err(malformed_error!(
                        "Wide constant at index {} overruns the pool",
                        index
                    ));
                }
                entries.push(PoolEntry::Unusable);
            }
        }

        Ok(ConstantPool { entries })
    }

    /// Serialize the pool including `constant_pool_count`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a string is too long to encode.
    pub fn write(&self, writer: &mut Writer) -> Result<()> {
        writer.write_count(self.entries.len())?;
        for entry in &self.entries {
            let Some(tag) = entry.tag() else {
                continue;
            };
            writer.write_be(tag as u8);
            match entry {
                PoolEntry::Unusable => {}
                PoolEntry::Utf8(value) => writer.write_utf8(value)?,
                PoolEntry::Integer(value) => writer.write_be(*value),
                PoolEntry::Float(bits) => writer.write_be(*bits),
                PoolEntry::Long(value) => writer.write_be(*value),
                PoolEntry::Double(bits) => writer.write_be(*bits),
                PoolEntry::Class(index)
                | PoolEntry::String(index)
                | PoolEntry::MethodType(index)
                | PoolEntry::Module(index)
                | PoolEntry::Package(index) => writer.write_be(*index),
                PoolEntry::Fieldref {
                    class_index,
                    name_and_type_index,
                }
                | PoolEntry::Methodref {
                    class_index,
                    name_and_type_index,
                }
                | PoolEntry::InterfaceMethodref {
                    class_index,
                    name_and_type_index,
                } => {
                    writer.write_be(*class_index);
                    writer.write_be(*name_and_type_index);
                }
                PoolEntry::NameAndType {
                    name_index,
                    descriptor_index,
                } => {
                    writer.write_be(*name_index);
                    writer.write_be(*descriptor_index);
                }
                PoolEntry::MethodHandle {
                    reference_kind,
                    reference_index,
                } => {
                    writer.write_be(*reference_kind);
                    writer.write_be(*reference_index);
                }
                PoolEntry::Dynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                }
                | PoolEntry::InvokeDynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                } => {
                    writer.write_be(*bootstrap_method_attr_index);
                    writer.write_be(*name_and_type_index);
                }
            }
        }
        Ok(())
    }

    /// `constant_pool_count` as stored in the file (one more than the highest index).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the pool holds no usable entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Iterate over `(index, entry)` pairs, skipping unusable slots.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &PoolEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !matches!(entry, PoolEntry::Unusable))
            .filter_map(|(index, entry)| u16::try_from(index).ok().map(|index| (index, entry)))
    }

    /// Fetch the entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for index 0, unusable slots and indices past the end.
    pub fn get(&self, index: u16) -> Result<&PoolEntry> {
        match self.entries.get(usize::from(index)) {
            Some(PoolEntry::Unusable) | None => Err(malformed_error!(
                "Invalid constant pool index {} (count {})",
                index,
                self.entries.len()
            )),
            Some(entry) => Ok(entry),
        }
    }

    /// Fetch a `CONSTANT_Utf8` string.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the index is invalid or not a Utf8 entry.
    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            PoolEntry::Utf8(value) => Ok(value),
            other => Err(malformed_error!(
                "Expected Utf8 at index {}, found {:?}",
                index,
                other.tag()
            )),
        }
    }

    /// Fetch the internal name referenced by a `CONSTANT_Class`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the index is invalid or not a Class entry.
    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            PoolEntry::Class(name_index) => self.utf8(*name_index),
            other => Err(malformed_error!(
                "Expected Class at index {}, found {:?}",
                index,
                other.tag()
            )),
        }
    }

    /// Fetch the `(name, descriptor)` pair of a `CONSTANT_NameAndType`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the index is invalid or not a NameAndType entry.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            PoolEntry::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            other => Err(malformed_error!(
                "Expected NameAndType at index {}, found {:?}",
                index,
                other.tag()
            )),
        }
    }

    /// Resolve a field, method or interface method reference.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the index is invalid or not a member reference.
    pub fn member_ref(&self, index: u16) -> Result<MemberRef<'_>> {
        let (kind, class_index, name_and_type_index) = match self.get(index)? {
            PoolEntry::Fieldref {
                class_index,
                name_and_type_index,
            } => (MemberKind::Field, class_index, name_and_type_index),
            PoolEntry::Methodref {
                class_index,
                name_and_type_index,
            } => (MemberKind::Method, class_index, name_and_type_index),
            PoolEntry::InterfaceMethodref {
                class_index,
                name_and_type_index,
            } => (MemberKind::InterfaceMethod, class_index, name_and_type_index),
            other => {
                return Err(malformed_error!(
                    "Expected member reference at index {}, found {:?}",
                    index,
                    other.tag()
                ))
            }
        };

        let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
        Ok(MemberRef {
            kind,
            owner: self.class_name(*class_index)?,
            name,
            descriptor,
        })
    }

    /// Resolve the `(name, descriptor)` of an `invokedynamic` call site.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the index is not an InvokeDynamic entry.
    pub fn invoke_dynamic(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            PoolEntry::InvokeDynamic {
                name_and_type_index,
                ..
            } => self.name_and_type(*name_and_type_index),
            other => Err(malformed_error!(
                "Expected InvokeDynamic at index {}, found {:?}",
                index,
                other.tag()
            )),
        }
    }

    /// Look up an existing `CONSTANT_Utf8` without appending.
    #[must_use]
    pub fn find_utf8(&self, value: &str) -> Option<u16> {
        self.entries
            .iter()
            .position(|entry| matches!(entry, PoolEntry::Utf8(existing) if existing == value))
            .and_then(|index| u16::try_from(index).ok())
    }

    /// Index of `CONSTANT_Utf8 value`, appended if missing.
    ///
    /// # Errors
    /// Returns [`crate::Error::PoolOverflow`] if the pool is full.
    pub fn utf8_index(&mut self, value: &str) -> Result<u16> {
        match self.find_utf8(value) {
            Some(index) => Ok(index),
            None => self.push(PoolEntry::Utf8(value.to_string())),
        }
    }

    /// Index of `CONSTANT_Class name`, appended if missing.
    ///
    /// # Errors
    /// Returns [`crate::Error::PoolOverflow`] if the pool is full.
    pub fn class_index(&mut self, name: &str) -> Result<u16> {
        let name_index = self.utf8_index(name)?;
        self.intern(PoolEntry::Class(name_index))
    }

    /// Index of `CONSTANT_String value`, appended if missing.
    ///
    /// # Errors
    /// Returns [`crate::Error::PoolOverflow`] if the pool is full.
    pub fn string_index(&mut self, value: &str) -> Result<u16> {
        let string_index = self.utf8_index(value)?;
        self.intern(PoolEntry::String(string_index))
    }

    /// Index of `CONSTANT_NameAndType`, appended if missing.
    ///
    /// # Errors
    /// Returns [`crate::Error::PoolOverflow`] if the pool is full.
    pub fn name_and_type_index(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name_index = self.utf8_index(name)?;
        let descriptor_index = self.utf8_index(descriptor)?;
        self.intern(PoolEntry::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    /// Index of a member reference, appended (with its Class / NameAndType) if missing.
    ///
    /// # Errors
    /// Returns [`crate::Error::PoolOverflow`] if the pool is full.
    pub fn member_ref_index(
        &mut self,
        kind: MemberKind,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let class_index = self.class_index(owner)?;
        let name_and_type_index = self.name_and_type_index(name, descriptor)?;
        self.intern(match kind {
            MemberKind::Field => PoolEntry::Fieldref {
                class_index,
                name_and_type_index,
            },
            MemberKind::Method => PoolEntry::Methodref {
                class_index,
                name_and_type_index,
            },
            MemberKind::InterfaceMethod => PoolEntry::InterfaceMethodref {
                class_index,
                name_and_type_index,
            },
        })
    }

    /// Index of `CONSTANT_Integer value`, appended if missing.
    ///
    /// # Errors
    /// Returns [`crate::Error::PoolOverflow`] if the pool is full.
    pub fn integer_index(&mut self, value: i32) -> Result<u16> {
        self.intern(PoolEntry::Integer(value))
    }

    /// Index of `CONSTANT_Float value`, appended if missing.
    ///
    /// # Errors
    /// Returns [`crate::Error::PoolOverflow`] if the pool is full.
    pub fn float_index(&mut self, value: f32) -> Result<u16> {
        self.intern(PoolEntry::Float(value.to_bits()))
    }

    fn intern(&mut self, entry: PoolEntry) -> Result<u16> {
        match self.entries.iter().position(|existing| *existing == entry) {
            Some(index) => u16::try_from(index).map_err(|_| Error::PoolOverflow),
            None => self.push(entry),
        }
    }

    fn push(&mut self, entry: PoolEntry) -> Result<u16> {
        let width = entry.width();
        if self.entries.len() + width > usize::from(u16::MAX) {
            return Err(Error::PoolOverflow);
        }

        let index = u16::try_from(self.entries.len()).map_err(|_| Error::PoolOverflow)?;
        self.entries.push(entry);
        if width == 2 {
            self.entries.push(PoolEntry::Unusable);
        }
        Ok(index)
    }
}
