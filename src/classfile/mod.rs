//! In-memory model of a JVM class file.
//!
//! This module is the "type snapshot" the patching engine works on: a class decoded far enough
//! to locate members and rewrite method bodies, and encoded back without disturbing anything it
//! did not touch.
//!
//! # Architecture
//!
//! Decoding is deliberately shallow. The constant pool, the member tables and the attribute
//! headers are decoded eagerly; method bodies stay raw [`AttributeInfo`] payloads until a caller
//! asks for [`MethodInfo::code`]. A class that is parsed and written back unchanged therefore
//! reproduces its input byte for byte, and patching one method leaves the bytes of every other
//! method untouched.
//!
//! # Key Components
//!
//! - [`ClassFile`] - Top-level container with parse / write
//! - [`ConstantPool`] - The symbol table, append-only
//! - [`MethodInfo`] / [`FieldInfo`] - Member declarations
//! - [`CodeAttribute`] - A decoded method body with its offset-bearing tables
//! - [`MethodDescriptor`] / [`FieldType`] - Type signatures
//! - [`StackMapFrame`] - Verifier frames at absolute offsets
//!
//! # Usage Examples
//!
//! ```rust
//! use classweave::classfile::{ClassFile, CodeAttribute, MethodAccessFlags};
//!
//! let mut class = ClassFile::new("demo/Flags", "java/lang/Object")?;
//! // iconst_1; ireturn
//! let body = CodeAttribute::new(1, 0, vec![0x04, 0xAC]);
//! class.add_method(MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC, "enabled", "()Z", Some(body))?;
//!
//! let bytes = class.to_bytes()?;
//! let parsed = ClassFile::from_bytes(&bytes)?;
//! assert_eq!(parsed.name()?, "demo/Flags");
//! assert_eq!(parsed.to_bytes()?, bytes);
//! # Ok::<(), classweave::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! All types are plain data (`Send + Sync`); mutation requires `&mut`.

mod code;
mod constpool;
mod descriptor;
mod member;
mod stackmap;

pub use code::{
    CodeAttr, CodeAttribute, ExceptionTableEntry, LineNumber, LocalVariable, CODE,
    LINE_NUMBER_TABLE, LOCAL_VARIABLE_TABLE, LOCAL_VARIABLE_TYPE_TABLE, STACK_MAP_TABLE,
};
pub use constpool::{ConstantPool, MemberKind, MemberRef, PoolEntry, PoolTag};
pub use descriptor::{FieldType, MethodDescriptor};
pub use member::{
    AttributeInfo, ClassAccessFlags, FieldAccessFlags, FieldInfo, MethodAccessFlags, MethodInfo,
};
pub use stackmap::{FrameKind, StackMapFrame, VerificationType};

use crate::{
    file::{parser::Parser, writer::Writer},
    Error, Result,
};

/// Magic number at the start of every class file.
pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;

/// Name of instance initializers.
pub const CONSTRUCTOR_NAME: &str = "<init>";

/// Name of the static initializer.
pub const STATIC_INITIALIZER_NAME: &str = "<clinit>";

/// A decoded class file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    /// Minor format version
    pub minor_version: u16,
    /// Major format version (52 = Java 8)
    pub major_version: u16,
    /// The symbol table
    pub constant_pool: ConstantPool,
    /// Class access flags
    pub access_flags: ClassAccessFlags,
    /// Constant pool index of this class
    pub this_class: u16,
    /// Constant pool index of the superclass, 0 for `java/lang/Object` itself
    pub super_class: u16,
    /// Constant pool indices of the implemented interfaces
    pub interfaces: Vec<u16>,
    /// Declared fields
    pub fields: Vec<FieldInfo>,
    /// Declared methods and constructors
    pub methods: Vec<MethodInfo>,
    /// Class level attributes
    pub attributes: Vec<AttributeInfo>,
}

impl ClassFile {
    /// Create an empty public class targeting Java 8.
    ///
    /// # Errors
    /// Returns [`crate::Error::PoolOverflow`] only in theory; the pool is empty.
    pub fn new(name: &str, super_name: &str) -> Result<Self> {
        let mut constant_pool = ConstantPool::new();
        let this_class = constant_pool.class_index(name)?;
        let super_class = constant_pool.class_index(super_name)?;
        Ok(ClassFile {
            minor_version: 0,
            major_version: 52,
            constant_pool,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        })
    }

    /// Decode a class file.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for empty input, [`crate::Error::NotSupported`] for a
    /// wrong magic number, [`crate::Error::OutOfBounds`] for truncated input and
    /// [`crate::Error::Malformed`] for structural damage.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::Empty);
        }

        let mut parser = Parser::new(data);
        if parser.read_be::<u32>()? != CLASS_MAGIC {
            return Err(Error::NotSupported);
        }

        let minor_version = parser.read_be()?;
        let major_version = parser.read_be()?;
        let constant_pool = ConstantPool::parse(&mut parser)?;
        let access_flags = ClassAccessFlags::from_bits_retain(parser.read_be()?);
        let this_class = parser.read_be()?;
        let super_class = parser.read_be()?;

        let interface_count = parser.read_be::<u16>()?;
        let interfaces = (0..interface_count)
            .map(|_| parser.read_be::<u16>())
            .collect::<Result<Vec<_>>>()?;

        let field_count = parser.read_be::<u16>()?;
        let fields = (0..field_count)
            .map(|_| FieldInfo::parse(&mut parser))
            .collect::<Result<Vec<_>>>()?;

        let method_count = parser.read_be::<u16>()?;
        let methods = (0..method_count)
            .map(|_| MethodInfo::parse(&mut parser))
            .collect::<Result<Vec<_>>>()?;

        let attributes = member::parse_attributes(&mut parser)?;

        if parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes after class file",
                parser.remaining()
            ));
        }

        let class = ClassFile {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        };
        class.constant_pool.class_name(class.this_class)?;
        Ok(class)
    }

    /// Encode the class file.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a table exceeds the limits of the format.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::with_capacity(4096);
        writer.write_be(CLASS_MAGIC);
        writer.write_be(self.minor_version);
        writer.write_be(self.major_version);
        self.constant_pool.write(&mut writer)?;
        writer.write_be(self.access_flags.bits());
        writer.write_be(self.this_class);
        writer.write_be(self.super_class);

        writer.write_count(self.interfaces.len())?;
        for interface in &self.interfaces {
            writer.write_be(*interface);
        }

        writer.write_count(self.fields.len())?;
        for field in &self.fields {
            field.write(&mut writer)?;
        }

        writer.write_count(self.methods.len())?;
        for method in &self.methods {
            method.write(&mut writer)?;
        }

        member::write_attributes(&self.attributes, &mut writer)?;
        Ok(writer.into_inner())
    }

    /// Internal name of this class (`a/b/C`).
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `this_class` is not a Class entry.
    pub fn name(&self) -> Result<&str> {
        self.constant_pool.class_name(self.this_class)
    }

    /// Internal name of the superclass, `None` for `java/lang/Object`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `super_class` is not a Class entry.
    pub fn super_name(&self) -> Result<Option<&str>> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.class_name(self.super_class).map(Some)
    }

    /// Find a declared field by simple name.
    #[must_use]
    pub fn find_field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields
            .iter()
            .find(|field| field.name(&self.constant_pool).is_ok_and(|n| n == name))
    }

    /// Declare a new field. Returns its position in [`ClassFile::fields`].
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an invalid descriptor and
    /// [`crate::Error::PoolOverflow`] if the pool is full.
    pub fn add_field(
        &mut self,
        access_flags: FieldAccessFlags,
        name: &str,
        descriptor: &str,
    ) -> Result<usize> {
        FieldType::parse(descriptor)?;
        let field = FieldInfo {
            access_flags,
            name_index: self.constant_pool.utf8_index(name)?,
            descriptor_index: self.constant_pool.utf8_index(descriptor)?,
            attributes: Vec::new(),
        };
        self.fields.push(field);
        Ok(self.fields.len() - 1)
    }

    /// Declare a new method with an optional body. Returns its position in
    /// [`ClassFile::methods`].
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an invalid descriptor, encoding errors of the body
    /// and [`crate::Error::PoolOverflow`] if the pool is full.
    pub fn add_method(
        &mut self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        code: Option<CodeAttribute>,
    ) -> Result<usize> {
        MethodDescriptor::parse(descriptor)?;
        let mut method = MethodInfo {
            access_flags,
            name_index: self.constant_pool.utf8_index(name)?,
            descriptor_index: self.constant_pool.utf8_index(descriptor)?,
            attributes: Vec::new(),
        };
        if let Some(code) = code {
            method.set_code(&mut self.constant_pool, &code)?;
        }
        self.methods.push(method);
        Ok(self.methods.len() - 1)
    }
}

/// Convert a dotted type name (`a.b.C`) to internal form (`a/b/C`).
#[must_use]
pub fn internal_name(name: &str) -> String {
    name.replace('.', "/")
}
