//! Fields, methods and generic attributes of a class.

use bitflags::bitflags;

use crate::{
    classfile::{
        code::{CodeAttribute, CODE},
        constpool::ConstantPool,
        descriptor::MethodDescriptor,
    },
    file::{parser::Parser, writer::Writer},
    Error, Result,
};

bitflags! {
    /// Access flags of a class.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClassAccessFlags: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared final
        const FINAL = 0x0010;
        /// Treat superclass methods specially in invokespecial
        const SUPER = 0x0020;
        /// Is an interface
        const INTERFACE = 0x0200;
        /// Declared abstract
        const ABSTRACT = 0x0400;
        /// Not present in source
        const SYNTHETIC = 0x1000;
        /// Declared as an annotation interface
        const ANNOTATION = 0x2000;
        /// Declared as an enum class
        const ENUM = 0x4000;
        /// Is a module
        const MODULE = 0x8000;
    }
}

bitflags! {
    /// Access flags of a field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FieldAccessFlags: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared private
        const PRIVATE = 0x0002;
        /// Declared protected
        const PROTECTED = 0x0004;
        /// Declared static
        const STATIC = 0x0008;
        /// Declared final
        const FINAL = 0x0010;
        /// Declared volatile
        const VOLATILE = 0x0040;
        /// Declared transient
        const TRANSIENT = 0x0080;
        /// Not present in source
        const SYNTHETIC = 0x1000;
        /// Element of an enum
        const ENUM = 0x4000;
    }
}

bitflags! {
    /// Access flags of a method.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MethodAccessFlags: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared private
        const PRIVATE = 0x0002;
        /// Declared protected
        const PROTECTED = 0x0004;
        /// Declared static
        const STATIC = 0x0008;
        /// Declared final
        const FINAL = 0x0010;
        /// Declared synchronized
        const SYNCHRONIZED = 0x0020;
        /// Compiler generated bridge method
        const BRIDGE = 0x0040;
        /// Declared with variable arity
        const VARARGS = 0x0080;
        /// Declared native
        const NATIVE = 0x0100;
        /// Declared abstract
        const ABSTRACT = 0x0400;
        /// Declared strictfp
        const STRICT = 0x0800;
        /// Not present in source
        const SYNTHETIC = 0x1000;
    }
}

/// An attribute kept as its name index and raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    /// Constant pool index of the attribute name
    pub name_index: u16,
    /// Payload without the six byte header
    pub data: Vec<u8>,
}

impl AttributeInfo {
    /// Parse one attribute including its header.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the payload is truncated.
    pub fn parse(parser: &mut Parser) -> Result<Self> {
        let name_index = parser.read_be::<u16>()?;
        let length = parser.read_be::<u32>()?;
        let Ok(length) = usize::try_from(length) else {
            return Err(out_of_bounds_error!());
        };
        let data = parser.read_bytes(length)?.to_vec();
        Ok(AttributeInfo { name_index, data })
    }

    /// Write the attribute including its header.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the payload exceeds 4 GiB.
    pub fn write(&self, writer: &mut Writer) -> Result<()> {
        writer.write_be(self.name_index);
        let Ok(length) = u32::try_from(self.data.len()) else {
            return Err(malformed_error!("Attribute payload too long"));
        };
        writer.write_be(length);
        writer.write_bytes(&self.data);
        Ok(())
    }
}

pub(crate) fn parse_attributes(parser: &mut Parser) -> Result<Vec<AttributeInfo>> {
    let count = parser.read_be::<u16>()?;
    (0..count).map(|_| AttributeInfo::parse(parser)).collect()
}

pub(crate) fn write_attributes(attributes: &[AttributeInfo], writer: &mut Writer) -> Result<()> {
    writer.write_count(attributes.len())?;
    for attribute in attributes {
        attribute.write(writer)?;
    }
    Ok(())
}

/// A field declared by the class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Access flags
    pub access_flags: FieldAccessFlags,
    /// Constant pool index of the simple name
    pub name_index: u16,
    /// Constant pool index of the field descriptor
    pub descriptor_index: u16,
    /// Attributes (`ConstantValue`, `Signature`, ...) as raw payloads
    pub attributes: Vec<AttributeInfo>,
}

impl FieldInfo {
    pub(crate) fn parse(parser: &mut Parser) -> Result<Self> {
        Ok(FieldInfo {
            access_flags: FieldAccessFlags::from_bits_retain(parser.read_be()?),
            name_index: parser.read_be()?,
            descriptor_index: parser.read_be()?,
            attributes: parse_attributes(parser)?,
        })
    }

    pub(crate) fn write(&self, writer: &mut Writer) -> Result<()> {
        writer.write_be(self.access_flags.bits());
        writer.write_be(self.name_index);
        writer.write_be(self.descriptor_index);
        write_attributes(&self.attributes, writer)
    }

    /// The field name.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the name index is invalid.
    pub fn name<'p>(&self, pool: &'p ConstantPool) -> Result<&'p str> {
        pool.utf8(self.name_index)
    }

    /// The field descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor index is invalid.
    pub fn descriptor<'p>(&self, pool: &'p ConstantPool) -> Result<&'p str> {
        pool.utf8(self.descriptor_index)
    }

    /// Returns true for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::STATIC)
    }
}

/// A method or constructor declared by the class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    /// Access flags
    pub access_flags: MethodAccessFlags,
    /// Constant pool index of the simple name (`<init>` for constructors)
    pub name_index: u16,
    /// Constant pool index of the method descriptor
    pub descriptor_index: u16,
    /// Attributes as raw payloads; the body is decoded on demand by [`MethodInfo::code`]
    pub attributes: Vec<AttributeInfo>,
}

impl MethodInfo {
    pub(crate) fn parse(parser: &mut Parser) -> Result<Self> {
        Ok(MethodInfo {
            access_flags: MethodAccessFlags::from_bits_retain(parser.read_be()?),
            name_index: parser.read_be()?,
            descriptor_index: parser.read_be()?,
            attributes: parse_attributes(parser)?,
        })
    }

    pub(crate) fn write(&self, writer: &mut Writer) -> Result<()> {
        writer.write_be(self.access_flags.bits());
        writer.write_be(self.name_index);
        writer.write_be(self.descriptor_index);
        write_attributes(&self.attributes, writer)
    }

    /// The method name.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the name index is invalid.
    pub fn name<'p>(&self, pool: &'p ConstantPool) -> Result<&'p str> {
        pool.utf8(self.name_index)
    }

    /// The raw method descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor index is invalid.
    pub fn descriptor<'p>(&self, pool: &'p ConstantPool) -> Result<&'p str> {
        pool.utf8(self.descriptor_index)
    }

    /// The parsed method descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn parsed_descriptor(&self, pool: &ConstantPool) -> Result<MethodDescriptor> {
        MethodDescriptor::parse(self.descriptor(pool)?)
    }

    /// Returns true for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    fn code_position(&self, pool: &ConstantPool) -> Option<usize> {
        self.attributes
            .iter()
            .position(|attribute| pool.utf8(attribute.name_index).is_ok_and(|name| name == CODE))
    }

    /// Returns true if the method has a body.
    #[must_use]
    pub fn has_code(&self, pool: &ConstantPool) -> bool {
        self.code_position(pool).is_some()
    }

    /// Decode the method body.
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingCode`] for abstract or native methods and decoding errors
    /// for a malformed body.
    pub fn code(&self, pool: &ConstantPool) -> Result<CodeAttribute> {
        let Some(position) = self.code_position(pool) else {
            return Err(Error::MissingCode(self.name(pool).unwrap_or("?").to_string()));
        };
        CodeAttribute::parse(&self.attributes[position].data, pool)
    }

    /// Replace the method body, adding a `Code` attribute if the method had none.
    ///
    /// # Errors
    /// Returns encoding errors of [`CodeAttribute::to_bytes`] and
    /// [`crate::Error::PoolOverflow`] if the attribute name cannot be interned.
    pub fn set_code(&mut self, pool: &mut ConstantPool, code: &CodeAttribute) -> Result<()> {
        let data = code.to_bytes()?;
        match self.code_position(pool) {
            Some(position) => self.attributes[position].data = data,
            None => self.attributes.push(AttributeInfo {
                name_index: pool.utf8_index(CODE)?,
                data,
            }),
        }
        Ok(())
    }

    /// Raw payload of the `Code` attribute, if any.
    #[must_use]
    pub fn raw_code<'a>(&'a self, pool: &ConstantPool) -> Option<&'a [u8]> {
        self.code_position(pool)
            .map(|position| self.attributes[position].data.as_slice())
    }
}
