//! Finding methods, constructors and fields on a loaded type.

use std::fmt;

use crate::{
    classfile::{ClassFile, MethodDescriptor, MethodInfo, CONSTRUCTOR_NAME},
    Error, Result,
};

/// How a request names its target method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MethodSelector {
    /// Exact simple name and descriptor
    Signature {
        /// Simple method name
        name: String,
        /// Method descriptor, e.g. `(II)Z`
        descriptor: String,
    },
    /// First declared method with this simple name, whatever its descriptor
    Name(String),
    /// First declared constructor with this many parameters
    ConstructorArity(usize),
    /// Constructor with this exact descriptor
    Constructor(String),
}

impl MethodSelector {
    /// Select by name and descriptor.
    #[must_use]
    pub fn method(name: &str, descriptor: &str) -> Self {
        MethodSelector::Signature {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }

    /// Select by name only.
    #[must_use]
    pub fn by_name(name: &str) -> Self {
        MethodSelector::Name(name.to_string())
    }

    /// Select a constructor by parameter count.
    #[must_use]
    pub fn constructor_by_arity(arity: usize) -> Self {
        MethodSelector::ConstructorArity(arity)
    }

    /// Select a constructor by descriptor.
    #[must_use]
    pub fn constructor(descriptor: &str) -> Self {
        MethodSelector::Constructor(descriptor.to_string())
    }
}

impl fmt::Display for MethodSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodSelector::Signature { name, descriptor } => write!(f, "{name}{descriptor}"),
            MethodSelector::Name(name) => write!(f, "{name}(*)"),
            MethodSelector::ConstructorArity(arity) => {
                write!(f, "{CONSTRUCTOR_NAME}/{arity}")
            }
            MethodSelector::Constructor(descriptor) => write!(f, "{CONSTRUCTOR_NAME}{descriptor}"),
        }
    }
}

/// A located method with a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodHandle {
    /// Position in [`ClassFile::methods`]
    pub index: usize,
    /// Simple name
    pub name: String,
    /// Parsed descriptor
    pub descriptor: MethodDescriptor,
    /// Whether the method is static (no `this` in slot 0)
    pub is_static: bool,
}

impl MethodHandle {
    /// Local slot of the `n`-th parameter, counting from 1.
    ///
    /// Slot 0 holds `this` for instance methods; `long` and `double` parameters take two
    /// slots. Returns `None` if the method has fewer than `n` parameters.
    #[must_use]
    pub fn parameter_slot(&self, n: usize) -> Option<u16> {
        if n == 0 || n > self.descriptor.arity() {
            return None;
        }
        let preceding: u16 = self.descriptor.params[..n - 1]
            .iter()
            .map(|param| param.slot_width())
            .sum();
        Some(self.receiver_slots() + preceding)
    }

    /// Slots occupied by the receiver and all parameters.
    #[must_use]
    pub fn argument_slots(&self) -> u16 {
        self.receiver_slots() + self.descriptor.param_slots()
    }

    fn receiver_slots(&self) -> u16 {
        u16::from(!self.is_static)
    }
}

impl fmt::Display for MethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}

/// A located field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldHandle {
    /// Position in [`ClassFile::fields`]
    pub index: usize,
    /// Simple name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// Whether the field is static
    pub is_static: bool,
}

/// Member lookup on one class.
pub struct MethodLocator<'a> {
    class: &'a ClassFile,
}

impl<'a> MethodLocator<'a> {
    /// Create a locator for `class`.
    #[must_use]
    pub fn new(class: &'a ClassFile) -> Self {
        MethodLocator { class }
    }

    /// Find a method by simple name and descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::MethodNotFound`] if no method matches and
    /// [`crate::Error::MissingCode`] if the match is abstract or native.
    pub fn resolve(&self, name: &str, descriptor: &str) -> Result<MethodHandle> {
        self.select(&MethodSelector::method(name, descriptor))
    }

    /// Find the first method with a simple name.
    ///
    /// # Errors
    /// Same as [`MethodLocator::resolve`].
    pub fn resolve_by_name(&self, name: &str) -> Result<MethodHandle> {
        self.select(&MethodSelector::by_name(name))
    }

    /// Find the first constructor with `arity` parameters.
    ///
    /// # Errors
    /// Same as [`MethodLocator::resolve`].
    pub fn constructor_by_arity(&self, arity: usize) -> Result<MethodHandle> {
        self.select(&MethodSelector::constructor_by_arity(arity))
    }

    /// Find the constructor with an exact descriptor.
    ///
    /// # Errors
    /// Same as [`MethodLocator::resolve`].
    pub fn constructor(&self, descriptor: &str) -> Result<MethodHandle> {
        self.select(&MethodSelector::constructor(descriptor))
    }

    /// Find the method a selector designates.
    ///
    /// # Errors
    /// Same as [`MethodLocator::resolve`].
    pub fn select(&self, selector: &MethodSelector) -> Result<MethodHandle> {
        let pool = &self.class.constant_pool;

        for (index, method) in self.class.methods.iter().enumerate() {
            let name = method.name(pool)?;
            if !self.matches(selector, method, name)? {
                continue;
            }

            if !method.has_code(pool) {
                return Err(Error::MissingCode(format!(
                    "{}.{}{}",
                    self.class.name()?,
                    name,
                    method.descriptor(pool)?
                )));
            }

            return Ok(MethodHandle {
                index,
                name: name.to_string(),
                descriptor: method.parsed_descriptor(pool)?,
                is_static: method.is_static(),
            });
        }

        Err(Error::MethodNotFound {
            type_name: self.class.name()?.to_string(),
            method: selector.to_string(),
        })
    }

    fn matches(&self, selector: &MethodSelector, method: &MethodInfo, name: &str) -> Result<bool> {
        let pool = &self.class.constant_pool;
        Ok(match selector {
            MethodSelector::Signature {
                name: wanted,
                descriptor,
            } => name == wanted && method.descriptor(pool)? == descriptor,
            MethodSelector::Name(wanted) => name == wanted,
            MethodSelector::ConstructorArity(arity) => {
                name == CONSTRUCTOR_NAME && method.parsed_descriptor(pool)?.arity() == *arity
            }
            MethodSelector::Constructor(descriptor) => {
                name == CONSTRUCTOR_NAME && method.descriptor(pool)? == descriptor
            }
        })
    }

    /// Find a declared field by simple name.
    ///
    /// # Errors
    /// Returns [`crate::Error::SymbolNotResolvable`] if the class declares no such field.
    pub fn field(&self, name: &str) -> Result<FieldHandle> {
        let pool = &self.class.constant_pool;
        for (index, field) in self.class.fields.iter().enumerate() {
            if field.name(pool)? == name {
                return Ok(FieldHandle {
                    index,
                    name: name.to_string(),
                    descriptor: field.descriptor(pool)?.to_string(),
                    is_static: field.is_static(),
                });
            }
        }

        Err(Error::SymbolNotResolvable(format!(
            "field {name} is not declared on {}",
            self.class.name()?
        )))
    }
}
