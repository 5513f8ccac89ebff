//! Field and method descriptors.
//!
//! Descriptors are the type signatures of the class file format, e.g. `I`,
//! `Ljava/lang/String;`, `[J` or `(ILjava/lang/Object;)Z`. The engine needs them to compute
//! stack effects of invocations and field accesses, and to map parameters to local slots.

use std::fmt;

use crate::Result;

/// A parsed field type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `D`
    Double,
    /// `F`
    Float,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `S`
    Short,
    /// `Z`
    Boolean,
    /// `Lname;` with the internal class name
    Object(String),
    /// `[component`
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parse a complete field descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `descriptor` is not exactly one field type.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let (field, rest) = Self::parse_prefix(descriptor)?;
        if !rest.is_empty() {
            return Err(malformed_error!(
                "Trailing characters in field descriptor '{}'",
                descriptor
            ));
        }
        Ok(field)
    }

    fn parse_prefix(input: &str) -> Result<(Self, &str)> {
        let Some(first) = input.chars().next() else {
            return Err(malformed_error!("Empty field descriptor"));
        };
        let rest = &input[first.len_utf8()..];
        let field = match first {
            'B' => FieldType::Byte,
            'C' => FieldType::Char,
            'D' => FieldType::Double,
            'F' => FieldType::Float,
            'I' => FieldType::Int,
            'J' => FieldType::Long,
            'S' => FieldType::Short,
            'Z' => FieldType::Boolean,
            'L' => {
                let Some(end) = rest.find(';') else {
                    return Err(malformed_error!("Unterminated class type in '{}'", input));
                };
                if end == 0 {
                    return Err(malformed_error!("Empty class name in '{}'", input));
                }
                return Ok((FieldType::Object(rest[..end].to_string()), &rest[end + 1..]));
            }
            '[' => {
                let (component, rest) = Self::parse_prefix(rest)?;
                return Ok((FieldType::Array(Box::new(component)), rest));
            }
            other => {
                return Err(malformed_error!(
                    "Invalid descriptor character '{}' in '{}'",
                    other,
                    input
                ))
            }
        };
        Ok((field, rest))
    }

    /// Number of local variable / operand stack slots a value of this type occupies.
    #[must_use]
    pub fn slot_width(&self) -> u16 {
        match self {
            FieldType::Long | FieldType::Double => 2,
            _ => 1,
        }
    }

    /// Returns true for the types held in `int` slots (`Z`, `B`, `C`, `S`, `I`).
    #[must_use]
    pub fn is_int_like(&self) -> bool {
        matches!(
            self,
            FieldType::Boolean
                | FieldType::Byte
                | FieldType::Char
                | FieldType::Short
                | FieldType::Int
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Byte => write!(f, "B"),
            FieldType::Char => write!(f, "C"),
            FieldType::Double => write!(f, "D"),
            FieldType::Float => write!(f, "F"),
            FieldType::Int => write!(f, "I"),
            FieldType::Long => write!(f, "J"),
            FieldType::Short => write!(f, "S"),
            FieldType::Boolean => write!(f, "Z"),
            FieldType::Object(name) => write!(f, "L{name};"),
            FieldType::Array(component) => write!(f, "[{component}"),
        }
    }
}

/// A parsed method descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Parameter types in declaration order
    pub params: Vec<FieldType>,
    /// Return type, `None` for `V`
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    /// Parse a method descriptor such as `(ILjava/lang/String;)V`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor is not well formed.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let Some(mut rest) = descriptor.strip_prefix('(') else {
            return Err(malformed_error!(
                "Method descriptor '{}' does not start with '('",
                descriptor
            ));
        };

        let mut params = Vec::new();
        loop {
            if let Some(after) = rest.strip_prefix(')') {
                rest = after;
                break;
            }
            let (param, after) = FieldType::parse_prefix(rest)?;
            params.push(param);
            rest = after;
        }

        let ret = if rest == "V" {
            None
        } else {
            Some(FieldType::parse(rest)?)
        };

        Ok(MethodDescriptor { params, ret })
    }

    /// Number of declared parameters.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Slots taken by the parameters (excluding `this`).
    #[must_use]
    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(FieldType::slot_width).sum()
    }

    /// Slots pushed by the return value, 0 for `void`.
    #[must_use]
    pub fn return_width(&self) -> u16 {
        self.ret.as_ref().map_or(0, FieldType::slot_width)
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for param in &self.params {
            write!(f, "{param}")?;
        }
        match &self.ret {
            Some(ret) => write!(f, "){ret}"),
            None => write!(f, ")V"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_types() {
        assert_eq!(FieldType::parse("I").unwrap(), FieldType::Int);
        assert_eq!(
            FieldType::parse("Ljava/lang/String;").unwrap(),
            FieldType::Object("java/lang/String".to_string())
        );
        assert_eq!(
            FieldType::parse("[[J").unwrap(),
            FieldType::Array(Box::new(FieldType::Array(Box::new(FieldType::Long))))
        );
        assert_eq!(FieldType::parse("J").unwrap().slot_width(), 2);
        assert_eq!(FieldType::parse("[J").unwrap().slot_width(), 1);
        assert!(FieldType::parse("").is_err());
        assert!(FieldType::parse("II").is_err());
        assert!(FieldType::parse("Ljava/lang/String").is_err());
        assert!(FieldType::parse("L;").is_err());
        assert!(FieldType::parse("V").is_err());
    }

    #[test]
    fn method_descriptors() {
        let desc = MethodDescriptor::parse("(IJLjava/lang/Object;[D)Z").unwrap();
        assert_eq!(desc.arity(), 4);
        assert_eq!(desc.param_slots(), 5);
        assert_eq!(desc.return_width(), 1);
        assert_eq!(desc.to_string(), "(IJLjava/lang/Object;[D)Z");

        let desc = MethodDescriptor::parse("()V").unwrap();
        assert_eq!(desc.arity(), 0);
        assert_eq!(desc.return_width(), 0);

        assert_eq!(MethodDescriptor::parse("()D").unwrap().return_width(), 2);
        assert!(MethodDescriptor::parse("I)V").is_err());
        assert!(MethodDescriptor::parse("(I").is_err());
        assert!(MethodDescriptor::parse("(I)").is_err());
        assert!(MethodDescriptor::parse("(I)VV").is_err());
    }
}
