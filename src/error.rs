use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into two groups: failures while decoding or encoding class files, and
/// failures of the patching engine itself. The engine failures are the ones a
/// [`crate::patch::PatchApplication`] catches and reports per request.
///
/// # Error Categories
///
/// ## Class File Errors
/// - [`Error::Malformed`] - Corrupted or invalid class file structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of the input
/// - [`Error::NotSupported`] - Construct the engine does not handle
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::PoolOverflow`] - The constant pool cannot hold another entry
/// - [`Error::CodeTooLarge`] - A method body grew past the 64 KiB limit
///
/// ## I/O Errors
/// - [`Error::FileError`] - Filesystem I/O errors
///
/// ## Patching Errors
/// - [`Error::TypeNotFound`] - The type store does not know the requested type
/// - [`Error::MethodNotFound`] - No member matches the requested selector
/// - [`Error::MissingCode`] - The matched method has no body (abstract or native)
/// - [`Error::SymbolNotResolvable`] - A reference can neither be found nor synthesized
/// - [`Error::VariableNotFound`] - A named local has no binding at the requested offset
/// - [`Error::EncodingOverflow`] - A literal does not fit the chosen instruction encoding
/// - [`Error::StackImbalance`] - A sequence violates its declared stack effect
/// - [`Error::InvalidOffset`] - An offset does not start an instruction
/// - [`Error::AnchorNotFound`] - A scan for a splice point found nothing
/// - [`Error::BranchOutOfRange`] - A short branch cannot span the grown body
///
/// # Examples
///
/// ```rust
/// use classweave::{Error, ClassFile};
///
/// match ClassFile::from_bytes(&[0xCA, 0xFE]) {
///     Ok(_) => unreachable!(),
///     Err(Error::OutOfBounds { .. }) => {}
///     Err(e) => panic!("unexpected error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The class file is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the input.
    #[error("Out of Bound read would have occurred - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The input uses a construct the engine does not handle.
    #[error("This construct is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// The constant pool already holds the maximum number of entries.
    #[error("The constant pool is full")]
    PoolOverflow,

    /// A method body would exceed the 65535 byte limit of the class file format.
    #[error("Method body of {0} bytes exceeds the class file limit")]
    CodeTooLarge(usize),

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// The type store has no type with this name.
    #[error("Type not found - {0}")]
    TypeNotFound(String),

    /// No method or constructor on the type matches the selector.
    ///
    /// Usually caused by host version drift. Fatal to exactly one request.
    #[error("Method not found - {type_name}.{method}")]
    MethodNotFound {
        /// Internal name of the searched type
        type_name: String,
        /// Description of the selector that failed to match
        method: String,
    },

    /// The method exists but carries no `Code` attribute.
    #[error("Method has no code - {0}")]
    MissingCode(String),

    /// A reference could neither be located nor synthesized.
    #[error("Symbol not resolvable - {0}")]
    SymbolNotResolvable(String),

    /// A named local variable has no binding covering the requested offset.
    #[error("Variable '{name}' not found at offset {offset}")]
    VariableNotFound {
        /// Debug name of the variable
        name: String,
        /// Offset at which the lookup happened
        offset: u32,
    },

    /// A literal value does not fit the widest encoding of its instruction family.
    #[error("Value {value} exceeds the literal range {min}..={max}")]
    EncodingOverflow {
        /// The value that was requested
        value: i64,
        /// Smallest encodable value
        min: i64,
        /// Largest encodable value
        max: i64,
    },

    /// An instruction sequence does not have the stack effect it declares.
    #[error("Stack imbalance - expected {expected}, got {actual}")]
    StackImbalance {
        /// Required net stack depth change (or depth)
        expected: i32,
        /// Actual net stack depth change (or depth)
        actual: i32,
    },

    /// The offset does not designate the start of an instruction.
    #[error("Offset {0} is not an instruction boundary")]
    InvalidOffset(u32),

    /// A forward scan for a splice anchor matched nothing.
    #[error("Anchor not found - {0}")]
    AnchorNotFound(String),

    /// A 16-bit branch offset no longer fits after a splice.
    #[error("Branch at offset {0} is out of range after splicing")]
    BranchOutOfRange(u32),
}
