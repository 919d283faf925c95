//! Error types for every layer of the toolchain. Assembly-side errors
//! carry the source position of the offending token or operator; binary
//! errors carry the offending value so messages stay reproducible.

use crate::source::SourcePos;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Error type for C-style numeric parsing and formatting
pub enum NumError {
    /// No digits were present where a number was expected
    #[error("Missing number")]
    MissingNumber,
    /// The parsed number does not fit the target type
    #[error("Number out of range")]
    OutOfRange,
    /// Unexpected characters followed a complete number
    #[error("Garbage at end of number")]
    TrailingGarbage,
    /// An exponent marker was present but its digits were missing
    #[error("Missing exponent digits")]
    MissingExponent,
    /// A hexadecimal float was missing its required binary exponent
    #[error("Missing binary exponent in hexadecimal float")]
    MissingBinaryExponent,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Error kind for expression parsing and evaluation
pub enum ExprErrorKind {
    /// A division or modulo operation had a zero divisor
    #[error("Division by zero")]
    DivisionByZero,
    /// A shift operator's count operand exceeds the type's bit width
    #[error("Shift count {count} out of range")]
    ShiftOutOfRange {
        /// The offending shift count
        count: u64,
    },
    /// A referenced symbol has no definition
    #[error("Undefined symbol '{name}'")]
    SymbolNotFound {
        /// Name of the unresolved symbol
        name: String,
    },
    /// A symbol was defined more than once
    #[error("Symbol '{name}' is already defined")]
    Redefinition {
        /// Name of the redefined symbol
        name: String,
    },
    /// A symbol's definition depends on itself, directly or indirectly
    #[error("Circular definition of symbol '{name}'")]
    CyclicDefinition {
        /// Name of the symbol whose definition loops
        name: String,
    },
    /// An expression that must be absolute referenced a relocatable symbol
    #[error("Expression must be absolute here")]
    CrossSection,
    /// A comparison mixed relative symbols from different sections
    #[error("Relative symbols in comparison must be in the same section")]
    RelativeCompare,
    /// A token appeared where the expression grammar did not expect one
    #[error("Unexpected token in expression")]
    UnexpectedToken,
    /// An operator was missing one of its operands
    #[error("Missing operand")]
    MissingOperand,
    /// An opening parenthesis was never closed
    #[error("Unterminated parenthesis in expression")]
    UnterminatedParen,
    /// A ternary `?:` expression was missing its `:` branch
    #[error("Missing ':' of ternary operator")]
    MissingTernaryColon,
    /// A numeric literal failed to parse
    #[error("{0}")]
    BadNumber(#[from] NumError),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{pos}: {kind}")]
/// An expression error bound to the source position of the offending
/// token or operator
pub struct ExprError {
    /// Position of the offending token or operator
    pub pos: SourcePos,
    /// What went wrong
    pub kind: ExprErrorKind,
}

impl ExprError {
    /// Bind an error kind to a source position
    pub fn new(pos: SourcePos, kind: ExprErrorKind) -> Self {
        Self { pos, kind }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Error kind for GCN instruction encoding
pub enum EncodeErrorKind {
    /// The mnemonic does not match any known instruction
    #[error("Unknown instruction '{name}'")]
    UnknownMnemonic {
        /// The unrecognized mnemonic
        name: String,
    },
    /// The mnemonic is known but not supported on the active architecture
    #[error("Instruction '{name}' is not supported on this architecture")]
    UnsupportedOnGeneration {
        /// The mnemonic rejected for the active generation
        name: String,
    },
    /// An operand did not match the form the instruction expected
    #[error("Expected {expected}")]
    IllegalOperand {
        /// Description of the operand the encoding wanted
        expected: &'static str,
    },
    /// More than one literal constant operand was used in an instruction
    #[error("Only one literal can be used in instruction")]
    IllegalConstant,
    /// The target offset for the instruction is not 4-byte aligned
    #[error("Instruction offset {offset:#x} is not 4-byte aligned")]
    MisalignedInstruction {
        /// The offending section offset
        offset: u64,
    },
    /// An immediate operand does not fit in the field width it targets
    #[error("Immediate {value:#x} does not fit in {bits} bits")]
    ImmOutOfRange {
        /// The offending value
        value: u64,
        /// The field width
        bits: u32,
    },
    /// The instruction's operand list has the wrong number of operands
    #[error("Expected {expected} operands but got {got}")]
    WrongOperandCount {
        /// The operand count the instruction form takes
        expected: usize,
        /// The operand count parsed
        got: usize,
    },
    /// A register range operand was malformed
    #[error("Register range [{start}:{end}] is invalid here")]
    BadRegisterRange {
        /// First register of the range
        start: u16,
        /// Last register of the range
        end: u16,
    },
    /// A required comma separator between operands was missing
    #[error("Expected ',' between operands")]
    MissingComma,
    /// Unexpected content followed the last operand on the line
    #[error("Garbage at end of line")]
    GarbageAtEnd,
    /// The operand expression itself failed to evaluate
    #[error("{0}")]
    Expr(ExprErrorKind),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{pos}: {kind}")]
/// An encoding error bound to the source position of the instruction
pub struct EncodeError {
    /// Position of the offending instruction or operand
    pub pos: SourcePos,
    /// What went wrong
    pub kind: EncodeErrorKind,
}

impl EncodeError {
    /// Bind an error kind to a source position
    pub fn new(pos: SourcePos, kind: EncodeErrorKind) -> Self {
        Self { pos, kind }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Hash)]
/// Error type for reading ELF objects and the AMD container formats
pub enum BinaryError {
    /// A read ran past the end of the available binary data
    #[error("Unexpected end of binary at offset {offset} (wanted {wanted} bytes)")]
    Truncated {
        /// Offset where reading stopped
        offset: usize,
        /// Number of bytes the read wanted
        wanted: usize,
    },
    /// The file does not start with the ELF magic bytes
    #[error("Invalid ELF magic")]
    BadMagic,
    /// The `EI_CLASS` byte in the ELF identification was not recognized
    #[error("Invalid value {value} for ELF Class")]
    InvalidClass {
        /// The offending `EI_CLASS` byte
        value: u8,
    },
    /// The `EI_DATA` byte in the ELF identification was not recognized
    #[error("Invalid value {value} for ELF Data Encoding")]
    InvalidDataEncoding {
        /// The offending `EI_DATA` byte
        value: u8,
    },
    /// A section index referenced a section that does not exist
    #[error("Section {index} out of range")]
    SectionOutOfRange {
        /// The offending section index
        index: usize,
    },
    /// A section's offset and size extend past the end of the file
    #[error("Section {index} does not fit in file")]
    SectionBeyondFile {
        /// The offending section index
        index: usize,
    },
    /// A symbol index referenced a symbol that does not exist
    #[error("Symbol {index} out of range")]
    SymbolOutOfRange {
        /// The offending symbol index
        index: usize,
    },
    /// A name offset pointed past the end of its string table
    #[error("Name offset {offset} past end of string table")]
    NameOffsetOutOfRange {
        /// The offending name offset
        offset: usize,
    },
    /// A section's `sh_link` field referenced a nonexistent section
    #[error("Section link {link} out of range")]
    LinkOutOfRange {
        /// The offending `sh_link` value
        link: u32,
    },
    /// A named object could not be found
    #[error("{what} '{name}' not found")]
    NotFound {
        /// What kind of object was looked up
        what: &'static str,
        /// The name that missed
        name: String,
    },
    /// The AMD GPU machine code was not recognized
    #[error("Unknown GPU device code {code}")]
    UnknownDevice {
        /// The unrecognized machine code
        code: u32,
    },
    /// The embedded MsgPack metadata could not be parsed
    #[error("MsgPack: {what}")]
    MsgPack {
        /// What the MsgPack parser could not do
        what: &'static str,
    },
    /// A binary structure did not have the expected shape
    #[error("Malformed {what}")]
    Malformed {
        /// Which structure was malformed
        what: &'static str,
    },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Hash)]
/// Error type for generating ELF objects and the AMD container formats
pub enum BinGenError {
    /// Writing the generated binary to its destination failed
    #[error("An I/O error occurred: {kind}")]
    Io {
        /// The underlying I/O error kind
        kind: std::io::ErrorKind,
    },
    /// A section id referenced a section that was never added
    #[error("Wrong section id {id}")]
    BadSectionId {
        /// The offending section id
        id: u32,
    },
    /// The entry-point region does not fall inside any emitted section
    #[error("Header entry region out of range")]
    EntryRegionOutOfRange,
    /// A kernel configuration value exceeds what the target device allows
    #[error("{what} out of range for this device")]
    ConfigValueOutOfRange {
        /// Which kernel-config value broke its limit
        what: &'static str,
    },
    /// A free-form internal consistency check failed
    #[error("{what}")]
    Invalid {
        /// Free-form description of the inconsistency
        what: &'static str,
    },
}

impl From<std::io::Error> for BinGenError {
    fn from(e: std::io::Error) -> Self {
        BinGenError::Io { kind: e.kind() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Severity of an accumulated diagnostic
pub enum Severity {
    /// Assembly continues, output still produced
    Warning,
    /// Assembly continues where safe, output withheld
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One accumulated diagnostic: the assembler keeps going after
/// recoverable errors so a single pass reports as many as possible
pub struct Diagnostic {
    /// How bad it is
    pub severity: Severity,
    /// Where it happened
    pub pos: SourcePos,
    /// Human-readable description
    pub message: String,
}

impl Diagnostic {
    /// Build an error-severity diagnostic
    pub fn error(pos: SourcePos, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            pos,
            message: message.into(),
        }
    }

    /// Build a warning-severity diagnostic
    pub fn warning(pos: SourcePos, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            pos,
            message: message.into(),
        }
    }
}

/// Process exit codes the command-line drivers map errors onto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Everything worked
    Success = 0,
    /// Parse or I/O failure in the input
    InputError = 1,
    /// Internal failure
    Internal = 2,
}

impl From<&BinaryError> for ExitCode {
    fn from(_: &BinaryError) -> Self {
        ExitCode::InputError
    }
}

impl From<&BinGenError> for ExitCode {
    fn from(e: &BinGenError) -> Self {
        match e {
            BinGenError::Io { .. } => ExitCode::Internal,
            _ => ExitCode::InputError,
        }
    }
}
