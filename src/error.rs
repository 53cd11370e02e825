//! Error types for the MinSFI passes

use thiserror::Error;

/// MinSFI errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Instruction reads a pointer the sandbox does not account for
    ///
    /// **Triggered by:** any instruction other than the sandboxed memory
    /// accesses, `ptrtoint` and `bitcast` that has a pointer-typed operand
    /// (call instructions: a pointer-typed argument)
    /// **Example:** `%5 = select i1 %c, i32* %a, i32* %b`
    /// **Recovery:** none; compilation must stop, the module is untouched
    #[error("unexpected instruction with pointer-type operands in @{function}: {instruction}")]
    UncoveredPointerOperand {
        /// Function containing the instruction
        function: String,
        /// The offending instruction, printed
        instruction: String,
    },

    /// The module was already rewritten by the sandboxing pass
    #[error("module {module} is already sandboxed")]
    AlreadySandboxed {
        /// Module name
        module: String,
    },

    /// A runtime-contract symbol clashes with an existing definition
    #[error("symbol conflict on {name}: {reason}")]
    SymbolConflict {
        /// Symbol name
        name: String,
        /// What is incompatible
        reason: String,
    },

    /// Subspace width outside `1..=32`
    #[error("invalid sandbox pointer size: {bits} bits (expected 1-32)")]
    InvalidPointerSize {
        /// Requested width
        bits: u32,
    },

    /// Configuration document could not be parsed
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed IR or misuse of the IR API
    #[error("IR error: {0}")]
    Ir(String),
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Compilation must stop
    Fatal,
    /// Fixable by changing the configuration and retrying
    Recoverable,
}

impl Error {
    /// Classify error severity
    pub fn classify(&self) -> ErrorSeverity {
        match self {
            Error::UncoveredPointerOperand { .. } => ErrorSeverity::Fatal,
            Error::AlreadySandboxed { .. } => ErrorSeverity::Fatal,
            Error::SymbolConflict { .. } => ErrorSeverity::Fatal,
            Error::Ir(_) => ErrorSeverity::Fatal,

            Error::InvalidPointerSize { .. } => ErrorSeverity::Recoverable,
            Error::InvalidConfig(_) => ErrorSeverity::Recoverable,
        }
    }
}

/// Result type for MinSFI operations
pub type Result<T> = std::result::Result<T, Error>;
