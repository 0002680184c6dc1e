//! Error types
//!
//! Syntax and type errors are [`CompileError`]s carrying a source location.
//! Failures raised while a program runs are [`RuntimeError`]s. Anything that
//! signals a defect in the compiler pipeline itself is an [`InternalError`].

use thiserror::Error;

use crate::location::SourceLocation;

/// A syntax or type error with source location
#[derive(Debug, Clone)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub location: SourceLocation,
    pub message: String,
}

impl CompileError {
    pub fn new(kind: ErrorKind, location: SourceLocation, message: impl Into<String>) -> Self {
        Self {
            kind,
            location,
            message: message.into(),
        }
    }

    pub fn syntax(location: SourceLocation, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, location, message)
    }

    /// Input ended while a token was still expected.
    pub fn unexpected_end(location: SourceLocation) -> Self {
        Self::new(
            ErrorKind::UnexpectedEndOfInput,
            location,
            "unexpected end of input",
        )
    }

    pub fn type_error(location: SourceLocation, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, location, message)
    }

    /// Is this a syntax error? Running out of input counts as one.
    pub fn is_syntax(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Syntax | ErrorKind::UnexpectedEndOfInput
        )
    }

    /// Could more input fix this error?
    pub fn is_unexpected_end(&self) -> bool {
        self.kind == ErrorKind::UnexpectedEndOfInput
    }

    pub fn is_type_error(&self) -> bool {
        self.kind == ErrorKind::Type
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.location, self.kind, self.message)
    }
}

impl std::error::Error for CompileError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    UnexpectedEndOfInput,
    Type,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Syntax | ErrorKind::UnexpectedEndOfInput => write!(f, "syntax error"),
            ErrorKind::Type => write!(f, "type error"),
        }
    }
}

/// A failure of the running program.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Raised explicitly by a native function, e.g. `error("msg")`
    #[error("{0}")]
    Failure(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow in {0}")]
    Overflow(&'static str),

    #[error("index {index} out of bounds for array of length {length}")]
    IndexOutOfBounds { index: i64, length: usize },
}

/// A broken invariant of the compiler or the VM. Never caused by a
/// well-typed program.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InternalError {
    #[error("invalid stack use: {0}")]
    InvalidStackUse(String),

    #[error("uninitialized read at {0}")]
    UninitializedRead(usize),

    #[error("{0}")]
    Vm(String),

    /// Malformed IR handed to a later stage
    #[error("malformed IR: {0}")]
    Translation(String),
}

/// Anything that can go wrong while evaluating code in a session.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("internal error: {0}")]
    Internal(#[from] InternalError),

    #[error("variable already bound: {0}")]
    AlreadyBound(String),
}

impl Error {
    pub fn as_compile_error(&self) -> Option<&CompileError> {
        match self {
            Error::Compile(e) => Some(e),
            _ => None,
        }
    }

    /// See [`CompileError::is_unexpected_end`].
    pub fn is_unexpected_end(&self) -> bool {
        self.as_compile_error()
            .is_some_and(CompileError::is_unexpected_end)
    }
}

/// Result type for Swona operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
