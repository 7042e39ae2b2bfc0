//! Diagnostics reported while compiling a model into a solver-ready instance.
//!
//! Every failure the compilation pipeline can produce is one of these kinds. They are all local
//! and non-retryable: the same model and data will always fail the same way. Solver outcomes such
//! as infeasibility are *not* errors; they are surfaced as statuses by the solver adapter.
use thiserror::Error;

/// The result type used throughout the compilation pipeline.
pub type CompileResult<T> = Result<T, CompileError>;

/// An error raised while compiling a model and dataset into an instance.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// A malformed statement. Compilation stops at the first one.
    #[error("syntax error at line {line}, column {column}: expected {expected}, found {found}")]
    Syntax {
        /// 1-based line of the offending token
        line: usize,
        /// 1-based column of the offending token
        column: usize,
        /// Description of what the parser was looking for
        expected: String,
        /// The token actually present
        found: String,
    },

    /// A name declared twice.
    #[error("symbol `{name}` is already declared as a {existing}")]
    DuplicateSymbol {
        /// The re-declared name
        name: String,
        /// What the name is already bound to
        existing: String,
    },

    /// A reference to a name that was never declared.
    #[error("unknown symbol `{0}`")]
    UnknownSymbol(String),

    /// A set or parameter whose definition depends on itself.
    #[error("definition of `{0}` is cyclic")]
    CyclicDefinition(String),

    /// A numeric range whose bounds do not describe a valid set.
    #[error("invalid range for set `{name}`: {reason}")]
    InvalidRange {
        /// The set being resolved
        name: String,
        /// Why the bounds are unusable
        reason: String,
    },

    /// A parameter tuple in the declared domain with no bound value.
    ///
    /// This is a hard error, never a silent zero.
    #[error("no value supplied for parameter `{name}[{tuple}]`")]
    MissingParameterValue {
        /// The parameter name
        name: String,
        /// The exact index tuple that is unbound (empty for scalars)
        tuple: String,
    },

    /// A reference whose subscript count disagrees with the declared index arity.
    #[error("`{name}` takes {expected} subscript(s) but was given {found}")]
    ShapeMismatch {
        /// The referenced name
        name: String,
        /// Declared arity
        expected: usize,
        /// Arity at the reference site
        found: usize,
    },

    /// A row/column construction failure not covered by a more specific kind.
    #[error("cannot build instance: {0}")]
    InstanceBuild(String),
}

impl CompileError {
    /// Shorthand for an [`CompileError::InstanceBuild`] error with a formatted message.
    pub fn instance<S: Into<String>>(message: S) -> Self {
        Self::InstanceBuild(message.into())
    }
}
