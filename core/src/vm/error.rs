use thiserror::Error;

/// Errors raised while executing bytecode.
///
/// Messages are stable and carry the Vim error numbers, because scripts match
/// on them inside `catch` clauses (`catch /E716:/`). Everything except the
/// variants reported by [`VmError::is_fatal`] can be caught by a surrounding
/// try region.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    #[error("{code}: Using a {what} as a Number")]
    UsedAsNumber { code: &'static str, what: &'static str },
    #[error("E1030: Using a String as a Number")]
    StringAsNumber,
    #[error("E39: Number expected")]
    NumberExpected,
    #[error("E928: String required")]
    StringRequired,
    #[error("E714: List required")]
    ListRequired,
    #[error("E715: Dictionary required")]
    DictRequired,
    #[error("E1103: Dictionary not set")]
    DictNotSet,
    #[error("E1147: List not set")]
    ListNotSet,
    #[error("E684: list index out of range: {0}")]
    ListIndex(i64),
    #[error("E716: Key not present in Dictionary: {0}")]
    MissingKey(String),
    #[error("E721: Duplicate key in Dictionary: \"{0}\"")]
    DuplicateKey(String),
    #[error("E121: Undefined variable: {0}")]
    UndefinedVariable(String),
    #[error("E1029: Expected {expected} but got {actual}")]
    TypeMismatch { expected: &'static str, actual: &'static str },
    #[error("E1013: Argument {index}: type mismatch, expected {expected} but got {actual}")]
    ArgumentType {
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("E1093: Expected {expected} items but got {actual}")]
    ListLength { expected: usize, actual: usize },
    #[error("E1105: Cannot convert {0} to string")]
    CannotConvertToString(&'static str),
    #[error("E908: using an invalid value as a String: {0}")]
    InvalidStringValue(&'static str),
    #[error("E804: Cannot use '%' with Float")]
    FloatModulus,
    #[error("{0}")]
    InvalidCompare(&'static str),
    #[error("E608: Cannot :throw exceptions with 'Vim' prefix")]
    VimPrefixThrow,
    #[error("E698: variable nested too deep for making a copy")]
    NestedTooDeep,
    #[error("E933: Function was deleted: {0}")]
    FunctionDeleted(String),
    #[error("E117: Unknown function: {0}")]
    UnknownFunction(String),
    #[error("E118: Too many arguments for function: {0}")]
    TooManyArgs(String),
    #[error("E119: Not enough arguments for function: {0}")]
    NotEnoughArgs(String),
    /// Message produced by the host (option validation, command failure).
    #[error("{0}")]
    Host(String),
    /// Message produced by a builtin function.
    #[error("{0}")]
    Builtin(String),
    /// The failure was already reported through the exception state.
    #[error("error already reported")]
    Reported,

    #[error("E342: Out of memory!")]
    OutOfMemory,
    #[error("Multiple closures not supported yet")]
    MultipleClosures,
    #[error("E685: Internal error: {0}")]
    Internal(String),
    #[error("E1099: Unknown error while executing {0}")]
    Unknown(String),
}

impl VmError {
    pub(crate) fn used_as_number(code: &'static str, what: &'static str) -> Self {
        VmError::UsedAsNumber { code, what }
    }

    /// Fatal errors end the invocation even inside a try region.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VmError::OutOfMemory | VmError::MultipleClosures | VmError::Internal(_) | VmError::Unknown(_)
        )
    }

    /// Recover a `VmError` carried by an `anyhow::Error`, wrapping anything
    /// else as a builtin failure.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<VmError>() {
            Some(e) => e.clone(),
            None => VmError::Builtin(format!("{err:#}")),
        }
    }
}
