use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("unexpected token '{token}' at position {pos}")]
    UnexpectedToken { token: String, pos: usize },
    #[error("'{keyword}' at position {pos} requires {expected}")]
    MissingOperand {
        keyword: String,
        pos: usize,
        expected: String,
    },
    #[error("invalid value '{parameter}' at position {pos}, expected {target}: {e}")]
    ValueError {
        parameter: String,
        target: String,
        pos: usize,
        e: String,
    },
    #[error("operator '{op}' is not supported by '{keyword}' at position {pos}")]
    UnsupportedOperator {
        op: String,
        keyword: String,
        pos: usize,
    },
    #[error("'not' at position {pos} is not followed by a primitive or a group")]
    DanglingNot { pos: usize },
    #[error("empty filter expression")]
    EmptyExpression,
    #[error("unbalanced parenthesis")]
    UnbalancedParenthesis,
    #[error("incomplete filter: {msg}")]
    IncompleteFilter { msg: String },
    #[error("default output {output} is out of range ({outputs} outputs configured)")]
    InvalidDefaultOutput { output: usize, outputs: usize },
    #[error("unable to lock the program set: {e}")]
    UnlockProgramError { e: String },
}

/// A filter expression that failed to compile, kept so the host can report it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("expression {index} [{expression}] rejected: {error}")]
pub struct CompileError {
    pub index: usize,
    pub expression: String,
    #[source]
    pub error: FilterError,
}
