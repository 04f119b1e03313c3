use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("line {line}: invalid directive `{directive}`: {message}")]
    Syntax {
        directive: String,
        line: u32,
        message: String,
    },

    #[error("line {line}: undefined variable `${name}` in `{directive}`")]
    UndefinedVariable {
        directive: String,
        line: u32,
        name: String,
    },

    /// A positive directive found no match, or a `not:` directive did.
    #[error("line {line}: `{directive}` failed at: {text}")]
    ExpectationMismatch {
        directive: String,
        line: u32,
        /// The output line where matching failed.
        text: String,
    },
}

pub type CheckResult<T> = Result<T, CheckError>;

impl CheckError {
    /// Source line of the offending directive.
    pub fn line(&self) -> u32 {
        match self {
            CheckError::Syntax { line, .. }
            | CheckError::UndefinedVariable { line, .. }
            | CheckError::ExpectationMismatch { line, .. } => *line,
        }
    }
}
