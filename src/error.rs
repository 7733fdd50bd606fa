use thiserror::Error;

pub type LispResult<T> = Result<T, LispError>;

/// Every failure the interpreter can surface. All of these are non-fatal:
/// the session's drain loop stringifies them into output and carries on.
#[derive(Error, Debug)]
pub enum LispError {
    #[error("{0} is not a list.")]
    NotAList(String),
    #[error("{0} is not a numeric atom.")]
    NotANumber(String),
    #[error("{0} is not a symbolic atom.")]
    NotASymbol(String),
    #[error("Undefined function {0}.")]
    UndefinedFunction(String),
    #[error("Variable {0} is undefined.")]
    UndefinedVariable(String),
    #[error("Wrong number of arguments for function {0}.")]
    WrongArgumentCount(String),
    #[error("Unexpected ).")]
    UnexpectedListClosure,
    #[error("{0}: odd number of arguments: {1}.")]
    OddArgumentCount(String, String),
    #[error("A proper list cannot end with {0}.")]
    InvalidListEnding(String),
    #[error("Cannot divide by zero.")]
    DivisionByZero,
}
