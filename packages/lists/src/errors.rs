use quire_model::ModelError;
use thiserror::Error;

pub type ListResult<T> = Result<T, ListError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ListError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Unknown list type: {0}")]
    UnknownListType(String),

    #[error("View node {0} cannot have children")]
    NotAnElement(u32),

    #[error("Unexpected token at {pos}: expected {expected}, found {found}")]
    UnexpectedToken {
        pos: usize,
        expected: String,
        found: String,
    },

    #[error("Unexpected end of markup at {pos}")]
    UnexpectedEof { pos: usize },

    #[error("Lexer error at {pos}")]
    LexerError { pos: usize },
}

impl ListError {
    pub fn unexpected_token(pos: usize, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::UnexpectedToken {
            pos,
            expected: expected.into(),
            found: found.into(),
        }
    }
}
