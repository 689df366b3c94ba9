//! Leaf error type for the bootstrap interpreter. Grounded on the
//! `thiserror` shape used across the workspace (`broker::error`,
//! `supervisor::error`); every directive failure aborts the remaining
//! script with a message naming the directive, per spec.md §7.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no header found")]
    NoHeaderFound,

    #[error("unexpected end of file reading header")]
    UnexpectedEof,

    #[error("error parsing line: {0}")]
    LineParse(String),

    #[error("{0}: want {1:?}, got {2:?}")]
    Arity(&'static str, &'static str, Vec<String>),

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("path escapes current working directory: {0}")]
    PathEscape(String),

    #[error("unsupported file type {0:?}")]
    UnsupportedFileType(String),

    #[error("python executable not found (tried {0:?})")]
    PythonNotFound(Vec<&'static str>),

    #[error("error executing {0:?} {1:?}: {2}")]
    CommandFailed(String, Vec<String>, String),

    #[error("could not determine file name from url {0:?}")]
    NoFileName(String),

    #[error("{0}: {1}")]
    Directive(String, String),

    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("relative URL {0:?} with no FROM set and no source URL to resolve against")]
    NoBaseUrl(String),
}

pub type BootstrapResult<T> = std::result::Result<T, BootstrapError>;
