//! Leaf error type for the supervisor, grounded on
//! `rumblefrog-lrthrome/server/src/error.rs`'s `thiserror` shape (kept
//! simpler here: nothing in this crate crosses a wire boundary, so there is
//! no `code()` method).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("job {0:?} has PoolSize 0")]
    EmptyPool(String),
}

pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;
