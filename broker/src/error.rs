use thiserror::Error;

/// Error codes carried in an [`ErrorFrame`](crate::protocol::ErrorFrame) sent
/// to a misbehaving or stranded peer before close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    PeerUnavailable = 0,
    PeerDead = 1,
    RateLimited = 2,
    BadOp = 3,
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("route must not be empty")]
    EmptyRoute,

    #[error("unauthorized")]
    Unauthorized,

    #[error("unknown opcode {0}")]
    BadOp(u8),

    #[error("peer unavailable")]
    PeerUnavailable,

    #[error("peer dead")]
    PeerDead,

    #[error("rate limited")]
    RateLimited,

    #[error("token invalid: {0}")]
    TokenInvalid(&'static str),
}

impl BrokerError {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            BrokerError::PeerUnavailable => Some(ErrorCode::PeerUnavailable),
            BrokerError::PeerDead => Some(ErrorCode::PeerDead),
            BrokerError::RateLimited => Some(ErrorCode::RateLimited),
            BrokerError::BadOp(_) => Some(ErrorCode::BadOp),
            _ => None,
        }
    }
}

pub type BrokerResult<T> = std::result::Result<T, BrokerError>;
