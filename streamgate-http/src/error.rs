use thiserror::Error;

use crate::exchange::ExchangeStatus;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("No interceptor accepted the session")]
    InterceptorNotFound,

    #[error("Interceptor rejected the payload")]
    InterceptorRejected,

    #[error("Exchange already terminated: {0:?}")]
    SessionTerminated(ExchangeStatus),

    #[error("Client limit reached for this session")]
    ClientRejected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HttpError>;
