//! Errors surfaced by the cluster-wide [`Client`](super::Client) and its sub-clients.

use thiserror::Error;

use crate::backoff::BackoffError;
use crate::connection;
use crate::messenger::RequestError;
use crate::protocol::error::Error as ProtocolError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// What a [`ServerError`](Error::ServerError) was trying to do, for error messages.
#[derive(Debug, Clone)]
pub enum RequestContext {
    Topic(String),
    Partition { topic: String, partition: i32 },
    Group(String),
}

impl std::fmt::Display for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Topic(name) => write!(f, "topic '{name}'"),
            Self::Partition { topic, partition } => {
                write!(f, "partition {partition} of topic '{topic}'")
            }
            Self::Group(group) => write!(f, "group '{group}'"),
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("broker connection error: {0}")]
    Connection(#[from] connection::Error),

    #[error("request error: {0}")]
    Request(#[from] RequestError),

    #[error("broker returned an unexpected response: {0}")]
    InvalidResponse(String),

    #[error("{request} returned a server error: {protocol_error}{}", error_message.as_deref().map(|m| format!(" ({m})")).unwrap_or_default())]
    ServerError {
        protocol_error: ProtocolError,
        error_message: Option<String>,
        request: RequestContext,
    },

    #[error("retries exhausted: {0}")]
    RetryFailed(Box<Error>),

    #[error("message buffer overflowed: {0}")]
    BufferOverflow(String),

    #[error("delivery failed for {0} record(s)")]
    DeliveryFailed(usize),

    #[error("{0} record(s) rejected by the broker and dropped: {1}")]
    DeliveryRejected(usize, Box<Error>),

    #[error("invalid argument: {0}")]
    ArgumentError(String),
}

impl From<BackoffError<Error>> for Error {
    fn from(err: BackoffError<Error>) -> Self {
        match err {
            BackoffError::DeadlineExceeded { source, .. } => Error::RetryFailed(Box::new(source)),
        }
    }
}
