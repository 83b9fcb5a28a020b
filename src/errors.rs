//! Error types for the connection pool

use std::time::Duration;

use thiserror::Error;

use crate::resource::ConnectionId;

/// Error produced by the underlying transport when it is created or closed.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("pool exhausted - no connection slot freed within {0:?}")]
    PoolExhausted(Duration),

    #[error("transport creation failed: {0}")]
    CreationFailed(#[source] TransportError),

    #[error("connection {0} is already retired")]
    AlreadyRetired(ConnectionId),

    #[error("closing connection {id} failed: {source}")]
    CloseFailed {
        id: ConnectionId,
        #[source]
        source: TransportError,
    },

    #[error("pool is closed")]
    PoolClosed,
}

pub type PoolResult<T> = Result<T, PoolError>;
