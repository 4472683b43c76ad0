//! One request/response cycle's worth of framing on top of a [`Transport`].
//!
//! A `Messenger` owns a single TCP (or TLS) connection. Writing and reading happen on
//! independent halves of the socket: the calling task writes the request frame and
//! waits on a `oneshot` channel, while a single background task owns the read half and
//! dispatches each response frame to the channel registered for its correlation ID.
//! Kafka's wire protocol allows pipelining multiple in-flight requests per connection,
//! but this client keeps it simple and issues at most one request at a time per
//! connection -- concurrency comes from holding multiple connections, not from
//! pipelining a single one.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{split, AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::connection::transport::Transport;
use crate::protocol::api_key::ApiKey;
use crate::protocol::messages::header::ResponseHeader;
use crate::protocol::traits::{ReadError, ReadType, WriteError, WriteType};
use crate::protocol::{self};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RequestError {
    #[error("I/O error: {0}")]
    IO(#[from] std::io::Error),

    #[error("failed to encode request: {0}")]
    Encode(#[from] WriteError),

    #[error("failed to decode response: {0}")]
    Decode(#[from] ReadError),

    #[error("connection is poisoned, a previous I/O error made it unusable: {0}")]
    Poisoned(String),

    #[error("read loop shut down before a response arrived")]
    NoResponse,
}

type PendingMap = Arc<Mutex<HashMap<i32, oneshot::Sender<Vec<u8>>>>>;

/// A framed, single connection to one broker.
#[derive(Debug)]
pub struct Messenger {
    write_half: tokio::sync::Mutex<WriteHalf<Transport>>,
    pending: PendingMap,
    correlation_id: AtomicI32,
    client_id: Option<Arc<str>>,
    poisoned: Arc<Mutex<Option<String>>>,
}

impl Messenger {
    pub fn new(transport: Transport, client_id: Option<Arc<str>>) -> Self {
        let (read_half, write_half) = split(transport);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let poisoned = Arc::new(Mutex::new(None));

        tokio::spawn(read_loop(read_half, Arc::clone(&pending), Arc::clone(&poisoned)));

        Self {
            write_half: tokio::sync::Mutex::new(write_half),
            pending,
            correlation_id: AtomicI32::new(0),
            client_id,
            poisoned,
        }
    }

    /// Sends `body` as the given API/version and awaits its response.
    pub async fn request<B, T>(
        &self,
        api_key: ApiKey,
        api_version: i16,
        body: &B,
    ) -> Result<T, RequestError>
    where
        B: WriteType<Vec<u8>>,
        T: ReadType<Cursor<Vec<u8>>>,
    {
        if let Some(reason) = self.poisoned.lock().clone() {
            return Err(RequestError::Poisoned(reason));
        }

        let correlation_id = self.correlation_id.fetch_add(1, Ordering::SeqCst);

        let mut frame = Vec::new();
        protocol::encode_request(
            &mut frame,
            api_key,
            api_version,
            correlation_id,
            self.client_id.as_deref(),
            body,
        )?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(correlation_id, tx);

        {
            let mut write_half = self.write_half.lock().await;
            if let Err(e) = write_half.write_all(&frame).await {
                self.pending.lock().remove(&correlation_id);
                self.poison(e.to_string());
                return Err(e.into());
            }
        }

        let payload = rx.await.map_err(|_| RequestError::NoResponse)?;
        let mut cursor = Cursor::new(payload);
        let _header = ResponseHeader::read(&mut cursor)?;
        let body = T::read(&mut cursor)?;
        Ok(body)
    }

    fn poison(&self, reason: String) {
        *self.poisoned.lock() = Some(reason);
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.lock().is_some()
    }
}

/// Reads length-prefixed response frames off `read_half` and dispatches each one's
/// body (header included) to whichever caller registered that correlation ID.
async fn read_loop(
    mut read_half: ReadHalf<Transport>,
    pending: PendingMap,
    poisoned: Arc<Mutex<Option<String>>>,
) {
    loop {
        let mut len_buf = [0u8; 4];
        if let Err(e) = read_half.read_exact(&mut len_buf).await {
            debug!(error=%e, "connection read loop exiting");
            *poisoned.lock() = Some(e.to_string());
            break;
        }
        let len = i32::from_be_bytes(len_buf);
        if len < 0 {
            error!(len, "received negative frame length, closing connection");
            *poisoned.lock() = Some("negative frame length".to_string());
            break;
        }

        let mut payload = vec![0u8; len as usize];
        if let Err(e) = read_half.read_exact(&mut payload).await {
            debug!(error=%e, "connection read loop exiting");
            *poisoned.lock() = Some(e.to_string());
            break;
        }

        let correlation_id = match payload.get(0..4) {
            Some(bytes) => i32::from_be_bytes(bytes.try_into().unwrap()),
            None => {
                error!("response frame shorter than a correlation id");
                continue;
            }
        };

        let sender = pending.lock().remove(&correlation_id);
        match sender {
            Some(sender) => {
                let _ = sender.send(payload);
            }
            None => {
                debug!(correlation_id, "no pending request for response, dropping");
            }
        }
    }

    // Connection is dead: wake up every caller still waiting so they don't hang
    // forever, by simply dropping their senders.
    pending.lock().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poisoned_error_display() {
        let err = RequestError::Poisoned("boom".to_string());
        assert_eq!(err.to_string(), "connection is poisoned, a previous I/O error made it unusable: boom");
    }
}
