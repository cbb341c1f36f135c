//! Wire protocol between the client and the search gateway
//!
//! Uses a simple length-prefixed JSON protocol:
//! - 4 bytes (little-endian u32): message length
//! - N bytes: JSON-encoded message

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{BackendError, Hit, SearchResponse};
use crate::query::request::SearchParams;

/// Largest frame accepted in either direction
pub const MAX_MESSAGE_LEN: usize = 100 * 1024 * 1024;

/// Request from client to gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Run a search body against `indices`
    Search {
        indices: Vec<String>,
        body: Value,
        params: SearchParams,
    },

    /// Fetch documents by id
    Get {
        indices: Vec<String>,
        ids: Vec<u64>,
        /// Source filtering applied to the returned documents
        source: Value,
    },

    /// Ping for connection testing
    Ping,
}

/// Failure class reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The query grammar was rejected
    Parse,
    Execution,
    NotFound,
    Timeout,
}

/// Response from gateway to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Search(SearchResponse),

    Get { docs: Vec<Hit> },

    Pong,

    Error { kind: ErrorKind, message: String },
}

impl ErrorKind {
    pub fn into_error(self, message: String) -> BackendError {
        match self {
            ErrorKind::Parse => BackendError::Parse(message),
            ErrorKind::Execution => BackendError::Execution(message),
            ErrorKind::NotFound => BackendError::NotFound(message),
            // The gateway gave up; report it as a failed execution
            ErrorKind::Timeout => BackendError::Execution(format!("timed out: {}", message)),
        }
    }
}

/// Write a message to a stream with length prefix
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &impl Serialize,
) -> io::Result<()> {
    let json = serde_json::to_vec(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    if json.len() > MAX_MESSAGE_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "Message too large"));
    }

    let len = json.len() as u32;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(&json).await?;
    writer.flush().await?;

    Ok(())
}

/// Read a message from a stream with length prefix
pub async fn read_message<R: AsyncRead + Unpin, T: DeserializeOwned>(
    reader: &mut R,
) -> io::Result<T> {
    let len = reader.read_u32_le().await? as usize;

    // Sanity check: don't allocate more than 100MB
    if len > MAX_MESSAGE_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "Message too large"));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;

    serde_json::from_slice(&buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
