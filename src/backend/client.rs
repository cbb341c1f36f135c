//! Client for the search gateway

use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::net::UnixStream;
use tracing::debug;

use super::protocol::{Request, Response, read_message, write_message};
use super::{Backend, BackendError, Hit, SearchResponse};
use crate::query::request::SearchRequest;

const SOCKET_NAME: &str = "wikiquery.sock";

/// Get the socket path for the search gateway
pub fn get_socket_path() -> PathBuf {
    // Try XDG_RUNTIME_DIR first (most secure, tmpfs-backed)
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(SOCKET_NAME);
    }

    // Fall back to user's home directory
    if let Some(home) = dirs::home_dir() {
        return home.join(".local").join("run").join(SOCKET_NAME);
    }

    // Last resort: /tmp with user ID
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/wikiquery-{}.sock", uid))
}

/// Backend reached through a Unix socket, one connection per call
#[derive(Debug, Clone)]
pub struct SocketBackend {
    path: PathBuf,
}

impl Default for SocketBackend {
    fn default() -> Self {
        Self::new(get_socket_path())
    }
}

impl SocketBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn call(&self, request: &Request) -> Result<Response, BackendError> {
        let mut stream = UnixStream::connect(&self.path).await?;
        write_message(&mut stream, request).await?;
        let response: Response = read_message(&mut stream).await?;

        match response {
            Response::Error { kind, message } => Err(kind.into_error(message)),
            other => Ok(other),
        }
    }
}

impl Backend for SocketBackend {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, BackendError> {
        debug!(
            indices = ?request.indices(),
            kind = request.kind().as_str(),
            "sending search"
        );
        let wire = Request::Search {
            indices: request.indices().to_vec(),
            body: request.body(),
            params: request.params(),
        };
        match self.call(&wire).await? {
            Response::Search(response) => Ok(response),
            _ => Err(BackendError::Protocol("expected a search response".into())),
        }
    }

    async fn get(
        &self,
        indices: &[String],
        ids: &[u64],
        source: &Value,
    ) -> Result<Vec<Hit>, BackendError> {
        let wire = Request::Get {
            indices: indices.to_vec(),
            ids: ids.to_vec(),
            source: source.clone(),
        };
        match self.call(&wire).await? {
            Response::Get { docs } => Ok(docs),
            _ => Err(BackendError::Protocol("expected a get response".into())),
        }
    }

    async fn ping(&self) -> Result<(), BackendError> {
        match self.call(&Request::Ping).await? {
            Response::Pong => Ok(()),
            _ => Err(BackendError::Protocol("expected pong".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::protocol::ErrorKind;
    use tokio::net::UnixListener;

    fn temp_socket(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("wikiquery-test-{}-{}.sock", name, std::process::id()))
    }

    /// Answer one connection with `response`
    async fn serve_once(listener: UnixListener, response: Response) -> Request {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request: Request = read_message(&mut stream).await.unwrap();
        write_message(&mut stream, &response).await.unwrap();
        request
    }

    #[tokio::test]
    async fn test_connect_when_not_running() {
        let backend = SocketBackend::new(temp_socket("missing"));
        let err = backend.ping().await.unwrap_err();
        assert!(matches!(err, BackendError::Connection(_)));
    }

    #[tokio::test]
    async fn test_ping() {
        let path = temp_socket("ping");
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();
        let server = tokio::spawn(serve_once(listener, Response::Pong));

        SocketBackend::new(&path).ping().await.unwrap();
        assert_eq!(server.await.unwrap(), Request::Ping);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_error_response_classified() {
        let path = temp_socket("parse");
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();
        let server = tokio::spawn(serve_once(
            listener,
            Response::Error {
                kind: ErrorKind::NotFound,
                message: "no such index".into(),
            },
        ));

        let err = SocketBackend::new(&path)
            .get(&["wiki".to_string()], &[1], &Value::Bool(false))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
        assert!(matches!(server.await.unwrap(), Request::Get { .. }));
        let _ = std::fs::remove_file(&path);
    }
}
