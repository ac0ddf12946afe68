//! Redis-Compatible Store Transport
//!
//! Implements [`StoreConnector`] for servers speaking RESP2 (Redis, Valkey,
//! KeyDB, SpinelDB, ...).
//!
//! # Implementation Notes
//! - Plain TCP or TLS (`tokio-rustls`, trust anchors from `webpki-roots`)
//! - `AUTH <password>` as the default user when a password is configured
//! - One request/reply pair in flight at a time; concurrent callers queue on
//!   a `tokio::sync::Mutex` around the framed stream
//! - Values that are not valid UTF-8 are returned Base64-encoded

use base64::Engine;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::client::TlsStream;
use tokio_rustls::{rustls, TlsConnector};
use tokio_util::codec::Framed;
use tracing::{debug, info};

use crate::error::{LookupError, Result};
use crate::store::resp::{RespCodec, RespError, RespFrame};
use crate::store::{ConnectionConfig, StoreConnection, StoreConnector};

/// Default TCP connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// Plain TCP or TLS, so the framed transport can be generic over both.
enum StoreStream {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for StoreStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for StoreStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Connector for Redis-compatible servers
#[derive(Debug, Clone)]
pub struct RespConnector {
    connect_timeout: Duration,
}

impl Default for RespConnector {
    fn default() -> Self {
        Self { connect_timeout: DEFAULT_CONNECT_TIMEOUT }
    }
}

impl RespConnector {
    /// Create a connector with the default connect timeout
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the TCP connect timeout
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl StoreConnector for RespConnector {
    type Connection = RespConnection;

    async fn connect(&self, config: &ConnectionConfig) -> Result<RespConnection> {
        let address = config.address();
        info!(%address, tls = config.use_tls, database = config.database, "Connecting to store");

        let tcp_stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| {
                LookupError::connection_failed(format!("Timed out connecting to {address}"))
            })?
            .map_err(|e| {
                LookupError::connection_failed(format!("Failed to connect to {address}: {e}"))
            })?;

        let stream = if config.use_tls {
            let mut root_cert_store = rustls::RootCertStore::empty();
            root_cert_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

            let tls_config = rustls::ClientConfig::builder()
                .with_root_certificates(root_cert_store)
                .with_no_client_auth();
            let connector = TlsConnector::from(Arc::new(tls_config));

            let domain = rustls::pki_types::ServerName::try_from(config.host.as_str())
                .map_err(|_| LookupError::connection_failed("Invalid TLS server name"))?
                .to_owned();

            let tls_stream = connector.connect(domain, tcp_stream).await.map_err(|e| {
                LookupError::connection_failed(format!("TLS handshake with {address} failed: {e}"))
            })?;
            StoreStream::Tls(Box::new(tls_stream))
        } else {
            StoreStream::Tcp(tcp_stream)
        };

        let connection = RespConnection::new(stream, address);

        if let Some(password) = &config.password {
            let reply = connection
                .request(RespFrame::command(["AUTH", password.as_str()]))
                .await
                .map_err(|e| LookupError::connection_failed(e.to_string()))?;
            match reply {
                RespFrame::SimpleString(_) => debug!("Authenticated to store"),
                RespFrame::Error(message) => {
                    return Err(LookupError::connection_failed(format!(
                        "Authentication rejected: {message}"
                    )));
                }
                other => {
                    return Err(LookupError::protocol_error(format!(
                        "Unexpected AUTH reply: {}",
                        other.kind()
                    )));
                }
            }
        }

        if config.database != 0 {
            connection.select(config.database).await?;
        }

        Ok(connection)
    }
}

/// An open RESP connection
pub struct RespConnection {
    framed: Mutex<Framed<StoreStream, RespCodec>>,
    open: AtomicBool,
    address: String,
}

impl std::fmt::Debug for RespConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RespConnection")
            .field("address", &self.address)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl RespConnection {
    fn new(stream: StoreStream, address: String) -> Self {
        Self { framed: Mutex::new(Framed::new(stream, RespCodec)), open: AtomicBool::new(true), address }
    }

    /// Send one command and wait for its reply
    async fn request(&self, frame: RespFrame) -> std::result::Result<RespFrame, RespError> {
        let mut framed = self.framed.lock().await;
        let result = async {
            framed.send(frame).await?;
            match framed.next().await {
                Some(reply) => reply,
                None => Err(RespError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                ))),
            }
        }
        .await;

        // Request/reply pairing is lost after a transport error.
        if result.is_err() {
            self.open.store(false, Ordering::SeqCst);
        }
        result
    }
}

impl StoreConnection for RespConnection {
    async fn select(&self, database: u32) -> Result<()> {
        let reply = self
            .request(RespFrame::command(["SELECT".to_string(), database.to_string()]))
            .await
            .map_err(|e| LookupError::connection_failed(e.to_string()))?;
        match reply {
            RespFrame::SimpleString(_) => Ok(()),
            RespFrame::Error(message) => Err(LookupError::connection_failed(format!(
                "SELECT {database} rejected: {message}"
            ))),
            other => {
                Err(LookupError::protocol_error(format!("Unexpected SELECT reply: {}", other.kind())))
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let reply = self
            .request(RespFrame::command(["GET", key]))
            .await
            .map_err(|e| LookupError::lookup_failed(key, e.to_string()))?;
        match reply {
            RespFrame::BulkString(bytes) => Ok(Some(decode_value(&bytes))),
            RespFrame::SimpleString(value) => Ok(Some(value)),
            RespFrame::Null | RespFrame::NullArray => Ok(None),
            RespFrame::Error(message) => Err(LookupError::lookup_failed(key, message)),
            other => Err(LookupError::protocol_error(format!(
                "Unexpected GET reply for '{key}': {}",
                other.kind()
            ))),
        }
    }

    async fn quit(&self) -> Result<()> {
        if !self.is_open() {
            return Ok(());
        }
        let result = self.request(RespFrame::command(["QUIT"])).await;
        self.open.store(false, Ordering::SeqCst);
        match result {
            Ok(RespFrame::SimpleString(_)) => Ok(()),
            Ok(other) => Err(LookupError::protocol_error(format!(
                "Unexpected QUIT reply: {}",
                other.kind()
            ))),
            Err(e) => Err(LookupError::connection_failed(format!(
                "Failed to close connection to {}: {e}",
                self.address
            ))),
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Convert a bulk string to text, Base64-encoding binary payloads.
fn decode_value(bytes: &Bytes) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => base64::engine::general_purpose::STANDARD.encode(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_value_utf8() {
        assert_eq!(decode_value(&Bytes::from_static(b"{\"a\":1}")), r#"{"a":1}"#);
    }

    #[test]
    fn test_decode_value_binary_is_base64() {
        assert_eq!(decode_value(&Bytes::from_static(&[0xff, 0x00, 0x10])), "/wAQ");
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_failure() {
        // Bind then drop a listener to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = RespConnector::new().with_connect_timeout(Duration::from_secs(1));
        let err = connector.connect(&ConnectionConfig::new("127.0.0.1", port)).await.unwrap_err();
        assert_eq!(err.error_code(), "CONNECTION_FAILED");
    }

    #[tokio::test]
    async fn test_tls_handshake_failure_is_connection_failure() {
        // A peer that accepts and hangs up before answering the ClientHello.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                drop(socket);
            }
        });

        let config = ConnectionConfig::new("127.0.0.1", port).with_tls(true);
        let err = tokio::time::timeout(Duration::from_secs(5), RespConnector::new().connect(&config))
            .await
            .expect("TLS connect should not hang")
            .unwrap_err();

        assert_eq!(err.error_code(), "CONNECTION_FAILED");
        assert!(err.message().contains("TLS handshake"), "{}", err.message());
    }
}
