//! Socket setup for POP sessions: plain TCP or implicit TLS.

use async_trait::async_trait;
use std::fmt::{Debug, Formatter};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};

/// A bidirectional byte stream a POP session can run over.
pub trait PopStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> PopStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

impl Debug for dyn PopStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "POP connection")
    }
}

/// A boxed connection type
pub type Connection = Box<dyn PopStream>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub accept_invalid_certs: bool,
}

/// Opens connections. Sessions never create sockets themselves, so a test can
/// hand out in-memory streams and count how many were requested.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, endpoint: &Endpoint, connect_timeout: Duration) -> Result<Connection>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, endpoint: &Endpoint, connect_timeout: Duration) -> Result<Connection> {
        debug!(
            "Connecting to {}:{} ({})",
            endpoint.host,
            endpoint.port,
            if endpoint.secure { "TLS" } else { "plain" }
        );

        let tcp = match timeout(
            connect_timeout,
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await
        {
            Err(_) => return Err(Error::Timeout(connect_timeout)),
            Ok(Err(source)) => {
                return Err(Error::Connect {
                    host: endpoint.host.clone(),
                    port: endpoint.port,
                    source,
                });
            }
            Ok(Ok(stream)) => stream,
        };

        if !endpoint.secure {
            return Ok(Box::new(tcp));
        }

        let mut tls_builder = native_tls::TlsConnector::builder();
        if endpoint.accept_invalid_certs {
            tls_builder.danger_accept_invalid_certs(true);
            tls_builder.danger_accept_invalid_hostnames(true);
        }
        let connector = tokio_native_tls::TlsConnector::from(tls_builder.build()?);

        match timeout(connect_timeout, connector.connect(&endpoint.host, tcp)).await {
            Err(_) => Err(Error::Timeout(connect_timeout)),
            Ok(stream) => Ok(Box::new(stream?)),
        }
    }
}
