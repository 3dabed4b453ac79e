//! Gemini client used to fetch documents from their origin.

use std::time::Duration;

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use url::{Host, Url};

use super::{Fetch, FetchError, UpstreamResponse};
use crate::config::UpstreamConfig;
use crate::gemini::{ResponseHeader, DEFAULT_PORT, MAX_META_LEN};
use crate::net::{read_line, tls};

/// Longest header line: status, space, meta, CRLF.
const MAX_HEADER_LEN: usize = 2 + 1 + MAX_META_LEN + 2;

/// Fetches `gemini://` URLs over TLS.
#[derive(Clone)]
pub struct GeminiClient {
    connector: TlsConnector,
    connect_timeout: Duration,
    header_timeout: Duration,
}

impl GeminiClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, tls::TlsError> {
        Ok(Self {
            connector: tls::upstream_connector()?,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            header_timeout: Duration::from_secs(config.header_timeout_secs),
        })
    }
}

/// Host and port to dial for a `gemini://` URL.
fn origin(url: &Url) -> Result<(String, u16), FetchError> {
    if url.scheme() != "gemini" {
        return Err(FetchError::InvalidTarget(format!(
            "unsupported scheme {:?}",
            url.scheme()
        )));
    }
    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => return Err(FetchError::InvalidTarget("missing host".to_string())),
    };
    Ok((host, url.port().unwrap_or(DEFAULT_PORT)))
}

#[async_trait]
impl Fetch for GeminiClient {
    async fn fetch(&self, target: &str) -> Result<UpstreamResponse, FetchError> {
        let url = Url::parse(target).map_err(|e| FetchError::InvalidTarget(e.to_string()))?;
        let (host, port) = origin(&url)?;
        let addr = format!("{host}:{port}");

        let tcp = timeout(self.connect_timeout, TcpStream::connect((host.as_str(), port)))
            .await
            .map_err(|_| FetchError::Timeout("connect"))?
            .map_err(|source| FetchError::Connect {
                addr: addr.clone(),
                source,
            })?;

        let server_name = ServerName::try_from(host.clone())
            .map_err(|e| FetchError::InvalidTarget(e.to_string()))?;
        let tls = timeout(self.connect_timeout, self.connector.connect(server_name, tcp))
            .await
            .map_err(|_| FetchError::Timeout("tls handshake"))?
            .map_err(|source| FetchError::Tls {
                host: host.clone(),
                source,
            })?;

        let mut stream = BufReader::new(tls);
        stream
            .get_mut()
            .write_all(format!("{url}\r\n").as_bytes())
            .await?;
        stream.get_mut().flush().await?;

        let line = timeout(self.header_timeout, read_line(&mut stream, MAX_HEADER_LEN))
            .await
            .map_err(|_| FetchError::Timeout("response header"))??;
        let header = ResponseHeader::parse(&line)?;

        tracing::debug!(
            upstream = %addr,
            status = %header.status,
            meta = %header.meta,
            "Upstream header received"
        );

        Ok(UpstreamResponse::new(
            header.status,
            header.meta,
            Box::new(stream),
        ))
    }
}
