//! HTTP `CONNECT` tunnelling for SSH connections behind a corporate proxy.
//!
//! The tunnel is a plain TCP stream to the proxy on which a single
//! `CONNECT host:port` request has been answered with a 2xx status. The
//! response is read one byte at a time so that nothing past the blank line
//! (the SSH server banner) is swallowed.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;
use url::Url;

/// Largest proxy response header we are willing to buffer.
const MAX_RESPONSE_HEADER: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProxyEndpoint {
    pub host: String,
    pub port: u16,
    /// Pre-encoded `Proxy-Authorization` credentials, if the URL had userinfo.
    pub basic_auth: Option<String>,
}

pub(crate) fn parse_proxy_url(raw: &str) -> Result<ProxyEndpoint, String> {
    let url = Url::parse(raw).map_err(|e| format!("Invalid proxy URL {}: {}", raw, e))?;

    if url.scheme() != "http" {
        return Err(format!(
            "Unsupported proxy scheme '{}': only http:// proxies can tunnel SSH",
            url.scheme()
        ));
    }

    let host = url
        .host_str()
        .ok_or_else(|| format!("Proxy URL {} has no host", raw))?
        .to_string();
    let port = url.port_or_known_default().unwrap_or(80);

    let basic_auth = if url.username().is_empty() {
        None
    } else {
        let credentials = format!("{}:{}", url.username(), url.password().unwrap_or(""));
        Some(STANDARD.encode(credentials))
    };

    Ok(ProxyEndpoint {
        host,
        port,
        basic_auth,
    })
}

pub(crate) fn connect_request(host: &str, port: u16, basic_auth: Option<&str>) -> String {
    let mut request = format!("CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n");
    if let Some(auth) = basic_auth {
        request.push_str(&format!("Proxy-Authorization: Basic {auth}\r\n"));
    }
    request.push_str("\r\n");
    request
}

/// Parse the status code out of `HTTP/1.1 200 Connection established`.
fn parse_status(status_line: &str) -> Result<u16, String> {
    let mut parts = status_line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => code
            .parse::<u16>()
            .map_err(|_| format!("Malformed proxy status line: {}", status_line)),
        _ => Err(format!("Malformed proxy status line: {}", status_line)),
    }
}

async fn read_response_header(stream: &mut TcpStream) -> Result<String, String> {
    let mut header = Vec::with_capacity(256);
    let mut byte = [0u8; 1];

    while !header.ends_with(b"\r\n\r\n") {
        if header.len() >= MAX_RESPONSE_HEADER {
            return Err("Proxy response header too large".to_string());
        }
        let n = stream
            .read(&mut byte)
            .await
            .map_err(|e| format!("Failed to read proxy response: {}", e))?;
        if n == 0 {
            return Err("Proxy closed the connection during CONNECT".to_string());
        }
        header.push(byte[0]);
    }

    Ok(String::from_utf8_lossy(&header).into_owned())
}

/// Open a TCP tunnel to `host:port` through the proxy at `proxy_url`.
pub(crate) async fn open_tunnel(proxy_url: &str, host: &str, port: u16) -> Result<TcpStream, String> {
    let proxy = parse_proxy_url(proxy_url)?;

    let mut stream = TcpStream::connect((proxy.host.as_str(), proxy.port))
        .await
        .map_err(|e| {
            format!(
                "Failed to connect to proxy {}:{}: {}",
                proxy.host, proxy.port, e
            )
        })?;

    let request = connect_request(host, port, proxy.basic_auth.as_deref());
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| format!("Failed to send CONNECT to proxy: {}", e))?;

    let header = read_response_header(&mut stream).await?;
    let status_line = header.lines().next().unwrap_or_default();
    let status = parse_status(status_line)?;

    if !(200..300).contains(&status) {
        return Err(format!("proxy returned {}", status_line.trim_start_matches(|c: char| c != ' ').trim()));
    }

    debug!("Proxy tunnel to {}:{} established via {}:{}", host, port, proxy.host, proxy.port);
    Ok(stream)
}
