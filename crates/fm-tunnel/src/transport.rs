//! Transport dial to the SSH endpoint
//!
//! Either a direct TCP connect or a tunnel through an HTTP proxy using the
//! `CONNECT` method.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use fm_core::error::ConnectionError;
use fm_core::RemoteAddr;

/// Largest proxy response head we are willing to buffer
const MAX_PROXY_RESPONSE: usize = 8 * 1024;

/// Connect to `target`, through `proxy` when one is given.
pub async fn dial(target: &RemoteAddr, proxy: Option<&str>) -> Result<TcpStream, ConnectionError> {
    match proxy {
        Some(proxy) => dial_via_proxy(proxy, target).await,
        None => {
            tracing::debug!("Dialing {}", target);
            TcpStream::connect(target.to_string())
                .await
                .map_err(|e| ConnectionError::Transport {
                    target: target.to_string(),
                    message: e.to_string(),
                })
        }
    }
}

/// Open a TCP connection to `proxy` and ask it to `CONNECT` to `target`.
pub async fn dial_via_proxy(proxy: &str, target: &RemoteAddr) -> Result<TcpStream, ConnectionError> {
    tracing::debug!("Dialing {} via proxy {}", target, proxy);

    let proxy_err = |message: String| ConnectionError::Proxy {
        proxy: proxy.to_string(),
        message,
    };

    let mut stream = TcpStream::connect(proxy)
        .await
        .map_err(|e| proxy_err(format!("connect failed: {}", e)))?;

    let request = format!(
        "CONNECT {target} HTTP/1.1\r\nHost: {target}\r\nProxy-Connection: Keep-Alive\r\n\r\n",
        target = target
    );
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| proxy_err(format!("write failed: {}", e)))?;

    let head = read_response_head(&mut stream)
        .await
        .map_err(|e| proxy_err(e.to_string()))?;

    let status_line = head.lines().next().unwrap_or_default();
    match parse_status_code(status_line) {
        Some(code) if (200..300).contains(&code) => {
            tracing::debug!("Proxy {} tunnel established to {}", proxy, target);
            Ok(stream)
        }
        Some(_) => Err(proxy_err(format!("refused: {}", status_line.trim()))),
        None => Err(proxy_err(format!("malformed response: {}", status_line.trim()))),
    }
}

/// Read up to and including the blank line ending the response head.
///
/// Reads one byte at a time so nothing past the head is consumed; those
/// bytes already belong to the tunneled SSH stream.
async fn read_response_head(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_PROXY_RESPONSE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "response head too large",
            ));
        }
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "proxy closed the connection",
            ));
        }
        head.push(byte[0]);
    }

    Ok(String::from_utf8_lossy(&head).into_owned())
}

/// `HTTP/1.1 200 Connection established` → `200`
fn parse_status_code(line: &str) -> Option<u16> {
    let mut parts = line.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}
