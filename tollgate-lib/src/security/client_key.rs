use http::{HeaderName, Request};
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

/// Peer address of the connection a request arrived on.
///
/// Inserted into the request extensions by the server loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub SocketAddr);

/// Why a client key could not be derived from a request
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientKeyError {
    #[error("peer address missing from request")]
    MissingPeer,

    #[error("malformed client address in {header}: {value:?}")]
    Malformed { header: String, value: String },
}

/// Extract the rate-limiting client key (an IP address, port stripped) from a request.
///
/// When `header` is set and present on the request, its last comma-separated entry is
/// used and must be an IP address (optionally with a port). That is the hop appended by
/// the fronting proxy; entries to its left are client-supplied and never trusted.
/// Otherwise the peer address from [`ClientAddr`] is used.
pub fn extract_client_key<B>(
    req: &Request<B>,
    header: Option<&HeaderName>,
) -> Result<IpAddr, ClientKeyError> {
    if let Some(name) = header {
        if let Some(value) = req.headers().get(name) {
            let malformed = || ClientKeyError::Malformed {
                header: name.to_string(),
                value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
            };
            let raw = value.to_str().map_err(|_| malformed())?;
            let last = raw.rsplit(',').next().map(str::trim).unwrap_or_default();
            return parse_ip(last).ok_or_else(malformed);
        }
    }

    req.extensions()
        .get::<ClientAddr>()
        .map(|ClientAddr(peer)| peer.ip())
        .ok_or(ClientKeyError::MissingPeer)
}

fn parse_ip(value: &str) -> Option<IpAddr> {
    value
        .parse::<IpAddr>()
        .ok()
        .or_else(|| value.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}
