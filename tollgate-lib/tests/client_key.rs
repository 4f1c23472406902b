use std::net::{IpAddr, SocketAddr};

use http::header::HeaderName;
use http::Request;
use tollgate_lib::security::{extract_client_key, ClientAddr, ClientKeyError};

const FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

fn request(peer: Option<&str>, forwarded: Option<&str>) -> Request<()> {
    let mut builder = Request::builder().uri("/api/widgets/1");
    if let Some(value) = forwarded {
        builder = builder.header(FORWARDED_FOR, value);
    }
    let mut req = builder.body(()).expect("valid request");
    if let Some(peer) = peer {
        let addr: SocketAddr = peer.parse().expect("valid socket address");
        req.extensions_mut().insert(ClientAddr(addr));
    }
    req
}

fn ip(s: &str) -> IpAddr {
    s.parse().expect("valid ip")
}

#[test]
fn test_peer_address_without_port() {
    let req = request(Some("198.51.100.4:51234"), None);
    assert_eq!(extract_client_key(&req, None), Ok(ip("198.51.100.4")));
}

#[test]
fn test_ipv6_peer() {
    let req = request(Some("[2001:db8::1]:443"), None);
    assert_eq!(extract_client_key(&req, None), Ok(ip("2001:db8::1")));
}

#[test]
fn test_header_ignored_unless_configured() {
    let req = request(Some("10.0.0.1:1000"), Some("203.0.113.9"));
    assert_eq!(extract_client_key(&req, None), Ok(ip("10.0.0.1")));
}

#[test]
fn test_configured_header_keys_on_proxy_appended_entry() {
    let req = request(Some("10.0.0.1:1000"), Some("10.9.0.1, 198.51.100.7"));
    assert_eq!(extract_client_key(&req, Some(&FORWARDED_FOR)), Ok(ip("198.51.100.7")));
}

#[test]
fn test_configured_header_single_entry() {
    let req = request(Some("10.0.0.1:1000"), Some("203.0.113.9"));
    assert_eq!(extract_client_key(&req, Some(&FORWARDED_FOR)), Ok(ip("203.0.113.9")));
}

#[test]
fn test_malformed_last_entry_is_an_error() {
    let req = request(Some("10.0.0.1:1000"), Some("203.0.113.9, garbage"));
    assert!(extract_client_key(&req, Some(&FORWARDED_FOR)).is_err());
}

#[test]
fn test_configured_header_with_port() {
    let req = request(Some("10.0.0.1:1000"), Some("203.0.113.9:8443"));
    assert_eq!(extract_client_key(&req, Some(&FORWARDED_FOR)), Ok(ip("203.0.113.9")));
}

#[test]
fn test_configured_header_absent_falls_back_to_peer() {
    let req = request(Some("10.0.0.1:1000"), None);
    assert_eq!(extract_client_key(&req, Some(&FORWARDED_FOR)), Ok(ip("10.0.0.1")));
}

#[test]
fn test_malformed_header_is_an_error() {
    let req = request(Some("10.0.0.1:1000"), Some("not-an-ip"));
    let err = extract_client_key(&req, Some(&FORWARDED_FOR)).unwrap_err();
    assert!(matches!(err, ClientKeyError::Malformed { ref value, .. } if value == "not-an-ip"));
}

#[test]
fn test_missing_peer_is_an_error() {
    let req = request(None, None);
    assert_eq!(extract_client_key(&req, None), Err(ClientKeyError::MissingPeer));
}
