use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use http::request::Parts;
use shot_coord::ClientIdentity;

/// The peer address of a request that did not arrive through an axum listener
/// with connect info, e.g. one forwarded by a proxy layer or built in a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddr(pub String);

/// Resolves the client identity of a request, caching it in the extensions so
/// stacked limiters resolve it only once.
///
/// Forwarded-for headers are not trusted; a request with no known peer is
/// counted as `unknown`.
pub fn client_identity(parts: &mut Parts) -> ClientIdentity {
    if let Some(identity) = parts.extensions.get::<ClientIdentity>() {
        return identity.clone();
    }
    let identity = if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>()
    {
        ClientIdentity::from_socket_addr(*addr)
    } else if let Some(PeerAddr(peer)) = parts.extensions.get::<PeerAddr>() {
        ClientIdentity::from_peer(peer)
    } else {
        ClientIdentity::from_peer("unknown")
    };
    parts.extensions.insert(identity.clone());
    identity
}

/// Reads a single cookie from the `Cookie` headers.
pub(crate) fn cookie<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(http::header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
}
