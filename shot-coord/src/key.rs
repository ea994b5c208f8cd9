use std::fmt;
use std::net::SocketAddr;

/// Key prefixes for primitives whose keys are derived per request.
///
/// Each primitive owns a distinct prefix so that the same discriminator (say a
/// client address) never maps two primitives onto one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    FixedWindow,
    SlidingWindow,
    Session,
}

impl Namespace {
    pub fn prefix(self) -> &'static str {
        match self {
            Namespace::FixedWindow => "rate_limit",
            Namespace::SlidingWindow => "sliding_rate",
            Namespace::Session => "session",
        }
    }
}

/// A key in the coordination store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoordinationKey(String);

impl CoordinationKey {
    /// Builds `<prefix>:<discriminator>`.
    ///
    /// The prefix never contains `:`, so the mapping is injective even when the
    /// discriminator does (IPv6 addresses, opaque tokens).
    pub fn scoped(namespace: Namespace, discriminator: &str) -> Self {
        Self(format!("{}:{}", namespace.prefix(), discriminator))
    }

    /// A key used verbatim, for fixed resources such as a lock or a queue.
    pub fn fixed(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CoordinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CoordinationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The per-client discriminator, derived from the transport peer address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Uses the host part of a `host:port` peer string.
    ///
    /// Falls back to the raw string when it cannot be split.
    pub fn from_peer(peer: &str) -> Self {
        match split_host(peer) {
            Some(host) => Self(host.to_string()),
            None => Self(peer.to_string()),
        }
    }

    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        Self(addr.ip().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn split_host(peer: &str) -> Option<&str> {
    let (host, port) = peer.rsplit_once(':')?;
    port.parse::<u16>().ok()?;
    match host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        Some(inner) => Some(inner),
        // An unbracketed host with a colon is a bare IPv6 address, not host:port
        None if host.contains([':', '[', ']']) => None,
        None => Some(host),
    }
}
