//! Protocol version management.

/// Current protocol version, sent with every request.
pub const PROTOCOL_VERSION: u16 = 1;

/// Oldest request version a server should still answer.
pub const MIN_PROTOCOL_VERSION: u16 = 1;

pub fn is_compatible(peer_version: u16) -> bool {
    (MIN_PROTOCOL_VERSION..=PROTOCOL_VERSION).contains(&peer_version)
}
