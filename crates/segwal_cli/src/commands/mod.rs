//! CLI command implementations.

pub mod dump;
pub mod inspect;
pub mod verify;

/// Hex-encodes `bytes`.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
