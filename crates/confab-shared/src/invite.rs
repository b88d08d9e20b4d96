//! Invite code generation.
//!
//! An invite code is an opaque base64url string derived from random bytes.
//! It is an attribute of a group chat, not an entity of its own; the group
//! coordinator checks freshly minted codes against the remote store and
//! re-rolls on the (theoretical) collision.

use rand::RngCore;

use crate::constants::INVITE_CODE_BYTES;

/// Mint a fresh opaque invite code.
pub fn generate_invite_code() -> String {
    let mut bytes = [0u8; INVITE_CODE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64_url_encode(&bytes)
}

/// Whether a string is shaped like a code we could have minted.
///
/// This is a cheap syntactic gate for lookups, not a validity check; only
/// the remote store knows whether a code currently maps to a chat.
pub fn is_well_formed_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= 2 * INVITE_CODE_BYTES
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.encode(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_well_formed() {
        for _ in 0..32 {
            let code = generate_invite_code();
            assert_eq!(code.len(), 12);
            assert!(is_well_formed_code(&code), "bad code: {code}");
        }
    }

    #[test]
    fn codes_are_distinct() {
        let a = generate_invite_code();
        let b = generate_invite_code();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_garbage() {
        assert!(!is_well_formed_code(""));
        assert!(!is_well_formed_code("with spaces"));
        assert!(!is_well_formed_code("way-too-long-to-be-one-of-ours"));
    }
}
