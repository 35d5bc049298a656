//! PKCE material for the authorization-code flow (RFC 7636, S256 method)
//!
//! The code verifier is 64 bytes of OS randomness, base64url-encoded. The
//! challenge is the base64url SHA-256 of the verifier's ASCII bytes, so the
//! secret itself is only revealed at the token-exchange step.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

/// URL-safe base64 without padding: no `=`, `+` becomes `-`, `/` becomes `_`.
pub fn base64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a fresh code verifier (86 chars once encoded, within the
/// RFC 7636 43..=128 bound).
pub fn generate_verifier() -> String {
    let mut buf = [0u8; 64];
    getrandom::getrandom(&mut buf).expect("OS CSPRNG failed");
    base64url(&buf)
}

/// S256 code challenge for a verifier. Deterministic: same verifier, same
/// challenge.
pub fn challenge(verifier: &str) -> String {
    base64url(Sha256::digest(verifier.as_bytes()).as_slice())
}

/// Random `state` parameter echoed back on the redirect (CSRF detection).
pub fn generate_state() -> String {
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).expect("OS CSPRNG failed");
    base64url(&buf)
}
