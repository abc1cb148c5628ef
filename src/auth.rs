//! Authentication primitives.
//!
//! Two layers: the connection-level challenge-response handshake against a
//! shared secret, and the password key-derivation used when a presence
//! request binds an account.

use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::{HANDSHAKE_TAG_LEN, NONCE_LEN, PASSWORD_SALT, PBKDF2_ROUNDS};
use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Derive the stored hash for a password.
///
/// PBKDF2-HMAC-SHA256 over the application-wide salt. Deterministic, so
/// verification is re-derivation plus comparison.
pub fn password_hash(password: &str) -> String {
    let mut out = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), PASSWORD_SALT, PBKDF2_ROUNDS, &mut out);
    hex::encode(out)
}

/// Check a submitted password against a stored hash.
pub fn verify_password(password: &str, stored: &str) -> bool {
    password_hash(password) == stored
}

/// Compute the proof expected for a challenge nonce under a shared secret.
pub fn challenge_proof(secret: &[u8], nonce: &[u8]) -> Result<[u8; HANDSHAKE_TAG_LEN]> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|_| Error::Protocol("invalid handshake key length".to_string()))?;
    mac.update(nonce);
    let digest = mac.finalize().into_bytes();
    let mut tag = [0u8; HANDSHAKE_TAG_LEN];
    tag.copy_from_slice(&digest);
    Ok(tag)
}

/// Verify a client's proof against the challenge, in constant time.
pub fn verify_proof(secret: &[u8], nonce: &[u8], proof: &[u8]) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(nonce);
    mac.verify_slice(proof).is_ok()
}

/// Server side of the transport handshake: send a fresh nonce, read the
/// client's proof, verify it. The connection must not be admitted on failure.
pub async fn server_handshake<S>(stream: &mut S, secret: &[u8]) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    stream.write_all(&nonce).await?;

    let mut proof = [0u8; HANDSHAKE_TAG_LEN];
    stream.read_exact(&mut proof).await?;

    if verify_proof(secret, &nonce, &proof) {
        Ok(())
    } else {
        Err(Error::HandshakeFailed)
    }
}

/// Client side of the transport handshake: read the nonce, answer with its
/// keyed hash.
pub async fn client_handshake<S>(stream: &mut S, secret: &[u8]) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut nonce = [0u8; NONCE_LEN];
    stream.read_exact(&mut nonce).await?;

    let proof = challenge_proof(secret, &nonce)?;
    stream.write_all(&proof).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_deterministic() {
        let a = password_hash("hunter2");
        let b = password_hash("hunter2");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_verify_password() {
        let stored = password_hash("hunter2");
        assert!(verify_password("hunter2", &stored));
        assert!(!verify_password("hunter3", &stored));
    }

    #[test]
    fn test_proof_matches_challenge() {
        let nonce = [7u8; NONCE_LEN];
        let proof = challenge_proof(b"our_secret_key", &nonce).unwrap();
        assert!(verify_proof(b"our_secret_key", &nonce, &proof));
        assert!(!verify_proof(b"other_key", &nonce, &proof));
        assert!(!verify_proof(b"our_secret_key", &[8u8; NONCE_LEN], &proof));
    }
}
