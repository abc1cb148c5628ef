//! Protocol constants and status codes.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Response status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum StatusCode {
    /// Group did not exist and was created by this join
    GroupCreated = 100,
    /// Presence confirmed, connection bound to the account
    Confirmed = 202,
    /// Login/password verification failed
    AuthFailed = 402,
}

impl TryFrom<u16> for StatusCode {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            100 => Ok(StatusCode::GroupCreated),
            202 => Ok(StatusCode::Confirmed),
            402 => Ok(StatusCode::AuthFailed),
            _ => Err(Error::InvalidStatusCode(value)),
        }
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> Self {
        code as u16
    }
}

/// Leading character that marks a `to` name as a group.
pub const GROUP_MARKER: char = '#';

/// Upper bound on a frame body; a longer length prefix is a protocol error.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Size of the handshake challenge nonce.
pub const NONCE_LEN: usize = 32;

/// Size of the HMAC-SHA256 handshake proof.
pub const HANDSHAKE_TAG_LEN: usize = 32;

/// PBKDF2 iteration count for password hashing.
pub const PBKDF2_ROUNDS: u32 = 100_000;

/// Application-wide password salt.
pub const PASSWORD_SALT: &[u8] = b"saltsaltsaltsalt";

/// Default server port.
pub const DEFAULT_PORT: u16 = 7777;

/// Default bind address (all interfaces).
pub const DEFAULT_ADDRESS: &str = "0.0.0.0";
