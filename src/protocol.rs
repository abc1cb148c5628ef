//! Wire protocol for the chat relay.
//!
//! One frame per logical message: a u32 little-endian length prefix followed
//! by a JSON body. Requests are a tagged union keyed by the `action` field;
//! responses carry a numeric status, an alert payload and a timestamp.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::constants::{MAX_FRAME_BYTES, StatusCode};
use crate::{Error, Result};

/// Actions the codec recognizes; anything else is ignored, not an error.
const KNOWN_ACTIONS: [&str; 5] = ["presence", "get_contacts", "msg", "join", "quit"];

/// Account credentials carried by a `presence` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub account_name: String,
    #[serde(default)]
    pub password: String,
    /// Free-form presence text; persisted as the account's info when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    Presence {
        user: Credentials,
        time: f64,
    },
    GetContacts {
        user_login: String,
        time: f64,
    },
    Msg {
        from: String,
        to: String,
        message: String,
        time: f64,
    },
    Join {
        room: String,
        from: String,
        time: f64,
    },
    Quit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
    },
}

impl Request {
    /// Decode a frame body.
    ///
    /// A well-formed body whose `action` is unknown decodes to `None` so the
    /// connection stays up; malformed JSON (or a known action with broken
    /// fields) is an error fatal to the connection.
    pub fn decode(body: &[u8]) -> Result<Option<Request>> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        match value.get("action").and_then(|a| a.as_str()) {
            Some(action) if KNOWN_ACTIONS.contains(&action) => {
                Ok(Some(serde_json::from_value(value)?))
            }
            _ => Ok(None),
        }
    }

    /// Encode into a length-prefixed frame.
    pub fn encode(&self) -> Result<Bytes> {
        encode_frame(&serde_json::to_vec(self)?)
    }
}

/// Alert payload: human-readable text, or the login list for `get_contacts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Alert {
    Text(String),
    Contacts(Vec<String>),
}

/// A server response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub response: StatusCode,
    pub alert: Alert,
    pub time: f64,
}

impl Response {
    pub fn text(code: StatusCode, alert: impl Into<String>) -> Self {
        Response {
            response: code,
            alert: Alert::Text(alert.into()),
            time: unix_time(),
        }
    }

    pub fn contacts(logins: Vec<String>) -> Self {
        Response {
            response: StatusCode::Confirmed,
            alert: Alert::Contacts(logins),
            time: unix_time(),
        }
    }

    pub fn decode(body: &[u8]) -> Result<Response> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Encode into a length-prefixed frame.
    pub fn encode(&self) -> Result<Bytes> {
        encode_frame(&serde_json::to_vec(self)?)
    }
}

/// Wrap an encoded body in a length-prefixed frame.
pub fn encode_frame(body: &[u8]) -> Result<Bytes> {
    if body.len() > MAX_FRAME_BYTES {
        return Err(Error::FrameTooLarge {
            len: body.len(),
            max: MAX_FRAME_BYTES,
        });
    }
    let mut buf = BytesMut::with_capacity(4 + body.len());
    buf.put_u32_le(body.len() as u32);
    buf.put_slice(body);
    Ok(buf.freeze())
}

/// Try to extract one complete frame body from the read buffer.
///
/// Returns `Ok(None)` until a full frame has arrived; the prefix and body
/// are consumed together once it has.
pub fn extract_frame(buf: &mut BytesMut) -> Result<Option<Bytes>> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(Error::FrameTooLarge {
            len,
            max: MAX_FRAME_BYTES,
        });
    }
    if buf.len() < 4 + len {
        return Ok(None);
    }
    let mut frame = buf.split_to(4 + len);
    frame.advance(4);
    Ok(Some(frame.freeze()))
}

/// Current Unix time in seconds, as carried by the wire `time` fields.
pub fn unix_time() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_roundtrip() {
        let req = Request::Msg {
            from: "alice".to_string(),
            to: "bob".to_string(),
            message: "hi".to_string(),
            time: 1234.5,
        };
        let frame = req.encode().unwrap();
        let mut buf = BytesMut::from(&frame[..]);
        let body = extract_frame(&mut buf).unwrap().unwrap();
        assert_eq!(Request::decode(&body).unwrap(), Some(req));
    }

    #[test]
    fn test_unknown_action_ignored() {
        let body = br#"{"action": "probe", "time": 1.0}"#;
        assert_eq!(Request::decode(body).unwrap(), None);
    }

    #[test]
    fn test_missing_action_ignored() {
        let body = br#"{"response": 202, "alert": "ok"}"#;
        assert_eq!(Request::decode(body).unwrap(), None);
    }

    #[test]
    fn test_malformed_body_is_fatal() {
        assert!(Request::decode(b"not json").is_err());
    }

    #[test]
    fn test_partial_frame() {
        let req = Request::Quit {
            from: None,
            to: None,
        };
        let frame = req.encode().unwrap();
        let mut buf = BytesMut::from(&frame[..frame.len() - 1]);
        assert!(extract_frame(&mut buf).unwrap().is_none());

        buf.put_slice(&frame[frame.len() - 1..]);
        let body = extract_frame(&mut buf).unwrap().unwrap();
        assert_eq!(Request::decode(&body).unwrap(), Some(req));
    }

    #[test]
    fn test_oversize_frame_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32_le((MAX_FRAME_BYTES + 1) as u32);
        assert!(extract_frame(&mut buf).is_err());
    }
}
