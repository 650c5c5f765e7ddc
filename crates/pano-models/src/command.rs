//! Control commands and their wire framing.
//!
//! Every message on the control channel is a 4-byte little-endian signed
//! length followed by that many payload bytes. Requests carry an ASCII
//! command name; replies carry text or an encoded image.
//!
//! # Usage
//!
//! ```
//! use pano_models::{decode_frame, encode_frame, Command};
//!
//! let wire = encode_frame(Command::StartTracking.as_str().as_bytes());
//! let (payload, consumed) = decode_frame(&wire).unwrap().unwrap();
//! assert_eq!(consumed, wire.len());
//! assert_eq!(Command::parse(&payload), Command::StartTracking);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Largest payload accepted by [`decode_frame`] (64 MiB).
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

const HEADER_LEN: usize = 4;

/// A control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Handshake; answered with the session output directory.
    Startup,
    /// Ends the session.
    Shutdown,
    /// Calibrate the viewport offset against the current marker position.
    MarkPrimaryRegion,
    StartTracking,
    FinishTracking,
    /// Build the replay; answered with the comma-joined labels seen.
    StartReplay,
    /// Next replay image, or an empty payload once drained.
    Receive,
    /// Liveness probe.
    Test,
    /// Zero-length request; the peer is going away.
    Disconnect,
    /// Anything that does not decode to a known command. Never answered.
    Unknown,
}

impl Command {
    /// Decode a request payload. Never fails: undecodable input is `Unknown`.
    pub fn parse(payload: &[u8]) -> Command {
        if payload.is_empty() {
            return Command::Disconnect;
        }
        match std::str::from_utf8(payload) {
            Ok(text) => text.parse().unwrap_or(Command::Unknown),
            Err(_) => Command::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Startup => "STARTUP",
            Command::Shutdown => "SHUTDOWN",
            Command::MarkPrimaryRegion => "MARK_PRIMARY_REGION",
            Command::StartTracking => "START_TRACKING",
            Command::FinishTracking => "FINISH_TRACKING",
            Command::StartReplay => "START_REPLAY",
            Command::Receive => "RECEIVE",
            Command::Test => "TEST",
            Command::Disconnect => "",
            Command::Unknown => "UNKNOWN",
        }
    }

    /// Whether the session expects a reply to this command.
    pub fn expects_reply(&self) -> bool {
        !matches!(self, Command::Unknown | Command::Disconnect)
    }

    /// Whether handling this command ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Command::Shutdown | Command::Disconnect)
    }
}

impl std::str::FromStr for Command {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTUP" => Ok(Command::Startup),
            "SHUTDOWN" => Ok(Command::Shutdown),
            "MARK_PRIMARY_REGION" => Ok(Command::MarkPrimaryRegion),
            "START_TRACKING" => Ok(Command::StartTracking),
            "FINISH_TRACKING" => Ok(Command::FinishTracking),
            "START_REPLAY" => Ok(Command::StartReplay),
            "RECEIVE" => Ok(Command::Receive),
            "TEST" => Ok(Command::Test),
            "" => Ok(Command::Disconnect),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Framing errors. A truncated buffer is not an error; see [`decode_frame`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("negative frame length: {0}")]
    NegativeLength(i32),

    #[error("frame length {len} exceeds limit of {limit} bytes")]
    TooLarge { len: usize, limit: usize },
}

/// Prefix `payload` with its little-endian `i32` length.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&(payload.len() as i32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Decode one frame from the front of `buf`.
///
/// Returns `Ok(None)` while more bytes are needed, otherwise the payload and
/// the number of bytes consumed.
pub fn decode_frame(buf: &[u8]) -> Result<Option<(Vec<u8>, usize)>, FrameError> {
    let Some(header) = buf.get(..HEADER_LEN) else {
        return Ok(None);
    };
    let len = i32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if len < 0 {
        return Err(FrameError::NegativeLength(len));
    }
    let len = len as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge {
            len,
            limit: MAX_FRAME_LEN,
        });
    }
    let end = HEADER_LEN + len;
    match buf.get(HEADER_LEN..end) {
        Some(payload) => Ok(Some((payload.to_vec(), end))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_commands() {
        assert_eq!(Command::parse(b"STARTUP"), Command::Startup);
        assert_eq!(Command::parse(b"MARK_PRIMARY_REGION"), Command::MarkPrimaryRegion);
        assert_eq!(Command::parse(b"RECEIVE"), Command::Receive);
        assert_eq!(Command::parse(b"TEST"), Command::Test);
    }

    #[test]
    fn test_parse_malformed_is_unknown() {
        assert_eq!(Command::parse(b"start_tracking"), Command::Unknown);
        assert_eq!(Command::parse(&[0xff, 0xfe, 0x00]), Command::Unknown);
        assert!(!Command::Unknown.expects_reply());
    }

    #[test]
    fn test_empty_payload_disconnects() {
        let cmd = Command::parse(b"");
        assert_eq!(cmd, Command::Disconnect);
        assert!(cmd.is_terminal());
        assert!(!cmd.expects_reply());
    }

    #[test]
    fn test_frame_header_is_little_endian() {
        let wire = encode_frame(b"TEST");
        assert_eq!(&wire[..4], &[4, 0, 0, 0]);
        assert_eq!(&wire[4..], b"TEST");
    }

    #[test]
    fn test_decode_partial_and_back_to_back() {
        let mut wire = encode_frame(b"START_REPLAY");
        wire.extend(encode_frame(b""));

        assert_eq!(decode_frame(&wire[..3]).unwrap(), None);
        assert_eq!(decode_frame(&wire[..10]).unwrap(), None);

        let (first, used) = decode_frame(&wire).unwrap().unwrap();
        assert_eq!(first, b"START_REPLAY");
        let (second, used_second) = decode_frame(&wire[used..]).unwrap().unwrap();
        assert!(second.is_empty());
        assert_eq!(used + used_second, wire.len());
    }

    #[test]
    fn test_decode_rejects_bad_lengths() {
        let negative = (-1i32).to_le_bytes();
        assert_eq!(decode_frame(&negative), Err(FrameError::NegativeLength(-1)));

        let huge = ((MAX_FRAME_LEN + 1) as i32).to_le_bytes();
        assert!(matches!(decode_frame(&huge), Err(FrameError::TooLarge { .. })));
    }
}
