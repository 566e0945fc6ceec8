//! The amp message envelope.
//!
//! A frame is one line of compact JSON header, a `\n` separator, then the raw
//! body bytes. The header never contains a raw newline because JSON string
//! escapes cover it, so the first `\n` always ends the header.
//!
//! Frames of at least [`COMPRESSION_THRESHOLD`] bytes may be sent deflated
//! when the connection supports it; see [`Msg::encode_compressed`].

use std::collections::BTreeMap;
use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use serde::{Deserialize, Serialize};

use crate::errors::EnvelopeError;

/// Frames shorter than this are always sent uncompressed.
pub const COMPRESSION_THRESHOLD: usize = 512;

const SEPARATOR: u8 = b'\n';

/// Kind of an amp message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgType {
    /// Data pushed by the broker to subscribers.
    Publish,
    /// Client request routed to the requester.
    Request,
    /// Reply to a request.
    Response,
    /// Client liveness probe.
    Ping,
    /// Reply to a ping.
    Pong,
    /// Client subscription list for the broker.
    Subscribe,
    /// Server heartbeat sent on an idle connection.
    Alive,
}

impl MsgType {
    /// Whether this kind carries application data.
    pub fn is_data(self) -> bool {
        matches!(self, Self::Publish | Self::Response)
    }
}

/// One protocol message: header fields plus an opaque body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Msg {
    /// Message kind.
    #[serde(rename = "t")]
    pub msg_type: MsgType,
    /// Client-chosen id echoed back in pongs and responses.
    #[serde(rename = "i", default, skip_serializing_if = "is_default")]
    pub correlation_id: u64,
    /// Topic or method the message addresses.
    #[serde(rename = "u", default, skip_serializing_if = "String::is_empty")]
    pub uri: String,
    /// Routing hint for responses.
    #[serde(rename = "r", default, skip_serializing_if = "String::is_empty")]
    pub reply_to: String,
    /// Sequence number of a published message within its topic.
    #[serde(rename = "s", default, skip_serializing_if = "is_default")]
    pub ts: i64,
    /// Topic to last-seen sequence map carried by subscribe messages.
    #[serde(rename = "b", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subscriptions: BTreeMap<String, i64>,
    /// Raw body following the header line.
    #[serde(skip)]
    pub body: Bytes,
}

fn is_default<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}

impl Msg {
    /// Empty message of the given kind.
    pub fn new(msg_type: MsgType) -> Self {
        Self {
            msg_type,
            correlation_id: 0,
            uri: String::new(),
            reply_to: String::new(),
            ts: 0,
            subscriptions: BTreeMap::new(),
            body: Bytes::new(),
        }
    }

    /// Client ping with a correlation id.
    pub fn ping(correlation_id: u64) -> Self {
        Self {
            correlation_id,
            ..Self::new(MsgType::Ping)
        }
    }

    /// Pong answering `ping`.
    pub fn pong_of(ping: &Self) -> Self {
        Self {
            correlation_id: ping.correlation_id,
            ..Self::new(MsgType::Pong)
        }
    }

    /// Server heartbeat.
    pub fn alive() -> Self {
        Self::new(MsgType::Alive)
    }

    /// Request addressed to `uri`.
    pub fn request(correlation_id: u64, uri: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            correlation_id,
            uri: uri.into(),
            body: body.into(),
            ..Self::new(MsgType::Request)
        }
    }

    /// Response to `request`, carrying its correlation id and uri.
    pub fn response_to(request: &Self, body: impl Into<Bytes>) -> Self {
        Self {
            correlation_id: request.correlation_id,
            uri: request.uri.clone(),
            reply_to: request.reply_to.clone(),
            body: body.into(),
            ..Self::new(MsgType::Response)
        }
    }

    /// Subscribe message listing topics and last-seen sequence numbers.
    pub fn subscribe(subscriptions: BTreeMap<String, i64>) -> Self {
        Self {
            subscriptions,
            ..Self::new(MsgType::Subscribe)
        }
    }

    /// Published data on `uri`.
    pub fn publish(uri: impl Into<String>, ts: i64, body: impl Into<Bytes>) -> Self {
        Self {
            uri: uri.into(),
            ts,
            body: body.into(),
            ..Self::new(MsgType::Publish)
        }
    }

    /// Serialize to a plain frame.
    pub fn encode(&self) -> Bytes {
        let header = serde_json::to_vec(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to serialize message header");
            Vec::new()
        });
        let mut frame = BytesMut::with_capacity(header.len() + 1 + self.body.len());
        frame.put_slice(&header);
        frame.put_u8(SEPARATOR);
        frame.put_slice(&self.body);
        frame.freeze()
    }

    /// Serialize, deflating the frame when that pays off.
    ///
    /// Returns the payload and whether it is compressed.
    pub fn encode_compressed(&self) -> (Bytes, bool) {
        let plain = self.encode();
        if plain.len() < COMPRESSION_THRESHOLD {
            return (plain, false);
        }
        match deflate(&plain) {
            Ok(deflated) if deflated.len() < plain.len() => (Bytes::from(deflated), true),
            _ => (plain, false),
        }
    }

    /// Parse a plain frame.
    pub fn decode(frame: &[u8]) -> Result<Self, EnvelopeError> {
        if frame.is_empty() {
            return Err(EnvelopeError::Empty);
        }
        let (header, body) = match frame.iter().position(|b| *b == SEPARATOR) {
            Some(at) => (&frame[..at], &frame[at + 1..]),
            None => (frame, &[][..]),
        };
        let mut msg: Self = serde_json::from_slice(header)?;
        msg.body = Bytes::copy_from_slice(body);
        Ok(msg)
    }

    /// Parse a frame produced by [`Msg::encode_compressed`] with the flag set.
    pub fn decode_compressed(frame: &[u8]) -> Result<Self, EnvelopeError> {
        let mut plain = Vec::with_capacity(frame.len() * 4);
        let _ = DeflateDecoder::new(frame).read_to_end(&mut plain)?;
        Self::decode(&plain)
    }
}

fn deflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), Compression::fast());
    encoder.write_all(data)?;
    encoder.finish()
}
