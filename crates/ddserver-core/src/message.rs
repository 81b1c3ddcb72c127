//! Message values and the wire codec
//!
//! Two wire formats exist:
//!
//! ```text
//! Raw:     [ text ............................ ]          <= 1015 bytes
//! Tagged:  [ tag: u64 LE ][ text ............. ]          <= 8 + 1015 bytes
//! ```
//!
//! The low bits of the tag pick the log category the receiver routes the
//! text to. No other framing exists; one datagram is one message.

use crate::constants::{MAX_MSG_SIZE, MAX_TAG_SIZE};
use crate::kprint::LogCategory;

/// Longest text carried by one message (one byte kept for the terminator)
pub const MAX_TEXT_LEN: usize = MAX_MSG_SIZE - 1;

/// Typed scalar carried by a message
#[derive(Debug, Clone, PartialEq)]
pub enum MsgValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Str(String),
}

impl MsgValue {
    /// Text form sent on the wire
    pub fn to_text(&self) -> String {
        match self {
            MsgValue::Bool(b) => b.to_string(),
            MsgValue::Int(i) => i.to_string(),
            MsgValue::Float(f) => f.to_string(),
            MsgValue::Str(s) => s.clone(),
        }
    }
}

impl From<&str> for MsgValue {
    fn from(s: &str) -> Self {
        MsgValue::Str(s.to_string())
    }
}

impl From<String> for MsgValue {
    fn from(s: String) -> Self {
        MsgValue::Str(s)
    }
}

impl From<bool> for MsgValue {
    fn from(b: bool) -> Self {
        MsgValue::Bool(b)
    }
}

impl From<i32> for MsgValue {
    fn from(i: i32) -> Self {
        MsgValue::Int(i)
    }
}

impl From<f32> for MsgValue {
    fn from(f: f32) -> Self {
        MsgValue::Float(f)
    }
}

/// Message category carried in the tag prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MsgTag {
    #[default]
    Untagged,
    Status,
    Error,
    Warning,
}

impl MsgTag {
    pub const STATUS_BIT: u64 = 1 << 0;
    pub const ERROR_BIT: u64 = 1 << 1;
    pub const WARNING_BIT: u64 = 1 << 2;
    const CATEGORY_MASK: u64 = Self::STATUS_BIT | Self::ERROR_BIT | Self::WARNING_BIT;

    pub fn bits(self) -> u64 {
        match self {
            MsgTag::Untagged => 0,
            MsgTag::Status => Self::STATUS_BIT,
            MsgTag::Error => Self::ERROR_BIT,
            MsgTag::Warning => Self::WARNING_BIT,
        }
    }

    /// Error wins over warning wins over status; unknown bits are ignored
    pub fn from_bits(bits: u64) -> Self {
        let bits = bits & Self::CATEGORY_MASK;
        if bits & Self::ERROR_BIT != 0 {
            MsgTag::Error
        } else if bits & Self::WARNING_BIT != 0 {
            MsgTag::Warning
        } else if bits & Self::STATUS_BIT != 0 {
            MsgTag::Status
        } else {
            MsgTag::Untagged
        }
    }

    /// Log channel the receiver routes this message to
    pub fn category(self) -> LogCategory {
        match self {
            MsgTag::Untagged => LogCategory::Plain,
            MsgTag::Status => LogCategory::Status,
            MsgTag::Error => LogCategory::Error,
            MsgTag::Warning => LogCategory::Warning,
        }
    }
}

/// Wire layout selected for an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    #[default]
    Raw,
    Tagged,
}

impl std::str::FromStr for WireFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "raw" => Ok(WireFormat::Raw),
            "tagged" => Ok(WireFormat::Tagged),
            _ => Err(()),
        }
    }
}

/// One outgoing message
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub tag: MsgTag,
    pub value: MsgValue,
}

impl Message {
    pub fn new(value: impl Into<MsgValue>) -> Self {
        Self {
            tag: MsgTag::Untagged,
            value: value.into(),
        }
    }

    pub fn tagged(tag: MsgTag, value: impl Into<MsgValue>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }

    /// Serialize into `out`, truncating the text to [`MAX_TEXT_LEN`]
    ///
    /// Returns the number of text bytes kept.
    pub fn encode_into(&self, format: WireFormat, out: &mut Vec<u8>) -> usize {
        out.clear();
        let text = self.value.to_text();
        let body = truncate_to_boundary(&text, MAX_TEXT_LEN);

        if format == WireFormat::Tagged {
            out.extend_from_slice(&self.tag.bits().to_le_bytes());
        }
        out.extend_from_slice(body.as_bytes());
        body.len()
    }

    pub fn encode(&self, format: WireFormat) -> Vec<u8> {
        let mut out = Vec::with_capacity(MAX_TAG_SIZE + MAX_MSG_SIZE);
        self.encode_into(format, &mut out);
        out
    }
}

/// A received payload split into category and text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub tag: MsgTag,
    pub text: String,
}

impl Decoded {
    pub fn category(&self) -> LogCategory {
        self.tag.category()
    }
}

/// Parse a received payload
///
/// Text stops at the first NUL, matching C-string senders. A tagged
/// payload shorter than the tag is treated as untagged text.
pub fn decode(payload: &[u8], format: WireFormat) -> Decoded {
    let (tag, body) = match format {
        WireFormat::Tagged if payload.len() >= MAX_TAG_SIZE => {
            let mut raw = [0u8; MAX_TAG_SIZE];
            raw.copy_from_slice(&payload[..MAX_TAG_SIZE]);
            (MsgTag::from_bits(u64::from_le_bytes(raw)), &payload[MAX_TAG_SIZE..])
        }
        _ => (MsgTag::Untagged, payload),
    };

    let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
    Decoded {
        tag,
        text: String::from_utf8_lossy(&body[..end]).into_owned(),
    }
}

fn truncate_to_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
