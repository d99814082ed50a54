//! CoAP message codec (RFC 7252)
//!
//! # Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |Ver| T |  TKL  |      Code     |          Message ID           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   Token (if any, TKL bytes) ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   Options (if any) ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |1 1 1 1 1 1 1 1|    Payload (if any) ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Options are delta-encoded by number, with 13/14 nibbles announcing one
//! or two extension bytes.

use std::fmt;

// ============================================================================
// Constants
// ============================================================================

/// Protocol version carried in every header
pub const VERSION: u8 = 1;

/// Fixed header length
pub const HEADER_LEN: usize = 4;

/// Longest token allowed by the protocol
pub const MAX_TOKEN_LEN: usize = 8;

/// Separates options from the payload
const PAYLOAD_MARKER: u8 = 0xFF;

/// Path segment that precedes the resource ID: `/channels/{id}/messages`
const CHANNELS_SEGMENT: &str = "channels";

// Option numbers
pub const URI_HOST: u16 = 3;
pub const OBSERVE: u16 = 6;
pub const LOCATION_PATH: u16 = 8;
pub const URI_PATH: u16 = 11;
pub const CONTENT_FORMAT: u16 = 12;
pub const MAX_AGE: u16 = 14;
pub const URI_QUERY: u16 = 15;

// ============================================================================
// Message Type
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Confirmable = 0,
    NonConfirmable = 1,
    Acknowledgement = 2,
    Reset = 3,
}

impl MessageType {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => MessageType::Confirmable,
            1 => MessageType::NonConfirmable,
            2 => MessageType::Acknowledgement,
            _ => MessageType::Reset,
        }
    }
}

// ============================================================================
// Code
// ============================================================================

/// Method or response code, `class << 5 | detail`
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code(pub u8);

impl Code {
    pub const EMPTY: Code = Code(0x00);

    // Methods
    pub const GET: Code = Code(0x01);
    pub const POST: Code = Code(0x02);
    pub const PUT: Code = Code(0x03);
    pub const DELETE: Code = Code(0x04);

    // 2.xx
    pub const CREATED: Code = Code(0x41);
    pub const DELETED: Code = Code(0x42);
    pub const VALID: Code = Code(0x43);
    pub const CHANGED: Code = Code(0x44);
    pub const CONTENT: Code = Code(0x45);

    // 4.xx
    pub const BAD_REQUEST: Code = Code(0x80);
    pub const UNAUTHORIZED: Code = Code(0x81);
    pub const BAD_OPTION: Code = Code(0x82);
    pub const FORBIDDEN: Code = Code(0x83);
    pub const NOT_FOUND: Code = Code(0x84);
    pub const METHOD_NOT_ALLOWED: Code = Code(0x85);

    // 5.xx
    pub const INTERNAL_SERVER_ERROR: Code = Code(0xA0);
    pub const SERVICE_UNAVAILABLE: Code = Code(0xA3);

    pub fn class(self) -> u8 {
        self.0 >> 5
    }

    pub fn detail(self) -> u8 {
        self.0 & 0x1F
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Code({})", self)
    }
}

// ============================================================================
// Option Values
// ============================================================================

/// Decoded option value, typed by the option number's format
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Str(String),
    Uint(u32),
    Opaque(Vec<u8>),
}

enum Format {
    Str,
    Uint,
    Opaque,
}

fn format_of(number: u16) -> Format {
    match number {
        URI_HOST | LOCATION_PATH | URI_PATH | URI_QUERY => Format::Str,
        OBSERVE | CONTENT_FORMAT | MAX_AGE => Format::Uint,
        _ => Format::Opaque,
    }
}

impl OptionValue {
    fn decode(number: u16, raw: &[u8]) -> Result<Self, ParseError> {
        match format_of(number) {
            // Non-UTF-8 string options are kept as raw bytes
            Format::Str => Ok(match std::str::from_utf8(raw) {
                Ok(s) => OptionValue::Str(s.to_string()),
                Err(_) => OptionValue::Opaque(raw.to_vec()),
            }),
            Format::Uint => {
                if raw.len() > 4 {
                    return Err(ParseError::InvalidOption(number));
                }
                Ok(OptionValue::Uint(
                    raw.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)),
                ))
            }
            Format::Opaque => Ok(OptionValue::Opaque(raw.to_vec())),
        }
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            OptionValue::Str(s) => s.as_bytes().to_vec(),
            OptionValue::Uint(v) => {
                let bytes = v.to_be_bytes();
                let skip = bytes.iter().take_while(|b| **b == 0).count();
                bytes[skip..].to_vec()
            }
            OptionValue::Opaque(raw) => raw.clone(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u32> {
        match self {
            OptionValue::Uint(v) => Some(*v),
            _ => None,
        }
    }
}

// ============================================================================
// Message
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub msg_type: MessageType,
    pub code: Code,
    pub message_id: u16,
    pub token: Vec<u8>,
    /// (number, value) pairs in wire order
    pub options: Vec<(u16, OptionValue)>,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(msg_type: MessageType, code: Code, message_id: u16) -> Self {
        Message {
            msg_type,
            code,
            message_id,
            token: Vec::new(),
            options: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Start a response that echoes this message's ID and token
    pub fn response(&self, msg_type: MessageType, code: Code) -> Self {
        Message {
            token: self.token.clone(),
            ..Message::new(msg_type, code, self.message_id)
        }
    }

    /// First value of an option
    pub fn option(&self, number: u16) -> Option<&OptionValue> {
        self.options
            .iter()
            .find(|(n, _)| *n == number)
            .map(|(_, v)| v)
    }

    pub fn add_option(&mut self, number: u16, value: OptionValue) {
        self.options.push((number, value));
    }

    /// Uri-Path segments in order
    pub fn path(&self) -> Vec<&str> {
        self.options
            .iter()
            .filter(|(n, _)| *n == URI_PATH)
            .filter_map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn observe(&self) -> Option<u32> {
        self.option(OBSERVE).and_then(OptionValue::as_uint)
    }

    /// Resource addressed by `/channels/{id}/...`
    pub fn resource_id(&self) -> Option<&str> {
        self.path()
            .windows(2)
            .find(|w| w[0] == CHANNELS_SEGMENT)
            .map(|w| w[1])
    }

    /// Parse a datagram
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < HEADER_LEN {
            return Err(ParseError::ShortHeader);
        }

        let version = data[0] >> 6;
        if version != VERSION {
            return Err(ParseError::BadVersion(version));
        }

        let msg_type = MessageType::from_bits(data[0] >> 4);
        let tkl = data[0] & 0x0F;
        if tkl as usize > MAX_TOKEN_LEN {
            return Err(ParseError::BadTokenLength(tkl));
        }
        let code = Code(data[1]);
        let message_id = u16::from_be_bytes([data[2], data[3]]);

        let mut pos = HEADER_LEN;
        let token = data
            .get(pos..pos + tkl as usize)
            .ok_or(ParseError::Truncated)?
            .to_vec();
        pos += tkl as usize;

        let mut options = Vec::new();
        let mut payload = Vec::new();
        let mut number: u16 = 0;

        while pos < data.len() {
            let byte = data[pos];
            pos += 1;

            if byte == PAYLOAD_MARKER {
                if pos == data.len() {
                    return Err(ParseError::EmptyPayload);
                }
                payload = data[pos..].to_vec();
                break;
            }

            let delta = read_extended(byte >> 4, data, &mut pos)?;
            let length = read_extended(byte & 0x0F, data, &mut pos)? as usize;
            number = number
                .checked_add(delta)
                .ok_or(ParseError::OptionOverflow)?;

            let raw = data
                .get(pos..pos + length)
                .ok_or(ParseError::Truncated)?;
            pos += length;

            options.push((number, OptionValue::decode(number, raw)?));
        }

        Ok(Message {
            msg_type,
            code,
            message_id,
            token,
            options,
            payload,
        })
    }

    /// Encode for transmission. Options are written in ascending number
    /// order; tokens longer than the protocol allows are cut.
    pub fn encode(&self) -> Vec<u8> {
        let tkl = self.token.len().min(MAX_TOKEN_LEN);
        let mut buf = Vec::with_capacity(HEADER_LEN + tkl + self.payload.len() + 32);

        buf.push((VERSION << 6) | ((self.msg_type as u8) << 4) | tkl as u8);
        buf.push(self.code.0);
        buf.extend_from_slice(&self.message_id.to_be_bytes());
        buf.extend_from_slice(&self.token[..tkl]);

        let mut sorted: Vec<&(u16, OptionValue)> = self.options.iter().collect();
        sorted.sort_by_key(|(n, _)| *n);

        let mut prev = 0u16;
        for (number, value) in sorted {
            let raw = value.encode();
            let (delta_nibble, delta_ext) = extended(*number - prev);
            let (len_nibble, len_ext) = extended(raw.len() as u16);

            buf.push((delta_nibble << 4) | len_nibble);
            buf.extend_from_slice(&delta_ext);
            buf.extend_from_slice(&len_ext);
            buf.extend_from_slice(&raw);
            prev = *number;
        }

        if !self.payload.is_empty() {
            buf.push(PAYLOAD_MARKER);
            buf.extend_from_slice(&self.payload);
        }

        buf
    }
}

fn read_extended(nibble: u8, data: &[u8], pos: &mut usize) -> Result<u16, ParseError> {
    match nibble {
        0..=12 => Ok(u16::from(nibble)),
        13 => {
            let b = *data.get(*pos).ok_or(ParseError::Truncated)?;
            *pos += 1;
            Ok(u16::from(b) + 13)
        }
        14 => {
            let bytes = data.get(*pos..*pos + 2).ok_or(ParseError::Truncated)?;
            *pos += 2;
            u16::from_be_bytes([bytes[0], bytes[1]])
                .checked_add(269)
                .ok_or(ParseError::OptionOverflow)
        }
        _ => Err(ParseError::ReservedNibble),
    }
}

fn extended(value: u16) -> (u8, Vec<u8>) {
    match value {
        0..=12 => (value as u8, Vec::new()),
        13..=268 => (13, vec![(value - 13) as u8]),
        _ => (14, (value - 269).to_be_bytes().to_vec()),
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Reasons a datagram is not a valid CoAP message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    ShortHeader,
    BadVersion(u8),
    BadTokenLength(u8),
    Truncated,
    ReservedNibble,
    OptionOverflow,
    InvalidOption(u16),
    EmptyPayload,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::ShortHeader => write!(f, "datagram shorter than header"),
            ParseError::BadVersion(v) => write!(f, "unsupported version {}", v),
            ParseError::BadTokenLength(n) => write!(f, "token length {} exceeds 8", n),
            ParseError::Truncated => write!(f, "message truncated"),
            ParseError::ReservedNibble => write!(f, "reserved option nibble"),
            ParseError::OptionOverflow => write!(f, "option number overflow"),
            ParseError::InvalidOption(n) => write!(f, "invalid value for option {}", n),
            ParseError::EmptyPayload => write!(f, "payload marker without payload"),
        }
    }
}

impl std::error::Error for ParseError {}
