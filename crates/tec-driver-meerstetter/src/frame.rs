//! MeCom request/response framing.
//!
//! Request layout (no separators):
//!
//! ```text
//! # AA SSSS OP [PPPP II] [VVVVVVVV] CCCC
//! ```
//!
//! `AA` address, `SSSS` sequence, `OP` operation token, `PPPP II`
//! parameter id and instance, `VVVVVVVV` value, `CCCC` CRC-16/XMODEM over
//! everything before it. Responses start with `!`, echo address and
//! sequence in the same 7-character header, then carry a payload and the
//! checksum. A device fault is reported as `+` followed by a two-digit code.

use crate::checksum::{checksum, checksum_hex, parse_checksum, CHECKSUM_WIDTH};
use crate::codec::{
    encode_address, encode_instance, encode_param_id, is_upper_hex, Value, ValueKind,
};
use tec_core::error::{TecError, TecResult};

/// First character of every request.
pub const REQUEST_PREAMBLE: u8 = b'#';

/// First character of every response.
pub const RESPONSE_PREAMBLE: u8 = b'!';

/// Marks a device error frame.
pub const ERROR_MARKER: u8 = b'+';

/// Preamble + address + sequence echo.
pub const HEADER_WIDTH: usize = 7;

/// Shortest well-formed response: header and checksum, empty payload.
pub const MIN_RESPONSE_LEN: usize = HEADER_WIDTH + CHECKSUM_WIDTH;

// =============================================================================
// Requests
// =============================================================================

/// One logical request, before framing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// `?VR`: read a parameter value
    Read {
        /// Parameter id
        id: u16,
        /// Channel
        instance: u8,
    },
    /// `VS`: set a parameter value
    Write {
        /// Parameter id
        id: u16,
        /// Channel
        instance: u8,
        /// Value to store
        value: Value,
    },
    /// `?IF`: query the identity string
    Identify,
    /// `ES`: emergency stop, all outputs off
    Stop,
    /// `RS`: reset the controller
    Reset,
}

impl Command {
    /// Operation token as sent on the wire
    pub fn token(&self) -> &'static str {
        match self {
            Self::Read { .. } => "?VR",
            Self::Write { .. } => "VS",
            Self::Identify => "?IF",
            Self::Stop => "ES",
            Self::Reset => "RS",
        }
    }

    /// Whether the device answers with a payload (as opposed to a bare ACK)
    pub fn expects_payload(&self) -> bool {
        matches!(self, Self::Read { .. } | Self::Identify)
    }
}

/// A framed request ready to be written to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    text: String,
    checksum: u16,
}

impl RequestFrame {
    /// Wire text without the line terminator
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Wire bytes without the line terminator
    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    /// Checksum carried in the last four characters
    pub fn checksum(&self) -> u16 {
        self.checksum
    }
}

impl std::fmt::Display for RequestFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Assemble a request and append its checksum.
pub fn build_request(address: u8, sequence: u16, command: &Command) -> RequestFrame {
    let mut text = String::with_capacity(32);
    text.push(REQUEST_PREAMBLE as char);
    text.push_str(&encode_address(address));
    text.push_str(&encode_param_id(sequence));
    text.push_str(command.token());

    match command {
        Command::Read { id, instance } => {
            text.push_str(&encode_param_id(*id));
            text.push_str(&encode_instance(*instance));
        }
        Command::Write {
            id,
            instance,
            value,
        } => {
            text.push_str(&encode_param_id(*id));
            text.push_str(&encode_instance(*instance));
            text.push_str(&value.encode());
        }
        Command::Identify | Command::Stop | Command::Reset => {}
    }

    let checksum = checksum(text.as_bytes());
    text.push_str(&checksum_hex(checksum));

    RequestFrame { text, checksum }
}

// =============================================================================
// Responses
// =============================================================================

/// A validated response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Address echoed by the device
    pub address: u8,
    /// Sequence number echoed by the device
    pub sequence: u16,
    /// Everything between header and checksum
    pub payload: String,
    /// Checksum field as received
    pub checksum: u16,
}

impl Response {
    /// Decode the payload as a numeric value.
    pub fn value(&self, kind: ValueKind) -> TecResult<Value> {
        Value::decode(kind, &self.payload)
    }

    /// Whether this is a bare acknowledgement.
    pub fn is_ack(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Validate a response and strip its framing.
///
/// Error frames are checked first and reported as [`TecError::Device`]
/// without checksum validation.
pub fn parse_response(raw: &str) -> TecResult<Response> {
    parse(raw, None)
}

/// Like [`parse_response`], but an empty-payload acknowledgement may also
/// carry the checksum of the request it answers.
pub fn parse_acknowledgement(raw: &str, request_checksum: u16) -> TecResult<Response> {
    parse(raw, Some(request_checksum))
}

fn parse(raw: &str, echoed_checksum: Option<u16>) -> TecResult<Response> {
    if let Some(code) = device_error_code(raw)? {
        return Err(TecError::Device {
            code,
            response: raw.to_string(),
        });
    }

    if raw.len() < MIN_RESPONSE_LEN {
        return Err(TecError::framing(
            format!("response shorter than {} characters", MIN_RESPONSE_LEN),
            raw,
        ));
    }
    if !raw.is_ascii() {
        return Err(TecError::framing("response is not ASCII", raw));
    }

    let bytes = raw.as_bytes();
    if bytes[0] != RESPONSE_PREAMBLE {
        return Err(TecError::framing("missing '!' preamble", raw));
    }
    if !bytes[1..HEADER_WIDTH].iter().copied().all(is_upper_hex) {
        return Err(TecError::framing("header is not uppercase hexadecimal", raw));
    }

    let checksum_start = raw.len() - CHECKSUM_WIDTH;
    let payload = &raw[HEADER_WIDTH..checksum_start];
    if !payload.bytes().all(|b| b == b' ' || b.is_ascii_graphic()) {
        return Err(TecError::framing("payload is not printable ASCII", raw));
    }

    let received = parse_checksum(&raw[checksum_start..])
        .ok_or_else(|| TecError::framing("checksum field is not hexadecimal", raw))?;
    let expected = checksum(&bytes[..checksum_start]);

    let echo_accepted = payload.is_empty() && echoed_checksum == Some(received);
    if received != expected && !echo_accepted {
        return Err(TecError::ChecksumMismatch { expected, received });
    }

    Ok(Response {
        address: parse_hex_u8(&raw[1..3], raw)?,
        sequence: parse_hex_u16(&raw[3..HEADER_WIDTH], raw)?,
        payload: payload.to_string(),
        checksum: received,
    })
}

/// `Some(code)` if `raw` carries the `+NN` error marker.
fn device_error_code(raw: &str) -> TecResult<Option<u8>> {
    let bytes = raw.as_bytes();
    let Some(pos) = bytes.iter().position(|&b| b == ERROR_MARKER) else {
        return Ok(None);
    };

    match bytes.get(pos + 1..pos + 3) {
        Some(&[tens, ones]) if tens.is_ascii_digit() && ones.is_ascii_digit() => {
            Ok(Some((tens - b'0') * 10 + (ones - b'0')))
        }
        _ => Err(TecError::framing("malformed device error code", raw)),
    }
}

fn parse_hex_u8(field: &str, raw: &str) -> TecResult<u8> {
    u8::from_str_radix(field, 16).map_err(|_| TecError::framing("bad address field", raw))
}

fn parse_hex_u16(field: &str, raw: &str) -> TecResult<u16> {
    u16::from_str_radix(field, 16).map_err(|_| TecError::framing("bad sequence field", raw))
}
