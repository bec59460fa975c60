//! Newline-delimited JSON-RPC 2.0 framing.
//!
//! One UTF-8 JSON object per line. [`JsonRpcCodec`] wraps a bounded
//! [`LinesCodec`] and validates the envelope on decode, so handlers only ever
//! see well-formed requests or a [`FrameError`] that already knows its
//! JSON-RPC error code.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

pub const JSONRPC_VERSION: &str = "2.0";

/// The only method the server answers
pub const SEARCH_METHOD: &str = "search";

/// Longest accepted request line, excluding the newline
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
/// Implementation-defined: sent to open connections when the server stops
pub const SERVER_SHUTTING_DOWN: i32 = -32099;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A JSON-RPC request, response or error envelope
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Message {
    pub fn request(method: impl Into<String>, params: Option<Value>, id: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: Some(method.into()),
            params,
            id,
            result: None,
            error: None,
        }
    }

    pub fn response(result: Value, id: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: None,
            params: None,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(code: i32, message: impl Into<String>, id: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: None,
            params: None,
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Request line is not valid UTF-8")]
    InvalidUtf8,

    #[error("Request line exceeds {MAX_LINE_LENGTH} bytes")]
    LineTooLong,

    #[error("Empty request line")]
    Empty,

    #[error("Parse error: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Invalid request: expected a JSON object")]
    NotAnObject,

    #[error("Invalid request: jsonrpc must be \"2.0\"")]
    BadVersion,

    #[error("Invalid request: {0}")]
    Malformed(serde_json::Error),

    #[error("Failed to serialize message: {0}")]
    Serialize(serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// JSON-RPC error code reported to the peer
    pub fn code(&self) -> i32 {
        match self {
            FrameError::InvalidUtf8
            | FrameError::LineTooLong
            | FrameError::Empty
            | FrameError::InvalidJson(_) => PARSE_ERROR,
            FrameError::NotAnObject | FrameError::BadVersion | FrameError::Malformed(_) => {
                INVALID_REQUEST
            }
            FrameError::Serialize(_) | FrameError::Io(_) => INTERNAL_ERROR,
        }
    }

    /// Whether the connection itself failed, as opposed to a bad frame
    pub fn is_io(&self) -> bool {
        matches!(self, FrameError::Io(_))
    }
}

impl From<LinesCodecError> for FrameError {
    fn from(error: LinesCodecError) -> Self {
        match error {
            LinesCodecError::MaxLineLengthExceeded => FrameError::LineTooLong,
            LinesCodecError::Io(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                FrameError::InvalidUtf8
            }
            LinesCodecError::Io(e) => FrameError::Io(e),
        }
    }
}

/// Validate one line as a JSON-RPC 2.0 envelope.
pub fn parse_line(line: &str) -> Result<Message, FrameError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(FrameError::Empty);
    }

    let value: Value = serde_json::from_str(line).map_err(FrameError::InvalidJson)?;
    let Some(object) = value.as_object() else {
        return Err(FrameError::NotAnObject);
    };
    if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(FrameError::BadVersion);
    }

    serde_json::from_value(value).map_err(FrameError::Malformed)
}

#[derive(Debug)]
pub struct JsonRpcCodec {
    lines: LinesCodec,
}

impl JsonRpcCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
        }
    }
}

impl Default for JsonRpcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for JsonRpcCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, FrameError> {
        match self.lines.decode(src)? {
            Some(line) => parse_line(&line).map(Some),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>, FrameError> {
        match self.lines.decode_eof(src)? {
            Some(line) => parse_line(&line).map(Some),
            None => Ok(None),
        }
    }
}

impl Encoder<Message> for JsonRpcCodec {
    type Error = FrameError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), FrameError> {
        let line = serde_json::to_string(&message).map_err(FrameError::Serialize)?;
        self.lines.encode(line, dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_all(codec: &mut JsonRpcCodec, input: &[u8]) -> Vec<Result<Message, FrameError>> {
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        loop {
            match codec.decode(&mut buf) {
                Ok(Some(message)) => out.push(Ok(message)),
                Ok(None) => break,
                Err(e) => out.push(Err(e)),
            }
        }
        out
    }

    #[test]
    fn test_decodes_request() {
        let mut codec = JsonRpcCodec::new();
        let decoded = decode_all(
            &mut codec,
            br#"{"jsonrpc":"2.0","method":"search","params":{"q":"rust"},"id":7}
"#,
        );

        let request = decoded.into_iter().next().unwrap().unwrap();
        assert_eq!(request.method.as_deref(), Some(SEARCH_METHOD));
        assert_eq!(request.params, Some(json!({"q": "rust"})));
        assert_eq!(request.id, Some(json!(7)));
    }

    #[test]
    fn test_waits_for_newline() {
        let mut codec = JsonRpcCodec::new();
        let mut buf = BytesMut::from(&br#"{"jsonrpc":"2.0","#[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_envelope_errors_map_to_codes() {
        assert_eq!(parse_line("not json").unwrap_err().code(), PARSE_ERROR);
        assert_eq!(parse_line("   ").unwrap_err().code(), PARSE_ERROR);
        assert_eq!(parse_line("[1,2]").unwrap_err().code(), INVALID_REQUEST);
        assert_eq!(
            parse_line(r#"{"jsonrpc":"1.0","method":"search"}"#)
                .unwrap_err()
                .code(),
            INVALID_REQUEST
        );
        assert_eq!(
            parse_line(r#"{"jsonrpc":"2.0","method":42}"#)
                .unwrap_err()
                .code(),
            INVALID_REQUEST
        );
    }

    #[test]
    fn test_oversized_line_is_parse_error() {
        let mut codec = JsonRpcCodec::with_max_length(16);
        let decoded = decode_all(&mut codec, b"{\"jsonrpc\":\"2.0\",\"method\":\"search\"}\n");

        let err = decoded.into_iter().next().unwrap().unwrap_err();
        assert!(matches!(err, FrameError::LineTooLong));
        assert_eq!(err.code(), PARSE_ERROR);
    }

    #[test]
    fn test_invalid_utf8_is_parse_error() {
        let mut codec = JsonRpcCodec::new();
        let decoded = decode_all(&mut codec, b"\xff\xfe\n");

        let err = decoded.into_iter().next().unwrap().unwrap_err();
        assert!(matches!(err, FrameError::InvalidUtf8));
        assert_eq!(err.code(), PARSE_ERROR);
    }

    #[test]
    fn test_encodes_one_line_without_empty_fields() {
        let mut codec = JsonRpcCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Message::response(json!([]), Some(json!("a"))), &mut buf)
            .unwrap();

        assert_eq!(&buf[..], b"{\"jsonrpc\":\"2.0\",\"id\":\"a\",\"result\":[]}\n");
    }

    #[test]
    fn test_error_message_shape() {
        let value =
            serde_json::to_value(Message::error(SERVER_SHUTTING_DOWN, "Server shutting down", None))
                .unwrap();
        assert_eq!(
            value,
            json!({
                "jsonrpc": "2.0",
                "error": {"code": -32099, "message": "Server shutting down"}
            })
        );
    }
}
