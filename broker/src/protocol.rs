//! Wire format for the bridge: binary WebSocket frames with a one-byte
//! opcode prefix, and a compact binary encoding for server-sent error
//! frames. Grounded on the request/response framing in
//! `rumblefrog-lrthrome/server/src/protocol.rs` (manual `BufMut` encoding,
//! `TryFrom<u8>` for tagged enums) rather than a general-purpose codec.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{BrokerError, ErrorCode};

/// First byte of every inbound/outbound data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Control = 1,
    Message = 2,
}

impl TryFrom<u8> for OpCode {
    type Error = BrokerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(OpCode::Control),
            2 => Ok(OpCode::Message),
            other => Err(BrokerError::BadOp(other)),
        }
    }
}

impl OpCode {
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// A parsed inbound frame: opcode plus payload tail.
#[derive(Debug, Clone)]
pub struct Frame {
    pub op: OpCode,
    pub payload: Bytes,
}

impl Frame {
    pub fn parse(raw: &[u8]) -> Result<Frame, BrokerError> {
        let (op_byte, rest) = raw.split_first().ok_or(BrokerError::BadOp(0))?;
        let op = OpCode::try_from(*op_byte)?;
        Ok(Frame {
            op,
            payload: Bytes::copy_from_slice(rest),
        })
    }
}

impl ErrorCode {
    fn to_u8(self) -> u8 {
        self as u8
    }
}

/// `{kind: error, code: <enum>}` encoded as a fixed three-byte record:
/// a type tag (`1` = error), then the numeric error code. Stable and
/// trivially forwards-compatible by growing the tag space, which is all the
/// spec requires ("concrete encoding is implementation-chosen but must be
/// stable").
pub struct ErrorFrame {
    pub code: ErrorCode,
}

const ERROR_FRAME_TAG: u8 = 1;

impl ErrorFrame {
    pub fn new(code: ErrorCode) -> Self {
        Self { code }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2);
        buf.put_u8(ERROR_FRAME_TAG);
        buf.put_u8(self.code.to_u8());
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_message_frame() {
        let raw = [2u8, b'h', b'i'];
        let frame = Frame::parse(&raw).unwrap();
        assert_eq!(frame.op, OpCode::Message);
        assert_eq!(&frame.payload[..], b"hi");
    }

    #[test]
    fn rejects_unknown_opcode() {
        let raw = [9u8, 1, 2, 3];
        let err = Frame::parse(&raw).unwrap_err();
        assert!(matches!(err, BrokerError::BadOp(9)));
    }

    #[test]
    fn error_frame_is_stable() {
        let bytes = ErrorFrame::new(ErrorCode::PeerDead).to_bytes();
        assert_eq!(&bytes[..], &[1, ErrorCode::PeerDead as u8]);
    }
}
