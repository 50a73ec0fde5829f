//! Handshake message framing.
//!
//! TLS prefixes every message with its type and a 24-bit length. DTLS adds
//! the message sequence number and a fragment window so messages can be
//! split across datagrams and reassembled out of order.

use nom::number::complete::{be_u16, be_u24};
use nom::IResult;

use crate::codec::WireWrite;
use crate::types::HandshakeType;
use crate::Error;

pub const TLS_HEADER_LEN: usize = 4;
pub const DTLS_HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeHeader {
    pub msg_type: HandshakeType,
    pub length: u32,
    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: u32,
}

impl HandshakeHeader {
    /// Header of an unfragmented message.
    pub fn new(msg_type: HandshakeType, length: usize, message_seq: u16) -> Self {
        HandshakeHeader {
            msg_type,
            length: length as u32,
            message_seq,
            fragment_offset: 0,
            fragment_length: length as u32,
        }
    }

    pub fn parse_tls(input: &[u8]) -> IResult<&[u8], HandshakeHeader> {
        let (input, msg_type) = HandshakeType::parse(input)?;
        let (input, length) = be_u24(input)?;
        Ok((input, HandshakeHeader::new(msg_type, length as usize, 0)))
    }

    pub fn parse_dtls(input: &[u8]) -> IResult<&[u8], HandshakeHeader> {
        let (input, msg_type) = HandshakeType::parse(input)?;
        let (input, length) = be_u24(input)?;
        let (input, message_seq) = be_u16(input)?;
        let (input, fragment_offset) = be_u24(input)?;
        let (input, fragment_length) = be_u24(input)?;
        Ok((
            input,
            HandshakeHeader {
                msg_type,
                length,
                message_seq,
                fragment_offset,
                fragment_length,
            },
        ))
    }

    /// The fragment window lies inside the message.
    pub fn is_consistent(&self) -> bool {
        self.fragment_offset as u64 + self.fragment_length as u64 <= self.length as u64
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment_offset != 0 || self.fragment_length != self.length
    }

    pub fn serialize_tls(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        self.msg_type.serialize(out);
        out.put_u24(self.length as usize)
    }

    pub fn serialize_dtls(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        self.msg_type.serialize(out);
        out.put_u24(self.length as usize)?;
        out.put_u16(self.message_seq);
        out.put_u24(self.fragment_offset as usize)?;
        out.put_u24(self.fragment_length as usize)
    }
}

/// A complete TLS handshake message, header included.
pub fn encode_tls(msg_type: HandshakeType, body: &[u8]) -> Result<Vec<u8>, Error> {
    let mut out = Vec::with_capacity(TLS_HEADER_LEN + body.len());
    HandshakeHeader::new(msg_type, body.len(), 0).serialize_tls(&mut out)?;
    out.extend_from_slice(body);
    Ok(out)
}

/// A complete DTLS handshake message as a single fragment. This is also the
/// form DTLS handshake messages take in the transcript.
pub fn encode_dtls(msg_type: HandshakeType, message_seq: u16, body: &[u8]) -> Result<Vec<u8>, Error> {
    let mut out = Vec::with_capacity(DTLS_HEADER_LEN + body.len());
    HandshakeHeader::new(msg_type, body.len(), message_seq).serialize_dtls(&mut out)?;
    out.extend_from_slice(body);
    Ok(out)
}

/// One DTLS fragment: header plus the bytes `[offset, offset + len)` of `body`.
pub fn encode_dtls_fragment(
    msg_type: HandshakeType,
    message_seq: u16,
    body: &[u8],
    offset: usize,
    len: usize,
    out: &mut Vec<u8>,
) -> Result<(), Error> {
    let header = HandshakeHeader {
        msg_type,
        length: body.len() as u32,
        message_seq,
        fragment_offset: offset as u32,
        fragment_length: len as u32,
    };
    header.serialize_dtls(out)?;
    out.extend_from_slice(&body[offset..offset + len]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtls_header_roundtrip() {
        let mut out = Vec::new();
        encode_dtls_fragment(HandshakeType::Certificate, 3, &[1, 2, 3, 4, 5], 2, 2, &mut out)
            .unwrap();
        assert_eq!(out.len(), DTLS_HEADER_LEN + 2);

        let (rest, h) = HandshakeHeader::parse_dtls(&out).unwrap();
        assert_eq!(h.msg_type, HandshakeType::Certificate);
        assert_eq!(h.length, 5);
        assert_eq!(h.message_seq, 3);
        assert_eq!(h.fragment_offset, 2);
        assert_eq!(h.fragment_length, 2);
        assert!(h.is_fragment());
        assert!(h.is_consistent());
        assert_eq!(rest, &[3, 4]);
    }

    #[test]
    fn tls_message() {
        let m = encode_tls(HandshakeType::Finished, &[9; 12]).unwrap();
        assert_eq!(&m[..4], &[20, 0, 0, 12]);
        let (_, h) = HandshakeHeader::parse_tls(&m).unwrap();
        assert!(!h.is_fragment());
    }

    #[test]
    fn fragment_outside_message() {
        let h = HandshakeHeader {
            msg_type: HandshakeType::Certificate,
            length: 10,
            message_seq: 0,
            fragment_offset: 8,
            fragment_length: 4,
        };
        assert!(!h.is_consistent());
    }
}
