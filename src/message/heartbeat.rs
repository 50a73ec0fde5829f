use nom::bytes::complete::take;
use nom::number::complete::be_u16;
use nom::IResult;

use crate::codec::WireWrite;
use crate::crypto::CryptoProvider;
use crate::types::HeartbeatMessageType;
use crate::Error;

pub const MIN_PADDING_LEN: usize = 16;

/// RFC 6520 HeartbeatMessage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatMessage {
    pub message_type: HeartbeatMessageType,
    pub payload: Vec<u8>,
    pub padding: Vec<u8>,
}

impl HeartbeatMessage {
    pub fn request(payload: Vec<u8>, provider: &CryptoProvider) -> Result<Self, Error> {
        Ok(HeartbeatMessage {
            message_type: HeartbeatMessageType::Request,
            payload,
            padding: provider.random_vec(MIN_PADDING_LEN)?,
        })
    }

    /// The response echoes the payload with fresh padding.
    pub fn response_to(&self, provider: &CryptoProvider) -> Result<Self, Error> {
        Ok(HeartbeatMessage {
            message_type: HeartbeatMessageType::Response,
            payload: self.payload.clone(),
            padding: provider.random_vec(MIN_PADDING_LEN)?,
        })
    }

    /// Padding takes whatever follows the payload.
    pub fn parse(input: &[u8]) -> IResult<&[u8], HeartbeatMessage> {
        let (input, message_type) = HeartbeatMessageType::parse(input)?;
        let (input, payload_len) = be_u16(input)?;
        let (input, payload) = take(payload_len as usize)(input)?;
        let (rest, padding) = take(input.len())(input)?;
        Ok((
            rest,
            HeartbeatMessage {
                message_type,
                payload: payload.to_vec(),
                padding: padding.to_vec(),
            },
        ))
    }

    /// Malformed heartbeats are discarded silently (RFC 6520 4), so this
    /// yields `None` rather than an error.
    pub fn decode(record: &[u8]) -> Option<HeartbeatMessage> {
        let (_, msg) = Self::parse(record).ok()?;
        if !msg.message_type.is_known() || msg.padding.len() < MIN_PADDING_LEN {
            return None;
        }
        Some(msg)
    }

    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        self.message_type.serialize(out);
        out.put_opaque16(&self.payload)?;
        out.extend_from_slice(&self.padding);
        Ok(())
    }
}
