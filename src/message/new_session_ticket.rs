use nom::number::complete::be_u32;
use nom::IResult;

use super::Extensions;
use crate::codec::{opaque16, opaque8, WireWrite};
use crate::Error;

/// RFC 5077 NewSessionTicket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSessionTicket {
    pub lifetime_hint: u32,
    pub ticket: Vec<u8>,
}

impl NewSessionTicket {
    pub fn parse(input: &[u8]) -> IResult<&[u8], NewSessionTicket> {
        let (input, lifetime_hint) = be_u32(input)?;
        let (input, ticket) = opaque16(input)?;
        Ok((
            input,
            NewSessionTicket {
                lifetime_hint,
                ticket: ticket.to_vec(),
            },
        ))
    }

    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        out.put_u32(self.lifetime_hint);
        out.put_opaque16(&self.ticket)
    }
}

/// TLS 1.3 post-handshake NewSessionTicket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSessionTicket13 {
    pub lifetime: u32,
    pub age_add: u32,
    pub nonce: Vec<u8>,
    pub ticket: Vec<u8>,
    pub extensions: Extensions,
}

impl NewSessionTicket13 {
    pub fn parse(input: &[u8]) -> IResult<&[u8], NewSessionTicket13> {
        let (input, lifetime) = be_u32(input)?;
        let (input, age_add) = be_u32(input)?;
        let (input, nonce) = opaque8(input)?;
        let (input, ticket) = nom::combinator::verify(opaque16, |t: &[u8]| !t.is_empty())(input)?;
        let (input, extensions) = Extensions::parse(input)?;
        Ok((
            input,
            NewSessionTicket13 {
                lifetime,
                age_add,
                nonce: nonce.to_vec(),
                ticket: ticket.to_vec(),
                extensions,
            },
        ))
    }

    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        out.put_u32(self.lifetime);
        out.put_u32(self.age_add);
        out.put_opaque8(&self.nonce)?;
        out.put_opaque16(&self.ticket)?;
        self.extensions.serialize(out)
    }
}
