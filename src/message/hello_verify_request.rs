use nom::IResult;

use crate::codec::{opaque8, WireWrite};
use crate::types::ProtocolVersion;
use crate::Error;

/// DTLS stateless cookie challenge (RFC 6347 4.2.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloVerifyRequest {
    pub server_version: ProtocolVersion,
    pub cookie: Vec<u8>,
}

impl HelloVerifyRequest {
    pub fn parse(input: &[u8]) -> IResult<&[u8], HelloVerifyRequest> {
        let (input, server_version) = ProtocolVersion::parse(input)?;
        let (input, cookie) = opaque8(input)?;
        Ok((
            input,
            HelloVerifyRequest {
                server_version,
                cookie: cookie.to_vec(),
            },
        ))
    }

    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        self.server_version.serialize(out);
        out.put_opaque8(&self.cookie)
    }
}
