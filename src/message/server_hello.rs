use nom::combinator::verify;
use nom::number::complete::be_u8;
use nom::IResult;

use super::{Extensions, Random};
use crate::codec::{opaque8, WireWrite};
use crate::message::client_hello::MAX_SESSION_ID_LEN;
use crate::types::{CipherSuite, ProtocolVersion};
use crate::Error;

/// ServerHello, and in TLS 1.3 also HelloRetryRequest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub server_version: ProtocolVersion,
    pub random: Random,
    pub session_id: Vec<u8>,
    pub cipher_suite: CipherSuite,
    pub compression_method: u8,
    pub extensions: Extensions,
}

impl ServerHello {
    pub fn is_hello_retry_request(&self) -> bool {
        self.random.is_hello_retry_request()
    }

    /// The version the server picked. TLS 1.3 moves it into supported_versions.
    pub fn negotiated_version(&self) -> Result<ProtocolVersion, Error> {
        Ok(self
            .extensions
            .selected_version()?
            .unwrap_or(self.server_version))
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ServerHello> {
        let (input, server_version) = ProtocolVersion::parse(input)?;
        let (input, random) = Random::parse(input)?;
        let (input, session_id) =
            verify(opaque8, |s: &[u8]| s.len() <= MAX_SESSION_ID_LEN)(input)?;
        let (input, cipher_suite) = CipherSuite::parse(input)?;
        let (input, compression_method) = be_u8(input)?;
        let (input, extensions) = Extensions::parse_optional(input)?;

        Ok((
            input,
            ServerHello {
                server_version,
                random,
                session_id: session_id.to_vec(),
                cipher_suite,
                compression_method,
                extensions,
            },
        ))
    }

    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        if self.session_id.len() > MAX_SESSION_ID_LEN {
            return Err(Error::internal("session id longer than 32 bytes"));
        }
        self.server_version.serialize(out);
        self.random.serialize(out);
        out.put_opaque8(&self.session_id)?;
        self.cipher_suite.serialize(out);
        out.put_u8(self.compression_method);
        if !self.extensions.is_empty() {
            self.extensions.serialize(out)?;
        }
        Ok(())
    }
}
