use nom::combinator::{all_consuming, verify};
use nom::multi::many0;
use nom::IResult;

use super::{Extensions, Random};
use crate::codec::{opaque16, opaque8, WireWrite};
use crate::types::{CipherSuite, ProtocolVersion};
use crate::Error;

pub const MAX_SESSION_ID_LEN: usize = 32;
pub const NULL_COMPRESSION: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub client_version: ProtocolVersion,
    pub random: Random,
    pub session_id: Vec<u8>,
    /// DTLS only. Empty until the server asked for one.
    pub cookie: Option<Vec<u8>>,
    pub cipher_suites: Vec<CipherSuite>,
    pub compression_methods: Vec<u8>,
    pub extensions: Extensions,
}

impl ClientHello {
    pub fn new(client_version: ProtocolVersion, random: Random, cipher_suites: Vec<CipherSuite>) -> Self {
        ClientHello {
            client_version,
            random,
            session_id: Vec::new(),
            cookie: client_version.is_dtls().then(Vec::new),
            cipher_suites,
            compression_methods: vec![NULL_COMPRESSION],
            extensions: Extensions::new(),
        }
    }

    pub fn offers(&self, suite: CipherSuite) -> bool {
        self.cipher_suites.contains(&suite)
    }

    pub fn parse(input: &[u8], dtls: bool) -> IResult<&[u8], ClientHello> {
        let (input, client_version) = ProtocolVersion::parse(input)?;
        let (input, random) = Random::parse(input)?;
        let (input, session_id) =
            verify(opaque8, |s: &[u8]| s.len() <= MAX_SESSION_ID_LEN)(input)?;

        let (input, cookie) = if dtls {
            let (input, cookie) = opaque8(input)?;
            (input, Some(cookie.to_vec()))
        } else {
            (input, None)
        };

        let (input, suites) = verify(opaque16, |b: &[u8]| !b.is_empty() && b.len() % 2 == 0)(input)?;
        let (_, cipher_suites) = all_consuming(many0(CipherSuite::parse))(suites)?;

        let (input, compression_methods) = verify(opaque8, |c: &[u8]| !c.is_empty())(input)?;
        let (input, extensions) = Extensions::parse_optional(input)?;

        Ok((
            input,
            ClientHello {
                client_version,
                random,
                session_id: session_id.to_vec(),
                cookie,
                cipher_suites,
                compression_methods: compression_methods.to_vec(),
                extensions,
            },
        ))
    }

    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        if self.session_id.len() > MAX_SESSION_ID_LEN {
            return Err(Error::internal("session id longer than 32 bytes"));
        }
        self.client_version.serialize(out);
        self.random.serialize(out);
        out.put_opaque8(&self.session_id)?;
        if let Some(cookie) = &self.cookie {
            out.put_opaque8(cookie)?;
        }
        out.put_vec16(|o| {
            self.cipher_suites.iter().for_each(|s| s.serialize(o));
            Ok(())
        })?;
        out.put_opaque8(&self.compression_methods)?;
        if !self.extensions.is_empty() {
            self.extensions.serialize(out)?;
        }
        Ok(())
    }
}
