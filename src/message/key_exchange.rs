//! ServerKeyExchange and ClientKeyExchange bodies.
//!
//! Neither message is self-describing. The layout follows from the key
//! exchange of the negotiated suite, so both parsers take it as context.

use nom::combinator::verify;
use nom::number::complete::be_u8;
use nom::IResult;

use super::DigitallySigned;
use crate::codec::{opaque16, opaque8, WireWrite};
use crate::types::{KeyExchangeAlgorithm, NamedGroup, ProtocolVersion};
use crate::Error;

const NAMED_CURVE: u8 = 3;

/// `ServerECDHParams` with a named curve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEcdhParams {
    pub group: NamedGroup,
    pub point: Vec<u8>,
}

/// `ServerDHParams`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDhParams {
    pub p: Vec<u8>,
    pub g: Vec<u8>,
    pub ys: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerKeyParams {
    Ecdh(ServerEcdhParams),
    Dh(ServerDhParams),
}

impl ServerKeyParams {
    fn parse_ecdh(input: &[u8]) -> IResult<&[u8], ServerKeyParams> {
        let (input, _) = verify(be_u8, |t: &u8| *t == NAMED_CURVE)(input)?;
        let (input, group) = NamedGroup::parse(input)?;
        let (input, point) = verify(opaque8, |p: &[u8]| !p.is_empty())(input)?;
        Ok((
            input,
            ServerKeyParams::Ecdh(ServerEcdhParams {
                group,
                point: point.to_vec(),
            }),
        ))
    }

    fn parse_dh(input: &[u8]) -> IResult<&[u8], ServerKeyParams> {
        let non_empty = |v: &[u8]| !v.is_empty();
        let (input, p) = verify(opaque16, non_empty)(input)?;
        let (input, g) = verify(opaque16, non_empty)(input)?;
        let (input, ys) = verify(opaque16, non_empty)(input)?;
        Ok((
            input,
            ServerKeyParams::Dh(ServerDhParams {
                p: p.to_vec(),
                g: g.to_vec(),
                ys: ys.to_vec(),
            }),
        ))
    }

    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        match self {
            ServerKeyParams::Ecdh(e) => {
                out.put_u8(NAMED_CURVE);
                e.group.serialize(out);
                out.put_opaque8(&e.point)
            }
            ServerKeyParams::Dh(d) => {
                out.put_opaque16(&d.p)?;
                out.put_opaque16(&d.g)?;
                out.put_opaque16(&d.ys)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerKeyExchange {
    pub psk_identity_hint: Option<Vec<u8>>,
    pub params: Option<ServerKeyParams>,
    /// Only for the certificate based exchanges.
    pub signature: Option<DigitallySigned>,
}

impl ServerKeyExchange {
    pub fn parse(
        input: &[u8],
        kx: KeyExchangeAlgorithm,
        version: ProtocolVersion,
    ) -> IResult<&[u8], ServerKeyExchange> {
        use KeyExchangeAlgorithm::*;

        let (input, psk_identity_hint) = if kx.is_psk() {
            let (input, hint) = opaque16(input)?;
            (input, Some(hint.to_vec()))
        } else {
            (input, None)
        };

        let (input, params) = match kx {
            EcdheEcdsa | EcdhAnon | EcdhePsk => {
                let (input, p) = ServerKeyParams::parse_ecdh(input)?;
                (input, Some(p))
            }
            DheRsa | DhAnon | DhePsk => {
                let (input, p) = ServerKeyParams::parse_dh(input)?;
                (input, Some(p))
            }
            Psk | Tls13 => (input, None),
        };

        let (input, signature) = if kx.requires_server_certificate() {
            let (input, s) = DigitallySigned::parse(input, version.is_tls12_or_later())?;
            (input, Some(s))
        } else {
            (input, None)
        };

        Ok((
            input,
            ServerKeyExchange {
                psk_identity_hint,
                params,
                signature,
            },
        ))
    }

    /// The encoded params, which is what the server signs after the randoms.
    pub fn params_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        if let Some(p) = &self.params {
            p.serialize(&mut out)?;
        }
        Ok(out)
    }

    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        if let Some(hint) = &self.psk_identity_hint {
            out.put_opaque16(hint)?;
        }
        if let Some(p) = &self.params {
            p.serialize(out)?;
        }
        if let Some(s) = &self.signature {
            s.serialize(out)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientKeyExchange {
    pub psk_identity: Option<Vec<u8>>,
    /// The client's ephemeral public value, ECPoint or DH Yc.
    pub public: Option<Vec<u8>>,
}

impl ClientKeyExchange {
    pub fn parse(input: &[u8], kx: KeyExchangeAlgorithm) -> IResult<&[u8], ClientKeyExchange> {
        use KeyExchangeAlgorithm::*;

        let (input, psk_identity) = if kx.is_psk() {
            let (input, id) = opaque16(input)?;
            (input, Some(id.to_vec()))
        } else {
            (input, None)
        };

        let (input, public) = match kx {
            EcdheEcdsa | EcdhAnon | EcdhePsk => {
                let (input, p) = verify(opaque8, |p: &[u8]| !p.is_empty())(input)?;
                (input, Some(p.to_vec()))
            }
            DheRsa | DhAnon | DhePsk => {
                let (input, p) = verify(opaque16, |p: &[u8]| !p.is_empty())(input)?;
                (input, Some(p.to_vec()))
            }
            Psk | Tls13 => (input, None),
        };

        Ok((
            input,
            ClientKeyExchange {
                psk_identity,
                public,
            },
        ))
    }

    pub fn serialize(&self, out: &mut Vec<u8>, kx: KeyExchangeAlgorithm) -> Result<(), Error> {
        if let Some(id) = &self.psk_identity {
            out.put_opaque16(id)?;
        }
        if let Some(p) = &self.public {
            if kx.is_ecc() {
                out.put_opaque8(p)?;
            } else {
                out.put_opaque16(p)?;
            }
        }
        Ok(())
    }
}
