use nom::combinator::{all_consuming, verify};
use nom::multi::many0;
use nom::IResult;

use super::Extensions;
use crate::codec::{opaque16, opaque8, WireWrite};
use crate::types::{ClientCertificateType, ProtocolVersion, SignatureScheme};
use crate::Error;

/// CertificateRequest up to TLS 1.2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    pub certificate_types: Vec<ClientCertificateType>,
    /// Present from TLS 1.2.
    pub signature_schemes: Option<Vec<SignatureScheme>>,
    /// DER distinguished names.
    pub authorities: Vec<Vec<u8>>,
}

impl CertificateRequest {
    pub fn parse(input: &[u8], version: ProtocolVersion) -> IResult<&[u8], CertificateRequest> {
        let (input, types) = verify(opaque8, |t: &[u8]| !t.is_empty())(input)?;
        let (_, certificate_types) = all_consuming(many0(ClientCertificateType::parse))(types)?;

        let (input, signature_schemes) = if version.is_tls12_or_later() {
            let (input, list) =
                verify(opaque16, |b: &[u8]| !b.is_empty() && b.len() % 2 == 0)(input)?;
            let (_, schemes) = all_consuming(many0(SignatureScheme::parse))(list)?;
            (input, Some(schemes))
        } else {
            (input, None)
        };

        let (input, names) = opaque16(input)?;
        let (_, authorities) = all_consuming(many0(opaque16))(names)?;

        Ok((
            input,
            CertificateRequest {
                certificate_types,
                signature_schemes,
                authorities: authorities.into_iter().map(|a| a.to_vec()).collect(),
            },
        ))
    }

    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        out.put_vec8(|o| {
            self.certificate_types.iter().for_each(|t| t.serialize(o));
            Ok(())
        })?;
        if let Some(schemes) = &self.signature_schemes {
            out.put_vec16(|o| {
                schemes.iter().for_each(|s| s.serialize(o));
                Ok(())
            })?;
        }
        out.put_vec16(|o| {
            for a in &self.authorities {
                o.put_opaque16(a)?;
            }
            Ok(())
        })
    }
}

/// TLS 1.3 CertificateRequest. Signature schemes travel in the extensions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CertificateRequest13 {
    pub context: Vec<u8>,
    pub extensions: Extensions,
}

impl CertificateRequest13 {
    pub fn parse(input: &[u8]) -> IResult<&[u8], CertificateRequest13> {
        let (input, context) = opaque8(input)?;
        let (input, extensions) = Extensions::parse(input)?;
        Ok((
            input,
            CertificateRequest13 {
                context: context.to_vec(),
                extensions,
            },
        ))
    }

    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        out.put_opaque8(&self.context)?;
        self.extensions.serialize(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(cr: &CertificateRequest, version: ProtocolVersion) -> CertificateRequest {
        let mut out = Vec::new();
        cr.serialize(&mut out).unwrap();
        let (rest, parsed) = CertificateRequest::parse(&out, version).unwrap();
        assert!(rest.is_empty());
        parsed
    }

    #[test]
    fn minimal_tls10() {
        let cr = CertificateRequest {
            certificate_types: vec![ClientCertificateType::RsaSign],
            signature_schemes: None,
            authorities: vec![],
        };
        assert_eq!(roundtrip(&cr, ProtocolVersion::Tls1_0), cr);
    }

    #[test]
    fn full_tls12() {
        let cr = CertificateRequest {
            certificate_types: vec![
                ClientCertificateType::EcdsaSign,
                ClientCertificateType::RsaSign,
                ClientCertificateType::Unknown(2),
            ],
            signature_schemes: Some(SignatureScheme::default_schemes().to_vec()),
            authorities: vec![vec![0x30, 0x03, 1, 2, 3], vec![0x30, 0x00]],
        };
        assert_eq!(roundtrip(&cr, ProtocolVersion::Dtls1_2), cr);
    }

    #[test]
    fn tls13_form() {
        let mut cr = CertificateRequest13::default();
        cr.extensions
            .set_signature_algorithms(&[SignatureScheme::EcdsaSecp256r1Sha256])
            .unwrap();
        let mut out = Vec::new();
        cr.serialize(&mut out).unwrap();
        let (_, parsed) = CertificateRequest13::parse(&out).unwrap();
        assert_eq!(parsed, cr);
    }
}
