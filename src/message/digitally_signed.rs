use nom::IResult;

use crate::codec::{opaque16, WireWrite};
use crate::types::SignatureScheme;
use crate::Error;

/// A signature, optionally preceded by the scheme (TLS 1.2 and later).
///
/// Also the body of CertificateVerify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitallySigned {
    pub scheme: Option<SignatureScheme>,
    pub signature: Vec<u8>,
}

impl DigitallySigned {
    pub fn parse(input: &[u8], explicit_scheme: bool) -> IResult<&[u8], DigitallySigned> {
        let (input, scheme) = if explicit_scheme {
            let (input, s) = SignatureScheme::parse(input)?;
            (input, Some(s))
        } else {
            (input, None)
        };
        let (input, signature) = opaque16(input)?;
        Ok((
            input,
            DigitallySigned {
                scheme,
                signature: signature.to_vec(),
            },
        ))
    }

    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        if let Some(s) = self.scheme {
            s.serialize(out);
        }
        out.put_opaque16(&self.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_scheme() {
        let ds = DigitallySigned {
            scheme: Some(SignatureScheme::EcdsaSecp384r1Sha384),
            signature: vec![0x30; 70],
        };
        let mut out = Vec::new();
        ds.serialize(&mut out).unwrap();
        assert_eq!(&out[..4], &[0x05, 0x03, 0, 70]);
        let (rest, parsed) = DigitallySigned::parse(&out, true).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, ds);
    }

    #[test]
    fn without_scheme() {
        let ds = DigitallySigned {
            scheme: None,
            signature: vec![],
        };
        let mut out = Vec::new();
        ds.serialize(&mut out).unwrap();
        assert_eq!(out, &[0, 0]);
        let (_, parsed) = DigitallySigned::parse(&out, false).unwrap();
        assert_eq!(parsed, ds);
    }
}
