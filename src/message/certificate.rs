use nom::combinator::{all_consuming, verify};
use nom::multi::many0;
use nom::IResult;

use super::Extensions;
use crate::codec::{opaque24, opaque8, WireWrite};
use crate::Error;

/// One certificate of a chain. Extensions only exist in TLS 1.3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateEntry {
    pub data: Vec<u8>,
    pub extensions: Extensions,
}

impl CertificateEntry {
    fn parse(input: &[u8], tls13: bool) -> IResult<&[u8], CertificateEntry> {
        let (input, data) = verify(opaque24, |d: &[u8]| !d.is_empty())(input)?;
        let (input, extensions) = if tls13 {
            Extensions::parse(input)?
        } else {
            (input, Extensions::new())
        };
        Ok((
            input,
            CertificateEntry {
                data: data.to_vec(),
                extensions,
            },
        ))
    }
}

/// Certificate message, leaf first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Certificate {
    /// TLS 1.3 certificate_request_context.
    pub context: Option<Vec<u8>>,
    pub entries: Vec<CertificateEntry>,
}

impl Certificate {
    pub fn new(chain: &[Vec<u8>], tls13: bool) -> Self {
        Certificate {
            context: tls13.then(Vec::new),
            entries: chain
                .iter()
                .map(|data| CertificateEntry {
                    data: data.clone(),
                    extensions: Extensions::new(),
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn chain(&self) -> Vec<Vec<u8>> {
        self.entries.iter().map(|e| e.data.clone()).collect()
    }

    pub fn parse(input: &[u8], tls13: bool) -> IResult<&[u8], Certificate> {
        let (input, context) = if tls13 {
            let (input, c) = opaque8(input)?;
            (input, Some(c.to_vec()))
        } else {
            (input, None)
        };

        let (input, list) = opaque24(input)?;
        let (_, entries) = all_consuming(many0(|i| CertificateEntry::parse(i, tls13)))(list)?;
        Ok((input, Certificate { context, entries }))
    }

    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        if let Some(context) = &self.context {
            out.put_opaque8(context)?;
        }
        out.put_vec24(|o| {
            for e in &self.entries {
                o.put_opaque24(&e.data)?;
                if self.context.is_some() {
                    e.extensions.serialize(o)?;
                }
            }
            Ok(())
        })
    }
}
