use nom::IResult;

use super::Extensions;
use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncryptedExtensions {
    pub extensions: Extensions,
}

impl EncryptedExtensions {
    pub fn parse(input: &[u8]) -> IResult<&[u8], EncryptedExtensions> {
        let (input, extensions) = Extensions::parse(input)?;
        Ok((input, EncryptedExtensions { extensions }))
    }

    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        self.extensions.serialize(out)
    }
}
