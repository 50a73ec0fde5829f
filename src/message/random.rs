use std::time::Instant;

use nom::bytes::complete::take;
use nom::IResult;

use crate::crypto::CryptoProvider;
use crate::time_tricks::InstantExt;
use crate::Error;

/// ServerHello.random of a HelloRetryRequest (RFC 8446 4.1.3).
pub const HELLO_RETRY_REQUEST_RANDOM: [u8; 32] = [
    0xcf, 0x21, 0xad, 0x74, 0xe5, 0x9a, 0x61, 0x11, 0xbe, 0x1d, 0x8c, 0x02, 0x1e, 0x65, 0xb8, 0x91,
    0xc2, 0xa2, 0x11, 0x16, 0x7a, 0xbb, 0x8c, 0x5e, 0x07, 0x9e, 0x09, 0xe2, 0xc8, 0xa8, 0x33, 0x9c,
];

/// Last eight bytes of a TLS 1.3 server's random when it negotiates TLS 1.2.
pub const DOWNGRADE_TLS12: [u8; 8] = *b"DOWNGRD\x01";

/// Last eight bytes of a TLS 1.3 server's random when it negotiates TLS 1.1 or below.
pub const DOWNGRADE_TLS11: [u8; 8] = *b"DOWNGRD\x00";

/// Hello random: a 32-bit timestamp followed by 28 random bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Random(pub [u8; 32]);

impl Random {
    pub fn new(now: Instant, provider: &CryptoProvider) -> Result<Self, Error> {
        // Valid until 2106.
        let gmt_unix_time = now.to_unix_duration().as_secs() as u32;
        let mut bytes: [u8; 32] = provider.random_array()?;
        bytes[..4].copy_from_slice(&gmt_unix_time.to_be_bytes());
        Ok(Random(bytes))
    }

    pub fn is_hello_retry_request(&self) -> bool {
        self.0 == HELLO_RETRY_REQUEST_RANDOM
    }

    /// Overwrite the tail with a downgrade sentinel.
    pub fn set_downgrade_sentinel(&mut self, sentinel: [u8; 8]) {
        self.0[24..].copy_from_slice(&sentinel);
    }

    pub fn has_downgrade_sentinel(&self) -> bool {
        self.0[24..] == DOWNGRADE_TLS12 || self.0[24..] == DOWNGRADE_TLS11
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Random> {
        let (input, bytes) = take(32_usize)(input)?;
        let mut r = [0u8; 32];
        r.copy_from_slice(bytes);
        Ok((input, Random(r)))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.0);
    }
}
