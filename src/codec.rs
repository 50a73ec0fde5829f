//! Wire primitives.
//!
//! All integers are big-endian. `opaque<N>` vectors carry an N-bit length
//! prefix followed by exactly that many bytes. Reading is done with nom
//! parsers, writing through [`WireWrite`] which validates widths before any
//! byte is written so a failed write never leaves a partial encoding behind.

use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u24, be_u8};
use nom::IResult;

use crate::Error;

pub(crate) const U24_MAX: usize = 0x00ff_ffff;
pub(crate) const U48_MAX: u64 = 0x0000_ffff_ffff_ffff;

/// opaque<0..2^8-1>
pub(crate) fn opaque8(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, len) = be_u8(input)?;
    take(len as usize)(input)
}

/// opaque<0..2^16-1>
pub(crate) fn opaque16(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, len) = be_u16(input)?;
    take(len as usize)(input)
}

/// opaque<0..2^24-1>
pub(crate) fn opaque24(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, len) = be_u24(input)?;
    take(len as usize)(input)
}

/// 48-bit unsigned integer.
pub(crate) fn be_u48(input: &[u8]) -> IResult<&[u8], u64> {
    let (input, bytes) = take(6_usize)(input)?;
    let mut v = [0u8; 8];
    v[2..].copy_from_slice(bytes);
    Ok((input, u64::from_be_bytes(v)))
}

/// Fails with `decode_error` if a complete structure left trailing bytes.
pub(crate) fn expect_empty(rest: &[u8], what: &str) -> Result<(), Error> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(Error::decode(format!(
            "{} trailing bytes after {}",
            rest.len(),
            what
        )))
    }
}

/// Parse a complete structure, rejecting trailing bytes.
pub(crate) fn parse_all<'a, T>(
    input: &'a [u8],
    what: &str,
    parser: impl FnOnce(&'a [u8]) -> IResult<&'a [u8], T>,
) -> Result<T, Error> {
    let (rest, value) = parser(input)?;
    expect_empty(rest, what)?;
    Ok(value)
}

/// Big-endian writer with width checks.
pub(crate) trait WireWrite {
    fn put_u8(&mut self, v: u8);
    fn put_u16(&mut self, v: u16);
    fn put_u32(&mut self, v: u32);
    fn put_u24(&mut self, v: usize) -> Result<(), Error>;
    fn put_u48(&mut self, v: u64) -> Result<(), Error>;
    fn put_opaque8(&mut self, data: &[u8]) -> Result<(), Error>;
    fn put_opaque16(&mut self, data: &[u8]) -> Result<(), Error>;
    fn put_opaque24(&mut self, data: &[u8]) -> Result<(), Error>;

    /// Write a vector with an 8-bit length prefix whose body is produced by `f`.
    fn put_vec8<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Vec<u8>) -> Result<(), Error>;

    /// Write a vector with a 16-bit length prefix whose body is produced by `f`.
    fn put_vec16<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Vec<u8>) -> Result<(), Error>;

    /// Write a vector with a 24-bit length prefix whose body is produced by `f`.
    fn put_vec24<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Vec<u8>) -> Result<(), Error>;
}

fn put_prefixed<F>(out: &mut Vec<u8>, width: usize, max: usize, f: F) -> Result<(), Error>
where
    F: FnOnce(&mut Vec<u8>) -> Result<(), Error>,
{
    let start = out.len();
    out.resize(start + width, 0);

    if let Err(e) = f(out) {
        out.truncate(start);
        return Err(e);
    }

    let len = out.len() - start - width;
    if len > max {
        out.truncate(start);
        return Err(Error::internal(format!(
            "vector length {} exceeds {}-byte length field",
            len, width
        )));
    }

    let bytes = (len as u32).to_be_bytes();
    out[start..start + width].copy_from_slice(&bytes[4 - width..]);
    Ok(())
}

fn check_width(len: usize, max: usize, what: &str) -> Result<(), Error> {
    if len > max {
        return Err(Error::internal(format!("{} {} exceeds {}", what, len, max)));
    }
    Ok(())
}

impl WireWrite for Vec<u8> {
    fn put_u8(&mut self, v: u8) {
        self.push(v);
    }

    fn put_u16(&mut self, v: u16) {
        self.extend_from_slice(&v.to_be_bytes());
    }

    fn put_u32(&mut self, v: u32) {
        self.extend_from_slice(&v.to_be_bytes());
    }

    fn put_u24(&mut self, v: usize) -> Result<(), Error> {
        check_width(v, U24_MAX, "u24 value")?;
        self.extend_from_slice(&(v as u32).to_be_bytes()[1..]);
        Ok(())
    }

    fn put_u48(&mut self, v: u64) -> Result<(), Error> {
        if v > U48_MAX {
            return Err(Error::internal(format!("u48 value {} out of range", v)));
        }
        self.extend_from_slice(&v.to_be_bytes()[2..]);
        Ok(())
    }

    fn put_opaque8(&mut self, data: &[u8]) -> Result<(), Error> {
        check_width(data.len(), 0xff, "opaque8 length")?;
        self.push(data.len() as u8);
        self.extend_from_slice(data);
        Ok(())
    }

    fn put_opaque16(&mut self, data: &[u8]) -> Result<(), Error> {
        check_width(data.len(), 0xffff, "opaque16 length")?;
        self.put_u16(data.len() as u16);
        self.extend_from_slice(data);
        Ok(())
    }

    fn put_opaque24(&mut self, data: &[u8]) -> Result<(), Error> {
        check_width(data.len(), U24_MAX, "opaque24 length")?;
        self.put_u24(data.len())?;
        self.extend_from_slice(data);
        Ok(())
    }

    fn put_vec8<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Vec<u8>) -> Result<(), Error>,
    {
        put_prefixed(self, 1, 0xff, f)
    }

    fn put_vec16<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Vec<u8>) -> Result<(), Error>,
    {
        put_prefixed(self, 2, 0xffff, f)
    }

    fn put_vec24<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Vec<u8>) -> Result<(), Error>,
    {
        put_prefixed(self, 3, U24_MAX, f)
    }
}
