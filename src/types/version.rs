use core::cmp::Ordering;
use core::fmt;

use nom::number::complete::be_u16;
use nom::IResult;

/// A protocol version on the wire.
///
/// The major/minor byte pair determines the value. DTLS encodes its versions
/// as a one's complement, which makes later DTLS versions numerically smaller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    Ssl3,
    Tls1_0,
    Tls1_1,
    Tls1_2,
    Tls1_3,
    Dtls1_0,
    Dtls1_2,
    Unknown(u16),
}

const TLS_MAJOR: u8 = 0x03;
const DTLS_MAJOR: u8 = 0xfe;

impl ProtocolVersion {
    pub fn from_u16(value: u16) -> Self {
        use ProtocolVersion::*;
        match value {
            0x0300 => Ssl3,
            0x0301 => Tls1_0,
            0x0302 => Tls1_1,
            0x0303 => Tls1_2,
            0x0304 => Tls1_3,
            0xfeff => Dtls1_0,
            0xfefd => Dtls1_2,
            _ => Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        use ProtocolVersion::*;
        match self {
            Ssl3 => 0x0300,
            Tls1_0 => 0x0301,
            Tls1_1 => 0x0302,
            Tls1_2 => 0x0303,
            Tls1_3 => 0x0304,
            Dtls1_0 => 0xfeff,
            Dtls1_2 => 0xfefd,
            Unknown(v) => *v,
        }
    }

    pub fn major(&self) -> u8 {
        (self.as_u16() >> 8) as u8
    }

    pub fn minor(&self) -> u8 {
        self.as_u16() as u8
    }

    pub fn is_tls(&self) -> bool {
        self.major() == TLS_MAJOR
    }

    pub fn is_dtls(&self) -> bool {
        self.major() == DTLS_MAJOR
    }

    pub fn is_tls13(&self) -> bool {
        *self == ProtocolVersion::Tls1_3
    }

    /// The TLS version a DTLS version is derived from.
    ///
    /// DTLS 1.0 is TLS 1.1 over datagrams and DTLS 1.2 is TLS 1.2.
    pub fn tls_equivalent(&self) -> ProtocolVersion {
        match self {
            ProtocolVersion::Dtls1_0 => ProtocolVersion::Tls1_1,
            ProtocolVersion::Dtls1_2 => ProtocolVersion::Tls1_2,
            v => *v,
        }
    }

    /// Whether this version carries explicit signature/hash algorithms and uses
    /// the single-hash PRF.
    pub fn is_tls12_or_later(&self) -> bool {
        let v = self.tls_equivalent();
        v.is_tls() && v.minor() >= 3
    }

    /// Whether CBC records carry an explicit IV.
    pub fn has_explicit_iv(&self) -> bool {
        let v = self.tls_equivalent();
        v.is_tls() && v.minor() >= 2
    }

    /// Whether the engine is able to negotiate this version.
    pub fn is_supported(&self) -> bool {
        use ProtocolVersion::*;
        matches!(self, Tls1_0 | Tls1_1 | Tls1_2 | Tls1_3 | Dtls1_0 | Dtls1_2)
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ProtocolVersion> {
        let (input, v) = be_u16(input)?;
        Ok((input, ProtocolVersion::from_u16(v)))
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.as_u16().to_be_bytes());
    }
}

impl PartialOrd for ProtocolVersion {
    /// Versions only compare within their family.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.major() != other.major() {
            return None;
        }
        if self.is_dtls() {
            Some(other.minor().cmp(&self.minor()))
        } else {
            Some(self.minor().cmp(&other.minor()))
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ProtocolVersion::*;
        match self {
            Ssl3 => write!(f, "SSL 3.0"),
            Tls1_0 => write!(f, "TLS 1.0"),
            Tls1_1 => write!(f, "TLS 1.1"),
            Tls1_2 => write!(f, "TLS 1.2"),
            Tls1_3 => write!(f, "TLS 1.3"),
            Dtls1_0 => write!(f, "DTLS 1.0"),
            Dtls1_2 => write!(f, "DTLS 1.2"),
            Unknown(v) => write!(f, "Unknown(0x{:04x})", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_family_order() {
        assert!(ProtocolVersion::Tls1_3 > ProtocolVersion::Tls1_2);
        assert!(ProtocolVersion::Ssl3 < ProtocolVersion::Tls1_0);
    }

    #[test]
    fn dtls_family_order_is_complement() {
        assert!(ProtocolVersion::Dtls1_2 > ProtocolVersion::Dtls1_0);
        assert!(ProtocolVersion::Dtls1_2.as_u16() < ProtocolVersion::Dtls1_0.as_u16());
    }

    #[test]
    fn families_do_not_compare() {
        assert_eq!(
            ProtocolVersion::Tls1_2.partial_cmp(&ProtocolVersion::Dtls1_2),
            None
        );
    }

    #[test]
    fn bytes_identify_version() {
        let (_, v) = ProtocolVersion::parse(&[0xfe, 0xfd]).unwrap();
        assert_eq!(v, ProtocolVersion::Dtls1_2);
        let (_, v) = ProtocolVersion::parse(&[0x03, 0x09]).unwrap();
        assert_eq!(v, ProtocolVersion::Unknown(0x0309));
        assert!(v > ProtocolVersion::Tls1_3);
    }

    #[test]
    fn dtls_maps_to_tls() {
        assert_eq!(
            ProtocolVersion::Dtls1_0.tls_equivalent(),
            ProtocolVersion::Tls1_1
        );
        assert!(ProtocolVersion::Dtls1_2.is_tls12_or_later());
        assert!(!ProtocolVersion::Dtls1_0.is_tls12_or_later());
    }
}
