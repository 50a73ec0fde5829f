//! Wire-level value types shared by the record layer and the message model.

/// Declares a wire enumeration with a catch-all `Unknown` variant.
///
/// Unknown values survive a parse/serialize cycle unchanged.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident($repr:ty, $parser:path) {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )*
            Unknown($repr),
        }

        impl $name {
            pub fn from_value(value: $repr) -> Self {
                match value {
                    $( $value => $name::$variant, )*
                    _ => $name::Unknown(value),
                }
            }

            pub fn value(&self) -> $repr {
                match self {
                    $( $name::$variant => $value, )*
                    $name::Unknown(v) => *v,
                }
            }

            pub fn is_known(&self) -> bool {
                !matches!(self, $name::Unknown(_))
            }

            pub fn parse(input: &[u8]) -> nom::IResult<&[u8], Self> {
                let (input, value) = $parser(input)?;
                Ok((input, Self::from_value(value)))
            }

            pub fn serialize(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.value().to_be_bytes());
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:?}", self)
            }
        }
    };
}

mod ctype;
pub use ctype::{AlertDescription, AlertLevel, ContentType};

mod handshake;
pub use handshake::HandshakeType;

mod version;
pub use version::ProtocolVersion;

mod cipher_suite;
pub use cipher_suite::{BulkCipher, CipherSuite, KeyExchangeAlgorithm, MacAlgorithm};

mod named_group;
pub use named_group::{HashAlgorithm, NamedGroup, SignatureScheme};

mod ext;
pub use ext::{ExtensionType, HeartbeatMode, MaxFragmentLength};
pub use ext::{ClientCertificateType, HeartbeatMessageType, KeyUpdateRequest};
